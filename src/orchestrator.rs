//! Per-frame sequencing of the sort subsystem.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::camera::ViewCamera;
use crate::cloud::GaussianCloud;
use crate::config::SortConfig;
use crate::error::{Result, SortError};
use crate::gpu::{read_buffer, GpuContext};
use crate::preprocess::visibility::ProjectedSplat;
use crate::preprocess::{PreprocessParams, PreprocessStage};
use crate::radix_sort::dispatch::{create_dispatch_buffer, create_draw_buffer};
use crate::radix_sort::ping_pong::{BufferSide, PingPongBufferSet};
use crate::radix_sort::{
    create_histogram_buffer, DispatchArgs, DrawIndirectArgs, IndirectDispatchSizer,
    KeyIndexBuffers, RadixSorter, SortPass,
};

/// Host copy of a frame's output, for diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortedFrame {
    pub visible_count: u32,
    pub keys: Vec<u32>,
    pub indices: Vec<u32>,
}

/// Owns every buffer of the sort subsystem and records one frame at a time:
/// preprocess, size dispatch, then every radix pass.
///
/// Buffers are sized once from the cloud at construction. After a device loss
/// the orchestrator is unusable and must be rebuilt against a new [`GpuContext`].
pub struct SortOrchestrator {
    config: SortConfig,
    num_splats: u32,
    frame: u64,

    preprocess: PreprocessStage,
    sizer: IndirectDispatchSizer,
    sorter: RadixSorter,

    params_buffer: wgpu::Buffer,
    state_buffer: wgpu::Buffer,
    projected_buffer: wgpu::Buffer,
    dispatch_buffer: wgpu::Buffer,
    draw_buffer: wgpu::Buffer,
    buffers: PingPongBufferSet,
    // Bound through the pass bind groups; held here to tie their lifetime to ours.
    _splat_buffer: wgpu::Buffer,
    _histogram_buffer: wgpu::Buffer,

    preprocess_bind_group: wgpu::BindGroup,
    sizer_bind_group: wgpu::BindGroup,
    passes: Vec<SortPass>,
    render_bind_group_layout: wgpu::BindGroupLayout,
    render_bind_group: wgpu::BindGroup,

    lost: Arc<AtomicBool>,
}

impl SortOrchestrator {
    /// Allocate all buffers for `cloud` and compile the pipelines.
    ///
    /// Fails with [`SortError::CapacityExceeded`] if the cloud does not fit
    /// `config.capacity`.
    pub fn new(ctx: &GpuContext, config: SortConfig, cloud: &GaussianCloud) -> Result<Self> {
        ctx.ensure_alive()?;
        config.validate()?;
        cloud.check_capacity(config.capacity)?;
        let num_splats = cloud.splat_count()?;
        let device = &ctx.device;

        let preprocess = PreprocessStage::new(device, &config);
        let sizer = IndirectDispatchSizer::new(device, &config);
        let sorter = RadixSorter::new(device, &config);

        let slots = config.buffer_len() as u64;
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Preprocess Params"),
            size: std::mem::size_of::<PreprocessParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let splat_buffer = if cloud.is_empty() {
            // Zero-sized storage bindings are invalid.
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Splats"),
                size: std::mem::size_of::<crate::cloud::Splat>() as u64,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        } else {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Splats"),
                contents: cloud.as_bytes(),
                usage: wgpu::BufferUsages::STORAGE,
            })
        };
        let state_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sort State"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let projected_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Projected Splats"),
            size: slots * std::mem::size_of::<ProjectedSplat>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let histogram_buffer = create_histogram_buffer(device, &config);
        let dispatch_buffer = create_dispatch_buffer(device);
        let draw_buffer = create_draw_buffer(device);
        let buffers = PingPongBufferSet::new(device, config.buffer_len());

        let side_a = buffers.side(BufferSide::A);
        let preprocess_bind_group = preprocess.create_bind_group(
            device,
            &params_buffer,
            &splat_buffer,
            &state_buffer,
            &side_a.keys,
            &side_a.indices,
            &projected_buffer,
        );
        let sizer_bind_group =
            sizer.create_bind_group(device, &state_buffer, &dispatch_buffer, &draw_buffer);
        let passes = sorter.create_passes(device, &state_buffer, &histogram_buffer, &buffers);

        let render_bind_group_layout = Self::create_render_bind_group_layout(device);
        let sorted = buffers.side(sorter.final_side());
        let render_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sorted Splats Bind Group"),
            layout: &render_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: sorted.indices.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: projected_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: state_buffer.as_entire_binding() },
            ],
        });

        log::info!(
            "Sort subsystem ready: {} splats, capacity {}, {} passes, final side {:?}",
            num_splats,
            config.capacity,
            sorter.passes(),
            sorter.final_side()
        );

        Ok(Self {
            num_splats,
            frame: 0,
            preprocess,
            sizer,
            sorter,
            params_buffer,
            state_buffer,
            projected_buffer,
            dispatch_buffer,
            draw_buffer,
            buffers,
            _splat_buffer: splat_buffer,
            _histogram_buffer: histogram_buffer,
            preprocess_bind_group,
            sizer_bind_group,
            passes,
            render_bind_group_layout,
            render_bind_group,
            lost: ctx.lost_flag(),
            config,
        })
    }

    /// Read-only view of the sorted output for the render consumer.
    ///
    /// 0: sorted indices, 1: [`ProjectedSplat`]s by original index, 2: visible count.
    fn create_render_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX
                | wgpu::ShaderStages::FRAGMENT
                | wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sorted Splats Bind Group Layout"),
            entries: &[entry(0), entry(1), entry(2)],
        })
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            return Err(SortError::DeviceLost(
                "orchestrator must be rebuilt from the point-cloud source".into(),
            ));
        }
        Ok(())
    }

    /// Record a full frame into `encoder`.
    ///
    /// The camera is uploaded through `queue.write_buffer`, which lands before the
    /// next submission, so submit each frame's encoder before recording the next.
    pub fn record_frame(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        camera: &ViewCamera,
    ) -> Result<()> {
        self.ensure_alive()?;
        let params = PreprocessParams::new(camera, self.num_splats, &self.config);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        log::debug!("Recording sort frame {} ({} splats)", self.frame, self.num_splats);
        self.preprocess.record(
            encoder,
            &self.preprocess_bind_group,
            &self.state_buffer,
            self.num_splats,
        );
        self.record_sort(encoder);
        self.frame += 1;
        Ok(())
    }

    /// Size the dispatch from the current visible count and run every radix pass.
    ///
    /// Sorts whatever side A and the visible counter hold, either from
    /// preprocessing or from [`Self::upload_pairs`].
    pub fn record_sort(&self, encoder: &mut wgpu::CommandEncoder) {
        self.sizer.record(encoder, &self.sizer_bind_group);
        self.sorter
            .record_sort(encoder, &self.passes, &self.dispatch_buffer);
    }

    /// Record and submit one frame.
    pub fn run_frame(&mut self, ctx: &GpuContext, camera: &ViewCamera) -> Result<wgpu::SubmissionIndex> {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sort Frame Encoder"),
            });
        self.record_frame(&ctx.queue, &mut encoder, camera)?;
        Ok(ctx.queue.submit(Some(encoder.finish())))
    }

    /// Load explicit (key, index) pairs into side A and set the visible count,
    /// bypassing preprocessing. Takes effect at the next submission.
    pub fn upload_pairs(&self, queue: &wgpu::Queue, keys: &[u32], indices: &[u32]) -> Result<()> {
        self.ensure_alive()?;
        if keys.len() != indices.len() {
            return Err(SortError::InvalidConfig(format!(
                "{} keys but {} indices",
                keys.len(),
                indices.len()
            )));
        }
        if keys.len() > self.config.capacity as usize {
            return Err(SortError::CapacityExceeded {
                count: keys.len(),
                capacity: self.config.capacity,
            });
        }
        let side_a = self.buffers.side(BufferSide::A);
        if !keys.is_empty() {
            queue.write_buffer(&side_a.keys, 0, bytemuck::cast_slice(keys));
            queue.write_buffer(&side_a.indices, 0, bytemuck::cast_slice(indices));
        }
        queue.write_buffer(&self.state_buffer, 0, bytemuck::bytes_of(&(keys.len() as u32)));
        Ok(())
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn num_splats(&self) -> u32 {
        self.num_splats
    }

    /// Frames recorded so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn final_side(&self) -> BufferSide {
        self.sorter.final_side()
    }

    /// Buffers holding the sorted permutation once the frame has executed.
    pub fn sorted(&self) -> &KeyIndexBuffers {
        self.buffers.side(self.final_side())
    }

    pub fn sorted_indices(&self) -> &wgpu::Buffer {
        &self.sorted().indices
    }

    /// Device-resident visible count in the first four bytes.
    pub fn visible_count_buffer(&self) -> &wgpu::Buffer {
        &self.state_buffer
    }

    /// [`DrawIndirectArgs`] for `draw_indirect`.
    pub fn draw_args_buffer(&self) -> &wgpu::Buffer {
        &self.draw_buffer
    }

    pub fn dispatch_args_buffer(&self) -> &wgpu::Buffer {
        &self.dispatch_buffer
    }

    pub fn projected_buffer(&self) -> &wgpu::Buffer {
        &self.projected_buffer
    }

    pub fn render_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.render_bind_group_layout
    }

    pub fn render_bind_group(&self) -> &wgpu::BindGroup {
        &self.render_bind_group
    }

    /// Blocking readback of the last submitted frame. Diagnostics only.
    pub fn read_sorted(&self, ctx: &GpuContext) -> Result<SortedFrame> {
        let visible_count = self.read_visible_count(ctx)?;
        let sorted = self.sorted();
        let count = visible_count.min(self.config.capacity) as usize;
        Ok(SortedFrame {
            visible_count,
            keys: read_buffer(&ctx.device, &ctx.queue, &sorted.keys, 0, count)?,
            indices: read_buffer(&ctx.device, &ctx.queue, &sorted.indices, 0, count)?,
        })
    }

    pub fn read_visible_count(&self, ctx: &GpuContext) -> Result<u32> {
        let count: Vec<u32> = read_buffer(&ctx.device, &ctx.queue, &self.state_buffer, 0, 1)?;
        Ok(count.first().copied().unwrap_or(0))
    }

    pub fn read_dispatch_args(&self, ctx: &GpuContext) -> Result<DispatchArgs> {
        let args: Vec<DispatchArgs> = read_buffer(&ctx.device, &ctx.queue, &self.dispatch_buffer, 0, 1)?;
        Ok(args.first().copied().unwrap_or_default())
    }

    pub fn read_draw_args(&self, ctx: &GpuContext) -> Result<DrawIndirectArgs> {
        let args: Vec<DrawIndirectArgs> = read_buffer(&ctx.device, &ctx.queue, &self.draw_buffer, 0, 1)?;
        Ok(args.first().copied().unwrap_or_default())
    }

    /// Footprints indexed by original splat index. Entries of culled splats are stale.
    pub fn read_projected(&self, ctx: &GpuContext) -> Result<Vec<ProjectedSplat>> {
        read_buffer(
            &ctx.device,
            &ctx.queue,
            &self.projected_buffer,
            0,
            self.num_splats as usize,
        )
    }
}
