//! GPU radix sort of (depth key, splat index) pairs.
//!
//! Least-significant-digit first, `32 / digit_bits` passes, each made of a
//! histogram, a single-workgroup exclusive scan and a stable scatter. All
//! three stages are dispatched indirectly from the arguments written by
//! [`IndirectDispatchSizer`], so the visible count never leaves the GPU.

pub mod dispatch;
pub mod ping_pong;
#[cfg(test)]
pub(crate) mod reference;

use std::num::NonZeroU64;

use crate::config::SortConfig;
use crate::preprocess::storage_entry;
use ping_pong::{BufferSide, PingPongBufferSet};

pub use dispatch::{DispatchArgs, DrawIndirectArgs, IndirectDispatchSizer};
pub use ping_pong::KeyIndexBuffers;

/// Per-pass uniform of `shader.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Zeroable, bytemuck::Pod)]
pub struct PassParams {
    pub shift: u32,
    pub pass_index: u32,
    pub _pad: [u32; 2],
}

impl PassParams {
    pub fn new(pass_index: u32, digit_bits: u32) -> Self {
        Self {
            shift: pass_index * digit_bits,
            pass_index,
            _pad: [0; 2],
        }
    }
}

/// Bind group and uniform for one radix pass.
pub struct SortPass {
    params: PassParams,
    // Kept alive for the bind group.
    _params_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// The three pipelines of a radix pass, shared by every pass.
pub struct RadixSorter {
    histogram_pipeline: wgpu::ComputePipeline,
    prefix_pipeline: wgpu::ComputePipeline,
    scatter_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    digit_bits: u32,
    passes: u32,
}

impl RadixSorter {
    pub fn new(device: &wgpu::Device, config: &SortConfig) -> Self {
        let bind_group_layout = Self::create_bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Radix Sort Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Build shader with constants
        let shader_source = format!("{}{}", config.wgsl_constants(), include_str!("shader.wgsl"));
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Radix Sort Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let histogram_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Radix Sort Histogram"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("count_digits"),
            compilation_options: Default::default(),
            cache: None,
        });

        let prefix_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Radix Sort Prefix"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("scan_histogram"),
            compilation_options: Default::default(),
            cache: None,
        });

        let scatter_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Radix Sort Scatter"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("scatter"),
            compilation_options: Default::default(),
            cache: None,
        });

        log::debug!(
            "Radix sorter: {} passes of {} bits, {} keys per block",
            config.passes(),
            config.digit_bits,
            config.block_size()
        );

        Self {
            histogram_pipeline,
            prefix_pipeline,
            scatter_pipeline,
            bind_group_layout,
            digit_bits: config.digit_bits,
            passes: config.passes(),
        }
    }

    fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Radix Sort Bind Group Layout"),
            entries: &[
                // Pass parameters
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<PassParams>() as u64),
                    },
                    count: None,
                },
                // Sort state (visible count)
                storage_entry(1, true),
                // Histogram / offsets table
                storage_entry(2, false),
                // Keys in
                storage_entry(3, true),
                // Indices in
                storage_entry(4, true),
                // Keys out
                storage_entry(5, false),
                // Indices out
                storage_entry(6, false),
            ],
        })
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Side of `buffers` holding the sorted permutation once every pass has run.
    pub fn final_side(&self) -> BufferSide {
        BufferSide::final_side(self.passes)
    }

    /// One bind group per pass, alternating the read and write sides.
    pub fn create_passes(
        &self,
        device: &wgpu::Device,
        state: &wgpu::Buffer,
        histogram: &wgpu::Buffer,
        buffers: &PingPongBufferSet,
    ) -> Vec<SortPass> {
        use wgpu::util::DeviceExt;

        (0..self.passes)
            .map(|pass_index| {
                let params = PassParams::new(pass_index, self.digit_bits);
                let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Radix Sort Pass Params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let src = buffers.side(BufferSide::read_side(pass_index));
                let dst = buffers.side(BufferSide::write_side(pass_index));
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Radix Sort Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 1, resource: state.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 2, resource: histogram.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 3, resource: src.keys.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 4, resource: src.indices.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 5, resource: dst.keys.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 6, resource: dst.indices.as_entire_binding() },
                    ],
                });
                SortPass {
                    params,
                    _params_buffer: params_buffer,
                    bind_group,
                }
            })
            .collect()
    }

    /// Record histogram, prefix and scatter for a single pass.
    ///
    /// `dispatch` holds the [`DispatchArgs`] for the block count; the prefix
    /// stage always runs as one workgroup.
    pub fn record_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &SortPass,
        dispatch: &wgpu::Buffer,
    ) {
        log::trace!(
            "Radix pass {} (bits {}..{})",
            pass.params.pass_index,
            pass.params.shift,
            pass.params.shift + self.digit_bits
        );

        // Calculate histogram
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Radix Sort Histogram"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.histogram_pipeline);
            cpass.set_bind_group(0, &pass.bind_group, &[]);
            cpass.dispatch_workgroups_indirect(dispatch, 0);
        }

        // Prefix sum
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Radix Sort Prefix"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.prefix_pipeline);
            cpass.set_bind_group(0, &pass.bind_group, &[]);
            cpass.dispatch_workgroups(1, 1, 1);
        }

        // Scatter
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Radix Sort Scatter"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.scatter_pipeline);
            cpass.set_bind_group(0, &pass.bind_group, &[]);
            cpass.dispatch_workgroups_indirect(dispatch, 0);
        }
    }

    /// Record every pass in order; the result lands on [`Self::final_side`].
    pub fn record_sort(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        passes: &[SortPass],
        dispatch: &wgpu::Buffer,
    ) {
        for pass in passes {
            self.record_pass(encoder, pass, dispatch);
        }
    }
}

pub fn create_histogram_buffer(device: &wgpu::Device, config: &SortConfig) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Radix Sort Histogram"),
        size: config.histogram_len() as u64 * std::mem::size_of::<u32>() as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}
