//! Projection, culling and key emission.

pub mod visibility;

use crate::camera::ViewCamera;
use crate::config::SortConfig;
use crate::depth_key::ENCODE_DEPTH_WGSL;
use visibility::VisibilityPolicy;

/// Uniform block of `preprocess.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PreprocessParams {
    pub camera: ViewCamera,
    pub num_splats: u32,
    pub depth_order: u32,
    pub near: f32,
    pub frustum_slack: f32,
    pub cull_degenerate: u32,
    pub _pad: [u32; 3],
}

impl PreprocessParams {
    pub fn new(camera: &ViewCamera, num_splats: u32, config: &SortConfig) -> Self {
        let policy: &VisibilityPolicy = &config.visibility;
        Self {
            camera: *camera,
            num_splats,
            depth_order: config.depth_order.as_u32(),
            near: policy.near,
            frustum_slack: policy.frustum_slack,
            cull_degenerate: policy.cull_degenerate as u32,
            _pad: [0; 3],
        }
    }
}

/// Writes (key, index) pairs into the A side of the ping-pong set and bumps the visible counter.
pub struct PreprocessStage {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    workgroup_size: u32,
}

impl PreprocessStage {
    pub fn new(device: &wgpu::Device, config: &SortConfig) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Preprocess Bind Group Layout"),
            entries: &[
                // Camera and policy
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<PreprocessParams>() as u64,
                        ),
                    },
                    count: None,
                },
                // Splats
                storage_entry(1, true),
                // Sort state (visible counter)
                storage_entry(2, false),
                // Keys A
                storage_entry(3, false),
                // Indices A
                storage_entry(4, false),
                // Projected splats
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Preprocess Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let shader_source = format!(
            "{}{}{}",
            config.wgsl_constants(),
            ENCODE_DEPTH_WGSL,
            include_str!("preprocess.wgsl")
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Preprocess Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Preprocess"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("preprocess"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
            workgroup_size: config.workgroup_size,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        params: &wgpu::Buffer,
        splats: &wgpu::Buffer,
        state: &wgpu::Buffer,
        keys: &wgpu::Buffer,
        indices: &wgpu::Buffer,
        projected: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Preprocess Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: splats.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: state.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: keys.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: indices.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: projected.as_entire_binding() },
            ],
        })
    }

    /// Zero the visible counter, then project all `num_splats` splats.
    ///
    /// `num_splats` is the loaded point count, known on the host since load time.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        state: &wgpu::Buffer,
        num_splats: u32,
    ) {
        encoder.clear_buffer(state, 0, Some(4));

        let workgroups = num_splats.div_ceil(self.workgroup_size);
        if workgroups == 0 {
            return;
        }
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Preprocess"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
