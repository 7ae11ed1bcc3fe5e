//! GPU-side sizing of the sort and draw workloads.

use crate::config::SortConfig;
use crate::preprocess::storage_entry;

/// Layout of `dispatch_workgroups_indirect` arguments.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DispatchArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchArgs {
    /// Workgroups needed to cover `count` elements in blocks of `block_size`.
    pub fn for_count(count: u32, block_size: u32) -> Self {
        Self {
            x: count.div_ceil(block_size),
            y: 1,
            z: 1,
        }
    }
}

/// Layout of `draw_indirect` arguments; one instance per visible splat.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawIndirectArgs {
    pub fn for_count(visible: u32, vertices_per_splat: u32) -> Self {
        Self {
            vertex_count: vertices_per_splat,
            instance_count: visible,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Derives [`DispatchArgs`] and [`DrawIndirectArgs`] from the visible count
/// without a host round trip.
pub struct IndirectDispatchSizer {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl IndirectDispatchSizer {
    pub fn new(device: &wgpu::Device, config: &SortConfig) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Dispatch Sizer Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Dispatch Sizer Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader_source = format!("{}{}", config.wgsl_constants(), include_str!("dispatch.wgsl"));
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Dispatch Sizer Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Dispatch Sizer"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("size_dispatch"),
            compilation_options: Default::default(),
            cache: None,
        });
        Self {
            pipeline,
            bind_group_layout,
        }
    }

    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        state: &wgpu::Buffer,
        dispatch: &wgpu::Buffer,
        draw: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dispatch Sizer Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: state.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: dispatch.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: draw.as_entire_binding() },
            ],
        })
    }

    /// Must be recorded after preprocessing and before any pass that consumes the arguments.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Size Dispatch"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }
}

pub fn create_dispatch_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Sort Dispatch Args"),
        size: std::mem::size_of::<DispatchArgs>() as u64,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::INDIRECT
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

pub fn create_draw_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Splat Draw Args"),
        size: std::mem::size_of::<DrawIndirectArgs>() as u64,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::INDIRECT
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_whole_blocks() {
        assert_eq!(DispatchArgs::for_count(0, 3840), DispatchArgs { x: 0, y: 1, z: 1 });
        assert_eq!(DispatchArgs::for_count(1, 3840).x, 1);
        assert_eq!(DispatchArgs::for_count(3840, 3840).x, 1);
        assert_eq!(DispatchArgs::for_count(3841, 3840).x, 2);
    }

    #[test]
    fn sizing_is_a_pure_function_of_the_count() {
        let first = DispatchArgs::for_count(10_000, 1024);
        let second = DispatchArgs::for_count(10_000, 1024);
        assert_eq!(first, second);
        assert_eq!(first.x, 10);
    }

    #[test]
    fn draw_args_instance_per_visible_splat() {
        let draw = DrawIndirectArgs::for_count(42, 6);
        assert_eq!(draw.vertex_count, 6);
        assert_eq!(draw.instance_count, 42);
        assert_eq!(std::mem::size_of::<DrawIndirectArgs>(), 16);
        assert_eq!(std::mem::size_of::<DispatchArgs>(), 12);
    }
}
