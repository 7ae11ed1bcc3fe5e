//! GPU-resident depth sort for Gaussian splats.
//!
//! Every frame, [`SortOrchestrator`] projects the cloud, culls invisible splats,
//! emits order-preserving depth keys and radix-sorts them, leaving a sorted
//! index buffer and a draw-indirect argument block on the device. The host
//! only records and submits commands; nothing is read back during a frame.
//!
//! ```rust,ignore
//! let ctx = GpuContext::new_blocking()?;
//! let cloud = GaussianCloud::from_ply("scene.ply")?;
//! let mut sorter = SortOrchestrator::new(&ctx, SortConfig::new(cloud.splat_count()?), &cloud)?;
//! sorter.run_frame(&ctx, &camera)?;
//! render_pass.set_bind_group(0, sorter.render_bind_group(), &[]);
//! render_pass.draw_indirect(sorter.draw_args_buffer(), 0);
//! ```

pub mod camera;
pub mod cloud;
pub mod config;
pub mod depth_key;
pub mod error;
pub mod gpu;
pub mod orchestrator;
pub mod preprocess;
pub mod radix_sort;

pub use camera::ViewCamera;
pub use cloud::{GaussianCloud, PlyError, Splat};
pub use config::{DepthOrder, SortConfig};
pub use depth_key::{decode_depth, encode_depth};
pub use error::{Result, SortError};
pub use gpu::{read_buffer, GpuContext};
pub use orchestrator::{SortOrchestrator, SortedFrame};
pub use preprocess::visibility::{ProjectedSplat, VisibilityPolicy};
pub use preprocess::PreprocessStage;
pub use radix_sort::ping_pong::{BufferSide, PingPongBufferSet};
pub use radix_sort::{DispatchArgs, DrawIndirectArgs, IndirectDispatchSizer, RadixSorter};
