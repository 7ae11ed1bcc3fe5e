//! Orbit a camera around a splat cloud and check every frame's sort on the host.
//!
//! ```text
//! RUST_LOG=info cargo run --example headless_sort -- --count 200000 --frames 8
//! RUST_LOG=info cargo run --example headless_sort -- --ply scene.ply
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splatsort::{
    decode_depth, DepthOrder, GaussianCloud, GpuContext, SortConfig, SortOrchestrator, Splat,
    ViewCamera,
};

#[derive(Parser)]
#[command(name = "headless_sort")]
#[command(about = "Run the GPU splat sort without a window and verify its output")]
struct Cli {
    /// 3DGS PLY file; a synthetic cloud is generated when omitted
    #[arg(long)]
    ply: Option<PathBuf>,

    /// Splats in the synthetic cloud
    #[arg(short, long, default_value = "100000")]
    count: u32,

    /// Frames to sort, each from a different orbit angle
    #[arg(short, long, default_value = "4")]
    frames: u32,

    /// Bits per radix pass (1, 2, 4 or 8)
    #[arg(long, default_value = "8")]
    digit_bits: u32,

    /// Sort nearest splats first instead of farthest
    #[arg(long)]
    front_to_back: bool,

    #[arg(long, default_value = "42")]
    seed: u64,
}

fn synthetic_cloud(count: u32, seed: u64) -> GaussianCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let splats = (0..count)
        .map(|_| {
            let p = [
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
            ];
            let color = [rng.gen(), rng.gen(), rng.gen(), rng.gen_range(0.5..1.0)];
            Splat::isotropic(p, rng.gen_range(0.005..0.035), color)
        })
        .collect();
    GaussianCloud::from_splats(splats)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let cloud = match &cli.ply {
        Some(path) => GaussianCloud::from_ply(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => synthetic_cloud(cli.count, cli.seed),
    };
    let order = if cli.front_to_back {
        DepthOrder::FrontToBack
    } else {
        DepthOrder::BackToFront
    };
    let config = SortConfig::new(cloud.splat_count()?)
        .with_digit_bits(cli.digit_bits)
        .with_depth_order(order);

    let ctx = GpuContext::new_blocking().context("creating GPU context")?;
    let mut sorter = SortOrchestrator::new(&ctx, config.clone(), &cloud)?;

    let target = cloud.centroid();
    let distance = cloud.extent() * 1.5;
    let viewport = [1280.0, 720.0];

    for frame in 0..cli.frames {
        let yaw = frame as f32 / cli.frames.max(1) as f32 * std::f32::consts::TAU;
        let camera = ViewCamera::from_orbit(yaw, 0.3, distance, target, 0.8, viewport);

        let start = std::time::Instant::now();
        sorter.run_frame(&ctx, &camera)?;
        let sorted = sorter.read_sorted(&ctx)?;
        let elapsed = start.elapsed();

        if !sorted.keys.windows(2).all(|w| w[0] <= w[1]) {
            bail!("frame {}: keys are not ascending", frame);
        }
        let unique: HashSet<u32> = sorted.indices.iter().copied().collect();
        if unique.len() != sorted.indices.len() || unique.iter().any(|&i| i as usize >= cloud.len()) {
            bail!("frame {}: sorted indices are not a permutation of visible splats", frame);
        }

        let expected = cloud
            .splats
            .iter()
            .filter(|s| config.visibility.accepts(&camera, s))
            .count() as u32;
        if expected != sorted.visible_count {
            // Borderline splats may land on either side of the cull in f32.
            log::warn!(
                "frame {}: {} visible on the GPU, {} predicted on the host",
                frame,
                sorted.visible_count,
                expected
            );
        }

        let span = match (sorted.keys.first(), sorted.keys.last()) {
            (Some(&lo), Some(&hi)) => format!("{:.3} .. {:.3}", decode_depth(lo), decode_depth(hi)),
            _ => "empty".to_string(),
        };
        let draw = sorter.read_draw_args(&ctx)?;
        println!(
            "frame {:>3}: {:>8} / {} visible, draw {} x {}, key depth {}, {:.2?}",
            frame,
            sorted.visible_count,
            cloud.len(),
            draw.instance_count,
            draw.vertex_count,
            span,
            elapsed
        );
    }

    Ok(())
}
