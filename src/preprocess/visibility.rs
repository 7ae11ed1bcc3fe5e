//! Conservative per-splat visibility test.
//!
//! The GPU evaluates the predicate in `preprocess.wgsl`; [`VisibilityPolicy::project`]
//! is the host-side twin used to predict the outcome of a frame.

use crate::camera::ViewCamera;
use crate::cloud::Splat;
use crate::error::{Result, SortError};

/// Low-pass added to the projected covariance so every splat covers at least ~1 pixel.
pub const LOW_PASS: f32 = 0.3;
/// Coordinates beyond this are treated as non-finite.
pub const FINITE_LIMIT: f32 = 3.0e38;

/// Thresholds of the visibility predicate, uploaded with every frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VisibilityPolicy {
    /// Minimum distance in front of the camera.
    pub near: f32,
    /// Clip-space guard band; a splat is kept while its footprint reaches inside `[-slack, slack]`.
    pub frustum_slack: f32,
    /// Reject splats whose projected covariance is not positive definite.
    pub cull_degenerate: bool,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            near: 0.2,
            frustum_slack: 1.3,
            cull_degenerate: true,
        }
    }
}

/// Screen-space footprint of a visible splat, written per original index.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectedSplat {
    /// Centre in normalized device coordinates.
    pub center: [f32; 2],
    /// Radius in pixels (3 sigma of the major axis).
    pub radius: f32,
    /// Signed view-space depth the sort key was derived from.
    pub depth: f32,
    /// Inverse 2D covariance (a, b, c) and opacity.
    pub conic_opacity: [f32; 4],
    pub color: [f32; 4],
}

impl VisibilityPolicy {
    /// Only behind-camera and non-finite splats are rejected.
    pub fn keep_all() -> Self {
        Self {
            near: 0.0,
            frustum_slack: f32::MAX,
            cull_degenerate: false,
        }
    }

    pub fn with_near(mut self, near: f32) -> Self {
        self.near = near;
        self
    }

    pub fn with_frustum_slack(mut self, slack: f32) -> Self {
        self.frustum_slack = slack;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.near >= 0.0) {
            return Err(SortError::InvalidConfig(format!(
                "near must be non-negative (got {})",
                self.near
            )));
        }
        if !(self.frustum_slack >= 1.0) {
            return Err(SortError::InvalidConfig(format!(
                "frustum_slack below 1.0 would cull on-screen splats (got {})",
                self.frustum_slack
            )));
        }
        Ok(())
    }

    pub fn accepts(&self, camera: &ViewCamera, splat: &Splat) -> bool {
        self.project(camera, splat).is_some()
    }

    /// Host evaluation of the predicate; `None` when the splat is culled.
    pub fn project(&self, camera: &ViewCamera, splat: &Splat) -> Option<ProjectedSplat> {
        if !splat.position.iter().all(|c| c.abs() < FINITE_LIMIT) {
            return None;
        }
        let v = camera.to_view(splat.position);
        let d = -v[2];
        if !(d > 0.0 && d >= self.near) {
            return None;
        }

        let [fx, fy] = camera.focal;
        // Rows of J * W, J the perspective Jacobian, W the view rotation.
        let w = |row: usize| [camera.view[0][row], camera.view[1][row], camera.view[2][row]];
        let j0 = [fx / d, 0.0, fx * v[0] / (d * d)];
        let j1 = [0.0, fy / d, fy * v[1] / (d * d)];
        let t_row = |j: [f32; 3]| {
            let (w0, w1, w2) = (w(0), w(1), w(2));
            [
                j[0] * w0[0] + j[1] * w1[0] + j[2] * w2[0],
                j[0] * w0[1] + j[1] * w1[1] + j[2] * w2[1],
                j[0] * w0[2] + j[1] * w1[2] + j[2] * w2[2],
            ]
        };
        let t0 = t_row(j0);
        let t1 = t_row(j1);

        let c = splat.cov;
        let sigma = [[c[0], c[1], c[2]], [c[1], c[3], c[4]], [c[2], c[4], c[5]]];
        let quad = |a: [f32; 3], b: [f32; 3]| {
            let mut acc = 0.0;
            for i in 0..3 {
                for k in 0..3 {
                    acc += a[i] * sigma[i][k] * b[k];
                }
            }
            acc
        };
        let ca = quad(t0, t0) + LOW_PASS;
        let cb = quad(t0, t1);
        let cc = quad(t1, t1) + LOW_PASS;

        let det = ca * cc - cb * cb;
        if self.cull_degenerate && !(det > 0.0 && ca > 0.0) {
            return None;
        }
        let mid = 0.5 * (ca + cc);
        let lambda = mid + (mid * mid - det).max(0.1).sqrt();
        let radius = 3.0 * lambda.sqrt();

        let clip = camera.to_clip(v);
        let ndc = [clip[0] / clip[3], clip[1] / clip[3]];
        let reach = [
            2.0 * radius / camera.viewport[0],
            2.0 * radius / camera.viewport[1],
        ];
        if ndc[0].abs() - reach[0] > self.frustum_slack
            || ndc[1].abs() - reach[1] > self.frustum_slack
        {
            return None;
        }

        let inv_det = if det != 0.0 { 1.0 / det } else { 0.0 };
        Some(ProjectedSplat {
            center: ndc,
            radius,
            depth: v[2],
            conic_opacity: [cc * inv_det, -cb * inv_det, ca * inv_det, splat.color[3]],
            color: splat.color,
        })
    }
}
