use std::io::BufReader;
use std::path::Path;

use crate::error::SortError;

/// GPU-ready packed splat (64 bytes). The sort core only ever addresses it by index.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Splat {
    /// Position in world space (x, y, z)
    pub position: [f32; 3],
    pub _pad0: f32,
    /// Upper triangular 3x3 covariance: [xx, xy, xz, yy, yz, zz]
    pub cov: [f32; 6],
    pub _pad1: [f32; 2],
    /// Color and opacity (r, g, b, opacity)
    pub color: [f32; 4],
}

impl Splat {
    /// Round splat with the same standard deviation along every axis.
    pub fn isotropic(position: [f32; 3], sigma: f32, color: [f32; 4]) -> Self {
        let s2 = sigma * sigma;
        Self {
            position,
            _pad0: 0.0,
            cov: [s2, 0.0, 0.0, s2, 0.0, s2],
            _pad1: [0.0; 2],
            color,
        }
    }
}

/// Splat payload owned by the point-cloud source.
pub struct GaussianCloud {
    pub splats: Vec<Splat>,
}

#[derive(Debug)]
pub enum PlyError {
    Io(std::io::Error),
    Parse(String),
    MissingProperty(String),
}

impl std::fmt::Display for PlyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlyError::Io(e) => write!(f, "IO error: {}", e),
            PlyError::Parse(s) => write!(f, "Parse error: {}", s),
            PlyError::MissingProperty(s) => write!(f, "Missing property: {}", s),
        }
    }
}

impl std::error::Error for PlyError {}

impl From<std::io::Error> for PlyError {
    fn from(e: std::io::Error) -> Self {
        PlyError::Io(e)
    }
}

const SH_C0: f32 = 0.282_094_8;

impl GaussianCloud {
    pub fn from_splats(splats: Vec<Splat>) -> Self {
        Self { splats }
    }

    /// Load a 3D Gaussian Splatting PLY export (position, log-scale, rotation, DC color, logit opacity).
    pub fn from_ply<P: AsRef<Path>>(path: P) -> Result<Self, PlyError> {
        use ply_rs_bw::parser::Parser;
        use ply_rs_bw::ply::DefaultElement;

        let file = std::fs::File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);

        let parser = Parser::<DefaultElement>::new();
        let ply = parser
            .read_ply(&mut reader)
            .map_err(|e| PlyError::Parse(e.to_string()))?;

        let vertices = ply
            .payload
            .get("vertex")
            .ok_or_else(|| PlyError::Parse("Missing vertex element".to_string()))?;

        if u32::try_from(vertices.len()).is_err() {
            return Err(PlyError::Parse(format!(
                "{} vertices exceed u32 splat indices",
                vertices.len()
            )));
        }
        let mut splats = Vec::with_capacity(vertices.len());
        for vertex in vertices {
            let position = [
                get_float_property(vertex, "x")?,
                get_float_property(vertex, "y")?,
                get_float_property(vertex, "z")?,
            ];

            let scale = [
                get_float_property(vertex, "scale_0").unwrap_or(0.0).exp(),
                get_float_property(vertex, "scale_1").unwrap_or(0.0).exp(),
                get_float_property(vertex, "scale_2").unwrap_or(0.0).exp(),
            ];

            let rot = [
                get_float_property(vertex, "rot_0").unwrap_or(1.0),
                get_float_property(vertex, "rot_1").unwrap_or(0.0),
                get_float_property(vertex, "rot_2").unwrap_or(0.0),
                get_float_property(vertex, "rot_3").unwrap_or(0.0),
            ];
            let quat_len = rot.iter().map(|c| c * c).sum::<f32>().sqrt();
            let quat = if quat_len > 0.0 {
                rot.map(|c| c / quat_len)
            } else {
                [1.0, 0.0, 0.0, 0.0]
            };

            let dc = [
                get_float_property(vertex, "f_dc_0").unwrap_or(0.0),
                get_float_property(vertex, "f_dc_1").unwrap_or(0.0),
                get_float_property(vertex, "f_dc_2").unwrap_or(0.0),
            ];
            let opacity_raw = get_float_property(vertex, "opacity").unwrap_or(0.0);

            splats.push(Splat {
                position,
                _pad0: 0.0,
                cov: compute_covariance(scale, quat),
                _pad1: [0.0; 2],
                color: [
                    (0.5 + SH_C0 * dc[0]).clamp(0.0, 1.0),
                    (0.5 + SH_C0 * dc[1]).clamp(0.0, 1.0),
                    (0.5 + SH_C0 * dc[2]).clamp(0.0, 1.0),
                    1.0 / (1.0 + (-opacity_raw).exp()),
                ],
            });
        }

        let cloud = Self::from_splats(splats);

        log::info!(
            "Loaded {} splats from {}",
            cloud.splats.len(),
            path.as_ref().display()
        );
        Ok(cloud)
    }

    pub fn len(&self) -> usize {
        self.splats.len()
    }

    /// Splat count as the `u32` the GPU indexes with.
    pub fn splat_count(&self) -> Result<u32, SortError> {
        index_count(self.splats.len())
    }

    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    /// Loader-side guard: the sort core assumes the cloud fits its buffers.
    pub fn check_capacity(&self, capacity: u32) -> Result<(), SortError> {
        if self.splats.len() > capacity as usize {
            return Err(SortError::CapacityExceeded {
                count: self.splats.len(),
                capacity,
            });
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.splats)
    }

    pub fn centroid(&self) -> [f32; 3] {
        if self.splats.is_empty() {
            return [0.0; 3];
        }
        let mut sum = [0.0f64; 3];
        for s in &self.splats {
            for (acc, &p) in sum.iter_mut().zip(s.position.iter()) {
                *acc += p as f64;
            }
        }
        let n = self.splats.len() as f64;
        sum.map(|c| (c / n) as f32)
    }

    /// Largest side of the axis-aligned bounds.
    pub fn extent(&self) -> f32 {
        if self.splats.is_empty() {
            return 1.0;
        }
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for s in &self.splats {
            for i in 0..3 {
                min[i] = min[i].min(s.position[i]);
                max[i] = max[i].max(s.position[i]);
            }
        }
        (0..3).map(|i| max[i] - min[i]).fold(0.001, f32::max)
    }
}

/// R * S^2 * R^T, upper triangle.
fn compute_covariance(scale: [f32; 3], quat: [f32; 4]) -> [f32; 6] {
    let [w, x, y, z] = quat;
    let r = [
        [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - w * z), 2.0 * (x * z + w * y)],
        [2.0 * (x * y + w * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - w * x)],
        [2.0 * (x * z - w * y), 2.0 * (y * z + w * x), 1.0 - 2.0 * (x * x + y * y)],
    ];
    let s2 = scale.map(|s| s * s);
    let entry = |a: usize, b: usize| (0..3).map(|k| r[a][k] * r[b][k] * s2[k]).sum::<f32>();
    [
        entry(0, 0),
        entry(0, 1),
        entry(0, 2),
        entry(1, 1),
        entry(1, 2),
        entry(2, 2),
    ]
}

fn get_float_property(element: &ply_rs_bw::ply::DefaultElement, name: &str) -> Result<f32, PlyError> {
    use ply_rs_bw::ply::Property;

    element
        .get(name)
        .ok_or_else(|| PlyError::MissingProperty(name.to_string()))
        .and_then(|prop| match prop {
            Property::Float(v) => Ok(*v),
            Property::Double(v) => Ok(*v as f32),
            Property::Int(v) => Ok(*v as f32),
            Property::UInt(v) => Ok(*v as f32),
            Property::Short(v) => Ok(*v as f32),
            Property::UShort(v) => Ok(*v as f32),
            Property::Char(v) => Ok(*v as f32),
            Property::UChar(v) => Ok(*v as f32),
            _ => Err(PlyError::Parse(format!("Property {} is not a number", name))),
        })
}

pub(crate) fn index_count(len: usize) -> Result<u32, SortError> {
    u32::try_from(len).map_err(|_| SortError::TooManySplats(len))
}
