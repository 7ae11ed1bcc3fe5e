/// View/projection pair consumed read-only by the preprocess stage.
///
/// Matrices are column-major, right-handed, camera looking down `-Z`, so
/// points in front of the camera have negative view-space `z`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewCamera {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub viewport: [f32; 2],
    pub focal: [f32; 2],
}

const NEAR: f32 = 0.01;
const FAR: f32 = 1000.0;

impl ViewCamera {
    /// Camera at `eye` looking at `target`, `fov` is the vertical field of view in radians.
    pub fn look_at(eye: [f32; 3], target: [f32; 3], fov: f32, viewport: [f32; 2]) -> Self {
        let f = normalize(sub(target, eye));
        let r = normalize(cross(f, [0.0, 1.0, 0.0]));
        let u = cross(r, f);

        let view = [
            [r[0], u[0], -f[0], 0.0],
            [r[1], u[1], -f[1], 0.0],
            [r[2], u[2], -f[2], 0.0],
            [-dot(r, eye), -dot(u, eye), dot(f, eye), 1.0],
        ];

        let aspect = viewport[0] / viewport[1];
        let focal_len = 1.0 / (fov / 2.0).tan();
        let proj = [
            [focal_len / aspect, 0.0, 0.0, 0.0],
            [0.0, focal_len, 0.0, 0.0],
            [0.0, 0.0, (FAR + NEAR) / (NEAR - FAR), -1.0],
            [0.0, 0.0, (2.0 * FAR * NEAR) / (NEAR - FAR), 0.0],
        ];

        let focal = [
            focal_len * viewport[0] * 0.5,
            focal_len * viewport[1] * 0.5,
        ];

        Self { view, proj, viewport, focal }
    }

    pub fn from_orbit(
        yaw: f32,
        pitch: f32,
        distance: f32,
        target: [f32; 3],
        fov: f32,
        viewport: [f32; 2],
    ) -> Self {
        let (sy, cy) = (yaw.sin(), yaw.cos());
        let (sp, cp) = (pitch.sin(), pitch.cos());
        let eye = [
            target[0] + distance * cp * sy,
            target[1] + distance * sp,
            target[2] + distance * cp * cy,
        ];
        Self::look_at(eye, target, fov, viewport)
    }

    /// World position to view space.
    pub fn to_view(&self, p: [f32; 3]) -> [f32; 3] {
        let h = mul_point(&self.view, [p[0], p[1], p[2], 1.0]);
        [h[0], h[1], h[2]]
    }

    /// View-space position to homogeneous clip space.
    pub fn to_clip(&self, v: [f32; 3]) -> [f32; 4] {
        mul_point(&self.proj, [v[0], v[1], v[2], 1.0])
    }
}

fn mul_point(m: &[[f32; 4]; 4], p: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (col, &s) in m.iter().zip(p.iter()) {
        for row in 0..4 {
            out[row] += col[row] * s;
        }
    }
    out
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = dot(v, v).sqrt().max(0.0001);
    [v[0] / len, v[1] / len, v[2] / len]
}
