/// One half of a [`PingPongBufferSet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferSide {
    A,
    B,
}

impl BufferSide {
    pub fn other(self) -> Self {
        match self {
            BufferSide::A => BufferSide::B,
            BufferSide::B => BufferSide::A,
        }
    }

    /// Pass `p` reads A when `p` is even.
    pub fn read_side(pass: u32) -> Self {
        if pass % 2 == 0 {
            BufferSide::A
        } else {
            BufferSide::B
        }
    }

    pub fn write_side(pass: u32) -> Self {
        Self::read_side(pass).other()
    }

    /// Side holding the result after `passes` passes.
    pub fn final_side(passes: u32) -> Self {
        Self::read_side(passes)
    }
}

/// Key and payload buffers of one side.
pub struct KeyIndexBuffers {
    pub keys: wgpu::Buffer,
    pub indices: wgpu::Buffer,
}

/// Two key/index buffer pairs that swap roles every radix pass.
///
/// Preprocessing writes side A. With an even number of passes the sorted
/// permutation also ends on side A.
pub struct PingPongBufferSet {
    a: KeyIndexBuffers,
    b: KeyIndexBuffers,
    // Requested slots; the buffers themselves hold at least one.
    len: u32,
}

impl PingPongBufferSet {
    pub fn new(device: &wgpu::Device, len: u32) -> Self {
        let size = len.max(1) as u64 * std::mem::size_of::<u32>() as u64;
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let make = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };
        Self {
            a: KeyIndexBuffers {
                keys: make("Sort Keys A"),
                indices: make("Sort Indices A"),
            },
            b: KeyIndexBuffers {
                keys: make("Sort Keys B"),
                indices: make("Sort Indices B"),
            },
            len,
        }
    }

    pub fn side(&self, side: BufferSide) -> &KeyIndexBuffers {
        match side {
            BufferSide::A => &self.a,
            BufferSide::B => &self.b,
        }
    }

    /// Slots per buffer, as requested at construction.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
