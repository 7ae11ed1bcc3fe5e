use crate::error::{Result, SortError};
use crate::preprocess::visibility::VisibilityPolicy;

/// Width of a sort key in bits.
pub const KEY_BITS: u32 = 32;
pub const DEFAULT_DIGIT_BITS: u32 = 8;
pub const DEFAULT_WORKGROUP_SIZE: u32 = 256;
/// Elements each thread walks through before the workgroup syncs.
pub const DEFAULT_BLOCK_ROWS: u32 = 15;
/// A screen-space quad drawn as a triangle list (two triangles).
/// Use 4 with a triangle-strip pipeline.
pub const DEFAULT_VERTICES_PER_SPLAT: u32 = 6;
/// wgpu's default `max_compute_workgroups_per_dimension`.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535;

/// Which end of the view the sorted permutation starts from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum DepthOrder {
    /// Farthest splat first, for "over" blending.
    #[default]
    BackToFront,
    /// Nearest splat first, for "under" blending.
    FrontToBack,
}

impl DepthOrder {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            DepthOrder::BackToFront => 0,
            DepthOrder::FrontToBack => 1,
        }
    }
}

/// Tunables of the sort subsystem, fixed for the lifetime of a [`crate::SortOrchestrator`].
///
/// ```rust,ignore
/// let config = SortConfig::new(cloud.splat_count()?)
///     .with_block_rows(8)
///     .with_depth_order(DepthOrder::FrontToBack);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SortConfig {
    pub digit_bits: u32,
    pub workgroup_size: u32,
    pub block_rows: u32,
    pub capacity: u32,
    pub depth_order: DepthOrder,
    pub visibility: VisibilityPolicy,
    pub vertices_per_splat: u32,
}

impl SortConfig {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Bits consumed per radix pass. Must divide 32 and be at most 8.
    pub fn with_digit_bits(mut self, bits: u32) -> Self {
        self.digit_bits = bits;
        self
    }

    pub fn with_workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = size;
        self
    }

    /// Trade register pressure for occupancy in the histogram and scatter stages.
    pub fn with_block_rows(mut self, rows: u32) -> Self {
        self.block_rows = rows;
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_depth_order(mut self, order: DepthOrder) -> Self {
        self.depth_order = order;
        self
    }

    pub fn with_visibility(mut self, policy: VisibilityPolicy) -> Self {
        self.visibility = policy;
        self
    }

    pub fn with_vertices_per_splat(mut self, count: u32) -> Self {
        self.vertices_per_splat = count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.digit_bits, 1 | 2 | 4 | 8) {
            return Err(SortError::InvalidConfig(format!(
                "digit_bits must be one of 1, 2, 4, 8 (got {})",
                self.digit_bits
            )));
        }
        if self.workgroup_size == 0 || self.workgroup_size % 32 != 0 || self.workgroup_size > 256 {
            return Err(SortError::InvalidConfig(format!(
                "workgroup_size must be a non-zero multiple of 32 no larger than 256 (got {})",
                self.workgroup_size
            )));
        }
        if self.workgroup_size < self.radix_size() {
            return Err(SortError::InvalidConfig(format!(
                "workgroup_size {} is smaller than the radix size {}",
                self.workgroup_size,
                self.radix_size()
            )));
        }
        if self.block_rows == 0 {
            return Err(SortError::InvalidConfig("block_rows must be at least 1".into()));
        }
        if self.capacity.div_ceil(self.workgroup_size) > MAX_WORKGROUPS_PER_DIMENSION {
            return Err(SortError::InvalidConfig(format!(
                "capacity {} needs more than {} preprocess workgroups",
                self.capacity, MAX_WORKGROUPS_PER_DIMENSION
            )));
        }
        if self.max_blocks() > MAX_WORKGROUPS_PER_DIMENSION {
            return Err(SortError::InvalidConfig(format!(
                "capacity {} needs more than {} sort blocks",
                self.capacity, MAX_WORKGROUPS_PER_DIMENSION
            )));
        }
        self.visibility.validate()
    }

    /// Number of buckets per pass.
    pub fn radix_size(&self) -> u32 {
        1 << self.digit_bits
    }

    pub fn passes(&self) -> u32 {
        KEY_BITS / self.digit_bits
    }

    /// Elements handled by one histogram/scatter workgroup.
    pub fn block_size(&self) -> u32 {
        self.workgroup_size * self.block_rows
    }

    pub fn max_blocks(&self) -> u32 {
        self.capacity.div_ceil(self.block_size()).max(1)
    }

    /// Length in `u32`s of the (digit, block) histogram table.
    pub fn histogram_len(&self) -> u32 {
        self.radix_size() * self.max_blocks()
    }

    /// Slots allocated per key/index buffer; never zero so bindings stay valid.
    pub fn buffer_len(&self) -> u32 {
        self.capacity.max(1)
    }

    /// WGSL `const` prelude shared by every sort shader.
    pub(crate) fn wgsl_constants(&self) -> String {
        format!(
            "const WG_SIZE: u32 = {}u;\n\
             const BLOCK_ROWS: u32 = {}u;\n\
             const BLOCK_SIZE: u32 = {}u;\n\
             const RADIX_BITS: u32 = {}u;\n\
             const RADIX_SIZE: u32 = {}u;\n\
             const RADIX_MASK: u32 = {}u;\n\
             const MASK_WORDS: u32 = {}u;\n\
             const MASK_TABLE_LEN: u32 = {}u;\n\
             const VERTICES_PER_SPLAT: u32 = {}u;\n",
            self.workgroup_size,
            self.block_rows,
            self.block_size(),
            self.digit_bits,
            self.radix_size(),
            self.radix_size() - 1,
            self.workgroup_size / 32,
            self.radix_size() * (self.workgroup_size / 32),
            self.vertices_per_splat,
        )
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            digit_bits: DEFAULT_DIGIT_BITS,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            block_rows: DEFAULT_BLOCK_ROWS,
            capacity: 0,
            depth_order: DepthOrder::default(),
            visibility: VisibilityPolicy::default(),
            vertices_per_splat: DEFAULT_VERTICES_PER_SPLAT,
        }
    }
}
