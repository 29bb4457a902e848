//! Fixed build-time limits. None of these are runtime configuration.

/// Number of shadow cascades, one depth-array layer each.
pub const SHADOW_MAP_CASCADES: usize = 4;

/// Width and height of every shadow-map layer.
pub const SHADOW_MAP_DIMENSIONS: u32 = 4096;

/// Mip levels in the bloom chain; mip 0 receives the collect pass.
pub const BLOOM_MIP_COUNT: u32 = 5;

/// Indirect-command replicas per asset: main view plus one per cascade.
pub const INDIRECT_BUFFER_SLOTS: usize = SHADOW_MAP_CASCADES + 1;

/// Draw commands handled by one culling workgroup.
pub const CULL_WORKGROUP_SIZE: u32 = 16;

pub const MAX_POINT_LIGHTS: usize = 32;

/// Blend between logarithmic and uniform cascade splits.
pub const CASCADE_SPLIT_LAMBDA: f32 = 0.95;
