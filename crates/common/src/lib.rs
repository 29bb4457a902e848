//! Shared types for the prism renderer: transforms, bounds, fixed limits.
//!
//! # Invariants
//! - Everything here is plain data; no GPU handles, no logging.
//! - Matrices are column-major `glam` types, right-handed, depth range [0, 1].

pub mod bounds;
pub mod collision;
pub mod limits;
pub mod types;

pub use bounds::{Aabb, BoundingSphere};
pub use collision::{Capsule, Collider, Contact, Sphere};
pub use types::Transform;

pub fn crate_info() -> &'static str {
    "prism-common v0.1.0"
}
