//! Developer tooling: read-only scene inspection for the debug overlay and
//! the command-line front end.
//!
//! # Invariants
//! - Inspection never mutates scene state.
//! - Every summary is `Serialize` so the CLI can emit it as JSON.

mod inspector;

pub use inspector::{AssetSummary, CascadeSummary, CullReport, SceneInspector, SceneSummary};

pub fn crate_info() -> &'static str {
    "prism-tools v0.1.0"
}
