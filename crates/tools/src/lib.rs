//! Developer tooling: procedural demo scenes, scene and draw-list inspectors.
//!
//! # Invariants
//! - Generated scenes are a pure function of their parameters.
//! - Inspectors never mutate what they look at.

mod inspector;
mod scene_gen;

pub use inspector::{FrameSummary, Inspector, SceneSummary, stats_line};
pub use scene_gen::{DemoScene, DemoSceneParams, SplitMix64, animate, generate};

pub fn crate_info() -> &'static str {
    "scenecull-tools v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("tools"));
    }
}
