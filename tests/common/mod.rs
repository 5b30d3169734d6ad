/// Shared fixtures for outliner integration tests
///
/// - Method bodies that repeat (or deliberately do not repeat) a pattern
/// - Option presets and paths to the demo inputs
pub mod programs;

pub use programs::{
    arithmetic_method, guarded_method, program_of, string_builder_method, wide_method,
};

use outliner::OutlineOptions;
use std::path::PathBuf;

/// Options with both thresholds at `threshold`, verification on and a
/// small pool
pub fn test_options(min_size: usize, threshold: usize) -> OutlineOptions {
    OutlineOptions {
        min_size,
        threads: 3,
        verify: true,
        ..OutlineOptions::default()
    }
    .with_thresholds(threshold)
}

/// Path of a file under `demos/`
pub fn demo_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
}
