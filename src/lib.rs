//! Outliner - whole-program code outlining for register-based bytecode
//!
//! Repeated instruction sequences are lifted out of method bodies into
//! static methods of one synthesized holder class, and every occurrence is
//! replaced by a call.
//!
//! # Architecture
//!
//! 1. **IR** (`ir` module)
//!    - SSA method bodies: values, blocks, catch handlers
//!    - Descriptors, lattice types and method references
//!    - TOML program loading and a builder for tests and tools
//!
//! 2. **Outliner** (`outliner` module)
//!    - Instruction classification and the greedy window scanner
//!    - Register-independent templates
//!    - Candidate, site and rewriting passes on a rayon pool
//!    - Holder class synthesis
//!
//! 3. **Configuration** (`config` module)
//!    - `[outline]` options table, `OUTLINER_THREADS` override
//!
//! # Example
//!
//! ```rust
//! use outliner::{OutlineOptions, Outliner, Program};
//!
//! let mut program = Program::new();
//! let options = OutlineOptions {
//!     threads: 1,
//!     ..OutlineOptions::default()
//! };
//! let mut outliner = Outliner::new(options).unwrap();
//! let report = outliner.run(&mut program).unwrap();
//! assert!(report.holder.is_none());
//! ```

pub mod config;
pub mod ir;
pub mod outliner;

pub use config::{Backend, ConfigError, ConfigResult, OutlineOptions};
pub use ir::{Method, MethodBuilder, Program};
pub use outliner::{
    OutlineError, OutlineReport, OutlineResult, OutlineStats, Outliner, SynthesizedClass,
};
