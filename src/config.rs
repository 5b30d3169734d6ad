//! Outline options
//!
//! Options are read from the `[outline]` table of a TOML file. Every key is
//! optional; missing keys take the defaults below. Both snake_case keys and
//! the camelCase names used by compiler drivers are accepted.
//!
//! ```toml
//! [outline]
//! min_size = 3
//! max_size = 99
//! method_threshold = 20
//! site_threshold = 20
//! max_argument_registers = 5
//! allow_interface_array_arguments = false
//! backend = "dex"
//! ```
//!
//! The worker pool size can also be set with `OUTLINER_THREADS`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ir::DexType;

/// Environment variable overriding [`OutlineOptions::threads`]
pub const THREADS_ENV: &str = "OUTLINER_THREADS";

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors loading options or programs.
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File could not be parsed.
    Parse { what: &'static str, message: String },
    /// Parsed but inconsistent.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read '{}': {}", path.display(), source)
            }
            ConfigError::Parse { what, message } => {
                write!(f, "Failed to parse {}: {}", what, message)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Code generation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    #[default]
    Dex,
    ClassFile,
}

/// Outliner configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutlineOptions {
    /// Master switch; a disabled outliner leaves the program untouched
    pub enabled: bool,

    /// Minimum number of operations in an accepted candidate
    #[serde(alias = "minWindowSize")]
    pub min_size: usize,

    /// Maximum number of operations in a candidate
    #[serde(alias = "maxWindowSize")]
    pub max_size: usize,

    /// Distinct methods a template must occur in before those methods are
    /// rescanned for sites
    #[serde(alias = "methodFrequencyThreshold")]
    pub method_threshold: usize,

    /// Sites a template needs to be materialized
    #[serde(alias = "siteFrequencyThreshold")]
    pub site_threshold: usize,

    /// Upper bound on registers passed to an outline
    #[serde(alias = "maxArgumentRegisterBudget")]
    pub max_argument_registers: usize,

    /// Permit arrays of interface types as arguments. Only honored for
    /// the class-file backend.
    #[serde(alias = "allowInterfaceArrayArguments")]
    pub allow_interface_array_arguments: bool,

    pub backend: Backend,

    /// Type of the synthesized holder class
    pub holder_type: DexType,

    /// Generated methods are named `method_prefix` followed by a counter
    pub method_prefix: String,

    /// Worker pool size
    pub threads: usize,

    /// Check that every recorded site was consumed after rewriting
    pub verify: bool,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 3,
            max_size: 99,
            method_threshold: 20,
            site_threshold: 20,
            max_argument_registers: 5,
            allow_interface_array_arguments: false,
            backend: Backend::Dex,
            holder_type: DexType::new("Loutliner/GeneratedOutlineSupport;"),
            method_prefix: "outline$".to_string(),
            threads: default_threads(),
            verify: cfg!(debug_assertions),
        }
    }
}

fn default_threads() -> usize {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or_else(num_cpus::get)
}

/// Top-level layout of an options file
#[derive(Debug, Default, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    outline: OutlineOptions,
}

impl OutlineOptions {
    /// Load options from the `[outline]` table of a TOML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&content)
    }

    /// Parse and validate options from TOML source
    pub fn parse_toml(content: &str) -> ConfigResult<Self> {
        let file: OptionsFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            what: "options",
            message: e.to_string(),
        })?;
        file.outline.validate()?;
        Ok(file.outline)
    }

    /// Check option consistency.
    ///
    /// Thresholds that select nothing are valid and simply disable outlining.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_size == 0 {
            return Err(ConfigError::Invalid("min_size must be at least 1".into()));
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        if !self.holder_type.is_class() {
            return Err(ConfigError::Invalid(format!(
                "holder_type '{}' is not a class descriptor",
                self.holder_type
            )));
        }
        Ok(())
    }

    /// Whether arrays of interfaces may be passed to an outline
    #[inline]
    pub fn interface_array_arguments_allowed(&self) -> bool {
        self.allow_interface_array_arguments && self.backend == Backend::ClassFile
    }

    /// Options with both thresholds set to `threshold`
    pub fn with_thresholds(mut self, threshold: usize) -> Self {
        self.method_threshold = threshold;
        self.site_threshold = threshold;
        self
    }
}
