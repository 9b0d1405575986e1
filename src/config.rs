//! Compiler configuration.
//!
//! Hierarchical configuration loading from:
//! - `compiler.toml` (default configuration)
//! - `compiler.local.toml` (git-ignored local overrides)
//! - Environment variables (`DFGC_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # compiler.toml
//! [fixpoint]
//! max_canonicalize_iterations = 64
//! max_cse_iterations = 16
//!
//! [induction]
//! divergent_is_error = false
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! DFGC_FIXPOINT__MAX_CSE_ITERATIONS=32
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Top-level compiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub fixpoint: FixpointConfig,
    #[serde(default)]
    pub optimize: OptimizeConfig,
    #[serde(default)]
    pub induction: InductionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bounds on the iterative passes (§4.3-§4.5, §4.8). The passes are proven
/// to terminate by strictly decreasing an integer potential, so these caps
/// exist only to turn a latent bug into a diagnosable early exit rather
/// than a hang.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixpointConfig {
    #[serde(default = "default_max_canonicalize_iterations")]
    pub max_canonicalize_iterations: usize,
    #[serde(default = "default_max_cse_iterations")]
    pub max_cse_iterations: usize,
    #[serde(default = "default_max_column_id_iterations")]
    pub max_column_id_iterations: usize,
}

fn default_max_canonicalize_iterations() -> usize {
    256
}
fn default_max_cse_iterations() -> usize {
    64
}
fn default_max_column_id_iterations() -> usize {
    64
}

impl Default for FixpointConfig {
    fn default() -> Self {
        FixpointConfig {
            max_canonicalize_iterations: default_max_canonicalize_iterations(),
            max_cse_iterations: default_max_cse_iterations(),
            max_column_id_iterations: default_max_column_id_iterations(),
        }
    }
}

/// Toggles for optional optimizer passes (§9 Open Questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeConfig {
    /// The `SinkConditions` pass (§9) is present in the source but not
    /// invoked in the main pipeline. Off by default, mirroring that.
    #[serde(default)]
    pub enable_sink_conditions: bool,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        OptimizeConfig {
            enable_sink_conditions: false,
        }
    }
}

/// Controls how non-linearizable induction (§4.6 step 6) is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InductionConfig {
    /// When true, a non-linearizable merge set without `@divergent` raises
    /// `CoreError::Semantic` instead of a warning-level `Diagnostic`.
    #[serde(default)]
    pub divergent_is_error: bool,
}

impl Default for InductionConfig {
    fn default() -> Self {
        InductionConfig {
            divergent_is_error: false,
        }
    }
}

/// Logging configuration consumed by the pipeline's `tracing` setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `compiler.toml` (base configuration)
    /// 2. `compiler.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`DFGC_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("compiler.toml"))
            .merge(Toml::file("compiler.local.toml"))
            .merge(Env::prefixed("DFGC_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DFGC_").split("__"))
            .extract()
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            fixpoint: FixpointConfig::default(),
            optimize: OptimizeConfig::default(),
            induction: InductionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
