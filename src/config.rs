//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. built-in defaults
//! 2. TOML file (`--config PATH`, or `config.toml` in the platform config
//!    directory when it exists)
//! 3. environment variables prefixed `DUPEGUARD_`, `__` for nesting
//!    (e.g. `DUPEGUARD_PERCEPTUAL__ENABLED=true`)
//! 4. command-line flags
//!
//! [`Config::validate`] runs before any file is touched.

use std::path::{Path, PathBuf};

use directories::{ProjectDirs, UserDirs};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::ScanArgs;
use crate::duplicates::NamePolicy;
use crate::quarantine::Layout;
use crate::scanner::perceptual::HASH_SIZE;
use crate::scanner::{
    walker::build_matcher, Capabilities, FingerprintStrategy, PerceptualAlgorithm, WalkerConfig,
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DUPEGUARD_";

/// Name of the default quarantine directory inside the home directory.
pub const DEFAULT_QUARANTINE_DIR: &str = "Duplicate_Quarantine";

/// Invalid or unloadable configuration (`ConfigInvalid`).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    /// A layer could not be parsed or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Load(#[from] figment::Error),

    /// A name mask does not compile.
    #[error("Invalid name pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Matcher error message
        message: String,
    },

    /// The similarity threshold exceeds the fingerprint length.
    #[error("Similarity threshold {0} exceeds the 64-bit fingerprint length")]
    InvalidThreshold(u32),

    /// The quarantine root cannot be created or resolved.
    #[error("Quarantine root {path} is unavailable: {source}")]
    QuarantineRootUnavailable {
        /// Configured root
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The quarantine root lies inside a scanned directory.
    #[error("Quarantine root {quarantine} is inside scan root {root}")]
    QuarantineInsideScanRoot {
        /// Configured quarantine root
        quarantine: PathBuf,
        /// Scan root containing it
        root: PathBuf,
    },
}

/// Similarity mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PerceptualConfig {
    /// Cluster visually similar media.
    pub enabled: bool,
    /// Fingerprint algorithm.
    pub algorithm: PerceptualAlgorithm,
    /// Maximum Hamming distance; the algorithm default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
}

impl PerceptualConfig {
    /// Threshold in effect.
    #[must_use]
    pub fn effective_threshold(&self) -> u32 {
        self.threshold
            .unwrap_or_else(|| self.algorithm.default_threshold())
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum file size in bytes.
    pub min_size: u64,
    /// File name globs to include.
    pub include_names: Vec<String>,
    /// File name globs to exclude.
    pub exclude_names: Vec<String>,
    /// Extensions to include.
    pub include_exts: Vec<String>,
    /// Extensions to exclude.
    pub exclude_exts: Vec<String>,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Hashing workers (0 = available parallelism).
    pub workers: usize,
    /// Compare names case-sensitively.
    pub case_sensitive_names: bool,
    /// Where quarantine batches are created.
    pub quarantine_root: PathBuf,
    /// Arrangement of files inside a batch.
    pub layout: Layout,
    /// Similarity mode.
    pub perceptual: PerceptualConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_size: 0,
            include_names: Vec::new(),
            exclude_names: Vec::new(),
            include_exts: Vec::new(),
            exclude_exts: Vec::new(),
            follow_symlinks: false,
            skip_hidden: false,
            workers: 0,
            case_sensitive_names: false,
            quarantine_root: default_quarantine_root(),
            layout: Layout::default(),
            perceptual: PerceptualConfig::default(),
        }
    }
}

/// `~/Duplicate_Quarantine`, or a relative directory when there is no home.
#[must_use]
pub fn default_quarantine_root() -> PathBuf {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_QUARANTINE_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_QUARANTINE_DIR))
}

/// Command-line values that override lower layers. Unset flags are omitted
/// so they do not mask the file or environment.
#[derive(Debug, Default, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    min_size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_exts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_exts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    case_sensitive_names: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quarantine_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<Layout>,
    perceptual: PerceptualOverrides,
}

#[derive(Debug, Default, Serialize)]
struct PerceptualOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<PerceptualAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<u32>,
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl From<&ScanArgs> for Overrides {
    fn from(args: &ScanArgs) -> Self {
        Self {
            min_size: args.min_size,
            include_names: args.include_names.clone(),
            exclude_names: args.exclude_names.clone(),
            include_exts: args.include_exts.clone(),
            exclude_exts: args.exclude_exts.clone(),
            follow_symlinks: flag(args.follow_symlinks),
            skip_hidden: flag(args.skip_hidden),
            workers: args.workers,
            case_sensitive_names: flag(args.case_sensitive),
            quarantine_root: args.quarantine_root.clone(),
            layout: args.layout.map(Into::into),
            perceptual: PerceptualOverrides {
                enabled: flag(args.similar),
                algorithm: args.algorithm.map(Into::into),
                threshold: args.similar_threshold,
            },
        }
    }
}

impl Config {
    /// Default platform-specific configuration file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "dupeguard", "dupeguard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Defaults, file and environment layers.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if `path` is given but missing.
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::FileNotFound(path.to_path_buf()));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(default) = Self::default_path().filter(|p| p.is_file()) {
                    log::debug!("Using config file {}", default.display());
                    figment = figment.merge(Toml::file(default));
                }
            }
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration without command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a layer cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Ok(Self::figment(path)?.extract()?)
    }

    /// Load configuration with the scan flags as the top layer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a layer cannot be read or parsed.
    pub fn load_for_scan(path: Option<&Path>, args: &ScanArgs) -> Result<Self, ConfigError> {
        let figment = Self::figment(path)?.merge(Serialized::defaults(Overrides::from(args)));
        Ok(figment.extract()?)
    }

    /// Check settings that do not depend on the filesystem.
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreshold` or `InvalidPattern`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.perceptual.effective_threshold();
        if threshold > HASH_SIZE * HASH_SIZE {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        for patterns in [&self.include_names, &self.exclude_names] {
            build_matcher(Path::new("/"), patterns).map_err(|e| match e {
                crate::scanner::ScanError::InvalidPattern { pattern, message } => {
                    ConfigError::InvalidPattern { pattern, message }
                }
                other => ConfigError::InvalidPattern {
                    pattern: patterns.join(", "),
                    message: other.to_string(),
                },
            })?;
        }
        Ok(())
    }

    /// Create the quarantine root and make sure no scan root contains it.
    ///
    /// Returns the canonical quarantine root.
    ///
    /// # Errors
    ///
    /// Returns `QuarantineRootUnavailable` or `QuarantineInsideScanRoot`.
    pub fn prepare_quarantine_root(&self, scan_roots: &[PathBuf]) -> Result<PathBuf, ConfigError> {
        let unavailable = |source| ConfigError::QuarantineRootUnavailable {
            path: self.quarantine_root.clone(),
            source,
        };
        std::fs::create_dir_all(&self.quarantine_root).map_err(unavailable)?;
        let quarantine = self.quarantine_root.canonicalize().map_err(unavailable)?;

        for root in scan_roots {
            let Ok(canonical) = root.canonicalize() else {
                continue;
            };
            if quarantine.starts_with(&canonical) {
                return Err(ConfigError::QuarantineInsideScanRoot {
                    quarantine,
                    root: root.clone(),
                });
            }
        }
        Ok(quarantine)
    }

    /// Enumeration filters.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
            min_size: (self.min_size > 0).then_some(self.min_size),
            include_names: self.include_names.clone(),
            exclude_names: self.exclude_names.clone(),
            include_exts: self.include_exts.clone(),
            exclude_exts: self.exclude_exts.clone(),
        }
    }

    /// Name comparison policy.
    #[must_use]
    pub fn name_policy(&self) -> NamePolicy {
        NamePolicy {
            case_sensitive: self.case_sensitive_names,
        }
    }

    /// Fingerprint strategy for the detected capabilities.
    #[must_use]
    pub fn strategy(&self, capabilities: Capabilities) -> FingerprintStrategy {
        FingerprintStrategy::from_settings(
            self.perceptual.enabled,
            self.perceptual.algorithm,
            capabilities,
        )
    }
}
