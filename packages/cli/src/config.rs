//! Configuration loading.
//!
//! The pipeline configuration comes from an optional TOML file, with any
//! command-line flags layered on top.

use std::path::Path;

use clap::{Args, ValueEnum};
use telecom_sites_models::{Crs, ProximityConfig, SdConvention};

/// Errors from reading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ProximityConfig`].
    #[error("Invalid config in {path}: {source}")]
    Toml {
        /// Path to the configuration file.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },
}

/// Standard deviation divisor, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SdArg {
    /// n - 1 divisor (undefined for one neighbour)
    Sample,
    /// n divisor
    Population,
}

impl From<SdArg> for SdConvention {
    fn from(arg: SdArg) -> Self {
        match arg {
            SdArg::Sample => Self::Sample,
            SdArg::Population => Self::Population,
        }
    }
}

/// Command-line overrides for [`ProximityConfig`] fields.
#[derive(Debug, Default, Args)]
pub struct ConfigOverrides {
    /// Number of nearest neighbours per site
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    pub k: Option<i64>,

    /// EPSG code of the projected system the inputs are in
    #[arg(long, global = true)]
    pub epsg: Option<u32>,

    /// Standard deviation divisor
    #[arg(long, global = true, value_enum)]
    pub sd: Option<SdArg>,

    /// Tag for sites whose buffer misses the reference
    #[arg(long, global = true)]
    pub none_label: Option<String>,

    /// Tag for sites that could not be classified
    #[arg(long, global = true)]
    pub unknown_label: Option<String>,

    /// Segments per quarter circle when approximating buffers
    #[arg(long, global = true)]
    pub quadrant_segments: Option<u32>,

    /// Run every stage on the current thread
    #[arg(long, global = true)]
    pub sequential: bool,
}

impl ConfigOverrides {
    /// Applies every override that was given.
    pub fn apply(&self, config: &mut ProximityConfig) {
        if let Some(k) = self.k {
            config.k = k;
        }
        if let Some(epsg) = self.epsg {
            config.crs = Crs::new(epsg);
        }
        if let Some(sd) = self.sd {
            config.sd_convention = sd.into();
        }
        if let Some(none) = &self.none_label {
            config.labels.none.clone_from(none);
        }
        if let Some(unknown) = &self.unknown_label {
            config.labels.unknown.clone_from(unknown);
        }
        if let Some(segments) = self.quadrant_segments {
            config.quadrant_segments = segments;
        }
        if self.sequential {
            config.parallel = false;
        }
    }
}

/// Reads the configuration file, or returns the defaults when no path is
/// given.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<ProximityConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(ProximityConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let config = toml::from_str(&content).map_err(|e| ConfigError::Toml {
        path: path.display().to_string(),
        source: e,
    })?;

    log::debug!("Loaded config from {}: {config:?}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        assert_eq!(load(None).unwrap(), ProximityConfig::default());
    }

    #[test]
    fn reads_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "telecom_sites_cli_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "k = 2\nparallel = false\n[crs]\nepsg = 32635\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.k, 2);
        assert!(!config.parallel);
        assert_eq!(config.crs, Crs::new(32635));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_bad_toml() {
        let path = std::env::temp_dir().join(format!(
            "telecom_sites_cli_bad_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "k = \"three\"\n").unwrap();

        assert!(matches!(load(Some(&path)), Err(ConfigError::Toml { .. })));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut config = ProximityConfig::default();
        let overrides = ConfigOverrides {
            k: Some(5),
            sd: Some(SdArg::Population),
            none_label: Some("Off-road".to_string()),
            sequential: true,
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut config);

        assert_eq!(config.k, 5);
        assert_eq!(config.sd_convention, SdConvention::Population);
        assert_eq!(config.labels.none, "Off-road");
        assert_eq!(config.labels.unknown, "Unknown");
        assert_eq!(config.crs, Crs::UTM_36N);
        assert!(!config.parallel);
    }
}
