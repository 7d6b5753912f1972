//! Loading and validating `ReductionConfig`.
//!
//! Precedence: defaults, then environment (a `.env` file is honoured), then
//! whatever the CLI layer overrides on top.

use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::ReductionConfig;
use crate::error::AppError;

pub const ENV_BATCH_SIZE: &str = "WDM_BATCH_SIZE";
pub const ENV_PROMINENCE: &str = "WDM_PROMINENCE";
pub const ENV_CROSSTALK_OFFSET: &str = "WDM_CROSSTALK_OFFSET_NM";
pub const ENV_TARGET_WAVELENGTH: &str = "WDM_TARGET_WAVELENGTH_NM";
pub const ENV_TARGET_BW_1DB: &str = "WDM_TARGET_BW_1DB_NM";
pub const ENV_TARGET_FSR: &str = "WDM_TARGET_FSR_NM";
pub const ENV_MAX_ITERATIONS: &str = "WDM_MAX_ITERATIONS";
pub const ENV_SOURCES: &str = "WDM_SOURCES";

impl ReductionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ReductionConfig::default();

        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_BATCH_SIZE)? {
            config.batch_size = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, ENV_PROMINENCE)? {
            config.prominence_threshold = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, ENV_CROSSTALK_OFFSET)? {
            config.crosstalk_offset_nm = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, ENV_TARGET_WAVELENGTH)? {
            config.target_wavelength_nm = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, ENV_TARGET_BW_1DB)? {
            config.target_bandwidth_1db_nm = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, ENV_TARGET_FSR)? {
            config.target_fsr_nm = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_ITERATIONS)? {
            config.max_iterations = v;
        }
        if let Some(raw) = lookup(ENV_SOURCES) {
            config.sources = std::env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .collect::<Vec<PathBuf>>();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.batch_size == 0 {
            return Err(AppError::new(2, "Batch size must be > 0."));
        }
        if self.max_iterations == 0 {
            return Err(AppError::new(2, "Max iterations must be > 0."));
        }
        let positive = [
            ("prominence threshold", self.prominence_threshold),
            ("crosstalk offset", self.crosstalk_offset_nm),
            ("target wavelength", self.target_wavelength_nm),
            ("target 1 dB bandwidth", self.target_bandwidth_1db_nm),
            ("target FSR", self.target_fsr_nm),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AppError::new(
                    2,
                    format!("Invalid {name} setting: {value} (must be finite and > 0)."),
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| AppError::new(2, format!("Invalid {name}='{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ReductionConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ReductionConfig::default());
        assert_eq!(config.batch_size, 100);
        assert!((config.crosstalk_offset_nm - 2.5).abs() < 1e-12);
    }

    #[test]
    fn environment_overrides_fields() {
        let config = ReductionConfig::from_lookup(lookup_from(&[
            (ENV_BATCH_SIZE, "25"),
            (ENV_PROMINENCE, "0.2"),
            (ENV_TARGET_WAVELENGTH, "1310"),
        ]))
        .unwrap();
        assert_eq!(config.batch_size, 25);
        assert!((config.prominence_threshold - 0.2).abs() < 1e-12);
        assert!((config.target_wavelength_nm - 1310.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_values_exit_with_config_code() {
        let err = ReductionConfig::from_lookup(lookup_from(&[(ENV_BATCH_SIZE, "lots")])).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = ReductionConfig::from_lookup(lookup_from(&[(ENV_BATCH_SIZE, "0")])).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = ReductionConfig::from_lookup(lookup_from(&[(ENV_PROMINENCE, "-1")])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
