use crate::pipeline::event_bus::MIN_PENDING_EVENTS;
use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Environment toggle that forces raw path dumps on
pub const DEBUG_ENV: &str = "DEBUG";
/// Persisted right-hand-drive flag
pub const IS_RHD_PARAM: &str = "IsRHD";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env(std::env::var(DEBUG_ENV).ok().as_deref());
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the one-event-per-service-per-frame
    /// contract.
    pub fn validate(&self) -> Result<()> {
        if self.output.max_pending < MIN_PENDING_EVENTS {
            bail!(
                "output.max_pending is {}, must be at least {} (model + cameraOdometry per frame)",
                self.output.max_pending,
                MIN_PENDING_EVENTS
            );
        }
        Ok(())
    }

    /// Any non-empty DEBUG value enables debug dumps.
    pub fn apply_env(&mut self, debug: Option<&str>) {
        if debug.map_or(false, |v| !v.is_empty()) {
            self.runtime.debug_dump = true;
        }
    }

    /// Right-hand-drive flag, read once at startup.
    pub fn is_rhd(&self) -> bool {
        let dir = match &self.params.dir {
            Some(dir) => dir,
            None => return self.params.is_rhd,
        };
        match read_param_bool(Path::new(dir), IS_RHD_PARAM) {
            Ok(Some(v)) => v,
            Ok(None) => {
                info!("{} not set, using config default {}", IS_RHD_PARAM, self.params.is_rhd);
                self.params.is_rhd
            }
            Err(e) => {
                warn!("Failed to read {}: {:#}", IS_RHD_PARAM, e);
                self.params.is_rhd
            }
        }
    }
}

/// Read a boolean param stored as `<dir>/<key>` containing `1` or `0`.
/// A missing file is `Ok(None)`.
pub fn read_param_bool(dir: &Path, key: &str) -> Result<Option<bool>> {
    let path = dir.join(key);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read param {}", path.display()))?;
    Ok(Some(raw.trim() == "1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
model:
  path: models/supercombo.onnx
  output_size: 5865
frames:
  input_dir: frames
"#;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("drive_modeld_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.model.frame_size, crate::frame_buffer::MODEL_FRAME_SIZE);
        assert!(!config.runtime.temporal);
        assert!(!config.runtime.debug_dump);
        assert_eq!(config.frames.extension, "raw");
        assert_eq!(config.output.max_pending, 64);
        assert!(config.output.path.is_none());
    }

    #[test]
    fn test_bus_capacity_below_one_frame_rejected() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert!(config.validate().is_ok());

        config.output.max_pending = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_pending"));

        config.output.max_pending = MIN_PENDING_EVENTS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_validates() {
        let dir = temp_dir("load_validate");
        let path = dir.join("config.yaml");
        fs::write(&path, format!("{}output:\n  max_pending: 0\n", MINIMAL)).unwrap();
        assert!(Config::load(&path.to_string_lossy()).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_debug_env_enables_dump() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.apply_env(Some(""));
        assert!(!config.runtime.debug_dump);
        config.apply_env(None);
        assert!(!config.runtime.debug_dump);
        config.apply_env(Some("1"));
        assert!(config.runtime.debug_dump);
    }

    #[test]
    fn test_read_param_bool() {
        let dir = temp_dir("params");
        assert_eq!(read_param_bool(&dir, "Missing").unwrap(), None);
        fs::write(dir.join("IsRHD"), "1").unwrap();
        assert_eq!(read_param_bool(&dir, "IsRHD").unwrap(), Some(true));
        fs::write(dir.join("IsRHD"), "0\n").unwrap();
        assert_eq!(read_param_bool(&dir, "IsRHD").unwrap(), Some(false));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_is_rhd_falls_back_to_config() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.params.is_rhd = true;
        assert!(config.is_rhd());

        let dir = temp_dir("rhd");
        config.params.dir = Some(dir.to_string_lossy().into_owned());
        assert!(config.is_rhd(), "missing param keeps config value");
        fs::write(dir.join(IS_RHD_PARAM), "0").unwrap();
        assert!(!config.is_rhd());
        fs::remove_dir_all(&dir).unwrap();
    }
}
