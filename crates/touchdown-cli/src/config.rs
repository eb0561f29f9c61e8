//! Reads/writes `~/.touchdown/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use touchdown_runtime::{FrameConfig, SimConfig, Strategy};
use touchdown_types::{DetectorConfig, TouchdownError};

/// Persisted settings.  Every section may be omitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub frames: FrameConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

/// `~/.touchdown/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".touchdown").join("config.toml")
}

/// Parse the file at `path`.  `Ok(None)` if it does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, TouchdownError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        TouchdownError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        TouchdownError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply `TOUCHDOWN_*` environment overrides.  Unparseable values are
/// logged and ignored.
///
/// | Variable | Field |
/// |---|---|
/// | `TOUCHDOWN_STRATEGY` | `strategy` |
/// | `TOUCHDOWN_WINDOW_SIZE` | `detector.window_size` |
/// | `TOUCHDOWN_SKIP_SAMPLES` | `detector.skip_samples` |
/// | `TOUCHDOWN_DIRECTION_TOLERANCE` | `detector.direction_tolerance` |
/// | `TOUCHDOWN_LOOKUP_TIMEOUT_MS` | `frames.lookup_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_parsed("TOUCHDOWN_STRATEGY") {
        cfg.strategy = v;
    }
    if let Some(v) = env_parsed("TOUCHDOWN_WINDOW_SIZE") {
        cfg.detector.window_size = v;
    }
    if let Some(v) = env_parsed("TOUCHDOWN_SKIP_SAMPLES") {
        cfg.detector.skip_samples = v;
    }
    if let Some(v) = env_parsed::<f64>("TOUCHDOWN_DIRECTION_TOLERANCE") {
        if (-1.0..=1.0).contains(&v) {
            cfg.detector.direction_tolerance = v;
        } else {
            warn!(value = v, "TOUCHDOWN_DIRECTION_TOLERANCE outside [-1, 1], ignored");
        }
    }
    if let Some(v) = env_parsed("TOUCHDOWN_LOOKUP_TIMEOUT_MS") {
        cfg.frames.lookup_timeout_ms = v;
    }
}

fn env_parsed<T>(var: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(var, value = %raw, error = %e, "ignoring invalid environment override");
            None
        }
    }
}

/// Write `cfg` to `path`, creating the parent directory if needed.  On Unix
/// the file is owner-only, and so is the directory when this call created it.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), TouchdownError> {
    prepare_parent(path)?;
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TouchdownError::Config(format!("failed to serialize config: {e}")))?;
    let write_err = |e: std::io::Error| {
        TouchdownError::Config(format!("failed to write {}: {e}", path.display()))
    };

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

/// Create the directory `path` lives in.  Existing directories, including
/// the working directory of a bare file name, are left untouched.
fn prepare_parent(path: &Path) -> Result<(), TouchdownError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|e| {
        TouchdownError::Config(format!("failed to create {}: {e}", parent.display()))
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
            TouchdownError::Config(format!("failed to restrict {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_to_touchdown_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.touchdown/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.strategy, Strategy::Pull);
        assert_eq!(loaded.detector.window_size, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "strategy = \"push\"\n\n[detector]\nwindow_size = 8\n\n\
             [frames]\ntip_frame = \"r_scoop_tip\"\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.strategy, Strategy::Push);
        assert_eq!(cfg.detector.window_size, 8);
        assert_eq!(cfg.detector.skip_samples, 5);
        assert_eq!(cfg.frames.tip_frame, "r_scoop_tip");
        assert_eq!(cfg.frames.reference_frame, "base_link");
        assert_eq!(cfg.sim, SimConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "strategy = \"sideways\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(TouchdownError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn bare_file_name_has_no_parent_to_prepare() {
        assert!(prepare_parent(Path::new("touchdown.toml")).is_ok());
    }

    #[test]
    fn save_into_nested_missing_dirs() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("a").join("b").join("touchdown.toml");
        save_to(&Config::default(), &path).expect("save");
        assert!(load_from(&path).expect("load ok").is_some());
    }

    #[cfg(unix)]
    #[test]
    fn save_leaves_existing_dir_permissions_alone() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

        let path = dir.path().join("touchdown.toml");
        save_to(&Config::default(), &path).expect("save");

        let dir_mode = fs::metadata(dir.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o755);
        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
    }

    #[test]
    fn env_override_strategy() {
        // SAFETY: each env test uses its own variable.
        unsafe { std::env::set_var("TOUCHDOWN_STRATEGY", "push") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.strategy, Strategy::Push);
        unsafe { std::env::remove_var("TOUCHDOWN_STRATEGY") };
    }

    #[test]
    fn env_override_window_size() {
        unsafe { std::env::set_var("TOUCHDOWN_WINDOW_SIZE", "12") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.detector.window_size, 12);
        unsafe { std::env::remove_var("TOUCHDOWN_WINDOW_SIZE") };
    }

    #[test]
    fn env_override_skip_samples_ignores_garbage() {
        unsafe { std::env::set_var("TOUCHDOWN_SKIP_SAMPLES", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.detector.skip_samples, 5);
        unsafe { std::env::remove_var("TOUCHDOWN_SKIP_SAMPLES") };
    }

    #[test]
    fn env_override_tolerance_must_be_a_cosine() {
        unsafe { std::env::set_var("TOUCHDOWN_DIRECTION_TOLERANCE", "1.5") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.detector.direction_tolerance - 0.95).abs() < 1e-12);

        unsafe { std::env::set_var("TOUCHDOWN_DIRECTION_TOLERANCE", "0.9") };
        apply_env_overrides(&mut cfg);
        assert!((cfg.detector.direction_tolerance - 0.9).abs() < 1e-12);
        unsafe { std::env::remove_var("TOUCHDOWN_DIRECTION_TOLERANCE") };
    }

    #[test]
    fn env_override_lookup_timeout() {
        unsafe { std::env::set_var("TOUCHDOWN_LOOKUP_TIMEOUT_MS", "250") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frames.lookup_timeout_ms, 250);
        unsafe { std::env::remove_var("TOUCHDOWN_LOOKUP_TIMEOUT_MS") };
    }
}
