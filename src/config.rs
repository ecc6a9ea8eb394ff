//! Configuration file handling for nestcap.
//!
//! Loads capture settings from a YAML config file (`./nestcap.conf` by
//! default) and merges them with command-line overrides. JSON config files
//! also load, since JSON is valid YAML.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file path when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./nestcap.conf";

/// Environment variable consulted for the account user when neither the CLI
/// nor the config file provides one.
pub const USER_ENV: &str = "NESTCAP_USER";

/// Environment variable consulted for the account password.
pub const PASSWD_ENV: &str = "NESTCAP_PASSWD";

/// Default seconds to sleep between capture rounds.
pub const DEFAULT_DELAY_SECS: u64 = 600;

/// Default number of rounds to run (0 = run until killed).
pub const DEFAULT_NUM_FRAMES: u64 = 0;

/// Default number of frames retained per camera.
pub const DEFAULT_MAX_FRAMES: u64 = 10;

/// Default base directory for captured frames.
pub const DEFAULT_OUT_PATH: &str = "/tmp/imgs";

/// Raw config file contents. Every field is optional; merging against CLI
/// flags and built-in defaults happens in [`Config::resolve`].
///
/// Field names match the original tool's camelCase keys (`numFrames`,
/// `maxFrames`, `outPath`). Unknown keys are ignored.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub delay: Option<i64>,
    pub num_frames: Option<i64>,
    pub max_frames: Option<i64>,
    pub out_path: Option<String>,
    pub user: Option<String>,
    pub passwd: Option<String>,
    pub cameras: Option<BTreeMap<String, String>>,
}

impl FileConfig {
    /// Load a config file from an explicit path.
    /// The file must exist and parse; both failures are fatal to the caller.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: FileConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(config)
    }

    /// Load from an explicit path, or from `./nestcap.conf` when none is
    /// given. A missing default file yields an empty config; whether that is
    /// an error depends on which required fields the CLI and environment end
    /// up supplying, so the decision is left to [`Config::resolve`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(FileConfig::default())
                }
            }
        }
    }
}

/// Command-line values that override the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub delay: Option<u64>,
    pub num_frames: Option<u64>,
    pub max_frames: Option<u64>,
    pub out_path: Option<PathBuf>,
    pub user: Option<String>,
    pub passwd: Option<String>,
}

/// Fully resolved, validated capture configuration. Immutable after
/// construction; built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sleep between capture rounds.
    pub delay: Duration,
    /// Rounds to run before exiting; 0 means run until killed.
    pub num_frames: u64,
    /// Frames retained per camera before eviction kicks in.
    pub max_frames: usize,
    /// Base directory for frame files.
    pub out_path: PathBuf,
    pub user: String,
    pub passwd: String,
    /// Logical camera name -> vendor uuid. Iteration order is the map's
    /// sorted order, which fixes the per-round capture order.
    pub cameras: BTreeMap<String, String>,
}

/// One camera chosen for this run: the configured logical name and the
/// vendor uuid it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSelection {
    pub name: String,
    pub uuid: String,
}

impl Config {
    /// Merge CLI overrides, file values, and built-in defaults into a
    /// validated config. Precedence: CLI > file > default.
    ///
    /// Numeric file values must be non-negative, `outPath` must be non-empty,
    /// and credentials plus a non-empty camera mapping must come from
    /// somewhere. All violations are [`ConfigError`]s, raised before any
    /// network activity.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self, ConfigError> {
        let delay = match overrides.delay {
            Some(v) => v,
            None => nonnegative("delay", file.delay)?.unwrap_or(DEFAULT_DELAY_SECS),
        };
        let num_frames = match overrides.num_frames {
            Some(v) => v,
            None => nonnegative("numFrames", file.num_frames)?.unwrap_or(DEFAULT_NUM_FRAMES),
        };
        let max_frames = match overrides.max_frames {
            Some(v) => v,
            None => nonnegative("maxFrames", file.max_frames)?.unwrap_or(DEFAULT_MAX_FRAMES),
        };

        let out_path = overrides
            .out_path
            .or_else(|| file.out_path.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_PATH));
        if out_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutPath);
        }

        let user = overrides
            .user
            .or(file.user)
            .ok_or(ConfigError::Missing { field: "user" })?;
        let passwd = overrides
            .passwd
            .or(file.passwd)
            .ok_or(ConfigError::Missing { field: "passwd" })?;

        let cameras = file.cameras.unwrap_or_default();
        if cameras.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        Ok(Config {
            delay: Duration::from_secs(delay),
            num_frames,
            max_frames: max_frames as usize,
            out_path,
            user,
            passwd,
            cameras,
        })
    }

    /// Resolve the camera set for a run: the named subset in the order given,
    /// or every configured camera in map order when `names` is `None`.
    /// Fails on the first name with no configured mapping.
    pub fn select_cameras(
        &self,
        names: Option<&[String]>,
    ) -> Result<Vec<CameraSelection>, ConfigError> {
        match names {
            Some(requested) => {
                let mut selected = Vec::with_capacity(requested.len());
                for name in requested {
                    let uuid = self
                        .cameras
                        .get(name)
                        .ok_or_else(|| ConfigError::UnknownCamera(name.clone()))?;
                    selected.push(CameraSelection {
                        name: name.clone(),
                        uuid: uuid.clone(),
                    });
                }
                Ok(selected)
            }
            None => Ok(self
                .cameras
                .iter()
                .map(|(name, uuid)| CameraSelection {
                    name: name.clone(),
                    uuid: uuid.clone(),
                })
                .collect()),
        }
    }
}

/// Validate an optional file value as non-negative, converting to u64.
fn nonnegative(field: &'static str, value: Option<i64>) -> Result<Option<u64>, ConfigError> {
    match value {
        Some(v) if v < 0 => Err(ConfigError::Negative { field, value: v }),
        Some(v) => Ok(Some(v as u64)),
        None => Ok(None),
    }
}

/// Errors raised while loading, merging, or validating configuration.
/// All of them are fatal: the process reports the message and exits before
/// any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file '{path}' does not exist")]
    NotFound { path: PathBuf },

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("missing required option '{field}'")]
    Missing { field: &'static str },

    #[error("outPath must not be empty")]
    EmptyOutPath,

    #[error("no cameras configured")]
    NoCameras,

    #[error("unrecognized camera '{0}'")]
    UnknownCamera(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_with_required() -> FileConfig {
        FileConfig {
            user: Some("alice@example.com".to_string()),
            passwd: Some("hunter2".to_string()),
            cameras: Some(BTreeMap::from([(
                "porch".to_string(),
                "uuid-porch".to_string(),
            )])),
            ..FileConfig::default()
        }
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = "\
delay: 30
numFrames: 5
maxFrames: 20
outPath: /var/frames
user: alice@example.com
passwd: hunter2
cameras:
  porch: uuid-porch
  garage: uuid-garage
";
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.delay, Some(30));
        assert_eq!(file.num_frames, Some(5));
        assert_eq!(file.max_frames, Some(20));
        assert_eq!(file.out_path.as_deref(), Some("/var/frames"));
        assert_eq!(file.cameras.as_ref().unwrap().len(), 2);
        assert_eq!(
            file.cameras.unwrap().get("garage"),
            Some(&"uuid-garage".to_string())
        );
    }

    #[test]
    fn test_parse_json_config() {
        // JSON is valid YAML, so JSON config files load through the same path.
        let json = r#"{"delay": 60, "user": "bob", "cameras": {"door": "uuid-door"}}"#;
        let file: FileConfig = serde_yaml::from_str(json).unwrap();
        assert_eq!(file.delay, Some(60));
        assert_eq!(file.user.as_deref(), Some("bob"));
        assert_eq!(
            file.cameras.unwrap().get("door"),
            Some(&"uuid-door".to_string())
        );
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let yaml = "delay: 10\nfrobnicate: true\nwidth: 1280\n";
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.delay, Some(10));
    }

    #[test]
    fn test_load_missing_explicit_path_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.conf");
        let result = FileConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_load_unparseable_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.conf");
        std::fs::write(&path, "cameras: [not, a, mapping\n").unwrap();
        let result = FileConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nestcap.conf");
        std::fs::write(&path, "delay: 42\nuser: carol\n").unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.delay, Some(42));
        assert_eq!(file.user.as_deref(), Some("carol"));
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let config = Config::resolve(file_with_required(), Overrides::default()).unwrap();
        assert_eq!(config.delay, Duration::from_secs(DEFAULT_DELAY_SECS));
        assert_eq!(config.num_frames, DEFAULT_NUM_FRAMES);
        assert_eq!(config.max_frames, DEFAULT_MAX_FRAMES as usize);
        assert_eq!(config.out_path, PathBuf::from(DEFAULT_OUT_PATH));
    }

    #[test]
    fn test_resolve_cli_overrides_file() {
        let mut file = file_with_required();
        file.delay = Some(30);
        file.out_path = Some("/from/file".to_string());
        let overrides = Overrides {
            delay: Some(5),
            out_path: Some(PathBuf::from("/from/cli")),
            ..Overrides::default()
        };
        let config = Config::resolve(file, overrides).unwrap();
        assert_eq!(config.delay, Duration::from_secs(5));
        assert_eq!(config.out_path, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_resolve_file_overrides_default() {
        let mut file = file_with_required();
        file.max_frames = Some(3);
        let config = Config::resolve(file, Overrides::default()).unwrap();
        assert_eq!(config.max_frames, 3);
    }

    #[test]
    fn test_resolve_rejects_negative_values() {
        let mut file = file_with_required();
        file.delay = Some(-5);
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Negative {
                field: "delay",
                value: -5
            }
        ));

        let mut file = file_with_required();
        file.num_frames = Some(-1);
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Negative { field: "numFrames", .. }));

        let mut file = file_with_required();
        file.max_frames = Some(-10);
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Negative { field: "maxFrames", .. }));
    }

    #[test]
    fn test_resolve_rejects_empty_out_path() {
        let mut file = file_with_required();
        file.out_path = Some(String::new());
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyOutPath));
    }

    #[test]
    fn test_resolve_requires_credentials() {
        let mut file = file_with_required();
        file.user = None;
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "user" }));

        let mut file = file_with_required();
        file.passwd = None;
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "passwd" }));
    }

    #[test]
    fn test_resolve_credentials_from_overrides() {
        let mut file = file_with_required();
        file.user = None;
        file.passwd = None;
        let overrides = Overrides {
            user: Some("env-user".to_string()),
            passwd: Some("env-pass".to_string()),
            ..Overrides::default()
        };
        let config = Config::resolve(file, overrides).unwrap();
        assert_eq!(config.user, "env-user");
        assert_eq!(config.passwd, "env-pass");
    }

    #[test]
    fn test_resolve_requires_cameras() {
        let mut file = file_with_required();
        file.cameras = None;
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoCameras));

        let mut file = file_with_required();
        file.cameras = Some(BTreeMap::new());
        let err = Config::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoCameras));
    }

    fn config_with_cameras(pairs: &[(&str, &str)]) -> Config {
        let mut file = file_with_required();
        file.cameras = Some(
            pairs
                .iter()
                .map(|(n, u)| (n.to_string(), u.to_string()))
                .collect(),
        );
        Config::resolve(file, Overrides::default()).unwrap()
    }

    #[test]
    fn test_select_all_cameras_in_map_order() {
        let config = config_with_cameras(&[("porch", "u1"), ("garage", "u2"), ("attic", "u3")]);
        let selected = config.select_cameras(None).unwrap();
        // BTreeMap iterates name-sorted, which fixes the round order.
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["attic", "garage", "porch"]);
    }

    #[test]
    fn test_select_subset_keeps_requested_order() {
        let config = config_with_cameras(&[("porch", "u1"), ("garage", "u2")]);
        let names = vec!["porch".to_string(), "garage".to_string()];
        let selected = config.select_cameras(Some(&names)).unwrap();
        assert_eq!(
            selected,
            vec![
                CameraSelection {
                    name: "porch".to_string(),
                    uuid: "u1".to_string()
                },
                CameraSelection {
                    name: "garage".to_string(),
                    uuid: "u2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_select_fails_on_first_unknown_name() {
        let config = config_with_cameras(&[("porch", "u1")]);
        let names = vec![
            "porch".to_string(),
            "basement".to_string(),
            "also-bogus".to_string(),
        ];
        let err = config.select_cameras(Some(&names)).unwrap_err();
        match err {
            ConfigError::UnknownCamera(name) => assert_eq!(name, "basement"),
            other => panic!("expected UnknownCamera, got {:?}", other),
        }
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::Negative {
                field: "delay",
                value: -3
            }
            .to_string(),
            "delay must be non-negative, got -3"
        );
        assert_eq!(
            ConfigError::UnknownCamera("attic".to_string()).to_string(),
            "unrecognized camera 'attic'"
        );
        assert_eq!(ConfigError::NoCameras.to_string(), "no cameras configured");
    }
}
