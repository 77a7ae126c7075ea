//! Runtime configuration.
//!
//! Loaded once per invocation from `<home>/config.toml` (or `--config FILE`),
//! then overridden by environment and CLI flags, and passed explicitly into
//! the pipeline and the execution bridge.

use crate::core::error::AndroshError;
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "ANDROSH_HOME";
pub const BASE_DIR_ENV: &str = "ANDROSH_BASE_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Subdirectory of `downloads_dir` holding one launch-script directory per instance.
pub const SCRIPTS_DIR_NAME: &str = "instances";

/// How the privileged shell loader is invoked.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interpreter that hosts the loader class.
    pub loader: PathBuf,
    /// Fixed binary directory argument passed to the interpreter.
    pub loader_dir: String,
    pub nice_name: String,
    pub loader_class: String,
    /// Helper archive shipped in the assets directory and staged into `staging_dir`.
    pub dex_name: String,
    pub staging_dir: PathBuf,
    /// Value of `RISH_APPLICATION_ID`.
    pub app_id: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            loader: PathBuf::from("/system/bin/app_process"),
            loader_dir: "/system/bin".to_string(),
            nice_name: "rish".to_string(),
            loader_class: "rikka.shizuku.shell.ShizukuShellLoader".to_string(),
            dex_name: "rish_shizuku.dex".to_string(),
            staging_dir: std::env::temp_dir(),
            app_id: "com.termux".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub home: PathBuf,
    /// Parent directory of every instance root.
    pub base_dir: PathBuf,
    /// Where archives, helper binaries and rendered launch scripts are kept.
    pub downloads_dir: PathBuf,
    pub assets_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub mirror: String,
    pub helpers_url: String,
    pub manifest_flavor: String,
    pub distro_dir: String,
    pub archive_name: String,
    pub loader_name: String,
    pub lib_name: String,
    pub script_name: String,
    pub default_name: String,
    pub max_download_attempts: u32,
    /// Overrides the host machine identifier used for architecture resolution.
    pub machine: Option<String>,
    pub bridge: BridgeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".androsh"),
            base_dir: PathBuf::from("/data/local/tmp/AndroSH"),
            downloads_dir: PathBuf::from("/sdcard/Download/AndroSH"),
            assets_dir: None,
            db_path: None,
            mirror: "http://dl-cdn.alpinelinux.org".to_string(),
            helpers_url: "https://raw.githubusercontent.com/Xed-Editor/Karbon-PackagesX/main"
                .to_string(),
            manifest_flavor: "alpine-minirootfs".to_string(),
            distro_dir: "Alpine".to_string(),
            archive_name: "alpine.tar.gz".to_string(),
            loader_name: "proot".to_string(),
            lib_name: "libtalloc.so.2".to_string(),
            script_name: "proot.sh".to_string(),
            default_name: "alpine".to_string(),
            max_download_attempts: 3,
            machine: None,
            bridge: BridgeConfig::default(),
        }
    }
}

/// `ANDROSH_HOME`, else `$HOME/.androsh`.
pub fn home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|h| !h.is_empty()) {
        return PathBuf::from(home);
    }
    std::env::var_os("HOME")
        .map(|h| PathBuf::from(h).join(".androsh"))
        .unwrap_or_else(|| PathBuf::from(".androsh"))
}

impl Config {
    /// Load `explicit` if given (it must exist), else `<home>/config.toml` when
    /// present, else defaults. Applies `ANDROSH_BASE_DIR` afterwards.
    pub fn load(home: &Path, explicit: Option<&Path>) -> Result<Self, AndroshError> {
        let candidate = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(AndroshError::Configuration(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => Some(home.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };

        let mut config = match candidate {
            Some(path) => {
                let content = fs::read_to_string(&path)?;
                let parsed: Config = toml::from_str(&content)?;
                tracing::debug!(path = %path.display(), "loaded config");
                parsed
            }
            None => Config::default(),
        };
        config.home = home.to_path_buf();

        if let Some(base) = std::env::var_os(BASE_DIR_ENV).filter(|b| !b.is_empty()) {
            config.base_dir = PathBuf::from(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AndroshError> {
        if self.max_download_attempts == 0 {
            return Err(AndroshError::Configuration(
                "max_download_attempts must be at least 1".to_string(),
            ));
        }
        if !self.base_dir.is_absolute() {
            return Err(AndroshError::Configuration(format!(
                "base_dir must be absolute: {}",
                self.base_dir.display()
            )));
        }
        if self.distro_dir.is_empty() || self.distro_dir.contains('/') {
            return Err(AndroshError::Configuration(format!(
                "invalid distro_dir: {:?}",
                self.distro_dir
            )));
        }
        Ok(())
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir
            .clone()
            .unwrap_or_else(|| self.home.join("assets"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.home.join(schemas::REGISTRY_DB_NAME))
    }

    /// Registry key and root directory of the instance called `name`.
    pub fn instance_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    pub fn distro_path(&self, instance: &Path, distro: &str) -> PathBuf {
        instance.join(distro)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.downloads_dir.join(&self.archive_name)
    }

    pub fn helper_paths(&self) -> [PathBuf; 2] {
        [
            self.downloads_dir.join(&self.loader_name),
            self.downloads_dir.join(&self.lib_name),
        ]
    }

    pub fn template_path(&self) -> PathBuf {
        self.assets_dir().join(&self.script_name)
    }

    /// Rendered launch script, kept apart from the downloaded artifacts.
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.downloads_dir
            .join(SCRIPTS_DIR_NAME)
            .join(name)
            .join(&self.script_name)
    }
}
