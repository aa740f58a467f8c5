use anyhow::{Context, Result, anyhow};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::dirs::{system_config_file, user_krait_config_dir};

/// Environment variable selecting the runtime companion behaviour for the
/// lazy-failure facility. The discovery engine only cares about `TRACKING`,
/// which enables the subprocess driver paths.
pub const MODE_ENV_VAR: &str = "IMPORT_TRACKER_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMode {
    Lazy,
    Proactive,
    Tracking,
    BestEffort,
}

impl TrackerMode {
    /// Read the mode from the environment; unset or unrecognised values fall
    /// back to `BEST_EFFORT`.
    pub fn from_env() -> Self {
        match env::var(MODE_ENV_VAR).as_deref() {
            Ok("LAZY") => Self::Lazy,
            Ok("PROACTIVE") => Self::Proactive,
            Ok("TRACKING") => Self::Tracking,
            _ => Self::BestEffort,
        }
    }
}

/// Merge two layered values, with `self` taking precedence over `other`.
pub trait Combine {
    fn combine(self, other: Self) -> Self;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source directories to scan for modules of the tracked library
    pub src: Vec<PathBuf>,

    /// Known first-party module names
    pub known_first_party: IndexSet<String>,

    /// Known third-party module names
    pub known_third_party: IndexSet<String>,

    /// Explicit site-packages directories holding installed distributions.
    /// `VIRTUAL_ENV` and common venv directory names are probed in addition.
    pub site_packages: Vec<PathBuf>,

    /// Target Python version for standard library checks, Ruff-style:
    /// "py38" through "py313". Defaults to "py310".
    #[serde(rename = "target-version")]
    pub target_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: vec![PathBuf::from("src"), PathBuf::from(".")],
            known_first_party: IndexSet::new(),
            known_third_party: IndexSet::new(),
            site_packages: Vec::new(),
            target_version: "py310".to_owned(),
        }
    }
}

impl Combine for Config {
    fn combine(self, other: Self) -> Self {
        Self {
            src: if self.src != Self::default().src {
                self.src
            } else {
                other.src
            },
            known_first_party: if self.known_first_party.is_empty() {
                other.known_first_party
            } else {
                self.known_first_party
            },
            known_third_party: if self.known_third_party.is_empty() {
                other.known_third_party
            } else {
                self.known_third_party
            },
            site_packages: if self.site_packages.is_empty() {
                other.site_packages
            } else {
                self.site_packages
            },
            target_version: self.target_version,
        }
    }
}

/// Configuration overrides from `KRAIT_`-prefixed environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub src: Option<Vec<PathBuf>>,
    pub known_first_party: Option<IndexSet<String>>,
    pub known_third_party: Option<IndexSet<String>>,
    pub site_packages: Option<Vec<PathBuf>>,
    pub target_version: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(paths) = env_path_list("KRAIT_SRC") {
            config.src = Some(paths);
        }
        if let Some(modules) = env_name_set("KRAIT_KNOWN_FIRST_PARTY") {
            config.known_first_party = Some(modules);
        }
        if let Some(modules) = env_name_set("KRAIT_KNOWN_THIRD_PARTY") {
            config.known_third_party = Some(modules);
        }
        if let Some(paths) = env_path_list("KRAIT_SITE_PACKAGES") {
            config.site_packages = Some(paths);
        }
        if let Ok(target_version) = env::var("KRAIT_TARGET_VERSION") {
            config.target_version = Some(target_version);
        }

        config
    }

    pub fn apply_to(self, mut config: Config) -> Config {
        if let Some(src) = self.src {
            config.src = src;
        }
        if let Some(known_first_party) = self.known_first_party {
            config.known_first_party = known_first_party;
        }
        if let Some(known_third_party) = self.known_third_party {
            config.known_third_party = known_third_party;
        }
        if let Some(site_packages) = self.site_packages {
            config.site_packages = site_packages;
        }
        if let Some(target_version) = self.target_version {
            config.target_version = target_version;
        }
        config
    }
}

fn env_path_list(var: &str) -> Option<Vec<PathBuf>> {
    let value = env::var(var).ok()?;
    let paths: Vec<PathBuf> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    (!paths.is_empty()).then_some(paths)
}

fn env_name_set(var: &str) -> Option<IndexSet<String>> {
    let value = env::var(var).ok()?;
    let names: IndexSet<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    (!names.is_empty()).then_some(names)
}

impl Config {
    /// Parse a Ruff-style target version string to a minor version number.
    pub fn parse_target_version(version_str: &str) -> Result<u8> {
        match version_str {
            "py38" => Ok(8),
            "py39" => Ok(9),
            "py310" => Ok(10),
            "py311" => Ok(11),
            "py312" => Ok(12),
            "py313" => Ok(13),
            _ => Err(anyhow!(
                "Invalid target version '{}'. Supported versions: py38, py39, py310, py311, py312, py313",
                version_str
            )),
        }
    }

    pub fn python_version(&self) -> Result<u8> {
        Self::parse_target_version(&self.target_version)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.python_version().with_context(|| {
            format!(
                "Invalid target-version in config file: {}",
                config.target_version
            )
        })?;

        Ok(config)
    }

    fn try_load_and_combine<P: AsRef<Path>>(
        config: &mut Self,
        path: P,
        context: &str,
    ) -> Result<()> {
        if path.as_ref().exists() {
            log::debug!("Loading {} from: {:?}", context, path.as_ref());
            let loaded = Self::load_from_file(&path)
                .with_context(|| format!("Failed to load {} from {:?}", context, path.as_ref()))?;
            *config = loaded.combine(config.clone());
        }
        Ok(())
    }

    /// Load configuration with hierarchical precedence:
    /// 1. CLI-provided config path (highest precedence)
    /// 2. Environment variables (`KRAIT_*`)
    /// 3. Project config (krait.toml in current directory)
    /// 4. User config (~/.config/krait/krait.toml)
    /// 5. System config (/etc/krait/krait.toml or equivalent)
    /// 6. Default values (lowest precedence)
    pub fn load(cli_config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_config_path) = system_config_file() {
            Self::try_load_and_combine(&mut config, &system_config_path, "system config")?;
        }

        if let Some(user_config_dir) = user_krait_config_dir() {
            let user_config_path = user_config_dir.join("krait.toml");
            Self::try_load_and_combine(&mut config, &user_config_path, "user config")?;
        }

        let project_config_path = PathBuf::from("krait.toml");
        Self::try_load_and_combine(&mut config, &project_config_path, "project config")?;

        let env_config = EnvConfig::from_env();
        config = env_config.apply_to(config);

        if let Some(cli_config_path) = cli_config_path {
            Self::try_load_and_combine(&mut config, cli_config_path, "CLI config")?;
        }

        config.python_version().with_context(|| {
            format!(
                "Invalid target-version in final config: {}",
                config.target_version
            )
        })?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::EnvVarGuard;

    #[test]
    fn test_parse_target_version() {
        assert_eq!(Config::parse_target_version("py38").unwrap(), 8);
        assert_eq!(Config::parse_target_version("py313").unwrap(), 13);
        assert!(Config::parse_target_version("py37").is_err());
    }

    #[test]
    fn test_combine_prefers_explicit_values() {
        let explicit = Config {
            src: vec![PathBuf::from("lib")],
            ..Config::default()
        };
        let other = Config {
            src: vec![PathBuf::from("other")],
            known_third_party: ["yaml".to_owned()].into_iter().collect(),
            ..Config::default()
        };
        let combined = explicit.combine(other);
        assert_eq!(combined.src, vec![PathBuf::from("lib")]);
        assert!(combined.known_third_party.contains("yaml"));
    }

    #[test]
    #[serial_test::serial]
    fn test_tracker_mode_from_env() {
        let _guard = EnvVarGuard::set(MODE_ENV_VAR, "TRACKING");
        assert_eq!(TrackerMode::from_env(), TrackerMode::Tracking);
        drop(_guard);

        let _guard = EnvVarGuard::unset(MODE_ENV_VAR);
        assert_eq!(TrackerMode::from_env(), TrackerMode::BestEffort);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_config_overrides() {
        let _src = EnvVarGuard::set("KRAIT_SRC", "a, b,");
        let _third = EnvVarGuard::set("KRAIT_KNOWN_THIRD_PARTY", "alog,yaml");
        let env_config = EnvConfig::from_env();
        let config = env_config.apply_to(Config::default());
        assert_eq!(config.src, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(config.known_third_party.contains("alog"));
    }
}
