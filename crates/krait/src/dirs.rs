use std::{
    env,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;

const CONFIG_DIR: &str = "krait";
const CONFIG_FILE: &str = "krait.toml";

/// Platform user configuration directory (`XDG_CONFIG_HOME`/`~/.config` on
/// Unix, `AppData\Roaming` on Windows).
pub fn user_config_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|dirs| dirs.config_dir())
}

pub fn user_krait_config_dir() -> Option<PathBuf> {
    user_config_dir().map(|mut path| {
        path.push(CONFIG_DIR);
        path
    })
}

#[cfg(not(windows))]
fn locate_system_config_xdg(value: Option<&str>) -> Option<PathBuf> {
    let config_dirs = value.filter(|s| !s.is_empty()).unwrap_or("/etc/xdg");
    for dir in config_dirs.split(':').take_while(|s| !s.is_empty()) {
        let candidate = Path::new(dir).join(CONFIG_DIR).join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(windows)]
fn locate_system_config_windows(system_drive: impl AsRef<Path>) -> Option<PathBuf> {
    let candidate = system_drive
        .as_ref()
        .join("ProgramData")
        .join(CONFIG_DIR)
        .join(CONFIG_FILE);
    candidate.as_path().is_file().then_some(candidate)
}

/// Path to the system configuration file, if one exists.
pub fn system_config_file() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        env::var("SYSTEMDRIVE")
            .ok()
            .and_then(|drive| locate_system_config_windows(PathBuf::from(drive)))
    }

    #[cfg(not(windows))]
    {
        let xdg_config_dirs = env::var("XDG_CONFIG_DIRS").ok();
        if let Some(path) = locate_system_config_xdg(xdg_config_dirs.as_deref()) {
            return Some(path);
        }
        let candidate = Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE);
        match candidate.try_exists() {
            Ok(true) => Some(candidate),
            Ok(false) => None,
            Err(err) => {
                log::warn!("Failed to query system configuration file: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(not(windows))]
    use super::locate_system_config_xdg;
    use super::{CONFIG_DIR, CONFIG_FILE};

    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[cfg(not(windows))]
    fn test_locate_system_config_xdg() -> anyhow::Result<()> {
        let context = TempDir::new()?;
        let config_dir = context.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir)?;
        fs::write(config_dir.join(CONFIG_FILE), "src = [\"src\"]")?;

        assert_eq!(locate_system_config_xdg(None), None);
        assert_eq!(locate_system_config_xdg(Some("")), None);
        assert_eq!(
            locate_system_config_xdg(Some(
                context.path().to_str().expect("path should be valid UTF-8")
            ))
            .expect("config should be found"),
            config_dir.join(CONFIG_FILE)
        );
        Ok(())
    }
}
