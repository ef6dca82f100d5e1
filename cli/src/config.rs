use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Read an override from the environment. Set-but-empty is rejected.
fn env_override(name: &str) -> Result<Option<PathBuf>> {
    path_override(name, std::env::var_os(name))
}

fn path_override(name: &str, value: Option<OsString>) -> Result<Option<PathBuf>> {
    match value {
        None => Ok(None),
        Some(value) if value.is_empty() => bail!("{name} is set but empty"),
        Some(value) => Ok(Some(PathBuf::from(value))),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match env_override("PHINPT_DATA_DIR")? {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "phinpt")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = env_override("PHINPT_DB")?.unwrap_or_else(|| data_dir.join("phinpt.db"));

        Ok(Config { db_path, data_dir })
    }

    /// Where the CLI keeps the signed-in user between invocations.
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_override_unset() {
        assert!(path_override("PHINPT_DB", None).unwrap().is_none());
    }

    #[test]
    fn test_path_override_empty_is_error() {
        let err = path_override("PHINPT_DATA_DIR", Some(OsString::new())).unwrap_err();
        assert_eq!(err.to_string(), "PHINPT_DATA_DIR is set but empty");
    }

    #[test]
    fn test_path_override_set() {
        let path = path_override("PHINPT_DB", Some(OsString::from("/srv/phinpt/site.db"))).unwrap();
        assert_eq!(path, Some(PathBuf::from("/srv/phinpt/site.db")));
    }

    #[test]
    fn test_session_path_in_data_dir() {
        let config = Config {
            db_path: PathBuf::from("/data/phinpt.db"),
            data_dir: PathBuf::from("/data"),
        };
        assert_eq!(config.session_path(), PathBuf::from("/data/session.json"));
    }
}
