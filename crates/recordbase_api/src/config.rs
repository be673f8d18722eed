//! Command line and environment configuration.

use clap::Parser;
use recordbase_core::default_log_level;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:5780";

#[derive(Debug, Clone, Parser)]
#[command(name = "recordbase", version, about = "Schema-driven records service")]
pub struct Config {
    /// SQLite database file.
    #[arg(long, env = "RECORDBASE_DB_PATH", default_value = "recordbase.db")]
    pub db_path: PathBuf,

    /// Root directory for uploaded images and documents.
    #[arg(long, env = "RECORDBASE_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    #[arg(long, env = "RECORDBASE_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// One of trace, debug, info, warn, error. Defaults by build profile.
    #[arg(long, env = "RECORDBASE_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "RECORDBASE_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Seconds a permission decision stays cached.
    #[arg(long, env = "RECORDBASE_PERMISSION_CACHE_TTL_SECS", default_value_t = 60)]
    pub permission_cache_ttl_secs: u64,
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }

    pub fn permission_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_cache_ttl_secs)
    }

    /// Resolves `path` against `base` when relative.
    pub fn absolute(base: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_BIND};
    use clap::Parser;
    use recordbase_core::default_log_level;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    #[test]
    fn defaults_apply_without_arguments() {
        let config = Config::try_parse_from(["recordbase"]).unwrap();
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.permission_ttl(), Duration::from_secs(60));
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.log_level(), default_log_level());
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "recordbase",
            "--bind",
            "0.0.0.0:8080",
            "--permission-cache-ttl-secs",
            "5",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.permission_ttl(), Duration::from_secs(5));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/recordbase");
        assert_eq!(
            Config::absolute(base, Path::new("logs")),
            PathBuf::from("/srv/recordbase/logs")
        );
        assert_eq!(
            Config::absolute(base, Path::new("/var/log/rb")),
            PathBuf::from("/var/log/rb")
        );
    }
}
