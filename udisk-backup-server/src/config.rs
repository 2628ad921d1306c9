use std::path::PathBuf;
use udisk_backup::Config;

/// Settings read from the process environment (and `.env`)
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            config_path: std::env::var_os("UDISK_BACKUP_CONFIG").map(PathBuf::from),
            port: std::env::var("PORT").ok().and_then(|v| v.parse().ok()),
            log_level: std::env::var("LOG_LEVEL").ok(),
        }
    }
}

/// Command-line overrides; they win over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub core: Config,
}

impl AppConfig {
    /// Merge CLI flags, environment and the TOML file, in that order.
    pub fn resolve(cli: CliOverrides, env: EnvConfig) -> anyhow::Result<Self> {
        let core = match cli.config_path.or(env.config_path) {
            Some(path) => Config::from_file(&path)?,
            None => Config::default(),
        };

        Ok(Self {
            port: cli.port.or(env.port).unwrap_or(core.server.port),
            log_level: cli
                .log_level
                .or(env.log_level)
                .unwrap_or_else(|| core.log.level.clone()),
            core,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::resolve(CliOverrides::default(), EnvConfig::default()).unwrap();
        assert_eq!(config.port, 5080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.core.backup.marker_label, "USB_BACKUP");
    }

    #[test]
    fn test_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udisk-backup.toml");
        std::fs::write(&path, "[server]\nport = 7000\n[log]\nlevel = \"warn\"\n").unwrap();

        let env = EnvConfig {
            config_path: Some(path.clone()),
            port: Some(8000),
            log_level: None,
        };
        let from_env = AppConfig::resolve(CliOverrides::default(), env.clone()).unwrap();
        assert_eq!(from_env.port, 8000);
        assert_eq!(from_env.log_level, "warn");

        let cli = CliOverrides {
            port: Some(9000),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let from_cli = AppConfig::resolve(cli, env).unwrap();
        assert_eq!(from_cli.port, 9000);
        assert_eq!(from_cli.log_level, "debug");
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let env = EnvConfig {
            config_path: Some(PathBuf::from("/nonexistent/udisk-backup.toml")),
            ..Default::default()
        };
        assert!(AppConfig::resolve(CliOverrides::default(), env).is_err());
    }
}
