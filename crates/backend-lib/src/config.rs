// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Origin used when deriving meeting join links
    pub public_origin: String,
    /// STUN servers handed to every peer connection; at least one required
    pub stun_servers: Vec<String>,
    /// How long a reaction stays visible before one decrement
    pub reaction_decay_ms: u64,
    /// Mail dispatch settings
    pub mail: MailSettings,
}

/// Outbound invitation mail settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// HTTP endpoint of the transactional mail sender; `None` disables dispatch
    pub endpoint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            public_origin: "http://localhost:3000".to_string(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            reaction_decay_ms: 3000,
            mail: MailSettings::default(),
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self { endpoint: None }
    }
}

impl Settings {
    /// Load settings from the default config file and environment
    pub fn load() -> Result<Settings> {
        Self::load_from("campusmeet.toml")
    }

    /// Load settings from an explicit config file path, then environment
    pub fn load_from<P: AsRef<std::path::Path>>(path: P) -> Result<Settings> {
        let settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CAMPUSMEET_").split("__"))
            .extract()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.reaction_decay_ms, 3000);
        assert!(!settings.stun_servers.is_empty());
        assert!(settings.mail.endpoint.is_none());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        // figment treats a missing TOML file as an empty source
        let settings = Settings::load_from("does-not-exist.toml").unwrap();
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campusmeet.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "0.0.0.0:8080"
log_level = "debug"
reaction_decay_ms = 1500

[mail]
endpoint = "https://mail.example/send"
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.reaction_decay_ms, 1500);
        assert_eq!(
            settings.mail.endpoint.as_deref(),
            Some("https://mail.example/send")
        );
        // untouched fields keep their defaults
        assert_eq!(settings.public_origin, "http://localhost:3000");
    }
}
