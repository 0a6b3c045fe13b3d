use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use directories_next::ProjectDirs;
use serde::Deserialize;

/// Characters used for paste names unless overridden.
pub const DEFAULT_ID_ALPHABET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub database: Database,
    pub pastes: Pastes,
    pub purge: Purge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: IpAddr,
    pub port: u16,
    /// Prepended to paste names to build shareable URLs.
    pub url_prefix: Option<String>,
    pub max_upload_size: usize,
    pub mode: Mode,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
            url_prefix: None,
            max_upload_size: 1024 * 1024,
            mode: Mode::Production,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Production,
    Development,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Mode::Production),
            "development" | "dev" => Ok(Mode::Development),
            other => bail!("unknown mode '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Database {
            url: "sqlite://pastes.db".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pastes {
    pub id_alphabet: String,
    pub id_length: usize,
    /// Seconds a paste lives when the client does not ask for anything else.
    pub default_expires: u64,
    /// Upper bound for requested lifetimes, if any.
    pub max_expires: Option<u64>,
    /// Non-`text/*` types accepted on upload.
    pub allowed_mimes: Vec<String>,
}

impl Default for Pastes {
    fn default() -> Self {
        Pastes {
            id_alphabet: DEFAULT_ID_ALPHABET.to_owned(),
            id_length: 12,
            default_expires: 86400,
            max_expires: None,
            allowed_mimes: vec!["application/json".to_owned()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Purge {
    /// Seconds between sweeps; zero disables the sweep.
    pub interval_secs: u64,
}

impl Default for Purge {
    fn default() -> Self {
        Purge { interval_secs: 3600 }
    }
}

impl Config {
    /// Load the config file (if any), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path.map(PathBuf::from).or_else(default_config_path) {
            Some(path) => {
                let source = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str(&source)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Override fields from environment-style variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(port) = parse_var(&var, "WEB_PORT")? {
            self.server.port = port;
        }
        if let Some(bind) = parse_var(&var, "BIND_ADDRESS")? {
            self.server.bind = bind;
        }
        if let Some(prefix) = var("PASTE_URL_PREFIX") {
            self.server.url_prefix = Some(prefix);
        }
        if let Some(limit) = parse_var(&var, "BODY_LIMIT")? {
            self.server.max_upload_size = limit;
        }
        if let Some(mode) = parse_var(&var, "PASTE_ENV")? {
            self.server.mode = mode;
        }
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(alphabet) = var("PASTE_ID_ALPHABET") {
            self.pastes.id_alphabet = alphabet;
        }
        if let Some(length) = parse_var(&var, "PASTE_ID_LENGTH")? {
            self.pastes.id_length = length;
        }
        if let Some(secs) = parse_var(&var, "PASTE_DEFAULT_EXPIRES")? {
            self.pastes.default_expires = secs;
        }
        if let Some(secs) = parse_var(&var, "PASTE_MAX_EXPIRES")? {
            self.pastes.max_expires = Some(secs);
        }
        if let Some(mimes) = var("PASTE_ALLOWED_MIMES") {
            self.pastes.allowed_mimes = mimes
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(secs) = parse_var(&var, "PASTE_CLEANUP_INTERVAL")? {
            self.purge.interval_secs = secs;
        }

        // an empty prefix means "no prefix"
        if self.server.url_prefix.as_deref().map_or(false, str::is_empty) {
            self.server.url_prefix = None;
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pastes.id_alphabet.is_empty() {
            bail!("paste id alphabet must not be empty");
        }
        if self.pastes.id_length == 0 {
            bail!("paste id length must be greater than zero");
        }
        if let Some(max) = self.pastes.max_expires {
            if self.pastes.default_expires > max {
                bail!(
                    "default expiry ({}s) exceeds maximum expiry ({max}s)",
                    self.pastes.default_expires
                );
            }
        }
        Ok(())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        None => Ok(None),
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("config.toml");
    if local.is_file() {
        return Some(local);
    }

    ProjectDirs::from("", "", "tempbin")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pastes.id_length, 12);
        assert_eq!(config.pastes.id_alphabet.len(), 62);
        assert_eq!(config.pastes.default_expires, 86400);
        assert_eq!(config.pastes.max_expires, None);
        assert_eq!(config.pastes.allowed_mimes, vec!["application/json"]);
        assert_eq!(config.purge.interval_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.server.mode, Mode::Production);
        assert_eq!(config.database.url, "sqlite://pastes.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [pastes]
            id_length = 8
            "#,
        )
        .unwrap();

        config
            .apply_env(env(&[
                ("WEB_PORT", "9100"),
                ("PASTE_MAX_EXPIRES", "3600"),
                ("PASTE_DEFAULT_EXPIRES", "60"),
                ("PASTE_ALLOWED_MIMES", "application/json, application/xml,,"),
                ("PASTE_ENV", "development"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.mode, Mode::Development);
        assert_eq!(config.pastes.id_length, 8);
        assert_eq!(config.pastes.max_expires, Some(3600));
        assert_eq!(config.pastes.default_expires, 60);
        assert_eq!(
            config.pastes.allowed_mimes,
            vec!["application/json", "application/xml"]
        );
    }

    #[test]
    fn empty_url_prefix_is_none() {
        let mut config = Config::default();
        config.apply_env(env(&[("PASTE_URL_PREFIX", "")])).unwrap();
        assert_eq!(config.server.url_prefix, None);

        config
            .apply_env(env(&[("PASTE_URL_PREFIX", "https://paste.example/")]))
            .unwrap();
        assert_eq!(
            config.server.url_prefix.as_deref(),
            Some("https://paste.example/")
        );
    }

    #[test]
    fn unparseable_numbers_are_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("PASTE_ID_LENGTH", "twelve")]))
            .unwrap_err();
        assert!(err.to_string().contains("PASTE_ID_LENGTH"));
    }

    #[test]
    fn default_above_max_is_invalid() {
        let mut config = Config::default();
        config.pastes.max_expires = Some(60);
        assert!(config.validate().is_err());

        config.pastes.default_expires = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_alphabet_is_invalid() {
        let mut config = Config::default();
        config.pastes.id_alphabet.clear();
        assert!(config.validate().is_err());
    }
}
