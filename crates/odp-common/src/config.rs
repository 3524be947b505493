//! Settings for extractors and the runner
//!
//! Values come from the process environment first and the secrets file
//! (`<base_dir>/token.env`, dotenv syntax) second. Nothing is read from the
//! secrets file into the process environment; it is only consulted as a
//! fallback lookup.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OdpError, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

pub const DEFAULT_REMOTE_REPOSITORY: &str = "evensrii/Telemark";
pub const DEFAULT_REMOTE_BRANCH: &str = "main";
pub const DEFAULT_REMOTE_API: &str = "https://api.github.com";
pub const DEFAULT_MAIL_API: &str = "https://mail.api.telemarkfylke.no";
pub const DEFAULT_MAIL_SENDER: &str = "Analyse: Statusoppdatering <analyse@telemarkfylke.no>";
pub const DEFAULT_EXTRACTOR_TIMEOUT_SECS: u64 = 30 * 60;
pub const SECRETS_FILE_NAME: &str = "token.env";

/// Recipients used when `ODP_MAIL_RECIPIENTS` is not set
pub const DEFAULT_RECIPIENTS: &[(&str, &str)] = &[("Analyse", "analyse@telemarkfylke.no")];

/// A credential that never prints its value
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for building request headers
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Where artifacts are published
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub api_base: String,
    /// `owner/name`
    pub repository: String,
    pub branch: String,
    pub token: Secret,
}

/// A mail recipient with the name used in the salutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub address: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Parse `Name <address>` or a bare address
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match (text.find('<'), text.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                let address = text[open + 1..close].trim();
                let name = text[..open].trim();
                let name = if name.is_empty() { address } else { name };
                Some(Self::new(name, address))
            },
            _ => Some(Self::new(text, text)),
        }
    }
}

/// Mail sink settings, present only when the sink key is configured
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub api_base: String,
    pub sender: String,
    pub recipients: Vec<Recipient>,
    pub key: Secret,
}

/// Complete pipeline settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Repository root; task paths and the secrets file resolve against it
    pub base_dir: PathBuf,
    /// Scratch directory for local artifacts and the run lock
    pub temp_folder: PathBuf,
    /// Directory for the master log, task logs, and status files
    pub log_folder: PathBuf,
    /// Secrets file that was consulted, if it existed
    pub secrets_file: Option<PathBuf>,
    pub remote: RemoteSettings,
    pub mail: Option<MailSettings>,
    pub extractor_timeout: Duration,
}

impl Settings {
    /// Load settings from the environment and the secrets file
    ///
    /// Environment variables:
    /// - `ODP_BASE_DIR` (falls back to `PYTHONPATH`): repository root, required
    /// - `TEMP_FOLDER`: scratch directory, required
    /// - `LOG_FOLDER`: log directory, defaults to the working directory
    /// - `ODP_SECRETS_FILE`: secrets file, defaults to `<base>/token.env`
    /// - `GITHUB_TOKEN`: remote store credential, required
    /// - `X_FUNCTIONS_KEY`: mail sink key, optional
    /// - `ODP_REMOTE_REPO`, `ODP_REMOTE_BRANCH`, `ODP_REMOTE_API`
    /// - `ODP_MAIL_API`, `ODP_MAIL_SENDER`, `ODP_MAIL_RECIPIENTS`
    /// - `ODP_EXTRACTOR_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let base_dir = env("ODP_BASE_DIR")
            .or_else(|| env("PYTHONPATH"))
            .ok_or_else(|| OdpError::config_missing("ODP_BASE_DIR"))?;
        let secrets_path = env("ODP_SECRETS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(&base_dir).join(SECRETS_FILE_NAME));

        let (secrets, secrets_file) = if secrets_path.is_file() {
            (load_secrets_file(&secrets_path)?, Some(secrets_path))
        } else {
            (HashMap::new(), None)
        };

        let mut settings = Self::from_lookup(|key| env(key).or_else(|| secrets.get(key).cloned()))?;
        settings.secrets_file = secrets_file;
        Ok(settings)
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| OdpError::config_missing(key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let base_dir = lookup("ODP_BASE_DIR")
            .or_else(|| lookup("PYTHONPATH"))
            .ok_or_else(|| OdpError::config_missing("ODP_BASE_DIR"))?;
        let temp_folder = required("TEMP_FOLDER")?;
        let log_folder = match lookup("LOG_FOLDER") {
            Some(folder) => PathBuf::from(folder),
            None => std::env::current_dir()?,
        };

        let remote = RemoteSettings {
            api_base: or_default("ODP_REMOTE_API", DEFAULT_REMOTE_API),
            repository: or_default("ODP_REMOTE_REPO", DEFAULT_REMOTE_REPOSITORY),
            branch: or_default("ODP_REMOTE_BRANCH", DEFAULT_REMOTE_BRANCH),
            token: Secret::new(required("GITHUB_TOKEN")?),
        };
        if !remote.repository.contains('/') {
            return Err(OdpError::Config(format!(
                "ODP_REMOTE_REPO must be owner/name, got '{}'",
                remote.repository
            )));
        }

        let mail = lookup("X_FUNCTIONS_KEY").map(|key| MailSettings {
            api_base: or_default("ODP_MAIL_API", DEFAULT_MAIL_API),
            sender: or_default("ODP_MAIL_SENDER", DEFAULT_MAIL_SENDER),
            recipients: lookup("ODP_MAIL_RECIPIENTS")
                .map(|list| list.split(';').filter_map(Recipient::parse).collect())
                .unwrap_or_else(|| {
                    DEFAULT_RECIPIENTS
                        .iter()
                        .map(|(name, address)| Recipient::new(*name, *address))
                        .collect()
                }),
            key: Secret::new(key),
        });

        let extractor_timeout = match lookup("ODP_EXTRACTOR_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                OdpError::Config(format!("ODP_EXTRACTOR_TIMEOUT_SECS is not a number: '{raw}'"))
            })?),
            None => Duration::from_secs(DEFAULT_EXTRACTOR_TIMEOUT_SECS),
        };

        Ok(Self {
            base_dir: PathBuf::from(base_dir),
            temp_folder: PathBuf::from(temp_folder),
            log_folder,
            secrets_file: None,
            remote,
            mail,
            extractor_timeout,
        })
    }

    /// Mail settings, or the missing key as an error
    pub fn mail_settings(&self) -> Result<&MailSettings> {
        self.mail
            .as_ref()
            .ok_or_else(|| OdpError::config_missing("X_FUNCTIONS_KEY"))
    }
}

fn load_secrets_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        OdpError::Config(format!("cannot read secrets file {}: {e}", path.display()))
    })?;
    iter.map(|item| {
        item.map_err(|e| OdpError::Config(format!("malformed secrets file {}: {e}", path.display())))
    })
    .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("ODP_BASE_DIR", "/srv/telemark"),
        ("TEMP_FOLDER", "/tmp/odp"),
        ("LOG_FOLDER", "/var/log/odp"),
        ("GITHUB_TOKEN", "ghp_secret"),
    ];

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(MINIMAL)).unwrap();
        assert_eq!(settings.base_dir, PathBuf::from("/srv/telemark"));
        assert_eq!(settings.remote.repository, DEFAULT_REMOTE_REPOSITORY);
        assert_eq!(settings.remote.branch, "main");
        assert_eq!(settings.extractor_timeout, Duration::from_secs(1800));
        assert!(settings.mail.is_none());
    }

    #[test]
    fn test_missing_token_names_variable() {
        let err = Settings::from_lookup(lookup(&MINIMAL[..3])).unwrap_err();
        assert!(matches!(err, OdpError::ConfigMissing { ref variable } if variable == "GITHUB_TOKEN"));
    }

    #[test]
    fn test_pythonpath_fallback() {
        let mut pairs = MINIMAL[1..].to_vec();
        pairs.push(("PYTHONPATH", "/legacy/base"));
        let settings = Settings::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(settings.base_dir, PathBuf::from("/legacy/base"));
    }

    #[test]
    fn test_mail_settings_require_key() {
        let settings = Settings::from_lookup(lookup(MINIMAL)).unwrap();
        let err = settings.mail_settings().unwrap_err();
        assert!(err.to_string().contains("X_FUNCTIONS_KEY"));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("X_FUNCTIONS_KEY", "fn-key"));
        pairs.push(("ODP_MAIL_RECIPIENTS", "Kari <kari@example.no>; ola@example.no"));
        let settings = Settings::from_lookup(lookup(&pairs)).unwrap();
        let mail = settings.mail_settings().unwrap();
        assert_eq!(mail.recipients, vec![
            Recipient::new("Kari", "kari@example.no"),
            Recipient::new("ola@example.no", "ola@example.no"),
        ]);
    }

    #[test]
    fn test_secret_is_redacted() {
        let settings = Settings::from_lookup(lookup(MINIMAL)).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("Secret(***)"));
        assert_eq!(settings.remote.token.expose(), "ghp_secret");
    }

    #[test]
    fn test_bad_timeout() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("ODP_EXTRACTOR_TIMEOUT_SECS", "soon"));
        assert!(Settings::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_secrets_file_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SECRETS_FILE_NAME);
        std::fs::write(&path, "GITHUB_TOKEN=from_file\nX_FUNCTIONS_KEY=\"quoted key\"\n").unwrap();

        let secrets = load_secrets_file(&path).unwrap();
        assert_eq!(secrets.get("GITHUB_TOKEN").map(String::as_str), Some("from_file"));
        assert_eq!(secrets.get("X_FUNCTIONS_KEY").map(String::as_str), Some("quoted key"));
    }
}
