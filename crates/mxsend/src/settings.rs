//! Persistent settings for the front-end.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mxsend_smtp::{Config, RouteBy};

/// Settings loaded from `settings.json`.
///
/// Every field is optional in the file; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Exchanger port.
    pub port: u16,
    /// TCP connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-read/write timeout, in seconds.
    pub io_timeout_secs: u64,
    /// Deadline for a whole delivery across all exchangers, in seconds.
    pub delivery_timeout_secs: Option<u64>,
    /// Which address picks the exchangers (`"sender"` or `"recipient"`).
    #[serde(with = "route_by_serde")]
    pub route_by: RouteBy,
    /// Longest reply line accepted from an exchanger.
    pub max_line_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let smtp = Config::new("localhost");
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 8025)),
            helo_name: smtp.helo_name,
            port: smtp.port,
            connect_timeout_secs: smtp.connect_timeout.as_secs(),
            io_timeout_secs: smtp.io_timeout.as_secs(),
            delivery_timeout_secs: None,
            route_by: smtp.route_by,
            max_line_length: smtp.max_line_length,
        }
    }
}

impl Settings {
    /// Builds the delivery configuration.
    #[must_use]
    pub fn to_config(&self) -> Config {
        let builder = Config::builder(self.helo_name.clone())
            .port(self.port)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .io_timeout(Duration::from_secs(self.io_timeout_secs))
            .route_by(self.route_by)
            .max_line_length(self.max_line_length);
        match self.delivery_timeout_secs {
            Some(secs) => builder.delivery_timeout(Duration::from_secs(secs)),
            None => builder,
        }
        .build()
    }
}

/// Default location: `<config dir>/mxsend/settings.json`.
fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mxsend")
        .join("settings.json")
}

/// Loads settings from `path`, or from the default location.
///
/// A missing file at the default location yields the defaults; a missing
/// file given explicitly is an error.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON.
pub async fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings_path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_path();
            if !path.exists() {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Settings::default());
            }
            path
        }
    };

    let contents = tokio::fs::read_to_string(&settings_path)
        .await
        .with_context(|| format!("reading {}", settings_path.display()))?;
    let settings = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", settings_path.display()))?;
    tracing::info!("Settings loaded from {:?}", settings_path);
    Ok(settings)
}

/// Serde helpers for `RouteBy` (the library carries no serde dependency).
mod route_by_serde {
    use mxsend_smtp::RouteBy;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(route_by: &RouteBy, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(match route_by {
            RouteBy::Recipient => "recipient",
            RouteBy::Sender => "sender",
        })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RouteBy, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "recipient" => Ok(RouteBy::Recipient),
            "sender" => Ok(RouteBy::Sender),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["recipient", "sender"],
            )),
        }
    }
}
