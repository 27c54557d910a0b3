//! Layered configuration.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file
//! (`rawrpc.toml` unless another path is given), `RAWRPC_` environment
//! variables with `__` separating nested keys (`RAWRPC_SERVER__PORT=9000`),
//! then whatever the caller merges on top (CLI flags).

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "rawrpc.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pending connection queue length passed to `listen`.
    pub backlog: u32,
    /// Read size per `recv`.
    pub chunk_size: usize,
    /// Bounds both reading the request and sending the reply.
    pub io_timeout_ms: u64,
    /// Value of the `Server` response header.
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8101,
            backlog: 5,
            chunk_size: 128,
            io_timeout_ms: 575,
            server_name: concat!("rawrpc/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub chunk_size: usize,
    /// Time allowed to finish sending a request.
    pub send_timeout_ms: u64,
    /// Time allowed to receive the full response.
    pub response_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8101,
            chunk_size: 128,
            send_timeout_ms: 575,
            response_timeout_ms: 1437,
            user_agent: concat!("rawrpc-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub json: bool,
    pub verbose: bool,
}

impl AppConfig {
    /// Defaults, file and environment, ready for further merges.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let file = config_file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("RAWRPC_").split("__"))
    }

    /// Load the configuration, placing `overrides` under `section`.
    pub fn new<T: Serialize>(
        config_file: Option<&Path>,
        section: &str,
        overrides: Option<&T>,
    ) -> Result<Self, figment::Error> {
        let mut figment = Self::figment(config_file);
        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::default(section, overrides));
        }
        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Serialize)]
    struct PortOverride {
        port: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    }

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            AppConfig::new::<()>(Some(&dir.path().join("absent.toml")), "server", None).unwrap();

        assert_eq!(config.server.backlog, 5);
        assert_eq!(config.client.response_timeout(), Duration::from_millis(1437));
        assert!(config.client.send_timeout() < config.client.response_timeout());
    }

    #[test]
    fn file_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\nhost = \"0.0.0.0\"\n\n[client]\nuser_agent = \"tester\""
        )
        .unwrap();

        let config = AppConfig::new(
            Some(file.path()),
            "server",
            Some(&PortOverride {
                port: 9100,
                host: None,
            }),
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.chunk_size, 128);
        assert_eq!(config.client.user_agent, "tester");
    }
}
