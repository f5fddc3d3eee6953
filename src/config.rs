//! Startup configuration
//!
//! Positional arguments only, no flags or config file. Log verbosity comes
//! from `RUST_LOG`.

use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Past broadcasts kept per room for newcomers
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Channel buffer size for connection -> room commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "chat_transport=info";

const SERVER_USAGE: &str = "chat_transport <port> [<port>...]";
const CLIENT_USAGE: &str = "chat_client <nickname> <host> <port>";

/// Server settings: one room per listening port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub ports: Vec<u16>,
    pub history_capacity: usize,
    pub channel_buffer: usize,
}

impl ServerConfig {
    /// Parse the arguments that follow the program name
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let ports = args
            .into_iter()
            .map(|arg| parse_port(&arg))
            .collect::<Result<Vec<_>, _>>()?;
        if ports.is_empty() {
            return Err(ConfigError::Usage(SERVER_USAGE));
        }
        Ok(Self {
            ports,
            ..Self::default()
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            channel_buffer: CHANNEL_BUFFER_SIZE,
        }
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub nickname: String,
    pub host: String,
    pub port: u16,
}

impl ClientConfig {
    /// Parse `<nickname> <host> <port>` (program name already stripped)
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let [nickname, host, port] = <[String; 3]>::try_from(args)
            .map_err(|_| ConfigError::Usage(CLIENT_USAGE))?;
        Ok(Self {
            nickname,
            host,
            port: parse_port(&port)?,
        })
    }
}

fn parse_port(arg: &str) -> Result<u16, ConfigError> {
    arg.parse()
        .map_err(|_| ConfigError::InvalidPort(arg.to_string()))
}

/// Install the fmt subscriber
///
/// Use RUST_LOG env var to control log level,
/// e.g. RUST_LOG=debug or RUST_LOG=chat_transport=trace
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_server_ports() {
        let config = ServerConfig::from_args(args(&["9000", "9001"])).unwrap();
        assert_eq!(config.ports, vec![9000, 9001]);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn test_server_requires_a_port() {
        assert_eq!(
            ServerConfig::from_args(args(&[])),
            Err(ConfigError::Usage(SERVER_USAGE))
        );
    }

    #[test]
    fn test_server_rejects_bad_port() {
        assert_eq!(
            ServerConfig::from_args(args(&["9000", "nope"])),
            Err(ConfigError::InvalidPort("nope".to_string()))
        );
        assert!(ServerConfig::from_args(args(&["70000"])).is_err());
    }

    #[test]
    fn test_client_args() {
        let config = ClientConfig::from_args(args(&["alice", "localhost", "9000"])).unwrap();
        assert_eq!(config.nickname, "alice");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_client_arg_count() {
        assert_eq!(
            ClientConfig::from_args(args(&["alice", "localhost"])),
            Err(ConfigError::Usage(CLIENT_USAGE))
        );
        assert!(ClientConfig::from_args(args(&["a", "b", "1", "extra"])).is_err());
    }
}
