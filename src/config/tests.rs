//! Config Module Tests
//!
//! ## Test Scopes
//! - **Server**: Positional argument validation and environment overrides.
//! - **Client**: File format parsing, range ownership and endpoint de-duplication.

#[cfg(test)]
mod tests {
    use crate::config::client::ClientConfig;
    use crate::config::server::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tracing::Level;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ============================================================
    // SERVER CONFIG TESTS
    // ============================================================

    #[test]
    fn test_server_args_parse() {
        let config = ServerConfig::from_args(&args(&["server", "5000", "0", "255"])).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.first_id, 0);
        assert_eq!(config.last_id, 255);
        assert_eq!(config.block_size, 128);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_server_args_rejects_bad_count_and_values() {
        assert!(ServerConfig::from_args(&args(&["server", "5000", "0"])).is_err());
        assert!(ServerConfig::from_args(&args(&["server", "port", "0", "1"])).is_err());
        assert!(ServerConfig::from_args(&args(&["server", "5000", "-1", "1"])).is_err());
        assert!(ServerConfig::from_args(&args(&["server", "5000", "9", "1"])).is_err());
    }

    #[test]
    fn test_server_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_BIND, "127.0.0.1"),
            (ENV_BLOCK_SIZE, "256"),
            (ENV_STATS_INTERVAL, "0"),
            (ENV_LOG, "debug"),
        ]);

        let config = ServerConfig::from_args(&args(&["server", "7000", "10", "19"]))
            .unwrap()
            .with_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.block_size, 256);
        assert_eq!(config.stats_interval, None);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_server_env_defaults_untouched() {
        let config = ServerConfig::from_args(&args(&["server", "7000", "0", "1"]))
            .unwrap()
            .with_env(|_| None)
            .unwrap();

        assert_eq!(config.stats_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_server_env_rejects_zero_block_size() {
        let result = ServerConfig::from_args(&args(&["server", "7000", "0", "1"]))
            .unwrap()
            .with_env(|key| (key == ENV_BLOCK_SIZE).then(|| "0".to_string()));
        assert!(result.is_err());
    }

    // ============================================================
    // CLIENT CONFIG TESTS
    // ============================================================

    const TWO_SERVERS: &str = "\
# distributed memory layout
DIMBLOCK=64

Address=127.0.0.1
Port=5000
ID=0-255
Address=10.0.0.2
Port=5001
ID=256-511
ID=600-699
";

    #[test]
    fn test_client_config_parses_ranges() {
        let config = ClientConfig::parse(TWO_SERVERS).unwrap();

        assert_eq!(config.block_size, 64);
        assert_eq!(config.ranges.len(), 3);

        let first: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let second: SocketAddr = "10.0.0.2:5001".parse().unwrap();

        assert_eq!(config.endpoint_for(0), Some(first));
        assert_eq!(config.endpoint_for(255), Some(first));
        assert_eq!(config.endpoint_for(256), Some(second));
        assert_eq!(config.endpoint_for(650), Some(second));
        assert_eq!(config.endpoint_for(550), None);
        assert_eq!(config.endpoints(), vec![first, second]);
    }

    #[test]
    fn test_client_config_later_range_wins() {
        let text = "Address=127.0.0.1\nPort=1\nID=0-9\nPort=2\nID=5-5\n";
        let config = ClientConfig::parse(text).unwrap();

        assert_eq!(config.endpoint_for(4).unwrap().port(), 1);
        assert_eq!(config.endpoint_for(5).unwrap().port(), 2);
    }

    #[test]
    fn test_client_config_defaults_block_size() {
        let config = ClientConfig::parse("Address=127.0.0.1\nPort=5000\nID=0-1\n").unwrap();
        assert_eq!(config.block_size, 128);
    }

    #[test]
    fn test_client_config_errors() {
        // Range before any endpoint.
        assert!(ClientConfig::parse("ID=0-10\n").is_err());
        // Malformed values.
        assert!(ClientConfig::parse("DIMBLOCK=abc\n").is_err());
        assert!(ClientConfig::parse("DIMBLOCK=0\n").is_err());
        assert!(ClientConfig::parse("Address=localhost\n").is_err());
        assert!(ClientConfig::parse("Address=1.2.3.4\nPort=5\nID=10-1\n").is_err());
        assert!(ClientConfig::parse("Address=1.2.3.4\nPort=5\nID=7\n").is_err());
        assert!(ClientConfig::parse("garbage line\n").is_err());
    }

    #[test]
    fn test_client_config_ignores_unknown_keys() {
        let config =
            ClientConfig::parse("Colour=blue\nAddress=127.0.0.1\nPort=9\nID=0-0\n").unwrap();
        assert_eq!(config.ranges.len(), 1);
    }

    #[test]
    fn test_client_config_missing_file() {
        assert!(ClientConfig::from_file("/nonexistent/distmem.conf").is_err());
    }
}
