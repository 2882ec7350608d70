use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Connect Four session server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// IP address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
    /// Directory for the daily rolling log files
    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,
    /// Seconds between sweeps for abandoned lobby games
    #[arg(
        long,
        env = "PURGE_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub purge_interval_secs: u64,
    /// Age in seconds after which an unjoined game is removed from the lobby
    #[arg(long, env = "MAX_WAITING_AGE_SECS", default_value_t = 1800)]
    pub max_waiting_age_secs: u64,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn max_waiting_age(&self) -> Duration {
        Duration::from_secs(self.max_waiting_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let config = Config::try_parse_from([
            "server",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--log-dir",
            "/tmp/c4",
            "--purge-interval-secs",
            "60",
            "--max-waiting-age-secs",
            "600",
        ])
        .unwrap();
        assert_eq!(config.addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.log_dir, PathBuf::from("/tmp/c4"));
        assert_eq!(config.purge_interval(), Duration::from_secs(60));
        assert_eq!(config.max_waiting_age(), Duration::from_secs(600));
    }

    #[test]
    fn test_reject_bad_arguments() {
        assert!(Config::try_parse_from(["server", "--purge-interval-secs", "0"]).is_err());
        assert!(Config::try_parse_from(["server", "--port", "70000"]).is_err());
        assert!(Config::try_parse_from(["server", "--host", "not-an-ip"]).is_err());
    }
}
