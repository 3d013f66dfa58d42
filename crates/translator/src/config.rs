//! Command line and environment configuration.

use clap::Parser;
use nats_client::ConnectionConfig;
use std::path::PathBuf;

const LABEL_PREFIX: &str = "pulse-build-translator";

/// Pulse build translator - normalizes raw build and test notifications
#[derive(Parser, Debug, Clone)]
#[command(name = "pulse-translator")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// User for password authentication
    #[arg(long, env = "PULSE_USER")]
    pub user: Option<String>,

    /// Password for password authentication
    #[arg(long, env = "PULSE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Label identifying this consumer (defaults to the hostname)
    #[arg(long, env = "PULSE_LABEL")]
    pub label: Option<String>,

    /// Consume through a durable consumer that survives restarts
    #[arg(long, env = "PULSE_DURABLE")]
    pub durable: bool,

    /// Directory for the bad message and error logs
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub logdir: PathBuf,

    /// Translate a single JSON message from this file and exit
    #[arg(long, value_name = "FILE")]
    pub message: Option<PathBuf>,

    /// Print normalized records instead of publishing them
    #[arg(long)]
    pub display_only: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Args {
    /// Consumer label: `pulse-build-translator-<label or hostname>`.
    pub fn consumer_label(&self) -> String {
        let suffix = self.label.clone().unwrap_or_else(host_name);
        format!("{}-{}", LABEL_PREFIX, suffix)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.nats_url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            label: self.consumer_label(),
        }
    }
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().trim().to_string())
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "pulse-translator",
            "--label",
            "ci",
            "--durable",
            "--message",
            "fixtures/build.json",
            "--display-only",
            "--logdir",
            "/tmp/translator-logs",
        ])
        .unwrap();

        assert!(args.durable);
        assert!(args.display_only);
        assert_eq!(args.message, Some(PathBuf::from("fixtures/build.json")));
        assert_eq!(args.logdir, PathBuf::from("/tmp/translator-logs"));
        assert_eq!(args.consumer_label(), "pulse-build-translator-ci");
    }

    #[test]
    fn test_connection_config_uses_label() {
        let args = Args::try_parse_from([
            "pulse-translator",
            "--nats-url",
            "nats://bus.example.com:4222",
            "--user",
            "translator",
            "--password",
            "secret",
            "--label",
            "worker-1",
        ])
        .unwrap();

        let config = args.connection_config();
        assert_eq!(config.url, "nats://bus.example.com:4222");
        assert_eq!(config.user.as_deref(), Some("translator"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.label, "pulse-build-translator-worker-1");
    }

    #[test]
    fn test_default_label_uses_hostname() {
        let args = Args::try_parse_from(["pulse-translator"]).unwrap();
        if args.label.is_none() {
            let host = hostname::get().unwrap().to_string_lossy().trim().to_string();
            assert_eq!(
                args.consumer_label(),
                format!("{}-{}", LABEL_PREFIX, host)
            );
        }
    }
}
