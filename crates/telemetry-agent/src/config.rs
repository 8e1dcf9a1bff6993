//! Command line and environment configuration.
//!
//! Environment variables override nothing here: clap treats them as the
//! fallback for a flag that was not passed, matching the server binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "telemetry-agent", about = "Runtime metrics collection agent")]
pub struct AgentArgs {
    /// Address of the telemetry server to report to.
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub server_addr: String,

    /// Seconds between metric collection ticks.
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Seconds between reports to the server.
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,

    /// Maximum number of concurrent report cycles in flight.
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: usize,

    /// Shared key for HMAC-SHA256 body signing. Unsigned when absent.
    #[arg(short = 'k', long, env = "KEY")]
    pub sign_key: Option<String>,

    /// Path to a public key for outbound body encryption.
    #[arg(short = 'c', long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,
}

impl AgentArgs {
    fn base_url(&self) -> String {
        if self.server_addr.starts_with("http://") || self.server_addr.starts_with("https://") {
            self.server_addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.server_addr.trim_end_matches('/'))
        }
    }

    /// Endpoint for a single JSON metric.
    pub fn update_url(&self) -> String {
        format!("{}/update/", self.base_url())
    }

    /// Endpoint for a JSON batch.
    pub fn updates_url(&self) -> String {
        format!("{}/updates/", self.base_url())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> AgentArgs {
        AgentArgs::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn defaults_match_the_documented_contract() {
        let args = parse(&["telemetry-agent"]);

        assert_eq!(args.server_addr, "127.0.0.1:8080");
        assert_eq!(args.poll_interval, 2);
        assert_eq!(args.report_interval, 10);
        assert_eq!(args.rate_limit, 10);
        assert!(args.sign_key.is_none());
        assert!(args.crypto_key.is_none());
    }

    #[test]
    fn bare_host_port_gets_an_http_scheme() {
        let args = parse(&["telemetry-agent", "-a", "metrics.internal:9090"]);

        assert_eq!(args.update_url(), "http://metrics.internal:9090/update/");
        assert_eq!(args.updates_url(), "http://metrics.internal:9090/updates/");
    }

    #[test]
    fn explicit_scheme_and_trailing_slash_are_preserved() {
        let args = parse(&["telemetry-agent", "-a", "https://metrics.internal/"]);

        assert_eq!(args.update_url(), "https://metrics.internal/update/");
    }

    #[test]
    fn short_flags_cover_every_knob() {
        let args = parse(&[
            "telemetry-agent",
            "-a",
            "127.0.0.1:9999",
            "-p",
            "1",
            "-r",
            "5",
            "-l",
            "3",
            "-k",
            "hush",
        ]);

        assert_eq!(args.server_addr, "127.0.0.1:9999");
        assert_eq!(args.poll_interval, 1);
        assert_eq!(args.report_interval, 5);
        assert_eq!(args.rate_limit, 3);
        assert_eq!(args.sign_key.as_deref(), Some("hush"));
    }
}
