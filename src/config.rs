//! Process configuration, read once at startup

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::{errors::Error, signature::CommandAuth, types::RowPolicy};

/// Address the server listens on when `KAKEIBO_BIND` is unset
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Outbound webhook timeout when `KAKEIBO_NOTIFY_TIMEOUT_SECS` is unset
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable settings shared by every request
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw `KAKEIBO_DIR` value, kept to explain why the service is unconfigured
    pub ledger_dir: Option<PathBuf>,
    /// `SLACK_WEBHOOK_URL`
    pub webhook_url: Option<String>,
    /// How inbound slash commands are verified
    pub command_auth: CommandAuth,
    /// Listen address
    pub bind: SocketAddr,
    /// Treatment of malformed ledger rows
    pub row_policy: RowPolicy,
    /// Upper bound on a single webhook call
    pub notify_timeout: Duration,
}

impl Config {
    /// Reads the process environment
    /// # Errors
    /// [`Error::NotConfigured`] if a value is present but malformed
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset
    /// # Errors
    /// [`Error::NotConfigured`] if a value is present but malformed
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind = get("KAKEIBO_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .map_err(|err| Error::NotConfigured(format!("KAKEIBO_BIND: {err}")))?;
        let row_policy = match get("KAKEIBO_STRICT_ROWS").as_deref() {
            None | Some("0" | "false") => RowPolicy::SkipAndContinue,
            Some("1" | "true") => RowPolicy::Strict,
            Some(other) => {
                return Err(Error::NotConfigured(format!(
                    "KAKEIBO_STRICT_ROWS must be 0/1/true/false, got {other:?}"
                )))
            }
        };
        let notify_timeout = match get("KAKEIBO_NOTIFY_TIMEOUT_SECS") {
            None => DEFAULT_NOTIFY_TIMEOUT,
            Some(secs) => secs
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    Error::NotConfigured(format!(
                        "KAKEIBO_NOTIFY_TIMEOUT_SECS must be a positive number, got {secs:?}"
                    ))
                })?,
        };

        Ok(Self {
            ledger_dir: get("KAKEIBO_DIR").map(PathBuf::from),
            webhook_url: get("SLACK_WEBHOOK_URL"),
            command_auth: CommandAuth::from_config(
                get("SLACK_SIGNING_SECRET").as_deref(),
                get("SLACK_VERIFICATION_TOKEN").as_deref(),
            ),
            bind,
            row_policy,
            notify_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, Error> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert!(config.ledger_dir.is_none());
        assert!(config.webhook_url.is_none());
        assert_eq!(config.command_auth, CommandAuth::Unconfigured);
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(config.row_policy, RowPolicy::SkipAndContinue);
        assert_eq!(config.notify_timeout, DEFAULT_NOTIFY_TIMEOUT);
    }

    #[test]
    fn test_reads_values() {
        let config = config(&[
            ("KAKEIBO_DIR", " /data/kakeibo "),
            ("SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T/B/X"),
            ("SLACK_VERIFICATION_TOKEN", "legacy"),
            ("KAKEIBO_BIND", "127.0.0.1:9000"),
            ("KAKEIBO_STRICT_ROWS", "true"),
            ("KAKEIBO_NOTIFY_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(config.ledger_dir, Some(PathBuf::from("/data/kakeibo")));
        assert_eq!(
            config.command_auth,
            CommandAuth::VerificationToken("legacy".to_string())
        );
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.row_policy, RowPolicy::Strict);
        assert_eq!(config.notify_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config(&[("KAKEIBO_DIR", "   "), ("SLACK_SIGNING_SECRET", "")]).unwrap();
        assert!(config.ledger_dir.is_none());
        assert_eq!(config.command_auth, CommandAuth::Unconfigured);
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(config(&[("KAKEIBO_BIND", "nowhere")]).is_err());
        assert!(config(&[("KAKEIBO_STRICT_ROWS", "maybe")]).is_err());
        assert!(config(&[("KAKEIBO_NOTIFY_TIMEOUT_SECS", "0")]).is_err());
    }
}
