//! Verification of inbound slash-command requests

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signed requests older or newer than this many seconds are rejected as replays
pub const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

/// How inbound slash commands are authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAuth {
    /// `X-Slack-Signature` must be `v0=` + hex HMAC-SHA256 of `v0:{timestamp}:{body}`
    SigningSecret(String),
    /// The legacy `token` form field must equal this value
    VerificationToken(String),
    /// Neither is configured, so every command is refused
    Unconfigured,
}

impl CommandAuth {
    /// Prefers the signing secret over the legacy token
    #[must_use]
    pub fn from_config(signing_secret: Option<&str>, verification_token: Option<&str>) -> Self {
        match (signing_secret, verification_token) {
            (Some(secret), _) => CommandAuth::SigningSecret(secret.to_string()),
            (None, Some(token)) => CommandAuth::VerificationToken(token.to_string()),
            (None, None) => CommandAuth::Unconfigured,
        }
    }

    /// Checks one request.
    ///
    /// `now` is the current Unix time in seconds, supplied by the caller.
    /// # Errors
    /// - [`Error::Unauthorized`] if the signature, timestamp or token does not check out
    /// - [`Error::NotConfigured`] under [`CommandAuth::Unconfigured`]
    pub fn verify(
        &self,
        signature: &str,
        timestamp: &str,
        body: &[u8],
        token: Option<&str>,
        now: i64,
    ) -> Result<(), Error> {
        match self {
            CommandAuth::SigningSecret(secret) => {
                verify_signature(secret, signature, timestamp, body, now)
            }
            CommandAuth::VerificationToken(expected) => match token {
                Some(token) if token == expected => Ok(()),
                _ => Err(Error::Unauthorized("Invalid Slack token".to_string())),
            },
            CommandAuth::Unconfigured => Err(Error::NotConfigured(
                "Slack verification not configured".to_string(),
            )),
        }
    }
}

fn signing_mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| Error::NotConfigured(format!("signing secret: {err}")))?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

/// Verifies a `v0=` signature over the raw request body in constant time.
/// # Errors
/// [`Error::Unauthorized`] if the timestamp is malformed or stale, or the signature differs
pub fn verify_signature(
    secret: &str,
    signature: &str,
    timestamp: &str,
    body: &[u8],
    now: i64,
) -> Result<(), Error> {
    let invalid = || Error::Unauthorized("Invalid Slack signature".to_string());
    let sent_at: i64 = timestamp.trim().parse().map_err(|_| invalid())?;
    if now.abs_diff(sent_at) > MAX_CLOCK_SKEW_SECS.unsigned_abs() {
        tracing::warn!(sent_at, now, "rejecting stale slash command");
        return Err(invalid());
    }
    let expected = signature
        .strip_prefix("v0=")
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or_else(invalid)?;
    signing_mac(secret, timestamp.trim(), body)?
        .verify_slice(&expected)
        .map_err(|_| invalid())
}

/// Produces the `X-Slack-Signature` value for a body, as Slack would send it
/// # Errors
/// [`Error::NotConfigured`] if the secret cannot key the MAC
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, Error> {
    let digest = signing_mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("v0={}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = b"token=xyz&command=%2Fkakeibo&text=%E5%85%88%E6%9C%88";

    #[test]
    fn test_accepts_valid_signature() {
        let signature = sign(SECRET, "1700000000", BODY).unwrap();
        assert!(signature.starts_with("v0="));
        assert!(verify_signature(SECRET, &signature, "1700000000", BODY, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body_and_wrong_secret() {
        let signature = sign(SECRET, "1700000000", BODY).unwrap();
        assert!(matches!(
            verify_signature(SECRET, &signature, "1700000000", b"text=other", 1_700_000_000),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            verify_signature("other", &signature, "1700000000", BODY, 1_700_000_000),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            verify_signature(SECRET, "v0=zz", "1700000000", BODY, 1_700_000_000),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_rejects_stale_or_malformed_timestamp() {
        let signature = sign(SECRET, "1700000000", BODY).unwrap();
        let late = 1_700_000_000 + MAX_CLOCK_SKEW_SECS + 1;
        assert!(verify_signature(SECRET, &signature, "1700000000", BODY, late).is_err());
        assert!(verify_signature(SECRET, &signature, "yesterday", BODY, 1_700_000_000).is_err());
        for extreme in [i64::MIN, i64::MAX] {
            let timestamp = extreme.to_string();
            let signature = sign(SECRET, &timestamp, BODY).unwrap();
            assert!(matches!(
                verify_signature(SECRET, &signature, &timestamp, BODY, 1_700_000_000),
                Err(Error::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_auth_modes() {
        let auth = CommandAuth::from_config(None, Some("legacy"));
        assert!(auth.verify("", "0", BODY, Some("legacy"), 0).is_ok());
        assert!(matches!(
            auth.verify("", "0", BODY, Some("nope"), 0),
            Err(Error::Unauthorized(_))
        ));
        assert!(auth.verify("", "0", BODY, None, 0).is_err());

        let auth = CommandAuth::from_config(Some(SECRET), Some("legacy"));
        assert!(matches!(auth, CommandAuth::SigningSecret(_)));
        assert!(auth.verify("", "0", BODY, Some("legacy"), 0).is_err());

        assert!(matches!(
            CommandAuth::from_config(None, None).verify("", "0", BODY, None, 0),
            Err(Error::NotConfigured(_))
        ));
    }
}
