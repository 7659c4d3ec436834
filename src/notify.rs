//! Summary messages and their delivery to a chat webhook

use std::{future::Future, time::Duration};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Serialize;

use crate::{errors::Error, types::Summary, APP_NAME};

/// A webhook destination must start with this prefix before anything is sent to it
pub const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/services/";

/// How many categories a report message lists
const REPORT_CATEGORIES: usize = 6;

/// JSON body posted to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    /// Message text
    pub text: String,
}

/// Something that can POST a payload to a URL and report the response status
pub trait WebhookTransport: Send + Sync {
    /// Posts `payload` as JSON to `url`, returning the HTTP status on success.
    /// # Errors
    /// [`Error::Delivery`] on timeouts, connection failures and non-success statuses
    fn post(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> impl Future<Output = Result<u16, Error>> + Send;
}

/// [`WebhookTransport`] backed by a shared [`reqwest::Client`] with a request timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport whose requests give up after `timeout`
    /// # Errors
    /// [`Error::NotConfigured`] if the HTTP client cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::NotConfigured(format!("HTTP client: {err}")))?;
        Ok(Self::with_client(client))
    }

    /// Wraps an already-configured client, which should carry its own timeout
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<u16, Error> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| Error::Delivery(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Delivery(format!("webhook answered {status}")));
        }
        Ok(status.as_u16())
    }
}

/// Whether `destination` may receive messages
#[must_use]
pub fn is_allowed_destination(destination: &str) -> bool {
    destination.starts_with(SLACK_WEBHOOK_PREFIX)
}

/// Relays messages to allow-listed webhook destinations.
///
/// Delivery is attempted at most once and never retried.
#[derive(Debug, Clone)]
pub struct Dispatcher<T = HttpTransport> {
    transport: T,
}

impl<T: WebhookTransport> Dispatcher<T> {
    /// Creates a dispatcher sending through `transport`
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Sends `message` to `destination`, returning the webhook's HTTP status.
    /// # Errors
    /// - [`Error::DestinationNotAllowed`] without any network call if the destination
    ///   does not start with [`SLACK_WEBHOOK_PREFIX`]
    /// - [`Error::Delivery`] if the call fails or times out
    pub async fn send(&self, message: &str, destination: &str) -> Result<u16, Error> {
        if !is_allowed_destination(destination) {
            return Err(Error::DestinationNotAllowed(redact(destination)));
        }
        let payload = WebhookPayload {
            text: message.to_string(),
        };
        self.transport.post(destination, &payload).await
    }
}

/// Keeps the scheme and host of a rejected destination, dropping any secret path
fn redact(destination: &str) -> String {
    match destination.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            format!("{scheme}://{host}/…")
        }
        None => "(not a URL)".to_string(),
    }
}

/// Formats an amount as whole yen with thousands separators, e.g. `-1,691`.
/// Fractions are truncated toward zero.
#[must_use]
pub fn format_yen(amount: Decimal) -> String {
    let whole = amount.trunc().to_i128().unwrap_or_default();
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if whole < 0 {
        grouped.push('-');
    }
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

fn totals_lines(summary: &Summary) -> [String; 3] {
    [
        format!("収入: {} 円", format_yen(summary.income)),
        format!("支出: {} 円", format_yen(summary.expense)),
        format!("収支: {} 円", format_yen(summary.net)),
    ]
}

/// Multi-line monthly report posted to the webhook
#[must_use]
pub fn format_report(summary: &Summary) -> String {
    let mut lines = vec![format!("{APP_NAME} 月次レポート: {}", summary.month)];
    lines.extend(totals_lines(summary));
    lines.push("カテゴリ内訳:".to_string());
    let mut categories: Vec<_> = summary.by_category.iter().flatten().collect();
    categories.sort_by(|a, b| b.total.abs().cmp(&a.total.abs()));
    for category in categories.into_iter().take(REPORT_CATEGORIES) {
        lines.push(format!(
            "・{}: {} 円",
            category.category,
            format_yen(category.total)
        ));
    }
    lines.join("\n")
}

/// Short reply to a slash command
#[must_use]
pub fn format_command_reply(summary: &Summary) -> String {
    let mut lines = vec![format!("{}の収支", summary.month)];
    lines.extend(totals_lines(summary));
    lines.join("\n")
}
