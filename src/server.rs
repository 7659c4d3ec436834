//! HTTP endpoints wiring the ledger components together

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    errors::{Error, RowParseError},
    io::decode_ledger,
    month::{resolve_month, MonthKey},
    notify::{format_command_reply, format_report, Dispatcher, HttpTransport},
    ops::summarize,
    paths::PathResolver,
    signature::CommandAuth,
    types::{Ledger, LedgerRecord, Summary, SummaryOptions, TransferPolicy},
    APP_NAME,
};

/// Japan Standard Time, the reference zone for "this month" and "last month"
const JST_OFFSET_SECS: i32 = 9 * 60 * 60;

const DEFAULT_PREVIEW_ROWS: usize = 10;
const MAX_PREVIEW_ROWS: usize = 200;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    config: Config,
    /// The resolver, or why there is none
    ledgers: Result<PathResolver, String>,
    dispatcher: Dispatcher<HttpTransport>,
    clock: fn() -> DateTime<Utc>,
}

impl AppState {
    /// Builds the state from configuration, reading the wall clock for relative months
    /// # Errors
    /// [`Error::NotConfigured`] if the webhook HTTP client cannot be built
    pub fn new(config: Config) -> Result<Self, Error> {
        Self::with_clock(config, Utc::now)
    }

    /// Like [`AppState::new`] with an injected clock
    /// # Errors
    /// [`Error::NotConfigured`] if the webhook HTTP client cannot be built
    pub fn with_clock(config: Config, clock: fn() -> DateTime<Utc>) -> Result<Self, Error> {
        let ledgers = match &config.ledger_dir {
            None => Err("KAKEIBO_DIR not set".to_string()),
            Some(dir) => PathResolver::new(dir).map_err(|err| {
                tracing::warn!(%err, "ledger directory unavailable");
                "KAKEIBO_DIR path invalid or not a directory".to_string()
            }),
        };
        let dispatcher = Dispatcher::new(HttpTransport::new(config.notify_timeout)?);
        Ok(Self {
            inner: Arc::new(Shared {
                config,
                ledgers,
                dispatcher,
                clock,
            }),
        })
    }

    fn resolver(&self) -> Result<&PathResolver, Error> {
        self.inner.ledgers.as_ref().map_err(|_| {
            Error::NotConfigured("KAKEIBO_DIR is not configured or invalid".to_string())
        })
    }

    fn now(&self) -> DateTime<Utc> {
        (self.inner.clock)()
    }

    /// Runs a directory lookup on the blocking pool
    async fn with_resolver<T, F>(&self, lookup: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&PathResolver) -> Result<T, Error> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || lookup(state.resolver()?))
            .await
            .map_err(|err| Error::Io(std::io::Error::other(err)))?
    }

    /// Resolves, reads and decodes one ledger file
    async fn read_ledger(&self, filename: &str) -> Result<(String, Ledger), Error> {
        let filename = filename.to_string();
        let path = self
            .with_resolver(move |resolver| resolver.resolve(&filename))
            .await?;
        let bytes = tokio::fs::read(&path).await?;
        let name = crate::io::source_name(&path);
        let ledger = decode_ledger(&bytes, &name, self.inner.config.row_policy)?;
        Ok((name, ledger))
    }

    /// Decodes every ledger in the directory, skipping files that cannot be read
    async fn read_all_ledgers(&self) -> Result<(Vec<String>, Ledger), Error> {
        let mut used = Vec::new();
        let mut combined = Ledger::default();
        for filename in self.with_resolver(PathResolver::list).await? {
            match self.read_ledger(&filename).await {
                Ok((name, ledger)) => {
                    used.push(name);
                    combined.extend(ledger);
                }
                Err(err) => tracing::warn!(file = %filename, %err, "skipping unreadable ledger"),
            }
        }
        Ok((used, combined))
    }
}

fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).expect("UTC+9 is a valid offset")
}

fn jst_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&jst()).date_naive()
}

/// Builds the router; attach an [`AppState`] with `with_state`
pub fn app() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/read_csv", post(read_csv))
        .route("/summarize", post(summarize_handler))
        .route("/report", post(report))
        .route("/slack/command", post(slack_command))
}

/// Error body: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidPath(_)
            | Error::BadRequest(_)
            | Error::UnresolvedMonth(_)
            | Error::DestinationNotAllowed(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Decode(_) | Error::Schema(_) | Error::NoUsableRows(_) | Error::RowParse(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Delivery(_) => StatusCode::BAD_GATEWAY,
            Error::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Io(_) | Error::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(err = %self, code = self.code(), "request failed");
        } else {
            tracing::info!(err = %self, code = self.code(), "request rejected");
        }
        #[derive(Serialize)]
        struct Envelope {
            error: ErrorBody,
        }
        let body = Envelope {
            error: ErrorBody::from(&self),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    app: &'static str,
    base_dir: Option<String>,
    csv_files: Vec<String>,
    reason: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = match &state.inner.ledgers {
        Ok(resolver) => HealthResponse {
            status: "ok",
            app: APP_NAME,
            base_dir: Some(resolver.root().display().to_string()),
            csv_files: state
                .with_resolver(PathResolver::list)
                .await
                .unwrap_or_else(|err| {
                    tracing::warn!(%err, "could not list ledger directory");
                    Vec::new()
                }),
            reason: None,
        },
        Err(reason) => HealthResponse {
            status: "unconfigured",
            app: APP_NAME,
            base_dir: None,
            csv_files: Vec::new(),
            reason: Some(reason.clone()),
        },
    };
    Json(response)
}

#[derive(Debug, Deserialize)]
struct ReadCsvRequest {
    filename: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReadCsvResponse {
    Listing {
        files: Vec<String>,
        count: usize,
    },
    Preview {
        filename: String,
        rows: usize,
        preview: Vec<LedgerRecord>,
        warnings: Vec<RowParseError>,
    },
}

async fn read_csv(
    State(state): State<AppState>,
    payload: Result<Json<ReadCsvRequest>, JsonRejection>,
) -> Result<Json<ReadCsvResponse>, Error> {
    let Json(req) = payload?;
    let filename = req.filename.as_deref().map(str::trim).unwrap_or_default();
    if filename.is_empty() {
        let files = state.with_resolver(PathResolver::list).await?;
        return Ok(Json(ReadCsvResponse::Listing {
            count: files.len(),
            files,
        }));
    }
    let limit = req.limit.unwrap_or(DEFAULT_PREVIEW_ROWS);
    if !(1..=MAX_PREVIEW_ROWS).contains(&limit) {
        return Err(Error::BadRequest(format!(
            "limit must be between 1 and {MAX_PREVIEW_ROWS}"
        )));
    }
    let (name, ledger) = state.read_ledger(filename).await?;
    let rows = ledger.records.len();
    let mut preview = ledger.records;
    preview.truncate(limit);
    Ok(Json(ReadCsvResponse::Preview {
        filename: name,
        rows,
        preview,
        warnings: ledger.warnings,
    }))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    month: String,
    filename: Option<String>,
    #[serde(default)]
    exclude_transfers: bool,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    #[serde(flatten)]
    summary: Summary,
    files_used: Vec<String>,
    warnings: Vec<RowParseError>,
}

async fn summarize_request(
    state: &AppState,
    req: &SummarizeRequest,
) -> Result<SummaryResponse, Error> {
    let month = resolve_month(&req.month, jst_date(state.now()))?;
    let (files_used, ledger) = match req.filename.as_deref().map(str::trim) {
        Some(filename) if !filename.is_empty() => {
            let (name, ledger) = state.read_ledger(filename).await?;
            (vec![name], ledger)
        }
        _ => state.read_all_ledgers().await?,
    };
    let options = SummaryOptions {
        transfers: if req.exclude_transfers {
            TransferPolicy::Exclude
        } else {
            TransferPolicy::Include
        },
        ..SummaryOptions::default()
    };
    Ok(SummaryResponse {
        summary: summarize(&ledger.records, month, &options),
        files_used,
        warnings: ledger.warnings,
    })
}

async fn summarize_handler(
    State(state): State<AppState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummaryResponse>, Error> {
    let Json(req) = payload?;
    summarize_request(&state, &req).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct ReportRequest {
    #[serde(flatten)]
    summary: SummarizeRequest,
    #[serde(default)]
    post_to_slack: bool,
}

#[derive(Debug, Serialize)]
struct ReportResponse {
    summary: SummaryResponse,
    slack_posted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    slack_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_error: Option<ErrorBody>,
}

async fn report(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<ReportResponse>, Error> {
    let Json(req) = payload?;
    let summary = summarize_request(&state, &req.summary).await?;
    let mut response = ReportResponse {
        summary,
        slack_posted: false,
        slack_status_code: None,
        notification_error: None,
    };
    if !req.post_to_slack {
        return Ok(Json(response));
    }

    let delivery = match state.inner.config.webhook_url.as_deref() {
        None => Err(Error::NotConfigured(
            "SLACK_WEBHOOK_URL is not configured".to_string(),
        )),
        Some(url) => {
            let message = format_report(&response.summary.summary);
            state.inner.dispatcher.send(&message, url).await
        }
    };
    // The summary already succeeded, so a failed notification is only reported
    match delivery {
        Ok(status) => {
            response.slack_posted = true;
            response.slack_status_code = Some(status);
        }
        Err(err) => {
            tracing::warn!(%err, "report notification failed");
            response.notification_error = Some(ErrorBody::from(&err));
        }
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct SlashCommand {
    token: Option<String>,
    command: Option<String>,
    text: Option<String>,
    user_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SlashCommandReply {
    response_type: &'static str,
    text: String,
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn slack_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SlashCommandReply>, Error> {
    let command: SlashCommand = serde_urlencoded::from_bytes(&body)
        .map_err(|err| Error::BadRequest(format!("malformed slash command: {err}")))?;
    let signature = header(&headers, "x-slack-signature");
    let timestamp = header(&headers, "x-slack-request-timestamp");
    let now = state.now();
    if let Err(err) = state.inner.config.command_auth.verify(
        signature,
        timestamp,
        &body,
        command.token.as_deref(),
        now.timestamp(),
    ) {
        tracing::warn!(%err, user = ?command.user_name, "slash command refused");
        return Err(err);
    }

    // The request timestamp is only trusted when the signature covered it
    let signed_at = match state.inner.config.command_auth {
        CommandAuth::SigningSecret(_) => timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    };
    let reference = signed_at.unwrap_or(now);
    let today = jst_date(reference);
    let month = match command.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => resolve_month(text, today)?,
        _ => MonthKey::of(today),
    };
    tracing::info!(
        user = ?command.user_name,
        command = ?command.command,
        %month,
        "slash command"
    );

    let (_, ledger) = state.read_all_ledgers().await?;
    let summary = summarize(&ledger.records, month, &SummaryOptions::default());
    Ok(Json(SlashCommandReply {
        response_type: "ephemeral",
        text: format_command_reply(&summary),
    }))
}
