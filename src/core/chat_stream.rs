use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::GenerateRequest;
use crate::core::config::{ConnectionSettings, SettingsError};
use crate::core::decoder::{NdjsonDecoder, DEFAULT_MAX_BUFFERED_BYTES};
use crate::core::prompt::{compose_prompt, PromptError};
use crate::core::relay::{EventRelay, Subscription};
use crate::utils::url::{construct_api_url, TransportScheme};

pub const GENERATE_ENDPOINT: &str = "api/generate";

/// Identifier assigned to a turn at dispatch time and carried by every event
/// published for it.
pub type TurnId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Token { text: String, is_final: bool },
    Error { message: String },
    End,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::End)
    }
}

/// Reasons a turn ends in an `Error` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// The server answered with a non-success status.
    Status { code: u16, reason: String },
    /// DNS, refusal, reset, TLS or a body read that failed midway.
    Connection(String),
    /// The server sent an explicit `error` record.
    Upstream(String),
    /// A record was not a JSON object.
    MalformedRecord(String),
    /// No newline arrived before the retained fragment outgrew its limit.
    RecordTooLarge { limit: usize },
}

impl StreamFailure {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamFailure::Status { .. } | StreamFailure::Connection(_)
        )
    }

    pub fn is_protocol(&self) -> bool {
        !self.is_transport()
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFailure::Status { code, reason } => write!(f, "HTTP {code} {reason}"),
            StreamFailure::Connection(detail) => write!(f, "Connection failed: {detail}"),
            StreamFailure::Upstream(message) => write!(f, "{message}"),
            StreamFailure::MalformedRecord(detail) => {
                write!(f, "Malformed stream record: {detail}")
            }
            StreamFailure::RecordTooLarge { limit } => {
                write!(f, "Stream record exceeded {limit} bytes without a newline")
            }
        }
    }
}

impl std::error::Error for StreamFailure {}

impl From<StreamFailure> for StreamEvent {
    fn from(failure: StreamFailure) -> Self {
        StreamEvent::Error {
            message: failure.to_string(),
        }
    }
}

/// Why a turn could not be dispatched at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    Settings(SettingsError),
    Prompt(PromptError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Settings(err) => write!(f, "{err}"),
            DispatchError::Prompt(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<SettingsError> for DispatchError {
    fn from(err: SettingsError) -> Self {
        DispatchError::Settings(err)
    }
}

impl From<PromptError> for DispatchError {
    fn from(err: PromptError) -> Self {
        DispatchError::Prompt(err)
    }
}

pub struct StreamParams {
    pub settings: ConnectionSettings,
    pub request: GenerateRequest,
    pub cancel_token: CancellationToken,
    pub max_buffered_bytes: usize,
}

impl StreamParams {
    pub fn new(
        settings: ConnectionSettings,
        request: GenerateRequest,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            settings,
            request,
            cancel_token,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
        }
    }
}

fn build_client(scheme: TransportScheme) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .https_only(scheme == TransportScheme::Secure)
        .build()
}

fn describe_request_error(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Drive one generate request to completion, handing each event to `emit`
/// in decode order.
///
/// Exactly one terminal event is emitted unless `cancel_token` fires first,
/// in which case the connection is dropped and nothing further is emitted.
pub async fn run_stream<F>(params: StreamParams, mut emit: F)
where
    F: FnMut(StreamEvent),
{
    let StreamParams {
        settings,
        request,
        cancel_token,
        max_buffered_bytes,
    } = params;

    let url = construct_api_url(&settings.endpoint_url, GENERATE_ENDPOINT);
    let scheme = TransportScheme::detect(&settings.endpoint_url);
    debug!(%url, ?scheme, model = %request.model, "dispatching generate request");

    let client = match build_client(scheme) {
        Ok(client) => client,
        Err(err) => {
            emit(StreamFailure::Connection(describe_request_error(&err)).into());
            return;
        }
    };

    let send = client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .json(&request)
        .send();

    let response = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            debug!("turn cancelled before the server responded");
            return;
        }
        result = send => result,
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            let failure = StreamFailure::Connection(describe_request_error(&err));
            warn!(%failure, "generate request failed");
            emit(failure.into());
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let failure = StreamFailure::Status {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        };
        warn!(%failure, "generate request rejected");
        emit(failure.into());
        return;
    }

    let mut decoder = NdjsonDecoder::with_limit(max_buffered_bytes);
    let mut body = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => None,
            next = body.next() => next,
        };
        if cancel_token.is_cancelled() {
            debug!("turn cancelled mid-stream");
            return;
        }
        let Some(chunk) = next else {
            break;
        };

        match chunk {
            Ok(bytes) => {
                for event in decoder.push(&bytes) {
                    emit(event);
                }
                if decoder.is_terminated() {
                    debug!("stream ended by a terminal record");
                    return;
                }
            }
            Err(err) => {
                let failure = StreamFailure::Connection(describe_request_error(&err));
                warn!(%failure, "generate body read failed");
                emit(failure.into());
                return;
            }
        }
    }

    if let Some(event) = decoder.finish() {
        let terminal = event.is_terminal();
        emit(event);
        if terminal {
            return;
        }
    }
    emit(StreamEvent::End);
}

/// Dispatches turns and publishes their events on a shared relay.
#[derive(Clone)]
pub struct ChatStreamService {
    relay: EventRelay,
    last_turn_id: Arc<AtomicU64>,
}

impl Default for ChatStreamService {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamService {
    pub fn new() -> Self {
        Self {
            relay: EventRelay::new(),
            last_turn_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.relay.subscribe()
    }

    fn next_turn_id(&self) -> TurnId {
        self.last_turn_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Compose the prompt for a new turn and start streaming it.
    ///
    /// Returns as soon as the request task is spawned. Must be called from
    /// within a tokio runtime.
    pub fn dispatch_turn(
        &self,
        settings: &ConnectionSettings,
        user_message: &str,
        document_context: &str,
        history: &str,
    ) -> Result<(TurnId, CancellationToken), DispatchError> {
        settings.validate()?;
        let prompt = compose_prompt(document_context, history, user_message)?;
        let request = GenerateRequest::streaming(settings.model_name.clone(), prompt);

        let cancel_token = CancellationToken::new();
        let turn_id = self.spawn_stream(StreamParams::new(
            settings.clone(),
            request,
            cancel_token.clone(),
        ));
        Ok((turn_id, cancel_token))
    }

    pub fn spawn_stream(&self, params: StreamParams) -> TurnId {
        let turn_id = self.next_turn_id();
        let relay = self.relay.clone();
        debug!(turn_id, "spawning stream");
        tokio::spawn(async move {
            run_stream(params, |event| {
                relay.publish(event, turn_id);
            })
            .await;
        });
        turn_id
    }
}
