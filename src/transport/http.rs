//! Blocking HTTP transport for the subscribe endpoint.

use super::interrupt::{with_cancel, InterruptibleConnector};
use super::{LongPollRequest, LongPollResponse, Transport};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{Result, SubscribeError, TransportErrorKind};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};
use ureq::unversioned::resolver::DefaultResolver;
use url::Url;

/// Longest service error message kept in an error.
const MAX_ERROR_MESSAGE: usize = 256;

/// Subscribe transport over `ureq`.
///
/// Cancelling the token of a call in flight aborts its socket read and closes
/// the connection; the call then returns `Cancelled`.
pub struct HttpTransport {
    agent: ureq::Agent,
    base: Url,
    subscribe_key: String,
    user_id: String,
    presence_timeout: Option<u32>,
    filter_expression: Option<String>,
}

/// Structured error body returned by the service.
#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let base = Url::parse(&config.base_url())
            .map_err(|e| SubscribeError::InvalidConfiguration(format!("origin: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(SubscribeError::InvalidConfiguration(format!(
                "origin cannot be a base URL: {}",
                config.origin
            )));
        }

        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.long_poll_timeout))
            .http_status_as_error(false)
            .build();

        Ok(Self {
            agent: ureq::Agent::with_parts(
                agent_config,
                InterruptibleConnector::default(),
                DefaultResolver::default(),
            ),
            base,
            subscribe_key: config.subscribe_key.clone(),
            user_id: config.user_id.clone(),
            presence_timeout: config.presence_timeout,
            filter_expression: config.filter_expression.clone(),
        })
    }

    /// Build the subscribe URL for a request.
    pub fn request_url(&self, request: &LongPollRequest) -> Result<Url> {
        let channels = if request.channels.is_empty() {
            ",".to_string()
        } else {
            request.channels.join(",")
        };

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SubscribeError::InvalidConfiguration("origin cannot be a base URL".into()))?
            .clear()
            .extend(["v2", "subscribe", self.subscribe_key.as_str(), channels.as_str(), "0"]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uuid", &self.user_id);
            if !request.groups.is_empty() {
                query.append_pair("channel-group", &request.groups.join(","));
            }
            if request.is_initial {
                query.append_pair("tt", "0");
            } else {
                query.append_pair("tt", &request.cursor.timetoken.to_string());
                if request.cursor.region != 0 {
                    query.append_pair("tr", &request.cursor.region.to_string());
                }
            }
            if let Some(heartbeat) = self.presence_timeout {
                query.append_pair("heartbeat", &heartbeat.to_string());
            }
            if let Some(ref filter) = self.filter_expression {
                query.append_pair("filter-expr", filter);
            }
        }

        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn long_poll(&self, request: &LongPollRequest, cancel: &CancelToken) -> Result<LongPollResponse> {
        if cancel.is_cancelled() {
            return Err(SubscribeError::Cancelled);
        }

        let url = self.request_url(request)?;
        debug!(initial = request.is_initial, cursor = %request.cursor, "long-poll request");

        let result = with_cancel(cancel, || {
            let mut response = self.agent.get(url.as_str()).call()?;
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.body_mut().read_to_string()?;
            Ok::<_, ureq::Error>((status, retry_after, body))
        });
        if cancel.is_cancelled() {
            debug!("long-poll cancelled");
            return Err(SubscribeError::Cancelled);
        }
        let (status, retry_after, body) = result.map_err(classify_error)?;
        trace!(status, bytes = body.len(), "long-poll response");

        if status >= 400 {
            return Err(SubscribeError::Service {
                status,
                message: service_message(&body),
                retry_after,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn service_message(body: &str) -> String {
    let message = serde_json::from_str::<ServiceErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| body.to_string());
    truncate(&message, MAX_ERROR_MESSAGE).to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Map a transport failure onto the error taxonomy.
fn classify_error(error: ureq::Error) -> SubscribeError {
    let message = error.to_string();
    let kind = match &error {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::NameResolution,
        ureq::Error::ConnectionFailed => TransportErrorKind::Connection,
        ureq::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            _ => TransportErrorKind::Connection,
        },
        _ => {
            let lower = message.to_lowercase();
            if lower.contains("tls") || lower.contains("certificate") {
                TransportErrorKind::Tls
            } else if lower.contains("timed out") || lower.contains("timeout") {
                TransportErrorKind::Timeout
            } else {
                TransportErrorKind::Other
            }
        }
    };
    SubscribeError::Transport { kind, message }
}
