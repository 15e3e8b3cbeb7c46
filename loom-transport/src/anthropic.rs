//! Bundled HTTPS transport for the Anthropic Messages API.

use std::sync::Arc;
use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::{ChatTransport, CompletionRequest, ErrorBody, TransportError, TransportResult};

/// Environment variable used when loading credentials automatically.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Configuration for the bundled Anthropic transport.
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl AnthropicConfig {
    /// Creates a configuration with default endpoint and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com/".to_owned(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Loads the API key from the `ANTHROPIC_API_KEY` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::new();
        cfg.api_key = env::var(ANTHROPIC_API_KEY_ENV).ok();
        cfg
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] if the supplied URL is
    /// invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> TransportResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat transport that calls the Anthropic Messages API over HTTPS.
pub struct AnthropicTransport {
    client: HyperClient,
    endpoint: Uri,
    api_key: String,
    timeout: Duration,
}

impl fmt::Debug for AnthropicTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl AnthropicTransport {
    /// Constructs a transport with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] if the API key is missing
    /// or the endpoint is invalid.
    pub fn new(config: AnthropicConfig) -> TransportResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| TransportError::configuration("Anthropic transport requires an API key"))?;

        let endpoint = format!("{}v1/messages", config.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                TransportError::configuration(format!("invalid Anthropic endpoint: {err}"))
            })?;

        Ok(Self {
            client: build_https_client(),
            endpoint,
            api_key,
            timeout: config.timeout,
        })
    }

    fn build_payload(request: &CompletionRequest) -> MessagesRequest {
        let system = if request.system().is_empty() {
            None
        } else {
            Some(request.system().to_owned())
        };

        MessagesRequest {
            model: request.model().to_owned(),
            system,
            messages: vec![WireMessage {
                role: "user".to_owned(),
                content: request.user().to_owned(),
            }],
            max_tokens: request.max_tokens(),
            temperature: request.temperature(),
            stream: false,
        }
    }
}

#[async_trait]
impl ChatTransport for AnthropicTransport {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> TransportResult<String> {
        let payload = Self::build_payload(&request);
        let body = serde_json::to_vec(&payload)
            .map_err(|err| TransportError::other(format!("failed to encode request: {err}")))?;

        let http_request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .header(
                "anthropic-version",
                HeaderValue::from_static(ANTHROPIC_VERSION),
            )
            .body(Body::from(body))
            .map_err(|err| TransportError::other(format!("failed to build request: {err}")))?;

        debug!(model = request.model(), "issuing completion request");

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = timeout(self.timeout, self.client.request(http_request)) => result
                .map_err(|_| TransportError::other("completion request timed out"))?
                .map_err(|err| TransportError::other(format!("completion request failed: {err}")))?,
        };

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| TransportError::other(format!("failed to read response: {err}")))?;

        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .ok()
                .and_then(|envelope| envelope.error);
            return Err(TransportError::Request {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_owned(),
                body,
            });
        }

        let response: MessagesResponse = serde_json::from_slice(&bytes)
            .map_err(|err| TransportError::other(format!("failed to decode response: {err}")))?;

        Ok(response
            .content
            .into_iter()
            .map(|block| {
                let ContentBlock::Text { text } = block;
                text
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
}

fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));
    Client::builder().build::<_, Body>(connector)
}

fn sanitize_base_url(input: &str) -> TransportResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(TransportError::configuration(
            "base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| TransportError::configuration(format!("invalid base URL: {err}")))?;
    Ok(base)
}
