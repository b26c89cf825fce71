use std::time::Duration;

#[cfg(all(feature = "reqwest", feature = "ureq"))]
compile_error!("Features 'reqwest' and 'ureq' are mutually exclusive.");

#[cfg(not(any(feature = "reqwest", feature = "ureq")))]
compile_error!("One of the features 'reqwest' and 'ureq' must be enabled.");

use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Input must be a single non-empty string: {0}")]
    InvalidInput(String),

    #[error("API key is missing")]
    MissingCredential,

    #[error("The configuration contains errors: {0}")]
    BadConfiguration(String),

    #[error("Failed to serialize request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request failed with status {status}")]
    Remote { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    MalformedResponse(serde_json::Error),
}

/// Coarse classification of an [`Error`], for callers that only need to
/// decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    MissingCredential,
    BadConfiguration,
    Transport,
    Remote,
    MalformedResponse,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::MissingCredential => ErrorKind::MissingCredential,
            Error::BadConfiguration(_) | Error::SerializationError(_) => {
                ErrorKind::BadConfiguration
            }
            Error::Transport(_) => ErrorKind::Transport,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    /// HTTP status of a remote failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The `input` of an embeddings request.
///
/// Only [`Input::String`] is sent. The other shapes exist so that callers
/// holding loosely typed data get an [`Error::InvalidInput`] instead of a
/// silently reshaped request.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    String(String),
    Array(Vec<String>),
    Other(serde_json::Value),
}

impl Input {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Input::String(string) => Some(string),
            _ => None,
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::String(String::new())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Vec<String>> for Input {
    fn from(values: Vec<String>) -> Self {
        Self::Array(values)
    }
}

impl From<&[String]> for Input {
    fn from(values: &[String]) -> Self {
        Self::Array(values.to_vec())
    }
}

impl From<serde_json::Value> for Input {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(string) => Self::String(string),
            serde_json::Value::Array(items) if items.iter().all(|item| item.is_string()) => {
                Self::Array(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            serde_json::Value::String(string) => Some(string),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => Self::Other(other),
        }
    }
}

/// Embeddings request.
///
/// The API key is only used for the `Authorization` header of the one call
/// made with this request. It is never logged, and `Debug` redacts it.
///
/// Construct it with the default trait to target OpenAI:
///
/// ```rust
/// let request = embedding_client::EmbeddingRequest {
///     input: "Hello".into(),
///     api_key: "sk-test".into(),
///     ..Default::default()
/// };
/// assert_eq!(request.model, embedding_client::DEFAULT_EMBEDDING_MODEL);
/// ```
#[derive(Clone)]
pub struct EmbeddingRequest {
    pub endpoint_url: String,
    pub model: String,
    pub input: Input,
    pub api_key: String,
}

impl Default for EmbeddingRequest {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_EMBEDDINGS_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            input: Input::default(),
            api_key: String::new(),
        }
    }
}

impl std::fmt::Debug for EmbeddingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingRequest")
            .field("endpoint_url", &self.endpoint_url)
            .field("model", &self.model)
            .field("input", &self.input)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(serde::Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    input: &'a str,
}

impl EmbeddingRequest {
    pub fn new(
        endpoint_url: impl Into<String>,
        model: impl Into<String>,
        input: impl Into<Input>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model: model.into(),
            input: input.into(),
            api_key: api_key.into(),
        }
    }

    /// Checks everything that can be checked without touching the network.
    ///
    /// Returns the input text on success.
    pub fn validate(&self) -> Result<&str, Error> {
        let input = match &self.input {
            Input::String(string) if string.is_empty() => {
                return Err(Error::InvalidInput("input is empty".into()))
            }
            Input::String(string) => string.as_str(),
            Input::Array(_) => {
                return Err(Error::InvalidInput(
                    "got an array of strings, batches are not supported".into(),
                ))
            }
            Input::Other(value) => {
                return Err(Error::InvalidInput(format!("got a non-string value: {}", value)))
            }
        };

        if self.api_key.trim().is_empty() {
            return Err(Error::MissingCredential);
        }

        if self.api_key.chars().any(char::is_control) {
            return Err(Error::BadConfiguration(
                "API key contains control characters".into(),
            ));
        }

        if self.endpoint_url.is_empty() {
            return Err(Error::BadConfiguration("No endpoint URL given".into()));
        }

        let url = url::Url::parse(&self.endpoint_url).map_err(|e| {
            Error::BadConfiguration(format!("Invalid endpoint URL {}: {}", self.endpoint_url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::BadConfiguration(format!(
                "Unsupported endpoint URL scheme: {}",
                url.scheme()
            )));
        }

        if self.model.is_empty() {
            return Err(Error::BadConfiguration("No model given".into()));
        }

        Ok(input)
    }

    fn to_body(&self) -> Result<String, Error> {
        let input = self.validate()?;
        let body = RequestBody {
            model: &self.model,
            input,
        };

        serde_json::to_string(&body).map_err(Error::SerializationError)
    }
}

/// Response of the embeddings endpoint, passed through as received.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EmbeddingResponse(serde_json::Value);

#[derive(Deserialize)]
struct EmbeddingsData {
    data: Vec<Embedding>,
}

#[derive(Deserialize)]
struct Embedding {
    #[serde(default)]
    index: u64,
    embedding: Vec<f64>,
}

impl EmbeddingResponse {
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(serde_json::Value::as_str)
    }

    /// The embedding vectors, ordered by `index`, if the payload has the
    /// OpenAI `data[].embedding` shape.
    pub fn vectors(&self) -> Option<Vec<Vec<f64>>> {
        let mut parsed = EmbeddingsData::deserialize(&self.0).ok()?;
        parsed.data.sort_by_key(|item| item.index);

        Some(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

impl From<EmbeddingResponse> for serde_json::Value {
    fn from(response: EmbeddingResponse) -> Self {
        response.0
    }
}

struct RawResponse {
    status: u16,
    body: String,
}

impl RawResponse {
    fn interpret(self) -> Result<EmbeddingResponse, Error> {
        debug!(status = self.status, "embedding endpoint responded");

        if self.status != 200 {
            warn!(status = self.status, "embedding request failed");
            return Err(Error::Remote {
                status: self.status,
                body: self.body,
            });
        }

        serde_json::from_str(&self.body)
            .map(EmbeddingResponse)
            .map_err(Error::MalformedResponse)
    }
}

#[cfg(feature = "ureq")]
struct ClientImpl {
    client: ureq::Agent,
    timeout: Option<Duration>,
}

#[cfg(feature = "ureq")]
impl ClientImpl {
    fn new() -> Result<ClientImpl, Error> {
        // A redirect would be a second outbound call; report it as a status.
        let client = ureq::AgentBuilder::new().redirects(0).build();

        Ok(Self {
            client,
            timeout: None,
        })
    }

    fn do_request(&self, url: &str, api_key: &str, body: String) -> Result<RawResponse, Error> {
        let mut request = self
            .client
            .post(url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", api_key));

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        match request.send_string(&body) {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| Error::Transport(e.to_string()))?;
                Ok(RawResponse { status, body })
            }
            // ureq reports 4xx/5xx as errors, but they are still responses.
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_else(|e| {
                    debug!(status, error = %e, "failed to read error response body");
                    format!("<failed to read response body: {}>", e)
                });
                Ok(RawResponse { status, body })
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }
}

#[cfg(feature = "reqwest")]
struct ClientImpl {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

#[cfg(feature = "reqwest")]
impl ClientImpl {
    fn new() -> Result<ClientImpl, Error> {
        let client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::BadConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            timeout: None,
        })
    }

    async fn do_request(
        &self,
        url: &str,
        api_key: &str,
        body: String,
    ) -> Result<RawResponse, Error> {
        let mut authorization =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| Error::BadConfiguration(e.to_string()))?;
        authorization.set_sensitive(true);

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, authorization)
            .body(body);

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}

/// Client for embeddings endpoints.
///
/// The client holds no credentials and no per-call state. Endpoint, model and
/// API key all travel with each [`EmbeddingRequest`], so one client can serve
/// concurrent calls for different callers.
pub struct Client {
    inner: ClientImpl,
}

impl Client {
    /// Creates a new `Client` without a timeout.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `Client` instance, or an `Error` if the
    /// HTTP backend cannot be initialized.
    pub fn new() -> Result<Client, Error> {
        let inner = ClientImpl::new()?;
        Ok(Self { inner })
    }

    /// Bounds every request made by this client, from connecting to reading
    /// the last byte of the body. Redirects are not followed. An expired timeout is reported as
    /// [`Error::Transport`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    /// Sends one request to an embeddings endpoint.
    ///
    /// The request is validated first; a request that fails validation never
    /// reaches the network. Any status other than 200 is returned as
    /// [`Error::Remote`] with the body kept for diagnostics.
    ///
    /// Dropping the returned future cancels the request.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use embedding_client::{Client, EmbeddingRequest};
    ///
    /// let client = Client::new().unwrap();
    ///
    /// let request = EmbeddingRequest {
    ///     input: "Hello".into(),
    ///     api_key: std::env::var("OPENAI_API_KEY").unwrap(),
    ///     ..Default::default()
    /// };
    ///
    /// let response = client.request_embedding(&request).await.unwrap();
    ///
    /// println!("{:?}", response.vectors());
    /// ```
    #[cfg(feature = "reqwest")]
    pub async fn request_embedding(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, Error> {
        let body = request.to_body()?;

        debug!(endpoint = %request.endpoint_url, model = %request.model, "sending embedding request");
        let response = self
            .inner
            .do_request(&request.endpoint_url, &request.api_key, body)
            .await?;

        response.interpret()
    }

    /// Sends one request to an embeddings endpoint.
    ///
    /// The request is validated first; a request that fails validation never
    /// reaches the network. Any status other than 200 is returned as
    /// [`Error::Remote`] with the body kept for diagnostics.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use embedding_client::{Client, EmbeddingRequest};
    ///
    /// let client = Client::new().unwrap();
    ///
    /// let request = EmbeddingRequest {
    ///     input: "Hello".into(),
    ///     api_key: std::env::var("OPENAI_API_KEY").unwrap(),
    ///     ..Default::default()
    /// };
    ///
    /// let response = client.request_embedding(&request).unwrap();
    ///
    /// println!("{:?}", response.vectors());
    /// ```
    #[cfg(feature = "ureq")]
    pub fn request_embedding(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse, Error> {
        let body = request.to_body()?;

        debug!(endpoint = %request.endpoint_url, model = %request.model, "sending embedding request");
        let response = self
            .inner
            .do_request(&request.endpoint_url, &request.api_key, body)?;

        response.interpret()
    }
}

/// One-shot call with a fresh [`Client`].
#[cfg(feature = "reqwest")]
pub async fn request_embedding(request: &EmbeddingRequest) -> Result<EmbeddingResponse, Error> {
    request.validate()?;
    Client::new()?.request_embedding(request).await
}

/// One-shot call with a fresh [`Client`].
#[cfg(feature = "ureq")]
pub fn request_embedding(request: &EmbeddingRequest) -> Result<EmbeddingResponse, Error> {
    request.validate()?;
    Client::new()?.request_embedding(request)
}
