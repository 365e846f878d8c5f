//! Unified error type.

/// Boxed error accepted from user code and from request bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shorthand for `Result<T, easierweb::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type flowing through handles, plugins and the server.
///
/// Anything a handle returns as `Err`, and any panic raised inside the
/// middleware chain, ends up in the router's
/// [`ErrorHandle`](crate::plugins::ErrorHandle) as one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("read request body: {0}")]
    Body(#[source] BoxError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("xml: {0}")]
    Xml(String),

    #[error("bind: {0}")]
    Bind(#[from] serde_urlencoded::de::Error),

    #[error("encode params: {0}")]
    EncodeParams(#[from] serde_urlencoded::ser::Error),

    #[error("param `{key}`: {message}")]
    Param { key: String, message: String },

    #[error("multipart: {0}")]
    Multipart(#[from] multer::Error),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("form file `{0}` not found")]
    FileNotFound(String),

    #[error("invalid header: {0}")]
    Header(String),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not a websocket connection")]
    NotWebSocket,

    #[error("websocket connection closed")]
    WebSocketClosed,

    #[error("not an event stream")]
    NotEventStream,

    #[error("event stream closed by client")]
    StreamClosed,

    #[error("tls: {0}")]
    Tls(String),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("unsupported method `{0}`")]
    Method(String),

    #[error("panic: {0}")]
    Panic(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Custom(BoxError),
}

impl Error {
    /// Wraps any error type from application code.
    pub fn custom(err: impl Into<BoxError>) -> Self {
        Self::Custom(err.into())
    }

    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml(err.to_string())
    }

    pub(crate) fn header(err: impl std::fmt::Display) -> Self {
        Self::Header(err.to_string())
    }

    /// Builds a [`Error::Panic`] from a payload caught by `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_owned()
        };
        Self::Panic(message)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Self::Message(msg.to_owned())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Self::Message(msg)
    }
}
