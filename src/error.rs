use core::fmt;

/// Different error types surfaced by the Presto client.
#[derive(Debug, Clone)]
pub enum Error {
    /// DSN or client-registration inconsistency.
    Config(String),
    /// Network, DNS, or TLS failure while talking to the coordinator.
    Transport(String),
    /// The server answered with a non-2xx status or an error envelope.
    QueryFailed { status: u16, reason: String },
    /// The query was cancelled, either by the server or by the caller.
    QueryCancelled,
    /// The server set a header this client refuses to silently drop.
    UnsupportedHeader(String),
    /// A progress observer and its period must be registered together.
    InvalidProgressHeaders,
    /// The parameter value has no Presto literal representation.
    UnsupportedArg(String),
    /// Malformed JSON or an unexpected wire shape.
    Decode(String),
    /// The operation is not part of the Presto protocol surface.
    OperationNotSupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "client configuration error: {}", msg),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::QueryFailed { status, reason } => {
                write!(f, "query failed ({}): {:?}", status, reason)
            }
            Error::QueryCancelled => write!(f, "query cancelled"),
            Error::UnsupportedHeader(name) => {
                write!(f, "server response contains an unsupported header: {}", name)
            }
            Error::InvalidProgressHeaders => write!(
                f,
                "both X-Presto-Progress-Callback and X-Presto-Progress-Callback-Period \
                 must be set when using a progress callback"
            ),
            Error::UnsupportedArg(kind) => write!(f, "unsupported arg type: {}", kind),
            Error::Decode(msg) => write!(f, "decode error: {}", msg),
            Error::OperationNotSupported(op) => write!(f, "operation not supported: {}", op),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Decode(error.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::Config(error.to_string())
    }
}
