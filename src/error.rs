use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Broad classification of every error this crate returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server could not be reached, the connection failed, or it answered with a bad status.
    Transport,
    /// The websocket was opened but the server didn't complete the subscription handshake.
    Handshake,
    /// The server answered, but reported errors (or no data) in the graphql response.
    Protocol,
    /// The response didn't match the shape of the operation's response data.
    Decode,
    /// Anything else, such as invalid configuration.
    Other,
}

/// Errors that can occur when interpreting a graphql response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Errors returned by the server in the `errors` array of the response.
    /// Displays as the message of the first error.
    #[error(transparent)]
    Graphql(#[from] GraphqlErrors),

    /// The graphql response contained no errors, but null data.
    #[error("Missing response data")]
    NoData,

    /// The response, or its `data`, could not be decoded into the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Graphql(_) | Self::NoData => ErrorKind::Protocol,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// A non-empty list of errors returned by a graphql server, together with whatever `data`
/// came back alongside them.
#[derive(Debug, Clone)]
pub struct GraphqlErrors {
    errors: Vec<graphql_client::Error>,
    data: Option<Value>,
}

impl GraphqlErrors {
    /// Wrap the errors of a response. Returns `None` if there are no errors.
    pub fn new(errors: Vec<graphql_client::Error>, data: Option<Value>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors, data })
        }
    }

    /// Every error the server returned, in order. Never empty.
    pub fn errors(&self) -> &[graphql_client::Error] {
        &self.errors
    }

    /// The first error the server returned.
    pub fn first(&self) -> &graphql_client::Error {
        &self.errors[0]
    }

    /// The raw `data` returned alongside the errors, if it wasn't null.
    pub fn raw_data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Decode the partial `data` returned alongside the errors.
    ///
    /// Returns `None` if the server returned null data.
    pub fn partial_data<T>(&self) -> Option<Result<T, serde_json::Error>>
    where
        T: DeserializeOwned,
    {
        self.data.as_ref().map(T::deserialize)
    }

    /// Take the errors, dropping any partial data.
    pub fn into_errors(self) -> Vec<graphql_client::Error> {
        self.errors
    }
}

impl fmt::Display for GraphqlErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.first().message)
    }
}

impl std::error::Error for GraphqlErrors {}

/// Errors that can occur when using the http connection.
#[cfg(feature = "http")]
#[derive(Debug, thiserror::Error)]
pub enum HttpConnectionError {
    /// Generic error
    #[error(transparent)]
    Error(#[from] Error),

    /// The server answered with a non-success status code.
    #[error("non-2xx status code: {status} body: {body:?}")]
    BadStatus {
        /// Status code of the response
        status: u16,
        /// Body of the response, empty if it couldn't be read
        body: String,
    },

    /// The request could not be sent, or the response could not be read.
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

#[cfg(feature = "http")]
impl HttpConnectionError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Error(err) => err.kind(),
            Self::BadStatus { .. } | Self::Request(_) => ErrorKind::Transport,
        }
    }
}

/// Errors that can occur when using the websocket connection.
#[cfg(feature = "websocket")]
#[derive(Debug, thiserror::Error)]
pub enum WebsocketConnectionError {
    /// Generic error
    #[error(transparent)]
    Error(#[from] Error),

    /// The endpoint is not a valid url.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint's scheme has no websocket equivalent.
    #[error("unsupported url scheme `{0}`, expected one of http, https, ws or wss")]
    UnsupportedScheme(String),

    /// A header could not be added to the websocket upgrade request.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The socket failed to connect, or failed while sending.
    #[error(transparent)]
    Socket(#[from] async_tungstenite::tungstenite::Error),

    /// The server didn't complete the `graphql-ws` handshake.
    #[error("handshake failed: {0}")]
    Handshake(#[from] gql_client_protocol::socket::HandshakeError),

    /// A frame could not be produced in the session's current state.
    #[error(transparent)]
    Session(#[from] gql_client_protocol::socket::SessionError),

    /// The socket closed before the subscription was established.
    #[error("socket closed")]
    SocketClosed,
}

#[cfg(feature = "websocket")]
impl WebsocketConnectionError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Error(err) => err.kind(),
            Self::Socket(_) | Self::SocketClosed => ErrorKind::Transport,
            Self::Handshake(_) => ErrorKind::Handshake,
            Self::InvalidUrl(_)
            | Self::UnsupportedScheme(_)
            | Self::InvalidHeader(_)
            | Self::Session(_) => ErrorKind::Other,
        }
    }
}
