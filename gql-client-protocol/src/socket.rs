//! The `graphql-ws` subscription protocol.
//!
//! A [`SubscriptionSession`] drives a single subscription over a single socket:
//!
//! 1. [`SubscriptionSession::init`] produces the `connection_init` frame.
//! 2. [`SubscriptionSession::handle_handshake_message`] must see `connection_ack` followed
//!    by `ka`, after which the session is [`SessionState::Active`].
//! 3. [`SubscriptionSession::start`] produces the `start` frame for the subscription document.
//! 4. [`SubscriptionSession::handle_message`] turns every following frame into an [`Event`].
//! 5. [`SubscriptionSession::stop`] produces the `stop` frame when the client gives up.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use snafu::{ensure, ResultExt, Snafu};
use std::fmt;
use uuid::Uuid;

/// Sub-protocol token negotiated during the websocket upgrade.
pub const SUBPROTOCOL: &str = "graphql-ws";

/// The `type` of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `connection_init`, sent by the client to open the session.
    ConnectionInit,
    /// `connection_ack`, the server accepted the connection.
    ConnectionAck,
    /// `connection_error`, the server rejected the connection.
    ConnectionError,
    /// `connection_terminate`, the client is going away.
    ConnectionTerminate,
    /// `ka`, a keepalive.
    KeepAlive,
    /// `start`, begin a subscription.
    Start,
    /// `stop`, end a subscription.
    Stop,
    /// `data`, a subscription result.
    Data,
    /// `error`, the server failed to run the subscription.
    Error,
    /// `complete`, the server will send no more results.
    Complete,
    /// Anything this crate doesn't know about.
    Other(String),
}

impl FrameKind {
    /// The wire name of this frame type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::ConnectionError => "connection_error",
            Self::ConnectionTerminate => "connection_terminate",
            Self::KeepAlive => "ka",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Data => "data",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for FrameKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "connection_init" => Self::ConnectionInit,
            "connection_ack" => Self::ConnectionAck,
            "connection_error" => Self::ConnectionError,
            "connection_terminate" => Self::ConnectionTerminate,
            "ka" => Self::KeepAlive,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "data" => Self::Data,
            "error" => Self::Error,
            "complete" => Self::Complete,
            _ => Self::Other(kind),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FrameKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FrameKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let kind = String::deserialize(deserializer)?;
        if kind.is_empty() {
            return Err(de::Error::custom("frame type must not be empty"));
        }
        Ok(Self::from(kind))
    }
}

#[derive(Debug, Clone, Serialize)]
struct SendFrame<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(rename = "type")]
    kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReceiveFrame {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: FrameKind,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Empty {}

/// Lifecycle of a [`SubscriptionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The socket is being opened.
    Connecting,
    /// `connection_init` was sent, waiting for `connection_ack` and `ka`.
    Handshaking,
    /// The server accepted the connection. Results flow in this state.
    Active,
    /// The subscription was stopped or completed, the socket is being released.
    Draining,
    /// Nothing more will happen on this session.
    Closed,
}

/// Progress through the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// `connection_ack` was received, a `ka` must follow.
    AwaitingKeepAlive,
    /// The handshake is done and the session is [`SessionState::Active`].
    Established,
}

/// Something that happened on an active session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server is still alive.
    KeepAlive,
    /// The frame carried no id, an id belonging to some other session, or arrived after the
    /// session finished.
    Ignored,
    /// A subscription result. This is the raw frame payload, normally `{"data": ..., "errors": [...]}`.
    Data(Value),
    /// The server reported an error for the subscription. The session stays active.
    ServerError(Value),
    /// The server completed or stopped the subscription. The session is now draining.
    Complete,
    /// A frame type that has no meaning once the session is active.
    Unexpected(FrameKind),
}

/// A single `graphql-ws` subscription over its own socket.
#[derive(Debug)]
pub struct SubscriptionSession {
    id: Uuid,
    state: SessionState,
    acknowledged: bool,
    started: bool,
}

impl SubscriptionSession {
    /// Create a session with a fresh id, in the [`SessionState::Connecting`] state.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connecting,
            acknowledged: false,
            started: false,
        }
    }

    /// The id this session's frames are tagged with.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Begin the handshake. Returns the `connection_init` frame to send.
    ///
    /// # Errors
    /// Fails if the session has already been initialised.
    pub fn init(&mut self) -> Result<String, SessionError> {
        ensure!(
            self.state == SessionState::Connecting,
            InvalidStateSnafu { state: self.state }
        );

        let message = encode(SendFrame {
            id: None,
            kind: FrameKind::ConnectionInit,
            payload: Some(Empty {}),
        })?;
        self.state = SessionState::Handshaking;
        Ok(message)
    }

    /// Feed a frame received during the handshake.
    ///
    /// The server must answer `connection_init` with exactly `connection_ack` and then `ka`.
    /// Any other frame fails the handshake and closes the session.
    ///
    /// # Errors
    /// See [`HandshakeError`].
    pub fn handle_handshake_message(&mut self, msg: &str) -> Result<Handshake, HandshakeError> {
        let result = self.advance_handshake(msg);
        if result.is_err() {
            self.state = SessionState::Closed;
        }
        result
    }

    fn advance_handshake(&mut self, msg: &str) -> Result<Handshake, HandshakeError> {
        ensure!(
            self.state == SessionState::Handshaking,
            NotHandshakingSnafu { state: self.state }
        );

        let frame: ReceiveFrame = serde_json::from_str(msg).context(MalformedFrameSnafu)?;
        let expected = if self.acknowledged {
            FrameKind::KeepAlive
        } else {
            FrameKind::ConnectionAck
        };

        match frame.kind {
            FrameKind::ConnectionError => RejectedSnafu {
                payload: frame.payload.unwrap_or(Value::Null),
            }
            .fail(),
            received if received == expected => {
                if self.acknowledged {
                    self.state = SessionState::Active;
                    Ok(Handshake::Established)
                } else {
                    self.acknowledged = true;
                    Ok(Handshake::AwaitingKeepAlive)
                }
            }
            received => UnexpectedFrameSnafu { expected, received }.fail(),
        }
    }

    /// Start the subscription. Returns the `start` frame carrying `body`, which should be the
    /// `{query, variables, operationName}` request body.
    ///
    /// # Errors
    /// Fails if the handshake hasn't completed, a subscription was already started on this
    /// session, or the body cannot be serialized.
    pub fn start<B>(&mut self, body: &B) -> Result<String, SessionError>
    where
        B: Serialize,
    {
        ensure!(
            self.state == SessionState::Active,
            InvalidStateSnafu { state: self.state }
        );
        ensure!(!self.started, AlreadyStartedSnafu);

        let message = encode(SendFrame {
            id: Some(self.id),
            kind: FrameKind::Start,
            payload: Some(body),
        })?;
        self.started = true;
        Ok(message)
    }

    /// Interpret a frame received once the session is active.
    ///
    /// # Errors
    /// Fails only if the frame is not valid json or has no `type`. The session is left as is,
    /// so the caller may carry on reading.
    pub fn handle_message(&mut self, msg: &str) -> Result<Event, HandleMessageError> {
        let frame: ReceiveFrame = serde_json::from_str(msg).context(DeserializeSnafu)?;

        if self.state != SessionState::Active {
            tracing::trace!(?frame, state = ?self.state, "ignoring frame on inactive session");
            return Ok(Event::Ignored);
        }

        if frame.kind == FrameKind::KeepAlive {
            return Ok(Event::KeepAlive);
        }

        match frame.id.as_deref() {
            None | Some("") => {
                tracing::trace!(?frame, "ignoring frame without an id");
                return Ok(Event::Ignored);
            }
            Some(id) if !self.owns(id) => {
                tracing::warn!(?frame, "received a frame for a subscription we are not tracking");
                return Ok(Event::Ignored);
            }
            Some(_) => {}
        }

        let event = match frame.kind {
            FrameKind::Data => Event::Data(frame.payload.unwrap_or(Value::Null)),
            FrameKind::Error => Event::ServerError(frame.payload.unwrap_or(Value::Null)),
            FrameKind::Complete | FrameKind::Stop => {
                self.state = SessionState::Draining;
                Event::Complete
            }
            kind => Event::Unexpected(kind),
        };

        Ok(event)
    }

    /// Stop the subscription from the client side.
    ///
    /// Returns the `stop` frame to send, or `None` if there is nothing to stop, either because
    /// the session isn't active or no subscription was started. The session is draining
    /// afterwards either way, unless it was already closed.
    ///
    /// # Errors
    /// Fails only if the frame cannot be serialized.
    pub fn stop(&mut self) -> Result<Option<String>, SessionError> {
        let was_active = self.state == SessionState::Active;
        if self.state != SessionState::Closed {
            self.state = SessionState::Draining;
        }

        if !(was_active && self.started) {
            return Ok(None);
        }

        encode(SendFrame::<Empty> {
            id: Some(self.id),
            kind: FrameKind::Stop,
            payload: None,
        })
        .map(Some)
    }

    /// Mark the session closed, once the socket has been released.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    fn owns(&self, id: &str) -> bool {
        Uuid::parse_str(id).map_or(false, |id| id == self.id)
    }
}

impl Default for SubscriptionSession {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T>(frame: SendFrame<T>) -> Result<String, SessionError>
where
    T: Serialize,
{
    serde_json::to_string(&frame).context(SerializeSnafu)
}

/// Errors produced while handshaking.
#[derive(Debug, Snafu)]
pub enum HandshakeError {
    /// The frame was not valid json, or had no `type`.
    #[snafu(display("malformed handshake frame: {source}"))]
    MalformedFrame {
        /// Underlying json error
        source: serde_json::Error,
    },

    /// The server sent something other than the frame the handshake requires next.
    #[snafu(display("did not receive {expected}, got: {received}"))]
    UnexpectedFrame {
        /// The frame type the handshake was waiting for
        expected: FrameKind,
        /// The frame type that arrived
        received: FrameKind,
    },

    /// The server answered with `connection_error`.
    #[snafu(display("connection rejected by server: {payload}"))]
    Rejected {
        /// The payload of the `connection_error` frame
        payload: Value,
    },

    /// A handshake frame was fed to a session that isn't handshaking.
    #[snafu(display("session is not handshaking (state: {state:?})"))]
    NotHandshaking {
        /// State the session was in
        state: SessionState,
    },
}

/// Errors produced while interpreting a frame on an active session.
#[derive(Debug, Snafu)]
pub enum HandleMessageError {
    /// The frame was not valid json, or had no `type`.
    #[snafu(display("failed to deserialize frame: {source}"))]
    DeserializeError {
        /// Underlying json error
        source: serde_json::Error,
    },
}

/// Errors produced when a frame cannot be sent in the session's current state.
#[derive(Debug, Snafu)]
pub enum SessionError {
    /// The operation is not valid in this state.
    #[snafu(display("operation not valid while the session is {state:?}"))]
    InvalidState {
        /// State the session was in
        state: SessionState,
    },

    /// A session carries exactly one subscription.
    #[snafu(display("a subscription was already started on this session"))]
    AlreadyStarted,

    /// The outgoing frame could not be serialized.
    #[snafu(display("failed to serialize frame: {source}"))]
    SerializeError {
        /// Underlying json error
        source: serde_json::Error,
    },
}
