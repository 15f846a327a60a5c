use futures::{stream::BoxStream, Stream, StreamExt};
use gql_client_protocol::socket::{FrameKind, SessionState};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// A stream of subscription results.
///
/// The stream ends when the server completes the subscription, the socket closes, or the
/// subscription is cancelled. Dropping it cancels the subscription.
pub struct Subscription<T> {
    inner: BoxStream<'static, T>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        stream: impl Stream<Item = T> + Send + 'static,
        handle: SubscriptionHandle,
    ) -> Self {
        Self {
            inner: Box::pin(stream),
            handle,
        }
    }

    /// A handle to cancel or observe the subscription from elsewhere.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// The current state of the underlying session.
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Unsubscribe from the Subscription. This is automatically called on drop.
    ///
    /// A `stop` frame is sent and the socket closed in the background.
    /// Use [`SubscriptionHandle::cancel`] to wait for that to happen.
    pub fn unsubscribe(&mut self) {
        self.handle.cancellation_token.cancel();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// An error that was not returned to the caller.
///
/// Only [`SubscriptionDiagnostic::Socket`] ends the subscription, the others skip a single frame.
/// They are logged, and also published to [`SubscriptionHandle::diagnostics`].
#[derive(Debug, Clone)]
pub enum SubscriptionDiagnostic {
    /// A `data` frame could not be decoded into the subscription's response data.
    /// The frame was skipped.
    Decode {
        /// Decoder error message
        message: String,
    },
    /// A `data` frame carried graphql errors. Its data, if any, was still delivered.
    GraphqlErrors(Vec<graphql_client::Error>),
    /// The server sent an `error` frame.
    ServerError(Value),
    /// A frame that wasn't valid json, or had no type.
    MalformedFrame {
        /// Deserializer error message
        message: String,
    },
    /// A frame type that has no meaning on an active subscription.
    UnexpectedFrame(FrameKind),
    /// Reading from the socket failed. The subscription ended.
    Socket {
        /// Socket error message
        message: String,
    },
}

/// Cancels or observes a running subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancellation_token: CancellationToken,
    state: watch::Receiver<SessionState>,
    diagnostics: broadcast::Receiver<SubscriptionDiagnostic>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        cancellation_token: CancellationToken,
        state: watch::Receiver<SessionState>,
        diagnostics: broadcast::Receiver<SubscriptionDiagnostic>,
    ) -> Self {
        Self {
            cancellation_token,
            state,
            diagnostics,
        }
    }

    /// The current state of the underlying session.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the subscription has been cancelled, by any handle or by dropping the stream.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Cancel the subscription.
    ///
    /// Resolves once a `stop` frame has been sent and the socket closed,
    /// at which point the result stream has ended.
    pub async fn cancel(&self) {
        self.cancellation_token.cancel();
        self.closed().await;
    }

    /// Wait until the session is closed, however that happens.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        loop {
            if *state.borrow_and_update() == SessionState::Closed {
                return;
            }
            if state.changed().await.is_err() {
                // the session task is gone, which only happens once it is closed
                return;
            }
        }
    }

    /// Errors the subscription swallowed, from now on.
    ///
    /// The stream ends once the subscription is closed. If the receiver falls more than the
    /// configured capacity behind, the oldest diagnostics are skipped.
    pub fn diagnostics(&self) -> BoxStream<'static, SubscriptionDiagnostic> {
        BroadcastStream::new(self.diagnostics.resubscribe())
            .filter_map(|diagnostic| async move {
                match diagnostic {
                    Ok(diagnostic) => Some(diagnostic),
                    Err(err) => {
                        tracing::debug!(?err, "diagnostics receiver lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

impl Clone for SubscriptionHandle {
    fn clone(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.clone(),
            state: self.state.clone(),
            diagnostics: self.diagnostics.resubscribe(),
        }
    }
}
