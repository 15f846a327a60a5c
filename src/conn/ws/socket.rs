use super::config::Config;
use crate::{
    response::RawResponse,
    subscription::{Subscription, SubscriptionDiagnostic, SubscriptionHandle},
    WebsocketConnectionError,
};
use async_tungstenite::{
    tokio::{connect_async, ConnectStream},
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderName, HeaderValue},
        Message,
    },
    WebSocketStream,
};
use futures::{SinkExt, StreamExt};
use gql_client_protocol::socket::{
    Event, Handshake, SessionState, SubscriptionSession, SUBPROTOCOL,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::ops::ControlFlow;
use tokio::{
    select,
    sync::{broadcast, mpsc, watch},
    task,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

type Socket = WebSocketStream<ConnectStream>;

/// Open a socket, complete the handshake and start the subscription described by `body`.
///
/// Resolves once the `start` frame has been sent. Results are then read by a background task
/// and delivered through the returned [`Subscription`].
pub(super) async fn subscribe<B, T>(
    config: &Config,
    body: B,
) -> Result<Subscription<T>, WebsocketConnectionError>
where
    B: Serialize,
    T: DeserializeOwned + Send + 'static,
{
    let mut session = SubscriptionSession::new();
    let (state_sender, state_receiver) = watch::channel(session.state());

    let request = upgrade_request(config)?;
    let (mut socket, response) = connect_async(request).await?;
    tracing::debug!(status = %response.status(), id = %session.id(), "connected to socket");

    if let Err(err) = establish(&mut socket, &mut session, &state_sender, &body).await {
        tracing::debug!(?err, "failed to establish subscription");
        if let Err(err) = socket.close(None).await {
            tracing::trace!(?err, "failed to close socket");
        }
        return Err(err);
    }

    let (sender, receiver) = mpsc::channel(1);
    let (diagnostics, diagnostics_receiver) = broadcast::channel(config.diagnostics_capacity);
    let cancellation_token = CancellationToken::new();
    let span = tracing::debug_span!("subscription", id = %session.id());

    task::spawn(
        SessionTask {
            socket,
            session,
            sender,
            state: state_sender,
            diagnostics,
            cancellation_token: cancellation_token.clone(),
        }
        .run()
        .instrument(span),
    );

    Ok(Subscription::new(
        ReceiverStream::new(receiver),
        SubscriptionHandle::new(cancellation_token, state_receiver, diagnostics_receiver),
    ))
}

/// Map the configured endpoint onto its websocket equivalent.
pub(super) fn websocket_url(api_url: &str) -> Result<Url, WebsocketConnectionError> {
    let mut url = Url::parse(api_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(WebsocketConnectionError::UnsupportedScheme(other.to_owned())),
    };
    url.set_scheme(scheme)
        .map_err(|()| WebsocketConnectionError::UnsupportedScheme(scheme.to_owned()))?;
    Ok(url)
}

fn upgrade_request(config: &Config) -> Result<Request, WebsocketConnectionError> {
    let url = websocket_url(&config.api_url)?;
    let mut request = url.as_str().into_client_request()?;

    let headers = request.headers_mut();
    for (name, value) in config.headers.iter() {
        let name = HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| WebsocketConnectionError::InvalidHeader(err.to_string()))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| WebsocketConnectionError::InvalidHeader(err.to_string()))?;
        headers.append(name, value);
    }
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

    Ok(request)
}

async fn establish<B>(
    socket: &mut Socket,
    session: &mut SubscriptionSession,
    state: &watch::Sender<SessionState>,
    body: &B,
) -> Result<(), WebsocketConnectionError>
where
    B: Serialize,
{
    socket.send(Message::Text(session.init()?)).await?;
    state.send_replace(session.state());

    let result = handshake(socket, session).await;
    state.send_replace(session.state());
    result?;
    tracing::debug!("handshake complete");

    let start = session.start(body)?;
    tracing::trace!(%start, "starting subscription");
    socket.send(Message::Text(start)).await?;
    Ok(())
}

async fn handshake(
    socket: &mut Socket,
    session: &mut SubscriptionSession,
) -> Result<(), WebsocketConnectionError> {
    loop {
        match socket.next().await {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                let text = msg.into_text()?;
                tracing::trace!(%text, "handshake frame");
                if session.handle_handshake_message(&text)? == Handshake::Established {
                    return Ok(());
                }
            }
            Some(Ok(Message::Close(reason))) => {
                tracing::debug!(?reason, "socket closed during handshake");
                session.close();
                return Err(WebsocketConnectionError::SocketClosed);
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                session.close();
                return Err(err.into());
            }
            None => {
                session.close();
                return Err(WebsocketConnectionError::SocketClosed);
            }
        }
    }
}

/// Owns the socket of an active subscription. It is the only reader and writer of the socket,
/// and holds the only sender of the subscription's stream.
struct SessionTask<T> {
    socket: Socket,
    session: SubscriptionSession,
    sender: mpsc::Sender<T>,
    state: watch::Sender<SessionState>,
    diagnostics: broadcast::Sender<SubscriptionDiagnostic>,
    cancellation_token: CancellationToken,
}

impl<T> SessionTask<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn run(mut self) {
        loop {
            let msg = select! {
                _ = self.cancellation_token.cancelled() => None,
                msg = self.socket.next() => Some(msg),
            };

            let msg = match msg {
                Some(msg) => msg,
                None => {
                    tracing::trace!("received cancellation signal");
                    self.stop().await;
                    break;
                }
            };

            match msg {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                    let flow = match msg.into_text() {
                        Ok(text) => self.handle_text(&text).await,
                        Err(err) => {
                            tracing::error!(?err, "received a binary frame that isn't utf-8");
                            self.report(SubscriptionDiagnostic::MalformedFrame {
                                message: err.to_string(),
                            });
                            ControlFlow::Continue(())
                        }
                    };
                    if flow.is_break() {
                        break;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    tracing::debug!(?reason, "socket closed by server");
                    // flushes the queued close reply
                    self.close_socket().await;
                    break;
                }
                Some(Ok(frame)) => {
                    tracing::trace!(?frame, "control frame");
                }
                // the stream yields nothing more after an error
                Some(Err(err)) => {
                    tracing::error!(?err, "socket error");
                    self.report(SubscriptionDiagnostic::Socket {
                        message: err.to_string(),
                    });
                    break;
                }
                None => {
                    tracing::debug!("no more socket messages");
                    break;
                }
            }
        }

        self.session.close();
        self.state.send_replace(SessionState::Closed);
        tracing::debug!("subscription closed");
    }

    async fn handle_text(&mut self, text: &str) -> ControlFlow<()> {
        tracing::trace!(%text, "incoming frame");
        match self.session.handle_message(text) {
            Ok(Event::Data(payload)) => self.publish(payload).await,
            Ok(Event::Complete) => {
                tracing::debug!("subscription completed by server");
                self.close_socket().await;
                ControlFlow::Break(())
            }
            Ok(Event::ServerError(payload)) => {
                tracing::error!(?payload, "error from server");
                self.report(SubscriptionDiagnostic::ServerError(payload));
                ControlFlow::Continue(())
            }
            Ok(Event::Unexpected(kind)) => {
                tracing::warn!(%kind, "unexpected frame type");
                self.report(SubscriptionDiagnostic::UnexpectedFrame(kind));
                ControlFlow::Continue(())
            }
            Ok(Event::KeepAlive | Event::Ignored) => ControlFlow::Continue(()),
            Err(err) => {
                tracing::error!(?err, %text, "failed to deserialize frame");
                self.report(SubscriptionDiagnostic::MalformedFrame {
                    message: err.to_string(),
                });
                ControlFlow::Continue(())
            }
        }
    }

    /// Decode a `data` payload into a new value and hand it to the subscriber, waiting until
    /// the previous value has been taken.
    async fn publish(&mut self, payload: Value) -> ControlFlow<()> {
        let response: RawResponse = match serde_json::from_value(payload) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(?err, "invalid subscription payload received");
                self.report(SubscriptionDiagnostic::Decode {
                    message: err.to_string(),
                });
                return ControlFlow::Continue(());
            }
        };

        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            tracing::warn!(?errors, "subscription result contained errors");
            self.report(SubscriptionDiagnostic::GraphqlErrors(errors));
        }

        let data = match response.data.filter(|data| !data.is_null()) {
            Some(data) => data,
            None => {
                tracing::debug!("subscription result without data");
                return ControlFlow::Continue(());
            }
        };

        let value = match serde_json::from_value::<T>(data) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(?err, "failed to decode subscription data");
                self.report(SubscriptionDiagnostic::Decode {
                    message: err.to_string(),
                });
                return ControlFlow::Continue(());
            }
        };

        let sent = select! {
            _ = self.cancellation_token.cancelled() => None,
            res = self.sender.send(value) => Some(res.is_ok()),
        };

        match sent {
            Some(true) => ControlFlow::Continue(()),
            Some(false) => {
                tracing::debug!("subscriber went away");
                self.stop().await;
                ControlFlow::Break(())
            }
            None => {
                tracing::trace!("received cancellation signal while publishing");
                self.stop().await;
                ControlFlow::Break(())
            }
        }
    }

    /// Tell the server we're done, then release the socket.
    async fn stop(&mut self) {
        match self.session.stop() {
            Ok(Some(stop)) => {
                tracing::trace!(%stop, "stopping subscription");
                if let Err(err) = self.socket.send(Message::Text(stop)).await {
                    tracing::debug!(?err, "failed to send stop frame");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(?err, "failed to build stop frame");
            }
        }

        self.close_socket().await;
    }

    async fn close_socket(&mut self) {
        self.state.send_replace(self.session.state());
        if let Err(err) = self.socket.close(None).await {
            tracing::trace!(?err, "failed to close socket");
        }
    }

    fn report(&self, diagnostic: SubscriptionDiagnostic) {
        // No receivers is fine, the error has been logged already.
        let _ = self.diagnostics.send(diagnostic);
    }
}
