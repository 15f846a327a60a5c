use super::{config::Config, socket};
use crate::{subscription::Subscription, Client, SubscriptionConn, WebsocketConnectionError};
use graphql_client::GraphQLQuery;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;

/// Configure and build a websocket [`Connection`].
///
/// ## Usage:
/// ```rust
/// # use gql_client::ws::Connection;
/// let connection = Connection::builder()
///     .api_url("ws://localhost:8080/graphql")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    config: Config,
}

impl ConnectionBuilder {
    /// Build the websocket connection from the set options.
    ///
    /// No socket is opened until something is subscribed to.
    pub fn build(self) -> Connection {
        Connection {
            config: Arc::new(self.config),
        }
    }

    /// Set the url of the graphql endpoint.
    ///
    /// `http` and `https` urls are accepted and mapped to `ws` and `wss` respectively.
    /// Defaults to `ws://localhost:8080/graphql`
    pub fn api_url(mut self, value: impl Into<String>) -> Self {
        self.config.api_url = value.into();
        self
    }

    /// Add a header sent with the websocket upgrade request.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    /// Add several headers sent with the websocket upgrade request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers.extend(headers);
        self
    }

    /// Number of swallowed errors buffered for each [`crate::SubscriptionHandle::diagnostics`]
    /// receiver before the oldest are dropped.
    ///
    /// This defaults to 16.
    pub fn diagnostics_capacity(mut self, value: usize) -> Self {
        self.config.diagnostics_capacity = value.max(1);
        self
    }
}

/// Subscribe over websockets.
#[derive(Debug, Clone)]
pub struct Connection {
    config: Arc<Config>,
}

impl Connection {
    /// Create a [`ConnectionBuilder`] to configure various options.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Create a connection to `api_url` with the default options.
    pub fn new(api_url: impl Into<String>) -> Self {
        ConnectionBuilder::default().api_url(api_url).build()
    }

    /// Create a client with reference to this connection
    pub fn as_client(&self) -> Client<&Self> {
        Client::new(self)
    }

    /// Create a client with a clone of this connection
    pub fn to_client(&self) -> Client<Self> {
        Client::new(self.clone())
    }

    /// Convert this connection into a client
    pub fn into_client(self) -> Client<Self> {
        Client::new(self)
    }
}

#[async_trait]
impl SubscriptionConn for Connection {
    type Error = WebsocketConnectionError;

    async fn subscribe<Q>(
        &self,
        variables: Q::Variables,
    ) -> Result<Subscription<Q::ResponseData>, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
        Q::ResponseData: Send + 'static,
    {
        socket::subscribe(&self.config, Q::build_query(variables)).await
    }
}
