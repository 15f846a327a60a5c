//! Route queries and mutations to one connection, and subscriptions to another.
//!
//! [`crate::GraphqlClient`] is this connection over http and websockets. Build one directly
//! when the two sides need to point at different endpoints.
//! ```rust,no_run
//! use gql_client::{http, hybrid, ws};
//! let requests = http::Connection::new("https://example.com/graphql").unwrap();
//! let subscriptions = ws::Connection::new("wss://events.example.com/graphql");
//! let client = hybrid::Connection::new(requests, subscriptions).into_client();
//! ```

#[cfg(feature = "websocket")]
use crate::{conn::SubscriptionConn, subscription::Subscription};
use crate::{
    conn::{MutationConn, QueryConn},
    Client,
};
use graphql_client::GraphQLQuery;

/// Two connections acting as one.
///
/// `R` performs request/response operations, `S` performs subscriptions. Errors are those of the
/// side the operation went to.
#[derive(Debug, Clone)]
pub struct Connection<R, S> {
    requests: R,
    subscriptions: S,
}

impl<R, S> Connection<R, S> {
    /// Combine a connection for queries & mutations with one for subscriptions.
    pub fn new(requests: R, subscriptions: S) -> Self {
        Self {
            requests,
            subscriptions,
        }
    }

    /// The connection queries and mutations are sent over.
    pub fn requests(&self) -> &R {
        &self.requests
    }

    /// The connection subscriptions are opened on.
    pub fn subscriptions(&self) -> &S {
        &self.subscriptions
    }

    /// Split back into the request and subscription connections.
    pub fn into_parts(self) -> (R, S) {
        (self.requests, self.subscriptions)
    }

    /// Create a client with reference to this connection
    pub fn as_client(&self) -> Client<&Self> {
        Client::new(self)
    }

    /// Convert this connection into a client
    pub fn into_client(self) -> Client<Self> {
        Client::new(self)
    }
}

impl<R: Clone, S: Clone> Connection<R, S> {
    /// Create a client with a clone of this connection
    pub fn to_client(&self) -> Client<Self> {
        Client::new(self.clone())
    }
}

#[async_trait]
impl<R, S> QueryConn for Connection<R, S>
where
    R: QueryConn + Send + Sync,
    S: Send + Sync,
{
    type Error = R::Error;

    async fn query<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        self.requests.query::<Q>(variables).await
    }
}

#[async_trait]
impl<R, S> MutationConn for Connection<R, S>
where
    R: MutationConn + Send + Sync,
    S: Send + Sync,
{
    type Error = R::Error;

    async fn mutate<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        self.requests.mutate::<Q>(variables).await
    }
}

#[cfg(feature = "websocket")]
#[async_trait]
impl<R, S> SubscriptionConn for Connection<R, S>
where
    R: Send + Sync,
    S: SubscriptionConn + Send + Sync,
{
    type Error = S::Error;

    async fn subscribe<Q>(
        &self,
        variables: Q::Variables,
    ) -> Result<Subscription<Q::ResponseData>, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
        Q::ResponseData: Send + 'static,
    {
        self.subscriptions.subscribe::<Q>(variables).await
    }
}
