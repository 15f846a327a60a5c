use crate::conn::{MutationConn, QueryConn};
#[cfg(feature = "websocket")]
use crate::{conn::SubscriptionConn, subscription::Subscription};
use graphql_client::GraphQLQuery;
use std::fmt::Debug;

#[cfg(all(feature = "http", feature = "websocket"))]
pub use builder::{ClientBuilder, GraphqlClient};

/// Graphql client.
/// The client is generic over its connection/transport, meaning it can be used with http
/// for queries & mutations, websockets for subscriptions, or a hybrid of the two.
///
/// Most of the time [`GraphqlClient::builder`] is what you want, which configures both from a single
/// endpoint. To use a single transport, create the connection first,
/// such as [`crate::http::Connection`], and turn it into a client.
pub struct Client<T> {
    conn: T,
}

impl<T> Client<T> {
    /// Create a new client from a connection. Prefer calling `into_client` on the connection itself.
    pub fn new(conn: T) -> Self {
        Self { conn }
    }

    /// Turn this client back into its underlying connection
    pub fn into_connection(self) -> T {
        self.conn
    }
}

impl<T: Clone> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl<T: Debug> Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("conn", &self.conn).finish()
    }
}

impl<T> Client<T>
where
    T: QueryConn,
{
    /// Perform a graphql query using the underlying connection.
    ///
    /// # Errors
    /// See [`QueryConn::query`] for error information
    pub async fn query<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, T::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        self.conn.query::<Q>(variables).await
    }
}

impl<T> Client<T>
where
    T: MutationConn,
{
    /// Perform a graphql mutation using the underlying connection
    ///
    /// # Errors
    /// See [`MutationConn::mutate`] for error information
    pub async fn mutate<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, T::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        self.conn.mutate::<Q>(variables).await
    }
}

#[cfg(feature = "websocket")]
impl<T> Client<T>
where
    T: SubscriptionConn,
{
    /// Subscribe to a graphql subcription using the underlying connection.
    ///
    /// # Errors
    /// See [`SubscriptionConn::subscribe`] for error information
    pub async fn subscribe<Q>(
        &self,
        variables: Q::Variables,
    ) -> Result<Subscription<Q::ResponseData>, T::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
        Q::ResponseData: Send + 'static,
    {
        self.conn.subscribe::<Q>(variables).await
    }
}

#[cfg(all(feature = "http", feature = "websocket"))]
mod builder {
    use super::Client;
    use crate::{conn::hybrid, http, ws, HttpConnectionError};
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use std::time::Duration;

    /// A client performing queries & mutations over http and subscriptions over websockets.
    pub type GraphqlClient = Client<hybrid::Connection<http::Connection, ws::Connection>>;

    /// Configure a [`GraphqlClient`] talking to a single graphql endpoint.
    ///
    /// ## Usage:
    /// ```rust,no_run
    /// use gql_client::GraphqlClient;
    /// use reqwest::header::{HeaderValue, AUTHORIZATION};
    ///
    /// let client = GraphqlClient::builder("https://example.com/graphql")
    ///     .header(AUTHORIZATION, HeaderValue::from_static("Bearer token"))
    ///     .build()
    ///     .unwrap();
    /// ```
    #[derive(Debug)]
    pub struct ClientBuilder {
        http: http::ConnectionBuilder,
        ws: ws::ConnectionBuilder,
    }

    impl ClientBuilder {
        pub(super) fn new(api_url: String) -> Self {
            Self {
                http: http::Connection::builder().api_url(api_url.clone()),
                ws: ws::Connection::builder().api_url(api_url),
            }
        }

        /// Add a header sent with every http request and with the websocket upgrade request.
        pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
            self.http = self.http.header(name.clone(), value.clone());
            self.ws = self.ws.header(name, value);
            self
        }

        /// Add several headers sent with every http request and with the websocket upgrade request.
        pub fn headers(mut self, headers: HeaderMap) -> Self {
            self.http = self.http.headers(headers.clone());
            self.ws = self.ws.headers(headers);
            self
        }

        /// Use an existing reqwest client for http requests, rather than creating a new one.
        pub fn http_client(mut self, client: reqwest::Client) -> Self {
            self.http = self.http.http_client(client);
            self
        }

        /// Set the user agent the http client will identify itself as.
        /// Ignored if an existing reqwest client is supplied.
        pub fn user_agent(mut self, value: impl Into<String>) -> Self {
            self.http = self.http.user_agent(value);
            self
        }

        /// Set a timeout for http requests. Ignored if an existing reqwest client is supplied.
        pub fn timeout(mut self, value: Duration) -> Self {
            self.http = self.http.timeout(value);
            self
        }

        /// Number of swallowed subscription errors buffered per subscription for
        /// [`crate::SubscriptionHandle::diagnostics`] receivers.
        pub fn diagnostics_capacity(mut self, value: usize) -> Self {
            self.ws = self.ws.diagnostics_capacity(value);
            self
        }

        /// Build the client.
        ///
        /// # Errors
        /// Fails if the underlying http client cannot be created.
        pub fn build(self) -> Result<GraphqlClient, HttpConnectionError> {
            let query_conn = self.http.build()?;
            let subscription_conn = self.ws.build();
            Ok(hybrid::Connection::new(query_conn, subscription_conn).into_client())
        }
    }

    impl GraphqlClient {
        /// Configure a client for the graphql endpoint at `api_url`.
        ///
        /// The same url is used for http requests and, with its scheme swapped for `ws` or `wss`,
        /// for subscriptions.
        pub fn builder(api_url: impl Into<String>) -> ClientBuilder {
            ClientBuilder::new(api_url.into())
        }
    }
}
