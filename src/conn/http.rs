//! Connection over http using reqwest.
//!
//! You will usually pretty much immediately turn the connection into a Client.
//! E.g.
//! ```rust,no_run
//! use gql_client::http::Connection;
//! let client = Connection::new("https://example.com/graphql").unwrap().into_client();
//! ```

use crate::{
    response, Client, HttpConnectionError, MutationConn, OperationKind, QueryConn,
};
use graphql_client::GraphQLQuery;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::{sync::Arc, time::Duration};

#[derive(Debug)]
struct Config {
    user_agent: String,
    timeout: Option<Duration>,
    api_url: String,
    headers: HeaderMap,
    http: Option<reqwest::Client>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            user_agent: format!("gql-client / {}", env!("CARGO_PKG_VERSION")),
            timeout: None,
            api_url: String::from("http://localhost:8080/graphql"),
            headers: HeaderMap::new(),
            http: None,
        }
    }
}

/// Configure and build an http [`Connection`].
///
/// ## Usage:
/// ```rust,no_run
/// # use gql_client::http::Connection;
/// let connection = Connection::builder()
///     .api_url("https://example.com/graphql")
///     .user_agent("My App / 0.1.0")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    config: Config,
}

impl ConnectionBuilder {
    /// Build the http connection from the set options.
    ///
    /// # Errors
    /// This function fails if the TLS backend cannot be initialized, or the resolver cannot
    /// load the system configuration.
    pub fn build(self) -> Result<Connection, HttpConnectionError> {
        let http = match self.config.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder().user_agent(self.config.user_agent);
                if let Some(timeout) = self.config.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };

        Ok(Connection {
            http,
            api_url: Arc::new(self.config.api_url),
            headers: Arc::new(self.config.headers),
        })
    }

    /// Set the user agent the http client will identify itself as.
    ///
    /// This defaults to `gql-client / x.x.x` where `x.x.x` is the version of this package.
    /// It has no effect when an existing client is passed to [`Self::http_client`].
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.config.user_agent = value.into();
        self
    }

    /// Set the timeout for requests.
    ///
    /// There is no timeout by default.
    /// It has no effect when an existing client is passed to [`Self::http_client`].
    pub fn timeout(mut self, value: Duration) -> Self {
        self.config.timeout = Some(value);
        self
    }

    /// Set the url of the graphql endpoint.
    ///
    /// Defaults to `http://localhost:8080/graphql`
    pub fn api_url(mut self, value: impl Into<String>) -> Self {
        self.config.api_url = value.into();
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    /// Add several headers sent with every request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers.extend(headers);
        self
    }

    /// Use an existing reqwest client rather than building a new one.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.config.http = Some(client);
        self
    }
}

/// Perform queries and mutations over http(s).
#[derive(Debug, Clone)]
pub struct Connection {
    http: reqwest::Client,
    api_url: Arc<String>,
    headers: Arc<HeaderMap>,
}

impl Connection {
    /// Create a [`ConnectionBuilder`] to configure various options.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Create a connection to `api_url` with the default options.
    ///
    /// # Errors
    /// See [`ConnectionBuilder::build`]
    pub fn new(api_url: impl Into<String>) -> Result<Self, HttpConnectionError> {
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

    /// Perform a single request/response operation.
    ///
    /// Nothing is retried. Dropping the future aborts the request.
    async fn execute<Q>(
        &self,
        kind: OperationKind,
        variables: Q::Variables,
    ) -> Result<Q::ResponseData, HttpConnectionError>
    where
        Q: GraphQLQuery,
    {
        debug_assert!(kind.is_request(), "{kind} cannot be sent over http");

        let body = Q::build_query(variables);
        tracing::debug!(%kind, operation = body.operation_name, "sending request");

        let res = self
            .http
            .post(self.api_url.as_str())
            .headers(self.headers.as_ref().clone())
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::debug!(%status, %body, "bad status");
            return Err(HttpConnectionError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = res.bytes().await?;
        let res = response::parse(&bytes)?;
        Ok(response::into_data::<Q::ResponseData>(res)?)
    }
}

#[async_trait]
impl QueryConn for Connection {
    type Error = HttpConnectionError;

    async fn query<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        self.execute::<Q>(OperationKind::Query, variables).await
    }
}

#[async_trait]
impl MutationConn for Connection {
    type Error = HttpConnectionError;

    async fn mutate<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        self.execute::<Q>(OperationKind::Mutation, variables).await
    }
}
