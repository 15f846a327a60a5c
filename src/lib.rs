//! A graphql client. Queries and mutations are sent over http, and subscriptions run over
//! websockets using the `graphql-ws` protocol.
//!
//! Operations are described with [`graphql_client::GraphQLQuery`], usually derived from a schema
//! and a query document, and results are decoded into its `ResponseData`.
//!
//! ## Usage:
//! ```rust,ignore
//! use futures::StreamExt;
//! use gql_client::GraphqlClient;
//! use graphql_client::GraphQLQuery;
//!
//! #[derive(GraphQLQuery)]
//! #[graphql(schema_path = "schema.graphql", query_path = "todos.graphql")]
//! pub struct TodosQuery;
//!
//! #[derive(GraphQLQuery)]
//! #[graphql(schema_path = "schema.graphql", query_path = "todo_added.graphql")]
//! pub struct TodoAdded;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GraphqlClient::builder("https://example.com/graphql").build()?;
//!
//! let todos = client.query::<TodosQuery>(todos_query::Variables).await?;
//!
//! let mut added = client.subscribe::<TodoAdded>(todo_added::Variables).await?;
//! while let Some(todo) = added.next().await {
//!     println!("{:?}", todo);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
extern crate async_trait;

mod client;
mod conn;
mod error;
mod response;
#[cfg(feature = "websocket")]
mod subscription;

pub use client::Client;
#[cfg(all(feature = "http", feature = "websocket"))]
pub use client::{ClientBuilder, GraphqlClient};
#[cfg(feature = "http")]
pub use conn::http;
pub use conn::hybrid;
#[cfg(feature = "websocket")]
pub use conn::ws;
#[cfg(feature = "websocket")]
pub use conn::SubscriptionConn;
pub use conn::{MutationConn, QueryConn};
pub use error::*;
pub use gql_client_protocol::OperationKind;
#[cfg(feature = "websocket")]
pub use gql_client_protocol::socket::{FrameKind, SessionState};
#[cfg(feature = "websocket")]
pub use subscription::{Subscription, SubscriptionDiagnostic, SubscriptionHandle};
