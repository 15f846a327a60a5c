//! Subscriptions over websockets, speaking the `graphql-ws` protocol.
//!
//! Every subscription opens its own socket, which lives exactly as long as the subscription.
//! You will usually pretty much immediately turn the connection into a Client.
//! E.g.
//! ```rust,no_run
//! use gql_client::ws::Connection;
//! let client = Connection::new("https://example.com/graphql").into_client();
//! ```

mod config;
mod connection;
mod socket;

#[cfg(test)]
mod tests;

pub use connection::{Connection, ConnectionBuilder};
