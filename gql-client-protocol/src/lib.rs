//! Low level structures for talking to a graphql server.
//!
//! The `socket` module implements the `graphql-ws` subscription protocol as a plain state
//! machine: it produces the text frames to send and interprets the text frames received,
//! but never touches a socket itself.

#![warn(missing_docs)]

mod operation;

#[cfg(feature = "socket")]
pub mod socket;

pub use operation::OperationKind;
