use std::fmt;

/// The kind of graphql operation a document describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// A read-only query, sent over http.
    Query,
    /// A mutation, sent over http.
    Mutation,
    /// A long lived subscription, sent over a websocket.
    Subscription,
}

impl OperationKind {
    /// The keyword used for this operation in a graphql document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }

    /// Whether the operation is performed as a single request/response round trip.
    pub fn is_request(&self) -> bool {
        !matches!(self, Self::Subscription)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
