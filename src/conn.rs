#[cfg(feature = "websocket")]
use crate::subscription::Subscription;
use graphql_client::GraphQLQuery;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "websocket")]
pub mod ws;

pub mod hybrid;

/// Connections that implement this support graphql queries.
#[async_trait]
pub trait QueryConn {
    /// Error type representing any errors that can occur when querying
    type Error;

    /// Send a graphql query over this connection.
    ///
    /// # Errors
    /// This function may error if there was a problem with the underlying connection such as
    /// a dns resolution error or a bad status code, if the api returned errors,
    /// or if the api response failed to decode.
    async fn query<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync;
}

/// Connections that implement this support graphql mutations.
#[async_trait]
pub trait MutationConn {
    /// Error type representing any errors that can occur when mutating
    type Error;

    /// Send a graphql mutation over this connection.
    ///
    /// # Errors
    /// This function may error if there was a problem with the underlying connection such as
    /// a dns resolution error or a bad status code, if the api returned errors,
    /// or if the api response failed to decode.
    async fn mutate<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync;
}

/// Connections that implement this support graphql subscriptions.
#[cfg(feature = "websocket")]
#[async_trait]
pub trait SubscriptionConn {
    /// Error type representing any errors that can occur when subscribing
    type Error;

    /// Send a graphql subscription over this connection.
    /// The future resolves once the subscription has been established,
    /// results are then delivered through the returned [`Subscription`] stream.
    ///
    /// # Errors
    /// This function may error if the connection could not be opened,
    /// or if the server did not accept the subscription.
    async fn subscribe<Q>(
        &self,
        variables: Q::Variables,
    ) -> Result<Subscription<Q::ResponseData>, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
        Q::ResponseData: Send + 'static;
}

#[async_trait]
impl<T> QueryConn for &T
where
    T: QueryConn + Sync + ?Sized,
{
    type Error = T::Error;

    async fn query<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        (**self).query::<Q>(variables).await
    }
}

#[async_trait]
impl<T> MutationConn for &T
where
    T: MutationConn + Sync + ?Sized,
{
    type Error = T::Error;

    async fn mutate<Q>(&self, variables: Q::Variables) -> Result<Q::ResponseData, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
    {
        (**self).mutate::<Q>(variables).await
    }
}

#[cfg(feature = "websocket")]
#[async_trait]
impl<T> SubscriptionConn for &T
where
    T: SubscriptionConn + Sync + ?Sized,
{
    type Error = T::Error;

    async fn subscribe<Q>(
        &self,
        variables: Q::Variables,
    ) -> Result<Subscription<Q::ResponseData>, Self::Error>
    where
        Q: GraphQLQuery,
        Q::Variables: Send + Sync,
        Q::ResponseData: Send + 'static,
    {
        (**self).subscribe::<Q>(variables).await
    }
}
