//! Interpreting graphql response envelopes.

use crate::{Error, GraphqlErrors};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A response envelope whose `data` has not been decoded yet.
pub(crate) type RawResponse = graphql_client::Response<Value>;

/// Parse a response envelope from the raw response body.
pub(crate) fn parse(body: &[u8]) -> Result<RawResponse, Error> {
    serde_json::from_slice(body).map_err(Error::Decode)
}

/// Turn a response envelope into the operation's response data.
///
/// Non-null `data` is always decoded first, so a decode failure wins over any errors the server
/// reported. Otherwise server errors win over the decoded data, which stays available as
/// [`GraphqlErrors::partial_data`].
pub(crate) fn into_data<T>(response: RawResponse) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    let data = response.data.filter(|data| !data.is_null());
    let decoded = data
        .as_ref()
        .map(T::deserialize)
        .transpose()
        .map_err(Error::Decode)?;

    if let Some(errors) = GraphqlErrors::new(response.errors.unwrap_or_default(), data) {
        return Err(errors.into());
    }

    decoded.ok_or(Error::NoData)
}
