//! HTTP fetch layer: retrying blocking client and its errors.

mod client;
mod error;

pub use client::{
    Fetch, Fetcher, FetcherBuilder, HttpTransport, RawResponse, RetryPolicy, Transport,
};
pub use error::{FetchError, TransportError, TransportErrorKind};
