//! Dromio API client

mod client;
mod transport;

pub use client::{ApiClient, ApiError, ApiResult};
pub use transport::{
    ApiRequest, HttpTransport, Method, MockTransport, RawResponse, Transport, TransportError,
};
