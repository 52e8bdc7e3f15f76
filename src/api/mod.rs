//! Cloudflare API access: the transport seam and the resource shapes.

mod http;
mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpTransport;
pub use transport::{ApiRequest, ApiResponse, ApiTransport};
