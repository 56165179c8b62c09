//! HTTP surface.
//!
//! - `GET /currentBlock`: highest indexed block
//! - `POST /subscribe?address=` / `DELETE /subscribe?address=`: manage watches
//! - `GET /transactions?address=`: history of a watched address
//! - `GET /health`, `GET /status`: liveness and engine statistics

pub mod middleware;
pub mod routes;

pub use middleware::{RequestId, RequestIdLayer, SecurityHeadersLayer};
pub use routes::{router, AddressQuery, ApiError};
