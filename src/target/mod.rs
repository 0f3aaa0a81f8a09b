//! Target service client: transport seam, HTTP implementation, and API shape.

pub mod api;
pub mod http;
pub mod transport;
