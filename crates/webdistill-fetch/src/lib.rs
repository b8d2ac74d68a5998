//! # WebDistill Fetch
//!
//! Fetcher plugins and the Encoding Detector (spec §4.2, §4.4.1). The only
//! crate in the workspace allowed to perform real network I/O for the
//! `static_http` path.

pub mod circuit_breaker;
pub mod encoding;
pub mod fetcher;
pub mod static_http;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use encoding::{decode, DecodedBody};
pub use fetcher::{truncate_body, Fetcher};
pub use static_http::StaticHttpFetcher;
