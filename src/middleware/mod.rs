//! Cross-cutting request middleware: rate limiting and security headers.
//! Authentication lives in `crate::auth::middleware`.

pub mod rate_limit;
pub mod security_headers;

pub use rate_limit::{RateLimit, RateLimiter};
pub use security_headers::security_headers;
