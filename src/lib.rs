// Palisade - A resilient HTTP client for Rust
//
// This library bundles the HTTP client with its rate limiting and logging
// crates behind a single dependency.

// Re-export the client
pub use palisade_http_client::*;

// Re-export the supporting crates
pub use palisade_log as log;
pub use palisade_ratelimit as ratelimit;

/// Prelude for common imports.
///
/// ```
/// use palisade::prelude::*;
/// ```
pub mod prelude {
    pub use palisade_http_client::prelude::*;
    pub use palisade_log::{Level, LogSink};
}
