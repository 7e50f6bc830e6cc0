//! Wire constants shared by the router, response builder and sources.

// Source names (used in the `source` field of handler configuration)
pub const EXAMPLE_SOURCE: &str = "example";
pub const STATIC_SOURCE: &str = "static";
pub const REMOTE_SOURCE: &str = "remote";

// Routing weights: prefix-bound handlers always beat the default catch-all
pub const DEFAULT_HANDLER_WEIGHT: i32 = 100;
pub const PREFIXED_HANDLER_WEIGHT: i32 = 400;

// Cache defaults
pub const DEFAULT_CACHE_REFRESH_SECS: u64 = 86_400;
pub const DEFAULT_CACHE_DIRECTORY: &str = "cache";

// Server defaults
pub const DEFAULT_HOST: &str = "http://localhost:9999";
pub const DEFAULT_BIND: &str = "0.0.0.0:9999";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// Media types
pub const LINK_FORMAT_MIME: &str = "application/link-format";
pub const JSON_MIME: &str = "application/json";
pub const REDIRECT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

// Protocol headers
pub const ACCEPT_DATETIME: &str = "accept-datetime";
pub const MEMENTO_DATETIME: &str = "memento-datetime";

// Link relations
pub const REL_ORIGINAL: &str = "original";
pub const REL_TIMEGATE: &str = "timegate";
pub const REL_TIMEMAP: &str = "timemap";
pub const REL_SELF: &str = "self";
pub const REL_MEMENTO: &str = "memento";
pub const REL_FIRST_MEMENTO: &str = "first memento";
pub const REL_LAST_MEMENTO: &str = "last memento";
pub const REL_FIRST_LAST_MEMENTO: &str = "first last memento";

/// Encoded form of the one character the router translates in identifiers.
pub const ENCODED_SPACE: &str = "%20";
