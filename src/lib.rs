pub mod cache;
pub mod config;
pub mod constants;
pub mod datetime;
pub mod error;
pub mod link;
pub mod logging;
pub mod metrics;
pub mod negotiation;
pub mod registry;
pub mod response;
pub mod server;
pub mod sources;
pub mod timegate;
pub mod types;
pub mod validate;
