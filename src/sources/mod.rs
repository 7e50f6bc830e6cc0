pub mod example;
pub mod remote;
pub mod static_map;

pub use example::ExampleSource;
pub use remote::RemoteSource;
pub use static_map::StaticSource;

use crate::config::{Config, HandlerConfig};
use crate::constants::{EXAMPLE_SOURCE, REMOTE_SOURCE, STATIC_SOURCE};
use crate::error::{Result, TimegateError};
use crate::registry::SourceRegistry;
use crate::types::MementoSource;
use std::sync::Arc;

/// Build the source named by a handler's `source` field.
pub fn build_source(config: &HandlerConfig) -> Result<Arc<dyn MementoSource>> {
    match config.source.as_str() {
        EXAMPLE_SOURCE => {
            let source = match &config.base_uri {
                Some(base_uri) if !base_uri.is_empty() => ExampleSource::new(base_uri.clone()),
                _ => ExampleSource::default(),
            };
            Ok(Arc::new(source))
        }
        STATIC_SOURCE => {
            let path = config.path.as_deref().ok_or_else(|| {
                TimegateError::Configuration("static source needs a path".to_string())
            })?;
            Ok(Arc::new(StaticSource::load(path)?))
        }
        REMOTE_SOURCE => Ok(Arc::new(RemoteSource::new(
            config.timemap_endpoint.clone(),
            config.timegate_endpoint.clone(),
        )?)),
        other => Err(TimegateError::Configuration(format!(
            "unknown source '{}'",
            other
        ))),
    }
}

/// Build and register every handler in the configuration.
pub fn build_registry(config: &Config) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();
    for (binding, handler) in config.bindings() {
        let source = build_source(handler)?;
        registry.register(binding, source)?;
    }
    Ok(registry)
}
