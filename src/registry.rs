//! Handler registry and request router.
//!
//! Every configured handler binds a [`MementoSource`] to an identifier prefix
//! (its base URI). Requests are dispatched by ordered prefix matching:
//! prefix-bound handlers by descending weight, then registration order, and
//! the default handler last so that explicit prefixes always win.

use crate::constants::{DEFAULT_HANDLER_WEIGHT, ENCODED_SPACE, PREFIXED_HANDLER_WEIGHT};
use crate::error::{Result, TimegateError};
use crate::types::{MementoSource, ResourceType};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Static description of one handler, built from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBinding {
    /// `None` for the default handler
    pub name: Option<String>,
    pub base_uri: Option<String>,
    pub resource_type: ResourceType,
    /// Whether the handler should serve timemaps (batch lookups)
    pub use_timemaps: bool,
    pub priority_weight: i32,
}

impl HandlerBinding {
    pub fn default_handler(
        base_uri: Option<String>,
        resource_type: ResourceType,
        use_timemaps: bool,
    ) -> Self {
        Self {
            name: None,
            base_uri: base_uri.filter(|uri| !uri.is_empty()),
            resource_type,
            use_timemaps,
            priority_weight: DEFAULT_HANDLER_WEIGHT,
        }
    }

    pub fn named(
        name: impl Into<String>,
        base_uri: impl Into<String>,
        resource_type: ResourceType,
        use_timemaps: bool,
    ) -> Self {
        Self {
            name: Some(name.into()),
            base_uri: Some(base_uri.into()),
            resource_type,
            use_timemaps,
            priority_weight: PREFIXED_HANDLER_WEIGHT,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name.is_none()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }

    fn matches(&self, encoded: &str) -> bool {
        if self.is_default() {
            return true;
        }
        match &self.base_uri {
            Some(prefix) => encoded.starts_with(prefix.as_str()),
            None => false,
        }
    }

    /// Turn a request identifier into the full URI-R handed to the source.
    ///
    /// Literal spaces are encoded and bare suffixes get the base URI prepended.
    pub fn normalize(&self, identifier: &str) -> String {
        let encoded = identifier.replace(' ', ENCODED_SPACE);
        match &self.base_uri {
            Some(prefix) if !encoded.starts_with(prefix.as_str()) => {
                format!("{}{}", prefix, encoded)
            }
            _ => encoded,
        }
    }

    /// Inverse of [`normalize`](Self::normalize), used to build self links.
    pub fn request_identifier(&self, uri_r: &str) -> String {
        let decoded = uri_r.replace(ENCODED_SPACE, " ");
        match &self.base_uri {
            Some(prefix) => match decoded.strip_prefix(prefix.as_str()) {
                Some(suffix) => suffix.to_string(),
                None => decoded,
            },
            None => decoded,
        }
    }
}

/// A binding together with its source and the capabilities it actually has.
pub struct RegisteredHandler {
    pub binding: HandlerBinding,
    pub source: Arc<dyn MementoSource>,
    use_timemaps: bool,
}

impl RegisteredHandler {
    /// Timemaps requested by configuration *and* supported by the source.
    pub fn use_timemaps(&self) -> bool {
        self.use_timemaps
    }

    pub fn resource_type(&self) -> ResourceType {
        self.binding.resource_type
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("binding", &self.binding)
            .field("source", &self.source.source_name())
            .field("use_timemaps", &self.use_timemaps)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMapFormat {
    Link,
    Json,
}

impl TimeMapFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Json => "json",
        }
    }
}

impl FromStr for TimeMapFormat {
    type Err = TimegateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "link" => Ok(Self::Link),
            "json" => Ok(Self::Json),
            other => Err(TimegateError::NotFound(format!(
                "unknown timemap format '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    TimeGate,
    TimeMap(TimeMapFormat),
}

impl Endpoint {
    fn path(&self) -> String {
        match self {
            Self::TimeGate => "timegate".to_string(),
            Self::TimeMap(format) => format!("timemap/{}", format.as_str()),
        }
    }
}

/// Request-scoped routing result: which handler serves the request and the
/// normalized URI-R it should be asked about.
#[derive(Debug)]
pub struct Route<'a> {
    pub handler: &'a RegisteredHandler,
    pub uri_r: String,
}

impl Route<'_> {
    /// External URL of `endpoint` for this route's resource.
    pub fn url_for(&self, host: &str, endpoint: Endpoint) -> String {
        format!(
            "{}/{}/{}",
            host,
            endpoint.path(),
            self.handler.binding.request_identifier(&self.uri_r)
        )
    }
}

/// Registry of memento handlers. Read-only once the server starts.
#[derive(Default)]
pub struct SourceRegistry {
    handlers: Vec<RegisteredHandler>,
    // Indices into `handlers` in resolution order
    order: Vec<usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under a binding
    pub fn register(&mut self, binding: HandlerBinding, source: Arc<dyn MementoSource>) -> Result<()> {
        let capabilities = source.capabilities();
        if !capabilities.any() {
            return Err(TimegateError::Configuration(format!(
                "source '{}' for handler '{}' supports neither timegate nor timemap lookups",
                source.source_name(),
                binding.label()
            )));
        }
        if !binding.is_default() && binding.base_uri.as_deref().map_or(true, str::is_empty) {
            return Err(TimegateError::Configuration(format!(
                "handler '{}' needs a base URI",
                binding.label()
            )));
        }
        if binding.is_default() && self.handlers.iter().any(|h| h.binding.is_default()) {
            return Err(TimegateError::Configuration(
                "a default handler is already registered".to_string(),
            ));
        }
        if let Some(name) = &binding.name {
            if self.handlers.iter().any(|h| h.binding.name.as_ref() == Some(name)) {
                return Err(TimegateError::Configuration(format!(
                    "handler '{}' is registered twice",
                    name
                )));
            }
        }

        if binding.use_timemaps && !capabilities.timemap {
            warn!(
                "Handler '{}' is configured to serve timemaps but source '{}' cannot list mementos",
                binding.label(),
                source.source_name()
            );
        }
        let use_timemaps = binding.use_timemaps && capabilities.timemap;

        info!(
            "Registered handler '{}' (source: {}, base_uri: {}, weight: {}, timemaps: {})",
            binding.label(),
            source.source_name(),
            binding.base_uri.as_deref().unwrap_or("*"),
            binding.priority_weight,
            use_timemaps
        );

        self.handlers.push(RegisteredHandler {
            binding,
            source,
            use_timemaps,
        });
        self.reorder();
        Ok(())
    }

    fn reorder(&mut self) {
        let mut order: Vec<usize> = (0..self.handlers.len()).collect();
        // Stable sort keeps registration order among equal keys
        order.sort_by_key(|&i| {
            let binding = &self.handlers[i].binding;
            (binding.is_default(), Reverse(binding.priority_weight))
        });
        self.order = order;
    }

    /// Find the handler for a request identifier and normalize it.
    pub fn resolve(&self, identifier: &str) -> Result<Route<'_>> {
        let encoded = identifier.replace(' ', ENCODED_SPACE);
        self.handlers()
            .find(|handler| handler.binding.matches(&encoded))
            .map(|handler| Route {
                handler,
                uri_r: handler.binding.normalize(&encoded),
            })
            .ok_or_else(|| TimegateError::NotFound(format!("no handler for '{}'", identifier)))
    }

    /// Handlers in resolution order
    pub fn handlers(&self) -> impl Iterator<Item = &RegisteredHandler> {
        self.order.iter().map(|&i| &self.handlers[i])
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
