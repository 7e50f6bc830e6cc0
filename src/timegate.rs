//! Request orchestration: router, cache, source, negotiation, response.

use crate::cache::{CacheBackend, FileSystemBackend, MemoryBackend, NullBackend, TimeMapCache};
use crate::config::{CacheBackendKind, Config};
use crate::datetime::parse_http_date;
use crate::error::{Result, TimegateError, UpstreamError};
use crate::metrics::TimegateMetrics;
use crate::negotiation::{negotiate_list, negotiate_single, target_or_now};
use crate::registry::{Route, SourceRegistry, TimeMapFormat};
use crate::response::{
    memento_response, timemap_json_document, timemap_link_body, RedirectResponse, SelfLinks,
    TimeMapDocument,
};
use crate::sources::build_registry;
use crate::types::TimeMap;
use crate::validate::validate_uri;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A rendered timemap, ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeMapBody {
    Link(String),
    Json(TimeMapDocument),
}

pub struct TimeGate {
    registry: SourceRegistry,
    cache: TimeMapCache,
    host: String,
    api_timeout: Option<Duration>,
}

impl TimeGate {
    pub fn new(
        registry: SourceRegistry,
        cache: TimeMapCache,
        host: impl Into<String>,
        api_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            cache,
            host: host.into(),
            api_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = build_registry(config)?;
        let backend: Arc<dyn CacheBackend> = match config.cache.backend {
            CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
            CacheBackendKind::Filesystem => {
                Arc::new(FileSystemBackend::new(config.cache.directory.clone()))
            }
            CacheBackendKind::Null => Arc::new(NullBackend),
        };
        let cache = TimeMapCache::new(backend, config.refresh_time(), config.cache.max_size);
        info!(
            "TimeGate ready: {} handlers, {} cache (refresh {}s), host {}",
            registry.len(),
            cache.backend_name(),
            config.cache.refresh_time,
            config.server.host
        );
        Ok(Self::new(
            registry,
            cache,
            config.server.host.clone(),
            config.api_timeout(),
        ))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Negotiate the memento of `identifier` closest to `accept_datetime`.
    pub async fn timegate(
        &self,
        identifier: &str,
        accept_datetime: Option<&str>,
        no_cache: bool,
    ) -> Result<RedirectResponse> {
        TimegateMetrics::record_request("timegate");
        let identifier = validate_uri(identifier)?;
        let requested = accept_datetime.map(parse_http_date).transpose()?;
        let target = target_or_now(requested);

        let route = self.registry.resolve(&identifier)?;
        let handler = route.handler;
        let capabilities = handler.source.capabilities();

        // Timemap-only sources answer timegate requests from their list
        // even when timemaps are not advertised
        let result = if handler.use_timemaps() || !capabilities.timegate {
            debug!(
                "Negotiating {} from the timemap ({:?})",
                route.uri_r,
                handler.resource_type()
            );
            let timemap = self.fetch_timemap(&route, target, no_cache).await?;
            negotiate_list(&timemap, target, handler.resource_type(), handler.use_timemaps())
        } else {
            debug!("Asking {} for a single memento of {}", handler.source.source_name(), route.uri_r);
            let memento = self
                .call_source(
                    handler.source.source_name(),
                    handler.source.get_memento(&route.uri_r, target),
                )
                .await?;
            negotiate_single(memento, false)
        };

        let self_links = SelfLinks::for_route(&route, &self.host);
        Ok(memento_response(&result, &route.uri_r, &self_links))
    }

    /// Full timemap of `identifier` in the requested format.
    pub async fn timemap(
        &self,
        format: TimeMapFormat,
        identifier: &str,
        no_cache: bool,
    ) -> Result<TimeMapBody> {
        TimegateMetrics::record_request("timemap");
        let identifier = validate_uri(identifier)?;
        let route = self.registry.resolve(&identifier)?;
        if !route.handler.use_timemaps() {
            return Err(TimegateError::Forbidden(format!(
                "handler '{}' does not serve timemaps",
                route.handler.binding.label()
            )));
        }

        let timemap = self.fetch_timemap(&route, Utc::now(), no_cache).await?;
        let self_links = SelfLinks::for_route(&route, &self.host);
        Ok(match format {
            TimeMapFormat::Link => {
                TimeMapBody::Link(timemap_link_body(&timemap, &route.uri_r, &self_links))
            }
            TimeMapFormat::Json => {
                TimeMapBody::Json(timemap_json_document(&timemap, &route.uri_r, &self_links))
            }
        })
    }

    /// Timemap for a route, from the cache when an entry is fresh for
    /// `reference_time`, otherwise from the source (and then cached).
    async fn fetch_timemap(
        &self,
        route: &Route<'_>,
        reference_time: DateTime<Utc>,
        no_cache: bool,
    ) -> Result<TimeMap> {
        if !no_cache {
            if let Some(timemap) = self.cache.get(&route.uri_r, reference_time).await {
                return Ok(timemap);
            }
        }
        let source = &route.handler.source;
        let mementos = self
            .call_source(source.source_name(), source.get_all_mementos(&route.uri_r))
            .await?;
        let timemap = TimeMap::from_source(&route.uri_r, mementos)?;
        self.cache.set(&route.uri_r, &timemap).await;
        Ok(timemap)
    }

    /// Await a source call under the configured time-out, recording metrics.
    async fn call_source<T, F>(&self, source_name: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let outcome = match self.api_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(UpstreamError::Timeout(limit).into()),
            },
            None => call.await,
        };
        TimegateMetrics::record_upstream_duration(source_name, started.elapsed().as_secs_f64());

        if let Err(e) = &outcome {
            let cause = match e {
                TimegateError::Upstream(UpstreamError::NotFound(_)) => "not_found",
                TimegateError::Upstream(UpstreamError::Timeout(_)) => "timeout",
                _ => "failed",
            };
            TimegateMetrics::record_upstream_error(source_name, cause);
            if cause == "not_found" {
                debug!("Source {} has nothing for the request: {}", source_name, e);
            } else {
                warn!("Source {} failed: {}", source_name, e);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerBinding;
    use crate::types::{Capabilities, Memento, MementoSource, ResourceType};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts list fetches and can be told to stall.
    struct CountingSource {
        calls: AtomicUsize,
        delay: Option<Duration>,
        capabilities: Capabilities,
    }

    impl CountingSource {
        fn new(capabilities: Capabilities) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: None,
                capabilities,
            })
        }
    }

    #[async_trait::async_trait]
    impl MementoSource for CountingSource {
        fn source_name(&self) -> &str {
            "counting"
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        async fn get_memento(&self, uri_r: &str, _dt: DateTime<Utc>) -> Result<Memento> {
            Ok(Memento::new(format!("{}single", uri_r), Utc::now()))
        }

        async fn get_all_mementos(&self, uri_r: &str) -> Result<Vec<Memento>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(vec![
                Memento::new(format!("{}v1", uri_r), Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap()),
                Memento::new(format!("{}v2", uri_r), Utc.with_ymd_and_hms(2002, 1, 1, 0, 0, 0).unwrap()),
            ])
        }
    }

    const BOTH: Capabilities = Capabilities {
        timegate: true,
        timemap: true,
    };

    fn service(source: Arc<CountingSource>, use_timemaps: bool, timeout: Option<Duration>) -> TimeGate {
        let mut registry = SourceRegistry::new();
        registry
            .register(
                HandlerBinding::default_handler(
                    Some("http://a/".to_string()),
                    ResourceType::VersionControlled,
                    use_timemaps,
                ),
                source,
            )
            .unwrap();
        let cache = TimeMapCache::new(
            Arc::new(MemoryBackend::new()),
            Duration::from_secs(86_400),
            0,
        );
        TimeGate::new(registry, cache, "http://tg", timeout)
    }

    #[tokio::test]
    async fn test_list_mode_uses_cache() {
        let source = CountingSource::new(BOTH);
        let tg = service(source.clone(), true, None);

        let first = tg.timegate("page/", None, false).await.unwrap();
        assert_eq!(first.location, "http://a/page/v2");
        tg.timegate("page/", Some("Mon, 01 Jan 2001 00:00:00 GMT"), false)
            .await
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // no-cache forces a fetch but still refreshes the entry
        tg.timegate("page/", None, true).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_mode_skips_timemap() {
        let source = CountingSource::new(BOTH);
        let tg = service(source.clone(), false, None);
        let response = tg.timegate("page", None, false).await.unwrap();
        assert_eq!(response.location, "http://a/pagesingle");
        assert!(!response.link_header().contains("timemap"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timemap_forbidden_without_batch() {
        let tg = service(CountingSource::new(BOTH), false, None);
        let err = tg
            .timemap(TimeMapFormat::Json, "page", false)
            .await
            .unwrap_err();
        assert!(matches!(err, TimegateError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_timemap_only_source_answers_timegate() {
        let source = CountingSource::new(Capabilities {
            timegate: false,
            timemap: true,
        });
        let tg = service(source, false, None);
        let response = tg
            .timegate("page", Some("Sat, 01 Jun 2001 00:00:00 GMT"), false)
            .await
            .unwrap();
        assert_eq!(response.location, "http://a/pagev1");
        assert!(!response.link_header().contains("timemap"));
    }

    #[tokio::test]
    async fn test_bad_accept_datetime_is_validation_error() {
        let tg = service(CountingSource::new(BOTH), true, None);
        let err = tg.timegate("page", Some("yesterday"), false).await.unwrap_err();
        assert!(matches!(err, TimegateError::Validation(_)));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_secs(5)),
            capabilities: BOTH,
        });
        let tg = service(source, true, Some(Duration::from_millis(20)));
        let err = tg.timegate("page", None, false).await.unwrap_err();
        assert!(matches!(
            err,
            TimegateError::Upstream(UpstreamError::Timeout(_))
        ));
        assert_eq!(err.status(), axum::http::StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_timemap_link_self_links_use_host() {
        let tg = service(CountingSource::new(BOTH), true, None);
        match tg.timemap(TimeMapFormat::Link, "page", false).await.unwrap() {
            TimeMapBody::Link(body) => {
                assert!(body.contains("<http://tg/timegate/page>; rel=\"timegate\""));
                assert!(body.contains("<http://tg/timemap/link/page>; rel=\"self\""));
            }
            other => panic!("expected link body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_from_config_example() {
        let tg = TimeGate::from_config(&Config::example()).unwrap();
        assert_eq!(tg.host(), "http://localhost:9999");
        let response = tg
            .timegate("http://www.example.com/resourceA", None, false)
            .await
            .unwrap();
        assert_eq!(response.location, "http://www.example.com/resourceA_v3");
    }
}
