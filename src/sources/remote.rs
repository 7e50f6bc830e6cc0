use crate::constants::{ACCEPT_DATETIME, MEMENTO_DATETIME, REMOTE_SOURCE};
use crate::datetime::{format_http_date, parse_http_date};
use crate::error::{Result, TimegateError, UpstreamError};
use crate::link::mementos_from_link_format;
use crate::types::{Capabilities, Memento, MementoSource};
use chrono::{DateTime, Utc};
use reqwest::header::LOCATION;
use reqwest::{redirect, StatusCode};
use tracing::{debug, instrument};

/// Proxies another Memento-compliant server.
///
/// The upstream URL for a resource is the configured endpoint followed by
/// the URI-R, e.g. `http://upstream/timemap/link/` + `http://example.com/`.
pub struct RemoteSource {
    client: reqwest::Client,
    timemap_endpoint: Option<String>,
    timegate_endpoint: Option<String>,
}

impl RemoteSource {
    pub fn new(timemap_endpoint: Option<String>, timegate_endpoint: Option<String>) -> Result<Self> {
        if timemap_endpoint.is_none() && timegate_endpoint.is_none() {
            return Err(TimegateError::Configuration(
                "remote source needs a timemap or timegate endpoint".to_string(),
            ));
        }
        // Upstream timegate redirects are read, not followed
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| TimegateError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timemap_endpoint,
            timegate_endpoint,
        })
    }

    fn check_status(status: StatusCode, url: &str) -> Result<()> {
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(url.to_string()).into());
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(UpstreamError::Failed(format!("{} returned {}", url, status)).into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MementoSource for RemoteSource {
    fn source_name(&self) -> &str {
        REMOTE_SOURCE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            timegate: self.timegate_endpoint.is_some(),
            timemap: self.timemap_endpoint.is_some(),
        }
    }

    #[instrument(skip(self))]
    async fn get_memento(&self, uri_r: &str, accept_datetime: DateTime<Utc>) -> Result<Memento> {
        let endpoint = self.timegate_endpoint.as_deref().ok_or_else(|| {
            UpstreamError::Failed(format!("no upstream timegate for {}", uri_r))
        })?;
        let url = format!("{}{}", endpoint, uri_r);
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT_DATETIME, format_http_date(&accept_datetime))
            .send()
            .await
            .map_err(UpstreamError::from)?;
        let status = resp.status();
        Self::check_status(status, &url)?;
        debug!("Upstream timegate {} answered {}", url, status);

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let location = header(LOCATION.as_str()).ok_or_else(|| {
            UpstreamError::Failed(format!("{} answered {} without a Location", url, status))
        })?;
        let raw_datetime = header(MEMENTO_DATETIME).ok_or_else(|| {
            UpstreamError::Failed(format!("{} answered without Memento-Datetime", url))
        })?;
        let datetime = parse_http_date(&raw_datetime).map_err(|e| {
            UpstreamError::Failed(format!("{} sent a bad Memento-Datetime: {}", url, e))
        })?;
        Ok(Memento::new(location, datetime))
    }

    #[instrument(skip(self))]
    async fn get_all_mementos(&self, uri_r: &str) -> Result<Vec<Memento>> {
        let endpoint = self.timemap_endpoint.as_deref().ok_or_else(|| {
            UpstreamError::Failed(format!("no upstream timemap for {}", uri_r))
        })?;
        let url = format!("{}{}", endpoint, uri_r);
        let resp = self.client.get(&url).send().await.map_err(UpstreamError::from)?;
        Self::check_status(resp.status(), &url)?;
        let body = resp.text().await.map_err(UpstreamError::from)?;
        let mementos = mementos_from_link_format(&body)?;
        debug!("Upstream timemap {} listed {} mementos", url, mementos.len());
        Ok(mementos)
    }
}
