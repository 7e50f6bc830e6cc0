use crate::constants::EXAMPLE_SOURCE;
use crate::error::{Result, UpstreamError};
use crate::negotiation::best;
use crate::types::{Capabilities, Memento, MementoSource, ResourceType, TimeMap};
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

/// Fixture source for demos and tests.
///
/// Knows two resources under its base URI: `resourceA` with three versions
/// (1999-01-01, 2010-06-01 and today) and `resource%20space` with one.
pub struct ExampleSource {
    base_uri: String,
}

impl Default for ExampleSource {
    fn default() -> Self {
        Self::new("http://www.example.com/")
    }
}

impl ExampleSource {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
        }
    }

    fn fixture(&self, uri_r: &str) -> Option<Vec<Memento>> {
        let suffix = uri_r.strip_prefix(self.base_uri.as_str())?;
        match suffix {
            "resourceA" => Some(vec![
                Memento::new(format!("{}resourceA_v1", self.base_uri), ymd(1999, 1, 1)),
                Memento::new(format!("{}resourceA_v2", self.base_uri), ymd(2010, 6, 1)),
                Memento::new(format!("{}resourceA_v3", self.base_uri), today()),
            ]),
            "resource%20space" => Some(vec![Memento::new(
                format!("{}space", self.base_uri),
                ymd(2000, 1, 1),
            )]),
            _ => None,
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

// Latest version is dated to the start of the current day so that it never
// lies after a request's "now"
fn today() -> DateTime<Utc> {
    Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

#[async_trait::async_trait]
impl MementoSource for ExampleSource {
    fn source_name(&self) -> &str {
        EXAMPLE_SOURCE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            timegate: true,
            timemap: true,
        }
    }

    async fn get_memento(&self, uri_r: &str, accept_datetime: DateTime<Utc>) -> Result<Memento> {
        let timemap = TimeMap::from_source(uri_r, self.get_all_mementos(uri_r).await?)?;
        let chosen = best(&timemap, accept_datetime, ResourceType::VersionControlled);
        debug!("Example source picked {} for {}", chosen.uri, uri_r);
        Ok(chosen.clone())
    }

    async fn get_all_mementos(&self, uri_r: &str) -> Result<Vec<Memento>> {
        self.fixture(uri_r)
            .ok_or_else(|| UpstreamError::NotFound(uri_r.to_string()).into())
    }
}
