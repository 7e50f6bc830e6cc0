use crate::error::{Result, TimegateError, UpstreamError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived version (URI-M) of an original resource, with its capture time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Memento {
    pub uri: String,
    pub datetime: DateTime<Utc>,
}

impl Memento {
    pub fn new(uri: impl Into<String>, datetime: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            datetime,
        }
    }
}

/// Non-empty list of mementos for one resource, ascending by datetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Memento>", into = "Vec<Memento>")]
pub struct TimeMap(Vec<Memento>);

impl TimeMap {
    /// Wrap a source's output. The list is checked, never re-sorted.
    pub fn new(mementos: Vec<Memento>) -> std::result::Result<Self, TimeMapError> {
        if mementos.is_empty() {
            return Err(TimeMapError::Empty);
        }
        if let Some(pos) = mementos
            .windows(2)
            .position(|pair| pair[0].datetime > pair[1].datetime)
        {
            return Err(TimeMapError::OutOfOrder(pos + 1));
        }
        Ok(Self(mementos))
    }

    /// Validate adapter output for `uri_r`, mapping failures onto upstream errors.
    pub fn from_source(uri_r: &str, mementos: Vec<Memento>) -> Result<Self> {
        Self::new(mementos).map_err(|e| match e {
            TimeMapError::Empty => UpstreamError::NotFound(uri_r.to_string()).into(),
            other => TimegateError::Upstream(UpstreamError::Failed(format!(
                "invalid timemap for {}: {}",
                uri_r, other
            ))),
        })
    }

    pub fn first(&self) -> &Memento {
        &self.0[0]
    }

    pub fn last(&self) -> &Memento {
        &self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[Memento] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Memento> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Memento>> for TimeMap {
    type Error = TimeMapError;

    fn try_from(mementos: Vec<Memento>) -> std::result::Result<Self, Self::Error> {
        Self::new(mementos)
    }
}

impl From<TimeMap> for Vec<Memento> {
    fn from(timemap: TimeMap) -> Self {
        timemap.0
    }
}

impl<'a> IntoIterator for &'a TimeMap {
    type Item = &'a Memento;
    type IntoIter = std::slice::Iter<'a, Memento>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeMapError {
    #[error("timemap is empty")]
    Empty,
    #[error("memento at index {0} is older than its predecessor")]
    OutOfOrder(usize),
}

/// Selection policy for a handler's resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// State of the resource as of the requested time (most recent not after it)
    VersionControlled,
    /// Closest capture in either direction
    Snapshot,
}

impl ResourceType {
    pub fn from_is_vcs(is_vcs: bool) -> Self {
        if is_vcs {
            Self::VersionControlled
        } else {
            Self::Snapshot
        }
    }
}

/// What a memento source can answer. Declared once and checked at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Can fetch the best memento for one datetime
    pub timegate: bool,
    /// Can fetch the complete timemap of a resource
    pub timemap: bool,
}

impl Capabilities {
    pub fn any(&self) -> bool {
        self.timegate || self.timemap
    }
}

/// Core trait that all memento sources must implement
#[async_trait::async_trait]
pub trait MementoSource: Send + Sync {
    /// Name used in logs and in the routes listing
    fn source_name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Fetch the memento of `uri_r` that best matches `accept_datetime`
    async fn get_memento(&self, uri_r: &str, _accept_datetime: DateTime<Utc>) -> Result<Memento> {
        Err(UpstreamError::Failed(format!(
            "{} cannot look up single mementos for {}",
            self.source_name(),
            uri_r
        ))
        .into())
    }

    /// Fetch every memento of `uri_r`, ascending by datetime
    async fn get_all_mementos(&self, uri_r: &str) -> Result<Vec<Memento>> {
        Err(UpstreamError::Failed(format!(
            "{} cannot list mementos for {}",
            self.source_name(),
            uri_r
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_timemap_rejects_empty_list() {
        assert_eq!(TimeMap::new(vec![]), Err(TimeMapError::Empty));
    }

    #[test]
    fn test_timemap_rejects_unsorted_list() {
        let result = TimeMap::new(vec![
            Memento::new("http://a/2", at(2002)),
            Memento::new("http://a/1", at(2001)),
        ]);
        assert_eq!(result, Err(TimeMapError::OutOfOrder(1)));
    }

    #[test]
    fn test_timemap_accepts_equal_datetimes() {
        let timemap = TimeMap::new(vec![
            Memento::new("http://a/1", at(2001)),
            Memento::new("http://a/2", at(2001)),
        ])
        .unwrap();
        assert_eq!(timemap.first().uri, "http://a/1");
        assert_eq!(timemap.last().uri, "http://a/2");
        assert_eq!(timemap.len(), 2);
    }

    #[test]
    fn test_from_source_maps_empty_to_not_found() {
        let err = TimeMap::from_source("http://a/", vec![]).unwrap_err();
        assert!(matches!(
            err,
            TimegateError::Upstream(UpstreamError::NotFound(_))
        ));
    }

    #[test]
    fn test_timemap_serde_round_trip_keeps_validation() {
        let timemap = TimeMap::new(vec![Memento::new("http://a/1", at(2001))]).unwrap();
        let json = serde_json::to_string(&timemap).unwrap();
        assert_eq!(serde_json::from_str::<TimeMap>(&json).unwrap(), timemap);
        assert!(serde_json::from_str::<TimeMap>("[]").is_err());
    }

    #[test]
    fn test_resource_type_from_flag() {
        assert_eq!(ResourceType::from_is_vcs(true), ResourceType::VersionControlled);
        assert_eq!(ResourceType::from_is_vcs(false), ResourceType::Snapshot);
    }
}
