use crate::constants::STATIC_SOURCE;
use crate::error::{Result, TimegateError, UpstreamError};
use crate::types::{Capabilities, Memento, MementoSource, TimeMap};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Timemaps loaded once from a JSON file of the form
/// `{"<uri-r>": [{"uri": "...", "datetime": "<RFC 3339>"}, ...]}`.
///
/// Only serves timemaps; timegate requests are answered from the list.
#[derive(Debug, Default)]
pub struct StaticSource {
    timemaps: HashMap<String, TimeMap>,
}

impl StaticSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TimegateError::Configuration(format!(
                "Failed to read timemap file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let source = Self::from_json(&content).map_err(|e| {
            TimegateError::Configuration(format!(
                "Invalid timemap file '{}': {}",
                path.display(),
                e
            ))
        })?;
        info!(
            "Loaded {} timemaps from {}",
            source.timemaps.len(),
            path.display()
        );
        Ok(source)
    }

    /// Every list must be non-empty and in ascending order.
    pub fn from_json(content: &str) -> Result<Self> {
        let timemaps: HashMap<String, TimeMap> = serde_json::from_str(content)?;
        Ok(Self { timemaps })
    }

    pub fn len(&self) -> usize {
        self.timemaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timemaps.is_empty()
    }
}

#[async_trait::async_trait]
impl MementoSource for StaticSource {
    fn source_name(&self) -> &str {
        STATIC_SOURCE
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            timegate: false,
            timemap: true,
        }
    }

    async fn get_all_mementos(&self, uri_r: &str) -> Result<Vec<Memento>> {
        self.timemaps
            .get(uri_r)
            .map(|timemap| timemap.as_slice().to_vec())
            .ok_or_else(|| UpstreamError::NotFound(uri_r.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "http://static.example.org/page": [
            {"uri": "http://archive/1", "datetime": "2001-01-01T00:00:00Z"},
            {"uri": "http://archive/2", "datetime": "2002-01-01T12:30:00Z"}
        ]
    }"#;

    #[tokio::test]
    async fn test_serves_loaded_timemaps() {
        let source = StaticSource::from_json(FIXTURE).unwrap();
        assert_eq!(source.len(), 1);
        let mementos = source
            .get_all_mementos("http://static.example.org/page")
            .await
            .unwrap();
        assert_eq!(mementos.len(), 2);
        assert_eq!(mementos[1].uri, "http://archive/2");
        assert!(source
            .get_all_mementos("http://static.example.org/other")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cannot_answer_single_lookups() {
        let source = StaticSource::from_json(FIXTURE).unwrap();
        assert!(!source.capabilities().timegate);
        assert!(source
            .get_memento("http://static.example.org/page", chrono::Utc::now())
            .await
            .is_err());
    }

    #[test]
    fn test_rejects_unsorted_or_empty_lists() {
        let unsorted = r#"{"http://a/": [
            {"uri": "http://a/2", "datetime": "2002-01-01T00:00:00Z"},
            {"uri": "http://a/1", "datetime": "2001-01-01T00:00:00Z"}
        ]}"#;
        assert!(StaticSource::from_json(unsorted).is_err());
        assert!(StaticSource::from_json(r#"{"http://a/": []}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timemaps.json");
        std::fs::write(&path, FIXTURE).unwrap();
        assert_eq!(StaticSource::load(&path).unwrap().len(), 1);
        assert!(matches!(
            StaticSource::load(&dir.path().join("missing.json")),
            Err(TimegateError::Configuration(_))
        ));
    }
}
