//! RFC 8288 web links as used by the Memento protocol.

use crate::datetime::{format_http_date, parse_http_date};
use crate::error::{Result, UpstreamError};
use crate::types::Memento;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// One outgoing link: `<href>; rel="..."; type="..."; datetime="..."`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub rel: &'static str,
    pub media_type: Option<&'static str>,
    pub datetime: Option<DateTime<Utc>>,
}

impl Link {
    pub fn new(href: impl Into<String>, rel: &'static str) -> Self {
        Self {
            href: href.into(),
            rel,
            media_type: None,
            datetime: None,
        }
    }

    pub fn with_type(mut self, media_type: &'static str) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn with_datetime(mut self, datetime: DateTime<Utc>) -> Self {
        self.datetime = Some(datetime);
        self
    }

    pub fn memento(memento: &Memento, rel: &'static str) -> Self {
        Self::new(memento.uri.clone(), rel).with_datetime(memento.datetime)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>; rel=\"{}\"", self.href, self.rel)?;
        if let Some(media_type) = self.media_type {
            write!(f, "; type=\"{}\"", media_type)?;
        }
        if let Some(datetime) = &self.datetime {
            write!(f, "; datetime=\"{}\"", format_http_date(datetime))?;
        }
        Ok(())
    }
}

/// Render links as a single `Link` header value.
pub fn link_header(links: &[Link]) -> String {
    links
        .iter()
        .map(Link::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A link read back from a link-format document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    pub href: String,
    pub params: Vec<(String, String)>,
}

impl ParsedLink {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_rel(&self, rel: &str) -> bool {
        self.param("rel")
            .map(|rels| rels.split_whitespace().any(|r| r.eq_ignore_ascii_case(rel)))
            .unwrap_or(false)
    }
}

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<([^>]*)>((?:\s*;\s*[^;,=\s]+\s*=\s*(?:"[^"]*"|[^;,\s]*))*)"#)
        .expect("valid link regex")
});
static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#";\s*([^;,=\s]+)\s*=\s*(?:"([^"]*)"|([^;,\s]*))"#).expect("valid param regex")
});

/// Parse an `application/link-format` body or a `Link` header value.
///
/// Quoted parameter values may contain commas (HTTP dates do), so entries
/// are matched structurally rather than split on separators.
pub fn parse_link_format(text: &str) -> Vec<ParsedLink> {
    LINK_RE
        .captures_iter(text)
        .map(|caps| {
            let href = caps[1].trim().to_string();
            let params = caps
                .get(2)
                .map(|raw| {
                    PARAM_RE
                        .captures_iter(raw.as_str())
                        .map(|p| {
                            let value = p
                                .get(2)
                                .or_else(|| p.get(3))
                                .map(|m| m.as_str().to_string())
                                .unwrap_or_default();
                            (p[1].to_ascii_lowercase(), value)
                        })
                        .collect()
                })
                .unwrap_or_default();
            ParsedLink { href, params }
        })
        .collect()
}

/// Extract the mementos (in document order) from a link-format timemap.
pub fn mementos_from_link_format(text: &str) -> Result<Vec<Memento>> {
    parse_link_format(text)
        .into_iter()
        .filter(|link| link.has_rel("memento"))
        .map(|link| -> Result<Memento> {
            let raw = link.param("datetime").ok_or_else(|| {
                UpstreamError::Failed(format!("memento {} has no datetime", link.href))
            })?;
            let datetime = parse_http_date(raw).map_err(|e| {
                UpstreamError::Failed(format!("memento {} has a bad datetime: {}", link.href, e))
            })?;
            Ok(Memento::new(link.href, datetime))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_link_display() {
        let dt = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            Link::new("http://a/", "original").to_string(),
            r#"<http://a/>; rel="original""#
        );
        assert_eq!(
            Link::new("http://tg/timemap/link/a", "timemap")
                .with_type("application/link-format")
                .to_string(),
            r#"<http://tg/timemap/link/a>; rel="timemap"; type="application/link-format""#
        );
        assert_eq!(
            Link::new("http://a/v1", "first memento")
                .with_datetime(dt)
                .to_string(),
            r#"<http://a/v1>; rel="first memento"; datetime="Fri, 01 Jan 2010 00:00:00 GMT""#
        );
    }

    #[test]
    fn test_link_header_joins_with_comma() {
        let header = link_header(&[Link::new("http://a/", "original"), Link::new("http://b/", "self")]);
        assert_eq!(header, r#"<http://a/>; rel="original", <http://b/>; rel="self""#);
    }

    #[test]
    fn test_parse_keeps_commas_inside_quotes() {
        let body = concat!(
            "<http://a/>; rel=\"original\",\n",
            "<http://a/v1>; rel=\"first memento\"; datetime=\"Fri, 01 Jan 1999 00:00:00 GMT\",\n",
            "<http://a/v2>; rel=\"last memento\"; datetime=\"Tue, 01 Jun 2010 00:00:00 GMT\"\n",
        );
        let links = parse_link_format(body);
        assert_eq!(links.len(), 3);
        assert_eq!(links[1].href, "http://a/v1");
        assert_eq!(links[1].param("datetime"), Some("Fri, 01 Jan 1999 00:00:00 GMT"));
        assert!(links[1].has_rel("memento"));
        assert!(links[1].has_rel("first"));
        assert!(!links[0].has_rel("memento"));
    }

    #[test]
    fn test_parse_unquoted_params() {
        let links = parse_link_format("<http://a/>; rel=original; anchor=x");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].param("rel"), Some("original"));
        assert_eq!(links[0].param("anchor"), Some("x"));
    }

    #[test]
    fn test_mementos_from_link_format() {
        let body = concat!(
            "<http://a/>; rel=\"original\",\n",
            "<http://tg/timegate/a>; rel=\"timegate\",\n",
            "<http://a/v1>; rel=\"first memento\"; datetime=\"Fri, 01 Jan 1999 00:00:00 GMT\",\n",
            "<http://a/v2>; rel=\"memento\"; datetime=\"Tue, 01 Jun 2010 00:00:00 GMT\",\n",
            "<http://a/v3>; rel=\"last memento\"; datetime=\"Wed, 01 Jan 2020 00:00:00 GMT\"\n",
        );
        let mementos = mementos_from_link_format(body).unwrap();
        let uris: Vec<_> = mementos.iter().map(|m| m.uri.as_str()).collect();
        assert_eq!(uris, vec!["http://a/v1", "http://a/v2", "http://a/v3"]);
        assert_eq!(
            mementos[1].datetime,
            Utc.with_ymd_and_hms(2010, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_memento_without_datetime_is_an_error() {
        assert!(mementos_from_link_format("<http://a/v1>; rel=\"memento\"").is_err());
    }
}
