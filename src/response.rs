//! Protocol-facing representations of a negotiation result.
//!
//! Nothing here touches HTTP types; the server module turns these values
//! into actual responses.

use crate::constants::{
    JSON_MIME, LINK_FORMAT_MIME, REL_FIRST_LAST_MEMENTO, REL_FIRST_MEMENTO, REL_LAST_MEMENTO,
    REL_MEMENTO, REL_ORIGINAL, REL_SELF, REL_TIMEGATE, REL_TIMEMAP,
};
use crate::datetime::format_http_date;
use crate::link::{link_header, Link};
use crate::negotiation::NegotiationResult;
use crate::registry::{Endpoint, Route, TimeMapFormat};
use crate::types::{Memento, TimeMap};
use serde::{Deserialize, Serialize};

/// External URLs of this server's own endpoints for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfLinks {
    pub timegate: String,
    pub timemap_link: String,
    pub timemap_json: String,
}

impl SelfLinks {
    pub fn for_route(route: &Route<'_>, host: &str) -> Self {
        Self {
            timegate: route.url_for(host, Endpoint::TimeGate),
            timemap_link: route.url_for(host, Endpoint::TimeMap(TimeMapFormat::Link)),
            timemap_json: route.url_for(host, Endpoint::TimeMap(TimeMapFormat::Json)),
        }
    }
}

/// A 302 pointing at the chosen memento.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectResponse {
    pub location: String,
    pub links: Vec<Link>,
}

impl RedirectResponse {
    pub fn link_header(&self) -> String {
        link_header(&self.links)
    }
}

pub fn memento_response(
    result: &NegotiationResult,
    uri_r: &str,
    self_links: &SelfLinks,
) -> RedirectResponse {
    // Timegate link is not allowed here
    let mut links = vec![Link::new(uri_r, REL_ORIGINAL)];
    if result.has_history_endpoint {
        links.push(Link::new(self_links.timemap_link.clone(), REL_TIMEMAP).with_type(LINK_FORMAT_MIME));
        links.push(Link::new(self_links.timemap_json.clone(), REL_TIMEMAP).with_type(JSON_MIME));
    }

    let chosen = &result.chosen;
    match (&result.first, &result.last) {
        (Some(first), Some(last)) if first.uri == last.uri => {
            // Only one memento exists: first = chosen = last
            links.push(Link::memento(chosen, REL_FIRST_LAST_MEMENTO));
        }
        (first, last) => {
            if let Some(first) = first {
                links.push(Link::memento(first, REL_FIRST_MEMENTO));
            }
            let is_first = first.as_ref().map_or(false, |m| m.uri == chosen.uri);
            let is_last = last.as_ref().map_or(false, |m| m.uri == chosen.uri);
            if !is_first && !is_last {
                links.push(Link::memento(chosen, REL_MEMENTO));
            }
            if let Some(last) = last {
                links.push(Link::memento(last, REL_LAST_MEMENTO));
            }
        }
    }

    RedirectResponse {
        location: chosen.uri.clone(),
        links,
    }
}

/// Relation labels for every entry of a timemap, in order.
fn memento_links(timemap: &TimeMap) -> Vec<Link> {
    let mementos = timemap.as_slice();
    if let [only] = mementos {
        return vec![Link::memento(only, REL_FIRST_LAST_MEMENTO)];
    }
    let last_index = mementos.len() - 1;
    mementos
        .iter()
        .enumerate()
        .map(|(i, memento)| {
            let rel = match i {
                0 => REL_FIRST_MEMENTO,
                i if i == last_index => REL_LAST_MEMENTO,
                _ => REL_MEMENTO,
            };
            Link::memento(memento, rel)
        })
        .collect()
}

/// Body of an `application/link-format` timemap.
pub fn timemap_link_body(timemap: &TimeMap, uri_r: &str, self_links: &SelfLinks) -> String {
    let mut links = vec![
        Link::new(uri_r, REL_ORIGINAL),
        Link::new(self_links.timegate.clone(), REL_TIMEGATE),
        Link::new(self_links.timemap_link.clone(), REL_SELF).with_type(LINK_FORMAT_MIME),
        Link::new(self_links.timemap_json.clone(), REL_TIMEMAP).with_type(JSON_MIME),
    ];
    links.extend(memento_links(timemap));

    let mut body = links
        .iter()
        .map(Link::to_string)
        .collect::<Vec<_>>()
        .join(",\n");
    body.push('\n');
    body
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MementoEntry {
    pub uri: String,
    pub datetime: String,
}

impl From<&Memento> for MementoEntry {
    fn from(memento: &Memento) -> Self {
        Self {
            uri: memento.uri.clone(),
            datetime: format_http_date(&memento.datetime),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MementoListing {
    pub last: MementoEntry,
    pub first: MementoEntry,
    pub list: Vec<MementoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMapUris {
    pub json_format: String,
    pub link_format: String,
}

/// JSON timemap document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMapDocument {
    pub original_uri: String,
    pub timegate_uri: String,
    pub mementos: MementoListing,
    pub timemap_uri: TimeMapUris,
}

pub fn timemap_json_document(timemap: &TimeMap, uri_r: &str, self_links: &SelfLinks) -> TimeMapDocument {
    TimeMapDocument {
        original_uri: uri_r.to_string(),
        timegate_uri: self_links.timegate.clone(),
        mementos: MementoListing {
            last: timemap.last().into(),
            first: timemap.first().into(),
            list: timemap.iter().map(MementoEntry::from).collect(),
        },
        timemap_uri: TimeMapUris {
            json_format: self_links.timemap_json.clone(),
            link_format: self_links.timemap_link.clone(),
        },
    }
}
