//! Global search helpers.
//!
//! A search string consists of free text plus optional `key:value` tag
//! filters, e.g. `sensor floor:2`. Candidates match when their name (or hex
//! identifier) contains the free text case-insensitively, or when their tags
//! contain every tag filter. The score is the trigram similarity between the
//! full search string and the best matching field.

use crate::{Eui64, StorageError};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use uuid::Uuid;

/// Parsed search string
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    /// Free text with the tag filters removed
    pub query: String,
    /// `key:value` filters
    pub tags: HashMap<String, String>,
}

impl SearchQuery {
    /// Case-insensitive substring match of the free text.
    pub fn matches_text(&self, value: &str) -> bool {
        value.to_lowercase().contains(&self.query.to_lowercase())
    }

    /// True when tag filters are present and all of them are in `tags`.
    pub fn matches_tags(&self, tags: &HashMap<String, String>) -> bool {
        !self.tags.is_empty() && self.tags.iter().all(|(k, v)| tags.get(k) == Some(v))
    }
}

/// Search hit
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    /// `tenant`, `application`, `device` or `gateway`
    pub kind: String,
    /// Similarity score in `[0, 1]`
    pub score: f32,
    /// Tenant id
    pub tenant_id: Option<Uuid>,
    /// Tenant name
    pub tenant_name: Option<String>,
    /// Application id
    pub application_id: Option<Uuid>,
    /// Application name
    pub application_name: Option<String>,
    /// Device EUI
    pub device_dev_eui: Option<Eui64>,
    /// Device name
    pub device_name: Option<String>,
    /// Gateway id
    pub gateway_id: Option<Eui64>,
    /// Gateway name
    pub gateway_name: Option<String>,
}

impl SearchResult {
    /// Empty hit of the given kind
    pub fn new(kind: &str, score: f32) -> Self {
        SearchResult {
            kind: kind.to_string(),
            score,
            tenant_id: None,
            tenant_name: None,
            application_id: None,
            application_name: None,
            device_dev_eui: None,
            device_name: None,
            gateway_id: None,
            gateway_name: None,
        }
    }
}

fn tag_regex() -> Result<&'static Regex, StorageError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(r"([^ ]+):([^ ]+)").map_err(|e| StorageError::Anyhow(e.into()))?;
    Ok(RE.get_or_init(|| re))
}

/// Split a search string into free text and tag filters.
pub fn parse_search_query(q: &str) -> Result<SearchQuery, StorageError> {
    let re = tag_regex()?;

    let tags = re
        .captures_iter(q)
        .filter_map(|caps| match (caps.get(1), caps.get(2)) {
            (Some(k), Some(v)) => Some((k.as_str().to_string(), v.as_str().to_string())),
            _ => None,
        })
        .collect();

    Ok(SearchQuery {
        query: re.replace_all(q, "").trim().to_string(),
        tags,
    })
}

fn trigrams(s: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for word in s
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for w in padded.windows(3) {
            out.insert(w.iter().collect());
        }
    }
    out
}

/// Trigram similarity: shared trigrams over all distinct trigrams of both
/// strings, words padded with two leading blanks and one trailing blank.
pub fn similarity(a: &str, b: &str) -> f32 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let shared = ta.intersection(&tb).count();
    let total = ta.union(&tb).count();
    shared as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_query() {
        struct Test {
            input: &'static str,
            query: &'static str,
            tags: Vec<(&'static str, &'static str)>,
        }

        let tests = vec![
            Test {
                input: "foo",
                query: "foo",
                tags: vec![],
            },
            Test {
                input: "foo bar",
                query: "foo bar",
                tags: vec![],
            },
            Test {
                input: "foo:bar",
                query: "",
                tags: vec![("foo", "bar")],
            },
            Test {
                input: "foo:bar alpha",
                query: "alpha",
                tags: vec![("foo", "bar")],
            },
            Test {
                input: "foo:bar alpha:beta  gamma ",
                query: "gamma",
                tags: vec![("foo", "bar"), ("alpha", "beta")],
            },
        ];

        for tst in tests {
            let parsed = parse_search_query(tst.input).unwrap();
            assert_eq!(parsed.query, tst.query, "input: {}", tst.input);
            let tags: HashMap<String, String> = tst
                .tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            assert_eq!(parsed.tags, tags, "input: {}", tst.input);
        }
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("device", "device"), 1.0);
        assert_eq!(similarity("Device", "dEVICE"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", "xyz"), 0.0);

        // 4 shared of 7 distinct trigrams
        let s = similarity("word", "words");
        assert!((s - 4.0 / 7.0).abs() < f32::EPSILON);

        assert!(similarity("test-device", "test") > similarity("test-device", "tent"));
    }

    #[test]
    fn test_match_helpers() {
        let q = parse_search_query("SENS floor:2").unwrap();
        assert!(q.matches_text("my-sensor"));
        assert!(!q.matches_text("gateway"));

        let mut tags = HashMap::new();
        tags.insert("floor".to_string(), "2".to_string());
        assert!(q.matches_tags(&tags));
        tags.insert("floor".to_string(), "3".to_string());
        assert!(!q.matches_tags(&tags));

        // no filters never match on tags
        assert!(!parse_search_query("x").unwrap().matches_tags(&tags));
    }
}
