use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Subscription selector. Every non-empty field must match for the filter to
/// match an event; an entirely empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub ids: Vec<String>,
    pub authors: Vec<String>,
    pub kinds: Vec<u32>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<u64>,
    /// Tag filters keyed by the single-character tag name following `#`
    /// (e.g. `"p"` for a wire-level `#p` filter) — already stripped of the
    /// leading `#`, which `Filter`'s hand-rolled `Serialize`/`Deserialize`
    /// below adds back on the wire.
    pub tags: HashMap<String, HashSet<String>>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.authors.is_empty()
            && self.kinds.is_empty()
            && self.since.is_none()
            && self.until.is_none()
            && self.limit.is_none()
            && self.tags.is_empty()
    }
}

/// The wire shape `Filter` flattens into: `#[serde(flatten)]` keeps unknown
/// top-level keys verbatim, so it sees `#p` rather than `p`. Hand-rolled the
/// same way `PacketResponse` hand-rolls its `{accept, ...}` shape, since the
/// derive macro has no hook to rewrite a flattened map's keys in transit.
#[derive(Serialize, Deserialize)]
struct Wire {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    kinds: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    since: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(flatten, default, skip_serializing_if = "HashMap::is_empty")]
    tags: HashMap<String, HashSet<String>>,
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tags = self.tags.iter().map(|(name, allowed)| (format!("#{name}"), allowed.clone())).collect();
        let wire = Wire {
            ids: self.ids.clone(),
            authors: self.authors.clone(),
            kinds: self.kinds.clone(),
            since: self.since,
            until: self.until,
            limit: self.limit,
            tags,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Wire::deserialize(deserializer)?;
        let tags = wire
            .tags
            .into_iter()
            .map(|(key, allowed)| (key.strip_prefix('#').map(str::to_string).unwrap_or(key), allowed))
            .collect();
        Ok(Filter {
            ids: wire.ids,
            authors: wire.authors,
            kinds: wire.kinds,
            since: wire.since,
            until: wire.until,
            limit: wire.limit,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_hash_prefixed_tag_key_with_leading_hash_stripped() {
        let filter: Filter = serde_json::from_str(r#"{"#p":["deadbeef"]}"#).unwrap();
        assert_eq!(filter.tags.len(), 1);
        assert!(filter.tags.contains_key("p"));
        assert!(filter.tags["p"].contains("deadbeef"));
    }

    #[test]
    fn round_trips_tag_filter_through_json() {
        let mut tags = HashMap::new();
        tags.insert("p".to_string(), HashSet::from(["deadbeef".to_string()]));
        let filter = Filter { tags, ..Default::default() };

        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains("\"#p\""));

        let round_tripped: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, filter);
    }
}
