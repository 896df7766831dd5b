use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Structured filters matched as case-insensitive substrings
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKey {
    Name,
    Id,
}

impl FilterKey {
    fn as_str(&self) -> &'static str {
        match self {
            FilterKey::Name => "name",
            FilterKey::Id => "id",
        }
    }
}

/// A negated filter expression, excluding the records it matches
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "on", content = "value")]
pub enum Negation {
    /// `!name:value`
    Name(String),
    /// `!id:value`
    Id(String),
    /// `!state:value`
    State(String),
    /// `!type:pattern`
    Type(String),
    /// `!az:value`
    Zone(String),
    /// `!ip:pattern`
    Ip(String),
    /// `!dns:pattern`
    Dns(String),
    /// `!has:key`, excludes records carrying the tag
    Has(String),
    /// `!missing:key`, excludes records lacking the tag
    Missing(String),
    /// `!tag:key=value` or `!key=value`, excludes records whose tag value contains the given one
    Tag { key: String, value: Option<String> },
    /// `!term`, excludes records matching the fuzzy term
    Term(String),
}

/// A parsed search query.
///
/// The empty query is neutral and matches every record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Query {
    /// The text the query was parsed from
    #[serde(skip)]
    pub raw: String,
    /// Positive fuzzy terms, in the order they were typed
    pub terms: Vec<String>,
    /// Structured `name:` and `id:` filters
    pub filters: BTreeMap<FilterKey, String>,
    /// Tag equality constraints
    pub tags: BTreeMap<String, String>,
    /// Negated filters
    pub negations: Vec<Negation>,
    /// IP patterns, matching either the private or the public address
    pub ip_patterns: Vec<String>,
    /// DNS patterns, matching either the private or the public name
    pub dns_patterns: Vec<String>,
    pub state: Option<String>,
    pub instance_type: Option<String>,
    pub zone: Option<String>,
    /// Tag keys that must be present
    pub has_tags: BTreeSet<String>,
    /// Tag keys that must be absent
    pub missing_tags: BTreeSet<String>,
}

impl Query {
    /// Whether this query has no clause at all
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.filters.is_empty()
            && self.tags.is_empty()
            && self.negations.is_empty()
            && self.ip_patterns.is_empty()
            && self.dns_patterns.is_empty()
            && self.state.is_none()
            && self.instance_type.is_none()
            && self.zone.is_none()
            && self.has_tags.is_empty()
            && self.missing_tags.is_empty()
    }

    /// Stable digest of the structured query, ignoring the raw text
    pub fn digest(&self) -> String {
        // Maps and sets are ordered, so the json encoding is canonical
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
            && self.filters == other.filters
            && self.tags == other.tags
            && self.negations == other.negations
            && self.ip_patterns == other.ip_patterns
            && self.dns_patterns == other.dns_patterns
            && self.state == other.state
            && self.instance_type == other.instance_type
            && self.zone == other.zone
            && self.has_tags == other.has_tags
            && self.missing_tags == other.missing_tags
    }
}
impl Eq for Query {}

/// Quotes a token value so that it's parsed back verbatim
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    if escaped.chars().any(char::is_whitespace) {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

impl fmt::Display for Negation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Negation::Name(v) => write!(f, "!name:{}", quote(v)),
            Negation::Id(v) => write!(f, "!id:{}", quote(v)),
            Negation::State(v) => write!(f, "!state:{}", quote(v)),
            Negation::Type(v) => write!(f, "!type:{}", quote(v)),
            Negation::Zone(v) => write!(f, "!az:{}", quote(v)),
            Negation::Ip(v) => write!(f, "!ip:{}", quote(v)),
            Negation::Dns(v) => write!(f, "!dns:{}", quote(v)),
            Negation::Has(v) => write!(f, "!has:{}", quote(v)),
            Negation::Missing(v) => write!(f, "!missing:{}", quote(v)),
            Negation::Tag { key, value: None } => write!(f, "!tag:{}", quote(key)),
            Negation::Tag { key, value: Some(value) } => write!(f, "!tag:{}", quote(&format!("{key}={value}"))),
            Negation::Term(v) => write!(f, "!{}", quote(v)),
        }
    }
}

impl fmt::Display for Query {
    /// Renders the query back into a line that parses into an equal query
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::new();
        tokens.extend(self.terms.iter().map(|t| quote(t)));
        tokens.extend(self.filters.iter().map(|(k, v)| format!("{}:{}", k.as_str(), quote(v))));
        tokens.extend(self.tags.iter().map(|(k, v)| format!("tag:{}", quote(&format!("{k}={v}")))));
        tokens.extend(self.negations.iter().map(|n| n.to_string()));
        tokens.extend(self.ip_patterns.iter().map(|p| format!("ip:{}", quote(p))));
        tokens.extend(self.dns_patterns.iter().map(|p| format!("dns:{}", quote(p))));
        if let Some(state) = &self.state {
            tokens.push(format!("state:{}", quote(state)));
        }
        if let Some(instance_type) = &self.instance_type {
            tokens.push(format!("type:{}", quote(instance_type)));
        }
        if let Some(zone) = &self.zone {
            tokens.push(format!("az:{}", quote(zone)));
        }
        tokens.extend(self.has_tags.iter().map(|k| format!("has:{}", quote(k))));
        tokens.extend(self.missing_tags.iter().map(|k| format!("missing:{}", quote(k))));
        write!(f, "{}", tokens.join(" "))
    }
}
