use std::cmp::Ordering;

use regex::Regex;

use crate::{
    config::Weights,
    model::{FilterKey, Negation, Query, Record},
};

/// A [`Query`] compiled for repeated evaluation against many records
pub struct QueryMatcher<'q> {
    query: &'q Query,
    /// Lowercased positive terms
    terms: Vec<String>,
    ip_patterns: Vec<Wildcard>,
    dns_patterns: Vec<Wildcard>,
    instance_type: Option<Wildcard>,
}

impl<'q> QueryMatcher<'q> {
    /// Compiles the given query
    pub fn new(query: &'q Query) -> Self {
        Self {
            query,
            terms: query.terms.iter().map(|t| t.to_lowercase()).collect(),
            ip_patterns: query.ip_patterns.iter().map(|p| Wildcard::new(p)).collect(),
            dns_patterns: query.dns_patterns.iter().map(|p| Wildcard::new(p)).collect(),
            instance_type: query.instance_type.as_deref().map(Wildcard::new),
        }
    }

    /// Whether the record passes every clause of the query
    pub fn matches(&self, record: &Record) -> bool {
        let query = self.query;

        // 1. No negative filter matches
        if query.negations.iter().any(|n| negation_matches(n, record)) {
            return false;
        }

        // 2. Structured filters
        for (key, value) in &query.filters {
            let field = match key {
                FilterKey::Name => record.name(),
                FilterKey::Id => record.identifier(),
            };
            if !contains_ignore_case(field, value) {
                return false;
            }
        }

        // 3. Tag equality
        if !query.tags.iter().all(|(k, v)| record.tags().get(k) == Some(v.as_str())) {
            return false;
        }

        // 4. Ip and dns patterns
        let ips = [record.private_ip(), record.public_ip()];
        if !self.ip_patterns.iter().all(|p| p.matches_any(&ips)) {
            return false;
        }
        let dns = [record.private_dns(), record.public_dns()];
        if !self.dns_patterns.iter().all(|p| p.matches_any(&dns)) {
            return false;
        }

        // 5. Scalars
        if let Some(state) = &query.state
            && !record.status().eq_ignore_ascii_case(state)
        {
            return false;
        }
        if let Some(instance_type) = &self.instance_type
            && !instance_type.matches_any(&record.instance_types())
        {
            return false;
        }
        if let Some(zone) = &query.zone
            && !record.zones().iter().any(|z| z.eq_ignore_ascii_case(zone))
        {
            return false;
        }

        // 6. Tag presence
        if !query.has_tags.iter().all(|k| record.tags().contains_key(k))
            || query.missing_tags.iter().any(|k| record.tags().contains_key(k))
        {
            return false;
        }

        // 7. Fuzzy terms
        self.terms.iter().all(|t| term_matches(record, t))
    }

    /// Relevance of the record for the query, the empty query scores every record with zero.
    ///
    /// The score saturates at [`u32::MAX`] instead of overflowing on large weights.
    pub fn score(&self, record: &Record, weights: &Weights) -> u32 {
        let mut score: u32 = 0;

        for term in &self.terms {
            if contains_lowercase(record.name(), term) {
                score = score.saturating_add(weights.name);
            }
            if contains_lowercase(record.identifier(), term) {
                score = score.saturating_add(weights.id);
            }
            if record.tags().values().any(|v| contains_lowercase(v, term)) {
                score = score.saturating_add(weights.tags);
            }
            if contains_lowercase(record.private_ip(), term) || contains_lowercase(record.public_ip(), term) {
                score = score.saturating_add(weights.ip);
            }
            if contains_lowercase(record.private_dns(), term) || contains_lowercase(record.public_dns(), term) {
                score = score.saturating_add(weights.dns);
            }
        }

        for (key, value) in &self.query.filters {
            match key {
                FilterKey::Name if record.name().eq_ignore_ascii_case(value) => {
                    score = score.saturating_add(weights.name.saturating_mul(2));
                }
                FilterKey::Id if record.identifier().eq_ignore_ascii_case(value) => {
                    score = score.saturating_add(weights.id.saturating_mul(2));
                }
                _ => (),
            }
        }

        for (key, value) in &self.query.tags {
            if record.tags().get(key) == Some(value.as_str()) {
                score = score.saturating_add(weights.tags.saturating_mul(2));
            }
        }

        score
    }
}

/// Whether the record passes every clause of the query
pub fn matches(record: &Record, query: &Query) -> bool {
    QueryMatcher::new(query).matches(record)
}

/// Relevance of a matching record for the query
pub fn score(record: &Record, query: &Query, weights: &Weights) -> u32 {
    QueryMatcher::new(query).score(record, weights)
}

/// Filters the records matching the query and ranks them by relevance.
///
/// Returns the indices of the matching records with their score, best first. Ties at equal score are broken by
/// display name and then by identifier, both ascending.
pub fn rank(records: &[Record], query: &Query, weights: &Weights) -> Vec<(usize, u32)> {
    let matcher = QueryMatcher::new(query);
    let mut ranked = records
        .iter()
        .enumerate()
        .filter(|(_, r)| matcher.matches(r))
        .map(|(idx, r)| (idx, matcher.score(r, weights)))
        .collect::<Vec<_>>();
    ranked.sort_by(|(ia, sa), (ib, sb)| {
        sb.cmp(sa)
            .then_with(|| compare_names(&records[*ia], &records[*ib]))
    });
    ranked
}

/// Compares two records by display name and then by identifier
pub fn compare_names(a: &Record, b: &Record) -> Ordering {
    a.display_name()
        .cmp(b.display_name())
        .then_with(|| a.identifier().cmp(b.identifier()))
}

fn negation_matches(negation: &Negation, record: &Record) -> bool {
    match negation {
        Negation::Name(v) => contains_ignore_case(record.name(), v),
        Negation::Id(v) => contains_ignore_case(record.identifier(), v),
        Negation::State(v) => record.status().eq_ignore_ascii_case(v),
        Negation::Type(p) => Wildcard::new(p).matches_any(&record.instance_types()),
        Negation::Zone(v) => record.zones().iter().any(|z| z.eq_ignore_ascii_case(v)),
        Negation::Ip(p) => Wildcard::new(p).matches_any(&[record.private_ip(), record.public_ip()]),
        Negation::Dns(p) => Wildcard::new(p).matches_any(&[record.private_dns(), record.public_dns()]),
        Negation::Has(k) => record.tags().contains_key(k),
        Negation::Missing(k) => !record.tags().contains_key(k),
        Negation::Tag { key, value: None } => record.tags().contains_key(key),
        Negation::Tag { key, value: Some(v) } => record.tags().get(key).is_some_and(|t| contains_ignore_case(t, v)),
        Negation::Term(t) => term_matches(record, &t.to_lowercase()),
    }
}

/// Whether the lowercased term appears on the name, identifier, any ip or any tag value
fn term_matches(record: &Record, term: &str) -> bool {
    contains_lowercase(record.name(), term)
        || contains_lowercase(record.identifier(), term)
        || contains_lowercase(record.private_ip(), term)
        || contains_lowercase(record.public_ip(), term)
        || record.tags().values().any(|v| contains_lowercase(v, term))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    contains_lowercase(haystack, &needle.to_lowercase())
}

fn contains_lowercase(haystack: &str, lowercase_needle: &str) -> bool {
    !haystack.is_empty() && haystack.to_lowercase().contains(lowercase_needle)
}

/// A pattern where `*` matches any sequence and `?` any single character
pub struct Wildcard {
    raw: String,
    regex: Option<Regex>,
}

impl Wildcard {
    /// Compiles the pattern into an anchored, case-insensitive regex
    pub fn new(pattern: &str) -> Self {
        let mut expr = String::from("(?i)^");
        let mut literal = String::new();
        for c in pattern.chars() {
            match c {
                '*' | '?' => {
                    expr.push_str(&regex::escape(&std::mem::take(&mut literal)));
                    expr.push_str(if c == '*' { ".*" } else { "." });
                }
                c => literal.push(c),
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');
        Self {
            raw: pattern.to_owned(),
            // Falls back to plain equality when the regex can't be built
            regex: Regex::new(&expr).ok(),
        }
    }

    /// Whether the value matches the pattern
    pub fn matches(&self, value: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(value),
            None => value.eq_ignore_ascii_case(&self.raw),
        }
    }

    /// Whether any non-empty value matches the pattern
    pub fn matches_any(&self, values: &[&str]) -> bool {
        values.iter().filter(|v| !v.is_empty()).any(|v| self.matches(v))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        model::{RecordMeta, ScalingGroupRecord, Tags, VmRecord, VmState},
        utils::parse_query,
    };

    fn vm(id: &str, name: &str, state: VmState, tags: &[(&str, &str)]) -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: id.to_owned(),
                name: name.to_owned(),
                created_at: None,
                tags: Tags::new(tags.iter().copied()).unwrap(),
            },
            state,
            instance_type: String::from("t3.micro"),
            availability_zone: String::from("eu-west-1a"),
            private_ip: format!("10.0.0.{}", id.len()),
            private_dns: String::from("ip-10-0-0-1.eu-west-1.compute.internal"),
            ..Default::default()
        })
    }

    fn filter<'a>(records: &'a [Record], raw: &str) -> Vec<&'a str> {
        let query = parse_query(raw);
        let matcher = QueryMatcher::new(&query);
        records
            .iter()
            .filter(|r| matcher.matches(r))
            .map(|r| r.display_name())
            .collect()
    }

    #[test]
    fn test_structured_query_selects_single_record() {
        let records = vec![
            vm("i-1", "web-01", VmState::Running, &[("Env", "prod")]),
            vm("i-2", "web-02", VmState::Stopped, &[("Env", "prod")]),
            vm("i-3", "web-03", VmState::Running, &[("Env", "dev")]),
            vm("i-4", "db-01", VmState::Running, &[("Env", "prod")]),
        ];
        let query = parse_query("name:web state:running tag:Env=prod");
        assert_eq!(filter(&records, &query.raw), vec!["web-01"]);
        assert!(score(&records[0], &query, &Weights::default()) > 0);
    }

    #[test]
    fn test_negated_tag_shorthand() {
        let records = vec![
            vm("i-1", "dev-record", VmState::Running, &[("Env", "dev")]),
            vm("i-2", "prod-record", VmState::Running, &[("Env", "prod")]),
            vm("i-3", "untagged-record", VmState::Running, &[]),
        ];
        assert_eq!(filter(&records, "!Env=dev"), vec!["prod-record", "untagged-record"]);
    }

    #[test]
    fn test_terms_must_all_match() {
        let records = vec![
            vm("i-1", "web-server", VmState::Running, &[]),
            vm("i-2", "server", VmState::Running, &[]),
        ];
        assert_eq!(filter(&records, "web server"), vec!["web-server"]);
        assert_eq!(filter(&records, "SERVER"), vec!["web-server", "server"]);
    }

    #[test]
    fn test_empty_query_matches_everything_with_zero_score() {
        let records = vec![
            vm("i-1", "a", VmState::Running, &[]),
            Record::placeholder(crate::model::RecordKind::Cluster, "prod"),
        ];
        let query = parse_query("");
        for record in &records {
            assert!(matches(record, &query));
            assert_eq!(score(record, &query, &Weights::default()), 0);
        }
    }

    #[test]
    fn test_wildcards() {
        let records = vec![
            vm("i-1", "a", VmState::Running, &[]),
            vm("i-22", "b", VmState::Running, &[]),
        ];
        assert_eq!(filter(&records, "ip:10.0.0.?"), vec!["a", "b"]);
        assert_eq!(filter(&records, "ip:10.0.0.4"), vec!["b"]);
        assert_eq!(filter(&records, "type:T3.*"), vec!["a", "b"]);
        assert_eq!(filter(&records, "type:m5.*"), Vec::<&str>::new());
        assert_eq!(filter(&records, "dns:*.internal az:EU-WEST-1A"), vec!["a", "b"]);
        assert_eq!(filter(&records, "!ip:10.0.0.3"), vec!["b"]);

        let wildcard = Wildcard::new("a.b*");
        assert!(wildcard.matches("a.bcd"));
        assert!(!wildcard.matches("axbcd"));
    }

    #[test]
    fn test_tag_presence() {
        let records = vec![
            vm("i-1", "owned", VmState::Running, &[("Owner", "me")]),
            vm("i-2", "orphan", VmState::Running, &[]),
        ];
        assert_eq!(filter(&records, "has:Owner"), vec!["owned"]);
        assert_eq!(filter(&records, "missing:Owner"), vec!["orphan"]);
        assert_eq!(filter(&records, "!has:Owner"), vec!["orphan"]);
        assert_eq!(filter(&records, "tag:Owner=ME"), Vec::<&str>::new());
    }

    #[test]
    fn test_scalar_filters_on_groups() {
        let group = Record::ScalingGroup(ScalingGroupRecord {
            meta: RecordMeta {
                id: String::from("asg-web"),
                ..Default::default()
            },
            availability_zones: vec![String::from("eu-west-1a"), String::from("eu-west-1b")],
            ..Default::default()
        });
        assert!(matches(&group, &parse_query("az:eu-west-1b")));
        assert!(!matches(&group, &parse_query("type:t3.*")));
        assert!(!matches(&group, &parse_query("state:active")));
    }

    #[test]
    fn test_score_weights() {
        let weights = Weights::default();
        let record = vm("i-web", "web-01", VmState::Running, &[("Role", "web")]);
        // name + id + tag
        assert_eq!(score(&record, &parse_query("web"), &weights), 5 + 4 + 3);
        // exact name filter doubles the name weight
        assert_eq!(score(&record, &parse_query("name:WEB-01"), &weights), 10);
        assert_eq!(score(&record, &parse_query("id:i-web tag:Role=web"), &weights), 8 + 6);
        // ip and dns hits
        assert_eq!(score(&record, &parse_query("10.0.0"), &weights), 2);
        assert_eq!(score(&record, &parse_query("missing"), &weights), 0);
        assert_eq!(score(&record, &parse_query("compute"), &weights), 1);
    }

    #[test]
    fn test_score_saturates_on_huge_weights() {
        let weights = Weights {
            name: u32::MAX,
            ..Default::default()
        };
        let record = vm("i-web", "web", VmState::Running, &[("Role", "web")]);
        assert_eq!(score(&record, &parse_query("web"), &weights), u32::MAX);
        assert_eq!(score(&record, &parse_query("web name:web"), &weights), u32::MAX);
        assert_eq!(score(&record, &parse_query("i-web"), &weights), 4);
    }

    #[test]
    fn test_rank_orders_by_score_then_name() {
        let records = vec![
            vm("i-3", "b-web", VmState::Running, &[]),
            vm("i-2", "a-web", VmState::Running, &[]),
            vm("i-1", "web", VmState::Running, &[("Role", "web")]),
            vm("i-0", "db", VmState::Running, &[]),
        ];
        let ranked = rank(&records, &parse_query("web"), &Weights::default());
        let names = ranked.iter().map(|(i, _)| records[*i].display_name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["web", "a-web", "b-web"]);
        assert_eq!(ranked[0].1, 8);
    }
}
