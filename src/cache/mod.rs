//! On-disk cache of record lists, with a stale-while-revalidate front served by background workers

use chrono::{DateTime, Utc};

use crate::model::{Query, RecordKind};

crate::using! {
    pub store,
    pub stats,
    pub refresh,
}

/// Source of the current time for the cache, so lookups can be tested against a controlled clock
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Builds the cache key for a listing of the given kind, on a region, narrowed by a query.
///
/// The query is fingerprinted by its canonical digest, so equivalent queries share the same entry.
pub fn cache_key(kind: RecordKind, region: &str, query: &Query) -> String {
    let region = if region.is_empty() { "default" } else { region };
    format!("{kind}_{region}_{}", query.digest())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_query;

    #[test]
    fn test_cache_key() {
        let query = parse_query("web state:running");
        let key = cache_key(RecordKind::Vm, "eu-west-1", &query);
        assert!(key.starts_with("vm_eu-west-1_"));
        assert_eq!(key, cache_key(RecordKind::Vm, "eu-west-1", &parse_query("web  state:running")));
        assert!(key != cache_key(RecordKind::ScalingGroup, "eu-west-1", &query));
        assert!(cache_key(RecordKind::Cluster, "", &query).starts_with("cluster_default_"));
    }
}
