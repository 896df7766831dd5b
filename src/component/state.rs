use std::collections::{HashMap, VecDeque};

use enum_cycling::EnumCycle;

use crate::{
    config::{SortConfig, Weights},
    model::{Query, Record, SortDirection, SortField},
    preview::Details,
    service::Listing,
    utils::{parse_query, rank},
};

/// Transient state of a selection session.
///
/// Everything here is pure: filtering, sorting, marking and the history never suspend nor touch the providers.
#[derive(Clone, Debug)]
pub struct SelectorState {
    /// Every loaded record
    records: Vec<Record>,
    /// Indices into `records` of the records matching the query, in sort order
    filtered: Vec<usize>,
    /// Position of the cursor within `filtered`
    cursor: usize,
    /// Identifiers of the marked records, in the order they were marked
    marked: Vec<String>,
    sort_field: SortField,
    sort_direction: SortDirection,
    weights: Weights,
    query: Query,
    history: QueryHistory,
    region: String,
    /// Whether the loaded records were served past their stale threshold
    stale: bool,
    /// Lazily retrieved details, by record identifier
    details: HashMap<String, Details>,
}

impl SelectorState {
    /// Creates a new state over the given listing, applying the initial query
    pub fn new(
        listing: Listing,
        query: &str,
        sort: SortConfig,
        weights: Weights,
        history_size: usize,
        region: impl Into<String>,
    ) -> Self {
        let mut ret = Self {
            records: listing.records,
            filtered: Vec::new(),
            cursor: 0,
            marked: Vec::new(),
            sort_field: sort.field,
            sort_direction: sort.direction,
            weights,
            query: parse_query(query),
            history: QueryHistory::new(history_size),
            region: region.into(),
            stale: listing.stale,
            details: HashMap::new(),
        };
        ret.refilter(true);
        ret
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn sort(&self) -> (SortField, SortDirection) {
        (self.sort_field, self.sort_direction)
    }

    /// Number of loaded records
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Number of records matching the query
    pub fn len(&self) -> usize {
        self.filtered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    /// Position of the cursor, if there's any record displayed
    pub fn cursor(&self) -> Option<usize> {
        (!self.filtered.is_empty()).then_some(self.cursor)
    }

    /// The records matching the query, in display order
    pub fn visible(&self) -> impl Iterator<Item = &Record> {
        self.filtered.iter().map(|idx| &self.records[*idx])
    }

    /// The record under the cursor
    pub fn current(&self) -> Option<&Record> {
        self.filtered.get(self.cursor).map(|idx| &self.records[*idx])
    }

    /// Whether the record with the given identifier is marked
    pub fn is_marked(&self, id: &str) -> bool {
        self.marked.iter().any(|m| m == id)
    }

    /// Number of marked records
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    /// Updates the query, re-filtering the loaded records.
    ///
    /// The cursor moves to the best scoring record.
    pub fn set_query(&mut self, raw: &str) {
        if raw == self.query.raw {
            return;
        }
        self.query = parse_query(raw);
        self.refilter(true);
    }

    /// Replaces the loaded records with a new listing, keeping the cursor on the same record when possible.
    ///
    /// Marks on records that are no longer loaded are discarded.
    pub fn set_listing(&mut self, listing: Listing) {
        let current = self.current().map(|r| r.identifier().to_owned());
        self.records = listing.records;
        self.stale = listing.stale;
        self.details.clear();
        let records = &self.records;
        self.marked.retain(|id| records.iter().any(|r| r.identifier() == id));
        self.refilter(false);
        if let Some(id) = current {
            self.move_to(&id);
        }
    }

    /// Cycles the sort field
    pub fn cycle_sort_field(&mut self) {
        self.sort_field = self.sort_field.down();
        self.resort();
    }

    /// Toggles the sort direction
    pub fn toggle_sort_direction(&mut self) {
        self.sort_direction = self.sort_direction.toggle();
        self.resort();
    }

    /// Moves the cursor up, wrapping around to the last record
    pub fn move_up(&mut self) {
        if !self.filtered.is_empty() {
            self.cursor = self.cursor.checked_sub(1).unwrap_or(self.filtered.len() - 1);
        }
    }

    /// Moves the cursor down, wrapping around to the first record
    pub fn move_down(&mut self) {
        if !self.filtered.is_empty() {
            self.cursor = (self.cursor + 1) % self.filtered.len();
        }
    }

    /// Moves the cursor a page up, stopping at the first record
    pub fn page_up(&mut self, page: usize) {
        self.cursor = self.cursor.saturating_sub(page.max(1));
    }

    /// Moves the cursor a page down, stopping at the last record
    pub fn page_down(&mut self, page: usize) {
        if !self.filtered.is_empty() {
            self.cursor = (self.cursor + page.max(1)).min(self.filtered.len() - 1);
        }
    }

    pub fn move_first(&mut self) {
        self.cursor = 0;
    }

    pub fn move_last(&mut self) {
        self.cursor = self.filtered.len().saturating_sub(1);
    }

    /// Moves the cursor to the given position, if valid
    pub fn select(&mut self, position: usize) {
        if position < self.filtered.len() {
            self.cursor = position;
        }
    }

    /// Marks or unmarks the record under the cursor, returning whether it's now marked
    pub fn toggle_mark(&mut self) -> Option<bool> {
        let id = self.current()?.identifier().to_owned();
        if let Some(pos) = self.marked.iter().position(|m| *m == id) {
            self.marked.remove(pos);
            Some(false)
        } else {
            self.marked.push(id);
            Some(true)
        }
    }

    /// The records selected by the user.
    ///
    /// When any record is marked, those are returned in the order they were marked. Otherwise the record under the
    /// cursor is the selection, if any.
    pub fn selection(&self) -> Vec<Record> {
        if self.marked.is_empty() {
            return self.current().cloned().into_iter().collect();
        }
        self.marked
            .iter()
            .filter_map(|id| self.records.iter().find(|r| r.identifier() == id))
            .cloned()
            .collect()
    }

    /// Details retrieved for the given record, if any
    pub fn details(&self, id: &str) -> Option<&Details> {
        self.details.get(id)
    }

    /// Stores the details of a record, they're kept until the listing is replaced
    pub fn set_details(&mut self, id: impl Into<String>, details: Details) {
        self.details.insert(id.into(), details);
    }

    /// Identifier of the placeholder cluster under the cursor, which must be described again before previewing it
    pub fn pending_details(&self) -> Option<&str> {
        match self.current()? {
            Record::Cluster(cluster) if cluster.needs_details() && !self.details.contains_key(&cluster.meta.id) => {
                Some(&cluster.meta.id)
            }
            _ => None,
        }
    }

    /// Pushes the current query into the history
    pub fn remember_query(&mut self) {
        self.history.push(&self.query.raw);
    }

    /// Recalls the previous query from the history, if any
    pub fn history_prev(&mut self) -> Option<String> {
        let raw = self.history.prev(&self.query.raw)?.to_owned();
        self.set_query(&raw);
        Some(raw)
    }

    /// Recalls the next query from the history, restoring the draft after the newest one
    pub fn history_next(&mut self) -> Option<String> {
        let raw = self.history.next()?.to_owned();
        self.set_query(&raw);
        Some(raw)
    }

    /// Re-computes the filtered records from scratch
    fn refilter(&mut self, cursor_to_best: bool) {
        let ranked = rank(&self.records, &self.query, &self.weights);
        let best = ranked.first().map(|(idx, _)| *idx);
        self.filtered = ranked.into_iter().map(|(idx, _)| idx).collect();
        self.sort_filtered();
        self.cursor = match best {
            // The empty query scores every record the same, so there's no best one
            Some(best) if cursor_to_best && !self.query.is_empty() => {
                self.filtered.iter().position(|idx| *idx == best).unwrap_or(0)
            }
            _ if cursor_to_best => 0,
            _ => self.cursor.min(self.filtered.len().saturating_sub(1)),
        };
    }

    /// Sorts the filtered records again, keeping the cursor on the same record
    fn resort(&mut self) {
        let current = self.filtered.get(self.cursor).copied();
        self.sort_filtered();
        if let Some(current) = current {
            self.cursor = self.filtered.iter().position(|idx| *idx == current).unwrap_or(0);
        }
    }

    fn sort_filtered(&mut self) {
        let (field, direction, records) = (self.sort_field, self.sort_direction, &self.records);
        self.filtered
            .sort_by(|a, b| direction.apply(field.compare(&records[*a], &records[*b])));
    }

    fn move_to(&mut self, id: &str) {
        let position = self.visible().position(|r| r.identifier() == id);
        if let Some(position) = position {
            self.cursor = position;
        }
    }
}

/// Bounded ring of the queries used on a session, oldest first
#[derive(Clone, Debug)]
pub struct QueryHistory {
    entries: VecDeque<String>,
    capacity: usize,
    /// Position being browsed, `None` when not browsing
    position: Option<usize>,
    /// Query typed before browsing, restored after the newest entry
    draft: String,
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            position: None,
            draft: String::new(),
        }
    }

    /// Pushes a query, skipping blanks and repetitions of the newest entry
    pub fn push(&mut self, query: &str) {
        self.position = None;
        let query = query.trim();
        if query.is_empty() || self.entries.back().is_some_and(|q| q == query) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(query.to_owned());
    }

    /// Moves to the previous (older) entry.
    ///
    /// The given `current` query is saved as the draft when browsing starts.
    pub fn prev(&mut self, current: &str) -> Option<&str> {
        let position = match self.position {
            None => {
                self.draft = current.to_owned();
                self.entries.len().checked_sub(1)?
            }
            Some(p) => p.saturating_sub(1),
        };
        self.position = Some(position);
        self.entries.get(position).map(String::as_str)
    }

    /// Moves to the next (newer) entry, or back to the draft after the newest one
    pub fn next(&mut self) -> Option<&str> {
        let position = self.position?;
        if position + 1 < self.entries.len() {
            self.position = Some(position + 1);
            self.entries.get(position + 1).map(String::as_str)
        } else {
            self.position = None;
            Some(&self.draft)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{ClusterRecord, RecordMeta, Tags, VmRecord, VmState};

    fn vm(id: &str, name: &str, state: VmState, tags: &[(&str, &str)]) -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: id.to_owned(),
                name: name.to_owned(),
                tags: Tags::new(tags.iter().copied()).unwrap(),
                ..Default::default()
            },
            state,
            ..Default::default()
        })
    }

    fn fleet() -> Vec<Record> {
        vec![
            vm("i-3", "web-02", VmState::Stopped, &[("Env", "dev")]),
            vm("i-1", "web-01", VmState::Running, &[("Env", "prod")]),
            vm("i-2", "db-01", VmState::Running, &[]),
            vm("i-4", "server", VmState::Running, &[]),
        ]
    }

    fn state(query: &str) -> SelectorState {
        let listing = Listing {
            records: fleet(),
            ..Default::default()
        };
        SelectorState::new(listing, query, SortConfig::default(), Weights::default(), 3, "eu-west-1")
    }

    fn names(state: &SelectorState) -> Vec<&str> {
        state.visible().map(|r| r.display_name()).collect()
    }

    #[test]
    fn test_filter_is_a_subsequence_of_the_sort_order() {
        let mut state = state("");
        assert_eq!(names(&state), vec!["db-01", "server", "web-01", "web-02"]);

        for query in ["web", "!Env=dev", "state:running", "zzz", "web server"] {
            state.set_query(query);
            let all = {
                let mut s = state.clone();
                s.set_query("");
                names(&s).into_iter().map(String::from).collect::<Vec<_>>()
            };
            let mut it = all.iter();
            for name in names(&state) {
                assert!(it.any(|n| n == name), "{query}: {name} out of order");
            }
        }
    }

    #[test]
    fn test_negated_tag_filter() {
        let state = state("!Env=dev");
        assert_eq!(names(&state), vec!["db-01", "server", "web-01"]);
    }

    #[test]
    fn test_cursor_moves_to_best_score() {
        let mut state = state("");
        assert_eq!(state.cursor(), Some(0));

        state.set_query("name:web state:running tag:Env=prod");
        assert_eq!(names(&state), vec!["web-01"]);
        assert_eq!(state.current().map(|r| r.identifier()), Some("i-1"));

        state.set_query("zzz");
        assert!(state.is_empty());
        assert_eq!(state.cursor(), None);
        assert_eq!(state.current(), None);
        assert_eq!(state.selection(), Vec::<Record>::new());
    }

    #[test]
    fn test_sort_keeps_the_cursor_on_the_record() {
        let mut state = state("");
        state.move_down();
        assert_eq!(state.current().map(|r| r.display_name()), Some("server"));

        state.toggle_sort_direction();
        assert_eq!(names(&state), vec!["web-02", "web-01", "server", "db-01"]);
        assert_eq!(state.current().map(|r| r.display_name()), Some("server"));

        state.cycle_sort_field();
        assert_eq!(state.sort(), (SortField::Zone, SortDirection::Desc));
        assert_eq!(state.current().map(|r| r.display_name()), Some("server"));
    }

    #[test]
    fn test_navigation_wraps_and_pages_stop() {
        let mut state = state("");
        state.move_up();
        assert_eq!(state.cursor(), Some(3));
        state.move_down();
        assert_eq!(state.cursor(), Some(0));
        state.page_down(10);
        assert_eq!(state.cursor(), Some(3));
        state.page_up(2);
        assert_eq!(state.cursor(), Some(1));
        state.move_first();
        assert_eq!(state.cursor(), Some(0));
        state.move_last();
        assert_eq!(state.cursor(), Some(3));
    }

    #[test]
    fn test_selection_follows_mark_order() {
        let mut state = state("");
        assert_eq!(state.selection().len(), 1);

        state.move_last();
        assert_eq!(state.toggle_mark(), Some(true));
        state.move_first();
        assert_eq!(state.toggle_mark(), Some(true));
        state.move_down();
        assert_eq!(state.toggle_mark(), Some(true));
        assert_eq!(state.toggle_mark(), Some(false));

        let ids = state.selection().iter().map(|r| r.identifier().to_owned()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["i-3", "i-2"]);
        assert!(state.is_marked("i-3"));
        assert_eq!(state.marked_count(), 2);
    }

    #[test]
    fn test_set_listing_keeps_cursor_and_live_marks() {
        let mut state = state("");
        state.toggle_mark();
        state.move_last();
        assert_eq!(state.current().map(|r| r.identifier()), Some("i-3"));

        let mut records = fleet();
        records.retain(|r| r.identifier() != "i-2");
        state.set_listing(Listing {
            records,
            stale: true,
            truncated: false,
        });

        assert!(state.is_stale());
        assert_eq!(state.total(), 3);
        assert_eq!(state.marked_count(), 0);
        assert_eq!(state.current().map(|r| r.identifier()), Some("i-3"));
    }

    #[test]
    fn test_cluster_details_are_pending_until_set() {
        let cluster = Record::Cluster(ClusterRecord {
            meta: RecordMeta {
                id: String::from("prod"),
                name: String::from("prod"),
                ..Default::default()
            },
            ..Default::default()
        });
        let listing = Listing {
            records: vec![cluster],
            ..Default::default()
        };
        let mut state = SelectorState::new(listing, "", SortConfig::default(), Weights::default(), 3, "");

        assert_eq!(state.pending_details(), Some("prod"));
        state.set_details("prod", Details::Loading);
        assert_eq!(state.pending_details(), None);
        assert_eq!(state.details("prod"), Some(&Details::Loading));
    }

    #[test]
    fn test_history_ring() {
        let mut state = state("");
        for query in ["web", "web", "db", "  ", "server", "state:running"] {
            state.set_query(query);
            state.remember_query();
        }
        assert_eq!(state.history.len(), 3);

        state.set_query("draft");
        assert_eq!(state.history_prev().as_deref(), Some("state:running"));
        assert_eq!(state.history_prev().as_deref(), Some("server"));
        assert_eq!(state.history_prev().as_deref(), Some("db"));
        assert_eq!(state.history_prev().as_deref(), Some("db"));
        assert_eq!(state.query().raw, "db");
        assert_eq!(state.history_next().as_deref(), Some("server"));
        assert_eq!(state.history_next().as_deref(), Some("state:running"));
        assert_eq!(state.history_next().as_deref(), Some("draft"));
        assert_eq!(state.history_next(), None);
    }
}
