use crate::{
    component::SelectorState,
    config::Theme,
    utils::{StyledLine, raw, span},
};

/// Formats the status line of the selector: region, matching and loaded counts, sort, marks and freshness
pub fn status_line(state: &SelectorState, loading: bool, theme: &Theme) -> StyledLine {
    let (field, direction) = state.sort();
    let mut line = vec![
        span(format!(" {} ", state.region()), theme.accent),
        raw(" "),
        span(format!("{}/{}", state.len(), state.total()), theme.primary),
        raw("  "),
        span(format!("sort: {field} {}", direction.arrow()), theme.secondary),
    ];
    if state.marked_count() > 0 {
        line.push(raw("  "));
        line.push(span(format!("{} marked", state.marked_count()), theme.highlight_accent));
    }
    line.push(raw("  "));
    if loading {
        line.push(span("loading", theme.comment));
    } else if state.is_stale() {
        line.push(span("stale", theme.warn));
    } else {
        line.push(span("fresh", theme.ok));
    }
    line
}
