use chrono::TimeDelta;
use crossterm::style::{ContentStyle, StyledContent};
use itertools::Itertools;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::{
    config::{Column, Theme},
    model::Record,
};

/// A single line of styled spans, rendered either by the TUI or as ANSI text
pub type StyledLine = Vec<StyledContent<String>>;

/// Suffix appended to truncated values
const ELLIPSIS: &str = "...";

/// Maximum width of the horizontal rule below preview headers
const MAX_RULE_WIDTH: usize = 60;

/// Builds a single styled span
pub fn span(content: impl Into<String>, style: ContentStyle) -> StyledContent<String> {
    StyledContent::new(style, content.into())
}

/// Builds an unstyled span
pub fn raw(content: impl Into<String>) -> StyledContent<String> {
    StyledContent::new(ContentStyle::new(), content.into())
}

/// Renders the line as text with ANSI escape sequences
pub fn to_ansi(line: &[StyledContent<String>]) -> String {
    line.iter().map(|s| s.to_string()).collect()
}

/// Renders the line as plain text
pub fn to_plain(line: &[StyledContent<String>]) -> String {
    line.iter().map(|s| s.content().as_str()).collect()
}

/// Truncates the text to the given width (in terminal cells), ending it with an ellipsis when it overflows.
///
/// # Examples
///
/// ```rust
/// # use fleet_select::utils::truncate;
/// assert_eq!(truncate("web-server-01", 20), "web-server-01");
/// assert_eq!(truncate("web-server-01", 8), "web-s...");
/// assert_eq!(truncate("web-server-01", 2), "we");
/// ```
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_owned();
    }
    let (budget, suffix) = if width > ELLIPSIS.len() {
        (width - ELLIPSIS.len(), ELLIPSIS)
    } else {
        (width, "")
    };
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str(suffix);
    out
}

/// Truncates and pads the text with trailing spaces to exactly the given width
pub fn pad(text: &str, width: usize) -> String {
    let mut out = truncate(text, width);
    let w = out.width();
    out.extend(std::iter::repeat_n(' ', width.saturating_sub(w)));
    out
}

/// Formats an elapsed time as `NdNhNm`, dropping zero components.
///
/// # Examples
///
/// ```rust
/// # use chrono::TimeDelta;
/// # use fleet_select::utils::format_age;
/// assert_eq!(format_age(TimeDelta::minutes(3 * 24 * 60 + 5)), "3d5m");
/// assert_eq!(format_age(TimeDelta::minutes(125)), "2h5m");
/// assert_eq!(format_age(TimeDelta::seconds(59)), "less than 1 minute");
/// ```
pub fn format_age(age: TimeDelta) -> String {
    let minutes = age.num_minutes();
    if minutes < 1 {
        return String::from("less than 1 minute");
    }
    let (days, hours, minutes) = (minutes / (24 * 60), (minutes / 60) % 24, minutes % 60);
    [(days, "d"), (hours, "h"), (minutes, "m")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .join("")
}

/// A horizontal rule of `min(width, 60)` cells
pub fn rule(width: usize) -> String {
    "─".repeat(width.min(MAX_RULE_WIDTH))
}

/// Style of a status token
pub fn status_style(status: &str, theme: &Theme) -> ContentStyle {
    match status.to_ascii_lowercase().as_str() {
        "running" | "active" | "ok" | "available" | "default" => theme.ok,
        "pending" | "updating" | "creating" | "stopping" | "shutting-down" | "warning" | "degraded" => theme.warn,
        "stopped" | "terminated" | "failed" | "deleting" | "error" => theme.bad,
        s if s.ends_with("-failed") => theme.bad,
        _ => ContentStyle::new(),
    }
}

/// Splits the text into spans, styling every case-insensitive occurrence of any term with the `matched` style
pub fn highlight_matches(text: &str, terms: &[String], base: ContentStyle, matched: ContentStyle) -> StyledLine {
    let chars = text.chars().collect::<Vec<_>>();
    let lower = chars.iter().map(|c| fold_char(*c)).collect::<Vec<_>>();
    let mut mask = vec![false; chars.len()];
    for term in terms {
        let needle = term.chars().map(fold_char).collect::<Vec<_>>();
        if needle.is_empty() || needle.len() > lower.len() {
            continue;
        }
        for start in 0..=(lower.len() - needle.len()) {
            if lower[start..start + needle.len()] == needle[..] {
                mask[start..start + needle.len()].iter_mut().for_each(|m| *m = true);
            }
        }
    }

    let mut line = StyledLine::new();
    for (is_match, group) in &chars.iter().zip(mask).chunk_by(|(_, m)| *m) {
        let content = group.map(|(c, _)| *c).collect::<String>();
        line.push(span(content, if is_match { matched } else { base }));
    }
    line
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Value displayed on the given column for a record
pub fn column_value(record: &Record, column: Column) -> String {
    match column {
        Column::Name => record.display_name().to_owned(),
        Column::Id => record.identifier().to_owned(),
        Column::PrivateIp => record.private_ip().to_owned(),
        Column::State => record.status().to_owned(),
        Column::Type => record.instance_types().join(","),
        Column::Az => record.zones().join(","),
    }
}

/// Formats the column-aligned header of the record list
pub fn format_header(columns: &[Column], theme: &Theme) -> StyledLine {
    let text = columns.iter().map(|c| pad(c.header(), c.width())).join(" ");
    vec![span(text.trim_end(), theme.header)]
}

/// Formats a record as a column-aligned row.
///
/// Overflowing values are truncated with an ellipsis; the name and identifier columns highlight the spans matching any
/// of the given terms.
pub fn format_row(
    record: &Record,
    columns: &[Column],
    terms: &[String],
    theme: &Theme,
    highlighted: bool,
) -> StyledLine {
    let styled = |style: ContentStyle| if highlighted { theme.with_highlight(style) } else { style };
    let (primary, secondary) = if highlighted {
        (theme.highlight_primary, theme.highlight_secondary)
    } else {
        (theme.primary, theme.secondary)
    };

    let mut line = StyledLine::new();
    for (idx, column) in columns.iter().enumerate() {
        if idx > 0 {
            line.push(span(" ", styled(ContentStyle::new())));
        }
        let width = column.width();
        let value = truncate(&column_value(record, *column), width);
        let padding = " ".repeat(width.saturating_sub(value.width()));
        match column {
            Column::Name | Column::Id => {
                let base = if *column == Column::Name { primary } else { secondary };
                let spans = highlight_matches(&value, terms, styled(base), styled(theme.matched));
                line.extend(spans);
            }
            Column::State => line.push(span(value, styled(status_style(record.status(), theme)))),
            _ => line.push(span(value, styled(secondary))),
        }
        if idx + 1 < columns.len() && !padding.is_empty() {
            line.push(span(padding, styled(ContentStyle::new())));
        }
    }
    line
}

/// Formats a status token with its color
pub fn status_span(status: &str, theme: &Theme) -> StyledContent<String> {
    span(status, status_style(status, theme))
}

#[cfg(test)]
mod tests {
    use crossterm::style::Color;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{RecordKind, RecordMeta, VmRecord, VmState};

    #[test]
    fn test_truncate_wide_chars() {
        assert_eq!(truncate("日本語テキスト", 9), "日本語...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("abcd", 3), "abc");
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("abcdefgh", 6), "abc...");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(TimeDelta::days(2)), "2d");
        assert_eq!(format_age(TimeDelta::minutes(61)), "1h1m");
        assert_eq!(format_age(TimeDelta::zero()), "less than 1 minute");
        assert_eq!(format_age(TimeDelta::seconds(-30)), "less than 1 minute");
    }

    #[test]
    fn test_rule_width() {
        assert_eq!(rule(10).chars().count(), 10);
        assert_eq!(rule(200).chars().count(), 60);
    }

    #[test]
    fn test_status_styles() {
        let theme = Theme::default();
        assert_eq!(status_style("Running", &theme).foreground_color, Some(Color::Green));
        assert_eq!(status_style("updating", &theme).foreground_color, Some(Color::Yellow));
        assert_eq!(status_style("create-failed", &theme).foreground_color, Some(Color::Red));
        assert_eq!(status_style("unknown", &theme), ContentStyle::new());
        assert_eq!(status_style("running", &Theme::plain()), ContentStyle::new());
    }

    #[test]
    fn test_highlight_matches() {
        let base = ContentStyle::new();
        let mut matched = ContentStyle::new();
        matched.foreground_color = Some(Color::Cyan);

        let line = highlight_matches("Web-Server-web", &[String::from("WEB")], base, matched);
        let parts = line
            .iter()
            .map(|s| (s.content().as_str(), s.style().foreground_color.is_some()))
            .collect::<Vec<_>>();
        assert_eq!(parts, vec![("Web", true), ("-Server-", false), ("web", true)]);

        let line = highlight_matches("server", &[], base, matched);
        assert_eq!(line.len(), 1);
        assert_eq!(to_plain(&line), "server");
    }

    #[test]
    fn test_format_row_alignment() {
        let record = Record::Vm(VmRecord {
            meta: RecordMeta {
                id: String::from("i-0123456789abcdef0"),
                name: String::from("a-very-long-instance-name-that-overflows"),
                ..Default::default()
            },
            state: VmState::Running,
            private_ip: String::from("10.0.0.1"),
            ..Default::default()
        });
        let columns = [Column::Name, Column::Id, Column::PrivateIp, Column::State];
        let theme = Theme::plain();
        let row = to_plain(&format_row(&record, &columns, &[], &theme, false));
        assert_eq!(
            row,
            format!(
                "{} {} {} {}",
                "a-very-long-instance-name-t...", "i-0123456789abcdef0", "10.0.0.1       ", "running"
            )
        );
        let header = to_plain(&format_header(&columns, &theme));
        assert!(header.starts_with("NAME "));
        assert_eq!(header.find("ID"), Some(31));

        let placeholder = Record::placeholder(RecordKind::Cluster, "prod");
        assert_eq!(column_value(&placeholder, Column::Name), "(no name)");
    }

    #[test]
    fn test_ansi_output() {
        let theme = Theme::default();
        let ansi = to_ansi(&[status_span("running", &theme)]);
        assert!(ansi.contains("running"));
        assert!(ansi.starts_with('\u{1b}'));
        assert_eq!(to_ansi(&[raw("plain")]), "plain");
    }
}
