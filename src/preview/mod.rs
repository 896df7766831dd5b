//! Detail views of the records, one renderer per record variant

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use crossterm::style::StyledContent;
use enum_cycling::EnumCycle;

use crate::{
    config::{KeyBindingAction, KeyBindingsConfig, Theme},
    model::{Record, Tags},
    utils::{StyledLine, format_age, pad, raw, rule, span, status_span, to_ansi},
};

mod cluster;
mod group;
mod help;
mod node_group;
mod template;
mod vm;

pub use help::help_card;

/// Width of the field labels, including the colon
const LABEL_WIDTH: usize = 19;

/// What the preview pane displays
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumCycle, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PreviewMode {
    #[default]
    Details,
    Json,
    Help,
}

/// Full details of a record that is listed with partial information, retrieved lazily
#[derive(Clone, Debug, PartialEq)]
pub enum Details {
    Loading,
    Loaded(Record),
    Failed(String),
}

/// Inputs shared by every renderer
#[derive(Clone, Copy)]
pub struct PreviewContext<'a> {
    pub theme: &'a Theme,
    /// Width of the preview pane, in cells
    pub width: usize,
    /// Reference time for ages and uptimes
    pub now: DateTime<Utc>,
    /// Lazily retrieved details of the record, if any
    pub details: Option<&'a Details>,
}

impl<'a> PreviewContext<'a> {
    pub fn new(theme: &'a Theme, width: usize) -> Self {
        Self {
            theme,
            width,
            now: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<&'a Details>) -> Self {
        self.details = details;
        self
    }
}

/// Renders the detail view of a record
pub fn render_preview(record: &Record, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    match record {
        Record::Vm(r) => vm::render(record, r, ctx),
        Record::ScalingGroup(r) => group::render(record, r, ctx),
        Record::Cluster(r) => cluster::render(record, r, ctx),
        Record::NodeGroup(r) => node_group::render(record, r, ctx),
        Record::TemplateVersion(r) => template::render(r, ctx),
    }
}

/// Renders the record as pretty-printed json
pub fn render_json(record: &Record, theme: &Theme) -> Vec<StyledLine> {
    match serde_json::to_string_pretty(record) {
        Ok(json) => json.lines().map(|l| vec![raw(l)]).collect(),
        Err(err) => vec![vec![span(format!("Error rendering json: {err}"), theme.error)]],
    }
}

/// Renders the pane content for the given mode
pub fn render_mode(
    mode: PreviewMode,
    record: Option<&Record>,
    ctx: &PreviewContext<'_>,
    keybindings: &KeyBindingsConfig,
) -> Vec<StyledLine> {
    match (mode, record) {
        (PreviewMode::Details, Some(record)) => render_preview(record, ctx),
        (PreviewMode::Json, Some(record)) => render_json(record, ctx.theme),
        (PreviewMode::Help, _) | (_, None) => help_card(ctx.theme, keybindings, record.is_none()),
    }
}

/// Renders the lines as text with ANSI escape sequences, one per line
pub fn to_ansi_text(lines: &[StyledLine]) -> String {
    lines.iter().map(|l| to_ansi(l)).collect::<Vec<_>>().join("\n")
}

/// Label of a key binding, for help texts
pub(crate) fn binding_label(keybindings: &KeyBindingsConfig, action: KeyBindingAction) -> String {
    keybindings.get(&action).map(|b| b.label()).unwrap_or_default()
}

/// Accumulates the lines of a detail view
struct PreviewBuilder<'a> {
    ctx: &'a PreviewContext<'a>,
    lines: Vec<StyledLine>,
}

impl<'a> PreviewBuilder<'a> {
    /// Starts a view with its title and a rule below
    fn new(title: &str, ctx: &'a PreviewContext<'a>) -> Self {
        let lines = vec![
            vec![span(title, ctx.theme.header)],
            vec![span(rule(ctx.width), ctx.theme.secondary)],
        ];
        Self { ctx, lines }
    }

    fn theme(&self) -> &'a Theme {
        self.ctx.theme
    }

    /// Opens a new section, separated from the previous one by a blank line
    fn section(&mut self, title: &str) -> &mut Self {
        self.lines.push(Vec::new());
        self.lines.push(vec![span(format!("{title}:"), self.ctx.theme.header)]);
        self
    }

    /// Adds a `Label: value` line
    fn field(&mut self, label: &str, value: impl Into<String>) -> &mut Self {
        let value = raw(value);
        self.styled_field(label, value)
    }

    /// Adds a `Label: value` line only if the value is not empty
    fn field_opt(&mut self, label: &str, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.field(label, value);
        }
        self
    }

    fn styled_field(&mut self, label: &str, value: StyledContent<String>) -> &mut Self {
        self.lines.push(vec![
            raw("  "),
            span(pad(&format!("{label}:"), LABEL_WIDTH), self.ctx.theme.accent),
            value,
        ]);
        self
    }

    /// Adds the primary attributes of the record, coloring its status and aging its creation time
    fn primary(&mut self, record: &Record) -> &mut Self {
        for (label, value) in record.primary_fields() {
            match label {
                "State" | "Status" => {
                    let status = status_span(&value, self.ctx.theme);
                    self.styled_field(label, status)
                }
                "Created" => self.created(label, record.created_at()),
                _ => self.field_opt(label, &value),
            };
        }
        self
    }

    /// Adds a creation time along with its age
    fn created(&mut self, label: &str, at: Option<DateTime<Utc>>) -> &mut Self {
        if let Some(at) = at {
            let age = format_age(self.ctx.now - at);
            self.field(label, format!("{} ({age} ago)", at.format("%Y-%m-%d %H:%M:%S")));
        }
        self
    }

    /// Adds an indented bullet item
    fn bullet(&mut self, indent: usize, item: impl Into<String>) -> &mut Self {
        self.lines.push(vec![raw(format!("{}• {}", " ".repeat(indent), item.into()))]);
        self
    }

    /// Adds an indented free-form line
    fn line(&mut self, mut line: StyledLine) -> &mut Self {
        line.insert(0, raw("  "));
        self.lines.push(line);
        self
    }

    /// Adds the tags section, unless there are no tags to display
    fn tags(&mut self, tags: &Tags) -> &mut Self {
        let tags = tags.iter().filter(|(k, _)| *k != "Name").collect::<Vec<_>>();
        if !tags.is_empty() {
            self.section("Tags");
            for (key, value) in tags {
                let line = vec![
                    span(key, self.ctx.theme.secondary),
                    raw("="),
                    span(value, self.ctx.theme.matched),
                ];
                self.line(line);
            }
        }
        self
    }

    /// Adds the annotation describing where the capacity is heading
    fn scaling(&mut self, current: u32, desired: u32) -> &mut Self {
        let theme = self.theme();
        let (glyph, style, text) = match current.cmp(&desired) {
            Ordering::Less => ("⚠", theme.warn, format!("scaling up ({current} → {desired})")),
            Ordering::Greater => ("⚠", theme.warn, format!("scaling down ({current} → {desired})")),
            Ordering::Equal if desired > 0 => ("✓", theme.ok, String::from("at desired capacity")),
            Ordering::Equal => ("○", theme.warn, String::from("scaled to zero")),
        };
        self.line(vec![span(glyph, style), raw(format!(" {text}"))]);
        self
    }

    fn comment(&mut self, text: &str) -> &mut Self {
        self.line(vec![span(text, self.ctx.theme.comment)])
    }

    fn build(&mut self) -> Vec<StyledLine> {
        std::mem::take(&mut self.lines)
    }
}
