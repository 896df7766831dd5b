use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::Result;
use enum_cycling::EnumCycle;
use parking_lot::{Mutex, RwLock};
use ratatui::{
    Frame,
    backend::FromCrossterm,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use tui_widget_list::ListState;
use unicode_width::UnicodeWidthStr;

use super::{Component, SelectorState};
use crate::{
    app::Action,
    config::{Column, Config, KeyBindingsConfig, SortConfig, Theme, Weights},
    errors::{AppError, UserFacingError},
    format_error,
    model::{Record, RecordKind},
    preview::{Details, PreviewContext, PreviewMode, render_mode},
    process::ProcessOutput,
    service::{CommandSanity, CommandValidator, FleetService, Listing},
    utils::{format_header, format_row, parse_query, split_widths},
    widgets::{MARK_GLYPH, MessageBar, PreviewPane, RecordList, RecordRow, status_line, to_line},
};

/// What the user is selecting
#[derive(Clone, Debug)]
pub struct SelectorOptions {
    pub kind: RecordKind,
    /// Initial query
    pub query: String,
    /// Whether multiple records can be marked
    pub multi: bool,
    /// Remote command to pair with every selected record
    pub command: Option<String>,
}

/// The interactive record selector
#[derive(Clone)]
pub struct SelectorComponent {
    theme: Theme,
    inline: bool,
    columns: Vec<Column>,
    keybindings: KeyBindingsConfig,
    sort: SortConfig,
    weights: Weights,
    history_size: usize,
    options: SelectorOptions,
    sanity: Arc<dyn CommandSanity>,
    service: FleetService,
    token: CancellationToken,
    /// Cancellation token of the reload in progress, if any
    reload_token: Arc<Mutex<Option<CancellationToken>>>,
    state: Arc<RwLock<SelectorComponentState>>,
}
struct SelectorComponentState {
    selector: SelectorState,
    /// The query being typed
    input: String,
    /// Position of the caret within the input, in chars
    caret: usize,
    preview_mode: PreviewMode,
    message: MessageBar,
    list_state: ListState,
    /// Rows of the list pane on the last render
    page: usize,
    loading: bool,
}

impl SelectorComponent {
    /// Creates a new [`SelectorComponent`]
    pub fn new(
        service: FleetService,
        config: &Config,
        inline: bool,
        token: CancellationToken,
        options: SelectorOptions,
    ) -> Self {
        let selector = SelectorState::new(
            Listing::default(),
            &options.query,
            config.sort,
            config.weights,
            config.history_size,
            service.current_region(),
        );
        let state = SelectorComponentState {
            selector,
            caret: options.query.chars().count(),
            input: options.query.clone(),
            preview_mode: PreviewMode::default(),
            message: MessageBar::empty(&config.theme),
            list_state: ListState::default(),
            page: 10,
            loading: true,
        };
        Self {
            theme: config.theme.clone(),
            inline,
            columns: config.columns.clone(),
            keybindings: config.keybindings.clone(),
            sort: config.sort,
            weights: config.weights,
            history_size: config.history_size,
            options,
            sanity: Arc::new(CommandValidator),
            service,
            token,
            reload_token: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Replaces the check applied to the remote command
    pub fn with_sanity(mut self, sanity: impl CommandSanity + 'static) -> Self {
        self.sanity = Arc::new(sanity);
        self
    }

    /// Re-filters the records after the input changed
    fn input_changed(state: &mut SelectorComponentState) {
        let input = state.input.clone();
        state.selector.set_query(&input);
    }

    /// Replaces the input with a recalled query, placing the caret at the end
    fn recall(state: &mut SelectorComponentState, query: String) {
        state.caret = query.chars().count();
        state.input = query;
    }

    /// Builds the output for the selected records
    fn output(&self, selection: &[Record]) -> ProcessOutput {
        let out = selection
            .iter()
            .map(|r| match &self.options.command {
                Some(command) => format!("{}\t{command}", r.identifier()),
                None => r.identifier().to_owned(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        ProcessOutput::success().stdout(out)
    }

    /// Retrieves the details of the record under the cursor in the background, when they're needed
    fn fetch_pending_details(&self) {
        let id = {
            let mut state = self.state.write();
            if state.preview_mode != PreviewMode::Details {
                return;
            }
            let Some(id) = state.selector.pending_details().map(str::to_owned) else {
                return;
            };
            state.selector.set_details(&id, Details::Loading);
            id
        };

        let this = self.clone();
        tokio::spawn(async move {
            tracing::debug!("Describing {}: {id}", this.options.kind);
            let details = match this.service.one(this.options.kind, &id, &this.token).await {
                Ok(record) => Details::Loaded(record),
                Err(AppError::Cancelled) => return,
                Err(AppError::UserFacing(err)) => Details::Failed(err.to_string()),
                Err(AppError::Unexpected(report)) => {
                    tracing::error!("Couldn't describe {id}: {report:?}");
                    Details::Failed(report.to_string())
                }
            };
            this.state.write().selector.set_details(id, details);
        });
    }

    /// Renders the query input, returning the position of the caret
    fn render_input(&self, frame: &mut Frame, area: Rect, state: &SelectorComponentState) -> (u16, u16) {
        let before_caret = state.input.chars().take(state.caret).collect::<String>();
        if self.inline {
            let prompt = format!("{} > ", self.options.kind);
            let x = area.x + (prompt.width() + before_caret.width()) as u16;
            let line = Line::from(vec![
                Span::styled(prompt, Style::from_crossterm(self.theme.accent)),
                Span::styled(state.input.as_str(), Style::from_crossterm(self.theme.primary)),
            ]);
            frame.render_widget(line, area);
            (x.min(area.right().saturating_sub(1)), area.y)
        } else {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::from_crossterm(self.theme.secondary))
                .title(format!(" Query ({}) ", self.options.kind));
            let inner = block.inner(area);
            frame.render_widget(
                Paragraph::new(state.input.as_str())
                    .style(Style::from_crossterm(self.theme.primary))
                    .block(block),
                area,
            );
            let x = inner.x + before_caret.width() as u16;
            (x.min(inner.right().saturating_sub(1)), inner.y)
        }
    }

    /// Renders the header and the rows of the list pane
    fn render_list(&self, frame: &mut Frame, area: Rect, state: &mut SelectorComponentState) {
        let [header_area, list_area] = Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(area);
        state.page = list_area.height as usize;

        let gutter = " ".repeat(MARK_GLYPH.width() + self.theme.highlight_symbol.width());
        let mut header = to_line(&format_header(&self.columns, &self.theme));
        header.spans.insert(0, Span::raw(gutter));
        frame.render_widget(header, header_area);

        let cursor = state.selector.cursor();
        let terms = &state.selector.query().terms;
        let rows = state
            .selector
            .visible()
            .enumerate()
            .map(|(idx, record)| {
                let highlighted = cursor == Some(idx);
                let mut line = to_line(&format_row(record, &self.columns, terms, &self.theme, highlighted));
                if highlighted {
                    line = line.style(Style::from_crossterm(self.theme.with_highlight(Default::default())));
                }
                RecordRow {
                    line,
                    marked: state.selector.is_marked(record.identifier()),
                }
            })
            .collect::<Vec<_>>();
        let list = RecordList::new(rows, self.inline)
            .highlight_symbol(
                self.theme.highlight_symbol.clone(),
                Style::from_crossterm(self.theme.with_highlight(self.theme.highlight_accent)),
            )
            .mark_style(Style::from_crossterm(self.theme.accent));

        state.list_state.select(cursor);
        frame.render_stateful_widget(list, list_area, &mut state.list_state);
    }

    /// Renders the preview pane for the record under the cursor
    fn render_preview(&self, frame: &mut Frame, area: Rect, state: &SelectorComponentState) {
        let record = state.selector.current();
        let details = record.and_then(|r| state.selector.details(r.identifier()));
        let ctx = PreviewContext::new(&self.theme, area.width.saturating_sub(1) as usize).with_details(details);
        let lines = render_mode(state.preview_mode, record, &ctx, &self.keybindings);
        frame.render_widget(
            PreviewPane::new(state.preview_mode, &lines).border_style(Style::from_crossterm(self.theme.secondary)),
            area,
        );
    }
}

#[async_trait]
impl Component for SelectorComponent {
    fn name(&self) -> &'static str {
        "SelectorComponent"
    }

    fn min_inline_height(&self) -> u16 {
        // Query + Header + 10 Records + Status
        1 + 1 + 10 + 1
    }

    #[instrument(skip_all)]
    async fn init_and_peek(&mut self) -> Result<Action> {
        // Reject the command before loading anything
        if let Some(command) = &self.options.command
            && let Err(reason) = self.sanity.check(command)
        {
            tracing::warn!("Command rejected: {reason}");
            let err = UserFacingError::CommandRejected(reason);
            return Ok(Action::Quit(
                ProcessOutput::fail().stderr(format_error!(self.theme, "{err}")),
            ));
        }

        let query = parse_query(&self.options.query);
        let listing = match self.service.list(self.options.kind, &query, &self.token).await {
            Ok(listing) => listing,
            Err(AppError::Cancelled) => return Ok(Action::Quit(ProcessOutput::cancelled())),
            Err(AppError::UserFacing(err)) => {
                return Ok(Action::Quit(ProcessOutput::fail().stderr(format_error!(self.theme, "{err}"))));
            }
            Err(AppError::Unexpected(report)) => return Err(report),
        };
        if listing.records.is_empty() {
            let err = UserFacingError::EmptyFleet(self.options.kind);
            return Ok(Action::Quit(ProcessOutput::fail().stderr(format_error!(self.theme, "{err}"))));
        }
        tracing::info!("Loaded {} {} records", listing.records.len(), self.options.kind);

        let mut state = self.state.write();
        if listing.truncated {
            state
                .message
                .set_temp_notice(format!("Showing the first {} records", listing.records.len()));
        }
        state.selector = SelectorState::new(
            listing,
            &self.options.query,
            self.sort,
            self.weights,
            self.history_size,
            self.service.current_region(),
        );
        state.loading = false;
        Ok(Action::NoOp)
    }

    #[instrument(skip_all)]
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let layout = if self.inline {
            Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1)])
        } else {
            Layout::vertical([Constraint::Length(3), Constraint::Min(5), Constraint::Length(1)]).margin(1)
        };
        let [input_area, body_area, status_area] = layout.areas(area);

        let mut guard = self.state.write();
        let state = &mut *guard;

        let caret = self.render_input(frame, input_area, state);

        let (list_width, preview_width) = split_widths(body_area.width);
        let [list_area, preview_area] = Layout::horizontal([
            Constraint::Length(list_width),
            Constraint::Length(preview_width.unwrap_or(0)),
        ])
        .areas(body_area);
        self.render_list(frame, list_area, state);
        if preview_width.is_some() {
            self.render_preview(frame, preview_area, state);
        }

        frame.render_widget(
            to_line(&status_line(&state.selector, state.loading, &self.theme)),
            status_area,
        );
        state.message.render_in(frame, area);

        frame.set_cursor_position(caret);
    }

    fn tick(&mut self) -> Result<Action> {
        self.state.write().message.tick();
        self.fetch_pending_details();
        Ok(Action::NoOp)
    }

    fn move_up(&mut self) -> Result<Action> {
        self.state.write().selector.move_up();
        Ok(Action::NoOp)
    }

    fn move_down(&mut self) -> Result<Action> {
        self.state.write().selector.move_down();
        Ok(Action::NoOp)
    }

    fn page_up(&mut self) -> Result<Action> {
        let mut state = self.state.write();
        let page = state.page;
        state.selector.page_up(page);
        Ok(Action::NoOp)
    }

    fn page_down(&mut self) -> Result<Action> {
        let mut state = self.state.write();
        let page = state.page;
        state.selector.page_down(page);
        Ok(Action::NoOp)
    }

    fn move_home(&mut self) -> Result<Action> {
        self.state.write().selector.move_first();
        Ok(Action::NoOp)
    }

    fn move_end(&mut self) -> Result<Action> {
        self.state.write().selector.move_last();
        Ok(Action::NoOp)
    }

    fn move_left(&mut self, word: bool) -> Result<Action> {
        let mut state = self.state.write();
        state.caret = if word {
            prev_word(&state.input, state.caret)
        } else {
            state.caret.saturating_sub(1)
        };
        Ok(Action::NoOp)
    }

    fn move_right(&mut self, word: bool) -> Result<Action> {
        let mut state = self.state.write();
        let len = state.input.chars().count();
        state.caret = if word {
            next_word(&state.input, state.caret)
        } else {
            (state.caret + 1).min(len)
        };
        Ok(Action::NoOp)
    }

    fn move_line_start(&mut self) -> Result<Action> {
        self.state.write().caret = 0;
        Ok(Action::NoOp)
    }

    fn move_line_end(&mut self) -> Result<Action> {
        let mut state = self.state.write();
        state.caret = state.input.chars().count();
        Ok(Action::NoOp)
    }

    fn insert_text(&mut self, text: String) -> Result<Action> {
        let text = text.replace(['\r', '\n', '\t'], " ");
        let mut state = self.state.write();
        let offset = byte_offset(&state.input, state.caret);
        state.input.insert_str(offset, &text);
        state.caret += text.chars().count();
        Self::input_changed(&mut state);
        Ok(Action::NoOp)
    }

    fn insert_char(&mut self, c: char) -> Result<Action> {
        let mut state = self.state.write();
        let offset = byte_offset(&state.input, state.caret);
        state.input.insert(offset, c);
        state.caret += 1;
        Self::input_changed(&mut state);
        Ok(Action::NoOp)
    }

    fn delete(&mut self, backspace: bool, word: bool) -> Result<Action> {
        let mut state = self.state.write();
        let (from, to) = match (backspace, word) {
            (true, true) => (prev_word(&state.input, state.caret), state.caret),
            (true, false) => (state.caret.saturating_sub(1), state.caret),
            (false, true) => (state.caret, next_word(&state.input, state.caret)),
            (false, false) => (state.caret, (state.caret + 1).min(state.input.chars().count())),
        };
        if from < to {
            let range = byte_offset(&state.input, from)..byte_offset(&state.input, to);
            state.input.replace_range(range, "");
            state.caret = from;
            Self::input_changed(&mut state);
        }
        Ok(Action::NoOp)
    }

    #[instrument(skip_all)]
    async fn selection_confirm(&mut self) -> Result<Action> {
        let selection = {
            let mut state = self.state.write();
            if state.loading && state.selector.total() == 0 {
                return Ok(Action::NoOp);
            }
            state.selector.remember_query();
            state.selector.selection()
        };
        if selection.is_empty() {
            return Ok(Action::NoOp);
        }
        tracing::info!("User selected {} {} records", selection.len(), self.options.kind);
        Ok(Action::Quit(self.output(&selection)))
    }

    fn toggle_mark(&mut self) -> Result<Action> {
        if self.options.multi {
            self.state.write().selector.toggle_mark();
        }
        Ok(Action::NoOp)
    }

    fn cycle_sort_field(&mut self) -> Result<Action> {
        self.state.write().selector.cycle_sort_field();
        Ok(Action::NoOp)
    }

    fn toggle_sort_direction(&mut self) -> Result<Action> {
        self.state.write().selector.toggle_sort_direction();
        Ok(Action::NoOp)
    }

    fn cycle_preview_mode(&mut self) -> Result<Action> {
        let mut state = self.state.write();
        state.preview_mode = state.preview_mode.down();
        Ok(Action::NoOp)
    }

    #[instrument(skip_all)]
    fn reload(&mut self) -> Result<Action> {
        let token = {
            // Cancel the previous reload (if any) and issue a new token
            let mut guard = self.reload_token.lock();
            if let Some(token) = guard.take() {
                token.cancel();
            }
            let token = self.token.child_token();
            *guard = Some(token.clone());
            token
        };
        let query = {
            let mut state = self.state.write();
            state.loading = true;
            state.selector.remember_query();
            state.selector.query().clone()
        };

        let this = self.clone();
        tokio::spawn(async move {
            tracing::info!("Reloading {} records", this.options.kind);
            let res = this.service.list(this.options.kind, &query, &token).await;
            if token.is_cancelled() {
                return;
            }
            let mut state = this.state.write();
            state.loading = false;
            match res {
                Ok(listing) => {
                    let truncated = listing.truncated;
                    state.selector.set_listing(listing);
                    if truncated {
                        let total = state.selector.total();
                        state.message.set_temp_notice(format!("Showing the first {total} records"));
                    }
                }
                Err(AppError::Cancelled) => (),
                Err(AppError::UserFacing(err)) => state.message.set_temp_error(err.to_string()),
                Err(AppError::Unexpected(report)) => {
                    tracing::error!("Couldn't reload the records: {report:?}");
                    state.message.set_temp_error(report.to_string());
                }
            }
        });
        Ok(Action::NoOp)
    }

    fn history_prev(&mut self) -> Result<Action> {
        let mut state = self.state.write();
        if let Some(query) = state.selector.history_prev() {
            Self::recall(&mut state, query);
        }
        Ok(Action::NoOp)
    }

    fn history_next(&mut self) -> Result<Action> {
        let mut state = self.state.write();
        if let Some(query) = state.selector.history_next() {
            Self::recall(&mut state, query);
        }
        Ok(Action::NoOp)
    }
}

/// Byte offset of the given char position
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(idx, _)| idx).unwrap_or(text.len())
}

/// Char position of the start of the word before the caret
fn prev_word(text: &str, caret: usize) -> usize {
    let chars = text.chars().collect::<Vec<_>>();
    let mut pos = caret.min(chars.len());
    while pos > 0 && chars[pos - 1].is_whitespace() {
        pos -= 1;
    }
    while pos > 0 && !chars[pos - 1].is_whitespace() {
        pos -= 1;
    }
    pos
}

/// Char position of the end of the word after the caret
fn next_word(text: &str, caret: usize) -> usize {
    let chars = text.chars().collect::<Vec<_>>();
    let mut pos = caret.min(chars.len());
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    while pos < chars.len() && !chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}
