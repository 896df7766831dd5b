use ratatui::{
    buffer::Buffer,
    layout::Rect,
    prelude::StatefulWidget,
    style::Style,
    text::Line,
    widgets::{Block, Widget},
};
use tui_widget_list::{ListBuilder, ListState, ListView, ScrollAxis};
use unicode_width::UnicodeWidthStr;

/// Glyph displayed in front of the marked records
pub const MARK_GLYPH: &str = "✓ ";

/// A row of the record list
pub struct RecordRow<'a> {
    pub line: Line<'a>,
    pub marked: bool,
}

/// A vertical list of single-line records, with a gutter for the marks and the highlight symbol.
///
/// The rows must already be styled, including the highlighted one. The widget only handles the scrolling and the
/// gutter.
pub struct RecordList<'a> {
    block: Option<Block<'a>>,
    rows: Vec<RecordRow<'a>>,
    highlight_symbol: String,
    symbol_style: Style,
    mark_style: Style,
    inline: bool,
}

impl<'a> RecordList<'a> {
    /// Creates a new [`RecordList`]
    pub fn new(rows: Vec<RecordRow<'a>>, inline: bool) -> Self {
        Self {
            block: None,
            rows,
            highlight_symbol: String::new(),
            symbol_style: Style::default(),
            mark_style: Style::default(),
            inline,
        }
    }

    /// Sets the block surrounding the list
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    /// Sets the symbol displayed before the selected row, and its style
    pub fn highlight_symbol(mut self, symbol: impl Into<String>, style: impl Into<Style>) -> Self {
        self.highlight_symbol = symbol.into();
        self.symbol_style = style.into();
        self
    }

    /// Sets the style of the mark glyph
    pub fn mark_style(mut self, style: impl Into<Style>) -> Self {
        self.mark_style = style.into();
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> StatefulWidget for RecordList<'a> {
    type State = ListState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut ListState) {
        let symbol = self.highlight_symbol.as_str();
        let symbol_width = symbol.width() as u16;
        let mark_width = MARK_GLYPH.width() as u16;
        let rows = &self.rows;
        let builder = ListBuilder::new(|ctx| {
            let row = &rows[ctx.index];
            let item = GutterAndLine {
                line: row.line.clone(),
                mark: row.marked.then_some(MARK_GLYPH),
                mark_width,
                mark_style: self.mark_style,
                symbol: if ctx.is_selected { symbol } else { "" },
                symbol_width,
                symbol_style: self.symbol_style,
            };
            (item, 1)
        });

        let mut view = ListView::new(builder, rows.len())
            .scroll_axis(ScrollAxis::Vertical)
            .infinite_scrolling(false)
            .scroll_padding(1 + (!self.inline as u16));
        if let Some(block) = self.block {
            view = view.block(block);
        }
        view.render(area, buf, state)
    }
}

/// Internal helper widget to render a row prefixed with its gutter
struct GutterAndLine<'a, 'b> {
    line: Line<'a>,
    mark: Option<&'b str>,
    mark_width: u16,
    mark_style: Style,
    symbol: &'b str,
    symbol_width: u16,
    symbol_style: Style,
}

impl Widget for GutterAndLine<'_, '_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let gutter = (self.mark_width + self.symbol_width).min(area.width);
        let content_area = Rect {
            x: area.x.saturating_add(gutter),
            width: area.width.saturating_sub(gutter),
            ..area
        };
        if content_area.width > 0 {
            self.line.render(content_area, buf);
        }

        if let Some(mark) = self.mark {
            buf.set_stringn(area.x, area.y, mark, gutter as usize, self.mark_style);
        }
        if !self.symbol.is_empty() && gutter > self.mark_width {
            // Fill the symbol gutter with the background of the symbol, so the highlight spans the whole row
            let symbol_x = area.x + self.mark_width;
            if let Some(bg) = self.symbol_style.bg {
                for x in symbol_x..area.x + gutter {
                    if let Some(cell) = buf.cell_mut((x, area.y)) {
                        cell.set_bg(bg);
                    }
                }
            }
            buf.set_stringn(
                symbol_x,
                area.y,
                self.symbol,
                (gutter - self.mark_width) as usize,
                self.symbol_style,
            );
        }
    }
}
