use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Text},
    widgets::{Block, Borders, Paragraph, Widget},
};

use super::to_line;
use crate::{preview::PreviewMode, utils::StyledLine};

/// The preview pane, displaying the detail view of the record under the cursor
pub struct PreviewPane<'a> {
    mode: PreviewMode,
    lines: Vec<Line<'a>>,
    border_style: Style,
    scroll: u16,
}

impl<'a> PreviewPane<'a> {
    pub fn new(mode: PreviewMode, lines: &[StyledLine]) -> Self {
        Self {
            mode,
            lines: lines.iter().map(|l| to_line(l)).collect(),
            border_style: Style::default(),
            scroll: 0,
        }
    }

    pub fn border_style(mut self, style: impl Into<Style>) -> Self {
        self.border_style = style.into();
        self
    }

    /// Skips the given number of lines from the top
    pub fn scroll(mut self, scroll: u16) -> Self {
        self.scroll = scroll;
        self
    }
}

impl Widget for PreviewPane<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::LEFT)
            .border_style(self.border_style)
            .title(format!(" {} ", self.mode));
        Paragraph::new(Text::from(self.lines))
            .block(block)
            .scroll((self.scroll, 0))
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::raw;

    #[test]
    fn test_preview_pane_renders_title_and_lines() {
        let area = Rect::new(0, 0, 20, 3);
        let mut buf = Buffer::empty(area);
        PreviewPane::new(PreviewMode::Json, &[vec![raw("{")], vec![raw("}")]]).render(area, &mut buf);
        let row = |y: u16| {
            (0..area.width)
                .map(|x| buf[(x, y)].symbol().to_owned())
                .collect::<String>()
                .trim_end()
                .to_owned()
        };
        assert_eq!(row(0), "│ json");
        assert_eq!(row(1), "│{");
        assert_eq!(row(2), "│}");
    }
}
