use crossterm::style::StyledContent;
use ratatui::{
    backend::FromCrossterm,
    style::Style,
    text::{Line, Span},
};

crate::using! {
    pub list,
    pub preview,
    pub status,
    pub message,
}

/// Converts a line of styled terminal content into a ratatui [`Line`]
pub fn to_line(line: &[StyledContent<String>]) -> Line<'static> {
    Line::from(
        line.iter()
            .map(|s| Span::styled(s.content().clone(), Style::from_crossterm(*s.style())))
            .collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use crossterm::style::{Color, ContentStyle};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::{raw, span};

    #[test]
    fn test_to_line_keeps_content_and_colors() {
        let cyan = ContentStyle {
            foreground_color: Some(Color::Cyan),
            ..ContentStyle::new()
        };
        let line = to_line(&[raw("id: "), span("i-1", cyan)]);
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.to_string(), "id: i-1");
        assert_eq!(line.spans[1].style.fg, Some(ratatui::style::Color::Cyan));
    }
}
