use ratatui::{Frame, backend::FromCrossterm, layout::Rect, style::Style, text::Line, widgets::Clear};

use crate::config::Theme;

/// Number of ticks a temporary message is displayed, 3 seconds at 10 ticks per second
const TEMP_MESSAGE_TICKS: u16 = 3 * 10;

/// A one-line overlay for error and notice messages.
///
/// The message is rendered on the last line of the given area, on top of whatever is there.
#[derive(Clone)]
pub struct MessageBar {
    error_style: Style,
    notice_style: Style,
    message: Option<Line<'static>>,
    timeout_ticks: Option<u16>,
}

impl MessageBar {
    /// Creates a new, empty [`MessageBar`]
    pub fn empty(theme: &Theme) -> Self {
        Self {
            error_style: Style::from_crossterm(theme.error),
            notice_style: Style::from_crossterm(theme.comment),
            message: None,
            timeout_ticks: None,
        }
    }

    /// Displays an error message until it's replaced or cleared
    pub fn set_perm_error(&mut self, message: impl Into<String>) {
        self.message = Some(Line::styled(message.into(), self.error_style).centered());
        self.timeout_ticks = None;
    }

    /// Displays an error message for a short period of time
    pub fn set_temp_error(&mut self, message: impl Into<String>) {
        self.message = Some(Line::styled(message.into(), self.error_style).centered());
        self.timeout_ticks = Some(TEMP_MESSAGE_TICKS);
    }

    /// Displays a notice for a short period of time
    pub fn set_temp_notice(&mut self, message: impl Into<String>) {
        self.message = Some(Line::styled(message.into(), self.notice_style).centered());
        self.timeout_ticks = Some(TEMP_MESSAGE_TICKS);
    }

    pub fn clear(&mut self) {
        self.message = None;
        self.timeout_ticks = None;
    }

    /// Whether a message is being displayed
    pub fn is_active(&self) -> bool {
        self.message.is_some()
    }

    /// Advances one tick, clearing the temporary message once its time is up
    pub fn tick(&mut self) {
        match self.timeout_ticks {
            Some(0) => self.clear(),
            Some(remaining) => self.timeout_ticks = Some(remaining - 1),
            None => (),
        }
    }

    /// Renders the message, if any, over the last line of the area
    pub fn render_in(&self, frame: &mut Frame, area: Rect) {
        if let Some(ref line) = self.message
            && area.height > 0
        {
            let overlay = Rect {
                y: area.bottom() - 1,
                height: 1,
                ..area
            };
            frame.render_widget(Clear, overlay);
            frame.render_widget(line, overlay);
        }
    }
}
