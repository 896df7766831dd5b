use async_trait::async_trait;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::{Frame, layout::Rect};

use crate::{
    app::Action,
    config::{KeyBindingAction, KeyBindingsConfig},
    process::ProcessOutput,
};

crate::using! {
    pub state,
    pub selector,
}

/// Defines the behavior for a UI component within the application.
///
/// Components are responsible for rendering themselves, handling user input, and managing their internal state. They
/// can also perform logic updates periodically via the `tick` method.
#[async_trait]
pub trait Component: Send {
    /// Retrieves the component name, for debugging purposes
    fn name(&self) -> &'static str;

    /// Calculates the minimum height required by this component to be rendered correctly when inline (in rows)
    fn min_inline_height(&self) -> u16;

    /// Initializes the component and peeks into it before rendering, to give a straight result or continue with the
    /// TUI
    async fn init_and_peek(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Processes time-based logic, like polling the results of background tasks.
    ///
    /// Called periodically by the main loop, not tied to rendering nor user input.
    fn tick(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Renders the component's UI within the given `area` of the `frame`
    fn render(&mut self, frame: &mut Frame, area: Rect);

    /// Finalizes the component when the user cancels, returning its output
    fn exit(&mut self) -> Result<Option<ProcessOutput>> {
        Ok(Some(ProcessOutput::cancelled()))
    }

    /// Processes a paste event, inserting the pasted text by default
    fn process_paste_event(&mut self, content: String) -> Result<Action> {
        self.insert_text(content)
    }

    /// Processes a key press event.
    ///
    /// Implementors can override this method to provide custom key handling, optionally calling
    /// [`default_process_key_event`](Component::default_process_key_event) first and checking its result.
    async fn process_key_event(&mut self, keybindings: &KeyBindingsConfig, key: KeyEvent) -> Result<Action> {
        Ok(self
            .default_process_key_event(keybindings, key)
            .await?
            .unwrap_or_default())
    }

    /// The baseline key mappings.
    ///
    /// Configured key bindings are checked first, then the hardcoded navigation and editing keys. Returns `None` when
    /// the key isn't handled.
    async fn default_process_key_event(
        &mut self,
        keybindings: &KeyBindingsConfig,
        key: KeyEvent,
    ) -> Result<Option<Action>> {
        if let Some(action) = keybindings.get_action_matching(&key) {
            return Ok(Some(match action {
                KeyBindingAction::Quit => self.exit()?.map(Action::Quit).unwrap_or_default(),
                KeyBindingAction::Confirm => self.selection_confirm().await?,
                KeyBindingAction::Mark => self.toggle_mark()?,
                KeyBindingAction::SortField => self.cycle_sort_field()?,
                KeyBindingAction::SortDirection => self.toggle_sort_direction()?,
                KeyBindingAction::PreviewMode => self.cycle_preview_mode()?,
                KeyBindingAction::Reload => self.reload()?,
                KeyBindingAction::HistoryPrev => self.history_prev()?,
                KeyBindingAction::HistoryNext => self.history_next()?,
            }));
        }

        let ctrl = key.modifiers == KeyModifiers::CONTROL;
        Ok(match key.code {
            // Selection / Movement
            KeyCode::Char('k') if ctrl => Some(self.move_up()?),
            KeyCode::Char('j') if ctrl => Some(self.move_down()?),
            KeyCode::Up => Some(self.move_up()?),
            KeyCode::Char('p') if ctrl => Some(self.move_up()?),
            KeyCode::Down => Some(self.move_down()?),
            KeyCode::Char('n') if ctrl => Some(self.move_down()?),
            KeyCode::PageUp => Some(self.page_up()?),
            KeyCode::Char('u') if ctrl => Some(self.page_up()?),
            KeyCode::PageDown => Some(self.page_down()?),
            KeyCode::Char('d') if ctrl => Some(self.page_down()?),
            KeyCode::Home => Some(self.move_home()?),
            KeyCode::End => Some(self.move_end()?),
            // Query edit
            KeyCode::Left => Some(self.move_left(ctrl)?),
            KeyCode::Char('b') if ctrl => Some(self.move_left(false)?),
            KeyCode::Right => Some(self.move_right(ctrl)?),
            KeyCode::Char('f') if ctrl => Some(self.move_right(false)?),
            KeyCode::Char('a') if ctrl => Some(self.move_line_start()?),
            KeyCode::Char('e') if ctrl => Some(self.move_line_end()?),
            KeyCode::Backspace => Some(self.delete(true, ctrl)?),
            KeyCode::Char('h') if ctrl => Some(self.delete(true, false)?),
            KeyCode::Char('w') if ctrl => Some(self.delete(true, true)?),
            KeyCode::Delete => Some(self.delete(false, ctrl)?),
            KeyCode::Char(c) if !ctrl => Some(self.insert_char(c)?),
            // Don't process other events
            _ => None,
        })
    }

    /// Processes a mouse event, the wheel moves the cursor by default
    fn process_mouse_event(&mut self, mouse: MouseEvent) -> Result<Action> {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.move_up(),
            MouseEventKind::ScrollDown => self.move_down(),
            _ => Ok(Action::NoOp),
        }
    }

    /// Handles a terminal resize event, with the new dimensions of the whole terminal
    fn resize(&mut self, width: u16, height: u16) -> Result<Action> {
        _ = (width, height);
        Ok(Action::NoOp)
    }

    /// Moves the cursor to the previous record
    fn move_up(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the cursor to the next record
    fn move_down(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the cursor a page up
    fn page_up(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the cursor a page down
    fn page_down(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the cursor to the first record
    fn move_home(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the cursor to the last record
    fn move_end(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the caret of the query to the left, by a character or a whole word
    fn move_left(&mut self, word: bool) -> Result<Action> {
        let _ = word;
        Ok(Action::NoOp)
    }

    /// Moves the caret of the query to the right, by a character or a whole word
    fn move_right(&mut self, word: bool) -> Result<Action> {
        let _ = word;
        Ok(Action::NoOp)
    }

    /// Moves the caret to the start of the query
    fn move_line_start(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Moves the caret to the end of the query
    fn move_line_end(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Inserts a block of text into the query
    fn insert_text(&mut self, text: String) -> Result<Action> {
        _ = text;
        Ok(Action::NoOp)
    }

    /// Inserts a single character into the query
    fn insert_char(&mut self, c: char) -> Result<Action> {
        _ = c;
        Ok(Action::NoOp)
    }

    /// Deletes from the query, before the caret (`backspace`) or after it, a character or a whole word
    fn delete(&mut self, backspace: bool, word: bool) -> Result<Action> {
        _ = (backspace, word);
        Ok(Action::NoOp)
    }

    /// Accepts the current selection
    async fn selection_confirm(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Marks or unmarks the record under the cursor
    fn toggle_mark(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Cycles the sort field
    fn cycle_sort_field(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Toggles the sort direction
    fn toggle_sort_direction(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Cycles what the preview pane displays
    fn cycle_preview_mode(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Reloads the records
    fn reload(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Recalls the previous query
    fn history_prev(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }

    /// Recalls the next query
    fn history_next(&mut self) -> Result<Action> {
        Ok(Action::NoOp)
    }
}
