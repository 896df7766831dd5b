use std::{
    cmp,
    io::{self, Stderr, stderr},
    thread,
    time::Duration,
};

use color_eyre::{Result, eyre::bail};
use crossterm::{
    cursor,
    event::{
        self, Event as CrosstermEvent, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
        KeyboardEnhancementFlags, MouseEvent,
    },
    style,
    terminal::{self, ClearType, supports_keyboard_enhancement},
};
use futures_util::{FutureExt, StreamExt};
use ratatui::{CompletedFrame, Frame, Terminal, backend::CrosstermBackend as Backend, layout::Rect};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::interval,
};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Ticks per second, driving time-based updates
const TICK_RATE: f64 = 10.0;
/// Frames per second
const FRAME_RATE: f64 = 60.0;

/// Events emitted by the terminal event loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A periodic tick, to poll background work
    Tick,
    /// The UI should be redrawn
    Render,
    /// Text was pasted into the terminal
    Paste(String),
    /// A key was pressed
    Key(KeyEvent),
    /// A mouse event occurred
    Mouse(MouseEvent),
    /// The terminal was resized (columns and rows)
    Resize(u16, u16),
}

/// The terminal user interface.
///
/// The interface is drawn on the standard error, so the standard output only carries the selection.
pub struct Tui {
    writer: Stderr,
    terminal: Terminal<Backend<Stderr>>,
    task: JoinHandle<()>,
    loop_token: CancellationToken,
    global_token: CancellationToken,
    event_rx: UnboundedReceiver<Event>,
    event_tx: UnboundedSender<Event>,
    mouse: bool,
    paste: bool,
    mode: Option<Mode>,
}

#[derive(Clone, Copy)]
enum Mode {
    FullScreen { keyboard_enhanced: bool },
    Inline { keyboard_enhanced: bool, ctx: InlineContext },
}

/// Where an inline interface is drawn and where the cursor goes back afterwards
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct InlineContext {
    min_height: u16,
    x: u16,
    y: u16,
    restore_x: u16,
    restore_y: u16,
}

impl InlineContext {
    /// Area to draw in, given the area of the whole terminal
    fn area(&self, frame: Rect) -> Rect {
        let min_height = cmp::min(frame.height, self.min_height);
        let available = frame.height.saturating_sub(self.y);
        Rect::new(
            self.x,
            self.y,
            frame.width.saturating_sub(self.x),
            cmp::max(min_height, available),
        )
    }
}

impl Tui {
    /// Creates a new interface, not yet entered.
    ///
    /// The global token is cancelled when the user hits `ctrl-c`.
    pub fn new(global_token: CancellationToken) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            writer: stderr(),
            terminal: Terminal::new(Backend::new(stderr()))?,
            task: tokio::spawn(async {}),
            loop_token: CancellationToken::new(),
            global_token,
            event_rx,
            event_tx,
            mouse: false,
            paste: false,
            mode: None,
        })
    }

    /// Enables mouse capture
    pub fn mouse(mut self, mouse: bool) -> Self {
        self.mouse = mouse;
        self
    }

    /// Enables bracketed paste
    pub fn paste(mut self, paste: bool) -> Self {
        self.paste = paste;
        self
    }

    /// Retrieves the next event, `None` once the event loop has stopped
    pub async fn next_event(&mut self) -> Option<Event> {
        self.event_rx.recv().await
    }

    /// Enters the alternate screen and starts the event loop
    pub fn enter(&mut self) -> Result<()> {
        if self.mode.is_some() {
            bail!("The terminal interface was already entered");
        }
        tracing::trace!(mouse = self.mouse, paste = self.paste, "Entering a full-screen TUI");

        let keyboard_enhanced = self.enter_raw_mode(true)?;
        self.mode = Some(Mode::FullScreen { keyboard_enhanced });
        self.start();
        Ok(())
    }

    /// Reserves some lines below the cursor to draw on and starts the event loop
    pub fn enter_inline(&mut self, min_height: u16) -> Result<()> {
        if self.mode.is_some() {
            bail!("The terminal interface was already entered");
        }
        tracing::trace!(mouse = self.mouse, paste = self.paste, min_height, "Entering an inline TUI");

        let (orig_x, orig_y) = cursor::position()?;
        // Scroll the terminal if needed, so there's room for the interface below the prompt
        crossterm::execute!(
            self.writer,
            style::Print("\n".repeat(min_height as usize)),
            cursor::MoveToPreviousLine(min_height),
            terminal::Clear(ClearType::FromCursorDown)
        )?;
        let (x, y) = cursor::position()?;
        let ctx = InlineContext {
            min_height,
            x,
            y,
            restore_x: orig_x,
            restore_y: cmp::min(orig_y, y),
        };
        tracing::trace!("Inline context: {ctx:?}");

        let keyboard_enhanced = self.enter_raw_mode(false)?;
        self.mode = Some(Mode::Inline { keyboard_enhanced, ctx });
        self.start();
        Ok(())
    }

    /// Draws a frame, the callback receives the area to draw in
    pub fn render<F>(&mut self, render: F) -> io::Result<CompletedFrame<'_>>
    where
        F: FnOnce(&mut Frame, Rect),
    {
        let Some(mode) = self.mode else {
            return Err(io::Error::other("The terminal interface wasn't entered"));
        };
        self.terminal.draw(|frame| {
            let area = match mode {
                Mode::FullScreen { .. } => frame.area(),
                Mode::Inline { ctx, .. } => ctx.area(frame.area()),
            };
            render(frame, area);
        })
    }

    /// Stops the event loop and restores the terminal
    pub fn exit(mut self) -> Result<()> {
        self.stop();
        self.restore_terminal()
    }

    fn restore_terminal(&mut self) -> Result<()> {
        match self.mode.take() {
            None => (),
            Some(Mode::FullScreen { keyboard_enhanced }) => {
                tracing::trace!("Leaving the full-screen TUI");
                self.terminal.flush()?;
                self.exit_raw_mode(true, keyboard_enhanced)?;
            }
            Some(Mode::Inline { keyboard_enhanced, ctx }) => {
                tracing::trace!("Leaving the inline TUI");
                self.terminal.flush()?;
                self.exit_raw_mode(false, keyboard_enhanced)?;
                crossterm::execute!(
                    self.writer,
                    cursor::MoveTo(ctx.restore_x, ctx.restore_y),
                    terminal::Clear(ClearType::FromCursorDown)
                )?;
            }
        }
        Ok(())
    }

    fn enter_raw_mode(&mut self, alt_screen: bool) -> Result<bool> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(self.writer, cursor::Hide)?;
        if alt_screen {
            crossterm::execute!(self.writer, terminal::EnterAlternateScreen)?;
        }
        if self.mouse {
            crossterm::execute!(self.writer, event::EnableMouseCapture)?;
        }
        if self.paste {
            crossterm::execute!(self.writer, event::EnableBracketedPaste)?;
        }

        let keyboard_enhanced = supports_keyboard_enhancement()
            .inspect_err(|err| tracing::error!("Couldn't check keyboard enhancement support: {err}"))
            .unwrap_or(false);
        if keyboard_enhanced {
            crossterm::execute!(
                self.writer,
                event::PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_ALTERNATE_KEYS
                ),
            )?;
        }
        tracing::trace!(keyboard_enhanced, "Raw mode enabled");
        Ok(keyboard_enhanced)
    }

    fn exit_raw_mode(&mut self, alt_screen: bool, keyboard_enhanced: bool) -> Result<()> {
        if keyboard_enhanced {
            crossterm::execute!(self.writer, event::PopKeyboardEnhancementFlags)?;
        }
        if self.paste {
            crossterm::execute!(self.writer, event::DisableBracketedPaste)?;
        }
        if self.mouse {
            crossterm::execute!(self.writer, event::DisableMouseCapture)?;
        }
        if alt_screen {
            crossterm::execute!(self.writer, terminal::LeaveAlternateScreen)?;
        }
        crossterm::execute!(self.writer, cursor::Show)?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    fn start(&mut self) {
        self.loop_token.cancel();
        self.loop_token = CancellationToken::new();
        self.task = tokio::spawn(Self::event_loop(
            self.event_tx.clone(),
            self.loop_token.clone(),
            self.global_token.clone(),
        ));
    }

    #[instrument(skip_all)]
    async fn event_loop(
        event_tx: UnboundedSender<Event>,
        loop_token: CancellationToken,
        global_token: CancellationToken,
    ) {
        let mut events = EventStream::new();
        let mut tick = interval(Duration::from_secs_f64(1.0 / TICK_RATE));
        let mut render = interval(Duration::from_secs_f64(1.0 / FRAME_RATE));

        loop {
            let event = tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = global_token.cancelled() => break,
                event = events.next().fuse() => match event {
                    // Raw mode swallows SIGINT
                    Some(Ok(CrosstermEvent::Key(KeyEvent {
                        code: KeyCode::Char('c'),
                        modifiers: KeyModifiers::CONTROL,
                        ..
                    }))) => {
                        tracing::debug!("Ctrl+C received, cancelling");
                        global_token.cancel();
                        continue;
                    }
                    Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
                    Some(Ok(CrosstermEvent::Mouse(mouse))) => Event::Mouse(mouse),
                    Some(Ok(CrosstermEvent::Resize(cols, rows))) => Event::Resize(cols, rows),
                    Some(Ok(CrosstermEvent::Paste(text))) => Event::Paste(text),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        tracing::error!("Couldn't read the next terminal event: {err}");
                        break;
                    }
                    None => break,
                },
                _ = tick.tick() => Event::Tick,
                _ = render.tick() => Event::Render,
            };
            if event_tx.send(event).is_err() {
                break;
            }
        }
        loop_token.cancel();
    }

    /// Stops the event loop, waiting up to 100ms for it to finish
    fn stop(&self) {
        if self.task.is_finished() {
            return;
        }
        self.loop_token.cancel();
        for waited in 1..=100 {
            if self.task.is_finished() {
                return;
            }
            if waited == 50 {
                tracing::debug!("The event loop didn't stop in 50ms, aborting it");
                self.task.abort();
            }
            thread::sleep(Duration::from_millis(1));
        }
        tracing::error!("The event loop couldn't be stopped");
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.restore_terminal() {
            tracing::error!("Couldn't restore the terminal: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_inline_area() {
        let ctx = InlineContext {
            min_height: 13,
            x: 0,
            y: 30,
            restore_x: 0,
            restore_y: 29,
        };
        // Room below the cursor
        assert_eq!(ctx.area(Rect::new(0, 0, 120, 50)), Rect::new(0, 30, 120, 20));
        // The terminal was scrolled to make room for the minimum height
        let ctx = InlineContext { y: 40, ..ctx };
        assert_eq!(ctx.area(Rect::new(0, 0, 120, 50)), Rect::new(0, 40, 120, 13));
    }
}
