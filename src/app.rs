use color_eyre::Result;
use crossterm::event::MouseEventKind;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    cli::{CacheProcess, CliProcess, Interactive},
    component::Component,
    config::{Config, KeyBindingsConfig},
    process::{InteractiveProcess, Process, ProcessOutput},
    service::FleetService,
    tui::{Event, Tui},
};

/// Represents actions that components can signal to change the application flow
#[derive(Default)]
pub enum Action {
    /// No-op action, nothing has to be done
    #[default]
    NoOp,
    /// Signals that the application should quit, providing the output
    Quit(ProcessOutput),
}

/// The main application struct, managing the application flow
pub struct App {
    cancellation_token: CancellationToken,
}
impl App {
    /// Creates a new instance of the application
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token }
    }

    /// Runs the process of the parsed CLI arguments, either interactively or not.
    ///
    /// It returns the final [ProcessOutput] when the application finishes.
    #[instrument(skip_all)]
    pub async fn run(self, config: Config, service: FleetService, process: CliProcess) -> Result<ProcessOutput> {
        match process {
            CliProcess::Config(_) | CliProcess::Logs(_) => unreachable!("Handled in main"),
            CliProcess::Select(select) => {
                tracing::info!("Running 'select' process");
                tracing::debug!("Options: {:?}", select);
                self.run_interactive(select, config, service).await
            }
            CliProcess::Show(show) => {
                tracing::info!("Running 'show' process");
                tracing::debug!("Options: {:?}", show);
                self.run_non_interactive(show, config, service).await
            }
            CliProcess::Regions(regions) => {
                tracing::info!("Running 'regions' process");
                self.run_non_interactive(regions, config, service).await
            }
            CliProcess::Cache(CacheProcess::Stats(stats)) => {
                tracing::info!("Running 'cache stats' process");
                self.run_non_interactive(stats, config, service).await
            }
            CliProcess::Cache(CacheProcess::Clear(clear)) => {
                tracing::info!("Running 'cache clear' process");
                self.run_non_interactive(clear, config, service).await
            }
            CliProcess::Cache(CacheProcess::Cleanup(cleanup)) => {
                tracing::info!("Running 'cache cleanup' process");
                self.run_non_interactive(cleanup, config, service).await
            }
        }
    }

    async fn run_non_interactive(
        self,
        process: impl Process,
        config: Config,
        service: FleetService,
    ) -> Result<ProcessOutput> {
        process.execute(config, service, self.cancellation_token).await
    }

    /// Executes a process that might require an interactive TUI
    async fn run_interactive(
        self,
        it: Interactive<impl InteractiveProcess + clap::FromArgMatches + clap::Args>,
        config: Config,
        service: FleetService,
    ) -> Result<ProcessOutput> {
        // If the process hasn't enabled the interactive flag, just run it
        if !it.opts.interactive {
            return self.run_non_interactive(it.process, config, service).await;
        }

        let inline = it.opts.inline;
        let keybindings = config.keybindings.clone();
        let mut component = it
            .process
            .into_component(config, service, inline, self.cancellation_token.clone())?;

        // The component might be able to give a straight result, before entering the TUI
        if let Action::Quit(output) = component.init_and_peek().await? {
            tracing::debug!("A result was received from `init_and_peek`, returning it");
            return Ok(output);
        }

        let mut tui = Tui::new(self.cancellation_token.clone())?.paste(true).mouse(true);
        if inline {
            tracing::debug!("Displaying inline {} interactively", component.name());
            tui.enter_inline(component.min_inline_height())?;
        } else {
            tracing::debug!("Displaying full-screen {} interactively", component.name());
            tui.enter()?;
        }

        let output = loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Cancellation token received, exiting TUI loop");
                    break ProcessOutput::cancelled();
                }
                maybe_event = tui.next_event() => {
                    let Some(tui_event) = maybe_event else {
                        tracing::error!("TUI closed unexpectedly, no event received");
                        break ProcessOutput::fail();
                    };
                    let action = handle_tui_event(&mut component, tui_event, &mut tui, &keybindings).await?;
                    if let Action::Quit(output) = action {
                        break output;
                    }
                }
            }
        };

        tui.exit()?;
        Ok(output)
    }
}

/// Handles a single TUI event by dispatching it to the component
#[instrument(skip_all)]
async fn handle_tui_event(
    component: &mut Box<dyn Component>,
    event: Event,
    tui: &mut Tui,
    keybindings: &KeyBindingsConfig,
) -> Result<Action> {
    if event != Event::Tick
        && event != Event::Render
        && !matches!(event, Event::Mouse(m) if m.kind == MouseEventKind::Moved)
    {
        tracing::trace!("{event:?}");
    }
    Ok(match event {
        Event::Render => {
            tui.render(|frame, area| component.render(frame, area))?;
            Action::NoOp
        }
        Event::Tick => component.tick()?,
        Event::Resize(width, height) => component.resize(width, height)?,
        Event::Paste(content) => component.process_paste_event(content)?,
        Event::Key(key) => component.process_key_event(keybindings, key).await?,
        Event::Mouse(mouse) => component.process_mouse_event(mouse)?,
    })
}
