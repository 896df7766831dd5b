use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{Process, ProcessOutput};
use crate::{
    cli::ShowProcess,
    config::Config,
    preview::{PreviewContext, render_json, render_preview, to_ansi_text},
    service::FleetService,
};

/// Width of the preview when the terminal size can't be retrieved
const DEFAULT_WIDTH: u16 = 80;

impl Process for ShowProcess {
    #[instrument(skip_all)]
    async fn execute(self, config: Config, service: FleetService, token: CancellationToken) -> Result<ProcessOutput> {
        let record = match service.one(self.kind, &self.id, &token).await {
            Ok(record) => record,
            Err(err) => return ProcessOutput::from_error(err, &config.theme),
        };

        let lines = if self.json {
            render_json(&record, &config.theme)
        } else {
            let width = crossterm::terminal::size().map(|(cols, _)| cols).unwrap_or(DEFAULT_WIDTH);
            render_preview(&record, &PreviewContext::new(&config.theme, width as usize))
        };
        Ok(ProcessOutput::success().stdout(to_ansi_text(&lines)))
    }
}
