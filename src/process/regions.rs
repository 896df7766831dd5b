use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use super::{Process, ProcessOutput};
use crate::{cli::RegionsProcess, config::Config, service::FleetService};

impl Process for RegionsProcess {
    async fn execute(self, config: Config, service: FleetService, _token: CancellationToken) -> Result<ProcessOutput> {
        let current = service.current_region();
        let out = service
            .regions()
            .iter()
            .map(|region| {
                if region == current {
                    format!("{} (current)", config.theme.accent.apply(region))
                } else {
                    region.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ProcessOutput::success().stdout(out))
    }
}
