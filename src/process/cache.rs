use std::sync::Arc;

use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{Process, ProcessOutput};
use crate::{
    cache::{CacheStore, RefreshPolicy, SystemClock},
    cli::{CacheCleanupProcess, CacheClearProcess, CacheStatsProcess},
    config::Config,
    format_msg,
    service::FleetService,
};

/// Opens the store configured for the listings
async fn open_store(config: &Config) -> Result<CacheStore> {
    CacheStore::open(
        &config.cache.dir,
        config.cache.ttl,
        config.cache.max_file_size,
        Arc::new(SystemClock),
    )
    .await
    .map_err(|err| err.into_report())
}

/// Formats a size in bytes with a binary unit
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

impl Process for CacheStatsProcess {
    #[instrument(skip_all)]
    async fn execute(self, config: Config, _service: FleetService, _token: CancellationToken) -> Result<ProcessOutput> {
        let store = open_store(&config).await?;
        let stats = store.stats().await.map_err(|err| err.into_report())?;

        let lines = [
            format!("Directory:     {}", store.dir().display()),
            format!("Entries:       {}", stats.total_files),
            format!("Expired:       {}", stats.expired_files),
            format!("Corrupt:       {}", stats.corrupt_files),
            format!("Size:          {}", human_bytes(stats.total_bytes)),
        ];
        Ok(ProcessOutput::success().stdout(lines.join("\n")))
    }
}

impl Process for CacheClearProcess {
    #[instrument(skip_all)]
    async fn execute(self, config: Config, _service: FleetService, _token: CancellationToken) -> Result<ProcessOutput> {
        let removed = open_store(&config).await?.clear().await.map_err(|err| err.into_report())?;
        Ok(ProcessOutput::success().stderr(format_msg!(config.theme, "Removed {removed} cache entries")))
    }
}

impl Process for CacheCleanupProcess {
    #[instrument(skip_all)]
    async fn execute(self, config: Config, _service: FleetService, _token: CancellationToken) -> Result<ProcessOutput> {
        let max_age = RefreshPolicy::new(&config.cache, &config.refresh).max_age();
        let removed = open_store(&config)
            .await?
            .cleanup(max_age)
            .await
            .map_err(|err| err.into_report())?;
        Ok(ProcessOutput::success().stderr(format_msg!(config.theme, "Removed {removed} cache files")))
    }
}
