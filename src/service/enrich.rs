use std::{
    pin::pin,
    time::{Duration, Instant},
};

use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::ResourceProvider;
use crate::{
    errors::ProviderError,
    metrics::Observability,
    model::{Record, RecordKind},
};

/// Default maximum number of concurrent describe calls
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Turns a list of identifiers into full records with a bounded fan-out of describe calls
#[derive(Clone)]
pub struct Enricher {
    concurrency: usize,
    timeout: Duration,
    obs: Observability,
}

impl Enricher {
    pub fn new(concurrency: usize, timeout: Duration, obs: Observability) -> Self {
        Self {
            concurrency: concurrency.max(1),
            timeout,
            obs,
        }
    }

    /// Describes every identifier, keeping their order.
    ///
    /// Cancelling the token aborts every outstanding call and fails the whole enrichment. Any other per-item failure
    /// is logged and replaced by a placeholder record carrying only the identifier.
    #[instrument(skip_all, fields(%kind, count = ids.len()))]
    pub async fn enrich(
        &self,
        kind: RecordKind,
        provider: &dyn ResourceProvider,
        ids: Vec<String>,
        token: &CancellationToken,
    ) -> Result<Vec<Record>, ProviderError> {
        let started = Instant::now();
        let mut records = Vec::with_capacity(ids.len());
        let mut described = pin!(
            stream::iter(ids)
                .map(|id| async move {
                    let res = self.describe(provider, &id, token).await;
                    (id, res)
                })
                .buffered(self.concurrency)
        );

        while let Some((id, res)) = described.next().await {
            match res {
                Ok(record) => records.push(record),
                Err(ProviderError::Cancelled) => {
                    tracing::debug!("Enrichment cancelled");
                    return Err(ProviderError::Cancelled);
                }
                Err(err) => {
                    tracing::warn!("Couldn't describe {kind} '{id}': {err}");
                    self.obs.placeholders.inc();
                    records.push(Record::placeholder(kind, id));
                }
            }
        }

        self.obs.enrich_latency.observe_duration(started.elapsed());
        Ok(records)
    }

    async fn describe(
        &self,
        provider: &dyn ResourceProvider,
        id: &str,
        token: &CancellationToken,
    ) -> Result<Record, ProviderError> {
        let started = Instant::now();
        let res = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ProviderError::Cancelled),
            res = tokio::time::timeout(self.timeout, provider.describe(id, token)) => {
                res.unwrap_or(Err(ProviderError::Timeout))
            }
        };
        self.obs.provider_latency.observe_duration(started.elapsed());
        let record = res?;
        if record.identifier() != id {
            return Err(ProviderError::Unavailable(format!(
                "described '{}' instead",
                record.identifier()
            )));
        }
        Ok(record)
    }
}
