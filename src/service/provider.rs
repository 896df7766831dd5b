use std::{collections::BTreeMap, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    errors::ProviderError,
    model::{Record, RecordKind},
};

/// Capability listing and describing the resources of a single kind.
///
/// Implementations must be safe to call concurrently and should honour the cancellation token.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Lists the identifiers of every resource
    async fn list_identifiers(&self, token: &CancellationToken) -> Result<Vec<String>, ProviderError>;

    /// Retrieves the full record of a single resource
    async fn describe(&self, id: &str, token: &CancellationToken) -> Result<Record, ProviderError>;
}

/// The set of providers available, at most one per kind
#[derive(Clone, Default)]
pub struct Providers(BTreeMap<RecordKind, Arc<dyn ResourceProvider>>);

impl Providers {
    /// Registers the provider for the given kind, replacing any previous one
    pub fn with(mut self, kind: RecordKind, provider: impl ResourceProvider + 'static) -> Self {
        self.0.insert(kind, Arc::new(provider));
        self
    }

    /// Builds a provider per kind from a fixed record set
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        records
            .into_iter()
            .into_group_map_by(Record::kind)
            .into_iter()
            .fold(Self::default(), |providers, (kind, records)| {
                providers.with(kind, StaticProvider::new(records))
            })
    }

    /// Builds an [`ExecProvider`] for every kind
    pub fn exec(command: &str, region: &str, timeout: Duration) -> Self {
        <RecordKind as strum::IntoEnumIterator>::iter().fold(Self::default(), |providers, kind| {
            providers.with(kind, ExecProvider::new(command, kind, region, timeout))
        })
    }

    /// Retrieves the provider of the given kind
    pub fn get(&self, kind: RecordKind) -> Result<Arc<dyn ResourceProvider>, ProviderError> {
        self.0
            .get(&kind)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable(format!("there's no provider configured for {kind}")))
    }
}

/// A provider serving a fixed set of records
pub struct StaticProvider {
    records: Vec<Record>,
}

impl StaticProvider {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ResourceProvider for StaticProvider {
    async fn list_identifiers(&self, token: &CancellationToken) -> Result<Vec<String>, ProviderError> {
        if token.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(self.records.iter().map(|r| r.identifier().to_owned()).collect())
    }

    async fn describe(&self, id: &str, token: &CancellationToken) -> Result<Record, ProviderError> {
        if token.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.records
            .iter()
            .find(|r| r.identifier() == id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))
    }
}

/// A provider delegating to an external command.
///
/// - `<command> list <kind> [--region <region>]` must print a json array of identifiers
/// - `<command> describe <kind> <id> [--region <region>]` must print a json record, or `null` if it doesn't exist
///
/// The `kind` field of the described record can be omitted. The command is killed when the call is cancelled or
/// times out.
pub struct ExecProvider {
    program: String,
    args: Vec<String>,
    kind: RecordKind,
    region: String,
    timeout: Duration,
}

impl ExecProvider {
    /// Builds a new provider, the command is split on whitespaces into the program and its leading arguments
    pub fn new(command: &str, kind: RecordKind, region: impl Into<String>, timeout: Duration) -> Self {
        let mut parts = command.split_whitespace().map(String::from);
        Self {
            program: parts.next().unwrap_or_default(),
            args: parts.collect(),
            kind,
            region: region.into(),
            timeout,
        }
    }

    #[instrument(skip(self, token), fields(kind = %self.kind))]
    async fn run<T: DeserializeOwned>(&self, args: &[&str], token: &CancellationToken) -> Result<T, ProviderError> {
        if self.program.is_empty() {
            return Err(ProviderError::Unavailable(String::from(
                "no provider command configured, set `provider.command` on the config file",
            )));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.region.is_empty() {
            cmd.args(["--region", &self.region]);
        }

        tracing::trace!("Running provider command: {} {}", self.program, args.join(" "));
        let output = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ProviderError::Cancelled),
            res = tokio::time::timeout(self.timeout, cmd.output()) => match res {
                Err(_) => return Err(ProviderError::Timeout),
                Ok(Err(err)) => {
                    return Err(ProviderError::Unavailable(format!("couldn't run '{}': {err}", self.program)));
                }
                Ok(Ok(output)) => output,
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("provider command exited with {}", output.status));
            return Err(ProviderError::Unavailable(reason));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|err| ProviderError::Unavailable(format!("invalid provider output: {err}")))
    }
}

#[async_trait]
impl ResourceProvider for ExecProvider {
    async fn list_identifiers(&self, token: &CancellationToken) -> Result<Vec<String>, ProviderError> {
        let ids: Vec<String> = self.run(&["list", self.kind.into()], token).await?;
        Ok(ids.into_iter().filter(|id| !id.trim().is_empty()).collect())
    }

    async fn describe(&self, id: &str, token: &CancellationToken) -> Result<Record, ProviderError> {
        let value: serde_json::Value = self.run(&["describe", self.kind.into(), id], token).await?;
        let mut value = match value {
            serde_json::Value::Null => return Err(ProviderError::NotFound(id.to_owned())),
            serde_json::Value::Object(map) => map,
            _ => return Err(ProviderError::Unavailable(String::from("provider didn't return a json object"))),
        };
        let kind: &'static str = self.kind.into();
        value
            .entry("kind")
            .or_insert_with(|| serde_json::Value::String(kind.to_owned()));

        let record: Record = serde_json::from_value(serde_json::Value::Object(value))
            .map_err(|err| ProviderError::Unavailable(format!("invalid {kind} record: {err}")))?;
        if record.kind() != self.kind {
            return Err(ProviderError::Unavailable(format!(
                "expected a {kind} record but got a {}",
                record.kind()
            )));
        }
        record
            .validate()
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;
        Ok(record)
    }
}
