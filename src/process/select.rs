use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{InteractiveProcess, Process, ProcessOutput};
use crate::{
    cli::SelectProcess,
    component::{Component, SelectorComponent, SelectorOptions},
    config::Config,
    errors::UserFacingError,
    format_error,
    service::{CommandSanity, CommandValidator, FleetService},
    utils::{format_header, format_row, parse_query, rank, to_ansi},
};

impl Process for SelectProcess {
    #[instrument(skip_all)]
    async fn execute(self, config: Config, service: FleetService, token: CancellationToken) -> Result<ProcessOutput> {
        if let Some(command) = &self.command
            && let Err(reason) = CommandValidator.check(command)
        {
            let err = UserFacingError::CommandRejected(reason);
            return Ok(ProcessOutput::fail().stderr(format_error!(config.theme, "{err}")));
        }

        let query = parse_query(&self.query);
        let listing = match service.list(self.kind, &query, &token).await {
            Ok(listing) => listing,
            Err(err) => return ProcessOutput::from_error(err, &config.theme),
        };
        if listing.records.is_empty() {
            let err = UserFacingError::EmptyFleet(self.kind);
            return Ok(ProcessOutput::fail().stderr(format_error!(config.theme, "{err}")));
        }

        let mut ranked = rank(&listing.records, &query, &config.weights);
        tracing::info!("{} out of {} records match the query", ranked.len(), listing.records.len());
        let (field, direction) = (config.sort.field, config.sort.direction);
        ranked.sort_by(|(a, _), (b, _)| {
            direction.apply(field.compare(&listing.records[*a], &listing.records[*b]))
        });
        let records = ranked.into_iter().map(|(idx, _)| &listing.records[idx]);

        let out = match &self.command {
            Some(command) => records
                .map(|r| format!("{}\t{command}", r.identifier()))
                .collect::<Vec<_>>(),
            None => std::iter::once(to_ansi(&format_header(&config.columns, &config.theme)))
                .chain(records.map(|r| {
                    to_ansi(&format_row(r, &config.columns, &query.terms, &config.theme, false))
                        .trim_end()
                        .to_owned()
                }))
                .collect(),
        };
        Ok(ProcessOutput::success().stdout(out.join("\n")))
    }
}

impl InteractiveProcess for SelectProcess {
    #[instrument(skip_all)]
    fn into_component(
        self,
        config: Config,
        service: FleetService,
        inline: bool,
        token: CancellationToken,
    ) -> Result<Box<dyn Component>> {
        let options = SelectorOptions {
            kind: self.kind,
            query: self.query,
            multi: self.multi,
            command: self.command,
        };
        Ok(Box::new(SelectorComponent::new(service, &config, inline, token, options)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::{SortConfig, Theme},
        metrics::Observability,
        model::{Record, RecordKind, RecordMeta, SortDirection, SortField, VmRecord, VmState},
        process::OutputStatus,
        service::Providers,
    };

    fn vm(id: &str, name: &str, state: VmState) -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: id.to_owned(),
                name: name.to_owned(),
                ..Default::default()
            },
            state,
            private_ip: String::from("10.0.0.1"),
            ..Default::default()
        })
    }

    async fn run(query: &str, command: Option<&str>) -> ProcessOutput {
        run_sorted(query, command, SortConfig::default()).await
    }

    async fn run_sorted(query: &str, command: Option<&str>, sort: SortConfig) -> ProcessOutput {
        let mut config = Config::default();
        config.theme = Theme::plain();
        config.sort = sort;
        config.columns = vec![crate::config::Column::Id, crate::config::Column::State];
        let token = CancellationToken::new();
        let providers = Providers::from_records([
            vm("i-1", "web-01", VmState::Running),
            vm("i-2", "web-02", VmState::Stopped),
            vm("i-3", "db-01", VmState::Running),
        ]);
        let service = FleetService::init(&config, providers, true, Observability::default(), &token).await;
        let process = SelectProcess {
            kind: RecordKind::Vm,
            query: query.to_owned(),
            multi: false,
            command: command.map(str::to_owned),
        };
        process.execute(config, service, token).await.unwrap()
    }

    #[tokio::test]
    async fn test_prints_matching_rows() {
        let output = run("web !state:stopped", None).await;
        assert_eq!(output.stdout.as_deref(), Some("ID                  STATE\ni-1                 running"));
    }

    #[tokio::test]
    async fn test_pairs_the_command_with_every_match() {
        let output = run("state:running", Some("uptime")).await;
        assert_eq!(output.stdout.as_deref(), Some("i-3\tuptime\ni-1\tuptime"));
    }

    #[tokio::test]
    async fn test_rows_follow_the_configured_sort() {
        let sort = SortConfig {
            field: SortField::Id,
            direction: SortDirection::Desc,
        };
        let output = run_sorted("", None, sort).await;
        assert_eq!(
            output.stdout.as_deref(),
            Some("ID                  STATE\ni-3                 running\ni-2                 stopped\ni-1                 running")
        );

        let sort = SortConfig {
            field: SortField::State,
            direction: SortDirection::Asc,
        };
        let output = run_sorted("", Some("uptime"), sort).await;
        assert_eq!(output.stdout.as_deref(), Some("i-3\tuptime\ni-1\tuptime\ni-2\tuptime"));
    }

    #[tokio::test]
    async fn test_rejects_dangerous_commands() {
        let output = run("", Some("uptime && reboot")).await;
        assert_eq!(output.status, OutputStatus::Failure);
        assert!(output.stderr.unwrap().contains("command chaining is not allowed"));
    }
}
