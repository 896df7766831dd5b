use std::{env, panic::AssertUnwindSafe, path::PathBuf, process};

use color_eyre::Result;
use fleet_select::{
    app::App,
    cli::{Cli, CliProcess},
    config::Config,
    errors, format_error, logging,
    metrics::Observability,
    service::{FleetService, Providers},
};
use tokio_util::sync::CancellationToken;

/// Env variable pointing to the configuration file, when `--config` isn't provided
const CONFIG_ENV: &str = "FLEET_SELECT_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_extended();

    let config_path = cli.config.clone().or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut config = Config::init(config_path.clone())?;
    if let Some(region) = &cli.region {
        config.provider.region = region.clone();
    }

    let (log_path, filter) = logging::resolve_path_and_filter(&config);

    // Paths are printed straight away, without initializing anything else
    match &cli.process {
        CliProcess::Config(_) => {
            match config_path.or_else(Config::default_path) {
                Some(path) => println!("{}", path.display()),
                None => eprintln!("{}", format_error!(config.theme, "Couldn't resolve the config path")),
            }
            return Ok(());
        }
        CliProcess::Logs(_) => {
            if filter.is_none() {
                eprintln!(
                    "{}",
                    format_error!(
                        config.theme,
                        "Logs are disabled, enable them on the config or run with {}=debug",
                        logging::LOG_ENV
                    )
                );
                process::exit(1);
            }
            println!("{}", log_path.display());
            return Ok(());
        }
        CliProcess::Select(_) | CliProcess::Show(_) if config.provider.region.is_empty() => {
            eprintln!(
                "{}",
                format_error!(
                    config.theme,
                    "No region configured, use --region or the FLEET_SELECT_REGION env variable"
                )
            );
            process::exit(1);
        }
        _ => (),
    }

    let logs_enabled = filter.is_some();
    logging::init(log_path.clone(), filter)?;
    tracing::info!("fleet-select v{}", env!("CARGO_PKG_VERSION"));

    errors::init(
        logs_enabled.then_some(log_path),
        AssertUnwindSafe(async move {
            let token = CancellationToken::new();
            let providers = Providers::exec(
                &config.provider.command,
                &config.provider.region,
                config.provider.timeout,
            );
            let service =
                FleetService::init(&config, providers, cli.no_cache, Observability::default(), &token).await;

            let output = App::new(token.clone())
                .run(config, service.clone(), cli.process)
                .await;

            // Stop the refresh workers before leaving, even if the process failed
            token.cancel();
            service.close().await;
            if let Some(metrics) = service.cache_metrics() {
                tracing::info!(
                    "Cache lookups: {}, hit rate: {:.2}",
                    metrics.lookups(),
                    metrics.hit_rate()
                );
            }

            let output = output?;
            if let Some(stderr) = &output.stderr {
                eprintln!("{stderr}");
            }
            if let Some(stdout) = &output.stdout {
                println!("{stdout}");
            }
            if !output.is_success() {
                process::exit(output.exit_code());
            }
            Ok::<_, color_eyre::Report>(())
        }),
    )
    .await
}
