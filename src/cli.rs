use std::path::PathBuf;

use clap::{Args, Command, CommandFactory, FromArgMatches, Parser, Subcommand, builder::styling::Style};
use itertools::Itertools;
use tracing::instrument;

use crate::model::RecordKind;

/// Interactive selector for cloud fleet resources
///
/// Lists virtual machines, scaling groups, clusters, node groups and launch template versions, lets you filter them
/// with a small query language and prints the identifiers of the selected ones, so they can be piped to other tools.
#[derive(Parser)]
#[cfg_attr(debug_assertions, derive(Debug))]
#[command(
    author,
    version,
    verbatim_doc_comment,
    infer_subcommands = true,
    subcommand_required = true
)]
pub struct Cli {
    /// Path of the configuration file (defaults to the platform config dir, or FLEET_SELECT_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Region to query, instead of the configured one
    #[arg(long, global = true, value_name = "REGION")]
    pub region: Option<String>,

    /// Skip the on-disk cache, always listing from the provider
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Command to be executed
    #[command(name = "command", subcommand)]
    pub process: CliProcess,
}

#[derive(Subcommand)]
#[cfg_attr(debug_assertions, derive(Debug))]
pub enum CliProcess {
    /// Selects resources, printing their identifiers
    ///
    /// The query is made of space-separated terms, every one of them must match:
    /// - plain terms match the name, the identifier, tags or addresses
    /// - `name:`, `id:`, `tag:Key=Value`, `has:Key`, `missing:Key`, `ip:`, `dns:`, `state:`, `type:` and `az:` filters
    /// - a leading `!` excludes the matching records
    #[command(verbatim_doc_comment, after_long_help = include_str!("_examples/select.txt"))]
    Select(Interactive<SelectProcess>),

    /// Prints the details of a single resource
    #[command(after_long_help = include_str!("_examples/show.txt"))]
    Show(ShowProcess),

    /// Prints the current region and the known ones
    Regions(RegionsProcess),

    /// Manages the on-disk cache of listings
    #[command(subcommand, after_long_help = include_str!("_examples/cache.txt"))]
    Cache(CacheProcess),

    /// Prints the path of the configuration file
    Config(ConfigProcess),

    /// Prints the path of the log file
    Logs(LogsProcess),
}

#[derive(Subcommand)]
#[cfg_attr(debug_assertions, derive(Debug))]
pub enum CacheProcess {
    /// Prints the statistics of the cache directory
    Stats(CacheStatsProcess),
    /// Removes every cached listing
    Clear(CacheClearProcess),
    /// Removes expired, corrupt and temporary entries
    Cleanup(CacheCleanupProcess),
}

/// A generic struct that combines process-specific arguments with common interactive mode options.
///
/// This struct is used to wrap processes that can be run in both interactive and non-interactive modes.
#[derive(Args, Debug)]
pub struct Interactive<T: FromArgMatches + Args> {
    /// Options for the process
    #[command(flatten)]
    pub process: T,

    /// Options for interactive display mode
    #[command(flatten)]
    pub opts: InteractiveOptions,
}

/// Options common to interactive processes
#[derive(Args, Debug)]
pub struct InteractiveOptions {
    /// Open an interactive interface
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Force the interactive interface to render inline (takes less space)
    #[arg(short = 'l', long, requires = "interactive", conflicts_with = "full_screen")]
    pub inline: bool,

    /// Force the interactive interface to render in full screen (the default)
    #[arg(short = 'f', long, requires = "interactive", conflicts_with = "inline")]
    pub full_screen: bool,
}

/// Selects resources of a kind
#[derive(Args, Debug)]
pub struct SelectProcess {
    /// Kind of resource to select
    #[arg(value_enum)]
    pub kind: RecordKind,

    /// Initial query
    #[arg(default_value_t)]
    pub query: String,

    /// Allow marking multiple resources, they're printed in the order they were marked
    #[arg(short = 'm', long, requires = "interactive")]
    pub multi: bool,

    /// Command to run on the selected resources, printed next to every identifier
    ///
    /// The command is checked before anything is listed: substitutions, expansions, chaining and redirections to
    /// absolute paths are rejected
    #[arg(short = 'c', long, value_name = "COMMAND")]
    pub command: Option<String>,
}

/// Prints the details of a resource
#[derive(Args, Debug)]
pub struct ShowProcess {
    /// Kind of the resource
    #[arg(value_enum)]
    pub kind: RecordKind,

    /// Identifier of the resource
    pub id: String,

    /// Print the resource as json
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RegionsProcess {}

#[derive(Args, Debug)]
pub struct CacheStatsProcess {}

#[derive(Args, Debug)]
pub struct CacheClearProcess {}

#[derive(Args, Debug)]
pub struct CacheCleanupProcess {}

#[derive(Args, Debug)]
pub struct ConfigProcess {}

#[derive(Args, Debug)]
pub struct LogsProcess {}

impl Cli {
    /// Parses the [Cli] command, styling the examples of the long help
    #[instrument]
    pub fn parse_extended() -> Self {
        let mut cmd = Self::command();

        let style = cmd.get_styles().clone();
        let dimmed = style.get_placeholder().dimmed();
        let styled_examples_header = format!(
            "{}Examples:{}",
            style.get_usage().render(),
            style.get_usage().render_reset()
        );
        style_after_long_help(&mut cmd, &dimmed, &styled_examples_header);

        let matches = cmd.get_matches();
        match Cli::from_arg_matches(&matches) {
            Ok(args) => args,
            Err(err) => err.exit(),
        }
    }
}

fn style_after_long_help(command_ref: &mut Command, dimmed: &Style, styled_examples_header: &str) {
    let mut command = std::mem::take(command_ref);
    if let Some(after_long_help) = command.get_after_long_help() {
        let styled = after_long_help
            .to_string()
            .replace("Examples:", styled_examples_header)
            .lines()
            .map(|line| {
                // Comments are dimmed
                if line.trim_start().starts_with('#') {
                    format!("{}{}{}", dimmed.render(), line, dimmed.render_reset())
                } else {
                    line.to_string()
                }
            })
            .join("\n");
        command = command.after_long_help(styled);
    }
    for subcommand_ref in command.get_subcommands_mut() {
        style_after_long_help(subcommand_ref, dimmed, styled_examples_header);
    }
    *command_ref = command;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_cli_asserts() {
        Cli::command().debug_assert()
    }

    #[test]
    fn test_select_with_aliases_and_global_options() {
        let args = ["fleet-select", "select", "asg", "name:api", "-i", "-m", "--region", "us-east-1"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.region.as_deref(), Some("us-east-1"));
        let CliProcess::Select(select) = cli.process else {
            panic!("expected the select process");
        };
        assert_eq!(select.process.kind, RecordKind::ScalingGroup);
        assert_eq!(select.process.query, "name:api");
        assert!(select.process.multi && select.opts.interactive);
    }

    #[test]
    fn test_multi_requires_interactive() {
        assert!(Cli::try_parse_from(["fleet-select", "select", "vm", "-m"]).is_err());
    }

    #[test]
    fn test_cache_subcommands() {
        let cli = Cli::try_parse_from(["fleet-select", "cache", "cleanup", "--no-cache"]).unwrap();
        assert!(cli.no_cache);
        assert!(matches!(cli.process, CliProcess::Cache(CacheProcess::Cleanup(_))));
    }
}
