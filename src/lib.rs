//! Interactive selector for cloud compute fleets.
//!
//! Lists virtual machines, scaling groups, clusters, node groups and launch template versions through a provider
//! command, caches the listings on disk with stale-while-revalidate semantics and lets the user filter, sort, preview
//! and select them from a two-pane terminal interface.
//!
//! The identifiers of the selected resources are printed on the standard output, so the selector composes with other
//! tools:
//!
//! ```sh
//! fleet-select select vm 'tag:env=prod state:running' -i -m -c uptime | xargs -L1 ./run-on
//! ```

#![forbid(unsafe_code)]

pub mod app;
pub mod cache;
pub mod cli;
pub mod component;
pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod preview;
pub mod process;
pub mod service;
pub mod tui;
pub mod utils;
pub mod widgets;
