#![forbid(unsafe_code)]
//! Theme asset bundling for incremental static site builds.
//!
//! Themes declare bundles in a `bundles` file: each bundle is an output path
//! together with the ordered list of files concatenated into it. This crate
//! turns those declarations into build [`Task`]s which an incremental build
//! engine can schedule, skip when nothing changed, and clean up.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tabane::{Bundler, Concat, Config};
//!
//! let config = Config {
//!     themes: vec!["custom".into(), "base".into()],
//!     ..Config::default()
//! };
//!
//! let bundler = Bundler::new(config, Some(Arc::new(Concat::new())));
//!
//! // Hand the descriptors over to a build engine...
//! let tasks = bundler.gen_tasks()?;
//!
//! // ...or let the bundled reference runner take care of them.
//! let diagnostics = bundler.build()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod action;
mod builder;
mod config;
mod core;
mod engine;
mod error;
mod ledger;
pub mod runner;
pub mod theme;
mod task;

pub use crate::action::{Action, BundleAction, CACHE_DIR, Filter};
pub use crate::builder::Bundler;
pub use crate::config::{Config, Fingerprint};
pub use crate::engine::{Bundle, Concat, Engine, Environment};
pub use crate::error::*;
pub use crate::ledger::{LEDGER_FILE, Ledger};
pub use crate::task::{BASENAME, COPY_ASSETS, Task, Uptodate};
pub use crate::theme::{Bundles, ThemeChain};

/// Installs a `tracing` subscriber which prints log events and renders the
/// progress bars of the runner. Filtering follows `RUST_LOG`, defaulting to
/// `info`.
#[cfg(feature = "logging")]
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init()?;

    Ok(())
}
