use camino::Utf8PathBuf;
use thiserror::Error;

/// A bundle definition source could not be parsed.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Couldn't read bundle definitions from '{0}'.\n{1}")]
    Io(Utf8PathBuf, std::io::Error),

    /// A non-blank line lacks the `=` separator.
    #[error("{path}:{line}: expected `name = file, ...`, found '{text}'")]
    Format {
        path: Utf8PathBuf,
        line: usize,
        text: String,
    },
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Theme '{0}' has invalid bundle definitions:\n{1}")]
    Definition(String, DefinitionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't encode the configuration snapshot.\n{0}")]
    Snapshot(String),

    #[error("Bundling engine failed on '{0}':\n{1}")]
    Engine(String, anyhow::Error),

    #[error("Filter '{command}' failed on '{target}': {reason}")]
    Filter {
        command: String,
        target: Utf8PathBuf,
        reason: String,
    },

    #[error("Couldn't parse configuration.\n{0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't encode the ledger.\n{0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
}
