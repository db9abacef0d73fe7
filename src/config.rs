use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::core::Hash32;
use crate::error::BundleError;
use crate::theme::{Bundles, ThemeChain};

/// Site settings consumed by the bundling stage.
///
/// Every field except `themes_folder` and `use_bundles` is folded into the
/// [`Fingerprint`] of the generated tasks, so changing any of them between
/// two builds makes all bundle tasks stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Post-processing shell commands keyed by target extension, e.g. `".css"`.
    pub filters: BTreeMap<String, Vec<String>>,
    /// Root of the generated site.
    pub output_folder: Utf8PathBuf,
    /// Root for persistent caches.
    pub cache_folder: Utf8PathBuf,
    /// Directory holding one subdirectory per theme.
    pub themes_folder: Utf8PathBuf,
    /// Theme chain, most specific theme first.
    pub themes: Vec<String>,
    /// Folders copied verbatim into the output, source -> destination.
    pub files_folders: BTreeMap<Utf8PathBuf, Utf8PathBuf>,
    /// Syntax highlighting scheme; themes may bundle a matching stylesheet.
    pub code_color_scheme: String,
    /// Whether bundles should be built at all.
    pub use_bundles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filters: BTreeMap::new(),
            output_folder: "output".into(),
            cache_folder: "cache".into(),
            themes_folder: "themes".into(),
            themes: vec!["base".into()],
            files_folders: BTreeMap::from([("files".into(), "".into())]),
            code_color_scheme: "default".into(),
            use_bundles: true,
        }
    }
}

impl Config {
    /// Reads the configuration from a JSON document. Missing keys take their
    /// default values.
    pub fn from_json(text: &str) -> Result<Self, BundleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn theme_chain(&self) -> ThemeChain {
        ThemeChain::new(&self.themes_folder, &self.themes)
    }

    /// Computes the staleness fingerprint for a pass which resolved `bundles`.
    pub fn fingerprint(&self, bundles: &Bundles) -> Result<Fingerprint, BundleError> {
        let snapshot = Snapshot {
            filters: &self.filters,
            output_folder: &self.output_folder,
            cache_folder: &self.cache_folder,
            theme_bundles: bundles,
            themes: &self.themes,
            files_folders: &self.files_folders,
            code_color_scheme: &self.code_color_scheme,
        };

        let mut buffer = Vec::new();
        ciborium::into_writer(&snapshot, &mut buffer)
            .map_err(|e| BundleError::Snapshot(e.to_string()))?;

        Ok(Fingerprint(Hash32::hash(buffer)))
    }
}

/// The configuration values which affect the contents of a bundle.
#[derive(Serialize)]
struct Snapshot<'a> {
    filters: &'a BTreeMap<String, Vec<String>>,
    output_folder: &'a Utf8PathBuf,
    cache_folder: &'a Utf8PathBuf,
    theme_bundles: &'a Bundles,
    themes: &'a [String],
    files_folders: &'a BTreeMap<Utf8PathBuf, Utf8PathBuf>,
    code_color_scheme: &'a str,
}

/// Digest of the configuration a task was generated from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub(crate) Hash32);

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}
