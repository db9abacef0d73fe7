//! Bundle definitions and the theme chain they are looked up in.
//!
//! Every theme may ship a plain text file called `bundles` in its root
//! directory. Each line of that file declares one bundle:
//!
//! ```text
//! assets/js/all.js = jquery.js, bootstrap.js, site.js
//! assets/css/all.css = bootstrap.css, theme.css
//! ```
//!
//! The left side is the output path relative to the output folder, the right
//! side lists the source files, relative to the same directory as the output,
//! in the order they are concatenated.
//!
//! Themes form a chain, from the most specific child to the most generic
//! ancestor. Definitions are *not* merged along the chain: the first theme
//! that has any definitions wins and every theme after it is ignored.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use crate::error::{BundleError, DefinitionError};

/// Name of the definition source inside a theme directory.
pub const BUNDLES_FILE: &str = "bundles";

/// Ordered mapping from a bundle's output path to its source files.
pub type Bundles = IndexMap<String, Vec<String>>;

/// Reads the bundle definitions stored at `path`.
///
/// A path which is not a regular file yields no definitions. Blank lines are
/// skipped; any other line without a `=` is an error.
pub fn parse_bundles(path: &Utf8Path) -> Result<Bundles, DefinitionError> {
    if !path.is_file() {
        return Ok(Bundles::new());
    }

    let text = fs::read_to_string(path).map_err(|e| DefinitionError::Io(path.to_owned(), e))?;

    parse_definitions(path, &text)
}

fn parse_definitions(path: &Utf8Path, text: &str) -> Result<Bundles, DefinitionError> {
    let mut bundles = Bundles::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let malformed = || DefinitionError::Format {
            path: path.to_owned(),
            line: index + 1,
            text: line.to_string(),
        };

        let (name, files) = line.split_once('=').ok_or_else(malformed)?;
        let name = name.trim();

        // The name has to end in a file, `assets/js/` names a directory.
        if name.ends_with('/') || Utf8Path::new(name).file_name().is_none() {
            return Err(malformed());
        }

        let files = files
            .split(',')
            .map(str::trim)
            .filter(|file| !file.is_empty())
            .map(String::from)
            .collect();

        bundles.insert(name.to_string(), files);
    }

    Ok(bundles)
}

/// Walks `themes` in order and returns the definitions of the first theme
/// that has any. `locate` maps a theme name to its directory.
pub fn resolve_bundles<I, S, F>(themes: I, locate: F) -> Result<Bundles, BundleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(&str) -> Utf8PathBuf,
{
    for theme in themes {
        let theme = theme.as_ref();
        let path = locate(theme).join(BUNDLES_FILE);

        let bundles =
            parse_bundles(&path).map_err(|e| BundleError::Definition(theme.to_string(), e))?;

        if !bundles.is_empty() {
            tracing::debug!(theme, count = bundles.len(), "resolved bundle definitions");
            return Ok(bundles);
        }
    }

    Ok(Bundles::new())
}

/// An ordered theme inheritance chain, most specific theme first.
#[derive(Debug, Clone)]
pub struct ThemeChain {
    root: Utf8PathBuf,
    themes: Vec<String>,
}

impl ThemeChain {
    /// Creates a chain whose themes live in subdirectories of `root`.
    pub fn new<I, S>(root: impl Into<Utf8PathBuf>, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            themes: themes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn themes(&self) -> &[String] {
        &self.themes
    }

    /// Directory of the theme called `name`.
    pub fn theme_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Resolves the bundle definitions for this chain.
    pub fn bundles(&self) -> Result<Bundles, BundleError> {
        resolve_bundles(&self.themes, |theme| self.theme_path(theme))
    }
}
