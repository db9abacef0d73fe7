//! The seam between bundle tasks and whatever actually combines the files.
//!
//! An [`Engine`] is handed an [`Environment`] rooted in a directory of the
//! output tree together with a [`Bundle`] to materialize there. The engine is
//! free to keep its own content cache under [`Environment::cache`]; this is
//! independent of the task-level staleness check, which decides whether the
//! engine is invoked in the first place.

use std::fs;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use crate::core::Hash32;
use crate::error::BundleError;

/// A set of input files combined, in order, into a single output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Input file names, relative to the environment directory.
    pub inputs: Vec<String>,
    /// Output file name, relative to the environment directory.
    pub output: String,
}

impl Bundle {
    pub fn new<I, S>(inputs: I, output: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
        }
    }
}

/// Something capable of turning a [`Bundle`] into a file on disk.
pub trait Engine: Send + Sync {
    /// Checks whether the engine is usable on this machine. An engine which
    /// fails the probe disables bundling for the whole build.
    fn probe(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Writes `bundle.output` inside `env.directory`. Calling this again with
    /// unchanged inputs must produce the same bytes.
    fn materialize(&self, env: &Environment<'_>, bundle: &Bundle) -> anyhow::Result<()>;
}

/// Working context for an [`Engine`].
pub struct Environment<'a> {
    engine: &'a dyn Engine,
    /// Directory the bundle inputs and output live in.
    pub directory: Utf8PathBuf,
    /// URL prefix of `directory` relative to the site root.
    pub url: Utf8PathBuf,
    /// Directory reserved for the engine's own cache.
    pub cache: Utf8PathBuf,
    bundles: IndexMap<String, Bundle>,
}

impl<'a> Environment<'a> {
    pub fn new(
        engine: &'a dyn Engine,
        directory: impl Into<Utf8PathBuf>,
        url: impl Into<Utf8PathBuf>,
        cache: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            engine,
            directory: directory.into(),
            url: url.into(),
            cache: cache.into(),
            bundles: IndexMap::new(),
        }
    }

    /// Registers `bundle` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, bundle: Bundle) {
        self.bundles.insert(name.into(), bundle);
    }

    /// Materializes the bundle registered as `name` and returns its URLs.
    pub fn urls(&self, name: &str) -> Result<Vec<Utf8PathBuf>, BundleError> {
        let bundle = self.bundles.get(name).ok_or_else(|| {
            BundleError::Engine(name.to_string(), anyhow::anyhow!("bundle is not registered"))
        })?;

        self.engine
            .materialize(self, bundle)
            .map_err(|e| BundleError::Engine(name.to_string(), e))?;

        Ok(vec![self.url.join(&bundle.output)])
    }
}

/// Joins the inputs of a bundle byte for byte, separated by a newline.
///
/// Keeps a small manifest per bundle under the cache directory, recording the
/// digest of the last output it wrote, and leaves the output untouched when
/// nothing changed.
#[derive(Debug, Clone)]
pub struct Concat {
    separator: Vec<u8>,
}

impl Concat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_separator(separator: impl Into<Vec<u8>>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for Concat {
    fn default() -> Self {
        Self::with_separator(b"\n".to_vec())
    }
}

impl Engine for Concat {
    fn materialize(&self, env: &Environment<'_>, bundle: &Bundle) -> anyhow::Result<()> {
        let mut data = Vec::new();

        for (i, input) in bundle.inputs.iter().enumerate() {
            let path = env.directory.join(input);
            let bytes = fs::read(&path).with_context(|| format!("couldn't read input {path}"))?;

            if i > 0 {
                data.extend_from_slice(&self.separator);
            }
            data.extend_from_slice(&bytes);
        }

        let digest = Hash32::hash(&data);
        let output = env.directory.join(&bundle.output);
        let entry = cache_entry(&env.cache, &env.url.join(&bundle.output));
        let manifest = entry.join("manifest");

        if is_fresh(&output, &manifest, digest) {
            tracing::debug!(%output, "bundle unchanged, skipping write");
            return Ok(());
        }

        fs::write(&output, &data).with_context(|| format!("couldn't write {output}"))?;
        fs::create_dir_all(&entry)?;
        fs::write(&manifest, digest.to_hex())?;

        Ok(())
    }
}

/// Per-bundle cache subdirectory, so concurrent bundles never share files.
fn cache_entry(cache: &Utf8Path, url: &Utf8Path) -> Utf8PathBuf {
    cache.join(Hash32::hash(url.as_str()).to_hex())
}

fn is_fresh(output: &Utf8Path, manifest: &Utf8Path, digest: Hash32) -> bool {
    let Ok(recorded) = fs::read_to_string(manifest) else {
        return false;
    };

    recorded == digest.to_hex()
        && Hash32::hash_file(output).is_ok_and(|current| current == digest)
}

#[cfg(test)]
mod test {
    use super::*;

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    struct Broken;

    impl Engine for Broken {
        fn materialize(&self, _: &Environment<'_>, _: &Bundle) -> anyhow::Result<()> {
            anyhow::bail!("no way")
        }
    }

    #[test]
    fn test_concat_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        fs::write(root.join("a.js"), "a();").unwrap();
        fs::write(root.join("b.js"), "b();").unwrap();

        let engine = Concat::new();
        let mut env = Environment::new(&engine, &root, "js", root.join(".cache"));
        env.register("js/all.js", Bundle::new(["b.js", "a.js"], "all.js"));

        let urls = env.urls("js/all.js").unwrap();
        assert_eq!(urls, [Utf8PathBuf::from("js/all.js")]);
        assert_eq!(fs::read_to_string(root.join("all.js")).unwrap(), "b();\na();");
    }

    #[test]
    fn test_concat_cache_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let cache = root.join(".cache");
        fs::write(root.join("a.css"), "a{}").unwrap();

        let engine = Concat::new();
        let mut env = Environment::new(&engine, &root, "", &cache);
        env.register("all.css", Bundle::new(["a.css"], "all.css"));

        env.urls("all.css").unwrap();
        let manifest = cache_entry(&cache, Utf8Path::new("all.css")).join("manifest");
        assert_eq!(
            fs::read_to_string(&manifest).unwrap(),
            Hash32::hash(b"a{}").to_hex()
        );

        // A tampered output is rewritten even though the manifest matches.
        fs::write(root.join("all.css"), "tampered").unwrap();
        env.urls("all.css").unwrap();
        assert_eq!(fs::read_to_string(root.join("all.css")).unwrap(), "a{}");
    }

    #[test]
    fn test_missing_input_is_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);

        let engine = Concat::new();
        let mut env = Environment::new(&engine, &root, "", root.join(".cache"));
        env.register("all.js", Bundle::new(["gone.js"], "all.js"));

        assert!(matches!(env.urls("all.js"), Err(BundleError::Engine(name, _)) if name == "all.js"));
    }

    #[test]
    fn test_unregistered_and_failing() {
        let engine = Broken;
        let mut env = Environment::new(&engine, "out", "", "cache");
        assert!(env.urls("nothing").is_err());

        env.register("x.js", Bundle::new(["a.js"], "x.js"));
        let err = env.urls("x.js").unwrap_err();
        assert!(err.to_string().contains("no way"));
    }
}
