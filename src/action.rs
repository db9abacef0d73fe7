use std::fs;
use std::process::{Command, Stdio};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::engine::{Bundle, Engine, Environment};
use crate::error::BundleError;

/// Name of the engine's cache directory inside the cache folder.
pub const CACHE_DIR: &str = "webassets";

/// Settings shared by every bundle action of one generation pass.
pub(crate) struct Context {
    pub(crate) output_folder: Utf8PathBuf,
    pub(crate) cache_folder: Utf8PathBuf,
    pub(crate) engine: Arc<dyn Engine>,
}

/// Deferred work attached to a task.
#[derive(Debug, Clone)]
pub enum Action {
    Bundle(BundleAction),
    Filter(Filter),
}

impl Action {
    pub fn run(&self) -> Result<(), BundleError> {
        match self {
            Action::Bundle(action) => action.run(),
            Action::Filter(filter) => filter.run(),
        }
    }
}

/// Builds one bundle from the files which exist when it runs.
///
/// The action holds the complete file list from the definition, not the
/// subset which existed when the task was generated, since inputs may appear
/// or vanish in between.
#[derive(Clone)]
pub struct BundleAction {
    context: Arc<Context>,
    name: String,
    files: Vec<String>,
}

impl std::fmt::Debug for BundleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleAction")
            .field("name", &self.name)
            .field("files", &self.files)
            .finish()
    }
}

impl BundleAction {
    pub(crate) fn new(context: Arc<Context>, name: String, files: Vec<String>) -> Self {
        Self {
            context,
            name,
            files,
        }
    }

    /// Output path of the bundle, relative to the output folder.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input files as listed in the bundle definition.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn run(&self) -> Result<(), BundleError> {
        let name = Utf8Path::new(&self.name);
        let url = name.parent().unwrap_or(Utf8Path::new(""));
        let basename = name.file_name().unwrap_or(&self.name);
        let out_dir = self.context.output_folder.join(url);

        let inputs: Vec<&str> = self
            .files
            .iter()
            .map(String::as_str)
            .filter(|file| out_dir.join(file).is_file())
            .collect();

        let cache_dir = self.context.cache_folder.join(CACHE_DIR);
        fs::create_dir_all(&cache_dir)?;

        if inputs.is_empty() {
            fs::create_dir_all(&out_dir)?;
            fs::File::create(out_dir.join(basename))?;
            tracing::info!(bundle = %self.name, "no inputs present, wrote empty placeholder");
            return Ok(());
        }

        let mut env = Environment::new(self.context.engine.as_ref(), &out_dir, url, &cache_dir);
        env.register(&self.name, Bundle::new(inputs.iter().copied(), basename));
        env.urls(&self.name)?;

        tracing::info!(bundle = %self.name, inputs = inputs.len(), "built bundle");
        Ok(())
    }
}

/// A post-processing command run in place on a task target.
///
/// The command is a shell template: every `%s` is replaced with the target
/// path, and a command without one receives the path as its last argument.
/// Symlinked targets are left alone, they point at files owned by someone
/// else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub command: String,
    pub target: Utf8PathBuf,
}

impl Filter {
    /// The shell command line run for the target.
    pub fn script(&self) -> String {
        if self.command.contains("%s") {
            self.command.replace("%s", self.target.as_str())
        } else {
            format!("{} {}", self.command, self.target)
        }
    }

    pub fn run(&self) -> Result<(), BundleError> {
        let fail = |reason: String| BundleError::Filter {
            command: self.command.clone(),
            target: self.target.clone(),
            reason,
        };

        if self.command.trim().is_empty() {
            return Err(fail("empty command".into()));
        }

        if fs::symlink_metadata(&self.target).is_ok_and(|meta| meta.is_symlink()) {
            tracing::debug!(target = %self.target, "symlinked target, filter skipped");
            return Ok(());
        }

        let output = Command::new("sh")
            .arg("-c")
            .arg(self.script())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| fail(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{} {}", output.status, stderr.trim())));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::Concat;

    struct Fixture {
        _dir: tempfile::TempDir,
        output: Utf8PathBuf,
        cache: Utf8PathBuf,
        context: Arc<Context>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let output = root.join("output");
        let cache = root.join("cache");
        fs::create_dir_all(output.join("assets/js")).unwrap();

        let context = Arc::new(Context {
            output_folder: output.clone(),
            cache_folder: cache.clone(),
            engine: Arc::new(Concat::new()),
        });

        Fixture {
            _dir: dir,
            output,
            cache,
            context,
        }
    }

    fn action(fx: &Fixture, name: &str, files: &[&str]) -> BundleAction {
        BundleAction::new(
            fx.context.clone(),
            name.into(),
            files.iter().map(|f| f.to_string()).collect(),
        )
    }

    #[test]
    fn test_refilters_at_run_time() {
        let fx = fixture();
        fs::write(fx.output.join("assets/js/site.js"), "site();").unwrap();

        action(&fx, "assets/js/all.js", &["jquery.js", "site.js"])
            .run()
            .unwrap();

        let out = fs::read_to_string(fx.output.join("assets/js/all.js")).unwrap();
        assert_eq!(out, "site();");
        assert!(fx.cache.join(CACHE_DIR).is_dir());
    }

    #[test]
    fn test_picks_up_late_inputs() {
        let fx = fixture();
        let action = action(&fx, "assets/js/all.js", &["a.js", "b.js"]);

        fs::write(fx.output.join("assets/js/a.js"), "a();").unwrap();
        action.run().unwrap();
        fs::write(fx.output.join("assets/js/b.js"), "b();").unwrap();
        action.run().unwrap();

        let out = fs::read_to_string(fx.output.join("assets/js/all.js")).unwrap();
        assert_eq!(out, "a();\nb();");
    }

    #[test]
    fn test_idempotent() {
        let fx = fixture();
        fs::write(fx.output.join("assets/js/a.js"), "a();").unwrap();
        fs::write(fx.output.join("assets/js/b.js"), "b();").unwrap();
        let action = action(&fx, "assets/js/all.js", &["a.js", "b.js"]);

        action.run().unwrap();
        let first = fs::read(fx.output.join("assets/js/all.js")).unwrap();
        action.run().unwrap();
        let second = fs::read(fx.output.join("assets/js/all.js")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_placeholder() {
        let fx = fixture();
        let target = fx.output.join("assets/css/all.css");

        action(&fx, "assets/css/all.css", &["missing.css"]).run().unwrap();
        assert_eq!(fs::metadata(&target).unwrap().len(), 0);

        // Stale content from an earlier build is truncated.
        fs::write(&target, "old").unwrap();
        action(&fx, "assets/css/all.css", &[]).run().unwrap();
        assert_eq!(fs::metadata(&target).unwrap().len(), 0);
    }

    #[test]
    fn test_top_level_bundle() {
        let fx = fixture();
        fs::write(fx.output.join("a.css"), "a{}").unwrap();

        action(&fx, "all.css", &["a.css"]).run().unwrap();
        assert_eq!(fs::read_to_string(fx.output.join("all.css")).unwrap(), "a{}");
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_runs_in_place() {
        let fx = fixture();
        let target = fx.output.join("all.css");
        fs::write(&target, "a{}").unwrap();

        let filter = Filter {
            command: "rm %s".into(),
            target: target.clone(),
        };
        filter.run().unwrap();
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_failure() {
        let filter = Filter {
            command: "false".into(),
            target: "whatever.css".into(),
        };

        assert!(matches!(filter.run(), Err(BundleError::Filter { .. })));

        let empty = Filter {
            command: "   ".into(),
            target: "whatever.css".into(),
        };
        assert!(empty.run().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_through_shell() {
        let fx = fixture();
        let target = fx.output.join("all.css");
        fs::write(&target, "a{}").unwrap();

        let filter = Filter {
            command: "cat %s > %s.copy && echo '/* done */' >> %s.copy".into(),
            target: target.clone(),
        };
        filter.run().unwrap();

        let copy = fs::read_to_string(fx.output.join("all.css.copy")).unwrap();
        assert_eq!(copy, "a{}/* done */\n");
    }

    #[test]
    fn test_filter_script() {
        let append = Filter {
            command: "gzip -k".into(),
            target: "out/all.css".into(),
        };
        assert_eq!(append.script(), "gzip -k out/all.css");

        let substitute = Filter {
            command: "csso %s -o %s".into(),
            target: "out/all.css".into(),
        };
        assert_eq!(substitute.script(), "csso out/all.css -o out/all.css");
    }

    #[cfg(unix)]
    #[test]
    fn test_filter_skips_symlinks() {
        let fx = fixture();
        let real = fx.output.join("real.css");
        let link = fx.output.join("link.css");
        fs::write(&real, "a{}").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let filter = Filter {
            command: "rm %s".into(),
            target: link.clone(),
        };
        filter.run().unwrap();

        assert!(link.exists());
        assert!(real.exists());
    }
}
