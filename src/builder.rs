use std::sync::Arc;

use camino::Utf8Path;

use crate::action::{Action, BundleAction, Context};
use crate::config::{Config, Fingerprint};
use crate::engine::Engine;
use crate::error::BundleError;
use crate::ledger::Ledger;
use crate::runner::Diagnostics;
use crate::task::{BASENAME, COPY_ASSETS, Task, Uptodate};

/// Generates the bundle tasks of a site.
///
/// Whether bundling happens at all is decided once, when the bundler is
/// created: it is off if the configuration says so, if no engine was
/// supplied, or if the engine fails its [`Engine::probe`].
pub struct Bundler {
    config: Config,
    context: Option<Arc<Context>>,
}

impl Bundler {
    pub fn new(config: Config, engine: Option<Arc<dyn Engine>>) -> Self {
        let engine = match engine {
            _ if !config.use_bundles => None,
            Some(engine) => match engine.probe() {
                Ok(()) => Some(engine),
                Err(e) => {
                    tracing::warn!("bundling engine unavailable, bundling disabled: {e}");
                    None
                }
            },
            None => {
                tracing::warn!("no bundling engine, bundling disabled");
                None
            }
        };

        let context = engine.map(|engine| {
            Arc::new(Context {
                output_folder: config.output_folder.clone(),
                cache_folder: config.cache_folder.clone(),
                engine,
            })
        });

        Self { config, context }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether bundle tasks will be generated.
    pub fn is_enabled(&self) -> bool {
        self.context.is_some()
    }

    /// Generates the umbrella task followed by one task per bundle.
    ///
    /// Bundle definitions are resolved even when bundling is disabled, so a
    /// broken definition source is reported either way.
    pub fn gen_tasks(&self) -> Result<Vec<Task>, BundleError> {
        let bundles = self.config.theme_chain().bundles()?;
        let fingerprint = self.config.fingerprint(&bundles)?;

        let mut tasks = vec![Task::group(BASENAME, "Bundle assets using the bundling engine.")];

        let Some(context) = &self.context else {
            return Ok(tasks);
        };

        for (name, files) in bundles {
            let task = self.bundle_task(context, fingerprint, name, files);
            tasks.push(task.apply_filters(&self.config.filters));
        }

        tracing::debug!(count = tasks.len() - 1, "generated bundle tasks");
        Ok(tasks)
    }

    /// Generates the tasks and runs them with the reference runner, keeping
    /// the ledger in the cache folder.
    pub fn build(&self) -> anyhow::Result<Diagnostics> {
        let tasks = self.gen_tasks()?;
        let mut ledger = Ledger::load(&self.config.cache_folder);

        crate::runner::run(&tasks, &mut ledger)
    }

    fn bundle_task(
        &self,
        context: &Arc<Context>,
        fingerprint: Fingerprint,
        name: String,
        files: Vec<String>,
    ) -> Task {
        let output_folder = &self.config.output_folder;
        let output_path = output_folder.join(&name);
        let dir = Utf8Path::new(&name).parent().unwrap_or(Utf8Path::new(""));

        let file_dep = files
            .iter()
            .map(|file| output_folder.join(dir).join(file))
            .filter(|path| {
                let exists = path.is_file();
                if !exists {
                    tracing::debug!(bundle = %name, %path, "dependency missing, skipped");
                }
                exists
            })
            .collect();

        let action = BundleAction::new(context.clone(), name, files);

        Task {
            basename: BASENAME.into(),
            name: Some(output_path.to_string()),
            doc: None,
            file_dep,
            task_dep: vec![COPY_ASSETS.into()],
            actions: vec![Action::Bundle(action)],
            targets: vec![output_path],
            uptodate: vec![Uptodate::ConfigChanged(fingerprint)],
            clean: true,
        }
    }
}
