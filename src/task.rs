//! Task descriptors handed over to the execution engine.
//!
//! A [`Task`] is plain data: what it reads, what it writes, which tasks must
//! run before it, when it can be skipped, and the bound [`Action`]s that do
//! the work. Generating a task never touches the disk beyond checking which
//! dependency files exist.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use crate::action::{Action, Filter};
use crate::config::Fingerprint;

/// Task family of the bundle tasks and id of their umbrella task.
pub const BASENAME: &str = "build_bundles";

/// Upstream task which stages raw theme assets in the output folder.
pub const COPY_ASSETS: &str = "copy_assets";

/// Condition under which a task may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uptodate {
    /// Up to date while the configuration fingerprint recorded at the last
    /// successful run equals this one.
    ConfigChanged(Fingerprint),
}

impl Uptodate {
    pub fn is_satisfied(&self, recorded: Option<Fingerprint>) -> bool {
        match self {
            Uptodate::ConfigChanged(fingerprint) => recorded == Some(*fingerprint),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    /// Task family, shared with the umbrella task.
    pub basename: String,
    /// Subtask name; `None` for an umbrella task.
    pub name: Option<String>,
    pub doc: Option<String>,
    /// Files whose contents the task depends on.
    pub file_dep: Vec<Utf8PathBuf>,
    /// Ids of tasks which must complete first.
    pub task_dep: Vec<String>,
    pub actions: Vec<Action>,
    pub targets: Vec<Utf8PathBuf>,
    pub uptodate: Vec<Uptodate>,
    /// Whether the targets may be removed by a clean operation.
    pub clean: bool,
}

impl Task {
    /// An umbrella task without actions, grouping every subtask that shares
    /// its basename.
    pub fn group(basename: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            basename: basename.into(),
            name: None,
            doc: Some(doc.into()),
            file_dep: Vec::new(),
            task_dep: Vec::new(),
            actions: Vec::new(),
            targets: Vec::new(),
            uptodate: Vec::new(),
            clean: false,
        }
    }

    pub fn id(&self) -> String {
        match &self.name {
            Some(name) => format!("{}:{}", self.basename, name),
            None => self.basename.clone(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.name.is_none()
    }

    /// The configuration fingerprint this task was generated with.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.uptodate.iter().find_map(|check| match check {
            Uptodate::ConfigChanged(fingerprint) => Some(*fingerprint),
        })
    }

    /// Appends a [`Filter`] action for each command configured for the
    /// extension of one of the targets. Keys are written with their leading
    /// dot (`".css"`) and compared against the lowercased extension, so
    /// `all.min.css` is filtered by `".css"` only.
    pub fn apply_filters(mut self, filters: &BTreeMap<String, Vec<String>>) -> Self {
        let mut extra = Vec::new();

        for target in &self.targets {
            let Some(ext) = target.extension() else {
                continue;
            };

            let key = format!(".{}", ext.to_lowercase());
            if let Some(commands) = filters.get(&key) {
                extra.extend(commands.iter().map(|command| {
                    Action::Filter(Filter {
                        command: command.clone(),
                        target: target.clone(),
                    })
                }));
            }
        }

        self.actions.extend(extra);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::Hash32;

    fn task(target: &str) -> Task {
        Task {
            name: Some(target.into()),
            targets: vec![target.into()],
            clean: true,
            ..Task::group(BASENAME, "")
        }
    }

    #[test]
    fn test_ids() {
        let group = Task::group(BASENAME, "Bundle assets");
        assert_eq!(group.id(), "build_bundles");
        assert!(group.is_group());

        let sub = task("output/all.js");
        assert_eq!(sub.id(), "build_bundles:output/all.js");
        assert!(!sub.is_group());
    }

    #[test]
    fn test_uptodate() {
        let a = Fingerprint(Hash32::hash("a"));
        let b = Fingerprint(Hash32::hash("b"));
        let check = Uptodate::ConfigChanged(a);

        assert!(check.is_satisfied(Some(a)));
        assert!(!check.is_satisfied(Some(b)));
        assert!(!check.is_satisfied(None));
    }

    #[test]
    fn test_apply_filters() {
        let filters = BTreeMap::from([
            (".css".to_string(), vec!["csso %s".to_string(), "gzip -k".to_string()]),
            (".js".to_string(), vec!["uglify %s".to_string()]),
        ]);

        let css = task("output/all.css").apply_filters(&filters);
        let commands: Vec<_> = css
            .actions
            .iter()
            .map(|action| match action {
                Action::Filter(filter) => filter.command.as_str(),
                Action::Bundle(_) => "bundle",
            })
            .collect();
        assert_eq!(commands, ["csso %s", "gzip -k"]);

        let html = task("output/index.html").apply_filters(&filters);
        assert!(html.actions.is_empty());
    }

    #[test]
    fn test_filters_match_extension() {
        let filters = BTreeMap::from([
            (".css".to_string(), vec!["csso %s".to_string()]),
            (".min.css".to_string(), vec!["never %s".to_string()]),
        ]);

        let min = task("output/all.min.css").apply_filters(&filters);
        assert_eq!(min.actions.len(), 1);

        let upper = task("output/ALL.CSS").apply_filters(&filters);
        assert_eq!(upper.actions.len(), 1);

        let bare = task("output/css").apply_filters(&filters);
        assert!(bare.actions.is_empty());
    }
}
