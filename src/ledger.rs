//! Persistent record of the last successful run of every task.
//!
//! This is the task-level cache: a task whose targets exist, whose recorded
//! configuration fingerprint matches and whose dependency files hash to the
//! recorded digests is skipped without invoking the bundling engine at all.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::Fingerprint;
use crate::core::Hash32;
use crate::error::LedgerError;
use crate::task::Task;

/// File name of the ledger inside the cache folder.
pub const LEDGER_FILE: &str = "tabane.state";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub(crate) fingerprint: Option<Fingerprint>,
    pub(crate) file_dep: BTreeMap<Utf8PathBuf, Hash32>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    path: Option<Utf8PathBuf>,
    records: HashMap<String, Record>,
}

impl Ledger {
    /// A ledger which is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the ledger kept in `cache_folder`. A missing or unreadable file
    /// yields an empty ledger, which simply makes every task stale.
    pub fn load(cache_folder: &Utf8Path) -> Self {
        let path = cache_folder.join(LEDGER_FILE);

        let records = match File::open(&path) {
            Ok(file) => ciborium::from_reader(BufReader::new(file)).unwrap_or_else(|e| {
                tracing::warn!(%path, "discarding unreadable ledger: {e}");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path: Some(path),
            records,
        }
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut file = BufWriter::new(File::create(path)?);
        ciborium::into_writer(&self.records, &mut file)?;
        file.flush()?;

        Ok(())
    }

    /// The fingerprint recorded at the last successful run of task `id`.
    pub fn fingerprint(&self, id: &str) -> Option<Fingerprint> {
        self.records.get(id).and_then(|record| record.fingerprint)
    }

    /// Whether `task` can be skipped.
    pub fn is_uptodate(&self, task: &Task) -> bool {
        let Some(record) = self.records.get(&task.id()) else {
            return false;
        };

        // Nothing to compare against, so the task always runs.
        if task.uptodate.is_empty() && task.file_dep.is_empty() {
            return false;
        }

        if !task.targets.iter().all(|target| target.exists()) {
            return false;
        }

        if !task
            .uptodate
            .iter()
            .all(|check| check.is_satisfied(record.fingerprint))
        {
            return false;
        }

        // A bundle may list the same input twice; the record is keyed by path.
        let file_dep: BTreeSet<&Utf8PathBuf> = task.file_dep.iter().collect();

        record.file_dep.len() == file_dep.len()
            && file_dep.into_iter().all(|path| {
                record.file_dep.get(path).is_some_and(|digest| {
                    Hash32::hash_file(path).is_ok_and(|current| current == *digest)
                })
            })
    }

    /// Stores the state of `task` after a successful run.
    pub fn record(&mut self, task: &Task) -> Result<(), LedgerError> {
        let file_dep = task
            .file_dep
            .iter()
            .map(|path| Ok((path.clone(), Hash32::hash_file(path)?)))
            .collect::<Result<_, std::io::Error>>()?;

        let record = Record {
            fingerprint: task.fingerprint(),
            file_dep,
        };

        self.records.insert(task.id(), record);
        Ok(())
    }

    pub fn forget(&mut self, id: &str) {
        self.records.remove(id);
    }
}
