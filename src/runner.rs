//! Optional convenience executor for generated tasks.
//!
//! The bundling contract ends at the [`Task`] descriptors and scheduling
//! belongs to the host's build engine; this runner only lets a site be
//! bundled without one. It orders tasks by their `task_dep` edges, skips
//! tasks the [`Ledger`] reports as up to date, and runs the remaining tasks
//! of each dependency layer in parallel. Bundle tasks never share outputs,
//! so no locking is involved.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use camino::Utf8PathBuf;
use indicatif::ProgressStyle;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::ledger::Ledger;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// What happened during a [`run`].
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Tasks whose actions ran, by id.
    pub executed: HashMap<String, TaskExecution>,
    /// Ids of tasks skipped as up to date.
    pub skipped: Vec<String>,
}

/// Runs every stale task in `tasks` and updates `ledger` accordingly.
///
/// Upstream ids which are not part of `tasks` are assumed to be satisfied by
/// the host. The ledger is saved once all tasks have completed.
pub fn run(tasks: &[Task], ledger: &mut Ledger) -> anyhow::Result<Diagnostics> {
    let graph = build_graph(tasks)?;
    let layers = layers(&graph)?;

    let root_span = tracing::span!(Level::INFO, "bundling");
    root_span.pb_set_length(tasks.len() as u64);
    root_span.pb_set_style(
        &ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    root_span.pb_set_message("Bundling assets...");
    let _enter = root_span.enter();

    let start = Instant::now();
    let mut diagnostics = Diagnostics::default();

    for layer in layers {
        let mut stale = Vec::new();

        for &index in &layer {
            let task = &tasks[graph[index]];

            if task.is_group() {
                continue;
            }

            if ledger.is_uptodate(task) {
                tracing::debug!(task = %task.id(), "up to date");
                diagnostics.skipped.push(task.id());
            } else {
                stale.push(task);
            }
        }

        let results: Vec<_> = stale
            .par_iter()
            .map(|task| {
                let span = tracing::span!(parent: &root_span, Level::INFO, "task", id = %task.id());
                let _enter = span.enter();
                (task, execute(task))
            })
            .collect();

        for (task, result) in results {
            let execution = result?;
            ledger.record(task)?;
            diagnostics.executed.insert(task.id(), execution);
        }

        root_span.pb_inc(layer.len() as u64);
    }

    ledger.save()?;

    tracing::info!(
        executed = diagnostics.executed.len(),
        skipped = diagnostics.skipped.len(),
        "bundling complete {}",
        console::style(format!("(+{}ms)", start.elapsed().as_millis())).blue()
    );

    Ok(diagnostics)
}

/// Removes the targets of every task marked as cleanable and forgets those
/// tasks in `ledger`. Returns the removed paths.
pub fn clean(tasks: &[Task], ledger: &mut Ledger) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let mut removed = Vec::new();

    for task in tasks.iter().filter(|task| task.clean) {
        for target in &task.targets {
            if target.is_file() {
                std::fs::remove_file(target).with_context(|| format!("couldn't remove {target}"))?;
                removed.push(target.clone());
            }
        }

        ledger.forget(&task.id());
    }

    ledger.save()?;
    Ok(removed)
}

fn execute(task: &Task) -> anyhow::Result<TaskExecution> {
    let start = Instant::now();

    for action in &task.actions {
        action
            .run()
            .with_context(|| format!("Task '{}' failed", task.id()))?;
    }

    Ok(TaskExecution {
        start,
        duration: start.elapsed(),
    })
}

/// Graph of task indices. An edge points from a task to the task which has
/// to wait for it; umbrella tasks wait for all tasks sharing their basename.
fn build_graph(tasks: &[Task]) -> anyhow::Result<DiGraph<usize, ()>> {
    let mut graph = DiGraph::new();
    let mut ids = HashMap::new();

    for (i, task) in tasks.iter().enumerate() {
        let index = graph.add_node(i);

        if ids.insert(task.id(), index).is_some() {
            anyhow::bail!("Duplicate task id '{}'", task.id());
        }
    }

    for (i, task) in tasks.iter().enumerate() {
        let index = NodeIndex::new(i);

        for dep in &task.task_dep {
            match ids.get(dep) {
                Some(&upstream) => {
                    graph.add_edge(upstream, index, ());
                }
                None => tracing::debug!(task = %task.id(), upstream = %dep, "external upstream task"),
            }
        }

        if !task.is_group()
            && let Some(&group) = ids.get(&task.basename)
        {
            graph.add_edge(index, group, ());
        }
    }

    Ok(graph)
}

/// Splits the graph into layers; every task only depends on earlier layers.
fn layers(graph: &DiGraph<usize, ()>) -> anyhow::Result<Vec<Vec<NodeIndex>>> {
    let order = petgraph::algo::toposort(graph, None)
        .map_err(|cycle| anyhow::anyhow!("Cycle detected at task #{}", graph[cycle.node_id()]))?;

    let mut depth = vec![0usize; graph.node_count()];
    let mut layers: Vec<Vec<NodeIndex>> = Vec::new();

    for index in order {
        let level = graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .map(|dep| depth[dep.index()] + 1)
            .max()
            .unwrap_or(0);

        depth[index.index()] = level;

        if layers.len() <= level {
            layers.resize_with(level + 1, Vec::new);
        }
        layers[level].push(index);
    }

    Ok(layers)
}
