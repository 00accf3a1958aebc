//! The coordinator: plans partitions, owns the worker pool, and reduces partial
//! results as they arrive from whichever worker finishes first.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Select;
use log::{debug, info, warn};
use memmap2::Mmap;

use crate::config::{Config, TALLY_YEARS};
use crate::error::{CollisionError, Result};
use crate::partition::plan;
use crate::query::{Answer, Query, Reducer, MONTHS};
use crate::worker::{Command, Reply, WorkerHandle, WorkerState};

/// Record and group totals reported once every worker has built its dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub units: usize,
    pub groups: usize,
    /// `(units, groups)` per worker, in partition order
    pub per_worker: Vec<(usize, usize)>,
}

pub struct Coordinator {
    config: Config,
    workers: Vec<WorkerHandle>,
    summary: BuildSummary,
    /// Set once a run fails; the workers are stopped at that point
    failed: bool,
}

impl Coordinator {
    /// Plans the partitions of `path`, starts one worker per partition, and waits
    /// until every worker has built its dataset.
    pub fn start(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file_open = |source| CollisionError::FileOpen {
            path: path.clone(),
            source,
        };
        let file = File::open(&path).map_err(file_open)?;
        // SAFETY: the file is only read, and only while planning.
        let mmap = unsafe { Mmap::map(&file) }.map_err(file_open)?;
        let total_len = mmap.len() as u64;
        let starts: Arc<[u64]> = plan(&mmap, &config.layout, config.workers)?.into();
        drop(mmap);

        let (layout, first_year) = (config.layout, config.first_year);
        let mut coordinator = Self {
            config,
            workers: Vec::with_capacity(starts.len()),
            summary: BuildSummary::default(),
            failed: false,
        };
        for index in 0..starts.len() {
            let worker = WorkerHandle::spawn(index, path.clone(), layout, first_year)?;
            worker.send(Command::Assign {
                starts: Arc::clone(&starts),
                index,
                total_len,
            })?;
            coordinator.workers.push(worker);
        }
        coordinator.set_state(WorkerState::Building);

        let mut per_worker = vec![(0, 0); starts.len()];
        gather(&coordinator.workers, starts.len(), |index, reply| match reply {
            Reply::Built { units, groups } => {
                debug!("worker {index} built {units} units in {groups} groups");
                per_worker[index] = (units, groups);
                Ok(())
            }
            other => Err(unexpected(index, &other)),
        })?;
        coordinator.set_state(WorkerState::Idle);

        coordinator.summary = BuildSummary {
            units: per_worker.iter().map(|(u, _)| u).sum(),
            groups: per_worker.iter().map(|(_, g)| g).sum(),
            per_worker,
        };
        info!(
            "found {} collisions in {} records across {} workers",
            coordinator.summary.groups,
            coordinator.summary.units,
            coordinator.workers.len()
        );
        Ok(coordinator)
    }

    #[must_use]
    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    #[must_use]
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(|w| w.state).collect()
    }

    /// Broadcasts `query` and reduces the replies in arrival order.
    ///
    /// A failed run stops every worker; any later run returns
    /// [`CollisionError::Stopped`].
    pub fn run(&mut self, query: Query) -> Result<Answer> {
        if self.failed {
            return Err(CollisionError::Stopped);
        }
        info!("running query {}", query.id());
        let answer = self.broadcast(query);
        if let Err(e) = &answer {
            warn!("query {} failed, stopping workers: {e}", query.id());
            self.failed = true;
            let _ = self.stop_all();
        }
        answer
    }

    fn broadcast(&mut self, query: Query) -> Result<Answer> {
        for worker in &self.workers {
            worker.send(Command::Run(query))?;
        }
        self.set_state(WorkerState::Computing);

        let expected = match query {
            Query::MonthSeverity => self.workers.len() * TALLY_YEARS * MONTHS,
            _ => self.workers.len(),
        };
        let mut reducer = Reducer::new(query, self.config.first_year);
        gather(&self.workers, expected, |index, reply| match reply {
            Reply::Cell { year, month, tally } => reducer.add_cell(year, month, tally),
            Reply::Partial(partial) => reducer.add(index, partial),
            other => Err(unexpected(index, &other)),
        })?;
        self.set_state(WorkerState::Idle);
        Ok(reducer.finish())
    }

    /// Stops every worker and waits for them to exit.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_all()
    }

    fn stop_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for worker in &mut self.workers {
            if let Err(e) = worker.stop() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn set_state(&mut self, state: WorkerState) {
        for worker in &mut self.workers {
            worker.state = state;
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.stop_all();
    }
}

/// Receives `expected` replies from whichever workers answer first.
fn gather<F>(workers: &[WorkerHandle], expected: usize, mut on_reply: F) -> Result<()>
where
    F: FnMut(usize, Reply) -> Result<()>,
{
    let mut select = Select::new();
    for worker in workers {
        select.recv(&worker.replies);
    }
    for _ in 0..expected {
        let oper = select.select();
        let index = oper.index();
        let reply = oper.recv(&workers[index].replies).map_err(|_| CollisionError::Worker {
            worker: index,
            reason: "disconnected before replying".to_string(),
        })?;
        if let Reply::Failed(reason) = reply {
            return Err(CollisionError::Worker {
                worker: index,
                reason,
            });
        }
        on_reply(index, reply)?;
    }
    Ok(())
}

fn unexpected(index: usize, reply: &Reply) -> CollisionError {
    CollisionError::Worker {
        worker: index,
        reason: format!("unexpected reply {reply:?}"),
    }
}
