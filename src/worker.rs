//! Persistent worker threads.
//!
//! A worker waits for its range assignment, builds its dataset once, then answers
//! queries until it is told to stop. It talks to the coordinator only through its
//! command and reply channels.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;

use crate::config::Layout;
use crate::dataset::{build, Dataset};
use crate::error::{CollisionError, Result};
use crate::partition::range_end;
use crate::query::{execute, Partial, Query, Tally};

/// Coordinator to worker.
#[derive(Debug, Clone)]
pub enum Command {
    /// Every worker's start offset; the worker reads `starts[index]` up to the next one.
    Assign {
        starts: Arc<[u64]>,
        index: usize,
        total_len: u64,
    },
    Run(Query),
    Stop,
}

/// Worker to coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Built { units: usize, groups: usize },
    /// One month of the severity tally
    Cell { year: u16, month: u8, tally: Tally },
    Partial(Partial),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    AwaitingRange,
    Building,
    Idle,
    Computing,
    Terminated,
}

/// Coordinator-side handle to one worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    pub index: usize,
    pub state: WorkerState,
    commands: Sender<Command>,
    pub(crate) replies: Receiver<Reply>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Starts worker `index`, which will open `path` itself once it gets its range.
    pub fn spawn(index: usize, path: PathBuf, layout: Layout, first_year: u16) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        let worker = Worker {
            index,
            path,
            layout,
            first_year,
            state: WorkerState::Created,
        };
        let thread = thread::Builder::new()
            .name(format!("worker-{index}"))
            .spawn(move || worker.run(&command_rx, &reply_tx))?;
        Ok(Self {
            index,
            state: WorkerState::AwaitingRange,
            commands: command_tx,
            replies: reply_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| CollisionError::Worker {
            worker: self.index,
            reason: "worker is no longer listening".to_string(),
        })
    }

    /// Asks the worker to stop and waits for its thread to exit.
    pub fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        // A worker that already exited has dropped its receiver; joining still applies.
        let _ = self.commands.send(Command::Stop);
        self.state = WorkerState::Terminated;
        thread.join().map_err(|_| CollisionError::Worker {
            worker: self.index,
            reason: "panicked".to_string(),
        })
    }
}

struct Worker {
    index: usize,
    path: PathBuf,
    layout: Layout,
    first_year: u16,
    state: WorkerState,
}

impl Worker {
    fn transition(&mut self, next: WorkerState) {
        debug!("worker {}: {:?} -> {:?}", self.index, self.state, next);
        self.state = next;
    }

    fn run(mut self, commands: &Receiver<Command>, replies: &Sender<Reply>) {
        self.transition(WorkerState::AwaitingRange);
        let dataset = match commands.recv() {
            Ok(Command::Assign {
                starts,
                index,
                total_len,
            }) => {
                self.transition(WorkerState::Building);
                match self.load(&starts, index, total_len) {
                    Ok(dataset) => dataset,
                    Err(e) => {
                        let _ = replies.send(Reply::Failed(e.to_string()));
                        self.transition(WorkerState::Terminated);
                        return;
                    }
                }
            }
            Ok(Command::Run(query)) => {
                let reason = format!("query {} before range assignment", query.id());
                let _ = replies.send(Reply::Failed(reason));
                self.transition(WorkerState::Terminated);
                return;
            }
            Ok(Command::Stop) | Err(_) => {
                self.transition(WorkerState::Terminated);
                return;
            }
        };

        let (units, groups) = (dataset.unit_count(), dataset.group_count());
        debug!("worker {}: {units} units in {groups} groups", self.index);
        if replies.send(Reply::Built { units, groups }).is_err() {
            self.transition(WorkerState::Terminated);
            return;
        }
        self.transition(WorkerState::Idle);

        while let Ok(command) = commands.recv() {
            let sent = match command {
                Command::Run(query) => {
                    self.transition(WorkerState::Computing);
                    let sent = self.answer(query, &dataset, replies);
                    self.transition(WorkerState::Idle);
                    sent
                }
                Command::Assign { .. } => {
                    let reason = "range already assigned".to_string();
                    replies.send(Reply::Failed(reason)).is_ok()
                }
                Command::Stop => break,
            };
            if !sent {
                break;
            }
        }
        self.transition(WorkerState::Terminated);
    }

    fn load(&self, starts: &[u64], index: usize, total_len: u64) -> Result<Dataset> {
        let Some(&start) = starts.get(index) else {
            let reason = format!("{index} outside {} partitions", starts.len());
            return Err(CollisionError::invalid_parameter("index", reason));
        };
        let range = start..range_end(starts, index, total_len);
        let file = File::open(&self.path).map_err(|source| CollisionError::FileOpen {
            path: self.path.clone(),
            source,
        })?;
        build(&mut BufReader::new(file), range, &self.layout)
    }

    /// Sends the query's partial; the month tally goes out one cell at a time.
    /// Returns false once the coordinator has gone away.
    fn answer(&self, query: Query, dataset: &Dataset, replies: &Sender<Reply>) -> bool {
        match execute(query, dataset, self.first_year) {
            Partial::MonthSeverity(tally) => {
                for (year, month, tally) in tally.iter() {
                    if replies.send(Reply::Cell { year, month, tally }).is_err() {
                        return false;
                    }
                }
                true
            }
            partial => replies.send(Reply::Partial(partial)).is_ok(),
        }
    }
}
