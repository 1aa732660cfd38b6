//! Command worker: a background session thread that owns the debugger connection.
//!
//! Callers submit batches of [`SemanticCommand`] without blocking. The session thread is spawned
//! lazily by the first submitted batch, opens the connection, executes queued batches one by one
//! and hands every batch result list to the result sink.

pub mod command;
pub mod params;
pub mod result;
pub mod sequencer;

pub use command::{Command, SemanticCommand};
pub use params::LoadConfig;
pub use result::WorkResult;

use crate::config::Config;
use crate::rpc::Client;
use itertools::Itertools;
use serde_json::{Map, Value};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use strum_macros::Display;

/// Receives the result list of every executed batch.
pub type ResultSink = Arc<dyn Fn(Vec<WorkResult>) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Stopped,
    Starting,
    Ready,
    Stopping,
}

enum Job {
    Batch(Vec<SemanticCommand>),
    Stop,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live, stopping or just finished session thread.
struct Session {
    state: Arc<Mutex<SessionState>>,
    jobs: Sender<Job>,
    thread: JoinHandle<()>,
}

impl Session {
    /// Put a job into the session queue, the job is returned back if the session is winding down.
    fn enqueue(&self, job: Job) -> Result<(), Job> {
        let state = lock(&self.state);
        if matches!(*state, SessionState::Stopping | SessionState::Stopped) {
            return Err(job);
        }
        self.jobs.send(job).map_err(|e| e.0)
    }

    fn is_winding_down(&self) -> bool {
        matches!(
            *lock(&self.state),
            SessionState::Stopping | SessionState::Stopped
        )
    }
}

fn join_thread(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        log::error!(target: "worker", "session thread panicked");
    }
}

pub struct Worker {
    config: Arc<Config>,
    sink: ResultSink,
    session: Mutex<Option<Session>>,
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    /// Create a worker that delivers results into `callback`, the callback is called
    /// from the session thread.
    pub fn new(config: Config, callback: impl Fn(Vec<WorkResult>) + Send + Sync + 'static) -> Self {
        Self {
            config: Arc::new(config),
            sink: Arc::new(callback),
            session: Mutex::default(),
            retired: Mutex::default(),
        }
    }

    /// Create a worker together with a channel of batch results, the receiver is drained by
    /// the caller on its own thread.
    pub fn with_channel(config: Config) -> (Self, Receiver<Vec<WorkResult>>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let worker = Self::new(config, move |results| {
            if lock(&tx).send(results).is_err() {
                log::debug!(target: "worker", "result receiver is gone, results dropped");
            }
        });
        (worker, rx)
    }

    /// State of the current session. A stopped session stays [`SessionState::Stopping`] until
    /// its thread closes the connection.
    pub fn state(&self) -> SessionState {
        lock(&self.session)
            .as_ref()
            .map(|session| *lock(&session.state))
            .unwrap_or(SessionState::Stopped)
    }

    /// Submit a single command.
    pub fn submit_one(&self, cmd: &str, parms: Option<Map<String, Value>>) {
        self.submit(vec![SemanticCommand::new(cmd, parms)])
    }

    /// Queue a batch for execution, never blocks. A new session is started if there is no live one.
    pub fn submit(&self, batch: Vec<SemanticCommand>) {
        if batch.is_empty() {
            log::error!(target: "worker", "call worker with empty batch");
            return;
        }
        log::debug!(
            target: "worker",
            "submit batch [{}]",
            batch.iter().map(|command| command.cmd.as_str()).join(", ")
        );

        let mut slot = lock(&self.session);
        let mut job = Job::Batch(batch);
        if let Some(session) = slot.as_ref() {
            match session.enqueue(job) {
                Ok(()) => return,
                Err(rejected) => job = rejected,
            }
        }

        log::warn!(target: "worker", "worker not started, put requests to the queue");
        if let Some(finished) = slot.take() {
            self.retire(finished.thread);
        }
        let rejected = match self.spawn() {
            Ok(session) => {
                let rejected = session.enqueue(job).err();
                *slot = Some(session);
                rejected
            }
            Err(e) => {
                log::error!(target: "worker", "spawn session thread: {e}");
                Some(job)
            }
        };
        drop(slot);

        if let Some(Job::Batch(batch)) = rejected {
            self.reject(batch);
        }
    }

    fn spawn(&self) -> std::io::Result<Session> {
        let state = Arc::new(Mutex::new(SessionState::Starting));
        let (jobs, queue) = mpsc::channel();
        let thread = std::thread::Builder::new().name("dlvc-worker".to_string()).spawn({
            let config = self.config.clone();
            let sink = self.sink.clone();
            let state = state.clone();
            move || session_thread(&config, &sink, &state, queue)
        })?;
        Ok(Session {
            state,
            jobs,
            thread,
        })
    }

    fn reject(&self, batch: Vec<SemanticCommand>) {
        (self.sink)(answer_unavailable(&batch));
    }

    /// Keep the thread of a replaced session, threads that already exited are released.
    fn retire(&self, thread: JoinHandle<()>) {
        let finished: Vec<JoinHandle<()>> = {
            let mut retired = lock(&self.retired);
            retired.push(thread);
            let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut *retired)
                .into_iter()
                .partition(|thread| thread.is_finished());
            *retired = running;
            finished
        };
        finished.into_iter().for_each(join_thread);
    }

    /// Ask the session to finish its queue and close the connection. Does nothing if no session
    /// is running.
    pub fn stop(&self) {
        let slot = lock(&self.session);
        let Some(session) = slot.as_ref() else {
            return;
        };
        {
            let mut state = lock(&session.state);
            if matches!(*state, SessionState::Stopping | SessionState::Stopped) {
                return;
            }
            *state = SessionState::Stopping;
        }
        if session.jobs.send(Job::Stop).is_ok() {
            log::debug!(target: "worker", "stop requested");
        }
    }

    /// Wait until every stopped session thread exits. A running session is left alone.
    pub fn join(&self) {
        let mut threads = std::mem::take(&mut *lock(&self.retired));
        {
            let mut slot = lock(&self.session);
            if slot.as_ref().is_some_and(Session::is_winding_down) {
                threads.extend(slot.take().map(|session| session.thread));
            }
        }
        threads.into_iter().for_each(join_thread);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn answer_unavailable(batch: &[SemanticCommand]) -> Vec<WorkResult> {
    batch
        .iter()
        .map(|command| WorkResult::unavailable(&command.cmd, command.parms_value()))
        .collect()
}

fn session_thread(
    config: &Config,
    sink: &ResultSink,
    state: &Mutex<SessionState>,
    jobs: Receiver<Job>,
) {
    log::debug!(target: "worker", "start worker");
    let mut client = Client::from_config(config);

    match client.open(&config.host, config.port) {
        Ok(()) => {
            {
                let mut state = lock(state);
                if *state == SessionState::Starting {
                    *state = SessionState::Ready;
                }
            }
            serve(&mut client, config, sink, state, &jobs);
        }
        Err(e) => {
            log::error!(target: "worker", "open session {}:{}: {e}", config.host, config.port)
        }
    }
    client.close();

    let leftover: Vec<Vec<SemanticCommand>> = {
        let mut state = lock(state);
        *state = SessionState::Stopped;
        jobs.try_iter()
            .filter_map(|job| match job {
                Job::Batch(batch) => Some(batch),
                Job::Stop => None,
            })
            .collect()
    };
    drop(jobs);

    for batch in leftover {
        sink(answer_unavailable(&batch));
    }
    log::debug!(target: "worker", "stop worker");
}

fn serve(
    client: &mut Client,
    config: &Config,
    sink: &ResultSink,
    state: &Mutex<SessionState>,
    jobs: &Receiver<Job>,
) {
    while let Ok(job) = jobs.recv() {
        let batch = match job {
            Job::Batch(batch) => batch,
            Job::Stop => break,
        };

        let outcome = sequencer::run(client, config, &batch);
        sink(outcome.results);

        if outcome.fatal || !client.is_open() {
            log::warn!(target: "worker", "debug session is broken, terminate it");
            *lock(state) = SessionState::Stopping;
            break;
        }
    }
}
