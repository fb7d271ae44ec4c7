//! Ordered, single-flight speech playback.
//!
//! Sentences are spoken strictly in the order they were queued and never
//! overlap, however long each one takes to synthesize. [`PlaybackQueue`] is
//! the bare state machine; [`PlaybackScheduler`] drives it from one task,
//! calling a [`Synthesizer`] and an [`AudioOutput`] for each job in turn.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::segment::SentenceUnit;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Synthesizing,
    Playing,
    Completed,
    Failed,
    /// Dropped unplayed because a newer turn started.
    Discarded,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Discarded)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Synthesizing => "synthesizing",
            JobState::Playing => "playing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackJob {
    pub id: JobId,
    pub turn: u64,
    pub unit: SentenceUnit,
    pub state: JobState,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("job {id} cannot go from {from} to {to}")]
    InvalidTransition { id: JobId, from: JobState, to: JobState },

    #[error("no job is active")]
    Idle,

    #[error("job {0} is still active")]
    Busy(JobId),
}

/// What happened to a job, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Queued { id: JobId, text: String },
    Synthesizing { id: JobId },
    Playing { id: JobId },
    Completed { id: JobId },
    Failed { id: JobId, reason: String },
    Discarded { id: JobId },
}

/// Jobs of the current turn in queue order, plus session-wide totals.
///
/// Finished jobs of earlier turns are only kept as counts.
#[derive(Debug, Clone, Default)]
pub struct PlaybackReport {
    pub jobs: Vec<PlaybackJob>,
    pub completed: usize,
    pub failed: usize,
    pub discarded: usize,
}

impl PlaybackReport {
    pub fn count(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|job| job.state == state).count()
    }

    pub fn states(&self) -> Vec<JobState> {
        self.jobs.iter().map(|job| job.state).collect()
    }
}

/// FIFO of playback jobs with at most one active (synthesizing or playing).
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    queued: VecDeque<PlaybackJob>,
    active: Option<PlaybackJob>,
    finished: Vec<PlaybackJob>,
    completed: usize,
    failed: usize,
    discarded: usize,
    next_id: JobId,
    turn: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: SentenceUnit) -> JobId {
        self.next_id += 1;
        let id = self.next_id;
        self.queued.push_back(PlaybackJob {
            id,
            turn: self.turn,
            unit,
            state: JobState::Queued,
        });
        id
    }

    /// Jobs queued from now on belong to a new turn. Jobs still queued from
    /// earlier turns are dropped when they reach the head of the queue.
    pub fn begin_turn(&mut self) -> u64 {
        self.finished.clear();
        self.turn += 1;
        self.turn
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn active(&self) -> Option<&PlaybackJob> {
        self.active.as_ref()
    }

    /// Remove queued jobs of earlier turns from the head of the queue.
    pub fn discard_stale(&mut self) -> Vec<JobId> {
        let mut dropped = Vec::new();
        while let Some(job) = self.queued.front() {
            if job.turn >= self.turn {
                break;
            }
            if let Some(mut job) = self.queued.pop_front() {
                job.state = JobState::Discarded;
                self.discarded += 1;
                dropped.push(job.id);
                self.finished.push(job);
            }
        }
        dropped
    }

    /// Move the head job to Synthesizing. Only allowed while idle.
    pub fn start_next(&mut self) -> Result<Option<&PlaybackJob>, PlaybackError> {
        if let Some(active) = &self.active {
            return Err(PlaybackError::Busy(active.id));
        }
        self.discard_stale();
        let Some(mut job) = self.queued.pop_front() else {
            return Ok(None);
        };
        job.state = JobState::Synthesizing;
        self.active = Some(job);
        Ok(self.active.as_ref())
    }

    pub fn mark_playing(&mut self) -> Result<JobId, PlaybackError> {
        let job = self.active.as_mut().ok_or(PlaybackError::Idle)?;
        if job.state != JobState::Synthesizing {
            return Err(PlaybackError::InvalidTransition {
                id: job.id,
                from: job.state,
                to: JobState::Playing,
            });
        }
        job.state = JobState::Playing;
        Ok(job.id)
    }

    pub fn complete(&mut self) -> Result<JobId, PlaybackError> {
        self.finish(JobState::Completed, &[JobState::Playing])
    }

    pub fn fail(&mut self) -> Result<JobId, PlaybackError> {
        self.finish(JobState::Failed, &[JobState::Synthesizing, JobState::Playing])
    }

    fn finish(&mut self, to: JobState, allowed_from: &[JobState]) -> Result<JobId, PlaybackError> {
        let job = self.active.as_ref().ok_or(PlaybackError::Idle)?;
        if !allowed_from.contains(&job.state) {
            return Err(PlaybackError::InvalidTransition {
                id: job.id,
                from: job.state,
                to,
            });
        }
        let mut job = self.active.take().ok_or(PlaybackError::Idle)?;
        job.state = to;
        match to {
            JobState::Completed => self.completed += 1,
            _ => self.failed += 1,
        }
        let id = job.id;
        self.finished.push(job);
        Ok(id)
    }

    pub fn report(&self) -> PlaybackReport {
        let mut jobs = self.finished.clone();
        jobs.extend(self.active.iter().cloned());
        jobs.extend(self.queued.iter().cloned());
        jobs.sort_by_key(|job| job.id);
        PlaybackReport {
            jobs,
            completed: self.completed,
            failed: self.failed,
            discarded: self.discarded,
        }
    }
}

/// Resolves when the output device finishes playing one clip.
pub type PlaybackEnd = BoxFuture<'static, Result<(), ClientError>>;

/// Turns a sentence into WAV audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ClientError>;
}

/// Plays WAV audio.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Start playing `wav`. An error here means playback never started; the
    /// returned future reports how playback ended.
    async fn start(&self, wav: Vec<u8>) -> Result<PlaybackEnd, ClientError>;
}

/// User-controlled switch for speaking answers aloud.
#[derive(Debug, Clone)]
pub struct SpeechToggle(Arc<AtomicBool>);

impl SpeechToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

struct Shared {
    queue: Mutex<PlaybackQueue>,
    wake: Notify,
    closed: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<PlaybackEvent>>>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, PlaybackQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlaybackEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            if tx.send(event).is_err() {
                // The subscriber went away; stop producing.
                *events = None;
            }
        }
    }
}

pub struct PlaybackScheduler;

impl PlaybackScheduler {
    /// Start the playback task and return the handle that feeds it.
    pub fn spawn(synthesizer: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) -> PlaybackHandle {
        let shared = Arc::new(Shared {
            queue: Mutex::new(PlaybackQueue::new()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            events: Mutex::new(None),
        });
        let task = tokio::spawn(run(shared.clone(), synthesizer, output));
        PlaybackHandle { shared, task }
    }
}

pub struct PlaybackHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl PlaybackHandle {
    pub fn enqueue(&self, unit: SentenceUnit) -> JobId {
        let text = unit.as_str().to_string();
        let id = self.shared.queue().push(unit);
        self.shared.emit(PlaybackEvent::Queued { id, text });
        self.shared.wake.notify_one();
        id
    }

    pub fn begin_turn(&self) -> u64 {
        self.shared.queue().begin_turn()
    }

    /// Receive every event from now on. Events are only produced while a
    /// subscriber exists; a new subscription replaces the previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    pub fn report(&self) -> PlaybackReport {
        self.shared.queue().report()
    }

    /// Stop accepting work, let everything already queued play out, and
    /// return the final state of every job.
    pub async fn shutdown(self) -> PlaybackReport {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake.notify_one();
        if let Err(e) = self.task.await {
            warn!("Playback task ended abnormally: {}", e);
        }
        self.shared.queue().report()
    }
}

async fn run(shared: Arc<Shared>, synthesizer: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) {
    loop {
        let next = {
            let mut queue = shared.queue();
            for id in queue.discard_stale() {
                debug!("Discarding job {} from an earlier turn", id);
                shared.emit(PlaybackEvent::Discarded { id });
            }
            let next = match queue.start_next() {
                Ok(Some(job)) => Some((job.id, job.unit.as_str().to_string())),
                Ok(None) => None,
                Err(e) => {
                    warn!("Playback queue out of step: {}", e);
                    None
                }
            };
            next
        };

        match next {
            Some((id, text)) => play_job(&shared, synthesizer.as_ref(), output.as_ref(), id, &text).await,
            None if shared.closed.load(Ordering::Acquire) => break,
            None => shared.wake.notified().await,
        }
    }
}

async fn play_job(shared: &Shared, synthesizer: &dyn Synthesizer, output: &dyn AudioOutput, id: JobId, text: &str) {
    shared.emit(PlaybackEvent::Synthesizing { id });

    let outcome = async {
        let wav = synthesizer.synthesize(text).await?;
        let end = output.start(wav).await?;
        if let Err(e) = shared.queue().mark_playing() {
            warn!("Playback queue out of step: {}", e);
        }
        shared.emit(PlaybackEvent::Playing { id });
        end.await
    }
    .await;

    let mut queue = shared.queue();
    match outcome {
        Ok(()) => {
            if let Err(e) = queue.complete() {
                warn!("Playback queue out of step: {}", e);
            }
            shared.emit(PlaybackEvent::Completed { id });
        }
        Err(e) => {
            warn!("Skipping sentence {}: {}", id, e);
            if let Err(e) = queue.fail() {
                warn!("Playback queue out of step: {}", e);
            }
            shared.emit(PlaybackEvent::Failed {
                id,
                reason: e.to_string(),
            });
        }
    }
}
