//! Drain loop of the player.
//!
//! ```text
//!              enqueue (idle)                 fetched
//!   ┌──────┐ ─────────────────► ┌──────────┐ ─────────► ┌───────────┐
//!   │ Idle │                    │ Fetching │            │ Appending │
//!   └──────┘ ◄───────────────── └──────────┘ ◄───────── └───────────┘
//!       ▲      queue empty        │  ▲  │ retry      append complete
//!       │                         │  └──┘            (queue not empty)
//!       │    input closed         ▼
//!       └───────────────────► EndOfStream
//! ```
//!
//! [DrainController] performs no I/O. Every event returns the [Command] the
//! driver has to execute next, so at most one fetch or append is ever
//! outstanding.

use bytes::Bytes;

use crate::{
    config::PlayerConfig,
    error::NagareError,
    locator::FragmentLocator,
    queue::{FragmentQueue, PushOutcome},
};

#[derive(Debug, Clone, PartialEq)]
pub enum DrainState {
    Idle,
    Fetching(FragmentLocator),
    Appending(FragmentLocator),
    EndOfStream,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fetch(FragmentLocator),
    Append {
        locator: FragmentLocator,
        bytes: Bytes,
        offset: f64,
    },
    EndOfStream,
}

/// Counts of what happened to the locators a session has seen.
///
/// Only failures are kept by name, a live session would otherwise grow these
/// without bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub appended: usize,
    pub last_appended: Option<FragmentLocator>,
    /// Rejected by dedup or queue overflow, never fetched.
    pub dropped: usize,
    /// Fetch failed after all retries.
    pub failed: Vec<FragmentLocator>,
}

#[derive(Debug)]
pub struct DrainController {
    queue: FragmentQueue,
    downloading: bool,
    state: DrainState,
    input_closed: bool,

    retries: u32,
    retries_left: u32,

    report: SessionReport,
}

impl DrainController {
    pub fn new(queue: FragmentQueue, retries: u32) -> Self {
        Self {
            queue,
            downloading: false,
            state: DrainState::Idle,
            input_closed: false,
            retries,
            retries_left: retries,
            report: SessionReport::default(),
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        let mut queue = FragmentQueue::new().with_dedup(config.dedup);
        if let Some(capacity) = config.queue_capacity {
            queue = queue.with_capacity(capacity, config.overflow);
        }
        Self::new(queue, config.retries)
    }

    pub fn state(&self) -> &DrainState {
        &self.state
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading
    }

    pub fn queue(&self) -> &FragmentQueue {
        &self.queue
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, DrainState::EndOfStream | DrainState::Failed)
    }

    /// Adds a locator to the tail of the queue, starting a fetch when idle.
    pub fn enqueue(&mut self, locator: FragmentLocator) -> Option<Command> {
        if self.is_finished() {
            tracing::warn!("Session already finished, ignoring {locator}");
            return None;
        }

        match self.queue.push(locator.clone()) {
            PushOutcome::Queued => {
                tracing::debug!("{locator} queued, {} pending", self.queue.len());
            }
            PushOutcome::Duplicate => {
                tracing::debug!("{locator} was announced before, skipped");
                self.report.dropped += 1;
            }
            PushOutcome::DroppedNewest => {
                tracing::warn!("Queue is full, dropping incoming {locator}");
                self.report.dropped += 1;
            }
            PushOutcome::DroppedOldest(dropped) => {
                tracing::warn!("Queue is full, dropping oldest {dropped}");
                self.report.dropped += 1;
            }
        }

        if self.downloading {
            None
        } else {
            self.drain_next()
        }
    }

    /// Marks the input as exhausted. The session ends once the queue drains.
    pub fn close_input(&mut self) -> Option<Command> {
        if self.input_closed || self.is_finished() {
            return None;
        }

        self.input_closed = true;
        if self.downloading {
            None
        } else {
            self.drain_next()
        }
    }

    pub fn on_fetch_complete(&mut self, bytes: Bytes, buffered_end: Option<f64>) -> Command {
        let DrainState::Fetching(locator) = &self.state else {
            panic!("fetch completed while {:?}", self.state);
        };
        let locator = locator.clone();

        // the first fragment starts the timeline, later ones follow the sink's buffered extent
        let offset = buffered_end.unwrap_or(0.);
        self.state = DrainState::Appending(locator.clone());

        Command::Append {
            locator,
            bytes,
            offset,
        }
    }

    /// Retries the in-flight locator while retries remain, then drops it and
    /// resumes draining.
    pub fn on_fetch_failed(&mut self, error: &NagareError) -> Option<Command> {
        let DrainState::Fetching(locator) = &self.state else {
            panic!("fetch failed while {:?}", self.state);
        };
        let locator = locator.clone();

        if self.retries_left > 0 {
            self.retries_left -= 1;
            tracing::warn!("Fetching {locator} failed, retry later. {error}");
            return Some(Command::Fetch(locator));
        }

        tracing::error!("Fetching {locator} failed, max retries exceed, drop. {error}");
        self.report.failed.push(locator);
        self.drain_next()
    }

    pub fn on_append_complete(&mut self) -> Option<Command> {
        let DrainState::Appending(locator) = &self.state else {
            panic!("append completed while {:?}", self.state);
        };

        self.report.appended += 1;
        self.report.last_appended = Some(locator.clone());
        self.drain_next()
    }

    /// Append errors are fatal, nothing is appended afterwards.
    pub fn on_append_failed(&mut self, error: &NagareError) {
        tracing::error!("Append failed, stopping session. {error}");
        self.downloading = false;
        self.state = DrainState::Failed;
    }

    /// Returns the controller to a fresh session.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.downloading = false;
        self.state = DrainState::Idle;
        self.input_closed = false;
        self.retries_left = self.retries;
        self.report = SessionReport::default();
    }

    fn drain_next(&mut self) -> Option<Command> {
        match self.queue.pop() {
            Some(locator) => {
                self.downloading = true;
                self.retries_left = self.retries;
                self.state = DrainState::Fetching(locator.clone());
                Some(Command::Fetch(locator))
            }
            None if self.input_closed => {
                self.downloading = false;
                self.state = DrainState::EndOfStream;
                Some(Command::EndOfStream)
            }
            None => {
                self.downloading = false;
                self.state = DrainState::Idle;
                None
            }
        }
    }
}
