// crates/link-locker-core/src/runtime/completion.rs
// ============================================================================
// Module: Link Locker Completion State Machine
// Description: Click identifiers and the per-task-instance lifecycle.
// Purpose: Enforce minimum dwell time and single completion per dispatch.
// Dependencies: crate::core, rand, url
// ============================================================================

//! ## Overview
//! A task instance moves `Idle -> Dispatched -> Waiting -> Completed`. The
//! click identifier minted at dispatch embeds the locker, the task, and the
//! dispatch time, so the server can rebuild the instance from the identifier
//! alone and refuse completions that arrive before the dwell time elapses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::core::LockerId;
use crate::core::Task;
use crate::core::TaskId;
use crate::core::Timestamp;
use crate::core::time::MILLIS_PER_SECOND;

// ============================================================================
// SECTION: Click Identifiers
// ============================================================================

/// Separator between click identifier segments.
const CLICK_SEPARATOR: char = '.';
/// Random bytes in the click nonce.
const NONCE_BYTES: usize = 8;

/// Click identifier errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClickIdError {
    /// An identifier segment is empty or contains the separator.
    #[error("identifier cannot be embedded in a click id: {0}")]
    UnsafeSegment(String),
    /// The click identifier is malformed.
    #[error("malformed click id: {0}")]
    Malformed(String),
    /// The ad URL cannot carry a tracking parameter.
    #[error("invalid ad url: {0}")]
    InvalidUrl(String),
}

/// Click identifier minted at dispatch.
///
/// # Invariants
/// - Renders as `{locker}.{task}.{unix_millis}.{16 hex}`.
/// - Locker and task identifiers never contain `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClickId {
    /// Locker the task was dispatched from.
    pub locker_id: LockerId,
    /// Dispatched task.
    pub task_id: TaskId,
    /// Dispatch time.
    pub dispatched_at: Timestamp,
    /// Random component.
    pub nonce: String,
}

impl ClickId {
    /// Mints a click identifier with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`ClickIdError::UnsafeSegment`] when an identifier is empty or
    /// contains the separator.
    pub fn mint(
        locker_id: &LockerId,
        task_id: &TaskId,
        dispatched_at: Timestamp,
    ) -> Result<Self, ClickIdError> {
        check_segment(locker_id.as_str())?;
        check_segment(task_id.as_str())?;
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Ok(Self {
            locker_id: locker_id.clone(),
            task_id: task_id.clone(),
            dispatched_at,
            nonce: hex::encode(bytes),
        })
    }

    /// Parses a rendered click identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClickIdError::Malformed`] when the input is not a click id.
    pub fn parse(value: &str) -> Result<Self, ClickIdError> {
        let malformed = || ClickIdError::Malformed(value.to_string());
        let parts: Vec<&str> = value.split(CLICK_SEPARATOR).collect();
        let [locker, task, millis, nonce] = parts.as_slice() else {
            return Err(malformed());
        };
        if locker.is_empty() || task.is_empty() {
            return Err(malformed());
        }
        let millis: i64 = millis.parse().map_err(|_| malformed())?;
        if nonce.len() != NONCE_BYTES * 2 || !nonce.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        Ok(Self {
            locker_id: LockerId::new(*locker),
            task_id: TaskId::new(*task),
            dispatched_at: Timestamp::from_unix_millis(millis),
            nonce: nonce.to_ascii_lowercase(),
        })
    }

    /// Appends this identifier to an ad URL as `param`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`ClickIdError::InvalidUrl`] when the URL is not absolute.
    pub fn attach_to_url(&self, ad_url: &str, param: &str) -> Result<String, ClickIdError> {
        let mut url = Url::parse(ad_url).map_err(|err| ClickIdError::InvalidUrl(err.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(ClickIdError::InvalidUrl(ad_url.to_string()));
        }
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != param)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter())
            .append_pair(param, &self.to_string());
        Ok(url.into())
    }
}

impl fmt::Display for ClickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{CLICK_SEPARATOR}{}{CLICK_SEPARATOR}{}{CLICK_SEPARATOR}{}",
            self.locker_id,
            self.task_id,
            self.dispatched_at.as_unix_millis(),
            self.nonce
        )
    }
}

/// Rejects identifiers that cannot be embedded in a click id.
fn check_segment(segment: &str) -> Result<(), ClickIdError> {
    if segment.is_empty() || segment.contains(CLICK_SEPARATOR) {
        return Err(ClickIdError::UnsafeSegment(segment.to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Task Instance State Machine
// ============================================================================

/// Lifecycle state of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Offered but not activated.
    Idle,
    /// Activated; the click id is minted.
    Dispatched,
    /// Dwell timer running.
    Waiting,
    /// Terminal.
    Completed,
}

/// Completion state machine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Completion attempted before dispatch.
    #[error("task instance was not dispatched")]
    NotDispatched,
    /// Dispatch attempted twice.
    #[error("task instance was already dispatched")]
    AlreadyDispatched,
    /// Completion attempted twice.
    #[error("task instance already completed")]
    AlreadyCompleted,
    /// Completion attempted before the dwell time elapsed.
    #[error("completed too early: {remaining_millis} ms remaining")]
    TooEarly {
        /// Milliseconds left in the dwell timer.
        remaining_millis: i64,
    },
    /// Click identifier could not be minted.
    #[error(transparent)]
    Click(#[from] ClickIdError),
}

/// One visitor's attempt at one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInstance {
    /// Locker the task is offered on.
    locker_id: LockerId,
    /// Offered task.
    task_id: TaskId,
    /// Dwell time, already clamped.
    completion_time_seconds: u32,
    /// Current state.
    state: TaskState,
    /// Click identifier once dispatched.
    click_id: Option<ClickId>,
    /// Completion time once completed.
    completed_at: Option<Timestamp>,
}

impl TaskInstance {
    /// Creates an idle instance for a task offered on a locker.
    #[must_use]
    pub fn new(locker_id: LockerId, task: &Task) -> Self {
        Self {
            locker_id,
            task_id: task.task_id.clone(),
            completion_time_seconds: task.effective_completion_time_seconds(),
            state: TaskState::Idle,
            click_id: None,
            completed_at: None,
        }
    }

    /// Rebuilds a waiting instance from a click id minted at dispatch.
    #[must_use]
    pub fn resume(click_id: ClickId, task: &Task) -> Self {
        Self {
            locker_id: click_id.locker_id.clone(),
            task_id: task.task_id.clone(),
            completion_time_seconds: task.effective_completion_time_seconds(),
            state: TaskState::Waiting,
            click_id: Some(click_id),
            completed_at: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the click id once dispatched.
    #[must_use]
    pub const fn click_id(&self) -> Option<&ClickId> {
        self.click_id.as_ref()
    }

    /// Returns the clamped dwell time.
    #[must_use]
    pub const fn completion_time_seconds(&self) -> u32 {
        self.completion_time_seconds
    }

    /// Returns the completion time once completed.
    #[must_use]
    pub const fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    /// Activates the task: mints the click id and starts the dwell timer.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError`] when the instance is not idle or the click
    /// id cannot be minted.
    pub fn dispatch(&mut self, now: Timestamp) -> Result<&ClickId, CompletionError> {
        match self.state {
            TaskState::Idle => {}
            TaskState::Completed => return Err(CompletionError::AlreadyCompleted),
            TaskState::Dispatched | TaskState::Waiting => {
                return Err(CompletionError::AlreadyDispatched);
            }
        }
        let click_id = ClickId::mint(&self.locker_id, &self.task_id, now)?;
        self.state = TaskState::Dispatched;
        let click_id = self.click_id.insert(click_id);
        self.state = TaskState::Waiting;
        Ok(click_id)
    }

    /// Returns milliseconds left in the dwell timer, or `None` before dispatch.
    #[must_use]
    pub fn remaining_millis(&self, now: Timestamp) -> Option<i64> {
        let dispatched_at = self.click_id.as_ref()?.dispatched_at;
        let required = i64::from(self.completion_time_seconds) * MILLIS_PER_SECOND;
        Some((required - now.millis_since(dispatched_at)).max(0))
    }

    /// Completes the task once the dwell time has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError`] when the instance is not waiting or the
    /// dwell time has not elapsed.
    pub fn complete(&mut self, now: Timestamp) -> Result<(), CompletionError> {
        match self.state {
            TaskState::Idle => return Err(CompletionError::NotDispatched),
            TaskState::Completed => return Err(CompletionError::AlreadyCompleted),
            TaskState::Dispatched | TaskState::Waiting => {}
        }
        let remaining_millis = self.remaining_millis(now).ok_or(CompletionError::NotDispatched)?;
        if remaining_millis > 0 {
            return Err(CompletionError::TooEarly { remaining_millis });
        }
        self.state = TaskState::Completed;
        self.completed_at = Some(now);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
