//! Per-session completion accounting.
//!
//! One mutex guards every counter and map; one condition variable wakes the
//! waiting thread. The wait is released when it is forced, or when the
//! broker has reported that all bundles finished, no bundle remains
//! outstanding and no bundle status is left. Either arrival order of the
//! per-bundle and whole-task notifications releases exactly once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use logging::trace_session;
use protocol::{BundleName, ERR_OK, ErrCode};

use crate::outcome::{ReleaseCause, SessionOutcome};

/// Result of claiming a file before transferring it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileClaim {
    /// The caller now owns the transfer.
    Claimed,
    /// Another notification already took this file.
    AlreadyClaimed,
    /// The bundle is not tracked; the transfer is not accounted.
    Untracked,
}

/// Result of recording a delivered file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordOutcome {
    /// Counted; the bundle is not complete yet.
    Recorded {
        /// Distinct files delivered so far.
        delivered: usize,
        /// Files expected, when known.
        expected: Option<usize>,
    },
    /// This record completed the bundle and the publish action ran.
    Published,
    /// The file was already recorded.
    Duplicate,
    /// The bundle is not tracked.
    Untracked,
}

#[derive(Debug, Default)]
struct BundleStatus {
    expected: Option<usize>,
    claimed: BTreeSet<String>,
    delivered: BTreeSet<String>,
    published: bool,
}

impl BundleStatus {
    fn is_complete(&self) -> bool {
        self.expected.is_some_and(|expected| self.delivered.len() >= expected)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    bundles: BTreeMap<BundleName, BundleStatus>,
    finished: BTreeSet<BundleName>,
    remaining: i64,
    all_finished: bool,
    forced: Option<ReleaseCause>,
    failures: BTreeMap<BundleName, ErrCode>,
}

impl TrackerState {
    fn released(&self) -> bool {
        self.forced.is_some() || (self.all_finished && self.remaining <= 0 && self.bundles.is_empty())
    }

    fn outcome(&self) -> SessionOutcome {
        match self.forced {
            Some(ReleaseCause::ConnectionLost) => SessionOutcome::ConnectionLost,
            Some(ReleaseCause::Aborted(code)) => SessionOutcome::Aborted(code),
            None if self.failures.is_empty() => SessionOutcome::Success,
            None => SessionOutcome::PartialFailure(self.failures.clone()),
        }
    }

    fn finish(&mut self, bundle: &str, err_code: ErrCode) -> bool {
        if !self.finished.insert(bundle.to_owned()) {
            return false;
        }
        self.remaining -= 1;
        self.bundles.remove(bundle);
        if err_code != ERR_OK {
            self.failures.insert(bundle.to_owned(), err_code);
        }
        true
    }
}

/// Completion state shared between a session's notification handlers and
/// the thread waiting for the session to end.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    state: Mutex<TrackerState>,
    wake: Condvar,
}

impl CompletionTracker {
    /// An empty tracker expecting no bundles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn changed(&self, state: &TrackerState) {
        if state.released() {
            trace_session!(remaining = state.remaining, "completion condition reached");
        }
        self.wake.notify_all();
    }

    /// Sets how many bundles must finish before the session can complete.
    pub fn expect_bundles(&self, count: usize) {
        let mut state = self.lock();
        state.remaining = i64::try_from(count).unwrap_or(i64::MAX) - i64::try_from(state.finished.len()).unwrap_or(0);
        self.changed(&state);
    }

    /// Registers `bundle` as in flight, with `expected` files when known.
    ///
    /// Registering an already tracked bundle only updates its expected count.
    /// Bundles that already finished stay finished.
    pub fn begin_bundle(&self, bundle: &str, expected: Option<usize>) {
        let mut state = self.lock();
        if state.finished.contains(bundle) {
            trace_session!(bundle, "begin ignored for finished bundle");
            return;
        }
        let status = state.bundles.entry(bundle.to_owned()).or_default();
        if expected.is_some() {
            status.expected = expected;
        }
        trace_session!(bundle, ?expected, "bundle tracked");
        self.changed(&state);
    }

    /// Sets the expected file count of a tracked bundle.
    pub fn set_expected(&self, bundle: &str, expected: usize) {
        let mut state = self.lock();
        if let Some(status) = state.bundles.get_mut(bundle) {
            status.expected = Some(expected);
            trace_session!(bundle, expected, delivered = status.delivered.len(), "expected files known");
        }
        self.changed(&state);
    }

    /// Takes ownership of one file's transfer.
    pub fn claim_file(&self, bundle: &str, file: &str) -> FileClaim {
        let mut state = self.lock();
        match state.bundles.get_mut(bundle) {
            None => FileClaim::Untracked,
            Some(status) => {
                if status.claimed.insert(file.to_owned()) {
                    FileClaim::Claimed
                } else {
                    FileClaim::AlreadyClaimed
                }
            }
        }
    }

    /// Gives a claim back after a failed transfer so a later notification may retry.
    pub fn abandon_file(&self, bundle: &str, file: &str) {
        let mut state = self.lock();
        if let Some(status) = state.bundles.get_mut(bundle)
            && !status.delivered.contains(file)
        {
            status.claimed.remove(file);
        }
    }

    /// Marks one file of `bundle` as delivered.
    ///
    /// When the delivered count reaches the expected count `publish` runs,
    /// under the tracker lock, at most once per bundle. If it fails the bundle
    /// stays unpublished and the error is returned.
    pub fn record_file_sent<E>(
        &self,
        bundle: &str,
        file: &str,
        publish: impl FnOnce() -> Result<(), E>,
    ) -> Result<RecordOutcome, E> {
        let mut state = self.lock();
        let Some(status) = state.bundles.get_mut(bundle) else {
            trace_session!(bundle, file, "record ignored for untracked bundle");
            return Ok(RecordOutcome::Untracked);
        };
        status.claimed.insert(file.to_owned());
        if !status.delivered.insert(file.to_owned()) {
            return Ok(RecordOutcome::Duplicate);
        }

        let outcome = if !status.published && status.is_complete() {
            publish()?;
            status.published = true;
            trace_session!(bundle, files = status.delivered.len(), "bundle published");
            RecordOutcome::Published
        } else {
            RecordOutcome::Recorded {
                delivered: status.delivered.len(),
                expected: status.expected,
            }
        };
        self.changed(&state);
        Ok(outcome)
    }

    /// Records a failure for `bundle` without finishing it.
    pub fn record_failure(&self, bundle: &str, err_code: ErrCode) {
        let mut state = self.lock();
        state.failures.entry(bundle.to_owned()).or_insert(err_code);
        self.changed(&state);
    }

    /// A bundle failed before any file was exchanged.
    pub fn bundle_start_failed(&self, bundle: &str, err_code: ErrCode) {
        let mut state = self.lock();
        if state.finish(bundle, err_code) {
            trace_session!(bundle, err_code, remaining = state.remaining, "bundle failed to start");
        }
        self.changed(&state);
    }

    /// A bundle finished, successfully or not. Repeats for the same bundle are ignored.
    pub fn bundle_finished(&self, bundle: &str, err_code: ErrCode) {
        let mut state = self.lock();
        if state.finish(bundle, err_code) {
            trace_session!(bundle, err_code, remaining = state.remaining, "bundle finished");
        } else {
            trace_session!(bundle, "repeated bundle finish ignored");
        }
        self.changed(&state);
    }

    /// The broker reported the end of the whole task.
    ///
    /// A nonzero code is an abnormal abort and releases the wait at once.
    pub fn all_bundles_finished(&self, err_code: ErrCode) {
        let mut state = self.lock();
        state.all_finished = true;
        if err_code != ERR_OK && state.forced.is_none() {
            state.forced = Some(ReleaseCause::Aborted(err_code));
        }
        self.changed(&state);
    }

    /// Releases the wait regardless of the counters.
    ///
    /// The first cause wins.
    pub fn force_release(&self, cause: ReleaseCause) {
        let mut state = self.lock();
        if state.forced.is_none() {
            state.forced = Some(cause);
        }
        self.changed(&state);
    }

    /// Whether the wait has been released.
    pub fn is_released(&self) -> bool {
        self.lock().released()
    }

    /// Outcome so far, once released.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        let state = self.lock();
        state.released().then(|| state.outcome())
    }

    /// Bundles still counted as outstanding.
    pub fn remaining(&self) -> i64 {
        self.lock().remaining
    }

    /// Blocks until the session is released.
    pub fn wait(&self) -> SessionOutcome {
        let state = self
            .wake
            .wait_while(self.lock(), |state| !state.released())
            .unwrap_or_else(PoisonError::into_inner);
        state.outcome()
    }

    /// Blocks until released or until `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SessionOutcome> {
        let (state, _) = self
            .wake
            .wait_timeout_while(self.lock(), timeout, |state| !state.released())
            .unwrap_or_else(PoisonError::into_inner);
        state.released().then(|| state.outcome())
    }
}
