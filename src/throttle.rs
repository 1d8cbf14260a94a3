//! Adaptive throttle for coordinating concurrent LLM calls.
//!
//! Every LLM-calling stage of a pipeline run shares one [`AdaptiveThrottle`].
//! It bounds in-flight requests with a semaphore, spaces out dispatch starts,
//! halves concurrency when failures pile up inside a sliding window, and
//! steps back up one slot at a time after a failure-free cooling period.
//!
//! # Example
//!
//! ```rust,no_run
//! use factify::throttle::{AdaptiveThrottle, ThrottleConfig};
//! use std::time::Instant;
//!
//! # async fn call_api() -> Result<(), ()> { Ok(()) }
//! # async fn run() {
//! let throttle = AdaptiveThrottle::new(ThrottleConfig {
//!     max_concurrency: 3,
//!     total_tasks: 40,
//!     ..Default::default()
//! });
//!
//! let started = Instant::now();
//! let outcome = {
//!     let _permit = throttle.acquire().await;
//!     call_api().await
//! };
//! match outcome {
//!     Ok(()) => throttle.record_success(started.elapsed()),
//!     Err(()) => throttle.record_failure(),
//! }
//! # }
//! ```

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Concurrency never drops below this.
const MIN_CONCURRENCY: usize = 1;

/// Upper bound for the dispatch interval after repeated deceleration.
pub const MAX_DISPATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Number of recent call durations used for ETA estimation.
const DURATION_HISTORY: usize = 10;

/// Floor applied to the average duration so the ETA rate stays finite.
const MIN_AVG_DURATION_SECS: f64 = 0.01;

/// Construction parameters for [`AdaptiveThrottle`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Upper bound on simultaneous operations.
    pub max_concurrency: usize,
    /// Starting concurrency. `None` starts at `max_concurrency`.
    pub initial_concurrency: Option<usize>,
    /// Known number of work items, for progress and ETA.
    pub total_tasks: usize,
    /// Floor on spacing between dispatch starts.
    pub min_dispatch_interval: Duration,
    /// Failures within `failure_window` that trigger deceleration.
    pub failure_threshold: usize,
    /// Sliding window for counting failures.
    pub failure_window: Duration,
    /// Failure-free time required before each reacceleration step.
    pub cooling_period: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            initial_concurrency: None,
            total_tasks: 0,
            min_dispatch_interval: Duration::from_millis(200),
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            cooling_period: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of throttle state for progress reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleSnapshot {
    pub completed: usize,
    pub total: usize,
    pub concurrency: usize,
    pub dispatch_interval: Duration,
    pub eta_seconds: Option<f64>,
}

/// A granted concurrency slot. The slot is released when this is dropped.
#[derive(Debug)]
#[must_use = "the concurrency slot is released as soon as the permit is dropped"]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
struct ThrottleState {
    current_concurrency: usize,
    safe_ceiling: usize,
    semaphore: Arc<Semaphore>,
    dispatch_interval: Duration,
    failure_timestamps: VecDeque<Instant>,
    cooling_start: Option<Instant>,
    completed_tasks: usize,
    total_tasks: usize,
    task_durations: VecDeque<Duration>,
}

impl ThrottleState {
    /// Swap in a semaphore sized to `concurrency`.
    ///
    /// Permits already handed out keep pointing at the old semaphore and
    /// release against it. Closing the old one wakes tasks still queued on
    /// it so they re-queue on the replacement.
    fn resize(&mut self, concurrency: usize) {
        self.current_concurrency = concurrency;
        let old = std::mem::replace(&mut self.semaphore, Arc::new(Semaphore::new(concurrency)));
        old.close();
    }
}

/// Shared concurrency and dispatch-rate coordinator for LLM calls.
#[derive(Debug)]
pub struct AdaptiveThrottle {
    max_concurrency: usize,
    min_dispatch_interval: Duration,
    failure_threshold: usize,
    failure_window: Duration,
    cooling_period: Duration,
    started_at: Instant,
    state: Mutex<ThrottleState>,
    last_dispatch: AsyncMutex<Option<Instant>>,
}

impl Default for AdaptiveThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl AdaptiveThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(MIN_CONCURRENCY);
        let current_concurrency = config
            .initial_concurrency
            .unwrap_or(max_concurrency)
            .clamp(MIN_CONCURRENCY, max_concurrency);
        let min_dispatch_interval = config.min_dispatch_interval.min(MAX_DISPATCH_INTERVAL);

        info!(
            max_concurrency,
            initial_concurrency = current_concurrency,
            dispatch_interval_ms = min_dispatch_interval.as_millis() as u64,
            total_tasks = config.total_tasks,
            "Throttle initialized"
        );

        Self {
            max_concurrency,
            min_dispatch_interval,
            failure_threshold: config.failure_threshold.max(1),
            failure_window: config.failure_window,
            cooling_period: config.cooling_period,
            started_at: Instant::now(),
            state: Mutex::new(ThrottleState {
                current_concurrency,
                safe_ceiling: max_concurrency,
                semaphore: Arc::new(Semaphore::new(current_concurrency)),
                dispatch_interval: min_dispatch_interval,
                failure_timestamps: VecDeque::new(),
                cooling_start: None,
                completed_tasks: 0,
                total_tasks: config.total_tasks,
                task_durations: VecDeque::with_capacity(DURATION_HISTORY),
            }),
            last_dispatch: AsyncMutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, ThrottleState> {
        // No method panics while holding the lock, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a concurrency slot under the current limit, then for the
    /// dispatch interval to elapse since the previous dispatch started.
    ///
    /// Hold the returned permit for the duration of the call.
    pub async fn acquire(&self) -> ThrottlePermit {
        let permit = loop {
            let semaphore = self.state().semaphore.clone();
            match semaphore.acquire_owned().await {
                Ok(permit) => break permit,
                // Closed by a resize.
                Err(_) => continue,
            }
        };

        {
            let mut last_dispatch = self.last_dispatch.lock().await;
            let interval = self.state().dispatch_interval;
            if let Some(previous) = *last_dispatch {
                let elapsed = previous.elapsed();
                if elapsed < interval {
                    tokio::time::sleep(interval - elapsed).await;
                }
            }
            *last_dispatch = Some(Instant::now());
        }

        ThrottlePermit { _permit: permit }
    }

    /// Record a call that completed without failure.
    ///
    /// A zero `duration` counts the completion without feeding the ETA history.
    pub fn record_success(&self, duration: Duration) {
        let now = Instant::now();
        let mut state = self.state();

        state.completed_tasks += 1;
        if !duration.is_zero() {
            if state.task_durations.len() == DURATION_HISTORY {
                state.task_durations.pop_front();
            }
            state.task_durations.push_back(duration);
        }

        self.maybe_reaccelerate(&mut state, now);
        self.log_progress(&state);
    }

    /// Record a rate-limit failure. Cancels any cooldown in progress.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state();

        state.failure_timestamps.push_back(now);
        state.cooling_start = None;

        while let Some(&oldest) = state.failure_timestamps.front() {
            if now.duration_since(oldest) < self.failure_window {
                break;
            }
            state.failure_timestamps.pop_front();
        }

        debug!(
            failures_in_window = state.failure_timestamps.len(),
            threshold = self.failure_threshold,
            "Throttle failure recorded"
        );

        if state.failure_timestamps.len() >= self.failure_threshold {
            self.decelerate(&mut state, now);
        }
    }

    /// Snapshot of progress and the live limits.
    pub fn progress(&self) -> ThrottleSnapshot {
        let state = self.state();
        ThrottleSnapshot {
            completed: state.completed_tasks,
            total: state.total_tasks,
            concurrency: state.current_concurrency,
            dispatch_interval: state.dispatch_interval,
            eta_seconds: self.estimate_eta(&state),
        }
    }

    pub fn completed(&self) -> usize {
        self.state().completed_tasks
    }

    pub fn total(&self) -> usize {
        self.state().total_tasks
    }

    /// Update the total when it isn't known at construction.
    pub fn set_total(&self, total: usize) {
        self.state().total_tasks = total;
    }

    /// Grow the total by `additional` tasks.
    pub fn add_total(&self, additional: usize) {
        self.state().total_tasks += additional;
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn concurrency(&self) -> usize {
        self.state().current_concurrency
    }

    pub fn safe_ceiling(&self) -> usize {
        self.state().safe_ceiling
    }

    pub fn dispatch_interval(&self) -> Duration {
        self.state().dispatch_interval
    }

    pub fn is_cooling(&self) -> bool {
        self.state().cooling_start.is_some()
    }

    /// Halve concurrency and double the dispatch interval.
    fn decelerate(&self, state: &mut ThrottleState, now: Instant) {
        let old_concurrency = state.current_concurrency;
        let old_interval = state.dispatch_interval;

        let new_concurrency = (old_concurrency / 2).max(MIN_CONCURRENCY);
        let new_interval = (old_interval * 2).min(MAX_DISPATCH_INTERVAL);

        // Never climb back past the level that just failed.
        state.safe_ceiling = state.safe_ceiling.min(old_concurrency);

        if new_concurrency != old_concurrency {
            state.resize(new_concurrency);
        }
        state.dispatch_interval = new_interval;
        state.failure_timestamps.clear();
        state.cooling_start = Some(now);

        warn!(
            old_concurrency,
            new_concurrency,
            old_interval_ms = old_interval.as_millis() as u64,
            new_interval_ms = new_interval.as_millis() as u64,
            safe_ceiling = state.safe_ceiling,
            "Throttle decelerated"
        );
    }

    /// Step concurrency up by one once a full cooling period passed without failures.
    fn maybe_reaccelerate(&self, state: &mut ThrottleState, now: Instant) {
        let Some(cooling_start) = state.cooling_start else {
            if state.current_concurrency < state.safe_ceiling {
                state.cooling_start = Some(now);
            }
            return;
        };

        if now.duration_since(cooling_start) < self.cooling_period {
            return;
        }

        let old_concurrency = state.current_concurrency;
        let old_interval = state.dispatch_interval;

        let new_concurrency = (old_concurrency + 1).min(state.safe_ceiling);
        let new_interval = (old_interval / 2).max(self.min_dispatch_interval);

        if new_concurrency == old_concurrency && new_interval == old_interval {
            return;
        }

        if new_concurrency != old_concurrency {
            state.resize(new_concurrency);
        }
        state.dispatch_interval = new_interval;
        state.cooling_start = Some(now);

        info!(
            old_concurrency,
            new_concurrency,
            old_interval_ms = old_interval.as_millis() as u64,
            new_interval_ms = new_interval.as_millis() as u64,
            safe_ceiling = state.safe_ceiling,
            "Throttle reaccelerated"
        );
    }

    fn estimate_eta(&self, state: &ThrottleState) -> Option<f64> {
        let remaining = state.total_tasks.saturating_sub(state.completed_tasks);
        if remaining == 0 {
            return Some(0.0);
        }

        let avg_secs = if state.task_durations.is_empty() {
            if state.completed_tasks == 0 {
                return None;
            }
            self.started_at.elapsed().as_secs_f64() / state.completed_tasks as f64
        } else {
            let sum: Duration = state.task_durations.iter().sum();
            sum.as_secs_f64() / state.task_durations.len() as f64
        };

        let rate = state.current_concurrency as f64 / avg_secs.max(MIN_AVG_DURATION_SECS);
        Some(remaining as f64 / rate)
    }

    fn log_progress(&self, state: &ThrottleState) {
        let total = state.total_tasks;
        if total == 0 {
            return;
        }

        let completed = state.completed_tasks;
        let step = (total / 10).max(1);
        if completed != total && completed != 1 && completed % step != 0 {
            return;
        }

        let percent = (completed as f64 / total as f64 * 1000.0).round() / 10.0;
        let eta = self.estimate_eta(state).map(|e| (e * 10.0).round() / 10.0);
        info!(
            completed,
            total,
            percent,
            concurrency = state.current_concurrency,
            dispatch_interval_ms = state.dispatch_interval.as_millis() as u64,
            eta_seconds = ?eta,
            "Throttle progress"
        );
    }
}
