//! Fixed-period cycle loop
//!
//! Drives a callback at a fixed rate with timing statistics. A late cycle
//! simply delays the next tick; missed ticks are dropped, never queued, so
//! the callback always works on fresh data.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Configuration for a control loop
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Cycle period in seconds
    pub period_s: f64,
    /// Name for logging/debugging
    pub name: Arc<str>,
    /// Whether to warn on timing overruns
    pub warn_on_overrun: bool,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            period_s: 0.01,
            name: "control_loop".into(),
            warn_on_overrun: true,
        }
    }
}

impl ControlLoopConfig {
    /// Create a new config with the given period
    pub fn new(period_s: f64) -> Self {
        Self {
            period_s,
            ..Default::default()
        }
    }

    /// Set the loop name
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the period as a Duration
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_s)
    }
}

/// Timing statistics for a control loop
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlLoopStats {
    /// Number of loop iterations
    pub iterations: u64,
    /// Number of iterations that ran past the period
    pub overruns: u64,
    /// Total execution time
    pub total_execution_time: Duration,
    /// Maximum iteration time
    pub max_iteration_time: Duration,
    /// Minimum iteration time
    pub min_iteration_time: Duration,
    /// Last iteration time
    pub last_iteration_time: Duration,
}

impl ControlLoopStats {
    fn update(&mut self, execution_time: Duration, target_period: Duration) {
        self.iterations += 1;
        self.total_execution_time += execution_time;
        self.last_iteration_time = execution_time;

        if self.iterations == 1 {
            self.min_iteration_time = execution_time;
            self.max_iteration_time = execution_time;
        } else {
            self.min_iteration_time = self.min_iteration_time.min(execution_time);
            self.max_iteration_time = self.max_iteration_time.max(execution_time);
        }

        if execution_time > target_period {
            self.overruns += 1;
        }
    }

    /// Average iteration time
    pub fn avg_iteration_time(&self) -> Duration {
        if self.iterations == 0 {
            Duration::ZERO
        } else {
            self.total_execution_time.div_f64(self.iterations as f64)
        }
    }

    /// Get the overrun ratio (0.0 to 1.0)
    pub fn overrun_ratio(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.overruns as f64 / self.iterations as f64
        }
    }
}

/// Handle to a running control loop
pub struct ControlLoopHandle {
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<ControlLoopStats>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ControlLoopHandle {
    /// Check if the loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get the current statistics
    pub fn stats(&self) -> ControlLoopStats {
        *self.stats.lock()
    }

    /// Ask the loop to stop after the iteration in progress
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop and wait for the loop to finish
    ///
    /// An iteration already underway (including any bus transaction it
    /// issued) completes before the thread exits.
    pub fn join(mut self) -> Result<()> {
        self.stop();
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| Error::ControlLoop("thread panicked".into()))??;
        }
        Ok(())
    }
}

/// A fixed-period control loop
///
/// # Example
/// ```
/// use strider_core::control::{ControlLoop, ControlLoopConfig};
///
/// let config = ControlLoopConfig::new(0.001).with_name("cycle");
/// let stats = ControlLoop::run(config, |iteration| Ok(iteration < 10)).unwrap();
/// assert_eq!(stats.iterations, 10);
/// ```
pub struct ControlLoop;

impl ControlLoop {
    /// Spawn a control loop in a new thread
    ///
    /// The callback receives the iteration count and returns `Ok(true)` to
    /// continue, `Ok(false)` to stop; an error stops the loop and is
    /// returned from [`ControlLoopHandle::join`].
    pub fn spawn<F>(config: ControlLoopConfig, mut callback: F) -> ControlLoopHandle
    where
        F: FnMut(u64) -> Result<bool> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(ControlLoopStats::default()));

        let running_clone = running.clone();
        let stats_clone = stats.clone();

        let thread = thread::spawn(move || {
            let result = Self::run_inner(&config, &running_clone, Some(&stats_clone), &mut callback);
            running_clone.store(false, Ordering::Relaxed);
            result.map(|_| ())
        });

        ControlLoopHandle {
            running,
            stats,
            thread: Some(thread),
        }
    }

    /// Run a control loop on the current thread (blocking)
    pub fn run<F>(config: ControlLoopConfig, mut callback: F) -> Result<ControlLoopStats>
    where
        F: FnMut(u64) -> Result<bool>,
    {
        let running = AtomicBool::new(true);
        Self::run_inner(&config, &running, None, &mut callback)
    }

    fn run_inner<F>(
        config: &ControlLoopConfig,
        running: &AtomicBool,
        shared_stats: Option<&Mutex<ControlLoopStats>>,
        callback: &mut F,
    ) -> Result<ControlLoopStats>
    where
        F: FnMut(u64) -> Result<bool>,
    {
        let period = config.period();
        let mut stats = ControlLoopStats::default();
        let mut iteration = 0u64;

        while running.load(Ordering::Relaxed) {
            let loop_start = Instant::now();

            let should_continue = callback(iteration)?;

            let execution_time = loop_start.elapsed();
            if !should_continue {
                break;
            }

            stats.update(execution_time, period);
            if let Some(shared) = shared_stats {
                *shared.lock() = stats;
            }

            if let Some(sleep_time) = period.checked_sub(execution_time) {
                thread::sleep(sleep_time);
            } else if config.warn_on_overrun {
                tracing::warn!(
                    "{}: loop overrun by {:?}",
                    config.name,
                    execution_time - period
                );
            }

            iteration += 1;
        }

        Ok(stats)
    }
}
