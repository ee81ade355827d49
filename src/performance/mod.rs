//! # Tick Metrics
//!
//! Tracks how long each simulation tick takes and how often the scheduler
//! falls behind its deadline.
//!
//! ## Usage
//!
//! ```rust
//! use torus_life::performance::TickMonitor;
//!
//! let mut monitor = TickMonitor::new(1000);
//!
//! monitor.begin_tick();
//! // ... record, submit and present one generation ...
//! monitor.end_tick(1);
//!
//! assert_eq!(monitor.ticks(), 1);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Summary of recent ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct TickMetrics {
    /// Ticks per second implied by the average tick time
    pub ticks_per_second: f32,
    /// Average tick time in milliseconds
    pub tick_time_ms: f32,
    /// Minimum tick time in the current window
    pub min_tick_time_ms: f32,
    /// Maximum tick time in the current window
    pub max_tick_time_ms: f32,
    /// Deadlines missed since startup
    pub missed_deadlines: u64,
}

impl Default for TickMetrics {
    fn default() -> Self {
        Self {
            ticks_per_second: 0.0,
            tick_time_ms: 0.0,
            min_tick_time_ms: f32::MAX,
            max_tick_time_ms: 0.0,
            missed_deadlines: 0,
        }
    }
}

/// Rolling tick-time statistics.
pub struct TickMonitor {
    /// Ring buffer of recent tick times for averaging
    tick_times: VecDeque<Duration>,
    max_samples: usize,
    tick_start: Option<Instant>,
    metrics: TickMetrics,
    ticks: u64,
    /// Log a summary every this many generations (0 disables)
    log_interval: u64,
}

impl TickMonitor {
    pub fn new(log_interval: u64) -> Self {
        Self::with_samples(240, log_interval)
    }

    pub fn with_samples(max_samples: usize, log_interval: u64) -> Self {
        Self {
            tick_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            tick_start: None,
            metrics: TickMetrics::default(),
            ticks: 0,
            log_interval,
        }
    }

    /// Mark the beginning of a tick
    pub fn begin_tick(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Mark the end of a tick that produced `generation`.
    pub fn end_tick(&mut self, generation: u64) {
        if let Some(start) = self.tick_start.take() {
            self.record(start.elapsed(), generation);
        }
    }

    /// Drop a tick started with [`begin_tick`](Self::begin_tick) that failed.
    pub fn abort_tick(&mut self) {
        self.tick_start = None;
    }

    fn record(&mut self, tick_time: Duration, generation: u64) {
        if self.tick_times.len() >= self.max_samples {
            self.tick_times.pop_front();
        }
        self.tick_times.push_back(tick_time);
        self.ticks += 1;
        self.update_metrics();

        if self.log_interval > 0 && generation % self.log_interval == 0 {
            log::debug!(
                "Generation {generation}: {:.3}ms/tick avg ({:.3} min, {:.3} max), {:.0} ticks/s, {} missed deadlines",
                self.metrics.tick_time_ms,
                self.metrics.min_tick_time_ms,
                self.metrics.max_tick_time_ms,
                self.metrics.ticks_per_second,
                self.metrics.missed_deadlines
            );
        }
    }

    pub fn record_missed_deadline(&mut self, behind: Duration) {
        self.metrics.missed_deadlines += 1;
        log::warn!(
            "Tick deadline missed by {:.3}ms ({} total)",
            behind.as_secs_f64() * 1000.0,
            self.metrics.missed_deadlines
        );
    }

    fn update_metrics(&mut self) {
        if self.tick_times.is_empty() {
            return;
        }

        let total_time: Duration = self.tick_times.iter().sum();
        let avg_tick_time = total_time / self.tick_times.len() as u32;
        let avg_tick_time_ms = avg_tick_time.as_secs_f32() * 1000.0;

        self.metrics.tick_time_ms = avg_tick_time_ms;
        self.metrics.ticks_per_second = if avg_tick_time_ms > 0.0 {
            1000.0 / avg_tick_time_ms
        } else {
            0.0
        };

        if let (Some(min_time), Some(max_time)) =
            (self.tick_times.iter().min(), self.tick_times.iter().max())
        {
            self.metrics.min_tick_time_ms = min_time.as_secs_f32() * 1000.0;
            self.metrics.max_tick_time_ms = max_time.as_secs_f32() * 1000.0;
        }
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// Ticks completed since startup.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn missed_deadlines(&self) -> u64 {
        self.metrics.missed_deadlines
    }
}

impl Default for TickMonitor {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = TickMonitor::with_samples(3, 0);
        for (generation, ms) in [4u64, 1, 2, 3].into_iter().enumerate() {
            monitor.record(Duration::from_millis(ms), generation as u64 + 1);
        }

        assert_eq!(monitor.ticks(), 4);
        let metrics = monitor.metrics();
        assert!((metrics.tick_time_ms - 2.0).abs() < 1e-3);
        assert!((metrics.min_tick_time_ms - 1.0).abs() < 1e-3);
        assert!((metrics.max_tick_time_ms - 3.0).abs() < 1e-3);
        assert!((metrics.ticks_per_second - 500.0).abs() < 1e-1);
    }

    #[test]
    fn test_aborted_tick_is_not_counted() {
        let mut monitor = TickMonitor::default();
        monitor.begin_tick();
        monitor.abort_tick();
        monitor.end_tick(1);
        assert_eq!(monitor.ticks(), 0);
    }

    #[test]
    fn test_missed_deadlines_accumulate() {
        let mut monitor = TickMonitor::default();
        monitor.record_missed_deadline(Duration::from_millis(3));
        monitor.record_missed_deadline(Duration::from_millis(1));
        assert_eq!(monitor.missed_deadlines(), 2);
    }
}
