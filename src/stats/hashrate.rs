// src/stats/hashrate.rs
//! Windowed hashrate tracking
//!
//! Each worker unit only bumps a monotonically increasing hash counter.
//! The control context samples those counters periodically, and rates are
//! derived from the oldest and newest sample inside a window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Short reporting window
pub const SHORT_INTERVAL: Duration = Duration::from_secs(10);
/// Medium reporting window
pub const MEDIUM_INTERVAL: Duration = Duration::from_secs(60);
/// Long reporting window
pub const LARGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    hashes: u64,
}

/// Per-thread hashrate history
#[derive(Debug)]
pub struct Hashrate {
    threads: Vec<VecDeque<Sample>>,
    highest: f64,
}

/// Rates for the three reporting windows, `None` while there is not
/// enough history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HashrateSnapshot {
    /// Rate over [`SHORT_INTERVAL`]
    pub short: Option<f64>,
    /// Rate over [`MEDIUM_INTERVAL`]
    pub medium: Option<f64>,
    /// Rate over [`LARGE_INTERVAL`]
    pub large: Option<f64>,
}

impl Hashrate {
    /// Creates an empty history for `threads` units
    pub fn new(threads: usize) -> Self {
        Hashrate {
            threads: vec![VecDeque::new(); threads],
            highest: 0.0,
        }
    }

    /// Number of tracked units
    pub fn threads(&self) -> usize {
        self.threads.len()
    }

    /// Records the cumulative hash count of `thread` at `at`
    pub fn add(&mut self, thread: usize, hashes: u64, at: Instant) {
        let Some(samples) = self.threads.get_mut(thread) else {
            return;
        };
        samples.push_back(Sample { at, hashes });

        let keep = LARGE_INTERVAL + SHORT_INTERVAL;
        while let Some(front) = samples.front() {
            if at.saturating_duration_since(front.at) > keep {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Hashes per second of `thread` over the trailing `window`
    pub fn calc(&self, thread: usize, window: Duration) -> Option<f64> {
        let samples = self.threads.get(thread)?;
        let newest = samples.back()?;
        let oldest = samples
            .iter()
            .find(|s| newest.at.saturating_duration_since(s.at) <= window)?;

        let elapsed = newest.at.saturating_duration_since(oldest.at);
        if elapsed.is_zero() {
            return None;
        }
        Some((newest.hashes - oldest.hashes) as f64 / elapsed.as_secs_f64())
    }

    /// Sum of all threads that have enough history for `window`
    pub fn calc_total(&self, window: Duration) -> Option<f64> {
        let rates: Vec<f64> = (0..self.threads.len())
            .filter_map(|t| self.calc(t, window))
            .collect();
        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum())
        }
    }

    /// All three windows for one thread
    pub fn snapshot(&self, thread: usize) -> HashrateSnapshot {
        HashrateSnapshot {
            short: self.calc(thread, SHORT_INTERVAL),
            medium: self.calc(thread, MEDIUM_INTERVAL),
            large: self.calc(thread, LARGE_INTERVAL),
        }
    }

    /// All three windows summed over threads
    pub fn total(&self) -> HashrateSnapshot {
        HashrateSnapshot {
            short: self.calc_total(SHORT_INTERVAL),
            medium: self.calc_total(MEDIUM_INTERVAL),
            large: self.calc_total(LARGE_INTERVAL),
        }
    }

    /// Folds the current short-window total into the highest-seen rate
    pub fn update_highest(&mut self) {
        if let Some(short) = self.calc_total(SHORT_INTERVAL) {
            if short > self.highest {
                self.highest = short;
            }
        }
    }

    /// Highest short-window total seen so far
    pub fn highest(&self) -> f64 {
        self.highest
    }
}

/// Formats an optional rate the way the report lines show it
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}", r),
        None => "n/a".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_over_window() {
        let t0 = Instant::now();
        let mut rate = Hashrate::new(2);
        rate.add(0, 0, t0);
        rate.add(0, 500, t0 + Duration::from_secs(5));
        rate.add(0, 1000, t0 + Duration::from_secs(10));

        assert_eq!(rate.calc(0, SHORT_INTERVAL), Some(100.0));
        assert_eq!(rate.calc(1, SHORT_INTERVAL), None);
        assert_eq!(rate.calc_total(SHORT_INTERVAL), Some(100.0));
    }

    #[test]
    fn window_ignores_older_samples() {
        let t0 = Instant::now();
        let mut rate = Hashrate::new(1);
        rate.add(0, 0, t0);
        rate.add(0, 10_000, t0 + Duration::from_secs(50));
        rate.add(0, 10_200, t0 + Duration::from_secs(60));

        assert_eq!(rate.calc(0, SHORT_INTERVAL), Some(20.0));
        assert_eq!(rate.calc(0, MEDIUM_INTERVAL), Some(10_200.0 / 60.0));
    }

    #[test]
    fn highest_tracks_short_total() {
        let t0 = Instant::now();
        let mut rate = Hashrate::new(1);
        rate.add(0, 0, t0);
        rate.add(0, 300, t0 + Duration::from_secs(1));
        rate.update_highest();
        rate.add(0, 400, t0 + Duration::from_secs(2));
        rate.update_highest();
        assert_eq!(rate.highest(), 300.0);
    }

    #[test]
    fn old_samples_are_pruned() {
        let t0 = Instant::now();
        let mut rate = Hashrate::new(1);
        rate.add(0, 0, t0);
        rate.add(0, 1, t0 + LARGE_INTERVAL + SHORT_INTERVAL + Duration::from_secs(1));
        assert_eq!(rate.threads[0].len(), 1);
        assert_eq!(format_rate(None), "n/a");
        assert_eq!(format_rate(Some(12.345)), "12.3");
    }
}
