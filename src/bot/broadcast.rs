// src/bot/broadcast.rs - Shuffled, non-repeating rotation over the creative catalog

use chrono::{DateTime, NaiveTime, TimeZone};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::types::{ConfigError, Creative, DrawOutcome, EmptyReason};

/// Time-of-day window in which broadcasts are allowed, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ScheduleWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::Invalid(format!(
                "schedule start {} is after end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two `HH:MM` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| ConfigError::Invalid(format!("schedule time '{}' is not HH:MM: {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Pool of catalog indices consumed one per draw and lazily reshuffled once empty
pub struct BroadcastPool {
    catalog: Vec<Creative>,
    remaining: Vec<usize>,
    window: ScheduleWindow,
    rng: StdRng,
    cycles: u64,
}

impl BroadcastPool {
    pub fn new(catalog: Vec<Creative>, window: ScheduleWindow) -> Self {
        Self::with_rng(catalog, window, StdRng::from_os_rng())
    }

    /// Create a pool with a caller-provided generator (seeded pools are reproducible)
    pub fn with_rng(catalog: Vec<Creative>, window: ScheduleWindow, rng: StdRng) -> Self {
        Self {
            catalog,
            remaining: Vec::new(),
            window,
            rng,
            cycles: 0,
        }
    }

    /// Draw the next creative for a send request made at `now`.
    ///
    /// Outside the schedule window nothing is consumed. The pool is refilled with a
    /// fresh permutation of the whole catalog only when a draw finds it empty, so every
    /// creative is returned exactly once per cycle of as many draws as there are creatives.
    pub fn draw<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> DrawOutcome {
        let time = now.time();
        if !self.window.contains(time) {
            debug!(
                "Broadcast draw at {} outside schedule ({} - {})",
                time.format("%H:%M:%S"),
                self.window.start.format("%H:%M"),
                self.window.end.format("%H:%M")
            );
            return DrawOutcome::Empty(EmptyReason::OutOfSchedule);
        }

        if self.remaining.is_empty() {
            if self.catalog.is_empty() {
                return DrawOutcome::Empty(EmptyReason::EmptyCatalog);
            }
            self.remaining = (0..self.catalog.len()).collect();
            self.remaining.shuffle(&mut self.rng);
            self.cycles += 1;
            info!("Broadcast pool reshuffled ({} creatives, cycle {})", self.catalog.len(), self.cycles);
        }

        match self.remaining.pop() {
            Some(index) => DrawOutcome::Creative(self.catalog[index].clone()),
            None => DrawOutcome::Empty(EmptyReason::EmptyCatalog),
        }
    }

    /// Creatives left before the next reshuffle
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Number of reshuffles performed so far
    pub fn cycles_started(&self) -> u64 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    fn catalog(n: usize) -> Vec<Creative> {
        (0..n)
            .map(|i| Creative {
                image: format!("producto{}.jpg", i),
                caption: format!("Producto {}", i),
                actions: Vec::new(),
            })
            .collect()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, m, s).unwrap()
    }

    fn pool(n: usize, seed: u64) -> BroadcastPool {
        let window = ScheduleWindow::parse("07:00", "21:00").unwrap();
        BroadcastPool::with_rng(catalog(n), window, StdRng::seed_from_u64(seed))
    }

    fn caption(outcome: DrawOutcome) -> String {
        match outcome {
            DrawOutcome::Creative(c) => c.caption,
            other => panic!("expected a creative, got {:?}", other),
        }
    }

    #[test]
    fn test_full_cycle_has_no_repeats() {
        for seed in 0..20 {
            let mut pool = pool(5, seed);
            let drawn: HashSet<String> = (0..5).map(|_| caption(pool.draw(&at(12, 0, 0)))).collect();
            assert_eq!(drawn.len(), 5, "seed {} repeated a creative", seed);
            assert_eq!(pool.remaining(), 0);
        }
    }

    #[test]
    fn test_refill_is_lazy() {
        let mut pool = pool(3, 7);
        for _ in 0..3 {
            pool.draw(&at(9, 0, 0));
        }
        assert_eq!(pool.remaining(), 0);
        assert_eq!(pool.cycles_started(), 1);

        pool.draw(&at(9, 0, 0));
        assert_eq!(pool.cycles_started(), 2);
        assert_eq!(pool.remaining(), 2);
    }

    #[test]
    fn test_out_of_schedule_does_not_consume() {
        let mut pool = pool(4, 1);
        pool.draw(&at(10, 0, 0));
        assert_eq!(pool.remaining(), 3);

        assert_eq!(pool.draw(&at(6, 59, 59)), DrawOutcome::Empty(EmptyReason::OutOfSchedule));
        assert_eq!(pool.draw(&at(21, 0, 1)), DrawOutcome::Empty(EmptyReason::OutOfSchedule));
        assert_eq!(pool.remaining(), 3);

        assert!(matches!(pool.draw(&at(10, 0, 0)), DrawOutcome::Creative(_)));
        assert_eq!(pool.remaining(), 2);
    }

    #[test]
    fn test_out_of_schedule_on_fresh_pool_does_not_shuffle() {
        let mut pool = pool(4, 1);
        assert_eq!(pool.draw(&at(23, 0, 0)), DrawOutcome::Empty(EmptyReason::OutOfSchedule));
        assert_eq!(pool.cycles_started(), 0);
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let window = ScheduleWindow::parse("07:00", "21:00").unwrap();
        assert!(window.contains(NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(window.contains(NaiveTime::from_hms_opt(21, 0, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(6, 59, 59).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(21, 0, 1).unwrap()));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(ScheduleWindow::parse("21:00", "07:00").is_err());
        assert!(ScheduleWindow::parse("25:00", "07:00").is_err());
    }

    #[test]
    fn test_single_creative_catalog() {
        let mut pool = pool(1, 3);
        assert_eq!(caption(pool.draw(&at(8, 0, 0))), "Producto 0");
        assert_eq!(caption(pool.draw(&at(8, 0, 0))), "Producto 0");
        assert_eq!(pool.cycles_started(), 2);
    }

    #[test]
    fn test_empty_catalog_reports_empty() {
        let mut pool = pool(0, 3);
        assert_eq!(pool.draw(&at(8, 0, 0)), DrawOutcome::Empty(EmptyReason::EmptyCatalog));
    }

    #[test]
    fn test_every_creative_can_come_first() {
        let firsts: HashSet<String> = (0..200).map(|seed| caption(pool(3, seed).draw(&at(12, 0, 0)))).collect();
        assert_eq!(firsts.len(), 3);
    }
}
