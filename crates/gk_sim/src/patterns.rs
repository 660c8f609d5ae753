//! Day-of-week and time-of-day demand patterns.
//!
//! The weekday pattern scales a day's total order volume. The intraday
//! profile is a piecewise-constant density over the 24 hours of a day with
//! a lunch and a dinner peak; arrival instants are drawn from it by inverse
//! CDF.

use chrono::Weekday;
use rand::Rng;

use crate::clock::{ONE_DAY_MS, ONE_MIN_MS};

/// Volume multiplier per weekday, Monday first.
pub const WEEKDAY_MULTIPLIERS: [f64; 7] = [
    1.00, // Monday
    1.05, // Tuesday
    1.10, // Wednesday
    1.15, // Thursday
    1.25, // Friday
    1.35, // Saturday
    1.15, // Sunday
];

pub fn weekday_multiplier(weekday: Weekday) -> f64 {
    WEEKDAY_MULTIPLIERS[weekday.num_days_from_monday() as usize]
}

const MINUTES_PER_DAY: u32 = 24 * 60;

/// `(start_minute, end_minute, weight)`; gaps between segments weigh 1.0.
const PEAKS: [(u32, u32, f64); 2] = [
    (11 * 60, 13 * 60 + 30, 3.0), // lunch
    (17 * 60, 20 * 60, 3.5),      // dinner
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    start_min: u32,
    end_min: u32,
    weight: f64,
}

impl Segment {
    fn mass(&self) -> f64 {
        (self.end_min - self.start_min) as f64 * self.weight
    }
}

/// Piecewise-constant arrival density over one day.
#[derive(Debug, Clone)]
pub struct IntradayProfile {
    segments: Vec<Segment>,
    /// Running total of segment mass, in minute-weight units.
    cumulative: Vec<f64>,
}

impl Default for IntradayProfile {
    fn default() -> Self {
        Self::lunch_and_dinner()
    }
}

impl IntradayProfile {
    pub fn lunch_and_dinner() -> Self {
        let mut segments = Vec::new();
        let mut cursor = 0;
        for &(start, end, weight) in &PEAKS {
            if start > cursor {
                segments.push(Segment {
                    start_min: cursor,
                    end_min: start,
                    weight: 1.0,
                });
            }
            segments.push(Segment {
                start_min: start,
                end_min: end,
                weight,
            });
            cursor = end;
        }
        if cursor < MINUTES_PER_DAY {
            segments.push(Segment {
                start_min: cursor,
                end_min: MINUTES_PER_DAY,
                weight: 1.0,
            });
        }

        let mut total = 0.0;
        let cumulative = segments
            .iter()
            .map(|s| {
                total += s.mass();
                total
            })
            .collect();
        Self {
            segments,
            cumulative,
        }
    }

    /// Total minute-weight mass of a day.
    pub fn total_mass(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Relative intensity at `minute_of_day`.
    pub fn multiplier_at(&self, minute_of_day: u32) -> f64 {
        self.segments
            .iter()
            .find(|s| (s.start_min..s.end_min).contains(&minute_of_day))
            .map(|s| s.weight)
            .unwrap_or(1.0)
    }

    /// Draws an offset from midnight in milliseconds, `< ONE_DAY_MS`.
    pub fn sample_offset_ms<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let total = self.total_mass();
        if self.segments.is_empty() || total <= 0.0 {
            return rng.gen_range(0..ONE_DAY_MS);
        }
        let r: f64 = rng.gen_range(0.0..total);
        let idx = self
            .cumulative
            .partition_point(|&c| c <= r)
            .min(self.segments.len() - 1);
        let segment = self.segments[idx];
        let before = if idx == 0 { 0.0 } else { self.cumulative[idx - 1] };
        let minutes_in = (r - before) / segment.weight;
        let offset = (segment.start_min as f64 + minutes_in) * ONE_MIN_MS as f64;
        (offset as u64).min(ONE_DAY_MS - 1)
    }
}
