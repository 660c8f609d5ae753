//! Wall-clock pacing for the live phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of real elapsed time. Abstracted so accelerated runs can be tested
/// without actually waiting.
pub trait WallClock: Send + Sync {
    /// Real time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemWallClock {
    started: Instant,
}

impl SystemWallClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemWallClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual wall clock: `sleep` advances elapsed time instantly.
#[derive(Debug, Default)]
pub struct SteppedWallClock {
    elapsed: Mutex<Duration>,
}

impl SteppedWallClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }
}

impl WallClock for SteppedWallClock {
    fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Cooperative cancellation flag shared between a controller and running
/// simulations.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `simulated = wall * speed_up`, anchored at a simulation instant.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    anchor_sim_ms: u64,
    speed_up: f64,
}

impl Pacing {
    pub fn new(anchor_sim_ms: u64, speed_up: f64) -> Self {
        Self {
            anchor_sim_ms,
            speed_up,
        }
    }

    pub fn speed_up(&self) -> f64 {
        self.speed_up
    }

    /// Simulated "now" after `wall_elapsed` of live running.
    pub fn sim_now(&self, wall_elapsed: Duration) -> u64 {
        let sim_delta = wall_elapsed.as_secs_f64() * 1_000.0 * self.speed_up;
        self.anchor_sim_ms.saturating_add(sim_delta as u64)
    }

    /// Real time needed for `sim_delta_ms` of simulated time to pass.
    /// Saturates at [`Duration::MAX`] for vanishing speed-ups.
    pub fn wall_for(&self, sim_delta_ms: u64) -> Duration {
        Duration::try_from_secs_f64(sim_delta_ms as f64 / 1_000.0 / self.speed_up)
            .unwrap_or(Duration::MAX)
    }
}
