pub mod basket;
pub mod clock;
pub mod config;
pub mod corruption;
pub mod demand;
pub mod distributions;
pub mod ecs;
pub mod event;
pub mod geography;
pub mod lifecycle;
pub mod momentum;
pub mod patterns;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod systems;
pub mod telemetry;
pub mod weighting;
pub mod writer;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
