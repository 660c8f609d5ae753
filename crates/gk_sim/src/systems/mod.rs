pub mod day_started;
pub mod emit_stage;
pub mod order_arrival;
