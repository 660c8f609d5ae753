use crate::clock::ONE_SEC_MS;

/// Small slack so a route whose length is an exact multiple of the ping
/// interval still gets its final ping despite float error.
const PING_COUNT_EPSILON: f64 = 1e-9;

/// One GPS ping relative to pickup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSlot {
    /// Milliseconds after pickup.
    pub offset_ms: u64,
    /// Share of the route covered, `(0, 1]`.
    pub fraction: f64,
    pub eta_mins: f64,
}

/// Pings every `ping_sec` seconds along a route of `route_minutes`.
/// `floor(route_secs / ping_sec)` pings, the k-th at `k * ping_sec`.
pub fn ping_schedule(route_minutes: f64, ping_sec: u64) -> Vec<PingSlot> {
    if ping_sec == 0 || !(route_minutes > 0.0) {
        return Vec::new();
    }
    let route_secs = route_minutes * 60.0;
    let count = (route_secs / ping_sec as f64 + PING_COUNT_EPSILON).floor() as u64;
    (1..=count)
        .map(|k| {
            let elapsed_secs = (k * ping_sec) as f64;
            let fraction = (elapsed_secs / route_secs).min(1.0);
            PingSlot {
                offset_ms: k * ping_sec * ONE_SEC_MS,
                fraction,
                eta_mins: (1.0 - fraction) * route_minutes,
            }
        })
        .collect()
}
