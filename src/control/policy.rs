//! Five-band hysteresis policy mapping temperature error to a heater setpoint.

/// Lowest threshold accepted by a reach-temperature wait, °C.
pub const MIN_WAIT_TEMP: f64 = 30.0;

/// Share of the headroom between target and `max_temp` used when slightly
/// below target.
const BOOST_FRACTION: f64 = 0.66;

/// Setpoint reduction while slightly above target, °C.
const BACKOFF: f64 = 10.0;

/// Setpoint for a zone that has reached its target at least once.
///
/// `difference` is `current - target`, already rounded to hundredths. Band
/// edges belong to the band closer to zero error.
///
/// | difference | setpoint |
/// |---|---|
/// | ≤ −2 | `max_temp` |
/// | (−2, −0.5] | `target + 0.66 × (max_temp − target)` |
/// | (−0.5, 0.5] | `target` |
/// | (0.5, 2] | `target − 10` |
/// | > 2 | 0 |
pub fn setpoint_for(difference: f64, target: f64, max_temp: f64) -> f64 {
    if difference <= -2.0 {
        max_temp
    } else if difference <= -0.5 {
        target + BOOST_FRACTION * (max_temp - target)
    } else if difference <= 0.5 {
        target
    } else if difference <= 2.0 {
        (target - BACKOFF).max(0.0)
    } else {
        0.0
    }
}

/// Rounds to two decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
