use crate::models::Period;

/// Propagates reservoir level forward across the day's 48 half-hour samples.
/// `inflow`/`outflow` are in L/s; `surface_area` in m².
///
/// Returns 49 levels: `levels[0]` is the starting level, `levels[k+1]` is the
/// level after half-hour sample `k`. At `current_sample_period` the running
/// level is reset to the measured `current_level` before continuing forward,
/// an on-the-hour correction that keeps the forward simulation anchored to
/// the last real reading.
///
/// Uses the optimizer's continuous scale (`FACTOR = 1 / surface_area`,
/// `net_flow_l_s * 1.8` per half-hour sample) as the physically correct
/// litres-to-metres conversion, rather than an unscaled replay.
pub fn estimate(
    initial_level: f64,
    current_level: f64,
    current_sample_period: usize,
    inflow: &[f64; 48],
    outflow: &[f64; 48],
    surface_area: f64,
) -> [f64; 49] {
    let factor = 1.0 / surface_area;
    let mut levels = [0.0; 49];
    levels[0] = initial_level;

    for k in 0..48 {
        if k == current_sample_period {
            levels[k] = current_level;
        }
        let net_flow = inflow[k] - outflow[k];
        levels[k + 1] = levels[k] + factor * net_flow * 1.8;
    }

    levels
}

/// Attaches `EstLevel` to each of the 7 periods: the level at the half-hour
/// sample where that period starts.
pub fn period_start_levels(levels: &[f64; 49]) -> [f64; 7] {
    std::array::from_fn(|i| levels[crate::tariff::TariffCalendar::sample_index_of_period_start(Period(i + 1))])
}
