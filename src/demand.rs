use crate::errors::DemandError;
use crate::models::{HistoricalOutflow, Period};

/// Shift amounts (slots), fixed by boundary: P1->0, P2->16, P3->28, P4->32,
/// P5->38, P6->41, P7->45.
const SHIFT_BY_PERIOD: [usize; 7] = [0, 16, 28, 32, 38, 41, 45];

/// Validates a 48-slot outflow forecast produced upstream by the store's
/// historical-average query. The averaging itself happens outside this
/// module, against the prior four weeks of same-weekday samples.
pub fn forecast_outflow(historical: &HistoricalOutflow) -> Result<[f64; 48], DemandError> {
    if historical.0.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(DemandError::MalformedHistorical);
    }
    Ok(historical.0)
}

/// Shifts `forecast` so that index 0 aligns with the start of `current_period`.
/// The tail wraps to the head.
pub fn rotate(forecast: &[f64; 48], current_period: Period) -> [f64; 48] {
    let shift = SHIFT_BY_PERIOD[current_period.index()];
    std::array::from_fn(|i| forecast[(i + shift) % 48])
}
