use crate::level;
use crate::models::{Candidate, HistoricalOutflow, Period, PlanEntry, Regime, Site};
use crate::tariff::TariffCalendar;

/// Merges the optimizer's selection (covering `current_period..=7`) with the
/// already-executed entries of `prior_regime` (periods `1..current_period`,
/// if any), attaches estimated levels, and emits the full 7-entry regime.
pub fn reconcile_plan(
    current_period: Period,
    selection: &[Candidate],
    lengths: &[f64],
    prior_regime: Option<&Regime>,
    combination: &str,
    period_start_levels: &[f64; 7],
) -> Regime {
    assert_eq!(selection.len(), lengths.len());
    assert_eq!(selection.len(), 7 - current_period.index());

    std::array::from_fn(|i| {
        let period = Period(i + 1);
        if period < current_period {
            // Completed periods are immutable.
            if let Some(regime) = prior_regime {
                return regime[i].clone();
            }
        }
        let remaining_idx = i - current_period.index();
        let c = &selection[remaining_idx];
        PlanEntry {
            period,
            speed: c.speed.clone(),
            flow_l_s: c.flow_l_s,
            length_hours: lengths[remaining_idx],
            volume_l: c.volume_l,
            cost: c.cost,
            est_level: period_start_levels[i],
            combination: combination.to_string(),
        }
    })
}

/// The recalculation trigger: simulates forward using the *stored* plan's
/// flows; if every predicted half-hour level *from the current period
/// onward* lies strictly within `(min_level, max_level)`, no replanning is
/// needed. Seeded from the level recorded for period 1
/// (`prior_regime[0].est_level`), not an arbitrary constant, and checked
/// only from `current_sample` onward so completed, immutable periods never
/// enter the decision.
pub fn needs_replan(
    prior_regime: &Regime,
    site: &Site,
    historical: &HistoricalOutflow,
    current_level: f64,
    current_period: Period,
) -> bool {
    let outflow = historical.0;
    let inflow = inflow_from_regime(prior_regime);
    let current_sample = TariffCalendar::sample_index_of_period_start(current_period);
    let initial_level = prior_regime[0].est_level;
    let levels = level::estimate(
        initial_level,
        current_level,
        current_sample,
        &inflow,
        &outflow,
        site.surface_area,
    );

    !levels[current_sample..]
        .iter()
        .all(|l| *l > site.min_level && *l < site.max_level)
}

/// Replicates each period's chosen flow across the number of half-hour slots
/// it spans, producing the 48-slot inflow vector the estimator needs.
pub(crate) fn inflow_from_regime(regime: &Regime) -> [f64; 48] {
    use crate::tariff::PERIOD_SLOT_COUNT;
    let mut inflow = [0.0; 48];
    let mut slot = 0;
    for (i, entry) in regime.iter().enumerate() {
        for _ in 0..PERIOD_SLOT_COUNT[i] {
            if slot >= 48 {
                break;
            }
            inflow[slot] = entry.flow_l_s;
            slot += 1;
        }
    }
    inflow
}
