use chrono::{NaiveDateTime, Timelike};

use crate::models::{Period, PlanEntry, Regime, Site, SoftErrorKind, Target};

/// Mid-day level-compensation scale factors, preserved verbatim from the
/// source. P6/P7 omit scaling.
fn midday_scale_factor(period: Period) -> f64 {
    match period.0 {
        2 => 960.0 / 1440.0,
        3 => 840.0 / 1440.0,
        4 => 480.0 / 1440.0,
        5 => 300.0 / 1440.0,
        _ => 1.0,
    }
}

/// Output of a single reconciliation pass: the new target row plus the
/// effective min_level to plan against (relaxed when the measured level is
/// below the site's configured floor, so planning still proceeds).
pub struct ReconcileOutput {
    pub target: Target,
    pub effective_min_level: f64,
}

/// Seconds remaining from `now` until midnight.
fn seconds_until_midnight(now: NaiveDateTime) -> f64 {
    let elapsed = now.time().num_seconds_from_midnight() as f64;
    (86_400.0 - elapsed).max(0.0)
}

/// Computes today's target volume via a two-transition state machine.
/// `prior_target` is the most recent target row for today, if any (its
/// presence selects the new-day transition vs the mid-day transition).
/// `prior_regime` is today's stored plan, used only on the mid-day path to
/// compute `volume_already_pumped` and the estimated level at the current
/// period. `demand_adjustment_override`, when set, replaces the default
/// demand-adjustment factor of 1.0 on the new-day transition, clamped to
/// [0.9, 1.1].
pub fn reconcile(
    site: &Site,
    now: NaiveDateTime,
    current_period: Period,
    current_level: f64,
    forecast_l_s: &[f64; 48],
    highest_flow_l_s: f64,
    prior_target: Option<&Target>,
    prior_regime: Option<&Regime>,
    estimated_level_at_current_period: Option<f64>,
    demand_adjustment_override: Option<f64>,
) -> ReconcileOutput {
    let mut soft_errors = Vec::new();
    let mut effective_min_level = site.min_level;

    if current_level < site.min_level {
        soft_errors.push(SoftErrorKind::LevelTooLow);
        effective_min_level = current_level;
    }
    if current_level > site.max_level {
        soft_errors.push(SoftErrorKind::LevelTooHigh);
    }

    let (initial_target, level_adjustment, demand_adjustment, volume_already_pumped) =
        match prior_target {
            None => {
                // New day: no target row exists yet for today.
                let initial: f64 = forecast_l_s.iter().sum::<f64>() * 1800.0;
                let level_adjustment = (site.setpoint - current_level) * site.surface_area * 1000.0;
                let demand_adjustment = demand_adjustment_override
                    .map(|v| v.clamp(0.9, 1.1))
                    .unwrap_or(1.0);
                (initial, level_adjustment, demand_adjustment, 0.0)
            }
            Some(prior) => {
                // Mid-day: a target row already exists for today.
                let initial = prior.new_target;
                // Completed entries are periods 1..current_period-1, i.e. the
                // first `current_period.index()` rows of the 0-indexed regime.
                let already_pumped: f64 = prior_regime
                    .map(|regime| {
                        regime[0..current_period.index()]
                            .iter()
                            .map(|e| e.volume_l)
                            .sum()
                    })
                    .unwrap_or(0.0);
                let est_level = estimated_level_at_current_period.unwrap_or(current_level);
                let scale = midday_scale_factor(current_period);
                let level_adjustment = (est_level - current_level) * site.surface_area * 1000.0 * scale;
                (initial, level_adjustment, 1.0, already_pumped)
            }
        };

    let mut new_target = match prior_target {
        None => (initial_target + level_adjustment) * demand_adjustment,
        Some(_) => (initial_target - volume_already_pumped) + level_adjustment,
    };

    let max_achievable = seconds_until_midnight(now) * highest_flow_l_s;
    if new_target >= max_achievable {
        soft_errors.push(SoftErrorKind::MaxVolumeExceeded);
        new_target = max_achievable;
    }

    let target = Target {
        initial_target,
        demand_adjustment,
        level_adjustment,
        volume_already_pumped,
        new_target,
        recorded_at: now,
        soft_errors: soft_errors.clone(),
    };

    ReconcileOutput {
        target,
        effective_min_level,
    }
}
