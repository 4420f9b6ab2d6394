use good_lp::{constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

use crate::errors::OptimizerError;
use crate::models::{Candidate, Period};
use crate::tariff::PERIOD_SLOT_COUNT;

/// Optional fallback: scale the target down by `step` per retry, bottoming
/// out at `floor`, when the solver reports infeasible. Disabled by default
/// so relaxing the target is a deliberate choice, not silent behavior.
#[derive(Debug, Clone, Copy)]
pub struct RelaxationPolicy {
    pub enabled: bool,
    pub floor: f64,
    pub step: f64,
}

impl Default for RelaxationPolicy {
    fn default() -> Self {
        RelaxationPolicy {
            enabled: false,
            floor: 0.85,
            step: 0.01,
        }
    }
}

pub struct OptimizerOutput {
    /// Chosen candidate for each remaining period, in period order.
    pub selection: Vec<Candidate>,
    /// The volume-floor target actually enforced (may be relaxed below the
    /// reconciled target when `RelaxationPolicy::enabled`).
    pub enforced_target: f64,
}

/// Selects exactly one pump-speed candidate per remaining period, minimizing
/// total cost subject to the assignment, volume-floor, and level-bound
/// constraints.
///
/// `candidates_per_period[i]` is the list of candidates for remaining period
/// `current_period + i` (same pump candidates in each row, priced/sized for
/// that period's length). `outflow` is the demand model's rotated forecast:
/// index 0 is the first half-hour sample of `current_period`, so the
/// level-bound accumulation below walks it from index 0, not from an
/// absolute wall-clock offset.
pub fn optimize(
    current_period: Period,
    candidates_per_period: &[Vec<Candidate>],
    target: f64,
    initial_level: f64,
    min_level: f64,
    max_level: f64,
    outflow: &[f64; 48],
    surface_area: f64,
    relaxation: &RelaxationPolicy,
) -> Result<OptimizerOutput, OptimizerError> {
    if candidates_per_period.is_empty() {
        return Err(OptimizerError::NoRemainingPeriods);
    }

    let mut ratio = 1.0_f64;
    loop {
        let attempt_target = target * ratio;
        match solve_once(
            current_period,
            candidates_per_period,
            attempt_target,
            initial_level,
            min_level,
            max_level,
            outflow,
            surface_area,
        ) {
            Ok(selection) => {
                return Ok(OptimizerOutput {
                    selection,
                    enforced_target: attempt_target,
                })
            }
            Err(e) if relaxation.enabled && ratio - relaxation.step >= relaxation.floor => {
                ratio -= relaxation.step;
                log::warn!("optimizer infeasible ({e}), relaxing target to {:.1} L", target * ratio);
            }
            Err(e) => return Err(e),
        }
    }
}

fn solve_once(
    current_period: Period,
    candidates_per_period: &[Vec<Candidate>],
    target: f64,
    initial_level: f64,
    min_level: f64,
    max_level: f64,
    outflow: &[f64; 48],
    surface_area: f64,
) -> Result<Vec<Candidate>, OptimizerError> {
    let r = candidates_per_period.len();
    let c = candidates_per_period[0].len();
    if c == 0 {
        return Err(OptimizerError::NoCandidates);
    }

    let mut problem = ProblemVariables::new();
    let mut x: Vec<Vec<Variable>> = Vec::with_capacity(r);
    for row in candidates_per_period {
        if row.len() != c {
            return Err(OptimizerError::InconsistentCandidateCounts);
        }
        x.push((0..c).map(|_| problem.add(variable().binary())).collect());
    }

    let objective: Expression = (0..r)
        .flat_map(|i| (0..c).map(move |j| (i, j)))
        .map(|(i, j)| candidates_per_period[i][j].cost * x[i][j])
        .sum();

    let mut model = problem.minimise(objective).using(default_solver);

    // (A) Assignment: exactly one candidate per remaining period.
    for i in 0..r {
        let row_sum: Expression = (0..c).map(|j| x[i][j]).sum();
        model = model.with(constraint!(row_sum == 1.0));
    }

    // (V) Volume floor.
    let total_volume: Expression = (0..r)
        .flat_map(|i| (0..c).map(move |j| (i, j)))
        .map(|(i, j)| candidates_per_period[i][j].volume_l * x[i][j])
        .sum();
    model = model.with(constraint!(total_volume >= target));

    // (L) Level bounds at every half-hour sample covered by the remaining
    // periods, accumulating net flow from the start of the current period.
    // `outflow` is already rotated so slot 0 here is the first half-hour of
    // `current_period`.
    let factor = 1.0 / surface_area;
    let mut cumulative: Expression = Expression::from(0.0);
    let mut slot = 0;
    for i in 0..r {
        let flow_expr: Expression = (0..c)
            .map(|j| candidates_per_period[i][j].flow_l_s * x[i][j])
            .sum();
        for _ in 0..PERIOD_SLOT_COUNT[(current_period.index() + i).min(6)] {
            if slot >= 48 {
                break;
            }
            let net = flow_expr.clone() - outflow[slot];
            cumulative = cumulative + net * 1.8 * factor;
            let level_expr = cumulative.clone() + initial_level;
            model = model.with(constraint!(level_expr.clone() >= min_level));
            model = model.with(constraint!(level_expr <= max_level));
            slot += 1;
        }
    }

    let solution = model
        .solve()
        .map_err(|e| OptimizerError::Infeasible(e.to_string()))?;

    let mut selection = Vec::with_capacity(r);
    for i in 0..r {
        let chosen = (0..c)
            .find(|&j| solution.value(x[i][j]) > 0.5)
            .ok_or(OptimizerError::NoSelectionExtracted)?;
        selection.push(candidates_per_period[i][chosen].clone());
    }

    Ok(selection)
}
