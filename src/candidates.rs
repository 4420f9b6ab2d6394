use crate::models::{Candidate, PumpCandidate};

/// Produces one {speed, flow, volume, cost} candidate per pump in `pumps` for
/// a single remaining period.
///
/// `length_hours` is the remaining fractional hours (from
/// `TariffCalendar::remaining_hours_in`) for the period containing `now`, and
/// the nominal slot length for every later period.
pub fn generate(
    length_hours: f64,
    price: f64,
    pumps: &[PumpCandidate],
    latest_suction_bar: Option<f64>,
) -> Vec<Candidate> {
    pumps
        .iter()
        .map(|p| {
            let flow = p.effective_flow(latest_suction_bar);
            Candidate {
                speed: p.speed.clone(),
                flow_l_s: flow,
                volume_l: flow * length_hours * 3600.0,
                cost: p.energy_kw * price * length_hours,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn pumps() -> Vec<PumpCandidate> {
        vec![
            PumpCandidate {
                speed: "S1".into(),
                flow_l_s: 30.0,
                energy_kw: 40.0,
                rated_suction_bar: 4.0,
            },
            PumpCandidate {
                speed: "S2".into(),
                flow_l_s: 60.0,
                energy_kw: 80.0,
                rated_suction_bar: 4.0,
            },
        ]
    }

    #[test]
    fn volume_and_cost_match_formula() {
        // volume = flow * time * 3600, cost = energy * price * time.
        let cs = generate(2.0, 0.5, &pumps(), None);
        assert_eq!(cs.len(), 2);
        assert_relative_eq!(cs[0].volume_l, 30.0 * 2.0 * 3600.0, max_relative = 1e-6);
        assert_relative_eq!(cs[0].cost, 40.0 * 0.5 * 2.0, max_relative = 1e-6);
    }

    #[test]
    fn suction_adjustment_halves_flow_and_volume() {
        let cs = generate(2.0, 0.5, &pumps(), Some(2.0));
        assert_relative_eq!(cs[0].flow_l_s, 15.0, max_relative = 1e-6);
        assert_relative_eq!(cs[0].volume_l, 15.0 * 2.0 * 3600.0, max_relative = 1e-6);
    }
}
