use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// Tariff class a half-hour slot is billed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TariffClass {
    Day,
    Peak,
    Evening,
    Night,
}

/// One of the 7 fixed daily periods, T1..T7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period(pub usize);

impl Period {
    pub fn index(self) -> usize {
        self.0 - 1
    }

    pub fn name(self) -> String {
        format!("T{}", self.0)
    }
}

/// Immutable per-run site attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub min_level: f64,
    pub max_level: f64,
    pub setpoint: f64,
    pub surface_area: f64,
    pub tariff_id: String,
    pub cost_id: String,
    pub suction_adjustment: bool,
}

/// One row per (site, combination, speed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpCandidate {
    pub speed: String,
    pub flow_l_s: f64,
    pub energy_kw: f64,
    pub rated_suction_bar: f64,
}

impl PumpCandidate {
    /// Flow scaled by `latest_suction / rated_suction` when suction adjustment
    /// is enabled on the site.
    pub fn effective_flow(&self, latest_suction_bar: Option<f64>) -> f64 {
        match latest_suction_bar {
            Some(latest) if self.rated_suction_bar > 0.0 => {
                self.flow_l_s * (latest / self.rated_suction_bar)
            }
            _ => self.flow_l_s,
        }
    }
}

/// One of the 7 fixed daily tariff slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffSlot {
    pub period: Period,
    pub length_hours: f64,
    pub weekday_class: TariffClass,
    pub weekend_class: TariffClass,
}

/// Per-kWh price for each tariff class, for a given cost id and month.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostSchedule {
    pub day: f64,
    pub peak: f64,
    pub evening: f64,
    pub night: f64,
}

impl CostSchedule {
    pub fn price(&self, class: TariffClass) -> f64 {
        match class {
            TariffClass::Day => self.day,
            TariffClass::Peak => self.peak,
            TariffClass::Evening => self.evening,
            TariffClass::Night => self.night,
        }
    }
}

/// 48 half-hour average outflow samples, in litres per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalOutflow(pub [f64; 48]);

/// The day's reconciled target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub initial_target: f64,
    pub demand_adjustment: f64,
    pub level_adjustment: f64,
    pub volume_already_pumped: f64,
    pub new_target: f64,
    pub recorded_at: NaiveDateTime,
    pub soft_errors: Vec<SoftErrorKind>,
}

/// An advisory, non-aborting condition recorded on a `Target` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftErrorKind {
    LevelTooLow,
    LevelTooHigh,
    MaxVolumeExceeded,
}

/// One of today's 7 plan rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub period: Period,
    pub speed: String,
    pub flow_l_s: f64,
    pub length_hours: f64,
    pub volume_l: f64,
    pub cost: f64,
    pub est_level: f64,
    pub combination: String,
}

/// Today's full 7-entry regime, keyed by site and date.
pub type Regime = [PlanEntry; 7];

/// Immutable, assembled-once bundle of everything read for a single run.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub site: Site,
    pub pumps: Vec<PumpCandidate>,
    pub tariff: [TariffSlot; 7],
    pub cost: CostSchedule,
    pub historical: HistoricalOutflow,
    pub suction_pressure: Option<f64>,
}

/// Mutable per-run bundle threaded explicitly through the compute phase.
#[derive(Debug, Clone)]
pub struct RunState {
    pub now: NaiveDateTime,
    pub today: NaiveDate,
    pub current_level: f64,
    pub soft_errors: Vec<SoftErrorKind>,
}

/// CLI-level invocation record.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub site_id: String,
    pub combination: String,
    pub current_level: f64,
    pub debug: bool,
}

/// A single candidate's flow, volume and cost for one remaining period.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub speed: String,
    pub flow_l_s: f64,
    pub volume_l: f64,
    pub cost: f64,
}

pub fn weekday_is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}
