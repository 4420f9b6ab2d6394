use chrono::{NaiveDateTime, NaiveTime, Timelike};

use crate::errors::TariffError;
use crate::models::{CostSchedule, Period, TariffClass, TariffSlot};

/// Fixed period boundaries, in minutes past midnight: 00:00, 08:00, 14:00,
/// 16:00, 19:00, 20:30, 22:30, 24:00.
const BOUNDARIES_MIN: [u32; 8] = [0, 480, 840, 960, 1140, 1230, 1350, 1440];

/// Number of half-hour slots each of the 7 periods spans (P1..P7), derived
/// from `BOUNDARIES_MIN`. Shared by the level estimator, optimizer, and plan
/// reconciler.
pub const PERIOD_SLOT_COUNT: [usize; 7] = [16, 12, 4, 6, 3, 4, 3];

/// Maps the 48 half-hour slots of a day to one of 7 tariff periods and
/// exposes period boundaries and remaining-time-in-period.
pub struct TariffCalendar<'a> {
    slots: &'a [TariffSlot; 7],
}

impl<'a> TariffCalendar<'a> {
    pub fn new(slots: &'a [TariffSlot; 7]) -> Self {
        TariffCalendar { slots }
    }

    /// The index (1..7) of the period containing `now`. The instant a
    /// boundary is reached belongs to the later period.
    pub fn current_period(&self, now: NaiveDateTime) -> Period {
        let minute = now.time().hour() * 60 + now.time().minute();
        for i in 0..7 {
            if minute < BOUNDARIES_MIN[i + 1] || i == 6 {
                return Period(i + 1);
            }
        }
        Period(7)
    }

    /// Tariff class → monetary price for the given period.
    pub fn price(
        &self,
        period: Period,
        is_weekend: bool,
        cost: &CostSchedule,
    ) -> Result<f64, TariffError> {
        let slot = self
            .slots
            .get(period.index())
            .ok_or(TariffError::UnknownPeriod(period.0))?;
        let class = if is_weekend {
            slot.weekend_class
        } else {
            slot.weekday_class
        };
        Ok(cost.price(class))
    }

    /// Fractional hours from `now` to the end of `period`; used to shorten
    /// the first optimized period.
    pub fn remaining_hours_in(&self, period: Period, now: NaiveDateTime) -> f64 {
        let end_minute = BOUNDARIES_MIN[period.0] as f64;
        let now_minute = now.time().hour() as f64 * 60.0 + now.time().minute() as f64
            + now.time().second() as f64 / 60.0;
        ((end_minute - now_minute) / 60.0).max(0.0)
    }

    /// Nominal length in hours of `period`, ignoring any partial elapsed time.
    pub fn nominal_length_hours(&self, period: Period) -> f64 {
        self.slots[period.index()].length_hours
    }

    /// Boundary instant, as a `NaiveTime`, at which `period` begins.
    pub fn period_start(period: Period) -> NaiveTime {
        let minute = BOUNDARIES_MIN[period.0 - 1];
        NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).expect("boundary table is valid")
    }

    /// The half-hour sample index (0..47) at which `period` begins.
    pub fn sample_index_of_period_start(period: Period) -> usize {
        (BOUNDARIES_MIN[period.0 - 1] / 30) as usize
    }
}

/// Builds the canonical 7-slot boundary table with the given weekday/weekend
/// tariff classes. The resulting lengths always sum to exactly 24 hours.
pub fn build_slots(classes: [(TariffClass, TariffClass); 7]) -> [TariffSlot; 7] {
    let mut lengths = [0.0; 7];
    for i in 0..7 {
        lengths[i] = (BOUNDARIES_MIN[i + 1] - BOUNDARIES_MIN[i]) as f64 / 60.0;
    }
    std::array::from_fn(|i| TariffSlot {
        period: Period(i + 1),
        length_hours: lengths[i],
        weekday_class: classes[i].0,
        weekend_class: classes[i].1,
    })
}
