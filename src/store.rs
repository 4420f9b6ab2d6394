use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{Days, NaiveDate, Weekday};
use glob::glob;

use crate::errors::StoreError;
use crate::models::{CostSchedule, HistoricalOutflow, PumpCandidate, Regime, Site, TariffSlot, Target};
use crate::{retry, wrapper};

/// The persistence collaborator: reads the site's immutable reference data
/// and today's prior regime/targets, and writes today's regime upsert and
/// target append. This trait is the seam the core plans against.
pub trait Store {
    fn site(&self, site_id: &str) -> Result<Site, StoreError>;
    fn pumps(&self, site_id: &str, combo: &str) -> Result<Vec<PumpCandidate>, StoreError>;
    fn tariff(&self, tariff_id: &str) -> Result<[TariffSlot; 7], StoreError>;
    fn cost(&self, cost_id: &str, month: u32) -> Result<CostSchedule, StoreError>;
    fn historical(&self, site_id: &str, weekday: Weekday) -> Result<HistoricalOutflow, StoreError>;
    fn regime(&self, site_id: &str, today: NaiveDate) -> Result<Option<Regime>, StoreError>;
    fn targets(&self, site_id: &str, today: NaiveDate) -> Result<Vec<Target>, StoreError>;
    fn suction_pressure(&self, site_id: &str) -> Result<Option<f64>, StoreError>;

    fn write_regime(&self, site_id: &str, today: NaiveDate, regime: &Regime) -> Result<(), StoreError>;
    fn append_target(&self, site_id: &str, today: NaiveDate, target: &Target) -> Result<(), StoreError>;
}

/// One JSON document per relation per site under a configured root
/// directory.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFileStore { root: root.into() }
    }

    fn path(&self, relation: &str, site_id: &str) -> PathBuf {
        self.root.join(format!("{site_id}.{relation}.json"))
    }

    fn regime_path(&self, site_id: &str, today: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{site_id}.regime.{}.json", today.format("%Y-%m-%d")))
    }

    fn targets_path(&self, site_id: &str, today: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{site_id}.target.{}.json", today.format("%Y-%m-%d")))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
        let raw = retry!(|| fs::read_to_string(path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes via a temp file + rename so a concurrent reader never observes
    /// a half-written document.
    fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Removes date-stamped regime files for `site_id` older than 2 days:
    /// glob the date-stamped pattern, parse the embedded date, drop anything
    /// past the retention cutoff.
    fn retire_old_regimes(&self, site_id: &str, today: NaiveDate) -> Result<(), StoreError> {
        let pattern = self
            .root
            .join(format!("{site_id}.regime.*.json"))
            .to_string_lossy()
            .into_owned();
        let cutoff = today.checked_sub_days(Days::new(2)).unwrap_or(today);
        for entry in glob(&pattern).map_err(|e| StoreError::NotFound("regime".into(), e.to_string()))? {
            let Ok(path) = entry else { continue };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(date_str) = stem.rsplit('.').next() else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                continue;
            };
            if date < cutoff {
                let _ = fs::remove_file(&path);
            }
        }
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn site(&self, site_id: &str) -> Result<Site, StoreError> {
        Self::read_json(&self.path("site", site_id))
    }

    fn pumps(&self, site_id: &str, combo: &str) -> Result<Vec<PumpCandidate>, StoreError> {
        Self::read_json(&self.path(&format!("pump.{combo}"), site_id))
    }

    fn tariff(&self, tariff_id: &str) -> Result<[TariffSlot; 7], StoreError> {
        let path = self.root.join(format!("tariff.{tariff_id}.json"));
        Self::read_json(&path)
    }

    fn cost(&self, cost_id: &str, month: u32) -> Result<CostSchedule, StoreError> {
        let path = self.root.join(format!("cost.{cost_id}.{month:02}.json"));
        Self::read_json(&path)
    }

    fn historical(&self, site_id: &str, weekday: Weekday) -> Result<HistoricalOutflow, StoreError> {
        let path = self.path(&format!("historical.{weekday}"), site_id);
        Self::read_json(&path)
    }

    fn regime(&self, site_id: &str, today: NaiveDate) -> Result<Option<Regime>, StoreError> {
        let path = self.regime_path(site_id, today);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_json(&path)?))
    }

    fn targets(&self, site_id: &str, today: NaiveDate) -> Result<Vec<Target>, StoreError> {
        let path = self.targets_path(site_id, today);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_json(&path)
    }

    fn suction_pressure(&self, site_id: &str) -> Result<Option<f64>, StoreError> {
        let path = self.path("suction_pressure", site_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_json(&path)?))
    }

    fn write_regime(&self, site_id: &str, today: NaiveDate, regime: &Regime) -> Result<(), StoreError> {
        Self::write_json_atomic(&self.regime_path(site_id, today), regime)?;
        self.retire_old_regimes(site_id, today)
    }

    fn append_target(&self, site_id: &str, today: NaiveDate, target: &Target) -> Result<(), StoreError> {
        let path = self.targets_path(site_id, today);
        let mut targets: Vec<Target> = if path.exists() {
            Self::read_json(&path)?
        } else {
            Vec::new()
        };
        targets.push(target.clone());
        Self::write_json_atomic(&path, &targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SoftErrorKind;
    use std::fs as stdfs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_store() -> (JsonFileStore, PathBuf) {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("aec_store_test_{}_{n}", std::process::id()));
        stdfs::create_dir_all(&dir).unwrap();
        (JsonFileStore::new(dir.clone()), dir)
    }

    #[test]
    fn regime_is_none_before_first_write() {
        let (store, dir) = temp_store();
        let today = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        assert!(store.regime("s1", today).unwrap().is_none());
        let _ = stdfs::remove_dir_all(dir);
    }

    #[test]
    fn append_target_accumulates_history() {
        let (store, dir) = temp_store();
        let today = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let target = Target {
            initial_target: 1.0,
            demand_adjustment: 1.0,
            level_adjustment: 0.0,
            volume_already_pumped: 0.0,
            new_target: 1.0,
            recorded_at: today.and_hms_opt(0, 0, 0).unwrap(),
            soft_errors: vec![SoftErrorKind::LevelTooLow],
        };
        store.append_target("s1", today, &target).unwrap();
        store.append_target("s1", today, &target).unwrap();
        let all = store.targets("s1", today).unwrap();
        assert_eq!(all.len(), 2);
        let _ = stdfs::remove_dir_all(dir);
    }

    fn entry(flow: f64) -> crate::models::PlanEntry {
        crate::models::PlanEntry {
            period: crate::models::Period(1),
            speed: "S1".into(),
            flow_l_s: flow,
            length_hours: 8.0,
            volume_l: flow * 8.0 * 3600.0,
            cost: 0.0,
            est_level: 4.75,
            combination: "C1".into(),
        }
    }

    #[test]
    fn write_regime_retires_stale_date_stamped_files() {
        let (store, dir) = temp_store();
        let stale_day = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let regime: Regime = std::array::from_fn(|_| entry(30.0));

        JsonFileStore::write_json_atomic(&store.regime_path("s1", stale_day), &regime).unwrap();
        assert!(store.regime_path("s1", stale_day).exists());

        store.write_regime("s1", today, &regime).unwrap();

        assert!(!store.regime_path("s1", stale_day).exists());
        assert!(store.regime_path("s1", today).exists());
        let _ = stdfs::remove_dir_all(dir);
    }
}
