use std::fmt;
use std::fmt::Formatter;

use chrono::Local;
use thiserror::Error;

use crate::models::Regime;

/// Error depicting errors that occur during initialization of the main
/// program.
pub struct AecInitError(pub String);

impl fmt::Display for AecInitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AecInitError: {}", self.0)
    }
}
impl From<ConfigError> for AecInitError {
    fn from(e: ConfigError) -> Self {
        AecInitError(e.to_string())
    }
}
impl From<log::SetLoggerError> for AecInitError {
    fn from(e: log::SetLoggerError) -> Self {
        AecInitError(e.to_string())
    }
}
impl From<&str> for AecInitError {
    fn from(e: &str) -> Self {
        AecInitError(e.to_string())
    }
}
impl From<NotifyError> for AecInitError {
    fn from(e: NotifyError) -> Self {
        AecInitError(e.to_string())
    }
}

/// Error depicting errors that occur while running the planner, carrying
/// the regime in scope (if any) for diagnostics the way the prior plan rows
/// helped explain a scheduling failure.
pub struct PlannerError {
    msg: String,
    regime: Option<Regime>,
}

impl PlannerError {
    pub fn new(msg: impl Into<String>) -> PlannerError {
        PlannerError {
            msg: msg.into(),
            regime: None,
        }
    }

    pub fn with_regime(msg: impl Into<String>, regime: Regime) -> PlannerError {
        PlannerError {
            msg: msg.into(),
            regime: Some(regime),
        }
    }

    /// Process exit code returned to the caller on a failed run.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let report_time = format!("{}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let caption = format!("{} PlannerError ", report_time);
        writeln!(f, "{:=<80}", caption)?;
        writeln!(f, "{}", self.msg)?;
        if let Some(regime) = &self.regime {
            writeln!(f, "Prior regime:")?;
            for entry in regime {
                writeln!(f, "  {:?}", entry)?;
            }
        }
        Ok(())
    }
}
impl From<TargetNotSatisfied> for PlannerError {
    fn from(e: TargetNotSatisfied) -> Self {
        PlannerError::new(e.to_string())
    }
}
impl From<InvalidInput> for PlannerError {
    fn from(e: InvalidInput) -> Self {
        PlannerError::new(e.to_string())
    }
}
impl From<StoreError> for PlannerError {
    fn from(e: StoreError) -> Self {
        PlannerError::new(e.to_string())
    }
}
impl From<Timeout> for PlannerError {
    fn from(e: Timeout) -> Self {
        PlannerError::new(e.to_string())
    }
}
impl From<NotifyError> for PlannerError {
    fn from(e: NotifyError) -> Self {
        PlannerError::new(e.to_string())
    }
}
impl From<&str> for PlannerError {
    fn from(e: &str) -> Self {
        PlannerError::new(e)
    }
}

/// Optimizer has no feasible solution even after the optional relaxation
/// ladder. Aborts the run; no regime is written.
#[derive(Debug, Error)]
#[error("target not satisfied: {0}")]
pub struct TargetNotSatisfied(pub String);

/// Missing site, pumps, tariff, cost, or a malformed historical vector.
/// Aborts immediately.
#[derive(Debug, Error)]
#[error("invalid input: {0}")]
pub struct InvalidInput(pub String);

/// The planner exceeded its configured wall-clock budget. Aborts, leaving
/// persisted state untouched.
#[derive(Debug, Error)]
#[error("planner exceeded its {budget_secs}s wall-clock budget")]
pub struct Timeout {
    pub budget_secs: u64,
}

#[derive(Debug, Error)]
pub enum TariffError {
    #[error("no tariff slot defined for period T{0}")]
    UnknownPeriod(usize),
}

#[derive(Debug, Error)]
pub enum DemandError {
    #[error("historical outflow vector is malformed (NaN or negative sample)")]
    MalformedHistorical,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("no remaining periods to plan for")]
    NoRemainingPeriods,
    #[error("no pump candidates supplied")]
    NoCandidates,
    #[error("candidate rows do not all have the same length")]
    InconsistentCandidateCounts,
    #[error("solver reported infeasible: {0}")]
    Infeasible(String),
    #[error("solver returned a solution but no variable crossed the binary threshold")]
    NoSelectionExtracted,
}

/// Any store operation failing. Propagates as fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("relation '{0}' has no row for key '{1}'")]
    NotFound(String, String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("log4rs configuration error: {0}")]
    Log4rs(#[from] log4rs::config::runtime::ConfigErrors),
    #[error("failed to install logger: {0}")]
    SetLogger(#[from] log::SetLoggerError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message build error: {0}")]
    Message(#[from] lettre::error::Error),
}
