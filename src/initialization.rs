use std::env;

use log::info;

use crate::config::{load_config, Config};
use crate::errors::AecInitError;
use crate::logging::setup_logger;
use crate::models::RunInput;
use crate::notify::Notifier;
use crate::store::{JsonFileStore, Store};

/// Bundle of collaborators a single planner run needs, built once by
/// `init()`.
pub struct Mgr {
    pub store: Box<dyn Store>,
    pub notify: Option<Notifier>,
}

/// Parses the CLI arguments, loads configuration, sets up logging, and
/// returns the run input plus a `Mgr` bundle.
pub fn init() -> Result<(Config, Mgr, RunInput), AecInitError> {
    let args: Vec<String> = env::args().collect();

    let config_path = arg_value(&args, "--config=")
        .ok_or("--config=<path> argument should be present")?;
    let site_id = arg_value(&args, "--site=")
        .ok_or("--site=<id> argument should be present")?;
    let combination = arg_value(&args, "--combo=")
        .ok_or("--combo=<label> argument should be present")?;
    let level_str = arg_value(&args, "--level=")
        .ok_or("--level=<metres> argument should be present")?;
    let current_level: f64 = level_str
        .parse()
        .map_err(|_| AecInitError(format!("--level={level_str} is not a valid number")))?;
    let debug = args.iter().any(|a| a == "--debug");

    let config = load_config(&config_path)?;

    setup_logger(&config.general)?;

    info!(
        "starting aec_regime_planner version: {}",
        env!("CARGO_PKG_VERSION")
    );

    // Store credentials are supplied via the process environment. The
    // JSON-file store's only credential is its filesystem root, so
    // AEC_STORE_DIR overrides the config file's `store.root_dir` when set.
    let store_root = env::var("AEC_STORE_DIR").unwrap_or_else(|_| config.store.root_dir.clone());
    let store = JsonFileStore::new(store_root);
    let notify = match &config.notify {
        Some(params) => Some(Notifier::new(params)?),
        None => None,
    };

    let mgr = Mgr {
        store: Box::new(store),
        notify,
    };

    let run_input = RunInput {
        site_id,
        combination,
        current_level,
        debug,
    };

    Ok((config, mgr, run_input))
}

fn arg_value(args: &[String], prefix: &str) -> Option<String> {
    args.iter()
        .find(|a| a.starts_with(prefix))
        .and_then(|a| a.split_once('=').map(|(_, v)| v.to_string()))
}
