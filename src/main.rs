use anyhow::{anyhow, Result};
use chrono::Local;
use log::{error, info};

use crate::initialization::init;
use crate::worker::run;

mod candidates;
mod config;
mod demand;
mod errors;
mod initialization;
mod level;
mod logging;
mod macros;
pub mod models;
mod notify;
mod optimizer;
mod plan;
mod reconciler;
mod store;
mod tariff;
mod worker;

fn main() -> Result<()> {
    let (config, mut mgr, input) = match init() {
        Ok(bundle) => bundle,
        Err(e) => return Err(anyhow!("initialization failed: {e}")),
    };

    let now = Local::now().naive_local();
    match run(&mut mgr, &config, &input, now) {
        Ok(regime) => {
            info!("plan produced for site {}", input.site_id);
            if let Some(notifier) = &mgr.notify {
                let body = regime
                    .iter()
                    .map(|e| {
                        format!(
                            "{}: speed={} flow={:.1} L/s length={:.2}h volume={:.0} L cost={:.2} est_level={:.2} m",
                            e.period.name(), e.speed, e.flow_l_s, e.length_hours, e.volume_l, e.cost, e.est_level
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                notifier.send(
                    format!("Regime planned for site {}", input.site_id),
                    body,
                )?;
            }
        }
        Err(e) => {
            error!("run failed: {}", e);
            if let Some(notifier) = &mgr.notify {
                notifier.send(
                    format!("Error planning regime for site {}", input.site_id),
                    format!("Run failed: {}", e),
                )?;
            }
            std::process::exit(e.exit_code());
        }
    }

    Ok(())
}
