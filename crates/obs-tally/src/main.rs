mod config;
mod indicator;
mod logging;
mod obs;

use clap::Parser;
use config::Config;
use indicator::DriverKind;
use obs::ObsClient;
use std::path::PathBuf;
use tally_core::{IndicatorBank, IndicatorSink, ReconcileLoop, TallyState};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "obs-tally",
    about = "Switch tally lights according to sources in OBS scenes"
)]
struct Args {
    /// Path to the config file (JSON, or TOML with a .toml extension)
    #[arg(short = 'c', long = "config", env = "OBS_TALLY_CONFIG")]
    config: PathBuf,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, value_enum, default_value_t = DriverKind::Auto)]
    driver: DriverKind,
    #[arg(long, default_value = "/sys/class/gpio")]
    gpio_root: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _log_guard = logging::init_logging(args.debug, &args.log_dir);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(event = "config_error", path = %args.config.display(), error = %err);
            std::process::exit(1);
        }
    };
    let url = match config.obs.url() {
        Ok(url) => url,
        Err(err) => {
            error!(event = "config_error", error = %err);
            std::process::exit(1);
        }
    };

    let bank = IndicatorBank::new(indicator::build_driver(args.driver, &args.gpio_root));
    let client = ObsClient::new();
    let reconcile = ReconcileLoop::new(
        client.clone(),
        bank,
        config.tallies.clone(),
        config.include_invisible,
    );
    let connection = tokio::spawn(client.run(
        url.clone(),
        config.obs.password.clone(),
        reconcile.handle(),
    ));

    info!(event = "obs_tally_start", url = %url, tallies = config.tallies.len());
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(event = "signal_error", error = %err);
            std::future::pending::<()>().await;
        }
    };
    let mut reconcile = reconcile.run(shutdown).await;

    connection.abort();
    let off = TallyState::all_off(reconcile.tallies());
    reconcile.sink_mut().apply(&off);
    info!(event = "obs_tally_stop", cycles = reconcile.cycles());
}
