// Fleet simulator - main entry point
//
// Parameters are scenario files and key=value overrides, applied in order:
//
// ```console
// $ fleet-synth demo device_count=50 end_time=2017-01-02T00:00:00Z
// $ fleet-synth scenarios/live.json web_listen=127.0.0.1:7777 --verbose
// ```

use anyhow::Context;
use clap::Parser;
use fleet_synth::devices::FleetCounters;
use fleet_synth::simulation::{FleetOrchestrator, LoggingConfig, LoggingGuards, RunStatistics};
use fleet_synth::trigger::TriggerListener;
use fleet_synth::types::{CliArgs, ConfigError, ParameterSet, ScenarioConfig};
use std::process;
use tracing::{error, info, warn};

fn main() {
    let args = CliArgs::parse();

    if args.print_config {
        match ScenarioConfig::default().print_json() {
            Ok(json) => {
                println!("{}", json);
                return;
            }
            Err(e) => {
                eprintln!("Failed to serialize default scenario: {}", e);
                process::exit(1);
            }
        }
    }

    // Parameters first: the log file prefix depends on the instance name
    let params = match ParameterSet::load(&args.params) {
        Ok(params) => params,
        Err(e) => exit_with_config_error(&e),
    };
    let config = match ScenarioConfig::from_params(&params) {
        Ok(config) => config,
        Err(e) => exit_with_config_error(&e),
    };

    let _guards = match init_logging(&args, &config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    log_parameters(&params);

    if let Err(e) = config.validate() {
        error!(error = %e, "Scenario validation failed");
        exit_with_config_error(&e);
    }

    if args.dry_run {
        eprintln!("Scenario is valid.");
        eprintln!("Dry run mode - simulation will not be executed.");
        print_configuration_summary(&config);
        return;
    }

    print_configuration_summary(&config);

    if let Err(e) = run(config) {
        error!(error = %format!("{:#}", e), "Simulation failed");
        eprintln!("Simulation failed: {:#}", e);
        process::exit(1);
    }
}

fn exit_with_config_error(e: &ConfigError) -> ! {
    eprintln!("Configuration error: {}", e);
    process::exit(1);
}

fn init_logging(args: &CliArgs, config: &ScenarioConfig) -> Result<LoggingGuards, fleet_synth::simulation::LoggingError> {
    let mut logging = if args.debug {
        LoggingConfig::debug()
    } else if args.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::quiet()
    };
    if args.json_logs {
        logging = logging.with_json_format();
    }
    if let Some(dir) = &args.log_dir {
        logging = logging
            .with_file_logging(dir.clone())
            .with_file_prefix(format!("fleet-synth-{}", config.instance_name));
    }
    logging.init()
}

fn log_parameters(params: &ParameterSet) {
    for (key, value) in params.sorted() {
        info!("{} = {}", key, value);
    }
    for key in params.unknown_keys() {
        warn!(key, "Ignoring unknown scenario option");
    }
}

fn run(config: ScenarioConfig) -> anyhow::Result<()> {
    let web_listen = config.web_listen.clone();
    let mut orchestrator = FleetOrchestrator::from_config(config).context("could not set up the simulation")?;

    let handle = orchestrator.handle();
    ctrlc::set_handler(move || handle.stop()).context("could not install the Ctrl-C handler")?;

    let listener = match web_listen {
        Some(addr) => Some(
            TriggerListener::spawn(&addr, orchestrator.trigger())
                .with_context(|| format!("could not listen for triggers on {}", addr))?,
        ),
        None => None,
    };

    info!(seeded = orchestrator.seeded(), "Starting simulation");
    let outcome = orchestrator.run();
    if let Some(listener) = listener {
        listener.shutdown();
    }
    let statistics = outcome.context("simulation aborted")?;

    print_final_statistics(&statistics, orchestrator.world().counters());
    Ok(())
}

fn print_configuration_summary(config: &ScenarioConfig) {
    eprintln!("Scenario:");
    eprintln!("  Instance: {}", config.instance_name);
    eprintln!("  Initial Action: {:?}", config.initial_action);
    eprintln!("  Devices: {}", config.device_count);
    eprintln!("  Install Timespan: {}s", config.install_timespan);
    eprintln!(
        "  Battery Life: mu {}s, sigma {}s{}",
        config.battery_life_mu,
        config.battery_life_sigma,
        if config.battery_autoreplace { ", auto-replaced" } else { "" }
    );
    eprintln!(
        "  Comms Reliability: {:.1}% per {}s",
        config.comms_reliability * 100.0,
        config.comms_up_down_period
    );
    eprintln!("  Flush: {} (limit {})", config.queue_criterion, config.queue_limit);
    eprintln!("  Mode: {}", if config.is_live() { "live" } else { "bounded" });
    eprintln!("  Random Seed: {}", config.random_seed);
    eprintln!();
}

fn print_final_statistics(statistics: &RunStatistics, counters: &FleetCounters) {
    eprintln!("{}", statistics.generate_summary_report());
    eprintln!("Fleet:");
    eprintln!("  Devices Installed: {}", counters.devices_installed);
    eprintln!("  Devices Loaded: {}", counters.devices_loaded);
    eprintln!("  Batteries Depleted: {}", counters.batteries_depleted);
    eprintln!("  Batteries Replaced: {}", counters.batteries_replaced);
    eprintln!("  Comms Outages: {} of {} checks", counters.comms_outages, counters.comms_checks);
    eprintln!(
        "  External Triggers: {} accepted, {} ignored",
        counters.triggers_accepted, counters.triggers_ignored
    );
}
