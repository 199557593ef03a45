//! Community simulator entry point: CLI wiring, offline runs, and the live
//! pipeline.

use std::path::Path;
use std::process;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rec_sim::config::ScenarioConfig;
use rec_sim::io::export::export_csv;
use rec_sim::pipeline::{Pipeline, PipelineSettings};
use rec_sim::sim::analyzer::EligibilityAnalyzer;
use rec_sim::sim::closed_loop::ClosedLoop;
use rec_sim::sim::engine::Engine;
use rec_sim::sim::kpi::KpiReport;
use rec_sim::sim::planner::GreedyPlanner;
use rec_sim::topology::Topology;
use rec_sim::transport::store::TelemetryStore;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    ticks_override: Option<usize>,
    telemetry_out: Option<String>,
    live: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("rec-sim: renewable-energy community simulator");
    eprintln!();
    eprintln!("Usage: rec-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --ticks <n>              Override offline run length");
    eprintln!("  --telemetry-out <path>   Export tick reports to CSV (offline run)");
    eprintln!("  --live                   Run the concurrent pipeline until Ctrl-C");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Serve the REST API (implies --live)");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: rec_sim=info).");
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str, what: &str) -> &'a str {
    match args.get(i) {
        Some(v) => v,
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str, what: &str) -> T {
    value.parse::<T>().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{value}\" is not a valid {what}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        ticks_override: None,
        telemetry_out: None,
        live: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                cli.scenario_path = Some(value_of(&args, i, flag, "a path argument").to_string());
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(value_of(&args, i, flag, "a name argument").to_string());
            }
            "--seed" => {
                i += 1;
                let v = value_of(&args, i, flag, "a u64 argument");
                cli.seed_override = Some(parse_number(v, flag, "u64"));
            }
            "--ticks" => {
                i += 1;
                let v = value_of(&args, i, flag, "a count argument");
                cli.ticks_override = Some(parse_number(v, flag, "tick count"));
            }
            "--telemetry-out" => {
                i += 1;
                cli.telemetry_out = Some(value_of(&args, i, flag, "a path argument").to_string());
            }
            "--live" => cli.live = true,
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
                cli.live = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                i += 1;
                let v = value_of(&args, i, flag, "a u16 argument");
                cli.port = parse_number(v, flag, "u16");
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rec_sim=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads, overrides, and validates the scenario; exits on any error.
fn load_scenario(cli: &CliArgs) -> (ScenarioConfig, Topology) {
    // --scenario takes priority, then --preset, then baseline default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(ticks) = cli.ticks_override {
        scenario.simulation.ticks = ticks;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        process::exit(1);
    }

    let topology = scenario.load_topology().unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    });
    (scenario, topology)
}

/// Runs the lock-step closed loop, prints per-tick lines and KPIs.
fn run_offline(cli: &CliArgs, scenario: &ScenarioConfig, topology: &Topology) {
    let engine = Engine::from_scenario(scenario, topology);
    let analyzer = EligibilityAnalyzer::new(scenario.analyzer.urgency_threshold_s);
    let mut closed_loop = ClosedLoop::new(engine, analyzer, GreedyPlanner);

    let reports = closed_loop.run(scenario.simulation.ticks);
    for r in &reports {
        println!("{r}");
    }
    println!("\n{}", KpiReport::from_reports(&reports));

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&reports, Path::new(path)) {
            error!("failed to write CSV: {e}");
            process::exit(1);
        }
        info!(path = %path, "tick reports written");
    }
}

/// Runs the concurrent pipeline until Ctrl-C.
async fn run_live(cli: &CliArgs, scenario: &ScenarioConfig, topology: &Topology) {
    let engine = Engine::from_scenario(scenario, topology);
    let store = Arc::new(TelemetryStore::new(scenario.transport.telemetry_history));
    let pipeline = Pipeline::spawn(
        engine,
        Arc::clone(&store),
        GreedyPlanner,
        PipelineSettings::from_scenario(scenario),
    );

    #[cfg(feature = "api")]
    let server = if cli.serve {
        use std::net::SocketAddr;

        let state = Arc::new(rec_sim::api::AppState {
            topology: topology.clone(),
            engine: pipeline.handle(),
            store: Arc::clone(&store),
            planner: GreedyPlanner,
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(rec_sim::api::serve(state, addr, async {
            let _ = stopped.await;
        }));
        Some((stop, task))
    } else {
        None
    };
    #[cfg(not(feature = "api"))]
    let _ = cli;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for Ctrl-C: {e}");
    }
    info!("shutting down");

    #[cfg(feature = "api")]
    if let Some((stop, task)) = server {
        let _ = stop.send(());
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("API server failed: {e}"),
            Err(e) => error!("API server task failed: {e}"),
        }
    }

    match pipeline.shutdown().await {
        Ok(engine) => info!(
            ticks = engine.ticks_run(),
            battery_kwh = engine.battery().value_kwh(),
            frames_kept = store.len(),
            "final state"
        ),
        Err(e) => {
            error!("engine task failed: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    let cli = parse_args();
    init_tracing();

    let (scenario, topology) = load_scenario(&cli);
    info!(
        members = topology.members.len(),
        consumers = topology.consumer_count(),
        producers = topology.producer_count(),
        seed = scenario.simulation.seed,
        "community loaded"
    );

    if cli.live {
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            error!("failed to create tokio runtime: {e}");
            process::exit(1);
        });
        rt.block_on(run_live(&cli, &scenario, &topology));
    } else {
        run_offline(&cli, &scenario, &topology);
    }
}
