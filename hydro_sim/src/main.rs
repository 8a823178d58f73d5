//! Hydroponic Fleet Telemetry Simulator CLI
//!
//! Builds a fleet, optionally registers it with the backend, then runs one
//! scenario against an MQTT broker (or the in-process broker with `--local`).

use anyhow::Context;
use clap::Parser;
use hydro_core::{build_topology, TopologyConfig};
use hydro_env::{SimClock, TokioClock, Transport, TransportFactory};
use hydro_sim::bootstrap::DEFAULT_API_URL;
use hydro_sim::{
    BrokerConfig, Engine, LocalBroker, RestBootstrapper, RunContext, ScenarioKind, SimConfig,
    TelemetryPublisher,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Hydroponic fleet telemetry simulator
#[derive(Parser, Debug)]
#[command(name = "hydro-sim")]
#[command(about = "Simulate hydroponic farms and publish their telemetry over MQTT", long_about = None)]
struct Args {
    /// Scenario to run (see --list)
    #[arg(short, long, default_value = "steady-state")]
    scenario: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Number of farms
    #[arg(long, default_value = "5")]
    farms: usize,

    /// Coordinators per farm
    #[arg(long, default_value = "5")]
    coordinators: usize,

    /// Towers per coordinator
    #[arg(long, default_value = "10")]
    towers_per_coord: usize,

    /// Total tower count; derives farms and coordinators (for scale tests)
    #[arg(long)]
    towers: Option<usize>,

    /// Time multiplier: simulated seconds per real second
    #[arg(long)]
    speed: Option<f64>,

    /// Telemetry publish interval in real seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Run time in real seconds
    #[arg(long)]
    duration: Option<f64>,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value = "1883")]
    mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "MQTT_USER", default_value = "user1")]
    mqtt_user: String,

    /// MQTT password
    #[arg(long, env = "MQTT_PASS", default_value = "user1", hide_env_values = true)]
    mqtt_pass: String,

    /// Backend REST API URL
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Skip farm/coordinator registration via the REST API
    #[arg(long)]
    no_bootstrap: bool,

    /// Master seed for topology and noise (0 = random from time)
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Use the in-process broker instead of a real one (implies --no-bootstrap)
    #[arg(long)]
    local: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "debug,rumqttc=info" } else { "info,rumqttc=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

fn print_catalogue() {
    println!("\nAvailable scenarios:\n");
    for kind in ScenarioKind::all() {
        println!("  {:22}  {}", kind.name(), kind.description());
    }
    println!();
}

fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

fn topology_config(args: &Args, seed: u64) -> TopologyConfig {
    match args.towers {
        Some(total) => {
            let config = TopologyConfig::for_total_towers(total, args.towers_per_coord, seed);
            info!(
                "Scale override: {} towers -> {} farms x {} coords x {} towers",
                total, config.farms, config.coordinators_per_farm, config.towers_per_coordinator
            );
            config
        }
        None => TopologyConfig::default()
            .with_farms(args.farms)
            .with_coordinators_per_farm(args.coordinators)
            .with_towers_per_coordinator(args.towers_per_coord)
            .with_seed(seed),
    }
}

/// Explicit flags win over scenario defaults, which win over global defaults.
fn sim_config(args: &Args, kind: ScenarioKind, seed: u64) -> SimConfig {
    let base = SimConfig::default();
    SimConfig::default()
        .with_speed(args.speed.or(kind.default_speed()).unwrap_or(base.speed))
        .with_interval_secs(
            args.interval
                .or(kind.default_interval_secs())
                .unwrap_or(base.interval.as_secs_f64()),
        )
        .with_duration_secs(
            args.duration
                .or(kind.default_duration_secs())
                .unwrap_or(base.duration.as_secs_f64()),
        )
        .with_seed(seed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list {
        print_catalogue();
        return Ok(());
    }

    init_logging(args.verbose)?;
    info!("Hydro Fleet Simulator v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let kind: ScenarioKind = args.scenario.parse()?;
    let seed = resolve_seed(args.seed);
    let config = sim_config(&args, kind, seed);
    let topology = build_topology(&topology_config(&args, seed));

    let clock: Arc<dyn SimClock> = TokioClock::shared();
    let (main_transport, links): (Arc<dyn Transport>, Arc<dyn TransportFactory>) = if args.local {
        info!("Using in-process broker (--local)");
        let broker = Arc::new(LocalBroker::new());
        let main: Arc<dyn Transport> = broker.transport("hydro-simulator");
        let links: Arc<dyn TransportFactory> = broker;
        (main, links)
    } else {
        let broker = BrokerConfig::default()
            .with_endpoint(args.mqtt_host.clone(), args.mqtt_port)
            .with_credentials(args.mqtt_user.clone(), args.mqtt_pass.clone());
        info!("Broker: {}:{}", broker.host, broker.port);
        let main: Arc<dyn Transport> = broker.main_transport();
        let links: Arc<dyn TransportFactory> = Arc::new(broker);
        (main, links)
    };

    let publisher = Arc::new(TelemetryPublisher::new(main_transport, Arc::clone(&clock)));
    if let Err(e) = publisher.connect(config.connect_timeout).await {
        error!("✗ Could not connect to the broker: {}", e);
        return Err(e).context("Broker connection failed");
    }

    if args.no_bootstrap || args.local {
        info!("Skipping REST bootstrap");
    } else {
        let bootstrapper = RestBootstrapper::new(&args.api_url, Arc::clone(&clock))?;
        if let Err(e) = bootstrapper.bootstrap(&topology, &publisher).await {
            error!("✗ Bootstrap failed: {}", e);
            publisher.disconnect().await;
            return Err(e.into());
        }
    }

    let ctx = RunContext {
        publisher: Arc::clone(&publisher),
        links,
        clock,
        connect_timeout: config.connect_timeout,
    };
    let mut engine = Engine::new(kind.create(), topology, config, ctx);

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current tick ...");
            shutdown.trigger();
        }
    });

    let result = engine.run().await;
    publisher.disconnect().await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            error!("✗ Simulator crashed: {}", e);
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("✓ {} finished after {} ticks", summary.scenario, summary.ticks);
    }
    Ok(())
}
