use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetwatch::{
    api::{ApiConfig, ApiState, spawn_api_server},
    broadcast::LogBroadcaster,
    collectors::{
        Dispatcher, health::HealthCollector, logger_config::LoggerConfigCollector,
        logs::LogsCollector, metrics::MetricsCollector,
    },
    config::{Config, read_config_file},
    discovery::{OrchestratorScan, RegistrationRequest, StaticInventory, register_direct},
    probe::HttpProbe,
    registry::{Registry, RegistryLimits},
    scheduler::{SchedulerConfig, SchedulerHandle},
    util,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetwatch", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    let registry = Registry::new(RegistryLimits {
        recent_metric_limit: config.recent_metric_limit,
        recent_log_limit: config.recent_log_limit,
    });

    let probe: Arc<dyn fleetwatch::probe::EndpointProbe> = Arc::new(HttpProbe::with_timeouts(
        Duration::from_secs(config.probe_timeout_seconds),
        config.probe_timeouts.durations(),
    ));
    let broadcaster = LogBroadcaster::new();

    let loggers = Arc::new(LoggerConfigCollector::new(probe.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(registry.clone())
            .with_collector(Arc::new(HealthCollector::new(probe.clone())))
            .with_collector(Arc::new(MetricsCollector::new(
                probe.clone(),
                registry.clone(),
            )))
            .with_collector(Arc::new(LogsCollector::new(
                probe.clone(),
                registry.clone(),
                broadcaster.clone(),
                config.recent_log_limit,
            )))
            .with_collector(loggers.clone()),
    );

    let inventory = Arc::new(StaticInventory::new(vec![]));
    let scan = Arc::new(OrchestratorScan::new(
        inventory.clone(),
        registry.clone(),
        probe.clone(),
        config.default_probe_port,
    ));

    seed_services(&registry, probe.as_ref(), &config).await;

    let scheduler = SchedulerHandle::spawn(
        registry.clone(),
        dispatcher.clone(),
        Some(scan),
        probe.clone(),
        SchedulerConfig {
            discovery_interval: Duration::from_secs(config.discovery_interval_seconds),
            collection_interval: Duration::from_secs(config.collection_interval_seconds),
            max_age_seconds: config.max_poll_age_seconds,
            down_backoff_seconds: config.down_backoff_seconds,
        },
    );

    let bind_addr = SocketAddr::from((util::get_addr(), util::get_port()));
    let state = ApiState {
        registry: registry.clone(),
        scheduler: scheduler.clone(),
        dispatcher,
        broadcaster,
        probe,
        loggers,
        inventory,
    };
    let addr = spawn_api_server(
        ApiConfig {
            bind_addr,
            enable_cors: true,
        },
        state,
    )
    .await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.shutdown().await?;

    Ok(())
}

/// Registers the services listed in the config file as manual entries.
async fn seed_services(
    registry: &Registry,
    probe: &dyn fleetwatch::probe::EndpointProbe,
    config: &Config,
) {
    let Some(services) = &config.services else {
        return;
    };

    for seed in services {
        let request = RegistrationRequest {
            name: seed.name.clone(),
            probe_base_url: seed.probe_base_url.clone(),
            external_id: seed.external_id.clone(),
            poll_interval_seconds: seed.poll_interval_seconds,
            // Seeded services are static config entries; their endpoints
            // come from the configured paths instead of link discovery
            paths: Some(seed.paths.clone().unwrap_or_else(|| config.paths.clone())),
            auto_register: Some(false),
            ..RegistrationRequest::default()
        };

        match register_direct(registry, probe, request).await {
            Ok(service) => info!(service = %service.name, "seeded from config"),
            Err(e) => {
                warn!("failed to seed service {}: {e}", seed.name);
            }
        }
    }
}
