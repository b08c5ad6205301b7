use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use sms_relay::api::relay_routes;
use sms_relay::capability::{CapabilityGate, ReportedPermissionHost};
use sms_relay::config::RelayConfig;
use sms_relay::inbound::{InboundBatchDecoder, JsonUnitDecoder};
use sms_relay::relay::{HttpSmsGateway, LogSender, OutboundSender, RelayEngine, RelayService};
use sms_relay::store::{KeyValueStore, LibSqlStore};
use sms_relay::target::{self, ConfigResolver, HttpRemoteConfig, RemoteConfigSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("invalid SMS_RELAY_* configuration")?;

    // Initialize tracing, with an optional daily log file alongside stderr
    let _log_guard = init_tracing(&config);

    eprintln!("📨 SMS Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);

    // ── Store ────────────────────────────────────────────────────────────
    let store: Arc<dyn KeyValueStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Remote config ────────────────────────────────────────────────────
    let remote: Option<Arc<dyn RemoteConfigSource>> = match config.remote_config_url {
        Some(ref url) => {
            eprintln!("   Remote config: {}", url);
            Some(Arc::new(HttpRemoteConfig::new(
                url.clone(),
                config.remote_api_key.clone(),
            )))
        }
        None => {
            eprintln!("   Remote config: disabled");
            None
        }
    };
    let has_remote = remote.is_some();
    let resolver = Arc::new(ConfigResolver::new(
        store,
        remote,
        config.min_fetch_interval,
    ));

    // ── Outbound ─────────────────────────────────────────────────────────
    let sender: Arc<dyn OutboundSender> = match config.gateway_url {
        Some(ref url) => {
            eprintln!("   Gateway: {}", url);
            Arc::new(HttpSmsGateway::new(url.clone(), config.gateway_token.clone()))
        }
        None => {
            eprintln!("   Gateway: none (dry-run, messages are logged)");
            Arc::new(LogSender)
        }
    };

    // ── Service ──────────────────────────────────────────────────────────
    let host = Arc::new(ReportedPermissionHost::new());
    let gate = Arc::new(CapabilityGate::new(host.clone()));
    let service = Arc::new(RelayService::new(
        gate,
        resolver.clone(),
        InboundBatchDecoder::new(Arc::new(JsonUnitDecoder)),
        RelayEngine::new(sender),
    ));

    let current = service.current_target().await?;
    eprintln!("   Destination: {}\n", current.display);

    if has_remote {
        // Startup fetch runs in the background; inbound handling never waits on it
        let _startup_refresh = service.refresh_remote();
        let _refresh_handle = target::spawn_refresh_ticker(resolver, config.refresh_tick);
    }

    let app = relay_routes(service, Some(host));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Relay API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn init_tracing(config: &RelayConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sms-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
