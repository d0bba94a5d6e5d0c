use clap::Parser;
use follower::adapters::HeadlessWorld;
use follower::cli::{self, Cli, Commands};
use follower::config::AppConfig;
use follower::engine::{Adapters, FollowerEngine};
use follower::error::Result;
use follower::services::BroadcastServer;
use follower::settings::{RuntimeSettings, SharedSettings};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Probe { url, timeout_ms }) => {
            init_logging_simple();
            cli::probe(url, *timeout_ms).await?;
        }
        Some(Commands::CheckConfig) => {
            init_logging_simple();
            if !cli::check_config(&cli.config)? {
                std::process::exit(1);
            }
        }
        Some(Commands::Run { role }) => run(&cli.config, role.as_deref()).await?,
        None => run(&cli.config, None).await?,
    }

    Ok(())
}

async fn run(config_dir: &str, role_override: Option<&str>) -> Result<()> {
    let mut config = AppConfig::load_from(config_dir)?;
    if let Some(role) = role_override {
        config.role = role.to_string();
    }
    init_logging(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            warn!("Config: {}", e);
        }
    }

    let settings = SharedSettings::new(RuntimeSettings::from_config(&config));
    let server = BroadcastServer::new(
        settings.clone(),
        &config.leader.bind_address,
        config.leader.port,
    );
    let world = Arc::new(HeadlessWorld::new(
        std::env::var("FOLLOWER_PLAYER_NAME").ok(),
    ));
    let mut engine = FollowerEngine::with_settings(
        &config,
        settings,
        Adapters::headless(world),
        Box::new(server),
    )?;

    if let Err(e) = engine.initialize().await {
        error!("Initial role {} not applied: {}", config.role, e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await;
    info!("Follower engine stopped");
    Ok(())
}

fn init_logging(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    // File logging only when FOLLOWER_LOG_DIR is set and writable.
    //
    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial file, so writability is checked up front.
    let log_dir = std::env::var("FOLLOWER_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                dir, e
            );
            return None;
        }
        let test_path = std::path::Path::new(dir).join(".follower_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(dir, "follower.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Flushes on drop; lives for the whole process.
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let (console_layer, json_layer) = if config.logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/follower.log", dir);
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
