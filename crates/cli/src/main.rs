mod tenant_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wagate_config::WagateConfig,
};

#[derive(Parser)]
#[command(name = "wagate", about = "wagate: multi-tenant WhatsApp webhook gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to load instead of discovering `wagate.{toml,yaml,json}`.
    #[arg(long, global = true, env = "WAGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        #[arg(long, env = "WAGATE_BIND")]
        bind: Option<String>,
        #[arg(long, env = "WAGATE_PORT")]
        port: Option<u16>,
        /// Directory holding `users.db` and attachment files.
        #[arg(long, env = "WAGATE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// Tenant management (operates on the database directly).
    Tenants {
        #[command(subcommand)]
        action: tenant_commands::TenantAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<WagateConfig> {
    let mut config = match &cli.config {
        Some(path) => wagate_config::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => wagate_config::discover_and_load(),
    };
    // Terminal QR codes would corrupt structured log output.
    if cli.json_logs {
        config.pairing.print_terminal = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wagate starting");

    let mut config = load_config(&cli)?;
    match cli.command {
        Commands::Gateway {
            bind,
            port,
            data_dir,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if data_dir.is_some() {
                config.storage.data_dir = data_dir;
            }
            wagate_gateway::start_gateway(config).await
        },
        Commands::Tenants { action } => tenant_commands::handle_tenants(action, &config).await,
    }
}
