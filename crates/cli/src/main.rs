mod store_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use hotline_config::HotlineConfig;

#[derive(Parser)]
#[command(name = "hotline", about = "Hotline: support chat relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Only look for hotline.{toml,yaml,yml,json} in this directory.
    #[arg(long, global = true, env = "HOTLINE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// SQLite database file (overrides `database.path`).
    #[arg(long, global = true, env = "HOTLINE_DATABASE")]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// User management.
    Users {
        #[command(subcommand)]
        action: store_commands::UserAction,
    },
    /// Message administration.
    Messages {
        #[command(subcommand)]
        action: store_commands::MessageAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file path in use.
    Path,
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

/// Fold command-line overrides into the loaded config.
fn apply_overrides(
    mut config: HotlineConfig,
    database: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> HotlineConfig {
    if let Some(path) = database {
        config.database.path = Some(path);
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = &cli.config_dir {
        hotline_config::set_config_dir(dir.clone());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "hotline starting");

    let config = hotline_config::discover_and_load();

    match cli.command {
        Commands::Gateway { bind, port } => {
            let config = apply_overrides(config, cli.database, bind, port);
            hotline_gateway::start_gateway(config).await
        },
        Commands::Users { action } => {
            let config = apply_overrides(config, cli.database, None, None);
            store_commands::handle_users(action, &config.database.resolved_path()).await
        },
        Commands::Messages { action } => {
            let config = apply_overrides(config, cli.database, None, None);
            store_commands::handle_messages(action, &config.database.resolved_path()).await
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = apply_overrides(config, cli.database, None, None);
                let rendered = toml::to_string_pretty(&config).context("serialize config")?;
                print!("{rendered}");
                Ok(())
            },
            ConfigAction::Path => {
                println!(
                    "{}",
                    hotline_config::find_or_default_config_path().display()
                );
                Ok(())
            },
        },
    }
}
