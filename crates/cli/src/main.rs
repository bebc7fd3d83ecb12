mod config_commands;

use std::path::PathBuf;

use {
    anyhow::{Context, bail},
    clap::{Parser, Subcommand},
    switchyard_config::{Severity, SwitchyardConfig, load_or_discover, validate_config},
    switchyard_gateway::{AppState, Mesh, bind, build_gateway_app, serve},
    switchyard_metrics::{MetricsRecorderConfig, init_metrics},
    switchyard_protocol::SubmitRequest,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "switchyard", about = "Switchyard, a message-routing mesh")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mesh and the gateway server (default when no subcommand is provided).
    Serve {
        /// Address to bind to (overrides config value).
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config value).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one message through an in-process mesh and print the response.
    Send {
        #[arg(short, long)]
        message: String,
        #[arg(long, default_value = "cli")]
        identity: String,
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the effective configuration as TOML.
    Config(config_commands::ConfigArgs),
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the config and refuse to continue on validation errors.
fn load_checked(path: Option<&std::path::Path>) -> anyhow::Result<SwitchyardConfig> {
    let config = load_or_discover(path)?;
    let diagnostics = validate_config(&config);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => {},
        }
    }
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    if errors > 0 {
        bail!("configuration has {errors} error(s); run `switchyard config --validate`");
    }
    Ok(config)
}

async fn run_serve(
    config: SwitchyardConfig,
    bind_override: Option<String>,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: vec![("service".into(), "switchyard".into())],
    })?;

    let bind_addr = bind_override.unwrap_or_else(|| config.server.bind.clone());
    let port = port_override.unwrap_or(config.server.port);
    let max_frame_bytes = config.gateway.max_frame_bytes;

    let mesh = Mesh::builder(config).start().await?;
    let app = build_gateway_app(AppState {
        gateway: mesh.gateway().clone(),
        registry: mesh.registry().clone(),
        metrics,
        max_frame_bytes,
    });

    let listener = bind(&bind_addr, port).await?;
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    let served = serve(listener, app, shutdown).await;
    mesh.shutdown().await;
    served.context("gateway server failed")
}

async fn run_send(
    config: SwitchyardConfig,
    message: String,
    identity: String,
    session: Option<String>,
) -> anyhow::Result<()> {
    let mesh = Mesh::builder(config).start().await?;
    let result = mesh
        .gateway()
        .submit(SubmitRequest {
            message,
            customer_identity: identity,
            session_id: session,
        })
        .await;
    mesh.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    match cli.command {
        None => run_serve(load_checked(cli.config.as_deref())?, None, None).await,
        Some(Commands::Serve { bind, port }) => {
            run_serve(load_checked(cli.config.as_deref())?, bind, port).await
        },
        Some(Commands::Send {
            message,
            identity,
            session,
        }) => run_send(load_checked(cli.config.as_deref())?, message, identity, session).await,
        Some(Commands::Config(args)) => config_commands::handle_config(args, cli.config),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory, std::io::Write};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_overrides_parse() {
        let cli = Cli::parse_from(["switchyard", "serve", "--port", "9000", "--json-logs"]);
        assert!(cli.json_logs);
        assert!(matches!(
            cli.command,
            Some(Commands::Serve {
                port: Some(9000),
                bind: None
            })
        ));
    }

    #[test]
    fn verbose_requires_validate() {
        assert!(Cli::try_parse_from(["switchyard", "config", "--verbose"]).is_err());
        assert!(Cli::try_parse_from(["switchyard", "config", "--validate", "--verbose"]).is_ok());
    }

    #[test]
    fn load_checked_rejects_invalid_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\nsteps = []").unwrap();
        assert!(load_checked(Some(file.path())).is_err());
    }

    #[test]
    fn load_checked_accepts_valid_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 9100").unwrap();
        assert_eq!(load_checked(Some(file.path())).unwrap().server.port, 9100);
    }
}
