use std::process;

use anyhow::{bail, Context as _};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use capsule::cli::{self, Cli, Commands, ContextAction, NetworkAction, NodesAction};
use capsule::context::{self, Config};
use capsule::state::load_network_state;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending operations");
            on_signal.cancel();
        }
    });

    if let Err(e) = run(cli, &cancel).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(context::default_config_path);
    let mut client_config = context::load_config_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match cli.command {
        Commands::Context(args) => run_context(args.action, &mut client_config, &config_path),
        Commands::Network(args) => {
            let ctx = cli::scheduler_context(
                &client_config,
                cli.scheduler_url.as_deref(),
                cli.scheduler_token.as_deref(),
            )?;
            info!("Using scheduler {} ({})", ctx.url, ctx.name);
            let network = cli::build_network(&ctx, &cli.timing);

            match args.action {
                NetworkAction::Generate { config } => {
                    let config = cli::load_generate_config(&config, cli.home.as_deref())
                        .with_context(|| format!("loading {}", config.display()))?;
                    let state = network.generate(config, cancel).await?;
                    print!("{}", cli::format_generated(&state));
                }
                NetworkAction::Start => {
                    let home = cli::network_home(cli.home.as_deref());
                    network.start(&home, cancel).await?;
                    println!("Network in {} started", home.display());
                }
                NetworkAction::Stop => {
                    let home = cli::network_home(cli.home.as_deref());
                    network.stop(&home).await?;
                    println!("Network in {} stopped", home.display());
                }
                NetworkAction::Destroy => {
                    let home = cli::network_home(cli.home.as_deref());
                    network.destroy(&home).await?;
                    println!("Network in {} destroyed", home.display());
                }
                NetworkAction::Status { json } => {
                    let home = cli::network_home(cli.home.as_deref());
                    let status = network.status(&home).await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                    } else {
                        print!("{}", cli::format_network_status(&status));
                    }
                }
                NetworkAction::Probe => {
                    let home = cli::network_home(cli.home.as_deref());
                    network.probe(&home, cancel).await?;
                    println!("All readiness probes passed");
                }
            }
            Ok(())
        }
        Commands::Nodes(args) => {
            let home = cli::network_home(cli.home.as_deref());
            if let NodesAction::Ls = args.action {
                let state = load_network_state(&home)?;
                if state.empty() {
                    bail!("No network has been generated in {}", home.display());
                }
                print!("{}", cli::format_node_set_list(&cli::node_set_list(&state)));
                return Ok(());
            }

            let ctx = cli::scheduler_context(
                &client_config,
                cli.scheduler_url.as_deref(),
                cli.scheduler_token.as_deref(),
            )?;
            let network = cli::build_network(&ctx, &cli.timing);
            match args.action {
                NodesAction::Start { name } => {
                    network.start_node_set(&home, &name, cancel).await?;
                    println!("Node set {} started", name);
                }
                NodesAction::Stop { name } => {
                    network.stop_node_set(&home, &name).await?;
                    println!("Node set {} stopped", name);
                }
                NodesAction::Ls => {}
            }
            Ok(())
        }
    }
}

fn run_context(
    action: ContextAction,
    config: &mut Config,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    match action {
        ContextAction::List => {
            print!("{}", cli::format_context_list(&cli::context_list(config)));
            return Ok(());
        }
        ContextAction::Current => {
            let (name, url) = cli::context_current(config)?;
            print!("{}", cli::format_current_context(&name, &url));
            return Ok(());
        }
        ContextAction::Use { name } => {
            cli::context_use(config, &name)?;
            println!("Switched to context \"{}\"", name);
        }
        ContextAction::Add { name, url, token } => {
            cli::context_add(config, &name, &url, token.as_deref())?;
            println!("Context \"{}\" added", name);
        }
        ContextAction::Delete { name } => {
            if !cli::context_delete(config, &name) {
                bail!("Context '{}' not found", name);
            }
            println!("Context \"{}\" deleted", name);
        }
    }
    context::save_config_to(config, path)?;
    Ok(())
}
