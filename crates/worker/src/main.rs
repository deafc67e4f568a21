use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relay-worker")]
#[command(about = "Relay completion requests from a Pulsar topic to the upstream API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Consume the topic and relay completions until Ctrl+C or SIGTERM (the default command).
    Run {
        /// Config file path (default: RELAY_CONFIG_PATH; environment variables override it)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Topic to consume (overrides TOPIC)
        #[arg(long, short)]
        topic: Option<String>,

        /// Serve GET /health on this port (overrides HEALTH_PORT)
        #[arg(long)]
        health_port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay-worker {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run {
            config,
            topic,
            health_port,
        }) => {
            if let Err(e) = run(config, topic, health_port).await {
                log::error!("worker failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            if let Err(e) = run(None, None, None).await {
                log::error!("worker failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run(
    config_path: Option<std::path::PathBuf>,
    topic: Option<String>,
    health_port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = relay::config::load_config(config_path)?;
    relay::config::apply_env(&mut config)?;
    if let Some(t) = topic {
        config.queue.topic = Some(t);
    }
    if let Some(p) = health_port {
        config.health.port = Some(p);
    }
    let settings = relay::config::Settings::from_config(&config)?;
    relay::worker::run(settings).await
}
