use clap::Parser;
use tapwire_gateway::config::TlsConfig;
use tapwire_gateway::{Config, GatewayServer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tapwire-gateway", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "TAPWIRE_CONFIG")]
    config: Option<String>,

    /// Plain HTTP port
    #[arg(short, long, env = "TAPWIRE_PORT")]
    port: Option<u16>,

    /// HTTPS port (used only with --cert and --key)
    #[arg(long, env = "TAPWIRE_HTTPS_PORT")]
    https_port: Option<u16>,

    /// Upstream base URL
    #[arg(short, long, env = "TAPWIRE_UPSTREAM")]
    upstream: Option<String>,

    /// PEM certificate for the HTTPS listener
    #[arg(long, env = "TAPWIRE_TLS_CERT", requires = "key")]
    cert: Option<String>,

    /// PEM private key for the HTTPS listener
    #[arg(long, env = "TAPWIRE_TLS_KEY", requires = "cert")]
    key: Option<String>,

    /// Start the synthetic traffic generator
    #[arg(long)]
    simulate: bool,

    /// Emit logs as JSON
    #[arg(long, env = "TAPWIRE_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper_util=warn,rustls=warn"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(port) = args.https_port {
        config.listen.https_port = port;
    }
    if let Some(upstream) = &args.upstream {
        config.upstream.url = upstream.clone();
    }
    if let (Some(cert), Some(key)) = (&args.cert, &args.key) {
        config.listen.tls = Some(TlsConfig {
            cert_path: cert.clone(),
            key_path: key.clone(),
        });
    }
    if args.simulate {
        config.simulation.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;
    let server = GatewayServer::bind(config).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                warn!("Cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
        signal.cancel();
    });

    server.run(shutdown).await
}
