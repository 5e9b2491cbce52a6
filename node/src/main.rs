use anyhow::Result;
use chainkey_key_registry::KeyRegistry;
use chainkey_rpc::{start_server, AppState};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod settings;

use settings::{AppConfig, CliOverrides, LogFormat};

fn cli() -> Command {
    Command::new("chainkey-node")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Address/chain key registry service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Override bind host")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override bind port")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Validate the resolved configuration, print it, then exit")
                .global(true),
        )
        .subcommand(Command::new("start").about("Run the key registry service"))
        .subcommand(
            Command::new("status")
                .about("Query the /health endpoint of a running service")
                .arg(
                    Arg::new("health-path")
                        .long("health-path")
                        .value_name("PATH")
                        .default_value("/health")
                        .help("Health endpoint path to query"),
                ),
        )
}

fn load_config_with_overrides(matches: &ArgMatches) -> Result<AppConfig> {
    let config_path = matches.get_one::<String>("config").map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    config.apply_overrides(CliOverrides {
        host: matches.get_one::<String>("host").cloned(),
        port: matches.get_one::<u16>("port").copied(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
    })?;
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
    }

    Ok(())
}

fn print_config(config: &AppConfig) {
    println!("chainkey-node {}", env!("CARGO_PKG_VERSION"));
    match &config.config_path {
        Some(path) => println!("config file:     {}", path.display()),
        None => println!("config file:     (none)"),
    }
    println!("bind address:    {}", config.bind_addr());
    println!("log:             {} ({})", config.log_level, config.log_format);
    println!("allowed origins: {}", config.allowed_origins.join(", "));
    println!("body limit:      {} bytes", config.body_limit_bytes);
}

async fn check_status(config: &AppConfig, health_path: &str) -> Result<()> {
    let mut path = health_path.to_string();
    if !path.starts_with('/') {
        path = format!("/{path}");
    }
    let url = format!("http://{}{}", config.probe_addr(), path);
    let response = reqwest::Client::new().get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    println!("{body}");
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}

async fn run(config: AppConfig) -> Result<()> {
    info!(
        "Starting chainkey-node v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_addr()
    );

    let state = AppState::new(KeyRegistry::new());
    start_server(state, &config.rpc_config(), &config.bind_addr()).await?;

    info!("chainkey-node shut down");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    if let Some(status_matches) = matches.subcommand_matches("status") {
        let config = load_config_with_overrides(status_matches)?;
        let health_path = status_matches
            .get_one::<String>("health-path")
            .map(|value| value.as_str())
            .unwrap_or("/health");
        return check_status(&config, health_path).await;
    }

    let start_matches = matches.subcommand_matches("start").unwrap_or(&matches);
    let config = load_config_with_overrides(start_matches)?;

    if start_matches.get_flag("check") {
        print_config(&config);
        return Ok(());
    }

    init_logging(&config)?;
    run(config).await
}
