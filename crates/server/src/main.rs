use futures_util::StreamExt;
use papertrade_server::{PaperTrade, PaperTradeService, ServerConfig, StaticIdentityProvider, feed_for};
use std::sync::Arc;

fn print_help() {
    eprintln!(
        r#"papertrade - paper trading against live crypto prices

USAGE:
    papertrade [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --watch <SYMBOL>    Print throttled live prices of SYMBOL as JSON lines
    --help              Print this help message

ENVIRONMENT VARIABLES:
    FEED                Quote feed provider: coinbase | binance
    SYMBOLS             Comma-separated supported symbols (default: BTC,ETH,DOGE)
    RUST_LOG            Log level filter (default: info)

EXAMPLES:
    # Run with defaults
    papertrade

    # Watch BTC from Binance
    FEED=binance papertrade --watch BTC
"#
    );
}

async fn print_prices(service: Arc<PaperTradeService>, symbol: String) {
    loop {
        let mut prices = match service.watch(&symbol).await {
            Ok(prices) => prices,
            Err(e) => {
                log::error!("Cannot watch {}: {}", symbol, e);
                return;
            }
        };
        while let Some(point) = prices.next().await {
            match serde_json::to_string(&point) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Failed to encode price: {}", e),
            }
        }
        log::info!("Watch session on {} ended, starting a new one", symbol);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut watch: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            "--watch" | "-w" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --watch requires a symbol");
                    std::process::exit(1);
                }
                watch = Some(args[i].clone());
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => {
            log::info!("Loading configuration from: {}", path);
            ServerConfig::from_file(&path)?
        }
        None => {
            log::info!("Using default configuration");
            ServerConfig::default()
        }
    }
    .with_env_overrides()?;

    let identities = Arc::new(StaticIdentityProvider::from_entries(&config.identities));
    log::info!("{} static identities loaded", identities.len());
    let feed = feed_for(&config.feed);
    log::info!("Feed: {} ({})", config.feed.provider, config.feed.url());

    let app = PaperTrade::start(config, feed, identities);

    let watcher = watch.map(|symbol| tokio::spawn(print_prices(app.service.clone(), symbol)));

    tokio::signal::ctrl_c().await?;
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    app.shutdown().await;
    Ok(())
}
