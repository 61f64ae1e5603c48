//! # Alpaca Stream Live Test
//!
//! Connects to a live Alpaca-compatible stream with credentials from the
//! environment and prints the first frames it receives.
//!
//! ```text
//! ALPACA_WS_SERVER=wss://... ALPACA_API_KEY=... ALPACA_API_SECRET=... \
//!     test_alpaca_stream --quotes SPY,QQQ --frames 10
//! ```

use std::time::Duration;

use clap::Parser;
use lib_feeds::markets::alpaca::{AlpacaWebSocket, ClientConfig, Credentials, Subscription};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, env = "ALPACA_WS_SERVER")]
    server: String,

    #[clap(long, env = "ALPACA_API_KEY")]
    key: String,

    #[clap(long, env = "ALPACA_API_SECRET")]
    secret: String,

    /// Quote symbols to subscribe to.
    #[clap(long, value_delimiter = ',', default_value = "SPY")]
    quotes: Vec<String>,

    /// Number of frames to print before exiting.
    #[clap(short, long, default_value_t = 5)]
    frames: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    env_logger::init();
    let args = Args::parse();

    let topics = Subscription {
        quotes: args.quotes,
        ..Default::default()
    }
    .as_canonical();
    let config = ClientConfig::new(args.server, Credentials::new(args.key, args.secret), topics);

    let (tx, mut rx) = mpsc::channel(64);
    let feed = AlpacaWebSocket::new(config, tx);

    println!("[*] Connecting to {} ...", feed.config().endpoint);
    let listener = tokio::spawn(async move { feed.listen().await });

    for n in 1..=args.frames {
        match tokio::time::timeout(Duration::from_secs(60), rx.recv()).await {
            Ok(Some(frame)) => println!("[{n}] {}", String::from_utf8_lossy(&frame)),
            Ok(None) => break,
            Err(_) => {
                eprintln!("[ERROR] no frame within 60s");
                break;
            }
        }
    }

    // Dropping the receiver ends listen() cleanly.
    drop(rx);
    match listener.await? {
        Ok(()) => println!("[SUCCESS] stream closed"),
        Err(e) => {
            eprintln!("\n[ERROR] stream failed:\n>>> {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
