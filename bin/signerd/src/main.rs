use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use signer::{run_signer, HeightGuard, LocalSigner, SignerConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Remote signer daemon: holds the validator signing key and the immutable
/// height watermark, dials into the validator and answers its signing
/// requests.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the validator signer listener
    #[arg(env, long)]
    validator_addr: SocketAddr,

    /// Chain id this signer signs for
    #[arg(env, long)]
    chain_id: String,

    /// Persistent signing key, generated when missing
    #[arg(env, long, default_value = "signer_key.pem")]
    key_file: PathBuf,

    /// Persistent immutable height watermark
    #[arg(env, long, default_value = "signer_watermark.json")]
    state_file: PathBuf,

    /// Delay between reconnect attempts in seconds
    #[arg(env, long, default_value_t = 1)]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    //if RUST_LOG env is not set, set it to info
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::registry().with(fmt::layer()).with(EnvFilter::from_default_env()).init();

    //read the key from file first, if not exist, create a new one and save to file
    let key = match std::fs::read_to_string(&args.key_file) {
        Ok(pem) => match LocalSigner::from_pem(&pem) {
            Some(key) => key,
            None => {
                log::error!("read key from {:?} error: invalid pem", args.key_file);
                return;
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::error!("read key from {:?} error: {}", args.key_file, e);
                return;
            }

            log::warn!("key file {:?} not found => generate", args.key_file);
            let key = LocalSigner::random();
            if let Err(e) = std::fs::write(&args.key_file, key.to_pem()) {
                log::error!("write key to {:?} error: {}", args.key_file, e);
                return;
            }
            key
        }
    };
    log::info!("signing as {:?}", key.public_key());

    let guard = match HeightGuard::load(args.state_file.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            log::error!("load watermark state from {:?} error: {}", args.state_file, e);
            return;
        }
    };
    if let Some(height) = guard.immutable_height() {
        log::info!("immutable height restored at {height}");
    }

    run_signer(SignerConfig {
        validator_addr: args.validator_addr,
        chain_id: args.chain_id.into(),
        key,
        guard,
        reconnect_delay: Duration::from_secs(args.reconnect_secs),
    })
    .await;
}
