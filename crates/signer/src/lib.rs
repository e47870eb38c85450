//! Remote signer for a valsign validator. Holds the signing key and the
//! immutable height watermark, dials into the validator's listener and
//! answers its signing requests.

use std::{net::SocketAddr, time::Duration};

use protocol::ChainId;
use tokio::{net::TcpStream, time::sleep};

mod guard;
mod key;
mod session;

pub use guard::{GuardError, HeightGuard};
pub use key::LocalSigner;
pub use session::SignerSession;

pub struct SignerConfig {
    pub validator_addr: SocketAddr,
    pub chain_id: ChainId,
    pub key: LocalSigner,
    pub guard: HeightGuard,
    pub reconnect_delay: Duration,
}

/// Dial the validator and serve it, redialing forever when the connection
/// drops. Key and watermark live in the session, outside the loop.
pub async fn run_signer(cfg: SignerConfig) {
    let mut session = SignerSession::new(cfg.chain_id, cfg.key, cfg.guard);
    loop {
        log::info!("[Signer] connecting to validator {}", cfg.validator_addr);
        match TcpStream::connect(cfg.validator_addr).await {
            Ok(stream) => {
                log::info!("[Signer] connected to validator {}", cfg.validator_addr);
                match session.serve(stream).await {
                    Ok(()) => log::warn!("[Signer] validator closed the connection"),
                    Err(e) => log::error!("[Signer] session error: {e}"),
                }
            }
            Err(e) => {
                log::error!("[Signer] connect to validator error: {e}");
            }
        }
        sleep(cfg.reconnect_delay).await;
    }
}
