use std::{sync::Arc, time::Duration};

use protocol::{
    domain::{Proposal, PublicKey, Vote},
    msg::{Request, Response, SignProposalRequest, SignVoteRequest},
    ChainId, Height,
};

use crate::{endpoint::SignerListenerEndpoint, error::Error};

/// Signing facade the consensus engine holds. Stateless besides the endpoint
/// reference, so clones are cheap and reads like `is_connected` can happen
/// from anywhere; request-issuing calls are serialized by the endpoint
/// itself.
#[derive(Clone)]
pub struct SignerClient {
    endpoint: Arc<SignerListenerEndpoint>,
}

impl SignerClient {
    /// Wrap an endpoint, starting it when it is not running yet.
    pub async fn new(endpoint: Arc<SignerListenerEndpoint>) -> Result<Self, Error> {
        if !endpoint.is_running() {
            if let Err(e) = endpoint.start().await {
                log::error!("[SignerClient] start endpoint error: {e}");
                return Err(e);
            }
        }
        Ok(Self { endpoint })
    }

    /// Close the underlying endpoint.
    pub async fn close(&self) -> Result<(), Error> {
        self.endpoint.close().await
    }

    /// Whether a remote signer is currently attached.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Timestamp of the most recent response from the remote signer, the
    /// observable liveness signal `ping` deliberately does not provide.
    pub fn last_heartbeat_ms(&self) -> Option<u64> {
        self.endpoint.last_heartbeat_ms()
    }

    /// Wait up to `max_wait` for a remote signer to attach.
    pub async fn wait_for_connection(&self, max_wait: Duration) -> Result<(), Error> {
        self.endpoint.wait_for_connection(max_wait).await
    }

    /// Liveness probe. Transport failures are logged and swallowed: a dead
    /// connection shows up in `is_connected`, and a flaky heartbeat must not
    /// bubble up as a signing failure. Only a desynced response variant is
    /// reported back.
    pub async fn ping(&self) -> Result<(), Error> {
        let response = match self.endpoint.send_request(Request::Ping).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("[SignerClient] ping error: {e}");
                return Ok(());
            }
        };
        match response {
            Response::Pong => Ok(()),
            other => {
                log::error!("[SignerClient] ping got unexpected response {other:?}");
                Err(Error::UnexpectedResponse)
            }
        }
    }

    /// Fetch the remote signer's public key. `None` means unavailable, for
    /// any reason: transport failure, desync or a remote-reported error. All
    /// three are logged here.
    pub async fn pub_key(&self) -> Option<PublicKey> {
        let response = match self.endpoint.send_request(Request::PubKey).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("[SignerClient] pub_key error: {e}");
                return None;
            }
        };
        match response {
            Response::PubKey(Ok(pub_key)) => Some(pub_key),
            Response::PubKey(Err(e)) => {
                log::error!("[SignerClient] remote signer refused pub_key: {e}");
                None
            }
            other => {
                log::error!("[SignerClient] pub_key got unexpected response {other:?}");
                None
            }
        }
    }

    /// Ask the remote signer to sign `vote`. The vote is only written on
    /// success; every failure path leaves it untouched, so an unsigned vote
    /// can never be mistaken for a signed one.
    pub async fn sign_vote(&self, chain_id: &ChainId, vote: &mut Vote) -> Result<(), Error> {
        let request = Request::SignVote(SignVoteRequest {
            chain_id: chain_id.clone(),
            vote: vote.clone(),
        });
        let response = match self.endpoint.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("[SignerClient] sign_vote error: {e}");
                return Err(e);
            }
        };
        match response {
            Response::SignedVote(Ok(signed)) => {
                *vote = signed;
                Ok(())
            }
            Response::SignedVote(Err(e)) => {
                log::error!("[SignerClient] remote signer refused vote: {e}");
                Err(Error::RemoteSigner(e))
            }
            other => {
                log::error!("[SignerClient] sign_vote got unexpected response {other:?}");
                Err(Error::UnexpectedResponse)
            }
        }
    }

    /// Ask the remote signer to sign `proposal`. Same contract as
    /// `sign_vote`: written on success only.
    pub async fn sign_proposal(&self, chain_id: &ChainId, proposal: &mut Proposal) -> Result<(), Error> {
        let request = Request::SignProposal(SignProposalRequest {
            chain_id: chain_id.clone(),
            proposal: proposal.clone(),
        });
        let response = match self.endpoint.send_request(request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("[SignerClient] sign_proposal error: {e}");
                return Err(e);
            }
        };
        match response {
            Response::SignedProposal(Ok(signed)) => {
                *proposal = signed;
                Ok(())
            }
            Response::SignedProposal(Err(e)) => {
                log::error!("[SignerClient] remote signer refused proposal: {e}");
                Err(Error::RemoteSigner(e))
            }
            other => {
                log::error!("[SignerClient] sign_proposal got unexpected response {other:?}");
                Err(Error::UnexpectedResponse)
            }
        }
    }

    /// Tell the remote signer that `height` is committed and everything at or
    /// below it must never be signed again. The watermark lives only on the
    /// remote side; a failure here degrades safety but not the current call,
    /// so it is logged and handed back without touching any local state.
    pub async fn set_immutable_height(&self, height: Height) -> Result<(), Error> {
        let response = match self.endpoint.send_request(Request::SetImmutableHeight(height)).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("[SignerClient] set_immutable_height error: {e}");
                return Err(e);
            }
        };
        match response {
            Response::ImmutableHeightSet(Ok(())) => Ok(()),
            Response::ImmutableHeightSet(Err(e)) => {
                log::error!("[SignerClient] remote signer refused immutable height {height}: {e}");
                Err(Error::RemoteSigner(e))
            }
            other => {
                log::error!("[SignerClient] set_immutable_height got unexpected response {other:?}");
                Err(Error::UnexpectedResponse)
            }
        }
    }
}
