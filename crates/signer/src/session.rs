use futures::{SinkExt, StreamExt};
use protocol::{
    codec::FrameCodec,
    domain::{Proposal, Vote},
    msg::{err_code, RemoteSignerError, Request, Response, SignProposalRequest, SignVoteRequest},
    ChainId, Height,
};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::{guard::HeightGuard, key::LocalSigner};

/// One remote signer serving one validator: answers requests on a connection
/// until it drops. The key and the height watermark live here, outside any
/// single connection, so they survive redials.
pub struct SignerSession {
    chain_id: ChainId,
    key: LocalSigner,
    guard: HeightGuard,
}

impl SignerSession {
    pub fn new(chain_id: ChainId, key: LocalSigner, guard: HeightGuard) -> Self {
        Self { chain_id, key, guard }
    }

    /// Serve requests until the validator closes the connection (`Ok`) or the
    /// transport fails (`Err`).
    pub async fn serve(&mut self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, FrameCodec::<Response, Request>::default());
        while let Some(request) = framed.next().await {
            let request = request?;
            log::debug!("[SignerSession] request {request:?}");
            let response = self.handle(request);
            framed.send(response).await?;
        }
        Ok(())
    }

    /// Exhaustive over the request variants, so a new variant without an
    /// answer is a compile error rather than a silent drop.
    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,
            Request::PubKey => Response::PubKey(Ok(self.key.public_key())),
            Request::SignVote(request) => Response::SignedVote(self.sign_vote(request)),
            Request::SignProposal(request) => Response::SignedProposal(self.sign_proposal(request)),
            Request::SetImmutableHeight(height) => {
                let result = self.guard.advance(height).map_err(|e| {
                    log::error!("[SignerSession] advance immutable height to {height} error: {e}");
                    RemoteSignerError::new(err_code::INTERNAL, e.to_string())
                });
                Response::ImmutableHeightSet(result)
            }
        }
    }

    fn sign_vote(&mut self, request: SignVoteRequest) -> Result<Vote, RemoteSignerError> {
        self.check_chain(&request.chain_id)?;
        self.check_height(request.vote.height)?;
        let mut vote = request.vote;
        vote.signature = Some(self.key.sign(&vote.sign_bytes(&request.chain_id)));
        Ok(vote)
    }

    fn sign_proposal(&mut self, request: SignProposalRequest) -> Result<Proposal, RemoteSignerError> {
        self.check_chain(&request.chain_id)?;
        self.check_height(request.proposal.height)?;
        let mut proposal = request.proposal;
        proposal.signature = Some(self.key.sign(&proposal.sign_bytes(&request.chain_id)));
        Ok(proposal)
    }

    fn check_chain(&self, chain_id: &ChainId) -> Result<(), RemoteSignerError> {
        if chain_id != &self.chain_id {
            log::warn!("[SignerSession] refusing to sign for chain {chain_id}, serving {}", self.chain_id);
            return Err(RemoteSignerError::new(
                err_code::WRONG_CHAIN,
                format!("signer serves chain {}, not {chain_id}", self.chain_id),
            ));
        }
        Ok(())
    }

    fn check_height(&self, height: Height) -> Result<(), RemoteSignerError> {
        self.guard.check(height).map_err(|e| {
            log::warn!("[SignerSession] refusing to sign for height {height}: {e}");
            RemoteSignerError::new(err_code::IMMUTABLE_HEIGHT, e.to_string())
        })
    }
}
