//! Request/response variants exchanged with the remote signer. The wire
//! carries no correlation ids: at most one request is in flight per
//! connection and responses are matched to requests by order alone.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Proposal, PublicKey, Vote};
use crate::{ChainId, Height};

/// Error codes a remote signer reports inside response payloads.
pub mod err_code {
    pub const INTERNAL: i32 = 1;
    pub const WRONG_CHAIN: i32 = 2;
    pub const IMMUTABLE_HEIGHT: i32 = 3;
}

/// Failure reported by the remote signer itself, carried inside the response
/// payload rather than on the transport error channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("remote signer error {code}: {description}")]
pub struct RemoteSignerError {
    pub code: i32,
    pub description: String,
}

impl RemoteSignerError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignVoteRequest {
    pub chain_id: ChainId,
    pub vote: Vote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignProposalRequest {
    pub chain_id: ChainId,
    pub proposal: Proposal,
}

/// Everything a validator sends to its remote signer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Ping,
    PubKey,
    SignVote(SignVoteRequest),
    SignProposal(SignProposalRequest),
    SetImmutableHeight(Height),
}

/// Everything a remote signer sends back. Signing variants carry either the
/// signed artifact or a remote error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Pong,
    PubKey(Result<PublicKey, RemoteSignerError>),
    SignedVote(Result<Vote, RemoteSignerError>),
    SignedProposal(Result<Proposal, RemoteSignerError>),
    ImmutableHeightSet(Result<(), RemoteSignerError>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountAddress, BlockId, VoteType};

    #[test]
    fn request_roundtrip() {
        let req = Request::SignVote(SignVoteRequest {
            chain_id: "test-chain".into(),
            vote: Vote {
                vote_type: VoteType::Prevote,
                height: 11.into(),
                round: 0,
                block_id: Some(BlockId([1u8; 32])),
                timestamp_ms: 1_700_000_000_000,
                validator_address: AccountAddress([2u8; 20]),
                validator_index: 0,
                signature: None,
            },
        });

        let encoded = bincode::serialize(&req).unwrap();
        let decoded: Request = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_roundtrip_carries_remote_error() {
        let resp = Response::SignedVote(Err(RemoteSignerError::new(
            err_code::IMMUTABLE_HEIGHT,
            "height 3 is not above the immutable height 10",
        )));

        let encoded = bincode::serialize(&resp).unwrap();
        let decoded: Response = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, resp);
    }
}
