//! Domain values moved by the signing protocol: votes, proposals and the key
//! material embedded in responses. They only need to be encodable here; what
//! they mean is the consensus engine's business.

use serde::{Deserialize, Serialize};

use crate::{ChainId, Height};

pub use ed25519_dalek::{Signature, VerifyingKey as PublicKey};
pub use ed25519_dalek::{Signer, Verifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 32]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress(pub [u8; 20]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteType {
    Prevote,
    Precommit,
}

/// A consensus vote. `signature` stays `None` until a signer filled it in;
/// `block_id` of `None` is a nil vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub vote_type: VoteType,
    pub height: Height,
    pub round: u32,
    pub block_id: Option<BlockId>,
    pub timestamp_ms: u64,
    pub validator_address: AccountAddress,
    pub validator_index: u32,
    pub signature: Option<Signature>,
}

impl Vote {
    /// Canonical bytes a signer commits to: the chain id plus the vote
    /// content, with signature and validator identity excluded. Both sides of
    /// the protocol must agree on this encoding.
    pub fn sign_bytes(&self, chain_id: &ChainId) -> Vec<u8> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            chain_id: &'a ChainId,
            vote_type: VoteType,
            height: Height,
            round: u32,
            block_id: &'a Option<BlockId>,
            timestamp_ms: u64,
        }
        bincode::serialize(&Canonical {
            chain_id,
            vote_type: self.vote_type,
            height: self.height,
            round: self.round,
            block_id: &self.block_id,
            timestamp_ms: self.timestamp_ms,
        })
        .expect("should serialize")
    }
}

/// A block proposal. `pol_round` is the proof-of-lock round when the proposer
/// re-proposes a block it is locked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub height: Height,
    pub round: u32,
    pub pol_round: Option<u32>,
    pub block_id: Option<BlockId>,
    pub timestamp_ms: u64,
    pub signature: Option<Signature>,
}

impl Proposal {
    pub fn sign_bytes(&self, chain_id: &ChainId) -> Vec<u8> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            chain_id: &'a ChainId,
            height: Height,
            round: u32,
            pol_round: &'a Option<u32>,
            block_id: &'a Option<BlockId>,
            timestamp_ms: u64,
        }
        bincode::serialize(&Canonical {
            chain_id,
            height: self.height,
            round: self.round,
            pol_round: &self.pol_round,
            block_id: &self.block_id,
            timestamp_ms: self.timestamp_ms,
        })
        .expect("should serialize")
    }
}
