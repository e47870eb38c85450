//! End to end over localhost TCP: real endpoint, real signer session dialing
//! in, real signatures.

use std::{sync::Arc, time::Duration};

use protocol::{
    domain::{AccountAddress, BlockId, Proposal, PublicKey, Verifier, Vote, VoteType},
    msg::err_code,
    ChainId,
};
use signer::{run_signer, HeightGuard, LocalSigner, SignerConfig};
use tokio::{task::JoinHandle, time::sleep};

use crate::{EndpointConfig, Error, SignerClient, SignerListenerEndpoint};

const CHAIN: &str = "e2e-chain";

struct Pair {
    client: SignerClient,
    endpoint: Arc<SignerListenerEndpoint>,
    signer_task: JoinHandle<()>,
    public_key: PublicKey,
}

async fn start_pair(ping_interval: Option<Duration>) -> Pair {
    let mut cfg = EndpointConfig::new("127.0.0.1:0".parse().expect("loopback addr"));
    cfg.request_timeout = Duration::from_millis(500);
    cfg.ping_interval = ping_interval;
    let endpoint = Arc::new(SignerListenerEndpoint::new(cfg));
    let client = SignerClient::new(endpoint.clone()).await.expect("start endpoint");
    let validator_addr = endpoint.local_addr().expect("bound addr");

    let key = LocalSigner::random();
    let public_key = key.public_key();
    let signer_task = tokio::spawn(run_signer(SignerConfig {
        validator_addr,
        chain_id: CHAIN.into(),
        key,
        guard: HeightGuard::in_memory(),
        reconnect_delay: Duration::from_millis(100),
    }));
    client.wait_for_connection(Duration::from_secs(2)).await.expect("signer attaches");

    Pair {
        client,
        endpoint,
        signer_task,
        public_key,
    }
}

fn vote_at(height: u64) -> Vote {
    Vote {
        vote_type: VoteType::Precommit,
        height: height.into(),
        round: 2,
        block_id: Some(BlockId([6u8; 32])),
        timestamp_ms: 1_700_000_000_000,
        validator_address: AccountAddress([1u8; 20]),
        validator_index: 4,
        signature: None,
    }
}

#[test_log::test(tokio::test)]
async fn pub_key_end_to_end() {
    let pair = start_pair(None).await;
    assert_eq!(pair.client.pub_key().await, Some(pair.public_key));
    pair.signer_task.abort();
}

#[test_log::test(tokio::test)]
async fn sign_vote_end_to_end() {
    let pair = start_pair(None).await;
    let chain_id = ChainId::from(CHAIN);

    let mut vote = vote_at(5);
    let unsigned = vote.clone();
    pair.client.sign_vote(&chain_id, &mut vote).await.expect("signs");

    let signature = vote.signature.take().expect("signature set");
    assert_eq!(vote, unsigned);
    assert!(pair.public_key.verify(&unsigned.sign_bytes(&chain_id), &signature).is_ok());
    pair.signer_task.abort();
}

#[test_log::test(tokio::test)]
async fn sign_proposal_end_to_end() {
    let pair = start_pair(None).await;
    let chain_id = ChainId::from(CHAIN);

    let mut proposal = Proposal {
        height: 9.into(),
        round: 0,
        pol_round: Some(1),
        block_id: Some(BlockId([2u8; 32])),
        timestamp_ms: 1_700_000_000_000,
        signature: None,
    };
    let unsigned = proposal.clone();
    pair.client.sign_proposal(&chain_id, &mut proposal).await.expect("signs");

    let signature = proposal.signature.take().expect("signature set");
    assert_eq!(proposal, unsigned);
    assert!(pair.public_key.verify(&unsigned.sign_bytes(&chain_id), &signature).is_ok());
    pair.signer_task.abort();
}

#[test_log::test(tokio::test)]
async fn immutable_height_blocks_resigning() {
    let pair = start_pair(None).await;
    let chain_id = ChainId::from(CHAIN);

    let mut vote = vote_at(5);
    pair.client.sign_vote(&chain_id, &mut vote).await.expect("signs before watermark");

    pair.client.set_immutable_height(10.into()).await.expect("watermark advances");

    for below in [10, 5, 1] {
        let mut vote = vote_at(below);
        let err = pair
            .client
            .sign_vote(&chain_id, &mut vote)
            .await
            .expect_err("watermark must block");
        match err {
            Error::RemoteSigner(e) => assert_eq!(e.code, err_code::IMMUTABLE_HEIGHT),
            other => panic!("expected RemoteSigner error, got {other:?}"),
        }
        assert_eq!(vote, vote_at(below));
    }

    let mut vote = vote_at(11);
    pair.client.sign_vote(&chain_id, &mut vote).await.expect("signs above watermark");
    pair.signer_task.abort();
}

#[test_log::test(tokio::test)]
async fn wrong_chain_is_refused() {
    let pair = start_pair(None).await;
    let mut vote = vote_at(5);
    let err = pair
        .client
        .sign_vote(&"other-chain".into(), &mut vote)
        .await
        .expect_err("wrong chain");
    match err {
        Error::RemoteSigner(e) => assert_eq!(e.code, err_code::WRONG_CHAIN),
        other => panic!("expected RemoteSigner error, got {other:?}"),
    }
    pair.signer_task.abort();
}

#[test_log::test(tokio::test)]
async fn heartbeat_advances_liveness_timestamp() {
    let pair = start_pair(Some(Duration::from_millis(50))).await;

    sleep(Duration::from_millis(200)).await;
    let first = pair.endpoint.last_heartbeat_ms().expect("heartbeat ran");
    sleep(Duration::from_millis(200)).await;
    let second = pair.endpoint.last_heartbeat_ms().expect("heartbeat still running");
    assert!(second > first);

    // client requests interleave cleanly with the endpoint's own pings
    assert_eq!(pair.client.pub_key().await, Some(pair.public_key));
    assert!(pair.client.ping().await.is_ok());
    pair.signer_task.abort();
}

#[test_log::test(tokio::test)]
async fn close_detaches_the_signer() {
    let pair = start_pair(None).await;
    pair.client.close().await.expect("close");
    pair.client.close().await.expect("close twice");
    assert!(!pair.client.is_connected());

    let mut vote = vote_at(3);
    let err = pair
        .client
        .sign_vote(&CHAIN.into(), &mut vote)
        .await
        .expect_err("closed endpoint cannot sign");
    assert!(matches!(err, Error::NotConnected));
    pair.signer_task.abort();
}
