//! Integration tests for sealing, mining and validating the ledger
//!
//! These exercise the public API end to end: a ledger built through the
//! node handle, records sealed with the shared crypto service, and the
//! chain re-validated after every change.

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vaultchain::blockchain::{validate_chain, Ledger, ValidationCheck};
use vaultchain::crypto::CryptoService;
use vaultchain::error::{ChainError, CryptoError};
use vaultchain::miner::MiningControl;
use vaultchain::node::LedgerNode;

static CRYPTO: Lazy<Arc<CryptoService>> =
    Lazy::new(|| Arc::new(CryptoService::with_rsa_bits(1024).expect("key generation")));

/// Helper to build a node over the shared test keys
async fn create_test_node(difficulty: u32) -> Result<LedgerNode, ChainError> {
    LedgerNode::with_crypto(CRYPTO.clone(), difficulty, None).await
}

#[tokio::test]
async fn test_difficulty_two_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let node = create_test_node(2).await?;

    let genesis = node.get_block(0).await.ok_or("missing genesis")?;
    assert!(genesis.hash.starts_with("00"));

    let block = node.add_block(r#"{"a":1}"#).await?;
    assert_eq!(block.index, 1);
    assert_eq!(block.previous_hash, genesis.hash);
    assert!(block.hash.starts_with("00"));
    assert!(node.is_chain_valid().await);

    Ok(())
}

#[tokio::test]
async fn test_chain_stats_track_appends() -> Result<(), Box<dyn std::error::Error>> {
    let node = create_test_node(1).await?;
    for i in 0..3 {
        node.add_block(&format!(r#"{{"reading":{}}}"#, i)).await?;
    }

    let stats = node.get_chain_stats().await;
    let chain = node.get_chain().await;
    assert_eq!(stats.total_blocks, 4);
    assert_eq!(stats.difficulty, 1);
    assert!(stats.is_valid);
    assert_eq!(stats.latest_block_hash, chain[3].hash);

    for (i, block) in chain.iter().enumerate() {
        assert_eq!(block.index, i as u64);
        assert!(block.hash.starts_with('0'));
    }

    Ok(())
}

#[tokio::test]
async fn test_snapshot_is_json_serializable() -> Result<(), Box<dyn std::error::Error>> {
    let node = create_test_node(1).await?;
    node.add_block("plain text record").await?;

    let json = serde_json::to_value(node.get_chain().await)?;
    let blocks = json.as_array().ok_or("chain should serialize as an array")?;
    assert_eq!(blocks.len(), 2);
    for key in ["index", "timestamp", "payload", "previous_hash", "nonce", "hash"] {
        assert!(blocks[1].get(key).is_some(), "missing {}", key);
    }
    assert_eq!(blocks[0]["payload"], "Genesis Block");
    assert!(blocks[1]["payload"]["signature"].is_string());

    let stats = serde_json::to_value(node.get_chain_stats().await)?;
    assert_eq!(stats["total_blocks"], 2);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_appends_are_serialized() -> Result<(), Box<dyn std::error::Error>> {
    let node = Arc::new(create_test_node(1).await?);

    let mut handles = Vec::new();
    for i in 0..6 {
        let node = node.clone();
        handles.push(tokio::spawn(async move {
            node.add_block(&format!("record {}", i)).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let chain = node.get_chain().await;
    assert_eq!(chain.len(), 7);
    assert!(validate_chain(&chain, 1).is_ok());
    assert_eq!(node.blocks_mined(), 6);

    Ok(())
}

#[tokio::test]
async fn test_deadline_aborts_append_without_side_effects() -> Result<(), Box<dyn std::error::Error>> {
    let node = create_test_node(1).await?;
    node.add_block("before").await?;
    let before = node.get_chain().await;

    // An already expired deadline stops any search that needs more than one attempt.
    let control = MiningControl::new().with_deadline(Instant::now());
    match node.add_block_with_control("late", control).await {
        Err(err) => {
            assert_eq!(err, ChainError::MiningDeadlineExceeded);
            assert_eq!(node.get_chain().await, before);
        }
        Ok(block) => assert_eq!(block.index, 2),
    }
    assert!(node.is_chain_valid().await);

    Ok(())
}

#[tokio::test]
async fn test_dropped_append_future_cancels_mining() -> Result<(), Box<dyn std::error::Error>> {
    let node = create_test_node(4).await?;
    let control = MiningControl::new();

    let outcome = {
        let pending = node.add_block_with_control("abandoned", control.clone());
        // Poll once, then drop the future as a disconnecting caller would.
        tokio::time::timeout(Duration::from_millis(0), pending).await
    };

    match outcome {
        Err(_elapsed) => {
            assert!(control.is_cancelled());
            assert_eq!(node.get_chain().await.len(), 1);
        }
        // The search finished before the first poll returned.
        Ok(result) => assert_eq!(result?.index, 1),
    }
    assert!(node.is_chain_valid().await);
    assert!(!node.is_mining());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_block_being_mined_is_invisible_to_readers() -> Result<(), Box<dyn std::error::Error>> {
    let node = Arc::new(create_test_node(5).await?);
    let before = node.get_chain().await;
    let control = MiningControl::new();

    let append = {
        let node = node.clone();
        let control = control.clone();
        tokio::spawn(async move { node.add_block_with_control("in flight", control).await })
    };

    while !node.is_mining() && !append.is_finished() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let chain = node.get_chain().await;
    let valid = node.is_chain_valid().await;
    let stats = node.get_chain_stats().await;
    // The flag drops before commit, so a raised flag after the reads means
    // they all ran while the search was still going.
    if node.is_mining() {
        assert_eq!(chain, before);
        assert!(valid);
        assert_eq!(stats.total_blocks, 1);
        assert_eq!(stats.latest_block_hash, before[0].hash);
    }

    control.cancel();
    match append.await? {
        Err(err) => {
            assert_eq!(err, ChainError::MiningCancelled);
            assert_eq!(node.get_chain().await, before);
        }
        Ok(block) => assert_eq!(block.index, 1),
    }
    assert!(node.is_chain_valid().await);
    assert!(!node.is_mining());

    Ok(())
}

#[tokio::test]
async fn test_oversized_record_reports_sealing_error() -> Result<(), Box<dyn std::error::Error>> {
    let node = create_test_node(1).await?;
    let record = "z".repeat(CRYPTO.max_asymmetric_payload() + 1);

    let err = node.add_block(&record).await.unwrap_err();
    assert!(matches!(err, ChainError::Sealing(CryptoError::PayloadTooLarge { .. })));
    assert!(err.to_string().starts_with("Sealing failed"));
    assert_eq!(node.get_chain().await.len(), 1);

    Ok(())
}

#[test]
fn test_three_block_chain_with_foreign_link_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(CRYPTO.clone(), 1)?;
    ledger.append("first", &MiningControl::new())?;
    ledger.append("second", &MiningControl::new())?;
    assert!(ledger.validate());

    let mut blocks = ledger.blocks().to_vec();
    blocks[1].previous_hash = "1234abcd".repeat(8);

    let failure = validate_chain(&blocks, ledger.difficulty()).unwrap_err();
    assert_eq!(failure.index, 1);
    assert_eq!(failure.check, ValidationCheck::HashMismatch);

    Ok(())
}

#[test]
fn test_opened_records_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(CRYPTO.clone(), 1)?;
    let records = [r#"{"a":1}"#, "second entry", "ünïcödé"];
    for record in records {
        ledger.append(record, &MiningControl::new())?;
    }

    for (i, record) in records.iter().enumerate() {
        let opened = ledger.open_block(i as u64 + 1)?;
        assert_eq!(opened.record, *record);
        assert!(opened.signature_valid);
        assert!(opened.content_hash_valid);
    }

    Ok(())
}

#[test]
fn test_crypto_round_trip_laws() -> Result<(), Box<dyn std::error::Error>> {
    let crypto = CRYPTO.clone();
    for text in ["", "a", "secret", "{\"nested\":{\"k\":[1,2,3]}}"] {
        assert_eq!(crypto.asymmetric_decrypt(&crypto.asymmetric_encrypt(text)?)?, text);

        let sealed = crypto.symmetric_encrypt(text, None)?;
        assert_eq!(
            crypto.symmetric_decrypt(&sealed.ciphertext, &sealed.key, &sealed.iv)?,
            text
        );

        let signature = crypto.sign(text)?;
        assert!(crypto.verify(text, &signature));
        assert!(!crypto.verify(&format!("{}!", text), &signature));
    }

    Ok(())
}
