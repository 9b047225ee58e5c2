//! Wallet commands, each run against a freshly initialized service.

use std::time::Duration;

use anyhow::{Context, bail};
use cipherpay_config::{BackendMode, CipherPayConfig};
use cipherpay_core::relay::TxStatus;
use cipherpay_core::{CipherPayService, TransferStage};
use cipherpay_privacy::NoteValue;
use log::info;

/// Recipient used by `demo`.
const DEMO_RECIPIENT: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
/// 0.3 ETH in wei
const DEMO_AMOUNT: u128 = 300_000_000_000_000_000;
const STATUS_POLLS: usize = 10;

async fn start(config: CipherPayConfig) -> anyhow::Result<CipherPayService> {
    let service = CipherPayService::new(config);
    service
        .initialize()
        .await
        .context("Failed to initialize the wallet service")?;
    Ok(service)
}

fn parse_amount(amount: &str) -> anyhow::Result<NoteValue> {
    amount
        .parse()
        .with_context(|| format!("'{amount}' is not a non-negative integer amount"))
}

pub async fn status(config: CipherPayConfig, json: bool) -> anyhow::Result<()> {
    let service = start(config).await?;
    let status = service.status().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Backend:   {}", status.backend.map(|b| b.to_string()).unwrap_or_default());
    println!("Chain:     {}", status.chain);
    println!(
        "Session:   {}",
        status.address.as_deref().unwrap_or("disconnected")
    );
    println!("Balance:   {}", status.balance);
    println!(
        "Notes:     {} ({} spendable)",
        status.note_count, status.spendable_count
    );
    if let Some(cache) = status.cache {
        println!(
            "Path cache: {} entries, {} hits, {} misses",
            cache.size, cache.hits, cache.misses
        );
    }
    Ok(())
}

pub async fn notes(config: CipherPayConfig, json: bool) -> anyhow::Result<()> {
    let service = start(config).await?;
    let notes = service.all_notes().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
        return Ok(());
    }
    if notes.is_empty() {
        println!("No notes");
        return Ok(());
    }
    for note in &notes {
        let state = if note.spent { "spent" } else { "unspent" };
        println!("{}  {:>28}  {}", note.commitment, note.amount, state);
    }
    println!();
    println!("Balance: {}", service.balance().await?);
    Ok(())
}

pub async fn view_key(config: CipherPayConfig) -> anyhow::Result<()> {
    let service = start(config).await?;
    println!("{}", service.export_view_key().await?);
    Ok(())
}

pub async fn transfer(
    config: CipherPayConfig,
    recipient: &str,
    amount: &str,
    submit: bool,
) -> anyhow::Result<()> {
    let amount = parse_amount(amount)?;
    let service = start(config).await?;
    let address = service.connect().await?;
    println!("🔑 Connected as {address}");

    println!("⏳ Proving transfer of {amount} to {recipient}...");
    let prepared = service.create_transfer(recipient, amount).await?;
    println!(
        "✅ Proof ready ({} inputs, change {})",
        prepared.inputs().len(),
        prepared
            .change_note()
            .map(|n| n.amount)
            .unwrap_or(NoteValue::ZERO)
    );
    if !submit {
        println!("{}", serde_json::to_string_pretty(prepared.submission())?);
        println!("Not submitted (pass --submit to hand it to the relay)");
        return Ok(());
    }

    let receipt = service.submit_transfer(prepared).await?;
    println!("📤 Submitted as {}", receipt.tx_hash);
    let status = poll_status(&service, &receipt.tx_hash).await?;
    println!("Status: {status}");
    println!("Balance: {}", service.balance().await?);
    Ok(())
}

pub async fn deposit(config: CipherPayConfig, amount: &str) -> anyhow::Result<()> {
    let amount = parse_amount(amount)?;
    let service = start(config).await?;
    service.connect().await?;
    let tx = service.create_deposit(amount).await?;
    println!("📥 Deposit sent: {tx}");
    Ok(())
}

/// Full transfer on the simulated backend with its demo notes.
pub async fn demo(mut config: CipherPayConfig) -> anyhow::Result<()> {
    match config.backend.mode {
        Some(BackendMode::Real) => bail!("demo runs on the simulated backend; unset CP_BACKEND"),
        _ => {
            config.backend.mode = Some(BackendMode::Simulated);
            config.backend.allow_simulated = true;
            config.backend.seed_demo_notes = true;
        }
    }
    let service = start(config).await?;
    let address = service.connect().await?;
    println!("🔑 Connected as {address}");
    println!("💰 Balance: {}", service.balance().await?);

    let prepared = service
        .create_transfer(DEMO_RECIPIENT, NoteValue::new(DEMO_AMOUNT))
        .await?;
    let mut stage = prepared.subscribe();
    println!(
        "✅ Proved transfer {} ({} inputs)",
        prepared.id(),
        prepared.inputs().len()
    );

    let proof = prepared.submission().proof.clone();
    let valid = service
        .verify_transfer_proof(&proof.proof, &proof.public_signals, &proof.verifier_key)
        .await?;
    println!("🔍 Proof verifies: {valid}");

    let receipt = service.submit_transfer(prepared).await?;
    if *stage.borrow_and_update() == TransferStage::Settled {
        println!("📤 Settled as {}", receipt.tx_hash);
    }
    let status = poll_status(&service, &receipt.tx_hash).await?;
    println!("Status: {status}");
    println!("💰 Balance: {}", service.balance().await?);

    let report = service.compliance_report(0, i64::MAX).await;
    if let Ok(report) = report {
        println!(
            "📋 Compliance: {} transfer(s), {} total",
            report.transfer_count, report.total_amount
        );
    }
    service.destroy().await?;
    Ok(())
}

async fn poll_status(service: &CipherPayService, tx_hash: &str) -> anyhow::Result<TxStatus> {
    let mut status = TxStatus::Pending;
    for _ in 0..STATUS_POLLS {
        status = service.check_status(tx_hash).await?;
        if status != TxStatus::Pending {
            break;
        }
        info!("{} still pending", tx_hash);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Ok(status)
}
