#![forbid(unsafe_code)]
//! VaultChain CLI - build a sealed ledger and use its crypto tools

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use vaultchain::blockchain::{Block, BlockPayload};
use vaultchain::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use vaultchain::crypto::{hash_hex, CryptoService, HashAlgorithm};
use vaultchain::node::LedgerNode;

#[derive(Parser)]
#[command(name = "vaultchain", version, about = "Tamper-evident ledger of sealed records")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an in-memory ledger, append JSON records and print the chain
    Chain {
        /// JSON record to append (repeatable)
        #[arg(short, long = "record")]
        records: Vec<String>,

        /// Override the configured difficulty
        #[arg(short, long)]
        difficulty: Option<u32>,
    },
    /// Hash text with sha256, sha512 or md5 (unknown names use sha256)
    Hash {
        data: String,
        #[arg(short, long, default_value = "sha256")]
        algorithm: String,
    },
    /// AES-CBC encrypt text; prints ciphertext, iv and key as base64
    AesEncrypt {
        text: String,
        /// Base64 key (16, 24 or 32 bytes); generated when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// AES-CBC decrypt base64 ciphertext with its key and iv
    AesDecrypt {
        #[arg(long)]
        ciphertext: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        iv: String,
    },
    /// Encrypt and decrypt text with a fresh RSA-OAEP keypair
    RsaRoundtrip { text: String },
    /// Sign text with a fresh secp256k1 key and verify the result
    Sign {
        text: String,
        /// Also verify the signature against this text
        #[arg(long)]
        check: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        config.logging.level()?
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Chain { records, difficulty } => {
            if let Some(difficulty) = difficulty {
                config.ledger.difficulty = difficulty;
            }
            run_chain(&config, &records).await?
        }
        Command::Hash { data, algorithm } => {
            let algorithm = HashAlgorithm::from_name(&algorithm);
            println!(
                "{} {}",
                format!("{}:", algorithm.name()).bright_cyan().bold(),
                hash_hex(data.as_bytes(), algorithm)
            );
        }
        Command::AesEncrypt { text, key } => {
            let crypto = crypto_service(&config)?;
            let key = key.map(|k| BASE64.decode(k.trim())).transpose()?;
            let sealed = crypto.symmetric_encrypt(&text, key.as_deref())?;
            println!("{} {}", "ciphertext:".bright_cyan().bold(), sealed.ciphertext);
            println!("{} {}", "iv:        ".bright_cyan().bold(), sealed.iv);
            println!("{} {}", "key:       ".bright_cyan().bold(), sealed.key);
        }
        Command::AesDecrypt { ciphertext, key, iv } => {
            let crypto = crypto_service(&config)?;
            match crypto.symmetric_decrypt(&ciphertext, &key, &iv) {
                Ok(plaintext) => println!("{} {}", "plaintext:".bright_green().bold(), plaintext),
                Err(e) => {
                    eprintln!("{} {}", "❌ Decryption failed:".red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
        Command::RsaRoundtrip { text } => {
            let crypto = crypto_service(&config)?;
            let ciphertext = crypto.asymmetric_encrypt(&text)?;
            let plaintext = crypto.asymmetric_decrypt(&ciphertext)?;
            println!("{}", crypto.rsa_public_key_pem()?.dimmed());
            println!("{} {}", "ciphertext:".bright_cyan().bold(), ciphertext);
            println!("{} {}", "decrypted: ".bright_green().bold(), plaintext);
        }
        Command::Sign { text, check } => {
            let crypto = crypto_service(&config)?;
            let signature = crypto.sign(&text)?;
            println!("{} {}", "verifying key:".bright_cyan().bold(), crypto.verifying_key_hex());
            println!("{} {}", "signature:    ".bright_cyan().bold(), signature);
            let target = check.unwrap_or(text);
            let verdict = if crypto.verify(&target, &signature) {
                "✅ valid".bright_green()
            } else {
                "❌ invalid".red()
            };
            println!("{} {:?} -> {}", "verify:       ".bright_cyan().bold(), target, verdict);
        }
    }

    Ok(())
}

fn crypto_service(config: &Config) -> Result<CryptoService, Box<dyn std::error::Error>> {
    Ok(CryptoService::with_rsa_bits(config.crypto.rsa_key_bits)?)
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

async fn run_chain(config: &Config, records: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "{}",
        "┌─────────────────────────────────────────────────────────────┐".bright_cyan()
    );
    println!(
        "{}",
        "│                    🔐 VAULTCHAIN LEDGER                     │"
            .bright_cyan()
            .bold()
    );
    println!(
        "{}",
        "└─────────────────────────────────────────────────────────────┘".bright_cyan()
    );

    let bar = spinner(format!(
        "Generating keys and mining genesis (difficulty {})...",
        config.ledger.difficulty
    ));
    let node = LedgerNode::init(config).await?;
    bar.finish_with_message("Genesis block mined");

    for record in records {
        let value: serde_json::Value = serde_json::from_str(record)
            .map_err(|e| format!("record {:?} is not valid JSON: {}", record, e))?;
        let started = Instant::now();
        let bar = spinner(format!("Sealing and mining {}", record));
        match node.add_record(&value).await {
            Ok(block) => bar.finish_with_message(format!(
                "Block #{} mined in {:.3}s (nonce {})",
                block.index,
                started.elapsed().as_secs_f64(),
                block.nonce
            )),
            Err(e) => {
                bar.abandon_with_message(format!("Record rejected: {}", e));
            }
        }
    }

    print_chain(&node.get_chain().await);

    let stats = node.get_chain_stats().await;
    let validity = if stats.is_valid {
        "✅ VALID".bright_green().bold()
    } else {
        "❌ INVALID".red().bold()
    };
    println!();
    println!("{} {}", "Total Blocks:".bright_white(), stats.total_blocks);
    println!("{} {}", "Difficulty:  ".bright_white(), stats.difficulty);
    println!("{} {}", "Chain:       ".bright_white(), validity);
    println!("{} {}", "Latest Hash: ".bright_white(), stats.latest_block_hash.yellow());

    Ok(())
}

fn shorten(value: &str) -> String {
    if value.len() > 20 {
        format!("{}...{}", &value[..10], &value[value.len() - 6..])
    } else {
        value.to_string()
    }
}

fn print_chain(blocks: &[Block]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Timestamp").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Nonce").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Previous").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Hash").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Payload").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
        ]);

    for block in blocks {
        let timestamp = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(block.timestamp as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| block.timestamp.to_string());
        let payload = match &block.payload {
            BlockPayload::Genesis(sentinel) => sentinel.clone(),
            BlockPayload::Sealed(sealed) => format!("sealed {}", shorten(&sealed.content_hash)),
        };

        table.add_row(vec![
            Cell::new(block.index),
            Cell::new(timestamp),
            Cell::new(block.nonce),
            Cell::new(shorten(&block.previous_hash)),
            Cell::new(shorten(&block.hash)).fg(TableColor::Yellow),
            Cell::new(payload),
        ]);
    }

    println!("{table}");
}
