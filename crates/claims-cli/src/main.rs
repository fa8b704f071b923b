//! Claims Artifact Tool
//!
//! Builds a claims artifact from a plain address list and verifies published
//! artifacts without touching the chain.

use airdrop_claims::{ClaimsError, EligibleSet, ProofsPayload};
use alloy_primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "claims")]
#[command(about = "Build and verify hourly airdrop claim artifacts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an artifact from an address list (one per line, `#` comments)
    Build {
        /// Address list
        #[arg(short, long)]
        input: PathBuf,

        /// Per-account amount in wei
        #[arg(long)]
        amount: U256,

        /// Round the leaves are bound to
        #[arg(long)]
        round: u64,

        /// Artifact output path
        #[arg(short, long, default_value = "current.json")]
        output: PathBuf,
    },

    /// Check every proof (or one account's proof) against the artifact root
    Verify {
        /// Artifact to check
        #[arg(short, long)]
        artifact: PathBuf,

        /// Only check this account
        #[arg(long)]
        account: Option<Address>,
    },
}

/// Parse an address list. Blank lines and `#` comments are ignored; any case
/// is accepted.
fn parse_address_list(text: &str) -> Result<EligibleSet> {
    let mut eligible = EligibleSet::new();

    for (number, line) in text.lines().enumerate() {
        let entry = line.split('#').next().unwrap_or_default().trim();
        if entry.is_empty() {
            continue;
        }
        let account: Address = entry
            .parse()
            .with_context(|| format!("line {}: invalid address {entry:?}", number + 1))?;
        if !eligible.insert(account) {
            tracing::debug!(%account, line = number + 1, "Duplicate address ignored");
        }
    }

    Ok(eligible)
}

fn build(input: &Path, amount: U256, round: u64, output: &Path) -> Result<ProofsPayload> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let eligible = parse_address_list(&text)?;
    let payload = ProofsPayload::build(&eligible, amount, round);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, payload.to_json_pretty()?)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(
        output = %output.display(),
        accounts = payload.claims.len(),
        round,
        root = %payload.root,
        "Artifact written"
    );

    Ok(payload)
}

/// Accounts whose proof fails; `Err` when `account` is not in the artifact.
fn verify(payload: &ProofsPayload, account: Option<Address>) -> Result<Vec<Address>, ClaimsError> {
    match account {
        Some(account) => match payload.verify_claim(&account) {
            Ok(_) => Ok(Vec::new()),
            Err(ClaimsError::ProofMismatch { .. }) => Ok(vec![account]),
            Err(e) => Err(e),
        },
        None => Ok(payload.invalid_claims()),
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Build {
            input,
            amount,
            round,
            output,
        } => {
            let payload = build(&input, amount, round, &output)?;
            println!("{}", payload.root);
        }
        Command::Verify { artifact, account } => {
            let json = std::fs::read_to_string(&artifact)
                .with_context(|| format!("failed to read {}", artifact.display()))?;
            let payload = ProofsPayload::from_json(&json)?;

            let invalid = verify(&payload, account)?;
            if !invalid.is_empty() {
                for account in &invalid {
                    tracing::error!(%account, "Proof does not verify");
                }
                bail!("{} of {} claims failed verification", invalid.len(), payload.claims.len());
            }

            tracing::info!(
                round = payload.round,
                root = %payload.root,
                claims = payload.claims.len(),
                "All checked proofs verify"
            );
        }
    }

    Ok(())
}
