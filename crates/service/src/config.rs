//! Service Configuration
//!
//! Command-line/environment arguments and the validated [`RebuildConfig`]
//! handed to the rebuild engine.

use alloy::primitives::{
    utils::{parse_units, ParseUnits},
    Address, U256,
};
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default public pathname of the claims artifact in the blob store
pub const DEFAULT_BLOB_KEY: &str = "claims/current.json";

#[derive(Parser, Debug, Clone)]
#[command(name = "airdrop-rebuilder")]
#[command(about = "Rebuilds hourly mint airdrop proofs and pushes the Merkle root on-chain")]
pub struct Args {
    /// JSON-RPC endpoint
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// ERC-721 contract whose mints are eligible
    #[arg(long, env = "NFT_ADDRESS")]
    pub nft_address: Option<String>,

    /// Merkle distributor contract
    #[arg(long, env = "DISTRIBUTOR_ADDRESS")]
    pub distributor_address: Option<String>,

    /// Scan window in blocks (~1 hour at 12s blocks)
    #[arg(long, env = "BLOCKS_PER_HOUR", default_value = "300")]
    pub blocks_per_round: u64,

    /// Round length in seconds; round = unix time / period
    #[arg(long, env = "ROUND_PERIOD_SECS", default_value = "3600")]
    pub round_period_secs: u64,

    /// Reward in token units, used only when the distributor reports zero
    #[arg(long, env = "REWARD_AMOUNT", default_value = "5")]
    pub fallback_reward: String,

    /// Token decimals for the fallback reward
    #[arg(long, env = "REWARD_DECIMALS", default_value = "18")]
    pub reward_decimals: u8,

    /// Owner key allowed to call setRoot (hex, with or without 0x prefix)
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Local artifact path
    #[arg(long, env = "CLAIMS_OUT_PATH", default_value = "public/claims/current.json")]
    pub out_path: PathBuf,

    /// Do not write the local artifact
    #[arg(long, env = "SKIP_LOCAL_WRITE")]
    pub no_local: bool,

    /// Blob store read-write token; enables the remote destination
    #[arg(long, env = "BLOB_READ_WRITE_TOKEN", hide_env_values = true)]
    pub blob_token: Option<String>,

    /// Blob store API base URL
    #[arg(long, env = "BLOB_API_URL", default_value = "https://blob.vercel-storage.com")]
    pub blob_api_url: String,

    /// Blob pathname of the artifact
    #[arg(long, env = "BLOB_KEY", default_value = DEFAULT_BLOB_KEY)]
    pub blob_key: String,

    /// Public URL the published artifact is served from
    #[arg(long, env = "CLAIMS_URL")]
    pub claims_url: Option<String>,

    /// Maximum blocks per eth_getLogs request
    #[arg(long, env = "LOG_CHUNK_SIZE", default_value = "1000")]
    pub log_chunk_size: u64,

    /// Extra attempts per log chunk before the scan fails
    #[arg(long, env = "LOG_RETRIES", default_value = "2")]
    pub log_retries: u32,

    /// Delay between log chunk attempts
    #[arg(long, env = "LOG_RETRY_BACKOFF_MS", default_value = "500")]
    pub log_retry_backoff_ms: u64,

    /// Refuse to push the root above this gas price
    #[arg(long, env = "MAX_GAS_PRICE_GWEI", default_value = "100")]
    pub max_gas_price_gwei: u64,

    /// Confirmations to wait for after setRoot (at least 1)
    #[arg(long, env = "CONFIRMATIONS", default_value = "1")]
    pub confirmations: u64,

    /// Bearer token required on /rebuild (open when unset)
    #[arg(long, env = "REBUILD_TOKEN", hide_env_values = true)]
    pub rebuild_token: Option<String>,

    /// Webhook signing key; a valid `x-alchemy-signature` also authorizes /rebuild
    #[arg(long, env = "ALCHEMY_SIGNING_KEY", hide_env_values = true)]
    pub alchemy_signing_key: Option<String>,

    /// API listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Metrics listen address
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_listen: String,

    /// Rebuild on a fixed interval in addition to HTTP triggers
    #[arg(long, env = "REBUILD_INTERVAL_SECS")]
    pub interval_secs: Option<u64>,

    /// Run a single rebuild, print the result and exit
    #[arg(long)]
    pub once: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// Configuration problems detected before touching the chain.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid URL for {field}: {message}")]
    InvalidUrl { field: &'static str, message: String },

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid fallback reward {value}: {message}")]
    InvalidReward { value: String, message: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Who may move the distributor root.
#[derive(Clone)]
pub enum SignerMode {
    /// Read/report only; root updates are reported as `no-signer`
    NoSigner,
    /// Owner key for `setRoot`
    Signer(PrivateKeySigner),
}

impl SignerMode {
    /// Parse an optional hex key, with or without `0x`.
    ///
    /// # Errors
    /// Returns an error if a key is present but malformed.
    pub fn from_key(private_key: Option<&str>) -> Result<Self, ConfigError> {
        match private_key.map(str::trim).filter(|key| !key.is_empty()) {
            None => Ok(Self::NoSigner),
            Some(key) => {
                let key_bytes = key.strip_prefix("0x").unwrap_or(key);
                let signer: PrivateKeySigner =
                    key_bytes.parse().map_err(|_| ConfigError::InvalidPrivateKey)?;
                Ok(Self::Signer(signer))
            }
        }
    }

    #[must_use]
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::NoSigner => None,
            Self::Signer(signer) => Some(signer.address()),
        }
    }
}

impl std::fmt::Debug for SignerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSigner => f.write_str("NoSigner"),
            Self::Signer(signer) => f.debug_tuple("Signer").field(&signer.address()).finish(),
        }
    }
}

/// Log scanning limits.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum inclusive block span per request
    pub chunk_size: u64,
    /// Extra attempts per chunk
    pub retries: u32,
    /// Delay between attempts
    pub retry_backoff: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Root-update transaction settings.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Max gas price in Gwei
    pub max_gas_price_gwei: u64,
    /// Confirmations to wait for; config rejects 0
    pub confirmations: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_gas_price_gwei: 100,
            confirmations: 1,
        }
    }
}

/// Remote blob destination.
#[derive(Clone)]
pub struct BlobConfig {
    pub api_url: reqwest::Url,
    pub key: String,
    pub token: String,
    /// Where the published artifact can be read back
    pub public_url: Option<reqwest::Url>,
}

impl std::fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobConfig")
            .field("api_url", &self.api_url.as_str())
            .field("key", &self.key)
            .field("public_url", &self.public_url.as_ref().map(reqwest::Url::as_str))
            .finish_non_exhaustive()
    }
}

/// Where artifacts are written.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub local_path: Option<PathBuf>,
    pub blob: Option<BlobConfig>,
}

/// Everything one rebuild needs, validated.
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    pub rpc_url: reqwest::Url,
    pub nft_address: Address,
    pub distributor_address: Address,
    pub blocks_per_round: u64,
    pub round_period_secs: u64,
    /// Per-account reward when the distributor reports zero, in wei
    pub fallback_reward: U256,
    pub signer: SignerMode,
    pub scan: ScanConfig,
    pub push: PushConfig,
    pub storage: StorageConfig,
}

impl TryFrom<&Args> for RebuildConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let rpc_url = parse_url("RPC_URL", required("RPC_URL", args.rpc_url.as_deref())?)?;
        let nft_address = parse_address(
            "NFT_ADDRESS",
            required("NFT_ADDRESS", args.nft_address.as_deref())?,
        )?;
        let distributor_address = parse_address(
            "DISTRIBUTOR_ADDRESS",
            required("DISTRIBUTOR_ADDRESS", args.distributor_address.as_deref())?,
        )?;

        if args.blocks_per_round == 0 {
            return Err(ConfigError::Zero("BLOCKS_PER_HOUR"));
        }
        if args.round_period_secs == 0 {
            return Err(ConfigError::Zero("ROUND_PERIOD_SECS"));
        }
        if args.log_chunk_size == 0 {
            return Err(ConfigError::Zero("LOG_CHUNK_SIZE"));
        }

        if args.confirmations == 0 {
            return Err(ConfigError::Zero("CONFIRMATIONS"));
        }

        let invalid_reward = |message: String| ConfigError::InvalidReward {
            value: args.fallback_reward.clone(),
            message,
        };
        let fallback_reward = match parse_units(&args.fallback_reward, args.reward_decimals)
            .map_err(|e| invalid_reward(e.to_string()))?
        {
            ParseUnits::U256(amount) => amount,
            ParseUnits::I256(amount) if !amount.is_negative() => amount.into_raw(),
            ParseUnits::I256(_) => return Err(invalid_reward("must not be negative".into())),
        };

        let blob = match args.blob_token.as_deref().filter(|t| !t.is_empty()) {
            None => None,
            Some(token) => Some(BlobConfig {
                api_url: parse_url("BLOB_API_URL", &args.blob_api_url)?,
                key: args.blob_key.trim_matches('/').to_string(),
                token: token.to_string(),
                public_url: args
                    .claims_url
                    .as_deref()
                    .map(|url| parse_url("CLAIMS_URL", url))
                    .transpose()?,
            }),
        };

        Ok(Self {
            rpc_url,
            nft_address,
            distributor_address,
            blocks_per_round: args.blocks_per_round,
            round_period_secs: args.round_period_secs,
            fallback_reward,
            signer: SignerMode::from_key(args.private_key.as_deref())?,
            scan: ScanConfig {
                chunk_size: args.log_chunk_size,
                retries: args.log_retries,
                retry_backoff: Duration::from_millis(args.log_retry_backoff_ms),
            },
            push: PushConfig {
                max_gas_price_gwei: args.max_gas_price_gwei,
                confirmations: args.confirmations,
            },
            storage: StorageConfig {
                local_path: (!args.no_local).then(|| args.out_path.clone()),
                blob,
            },
        })
    }
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn parse_url(field: &'static str, value: &str) -> Result<reqwest::Url, ConfigError> {
    value
        .parse::<reqwest::Url>()
        .map_err(|e| ConfigError::InvalidUrl {
            field,
            message: e.to_string(),
        })
}
