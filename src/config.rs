//! Command line and environment configuration.

use std::{path::Path, time::Duration};

use alloy::{
    primitives::{address, utils::parse_ether, Address, U256},
    signers::local::PrivateKeySigner,
};
use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::ext::{DelayPolicy, DEFAULT_API_URL, DEFAULT_MAX_RETRIES};

/// Quill Fun contract on Somnia testnet.
pub const DEFAULT_CONTRACT: Address = address!("0x16f2fec3bf691e1516b186f51e0daa5114c9b5e8");
pub const DEFAULT_NETWORK_NAME: &str = "Somnia Testnet";
pub const DEFAULT_SPEND: &str = "0.1";
pub const ENV_FILE: &str = ".env";

/// Loads `path` into the process environment. Variables that are already set
/// win over the file. Returns `false` when there is no such file.
pub fn load_env_file(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to load {}", path.display())),
    }
}

#[derive(Debug, Parser)]
#[command(name = "quill-fun", version, about = "Send fun to the Quill Fun contract on a loop")]
struct Cli {
    /// JSON-RPC endpoint of the chain.
    #[arg(long, env = "RPC_URL_SOMNIA_TESTNET")]
    rpc_url: String,

    /// Hex private key of the sending account.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Address of the fun contract.
    #[arg(long, env = "FUN_CONTRACT_ADDRESS", default_value_t = DEFAULT_CONTRACT)]
    contract: Address,

    /// Base URL of the Quills API.
    #[arg(long = "api-url", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Send transactions only, without logging in or minting.
    #[arg(long)]
    skip_mint: bool,

    /// Number of iterations to run.
    #[arg(long, default_value_t = 1)]
    iterations: u32,

    /// Native amount paid per call, in ether units.
    #[arg(long, default_value = DEFAULT_SPEND)]
    spend: String,

    /// Attempts per write before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Lower bound of the wait between iterations.
    #[arg(long, default_value_t = 30)]
    min_delay_secs: u64,

    /// Upper bound of the wait between iterations.
    #[arg(long, default_value_t = 60)]
    max_delay_secs: u64,

    /// How long to wait for a receipt before the attempt fails.
    #[arg(long, default_value_t = 120)]
    receipt_timeout_secs: u64,

    /// Network label shown in logs.
    #[arg(long, default_value = DEFAULT_NETWORK_NAME)]
    network_name: String,
}

pub struct Config {
    pub rpc_url: String,
    pub signer: PrivateKeySigner,
    pub contract: Address,
    pub api_url: String,
    pub skip_mint: bool,
    pub iterations: u32,
    pub spend_amount: U256,
    pub max_retries: u32,
    pub delay: DelayPolicy,
    pub receipt_timeout: Duration,
    pub network_name: String,
}

impl Config {
    pub fn parse() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self> {
        if cli.iterations == 0 {
            bail!("iterations must be >= 1");
        }
        if cli.min_delay_secs > cli.max_delay_secs {
            bail!(
                "min-delay-secs ({}) must not exceed max-delay-secs ({})",
                cli.min_delay_secs,
                cli.max_delay_secs
            );
        }
        if cli.rpc_url.trim().is_empty() {
            bail!("--rpc-url is empty");
        }

        let spend_amount = parse_ether(cli.spend.trim())
            .with_context(|| format!("invalid spend amount: {}", cli.spend))?;
        if spend_amount.is_zero() {
            bail!("spend amount must be positive");
        }

        let signer: PrivateKeySigner = cli
            .private_key
            .trim()
            .parse()
            .context("invalid private key")?;

        Ok(Self {
            rpc_url: cli.rpc_url,
            signer,
            contract: cli.contract,
            api_url: cli.api_url,
            skip_mint: cli.skip_mint,
            iterations: cli.iterations,
            spend_amount,
            max_retries: cli.max_retries,
            delay: DelayPolicy::new(
                Duration::from_secs(cli.min_delay_secs),
                Duration::from_secs(cli.max_delay_secs),
            ),
            receipt_timeout: Duration::from_secs(cli.receipt_timeout_secs),
            network_name: cli.network_name,
        })
    }
}
