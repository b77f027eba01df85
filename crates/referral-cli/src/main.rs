#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use referral_sdk::{
    ClaimPlan, Claimer,
    claim::Layout,
    config::ClaimConfig,
    discovery::Strategy,
    submit::SubmissionReport,
};
use solana_keypair::{Keypair, read_keypair_file};
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use std::{collections::HashMap, path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "referral-claim")]
struct Args {
    /// TOML config file, environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Fee payer keypair
    #[arg(long, global = true, env = "SOLANA_KEYPAIR")]
    keypair: Option<PathBuf>,
    /// Print unsigned base64 transactions instead of submitting
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct Referral {
    /// Referral account address
    #[arg(long)]
    referral: Pubkey,
    /// Token-account layout: v1 or v2
    #[arg(long, default_value = "v2")]
    layout: Layout,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List token holdings of a referral account
    Discover {
        #[command(flatten)]
        referral: Referral,
        /// scan, top[:<n>] or list[:<tag>,..]
        #[arg(long, default_value = "top")]
        strategy: Strategy,
    },
    /// Claim every claimable holding
    ClaimAll {
        #[command(flatten)]
        referral: Referral,
        #[arg(long, default_value = "top")]
        strategy: Strategy,
    },
    /// Claim a single mint
    Claim {
        #[command(flatten)]
        referral: Referral,
        #[arg(long)]
        mint: Pubkey,
    },
    /// Claim the given token accounts
    ClaimPartially {
        #[command(flatten)]
        referral: Referral,
        #[arg(required = true)]
        accounts: Vec<Pubkey>,
    },
    /// Print the USD value of unclaimed holdings
    Unclaimed {
        #[command(flatten)]
        referral: Referral,
        #[arg(long, default_value = "top")]
        strategy: Strategy,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ClaimConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<ClaimConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => ClaimConfig::default(),
    };
    let env = std::env::vars().collect::<HashMap<_, _>>();
    Ok(config.merge_env(&env)?)
}

fn load_keypair(path: Option<&PathBuf>) -> anyhow::Result<Keypair> {
    let path = path.ok_or_else(|| anyhow!("--keypair is required"))?;
    read_keypair_file(path).map_err(|e| anyhow!("failed to read keypair {}: {}", path.display(), e))
}

/// Whether every batch was built and confirmed.
async fn execute(
    claimer: &Claimer,
    plan: ClaimPlan,
    payer: &Keypair,
    dry_run: bool,
) -> anyhow::Result<bool> {
    for skipped in &plan.skipped {
        tracing::warn!("skipped {}: {}", skipped.address, skipped.error);
    }
    for rejected in &plan.rejected {
        tracing::error!("batch {:?} rejected: {}", rejected.mints, rejected.error);
    }
    let complete = plan.rejected.is_empty();

    if dry_run {
        for batch in &plan.batches {
            println!("{}", batch.to_base64()?);
        }
        return Ok(complete);
    }

    let transactions = plan.sign_all(&[payer])?;
    let report: SubmissionReport = claimer.submit(transactions).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(complete && report.all_confirmed())
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let config = load_config(args.config.as_ref())?;
    tracing::info!(
        "network {}, program {}",
        config.network.as_str(),
        config.program_id()
    );
    let claimer = Claimer::from_config(config, reqwest::Client::new())?;

    match args.command {
        Commands::Discover { referral, strategy } => {
            let context = claimer
                .referral_context(&referral.referral, referral.layout)
                .await?;
            let discovered = claimer.discover(&context, &strategy).await?;
            for unsupported in &discovered.unsupported {
                tracing::warn!("{}: {}", unsupported.address, unsupported.error());
            }
            println!("{}", serde_json::to_string_pretty(&discovered)?);
            Ok(true)
        }
        Commands::Unclaimed { referral, strategy } => {
            let value = claimer
                .unclaimed(&referral.referral, referral.layout, &strategy)
                .await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(true)
        }
        Commands::ClaimAll { referral, strategy } => {
            let payer = load_keypair(args.keypair.as_ref())?;
            let plan = claimer
                .claim_all(
                    &payer.pubkey(),
                    &referral.referral,
                    referral.layout,
                    &strategy,
                )
                .await?;
            execute(&claimer, plan, &payer, args.dry_run).await
        }
        Commands::Claim { referral, mint } => {
            let payer = load_keypair(args.keypair.as_ref())?;
            let plan = claimer
                .claim(&payer.pubkey(), &referral.referral, referral.layout, &mint)
                .await?;
            execute(&claimer, plan, &payer, args.dry_run).await
        }
        Commands::ClaimPartially { referral, accounts } => {
            let payer = load_keypair(args.keypair.as_ref())?;
            let plan = claimer
                .claim_partially(
                    &payer.pubkey(),
                    &referral.referral,
                    referral.layout,
                    &accounts,
                )
                .await?;
            execute(&claimer, plan, &payer, args.dry_run).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if run(args).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
