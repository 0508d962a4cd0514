//! Smart order router command line entry point
//!
//! Loads a pool snapshot (and optional on-chain refresh), routes one request
//! and prints the swap plan with its batch limits as JSON.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use sor_amm::{Address, SwapAmount, SwapType};
use sor_config::SorSettings;
use sor_router::{
    load_refresh_file, load_snapshot_file, CostEstimator, FixedPriceOracle, PoolRegistry,
    RouteRequest, RouterError, SmartOrderRouter, SwapPlan,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pool snapshot file, overrides the settings file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// On-chain refresh file, overrides the settings file
    #[arg(long)]
    refresh: Option<PathBuf>,

    /// Token sold
    #[arg(long)]
    token_in: Address,

    /// Token bought
    #[arg(long)]
    token_out: Address,

    /// Amount in human units: input for exact-in, output with --exact-out
    #[arg(long)]
    amount: Decimal,

    /// Fix the output amount instead of the input amount
    #[arg(long)]
    exact_out: bool,

    /// Override the configured hop limit
    #[arg(long)]
    max_hops: Option<usize>,

    /// Gas price used for cost calibration
    #[arg(long, default_value_t = 30_000_000_000)]
    gas_price_wei: u64,

    /// Units of the cost token one unit of native currency buys
    #[arg(long)]
    native_price: Option<Decimal>,

    /// Fixed cost per extra pool in the cost token, skips calibration
    #[arg(long, conflicts_with = "native_price")]
    manual_cost: Option<Decimal>,

    /// Slippage allowance for the batch limits
    #[arg(long, default_value = "0.005")]
    slippage: Decimal,

    /// Fail instead of returning a plan that carries warnings
    #[arg(long)]
    strict: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    plan: &'a SwapPlan,
    limits: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = SorSettings::load(args.config.as_deref())?;

    let snapshot_path = args
        .snapshot
        .or(settings.snapshot_path)
        .context("No pool snapshot given (--snapshot or snapshot_path)")?;

    let registry = Arc::new(PoolRegistry::new());
    let records = load_snapshot_file(&snapshot_path)?;
    let rejected = registry.load_snapshot(&records);
    if !rejected.is_empty() {
        warn!("{} pools rejected from snapshot", rejected.len());
    }

    if let Some(refresh_path) = args.refresh.or(settings.refresh_path) {
        let live = load_refresh_file(&refresh_path)?;
        registry.apply_on_chain_refresh(&live);
    }

    let pools = registry.snapshot();
    let swap_type = if args.exact_out {
        SwapType::ExactOut
    } else {
        SwapType::ExactIn
    };
    let (amount_address, cost_address) = match swap_type {
        SwapType::ExactIn => (args.token_in, args.token_out),
        SwapType::ExactOut => (args.token_out, args.token_in),
    };
    let amount_token = pools
        .token(&amount_address)
        .with_context(|| format!("Token {} is not in any loaded pool", amount_address))?;
    let amount = SwapAmount::from_decimal(amount_token, args.amount)
        .context("Invalid request amount")?;

    let costs = Arc::new(CostEstimator::new(&settings.router));
    if let Some(cost_token) = pools.token(&cost_address) {
        if let Some(manual_cost) = args.manual_cost {
            costs.set_cost_output_token(&cost_token, manual_cost);
        } else if let Some(native_price) = args.native_price {
            let oracle = FixedPriceOracle::new().with_price(cost_address, native_price);
            costs
                .calibrate_with_oracle(&oracle, &cost_token, args.gas_price_wei)
                .await;
        }
    }

    let router = SmartOrderRouter::new(settings.router, registry, costs);
    let mut request = RouteRequest::new(args.token_in, args.token_out, swap_type, amount);
    request.max_hops = args.max_hops;

    let plan = router.route(&request).context("Routing failed")?;
    if args.strict {
        if let Some(warning) = plan.warnings.first() {
            bail!(RouterError::from(warning.clone()));
        }
    }

    let limits = plan
        .limits(args.slippage)?
        .iter()
        .map(|limit| limit.to_string())
        .collect();
    info!(
        "Plan ready: {} swaps over {} tokens",
        plan.swaps.len(),
        plan.token_addresses.len()
    );

    let output = Output {
        plan: &plan,
        limits,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize plan")?
    );

    Ok(())
}
