//! Command line interface

use crate::agents::AgentSelector;
use crate::attestation::{HttpDataAvailabilityLayer, HttpVerifier};
use crate::chain::{
    fasset_checked, resolve_checked, AssetManagerApi, ChainProvider, EthersAssetManager,
    EthersWrappedAsset, RegistryResolver, SignerClient,
};
use crate::config::{parse_address, Settings};
use crate::coordination::{MintPipeline, MintRequest, MintServices, PipelineOptions};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::minting::{CollateralReservation, MintOutcome, PaymentReference};
use crate::redemption::{RedemptionClient, RedemptionOutcome, RedemptionQueueAggregator};
use crate::state::{FlowKind, FlowRecord, FlowStore, MemoryFlowStore, StateManager};
use crate::underlying::XrplClient;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ethers::providers::Middleware;
use ethers::types::{Address, H256, U256};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fassets-orchestrator")]
#[command(version)]
#[command(about = "Mint and redeem FAssets between Flare and the XRP Ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, env = "FASSETS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Submit executeMinting and redemption transactions instead of logging the plan
    #[arg(long)]
    pub execute: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the FAsset token address
    FassetAddress,
    /// Print the asset manager settings
    Settings,
    /// List available agents with their live status
    Agents,
    /// Total the redemption queue
    Queue,
    /// Reserve collateral, pay on the XRP Ledger and execute the minting
    Mint {
        #[arg(long)]
        lots: u64,
        /// Executor address (defaults to minting.executor)
        #[arg(long)]
        executor: Option<String>,
        /// Voting round to fetch the proof from instead of the payment's round
        #[arg(long)]
        round_id: Option<u64>,
    },
    /// Fetch the proof for a paid reservation and execute the minting
    ExecuteMinting {
        #[arg(long)]
        reservation_id: String,
        /// XRPL payment transaction hash
        #[arg(long)]
        transaction_id: String,
        #[arg(long)]
        round_id: Option<u64>,
    },
    /// Redeem lots to an XRPL address
    Redeem {
        #[arg(long)]
        lots: u64,
        /// XRPL classic address receiving the underlying
        #[arg(long)]
        to: String,
        #[arg(long)]
        executor: Option<String>,
    },
    /// Recover a reservation from its reserveCollateral transaction
    RecoverReservation {
        #[arg(long)]
        tx_hash: String,
    },
}

impl Commands {
    /// Commands that can run long enough to be worth scraping
    pub fn is_long_running(&self) -> bool {
        matches!(self, Commands::Mint { .. } | Commands::ExecuteMinting { .. })
    }
}

/// Clients shared by the commands
struct Context {
    settings: Settings,
    provider: ChainProvider,
}

impl Context {
    fn new(settings: Settings) -> OrchestratorResult<Self> {
        let provider = ChainProvider::new(&settings.network)?;
        Ok(Self { settings, provider })
    }

    async fn resolve_asset_manager<M: Middleware + 'static>(
        &self,
        client: Arc<M>,
    ) -> OrchestratorResult<Address> {
        let registry = RegistryResolver::new(
            self.settings.registry_address()?,
            client,
            self.settings.call_timeout(),
        );
        let address = resolve_checked(&registry, &self.settings.network.asset_manager_name).await?;
        info!(
            "{} resolved to {:?}",
            self.settings.network.asset_manager_name, address
        );
        Ok(address)
    }

    async fn reader(&self) -> OrchestratorResult<Arc<dyn AssetManagerApi>> {
        let client = self.provider.connect().await?;
        let address = self.resolve_asset_manager(client.clone()).await?;
        let asset_manager: Arc<dyn AssetManagerApi> = Arc::new(EthersAssetManager::new(
            address,
            client,
            &self.provider,
            self.settings.retry.clone(),
        ));
        Ok(asset_manager)
    }

    async fn signer(&self) -> OrchestratorResult<(Arc<dyn AssetManagerApi>, Arc<SignerClient>)> {
        let client = self
            .provider
            .connect_signer(&self.settings.network.private_key_env)
            .await?;
        let address = self.resolve_asset_manager(client.clone()).await?;
        let asset_manager: Arc<dyn AssetManagerApi> = Arc::new(EthersAssetManager::new(
            address,
            client.clone(),
            &self.provider,
            self.settings.retry.clone(),
        ));
        Ok((asset_manager, client))
    }

    async fn store(&self) -> OrchestratorResult<Arc<dyn FlowStore>> {
        let store: Arc<dyn FlowStore> = match &self.settings.database {
            Some(database) => {
                let manager = StateManager::new(database).await?;
                manager.run_migrations().await?;
                manager.health_check().await?;
                Arc::new(manager)
            }
            None => Arc::new(MemoryFlowStore::new()),
        };
        Ok(store)
    }

    fn executor(&self, flag: Option<&str>) -> OrchestratorResult<Address> {
        match flag {
            Some(executor) => parse_address("--executor", executor),
            None => self.settings.executor(),
        }
    }

    async fn pipeline(&self) -> OrchestratorResult<MintPipeline> {
        let (asset_manager, _) = self.signer().await?;
        let attestation = &self.settings.attestation;
        let services = MintServices {
            asset_manager,
            ledger: Arc::new(XrplClient::new(&self.settings.underlying)?),
            verifier: Arc::new(HttpVerifier::new(attestation)?),
            da_layer: Arc::new(HttpDataAvailabilityLayer::new(attestation)?),
            store: self.store().await?,
        };
        Ok(MintPipeline::new(services, PipelineOptions::from_settings(&self.settings)))
    }
}

pub async fn run(command: Commands, settings: Settings) -> Result<()> {
    let ctx = Context::new(settings)?;

    match command {
        Commands::FassetAddress => {
            let fasset = fasset_checked(ctx.reader().await?.as_ref()).await?;
            println!("{:?}", fasset);
        }
        Commands::Settings => {
            let asset_manager = ctx.reader().await?;
            let settings = asset_manager.settings().await?;
            let minting_decimals = asset_manager.asset_minting_decimals().await?;
            print_json(&json!({
                "asset_manager": asset_manager.address(),
                "lot_size_uba": settings.lot_size_uba.to_string(),
                "asset_decimals": settings.asset_decimals,
                "asset_minting_decimals": minting_decimals,
                "max_redeemed_tickets": settings.max_redeemed_tickets,
            }))?;
        }
        Commands::Agents => list_agents(&ctx).await?,
        Commands::Queue => {
            let summary = RedemptionQueueAggregator::new(ctx.reader().await?)
                .aggregate()
                .await?;
            print_json(&summary)?;
        }
        Commands::Mint {
            lots,
            executor,
            round_id,
        } => {
            let request = MintRequest {
                lots,
                executor: ctx.executor(executor.as_deref())?,
                round_id,
            };
            mint(&ctx, request).await?;
        }
        Commands::ExecuteMinting {
            reservation_id,
            transaction_id,
            round_id,
        } => {
            let reservation_id = parse_u256("--reservation-id", &reservation_id)?;
            let pipeline = ctx.pipeline().await?;
            watch_for_shutdown(&pipeline);
            let outcome = pipeline
                .execute_existing(reservation_id, &transaction_id, round_id)
                .await?;
            report_mint_outcome(&outcome)?;
        }
        Commands::Redeem { lots, to, executor } => {
            let executor = ctx.executor(executor.as_deref())?;
            redeem(&ctx, lots, &to, executor).await?;
        }
        Commands::RecoverReservation { tx_hash } => {
            let tx_hash: H256 = tx_hash
                .parse()
                .with_context(|| format!("--tx-hash {} is not a transaction hash", tx_hash))?;
            let asset_manager = ctx.reader().await?;
            let settings = asset_manager.settings().await?;
            let reserved = asset_manager.reservation_from_tx(tx_hash).await?;
            let reservation = CollateralReservation::from_event(
                reserved,
                settings.lot_size_uba,
                U256::zero(),
                tx_hash,
            )?;
            info!(
                "Recovered reservation {} from tx {:?}",
                reservation.reservation_id, tx_hash
            );
            print_json(&json!({
                "reservation_id": reservation.reservation_id.to_string(),
                "agent_vault": reservation.agent_vault,
                "lots": reservation.lots,
                "value_uba": reservation.value_uba.to_string(),
                "minting_fee_uba": reservation.minting_fee_uba.to_string(),
                "payment_amount_uba": reservation.underlying_amount_uba().to_string(),
                "payment_address": reservation.payment_address,
                "payment_reference": reservation.payment_reference.to_string(),
                "last_underlying_block": reservation.last_underlying_block.to_string(),
                "last_underlying_timestamp": reservation.last_underlying_timestamp.to_string(),
            }))?;
        }
    }

    Ok(())
}

async fn list_agents(ctx: &Context) -> Result<()> {
    let asset_manager = ctx.reader().await?;
    let selector = AgentSelector::new(asset_manager.clone(), ctx.settings.minting.agent_page_size);
    let agents = selector.list_agents().await?;
    let infos = try_join_all(agents.iter().map(|a| asset_manager.agent_info(a.vault))).await?;

    let rows: Vec<_> = agents
        .iter()
        .zip(infos)
        .map(|(agent, info)| {
            json!({
                "vault": agent.vault,
                "fee_bips": agent.fee_bips.to_string(),
                "free_collateral_lots": agent.free_collateral_lots.to_string(),
                "status": info.status.to_string(),
            })
        })
        .collect();
    print_json(&rows)
}

async fn mint(ctx: &Context, request: MintRequest) -> Result<()> {
    let pipeline = ctx.pipeline().await?;
    for flow in pipeline.unfinished_flows().await? {
        warn!(
            "Unfinished {} flow {} stopped at {} (reservation {:?}, underlying tx {:?}, round {:?})",
            flow.kind, flow.flow_id, flow.stage, flow.reservation_id, flow.underlying_tx, flow.round_id
        );
    }
    watch_for_shutdown(&pipeline);

    let report = pipeline.run(request).await?;
    info!(
        "Flow {}: reservation {} paid by {} in round {}",
        report.flow_id, report.reservation.reservation_id, report.payment.tx_hash, report.round_id
    );
    report_mint_outcome(&report.outcome)
}

async fn redeem(ctx: &Context, lots: u64, destination: &str, executor: Address) -> Result<()> {
    let (asset_manager, client) = ctx.signer().await?;
    let fasset_address = fasset_checked(asset_manager.as_ref()).await?;
    let fasset = Arc::new(EthersWrappedAsset::new(
        fasset_address,
        client,
        &ctx.provider,
        ctx.settings.retry.clone(),
    ));
    let store = ctx.store().await?;
    let redemptions = RedemptionClient::new(asset_manager, fasset, ctx.settings.minting.dry_run);

    let mut record = FlowRecord::new(FlowKind::Redeem, "redeeming");
    store.save(&record).await?;

    let result = redemptions.redeem(lots, destination, executor).await;
    record.updated_at = Utc::now();
    match &result {
        Ok(_) => record.stage = "completed".to_string(),
        Err(e) => record.error = Some(e.to_string()),
    }
    if let Err(e) = store.save(&record).await {
        warn!("Failed to save flow {}: {}", record.flow_id, e);
    }
    let outcome = if result.is_ok() { "completed" } else { "failed" };
    crate::metrics::record_flow(FlowKind::Redeem, outcome, &record.stage);

    match result? {
        RedemptionOutcome::DryRun(plan) => {
            info!("Dry run: pass --execute to approve and redeem");
            print_json(&plan)
        }
        RedemptionOutcome::Redeemed {
            approval_tx,
            receipt,
        } => {
            let requests: Vec<_> = receipt
                .requests
                .iter()
                .map(|r| {
                    let reference = PaymentReference::from_bytes(r.payment_reference);
                    let expected = PaymentReference::redemption(r.request_id).ok();
                    if expected != Some(reference) {
                        warn!(
                            "Redemption request {} carries unexpected reference {}",
                            r.request_id, reference
                        );
                    }
                    json!({
                        "request_id": r.request_id.to_string(),
                        "agent_vault": r.agent_vault,
                        "payment_address": r.payment_address,
                        "value_uba": r.value_uba.to_string(),
                        "fee_uba": r.fee_uba.to_string(),
                        "payment_reference": reference.to_string(),
                    })
                })
                .collect();
            print_json(&json!({
                "approval_tx": approval_tx,
                "redeem_tx": receipt.tx_hash,
                "requests": requests,
            }))
        }
    }
}

fn report_mint_outcome(outcome: &MintOutcome) -> Result<()> {
    match outcome {
        MintOutcome::DryRun(plan) => {
            info!("Dry run: pass --execute to submit executeMinting");
            print_json(plan)
        }
        MintOutcome::Executed(receipt) => print_json(&json!({
            "execute_minting_tx": receipt.tx_hash,
            "minted_uba": receipt.minted.as_ref().map(|m| m.minted_uba.to_string()),
        })),
    }
}

fn watch_for_shutdown(pipeline: &MintPipeline) {
    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping before the next stage");
        *shutdown.write().await = true;
    });
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Decimal or 0x-prefixed hex
fn parse_u256(field: &str, value: &str) -> OrchestratorResult<U256> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(value).ok(),
    };
    parsed.ok_or_else(|| OrchestratorError::Config(format!("{} = {:?} is not a number", field, value)))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reservation_id() {
        assert_eq!(parse_u256("id", "10255417").unwrap(), U256::from(10_255_417u64));
        assert_eq!(parse_u256("id", "0x9c7c39").unwrap(), U256::from(0x9c7c39u64));
        assert!(parse_u256("id", "ten").is_err());
    }

    #[test]
    fn test_mint_arguments() {
        let cli = Cli::try_parse_from([
            "fassets-orchestrator",
            "--execute",
            "mint",
            "--lots",
            "2",
            "--round-id",
            "1034237",
        ])
        .unwrap();

        assert!(cli.execute);
        assert!(cli.command.is_long_running());
        assert!(matches!(
            cli.command,
            Commands::Mint { lots: 2, executor: None, round_id: Some(1_034_237) }
        ));
    }

    #[test]
    fn test_redeem_requires_destination() {
        assert!(Cli::try_parse_from(["fassets-orchestrator", "redeem", "--lots", "1"]).is_err());
    }
}
