//! Agent selection for collateral reservation
//!
//! Lists every available agent, keeps those with strictly more free lots than
//! requested, orders them by fee (stable, so list order breaks ties) and
//! returns the first one whose live status is healthy.

use crate::chain::{AgentRecord, AgentStatus, AssetManagerApi};
use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::{Address, U256};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// An agent that passed capacity filtering and the live status check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentCandidate {
    pub vault: Address,
    pub fee_bips: U256,
    pub free_collateral_lots: U256,
    pub status: AgentStatus,
}

pub struct AgentSelector {
    asset_manager: Arc<dyn AssetManagerApi>,
    page_size: u64,
}

impl AgentSelector {
    pub fn new(asset_manager: Arc<dyn AssetManagerApi>, page_size: u64) -> Self {
        Self {
            asset_manager,
            page_size: page_size.max(1),
        }
    }

    /// Read the full available-agents list, in list order
    pub async fn list_agents(&self) -> OrchestratorResult<Vec<AgentRecord>> {
        let first = self.asset_manager.available_agents(0, self.page_size).await?;
        let total = first.total_length;
        check_page(0, self.page_size.min(total), total, first.total_length, first.agents.len())?;

        let starts: Vec<u64> = (self.page_size..total)
            .step_by(self.page_size as usize)
            .collect();
        let rest = try_join_all(starts.into_iter().map(|start| {
            let end = (start + self.page_size).min(total);
            async move {
                let page = self.asset_manager.available_agents(start, end).await?;
                check_page(start, end, total, page.total_length, page.agents.len())?;
                Ok::<_, OrchestratorError>(page.agents)
            }
        }))
        .await?;

        let mut agents = first.agents;
        agents.extend(rest.into_iter().flatten());
        debug!("Listed {} available agents", agents.len());
        Ok(agents)
    }

    /// Select the cheapest healthy agent with more than `min_free_lots` free
    pub async fn select(&self, min_free_lots: u64) -> OrchestratorResult<AgentCandidate> {
        let agents = self.list_agents().await?;

        for agent in rank_by_fee(agents, min_free_lots) {
            let info = self.asset_manager.agent_info(agent.vault).await?;
            crate::metrics::record_candidate_checked(info.status);
            if info.status == AgentStatus::Healthy {
                info!(
                    "Selected agent {:?} (fee {} bips, {} free lots)",
                    agent.vault, agent.fee_bips, agent.free_collateral_lots
                );
                return Ok(AgentCandidate {
                    vault: agent.vault,
                    fee_bips: agent.fee_bips,
                    free_collateral_lots: agent.free_collateral_lots,
                    status: info.status,
                });
            }
            debug!("Skipping agent {:?}: status {}", agent.vault, info.status);
        }

        Err(OrchestratorError::NoCandidate { min_free_lots })
    }
}

/// Agents with strictly more than `min_free_lots` free, cheapest first
pub fn rank_by_fee(agents: Vec<AgentRecord>, min_free_lots: u64) -> Vec<AgentRecord> {
    let min = U256::from(min_free_lots);
    let mut eligible: Vec<AgentRecord> = agents
        .into_iter()
        .filter(|a| a.free_collateral_lots > min)
        .collect();
    eligible.sort_by(|a, b| a.fee_bips.cmp(&b.fee_bips));
    eligible
}

fn check_page(
    start: u64,
    end: u64,
    expected_total: u64,
    reported_total: u64,
    len: usize,
) -> OrchestratorResult<()> {
    if reported_total != expected_total {
        return Err(OrchestratorError::Validation(format!(
            "agent list length changed from {} to {} while paging",
            expected_total, reported_total
        )));
    }
    if len as u64 != end - start {
        return Err(OrchestratorError::Validation(format!(
            "agent page [{}, {}) returned {} entries",
            start, end, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::asset_manager::MockAssetManagerApi;
    use crate::chain::{AgentInfo, AgentPage};
    use std::collections::HashMap;

    fn record(id: u64, fee: u64, free: u64) -> AgentRecord {
        AgentRecord {
            vault: Address::from_low_u64_be(id),
            fee_bips: U256::from(fee),
            free_collateral_lots: U256::from(free),
        }
    }

    fn mock_with(
        agents: Vec<AgentRecord>,
        statuses: HashMap<Address, AgentStatus>,
    ) -> MockAssetManagerApi {
        let mut mock = MockAssetManagerApi::new();
        let total = agents.len() as u64;
        mock.expect_available_agents().returning(move |start, end| {
            let end = end.min(total);
            Ok(AgentPage {
                agents: agents[start as usize..end as usize].to_vec(),
                total_length: total,
            })
        });
        mock.expect_agent_info().returning(move |vault| {
            Ok(AgentInfo {
                status: statuses[&vault],
                fee_bips: U256::zero(),
            })
        });
        mock
    }

    #[tokio::test]
    async fn test_selects_cheapest_healthy_with_capacity() {
        let agents = vec![record(1, 50, 5), record(2, 10, 0), record(3, 30, 3)];
        let statuses = HashMap::from([
            (Address::from_low_u64_be(1), AgentStatus::Healthy),
            (Address::from_low_u64_be(2), AgentStatus::Healthy),
            (Address::from_low_u64_be(3), AgentStatus::Degraded),
        ]);
        let selector = AgentSelector::new(Arc::new(mock_with(agents, statuses)), 10);

        let chosen = selector.select(2).await.unwrap();
        assert_eq!(chosen.vault, Address::from_low_u64_be(1));
        assert_eq!(chosen.fee_bips, U256::from(50u64));
    }

    #[tokio::test]
    async fn test_never_returns_ineligible_agent() {
        let agents = vec![record(1, 5, 2), record(2, 10, 9), record(3, 1, 9)];
        let statuses = HashMap::from([
            (Address::from_low_u64_be(1), AgentStatus::Healthy),
            (Address::from_low_u64_be(2), AgentStatus::Closing),
            (Address::from_low_u64_be(3), AgentStatus::FullLiquidation),
        ]);
        let selector = AgentSelector::new(Arc::new(mock_with(agents, statuses)), 10);

        // Agent 1 is healthy but has exactly the minimum, not more
        assert!(matches!(
            selector.select(2).await,
            Err(OrchestratorError::NoCandidate { min_free_lots: 2 })
        ));
    }

    #[tokio::test]
    async fn test_pages_are_concatenated_in_order() {
        let agents: Vec<AgentRecord> = (1..=25).map(|i| record(i, 100 - i, 10)).collect();
        let mut mock = MockAssetManagerApi::new();
        let served = agents.clone();
        mock.expect_available_agents()
            .times(3)
            .returning(move |start, end| {
                Ok(AgentPage {
                    agents: served[start as usize..end.min(25) as usize].to_vec(),
                    total_length: 25,
                })
            });
        let selector = AgentSelector::new(Arc::new(mock), 10);

        assert_eq!(selector.list_agents().await.unwrap(), agents);
    }

    #[tokio::test]
    async fn test_short_page_is_rejected() {
        let mut mock = MockAssetManagerApi::new();
        mock.expect_available_agents().returning(|_, _| {
            Ok(AgentPage {
                agents: vec![record(1, 10, 10)],
                total_length: 4,
            })
        });
        let selector = AgentSelector::new(Arc::new(mock), 10);

        assert!(matches!(
            selector.list_agents().await,
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_length_change_while_paging_is_rejected() {
        let mut mock = MockAssetManagerApi::new();
        mock.expect_available_agents()
            .times(2)
            .returning(|start, end| {
                // An agent registers between the first and second page
                let total = if start == 0 { 15 } else { 16 };
                Ok(AgentPage {
                    agents: (start..end.min(total)).map(|i| record(i + 1, 10, 10)).collect(),
                    total_length: total,
                })
            });
        let selector = AgentSelector::new(Arc::new(mock), 10);

        assert!(matches!(
            selector.list_agents().await,
            Err(OrchestratorError::Validation(m)) if m.contains("changed from 15 to 16")
        ));
    }

    #[test]
    fn test_rank_is_stable_on_equal_fees() {
        let ranked = rank_by_fee(vec![record(1, 20, 3), record(2, 10, 3), record(3, 20, 3)], 0);
        let order: Vec<u64> = ranked.iter().map(|a| a.vault.to_low_u64_be()).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
