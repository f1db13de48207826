use crate::contract::AssuranceContract;
use crate::error::{FlipstarterError, Result};
use crate::service::CryptoServiceRef;
use crate::threshold::{FundingLimits, estimate_broadcast_fee};
use crate::types::{CampaignId, Commitment, CommitmentEvent, Recipient};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Unix timestamps in seconds, `expires` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSchedule {
    pub starts: u64,
    pub expires: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub recipients: Vec<Recipient>,
    pub schedule: CampaignSchedule,

    #[serde(default)]
    pub commitments: Vec<Commitment>,

    /// Transaction id of the fulfillment, once broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingStatus {
    pub requested_satoshis: u64,
    pub committed_satoshis: u64,
    pub remaining_satoshis: u64,
    pub commitment_count: usize,

    /// Fee the fulfillment transaction pays with the current inputs.
    pub fulfillment_fee: u64,
    pub limits: FundingLimits,
}

impl FundingStatus {
    /// Satoshis still missing before the outputs and the fulfillment fee are covered.
    pub fn shortfall_satoshis(&self) -> u64 {
        (self.requested_satoshis + self.fulfillment_fee).saturating_sub(self.committed_satoshis)
    }
}

impl Campaign {
    pub fn new(id: &str, recipients: Vec<Recipient>, schedule: CampaignSchedule) -> Self {
        Self {
            id: id.to_string(),
            recipients,
            schedule,
            commitments: Vec::new(),
            fulfillment: None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fulfillment.is_some()
    }

    pub fn check_open(&self, now: u64) -> Result<()> {
        if self.is_fulfilled() {
            return Err(FlipstarterError::CampaignFulfilled(self.id.clone()));
        }
        if now < self.schedule.starts {
            return Err(FlipstarterError::CampaignNotStarted(self.id.clone()));
        }
        if now >= self.schedule.expires {
            return Err(FlipstarterError::CampaignExpired(self.id.clone()));
        }

        Ok(())
    }

    pub fn live_commitments(&self) -> Vec<Commitment> {
        self.commitments.iter().filter(|c| !c.revoked).cloned().collect()
    }

    pub fn committed_satoshis(&self) -> u64 {
        self.commitments
            .iter()
            .filter(|c| !c.revoked)
            .map(|c| c.satoshis)
            .sum()
    }

    pub fn commitment_count(&self) -> usize {
        self.commitments.iter().filter(|c| !c.revoked).count()
    }

    pub fn requested_satoshis(&self) -> u64 {
        self.recipients.iter().map(|r| r.satoshis).sum()
    }

    /// Returns false when the commitment was already live.
    pub fn record_commitment(&mut self, commitment: Commitment) -> bool {
        match self
            .commitments
            .iter_mut()
            .find(|c| c.is_same_commitment(&commitment))
        {
            Some(existing) if !existing.revoked => false,
            Some(existing) => {
                *existing = commitment;
                existing.revoked = false;
                true
            }
            None => {
                self.commitments.push(commitment);
                true
            }
        }
    }

    /// Applies a watcher event addressed to this campaign. Returns true if
    /// the live set changed.
    pub fn apply_event(&mut self, event: &CommitmentEvent) -> bool {
        let commitment = event.commitment();
        if commitment.campaign_id.as_deref() != Some(self.id.as_str()) {
            return false;
        }

        match event {
            CommitmentEvent::Accepted(c) => self.record_commitment(c.clone()),
            CommitmentEvent::Revoked(c) => {
                match self
                    .commitments
                    .iter_mut()
                    .find(|existing| existing.is_same_commitment(c) && !existing.revoked)
                {
                    Some(existing) => {
                        existing.revoked = true;
                        true
                    }
                    None => false,
                }
            }
        }
    }

    pub fn funding_status(&self, crypto: CryptoServiceRef) -> Result<FundingStatus> {
        let mut contract = AssuranceContract::with_recipients(crypto, &self.recipients)?;
        for commitment in self.live_commitments() {
            contract.add_commitment(commitment);
        }

        let requested_satoshis = contract.total_contract_output_value();
        let committed_satoshis = contract.total_commitment_value();
        let commitment_count = contract.inputs().len();
        let recipient_count = contract.count_contract_outputs();

        Ok(FundingStatus {
            requested_satoshis,
            committed_satoshis,
            remaining_satoshis: contract.remaining_commitment_value(),
            commitment_count,
            fulfillment_fee: estimate_broadcast_fee(recipient_count, commitment_count.saturating_sub(1)),
            limits: FundingLimits::compute(
                requested_satoshis,
                recipient_count,
                committed_satoshis,
                commitment_count,
            ),
        })
    }
}

/// In-memory campaign store shared between request handlers and the event consumer.
#[derive(Default)]
pub struct CampaignRegistry {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
}

impl CampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, campaign: Campaign) -> Result<()> {
        let mut campaigns = self.campaigns.lock().unwrap();
        if campaigns.contains_key(&campaign.id) {
            let msg = format!("Campaign {} already exists", campaign.id);
            error!("{}", msg);
            return Err(FlipstarterError::Validation(msg));
        }

        info!(
            "Campaign {} registered, {} recipients",
            campaign.id,
            campaign.recipients.len()
        );
        campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Campaign> {
        let campaigns = self.campaigns.lock().unwrap();
        campaigns
            .get(id)
            .cloned()
            .ok_or_else(|| FlipstarterError::CampaignDoesNotExist(id.to_string()))
    }

    pub fn record_commitment(&self, id: &str, commitment: Commitment) -> Result<()> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign = campaigns
            .get_mut(id)
            .ok_or_else(|| FlipstarterError::CampaignDoesNotExist(id.to_string()))?;

        campaign.record_commitment(commitment);
        Ok(())
    }

    /// Routes a watcher event to the campaign it belongs to.
    pub fn apply_event(&self, event: &CommitmentEvent) -> bool {
        let Some(id) = event.commitment().campaign_id.as_deref() else {
            return false;
        };

        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.get_mut(id) {
            Some(campaign) => campaign.apply_event(event),
            None => {
                warn!("Event for unknown campaign {}", id);
                false
            }
        }
    }

    pub fn mark_fulfilled(&self, id: &str, transaction_id: &str) -> Result<()> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let campaign = campaigns
            .get_mut(id)
            .ok_or_else(|| FlipstarterError::CampaignDoesNotExist(id.to_string()))?;
        if campaign.is_fulfilled() {
            return Err(FlipstarterError::CampaignFulfilled(id.to_string()));
        }

        campaign.fulfillment = Some(transaction_id.to_string());
        info!("Campaign {} fulfilled by {}", id, transaction_id);
        Ok(())
    }

    pub fn live_commitments(&self) -> Vec<Commitment> {
        let campaigns = self.campaigns.lock().unwrap();
        campaigns
            .values()
            .filter(|c| !c.is_fulfilled())
            .flat_map(|c| c.live_commitments())
            .collect()
    }
}
