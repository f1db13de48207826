use crate::campaign::CampaignRegistry;
use crate::contract::AssuranceContract;
use crate::error::{FlipstarterError, Result};
use crate::service::{BlockchainServiceRef, CryptoServiceRef, StatusNotifier};
use crate::types::{
    BroadcastResponse, Commitment, CommitmentData, CommitmentEvent, Recipient, StatusNotification,
    UnspentOutput,
};
use crate::validator::CommitmentValidator;
use flipstarter_util::ScriptHash;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// An entry exists only while the script hash is subscribed externally.
#[derive(Default)]
struct Subscription {
    // None until the first notification arrives.
    last_status: Option<Option<String>>,

    commitments: Vec<Commitment>,
}

impl Subscription {
    // Returns false when the commitment is already tracked.
    fn track(&mut self, commitment: &Commitment) -> bool {
        if self.commitments.iter().any(|c| c.is_same_commitment(commitment)) {
            return false;
        }

        let mut tracked = commitment.clone();
        tracked.revoked = false;
        self.commitments.push(tracked);
        true
    }
}

/// Tracks live commitments per script hash and reacts to their outputs
/// being spent elsewhere.
///
/// Three async locks guard independent concerns and are never held together:
/// `submission_lock` serializes validation against the committed totals,
/// `revocation_lock` makes the status token check-and-update atomic and
/// `reconciliation_lock` covers unspent checks and fulfillment.
pub struct CommitmentWatcher {
    service: BlockchainServiceRef,
    crypto: CryptoServiceRef,
    validator: CommitmentValidator,

    subscriptions: Mutex<HashMap<ScriptHash, Subscription>>,

    submission_lock: tokio::sync::Mutex<()>,
    revocation_lock: tokio::sync::Mutex<()>,
    reconciliation_lock: tokio::sync::Mutex<()>,

    events: mpsc::UnboundedSender<CommitmentEvent>,
    notifier: StatusNotifier,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<StatusNotification>>>,
}

pub type CommitmentWatcherRef = Arc<CommitmentWatcher>;

impl CommitmentWatcher {
    pub fn new(
        service: BlockchainServiceRef,
        crypto: CryptoServiceRef,
    ) -> (Self, mpsc::UnboundedReceiver<CommitmentEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (notifier, notifications) = mpsc::unbounded_channel();

        let watcher = Self {
            validator: CommitmentValidator::new(service.clone(), crypto.clone()),
            service,
            crypto,
            subscriptions: Mutex::new(HashMap::new()),
            submission_lock: tokio::sync::Mutex::new(()),
            revocation_lock: tokio::sync::Mutex::new(()),
            reconciliation_lock: tokio::sync::Mutex::new(()),
            events,
            notifier,
            notifications: Mutex::new(Some(notifications)),
        };

        (watcher, events_rx)
    }

    /// Spawns the loop feeding blockchain notifications into
    /// [`Self::handle_revocations`]. Can be called once.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let mut rx = self.notifications.lock().unwrap().take().ok_or_else(|| {
            let msg = "Commitment watcher notification loop already started".to_string();
            error!("{}", msg);
            FlipstarterError::Service(msg)
        })?;

        let watcher = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            info!("Commitment watcher notification loop started");

            while let Some(notification) = rx.recv().await {
                let Some(watcher) = watcher.upgrade() else {
                    break;
                };

                tokio::spawn(async move {
                    if let Err(e) = watcher.handle_revocations(notification).await {
                        error!("Failed to handle status notification: {}", e);
                    }
                });
            }

            info!("Commitment watcher notification loop exited");
        });

        Ok(handle)
    }

    pub fn is_subscribed(&self, script_hash: &ScriptHash) -> bool {
        let subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.contains_key(script_hash)
    }

    pub fn tracked_commitments(&self, script_hash: &ScriptHash) -> Vec<Commitment> {
        let subscriptions = self.subscriptions.lock().unwrap();
        subscriptions
            .get(script_hash)
            .map(|s| s.commitments.clone())
            .unwrap_or_default()
    }

    fn emit(&self, event: CommitmentEvent) {
        if self.events.send(event).is_err() {
            debug!("Commitment event dropped, no listener");
        }
    }

    pub async fn subscribe_to_commitment(&self, commitment: &Commitment) -> Result<()> {
        if commitment.campaign_id.as_deref().is_none_or(|id| id.is_empty()) {
            let msg = "Commitment requires 'campaignId' property".to_string();
            return Err(FlipstarterError::Validation(msg));
        }

        let script_hash = commitment.script_hash;
        let tracked = {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            subscriptions
                .get_mut(&script_hash)
                .map(|subscription| subscription.track(commitment))
        };

        // Commitments are only tracked once their script hash is subscribed.
        let is_new = match tracked {
            Some(is_new) => is_new,
            None => {
                // Concurrent callers may both subscribe; the server treats it as one.
                self.service
                    .subscribe_to_script_hash(&script_hash, self.notifier.clone())
                    .await
                    .map_err(|e| {
                        let msg = format!("Failed to subscribe to script hash {}: {}", script_hash, e);
                        error!("{}", msg);
                        FlipstarterError::Service(msg)
                    })?;
                debug!("Subscribed to script hash {}", script_hash);

                let mut subscriptions = self.subscriptions.lock().unwrap();
                subscriptions.entry(script_hash).or_default().track(commitment)
            }
        };

        if is_new {
            info!(
                "Commitment accepted: {}:{} {} satoshis",
                commitment.tx_hash, commitment.tx_index, commitment.satoshis
            );
            self.emit(CommitmentEvent::Accepted(commitment.clone()));
        }

        Ok(())
    }

    pub async fn subscribe_to_commitments(&self, commitments: &[Commitment]) -> Result<()> {
        let results = join_all(commitments.iter().map(|c| self.subscribe_to_commitment(c))).await;
        results.into_iter().collect()
    }

    pub async fn unsubscribe_to_commitment(&self, commitment: &Commitment) {
        let script_hash = commitment.script_hash;
        let was_last = {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            let Some(subscription) = subscriptions.get_mut(&script_hash) else {
                return;
            };

            subscription.commitments.retain(|c| !c.is_same_commitment(commitment));
            let was_last = subscription.commitments.is_empty();
            if was_last {
                subscriptions.remove(&script_hash);
            }

            was_last
        };

        if was_last {
            // Other script hashes may still share the notification channel.
            if let Err(e) = self.service.unsubscribe_from_script_hash(&script_hash).await {
                warn!("Failed to unsubscribe from script hash {}: {}", script_hash, e);
            } else {
                debug!("Unsubscribed from script hash {}", script_hash);
            }
        }

        info!(
            "Commitment revoked: {}:{} {} satoshis",
            commitment.tx_hash, commitment.tx_index, commitment.satoshis
        );

        let mut revoked = commitment.clone();
        revoked.revoked = true;
        self.emit(CommitmentEvent::Revoked(revoked));
    }

    /// Revokes every commitment whose output is no longer unspent and
    /// re-subscribes the rest.
    pub async fn check_for_transaction_updates(
        &self,
        script_hash: &ScriptHash,
        commitments: &[Commitment],
    ) -> Result<()> {
        if commitments.is_empty() {
            return Ok(());
        }

        let _guard = self.reconciliation_lock.lock().await;
        let unspent = self.query_unspent(script_hash).await?;
        self.apply_unspent(&unspent, commitments).await;

        Ok(())
    }

    // Reconciles whatever is tracked for the script hash once the guard is held,
    // so a notification never acts on a set another one already changed.
    async fn check_tracked_for_updates(&self, script_hash: &ScriptHash) -> Result<()> {
        let _guard = self.reconciliation_lock.lock().await;

        let commitments = self.tracked_commitments(script_hash);
        if commitments.is_empty() {
            return Ok(());
        }

        let unspent = self.query_unspent(script_hash).await?;
        self.apply_unspent(&unspent, &commitments).await;

        Ok(())
    }

    async fn query_unspent(&self, script_hash: &ScriptHash) -> Result<Vec<UnspentOutput>> {
        self.service.list_unspent_outputs(script_hash).await.map_err(|e| {
            let msg = format!("Failed to list unspent outputs of {}: {}", script_hash, e);
            error!("{}", msg);
            FlipstarterError::Service(msg)
        })
    }

    async fn apply_unspent(&self, unspent: &[UnspentOutput], commitments: &[Commitment]) {
        let updates = commitments.iter().filter(|c| !c.revoked).map(|commitment| {
            let is_unspent = unspent
                .iter()
                .any(|utxo| commitment.spends(&utxo.tx_hash, utxo.output_index));

            async move {
                if is_unspent {
                    if let Err(e) = self.subscribe_to_commitment(commitment).await {
                        warn!(
                            "Failed to keep commitment {}:{} subscribed: {}",
                            commitment.tx_hash, commitment.tx_index, e
                        );
                    }
                } else {
                    self.unsubscribe_to_commitment(commitment).await;
                }
            }
        });
        join_all(updates).await;
    }

    /// Entry point for `[script hash, status]` pushes from the blockchain service.
    pub async fn handle_revocations(&self, notification: StatusNotification) -> Result<()> {
        let script_hash = notification.script_hash;
        {
            let _guard = self.revocation_lock.lock().await;

            let mut subscriptions = self.subscriptions.lock().unwrap();
            let Some(subscription) = subscriptions.get_mut(&script_hash) else {
                debug!("Ignoring notification for untracked script hash {}", script_hash);
                return Ok(());
            };

            if subscription.last_status.as_ref() == Some(&notification.status) {
                debug!("Redundant notification for script hash {}", script_hash);
                return Ok(());
            }

            subscription.last_status = Some(notification.status);
        }

        self.check_tracked_for_updates(&script_hash).await
    }

    /// Full reconciliation sweep, one unspent query per script hash.
    pub async fn check_all_commitments_for_updates(&self, commitments: &[Commitment]) -> Result<()> {
        let mut by_script_hash: HashMap<ScriptHash, Vec<Commitment>> = HashMap::new();
        for commitment in commitments {
            by_script_hash
                .entry(commitment.script_hash)
                .or_default()
                .push(commitment.clone());
        }

        let checks = by_script_hash
            .iter()
            .map(|(script_hash, group)| self.check_for_transaction_updates(script_hash, group));
        let results = join_all(checks).await;

        let mut first_error = None;
        for ret in results {
            if let Err(e) = ret {
                error!("Reconciliation sweep failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn submit_commitment(
        &self,
        recipients: &[Recipient],
        committed_satoshis: u64,
        commitment_count: usize,
        proposed: &CommitmentData,
    ) -> Result<Commitment> {
        let _guard = self.submission_lock.lock().await;

        self.validator
            .validate(recipients, committed_satoshis, commitment_count, proposed)
            .await
    }

    /// Assembles and broadcasts the final transaction, returning its id.
    pub async fn fulfill_campaign(&self, recipients: &[Recipient], commitments: &[Commitment]) -> Result<String> {
        let _guard = self.reconciliation_lock.lock().await;

        let mut contract = AssuranceContract::with_recipients(self.crypto.clone(), recipients)?;
        for commitment in commitments {
            contract.add_commitment(commitment.clone());
        }

        let raw_transaction = hex::encode(contract.assemble_transaction()?);
        let response = self
            .service
            .broadcast(&raw_transaction)
            .await
            .map_err(FlipstarterError::Service)?;

        match response {
            BroadcastResponse::Accepted { transaction_id } => {
                info!(
                    "Fulfillment transaction {} broadcast with {} inputs",
                    transaction_id,
                    commitments.len()
                );
                Ok(transaction_id)
            }
            BroadcastResponse::Rejected { message } => {
                error!("Fulfillment transaction rejected: {}", message);
                Err(FlipstarterError::Broadcast(message))
            }
        }
    }

    /// Validates a contribution to a campaign and starts tracking it.
    ///
    /// The campaign state is read and updated under the submission lock, so
    /// concurrent contributions always see each other's amounts.
    pub async fn contribute(
        &self,
        campaigns: &CampaignRegistry,
        campaign_id: &str,
        proposed: &CommitmentData,
        now: u64,
    ) -> Result<Commitment> {
        let _guard = self.submission_lock.lock().await;

        let campaign = campaigns.get(campaign_id)?;
        campaign.check_open(now)?;

        let mut commitment = self
            .validator
            .validate(
                &campaign.recipients,
                campaign.committed_satoshis(),
                campaign.commitment_count(),
                proposed,
            )
            .await?;

        if let Some(intended) = proposed.intended_satoshis {
            if intended != commitment.satoshis {
                return Err(FlipstarterError::ContributionIntentMismatch {
                    intended,
                    actual: commitment.satoshis,
                });
            }
        }

        commitment.campaign_id = Some(campaign.id.clone());
        self.subscribe_to_commitment(&commitment).await?;
        campaigns.record_commitment(campaign_id, commitment.clone())?;

        Ok(commitment)
    }

    /// Fulfills a campaign whose commitments cover its outputs and the
    /// transaction fee, then marks it terminal.
    pub async fn fulfill(&self, campaigns: &CampaignRegistry, campaign_id: &str) -> Result<String> {
        let campaign = campaigns.get(campaign_id)?;
        if campaign.is_fulfilled() {
            return Err(FlipstarterError::CampaignFulfilled(campaign.id));
        }

        let status = campaign.funding_status(self.crypto.clone())?;
        let shortfall = status.shortfall_satoshis();
        if shortfall > 0 {
            let msg = format!("Campaign {} still needs {} satoshis", campaign.id, shortfall);
            return Err(FlipstarterError::Validation(msg));
        }

        let transaction_id = self
            .fulfill_campaign(&campaign.recipients, &campaign.live_commitments())
            .await?;
        campaigns.mark_fulfilled(campaign_id, &transaction_id)?;

        Ok(transaction_id)
    }
}
