use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlipstarterError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlipstarterError {
    /// Malformed address, amount or script at construction time.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Malformed or cryptographically invalid commitment.
    #[error("commitment verification failed: {0}")]
    Validation(String),

    #[error("transaction {0} could not be found")]
    TransactionNotFound(String),

    #[error("the UTXO ('{0}') could not be verified as unspent")]
    UtxoNotFound(String),

    #[error("the contribution amount ({actual}) undercommits the current floor of ({floor}) satoshis")]
    UnderCommitment { actual: u64, floor: i64 },

    #[error("the contribution amount ({actual}) overcommits the current ceiling of ({ceiling}) satoshis")]
    OverCommitment { actual: u64, ceiling: i64 },

    /// The server refused the assembled transaction.
    #[error("transaction broadcast failed: {0}")]
    Broadcast(String),

    /// Transport level failure talking to the blockchain service.
    #[error("blockchain service error: {0}")]
    Service(String),

    #[error("campaign {0} does not exist")]
    CampaignDoesNotExist(String),

    #[error("campaign {0} has not yet started")]
    CampaignNotStarted(String),

    #[error("campaign {0} has expired")]
    CampaignExpired(String),

    #[error("campaign {0} has already been fulfilled")]
    CampaignFulfilled(String),

    #[error("the contribution amount ({actual}) does not match the provided intent ({intended})")]
    ContributionIntentMismatch { intended: u64, actual: u64 },
}

impl FlipstarterError {
    // Lookup failures may clear up once the funding transaction propagates.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlipstarterError::TransactionNotFound(_) | FlipstarterError::UtxoNotFound(_)
        )
    }
}
