//! Bounds on the size of the next contribution.

use flipstarter_util::SATS_PER_BCH;

// Fee model, in bytes of the final transaction.
pub const TARGET_FEE_RATE: u64 = 2;
pub const TRANSACTION_METADATA_BYTES: u64 = 10;
pub const AVERAGE_BYTES_PER_RECIPIENT: u64 = 69;
pub const AVERAGE_BYTES_PER_CONTRIBUTION: u64 = 296;

pub const MAX_COMMITMENTS_PER_TRANSACTION: usize = 650;

/// Position of the floor inside the allowed band, on a 0 to 100 scale.
pub const FLOOR_INPUT_PERCENT: f64 = 0.75;

const BASE_TRANSACTION_BYTES: f64 = 42.0;
const RELAY_MARGIN_BYTES: f64 = 1650.0 + 49.0;
const DUST_LIMIT_BCH: f64 = 546.0 / SATS_PER_BCH as f64;

/// Fee for a fulfillment transaction that includes the next contribution.
pub fn estimate_broadcast_fee(recipient_count: usize, contribution_count: usize) -> u64 {
    let bytes = TRANSACTION_METADATA_BYTES
        + AVERAGE_BYTES_PER_RECIPIENT * recipient_count as u64
        + AVERAGE_BYTES_PER_CONTRIBUTION * (contribution_count as u64 + 1);

    bytes * TARGET_FEE_RATE
}

/// Share of the remaining gap the smallest acceptable contribution must cover.
///
/// Interpolates exponentially between a lower bound that keeps the gap
/// closable within [`MAX_COMMITMENTS_PER_TRANSACTION`] inputs above dust, and
/// an upper bound that keeps the final transaction under relay limits.
/// Returns 1.0 once the input budget is exhausted or nothing remains, and
/// never more than that.
pub fn floor_fraction(
    input_percent: f64,
    miner_fee: u64,
    total_output_value: u64,
    committed_satoshis: u64,
    commitment_count: usize,
) -> f64 {
    let remaining = miner_fee as f64 + (total_output_value as f64 - committed_satoshis as f64);
    if commitment_count >= MAX_COMMITMENTS_PER_TRANSACTION || remaining <= 0.0 {
        return 1.0;
    }

    let slots_left = (MAX_COMMITMENTS_PER_TRANSACTION - commitment_count) as f64;
    let min_percent = (remaining / slots_left + DUST_LIMIT_BCH) / remaining;
    let max_percent =
        1.0 - (BASE_TRANSACTION_BYTES + RELAY_MARGIN_BYTES) / (remaining * SATS_PER_BCH as f64);

    let min_value = (min_percent * 100.0).ln();
    let max_value = (max_percent * 100.0).ln();

    let fraction = (min_value + input_percent * (max_value - min_value) / 100.0).exp() / 100.0;

    // With a single slot left the lower bound itself exceeds the whole gap.
    fraction.min(1.0)
}

pub fn floor(
    requested_satoshis: u64,
    recipient_count: usize,
    committed_satoshis: u64,
    committed_count: usize,
) -> i64 {
    let fee = estimate_broadcast_fee(recipient_count, committed_count);
    let base = remaining_with_fee(requested_satoshis, fee, committed_satoshis);
    let fraction = floor_fraction(
        FLOOR_INPUT_PERCENT,
        fee,
        requested_satoshis,
        committed_satoshis,
        committed_count,
    );

    (base as f64 * fraction).ceil() as i64
}

pub fn ceiling(
    requested_satoshis: u64,
    recipient_count: usize,
    committed_satoshis: u64,
    committed_count: usize,
) -> i64 {
    let fee = estimate_broadcast_fee(recipient_count, committed_count);
    remaining_with_fee(requested_satoshis, fee, committed_satoshis)
}

fn remaining_with_fee(requested_satoshis: u64, fee: u64, committed_satoshis: u64) -> i64 {
    requested_satoshis as i64 + fee as i64 - committed_satoshis as i64
}

/// Current funding band for one campaign state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingLimits {
    pub miner_fee: u64,
    pub floor: i64,
    pub ceiling: i64,
}

impl FundingLimits {
    pub fn compute(
        requested_satoshis: u64,
        recipient_count: usize,
        committed_satoshis: u64,
        committed_count: usize,
    ) -> Self {
        Self {
            miner_fee: estimate_broadcast_fee(recipient_count, committed_count),
            floor: floor(requested_satoshis, recipient_count, committed_satoshis, committed_count),
            ceiling: ceiling(requested_satoshis, recipient_count, committed_satoshis, committed_count),
        }
    }

    pub fn contains(&self, satoshis: u64) -> bool {
        let satoshis = satoshis as i64;
        satoshis >= self.floor && satoshis <= self.ceiling
    }
}
