// src/ledger.rs
//
// Per-block cumulative balance snapshots. A sheet is copied from the parent
// block at construction, mutated while the block's transactions are applied
// in their fixed order, and frozen once the block seals.
//

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{PeerId, Transaction};

/// Coins credited to the miner of every non-genesis block.
pub const COINBASE_REWARD: i64 = 50;

/// Why a transaction batch cannot extend a snapshot. Consumers drop the
/// offending block silently; the variants exist for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerFault {
    #[error("transaction pays its own sender")]
    SelfTransfer,
    #[error("transaction amount is not positive")]
    NonPositiveAmount,
    #[error("sender {0} overspends its balance")]
    Overspend(PeerId),
    #[error("participant id {0} outside the population")]
    UnknownParticipant(PeerId),
}

/// Signed balance per participant id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    balances: Vec<i64>,
}

impl BalanceSheet {
    /// All-zero sheet covering `participants` ids.
    pub fn new(participants: usize) -> Self {
        Self {
            balances: vec![0; participants],
        }
    }

    pub fn participants(&self) -> usize {
        self.balances.len()
    }

    pub fn get(&self, id: PeerId) -> i64 {
        self.balances.get(id).copied().unwrap_or(0)
    }

    /// Sum over all participants.
    pub fn total(&self) -> i64 {
        self.balances.iter().sum()
    }

    /// Apply `txs` in the given order, then credit the miner's coinbase.
    /// On any fault the sheet is left untouched.
    pub fn apply_all(
        &mut self,
        txs: &[Arc<Transaction>],
        miner: PeerId,
    ) -> Result<(), LedgerFault> {
        let mut work = self.balances.clone();
        for tx in txs {
            if tx.sender == tx.receiver {
                return Err(LedgerFault::SelfTransfer);
            }
            if tx.amount == 0 {
                return Err(LedgerFault::NonPositiveAmount);
            }
            if tx.sender >= work.len() {
                return Err(LedgerFault::UnknownParticipant(tx.sender));
            }
            if tx.receiver >= work.len() {
                return Err(LedgerFault::UnknownParticipant(tx.receiver));
            }
            let amount = tx.amount as i64;
            if work[tx.sender] < amount {
                return Err(LedgerFault::Overspend(tx.sender));
            }
            work[tx.sender] -= amount;
            work[tx.receiver] += amount;
        }
        if miner >= work.len() {
            return Err(LedgerFault::UnknownParticipant(miner));
        }
        work[miner] += COINBASE_REWARD;
        self.balances = work;
        Ok(())
    }
}
