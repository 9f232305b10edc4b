// src/block.rs
//
// Block payloads. A block is immutable once sealed: the balance snapshot is
// copied from the parent, the transaction set is fixed in id order, and the
// identity digest covers everything a receiver re-derives.
//

use std::sync::Arc;

use serde::Serialize;

use crate::ledger::{BalanceSheet, LedgerFault};
use crate::sched::SimTime;
use crate::transaction::{PeerId, Transaction, TxId};

/// 256-bit block identity digest.
pub type BlockId = [u8; 32];

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    /// `None` only for genesis.
    pub parent: Option<BlockId>,
    /// Virtual time at which the block was sealed by its miner.
    pub timestamp: SimTime,
    /// Transactions in id order; validation iterates exactly this order so
    /// balance snapshots are reproducible on every peer.
    pub transactions: Vec<Arc<Transaction>>,
    /// `None` only for genesis.
    pub miner: Option<PeerId>,
    pub height: u64,
    /// Cumulative balances after this block, coinbase included.
    pub balances: BalanceSheet,
}

/// Canonical byte view fed to the identity digest.
#[derive(Serialize)]
struct DigestView<'a> {
    parent: Option<&'a BlockId>,
    timestamp_bits: u64,
    tx_ids: Vec<&'a TxId>,
    miner: Option<PeerId>,
}

fn digest(
    parent: Option<&BlockId>,
    timestamp: SimTime,
    txs: &[Arc<Transaction>],
    miner: Option<PeerId>,
) -> BlockId {
    let view = DigestView {
        parent,
        timestamp_bits: timestamp.as_secs().to_bits(),
        tx_ids: txs.iter().map(|tx| &tx.id).collect(),
        miner,
    };
    let bytes = bincode::serialize(&view).expect("digest view serializes");
    *blake3::hash(&bytes).as_bytes()
}

impl Block {
    /// The shared genesis block: height 0, no miner, all balances zero.
    pub fn genesis(participants: usize) -> Self {
        let timestamp = SimTime::ZERO;
        Self {
            id: digest(None, timestamp, &[], None),
            parent: None,
            timestamp,
            transactions: Vec::new(),
            miner: None,
            height: 0,
            balances: BalanceSheet::new(participants),
        }
    }

    /// Build and validate a candidate on top of `parent`. The transaction
    /// set is sorted by id, applied to a copy of the parent's snapshot, and
    /// the miner's coinbase credited. Any ledger fault aborts the seal and
    /// the caller discards the attempt.
    pub fn seal(
        parent: &Block,
        timestamp: SimTime,
        mut transactions: Vec<Arc<Transaction>>,
        miner: PeerId,
    ) -> Result<Self, LedgerFault> {
        transactions.sort_by(|a, b| a.id.cmp(&b.id));
        let mut balances = parent.balances.clone();
        balances.apply_all(&transactions, miner)?;
        Ok(Self {
            id: digest(Some(&parent.id), timestamp, &transactions, Some(miner)),
            parent: Some(parent.id),
            timestamp,
            miner: Some(miner),
            height: parent.height + 1,
            balances,
            transactions,
        })
    }

    /// Full receiver-side check against the claimed parent: linkage, height,
    /// digest integrity, and the balance snapshot re-derived from the
    /// parent's. Invalid blocks are dropped silently by callers.
    pub fn verify_against(&self, parent: &Block) -> bool {
        if self.parent != Some(parent.id) {
            return false;
        }
        if self.height != parent.height + 1 {
            return false;
        }
        let miner = match self.miner {
            Some(miner) => miner,
            None => return false,
        };
        if !self
            .transactions
            .windows(2)
            .all(|pair| pair[0].id <= pair[1].id)
        {
            return false;
        }
        if self.id != digest(Some(&parent.id), self.timestamp, &self.transactions, Some(miner)) {
            return false;
        }
        let mut expected = parent.balances.clone();
        if expected.apply_all(&self.transactions, miner).is_err() {
            return false;
        }
        expected == self.balances
    }

    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }

    /// Wire size in Kb: one KB per transaction plus the coinbase.
    pub fn size_kbits(&self) -> f64 {
        8.0 * (self.transactions.len() as f64 + 1.0)
    }

    /// Short hex prefix of the id for labels and log lines.
    pub fn short_id(&self) -> String {
        hex::encode(&self.id[..8])
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}
