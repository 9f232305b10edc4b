// src/transaction.rs
//
// Coin transfers exchanged by the simulated peers. Immutable once minted and
// shared by reference across every peer that hears about them.
//

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sched::SimTime;

/// Participant index into the population (honest peers first, adversary
/// last when one is configured).
pub type PeerId = usize;

/// 256-bit transaction identity digest.
pub type TxId = [u8; 32];

/// Wire size of one transaction: 1 KB payload = 8 Kb.
pub const TX_KBITS: f64 = 8.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub sender: PeerId,
    pub receiver: PeerId,
    /// Coins transferred; always in 1..=5 for generated traffic.
    pub amount: u64,
    /// Virtual time of minting.
    pub timestamp: SimTime,
}

/// Canonical byte view fed to the identity digest.
#[derive(Serialize)]
struct DigestView {
    sender: PeerId,
    receiver: PeerId,
    amount: u64,
    timestamp_bits: u64,
}

impl Transaction {
    /// Mint a transaction with a digest id derived from its content and the
    /// minting instant.
    pub fn mint(sender: PeerId, receiver: PeerId, amount: u64, timestamp: SimTime) -> Self {
        let view = DigestView {
            sender,
            receiver,
            amount,
            timestamp_bits: timestamp.as_secs().to_bits(),
        };
        let bytes = bincode::serialize(&view).expect("digest view serializes");
        let id = *blake3::hash(&bytes).as_bytes();
        Self {
            id,
            sender,
            receiver,
            amount,
            timestamp,
        }
    }

    /// Short hex prefix of the id for labels and log lines.
    pub fn short_id(&self) -> String {
        hex::encode(&self.id[..8])
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} pays {} {} coins",
            self.short_id(),
            self.sender,
            self.receiver,
            self.amount
        )
    }
}
