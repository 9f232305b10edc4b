pub mod adversary;
pub mod block;
pub mod config;
pub mod error;
pub mod ledger;
pub mod network;
pub mod peer;
pub mod report;
pub mod sched;
pub mod sim;
pub mod transaction;
pub mod tree;

pub use adversary::AdversaryState;
pub use block::{Block, BlockId};
pub use config::{AdversaryConfig, AdversaryMode, SimConfig, TieBreak};
pub use error::SimError;
pub use ledger::{BalanceSheet, COINBASE_REWARD};
pub use network::NetworkFabric;
pub use peer::{CpuClass, LinkSpeed, Peer, Role};
pub use sched::{Event, Scheduler, SimTime};
pub use sim::Simulation;
pub use transaction::{PeerId, Transaction, TxId};
pub use tree::{BlockTree, TreeNode};

pub type Result<T> = std::result::Result<T, SimError>;
