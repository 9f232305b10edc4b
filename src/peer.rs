// src/peer.rs
//
// Peer state and the honest protocol: gossip with per-edge duplicate
// suppression, transaction generation, simulated PoW with a post-hoc race
// check, and longest-chain tree maintenance. The adversary is the same
// record with a different role; its handlers live in adversary.rs.
//

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::adversary::AdversaryState;
use crate::block::{Block, BlockId};
use crate::config::TieBreak;
use crate::network::NetworkFabric;
use crate::sched::{Event, Scheduler};
use crate::transaction::{PeerId, Transaction, TxId};
use crate::tree::BlockTree;

/// Link speed classification; decides link bandwidth in the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpeed {
    Slow,
    Fast,
}

impl LinkSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSpeed::Slow => "slow",
            LinkSpeed::Fast => "fast",
        }
    }
}

/// CPU classification; decides the hashing-power share (high = 10× low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuClass {
    Low,
    High,
}

impl CpuClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CpuClass::Low => "low",
            CpuClass::High => "high",
        }
    }
}

/// What a participant does with the blocks it mines and receives. The
/// adversary is a variant of the peer capability set, not a separate type.
#[derive(Debug)]
pub enum Role {
    Honest,
    Adversary(AdversaryState),
}

/// Parameters every handler needs.
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Total participant count (recipient draws range over this).
    pub participants: usize,
    /// Mean transaction interarrival time (`Ttx`); infinite disables traffic.
    pub ttx_mean: f64,
    /// Target global block interval (`I`).
    pub block_interval: f64,
}

/// Mutable world surface handed to peer handlers: the event queue, the
/// latency fabric, the run RNG and the shared parameters. Peers themselves
/// are borrowed separately so handlers stay single-writer.
pub struct Ctx<'a> {
    pub sched: &'a mut Scheduler,
    pub fabric: &'a NetworkFabric,
    pub rng: &'a mut SmallRng,
    pub params: &'a SimParams,
}

pub struct Peer {
    pub id: PeerId,
    pub speed: LinkSpeed,
    pub cpu: CpuClass,
    /// Fraction of global hashing power.
    pub hashing_power: f64,
    pub neighbors: Vec<PeerId>,
    /// Every transaction this peer has heard of. No eviction.
    pool: HashMap<TxId, Arc<Transaction>>,
    /// Per-neighbor ids already seen on that edge (sent or received).
    tx_routes: HashMap<PeerId, HashSet<TxId>>,
    block_routes: HashMap<PeerId, HashSet<BlockId>>,
    pub tree: BlockTree,
    /// Own balance at the adopted tip.
    pub balance: i64,
    /// Blocks that survived the race check and entered the local tree.
    pub minted: u64,
    /// Parent id of the in-flight mining attempt, if any. Keeps exactly one
    /// logical mining process alive per peer.
    pending_mine: Option<BlockId>,
    pub role: Role,
}

impl Peer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PeerId,
        speed: LinkSpeed,
        cpu: CpuClass,
        hashing_power: f64,
        neighbors: Vec<PeerId>,
        genesis: Arc<Block>,
        tie_break: TieBreak,
        role: Role,
    ) -> Self {
        Self {
            id,
            speed,
            cpu,
            hashing_power,
            neighbors,
            pool: HashMap::new(),
            tx_routes: HashMap::new(),
            block_routes: HashMap::new(),
            tree: BlockTree::new(genesis, tie_break),
            balance: 0,
            minted: 0,
            pending_mine: None,
            role,
        }
    }

    pub fn is_adversary(&self) -> bool {
        matches!(self.role, Role::Adversary(_))
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Blocks mined by this peer that sit on its own main chain.
    pub fn blocks_on_main_chain(&self) -> u64 {
        self.tree
            .main_chain()
            .iter()
            .filter(|id| {
                self.tree
                    .get(id)
                    .map(|node| node.block.miner == Some(self.id))
                    .unwrap_or(false)
            })
            .count() as u64
    }

    /* ------------------- transaction generation ------------------- */

    /// One step of the perpetual generation process: mint a transfer to a
    /// random non-self recipient, gossip it, and re-arm the timer.
    pub fn generate_transaction(&mut self, ctx: &mut Ctx) {
        let now = ctx.sched.now();
        let receiver = loop {
            let candidate = ctx.rng.gen_range(0..ctx.params.participants);
            if candidate != self.id {
                break candidate;
            }
        };
        let amount = ctx.rng.gen_range(1..=5);
        let tx = Arc::new(Transaction::mint(self.id, receiver, amount, now));
        log::trace!("peer {} minted {} at {}", self.id, tx.short_id(), now);

        self.pool.insert(tx.id, tx.clone());
        self.forward_transaction(ctx, &tx);

        if let Some(delay) = sample_interarrival(ctx.params.ttx_mean, ctx.rng) {
            ctx.sched.schedule_in(delay, Event::TxTick { peer: self.id });
        }
    }

    pub fn receive_transaction(&mut self, ctx: &mut Ctx, from: PeerId, tx: Arc<Transaction>) {
        self.tx_routes.entry(from).or_default().insert(tx.id);
        self.pool.insert(tx.id, tx.clone());
        self.forward_transaction(ctx, &tx);
    }

    /// Gossip to every neighbor whose edge has not carried this id yet.
    fn forward_transaction(&mut self, ctx: &mut Ctx, tx: &Arc<Transaction>) {
        for &neighbor in &self.neighbors {
            let seen = self.tx_routes.entry(neighbor).or_default();
            if seen.insert(tx.id) {
                ctx.fabric
                    .send_transaction(ctx.sched, ctx.rng, self.id, neighbor, tx.clone());
            }
        }
    }

    /* ------------------------- mining ------------------------------ */

    /// Start a mining attempt on the current tip (honest) or the hidden tip
    /// (adversary): pick a not-yet-chained transaction sample, seal a
    /// candidate, and suspend for an exponential PoW delay.
    pub fn start_mining(&mut self, ctx: &mut Ctx) {
        let parent = match &self.role {
            Role::Honest => self.tree.tip().clone(),
            Role::Adversary(adv) => adv.hidden_tip.clone(),
        };
        if self.pending_mine == Some(parent.id) {
            // an attempt on this exact tip is already suspended
            return;
        }

        let chained = self.tree.chain_tx_ids(&parent.id);
        let mut spendable: Vec<Arc<Transaction>> = self
            .pool
            .values()
            .filter(|tx| !chained.contains(&tx.id))
            .cloned()
            .collect();
        spendable.sort_by(|a, b| a.id.cmp(&b.id));

        let cap = spendable.len().min(999);
        let m = ctx.rng.gen_range(0..=cap);
        let (sample, _) = spendable.partial_shuffle(ctx.rng, m);
        let chosen = sample.to_vec();

        match Block::seal(&parent, ctx.sched.now(), chosen, self.id) {
            Ok(candidate) => {
                let rate = self.hashing_power / ctx.params.block_interval;
                let wait = Exp::new(rate)
                    .expect("hashing power and block interval are validated positive")
                    .sample(ctx.rng);
                self.pending_mine = Some(parent.id);
                ctx.sched.schedule_in(
                    wait,
                    Event::MineDone {
                        miner: self.id,
                        candidate: Arc::new(candidate),
                    },
                );
            }
            Err(fault) => {
                // the sampled set cannot extend this chain; retry with a
                // fresh draw at the same instant
                log::debug!("peer {} discarded unsealable candidate: {fault}", self.id);
                ctx.sched.schedule_now(Event::MineStart { peer: self.id });
            }
        }
    }

    /// PoW suspension expired.
    pub fn mine_done(&mut self, ctx: &mut Ctx, candidate: Arc<Block>) {
        if self.pending_mine == candidate.parent {
            self.pending_mine = None;
        }
        if self.is_adversary() {
            self.adversary_mine_done(ctx, candidate);
            return;
        }

        if candidate.parent != Some(self.tree.tip_id()) {
            // the tip moved while we were "hashing": race lost
            log::trace!("peer {} lost a mining race", self.id);
            return;
        }
        let now = ctx.sched.now();
        self.tree.insert(candidate.clone(), now);
        self.minted += 1;
        self.tree.set_tip(candidate.id);
        self.balance = candidate.balances.get(self.id);
        log::debug!(
            "peer {} mined block {} at height {}",
            self.id,
            candidate.short_id(),
            candidate.height
        );
        self.forward_block(ctx, &candidate);
        self.start_mining(ctx);
    }

    /* ------------------- block reception --------------------------- */

    pub fn receive_block(&mut self, ctx: &mut Ctx, from: PeerId, block: Arc<Block>) {
        if self.tree.contains(&block.id) {
            // duplicate: remember the edge saw it, nothing else changes
            self.block_routes.entry(from).or_default().insert(block.id);
            return;
        }
        let parent = match block.parent.and_then(|p| self.tree.get(&p)) {
            Some(node) => node.block.clone(),
            None => return, // unknown parent, drop silently
        };
        if !block.verify_against(&parent) {
            return;
        }
        self.block_routes.entry(from).or_default().insert(block.id);
        self.tree.insert(block.clone(), ctx.sched.now());

        if self.is_adversary() {
            self.adversary_receive_block(ctx, block);
            return;
        }

        let adopted = self.tree.improves_tip(&block);
        if adopted {
            self.tree.set_tip(block.id);
            self.balance = block.balances.get(self.id);
        }
        self.forward_block(ctx, &block);
        if adopted {
            self.start_mining(ctx);
        }
    }

    /// Gossip a block to every neighbor whose edge has not carried it yet.
    pub(crate) fn forward_block(&mut self, ctx: &mut Ctx, block: &Arc<Block>) {
        for &neighbor in &self.neighbors {
            let seen = self.block_routes.entry(neighbor).or_default();
            if seen.insert(block.id) {
                ctx.fabric
                    .send_block(ctx.sched, ctx.rng, self.id, neighbor, block.clone());
            }
        }
    }

    /* ------------------- role plumbing ----------------------------- */

    pub fn adversary(&self) -> Option<&AdversaryState> {
        match &self.role {
            Role::Adversary(adv) => Some(adv),
            Role::Honest => None,
        }
    }

    pub(crate) fn adversary_mut(&mut self) -> Option<&mut AdversaryState> {
        match &mut self.role {
            Role::Adversary(adv) => Some(adv),
            Role::Honest => None,
        }
    }
}

/// Exponential interarrival sample, or `None` when generation is disabled
/// (`Ttx = ∞`).
pub fn sample_interarrival(mean: f64, rng: &mut SmallRng) -> Option<f64> {
    if !mean.is_finite() {
        return None;
    }
    Some(
        Exp::new(1.0 / mean)
            .expect("interarrival mean is validated positive")
            .sample(rng),
    )
}
