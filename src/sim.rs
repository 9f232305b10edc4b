// src/sim.rs
//
// Simulation driver: builds the population and fabric, seeds the initial
// processes, and drains the event queue to the configured horizon.
//

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::adversary::AdversaryState;
use crate::block::Block;
use crate::config::SimConfig;
use crate::network::{attach_adversary, build_honest_topology, NetworkFabric};
use crate::peer::{sample_interarrival, CpuClass, Ctx, LinkSpeed, Peer, Role, SimParams};
use crate::sched::{Event, Scheduler, SimTime};
use crate::transaction::PeerId;
use crate::Result;

/// Probability that an honest peer is seeded with an initial mining process.
const INITIAL_MINER_PROB: f64 = 0.25;

pub struct Simulation {
    pub cfg: SimConfig,
    /// The seed actually used, whether configured or drawn from entropy.
    pub seed: u64,
    pub peers: Vec<Peer>,
    pub genesis: Arc<Block>,
    params: SimParams,
    sched: Scheduler,
    fabric: NetworkFabric,
    rng: SmallRng,
}

impl Simulation {
    /// Validate the configuration and assemble the world: classification,
    /// hashing-power normalization, topology, fabric, genesis and the
    /// initial generation/mining processes.
    pub fn new(cfg: SimConfig) -> Result<Self> {
        cfg.validate()?;

        let seed = cfg.seed.unwrap_or_else(|| rand::random());
        let mut rng = SmallRng::seed_from_u64(seed);
        log::info!("simulation seed: {seed}");

        let honest = cfg.honest_population();
        let participants = cfg.participants();

        // classification: a random subset is slow, another low-CPU
        let ids: Vec<PeerId> = (0..honest).collect();
        let num_slow = (honest as f64 * cfg.slow_fraction) as usize;
        let num_low = (honest as f64 * cfg.low_cpu_fraction) as usize;
        let slow: Vec<PeerId> = ids.choose_multiple(&mut rng, num_slow).copied().collect();
        let low: Vec<PeerId> = ids.choose_multiple(&mut rng, num_low).copied().collect();

        let speeds: Vec<LinkSpeed> = (0..participants)
            .map(|id| {
                if id < honest && slow.contains(&id) {
                    LinkSpeed::Slow
                } else {
                    LinkSpeed::Fast // the adversary is always fast
                }
            })
            .collect();
        let cpus: Vec<CpuClass> = (0..participants)
            .map(|id| {
                if id < honest && low.contains(&id) {
                    CpuClass::Low
                } else {
                    CpuClass::High
                }
            })
            .collect();

        // a high-CPU peer holds ten low-CPU shares; honest shares are scaled
        // so the adversary's h stays a true fraction of global power
        let denom = (10 * honest - 9 * num_low) as f64;
        let honest_scale = cfg
            .adversary
            .map(|adv| 1.0 - adv.hashing_share)
            .unwrap_or(1.0);
        let power = |id: PeerId| -> f64 {
            match cpus[id] {
                CpuClass::Low => honest_scale / denom,
                CpuClass::High => honest_scale * 10.0 / denom,
            }
        };

        // topology over the honest peers, then the adversary attachment
        let mut neighbors = build_honest_topology(honest, &mut rng);
        if let Some(adv) = &cfg.adversary {
            let adversary_id = honest;
            let links = attach_adversary(
                &mut neighbors,
                adversary_id,
                adv.connectivity_pct,
                &mut rng,
            );
            neighbors.push(links);
        }

        let fabric = NetworkFabric::new(&speeds, &mut rng);
        let genesis = Arc::new(Block::genesis(participants));

        let mut peers: Vec<Peer> = (0..honest)
            .map(|id| {
                Peer::new(
                    id,
                    speeds[id],
                    cpus[id],
                    power(id),
                    neighbors[id].clone(),
                    genesis.clone(),
                    cfg.tie_break,
                    Role::Honest,
                )
            })
            .collect();
        if let Some(adv) = &cfg.adversary {
            let adversary_id = honest;
            peers.push(Peer::new(
                adversary_id,
                LinkSpeed::Fast,
                CpuClass::High,
                adv.hashing_share,
                neighbors[adversary_id].clone(),
                genesis.clone(),
                cfg.tie_break,
                Role::Adversary(AdversaryState::new(adv.mode, genesis.clone())),
            ));
        }

        let params = SimParams {
            participants,
            ttx_mean: cfg.tx_interarrival,
            block_interval: cfg.block_interval,
        };

        // seed the initial processes: every participant generates traffic,
        // a quarter of the honest peers start mining, the adversary always
        let mut sched = Scheduler::new();
        for peer in &peers {
            if let Some(delay) = sample_interarrival(params.ttx_mean, &mut rng) {
                sched.schedule_in(delay, Event::TxTick { peer: peer.id });
            }
            let mines = peer.is_adversary() || rng.gen_bool(INITIAL_MINER_PROB);
            if mines {
                sched.schedule_now(Event::MineStart { peer: peer.id });
            }
        }

        Ok(Self {
            cfg,
            seed,
            peers,
            genesis,
            params,
            sched,
            fabric,
            rng,
        })
    }

    /// Drain the queue until the configured horizon.
    pub fn run(&mut self) {
        let horizon = SimTime::from_secs(self.cfg.duration);
        let mut dispatched: u64 = 0;
        while let Some(event) = self.sched.pop_due(horizon) {
            dispatch_event(
                &mut self.peers,
                &mut self.sched,
                &self.fabric,
                &mut self.rng,
                &self.params,
                event,
            );
            dispatched += 1;
        }
        log::info!(
            "run complete: {dispatched} events dispatched, clock at {}",
            self.sched.now()
        );
    }

    pub fn now(&self) -> SimTime {
        self.sched.now()
    }

    pub fn honest_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| !p.is_adversary())
    }

    /// Global mining-power utilization: the reference main-chain height over
    /// all blocks generated by honest peers.
    pub fn mpu(&self) -> f64 {
        let total_honest: u64 = self.honest_peers().map(|p| p.minted).sum();
        if total_honest == 0 {
            return 0.0;
        }
        let reference_height = self.peers[0].tree.tip().height;
        reference_height as f64 / total_honest as f64
    }
}

/// Route one event to its handler. Free-standing so tests can drive
/// hand-built worlds through the same code path as `Simulation::run`.
pub(crate) fn dispatch_event(
    peers: &mut [Peer],
    sched: &mut Scheduler,
    fabric: &NetworkFabric,
    rng: &mut SmallRng,
    params: &SimParams,
    event: Event,
) {
    let mut ctx = Ctx {
        sched,
        fabric,
        rng,
        params,
    };
    match event {
        Event::TxTick { peer } => peers[peer].generate_transaction(&mut ctx),
        Event::TxDeliver { from, to, tx } => peers[to].receive_transaction(&mut ctx, from, tx),
        Event::MineStart { peer } => peers[peer].start_mining(&mut ctx),
        Event::MineDone { miner, candidate } => peers[miner].mine_done(&mut ctx, candidate),
        Event::BlockDeliver { from, to, block } => {
            peers[to].receive_block(&mut ctx, from, block)
        }
    }
}
