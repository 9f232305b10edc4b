// src/network.rs
//
// Network fabric for the simulated P2P overlay.
// --------------------------------------------------------------
// • per-pair propagation delay, drawn once, symmetric (10–500 ms)
// • link bandwidth from endpoint speed classes (100 Mbps fast-fast, else 5)
// • fresh exponential queueing sample per send, mean 96/c ms
// • random 4–8-neighbor topology with a DFS connectivity check and a
//   deterministic ring-of-radius-2 repair
//

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::block::Block;
use crate::peer::LinkSpeed;
use crate::sched::{Event, Scheduler};
use crate::transaction::{PeerId, Transaction, TX_KBITS};

const FAST_LINK_MBPS: f64 = 100.0;
const SLOW_LINK_MBPS: f64 = 5.0;
/// Queueing delay mean is 96/c ms, i.e. an exponential with rate c/96.
const QUEUE_MEAN_FACTOR: f64 = 96.0;
const MS_PER_SEC: f64 = 1000.0;

/// Latency matrices over every participant pair, honest peers and adversary
/// alike. Message transit re-enters the destination peer's receive path via
/// a delivery event on the scheduler.
pub struct NetworkFabric {
    prop_ms: Vec<Vec<f64>>,
    bandwidth_mbps: Vec<Vec<f64>>,
}

impl NetworkFabric {
    /// Draw the per-pair matrices for the given speed classification.
    pub fn new(speeds: &[LinkSpeed], rng: &mut SmallRng) -> Self {
        let n = speeds.len();
        let mut prop_ms = vec![vec![0.0; n]; n];
        let mut bandwidth_mbps = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let rho = rng.gen_range(10..=500) as f64;
                prop_ms[i][j] = rho;
                prop_ms[j][i] = rho;

                let c = if speeds[i] == LinkSpeed::Fast && speeds[j] == LinkSpeed::Fast {
                    FAST_LINK_MBPS
                } else {
                    SLOW_LINK_MBPS
                };
                bandwidth_mbps[i][j] = c;
                bandwidth_mbps[j][i] = c;
            }
        }
        Self {
            prop_ms,
            bandwidth_mbps,
        }
    }

    pub fn participants(&self) -> usize {
        self.prop_ms.len()
    }

    pub fn propagation_ms(&self, from: PeerId, to: PeerId) -> f64 {
        self.prop_ms[from][to]
    }

    pub fn bandwidth_mbps(&self, from: PeerId, to: PeerId) -> f64 {
        self.bandwidth_mbps[from][to]
    }

    /// One-way latency in virtual seconds for a message of `size_kbits`.
    /// 1 Mbps carries 1 Kb per ms, so transmission time is size/c ms.
    fn latency_secs(&self, from: PeerId, to: PeerId, size_kbits: f64, rng: &mut SmallRng) -> f64 {
        let c = self.bandwidth_mbps[from][to];
        let queueing = Exp::new(c / QUEUE_MEAN_FACTOR)
            .expect("link bandwidth is positive")
            .sample(rng);
        (self.prop_ms[from][to] + size_kbits / c + queueing) / MS_PER_SEC
    }

    /// Put a transaction on the wire; the receiver's handler runs after the
    /// sampled latency.
    pub fn send_transaction(
        &self,
        sched: &mut Scheduler,
        rng: &mut SmallRng,
        from: PeerId,
        to: PeerId,
        tx: Arc<Transaction>,
    ) {
        let latency = self.latency_secs(from, to, TX_KBITS, rng);
        sched.schedule_in(latency, Event::TxDeliver { from, to, tx });
    }

    /// Put a block on the wire; latency scales with the block's size.
    pub fn send_block(
        &self,
        sched: &mut Scheduler,
        rng: &mut SmallRng,
        from: PeerId,
        to: PeerId,
        block: Arc<Block>,
    ) {
        let latency = self.latency_secs(from, to, block.size_kbits(), rng);
        sched.schedule_in(latency, Event::BlockDeliver { from, to, block });
    }
}

/// Random bidirectional overlay for the honest peers: each draws 4–8 distinct
/// non-self neighbors. If the result is not connected, every peer is rewired
/// into the deterministic ring-of-radius-2.
pub fn build_honest_topology(n: usize, rng: &mut SmallRng) -> Vec<Vec<PeerId>> {
    let mut adjacency: Vec<BTreeSet<PeerId>> = vec![BTreeSet::new(); n];
    for peer in 0..n {
        let k = rng.gen_range(4..=8).min(n.saturating_sub(1));
        let candidates: Vec<PeerId> = (0..n).filter(|other| *other != peer).collect();
        for neighbor in candidates.choose_multiple(rng, k) {
            adjacency[peer].insert(*neighbor);
            adjacency[*neighbor].insert(peer);
        }
    }

    if !is_connected(&adjacency) {
        log::warn!("random topology disconnected; rewiring as ring of radius 2");
        adjacency = ring_of_radius_two(n);
    }

    adjacency
        .into_iter()
        .map(|set| set.into_iter().collect())
        .collect()
}

/// Link the adversary to ⌊pct·n/100⌋ uniformly chosen honest peers and
/// return its own neighbor list.
pub fn attach_adversary(
    honest: &mut [Vec<PeerId>],
    adversary: PeerId,
    pct: f64,
    rng: &mut SmallRng,
) -> Vec<PeerId> {
    let n = honest.len();
    let count = ((pct * n as f64) / 100.0).floor() as usize;
    let ids: Vec<PeerId> = (0..n).collect();
    let mut chosen: Vec<PeerId> = ids.choose_multiple(rng, count.min(n)).copied().collect();
    chosen.sort_unstable();
    for peer in &chosen {
        honest[*peer].push(adversary);
    }
    log::debug!("adversary {adversary} attached to {} honest peers", chosen.len());
    chosen
}

/// DFS reachability from peer 0 over the honest overlay.
fn is_connected(adjacency: &[BTreeSet<PeerId>]) -> bool {
    let n = adjacency.len();
    if n == 0 {
        return true;
    }
    let mut visited = vec![false; n];
    let mut stack = vec![0];
    visited[0] = true;
    let mut reached = 1;
    while let Some(peer) = stack.pop() {
        for neighbor in &adjacency[peer] {
            if !visited[*neighbor] {
                visited[*neighbor] = true;
                reached += 1;
                stack.push(*neighbor);
            }
        }
    }
    reached == n
}

/// Neighbors at offsets ±1 and ±2 modulo the population.
fn ring_of_radius_two(n: usize) -> Vec<BTreeSet<PeerId>> {
    let mut adjacency: Vec<BTreeSet<PeerId>> = vec![BTreeSet::new(); n];
    for peer in 0..n {
        for offset in [n - 1, n - 2, 1, 2] {
            let neighbor = (peer + offset) % n;
            if neighbor != peer {
                adjacency[peer].insert(neighbor);
                adjacency[neighbor].insert(peer);
            }
        }
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn speeds(n: usize) -> Vec<LinkSpeed> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    LinkSpeed::Fast
                } else {
                    LinkSpeed::Slow
                }
            })
            .collect()
    }

    #[test]
    fn matrices_are_symmetric_with_zero_diagonal() {
        let mut rng = SmallRng::seed_from_u64(7);
        let fabric = NetworkFabric::new(&speeds(6), &mut rng);
        for i in 0..6 {
            assert_eq!(fabric.propagation_ms(i, i), 0.0);
            for j in 0..6 {
                assert_eq!(fabric.propagation_ms(i, j), fabric.propagation_ms(j, i));
                assert_eq!(fabric.bandwidth_mbps(i, j), fabric.bandwidth_mbps(j, i));
                if i != j {
                    assert!((10.0..=500.0).contains(&fabric.propagation_ms(i, j)));
                }
            }
        }
    }

    #[test]
    fn bandwidth_follows_speed_classes() {
        let mut rng = SmallRng::seed_from_u64(7);
        let fabric = NetworkFabric::new(
            &[LinkSpeed::Fast, LinkSpeed::Fast, LinkSpeed::Slow],
            &mut rng,
        );
        assert_eq!(fabric.bandwidth_mbps(0, 1), FAST_LINK_MBPS);
        assert_eq!(fabric.bandwidth_mbps(0, 2), SLOW_LINK_MBPS);
        assert_eq!(fabric.bandwidth_mbps(1, 2), SLOW_LINK_MBPS);
    }

    #[test]
    fn latency_exceeds_propagation_floor() {
        let mut rng = SmallRng::seed_from_u64(11);
        let fabric = NetworkFabric::new(&speeds(4), &mut rng);
        for _ in 0..50 {
            let latency = fabric.latency_secs(0, 1, TX_KBITS, &mut rng);
            let floor =
                (fabric.propagation_ms(0, 1) + TX_KBITS / fabric.bandwidth_mbps(0, 1)) / 1000.0;
            assert!(latency >= floor);
        }
    }

    #[test]
    fn send_schedules_a_delivery() {
        let mut rng = SmallRng::seed_from_u64(3);
        let fabric = NetworkFabric::new(&speeds(3), &mut rng);
        let mut sched = Scheduler::new();
        let tx = Arc::new(Transaction::mint(0, 1, 2, crate::sched::SimTime::ZERO));
        fabric.send_transaction(&mut sched, &mut rng, 0, 1, tx);
        assert_eq!(sched.len(), 1);
        match sched.pop_due(crate::sched::SimTime::from_secs(1e9)) {
            Some(Event::TxDeliver { from, to, .. }) => {
                assert_eq!((from, to), (0, 1));
                assert!(sched.now() > crate::sched::SimTime::ZERO);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn topology_is_bidirectional_and_connected() {
        for seed in 0..10 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let topology = build_honest_topology(12, &mut rng);
            for (peer, neighbors) in topology.iter().enumerate() {
                assert!(neighbors.len() >= 4 || topology.len() <= 5);
                for neighbor in neighbors {
                    assert_ne!(*neighbor, peer);
                    assert!(topology[*neighbor].contains(&peer));
                }
            }
            let sets: Vec<BTreeSet<PeerId>> = topology
                .iter()
                .map(|v| v.iter().copied().collect())
                .collect();
            assert!(is_connected(&sets));
        }
    }

    #[test]
    fn ring_repair_layout() {
        let ring = ring_of_radius_two(6);
        for peer in 0..6 {
            let expected: BTreeSet<PeerId> = [
                (peer + 1) % 6,
                (peer + 2) % 6,
                (peer + 5) % 6,
                (peer + 4) % 6,
            ]
            .into_iter()
            .collect();
            assert_eq!(ring[peer], expected);
        }
        assert!(is_connected(&ring));
    }

    #[test]
    fn split_cliques_are_detected_and_repaired_shape_holds() {
        // two disjoint triangles: DFS from peer 0 must not reach the second,
        // and the documented repair is the radius-2 ring over all six peers
        let mut split: Vec<BTreeSet<PeerId>> = vec![BTreeSet::new(); 6];
        for clique in [[0usize, 1, 2], [3, 4, 5]] {
            for a in clique {
                for b in clique {
                    if a != b {
                        split[a].insert(b);
                    }
                }
            }
        }
        assert!(!is_connected(&split));

        let repaired = ring_of_radius_two(split.len());
        assert!(is_connected(&repaired));
        for peer in 0..6 {
            assert_eq!(repaired[peer].len(), 4);
        }
    }

    #[test]
    fn adversary_attachment_count() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut honest = build_honest_topology(10, &mut rng);
        let links = attach_adversary(&mut honest, 10, 50.0, &mut rng);
        assert_eq!(links.len(), 5);
        for peer in &links {
            assert!(honest[*peer].contains(&10));
        }
    }
}
