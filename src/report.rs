// src/report.rs
//
// Run artifacts: one DOT tree and one plain-text tree dump per participant,
// the aggregate MPU figure, and a machine-readable summary of the run.
// Existing artifact directories for the same parameters are deleted and
// recreated.
//

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::block::BlockId;
use crate::config::SimConfig;
use crate::peer::Peer;
use crate::sim::Simulation;
use crate::Result;

/// Write every artifact for a finished run under `out_dir`.
pub fn write_artifacts(sim: &Simulation, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;
    let tag = run_tag(&sim.cfg);
    let plots = out_dir.join(format!("plots_{tag}"));
    let trees = out_dir.join(format!("trees_{tag}"));
    recreate_dir(&plots)?;
    recreate_dir(&trees)?;

    for peer in &sim.peers {
        let tip_height = peer.tree.tip().height;
        write_dot(peer, &plots.join(format!("tree_{}_{}.dot", peer.id, tip_height)))?;
        write_tree_dump(peer, &trees.join(format!("tree_{}_{}.tree", peer.id, tip_height)))?;
    }

    write_mpu(sim, &out_dir.join("MPU.txt"))?;
    write_summary(sim, &out_dir.join("summary.json"))?;
    log::info!("artifacts written under {}", out_dir.display());
    Ok(())
}

/// Parameter tag shared by the artifact directories, matching the run
/// drivers: honest runs carry both heterogeneity fractions, adversary runs
/// carry the adversary parameters and mode instead.
pub fn run_tag(cfg: &SimConfig) -> String {
    match &cfg.adversary {
        None => format!(
            "{}_{}_{}_{}_{}_{}",
            cfg.population,
            cfg.slow_fraction,
            cfg.low_cpu_fraction,
            cfg.tx_interarrival,
            cfg.block_interval,
            cfg.duration
        ),
        Some(adv) => format!(
            "{}_{}_{}_{}_{}_{}_{}_{}",
            cfg.population,
            cfg.low_cpu_fraction,
            cfg.tx_interarrival,
            cfg.block_interval,
            cfg.duration,
            adv.hashing_share,
            adv.connectivity_pct,
            adv.mode.as_str()
        ),
    }
}

fn recreate_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Graphviz rendering of a peer's local tree: node labels carry
/// `block : miner : parent : arrival` plus one line per transaction, edges
/// run parent → child.
fn write_dot(peer: &Peer, path: &Path) -> Result<()> {
    let order = peer.tree.dfs_order();
    let index: HashMap<BlockId, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut out = String::new();
    out.push_str(&format!("digraph tree_{} {{\n", peer.id));
    for id in &order {
        let node = peer.tree.get(id).expect("dfs yields known ids");
        let block = &node.block;
        let mut label = match (block.miner, block.parent) {
            (Some(miner), Some(parent)) => format!(
                "{} : {} : {} : {}",
                block.short_id(),
                miner,
                hex::encode(&parent[..8]),
                node.arrival
            ),
            _ => format!("{} : genesis", block.short_id()),
        };
        for tx in &block.transactions {
            label.push_str("\\n");
            label.push_str(&tx.to_string());
        }
        out.push_str(&format!("    n{} [label=\"{}\"];\n", index[id], label));
    }
    for id in &order {
        let node = peer.tree.get(id).expect("dfs yields known ids");
        for child in &node.children {
            out.push_str(&format!("    n{} -> n{};\n", index[id], index[child]));
        }
    }
    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}

/// Plain-text dump: the peer's mining record and classification followed by
/// a DFS-ordered listing of (block hash, parent hash, arrival time).
fn write_tree_dump(peer: &Peer, path: &Path) -> Result<()> {
    let mut f = fs::File::create(path)?;
    let created = peer.minted;
    let on_chain = peer.blocks_on_main_chain();

    writeln!(f, "Peer ID : {}", peer.id)?;
    writeln!(f, "Number of blocks created : {created}")?;
    writeln!(f, "Number of blocks ending in longest chain : {on_chain}")?;
    writeln!(f, "CPU speed : {}", peer.cpu.as_str())?;
    writeln!(f, "Node speed : {}", peer.speed.as_str())?;
    if created != 0 {
        writeln!(f, "Ratio : {}", on_chain as f64 / created as f64)?;
    } else {
        writeln!(f, "Ratio : Undefined")?;
    }

    for id in peer.tree.dfs_order() {
        let node = peer.tree.get(&id).expect("dfs yields known ids");
        writeln!(f)?;
        writeln!(f, "Block Hash : {}", node.block.id_hex())?;
        if let Some(parent) = node.block.parent {
            writeln!(f, "Parent Hash : {}", hex::encode(parent))?;
        }
        writeln!(f, "Received at : {}", node.arrival)?;
    }
    Ok(())
}

fn write_mpu(sim: &Simulation, path: &Path) -> Result<()> {
    let mut f = fs::File::create(path)?;
    writeln!(f, "Overall MPU : {}", sim.mpu())?;
    Ok(())
}

#[derive(Serialize)]
struct PeerSummary {
    id: usize,
    speed: &'static str,
    cpu: &'static str,
    hashing_power: f64,
    blocks_created: u64,
    blocks_on_main_chain: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ratio: Option<f64>,
    tip_height: u64,
    tree_size: usize,
}

#[derive(Serialize)]
struct AdversarySummary {
    mode: &'static str,
    lead: i64,
    unreleased_private_blocks: usize,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    generated_at: String,
    seed: u64,
    virtual_end: f64,
    mpu: f64,
    config: &'a SimConfig,
    peers: Vec<PeerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    adversary: Option<AdversarySummary>,
}

fn write_summary(sim: &Simulation, path: &Path) -> Result<()> {
    let peers = sim
        .peers
        .iter()
        .map(|peer| PeerSummary {
            id: peer.id,
            speed: peer.speed.as_str(),
            cpu: peer.cpu.as_str(),
            hashing_power: peer.hashing_power,
            blocks_created: peer.minted,
            blocks_on_main_chain: peer.blocks_on_main_chain(),
            ratio: (peer.minted != 0)
                .then(|| peer.blocks_on_main_chain() as f64 / peer.minted as f64),
            tip_height: peer.tree.tip().height,
            tree_size: peer.tree.len(),
        })
        .collect();

    let adversary = sim.peers.iter().find_map(|peer| {
        peer.adversary().map(|state| AdversarySummary {
            mode: state.mode.as_str(),
            lead: state.lead,
            unreleased_private_blocks: state.private_chain.len(),
        })
    });

    let summary = RunSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        seed: sim.seed,
        virtual_end: sim.now().as_secs(),
        mpu: sim.mpu(),
        config: &sim.cfg,
        peers,
        adversary,
    };
    let text = serde_json::to_string_pretty(&summary)?;
    fs::write(path, text)?;
    Ok(())
}

/// Absolute artifact paths for a config, for callers that want to report
/// where things landed.
pub fn artifact_dirs(cfg: &SimConfig, out_dir: &Path) -> (PathBuf, PathBuf) {
    let tag = run_tag(cfg);
    (
        out_dir.join(format!("plots_{tag}")),
        out_dir.join(format!("trees_{tag}")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdversaryConfig, AdversaryMode};

    fn small_run(adversary: Option<AdversaryConfig>) -> Simulation {
        let cfg = SimConfig {
            population: 6,
            tx_interarrival: 5.0,
            block_interval: 2.0,
            duration: 30.0,
            seed: Some(77),
            adversary,
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        sim.run();
        sim
    }

    #[test]
    fn honest_tag_lists_both_fractions() {
        let cfg = SimConfig {
            population: 6,
            duration: 30.0,
            ..SimConfig::default()
        };
        assert_eq!(run_tag(&cfg), "6_0.5_0.5_0.5_0.5_30");
    }

    #[test]
    fn adversary_tag_carries_mode_suffix() {
        let cfg = SimConfig {
            population: 6,
            duration: 30.0,
            adversary: Some(AdversaryConfig {
                mode: AdversaryMode::Stubborn,
                hashing_share: 0.25,
                connectivity_pct: 50.0,
            }),
            ..SimConfig::default()
        };
        assert!(run_tag(&cfg).ends_with("_stubborn"));
        assert!(run_tag(&cfg).contains("_0.25_50_"));
    }

    #[test]
    fn artifacts_land_on_disk() {
        let sim = small_run(None);
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(&sim, dir.path()).unwrap();

        let (plots, trees) = artifact_dirs(&sim.cfg, dir.path());
        assert_eq!(fs::read_dir(&plots).unwrap().count(), 6);
        assert_eq!(fs::read_dir(&trees).unwrap().count(), 6);

        let mpu = fs::read_to_string(dir.path().join("MPU.txt")).unwrap();
        assert!(mpu.starts_with("Overall MPU : "));

        let summary = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed["peers"].as_array().unwrap().len(), 6);
        assert_eq!(parsed["seed"], 77);
    }

    #[test]
    fn rerun_replaces_existing_directories() {
        let sim = small_run(None);
        let dir = tempfile::tempdir().unwrap();
        let (plots, _) = artifact_dirs(&sim.cfg, dir.path());
        fs::create_dir_all(&plots).unwrap();
        fs::write(plots.join("stale.dot"), "leftover").unwrap();

        write_artifacts(&sim, dir.path()).unwrap();
        assert!(!plots.join("stale.dot").exists());
    }

    #[test]
    fn dot_output_is_wellformed() {
        let sim = small_run(None);
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(&sim, dir.path()).unwrap();
        let (plots, _) = artifact_dirs(&sim.cfg, dir.path());
        let entry = fs::read_dir(&plots).unwrap().next().unwrap().unwrap();
        let dot = fs::read_to_string(entry.path()).unwrap();
        assert!(dot.starts_with("digraph tree_"));
        assert!(dot.contains("genesis"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn adversary_summary_is_reported() {
        let sim = small_run(Some(AdversaryConfig {
            mode: AdversaryMode::Selfish,
            hashing_share: 0.3,
            connectivity_pct: 100.0,
        }));
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(&sim, dir.path()).unwrap();
        let summary = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed["adversary"]["mode"], "selfish");
        // six participants total: five honest trees plus the adversary's
        assert_eq!(parsed["peers"].as_array().unwrap().len(), 6);
    }
}
