use std::path::PathBuf;

use clap::Parser;
use coinsim::config::{AdversaryConfig, AdversaryMode, SimConfig};
use coinsim::{report, Result, Simulation};

/// Discrete-event simulator of a P2P proof-of-work network: honest chain
/// growth under network heterogeneity, with optional selfish- or
/// stubborn-mining adversaries.
#[derive(Parser)]
#[command(name = "coinsim")]
#[command(about = "Discrete-event P2P proof-of-work network simulator")]
#[command(version)]
struct Cli {
    /// Total participant count (the adversary takes one slot)
    #[arg(long)]
    n: Option<usize>,

    /// Fraction of honest peers with slow links
    #[arg(long)]
    z0: Option<f64>,

    /// Fraction of honest peers with low CPU
    #[arg(long)]
    z1: Option<f64>,

    /// Mean transaction interarrival in virtual seconds ("inf" disables)
    #[arg(long)]
    ttx: Option<f64>,

    /// Target mean block interval in virtual seconds
    #[arg(long = "block-interval", visible_alias = "i")]
    block_interval: Option<f64>,

    /// Simulation horizon in virtual seconds
    #[arg(long)]
    time: Option<f64>,

    /// Enable the adversary in the given mode
    #[arg(long, value_enum)]
    adversary: Option<AdversaryMode>,

    /// Adversary hashing share (fraction of global power)
    #[arg(long = "adv-power")]
    adv_power: Option<f64>,

    /// Percentage of honest peers linked to the adversary
    #[arg(long = "adv-conn")]
    adv_conn: Option<f64>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Directory receiving the artifact tree
    #[arg(long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// TOML configuration file; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Defaults, then the config file, then explicit flags.
    fn build_config(&self) -> Result<SimConfig> {
        let mut cfg = match &self.config {
            Some(path) => SimConfig::load_from_file(path)?,
            None => SimConfig::default(),
        };
        if let Some(n) = self.n {
            cfg.population = n;
        }
        if let Some(z0) = self.z0 {
            cfg.slow_fraction = z0;
        }
        if let Some(z1) = self.z1 {
            cfg.low_cpu_fraction = z1;
        }
        if let Some(ttx) = self.ttx {
            cfg.tx_interarrival = ttx;
        }
        if let Some(interval) = self.block_interval {
            cfg.block_interval = interval;
        }
        if let Some(time) = self.time {
            cfg.duration = time;
        }
        if let Some(seed) = self.seed {
            cfg.seed = Some(seed);
        }
        if let Some(mode) = self.adversary {
            let mut adv = cfg.adversary.unwrap_or(AdversaryConfig {
                mode,
                hashing_share: 0.3,
                connectivity_pct: 50.0,
            });
            adv.mode = mode;
            cfg.adversary = Some(adv);
        }
        if let Some(share) = self.adv_power {
            match cfg.adversary.as_mut() {
                Some(adv) => adv.hashing_share = share,
                None => {
                    return Err(coinsim::SimError::InvalidParameter(
                        "--adv-power requires --adversary".into(),
                    ))
                }
            }
        }
        if let Some(pct) = self.adv_conn {
            match cfg.adversary.as_mut() {
                Some(adv) => adv.connectivity_pct = pct,
                None => {
                    return Err(coinsim::SimError::InvalidParameter(
                        "--adv-conn requires --adversary".into(),
                    ))
                }
            }
        }
        Ok(cfg)
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.build_config()?;

    let mut sim = Simulation::new(cfg)?;
    sim.run();
    report::write_artifacts(&sim, &cli.out_dir)?;

    let reference = &sim.peers[0];
    println!(
        "simulated {} participants to t={}: reference chain height {}, MPU {:.4}",
        sim.peers.len(),
        sim.now(),
        reference.tree.tip().height,
        sim.mpu()
    );
    if let Some(state) = sim.peers.iter().find_map(|p| p.adversary()) {
        println!(
            "adversary ({}) finished with lead {} and {} unreleased blocks",
            state.mode.as_str(),
            state.lead,
            state.private_chain.len()
        );
    }
    Ok(())
}
