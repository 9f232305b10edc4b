// src/adversary.rs
//
// Selfish- and stubborn-mining release policies. The adversary shares
// gossip, validation and tree maintenance with honest peers (peer.rs); it
// differs only in what it broadcasts and when. `lead = -1` encodes the 0'
// state from the selfish-mining literature: public length has caught up
// with the private branch.
//

use std::collections::VecDeque;
use std::sync::Arc;

use crate::block::Block;
use crate::config::AdversaryMode;
use crate::peer::{Ctx, Peer};

#[derive(Debug)]
pub struct AdversaryState {
    pub mode: AdversaryMode,
    /// Private-chain height minus public-tip height; -1 is the 0' state.
    pub lead: i64,
    /// Unreleased private blocks, oldest first.
    pub private_chain: VecDeque<Arc<Block>>,
    /// The adversary mines on this, never on the public tip.
    pub hidden_tip: Arc<Block>,
}

impl AdversaryState {
    pub fn new(mode: AdversaryMode, genesis: Arc<Block>) -> Self {
        Self {
            mode,
            lead: 0,
            private_chain: VecDeque::new(),
            hidden_tip: genesis,
        }
    }
}

impl Peer {
    /// A private PoW suspension expired. The candidate still parents the
    /// hidden tip or it is discarded, mirroring the honest race check.
    pub(crate) fn adversary_mine_done(&mut self, ctx: &mut Ctx, candidate: Arc<Block>) {
        let (mode, lead) = {
            let adv = match self.adversary_mut() {
                Some(adv) => adv,
                None => return,
            };
            if candidate.parent != Some(adv.hidden_tip.id) {
                log::trace!("adversary discarded a stale private candidate");
                return;
            }
            (adv.mode, adv.lead)
        };

        let now = ctx.sched.now();
        self.tree.insert(candidate.clone(), now);
        self.minted += 1;

        if mode == AdversaryMode::Selfish && lead == -1 {
            // the race for the forked height is over: publish immediately
            // and start a fresh private branch on top
            {
                let adv = self.adversary_mut().unwrap();
                adv.lead = 0;
                adv.private_chain.clear();
                adv.hidden_tip = candidate.clone();
            }
            self.tree.set_tip(candidate.id);
            self.balance = candidate.balances.get(self.id);
            log::debug!(
                "adversary published {} from 0' at height {}",
                candidate.short_id(),
                candidate.height
            );
            self.forward_block(ctx, &candidate);
        } else {
            let adv = self.adversary_mut().unwrap();
            adv.private_chain.push_back(candidate.clone());
            adv.hidden_tip = candidate.clone();
            adv.lead = if adv.lead == -1 { 1 } else { adv.lead + 1 };
            log::debug!(
                "adversary withheld {} (lead now {})",
                candidate.short_id(),
                adv.lead
            );
        }

        self.start_mining(ctx);
    }

    /// A public block was linked into the adversary's tree. The state
    /// machine fires only when it takes the public-view tip (strictly
    /// higher, or an equal-height tie-break win). Received blocks are never
    /// re-forwarded: the adversary suppresses honest propagation through
    /// itself.
    pub(crate) fn adversary_receive_block(&mut self, ctx: &mut Ctx, block: Arc<Block>) {
        if !self.tree.improves_tip(&block) {
            return;
        }
        self.tree.set_tip(block.id);
        self.balance = block.balances.get(self.id);

        let (mode, lead) = {
            let adv = self.adversary().expect("adversary role");
            (adv.mode, adv.lead)
        };

        match (mode, lead) {
            (_, 1) => {
                // both policies answer the catch-up block with their single
                // withheld block and enter 0'
                let released = {
                    let adv = self.adversary_mut().unwrap();
                    let released = adv.private_chain.pop_front();
                    adv.private_chain.clear();
                    adv.lead = -1;
                    released
                };
                if let Some(block) = released {
                    self.forward_block(ctx, &block);
                }
            }
            (AdversaryMode::Selfish, 2) => {
                // dump the whole private chain and take the public tip
                let (released, hidden) = {
                    let adv = self.adversary_mut().unwrap();
                    let released: Vec<Arc<Block>> = adv.private_chain.drain(..).collect();
                    adv.lead = 0;
                    (released, adv.hidden_tip.clone())
                };
                log::debug!("adversary dumped {} private blocks", released.len());
                for block in &released {
                    self.forward_block(ctx, block);
                }
                self.tree.set_tip(hidden.id);
                self.balance = hidden.balances.get(self.id);
            }
            (AdversaryMode::Selfish, lead) if lead > 2 => {
                let released = {
                    let adv = self.adversary_mut().unwrap();
                    adv.lead -= 1;
                    adv.private_chain.pop_front()
                };
                if let Some(block) = released {
                    self.forward_block(ctx, &block);
                }
            }
            (AdversaryMode::Stubborn, lead) if lead >= 2 => {
                // never dumps: one block per received public block
                let released = {
                    let adv = self.adversary_mut().unwrap();
                    adv.lead -= 1;
                    adv.private_chain.pop_front()
                };
                if let Some(block) = released {
                    self.forward_block(ctx, &block);
                }
            }
            (_, 0) => {
                // nothing withheld worth defending: mine on the public tip
                let public = self.tree.tip().clone();
                let adv = self.adversary_mut().unwrap();
                adv.private_chain.clear();
                adv.hidden_tip = public;
            }
            (_, -1) => {
                // the 0' race was lost to the public chain
                let public = self.tree.tip().clone();
                let adv = self.adversary_mut().unwrap();
                adv.lead = 0;
                adv.private_chain.clear();
                adv.hidden_tip = public;
            }
            _ => {}
        }

        // the public tip advanced, so race a fresh attempt on the hidden tip
        self.start_mining(ctx);
    }
}
