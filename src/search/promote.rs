//! Reclassification of multi-system and loner hits after clustering.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::err::Error;
use crate::model::Model;

use super::cluster::Cluster;
use super::hit::{CoreHit, HitKind, ModelHit};
use super::RunContext;

/// Outcome of the promotion pass over one replicon's clusters for one model.
#[derive(Debug, Default)]
pub struct Promotion {
    /// Clusters surviving true-loner extraction; multi-system hits are
    /// promoted in place.
    pub clusters: Vec<Cluster>,
    /// The best multi-system hit per function, as a single-hit cluster.
    pub multi_systems: IndexMap<String, Cluster>,
    /// The best true-loner hit per function, as a single-hit cluster.
    pub loners: IndexMap<String, Cluster>,
}

/// Run the promotion pass.
///
/// Hits whose function is declared multi-system are promoted in place,
/// carrying the other hits of the same function as counterparts.  Singleton
/// clusters of loner genes are removed from the cluster list; their hits are
/// pooled per function and converted to loner hits.  For both groups the hit
/// with the highest raw score represents its function as a single-hit
/// cluster.
pub fn promote(
    clusters: Vec<Cluster>,
    model: &Model,
    ctx: &mut RunContext,
) -> Result<Promotion, Error> {
    let mut clusters = clusters;

    // multi-system promotion, in place
    let mut groups: BTreeMap<String, Vec<(usize, usize)>> = BTreeMap::new();
    for (c, cluster) in clusters.iter().enumerate() {
        for (h, hit) in cluster.hits.iter().enumerate() {
            let canonical = model.alternate_of(hit.gene_ref);
            if model.gene(canonical).multi_system {
                groups
                    .entry(model.gene(canonical).name.clone())
                    .or_default()
                    .push((c, h));
            }
        }
    }
    let mut multi_systems = IndexMap::new();
    for (function, members) in &groups {
        let cores = members
            .iter()
            .map(|&(c, h)| Arc::clone(&clusters[c].hits[h].hit))
            .collect::<Vec<_>>();
        for (i, &(c, h)) in members.iter().enumerate() {
            clusters[c].hits[h].kind = HitKind::MultiSystem {
                counterparts: others(&cores, i),
            };
        }
        let &(c, h) = best_member(members, &clusters);
        multi_systems.insert(
            function.clone(),
            Cluster::new(
                ctx.next_cluster_id(),
                vec![clusters[c].hits[h].clone()],
                model,
            )?,
        );
    }

    // true-loner extraction
    let mut survivors = Vec::new();
    let mut pools: BTreeMap<String, Vec<ModelHit>> = BTreeMap::new();
    for cluster in clusters {
        if cluster.len() == 1 && model.gene(cluster.hits[0].gene_ref).loner {
            let hit = cluster
                .hits
                .into_iter()
                .next()
                .expect("the cluster has exactly one hit");
            pools
                .entry(model.function_name(hit.gene_ref).to_owned())
                .or_default()
                .push(hit);
        } else {
            survivors.push(cluster);
        }
    }
    let mut loners = IndexMap::new();
    for (function, pool) in pools {
        let cores = pool.iter().map(|h| Arc::clone(&h.hit)).collect::<Vec<_>>();
        let mut promoted = Vec::new();
        for (i, mut hit) in pool.into_iter().enumerate() {
            hit.kind = match std::mem::take(&mut hit.kind) {
                HitKind::MultiSystem { mut counterparts }
                | HitKind::LonerMultiSystem { mut counterparts } => {
                    for other in others(&cores, i) {
                        if !counterparts.iter().any(|c| c.key() == other.key()) {
                            counterparts.push(other);
                        }
                    }
                    HitKind::LonerMultiSystem { counterparts }
                }
                HitKind::Plain | HitKind::Loner { .. } => HitKind::Loner {
                    counterparts: others(&cores, i),
                },
            };
            promoted.push(hit);
        }
        let mut best = 0;
        for i in 1..promoted.len() {
            if promoted[i].hit.score > promoted[best].hit.score {
                best = i;
            }
        }
        loners.insert(
            function,
            Cluster::new(
                ctx.next_cluster_id(),
                vec![promoted.swap_remove(best)],
                model,
            )?,
        );
    }

    Ok(Promotion {
        clusters: survivors,
        multi_systems,
        loners,
    })
}

/// All core hits except the one at `index`.
fn others(cores: &[Arc<CoreHit>], index: usize) -> Vec<Arc<CoreHit>> {
    cores
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != index)
        .map(|(_, core)| Arc::clone(core))
        .collect()
}

/// The member whose hit has the highest raw score; the first one wins ties.
fn best_member<'a>(members: &'a [(usize, usize)], clusters: &[Cluster]) -> &'a (usize, usize) {
    let mut best = &members[0];
    for member in &members[1..] {
        let score = clusters[member.0].hits[member.1].hit.score;
        if score > clusters[best.0].hits[best.1].hit.score {
            best = member;
        }
    }
    best
}
