//! Grouping of colocalizing hits into clusters, one replicon and model at a
//! time.

use indexmap::IndexMap;

use crate::db::{RepliconInfo, Topology};
use crate::err::Error;
use crate::model::{GeneId, Model};

use super::hit::ModelHit;
use super::scoring::HitWeights;
use super::RunContext;

/// Whether two hits of the same replicon colocalize.
///
/// `h1` must not come after `h2` in the sweep order.  The allowed number of
/// non-matching genes between the two hits is the smallest per-gene override
/// carried by the two genes, or the model's `inter_gene_max_space` when
/// neither gene carries one.  On circular replicons the distance through the
/// origin is considered as well.
pub fn colocalize(
    model: &Model,
    rep_info: &RepliconInfo,
    h1: &ModelHit,
    h2: &ModelHit,
) -> bool {
    let d_max = match (
        model.gene(h1.gene_ref).inter_gene_max_space,
        model.gene(h2.gene_ref).inter_gene_max_space,
    ) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => model.inter_gene_max_space(),
    };
    let dist = h2.position() - h1.position() - 1;
    if (0..=d_max).contains(&dist) {
        true
    } else if dist <= 0 && rep_info.topology == Topology::Circular {
        // h1 and h2 overlap the origin
        let dist = (rep_info.max - h1.position()) + (h2.position() - rep_info.min);
        dist <= d_max
    } else {
        false
    }
}

/// An ordered set of hits of one replicon that colocalize under one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// The hits of the cluster, in sweep order.
    pub hits: Vec<ModelHit>,
    model_fqn: String,
    id: u64,
}

impl Cluster {
    /// Build a cluster; all hits must come from the same replicon.
    pub fn new(id: u64, hits: Vec<ModelHit>, model: &Model) -> Result<Self, Error> {
        let cluster = Self {
            hits,
            model_fqn: model.fqn().to_owned(),
            id,
        };
        cluster.check_replicon_consistency()?;
        Ok(cluster)
    }

    fn check_replicon_consistency(&self) -> Result<(), Error> {
        if let Some(first) = self.hits.first() {
            if self
                .hits
                .iter()
                .any(|h| h.hit.replicon_name != first.hit.replicon_name)
            {
                return Err(Error::InvariantViolation(
                    "cannot build a cluster from hits coming from different replicons".into(),
                ));
            }
        }
        Ok(())
    }

    /// Unique id of the cluster within the run.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fully qualified name of the model the cluster was built for.
    pub fn model_fqn(&self) -> &str {
        &self.model_fqn
    }

    /// Name of the replicon all hits of the cluster come from.
    pub fn replicon_name(&self) -> &str {
        &self
            .hits
            .first()
            .expect("clusters are never empty")
            .hit
            .replicon_name
    }

    /// Number of hits in the cluster.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether the cluster has no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Merge another cluster of the same model into this one, in place.
    ///
    /// With `before` the other cluster's hits are inserted in front of this
    /// cluster's hits, otherwise they are appended.
    pub fn merge(&mut self, other: Cluster, before: bool) -> Result<(), Error> {
        if other.model_fqn != self.model_fqn {
            return Err(Error::InvariantViolation(
                "cannot merge clusters built for different models".into(),
            ));
        }
        if before {
            let mut hits = other.hits;
            hits.append(&mut self.hits);
            self.hits = hits;
        } else {
            self.hits.extend(other.hits);
        }
        Ok(())
    }

    /// Whether any hit of the cluster fulfills the function of the given
    /// gene.
    pub fn fulfilled_function(&self, model: &Model, gene: GeneId) -> bool {
        let function = model.alternate_of(gene);
        self.hits
            .iter()
            .any(|h| model.alternate_of(h.gene_ref) == function)
    }

    /// Score of the cluster.
    ///
    /// Every function appearing in the cluster contributes once, with the
    /// best hit score over the hits fulfilling it.
    pub fn score(&self, model: &Model, weights: &HitWeights) -> Result<f64, Error> {
        let mut best_per_function: IndexMap<&str, f64> = IndexMap::new();
        for hit in &self.hits {
            let hit_score = weights.hit_score(model, hit)?;
            let best = best_per_function
                .entry(model.function_name(hit.gene_ref))
                .or_insert(f64::NEG_INFINITY);
            if hit_score > *best {
                *best = hit_score;
            }
        }
        Ok(best_per_function.values().sum())
    }
}

/// Clusters that did not satisfy a model, kept together with the reason.
///
/// This is a first-class negative result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedClusters {
    /// Fully qualified name of the model the clusters were checked against.
    pub model_fqn: String,
    /// The clusters that were considered.
    pub clusters: Vec<Cluster>,
    /// Why the clusters have been rejected.
    pub reason: String,
}

/// Group the hits of one replicon into clusters under one model.
///
/// The hits are sorted by position and deduplicated (the best scoring hit is
/// kept per position), then swept left to right.  A scaffold of consecutive
/// colocalizing hits is closed into a cluster when it has at least two hits,
/// when the model accepts single-gene systems, or when its single hit is a
/// loner.  On circular replicons a trailing hit or cluster that wraps around
/// the origin is merged into the front of the first cluster.
pub fn build_clusters(
    mut hits: Vec<ModelHit>,
    rep_info: &RepliconInfo,
    model: &Model,
    ctx: &mut RunContext,
) -> Result<Vec<Cluster>, Error> {
    hits.sort_by(|a, b| {
        a.position()
            .cmp(&b.position())
            .then_with(|| b.hit.score.total_cmp(&a.hit.score))
    });
    // several hits may match the same sequence; keep the best scoring one
    hits.dedup_by_key(|h| h.position());

    let close_singleton =
        |hit: &ModelHit| model.gene(hit.gene_ref).loner || model.min_genes_required() == 1;

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut scaffold: Vec<ModelHit> = Vec::new();
    for hit in hits {
        match scaffold.last() {
            None => scaffold.push(hit),
            Some(previous) if colocalize(model, rep_info, previous, &hit) => scaffold.push(hit),
            Some(_) => {
                if scaffold.len() > 1 || close_singleton(&scaffold[0]) {
                    clusters.push(Cluster::new(
                        ctx.next_cluster_id(),
                        std::mem::take(&mut scaffold),
                        model,
                    )?);
                } else {
                    scaffold.clear();
                }
                scaffold.push(hit);
            }
        }
    }

    // close the trailing scaffold
    if scaffold.len() > 1 {
        clusters.push(Cluster::new(ctx.next_cluster_id(), scaffold, model)?);
    } else if let Some(hit) = scaffold.pop() {
        if !clusters.is_empty() && colocalize(model, rep_info, &hit, &clusters[0].hits[0]) {
            // the trailing hit wraps around the origin onto the first cluster
            let singleton = Cluster::new(ctx.next_cluster_id(), vec![hit], model)?;
            clusters[0].merge(singleton, true)?;
        } else if close_singleton(&hit) {
            clusters.push(Cluster::new(ctx.next_cluster_id(), vec![hit], model)?);
        }
    }

    // stitch the ends of a circular replicon
    if clusters.len() >= 2 {
        let wraps = {
            let last = clusters.last().expect("at least two clusters");
            let last_hit = last.hits.last().expect("clusters are never empty");
            colocalize(model, rep_info, last_hit, &clusters[0].hits[0])
        };
        if wraps {
            let last = clusters.pop().expect("at least two clusters");
            clusters[0].merge(last, true)?;
        }
    }

    Ok(clusters)
}
