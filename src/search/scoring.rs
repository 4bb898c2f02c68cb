//! Scores of hits, clusters and systems, and selection of the best systems.

use std::collections::BTreeSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::err::Error;
use crate::model::{GeneStatus, Model};

use super::hit::{HitKind, ModelHit};
use super::system::{HitSystemTracker, System};

/// Weights of the components of a hit score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HitWeights {
    /// Weight of a hit on a mandatory gene.
    pub mandatory: f64,
    /// Weight of a hit on an accessory gene.
    pub accessory: f64,
    /// Weight of a hit on a neutral gene.
    pub neutral: f64,
    /// Factor applied when the hit came in through an exchangeable
    /// alternate.
    pub exchangeable: f64,
    /// Factor applied when the hit matched the gene itself.
    pub itself: f64,
    /// Factor applied to hits that are both loner and multi-system.
    pub loner_multi_system: f64,
}

impl Default for HitWeights {
    fn default() -> Self {
        Self {
            mandatory: 1.0,
            accessory: 0.5,
            neutral: 0.0,
            exchangeable: 0.8,
            itself: 1.0,
            loner_multi_system: 0.7,
        }
    }
}

impl HitWeights {
    /// Score of one hit under these weights.
    pub fn hit_score(&self, model: &Model, hit: &ModelHit) -> Result<f64, Error> {
        let base = match hit.status {
            GeneStatus::Mandatory => self.mandatory,
            GeneStatus::Accessory => self.accessory,
            GeneStatus::Neutral => self.neutral,
            GeneStatus::Forbidden => return Err(Error::Scoring(hit.status.to_string())),
        };
        let gene = model.gene(hit.gene_ref);
        let exchanged = gene.is_alternate() || gene.name != hit.hit.gene_name;
        let factor = if exchanged {
            self.exchangeable
        } else {
            self.itself
        };
        let bonus = if matches!(hit.kind, HitKind::LonerMultiSystem { .. }) {
            self.loner_multi_system
        } else {
            1.0
        };
        Ok(base * factor * bonus)
    }
}

/// A system score extended with overlap statistics against the systems of
/// other models.
#[derive(Debug, Clone)]
pub struct ComposedScore<'a> {
    system: &'a System,
    score: f64,
    overlapping_genes: usize,
    overlapping_length: usize,
}

impl<'a> ComposedScore<'a> {
    /// Compute the composed score of a system.
    pub fn new(
        system: &'a System,
        model: &Model,
        weights: &HitWeights,
        tracker: &HitSystemTracker,
    ) -> Result<Self, Error> {
        let mut overlapping_genes = 0;
        let mut overlapping_length = 0;
        for hit in system.hits() {
            let used_in = tracker.other_model_systems(&hit.hit, system.model_fqn());
            if !used_in.is_empty() {
                overlapping_genes += 1;
            }
            overlapping_length += used_in.len();
        }
        Ok(Self {
            system,
            score: system.score(model, weights)?,
            overlapping_genes,
            overlapping_length,
        })
    }

    /// The scored system.
    pub fn system(&self) -> &'a System {
        self.system
    }

    /// The system score.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Number of hits shared with systems of other models.
    pub fn overlapping_genes(&self) -> usize {
        self.overlapping_genes
    }

    /// Total number of other-model systems claiming the shared hits.
    pub fn overlapping_length(&self) -> usize {
        self.overlapping_length
    }
}

/// Selection of the best system(s) among the systems found for one model.
#[derive(Debug)]
pub struct BestSystemSelector<'a> {
    systems: Vec<&'a System>,
}

impl<'a> BestSystemSelector<'a> {
    /// Create a selector over systems that must all belong to one model.
    pub fn new(systems: Vec<&'a System>) -> Result<Self, Error> {
        let models: BTreeSet<&str> = systems.iter().map(|s| s.model_fqn()).collect();
        if models.len() != 1 {
            return Err(Error::Domain(format!(
                "cannot select the best system among systems from different models: {}",
                models.iter().join(",")
            )));
        }
        Ok(Self { systems })
    }

    /// The best system(s).
    ///
    /// The highest score wins.  Ties are broken by the smallest number of
    /// hits shared with other models' systems, then by the smallest number
    /// of other-model systems claiming those hits.  Remaining ties are all
    /// returned.
    pub fn best_systems(
        &self,
        model: &Model,
        weights: &HitWeights,
        tracker: &HitSystemTracker,
    ) -> Result<Vec<&'a System>, Error> {
        let mut scored = self
            .systems
            .iter()
            .map(|s| Ok((s.score(model, weights)?, *s)))
            .collect::<Result<Vec<_>, Error>>()?;
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let top_score = scored.first().expect("the selector is never empty").0;
        let best = scored
            .iter()
            .take_while(|(score, _)| score.total_cmp(&top_score).is_eq())
            .map(|(_, s)| *s)
            .collect::<Vec<_>>();
        if best.len() == 1 {
            return Ok(best);
        }

        let composed = best
            .iter()
            .map(|s| ComposedScore::new(s, model, weights, tracker))
            .collect::<Result<Vec<_>, Error>>()?;
        let min_genes = composed
            .iter()
            .map(|c| c.overlapping_genes())
            .min()
            .expect("at least two tied systems");
        let composed = composed
            .into_iter()
            .filter(|c| c.overlapping_genes() == min_genes)
            .collect::<Vec<_>>();
        if composed.len() == 1 {
            return Ok(composed.iter().map(|c| c.system()).collect());
        }
        let min_length = composed
            .iter()
            .map(|c| c.overlapping_length())
            .min()
            .expect("at least two tied systems");
        Ok(composed
            .iter()
            .filter(|c| c.overlapping_length() == min_length)
            .map(|c| c.system())
            .collect())
    }
}
