//! Candidate systems composed of validated clusters.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::err::Error;
use crate::model::{GeneStatus, Model};

use super::cluster::Cluster;
use super::hit::{CoreHit, HitKey, ModelHit};
use super::scoring::HitWeights;
use super::RunContext;

/// A candidate system: clusters of hits that together satisfy a model.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    id: String,
    model_fqn: String,
    replicon_name: String,
    clusters: Vec<Cluster>,
    mandatory_occ: IndexMap<String, Vec<ModelHit>>,
    accessory_occ: IndexMap<String, Vec<ModelHit>>,
    neutral_occ: IndexMap<String, Vec<ModelHit>>,
}

impl System {
    /// Build a system from validated clusters and assign its id.
    ///
    /// The id is `<replicon>_<model-name>_<n>` where `n` counts the systems
    /// of this model on this replicon.
    pub fn new(model: &Model, clusters: Vec<Cluster>, ctx: &mut RunContext) -> Result<Self, Error> {
        let replicon_name = clusters
            .first()
            .map(|c| c.replicon_name().to_owned())
            .ok_or_else(|| {
                Error::InvariantViolation("cannot build a system without clusters".into())
            })?;
        if clusters.iter().any(|c| c.replicon_name() != replicon_name) {
            return Err(Error::InvariantViolation(
                "cannot build a system from clusters of different replicons".into(),
            ));
        }

        let number = ctx.next_system_number(&replicon_name, model.fqn());
        let mut system = Self {
            id: format!("{}_{}_{}", replicon_name, model.name(), number),
            model_fqn: model.fqn().to_owned(),
            replicon_name,
            clusters,
            mandatory_occ: Self::empty_occ(model, GeneStatus::Mandatory),
            accessory_occ: Self::empty_occ(model, GeneStatus::Accessory),
            neutral_occ: Self::empty_occ(model, GeneStatus::Neutral),
        };
        system.count(model);
        Ok(system)
    }

    fn empty_occ(model: &Model, status: GeneStatus) -> IndexMap<String, Vec<ModelHit>> {
        model
            .genes_with_status(status)
            .map(|(_, gene)| (gene.name.clone(), Vec::new()))
            .collect()
    }

    fn count(&mut self, model: &Model) {
        let hits = self
            .clusters
            .iter()
            .flat_map(|c| c.hits.iter().cloned())
            .collect::<Vec<_>>();
        for hit in hits {
            let gene_name = model.gene(model.alternate_of(hit.gene_ref)).name.clone();
            let occ = match hit.status {
                GeneStatus::Mandatory => &mut self.mandatory_occ,
                GeneStatus::Accessory => &mut self.accessory_occ,
                GeneStatus::Neutral => &mut self.neutral_occ,
                // forbidden hits are diverted before clusters are validated
                GeneStatus::Forbidden => continue,
            };
            occ.get_mut(&gene_name)
                .expect("valid hits reference declared genes")
                .push(hit);
        }
    }

    /// Id of the system.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fully qualified name of the model the system satisfies.
    pub fn model_fqn(&self) -> &str {
        &self.model_fqn
    }

    /// Name of the replicon the system lives on.
    pub fn replicon_name(&self) -> &str {
        &self.replicon_name
    }

    /// The clusters forming the system.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// All hits of the system, in cluster order.
    pub fn hits(&self) -> impl Iterator<Item = &ModelHit> {
        self.clusters.iter().flat_map(|c| c.hits.iter())
    }

    /// Hits per mandatory gene.
    pub fn mandatory_occ(&self) -> &IndexMap<String, Vec<ModelHit>> {
        &self.mandatory_occ
    }

    /// Hits per accessory gene.
    pub fn accessory_occ(&self) -> &IndexMap<String, Vec<ModelHit>> {
        &self.accessory_occ
    }

    /// Hits per neutral gene.
    pub fn neutral_occ(&self) -> &IndexMap<String, Vec<ModelHit>> {
        &self.neutral_occ
    }

    /// Fraction of the model's mandatory and accessory genes that are hit.
    ///
    /// Neutral genes do not participate.
    pub fn wholeness(&self) -> f64 {
        let total = self.mandatory_occ.len() + self.accessory_occ.len();
        if total == 0 {
            return 0.0;
        }
        let filled = self
            .mandatory_occ
            .values()
            .chain(self.accessory_occ.values())
            .filter(|hits| !hits.is_empty())
            .count();
        filled as f64 / total as f64
    }

    /// Estimated number of biological systems behind this candidate.
    ///
    /// Several colocalizing systems form a single cluster; the median of the
    /// mandatory gene occurrences indicates how many there are.  The value is
    /// floored at 1.
    pub fn occurrence(&self) -> usize {
        let mut occ = self
            .mandatory_occ
            .values()
            .map(|hits| hits.len())
            .collect::<Vec<_>>();
        if occ.is_empty() {
            return 1;
        }
        occ.sort_unstable();
        let n = occ.len();
        let median = if n % 2 == 1 {
            occ[n / 2] as f64
        } else {
            (occ[n / 2 - 1] + occ[n / 2]) as f64 / 2.0
        };
        (median.round() as usize).max(1)
    }

    /// Number of loci of the system; loners do not count.
    pub fn loci(&self) -> usize {
        self.clusters.iter().filter(|c| c.len() > 1).count()
    }

    /// Whether the system spreads over several loci.
    pub fn multi_loci(&self) -> bool {
        self.loci() > 1
    }

    /// Score of the system.
    ///
    /// The sum of the cluster scores, minus 1.5 for every redundant
    /// cross-cluster occurrence of a mandatory or accessory function.
    pub fn score(&self, model: &Model, weights: &HitWeights) -> Result<f64, Error> {
        let mut score = 0.0;
        for cluster in &self.clusters {
            score += cluster.score(model, weights)?;
        }
        for (gene_id, _) in model
            .genes_with_status(GeneStatus::Mandatory)
            .chain(model.genes_with_status(GeneStatus::Accessory))
        {
            let fulfilled = self
                .clusters
                .iter()
                .filter(|c| c.fulfilled_function(model, gene_id))
                .count();
            if fulfilled > 0 {
                score -= (fulfilled - 1) as f64 * 1.5;
            }
        }
        Ok(score)
    }
}

/// For each hit, the systems across all models that contain it.
#[derive(Debug, Clone, Default)]
pub struct HitSystemTracker {
    map: HashMap<HitKey, BTreeSet<(String, String)>>,
}

impl HitSystemTracker {
    /// Build the tracker over the given systems.
    pub fn new<'a, I>(systems: I) -> Self
    where
        I: IntoIterator<Item = &'a System>,
    {
        let mut map: HashMap<HitKey, BTreeSet<(String, String)>> = HashMap::new();
        for system in systems {
            for hit in system.hits() {
                map.entry(hit.hit.key())
                    .or_default()
                    .insert((system.model_fqn().to_owned(), system.id().to_owned()));
            }
        }
        Self { map }
    }

    /// Ids of the systems of other models that also contain the hit, in id
    /// order.
    pub fn other_model_systems(&self, hit: &CoreHit, model_fqn: &str) -> Vec<&str> {
        self.map
            .get(&hit.key())
            .map(|systems| {
                systems
                    .iter()
                    .filter(|(fqn, _)| fqn != model_fqn)
                    .map(|(_, id)| id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use crate::search::testing::{model_from_json, model_hit, t2ss_model};

    use super::*;

    #[test]
    fn system_counts_hits_per_gene_and_role() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 10, 10.0),
                model_hit(&model, "sctJ", "R", 12, 20.0),
                model_hit(&model, "gspD", "R", 13, 8.0),
                model_hit(&model, "tadZ", "R", 14, 3.0),
            ],
            &model,
        )?;

        let system = System::new(&model, vec![cluster], &mut ctx)?;

        assert_eq!(system.id(), "R_T2SS_1");
        assert_eq!(system.replicon_name(), "R");
        assert_eq!(system.mandatory_occ()["gspD"].len(), 2);
        assert_eq!(system.accessory_occ()["sctJ"].len(), 1);
        assert_eq!(system.neutral_occ()["tadZ"].len(), 1);
        assert!(approx_eq!(f64, system.wholeness(), 1.0));
        assert_eq!(system.loci(), 1);
        assert!(!system.multi_loci());
        Ok(())
    }

    #[test]
    fn system_numbers_increase_per_replicon_and_model() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let make = |ctx: &mut RunContext, replicon: &str, pos: i64| -> Result<System, Error> {
            let cluster = Cluster::new(
                ctx.next_cluster_id(),
                vec![
                    model_hit(&model, "gspD", replicon, pos, 10.0),
                    model_hit(&model, "sctJ", replicon, pos + 2, 20.0),
                ],
                &model,
            )?;
            System::new(&model, vec![cluster], ctx)
        };

        assert_eq!(make(&mut ctx, "R", 10)?.id(), "R_T2SS_1");
        assert_eq!(make(&mut ctx, "R", 50)?.id(), "R_T2SS_2");
        assert_eq!(make(&mut ctx, "A", 10)?.id(), "A_T2SS_1");
        Ok(())
    }

    #[test]
    fn occurrence_is_the_median_of_mandatory_occurrences() -> Result<(), anyhow::Error> {
        let model = model_from_json(serde_json::json!({
            "name": "TXSS/Flagellum",
            "inter_gene_max_space": 10,
            "min_mandatory_genes_required": 2,
            "min_genes_required": 2,
            "genes": [
                {"name": "fliE", "presence": "mandatory"},
                {"name": "flgB", "presence": "mandatory"},
                {"name": "flgC", "presence": "mandatory"}
            ]
        }));
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "fliE", "R", 10, 10.0),
                model_hit(&model, "fliE", "R", 11, 10.0),
                model_hit(&model, "flgB", "R", 12, 10.0),
                model_hit(&model, "flgB", "R", 13, 10.0),
                model_hit(&model, "flgC", "R", 14, 10.0),
            ],
            &model,
        )?;

        let system = System::new(&model, vec![cluster], &mut ctx)?;

        // occurrences are [2, 2, 1], median 2
        assert_eq!(system.occurrence(), 2);
        Ok(())
    }

    #[test]
    fn occurrence_is_floored_at_one() -> Result<(), anyhow::Error> {
        let model = model_from_json(serde_json::json!({
            "name": "TXSS/Flagellum",
            "inter_gene_max_space": 10,
            "min_mandatory_genes_required": 1,
            "min_genes_required": 1,
            "genes": [
                {"name": "fliE", "presence": "mandatory"},
                {"name": "flgB", "presence": "mandatory"},
                {"name": "flgC", "presence": "mandatory"}
            ]
        }));
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![model_hit(&model, "fliE", "R", 10, 10.0)],
            &model,
        )?;

        let system = System::new(&model, vec![cluster], &mut ctx)?;

        // occurrences are [1, 0, 0], median 0, floored
        assert_eq!(system.occurrence(), 1);
        Ok(())
    }

    #[test]
    fn tracker_reports_other_model_systems_only() -> Result<(), anyhow::Error> {
        let model_a = t2ss_model();
        let model_b = model_from_json(serde_json::json!({
            "name": "TXSS/T4P",
            "inter_gene_max_space": 10,
            "min_mandatory_genes_required": 1,
            "min_genes_required": 1,
            "genes": [
                {"name": "gspD", "presence": "mandatory"},
                {"name": "pilT", "presence": "accessory"}
            ]
        }));
        let mut ctx = RunContext::default();
        let shared = model_hit(&model_a, "gspD", "R", 10, 10.0);
        let sys_a = System::new(
            &model_a,
            vec![Cluster::new(
                ctx.next_cluster_id(),
                vec![shared.clone(), model_hit(&model_a, "sctJ", "R", 12, 20.0)],
                &model_a,
            )?],
            &mut ctx,
        )?;
        let sys_b = System::new(
            &model_b,
            vec![Cluster::new(
                ctx.next_cluster_id(),
                vec![model_hit(&model_b, "gspD", "R", 10, 10.0)],
                &model_b,
            )?],
            &mut ctx,
        )?;

        let tracker = HitSystemTracker::new(vec![&sys_a, &sys_b]);

        assert_eq!(
            tracker.other_model_systems(&shared.hit, model_a.fqn()),
            vec![sys_b.id()]
        );
        assert_eq!(
            tracker.other_model_systems(&shared.hit, model_b.fqn()),
            vec![sys_a.id()]
        );
        let lonely = model_hit(&model_a, "sctJ", "R", 12, 20.0);
        assert_eq!(
            tracker.other_model_systems(&lonely.hit, model_a.fqn()),
            Vec::<&str>::new()
        );
        Ok(())
    }
}
