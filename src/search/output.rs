//! Rendering of detected systems and rejected candidates.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::err::Error;
use crate::model::Model;

use super::cluster::{Cluster, RejectedClusters};
use super::hit::ModelHit;
use super::scoring::HitWeights;
use super::system::{HitSystemTracker, System};

/// JSON view of a detected system.
#[derive(Debug, Clone, Serialize)]
pub struct SystemJson {
    /// Id of the system.
    pub id: String,
    /// Fully qualified name of the model.
    pub model: String,
    /// Number of clusters of the system.
    pub loci_nb: usize,
    /// Name of the replicon the system lives on.
    pub replicon_name: String,
    /// Hit gene names per cluster.
    pub clusters: Vec<Vec<String>>,
    /// Hit gene names per canonical gene, per role.
    pub gene_composition: GeneCompositionJson,
}

/// The `gene_composition` part of [`SystemJson`].
#[derive(Debug, Clone, Serialize)]
pub struct GeneCompositionJson {
    /// Hits per mandatory gene.
    pub mandatory: IndexMap<String, Vec<String>>,
    /// Hits per accessory gene.
    pub accessory: IndexMap<String, Vec<String>>,
    /// Hits per neutral gene.
    pub neutral: IndexMap<String, Vec<String>>,
}

fn occ_names(occ: &IndexMap<String, Vec<ModelHit>>) -> IndexMap<String, Vec<String>> {
    occ.iter()
        .map(|(gene, hits)| {
            (
                gene.clone(),
                hits.iter().map(|h| h.hit.gene_name.clone()).collect(),
            )
        })
        .collect()
}

/// The JSON view of a system.
pub fn system_to_json(system: &System) -> SystemJson {
    SystemJson {
        id: system.id().to_owned(),
        model: system.model_fqn().to_owned(),
        loci_nb: system.clusters().len(),
        replicon_name: system.replicon_name().to_owned(),
        clusters: system
            .clusters()
            .iter()
            .map(|c| c.hits.iter().map(|h| h.hit.gene_name.clone()).collect())
            .collect(),
        gene_composition: GeneCompositionJson {
            mandatory: occ_names(system.mandatory_occ()),
            accessory: occ_names(system.accessory_occ()),
            neutral: occ_names(system.neutral_occ()),
        },
    }
}

/// The multi-line text view of a system.
///
/// Hits claimed by systems of other models are annotated with those systems'
/// ids.
pub fn system_to_text(
    system: &System,
    model: &Model,
    weights: &HitWeights,
    tracker: &HitSystemTracker,
) -> Result<String, Error> {
    let clusters = system
        .clusters()
        .iter()
        .map(|cluster| {
            format!(
                "[{}]",
                cluster
                    .hits
                    .iter()
                    .map(|h| format!("({}, {})", h.hit.gene_name, h.position()))
                    .join(", ")
            )
        })
        .join(", ");
    let mut text = format!(
        "system id = {}\n\
         model = {}\n\
         replicon = {}\n\
         clusters = {}\n\
         occ = {}\n\
         wholeness = {:.3}\n\
         loci nb = {}\n\
         score = {:.3}\n",
        system.id(),
        system.model_fqn(),
        system.replicon_name(),
        clusters,
        system.occurrence(),
        system.wholeness(),
        system.loci(),
        system.score(model, weights)?,
    );
    for (title, genes) in [
        ("mandatory", system.mandatory_occ()),
        ("accessory", system.accessory_occ()),
        ("neutral", system.neutral_occ()),
    ] {
        text.push_str(&format!("\n{} genes:\n", title));
        for (gene_name, hits) in genes {
            let rendered = hits
                .iter()
                .map(|h| {
                    let used_in = tracker.other_model_systems(&h.hit, system.model_fqn());
                    if used_in.is_empty() {
                        h.hit.gene_name.clone()
                    } else {
                        format!("{} [{}]", h.hit.gene_name, used_in.join(", "))
                    }
                })
                .join(", ");
            text.push_str(&format!("\t- {}: {} ({})\n", gene_name, hits.len(), rendered));
        }
    }
    Ok(text)
}

/// The text view of one cluster.
pub fn cluster_to_text(cluster: &Cluster, model: &Model) -> String {
    format!(
        "Cluster:\n    - model: {}\n    - hits: {}",
        model.name(),
        cluster
            .hits
            .iter()
            .map(|h| format!("({}, {}, {})", h.hit.id, h.hit.gene_name, h.position()))
            .join(", ")
    )
}

/// The text view of a rejected candidate.
pub fn rejected_to_text(rejected: &RejectedClusters, model: &Model) -> String {
    let mut text = String::new();
    for cluster in &rejected.clusters {
        text.push_str(&cluster_to_text(cluster, model));
        text.push('\n');
    }
    text.push_str(&format!(
        "These clusters have been rejected because:\n{}\n",
        rejected.reason
    ));
    text
}
