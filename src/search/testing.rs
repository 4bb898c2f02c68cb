//! Helpers shared by the detection tests.

use std::sync::Arc;

use crate::db::{RepliconInfo, Topology};
use crate::model::{Model, ModelDef};

use super::hit::{CoreHit, ModelHit};

/// Build a model from an inline JSON definition.
pub fn model_from_json(value: serde_json::Value) -> Model {
    let def: ModelDef = serde_json::from_value(value).expect("the definition must deserialize");
    Model::from_def(&def).expect("the definition must be consistent")
}

/// A small secretion system model with one gene per role.
pub fn t2ss_model() -> Model {
    model_from_json(serde_json::json!({
        "name": "TXSS/T2SS",
        "inter_gene_max_space": 10,
        "min_mandatory_genes_required": 1,
        "min_genes_required": 2,
        "genes": [
            {"name": "gspD", "presence": "mandatory"},
            {
                "name": "sctJ",
                "presence": "accessory",
                "exchangeable": true,
                "alternates": ["sctJ_FLG"]
            },
            {"name": "tadZ", "presence": "neutral", "inter_gene_max_space": 2},
            {"name": "sctC", "presence": "forbidden"}
        ]
    }))
}

/// A linear replicon spanning the given ordinal positions.
pub fn linear_replicon(min: i64, max: i64) -> RepliconInfo {
    RepliconInfo {
        topology: Topology::Linear,
        min,
        max,
        genes: vec![],
    }
}

/// A circular replicon spanning the given ordinal positions.
pub fn circular_replicon(min: i64, max: i64) -> RepliconInfo {
    RepliconInfo {
        topology: Topology::Circular,
        min,
        max,
        genes: vec![],
    }
}

/// A core hit with plausible match statistics.
///
/// The hit id is derived from the replicon and position so that hits built
/// for the same sequence compare equal across models.
pub fn core_hit(gene: &str, replicon: &str, position: i64, score: f64) -> Arc<CoreHit> {
    Arc::new(CoreHit::new(
        format!("{}_{:03}", replicon, position),
        gene.to_owned(),
        replicon.to_owned(),
        position,
        200,
        1e-10,
        score,
        0.9,
        0.85,
        1,
        200,
    ))
}

/// A hit wrapped for the given model; the gene must belong to the model.
pub fn model_hit(model: &Model, gene: &str, replicon: &str, position: i64, score: f64) -> ModelHit {
    let gene_ref = model
        .hit_gene(gene)
        .expect("the gene must belong to the model");
    ModelHit::new(
        core_hit(gene, replicon, position, score),
        gene_ref,
        model.gene(gene_ref).status,
    )
}
