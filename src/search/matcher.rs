//! Composition of clusters into candidate systems and the model quorum
//! check.

use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::err::Error;
use crate::model::{GeneStatus, Model};

use super::cluster::{Cluster, RejectedClusters};
use super::hit::ModelHit;
use super::promote::Promotion;
use super::system::System;
use super::RunContext;

/// Outcome of checking one combination of clusters against a model.
#[derive(Debug)]
pub enum MatchOutcome {
    /// The combination satisfies the model.
    System(System),
    /// The combination does not satisfy the model.
    Rejected(RejectedClusters),
}

/// Check whether a set of clusters fulfills the model constraints.
///
/// Every hit is resolved against the model's role sets, exchangeable
/// alternates count for their canonical gene, forbidden hits are diverted,
/// and hits unknown to the model are dropped.  The combination yields a
/// [`System`] when no forbidden gene occurs and both quorums are reached,
/// otherwise a [`RejectedClusters`] explaining every failed rule.
pub fn match_clusters(
    clusters: &[&Cluster],
    model: &Model,
    ctx: &mut RunContext,
) -> Result<MatchOutcome, Error> {
    let mut mandatory_counter = counter(model, GeneStatus::Mandatory);
    let mut accessory_counter = counter(model, GeneStatus::Accessory);
    let mut neutral_counter = counter(model, GeneStatus::Neutral);
    let mut forbidden_counter = counter(model, GeneStatus::Forbidden);
    let exchangeable_mandatory = model.exchangeable_map(GeneStatus::Mandatory);
    let exchangeable_accessory = model.exchangeable_map(GeneStatus::Accessory);
    let exchangeable_neutral = model.exchangeable_map(GeneStatus::Neutral);
    let exchangeable_forbidden = model.exchangeable_map(GeneStatus::Forbidden);

    let mut valid_clusters = Vec::new();
    let mut forbidden_hits: Vec<ModelHit> = Vec::new();
    for cluster in clusters {
        let mut valid_hits = Vec::new();
        for hit in &cluster.hits {
            let gene_name = hit.hit.gene_name.as_str();
            if let Some(count) = mandatory_counter.get_mut(gene_name) {
                *count += 1;
                valid_hits.push(hit.with_role(model.gene_id(gene_name)?, GeneStatus::Mandatory));
            } else if let Some(&canonical) = exchangeable_mandatory.get(gene_name) {
                *mandatory_counter
                    .get_mut(model.gene(canonical).name.as_str())
                    .expect("alternates map to declared genes") += 1;
                valid_hits.push(hit.with_role(canonical, GeneStatus::Mandatory));
            } else if let Some(count) = accessory_counter.get_mut(gene_name) {
                *count += 1;
                valid_hits.push(hit.with_role(model.gene_id(gene_name)?, GeneStatus::Accessory));
            } else if let Some(&canonical) = exchangeable_accessory.get(gene_name) {
                *accessory_counter
                    .get_mut(model.gene(canonical).name.as_str())
                    .expect("alternates map to declared genes") += 1;
                valid_hits.push(hit.with_role(canonical, GeneStatus::Accessory));
            } else if let Some(count) = neutral_counter.get_mut(gene_name) {
                *count += 1;
                valid_hits.push(hit.with_role(model.gene_id(gene_name)?, GeneStatus::Neutral));
            } else if let Some(&canonical) = exchangeable_neutral.get(gene_name) {
                *neutral_counter
                    .get_mut(model.gene(canonical).name.as_str())
                    .expect("alternates map to declared genes") += 1;
                valid_hits.push(hit.with_role(canonical, GeneStatus::Neutral));
            } else if let Some(count) = forbidden_counter.get_mut(gene_name) {
                *count += 1;
                forbidden_hits.push(hit.clone());
            } else if let Some(&canonical) = exchangeable_forbidden.get(gene_name) {
                *forbidden_counter
                    .get_mut(model.gene(canonical).name.as_str())
                    .expect("alternates map to declared genes") += 1;
                forbidden_hits.push(hit.clone());
            }
            // hits unknown to the model are dropped
        }
        if !valid_hits.is_empty() {
            valid_clusters.push(Cluster::new(ctx.next_cluster_id(), valid_hits, model)?);
        }
    }

    let present = |counter: &IndexMap<&str, usize>| counter.values().filter(|&&c| c > 0).count();
    let mandatory_present = present(&mandatory_counter);
    let accessory_present = present(&accessory_counter);
    let forbidden_present = present(&forbidden_counter);

    let mut reasons = Vec::new();
    if forbidden_present > 0 {
        reasons.push(format!(
            "There is {} forbidden genes occurrence(s): {}",
            forbidden_hits.len(),
            forbidden_hits.iter().map(|h| h.hit.gene_name.as_str()).join(", ")
        ));
    }
    if mandatory_present < model.min_mandatory_genes_required() {
        reasons.push(format!(
            "The quorum of mandatory genes required ({}) is not reached: {}",
            model.min_mandatory_genes_required(),
            mandatory_present
        ));
    }
    if mandatory_present + accessory_present < model.min_genes_required() {
        reasons.push(format!(
            "The quorum of genes required ({}) is not reached: {}",
            model.min_genes_required(),
            mandatory_present + accessory_present
        ));
    }

    if reasons.is_empty() {
        Ok(MatchOutcome::System(System::new(
            model,
            valid_clusters,
            ctx,
        )?))
    } else {
        Ok(MatchOutcome::Rejected(RejectedClusters {
            model_fqn: model.fqn().to_owned(),
            clusters: clusters.iter().map(|c| (*c).clone()).collect(),
            reason: reasons.join("\n"),
        }))
    }
}

fn counter<'a>(model: &'a Model, status: GeneStatus) -> IndexMap<&'a str, usize> {
    model
        .genes_with_status(status)
        .map(|(_, gene)| (gene.name.as_str(), 0))
        .collect()
}

/// Enumerate cluster combinations for a model and check each of them.
///
/// The combination pool holds the surviving clusters plus the true-loner and
/// multi-system representatives.  Single-locus models are checked one
/// cluster at a time, multi-loci models over every combination size.
/// Combinations in which the same hit occurs twice cannot form a system and
/// are skipped.
pub fn find_candidates(
    promotion: &Promotion,
    model: &Model,
    ctx: &mut RunContext,
) -> Result<(Vec<System>, Vec<RejectedClusters>), Error> {
    let mut pool: Vec<&Cluster> = promotion.clusters.iter().collect();
    pool.extend(promotion.loners.values());
    pool.extend(promotion.multi_systems.values());

    let max_size = if model.multi_loci() { pool.len() } else { 1 };
    let mut systems = Vec::new();
    let mut rejected = Vec::new();
    for size in 1..=max_size {
        for combination in pool.iter().copied().combinations(size) {
            if has_duplicate_hits(&combination) {
                continue;
            }
            match match_clusters(&combination, model, ctx)? {
                MatchOutcome::System(system) => systems.push(system),
                MatchOutcome::Rejected(r) => rejected.push(r),
            }
        }
    }
    Ok((systems, rejected))
}

fn has_duplicate_hits(clusters: &[&Cluster]) -> bool {
    let mut seen = HashSet::new();
    for cluster in clusters {
        for hit in &cluster.hits {
            if !seen.insert(hit.hit.key()) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::search::promote::promote;
    use crate::search::testing::{model_from_json, model_hit, t2ss_model};

    use super::*;

    #[test]
    fn colocalizing_mandatory_and_accessory_hits_form_a_system() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 10, 10.0),
                model_hit(&model, "sctJ", "R", 15, 20.0),
            ],
            &model,
        )?;

        let outcome = match_clusters(&[&cluster], &model, &mut ctx)?;

        match outcome {
            MatchOutcome::System(system) => {
                assert_eq!(system.id(), "R_T2SS_1");
                assert_eq!(system.clusters().len(), 1);
                assert_eq!(system.mandatory_occ()["gspD"].len(), 1);
                assert_eq!(system.accessory_occ()["sctJ"].len(), 1);
            }
            MatchOutcome::Rejected(r) => panic!("expected a system, got: {}", r.reason),
        }
        Ok(())
    }

    #[test]
    fn forbidden_gene_vetoes_the_candidate() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 10, 10.0),
                model_hit(&model, "sctJ", "R", 12, 20.0),
                model_hit(&model, "sctC", "R", 14, 5.0),
            ],
            &model,
        )?;

        let outcome = match_clusters(&[&cluster], &model, &mut ctx)?;

        match outcome {
            MatchOutcome::Rejected(rejected) => {
                assert_eq!(
                    rejected.reason,
                    "There is 1 forbidden genes occurrence(s): sctC"
                );
                assert_eq!(rejected.clusters.len(), 1);
            }
            MatchOutcome::System(_) => panic!("the forbidden gene must veto the candidate"),
        }
        Ok(())
    }

    #[test]
    fn missing_quorums_are_all_reported() -> Result<(), anyhow::Error> {
        let model = model_from_json(serde_json::json!({
            "name": "TXSS/Flagellum",
            "inter_gene_max_space": 10,
            "min_mandatory_genes_required": 2,
            "min_genes_required": 3,
            "genes": [
                {"name": "fliE", "presence": "mandatory"},
                {"name": "flgB", "presence": "mandatory"},
                {"name": "flgC", "presence": "accessory"}
            ]
        }));
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "fliE", "R", 10, 10.0),
                model_hit(&model, "fliE", "R", 11, 9.0),
            ],
            &model,
        )?;

        let outcome = match_clusters(&[&cluster], &model, &mut ctx)?;

        match outcome {
            MatchOutcome::Rejected(rejected) => {
                assert_eq!(
                    rejected.reason,
                    "The quorum of mandatory genes required (2) is not reached: 1\n\
                     The quorum of genes required (3) is not reached: 1"
                );
            }
            MatchOutcome::System(_) => panic!("the quorums cannot be reached"),
        }
        Ok(())
    }

    #[test]
    fn exchangeable_hits_count_for_their_canonical_gene() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 10, 10.0),
                model_hit(&model, "sctJ_FLG", "R", 12, 20.0),
            ],
            &model,
        )?;

        let outcome = match_clusters(&[&cluster], &model, &mut ctx)?;

        match outcome {
            MatchOutcome::System(system) => {
                let hits = &system.accessory_occ()["sctJ"];
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].hit.gene_name, "sctJ_FLG");
                assert_eq!(model.gene(hits[0].gene_ref).name, "sctJ");
            }
            MatchOutcome::Rejected(r) => panic!("expected a system, got: {}", r.reason),
        }
        Ok(())
    }

    #[test]
    fn neutral_hits_do_not_count_toward_the_quorum() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 10, 10.0),
                model_hit(&model, "tadZ", "R", 12, 20.0),
            ],
            &model,
        )?;

        let outcome = match_clusters(&[&cluster], &model, &mut ctx)?;

        match outcome {
            MatchOutcome::Rejected(rejected) => {
                assert_eq!(
                    rejected.reason,
                    "The quorum of genes required (2) is not reached: 1"
                );
            }
            MatchOutcome::System(_) => panic!("neutral genes must not fill the quorum"),
        }
        Ok(())
    }

    #[test]
    fn multi_loci_model_combines_clusters() -> Result<(), anyhow::Error> {
        let model = model_from_json(serde_json::json!({
            "name": "TXSS/T4P",
            "inter_gene_max_space": 5,
            "min_mandatory_genes_required": 1,
            "min_genes_required": 2,
            "multi_loci": true,
            "genes": [
                {"name": "pilB", "presence": "mandatory"},
                {"name": "pilT", "presence": "accessory"},
                {"name": "pilQ", "presence": "accessory"}
            ]
        }));
        let mut ctx = RunContext::default();
        let cluster_a = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "pilB", "R", 10, 10.0),
                model_hit(&model, "pilT", "R", 12, 20.0),
            ],
            &model,
        )?;
        let cluster_b = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "pilB", "R", 50, 10.0),
                model_hit(&model, "pilQ", "R", 52, 20.0),
            ],
            &model,
        )?;
        let promotion = Promotion {
            clusters: vec![cluster_a, cluster_b],
            ..Default::default()
        };

        let (systems, rejected) = find_candidates(&promotion, &model, &mut ctx)?;

        // each cluster alone and the pair of them
        assert_eq!(systems.len(), 3);
        assert_eq!(rejected.len(), 0);
        assert!(systems.iter().any(|s| s.clusters().len() == 2));
        Ok(())
    }

    #[test]
    fn single_locus_model_checks_clusters_separately() -> Result<(), anyhow::Error> {
        let model = t2ss_model();
        let mut ctx = RunContext::default();
        let cluster_a = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 10, 10.0),
                model_hit(&model, "sctJ", "R", 12, 20.0),
            ],
            &model,
        )?;
        let cluster_b = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "gspD", "R", 50, 10.0),
                model_hit(&model, "gspD", "R", 52, 11.0),
            ],
            &model,
        )?;
        let promotion = Promotion {
            clusters: vec![cluster_a, cluster_b],
            ..Default::default()
        };

        let (systems, rejected) = find_candidates(&promotion, &model, &mut ctx)?;

        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].id(), "R_T2SS_1");
        assert_eq!(rejected.len(), 1);
        assert_eq!(
            rejected[0].reason,
            "The quorum of genes required (2) is not reached: 1"
        );
        Ok(())
    }

    #[test]
    fn loner_representative_completes_a_multi_loci_system() -> Result<(), anyhow::Error> {
        let model = model_from_json(serde_json::json!({
            "name": "TXSS/T4P",
            "inter_gene_max_space": 5,
            "min_mandatory_genes_required": 1,
            "min_genes_required": 2,
            "multi_loci": true,
            "genes": [
                {"name": "pilB", "presence": "mandatory", "loner": true},
                {"name": "pilT", "presence": "accessory"},
                {"name": "pilQ", "presence": "accessory"}
            ]
        }));
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![
                model_hit(&model, "pilT", "R", 12, 20.0),
                model_hit(&model, "pilQ", "R", 13, 20.0),
            ],
            &model,
        )?;
        let lone = Cluster::new(
            ctx.next_cluster_id(),
            vec![model_hit(&model, "pilB", "R", 500, 10.0)],
            &model,
        )?;

        let promotion = promote(vec![cluster, lone], &model, &mut ctx)?;
        let (systems, _rejected) = find_candidates(&promotion, &model, &mut ctx)?;

        // the cluster alone misses the mandatory quorum; together with the
        // loner representative it forms a system
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].clusters().len(), 2);
        assert!(systems[0]
            .hits()
            .any(|h| h.is_loner() && h.position() == 500));
        Ok(())
    }

    #[test]
    fn combinations_reusing_a_hit_are_skipped() -> Result<(), anyhow::Error> {
        let model = model_from_json(serde_json::json!({
            "name": "TXSS/T3SS",
            "inter_gene_max_space": 5,
            "min_mandatory_genes_required": 1,
            "min_genes_required": 1,
            "multi_loci": true,
            "genes": [
                {"name": "sctN", "presence": "mandatory", "multi_system": true}
            ]
        }));
        let mut ctx = RunContext::default();
        let cluster = Cluster::new(
            ctx.next_cluster_id(),
            vec![model_hit(&model, "sctN", "R", 10, 10.0)],
            &model,
        )?;

        let promotion = promote(vec![cluster], &model, &mut ctx)?;
        let (systems, rejected) = find_candidates(&promotion, &model, &mut ctx)?;

        // the promoted cluster and its representative carry the same hit, so
        // only the single-cluster candidates remain
        assert_eq!(rejected.len(), 0);
        assert!(systems
            .iter()
            .all(|s| s.hits().count() == 1));
        Ok(())
    }
}
