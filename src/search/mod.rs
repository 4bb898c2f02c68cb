//! Code implementing the `search` sub command: detection of macromolecular
//! systems from a table of profile hits.

pub mod cluster;
pub mod hit;
pub mod matcher;
pub mod output;
pub mod promote;
pub mod scoring;
pub mod system;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use itertools::Itertools;

use crate::common;
use crate::db::{self, DbType, RepliconDb, SequenceIndex, Topology};
use crate::err::Error;
use crate::model::ModelBank;

use self::cluster::{build_clusters, RejectedClusters};
use self::hit::{load_hits, CoreHit, ModelHit};
use self::matcher::find_candidates;
use self::promote::promote;
use self::scoring::{BestSystemSelector, HitWeights};
use self::system::{HitSystemTracker, System};

/// Command line arguments for `search` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Search macromolecular systems in a hits table", long_about = None)]
pub struct Args {
    /// Path to the hits table (TSV).
    #[arg(long, required = true)]
    pub path_hits: String,
    /// Path to the sequence dataset index.
    #[arg(long, required = true)]
    pub path_index: String,
    /// Path to the replicon topology file.
    #[arg(long)]
    pub path_topology: Option<String>,
    /// Paths to model definition JSON files.
    #[arg(long, required = true)]
    pub path_models: Vec<String>,
    /// Path to the output directory.
    #[arg(long, required = true)]
    pub path_output_dir: String,
    /// Layout of the sequence dataset.
    #[arg(long, value_enum, default_value_t = DbType::Gembase)]
    pub db_type: DbType,
    /// Topology assumed for replicons without an entry in the topology file.
    #[arg(long, value_enum, default_value_t = Topology::Linear)]
    pub default_topology: Topology,
    /// Optional path to a JSON file overriding the default hit weights.
    #[arg(long)]
    pub path_weights: Option<String>,
}

/// Deterministic id assignment threaded through one detection run.
#[derive(Debug, Default)]
pub struct RunContext {
    next_cluster_id: u64,
    system_counters: BTreeMap<(String, String), u64>,
}

impl RunContext {
    /// Next unique cluster id.
    pub fn next_cluster_id(&mut self) -> u64 {
        self.next_cluster_id += 1;
        self.next_cluster_id
    }

    /// Next system number for the given replicon and model.
    pub fn next_system_number(&mut self, replicon_name: &str, model_fqn: &str) -> u64 {
        let counter = self
            .system_counters
            .entry((replicon_name.to_owned(), model_fqn.to_owned()))
            .or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Results of a whole detection run.
#[derive(Debug, Default)]
pub struct DetectionResults {
    /// All systems, in deterministic discovery order.
    pub systems: Vec<System>,
    /// All rejected candidates, in deterministic discovery order.
    pub rejected: Vec<RejectedClusters>,
    /// Which systems contain which hit, over all models.
    pub tracker: HitSystemTracker,
    /// The best system(s) per replicon and model.
    pub best: Vec<System>,
}

/// Run the detection pipeline over all replicons and models.
///
/// Replicons and models are visited in lexicographic order so that system
/// ids are stable across runs.
pub fn detect(
    all_hits: &[Arc<CoreHit>],
    replicons: &RepliconDb,
    bank: &ModelBank,
    weights: &HitWeights,
) -> Result<DetectionResults, Error> {
    let mut ctx = RunContext::default();

    let mut hits_by_replicon: BTreeMap<&str, Vec<&Arc<CoreHit>>> = BTreeMap::new();
    for hit in all_hits {
        if replicons.contains(&hit.replicon_name) {
            hits_by_replicon
                .entry(hit.replicon_name.as_str())
                .or_default()
                .push(hit);
        } else {
            tracing::warn!(
                "skipping hit {} on unknown replicon {}",
                hit.id,
                hit.replicon_name
            );
        }
    }
    let models = bank
        .iter()
        .sorted_by(|a, b| a.fqn().cmp(b.fqn()))
        .collect::<Vec<_>>();

    let mut systems = Vec::new();
    let mut rejected = Vec::new();
    for (replicon_name, replicon_hits) in &hits_by_replicon {
        let rep_info = replicons
            .get(replicon_name)
            .expect("only hits on known replicons are collected");
        for model in &models {
            let model_hits = replicon_hits
                .iter()
                .filter_map(|hit| {
                    model.hit_gene(&hit.gene_name).map(|gene_ref| {
                        ModelHit::new(Arc::clone(hit), gene_ref, model.gene(gene_ref).status)
                    })
                })
                .collect::<Vec<_>>();
            if model_hits.is_empty() {
                continue;
            }
            let clusters = build_clusters(model_hits, rep_info, model, &mut ctx)?;
            let promotion = promote(clusters, model, &mut ctx)?;
            let (mut new_systems, mut new_rejected) = find_candidates(&promotion, model, &mut ctx)?;
            tracing::debug!(
                "replicon {} model {}: {} systems, {} rejected candidates",
                replicon_name,
                model.fqn(),
                new_systems.len(),
                new_rejected.len()
            );
            systems.append(&mut new_systems);
            rejected.append(&mut new_rejected);
        }
    }

    let tracker = HitSystemTracker::new(systems.iter());

    let mut groups: BTreeMap<(&str, &str), Vec<&System>> = BTreeMap::new();
    for system in &systems {
        groups
            .entry((system.replicon_name(), system.model_fqn()))
            .or_default()
            .push(system);
    }
    let mut best = Vec::new();
    for ((_replicon_name, model_fqn), group) in groups {
        let model = bank
            .get(model_fqn)
            .expect("systems reference registered models");
        let selector = BestSystemSelector::new(group)?;
        for system in selector.best_systems(model, weights, &tracker)? {
            best.push(system.clone());
        }
    }

    Ok(DetectionResults {
        systems,
        rejected,
        tracker,
        best,
    })
}

fn write_results(
    results: &DetectionResults,
    bank: &ModelBank,
    weights: &HitWeights,
    path_output_dir: &Path,
) -> Result<(), anyhow::Error> {
    std::fs::create_dir_all(path_output_dir)?;
    let header = format!("# macsy-finder {}\n", env!("CARGO_PKG_VERSION"));

    let mut all_text = header.clone();
    if results.systems.is_empty() {
        all_text.push_str("# No systems found\n");
    }
    for system in &results.systems {
        let model = bank
            .get(system.model_fqn())
            .expect("systems reference registered models");
        all_text.push('\n');
        all_text.push_str(&output::system_to_text(
            system,
            model,
            weights,
            &results.tracker,
        )?);
    }
    std::fs::write(path_output_dir.join("all_systems.txt"), all_text)?;

    let mut best_text = header.clone();
    if results.best.is_empty() {
        best_text.push_str("# No systems found\n");
    }
    for system in &results.best {
        let model = bank
            .get(system.model_fqn())
            .expect("systems reference registered models");
        best_text.push('\n');
        best_text.push_str(&output::system_to_text(
            system,
            model,
            weights,
            &results.tracker,
        )?);
    }
    std::fs::write(path_output_dir.join("best_systems.txt"), best_text)?;

    let json = results
        .systems
        .iter()
        .map(output::system_to_json)
        .collect::<Vec<_>>();
    let file = std::fs::File::create(path_output_dir.join("all_systems.json"))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &json)?;

    let mut rejected_text = header;
    if results.rejected.is_empty() {
        rejected_text.push_str("# No clusters rejected\n");
    }
    for rejected in &results.rejected {
        let model = bank
            .get(&rejected.model_fqn)
            .expect("rejected candidates reference registered models");
        rejected_text.push('\n');
        rejected_text.push_str(&output::rejected_to_text(rejected, model));
    }
    std::fs::write(path_output_dir.join("rejected_clusters.txt"), rejected_text)?;

    Ok(())
}

/// Main entry point for the `search` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_run = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let index = SequenceIndex::load(&args.path_index, None)?;
    let topology = match &args.path_topology {
        Some(path) => db::load_topology(path)?,
        None => Default::default(),
    };
    let replicons = RepliconDb::new(&index, &topology, args.db_type, args.default_topology);
    tracing::info!(
        "loaded {} replicons from {}",
        replicons.len(),
        &args.path_index
    );

    let bank = ModelBank::load(&args.path_models)?;
    tracing::info!("registered {} models", bank.len());

    let weights = match &args.path_weights {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| {
                Error::Input(format!("could not open weights file {:?}: {}", path, e))
            })?;
            serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
                Error::Input(format!("could not parse weights file {:?}: {}", path, e))
            })?
        }
        None => HitWeights::default(),
    };

    let all_hits = load_hits(&args.path_hits)?;
    tracing::info!("loaded {} hits from {}", all_hits.len(), &args.path_hits);

    let results = detect(&all_hits, &replicons, &bank, &weights)?;
    tracing::info!(
        "found {} systems ({} best), rejected {} candidates",
        results.systems.len(),
        results.best.len(),
        results.rejected.len()
    );

    write_results(&results, &bank, &weights, Path::new(&args.path_output_dir))?;
    tracing::info!("results written to {}", &args.path_output_dir);
    tracing::info!("... search finished in {:?}", before_run.elapsed());

    Ok(())
}
