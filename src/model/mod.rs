//! Macromolecular model definitions: genes, their roles, and the model bank.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::err::Error;

/// Role of a gene within a model.
#[derive(
    Serialize, Deserialize, Display, EnumString, Clone, Copy, Debug, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GeneStatus {
    /// The gene is required by the model.
    Mandatory,
    /// The gene may participate in the model.
    Accessory,
    /// The gene is carried along but does not count toward any quorum.
    Neutral,
    /// The gene must not co-occur with the model.
    Forbidden,
}

/// Identifier of a gene inside its model's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneId(usize);

/// A gene declared by a model.
///
/// Genes live in an arena owned by their [`Model`]; the back reference from an
/// exchangeable alternate to its canonical gene is an arena id, never an
/// owning edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Gene {
    /// Name of the gene; also names the profile it is detected with.
    pub name: String,
    /// Role of the gene in the model.
    pub status: GeneStatus,
    /// Per-gene override of the model's colocalization distance.
    pub inter_gene_max_space: Option<i64>,
    /// Whether the gene may form a cluster on its own.
    pub loner: bool,
    /// Whether hits of this gene may count toward several systems.
    pub multi_system: bool,
    /// Whether declared alternates may stand in for this gene.
    pub exchangeable: bool,
    /// The canonical gene when this gene stands in for another one.
    pub alternate_of: Option<GeneId>,
}

impl Gene {
    /// Whether this gene is an exchangeable alternate of another gene.
    pub fn is_alternate(&self) -> bool {
        self.alternate_of.is_some()
    }
}

/// On-disk form of one gene entry of a model definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneDef {
    /// Gene name.
    pub name: String,
    /// Role of the gene.
    pub presence: GeneStatus,
    /// Whether the gene may form a cluster on its own.
    #[serde(default)]
    pub loner: bool,
    /// Whether hits of this gene may count toward several systems.
    #[serde(default)]
    pub multi_system: bool,
    /// Whether the listed alternates may stand in for this gene.
    #[serde(default)]
    pub exchangeable: bool,
    /// Per-gene override of the model's colocalization distance.
    #[serde(default)]
    pub inter_gene_max_space: Option<i64>,
    /// Names of genes that may stand in for this one.
    #[serde(default)]
    pub alternates: Vec<String>,
}

/// On-disk form of a model definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDef {
    /// Fully qualified model name, e.g. `TXSS/T2SS`.
    pub name: String,
    /// Maximum number of non-matching genes between two colocalizing hits.
    pub inter_gene_max_space: i64,
    /// Quorum of distinct mandatory genes; defaults to the number of
    /// mandatory genes.
    #[serde(default)]
    pub min_mandatory_genes_required: Option<usize>,
    /// Quorum of distinct mandatory plus accessory genes; defaults to the
    /// number of mandatory genes.
    #[serde(default)]
    pub min_genes_required: Option<usize>,
    /// Upper bound on the number of genes of the system.
    #[serde(default)]
    pub max_nb_genes: Option<usize>,
    /// Whether the model may be fulfilled by several loci.
    #[serde(default)]
    pub multi_loci: bool,
    /// The genes of the model.
    pub genes: Vec<GeneDef>,
}

/// A macromolecular model: the genes that must, may, or must not co-occur,
/// and the spatial constraints between them.
#[derive(Debug, Clone)]
pub struct Model {
    fqn: String,
    name: String,
    inter_gene_max_space: i64,
    min_mandatory_genes_required: Option<usize>,
    min_genes_required: Option<usize>,
    max_nb_genes: Option<usize>,
    multi_loci: bool,
    genes: Vec<Gene>,
    by_name: IndexMap<String, GeneId>,
}

impl Model {
    /// Build a model from its on-disk definition.
    pub fn from_def(def: &ModelDef) -> Result<Self, Error> {
        if let (Some(min_genes), Some(min_mandatory)) =
            (def.min_genes_required, def.min_mandatory_genes_required)
        {
            if min_genes < min_mandatory {
                return Err(Error::ModelInconsistency(format!(
                    "{}: min_genes_required '{}' must be greater or equal \
                     than min_mandatory_genes_required '{}'",
                    def.name, min_genes, min_mandatory
                )));
            }
        }

        let name = def
            .name
            .rsplit('/')
            .next()
            .unwrap_or(def.name.as_str())
            .to_owned();
        let mut model = Self {
            fqn: def.name.clone(),
            name,
            inter_gene_max_space: def.inter_gene_max_space,
            min_mandatory_genes_required: def.min_mandatory_genes_required,
            min_genes_required: def.min_genes_required,
            max_nb_genes: def.max_nb_genes,
            multi_loci: def.multi_loci,
            genes: Vec::new(),
            by_name: IndexMap::new(),
        };

        // First the primary genes so that alternates can refer to them.
        for gene_def in &def.genes {
            model.push_gene(Gene {
                name: gene_def.name.clone(),
                status: gene_def.presence,
                inter_gene_max_space: gene_def.inter_gene_max_space,
                loner: gene_def.loner,
                multi_system: gene_def.multi_system,
                exchangeable: gene_def.exchangeable,
                alternate_of: None,
            })?;
        }
        // Alternates inherit role and flags from their canonical gene.
        for gene_def in &def.genes {
            let canonical = model.gene_id(&gene_def.name)?;
            for alternate in &gene_def.alternates {
                let template = model.gene(canonical).clone();
                model.push_gene(Gene {
                    name: alternate.clone(),
                    alternate_of: Some(canonical),
                    ..template
                })?;
            }
        }

        Ok(model)
    }

    fn push_gene(&mut self, gene: Gene) -> Result<GeneId, Error> {
        if self.by_name.contains_key(&gene.name) {
            return Err(Error::ModelInconsistency(format!(
                "gene {} is declared twice in model {}",
                gene.name, self.fqn
            )));
        }
        let id = GeneId(self.genes.len());
        self.by_name.insert(gene.name.clone(), id);
        self.genes.push(gene);
        Ok(id)
    }

    /// Fully qualified name of the model.
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    /// Short name of the model (last segment of the fully qualified name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of non-matching genes between two colocalizing hits.
    pub fn inter_gene_max_space(&self) -> i64 {
        self.inter_gene_max_space
    }

    /// Whether the model may be fulfilled by several loci.
    pub fn multi_loci(&self) -> bool {
        self.multi_loci
    }

    /// Upper bound on the number of genes of the system, if any.
    pub fn max_nb_genes(&self) -> Option<usize> {
        self.max_nb_genes
    }

    /// Quorum of distinct mandatory genes.
    pub fn min_mandatory_genes_required(&self) -> usize {
        self.min_mandatory_genes_required
            .unwrap_or_else(|| self.genes_with_status(GeneStatus::Mandatory).count())
    }

    /// Quorum of distinct mandatory plus accessory genes.
    pub fn min_genes_required(&self) -> usize {
        self.min_genes_required
            .unwrap_or_else(|| self.genes_with_status(GeneStatus::Mandatory).count())
    }

    /// The gene behind an arena id.
    pub fn gene(&self, id: GeneId) -> &Gene {
        &self.genes[id.0]
    }

    /// Look up any declared gene (primary or alternate) by name.
    pub fn gene_id(&self, name: &str) -> Result<GeneId, Error> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchGene {
                model: self.name.clone(),
                gene: name.to_owned(),
            })
    }

    /// Resolve a profile name to the gene the model accepts hits on.
    ///
    /// Primary genes always accept hits; alternates only when their canonical
    /// gene is exchangeable.
    pub fn hit_gene(&self, name: &str) -> Option<GeneId> {
        let id = *self.by_name.get(name)?;
        match self.gene(id).alternate_of {
            None => Some(id),
            Some(canonical) if self.gene(canonical).exchangeable => Some(id),
            Some(_) => None,
        }
    }

    /// The canonical gene of an alternate, or the gene itself.
    pub fn alternate_of(&self, id: GeneId) -> GeneId {
        self.gene(id).alternate_of.unwrap_or(id)
    }

    /// Name of the function a gene fulfills (the canonical gene's name).
    pub fn function_name(&self, id: GeneId) -> &str {
        &self.gene(self.alternate_of(id)).name
    }

    /// Iterate over the primary genes with the given role, in declaration
    /// order.
    pub fn genes_with_status(
        &self,
        status: GeneStatus,
    ) -> impl Iterator<Item = (GeneId, &Gene)> {
        self.genes
            .iter()
            .enumerate()
            .map(|(i, gene)| (GeneId(i), gene))
            .filter(move |(_, gene)| gene.alternate_of.is_none() && gene.status == status)
    }

    /// Map from alternate name to canonical gene id, restricted to
    /// exchangeable genes with the given role.
    pub fn exchangeable_map(&self, status: GeneStatus) -> IndexMap<&str, GeneId> {
        let mut result = IndexMap::new();
        for gene in &self.genes {
            if let Some(canonical) = gene.alternate_of {
                let canonical_gene = self.gene(canonical);
                if canonical_gene.exchangeable && canonical_gene.status == status {
                    result.insert(gene.name.as_str(), canonical);
                }
            }
        }
        result
    }
}

/// Registry of models, keyed by fully qualified name.
#[derive(Debug, Clone, Default)]
pub struct ModelBank {
    models: IndexMap<String, Model>,
}

impl ModelBank {
    /// Register a model.
    pub fn add_model(&mut self, model: Model) -> Result<(), Error> {
        if self.models.contains_key(model.fqn()) {
            return Err(Error::ModelInconsistency(format!(
                "a model named {} is already registered in the models' bank",
                model.fqn()
            )));
        }
        self.models.insert(model.fqn().to_owned(), model);
        Ok(())
    }

    /// Look up a model by fully qualified name.
    pub fn get(&self, fqn: &str) -> Option<&Model> {
        self.models.get(fqn)
    }

    /// Iterate over the registered models in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the bank is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Load model definitions from JSON files, each holding a list of
    /// definitions, and register them all.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, anyhow::Error> {
        let mut bank = Self::default();
        for path in paths {
            let path = path.as_ref();
            let file = std::fs::File::open(path).map_err(|e| {
                Error::Input(format!("could not open model file {:?}: {}", path, e))
            })?;
            let defs: Vec<ModelDef> = serde_json::from_reader(std::io::BufReader::new(file))
                .map_err(|e| {
                    Error::Input(format!("could not parse model file {:?}: {}", path, e))
                })?;
            for def in &defs {
                bank.add_model(Model::from_def(def)?)?;
            }
        }
        Ok(bank)
    }
}
