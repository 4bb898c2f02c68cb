//! Profile hits and their interpretation under a model.

use std::path::Path;
use std::sync::Arc;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::err::Error;
use crate::model::{GeneId, GeneStatus};

/// A raw profile hit as produced by the similarity search.
///
/// Core hits are immutable and shared between model detections via [`Arc`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, new)]
pub struct CoreHit {
    /// Identifier of the matched sequence.
    pub id: String,
    /// Name of the gene whose profile matched.
    pub gene_name: String,
    /// Name of the replicon the sequence belongs to.
    pub replicon_name: String,
    /// Ordinal rank of the sequence on its replicon.
    pub position: i64,
    /// Length of the matched sequence.
    pub seq_length: i64,
    /// Independent e-value of the match.
    pub i_evalue: f64,
    /// Score of the match.
    pub score: f64,
    /// Fraction of the profile covered by the match.
    pub profile_coverage: f64,
    /// Fraction of the sequence covered by the match.
    pub sequence_coverage: f64,
    /// First matched position on the sequence.
    pub begin_match: i64,
    /// Last matched position on the sequence.
    pub end_match: i64,
}

impl CoreHit {
    /// Natural key identifying this hit across model detections.
    pub fn key(&self) -> HitKey {
        HitKey {
            replicon_name: self.replicon_name.clone(),
            id: self.id.clone(),
            gene_name: self.gene_name.clone(),
            position: self.position,
        }
    }
}

/// Natural key of a [`CoreHit`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitKey {
    /// Name of the replicon.
    pub replicon_name: String,
    /// Identifier of the matched sequence.
    pub id: String,
    /// Name of the gene whose profile matched.
    pub gene_name: String,
    /// Ordinal rank of the sequence on its replicon.
    pub position: i64,
}

/// Promotion state of a hit inside a cluster.
///
/// Promoted variants carry the other hits fulfilling the same function which
/// were not selected as the representative.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HitKind {
    /// An unpromoted hit.
    #[default]
    Plain,
    /// A hit whose gene may count toward several systems.
    MultiSystem {
        /// The other hits fulfilling the same function.
        counterparts: Vec<Arc<CoreHit>>,
    },
    /// A hit extracted from a singleton cluster of a loner gene.
    Loner {
        /// The other hits fulfilling the same function.
        counterparts: Vec<Arc<CoreHit>>,
    },
    /// A hit that is both a loner and multi-system.
    LonerMultiSystem {
        /// The other hits fulfilling the same function.
        counterparts: Vec<Arc<CoreHit>>,
    },
}

/// A hit interpreted in the context of one model.
///
/// `gene_ref` is the gene of the model the hit satisfies; the combination
/// matcher replaces it with the canonical gene when the hit came in through
/// an exchangeable alternate.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHit {
    /// The underlying hit.
    pub hit: Arc<CoreHit>,
    /// The gene of the model this hit satisfies.
    pub gene_ref: GeneId,
    /// Role of the satisfied gene.
    pub status: GeneStatus,
    /// Promotion state of the hit.
    pub kind: HitKind,
}

impl ModelHit {
    /// Create an unpromoted hit.
    pub fn new(hit: Arc<CoreHit>, gene_ref: GeneId, status: GeneStatus) -> Self {
        Self {
            hit,
            gene_ref,
            status,
            kind: HitKind::Plain,
        }
    }

    /// Ordinal position of the hit on its replicon.
    pub fn position(&self) -> i64 {
        self.hit.position
    }

    /// The same hit, reassigned to another gene and role.
    ///
    /// Used by the combination matcher to canonicalize exchangeable hits; the
    /// promotion state is preserved.
    pub fn with_role(&self, gene_ref: GeneId, status: GeneStatus) -> Self {
        Self {
            hit: Arc::clone(&self.hit),
            gene_ref,
            status,
            kind: self.kind.clone(),
        }
    }

    /// Whether the hit was promoted to a loner.
    pub fn is_loner(&self) -> bool {
        matches!(
            self.kind,
            HitKind::Loner { .. } | HitKind::LonerMultiSystem { .. }
        )
    }

    /// Whether the hit was promoted to multi-system.
    pub fn is_multi_system(&self) -> bool {
        matches!(
            self.kind,
            HitKind::MultiSystem { .. } | HitKind::LonerMultiSystem { .. }
        )
    }

    /// The other hits fulfilling the same function, if promoted.
    pub fn counterparts(&self) -> &[Arc<CoreHit>] {
        match &self.kind {
            HitKind::Plain => &[],
            HitKind::MultiSystem { counterparts }
            | HitKind::Loner { counterparts }
            | HitKind::LonerMultiSystem { counterparts } => counterparts,
        }
    }
}

/// Read the hits table (tab separated, `#` comment lines allowed).
///
/// The hits are returned sorted by replicon and position, the best score
/// first within one position.
pub fn load_hits<P: AsRef<Path>>(path: P) -> Result<Vec<Arc<CoreHit>>, anyhow::Error> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| Error::Input(format!("could not open hits table {:?}: {}", path, e)))?;
    let mut hits = Vec::new();
    for record in reader.deserialize() {
        let hit: CoreHit =
            record.map_err(|e| Error::Input(format!("malformed hits table {:?}: {}", path, e)))?;
        hits.push(Arc::new(hit));
    }
    hits.sort_by(|a, b| {
        a.replicon_name
            .cmp(&b.replicon_name)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| b.score.total_cmp(&a.score))
    });
    Ok(hits)
}
