//! Access to the sequence dataset: index file, topology file, replicon database.

pub mod index;

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use itertools::Itertools;
use strum_macros::{Display, EnumString};

use crate::err::Error;

/// Name of the single replicon of an `ordered-replicon` dataset.
pub const ORDERED_REPLICON_NAME: &str = "UserReplicon";

/// Topology of a replicon.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, Hash)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum Topology {
    /// The replicon has two ends.
    #[default]
    Linear,
    /// The replicon wraps around its origin.
    Circular,
}

/// Layout of the sequence dataset.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum DbType {
    /// Sequence ids follow the `<replicon>_<sequence>` convention.
    #[default]
    #[strum(serialize = "gembase")]
    Gembase,
    /// The whole dataset is a single ordered replicon.
    #[strum(serialize = "ordered-replicon")]
    OrderedReplicon,
}

/// One record of the sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Sequence identifier.
    pub id: String,
    /// Sequence length.
    pub length: i64,
    /// Ordinal rank of the sequence in the dataset (1-based).
    pub rank: i64,
}

/// The sequence dataset index: path of the indexed FASTA plus one entry per sequence.
///
/// The on-disk format is line based.  The first line is the path of the
/// indexed FASTA file, every following line is `<id>;<length>;<rank>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceIndex {
    /// Path of the indexed FASTA file.
    pub fasta_path: PathBuf,
    /// Index entries in dataset order.
    pub entries: Vec<IndexEntry>,
}

impl SequenceIndex {
    /// Build the index by scanning a FASTA file.
    pub fn build<P: AsRef<Path>>(path_fasta: P) -> Result<Self, anyhow::Error> {
        let reader = bio::io::fasta::Reader::from_file(path_fasta.as_ref())?;
        let mut entries = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            entries.push(IndexEntry {
                id: record.id().to_owned(),
                length: record.seq().len() as i64,
                rank: i as i64 + 1,
            });
        }
        Ok(Self {
            fasta_path: path_fasta.as_ref().to_path_buf(),
            entries,
        })
    }

    /// Write the index file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let mut file = std::fs::File::create(path.as_ref())?;
        writeln!(file, "{}", self.fasta_path.display())?;
        for entry in &self.entries {
            writeln!(file, "{};{};{}", entry.id, entry.length, entry.rank)?;
        }
        Ok(())
    }

    /// Read an index file back.
    ///
    /// When `expected_fasta` is given the index must point to that FASTA file.
    /// Index files in the older headerless format are rejected, they have to
    /// be rebuilt.
    pub fn load<P: AsRef<Path>>(path: P, expected_fasta: Option<&Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Input(format!("could not read index file {:?}: {}", path, e)))?;
        let mut lines = contents.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::Input(format!("index file {:?} is empty", path)))?;
        if header.matches(';').count() == 2 {
            tracing::warn!(
                "the index file {:?} is in the old format, a rebuild is required",
                path
            );
            return Err(Error::Input(format!(
                "index file {:?} is in the old format, rebuild required",
                path
            )));
        }
        let fasta_path = PathBuf::from(header);
        if let Some(expected) = expected_fasta {
            if fasta_path != expected {
                tracing::warn!(
                    "the index file {:?} does not point to {:?}, a rebuild is required",
                    path,
                    expected
                );
                return Err(Error::Input(format!(
                    "index file {:?} does not point to {:?}, rebuild required",
                    path, expected
                )));
            }
        }
        let mut entries = Vec::new();
        for line in lines {
            let mut fields = line.split(';');
            let entry = match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(id), Some(length), Some(rank), None) => IndexEntry {
                    id: id.to_owned(),
                    length: length.parse().map_err(|e| {
                        Error::Input(format!("malformed index line {:?}: {}", line, e))
                    })?,
                    rank: rank.parse().map_err(|e| {
                        Error::Input(format!("malformed index line {:?}: {}", line, e))
                    })?,
                },
                _ => return Err(Error::Input(format!("malformed index line {:?}", line))),
            };
            entries.push(entry);
        }
        Ok(Self {
            fasta_path,
            entries,
        })
    }
}

/// Parse the replicon topology file.
///
/// Lines have the form `<replicon-name> : <topology>`, lines starting with
/// `#` are comments.
pub fn load_topology<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, Topology>, Error> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Input(format!("could not read topology file {:?}: {}", path, e)))?;
    let mut result = IndexMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, topology) = line
            .split_once(':')
            .ok_or_else(|| Error::Input(format!("malformed topology line {:?}", line)))?;
        let topology = topology
            .trim()
            .parse::<Topology>()
            .map_err(|_| Error::Input(format!("unknown replicon topology {:?}", topology.trim())))?;
        result.insert(name.trim().to_owned(), topology);
    }
    Ok(result)
}

/// Information about one replicon of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RepliconInfo {
    /// Topology of the replicon.
    pub topology: Topology,
    /// Smallest ordinal position on the replicon.
    pub min: i64,
    /// Largest ordinal position on the replicon.
    pub max: i64,
    /// Sequence name and length, in replicon order.
    pub genes: Vec<(String, i64)>,
}

/// All replicons of the sequence dataset, in dataset order.
#[derive(Debug, Clone, Default)]
pub struct RepliconDb {
    replicons: IndexMap<String, RepliconInfo>,
}

impl RepliconDb {
    /// Assemble the replicon database from the index, the topology map, and
    /// the default topology.
    pub fn new(
        index: &SequenceIndex,
        topology: &IndexMap<String, Topology>,
        db_type: DbType,
        default_topology: Topology,
    ) -> Self {
        let mut replicons = IndexMap::new();
        match db_type {
            DbType::Gembase => {
                for (name, group) in &index
                    .entries
                    .iter()
                    .group_by(|entry| split_seq_id(&entry.id).0.to_owned())
                {
                    let mut min = i64::MAX;
                    let mut max = i64::MIN;
                    let mut genes = Vec::new();
                    for entry in group {
                        min = min.min(entry.rank);
                        max = max.max(entry.rank);
                        genes.push((split_seq_id(&entry.id).1.to_owned(), entry.length));
                    }
                    let topology = topology.get(&name).copied().unwrap_or(default_topology);
                    replicons.insert(
                        name,
                        RepliconInfo {
                            topology,
                            min,
                            max,
                            genes,
                        },
                    );
                }
            }
            DbType::OrderedReplicon => {
                let genes = index
                    .entries
                    .iter()
                    .map(|entry| (entry.id.clone(), entry.length))
                    .collect::<Vec<_>>();
                let topology = topology
                    .get(ORDERED_REPLICON_NAME)
                    .copied()
                    .unwrap_or(default_topology);
                replicons.insert(
                    ORDERED_REPLICON_NAME.to_owned(),
                    RepliconInfo {
                        topology,
                        min: 1,
                        max: genes.len() as i64,
                        genes,
                    },
                );
            }
        }
        Self { replicons }
    }

    /// Look up a replicon by name.
    pub fn get(&self, name: &str) -> Option<&RepliconInfo> {
        self.replicons.get(name)
    }

    /// Whether a replicon with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.replicons.contains_key(name)
    }

    /// Iterate over `(name, info)` pairs in dataset order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RepliconInfo)> {
        self.replicons.iter()
    }

    /// Number of replicons.
    pub fn len(&self) -> usize {
        self.replicons.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.replicons.is_empty()
    }
}

/// Split a gembase sequence id into replicon name and sequence name.
///
/// The replicon name may itself contain `_` but the sequence name may not.
fn split_seq_id(seq_id: &str) -> (&str, &str) {
    seq_id.rsplit_once('_').unwrap_or((seq_id, seq_id))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn example_index() -> SequenceIndex {
        SequenceIndex {
            fasta_path: PathBuf::from("/data/proteins.fasta"),
            entries: vec![
                IndexEntry {
                    id: "NC_01_001".to_owned(),
                    length: 120,
                    rank: 1,
                },
                IndexEntry {
                    id: "NC_01_002".to_owned(),
                    length: 340,
                    rank: 2,
                },
                IndexEntry {
                    id: "PLASMID_001".to_owned(),
                    length: 220,
                    rank: 3,
                },
            ],
        }
    }

    #[test]
    fn save_then_load_roundtrip() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("proteins.idx");
        let index = example_index();

        index.save(&path)?;
        let loaded = SequenceIndex::load(&path, None)?;

        assert_eq!(index, loaded);
        Ok(())
    }

    #[test]
    fn load_rejects_old_format() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("proteins.idx");
        std::fs::write(&path, "NC_01_001;120;1\nNC_01_002;340;2\n")?;

        let res = SequenceIndex::load(&path, None);

        assert!(matches!(res, Err(Error::Input(msg)) if msg.contains("rebuild required")));
        Ok(())
    }

    #[test]
    fn load_rejects_wrong_fasta() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("proteins.idx");
        example_index().save(&path)?;

        let res = SequenceIndex::load(&path, Some(Path::new("/data/other.fasta")));

        assert!(matches!(res, Err(Error::Input(msg)) if msg.contains("rebuild required")));
        Ok(())
    }

    #[test]
    fn load_rejects_malformed_line() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("proteins.idx");
        std::fs::write(&path, "/data/proteins.fasta\nNC_01_001;not-a-number;1\n")?;

        let res = SequenceIndex::load(&path, None);

        assert!(matches!(res, Err(Error::Input(_))));
        Ok(())
    }

    #[rstest::rstest]
    #[case("chromosome : linear", "chromosome", Topology::Linear)]
    #[case("plasmid:circular", "plasmid", Topology::Circular)]
    #[case("NC_003143 : CIRCULAR", "NC_003143", Topology::Circular)]
    fn topology_lines(
        #[case] line: &str,
        #[case] name: &str,
        #[case] topology: Topology,
    ) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("topology.txt");
        std::fs::write(&path, format!("# a comment\n\n{}\n", line))?;

        let topo = load_topology(&path)?;

        assert_eq!(topo.len(), 1);
        assert_eq!(topo.get(name), Some(&topology));
        Ok(())
    }

    #[test]
    fn topology_rejects_unknown() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("topology.txt");
        std::fs::write(&path, "chromosome : moebius\n")?;

        let res = load_topology(&path);

        assert!(
            matches!(res, Err(Error::Input(msg)) if msg.contains("unknown replicon topology"))
        );
        Ok(())
    }

    #[test]
    fn replicon_db_gembase_grouping() {
        let index = example_index();
        let mut topology = IndexMap::new();
        topology.insert("PLASMID".to_owned(), Topology::Circular);

        let db = RepliconDb::new(&index, &topology, DbType::Gembase, Topology::Linear);

        assert_eq!(db.len(), 2);
        let chrom = db.get("NC_01").expect("replicon NC_01 must exist");
        assert_eq!(chrom.topology, Topology::Linear);
        assert_eq!((chrom.min, chrom.max), (1, 2));
        assert_eq!(
            chrom.genes,
            vec![("001".to_owned(), 120), ("002".to_owned(), 340)]
        );
        let plasmid = db.get("PLASMID").expect("replicon PLASMID must exist");
        assert_eq!(plasmid.topology, Topology::Circular);
        assert_eq!((plasmid.min, plasmid.max), (3, 3));
    }

    #[test]
    fn replicon_db_ordered_replicon() {
        let index = example_index();
        let topology = IndexMap::new();

        let db = RepliconDb::new(
            &index,
            &topology,
            DbType::OrderedReplicon,
            Topology::Circular,
        );

        assert_eq!(db.len(), 1);
        let replicon = db
            .get(ORDERED_REPLICON_NAME)
            .expect("the single replicon must exist");
        assert_eq!(replicon.topology, Topology::Circular);
        assert_eq!((replicon.min, replicon.max), (1, 3));
        assert_eq!(replicon.genes.len(), 3);
    }
}
