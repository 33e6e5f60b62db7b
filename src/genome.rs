//! Normalized genome and feature records, independent of where they came from.

use crate::error::{ReconcileError, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use phamrecon_protocol::Evaluation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DRAFT_SUFFIX: &str = "_draft";
pub const SINGLETON: &str = "Singleton";
pub const UNKNOWN_CLUSTER: &str = "UNK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strand {
    Forward,
    Reverse,
    Unknown,
}

impl Strand {
    pub fn from_reverse(reverse: bool) -> Self {
        if reverse { Self::Reverse } else { Self::Forward }
    }
}

impl FromStr for Strand {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f" | "forward" | "+" | "1" => Ok(Self::Forward),
            "r" | "reverse" | "-" | "-1" => Ok(Self::Reverse),
            "" | "unknown" | "." | "0" => Ok(Self::Unknown),
            other => Err(ReconcileError::invalid_input(format!("Unknown strand '{other}'"))),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Unknown => "unknown",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationStatus {
    Draft,
    Final,
    #[default]
    Unknown,
}

impl FromStr for AnnotationStatus {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "final" => Ok(Self::Final),
            "unknown" => Ok(Self::Unknown),
            other => Err(ReconcileError::invalid_input(format!(
                "Unknown annotation status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AnnotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Draft => "draft",
            Self::Final => "final",
            Self::Unknown => "unknown",
        };
        write!(f, "{text}")
    }
}

/// Where a genome record was obtained. Validators are chosen by this tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenomeSource {
    Canonical,
    Community,
    Archive,
    #[default]
    Subject,
}

/// Which CDS qualifier supplies the imported description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionField {
    #[default]
    Product,
    Function,
    Note,
}

impl FromStr for DescriptionField {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "function" => Ok(Self::Function),
            "note" => Ok(Self::Note),
            other => Err(ReconcileError::invalid_input(format!(
                "Unknown description field '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DescriptionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Product => "product",
            Self::Function => "function",
            Self::Note => "note",
        };
        write!(f, "{text}")
    }
}

/// Placeholder value marking a field for later resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentinel {
    Retrieve,
    Retain,
}

impl Sentinel {
    pub fn literal(&self) -> &'static str {
        match self {
            Self::Retrieve => "retrieve",
            Self::Retain => "retain",
        }
    }

    pub fn from_literal(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retrieve" => Some(Self::Retrieve),
            "retain" => Some(Self::Retain),
            _ => None,
        }
    }
}

/// Genome fields that can be supplied by a ticket or copied between records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenomeField {
    Name,
    HostGenus,
    Cluster,
    Subcluster,
    Accession,
    AnnotationStatus,
    AnnotationAuthor,
    RetrieveRecord,
    TranslationTable,
}

impl GenomeField {
    pub const ALL: [GenomeField; 9] = [
        Self::Name,
        Self::HostGenus,
        Self::Cluster,
        Self::Subcluster,
        Self::Accession,
        Self::AnnotationStatus,
        Self::AnnotationAuthor,
        Self::RetrieveRecord,
        Self::TranslationTable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::HostGenus => "host_genus",
            Self::Cluster => "cluster",
            Self::Subcluster => "subcluster",
            Self::Accession => "accession",
            Self::AnnotationStatus => "annotation_status",
            Self::AnnotationAuthor => "annotation_author",
            Self::RetrieveRecord => "retrieve_record",
            Self::TranslationTable => "translation_table",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for GenomeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub type ExactKey = (usize, usize, Strand);
pub type EndKey = (usize, Strand);

fn end_key_for(left: usize, right: usize, strand: Strand) -> Option<EndKey> {
    match strand {
        Strand::Forward => Some((right, strand)),
        Strand::Reverse => Some((left, strand)),
        Strand::Unknown => None,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CdsRecord {
    id: String,
    genome_id: String,
    left: usize,
    right: usize,
    strand: Option<Strand>,
    #[serde(default = "one")]
    parts: usize,
    #[serde(default)]
    translation: String,
    #[serde(default)]
    translation_table: u32,
    #[serde(default)]
    product: String,
    #[serde(default)]
    function: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    locus_tag: String,
    #[serde(default)]
    gene: String,
}

fn one() -> usize {
    1
}

/// One coding sequence. Boundaries are 0-based and half-open. Boundaries and
/// strand are fixed at construction so the matching keys never go stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CdsRecord")]
pub struct CdsFeature {
    pub id: String,
    pub genome_id: String,
    left: usize,
    right: usize,
    strand: Strand,
    pub parts: usize,
    pub translation: String,
    pub translation_table: u32,
    pub product: String,
    pub function: String,
    pub note: String,
    pub description: String,
    pub locus_tag: String,
    pub gene: String,
    #[serde(skip)]
    exact_key: ExactKey,
    #[serde(skip)]
    end_key: Option<EndKey>,
    #[serde(skip)]
    pub evaluations: Vec<Evaluation>,
}

impl CdsFeature {
    pub fn new(id: &str, genome_id: &str, left: usize, right: usize, strand: Strand) -> Result<Self> {
        if left >= right {
            return Err(ReconcileError::invalid_input(format!(
                "CDS '{id}' has empty or inverted boundaries {left}..{right}"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            genome_id: genome_id.to_string(),
            left,
            right,
            strand,
            parts: 1,
            translation: String::new(),
            translation_table: 0,
            product: String::new(),
            function: String::new(),
            note: String::new(),
            description: String::new(),
            locus_tag: String::new(),
            gene: String::new(),
            exact_key: (left, right, strand),
            end_key: end_key_for(left, right, strand),
            evaluations: vec![],
        })
    }

    pub fn left(&self) -> usize {
        self.left
    }

    pub fn right(&self) -> usize {
        self.right
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn exact_key(&self) -> ExactKey {
        self.exact_key
    }

    pub fn end_key(&self) -> Option<EndKey> {
        self.end_key
    }

    pub fn len(&self) -> usize {
        self.right - self.left
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinate of the start codon on the coding strand.
    pub fn start_site(&self) -> usize {
        match self.strand {
            Strand::Reverse => self.right,
            _ => self.left,
        }
    }

    pub fn description_value(&self, field: DescriptionField) -> &str {
        match field {
            DescriptionField::Product => &self.product,
            DescriptionField::Function => &self.function,
            DescriptionField::Note => &self.note,
        }
    }

    pub fn set_description(&mut self, field: DescriptionField) {
        self.description = self.description_value(field).trim().to_string();
    }

    /// Alternate description fields that carry text while the chosen one is empty.
    pub fn populated_alternates(&self, chosen: DescriptionField) -> Vec<DescriptionField> {
        if !self.description_value(chosen).trim().is_empty() {
            return vec![];
        }
        [DescriptionField::Product, DescriptionField::Function, DescriptionField::Note]
            .into_iter()
            .filter(|f| *f != chosen && !self.description_value(*f).trim().is_empty())
            .collect()
    }

    pub fn add_evaluation(&mut self, evaluation: Evaluation) {
        self.evaluations.push(evaluation);
    }
}

impl TryFrom<CdsRecord> for CdsFeature {
    type Error = ReconcileError;

    fn try_from(record: CdsRecord) -> Result<Self> {
        let mut cds = CdsFeature::new(
            &record.id,
            &record.genome_id,
            record.left,
            record.right,
            record.strand.unwrap_or(Strand::Unknown),
        )?;
        cds.parts = record.parts;
        cds.translation = record.translation;
        cds.translation_table = record.translation_table;
        cds.product = record.product;
        cds.function = record.function;
        cds.note = record.note;
        cds.description = record.description;
        cds.locus_tag = record.locus_tag;
        cds.gene = record.gene;
        Ok(cds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFeature {
    pub id: String,
    pub genome_id: String,
    pub organism: String,
    pub host: String,
    pub lab_host: String,
    #[serde(skip)]
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrnaFeature {
    pub id: String,
    pub genome_id: String,
    pub left: usize,
    pub right: usize,
    pub strand: Strand,
    pub product: String,
    pub note: String,
    #[serde(skip)]
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SequenceRecord {
    #[serde(default)]
    sequence: String,
    #[serde(default)]
    length: usize,
}

/// Nucleotide sequence plus its length. The length may be known without the
/// sequence (a canonical row fetched without residues); once a sequence is
/// present the two always agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SequenceRecord")]
pub struct GenomeSequence {
    sequence: String,
    length: usize,
}

impl TryFrom<SequenceRecord> for GenomeSequence {
    type Error = ReconcileError;

    fn try_from(record: SequenceRecord) -> Result<Self> {
        if !record.sequence.is_empty() && record.sequence.len() != record.length {
            return Err(ReconcileError::invalid_input(format!(
                "Stored length {} does not match sequence length {}",
                record.length,
                record.sequence.len()
            )));
        }
        let length = if record.sequence.is_empty() {
            record.length
        } else {
            record.sequence.len()
        };
        Ok(Self {
            sequence: record.sequence,
            length,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genome {
    pub id: String,
    pub name: String,
    pub host_genus: String,
    #[serde(flatten)]
    seq: GenomeSequence,
    pub accession: String,
    pub cluster: String,
    pub subcluster: String,
    pub annotation_status: AnnotationStatus,
    pub annotation_author: u8,
    pub retrieve_record: u8,
    pub date: Option<NaiveDate>,
    pub translation_table: u32,
    pub origin: GenomeSource,
    #[serde(default)]
    pub cds: Vec<CdsFeature>,
    #[serde(default)]
    pub source_features: Vec<SourceFeature>,
    #[serde(default)]
    pub trna: Vec<TrnaFeature>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub record_source: String,
    #[serde(default)]
    pub organism: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub filename: String,
    #[serde(skip)]
    pub pending: BTreeMap<GenomeField, Sentinel>,
    #[serde(skip)]
    pub evaluations: Vec<Evaluation>,
}

impl Genome {
    pub fn new(id: &str, origin: GenomeSource) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            origin,
            ..Self::default()
        }
    }

    pub fn sequence(&self) -> &str {
        &self.seq.sequence
    }

    pub fn length(&self) -> usize {
        self.seq.length
    }

    /// Upper-cases and stores `sequence`, updating the length with it.
    pub fn set_sequence(&mut self, sequence: &str) {
        self.seq.sequence = sequence.trim().to_ascii_uppercase();
        self.seq.length = self.seq.sequence.len();
    }

    /// Records a length for a genome whose residues are not loaded.
    pub fn set_length_without_sequence(&mut self, length: usize) -> Result<()> {
        if !self.seq.sequence.is_empty() {
            return Err(ReconcileError::invalid_input(format!(
                "Genome '{}' already has a sequence; its length is derived",
                self.id
            )));
        }
        self.seq.length = length;
        Ok(())
    }

    pub fn has_sequence(&self) -> bool {
        !self.seq.sequence.is_empty()
    }

    pub fn has_features(&self) -> bool {
        !self.cds.is_empty() || !self.source_features.is_empty() || !self.trna.is_empty()
    }

    /// Lower-cased id without a draft suffix; used for typo searches.
    pub fn search_id(&self) -> String {
        remove_draft_suffix(&self.id).to_ascii_lowercase()
    }

    pub fn search_name(&self) -> String {
        remove_draft_suffix(&self.name).to_ascii_lowercase()
    }

    pub fn is_singleton(&self) -> bool {
        self.cluster.eq_ignore_ascii_case(SINGLETON)
    }

    pub fn is_unknown_cluster(&self) -> bool {
        self.cluster.eq_ignore_ascii_case(UNKNOWN_CLUSTER)
    }

    pub fn add_evaluation(&mut self, evaluation: Evaluation) {
        self.evaluations.push(evaluation);
    }

    /// CDS exact keys that occur more than once in this genome.
    pub fn duplicate_cds_keys(&self) -> Vec<ExactKey> {
        self.cds
            .iter()
            .map(|cds| cds.exact_key())
            .counts()
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(key, _)| key)
            .sorted()
            .collect()
    }

    pub fn cds_with_description(&self) -> usize {
        self.cds
            .iter()
            .filter(|cds| !cds.description.trim().is_empty())
            .count()
    }

    /// Picks the description field on every CDS feature.
    pub fn set_cds_descriptions(&mut self, field: DescriptionField) {
        self.cds.iter_mut().for_each(|cds| cds.set_description(field));
    }
}

pub fn remove_draft_suffix(value: &str) -> &str {
    let len = value.len();
    if len > DRAFT_SUFFIX.len() && value.to_ascii_lowercase().ends_with(DRAFT_SUFFIX) {
        &value[..len - DRAFT_SUFFIX.len()]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_follow_strand() {
        let fwd = CdsFeature::new("a", "g", 10, 50, Strand::Forward).unwrap();
        assert_eq!(fwd.exact_key(), (10, 50, Strand::Forward));
        assert_eq!(fwd.end_key(), Some((50, Strand::Forward)));
        let rev = CdsFeature::new("b", "g", 60, 90, Strand::Reverse).unwrap();
        assert_eq!(rev.end_key(), Some((60, Strand::Reverse)));
        assert_eq!(rev.start_site(), 90);
        let unknown = CdsFeature::new("c", "g", 1, 4, Strand::Unknown).unwrap();
        assert_eq!(unknown.end_key(), None);
    }

    #[test]
    fn test_inverted_boundaries_rejected() {
        assert!(CdsFeature::new("a", "g", 50, 10, Strand::Forward).is_err());
        assert!(CdsFeature::new("a", "g", 10, 10, Strand::Forward).is_err());
    }

    #[test]
    fn test_deserialized_cds_recomputes_keys() {
        let json = r#"{"id":"x","genome_id":"g","left":3,"right":30,"strand":"reverse"}"#;
        let cds: CdsFeature = serde_json::from_str(json).unwrap();
        assert_eq!(cds.end_key(), Some((3, Strand::Reverse)));
        assert_eq!(cds.parts, 1);
    }

    #[test]
    fn test_sequence_sets_length() {
        let mut genome = Genome::new("Trixie", GenomeSource::Subject);
        genome.set_sequence("acgtac\n");
        assert_eq!(genome.sequence(), "ACGTAC");
        assert_eq!(genome.length(), 6);
        assert!(genome.set_length_without_sequence(10).is_err());

        let mut bare = Genome::new("L5", GenomeSource::Canonical);
        bare.set_length_without_sequence(52297).unwrap();
        assert_eq!(bare.length(), 52297);
        assert!(!bare.has_sequence());
    }

    #[test]
    fn test_sequence_json_mismatch_rejected() {
        let json = r#"{"id":"x","name":"x","host_genus":"","sequence":"ACG","length":4,
            "accession":"","cluster":"","subcluster":"","annotation_status":"final",
            "annotation_author":1,"retrieve_record":1,"date":null,"translation_table":11,
            "origin":"canonical"}"#;
        assert!(serde_json::from_str::<Genome>(json).is_err());
    }

    #[test]
    fn test_search_id_drops_draft_suffix() {
        let mut genome = Genome::new("Trixie_Draft", GenomeSource::Subject);
        genome.name = "Trixie_Draft".to_string();
        assert_eq!(genome.search_id(), "trixie");
        assert_eq!(genome.search_name(), "trixie");
        assert_eq!(remove_draft_suffix("_draft"), "_draft");
    }

    #[test]
    fn test_duplicate_cds_keys() {
        let mut genome = Genome::new("g", GenomeSource::Subject);
        genome.cds = vec![
            CdsFeature::new("1", "g", 0, 9, Strand::Forward).unwrap(),
            CdsFeature::new("2", "g", 0, 9, Strand::Forward).unwrap(),
            CdsFeature::new("3", "g", 0, 9, Strand::Reverse).unwrap(),
        ];
        assert_eq!(genome.duplicate_cds_keys(), vec![(0, 9, Strand::Forward)]);
    }

    #[test]
    fn test_populated_alternates() {
        let mut cds = CdsFeature::new("1", "g", 0, 9, Strand::Forward).unwrap();
        cds.function = "terminase".to_string();
        assert_eq!(
            cds.populated_alternates(DescriptionField::Product),
            vec![DescriptionField::Function]
        );
        cds.product = "terminase".to_string();
        assert!(cds.populated_alternates(DescriptionField::Product).is_empty());
    }
}
