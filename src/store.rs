//! Canonical store access.
//!
//! The core talks to the store only through [`CanonicalStore`]. Writes are
//! described as [`Statement`] values so a bundle's changes can be inspected,
//! rendered to SQL, or applied as one transaction.

use crate::error::{ReconcileError, Result};
use crate::genome::{CdsFeature, Genome, GenomeField, GenomeSource};
use crate::provenance;
use crate::ticket::{Ticket, TicketType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum Statement {
    InsertGenome(Box<Genome>),
    InsertCds(Box<CdsFeature>),
    DeleteGenome { phage_id: String },
    UpdateGenome {
        phage_id: String,
        field: GenomeField,
        value: String,
    },
}

fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sql_value(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_string()
    } else {
        sql_quote(value)
    }
}

fn column(field: GenomeField) -> &'static str {
    match field {
        GenomeField::Name => "Name",
        GenomeField::HostGenus => "HostStrain",
        GenomeField::Cluster => "Cluster",
        GenomeField::Subcluster => "Subcluster",
        GenomeField::Accession => "Accession",
        GenomeField::AnnotationStatus => "status",
        GenomeField::AnnotationAuthor => "AnnotationAuthor",
        GenomeField::RetrieveRecord => "RetrieveRecord",
        GenomeField::TranslationTable => "TranslationTable",
    }
}

fn gc_fraction(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence.bytes().filter(|b| matches!(b, b'G' | b'C')).count();
    gc as f64 / sequence.len() as f64
}

impl Statement {
    pub fn phage_id(&self) -> &str {
        match self {
            Self::InsertGenome(genome) => &genome.id,
            Self::InsertCds(cds) => &cds.genome_id,
            Self::DeleteGenome { phage_id } | Self::UpdateGenome { phage_id, .. } => phage_id,
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Self::InsertGenome(g) => format!(
                "INSERT INTO phage (PhageID, Accession, Name, HostStrain, Sequence, \
                 SequenceLength, GC, status, DateLastModified, RetrieveRecord, \
                 AnnotationAuthor, Cluster, Subcluster) VALUES \
                 ({}, {}, {}, {}, {}, {}, {:.4}, {}, {}, {}, {}, {}, {});",
                sql_quote(&g.id),
                sql_quote(&g.accession),
                sql_quote(&g.name),
                sql_quote(&g.host_genus),
                sql_quote(g.sequence()),
                g.length(),
                gc_fraction(g.sequence()),
                sql_quote(&g.annotation_status.to_string()),
                g.date
                    .map(|d| sql_quote(&d.format("%Y-%m-%d").to_string()))
                    .unwrap_or_else(|| "NULL".to_string()),
                g.retrieve_record,
                g.annotation_author,
                sql_value(&g.cluster),
                sql_value(&g.subcluster),
            ),
            Self::InsertCds(c) => format!(
                "INSERT INTO gene (GeneID, PhageID, Start, Stop, Length, Name, TypeID, \
                 translation, Orientation, Notes, LocusTag) VALUES \
                 ({}, {}, {}, {}, {}, {}, 'CDS', {}, {}, {}, {});",
                sql_quote(&c.id),
                sql_quote(&c.genome_id),
                c.left(),
                c.right(),
                c.translation.len(),
                sql_quote(&c.gene),
                sql_quote(&c.translation),
                sql_quote(&c.strand().to_string()),
                sql_quote(&c.description),
                sql_quote(&c.locus_tag),
            ),
            Self::DeleteGenome { phage_id } => {
                format!("DELETE FROM phage WHERE PhageID = {};", sql_quote(phage_id))
            }
            Self::UpdateGenome {
                phage_id,
                field,
                value,
            } => format!(
                "UPDATE phage SET {} = {} WHERE PhageID = {};",
                column(*field),
                sql_value(value),
                sql_quote(phage_id)
            ),
        }
    }
}

/// Builds the writes that realise one ticket for `subject`.
pub fn create_genome_statements(subject: &Genome, ticket: &Ticket) -> Vec<Statement> {
    let mut statements = vec![];
    let insert = |statements: &mut Vec<Statement>| {
        let mut row = subject.clone();
        row.cds.clear();
        row.evaluations.clear();
        statements.push(Statement::InsertGenome(Box::new(row)));
        for cds in &subject.cds {
            let mut cds = cds.clone();
            cds.evaluations.clear();
            statements.push(Statement::InsertCds(Box::new(cds)));
        }
    };
    match ticket.ticket_type {
        TicketType::Add => insert(&mut statements),
        TicketType::Replace => {
            statements.push(Statement::DeleteGenome {
                phage_id: subject.id.clone(),
            });
            insert(&mut statements);
        }
        TicketType::Remove => statements.push(Statement::DeleteGenome {
            phage_id: ticket.phage_id.clone(),
        }),
        TicketType::Update => {
            for field in ticket.named_fields() {
                statements.push(Statement::UpdateGenome {
                    phage_id: subject.id.clone(),
                    field,
                    value: provenance::get_field(subject, field),
                });
            }
        }
    }
    statements
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    Applied,
    RolledBack(String),
}

/// Read and write access to the curated store. An `Err` from any method means
/// the store itself could not be reached.
pub trait CanonicalStore {
    fn snapshot_ids(&self) -> Result<BTreeSet<String>>;
    fn snapshot_sequences(&self) -> Result<BTreeSet<String>>;
    fn snapshot_accessions(&self) -> Result<BTreeSet<String>>;
    fn fetch_genome(&self, id: &str) -> Result<Option<Genome>>;
    /// Applies every statement or none of them.
    fn execute_transaction(&mut self, statements: &[Statement]) -> Result<CommitStatus>;
}

/// Uniqueness sets taken immediately before one bundle is checked.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub ids: BTreeSet<String>,
    pub sequences: BTreeSet<String>,
    pub accessions: BTreeSet<String>,
}

impl StoreSnapshot {
    pub fn take(store: &dyn CanonicalStore) -> Result<Self> {
        Ok(Self {
            ids: store.snapshot_ids()?,
            sequences: store.snapshot_sequences()?,
            accessions: store.snapshot_accessions()?,
        })
    }
}

/// A store held in memory and optionally persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    pub genomes: BTreeMap<String, Genome>,
    #[serde(skip)]
    read_only: bool,
    #[serde(skip)]
    offline: bool,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genomes(genomes: impl IntoIterator<Item = Genome>) -> Self {
        Self {
            genomes: genomes.into_iter().map(|g| (g.id.clone(), g)).collect(),
            ..Self::default()
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::io(format!("Could not read store file '{}': {e}", path.display()))
        })?;
        let mut store: Self = serde_json::from_str(&text).map_err(|e| {
            ReconcileError::parse(format!("Could not parse store JSON '{}': {e}", path.display()))
        })?;
        store.genomes.values_mut().for_each(|g| g.origin = GenomeSource::Canonical);
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ReconcileError::internal(format!("Could not serialize store: {e}")))?;
        std::fs::write(path, text).map_err(|e| {
            ReconcileError::io(format!("Could not write store file '{}': {e}", path.display()))
        })
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Simulates losing the connection; every call then fails.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline {
            return Err(ReconcileError::store_unavailable("The canonical store is offline"));
        }
        Ok(())
    }

    fn apply(genomes: &mut BTreeMap<String, Genome>, statement: &Statement) -> std::result::Result<(), String> {
        match statement {
            Statement::InsertGenome(genome) => {
                if genomes.contains_key(&genome.id) {
                    return Err(format!("Duplicate PhageID '{}'", genome.id));
                }
                let mut genome = genome.as_ref().clone();
                genome.origin = GenomeSource::Canonical;
                genomes.insert(genome.id.clone(), genome);
            }
            Statement::InsertCds(cds) => {
                let genome = genomes
                    .get_mut(&cds.genome_id)
                    .ok_or_else(|| format!("No phage row '{}' for gene '{}'", cds.genome_id, cds.id))?;
                if genome.cds.iter().any(|c| c.id == cds.id) {
                    return Err(format!("Duplicate GeneID '{}'", cds.id));
                }
                genome.cds.push(cds.as_ref().clone());
            }
            Statement::DeleteGenome { phage_id } => {
                genomes
                    .remove(phage_id)
                    .ok_or_else(|| format!("No phage row '{phage_id}' to delete"))?;
            }
            Statement::UpdateGenome {
                phage_id,
                field,
                value,
            } => {
                let genome = genomes
                    .get_mut(phage_id)
                    .ok_or_else(|| format!("No phage row '{phage_id}' to update"))?;
                provenance::set_field(genome, *field, value).map_err(|e| e.message)?;
            }
        }
        Ok(())
    }
}

impl CanonicalStore for MemoryStore {
    fn snapshot_ids(&self) -> Result<BTreeSet<String>> {
        self.ensure_online()?;
        Ok(self.genomes.keys().cloned().collect())
    }

    fn snapshot_sequences(&self) -> Result<BTreeSet<String>> {
        self.ensure_online()?;
        Ok(self
            .genomes
            .values()
            .filter(|g| g.has_sequence())
            .map(|g| g.sequence().to_string())
            .collect())
    }

    fn snapshot_accessions(&self) -> Result<BTreeSet<String>> {
        self.ensure_online()?;
        Ok(self
            .genomes
            .values()
            .filter(|g| !g.accession.is_empty())
            .map(|g| g.accession.clone())
            .collect())
    }

    fn fetch_genome(&self, id: &str) -> Result<Option<Genome>> {
        self.ensure_online()?;
        Ok(self.genomes.get(id).map(|g| {
            let mut genome = g.clone();
            genome.origin = GenomeSource::Canonical;
            genome
        }))
    }

    fn execute_transaction(&mut self, statements: &[Statement]) -> Result<CommitStatus> {
        self.ensure_online()?;
        if self.read_only {
            return Ok(CommitStatus::RolledBack("The store is read-only".to_string()));
        }
        let mut working = self.genomes.clone();
        for statement in statements {
            if let Err(reason) = Self::apply(&mut working, statement) {
                tracing::warn!(statement = %statement.to_sql(), "Rolling back: {reason}");
                return Ok(CommitStatus::RolledBack(reason));
            }
        }
        self.genomes = working;
        if let Some(path) = self.path.clone() {
            self.save_to_path(&path)?;
        }
        Ok(CommitStatus::Applied)
    }
}
