//! The working set for one ticket: the subject genome, its counterparts, the
//! pairs between them and every evaluation raised along the way.

use crate::error::{ReconcileError, Result};
use crate::evaluation::{self, CheckKind, EvalStatus, Evaluation};
use crate::genome::{AnnotationStatus, Genome, GenomeField};
use crate::genome_pair::{GenomePair, pair_key};
use crate::store::Statement;
use crate::ticket::{Ticket, TicketType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields an update ticket may patch on an existing canonical row.
pub const PATCHABLE_FIELDS: [GenomeField; 7] = [
    GenomeField::HostGenus,
    GenomeField::Cluster,
    GenomeField::Subcluster,
    GenomeField::Accession,
    GenomeField::AnnotationStatus,
    GenomeField::AnnotationAuthor,
    GenomeField::RetrieveRecord,
];

/// Role of a genome within a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenomeKey {
    Subject,
    Canonical,
    Community,
    /// A previously exported record, only used by file comparison.
    Archive,
}

impl fmt::Display for GenomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Subject => "subject",
            Self::Canonical => "canonical",
            Self::Community => "community",
            Self::Archive => "archive",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Parsed,
    ProvenanceResolved,
    StructurallyChecked,
    FieldChecked,
    Committed,
    Rejected,
    Aborted,
}

impl BundleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected | Self::Aborted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: usize,
    pub ticket: Option<Ticket>,
    pub genomes: BTreeMap<GenomeKey, Genome>,
    pub genome_pairs: BTreeMap<String, GenomePair>,
    pub evaluations: Vec<Evaluation>,
    pub filename: Option<String>,
    #[serde(skip)]
    pub statements: Vec<Statement>,
    errors: usize,
    state: BundleState,
}

impl Bundle {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ticket: None,
            genomes: BTreeMap::new(),
            genome_pairs: BTreeMap::new(),
            evaluations: vec![],
            filename: None,
            statements: vec![],
            errors: 0,
            state: BundleState::Parsed,
        }
    }

    pub fn state(&self) -> BundleState {
        self.state
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Moves the bundle forward. Aborting is allowed from any non-terminal
    /// state; every other transition must be strictly forward.
    pub fn advance(&mut self, next: BundleState) -> Result<()> {
        let allowed = if self.state.is_terminal() {
            false
        } else if next == BundleState::Aborted {
            true
        } else {
            next > self.state
        };
        if !allowed {
            return Err(ReconcileError::internal(format!(
                "Bundle {} cannot move from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn ticket_type(&self) -> Option<TicketType> {
        self.ticket.as_ref().map(|t| t.ticket_type)
    }

    pub fn add_evaluation(&mut self, evaluation: Evaluation) {
        self.evaluations.push(evaluation);
    }

    /// Pairs two genomes already in the bundle. A pair is built at most once.
    pub fn set_genome_pair(&mut self, genome1: GenomeKey, genome2: GenomeKey) -> bool {
        let key = pair_key(genome1, genome2);
        if self.genome_pairs.contains_key(&key)
            || !self.genomes.contains_key(&genome1)
            || !self.genomes.contains_key(&genome2)
        {
            return false;
        }
        self.genome_pairs.insert(key, GenomePair::new(genome1, genome2));
        true
    }

    fn check_genome_present(&mut self, key: GenomeKey, expect: bool, eval_id: &str) -> bool {
        let present = self.genomes.contains_key(&key);
        let passed = present == expect;
        let verb = if expect { "present" } else { "absent" };
        self.add_evaluation(evaluation::expect(
            eval_id,
            &format!("Check that the {key} genome is {verb}."),
            passed,
            format!(
                "The {key} genome is {}.",
                if present { "present" } else { "not present" }
            ),
            EvalStatus::Error,
            CheckKind::Structural,
        ));
        passed
    }

    fn check_subject_status(&mut self, forbidden: AnnotationStatus, eval_id: &str) -> bool {
        let status = self.genomes.get(&GenomeKey::Subject).map(|g| g.annotation_status);
        let passed = status != Some(forbidden);
        self.add_evaluation(evaluation::expect(
            eval_id,
            "Check that the ticket type is compatible with the annotation status.",
            passed,
            format!("A {forbidden} genome is not expected on this ticket type."),
            EvalStatus::Error,
            CheckKind::Structural,
        ));
        passed
    }

    /// Confirms the bundle holds exactly the genomes and pairs its ticket type
    /// calls for. Field checks must not run when this returns false.
    pub fn check_bundle(&mut self) -> bool {
        let has_ticket = self.ticket.is_some();
        self.add_evaluation(evaluation::expect(
            "BNDL_001",
            "Check that a ticket is present.",
            has_ticket,
            "No ticket matches this genome.",
            EvalStatus::Error,
            CheckKind::Structural,
        ));
        let Some(ticket) = self.ticket.as_ref() else {
            return false;
        };
        let ticket_type = ticket.ticket_type;
        let needs_community = !ticket.data_retrieve.is_empty();
        let has_data = ticket.has_data();
        let named = ticket.named_fields();

        let mut ok = true;
        match ticket_type {
            TicketType::Add => {
                ok &= self.check_genome_present(GenomeKey::Subject, true, "BNDL_003");
                ok &= self.check_genome_present(GenomeKey::Canonical, false, "BNDL_005");
                ok &= self.check_subject_status(AnnotationStatus::Final, "BNDL_007");
            }
            TicketType::Replace => {
                ok &= self.check_genome_present(GenomeKey::Subject, true, "BNDL_003");
                ok &= self.check_genome_present(GenomeKey::Canonical, true, "BNDL_005");
                let key = pair_key(GenomeKey::Canonical, GenomeKey::Subject);
                let paired = self.genome_pairs.contains_key(&key);
                self.add_evaluation(evaluation::expect(
                    "BNDL_006",
                    "Check that the canonical and subject genomes are paired.",
                    paired,
                    format!("The {key} genome pair is not present."),
                    EvalStatus::Error,
                    CheckKind::Structural,
                ));
                ok &= paired;
                ok &= self.check_subject_status(AnnotationStatus::Draft, "BNDL_007");
            }
            TicketType::Remove => {
                ok &= self.check_genome_present(GenomeKey::Canonical, true, "BNDL_005");
                ok &= self.check_genome_present(GenomeKey::Subject, false, "BNDL_003");
                self.add_evaluation(evaluation::expect(
                    "BNDL_008",
                    "Check that a remove ticket carries no genome data.",
                    !has_data,
                    "A remove ticket must only name the genome.",
                    EvalStatus::Error,
                    CheckKind::Structural,
                ));
                ok &= !has_data;
            }
            TicketType::Update => {
                ok &= self.check_genome_present(GenomeKey::Canonical, true, "BNDL_005");
                ok &= self.check_genome_present(GenomeKey::Subject, true, "BNDL_003");
                let bare = self
                    .genomes
                    .get(&GenomeKey::Subject)
                    .map(|g| !g.has_sequence() && !g.has_features())
                    .unwrap_or(true);
                self.add_evaluation(evaluation::expect(
                    "BNDL_009",
                    "Check that an update carries no sequence or features.",
                    bare,
                    "Sequence and features can only change through a replace ticket.",
                    EvalStatus::Error,
                    CheckKind::Structural,
                ));
                ok &= bare;
                let illegal: Vec<String> = named
                    .iter()
                    .filter(|f| !PATCHABLE_FIELDS.contains(f))
                    .map(|f| f.to_string())
                    .collect();
                let patch_ok = has_data && illegal.is_empty();
                self.add_evaluation(evaluation::expect(
                    "BNDL_010",
                    "Check that an update patches at least one updatable field.",
                    patch_ok,
                    if has_data {
                        format!("Fields that cannot be updated: {}.", illegal.join(", "))
                    } else {
                        "The update ticket carries no data.".to_string()
                    },
                    EvalStatus::Error,
                    CheckKind::Structural,
                ));
                ok &= patch_ok;
            }
        }
        if needs_community {
            ok &= self.check_genome_present(GenomeKey::Community, true, "BNDL_004");
        }
        ok
    }

    /// Counts errors across every entity in the bundle and stores the count.
    pub fn check_for_errors(&mut self) -> usize {
        let mut errors = evaluation::count_status(&self.evaluations, EvalStatus::Error);
        if let Some(ticket) = &self.ticket {
            errors += ticket.error_count();
        }
        for genome in self.genomes.values() {
            errors += evaluation::count_status(&genome.evaluations, EvalStatus::Error);
            errors += genome
                .cds
                .iter()
                .map(|f| evaluation::count_status(&f.evaluations, EvalStatus::Error))
                .sum::<usize>();
            errors += genome
                .source_features
                .iter()
                .map(|f| evaluation::count_status(&f.evaluations, EvalStatus::Error))
                .sum::<usize>();
            errors += genome
                .trna
                .iter()
                .map(|f| evaluation::count_status(&f.evaluations, EvalStatus::Error))
                .sum::<usize>();
        }
        errors += self.genome_pairs.values().map(GenomePair::error_count).sum::<usize>();
        self.errors = errors;
        errors
    }

    pub fn warnings(&self) -> usize {
        self.get_evaluations()
            .values()
            .map(|list| evaluation::count_status(list, EvalStatus::Warning))
            .sum()
    }

    /// Every non-empty evaluation list, keyed by its owner.
    pub fn get_evaluations(&self) -> BTreeMap<String, Vec<Evaluation>> {
        let mut out: BTreeMap<String, Vec<Evaluation>> = BTreeMap::new();
        let mut put = |key: String, list: &[Evaluation]| {
            if !list.is_empty() {
                out.entry(key).or_default().extend_from_slice(list);
            }
        };
        put("bundle".to_string(), &self.evaluations);
        if let Some(ticket) = &self.ticket {
            put("ticket".to_string(), &ticket.evaluations);
        }
        for (key, genome) in &self.genomes {
            put(format!("genome_{key}"), &genome.evaluations);
            for feature in &genome.source_features {
                put(format!("src_{}", feature.id), &feature.evaluations);
            }
            for feature in &genome.cds {
                put(format!("cds_{}", feature.id), &feature.evaluations);
            }
            for feature in &genome.trna {
                put(format!("trna_{}", feature.id), &feature.evaluations);
            }
        }
        for (key, pair) in &self.genome_pairs {
            put(format!("genome_pair_{key}"), &pair.evaluations);
        }
        out
    }

    /// Total number of evaluations below the bundle level.
    pub fn field_evaluation_count(&self) -> usize {
        self.get_evaluations()
            .iter()
            .filter(|(key, _)| key.as_str() != "bundle")
            .map(|(_, list)| list.len())
            .sum()
    }
}
