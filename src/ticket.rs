//! Import tickets: one declarative lifecycle action per import-table row.

use crate::error::{ReconcileError, Result};
use crate::evaluation::{self, CheckKind};
use crate::genome::{DescriptionField, GenomeField, Sentinel};
use itertools::Itertools;
use phamrecon_protocol::Evaluation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const REQUIRED_COLUMNS: [&str; 2] = ["type", "phage_id"];
pub const OPTIONAL_COLUMNS: [&str; 11] = [
    "host_genus",
    "cluster",
    "subcluster",
    "accession",
    "annotation_status",
    "annotation_author",
    "retrieve_record",
    "translation_table",
    "name",
    "description_field",
    "run_mode",
];

/// Literal that clears a field instead of setting it.
pub const NONE_KEYWORD: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Add,
    Replace,
    Remove,
    Update,
}

impl FromStr for TicketType {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "replace" => Ok(Self::Replace),
            "remove" => Ok(Self::Remove),
            "update" => Ok(Self::Update),
            other => Err(ReconcileError::invalid_input(format!(
                "Unknown ticket type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
            Self::Update => "update",
        };
        write!(f, "{text}")
    }
}

/// Toggles for the optional check categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalFlags {
    pub check_replace: bool,
    pub check_seq: bool,
    pub check_id_typo: bool,
    pub check_host_typo: bool,
    pub check_author: bool,
    pub check_trna: bool,
    pub check_locus_tag: bool,
    pub check_gene: bool,
    pub check_description: bool,
    pub check_description_field: bool,
}

impl Default for EvalFlags {
    fn default() -> Self {
        Self {
            check_replace: true,
            check_seq: true,
            check_id_typo: true,
            check_host_typo: true,
            check_author: true,
            check_trna: true,
            check_locus_tag: true,
            check_gene: true,
            check_description: true,
            check_description_field: true,
        }
    }
}

/// Named strictness profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Phagesdb,
    Pecaan,
    SeaPhages,
    Misc,
    Custom,
}

impl RunMode {
    pub const ALL: [RunMode; 5] = [
        Self::Phagesdb,
        Self::Pecaan,
        Self::SeaPhages,
        Self::Misc,
        Self::Custom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Phagesdb => "phagesdb",
            Self::Pecaan => "pecaan",
            Self::SeaPhages => "sea_phages",
            Self::Misc => "misc",
            Self::Custom => "custom",
        }
    }

    /// Flags for this profile; `custom` is returned as-is for `Custom`.
    pub fn eval_flags(&self, custom: &EvalFlags) -> EvalFlags {
        let all = EvalFlags::default();
        match self {
            Self::Phagesdb | Self::SeaPhages => all,
            Self::Pecaan => EvalFlags {
                check_locus_tag: false,
                check_description: false,
                check_description_field: false,
                check_author: false,
                ..all
            },
            Self::Misc => EvalFlags {
                check_id_typo: false,
                check_host_typo: false,
                check_author: false,
                check_description: false,
                check_description_field: false,
                ..all
            },
            Self::Custom => *custom,
        }
    }
}

impl FromStr for RunMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == lower)
            .ok_or_else(|| ReconcileError::invalid_input(format!("Unknown run mode '{s}'")))
    }
}

/// Batch-wide defaults a ticket row may override.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicketDefaults {
    pub run_mode: RunMode,
    pub description_field: DescriptionField,
    pub custom_flags: EvalFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub ticket_type: TicketType,
    pub phage_id: String,
    pub data_ticket: BTreeMap<GenomeField, String>,
    pub data_retrieve: BTreeSet<GenomeField>,
    pub data_retain: BTreeSet<GenomeField>,
    pub eval_flags: EvalFlags,
    pub run_mode: RunMode,
    pub description_field: DescriptionField,
    /// The row exactly as read, for re-export.
    pub data_dict: BTreeMap<String, String>,
    #[serde(skip)]
    pub evaluations: Vec<Evaluation>,
}

impl Ticket {
    /// Parses one import-table row. Blank cells are ignored; `none` stands for
    /// an explicitly empty value; `retrieve` and `retain` are sentinels. The
    /// ticket id is the row's `id` column when present, else `row_number`.
    pub fn from_row(
        row_number: usize,
        row: &BTreeMap<String, String>,
        defaults: &TicketDefaults,
    ) -> Result<Self> {
        let cell = |key: &str| row.get(key).map(|v| v.trim()).unwrap_or("");
        let id = match cell("id") {
            "" => row_number.to_string(),
            value => value.to_string(),
        };
        let ticket_type = TicketType::from_str(cell("type"))?;
        let phage_id = cell("phage_id").to_string();

        let run_mode = match cell("run_mode") {
            "" => defaults.run_mode,
            value => RunMode::from_str(value)?,
        };
        let description_field = match cell("description_field") {
            "" => defaults.description_field,
            value => DescriptionField::from_str(value)?,
        };

        let mut data_ticket = BTreeMap::new();
        let mut data_retrieve = BTreeSet::new();
        let mut data_retain = BTreeSet::new();
        for (key, raw) in row {
            let Some(field) = GenomeField::from_name(key) else {
                continue;
            };
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }
            match Sentinel::from_literal(value) {
                Some(Sentinel::Retrieve) => {
                    data_retrieve.insert(field);
                }
                Some(Sentinel::Retain) => {
                    data_retain.insert(field);
                }
                None if value.eq_ignore_ascii_case(NONE_KEYWORD) => {
                    data_ticket.insert(field, String::new());
                }
                None => {
                    data_ticket.insert(field, value.to_string());
                }
            }
        }

        Ok(Self {
            id,
            ticket_type,
            phage_id,
            data_ticket,
            data_retrieve,
            data_retain,
            eval_flags: run_mode.eval_flags(&defaults.custom_flags),
            run_mode,
            description_field,
            data_dict: row.clone(),
            evaluations: vec![],
        })
    }

    pub fn has_data(&self) -> bool {
        !self.data_ticket.is_empty() || !self.data_retrieve.is_empty() || !self.data_retain.is_empty()
    }

    /// Every field named in any provenance set.
    pub fn named_fields(&self) -> BTreeSet<GenomeField> {
        self.data_ticket
            .keys()
            .chain(self.data_retrieve.iter())
            .chain(self.data_retain.iter())
            .copied()
            .collect()
    }

    pub fn add_evaluation(&mut self, evaluation: Evaluation) {
        self.evaluations.push(evaluation);
    }

    pub fn error_count(&self) -> usize {
        self.evaluations.iter().filter(|e| e.is_error()).count()
    }
}

/// Values that occur more than once, sorted.
pub fn find_duplicates<'a>(values: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .filter(|v| !v.is_empty())
        .counts()
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(v, _)| v.to_string())
        .collect()
}

/// Checks that need every ticket of the batch. Runs before any bundle exists.
pub fn check_ticket_batch(tickets: &mut [Ticket]) {
    let id_dupes = find_duplicates(tickets.iter().map(|t| t.id.as_str()));
    let phage_id_dupes = find_duplicates(tickets.iter().map(|t| t.phage_id.as_str()));
    for ticket in tickets.iter_mut() {
        ticket.add_evaluation(evaluation::absent(
            "TKT_001",
            "Check that the ticket id is unique within the batch.",
            &ticket.id.clone(),
            &id_dupes,
            CheckKind::Duplicate,
        ));
        ticket.add_evaluation(evaluation::absent(
            "TKT_002",
            "Check that the phage_id is unique within the batch.",
            &ticket.phage_id.clone(),
            &phage_id_dupes,
            CheckKind::Duplicate,
        ));
    }
}
