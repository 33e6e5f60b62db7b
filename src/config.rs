use crate::community::DEFAULT_API_URL;
use crate::error::{ReconcileError, Result};
use crate::flat_file::{GenbankParser, GenomeIdField, HostGenusField};
use crate::genome::DescriptionField;
use crate::ticket::{EvalFlags, RunMode, TicketDefaults};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CURATOR: &str = "hatfull";
pub const DEFAULT_TRANSLATION_TABLE: u32 = 11;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub run_mode: RunMode,
    /// Only consulted when `run_mode` is `custom`.
    pub eval_flags: EvalFlags,
    pub description_field: DescriptionField,
    pub prod_run: bool,
    pub genome_id_field: GenomeIdField,
    pub host_genus_field: HostGenusField,
    /// Surname expected among the authors of curator-annotated genomes.
    pub curator: String,
    pub translation_table: u32,
    pub community_base_url: String,
    pub output_folder: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            eval_flags: EvalFlags::default(),
            description_field: DescriptionField::default(),
            prod_run: false,
            genome_id_field: GenomeIdField::default(),
            host_genus_field: HostGenusField::default(),
            curator: DEFAULT_CURATOR.to_string(),
            translation_table: DEFAULT_TRANSLATION_TABLE,
            community_base_url: DEFAULT_API_URL.to_string(),
            output_folder: PathBuf::from("."),
        }
    }
}

impl ImportConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::io(format!("Could not read config file '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ReconcileError::invalid_input(format!(
                "Could not parse config JSON '{}': {e}",
                path.display()
            ))
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ReconcileError::internal(format!("Could not serialize config: {e}")))?;
        std::fs::write(path, text).map_err(|e| {
            ReconcileError::io(format!("Could not write config file '{}': {e}", path.display()))
        })
    }

    pub fn ticket_defaults(&self) -> TicketDefaults {
        TicketDefaults {
            run_mode: self.run_mode,
            description_field: self.description_field,
            custom_flags: self.eval_flags,
        }
    }

    pub fn parser(&self) -> GenbankParser {
        GenbankParser {
            genome_id_field: self.genome_id_field,
            host_genus_field: self.host_genus_field,
            description_field: self.description_field,
        }
    }
}
