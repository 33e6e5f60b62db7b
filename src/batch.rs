//! Batch driver: turns import-table rows and flat files into bundles, checks
//! them one at a time against a fresh store snapshot and commits or rejects
//! each one.

use crate::bundle::{Bundle, BundleState, GenomeKey};
use crate::community::{CommunityClient, ReferenceSets};
use crate::config::{DEFAULT_CURATOR, DEFAULT_TRANSLATION_TABLE, ImportConfig};
use crate::error::{ReconcileError, Result};
use crate::evaluation::{self, CheckKind, EvalStatus, Evaluation};
use crate::flat_file::RecordParser;
use crate::genome::{CdsFeature, DescriptionField, Genome, GenomeSource};
use crate::genome_pair::{CompareOptions, GenomePair};
use crate::import_table::{Row, write_ticket_table};
use crate::matcher::MatchTally;
use crate::provenance;
use crate::store::{CanonicalStore, CommitStatus, Statement, StoreSnapshot, create_genome_statements};
use crate::ticket::{EvalFlags, Ticket, TicketType, check_ticket_batch};
use crate::validator::{self, CheckContext, GenomeScope};
use phamrecon_protocol::{BatchReport, BundleReport, TicketOutcome};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SUCCESS_FOLDER: &str = "success";
pub const FAIL_FOLDER: &str = "fail";
pub const GENOMES_FOLDER: &str = "genomes";
pub const TICKET_TABLE_NAME: &str = "import_tickets.csv";
pub const REPORT_NAME: &str = "import_report.json";

/// Writes that realise the bundle's ticket. Remove tickets act on the
/// canonical genome, every other type on the subject.
pub fn statements_for(bundle: &Bundle) -> Vec<Statement> {
    let Some(ticket) = &bundle.ticket else {
        return vec![];
    };
    let target = match ticket.ticket_type {
        TicketType::Remove => GenomeKey::Canonical,
        _ => GenomeKey::Subject,
    };
    bundle
        .genomes
        .get(&target)
        .map(|genome| create_genome_statements(genome, ticket))
        .unwrap_or_default()
}

/// Commits a checked bundle. Returns true iff the bundle has no errors and,
/// when `prod_run` is set, the transaction was applied.
pub fn import_into_db(bundle: &mut Bundle, store: &mut dyn CanonicalStore, prod_run: bool) -> Result<bool> {
    let errors = bundle.check_for_errors();
    if errors > 0 {
        tracing::info!(bundle = bundle.id, errors, "Bundle rejected");
        bundle.advance(BundleState::Rejected)?;
        return Ok(false);
    }
    bundle.statements = statements_for(bundle);
    if !prod_run {
        tracing::info!(
            bundle = bundle.id,
            statements = bundle.statements.len(),
            "Bundle validated (dry run, nothing written)"
        );
        return Ok(true);
    }
    match store.execute_transaction(&bundle.statements)? {
        CommitStatus::Applied => {
            tracing::info!(bundle = bundle.id, statements = bundle.statements.len(), "Bundle committed");
            bundle.advance(BundleState::Committed)?;
            Ok(true)
        }
        CommitStatus::RolledBack(reason) => {
            bundle.add_evaluation(evaluation::error(
                "BNDL_012",
                "Check that the bundle was written to the database.",
                format!("The transaction was rolled back: {reason}"),
                CheckKind::Commit,
            ));
            bundle.check_for_errors();
            bundle.advance(BundleState::Rejected)?;
            Ok(false)
        }
    }
}

fn outcome_of(bundle: &Bundle) -> TicketOutcome {
    match bundle.state() {
        BundleState::Committed => TicketOutcome::Committed,
        BundleState::Aborted => TicketOutcome::Aborted,
        BundleState::FieldChecked if bundle.errors() == 0 => TicketOutcome::Validated,
        _ => TicketOutcome::Rejected,
    }
}

fn abort_bundle(bundle: &mut Bundle) {
    if bundle.state().is_terminal() {
        return;
    }
    if let Err(e) = bundle.advance(BundleState::Aborted) {
        tracing::warn!(bundle = bundle.id, "{e}");
    }
}

struct Entry {
    bundle: Bundle,
    source: Option<PathBuf>,
    abort_reason: Option<String>,
}

impl Entry {
    fn report(&self) -> BundleReport {
        let bundle = &self.bundle;
        let ticket = bundle.ticket.as_ref();
        BundleReport {
            bundle_id: bundle.id,
            ticket_id: ticket.map(|t| t.id.clone()),
            phage_id: ticket.map(|t| t.phage_id.clone()),
            ticket_type: ticket.map(|t| t.ticket_type.to_string()),
            filename: bundle.filename.clone(),
            outcome: outcome_of(bundle),
            errors: bundle.errors(),
            warnings: bundle.warnings(),
            abort_reason: self.abort_reason.clone(),
            evaluations: bundle.get_evaluations(),
        }
    }
}

/// Everything a finished batch produced.
pub struct BatchRun {
    pub report: BatchReport,
    entries: Vec<Entry>,
}

impl BatchRun {
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.entries.iter().map(|e| &e.bundle)
    }

    pub fn bundle(&self, id: usize) -> Option<&Bundle> {
        self.entries.get(id).map(|e| &e.bundle)
    }

    /// Writes `success/` and `fail/` folders, each with the tickets in
    /// import-table form and a copy of their flat files, plus the JSON report.
    pub fn write_results(&self, output_folder: &Path) -> Result<()> {
        for (folder_name, success) in [(SUCCESS_FOLDER, true), (FAIL_FOLDER, false)] {
            let selected: Vec<&Entry> = self
                .entries
                .iter()
                .filter(|e| outcome_of(&e.bundle).is_success() == success)
                .collect();
            if selected.is_empty() {
                continue;
            }
            let folder = output_folder.join(folder_name);
            std::fs::create_dir_all(&folder)?;
            let tickets: Vec<&Ticket> = selected.iter().filter_map(|e| e.bundle.ticket.as_ref()).collect();
            if !tickets.is_empty() {
                write_ticket_table(&folder.join(TICKET_TABLE_NAME), &tickets)?;
            }
            let genomes = folder.join(GENOMES_FOLDER);
            for source in selected.iter().filter_map(|e| e.source.as_ref()) {
                let Some(name) = source.file_name() else {
                    continue;
                };
                std::fs::create_dir_all(&genomes)?;
                std::fs::copy(source, genomes.join(name)).map_err(|e| {
                    ReconcileError::io(format!("Could not copy '{}': {e}", source.display()))
                })?;
            }
        }
        let text = serde_json::to_string_pretty(&self.report)?;
        std::fs::write(output_folder.join(REPORT_NAME), text)?;
        Ok(())
    }
}

/// Parses every file in parallel. Parsing touches no shared state, so the
/// order of results follows `files`.
fn prefetch(parser: &dyn RecordParser, files: &[PathBuf]) -> Vec<(PathBuf, Result<Option<Genome>>)> {
    files
        .par_iter()
        .map(|path| {
            let parsed = parser.parse(path).map(|genome| {
                genome.map(|mut genome| {
                    let duplicates = validator::check_duplicate_features(&genome);
                    genome.add_evaluation(duplicates);
                    genome
                })
            });
            (path.clone(), parsed)
        })
        .collect()
}

fn take_ticket(open: &mut [Option<Ticket>], phage_id: &str) -> Option<Ticket> {
    open.iter_mut()
        .find(|slot| slot.as_ref().map(|t| t.phage_id == phage_id).unwrap_or(false))
        .and_then(Option::take)
}

/// Pairs parsed files with tickets. Tickets left over become ticket-only
/// bundles; an update gets a bare subject built from its ticket.
fn assemble(tickets: Vec<Ticket>, parsed: Vec<(PathBuf, Result<Option<Genome>>)>) -> Vec<Entry> {
    let mut open: Vec<Option<Ticket>> = tickets.into_iter().map(Some).collect();
    let mut entries = vec![];
    for (path, parsed) in parsed {
        let mut bundle = Bundle::new(entries.len());
        bundle.filename = path.file_name().map(|n| n.to_string_lossy().to_string());
        let mut abort_reason = None;
        match parsed {
            Ok(Some(genome)) => {
                bundle.ticket = take_ticket(&mut open, &genome.id);
                bundle.genomes.insert(GenomeKey::Subject, genome);
            }
            Ok(None) => bundle.add_evaluation(evaluation::error(
                "BNDL_002",
                "Check that the flat file holds a genome record.",
                "The file holds no record.",
                CheckKind::Structural,
            )),
            Err(e) => {
                tracing::error!(file = %path.display(), "Could not parse flat file: {e}");
                abort_reason = Some(e.to_string());
                abort_bundle(&mut bundle);
            }
        }
        entries.push(Entry {
            bundle,
            source: Some(path),
            abort_reason,
        });
    }
    for ticket in open.into_iter().flatten() {
        let mut bundle = Bundle::new(entries.len());
        if ticket.ticket_type == TicketType::Update {
            bundle.genomes.insert(
                GenomeKey::Subject,
                Genome::new(&ticket.phage_id, GenomeSource::Subject),
            );
        }
        bundle.ticket = Some(ticket);
        entries.push(Entry {
            bundle,
            source: None,
            abort_reason: None,
        });
    }
    entries
}

/// Owns the collaborator handles for one import run.
pub struct BatchDriver<'a> {
    store: &'a mut dyn CanonicalStore,
    community: &'a dyn CommunityClient,
    parser: &'a dyn RecordParser,
    config: &'a ImportConfig,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        store: &'a mut dyn CanonicalStore,
        community: &'a dyn CommunityClient,
        parser: &'a dyn RecordParser,
        config: &'a ImportConfig,
    ) -> Self {
        Self {
            store,
            community,
            parser,
            config,
        }
    }

    /// Runs the whole batch. Only a malformed import table fails the call;
    /// everything else is reported per ticket.
    pub fn run(&mut self, rows: &[Row], files: &[PathBuf]) -> Result<BatchRun> {
        let defaults = self.config.ticket_defaults();
        let mut tickets = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Ticket::from_row(i + 1, row, &defaults).map_err(|e| {
                    ReconcileError::invalid_input(format!("Import table row {}: {}", i + 1, e.message))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        check_ticket_batch(&mut tickets);
        let mut report = BatchReport::new(self.config.prod_run);
        report.batch_evaluations = tickets
            .iter()
            .flat_map(|t| t.evaluations.iter().filter(|e| e.is_error()).cloned())
            .collect();
        tracing::info!(
            tickets = tickets.len(),
            files = files.len(),
            prod_run = self.config.prod_run,
            "Starting import batch"
        );

        let references = self.community.reference_sets();
        if !references.is_available() {
            tracing::warn!("Community reference values are unavailable");
        }

        let mut entries = assemble(tickets, prefetch(self.parser, files));
        let mut batch_abort: Option<String> = None;
        for entry in entries.iter_mut() {
            if let Some(reason) = &batch_abort {
                abort_bundle(&mut entry.bundle);
                entry.abort_reason = Some(reason.clone());
                continue;
            }
            if entry.bundle.state().is_terminal() {
                continue;
            }
            if let Err(e) = self.process_bundle(&mut entry.bundle, &references) {
                if e.aborts_batch() {
                    tracing::error!(bundle = entry.bundle.id, "Aborting the remaining batch: {e}");
                    batch_abort = Some(e.to_string());
                } else {
                    tracing::error!(bundle = entry.bundle.id, "Bundle aborted: {e}");
                }
                abort_bundle(&mut entry.bundle);
                entry.abort_reason = Some(e.to_string());
            }
            evaluation::log_evaluations(entry.bundle.id, &entry.bundle.get_evaluations());
        }

        report.abort_reason = batch_abort;
        report.bundles = entries.iter().map(Entry::report).collect();
        tracing::info!(outcomes = ?report.outcome_tally(), "Import batch finished");
        Ok(BatchRun { report, entries })
    }

    fn process_bundle(&mut self, bundle: &mut Bundle, references: &ReferenceSets) -> Result<()> {
        if let Some(ticket) = bundle.ticket.clone() {
            // An add relies on the id snapshot, not on a canonical counterpart.
            if ticket.ticket_type != TicketType::Add {
                if let Some(canonical) = self.store.fetch_genome(&ticket.phage_id)? {
                    bundle.genomes.insert(GenomeKey::Canonical, canonical);
                }
            }
            if !ticket.data_retrieve.is_empty() {
                match self.community.fetch_genome(&ticket.phage_id) {
                    Some(genome) => {
                        bundle.genomes.insert(GenomeKey::Community, genome);
                    }
                    None => tracing::warn!(
                        bundle = bundle.id,
                        phage_id = %ticket.phage_id,
                        "No community record to retrieve from"
                    ),
                }
            }
            if let Some(mut subject) = bundle.genomes.remove(&GenomeKey::Subject) {
                subject.set_cds_descriptions(ticket.description_field);
                let failures = provenance::resolve(
                    &mut subject,
                    &ticket,
                    bundle.genomes.get(&GenomeKey::Community),
                    bundle.genomes.get(&GenomeKey::Canonical),
                );
                bundle.genomes.insert(GenomeKey::Subject, subject);
                for failure in failures {
                    bundle.add_evaluation(failure);
                }
            }
        }
        bundle.advance(BundleState::ProvenanceResolved)?;
        if bundle.ticket_type() == Some(TicketType::Replace) {
            bundle.set_genome_pair(GenomeKey::Canonical, GenomeKey::Subject);
        }

        let snapshot = StoreSnapshot::take(&*self.store)?;
        let ctx = CheckContext {
            snapshot: &snapshot,
            references,
            curator: &self.config.curator,
            translation_table: self.config.translation_table,
        };
        let errors = validator::run_checks(bundle, &ctx)?;
        tracing::debug!(bundle = bundle.id, errors, "Checks complete");
        import_into_db(bundle, &mut *self.store, self.config.prod_run)?;
        Ok(())
    }
}

/// Result of matching the CDS features of two flat files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub genome1: String,
    pub genome2: String,
    pub tally: MatchTally,
    pub errors: usize,
    pub warnings: usize,
    pub only_in_genome1: Vec<String>,
    pub only_in_genome2: Vec<String>,
    pub evaluations: Vec<Evaluation>,
}

fn describe_cds(cds: &CdsFeature) -> String {
    format!("{}..{} ({})", cds.left(), cds.right(), cds.strand())
}

/// Compares an archived record with a new one: archive checks on the first,
/// then genome and feature comparison.
pub fn compare_files(
    parser: &dyn RecordParser,
    archive: &Path,
    subject: &Path,
    description_field: DescriptionField,
) -> Result<ComparisonSummary> {
    let load = |path: &Path, origin: GenomeSource| -> Result<Genome> {
        let mut genome = parser
            .parse(path)?
            .ok_or_else(|| ReconcileError::not_found(format!("No record in '{}'", path.display())))?;
        genome.origin = origin;
        Ok(genome)
    };
    let genome1 = load(archive, GenomeSource::Archive)?;
    let genome2 = load(subject, GenomeSource::Subject)?;

    let snapshot = StoreSnapshot::default();
    let references = ReferenceSets::default();
    let ctx = CheckContext {
        snapshot: &snapshot,
        references: &references,
        curator: DEFAULT_CURATOR,
        translation_table: DEFAULT_TRANSLATION_TABLE,
    };
    let scope = GenomeScope {
        ticket_type: TicketType::Replace,
        flags: EvalFlags::default(),
        description_field,
        ticket: None,
        ctx: &ctx,
    };
    let mut evaluations = validator::validator_for(genome1.origin)(&genome1, &scope);

    let mut pair = GenomePair::new(GenomeKey::Archive, GenomeKey::Subject);
    pair.compare(
        &genome1,
        &genome2,
        &CompareOptions {
            check_replace: false,
            compare_features: true,
            description_field,
        },
    );
    evaluations.extend(pair.evaluations);
    let matched = pair.feature_match.unwrap_or_default();

    Ok(ComparisonSummary {
        genome1: genome1.id.clone(),
        genome2: genome2.id.clone(),
        tally: matched.tally(),
        errors: evaluation::count_status(&evaluations, EvalStatus::Error),
        warnings: evaluation::count_status(&evaluations, EvalStatus::Warning),
        only_in_genome1: matched.a_only.iter().map(|i| describe_cds(&genome1.cds[*i])).collect(),
        only_in_genome2: matched.b_only.iter().map(|i| describe_cds(&genome2.cds[*i])).collect(),
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::OfflineCommunity;
    use crate::flat_file::GenbankParser;
    use crate::genome::{AnnotationStatus, Strand};
    use crate::import_table::read_import_table;
    use crate::store::MemoryStore;
    use std::collections::BTreeMap;
    use tempfile::{TempDir, tempdir};

    /// Serves genomes by file name; unknown names fail to parse.
    struct StubParser(BTreeMap<String, Option<Genome>>);

    impl RecordParser for StubParser {
        fn parse(&self, path: &Path) -> Result<Option<Genome>> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.0
                .get(&name)
                .cloned()
                .ok_or_else(|| ReconcileError::parse(format!("Unreadable file '{name}'")))
        }
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn commit_config() -> ImportConfig {
        ImportConfig {
            prod_run: true,
            ..ImportConfig::default()
        }
    }

    fn store_with_l5() -> MemoryStore {
        MemoryStore::with_genomes([Genome::new("L5", GenomeSource::Canonical)])
    }

    #[test]
    fn test_unmatched_file_and_ticket_are_rejected() {
        let mut store = MemoryStore::new();
        let parser = StubParser(
            [(
                "L5.gb".to_string(),
                Some(Genome::new("L5", GenomeSource::Subject)),
            )]
            .into_iter()
            .collect(),
        );
        let config = commit_config();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let rows = [row(&[("type", "add"), ("phage_id", "Trixie")])];
        let run = driver.run(&rows, &[PathBuf::from("L5.gb")]).unwrap();

        assert_eq!(run.report.count(TicketOutcome::Rejected), 2);
        let file_bundle = run.bundle(0).unwrap();
        assert!(file_bundle.ticket.is_none());
        assert!(file_bundle.evaluations.iter().any(|e| e.id == "BNDL_001" && e.is_error()));
        let ticket_bundle = run.bundle(1).unwrap();
        assert!(ticket_bundle.evaluations.iter().any(|e| e.id == "BNDL_003" && e.is_error()));
        assert_eq!(ticket_bundle.field_evaluation_count(), 2);
    }

    #[test]
    fn test_parse_failure_aborts_only_that_bundle() {
        let mut store = store_with_l5();
        let parser = StubParser(BTreeMap::new());
        let config = commit_config();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let rows = [row(&[("type", "remove"), ("phage_id", "L5")])];
        let run = driver.run(&rows, &[PathBuf::from("broken.gb")]).unwrap();

        let outcomes: Vec<TicketOutcome> = run.report.bundles.iter().map(|b| b.outcome).collect();
        assert_eq!(outcomes, vec![TicketOutcome::Aborted, TicketOutcome::Committed]);
        assert!(run.report.bundles[0].abort_reason.is_some());
        assert!(run.report.abort_reason.is_none());
        assert!(!store.genomes.contains_key("L5"));
    }

    #[test]
    fn test_unreachable_store_aborts_remaining_tickets() {
        let mut store = store_with_l5();
        store.set_offline(true);
        let parser = StubParser(BTreeMap::new());
        let config = commit_config();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let rows = [
            row(&[("type", "remove"), ("phage_id", "L5")]),
            row(&[("type", "remove"), ("phage_id", "D29")]),
        ];
        let run = driver.run(&rows, &[]).unwrap();

        assert_eq!(run.report.count(TicketOutcome::Aborted), 2);
        assert!(run.report.abort_reason.is_some());
        assert!(run.report.bundles.iter().all(|b| b.abort_reason.is_some()));
    }

    #[test]
    fn test_dry_run_validates_without_writing() {
        let mut store = store_with_l5();
        let parser = StubParser(BTreeMap::new());
        let config = ImportConfig::default();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let run = driver
            .run(&[row(&[("type", "remove"), ("phage_id", "L5")])], &[])
            .unwrap();

        assert_eq!(run.report.bundles[0].outcome, TicketOutcome::Validated);
        assert_eq!(run.bundle(0).unwrap().statements.len(), 1);
        assert!(store.genomes.contains_key("L5"));
    }

    #[test]
    fn test_rolled_back_commit_rejects_ticket() {
        let mut store = store_with_l5();
        store.set_read_only(true);
        let mut bundle = Bundle::new(0);
        bundle.ticket = Some(
            Ticket::from_row(
                1,
                &row(&[("type", "remove"), ("phage_id", "L5")]),
                &ImportConfig::default().ticket_defaults(),
            )
            .unwrap(),
        );
        bundle
            .genomes
            .insert(GenomeKey::Canonical, Genome::new("L5", GenomeSource::Canonical));

        assert!(!import_into_db(&mut bundle, &mut store, true).unwrap());
        assert_eq!(bundle.state(), BundleState::Rejected);
        assert!(bundle
            .evaluations
            .iter()
            .any(|e| e.id == "BNDL_012" && e.kind == CheckKind::Commit));
        assert_eq!(bundle.errors(), 1);
    }

    #[test]
    fn test_malformed_row_rejects_table() {
        let mut store = MemoryStore::new();
        let parser = StubParser(BTreeMap::new());
        let config = commit_config();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let err = driver
            .run(&[row(&[("type", "upsert"), ("phage_id", "L5")])], &[])
            .err()
            .unwrap();
        assert!(err.message.contains("row 1"));
    }

    #[test]
    fn test_update_ticket_patches_canonical_row() {
        let mut canonical = Genome::new("L5", GenomeSource::Canonical);
        canonical.cluster = "B".to_string();
        let mut store = MemoryStore::with_genomes([canonical]);
        let parser = StubParser(BTreeMap::new());
        let config = commit_config();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let run = driver
            .run(
                &[row(&[("type", "update"), ("phage_id", "L5"), ("cluster", "A"), ("subcluster", "A2")])],
                &[],
            )
            .unwrap();

        assert_eq!(run.report.bundles[0].outcome, TicketOutcome::Committed);
        let stored = &store.genomes["L5"];
        assert_eq!(stored.cluster, "A");
        assert_eq!(stored.subcluster, "A2");
    }

    #[test]
    fn test_write_results_splits_outcomes() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("L5.gb");
        std::fs::write(&good, "unused").unwrap();
        let mut store = MemoryStore::new();
        let parser = StubParser(
            [(
                "L5.gb".to_string(),
                Some(Genome::new("L5", GenomeSource::Subject)),
            )]
            .into_iter()
            .collect(),
        );
        let config = commit_config();
        let mut driver = BatchDriver::new(&mut store, &OfflineCommunity, &parser, &config);
        let run = driver.run(&[], &[good]).unwrap();

        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        run.write_results(&out).unwrap();
        assert!(out.join(FAIL_FOLDER).join(GENOMES_FOLDER).join("L5.gb").exists());
        assert!(!out.join(SUCCESS_FOLDER).exists());
        let report: BatchReport =
            serde_json::from_str(&std::fs::read_to_string(out.join(REPORT_NAME)).unwrap()).unwrap();
        assert_eq!(report.bundles.len(), 1);
    }

    #[test]
    fn test_compare_files_lists_unmatched_features() {
        let mut archive = Genome::new("Trixie", GenomeSource::Subject);
        archive.description = "Mycobacterium phage Trixie".to_string();
        archive.organism = "Mycobacterium phage Trixie".to_string();
        archive.host_genus = "Mycobacterium".to_string();
        archive.cds = vec![
            CdsFeature::new("a1", "Trixie", 0, 12, Strand::Forward).unwrap(),
            CdsFeature::new("a2", "Trixie", 20, 32, Strand::Forward).unwrap(),
        ];
        let mut subject = archive.clone();
        subject.cds = vec![
            CdsFeature::new("b1", "Trixie", 0, 12, Strand::Forward).unwrap(),
            CdsFeature::new("b2", "Trixie", 40, 52, Strand::Reverse).unwrap(),
        ];
        let parser = StubParser(
            [
                ("old.gb".to_string(), Some(archive)),
                ("new.gb".to_string(), Some(subject)),
            ]
            .into_iter()
            .collect(),
        );
        let summary = compare_files(
            &parser,
            Path::new("old.gb"),
            Path::new("new.gb"),
            DescriptionField::Product,
        )
        .unwrap();

        assert_eq!(summary.tally.perfect, 1);
        assert_eq!(summary.only_in_genome1, vec!["20..32 (forward)".to_string()]);
        assert_eq!(summary.only_in_genome2, vec!["40..52 (reverse)".to_string()]);
        assert_eq!(summary.errors, 0);
        assert!(summary.evaluations.iter().any(|e| e.id == "GNM_039"));
    }

    const SEQUENCE_LINE: &str =
        "        1 atgaaatttt aaccccgggg aaaaccccgg ttatgcccca ttcatgggga ccccaaaacc";

    fn trixie_record(date: &str, product1: &str, product2: &str) -> String {
        let qualifier = |product: &str| {
            if product.is_empty() {
                String::new()
            } else {
                format!("                     /product=\"{product}\"\n")
            }
        };
        format!(
            "LOCUS       Trixie                    60 bp    DNA     linear   PHG {date}
DEFINITION  Mycobacterium phage Trixie, complete genome.
ACCESSION   JN408461
VERSION     JN408461.1
KEYWORDS    .
SOURCE      Mycobacterium phage Trixie
  ORGANISM  Mycobacterium phage Trixie
            Viruses; Caudovirales; Siphoviridae.
REFERENCE   1  (bases 1 to 60)
  AUTHORS   Doe,J., Hatfull,G.F.
  TITLE     Direct Submission
  JOURNAL   Submitted (01-JAN-2020)
FEATURES             Location/Qualifiers
     source          1..60
                     /organism=\"Mycobacterium phage Trixie\"
                     /host=\"Mycobacterium smegmatis mc2 155\"
     CDS             1..12
                     /gene=\"1\"
                     /locus_tag=\"TRIXIE_1\"
                     /transl_table=11
{}                     /translation=\"MKF\"
     CDS             complement(31..42)
                     /gene=\"2\"
                     /locus_tag=\"TRIXIE_2\"
                     /transl_table=11
{}                     /translation=\"MGA\"
ORIGIN
{SEQUENCE_LINE}
//
",
            qualifier(product1),
            qualifier(product2)
        )
    }

    struct TrixieCommunity;

    impl CommunityClient for TrixieCommunity {
        fn fetch_genome(&self, phage_id: &str) -> Option<Genome> {
            (phage_id == "Trixie").then(|| {
                let mut genome = Genome::new("Trixie", GenomeSource::Community);
                genome.host_genus = "Mycobacterium".to_string();
                genome.cluster = "A".to_string();
                genome.subcluster = "A2".to_string();
                genome
            })
        }

        fn reference_sets(&self) -> ReferenceSets {
            let set = |values: &[&str]| values.iter().map(|v| v.to_string()).collect();
            ReferenceSets {
                host_genera: set(&["Mycobacterium", "Gordonia"]),
                clusters: set(&["A", "B"]),
                subclusters: set(&["A1", "A2"]),
            }
        }
    }

    /// Temporary import folder with a JSON store, a genome folder and tables.
    struct ImportDir {
        dir: TempDir,
    }

    impl ImportDir {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join(GENOMES_FOLDER)).unwrap();
            std::fs::write(dir.path().join("store.json"), r#"{"genomes": {}}"#).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn write_genome(&self, name: &str, text: &str) -> PathBuf {
            let path = self.path(GENOMES_FOLDER).join(name);
            std::fs::write(&path, text).unwrap();
            path
        }

        fn write_table(&self, name: &str, text: &str) -> PathBuf {
            let path = self.path(name);
            std::fs::write(&path, text).unwrap();
            path
        }

        fn store(&self) -> MemoryStore {
            MemoryStore::load_from_path(&self.path("store.json")).unwrap()
        }

        fn run(&self, table: &Path, files: &[PathBuf]) -> BatchRun {
            let config = commit_config();
            let parser = config.parser();
            let rows = read_import_table(table).unwrap();
            let mut store = self.store();
            BatchDriver::new(&mut store, &TrixieCommunity, &parser, &config)
                .run(&rows, files)
                .unwrap()
        }
    }

    const ADD_TABLE: &str = "type,phage_id,host_genus,cluster,subcluster,accession,annotation_status,annotation_author,retrieve_record
add,Trixie,Mycobacterium,A,A2,none,draft,1,1
";

    #[test]
    fn test_genbank_add_commits_and_persists() {
        let dir = ImportDir::new();
        let file = dir.write_genome("Trixie.gb", &trixie_record("15-JUN-2020", "", ""));
        let table = dir.write_table("import.csv", ADD_TABLE);
        let run = dir.run(&table, &[file]);

        let report = &run.report.bundles[0];
        assert_eq!(report.outcome, TicketOutcome::Committed, "{report:#?}");
        assert_eq!(report.errors, 0);

        let store = dir.store();
        let stored = &store.genomes["Trixie"];
        assert_eq!(stored.annotation_status, AnnotationStatus::Draft);
        assert_eq!(stored.cluster, "A");
        assert_eq!(stored.accession, "");
        assert_eq!(stored.organism, "Mycobacterium phage Trixie");
        assert_eq!(stored.cds.len(), 2);
    }

    #[test]
    fn test_add_of_existing_genome_fails_id_uniqueness() {
        let dir = ImportDir::new();
        let file = dir.write_genome("Trixie.gb", &trixie_record("15-JUN-2020", "", ""));
        let table = dir.write_table("import.csv", ADD_TABLE);
        dir.run(&table, std::slice::from_ref(&file));

        let run = dir.run(&table, &[file]);
        let report = &run.report.bundles[0];
        assert_eq!(report.outcome, TicketOutcome::Rejected);
        let structural: Vec<&str> = report.evaluations["bundle"]
            .iter()
            .filter(|e| e.is_error())
            .map(|e| e.id.as_str())
            .collect();
        assert!(structural.is_empty(), "{structural:?}");
        let uniqueness = report.evaluations["genome_subject"]
            .iter()
            .find(|e| e.id == "GNM_001")
            .expect("id uniqueness is evaluated");
        assert!(uniqueness.is_error());
        assert_eq!(dir.store().genomes.len(), 1);
    }

    #[test]
    fn test_replace_of_draft_with_unchanged_name_has_one_error() {
        let dir = ImportDir::new();
        let draft = dir.write_genome("Trixie.gb", &trixie_record("15-JUN-2020", "", ""));
        let table = dir.write_table("import.csv", ADD_TABLE);
        dir.run(&table, &[draft]);

        let final_folder = dir.path("final");
        std::fs::create_dir_all(&final_folder).unwrap();
        let final_file = final_folder.join("Trixie.gb");
        std::fs::write(
            &final_file,
            trixie_record("01-MAR-2021", "terminase", "portal protein"),
        )
        .unwrap();
        let table = dir.write_table(
            "replace.csv",
            "type,phage_id,host_genus,cluster,subcluster,accession,annotation_status,annotation_author,retrieve_record
replace,Trixie,retain,retain,retain,retain,final,retain,retain
",
        );
        let run = dir.run(&table, &[final_file]);

        let report = &run.report.bundles[0];
        assert_eq!(report.outcome, TicketOutcome::Rejected);
        assert_eq!(report.errors, 1);
        let pair = &report.evaluations["genome_pair_canonical_subject"];
        let failed: Vec<&str> = pair.iter().filter(|e| e.is_error()).map(|e| e.id.as_str()).collect();
        assert_eq!(failed, vec!["GP_011"]);
        assert_eq!(
            dir.store().genomes["Trixie"].annotation_status,
            AnnotationStatus::Draft
        );
    }

    #[test]
    fn test_retrieved_fields_come_from_community() {
        let dir = ImportDir::new();
        let file = dir.write_genome("Trixie.gb", &trixie_record("15-JUN-2020", "", ""));
        let table = dir.write_table(
            "import.csv",
            "type,phage_id,host_genus,cluster,subcluster,accession,annotation_status,annotation_author,retrieve_record
add,Trixie,retrieve,retrieve,retrieve,none,draft,1,1
",
        );
        let run = dir.run(&table, &[file]);

        assert_eq!(run.report.bundles[0].outcome, TicketOutcome::Committed);
        let store = dir.store();
        let stored = &store.genomes["Trixie"];
        assert_eq!(stored.subcluster, "A2");
        assert_eq!(stored.host_genus, "Mycobacterium");
    }

    #[test]
    fn test_write_results_copies_committed_genome() {
        let dir = ImportDir::new();
        let file = dir.write_genome("Trixie.gb", &trixie_record("15-JUN-2020", "", ""));
        let table = dir.write_table("import.csv", ADD_TABLE);
        let run = dir.run(&table, &[file]);

        let out = dir.path("results");
        std::fs::create_dir_all(&out).unwrap();
        run.write_results(&out).unwrap();
        let tickets = read_import_table(&out.join(SUCCESS_FOLDER).join(TICKET_TABLE_NAME)).unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0]["phage_id"], "Trixie");
        assert!(out.join(SUCCESS_FOLDER).join(GENOMES_FOLDER).join("Trixie.gb").exists());
    }

    #[test]
    fn test_compare_draft_and_final_records() {
        let dir = ImportDir::new();
        let draft = dir.write_genome("draft.gb", &trixie_record("15-JUN-2020", "", ""));
        let final_file = dir.write_genome("final.gb", &trixie_record("01-MAR-2021", "terminase", ""));
        let summary = compare_files(
            &GenbankParser::default(),
            &draft,
            &final_file,
            DescriptionField::Product,
        )
        .unwrap();

        assert_eq!(summary.tally.perfect, 2);
        assert!(summary.only_in_genome1.is_empty());
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.warnings, 1);
    }
}
