//! GenBank flat-file parsing into [`Genome`] records.

use crate::error::{ReconcileError, Result};
use crate::feature_location::feature_span;
use crate::genome::{
    CdsFeature, DescriptionField, Genome, GenomeSource, SourceFeature, TrnaFeature,
    remove_draft_suffix,
};
use anyhow::Context;
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use gb_io::reader::SeqReader;
use gb_io::seq::{Feature, Seq};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Turns one file into one genome. `Ok(None)` means the file held no record.
pub trait RecordParser: Sync {
    fn parse(&self, path: &Path) -> Result<Option<Genome>>;
}

/// Which part of the record names the genome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenomeIdField {
    #[default]
    OrganismName,
    RecordName,
    Filename,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostGenusField {
    #[default]
    Organism,
    None,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenbankParser {
    pub genome_id_field: GenomeIdField,
    pub host_genus_field: HostGenusField,
    pub description_field: DescriptionField,
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

fn read_first_record(path: &Path) -> anyhow::Result<Option<Seq>> {
    let file = File::open(path).with_context(|| format!("Could not open '{}'", path.display()))?;
    let reader: Box<dyn Read> = if is_gzip_path(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    SeqReader::new(reader)
        .next()
        .transpose()
        .with_context(|| format!("Could not parse GenBank record in '{}'", path.display()))
}

fn qualifier_text(feature: &Feature, key: &str) -> String {
    feature
        .qualifier_values(key.into())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

/// Organism name without the taxonomy lineage gb-io appends on later lines.
fn organism_line(organism: &str) -> Option<&str> {
    organism.lines().next().map(str::trim)
}

fn gb_date(seq: &Seq) -> Option<NaiveDate> {
    let text = seq.date.as_ref()?.to_string();
    NaiveDate::parse_from_str(&text, "%d-%b-%Y").ok()
}

impl GenbankParser {
    fn genome_id(&self, seq: &Seq, path: &Path) -> String {
        let organism_name = || {
            seq.source
                .as_ref()
                .and_then(|s| s.organism.as_deref())
                .and_then(organism_line)
                .and_then(|o| o.split_whitespace().last())
                .map(str::to_string)
        };
        let raw = match self.genome_id_field {
            GenomeIdField::OrganismName => organism_name(),
            GenomeIdField::RecordName => seq.name.clone(),
            GenomeIdField::Filename => path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.split('.').next())
                .map(str::to_string),
        };
        raw.unwrap_or_default()
    }

    pub fn genome_from_seq(&self, seq: &Seq, path: &Path) -> Genome {
        let name = self.genome_id(seq, path);
        let id = remove_draft_suffix(&name).to_string();
        let mut genome = Genome::new(&id, GenomeSource::Subject);
        genome.name = name;
        genome.filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        genome.set_sequence(&String::from_utf8_lossy(&seq.seq));
        genome.description = seq.definition.clone().unwrap_or_default();
        genome.accession = seq
            .accession
            .as_deref()
            .and_then(|a| a.split('.').next())
            .unwrap_or("")
            .to_string();
        genome.date = gb_date(seq);
        if let Some(source) = &seq.source {
            genome.record_source = source.source.clone();
            genome.organism = source
                .organism
                .as_deref()
                .and_then(organism_line)
                .unwrap_or("")
                .to_string();
        }
        genome.authors = seq
            .references
            .iter()
            .filter_map(|r| r.authors.as_deref())
            .collect::<Vec<_>>()
            .join("; ");
        if self.host_genus_field == HostGenusField::Organism {
            genome.host_genus = genome
                .organism
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string();
        }

        let (mut cds_n, mut src_n, mut trna_n) = (0, 0, 0);
        for feature in &seq.features {
            match feature.kind.to_string().as_str() {
                "CDS" => {
                    cds_n += 1;
                    if let Some(cds) = self.cds_from_feature(feature, &id, cds_n) {
                        genome.cds.push(cds);
                    }
                }
                "source" => {
                    src_n += 1;
                    genome.source_features.push(SourceFeature {
                        id: format!("{id}_SRC_{src_n}"),
                        genome_id: id.clone(),
                        organism: qualifier_text(feature, "organism"),
                        host: qualifier_text(feature, "host"),
                        lab_host: qualifier_text(feature, "lab_host"),
                        evaluations: vec![],
                    });
                }
                "tRNA" => {
                    trna_n += 1;
                    let Some(span) = feature_span(feature) else {
                        tracing::warn!(genome = %id, "Skipping tRNA {trna_n} without a usable location");
                        continue;
                    };
                    genome.trna.push(TrnaFeature {
                        id: format!("{id}_TRNA_{trna_n}"),
                        genome_id: id.clone(),
                        left: span.left,
                        right: span.right,
                        strand: span.strand,
                        product: qualifier_text(feature, "product"),
                        note: qualifier_text(feature, "note"),
                        evaluations: vec![],
                    });
                }
                _ => {}
            }
        }
        genome.translation_table = genome
            .cds
            .iter()
            .map(|c| c.translation_table)
            .find(|t| *t != 0)
            .unwrap_or(0);
        genome
    }

    fn cds_from_feature(&self, feature: &Feature, genome_id: &str, n: usize) -> Option<CdsFeature> {
        let Some(span) = feature_span(feature) else {
            tracing::warn!(genome = %genome_id, "Skipping CDS {n} without a usable location");
            return None;
        };
        let locus_tag = qualifier_text(feature, "locus_tag");
        let id = if locus_tag.is_empty() {
            format!("{genome_id}_CDS_{n}")
        } else {
            locus_tag.clone()
        };
        let mut cds = match CdsFeature::new(&id, genome_id, span.left, span.right, span.strand) {
            Ok(cds) => cds,
            Err(e) => {
                tracing::warn!(genome = %genome_id, "Skipping CDS {n}: {e}");
                return None;
            }
        };
        cds.parts = span.parts;
        cds.locus_tag = locus_tag;
        cds.gene = qualifier_text(feature, "gene");
        cds.translation = qualifier_text(feature, "translation");
        cds.translation_table = qualifier_text(feature, "transl_table").parse().unwrap_or(0);
        cds.product = qualifier_text(feature, "product");
        cds.function = qualifier_text(feature, "function");
        cds.note = qualifier_text(feature, "note");
        cds.set_description(self.description_field);
        Some(cds)
    }
}

impl RecordParser for GenbankParser {
    fn parse(&self, path: &Path) -> Result<Option<Genome>> {
        let seq = read_first_record(path).map_err(|e| ReconcileError::parse(format!("{e:#}")))?;
        Ok(seq.map(|seq| self.genome_from_seq(&seq, path)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::genome::Strand;
    use flate2::{Compression, write::GzEncoder};
    use gb_io::seq::Location;
    use std::borrow::Cow as FeatureKind;
    use std::io::Write;
    use tempfile::tempdir;

    pub(crate) const TRIXIE_GB: &str = "\
LOCUS       Trixie                    60 bp    DNA     linear   PHG 15-JUN-2020
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
                     /product=\"terminase\"
                     /translation=\"MKF\"
     CDS             complement(31..42)
                     /gene=\"2\"
                     /locus_tag=\"TRIXIE_2\"
                     /transl_table=11
                     /function=\"portal\"
                     /translation=\"MGA\"
ORIGIN
        1 atgaaatttt aaccccgggg aaaaccccgg ttatgcccca ttcatgggga ccccaaaacc
//
";

    #[test]
    fn test_parse_genbank_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Trixie.gb");
        std::fs::write(&path, TRIXIE_GB).unwrap();
        let genome = GenbankParser::default().parse(&path).unwrap().unwrap();

        assert_eq!(genome.id, "Trixie");
        assert_eq!(genome.name, "Trixie");
        assert_eq!(genome.organism, "Mycobacterium phage Trixie");
        assert_eq!(genome.length(), 60);
        assert_eq!(genome.accession, "JN408461");
        assert_eq!(genome.host_genus, "Mycobacterium");
        assert_eq!(genome.date, NaiveDate::from_ymd_opt(2020, 6, 15));
        assert!(genome.authors.contains("Hatfull"));
        assert_eq!(genome.translation_table, 11);
        assert_eq!(genome.source_features.len(), 1);
        assert_eq!(genome.cds.len(), 2);

        let first = &genome.cds[0];
        assert_eq!((first.left(), first.right(), first.strand()), (0, 12, Strand::Forward));
        assert_eq!(first.description, "terminase");
        let second = &genome.cds[1];
        assert_eq!(second.strand(), Strand::Reverse);
        assert_eq!(second.description, "");
        assert_eq!(second.function, "portal");
    }

    #[test]
    fn test_parse_gzip_and_filename_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Trixie_Draft.gb.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(TRIXIE_GB.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let parser = GenbankParser {
            genome_id_field: GenomeIdField::Filename,
            host_genus_field: HostGenusField::None,
            ..GenbankParser::default()
        };
        let genome = parser.parse(&path).unwrap().unwrap();
        assert_eq!(genome.id, "Trixie");
        assert_eq!(genome.name, "Trixie_Draft");
        assert_eq!(genome.host_genus, "");
    }

    #[test]
    fn test_empty_file_yields_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.gb");
        std::fs::write(&path, "").unwrap();
        assert!(GenbankParser::default().parse(&path).unwrap().is_none());
    }

    #[test]
    fn test_organism_line_drops_lineage() {
        assert_eq!(
            organism_line("Mycobacterium phage L5\nViruses; Caudovirales."),
            Some("Mycobacterium phage L5")
        );
        assert_eq!(organism_line(""), None);
    }

    #[test]
    fn test_cds_without_extent_is_skipped() {
        let parser = GenbankParser::default();
        let empty = Feature {
            kind: FeatureKind::from("CDS"),
            location: Location::simple_range(30, 30),
            qualifiers: vec![],
        };
        assert!(parser.cds_from_feature(&empty, "Trixie", 1).is_none());
        let usable = Feature {
            location: Location::simple_range(30, 60),
            ..empty
        };
        let cds = parser.cds_from_feature(&usable, "Trixie", 2).unwrap();
        assert_eq!(cds.id, "Trixie_CDS_2");
        assert_eq!(cds.len(), 30);
    }
}
