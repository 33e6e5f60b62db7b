//! Attribute-level comparison of two paired genomes and their matched CDS.

use crate::bundle::GenomeKey;
use crate::evaluation::{self, CheckKind, EvalStatus, Evaluation};
use crate::genome::{AnnotationStatus, CdsFeature, DescriptionField, Genome};
use crate::matcher::{FeatureMatch, match_features};
use serde::{Deserialize, Serialize};

/// Mismatched pairs listed in one feature evaluation before truncating.
const MAX_LISTED_MISMATCHES: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Adds the date-ordering and name/status-transition rules.
    pub check_replace: bool,
    pub compare_features: bool,
    /// Field of genome2's CDS compared against genome1's stored description.
    pub description_field: DescriptionField,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomePair {
    pub genome1: GenomeKey,
    pub genome2: GenomeKey,
    pub evaluations: Vec<Evaluation>,
    pub feature_match: Option<FeatureMatch>,
}

fn compare_attribute<T: PartialEq + std::fmt::Display>(
    id: &str,
    attribute: &str,
    value1: T,
    value2: T,
) -> Evaluation {
    evaluation::expect(
        id,
        &format!("Check that the {attribute} is the same in both genomes."),
        value1 == value2,
        format!("The {attribute} differs: '{value1}' versus '{value2}'."),
        EvalStatus::Error,
        CheckKind::DataQuality,
    )
}

fn compare_transition<T: PartialEq + std::fmt::Display>(
    id: &str,
    attribute: &str,
    value1: T,
    value2: T,
    expect_same: bool,
) -> Evaluation {
    let (wanted, verb) = if expect_same {
        (value1 == value2, "match")
    } else {
        (value1 != value2, "differ")
    };
    evaluation::expect(
        id,
        &format!("Check that the {attribute} is expected to {verb} in the replacement."),
        wanted,
        format!("The {attribute} was expected to {verb}: '{value1}' versus '{value2}'."),
        EvalStatus::Error,
        CheckKind::DataQuality,
    )
}

fn feature_mismatch(id: &str, definition: &str, mismatched: &[String]) -> Evaluation {
    let mut listed = mismatched
        .iter()
        .take(MAX_LISTED_MISMATCHES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if mismatched.len() > MAX_LISTED_MISMATCHES {
        listed.push_str(", ...");
    }
    evaluation::expect(
        id,
        definition,
        mismatched.is_empty(),
        format!("{} matched feature pair(s) differ: {listed}.", mismatched.len()),
        EvalStatus::Warning,
        CheckKind::DataQuality,
    )
}

impl GenomePair {
    pub fn new(genome1: GenomeKey, genome2: GenomeKey) -> Self {
        Self {
            genome1,
            genome2,
            evaluations: vec![],
            feature_match: None,
        }
    }

    pub fn key(&self) -> String {
        pair_key(self.genome1, self.genome2)
    }

    pub fn error_count(&self) -> usize {
        evaluation::count_status(&self.evaluations, EvalStatus::Error)
    }

    /// Runs every comparison. Genome-level differences are errors; feature
    /// differences are warnings.
    pub fn compare(&mut self, genome1: &Genome, genome2: &Genome, options: &CompareOptions) {
        let evals = vec![
            compare_attribute("GP_001", "id", &genome1.id, &genome2.id),
            compare_attribute(
                "GP_002",
                "sequence",
                SequenceDigest(genome1.sequence()),
                SequenceDigest(genome2.sequence()),
            ),
            compare_attribute("GP_003", "length", genome1.length(), genome2.length()),
            compare_attribute("GP_004", "cluster", &genome1.cluster, &genome2.cluster),
            compare_attribute("GP_005", "subcluster", &genome1.subcluster, &genome2.subcluster),
            compare_attribute("GP_006", "accession", &genome1.accession, &genome2.accession),
            compare_attribute("GP_007", "host genus", &genome1.host_genus, &genome2.host_genus),
            compare_attribute(
                "GP_008",
                "annotation author",
                genome1.annotation_author,
                genome2.annotation_author,
            ),
            compare_attribute(
                "GP_009",
                "translation table",
                genome1.translation_table,
                genome2.translation_table,
            ),
            compare_attribute(
                "GP_010",
                "retrieve record flag",
                genome1.retrieve_record,
                genome2.retrieve_record,
            ),
        ];
        self.evaluations.extend(evals);

        if options.check_replace {
            self.compare_replacement(genome1, genome2);
        }
        if options.compare_features {
            self.compare_features(genome1, genome2, options.description_field);
        }
    }

    fn compare_replacement(&mut self, genome1: &Genome, genome2: &Genome) {
        let date_definition = "Check that the new genome is more recent than the one it replaces.";
        let date_eval = match (genome1.date, genome2.date) {
            (Some(old), Some(new)) => evaluation::expect(
                "GP_015",
                date_definition,
                new > old,
                format!("The new date {new} is not later than {old}."),
                EvalStatus::Error,
                CheckKind::DataQuality,
            ),
            _ => evaluation::error(
                "GP_015",
                date_definition,
                "At least one genome has no date.",
                CheckKind::DataQuality,
            ),
        };
        self.evaluations.push(date_eval);

        if genome1.annotation_status == AnnotationStatus::Draft {
            self.evaluations.push(compare_transition(
                "GP_011",
                "name",
                &genome1.name,
                &genome2.name,
                false,
            ));
            self.evaluations.push(evaluation::expect(
                "GP_012",
                "Check that a draft genome is replaced by a non-draft annotation.",
                genome2.annotation_status != AnnotationStatus::Draft,
                format!(
                    "The annotation status was expected to change from draft, but is '{}'.",
                    genome2.annotation_status
                ),
                EvalStatus::Error,
                CheckKind::DataQuality,
            ));
        } else {
            self.evaluations.push(compare_transition(
                "GP_013",
                "name",
                &genome1.name,
                &genome2.name,
                true,
            ));
            self.evaluations.push(compare_transition(
                "GP_014",
                "annotation status",
                genome1.annotation_status,
                genome2.annotation_status,
                true,
            ));
        }
    }

    fn compare_features(&mut self, genome1: &Genome, genome2: &Genome, description_field: DescriptionField) {
        let matched = match_features(&genome1.cds, &genome2.cds);
        let tally = matched.tally();
        self.evaluations.push(evaluation::correct(
            "GP_016",
            "Tally CDS features paired between the two genomes.",
            format!(
                "{} perfect, {} imperfect, {} only in {}, {} only in {}.",
                tally.perfect,
                tally.imperfect,
                tally.a_only,
                self.genome1,
                tally.b_only,
                self.genome2
            ),
            CheckKind::DataQuality,
        ));

        let pairs: Vec<(&CdsFeature, &CdsFeature, bool)> = matched
            .perfect
            .iter()
            .map(|(a, b)| (&genome1.cds[*a], &genome2.cds[*b], true))
            .chain(
                matched
                    .imperfect
                    .iter()
                    .map(|(a, b)| (&genome1.cds[*a], &genome2.cds[*b], false)),
            )
            .collect();

        let label = |c1: &CdsFeature, c2: &CdsFeature| format!("{}/{}", c1.id, c2.id);
        let start_mismatch: Vec<String> = pairs
            .iter()
            .filter(|(c1, c2, _)| c1.start_site() != c2.start_site())
            .map(|(c1, c2, _)| label(c1, c2))
            .collect();
        // Imperfect pairs differ in length, so their translations differ too.
        let translation_mismatch: Vec<String> = pairs
            .iter()
            .filter(|(c1, c2, perfect)| *perfect && c1.translation != c2.translation)
            .map(|(c1, c2, _)| label(c1, c2))
            .collect();
        let description_mismatch: Vec<String> = pairs
            .iter()
            .filter(|(c1, c2, _)| {
                !c1.description
                    .trim()
                    .eq_ignore_ascii_case(c2.description_value(description_field).trim())
            })
            .map(|(c1, c2, _)| label(c1, c2))
            .collect();

        self.evaluations.push(feature_mismatch(
            "CDS_PAIR_001",
            "Check that matched features share the start coordinate.",
            &start_mismatch,
        ));
        self.evaluations.push(feature_mismatch(
            "CDS_PAIR_002",
            "Check that perfectly matched features share the translation.",
            &translation_mismatch,
        ));
        self.evaluations.push(feature_mismatch(
            "CDS_PAIR_003",
            "Check that matched features share the description.",
            &description_mismatch,
        ));
        self.feature_match = Some(matched);
    }
}

pub fn pair_key(genome1: GenomeKey, genome2: GenomeKey) -> String {
    format!("{genome1}_{genome2}")
}

/// Displays a sequence by length and prefix so mismatch messages stay short.
#[derive(PartialEq)]
struct SequenceDigest<'a>(&'a str);

impl std::fmt::Display for SequenceDigest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.chars().take(12).collect();
        if self.0.len() > 12 {
            write!(f, "{prefix}... ({} bp)", self.0.len())
        } else {
            write!(f, "{prefix}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{GenomeSource, Strand};
    use chrono::NaiveDate;

    fn genome(origin: GenomeSource, status: AnnotationStatus, name: &str) -> Genome {
        let mut g = Genome::new("Trixie", origin);
        g.name = name.to_string();
        g.set_sequence("ATGAAATTTGGGCCCTAA");
        g.cluster = "A".to_string();
        g.subcluster = "A2".to_string();
        g.host_genus = "Mycobacterium".to_string();
        g.translation_table = 11;
        g.annotation_author = 1;
        g.retrieve_record = 1;
        g.annotation_status = status;
        g
    }

    fn replace_options() -> CompareOptions {
        CompareOptions {
            check_replace: true,
            ..CompareOptions::default()
        }
    }

    #[test]
    fn test_draft_replacement_with_unchanged_name_is_one_error() {
        let mut old = genome(GenomeSource::Canonical, AnnotationStatus::Draft, "Trixie");
        let mut new = genome(GenomeSource::Subject, AnnotationStatus::Final, "Trixie");
        old.date = NaiveDate::from_ymd_opt(2019, 1, 1);
        new.date = NaiveDate::from_ymd_opt(2020, 1, 1);
        let mut pair = GenomePair::new(GenomeKey::Canonical, GenomeKey::Subject);
        pair.compare(&old, &new, &replace_options());
        assert_eq!(pair.error_count(), 1);
        let failed: Vec<&str> = pair
            .evaluations
            .iter()
            .filter(|e| e.is_error())
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(failed, vec!["GP_011"]);
    }

    #[test]
    fn test_final_replacement_expects_same_name_and_status() {
        let mut old = genome(GenomeSource::Canonical, AnnotationStatus::Final, "Trixie");
        let mut new = genome(GenomeSource::Subject, AnnotationStatus::Final, "Trixie");
        old.date = NaiveDate::from_ymd_opt(2019, 1, 1);
        new.date = NaiveDate::from_ymd_opt(2018, 1, 1);
        let mut pair = GenomePair::new(GenomeKey::Canonical, GenomeKey::Subject);
        pair.compare(&old, &new, &replace_options());
        let failed: Vec<&str> = pair
            .evaluations
            .iter()
            .filter(|e| e.is_error())
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(failed, vec!["GP_015"]);
    }

    #[test]
    fn test_every_attribute_compared() {
        let old = genome(GenomeSource::Canonical, AnnotationStatus::Final, "Trixie");
        let mut new = genome(GenomeSource::Subject, AnnotationStatus::Final, "Trixie");
        new.cluster = "B".to_string();
        new.subcluster = String::new();
        new.set_sequence("ATG");
        let mut pair = GenomePair::new(GenomeKey::Canonical, GenomeKey::Subject);
        pair.compare(&old, &new, &CompareOptions::default());
        assert_eq!(pair.evaluations.len(), 10);
        assert_eq!(pair.error_count(), 4);
    }

    #[test]
    fn test_missing_date_is_error() {
        let old = genome(GenomeSource::Canonical, AnnotationStatus::Final, "Trixie");
        let new = genome(GenomeSource::Subject, AnnotationStatus::Final, "Trixie");
        let mut pair = GenomePair::new(GenomeKey::Canonical, GenomeKey::Subject);
        pair.compare(&old, &new, &replace_options());
        assert!(pair.evaluations.iter().any(|e| e.id == "GP_015" && e.is_error()));
    }

    #[test]
    fn test_feature_discrepancies_are_warnings() {
        let mut old = genome(GenomeSource::Canonical, AnnotationStatus::Final, "Trixie");
        let mut new = genome(GenomeSource::Subject, AnnotationStatus::Final, "Trixie");
        let mut a1 = CdsFeature::new("old_1", "Trixie", 10, 50, Strand::Forward).unwrap();
        a1.description = "terminase".to_string();
        let mut b1 = CdsFeature::new("new_1", "Trixie", 13, 50, Strand::Forward).unwrap();
        b1.product = "Terminase".to_string();
        let mut a2 = CdsFeature::new("old_2", "Trixie", 60, 90, Strand::Reverse).unwrap();
        a2.translation = "MKV".to_string();
        let mut b2 = CdsFeature::new("new_2", "Trixie", 60, 90, Strand::Reverse).unwrap();
        b2.translation = "MKL".to_string();
        b2.product = "portal".to_string();
        old.cds = vec![a1, a2];
        new.cds = vec![b1, b2];

        let mut pair = GenomePair::new(GenomeKey::Canonical, GenomeKey::Subject);
        let options = CompareOptions {
            compare_features: true,
            ..CompareOptions::default()
        };
        pair.compare(&old, &new, &options);
        assert_eq!(pair.error_count(), 0);
        let warned: Vec<&str> = pair
            .evaluations
            .iter()
            .filter(|e| e.is_warning())
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(warned, vec!["CDS_PAIR_001", "CDS_PAIR_002", "CDS_PAIR_003"]);
        let matched = pair.feature_match.as_ref().unwrap();
        assert_eq!(matched.perfect, vec![(1, 1)]);
        assert_eq!(matched.imperfect, vec![(0, 0)]);
    }
}
