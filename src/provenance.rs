//! Field-level provenance: which source supplies each genome field.
//!
//! Field access goes through [`FIELD_REGISTRY`], a fixed table of getters and
//! setters, so copying a field between two records never needs reflection.

use crate::error::{ReconcileError, Result};
use crate::evaluation::{self, CheckKind, EvalStatus, Evaluation};
use crate::genome::{AnnotationStatus, Genome, GenomeField, Sentinel};
use crate::ticket::{Ticket, TicketType};
use std::str::FromStr;

pub struct FieldAccessor {
    pub field: GenomeField,
    pub get: fn(&Genome) -> String,
    pub set: fn(&mut Genome, &str) -> Result<()>,
}

fn parse_flag(field: &str, value: &str) -> Result<u8> {
    match value.trim() {
        "0" => Ok(0),
        "1" => Ok(1),
        other => Err(ReconcileError::invalid_input(format!(
            "{field} must be 0 or 1, not '{other}'"
        ))),
    }
}

pub static FIELD_REGISTRY: [FieldAccessor; 9] = [
    FieldAccessor {
        field: GenomeField::Name,
        get: |g| g.name.clone(),
        set: |g, v| {
            g.name = v.trim().to_string();
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::HostGenus,
        get: |g| g.host_genus.clone(),
        set: |g, v| {
            g.host_genus = v.split_whitespace().next().unwrap_or("").to_string();
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::Cluster,
        get: |g| g.cluster.clone(),
        set: |g, v| {
            g.cluster = v.trim().to_string();
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::Subcluster,
        get: |g| g.subcluster.clone(),
        set: |g, v| {
            g.subcluster = v.trim().to_string();
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::Accession,
        get: |g| g.accession.clone(),
        set: |g, v| {
            // Version suffixes (".1") are not stored.
            g.accession = v.trim().split('.').next().unwrap_or("").to_string();
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::AnnotationStatus,
        get: |g| g.annotation_status.to_string(),
        set: |g, v| {
            g.annotation_status = AnnotationStatus::from_str(v)?;
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::AnnotationAuthor,
        get: |g| g.annotation_author.to_string(),
        set: |g, v| {
            g.annotation_author = parse_flag("annotation_author", v)?;
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::RetrieveRecord,
        get: |g| g.retrieve_record.to_string(),
        set: |g, v| {
            g.retrieve_record = parse_flag("retrieve_record", v)?;
            Ok(())
        },
    },
    FieldAccessor {
        field: GenomeField::TranslationTable,
        get: |g| g.translation_table.to_string(),
        set: |g, v| {
            g.translation_table = v.trim().parse().map_err(|_| {
                ReconcileError::invalid_input(format!("translation_table '{v}' is not a number"))
            })?;
            Ok(())
        },
    },
];

pub fn accessor(field: GenomeField) -> &'static FieldAccessor {
    // The registry holds every GenomeField variant, in declaration order.
    &FIELD_REGISTRY[field as usize]
}

pub fn get_field(genome: &Genome, field: GenomeField) -> String {
    (accessor(field).get)(genome)
}

pub fn set_field(genome: &mut Genome, field: GenomeField, value: &str) -> Result<()> {
    (accessor(field).set)(genome, value)
}

pub fn copy_field(field: GenomeField, from: &Genome, to: &mut Genome) -> Result<()> {
    set_field(to, field, &get_field(from, field))
}

/// Overlays literal ticket values and marks sentinel fields as pending.
/// Returns one entry per literal that the field rejected.
pub fn apply_ticket(genome: &mut Genome, ticket: &Ticket) -> Vec<(GenomeField, ReconcileError)> {
    let mut failures = vec![];
    for (field, value) in &ticket.data_ticket {
        if let Err(e) = set_field(genome, *field, value) {
            failures.push((*field, e));
        }
    }
    for field in &ticket.data_retrieve {
        genome.pending.insert(*field, Sentinel::Retrieve);
    }
    for field in &ticket.data_retain {
        genome.pending.insert(*field, Sentinel::Retain);
    }
    failures
}

/// Fills pending fields from whichever counterpart is available. Retained
/// fields are only taken from the canonical record on replace. Fields with no
/// available source stay pending. Returns how many fields were filled.
pub fn fill_pending(
    genome: &mut Genome,
    ticket_type: TicketType,
    community: Option<&Genome>,
    canonical: Option<&Genome>,
) -> usize {
    let pending: Vec<(GenomeField, Sentinel)> =
        genome.pending.iter().map(|(f, s)| (*f, *s)).collect();
    let mut filled = 0;
    for (field, sentinel) in pending {
        let source = match sentinel {
            Sentinel::Retrieve => community,
            Sentinel::Retain if ticket_type == TicketType::Replace => canonical,
            Sentinel::Retain => None,
        };
        let Some(source) = source else {
            continue;
        };
        match copy_field(field, source, genome) {
            Ok(()) => {
                genome.pending.remove(&field);
                filled += 1;
            }
            Err(e) => tracing::warn!(
                genome = %genome.id,
                field = %field,
                "Could not copy {} value: {e}",
                sentinel.literal()
            ),
        }
    }
    filled
}

/// Runs every resolution stage on `subject` and reports rejected ticket
/// literals as provenance errors.
pub fn resolve(
    subject: &mut Genome,
    ticket: &Ticket,
    community: Option<&Genome>,
    canonical: Option<&Genome>,
) -> Vec<Evaluation> {
    let failures = apply_ticket(subject, ticket);
    fill_pending(subject, ticket.ticket_type, community, canonical);
    failures
        .into_iter()
        .map(|(field, e)| {
            evaluation::error(
                "BNDL_011",
                "Check that every ticket value can be applied to the genome.",
                format!("Field '{field}' rejected the ticket value: {}", e.message),
                CheckKind::Provenance,
            )
        })
        .collect()
}

/// Checks that nothing is left waiting on `sentinel`, either as a pending
/// marker or as a literal field value.
pub fn check_sentinel(genome: &Genome, sentinel: Sentinel, eval_id: &str) -> Evaluation {
    let mut unresolved: Vec<String> = genome
        .pending
        .iter()
        .filter(|(_, s)| **s == sentinel)
        .map(|(f, _)| f.to_string())
        .collect();
    for accessor in &FIELD_REGISTRY {
        let value = (accessor.get)(genome);
        if value.eq_ignore_ascii_case(sentinel.literal()) {
            unresolved.push(accessor.field.to_string());
        }
    }
    unresolved.sort();
    unresolved.dedup();
    evaluation::expect(
        eval_id,
        &format!("Check that no field is left as '{}'.", sentinel.literal()),
        unresolved.is_empty(),
        format!(
            "Fields still marked '{}': {}.",
            sentinel.literal(),
            unresolved.join(", ")
        ),
        EvalStatus::Error,
        CheckKind::Provenance,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GenomeSource;
    use crate::ticket::TicketDefaults;
    use std::collections::BTreeMap;

    fn ticket(pairs: &[(&str, &str)]) -> Ticket {
        let row: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ticket::from_row(1, &row, &TicketDefaults::default()).unwrap()
    }

    fn community() -> Genome {
        let mut g = Genome::new("Trixie", GenomeSource::Community);
        g.host_genus = "Mycobacterium".to_string();
        g.cluster = "A".to_string();
        g.subcluster = "A2".to_string();
        g
    }

    fn canonical() -> Genome {
        let mut g = Genome::new("Trixie", GenomeSource::Canonical);
        g.cluster = "B".to_string();
        g.annotation_author = 1;
        g
    }

    #[test]
    fn test_registry_order_matches_fields() {
        for field in GenomeField::ALL {
            assert_eq!(accessor(field).field, field);
        }
    }

    #[test]
    fn test_resolution_order() {
        let t = ticket(&[
            ("type", "replace"),
            ("phage_id", "Trixie"),
            ("host_genus", "retrieve"),
            ("subcluster", "retrieve"),
            ("annotation_author", "retain"),
            ("accession", "KX123456.2"),
        ]);
        let mut subject = Genome::new("Trixie", GenomeSource::Subject);
        let evals = resolve(&mut subject, &t, Some(&community()), Some(&canonical()));
        assert!(evals.is_empty());
        assert_eq!(subject.host_genus, "Mycobacterium");
        assert_eq!(subject.subcluster, "A2");
        assert_eq!(subject.annotation_author, 1);
        assert_eq!(subject.accession, "KX123456");
        // Cluster was not named on the ticket.
        assert_eq!(subject.cluster, "");
        assert!(subject.pending.is_empty());
        assert!(!check_sentinel(&subject, Sentinel::Retrieve, "GNM_033").is_error());
    }

    #[test]
    fn test_missing_counterpart_leaves_sentinel() {
        let t = ticket(&[("type", "add"), ("phage_id", "Trixie"), ("cluster", "retrieve")]);
        let mut subject = Genome::new("Trixie", GenomeSource::Subject);
        resolve(&mut subject, &t, None, None);
        let eval = check_sentinel(&subject, Sentinel::Retrieve, "GNM_033");
        assert!(eval.is_error());
        assert_eq!(eval.kind, CheckKind::Provenance);
        assert!(eval.result.contains("cluster"));
    }

    #[test]
    fn test_retain_ignored_outside_replace() {
        let t = ticket(&[("type", "add"), ("phage_id", "Trixie"), ("cluster", "retain")]);
        let mut subject = Genome::new("Trixie", GenomeSource::Subject);
        resolve(&mut subject, &t, None, Some(&canonical()));
        assert_eq!(subject.pending.get(&GenomeField::Cluster), Some(&Sentinel::Retain));
    }

    #[test]
    fn test_fill_pending_is_idempotent() {
        let t = ticket(&[("type", "replace"), ("phage_id", "Trixie"), ("cluster", "retrieve")]);
        let mut subject = Genome::new("Trixie", GenomeSource::Subject);
        resolve(&mut subject, &t, Some(&community()), None);
        let before = subject.clone();
        let filled = fill_pending(
            &mut subject,
            TicketType::Replace,
            Some(&canonical()),
            Some(&canonical()),
        );
        assert_eq!(filled, 0);
        assert_eq!(subject.cluster, before.cluster);
        assert_eq!(subject.pending, before.pending);
    }

    #[test]
    fn test_bad_literal_reported() {
        let t = ticket(&[("type", "add"), ("phage_id", "Trixie"), ("annotation_author", "2")]);
        let mut subject = Genome::new("Trixie", GenomeSource::Subject);
        let evals = resolve(&mut subject, &t, None, None);
        assert_eq!(evals.len(), 1);
        assert_eq!(evals[0].id, "BNDL_011");
    }

    #[test]
    fn test_literal_sentinel_value_detected() {
        let mut subject = Genome::new("Trixie", GenomeSource::Subject);
        subject.host_genus = "retain".to_string();
        assert!(check_sentinel(&subject, Sentinel::Retain, "GNM_034").is_error());
    }
}
