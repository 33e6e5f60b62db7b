//! Named checks for tickets, genomes, features and pairs.
//!
//! Every check appends exactly one evaluation and none stops the others.
//! Optional categories are switched by the ticket's [`EvalFlags`]. Genome
//! batteries are chosen by the genome's [`GenomeSource`] through
//! [`GENOME_VALIDATORS`].

use crate::alphabet::{format_letters, invalid_amino_acids, invalid_nucleotides};
use crate::bundle::{Bundle, BundleState, GenomeKey};
use crate::community::ReferenceSets;
use crate::error::Result;
use crate::evaluation::{self, CheckKind, EvalStatus, Evaluation};
use crate::genome::{
    AnnotationStatus, CdsFeature, DescriptionField, Genome, GenomeField, GenomeSource, Sentinel,
    SourceFeature, Strand, TrnaFeature,
};
use crate::genome_pair::{CompareOptions, pair_key};
use crate::provenance;
use crate::store::StoreSnapshot;
use crate::ticket::{EvalFlags, Ticket, TicketType};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Generic words skipped when looking for a host genus in free text.
pub const HOST_IGNORE: [&str; 4] = ["enterobacteria", "phage", "bacteriophage", "cyanophage"];
pub const AUTHOR_PLACEHOLDERS: [&str; 2] = ["lastname", "firstname"];
const GENERIC_DESCRIPTIONS: [&str; 5] = [
    "hypothetical protein",
    "hypothetical",
    "protein",
    "gp",
    "orf",
];

lazy_static! {
    static ref CLUSTER_RE: Regex = Regex::new(r"^[A-Z]+$").expect("cluster regex is valid");
    static ref SUBCLUSTER_RE: Regex =
        Regex::new(r"^([A-Z]+)([0-9]+)$").expect("subcluster regex is valid");
    static ref GENE_RE: Regex = Regex::new(r"^[0-9]+[A-Za-z]*$").expect("gene regex is valid");
    static ref GENERIC_NUMBERED_RE: Regex =
        Regex::new(r"(?i)^(gp|orf)\s*[0-9]+[a-z]?$").expect("generic description regex is valid");
    static ref TRNA_PRODUCT_RE: Regex =
        Regex::new(r"^tRNA-[A-Z][a-z]{2}").expect("tRNA product regex is valid");
}

/// Everything a check may consult besides the entity itself.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub snapshot: &'a StoreSnapshot,
    pub references: &'a ReferenceSets,
    pub curator: &'a str,
    pub translation_table: u32,
}

/// Ticket-derived parameters for one genome's checks.
#[derive(Debug, Clone, Copy)]
pub struct GenomeScope<'a> {
    pub ticket_type: TicketType,
    pub flags: EvalFlags,
    pub description_field: DescriptionField,
    pub ticket: Option<&'a Ticket>,
    pub ctx: &'a CheckContext<'a>,
}

pub type GenomeValidator = fn(&Genome, &GenomeScope) -> Vec<Evaluation>;

pub static GENOME_VALIDATORS: [(GenomeSource, GenomeValidator); 4] = [
    (GenomeSource::Subject, check_subject_genome),
    (GenomeSource::Community, check_community_genome),
    (GenomeSource::Archive, check_archive_genome),
    (GenomeSource::Canonical, check_canonical_genome),
];

pub fn validator_for(source: GenomeSource) -> GenomeValidator {
    GENOME_VALIDATORS
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, v)| *v)
        .unwrap_or(check_canonical_genome)
}

// --- text searches ---------------------------------------------------------

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Lower-cased search token for a host genus; `-ium` genera are searched by
/// their stem so adjectival forms still match.
pub fn host_token(host_genus: &str) -> String {
    let lower = host_genus.trim().to_lowercase();
    match lower.strip_suffix("ium") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

pub fn mentions_host(text: &str, host_genus: &str) -> bool {
    let token = host_token(host_genus);
    if token.is_empty() {
        return false;
    }
    words(text)
        .filter(|w| !HOST_IGNORE.contains(&w.as_str()))
        .any(|w| w.contains(&token))
}

pub fn mentions_name(text: &str, search_name: &str) -> bool {
    !search_name.is_empty() && text.to_lowercase().contains(search_name)
}

fn mentions_author(authors: &str, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    !name.is_empty() && words(authors).any(|w| w == name)
}

fn name_check(id: &str, field: &str, text: &str, genome: &Genome) -> Evaluation {
    let search = genome.search_id();
    evaluation::expect(
        id,
        &format!("Check that the genome name is spelled the same in the {field}."),
        mentions_name(text, &search),
        format!("The {field} '{text}' does not mention '{search}'."),
        EvalStatus::Error,
        CheckKind::DataQuality,
    )
}

fn host_check(id: &str, field: &str, text: &str, host_genus: &str) -> Evaluation {
    let definition = format!("Check that the host genus is spelled the same in the {field}.");
    if host_genus.trim().is_empty() {
        return evaluation::not_evaluated(id, &definition, "no host genus", CheckKind::DataQuality);
    }
    evaluation::expect(
        id,
        &definition,
        mentions_host(text, host_genus),
        format!("The {field} '{text}' does not mention '{host_genus}'."),
        EvalStatus::Error,
        CheckKind::DataQuality,
    )
}

fn reference_check(id: &str, what: &str, value: &str, set: &BTreeSet<String>, available: bool) -> Evaluation {
    let definition = format!("Check that the {what} is a known value.");
    if !available {
        return evaluation::warning(
            id,
            &definition,
            "Reference values are unavailable.",
            CheckKind::DataQuality,
        );
    }
    evaluation::present(id, &definition, value, set, CheckKind::DataQuality)
}

// --- ticket ----------------------------------------------------------------

const RETRIEVE_FIELDS: [GenomeField; 4] = [
    GenomeField::HostGenus,
    GenomeField::Cluster,
    GenomeField::Subcluster,
    GenomeField::Accession,
];

fn illegal_fields<'a>(fields: impl Iterator<Item = &'a GenomeField>, legal: &[GenomeField]) -> Vec<String> {
    fields
        .filter(|f| !legal.contains(f))
        .map(|f| f.to_string())
        .collect()
}

/// Per-ticket checks. Batch-wide duplicate checks run separately in
/// [`crate::ticket::check_ticket_batch`].
pub fn check_ticket(ticket: &Ticket) -> Vec<Evaluation> {
    let mut out = vec![evaluation::expect(
        "TKT_007",
        "Check that the phage_id is populated.",
        !ticket.phage_id.trim().is_empty(),
        "The phage_id is empty.",
        EvalStatus::Error,
        CheckKind::DataQuality,
    )];
    out.push(evaluation::expect(
        "TKT_009",
        "Check that retained fields are only requested on replace tickets.",
        ticket.data_retain.is_empty() || ticket.ticket_type == TicketType::Replace,
        format!("A {} ticket cannot retain fields.", ticket.ticket_type),
        EvalStatus::Error,
        CheckKind::DataQuality,
    ));
    let sources: [(&str, &str, Vec<String>); 3] = [
        (
            "TKT_010",
            "ticket",
            illegal_fields(ticket.data_ticket.keys(), &GenomeField::ALL),
        ),
        (
            "TKT_011",
            "retain",
            illegal_fields(
                ticket.data_retain.iter(),
                &[
                    GenomeField::HostGenus,
                    GenomeField::Cluster,
                    GenomeField::Subcluster,
                    GenomeField::Accession,
                    GenomeField::AnnotationAuthor,
                    GenomeField::RetrieveRecord,
                    GenomeField::TranslationTable,
                ],
            ),
        ),
        (
            "TKT_012",
            "retrieve",
            illegal_fields(ticket.data_retrieve.iter(), &RETRIEVE_FIELDS),
        ),
    ];
    for (id, source, illegal) in sources {
        out.push(evaluation::expect(
            id,
            &format!("Check that only valid fields use the {source} source."),
            illegal.is_empty(),
            format!("Fields that cannot use the {source} source: {}.", illegal.join(", ")),
            EvalStatus::Error,
            CheckKind::DataQuality,
        ));
    }
    out
}

// --- genome batteries ------------------------------------------------------

fn check_identity(genome: &Genome, ticket_type: TicketType, snapshot: &StoreSnapshot, out: &mut Vec<Evaluation>) {
    let name = genome.search_name();
    let in_ids = |value: &str| snapshot.ids.iter().any(|id| id.eq_ignore_ascii_case(value));
    let dq = CheckKind::DataQuality;
    match ticket_type {
        TicketType::Add => {
            out.push(evaluation::absent(
                "GNM_001",
                "Check that the genome id is not already in the database.",
                &genome.id,
                &snapshot.ids,
                dq,
            ));
            out.push(evaluation::expect(
                "GNM_002",
                "Check that the genome name is not already in the database.",
                !in_ids(&name),
                format!("The name '{}' is already in use.", genome.name),
                EvalStatus::Error,
                dq,
            ));
            out.push(evaluation::expect(
                "GNM_003",
                "Check that the genome sequence is not already in the database.",
                !snapshot.sequences.contains(genome.sequence()),
                "The sequence is already in the database.",
                EvalStatus::Error,
                dq,
            ));
            if !genome.accession.is_empty() {
                out.push(evaluation::absent(
                    "GNM_005",
                    "Check that the accession is not already in the database.",
                    &genome.accession,
                    &snapshot.accessions,
                    dq,
                ));
            }
        }
        TicketType::Replace => {
            out.push(evaluation::present(
                "GNM_006",
                "Check that the genome id is in the database.",
                &genome.id,
                &snapshot.ids,
                dq,
            ));
            out.push(evaluation::expect(
                "GNM_007",
                "Check that the genome name is in the database.",
                in_ids(&name),
                format!("The name '{}' is not in the database.", genome.name),
                EvalStatus::Error,
                dq,
            ));
            out.push(evaluation::expect(
                "GNM_008",
                "Check that the genome sequence is in the database.",
                snapshot.sequences.contains(genome.sequence()),
                "The sequence is not in the database.",
                EvalStatus::Error,
                dq,
            ));
        }
        TicketType::Update | TicketType::Remove => {
            out.push(evaluation::present(
                "GNM_006",
                "Check that the genome id is in the database.",
                &genome.id,
                &snapshot.ids,
                dq,
            ));
        }
    }
}

fn check_record_fields(genome: &Genome, refs: &ReferenceSets, only: Option<&BTreeSet<GenomeField>>, out: &mut Vec<Evaluation>) {
    let wanted = |field: GenomeField| only.map(|set| set.contains(&field)).unwrap_or(true);
    let dq = CheckKind::DataQuality;
    let available = refs.is_available();

    if wanted(GenomeField::AnnotationStatus) {
        out.push(evaluation::expect(
            "GNM_010",
            "Check that the annotation status is known.",
            genome.annotation_status != AnnotationStatus::Unknown,
            "The annotation status is unknown.",
            EvalStatus::Warning,
            dq,
        ));
    }
    if wanted(GenomeField::AnnotationAuthor) {
        out.push(evaluation::expect(
            "GNM_011",
            "Check that the annotation author flag is 0 or 1.",
            genome.annotation_author <= 1,
            format!("The annotation author flag is {}.", genome.annotation_author),
            EvalStatus::Error,
            dq,
        ));
    }
    if wanted(GenomeField::RetrieveRecord) {
        out.push(evaluation::expect(
            "GNM_012",
            "Check that the retrieve record flag is 0 or 1.",
            genome.retrieve_record <= 1,
            format!("The retrieve record flag is {}.", genome.retrieve_record),
            EvalStatus::Error,
            dq,
        ));
    }
    let special_cluster = genome.is_singleton() || genome.is_unknown_cluster();
    if wanted(GenomeField::Cluster) {
        out.push(if special_cluster {
            evaluation::correct(
                "GNM_013",
                "Check that the cluster is a known value.",
                "Singleton and unknown clusters are always valid.",
                dq,
            )
        } else {
            reference_check("GNM_013", "cluster", &genome.cluster, &refs.clusters, available)
        });
    }
    if wanted(GenomeField::Subcluster) {
        out.push(if genome.subcluster.is_empty() {
            evaluation::correct(
                "GNM_014",
                "Check that the subcluster is a known value.",
                "No subcluster.",
                dq,
            )
        } else {
            reference_check(
                "GNM_014",
                "subcluster",
                &genome.subcluster,
                &refs.subclusters,
                available,
            )
        });
        out.push(evaluation::expect(
            "GNM_015",
            "Check that the subcluster is structured correctly.",
            genome.subcluster.is_empty() || SUBCLUSTER_RE.is_match(&genome.subcluster),
            format!("The subcluster '{}' is not a cluster letter code with a number.", genome.subcluster),
            EvalStatus::Error,
            dq,
        ));
    }
    if wanted(GenomeField::Cluster) {
        out.push(evaluation::expect(
            "GNM_016",
            "Check that the cluster is structured correctly.",
            special_cluster || CLUSTER_RE.is_match(&genome.cluster),
            format!("The cluster '{}' is not structured correctly.", genome.cluster),
            EvalStatus::Error,
            dq,
        ));
    }
    if wanted(GenomeField::Cluster) || wanted(GenomeField::Subcluster) {
        let compatible = if genome.subcluster.is_empty() {
            true
        } else if special_cluster {
            false
        } else {
            SUBCLUSTER_RE
                .captures(&genome.subcluster)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str() == genome.cluster)
                .unwrap_or(false)
        };
        out.push(evaluation::expect(
            "GNM_017",
            "Check that the cluster and subcluster are compatible.",
            compatible,
            format!(
                "The subcluster '{}' does not belong to cluster '{}'.",
                genome.subcluster, genome.cluster
            ),
            EvalStatus::Error,
            dq,
        ));
    }
}

fn check_author(genome: &Genome, curator: &str, out: &mut Vec<Evaluation>) {
    let dq = CheckKind::DataQuality;
    if genome.annotation_author == 1 {
        out.push(evaluation::expect(
            "GNM_028",
            "Check that the curator is listed among the authors.",
            mentions_author(&genome.authors, curator),
            format!("The authors '{}' do not include '{curator}'.", genome.authors),
            EvalStatus::Error,
            dq,
        ));
        let placeholders: Vec<&str> = AUTHOR_PLACEHOLDERS
            .iter()
            .filter(|p| mentions_author(&genome.authors, p))
            .copied()
            .collect();
        out.push(evaluation::expect(
            "GNM_029",
            "Check that the authors are not placeholder names.",
            placeholders.is_empty(),
            format!("The authors contain placeholder(s): {}.", placeholders.join(", ")),
            EvalStatus::Error,
            dq,
        ));
    } else {
        out.push(evaluation::expect(
            "GNM_030",
            "Check that the curator is not listed for an externally annotated genome.",
            !mentions_author(&genome.authors, curator),
            format!("The authors unexpectedly include '{curator}'."),
            EvalStatus::Error,
            dq,
        ));
    }
}

/// Duplicate CDS coordinates. Raised while the batch is assembled.
pub fn check_duplicate_features(genome: &Genome) -> Evaluation {
    let duplicates = genome.duplicate_cds_keys();
    let listed: Vec<String> = duplicates
        .iter()
        .map(|(l, r, s)| format!("{l}..{r} ({s})"))
        .collect();
    evaluation::expect(
        "GNM_032",
        "Check that no two CDS features share coordinates and strand.",
        duplicates.is_empty(),
        format!("Duplicated CDS coordinates: {}.", listed.join(", ")),
        EvalStatus::Error,
        CheckKind::Duplicate,
    )
}

pub fn check_subject_genome(genome: &Genome, scope: &GenomeScope) -> Vec<Evaluation> {
    let mut out = vec![];
    let ctx = scope.ctx;
    let flags = scope.flags;
    let dq = CheckKind::DataQuality;
    check_identity(genome, scope.ticket_type, ctx.snapshot, &mut out);

    if scope.ticket_type == TicketType::Update {
        // Only the fields the ticket patches are meaningful on an update.
        let named = scope.ticket.map(Ticket::named_fields).unwrap_or_default();
        check_record_fields(genome, ctx.references, Some(&named), &mut out);
        if flags.check_host_typo && named.contains(&GenomeField::HostGenus) {
            out.push(reference_check(
                "GNM_024",
                "host genus",
                &genome.host_genus,
                &ctx.references.host_genera,
                ctx.references.is_available(),
            ));
        }
        out.push(provenance::check_sentinel(genome, Sentinel::Retrieve, "GNM_033"));
        out.push(provenance::check_sentinel(genome, Sentinel::Retain, "GNM_034"));
        return out;
    }

    check_record_fields(genome, ctx.references, None, &mut out);
    if flags.check_seq {
        let invalid = invalid_nucleotides(genome.sequence());
        out.push(evaluation::expect(
            "GNM_018",
            "Check that the sequence only holds unambiguous nucleotides.",
            invalid.is_empty(),
            format!("Invalid nucleotides: {}.", format_letters(&invalid)),
            EvalStatus::Error,
            dq,
        ));
    }
    let is_draft = genome.annotation_status == AnnotationStatus::Draft;
    out.push(evaluation::expect(
        "GNM_019",
        "Check that a draft genome has no accession.",
        !(is_draft && !genome.accession.is_empty()),
        format!("The draft genome has accession '{}'.", genome.accession),
        EvalStatus::Error,
        dq,
    ));
    let described = genome.cds_with_description();
    out.push(match genome.annotation_status {
        AnnotationStatus::Draft => evaluation::expect(
            "GNM_020",
            "Check that CDS descriptions match the annotation status.",
            described == 0,
            format!("The draft genome has {described} described CDS feature(s)."),
            EvalStatus::Error,
            dq,
        ),
        AnnotationStatus::Final => evaluation::expect(
            "GNM_020",
            "Check that CDS descriptions match the annotation status.",
            described > 0 || genome.cds.is_empty(),
            "The final genome has no CDS descriptions.",
            EvalStatus::Warning,
            dq,
        ),
        AnnotationStatus::Unknown => evaluation::not_evaluated(
            "GNM_020",
            "Check that CDS descriptions match the annotation status.",
            "unknown annotation status",
            dq,
        ),
    });
    if flags.check_id_typo {
        out.push(name_check("GNM_021", "description", &genome.description, genome));
        out.push(name_check("GNM_022", "record source", &genome.record_source, genome));
        out.push(name_check("GNM_023", "organism", &genome.organism, genome));
    }
    if flags.check_host_typo {
        out.push(reference_check(
            "GNM_024",
            "host genus",
            &genome.host_genus,
            &ctx.references.host_genera,
            ctx.references.is_available(),
        ));
        out.push(host_check("GNM_025", "description", &genome.description, &genome.host_genus));
        out.push(host_check("GNM_026", "record source", &genome.record_source, &genome.host_genus));
        out.push(host_check("GNM_027", "organism", &genome.organism, &genome.host_genus));
    }
    if flags.check_author {
        check_author(genome, ctx.curator, &mut out);
    }
    out.push(evaluation::expect(
        "GNM_031",
        "Check that the genome has CDS features.",
        !genome.cds.is_empty(),
        "The genome has no CDS features.",
        EvalStatus::Warning,
        dq,
    ));
    out.push(provenance::check_sentinel(genome, Sentinel::Retrieve, "GNM_033"));
    out.push(provenance::check_sentinel(genome, Sentinel::Retain, "GNM_034"));
    out
}

pub fn check_community_genome(genome: &Genome, _scope: &GenomeScope) -> Vec<Evaluation> {
    let required = |id: &str, what: &str, value: &str, status: EvalStatus| {
        evaluation::expect(
            id,
            &format!("Check that the community record has a {what}."),
            !value.trim().is_empty(),
            format!("The community record has no {what}."),
            status,
            CheckKind::DataQuality,
        )
    };
    vec![
        required("GNM_035", "name", &genome.id, EvalStatus::Error),
        required("GNM_036", "host genus", &genome.host_genus, EvalStatus::Warning),
        required("GNM_037", "cluster", &genome.cluster, EvalStatus::Warning),
        required("GNM_038", "sequence", genome.sequence(), EvalStatus::Warning),
    ]
}

pub fn check_archive_genome(genome: &Genome, _scope: &GenomeScope) -> Vec<Evaluation> {
    vec![
        name_check("GNM_039", "description", &genome.description, genome),
        host_check("GNM_040", "organism", &genome.organism, &genome.host_genus),
    ]
}

pub fn check_canonical_genome(genome: &Genome, _scope: &GenomeScope) -> Vec<Evaluation> {
    vec![evaluation::expect(
        "GNM_041",
        "Check that the canonical record has an id.",
        !genome.id.trim().is_empty(),
        "The canonical record has no id.",
        EvalStatus::Error,
        CheckKind::DataQuality,
    )]
}

// --- features --------------------------------------------------------------

pub fn is_generic_description(description: &str) -> bool {
    let lower = description.trim().to_lowercase();
    GENERIC_DESCRIPTIONS.contains(&lower.as_str()) || GENERIC_NUMBERED_RE.is_match(&lower)
}

pub fn check_cds(
    cds: &CdsFeature,
    genome: &Genome,
    flags: &EvalFlags,
    description_field: DescriptionField,
    ctx: &CheckContext,
) -> Vec<Evaluation> {
    let dq = CheckKind::DataQuality;
    let mut out = vec![];
    let invalid = invalid_amino_acids(&cds.translation);
    out.push(evaluation::expect(
        "CDS_001",
        "Check that the translation only holds valid amino acids.",
        invalid.is_empty(),
        format!("Invalid amino acids: {}.", format_letters(&invalid)),
        EvalStatus::Error,
        dq,
    ));
    out.push(evaluation::expect(
        "CDS_003",
        "Check that the translation is present.",
        !cds.translation.is_empty(),
        "There is no translation.",
        EvalStatus::Error,
        dq,
    ));
    out.push(evaluation::expect(
        "CDS_004",
        "Check that the translation table is correct.",
        cds.translation_table == ctx.translation_table,
        format!(
            "The translation table is {}, expected {}.",
            cds.translation_table, ctx.translation_table
        ),
        EvalStatus::Error,
        dq,
    ));
    out.push(evaluation::expect(
        "CDS_005",
        "Check that the coordinates lie within the genome.",
        cds.left() < cds.right() && cds.right() <= genome.length(),
        format!(
            "The coordinates {}..{} exceed the genome length {}.",
            cds.left(),
            cds.right(),
            genome.length()
        ),
        EvalStatus::Error,
        dq,
    ));
    out.push(evaluation::expect(
        "CDS_006",
        "Check that the strand is known.",
        cds.strand() != Strand::Unknown,
        "The strand is unknown.",
        EvalStatus::Error,
        dq,
    ));
    let length_definition = "Check that the coding length fits the translation plus a stop codon.";
    out.push(if cds.parts > 1 {
        evaluation::not_evaluated("CDS_015", length_definition, "compound feature", dq)
    } else {
        let expected = 3 * cds.translation.len() + 3;
        evaluation::expect(
            "CDS_015",
            length_definition,
            cds.len() == expected,
            format!("The feature spans {} bp, expected {expected}.", cds.len()),
            EvalStatus::Error,
            dq,
        )
    });

    if flags.check_locus_tag {
        out.push(evaluation::expect(
            "CDS_007",
            "Check that the locus tag is present.",
            !cds.locus_tag.is_empty(),
            "There is no locus tag.",
            EvalStatus::Error,
            dq,
        ));
        let search = genome.search_id();
        out.push(if cds.locus_tag.is_empty() {
            evaluation::not_evaluated(
                "CDS_008",
                "Check that the locus tag contains the genome name.",
                "no locus tag",
                dq,
            )
        } else {
            evaluation::expect(
                "CDS_008",
                "Check that the locus tag contains the genome name.",
                cds.locus_tag.to_lowercase().contains(&search),
                format!("The locus tag '{}' does not contain '{search}'.", cds.locus_tag),
                EvalStatus::Error,
                dq,
            )
        });
    }
    if flags.check_gene {
        out.push(evaluation::expect(
            "CDS_009",
            "Check that the gene qualifier is present.",
            !cds.gene.is_empty(),
            "There is no gene qualifier.",
            EvalStatus::Error,
            dq,
        ));
        out.push(evaluation::expect(
            "CDS_010",
            "Check that the gene qualifier is a number.",
            GENE_RE.is_match(&cds.gene),
            format!("The gene qualifier '{}' is not a number.", cds.gene),
            EvalStatus::Error,
            dq,
        ));
    }
    if flags.check_locus_tag && flags.check_gene {
        let tag = cds.locus_tag.to_lowercase();
        let gene = cds.gene.to_lowercase();
        let compatible = !gene.is_empty()
            && tag.ends_with(&gene)
            && !tag[..tag.len() - gene.len()]
                .chars()
                .last()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false);
        out.push(evaluation::expect(
            "CDS_011",
            "Check that the locus tag ends with the gene number.",
            compatible,
            format!(
                "The locus tag '{}' does not end with gene '{}'.",
                cds.locus_tag, cds.gene
            ),
            EvalStatus::Error,
            dq,
        ));
    }
    if flags.check_description {
        out.push(evaluation::expect(
            "CDS_012",
            "Check that the description is informative.",
            !is_generic_description(&cds.description),
            format!("The description '{}' is generic.", cds.description),
            EvalStatus::Warning,
            dq,
        ));
    }
    if flags.check_description_field {
        let alternates = cds.populated_alternates(description_field);
        out.push(evaluation::expect(
            "CDS_014",
            "Check that the chosen description field holds the descriptions.",
            alternates.is_empty(),
            format!(
                "The {description_field} is empty but {} is not.",
                alternates
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(" and ")
            ),
            EvalStatus::Error,
            dq,
        ));
    }
    out
}

pub fn check_source(source: &SourceFeature, genome: &Genome, flags: &EvalFlags) -> Vec<Evaluation> {
    let mut out = vec![];
    if flags.check_id_typo {
        out.push(name_check("SRC_001", "source organism", &source.organism, genome));
    }
    if flags.check_host_typo {
        let fields = [
            ("SRC_002", "source organism", &source.organism),
            ("SRC_003", "source host", &source.host),
            ("SRC_004", "source lab host", &source.lab_host),
        ];
        for (id, field, text) in fields {
            if !text.is_empty() {
                out.push(host_check(id, field, text, &genome.host_genus));
            }
        }
    }
    out
}

pub fn check_trna(trna: &TrnaFeature, genome: &Genome) -> Vec<Evaluation> {
    let dq = CheckKind::DataQuality;
    vec![
        evaluation::expect(
            "TRNA_001",
            "Check that the tRNA coordinates lie within the genome.",
            trna.left < trna.right && trna.right <= genome.length(),
            format!("The coordinates {}..{} are invalid.", trna.left, trna.right),
            EvalStatus::Error,
            dq,
        ),
        evaluation::expect(
            "TRNA_002",
            "Check that the tRNA strand is known.",
            trna.strand != Strand::Unknown,
            "The strand is unknown.",
            EvalStatus::Error,
            dq,
        ),
        evaluation::expect(
            "TRNA_003",
            "Check that the tRNA product names an amino acid.",
            TRNA_PRODUCT_RE.is_match(&trna.product),
            format!("The product '{}' does not name an amino acid.", trna.product),
            EvalStatus::Error,
            dq,
        ),
    ]
}

// --- orchestration ---------------------------------------------------------

/// Runs the structural gate and, if it passes, every field check on the
/// bundle. Returns the aggregated error count.
pub fn run_checks(bundle: &mut Bundle, ctx: &CheckContext) -> Result<usize> {
    let structure_ok = bundle.check_bundle();
    bundle.advance(BundleState::StructurallyChecked)?;
    if !structure_ok {
        tracing::debug!(bundle = bundle.id, "Structural check failed; skipping field checks");
        return Ok(bundle.check_for_errors());
    }
    let Some(ticket) = bundle.ticket.as_mut() else {
        return Ok(bundle.check_for_errors());
    };
    for eval in check_ticket(ticket) {
        ticket.add_evaluation(eval);
    }
    let ticket = bundle.ticket.as_ref();
    let (ticket_type, flags, description_field) = match ticket {
        Some(t) => (t.ticket_type, t.eval_flags, t.description_field),
        None => return Ok(bundle.check_for_errors()),
    };

    if ticket_type == TicketType::Replace {
        let key = pair_key(GenomeKey::Canonical, GenomeKey::Subject);
        if let (Some(pair), Some(old), Some(new)) = (
            bundle.genome_pairs.get_mut(&key),
            bundle.genomes.get(&GenomeKey::Canonical),
            bundle.genomes.get(&GenomeKey::Subject),
        ) {
            let options = CompareOptions {
                check_replace: flags.check_replace,
                compare_features: true,
                description_field,
            };
            pair.compare(old, new, &options);
        }
    }

    let scope = GenomeScope {
        ticket_type,
        flags,
        description_field,
        ticket,
        ctx,
    };
    let genome_evals: Vec<(GenomeKey, Vec<Evaluation>)> = bundle
        .genomes
        .iter()
        .map(|(key, genome)| (*key, validator_for(genome.origin)(genome, &scope)))
        .collect();
    for (key, evals) in genome_evals {
        if let Some(genome) = bundle.genomes.get_mut(&key) {
            genome.evaluations.extend(evals);
        }
    }

    if let Some(subject) = bundle.genomes.get_mut(&GenomeKey::Subject) {
        let snapshot = subject.clone();
        for cds in subject.cds.iter_mut() {
            let evals = check_cds(cds, &snapshot, &flags, description_field, ctx);
            cds.evaluations.extend(evals);
        }
        for source in subject.source_features.iter_mut() {
            let evals = check_source(source, &snapshot, &flags);
            source.evaluations.extend(evals);
        }
        if flags.check_trna {
            for trna in subject.trna.iter_mut() {
                let evals = check_trna(trna, &snapshot);
                trna.evaluations.extend(evals);
            }
        }
    }

    bundle.advance(BundleState::FieldChecked)?;
    Ok(bundle.check_for_errors())
}
