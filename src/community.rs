//! Community repository access (PhagesDB-style JSON API).
//!
//! Retrieval never fails loudly: network or format problems are logged and
//! surface as an absent genome or an unavailable reference set, which the
//! checks then report.

use crate::error::{ReconcileError, Result};
use crate::genome::{Genome, GenomeSource, UNKNOWN_CLUSTER};
use bio::io::fasta;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://phagesdb.org/api";

/// Valid values published by the community repository. Empty sets mean the
/// repository could not be queried.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSets {
    pub host_genera: BTreeSet<String>,
    pub clusters: BTreeSet<String>,
    pub subclusters: BTreeSet<String>,
}

impl ReferenceSets {
    pub fn is_available(&self) -> bool {
        !self.host_genera.is_empty() || !self.clusters.is_empty() || !self.subclusters.is_empty()
    }
}

pub trait CommunityClient: Sync {
    fn fetch_genome(&self, phage_id: &str) -> Option<Genome>;
    fn reference_sets(&self) -> ReferenceSets;
}

/// A client that knows nothing; used for offline runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCommunity;

impl CommunityClient for OfflineCommunity {
    fn fetch_genome(&self, _phage_id: &str) -> Option<Genome> {
        None
    }

    fn reference_sets(&self) -> ReferenceSets {
        ReferenceSets::default()
    }
}

pub struct PhagesDbClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl PhagesDbClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.json::<Value>()?)
    }

    fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }

    /// Follows `next` links and collects `key` from every result.
    fn get_paginated_values(&self, url: &str, key: &str) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next.take() {
            let page = self.get_json(&url)?;
            let results = page
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| ReconcileError::parse(format!("No results array at '{url}'")))?;
            out.extend(
                results
                    .iter()
                    .filter_map(|r| r.get(key).and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            );
            next = page.get("next").and_then(Value::as_str).map(str::to_string);
        }
        Ok(out)
    }

    fn try_fetch_genome(&self, phage_id: &str) -> Result<Option<Genome>> {
        let data = self.get_json(&format!("{}/phages/{}/", self.base_url, phage_id))?;
        let Some(mut genome) = parse_phage_json(&data) else {
            return Ok(None);
        };
        if let Some(fasta_url) = data.get("fasta_file").and_then(Value::as_str) {
            if !fasta_url.is_empty() {
                let text = self.get_text(fasta_url)?;
                if let Some(sequence) = parse_fasta_sequence(&text) {
                    genome.set_sequence(&sequence);
                }
            }
        }
        Ok(Some(genome))
    }
}

impl CommunityClient for PhagesDbClient {
    fn fetch_genome(&self, phage_id: &str) -> Option<Genome> {
        match self.try_fetch_genome(phage_id) {
            Ok(genome) => genome,
            Err(e) => {
                tracing::warn!(phage_id, "Could not retrieve community genome: {e}");
                None
            }
        }
    }

    fn reference_sets(&self) -> ReferenceSets {
        let fetch = |path: &str, key: &str| {
            let url = format!("{}/{path}/", self.base_url);
            self.get_paginated_values(&url, key).unwrap_or_else(|e| {
                tracing::warn!(url, "Could not retrieve reference values: {e}");
                BTreeSet::new()
            })
        };
        ReferenceSets {
            host_genera: fetch("host_genera", "genus_name"),
            clusters: fetch("clusters", "cluster"),
            subclusters: fetch("subclusters", "subcluster"),
        }
    }
}

fn nested_str<'a>(data: &'a Value, outer: &str, inner: &str) -> Option<&'a str> {
    data.get(outer)?.get(inner)?.as_str()
}

/// Builds a community genome from one phage record. A record without a name
/// yields `None`.
pub fn parse_phage_json(data: &Value) -> Option<Genome> {
    let name = data.get("phage_name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let mut genome = Genome::new(name, GenomeSource::Community);
    genome.cluster = nested_str(data, "pcluster", "cluster")
        .unwrap_or(UNKNOWN_CLUSTER)
        .to_string();
    genome.subcluster = nested_str(data, "psubcluster", "subcluster")
        .unwrap_or("")
        .to_string();
    genome.host_genus = nested_str(data, "isolation_host", "genus")
        .unwrap_or("")
        .to_string();
    genome.accession = data
        .get("genbank_accession")
        .and_then(Value::as_str)
        .map(|a| a.trim().split('.').next().unwrap_or("").to_string())
        .unwrap_or_default();
    Some(genome)
}

pub fn parse_fasta_sequence(text: &str) -> Option<String> {
    let record = fasta::Reader::new(text.as_bytes()).records().next()?.ok()?;
    Some(String::from_utf8_lossy(record.seq()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_phage_json() {
        let data = json!({
            "phage_name": "Trixie",
            "pcluster": {"cluster": "A"},
            "psubcluster": {"subcluster": "A2"},
            "isolation_host": {"genus": "Mycobacterium"},
            "genbank_accession": "JN408461.1",
            "fasta_file": ""
        });
        let genome = parse_phage_json(&data).unwrap();
        assert_eq!(genome.id, "Trixie");
        assert_eq!(genome.origin, GenomeSource::Community);
        assert_eq!(genome.cluster, "A");
        assert_eq!(genome.subcluster, "A2");
        assert_eq!(genome.host_genus, "Mycobacterium");
        assert_eq!(genome.accession, "JN408461");
    }

    #[test]
    fn test_parse_phage_json_fills_unknowns() {
        let data = json!({"phage_name": "Orphan", "pcluster": null, "psubcluster": null});
        let genome = parse_phage_json(&data).unwrap();
        assert_eq!(genome.cluster, UNKNOWN_CLUSTER);
        assert_eq!(genome.subcluster, "");
        assert!(parse_phage_json(&json!({"phage_name": ""})).is_none());
    }

    #[test]
    fn test_parse_fasta_sequence() {
        let text = ">Trixie\nATGC\nGGTA\n";
        assert_eq!(parse_fasta_sequence(text).as_deref(), Some("ATGCGGTA"));
        assert_eq!(parse_fasta_sequence(""), None);
    }

    #[test]
    fn test_offline_client_is_empty() {
        assert!(OfflineCommunity.fetch_genome("Trixie").is_none());
        assert!(!OfflineCommunity.reference_sets().is_available());
    }
}
