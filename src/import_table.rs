use crate::error::{ReconcileError, Result};
use crate::ticket::{OPTIONAL_COLUMNS, REQUIRED_COLUMNS, Ticket};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::BTreeMap;
use std::path::Path;

pub type Row = BTreeMap<String, String>;

/// Reads the import table. Header names are trimmed and lower-cased; a table
/// missing a required column is rejected as a whole.
pub fn read_import_table(path: &Path) -> Result<Vec<Row>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_path(path)
        .map_err(|e| ReconcileError::io(format!("Could not open '{}': {e}", path.display())))?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ReconcileError::invalid_input(format!(
            "Import table '{}' lacks required column(s): {}",
            path.display(),
            missing.join(", ")
        )));
    }
    let mut rows = vec![];
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        if row.values().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Writes tickets back in import-table form so they can be corrected and
/// resubmitted.
pub fn write_ticket_table(path: &Path, tickets: &[&Ticket]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|e| ReconcileError::io(format!("Could not create '{}': {e}", path.display())))?;
    let headers: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .chain(OPTIONAL_COLUMNS.iter())
        .copied()
        .collect();
    writer.write_record(&headers)?;
    for ticket in tickets {
        let record: Vec<&str> = headers
            .iter()
            .map(|h| ticket.data_dict.get(*h).map(String::as_str).unwrap_or(""))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketDefaults;
    use tempfile::tempdir;

    #[test]
    fn test_read_and_rewrite_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.csv");
        std::fs::write(
            &path,
            "Type,Phage_ID,Host_Genus,Cluster\nadd, Trixie ,retrieve,A\n,,,\nremove,L5,,\n",
        )
        .unwrap();
        let rows = read_import_table(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("phage_id").map(String::as_str), Some("Trixie"));

        let ticket = Ticket::from_row(1, &rows[0], &TicketDefaults::default()).unwrap();
        let out = dir.path().join("out.csv");
        write_ticket_table(&out, &[&ticket]).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("type,phage_id,host_genus,cluster"));
        assert!(lines.next().unwrap().starts_with("add,Trixie,retrieve,A"));
    }

    #[test]
    fn test_missing_required_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.csv");
        std::fs::write(&path, "type,cluster\nadd,A\n").unwrap();
        let err = read_import_table(&path).unwrap_err();
        assert!(err.message.contains("phage_id"));
    }
}
