//! Historical cohort outcome import.
//!
//! Registrar exports arrive as CSV with one row per past cohort
//! (`Program, Start Date, Applications, Offers Extended, Confirmed`). The
//! importer feeds `CapacityMonitor::set_history`, which drives the
//! historical yield rate and the application-volume deviation factor.

mod parser;

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::workflows::admissions::capacity::CohortOutcome;

#[derive(Debug)]
pub enum RegistrarImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for RegistrarImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrarImportError::Io(err) => {
                write!(f, "failed to read registrar export: {}", err)
            }
            RegistrarImportError::Csv(err) => write!(f, "invalid registrar CSV data: {}", err),
        }
    }
}

impl std::error::Error for RegistrarImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrarImportError::Io(err) => Some(err),
            RegistrarImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RegistrarImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RegistrarImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub struct RegistrarHistoryImporter;

impl RegistrarHistoryImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<CohortOutcome>, RegistrarImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse outcomes from a reader. The first row seen for a cohort wins;
    /// later duplicates are dropped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<CohortOutcome>, RegistrarImportError> {
        let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
        let mut outcomes = Vec::new();

        for outcome in parser::parse_outcomes(reader)? {
            if seen.insert((outcome.program_id.clone(), outcome.start_date)) {
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "Program,Start Date,Applications,Offers Extended,Confirmed\n";

    #[test]
    fn importer_reads_cohort_rows() {
        let csv = format!("{HEADER}MBA,2024-09-01,320,140,118\nMBA,2025-09-01,355,150,121\n");
        let outcomes =
            RegistrarHistoryImporter::from_reader(Cursor::new(csv)).expect("import succeeds");

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].program_id, "MBA");
        assert_eq!(outcomes[0].applications, 320);
        assert_eq!(outcomes[0].offers_extended, 140);
        assert_eq!(outcomes[0].confirmed, 118);
        assert_eq!(
            outcomes[1].start_date,
            NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
        );
    }

    #[test]
    fn importer_skips_rows_without_program_or_date() {
        let csv = format!("{HEADER},2024-09-01,300,120,100\nMBA,last fall,300,120,100\n");
        let outcomes =
            RegistrarHistoryImporter::from_reader(Cursor::new(csv)).expect("import succeeds");

        assert!(outcomes.is_empty());
    }

    #[test]
    fn importer_defaults_missing_counts_and_drops_garbage_counts() {
        let csv = format!("{HEADER}MBA,2024-09-01,,,\nLLM,2024-09-01,lots,12,9\n");
        let outcomes =
            RegistrarHistoryImporter::from_reader(Cursor::new(csv)).expect("import succeeds");

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].program_id, "MBA");
        assert_eq!(outcomes[0].applications, 0);
        assert_eq!(outcomes[0].offers_extended, 0);
        assert!(outcomes[0].yield_rate().is_none());
    }

    #[test]
    fn importer_treats_blank_fields_as_absent() {
        let csv = format!("{HEADER}MBA,   ,320,140,118\nLLM,2024-09-01,   ,12,\n");
        let outcomes =
            RegistrarHistoryImporter::from_reader(Cursor::new(csv)).expect("import succeeds");

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].program_id, "LLM");
        assert_eq!(outcomes[0].applications, 0);
        assert_eq!(outcomes[0].offers_extended, 12);
        assert_eq!(outcomes[0].confirmed, 0);
    }

    #[test]
    fn importer_keeps_first_row_for_duplicate_cohorts() {
        let csv = format!("{HEADER}MBA,2024-09-01,320,140,118\nMBA,2024-09-01,999,999,999\n");
        let outcomes =
            RegistrarHistoryImporter::from_reader(Cursor::new(csv)).expect("import succeeds");

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].applications, 320);
    }

    #[test]
    fn importer_from_path_propagates_io_errors() {
        let error = RegistrarHistoryImporter::from_path("./does-not-exist.csv")
            .expect_err("expected io error");

        match error {
            RegistrarImportError::Io(_) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
