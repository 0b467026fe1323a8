use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::workflows::admissions::capacity::CohortOutcome;

pub(crate) fn parse_outcomes<R: Read>(reader: R) -> Result<Vec<CohortOutcome>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut outcomes = Vec::new();

    for record in csv_reader.deserialize::<OutcomeRow>() {
        let row = record?;
        if let Some(outcome) = row.outcome() {
            outcomes.push(outcome);
        }
    }

    Ok(outcomes)
}

#[derive(Debug, Deserialize)]
struct OutcomeRow {
    #[serde(rename = "Program")]
    program: String,
    #[serde(
        rename = "Start Date",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    start_date: Option<String>,
    #[serde(
        rename = "Applications",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    applications: Option<String>,
    #[serde(
        rename = "Offers Extended",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    offers_extended: Option<String>,
    #[serde(
        rename = "Confirmed",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    confirmed: Option<String>,
}

impl OutcomeRow {
    /// Rows without a program name, a parseable start date, or numeric
    /// counts are dropped rather than failing the import.
    fn outcome(&self) -> Option<CohortOutcome> {
        let program = self.program.trim();
        if program.is_empty() {
            return None;
        }
        let start_date = self.start_date.as_deref().and_then(parse_date)?;

        Some(CohortOutcome {
            program_id: program.to_string(),
            start_date,
            applications: count(self.applications.as_deref())?,
            offers_extended: count(self.offers_extended.as_deref())?,
            confirmed: count(self.confirmed.as_deref())?,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// An absent count reads as zero; a non-numeric one invalidates the row.
fn count(value: Option<&str>) -> Option<u32> {
    match value {
        None => Some(0),
        Some(raw) => raw.trim().parse().ok(),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(date);
    }

    None
}
