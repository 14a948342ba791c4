//! Trial records and the `DATA,...` line format.

use crate::error::ParseError;
use chrono::{NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Prefix that marks a trial line on the wire.
pub const DATA_TAG: &str = "DATA";

const DATA_FIELD_COUNT: usize = 7;

/// Format of the Timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed dwell-time measurement.
///
/// `entry_time` and `exit_time` are device `millis()` readings; they are only
/// comparable within one device boot. `observed_at` is the local wall clock
/// when the line was parsed, truncated to whole seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    /// Trial number as counted by the device
    pub trial: u32,
    /// Carousel position the trial ran at
    pub position: u32,
    /// Device millis when the subject entered
    pub entry_time: u64,
    /// Device millis when the subject left
    pub exit_time: u64,
    /// Seconds, computed by the device
    pub dwell_time: f64,
    /// `AUTO`, `MANUAL`, or whatever the firmware sends
    pub event: String,
    /// Local time the line was received
    pub observed_at: NaiveDateTime,
}

impl TrialRecord {
    /// Parse `DATA,Trial,Position,EntryTime,ExitTime,DwellTime,Event`.
    ///
    /// Any malformed field rejects the whole line.
    pub fn parse(line: &str, observed_at: NaiveDateTime) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != DATA_FIELD_COUNT {
            return Err(ParseError::FieldCount {
                expected: DATA_FIELD_COUNT,
                found: parts.len(),
            });
        }
        if parts[0] != DATA_TAG {
            return Err(ParseError::NotData(parts[0].to_string()));
        }

        Ok(Self {
            trial: parse_field("Trial", parts[1])?,
            position: parse_field("Position", parts[2])?,
            entry_time: parse_field("EntryTime", parts[3])?,
            exit_time: parse_field("ExitTime", parts[4])?,
            dwell_time: parse_field("DwellTime", parts[5])?,
            event: parts[6].trim().to_string(),
            observed_at: observed_at.trunc_subsecs(0),
        })
    }
}

fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.trim().parse().map_err(|_| ParseError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

/// On-disk row. Field order is column order.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TrialRow {
    #[serde(rename = "Trial")]
    trial: u32,
    #[serde(rename = "Position")]
    position: u32,
    #[serde(rename = "DwellTime(s)")]
    dwell_time: f64,
    #[serde(rename = "Door Event")]
    event: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "EntryTime")]
    entry_time: u64,
    #[serde(rename = "ExitTime")]
    exit_time: u64,
}

/// Column names in file order.
pub const COLUMNS: [&str; 7] = [
    "Trial",
    "Position",
    "DwellTime(s)",
    "Door Event",
    "Timestamp",
    "EntryTime",
    "ExitTime",
];

impl From<&TrialRecord> for TrialRow {
    fn from(record: &TrialRecord) -> Self {
        Self {
            trial: record.trial,
            position: record.position,
            dwell_time: record.dwell_time,
            event: record.event.clone(),
            timestamp: record.observed_at.format(TIMESTAMP_FORMAT).to_string(),
            entry_time: record.entry_time,
            exit_time: record.exit_time,
        }
    }
}

impl TryFrom<TrialRow> for TrialRecord {
    type Error = String;

    fn try_from(row: TrialRow) -> Result<Self, Self::Error> {
        let observed_at = NaiveDateTime::parse_from_str(&row.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| format!("bad Timestamp '{}': {}", row.timestamp, e))?;
        Ok(Self {
            trial: row.trial,
            position: row.position,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            dwell_time: row.dwell_time,
            event: row.event,
            observed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 7)
            .unwrap()
            .and_hms_milli_opt(12, 30, 15, 870)
            .unwrap()
    }

    #[test]
    fn test_parses_reference_line() {
        let record = TrialRecord::parse("DATA,7,5,12543,18865,6.32,AUTO", noon()).unwrap();
        assert_eq!(record.trial, 7);
        assert_eq!(record.position, 5);
        assert_eq!(record.entry_time, 12543);
        assert_eq!(record.exit_time, 18865);
        assert_eq!(record.dwell_time, 6.32);
        assert_eq!(record.event, "AUTO");
        assert_eq!(
            record.observed_at,
            NaiveDate::from_ymd_opt(2025, 11, 7)
                .unwrap()
                .and_hms_opt(12, 30, 15)
                .unwrap()
        );
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert_eq!(
            TrialRecord::parse("DATA,7,5,12543,18865,6.32", noon()),
            Err(ParseError::FieldCount {
                expected: 7,
                found: 6
            })
        );
        assert_eq!(
            TrialRecord::parse("DATA,7,5,12543,18865,6.32,AUTO,extra", noon()),
            Err(ParseError::FieldCount {
                expected: 7,
                found: 8
            })
        );
    }

    #[test]
    fn test_rejects_non_numeric_fields() {
        let err = TrialRecord::parse("DATA,seven,5,12543,18865,6.32,AUTO", noon()).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidField {
                field: "Trial",
                value: "seven".into()
            }
        );

        let err = TrialRecord::parse("DATA,7,5,12543,18865,fast,AUTO", noon()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "DwellTime",
                ..
            }
        ));

        // Negative device clock readings are not valid
        assert!(TrialRecord::parse("DATA,7,5,-1,18865,6.32,AUTO", noon()).is_err());
    }

    #[test]
    fn test_rejects_other_first_field() {
        assert_eq!(
            TrialRecord::parse("DATUM,7,5,12543,18865,6.32,AUTO", noon()),
            Err(ParseError::NotData("DATUM".into()))
        );
    }

    #[test]
    fn test_tolerates_padding_and_passes_unknown_events_through() {
        let record = TrialRecord::parse("DATA, 3 ,12,100,900, 0.8 ,TIMEOUT \r", noon()).unwrap();
        assert_eq!(record.trial, 3);
        assert_eq!(record.position, 12);
        assert_eq!(record.dwell_time, 0.8);
        assert_eq!(record.event, "TIMEOUT");
    }

    #[test]
    fn test_row_conversion_keeps_every_field() {
        let record = TrialRecord::parse("DATA,1,2,3,4,5.5,MANUAL", noon()).unwrap();
        let row = TrialRow::from(&record);
        assert_eq!(row.timestamp, "2025-11-07 12:30:15");
        let back = TrialRecord::try_from(row).unwrap();
        assert_eq!(back, record);
    }
}
