//! The semicolon separated tables of the DWD point data, and merging them per date.
//!
//! A table starts with a fixed three row header; every following row begins with a
//! `DD.MM.YY;HH:MM` timestamp. There is no quoting or escaping.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

pub const DELIMITER: &str = ";";
pub const HEADER_ROWS: usize = 3;

const TIMESTAMP_FORMAT: &str = "%d.%m.%y %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsvTable {
    rows: Vec<Vec<String>>,
}

/// Parses the leading date and time cells of a data row.
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT).ok()
}

fn row_timestamp(row: &[String]) -> Option<NaiveDateTime> {
    match row {
        [date, time, ..] => parse_timestamp(date, time),
        _ => None,
    }
}

impl CsvTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        CsvTable { rows }
    }

    pub fn parse(text: &str) -> Self {
        let rows: Vec<Vec<String>> = text
            .replace("\r\n", "\n")
            .split('\n')
            .map(|line| line.split(DELIMITER).map(str::to_string).collect())
            .collect();

        CsvTable::new(rows)
    }

    pub fn serialize(&self) -> String {
        self.rows
            .iter()
            .map(|row| row.join(DELIMITER))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(HEADER_ROWS..).unwrap_or(&[])
    }

    /// Date of the first data row, used to file tables that are stored verbatim.
    pub fn first_data_date(&self) -> Option<NaiveDate> {
        self.data_rows().first().and_then(|row| row_timestamp(row)).map(|ts| ts.date())
    }

    /// Distinct date cells of all well formed data rows, in order of appearance.
    pub fn data_dates(&self) -> Vec<(String, NaiveDate)> {
        let mut dates: Vec<(String, NaiveDate)> = Vec::new();

        for row in self.data_rows() {
            if let Some(ts) = row_timestamp(row) {
                if !dates.iter().any(|(cell, _)| cell == &row[0]) {
                    dates.push((row[0].clone(), ts.date()));
                }
            }
        }

        dates
    }

    /// Merges `incoming` into this table and keeps only rows dated `date_key`.
    ///
    /// Rows are deduplicated by exact equality of all cells. Two readings with the same
    /// timestamp but different values are both kept. Data rows come back sorted with the
    /// most recent first.
    pub fn merge(&self, incoming: &CsvTable, date_key: &str) -> Result<CsvTable> {
        for (label, table) in [("existing", self), ("incoming", incoming)] {
            if table.rows.len() < HEADER_ROWS {
                return Err(Error::IncompatibleHeader(format!(
                    "{label} table has {} rows, expected at least {HEADER_ROWS}",
                    table.rows.len()
                )));
            }
        }

        if let Some(i) = (0..HEADER_ROWS).find(|&i| self.rows[i] != incoming.rows[i]) {
            return Err(Error::IncompatibleHeader(format!("header row {i} differs")));
        }

        let mut data: Vec<Vec<String>> = self.data_rows().to_vec();
        for row in incoming.data_rows() {
            if !data.contains(row) {
                data.push(row.clone());
            }
        }

        let mut dated: Vec<(NaiveDateTime, Vec<String>)> = data
            .into_iter()
            .filter(|row| row.len() >= 2)
            .filter_map(|row| row_timestamp(&row).map(|ts| (ts, row)))
            .filter(|(_, row)| row[0] == date_key)
            .collect();

        // Latest first; equal timestamps fall back to cell order so the result
        // does not depend on which table a row came from.
        dated.sort_by(|(ta, a), (tb, b)| match tb.cmp(ta) {
            Ordering::Equal => b.cmp(a),
            other => other,
        });

        let mut rows = self.rows[..HEADER_ROWS].to_vec();
        rows.extend(dated.into_iter().map(|(_, row)| row));

        Ok(CsvTable { rows })
    }
}

// -- Tests -------------------------------------------------------------------
