//! Tabular record loading

use crate::{MergeError, RecordError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// One data row, keyed by column header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    row: usize,
    values: HashMap<String, String>,
}

impl Record {
    /// Create a record
    ///
    /// # Arguments
    /// * `row` - 1-based data row number (the header row is not counted)
    /// * `values` - Column header -> cell value
    pub fn new<K, V>(row: usize, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            row,
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 1-based data row number
    pub fn row(&self) -> usize {
        self.row
    }

    /// Cell value for a column; `None` when the row is too short to have it
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Cell value for a column the row must have
    ///
    /// An empty cell is a value; only a row too short to reach the column
    /// is an error.
    pub fn value(&self, column: &str) -> std::result::Result<&str, RecordError> {
        self.get(column).ok_or_else(|| RecordError::MissingValue {
            row: self.row,
            column: column.to_string(),
        })
    }

    /// The record's key value
    ///
    /// A row without the column, or with only whitespace in it, has no key
    /// and is skipped by the renderer.
    pub fn key(&self, column: &str) -> std::result::Result<&str, RecordError> {
        match self.get(column) {
            None => Err(RecordError::MissingKey {
                row: self.row,
                column: column.to_string(),
            }),
            Some(value) if value.trim().is_empty() => Err(RecordError::EmptyKey {
                row: self.row,
                column: column.to_string(),
            }),
            Some(value) => Ok(value.trim()),
        }
    }
}

/// Ordered records plus their column headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    headers: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    /// Build a record set from headers and rows of cells
    ///
    /// Rows shorter than the header leave the trailing columns unset; extra
    /// cells are ignored. When a header repeats, the first column wins.
    pub fn from_rows<H, R, C>(headers: H, rows: impl IntoIterator<Item = R>) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let mut values = HashMap::new();
                for (header, cell) in headers.iter().zip(row) {
                    values.entry(header.clone()).or_insert_with(|| cell.into());
                }
                Record { row: i + 1, values }
            })
            .collect();
        Self { headers, records }
    }

    /// Read CSV data with a header row
    ///
    /// Cells are trimmed, ragged rows are accepted and invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv
            .byte_headers()?
            .iter()
            .map(|h| {
                String::from_utf8_lossy(h)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .to_string()
            })
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(MergeError::MissingInput(
                "spreadsheet has no header row".to_string(),
            ));
        }

        let mut rows = Vec::new();
        for record in csv.byte_records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect::<Vec<_>>(),
            );
        }

        let set = Self::from_rows(headers, rows);
        tracing::debug!(
            columns = set.headers.len(),
            records = set.records.len(),
            "loaded records"
        );
        Ok(set)
    }

    /// Read CSV data from memory
    pub fn from_csv_bytes(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(MergeError::MissingInput("spreadsheet is empty".to_string()));
        }
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        Self::from_csv_reader(data)
    }

    /// Read a CSV file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            MergeError::MissingInput(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_csv_bytes(&data)
    }

    /// Column headers in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether a column exists
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Resolve the key column: the configured one, or the first column
    ///
    /// The first column is used even when its header is blank, as in CSV
    /// exported together with a row index.
    pub fn key_column(&self, configured: Option<&str>) -> Result<String> {
        match configured {
            Some(column) if self.has_column(column) => Ok(column.to_string()),
            Some(column) => Err(MergeError::InvalidConfig(format!(
                "key column '{column}' not found (columns: {})",
                self.headers.join(", ")
            ))),
            None => self
                .headers
                .first()
                .cloned()
                .ok_or_else(|| MergeError::MissingInput("spreadsheet has no columns".to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in file order
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_csv_basic() {
        let set = RecordSet::from_csv_bytes(b"Name,City\nAlice,Paris\nBob,Oslo\n").unwrap();
        assert_eq!(set.headers(), &["Name".to_string(), "City".to_string()]);
        assert_eq!(set.len(), 2);

        let alice = set.get(0).unwrap();
        assert_eq!(alice.row(), 1);
        assert_eq!(alice.get("City"), Some("Paris"));
        assert_eq!(set.get(1).unwrap().key("Name").unwrap(), "Bob");
    }

    #[test]
    fn test_from_csv_trims_and_strips_bom() {
        let set = RecordSet::from_csv_bytes(b"\xEF\xBB\xBF Name , City\n  Alice ,Paris\n").unwrap();
        assert_eq!(set.headers()[0], "Name");
        assert_eq!(set.get(0).unwrap().get("Name"), Some("Alice"));
    }

    #[test]
    fn test_from_csv_ragged_rows() {
        let set = RecordSet::from_csv_bytes(b"Name,City\nAlice\nBob,Oslo,extra\n").unwrap();
        let alice = set.get(0).unwrap();
        assert_eq!(alice.get("City"), None);
        assert_eq!(set.get(1).unwrap().get("City"), Some("Oslo"));
    }

    #[test]
    fn test_from_csv_quoted_and_latin1() {
        let set = RecordSet::from_csv_bytes(b"Name\n\"Smith, Jane\"\nJos\xe9\n").unwrap();
        assert_eq!(set.get(0).unwrap().get("Name"), Some("Smith, Jane"));
        // Invalid UTF-8 is replaced, not fatal
        assert_eq!(set.get(1).unwrap().get("Name"), Some("Jos\u{fffd}"));
    }

    #[test]
    fn test_from_csv_empty_input() {
        assert!(matches!(
            RecordSet::from_csv_bytes(b""),
            Err(MergeError::MissingInput(_))
        ));
        assert!(matches!(
            RecordSet::from_csv_bytes(b"  \n"),
            Err(MergeError::MissingInput(_))
        ));
    }

    #[test]
    fn test_header_only_is_empty_set() {
        let set = RecordSet::from_csv_bytes(b"Name,City\n").unwrap();
        assert!(set.is_empty());
        assert_eq!(set.headers().len(), 2);
    }

    #[test]
    fn test_duplicate_header_keeps_first() {
        let set = RecordSet::from_rows(["Name", "Name"], [vec!["first", "second"]]);
        assert_eq!(set.get(0).unwrap().get("Name"), Some("first"));
    }

    #[test]
    fn test_key_errors() {
        let set = RecordSet::from_rows(["Name", "City"], [vec!["  ", "Paris"], vec![]]);
        assert_eq!(
            set.get(0).unwrap().key("Name"),
            Err(RecordError::EmptyKey {
                row: 1,
                column: "Name".to_string()
            })
        );
        assert_eq!(
            set.get(1).unwrap().key("Name"),
            Err(RecordError::MissingKey {
                row: 2,
                column: "Name".to_string()
            })
        );
    }

    #[test]
    fn test_value_requires_the_column() {
        let set = RecordSet::from_csv_bytes(b"Email,Full Name\na@x.com,\nb@x.com\n").unwrap();
        assert_eq!(set.get(0).unwrap().value("Full Name"), Ok(""));
        assert_eq!(
            set.get(1).unwrap().value("Full Name"),
            Err(RecordError::MissingValue {
                row: 2,
                column: "Full Name".to_string()
            })
        );
    }

    #[test]
    fn test_key_column_defaults_to_unnamed_first_column() {
        let set = RecordSet::from_csv_bytes(b",Name\n0,Alice\n1,Bob\n").unwrap();
        assert_eq!(set.key_column(None).unwrap(), "");
        assert_eq!(set.get(1).unwrap().key("").unwrap(), "1");

        let empty = RecordSet::from_rows(Vec::<String>::new(), Vec::<Vec<String>>::new());
        assert!(matches!(
            empty.key_column(None),
            Err(MergeError::MissingInput(_))
        ));
    }

    #[test]
    fn test_key_column_resolution() {
        let set = RecordSet::from_rows(["Name", "City"], Vec::<Vec<String>>::new());
        assert_eq!(set.key_column(None).unwrap(), "Name");
        assert_eq!(set.key_column(Some("City")).unwrap(), "City");
        assert!(matches!(
            set.key_column(Some("Zip")),
            Err(MergeError::InvalidConfig(_))
        ));
    }
}
