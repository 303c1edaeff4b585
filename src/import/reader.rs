//! Streaming `;`-delimited CSV reader yielding rows with their ordinal

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::record::RawRow;
use crate::error::ImportResult;

pub const DELIMITER: u8 = b';';

pub struct CsvRows<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    ordinal: usize,
    done: bool,
}

impl CsvRows<File> {
    pub fn open(path: &Path) -> ImportResult<Self> {
        Self::from_reader(File::open(path)?)
    }
}

impl<R: Read> CsvRows<R> {
    pub fn from_reader(input: R) -> ImportResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input);
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        Ok(Self {
            reader,
            headers,
            ordinal: 0,
            done: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn to_row(&self, record: &csv::StringRecord) -> RawRow {
        self.headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect()
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    /// 1-based ordinal of the data row, and the row itself
    type Item = (usize, Result<RawRow, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                self.ordinal += 1;
                Some((self.ordinal, Ok(self.to_row(&record))))
            }
            Err(e) => {
                // A malformed record still consumes its ordinal
                self.ordinal += 1;
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    self.done = true;
                }
                Some((self.ordinal, Err(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_keyed_by_trimmed_header() {
        let input = " name ;age\nAlice;30\nBob;25\n";
        let rows: Vec<_> = CsvRows::from_reader(input.as_bytes()).unwrap().collect();
        assert_eq!(rows.len(), 2);
        let (ordinal, row) = &rows[1];
        let row = row.as_ref().unwrap();
        assert_eq!(*ordinal, 2);
        assert_eq!(row.get("name").map(String::as_str), Some("Bob"));
        assert_eq!(row.get("age").map(String::as_str), Some("25"));
    }

    #[test]
    fn test_short_records_are_tolerated() {
        let input = "a;b;c\n1;2\n";
        let mut rows = CsvRows::from_reader(input.as_bytes()).unwrap();
        let (_, row) = rows.next().unwrap();
        let row = row.unwrap();
        assert_eq!(row.len(), 2);
        assert!(row.get("c").is_none());
    }

    #[test]
    fn test_leading_bom_ignored() {
        let input = "\u{feff}id;name\n1;Alice\n";
        let rows = CsvRows::from_reader(input.as_bytes()).unwrap();
        assert_eq!(rows.headers()[0], "id");
    }

    #[test]
    fn test_invalid_utf8_consumes_ordinal() {
        let mut input = b"name\nok\n".to_vec();
        input.extend_from_slice(&[0xff, 0xfe, b'\n']);
        input.extend_from_slice(b"last\n");
        let rows: Vec<_> = CsvRows::from_reader(input.as_slice()).unwrap().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].1.is_err());
        assert_eq!(rows[2].0, 3);
        assert!(rows[2].1.is_ok());
    }
}
