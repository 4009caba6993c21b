//! Synchronous CSV reader for replay files
//!
//! `SyncReader` yields one item per data row. Rows that fail to deserialize or
//! validate come back as [`MalformedRow`] with their row number, so the replay
//! can report them and carry on.

use crate::io::csv_format::{convert_csv_record, CsvRecord, MalformedRow, Operation};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Iterator over the operations of a replay CSV
#[derive(Debug)]
pub struct SyncReader<R: Read = File> {
    reader: csv::Reader<R>,
    row: usize,
}

impl SyncReader<File> {
    /// Open a replay file
    ///
    /// # Errors
    ///
    /// Returns an error message if the file cannot be opened.
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> SyncReader<R> {
    pub fn from_reader(input: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(input);

        Self { reader, row: 0 }
    }
}

impl<R: Read> Iterator for SyncReader<R> {
    type Item = Result<Operation, MalformedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let record = deserializer.next()?;
        self.row += 1;
        let row = self.row;

        Some(match record {
            Ok(csv_record) => convert_csv_record(row, csv_record)
                .map_err(|message| MalformedRow { row, message }),
            Err(e) => Err(MalformedRow {
                row,
                message: format!("CSV parse error: {}", e),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv_format::OperationKind;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_new_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_reader_iterates_rows() {
        let file = create_temp_csv(
            "type,user,to,amount\nopen,1,,\ndeposit, 1 ,,100.50\ntransfer,1,2,10\n",
        );

        let operations: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(operations.len(), 3);
        assert_eq!(operations[0].kind, OperationKind::Open);
        assert_eq!(operations[1].amount, Some(Decimal::new(10050, 2)));
        assert_eq!(operations[2].to, Some(2));
        assert_eq!(
            operations.iter().map(|op| op.row).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_sync_reader_reports_malformed_rows_and_continues() {
        let input = "type,user,to,amount\ndeposit,abc,,1\nrefund,1,,1\ndeposit,1,,1\n";

        let items: Vec<_> = SyncReader::from_reader(input.as_bytes()).collect();

        assert_eq!(items.len(), 3);
        let first = items[0].as_ref().unwrap_err();
        assert_eq!(first.row, 1);
        assert!(first.message.contains("CSV parse error"));
        assert_eq!(items[1].as_ref().unwrap_err().row, 2);
        assert!(items[2].is_ok());
    }

    #[test]
    fn test_sync_reader_empty_file() {
        let items: Vec<_> = SyncReader::from_reader("type,user,to,amount\n".as_bytes()).collect();
        assert!(items.is_empty());
    }
}
