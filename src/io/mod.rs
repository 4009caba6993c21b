//! I/O module
//!
//! Handles the replay CSV format.
//!
//! # Components
//!
//! - `csv_format` - Row conversion and outcome serialization
//! - `sync_reader` - CSV reader with iterator interface

pub mod csv_format;
pub mod sync_reader;

pub use csv_format::{
    convert_csv_record, write_outcomes_csv, CsvRecord, MalformedRow, Operation, OperationKind,
    OperationOutcome, OutcomeStatus,
};
pub use sync_reader::SyncReader;
