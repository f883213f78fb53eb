//! Table writers
//!
//! Delimited output has one header line naming the columns, then one line per
//! record. There is no index column.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::OutputError;
use crate::record::Table;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Csv,
    Tsv,
    Json,
}

impl Format {
    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Format::Csv),
            "tsv" | "tab" => Some(Format::Tsv),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    fn separator(self) -> Option<char> {
        match self {
            Format::Csv => Some(','),
            Format::Tsv => Some('\t'),
            Format::Json => None,
        }
    }
}

/// Where a job writes its table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Defaults to the file extension, then CSV
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
}

impl OutputConfig {
    pub fn format(&self) -> Format {
        self.format
            .or_else(|| Format::from_path(&self.path))
            .unwrap_or_default()
    }
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single delimited row
pub fn write_row<W: Write>(mut w: W, row: &[String], sep: char) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{sep}")?;
        } else {
            first = false;
        }
        if needs_quotes(cell, sep) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

/// Serialize `table` to `w`. An empty table writes nothing in delimited
/// formats and `[]` in JSON.
pub fn write_table<W: Write>(mut w: W, table: &Table, format: Format) -> Result<(), OutputError> {
    match format.separator() {
        Some(sep) => {
            if table.is_empty() {
                return Ok(());
            }
            write_row(&mut w, &table.columns(), sep)?;
            for row in table.rows() {
                write_row(&mut w, &row, sep)?;
            }
        }
        None => {
            serde_json::to_writer_pretty(&mut w, table)?;
            writeln!(w)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Write `table` to `path`, creating parent directories as needed
pub fn write_table_file(path: &Path, table: &Table, format: Format) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    write_table(BufWriter::new(file), table, format)?;
    info!(path = %path.display(), records = table.len(), ?format, "table written");
    Ok(())
}
