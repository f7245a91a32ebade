//! CSV output for result tables.
//!
//! Files start with the table metadata as pretty-printed JSON, one `# `
//! comment line per JSON line, followed by a header row and the data rows.

#[cfg(feature = "storage_csv")]
use crate::data::ResultTable;
#[cfg(feature = "storage_csv")]
use crate::error::AppResult;
#[cfg(feature = "storage_csv")]
use std::fs::File;
#[cfg(feature = "storage_csv")]
use std::io::Write;
#[cfg(feature = "storage_csv")]
use std::path::{Path, PathBuf};

/// Writes result tables as CSV files into one directory.
#[cfg(feature = "storage_csv")]
#[derive(Debug, Clone)]
pub struct CsvWriter {
    output_dir: PathBuf,
}

#[cfg(feature = "storage_csv")]
impl CsvWriter {
    /// Writer rooted at `output_dir`; the directory is created on first write.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory files are written into
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `table` to `<output_dir>/<name>_<timestamp>.csv`.
    pub fn write(&self, name: &str, table: &ResultTable) -> AppResult<PathBuf> {
        if !self.output_dir.exists() {
            std::fs::create_dir_all(&self.output_dir)?;
        }
        let file_name = format!(
            "{}_{}.csv",
            name,
            table.metadata.acquired_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.output_dir.join(file_name);
        write_table(&path, table)?;
        Ok(path)
    }
}

/// Write `table` to exactly `path`, replacing any existing file.
#[cfg(feature = "storage_csv")]
pub fn write_table(path: &Path, table: &ResultTable) -> AppResult<()> {
    let mut file = File::create(path)?;

    let json = serde_json::to_string_pretty(&table.metadata).map_err(std::io::Error::from)?;
    for line in json.lines() {
        writeln!(file, "# {}", line)?;
    }

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(&table.columns)
        .map_err(std::io::Error::from)?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|value| value.to_string()))
            .map_err(std::io::Error::from)?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = table.rows.len(), "Wrote result table");
    Ok(())
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::data::TableMetadata;
    use crate::hardware::pna::SweepType;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn table() -> ResultTable {
        let mut parameters = BTreeMap::new();
        parameters.insert("bandwidth [Hz]".to_string(), 1000.0);
        ResultTable {
            columns: vec!["frequency [Hz]".into(), "S21 log mag [dB]".into()],
            rows: vec![vec![1e9, -3.5], vec![2e9, -4.25]],
            metadata: TableMetadata {
                independent: "frequency [Hz]".into(),
                sweep_type: SweepType::Linear,
                parameters,
                acquired_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_write_creates_directory_and_file() {
        let dir = tempdir().unwrap();
        let writer = CsvWriter::new(dir.path().join("nested"));

        let path = writer.write("s21", &table()).unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("s21_"));
    }

    #[test]
    fn test_file_has_metadata_header_then_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_table(&path, &table()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let comments: String = text
            .lines()
            .filter_map(|l| l.strip_prefix("# "))
            .collect::<Vec<_>>()
            .join("\n");
        let metadata: TableMetadata = serde_json::from_str(&comments).unwrap();
        assert_eq!(metadata.parameters["bandwidth [Hz]"], 1000.0);

        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(
            data,
            vec!["frequency [Hz],S21 log mag [dB]", "1000000000,-3.5", "2000000000,-4.25"]
        );
    }
}
