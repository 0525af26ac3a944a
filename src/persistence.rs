//! Time-series persistence: the appendable binary format and a parallel
//! CSV writer over the same row/column layout.
//!
//! Binary layout, little-endian, appendable (a later write re-opens the
//! file, validates the header, and appends further rows):
//! `{align: u32, descLen: u32, desc[descLen], rowCount: u32, colCount: u32,
//! [colNameLen: u8, colName; colCount], time[rowCount]: f64,
//! col_k[rowCount]: f64 for k in 0..colCount}`.

use std::fs::File;
use std::io::{self, BufWriter, Read as IoRead, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{GridError, Result};

const ALIGN: u32 = 8;

/// One time-series: a shared time column plus one or more named value
/// columns, all sampled at the same rows.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    pub description: String,
    pub column_names: Vec<String>,
    pub time: Vec<f64>,
    pub columns: Vec<Vec<f64>>,
}

impl TimeSeries {
    pub fn new(description: impl Into<String>, column_names: Vec<String>) -> TimeSeries {
        let n = column_names.len();
        TimeSeries {
            description: description.into(),
            column_names,
            time: Vec::new(),
            columns: vec![Vec::new(); n],
        }
    }

    /// Appends one row: `values.len()` must equal `column_names.len()`.
    pub fn push_row(&mut self, t: f64, values: &[f64]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(GridError::InvalidParameterValue {
                param: "values".to_string(),
                value: format!("expected {} columns, got {}", self.columns.len(), values.len()),
            });
        }
        self.time.push(t);
        for (col, &v) in self.columns.iter_mut().zip(values) {
            col.push(v);
        }
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.time.len()
    }

    /// Writes the full binary format (header + all rows) to `path`, creating
    /// or truncating it.
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())
            .map_err(|e| GridError::FileLoadFailure(format!("{}: {e}", path.as_ref().display())))?;
        let mut w = BufWriter::new(file);
        self.write_header(&mut w)?;
        self.write_rows(&mut w)?;
        Ok(())
    }

    /// Appends this series' rows to an existing file previously written by
    /// [`write_binary`]: reads the stored series back, concatenates rows,
    /// and rewrites the file, since the column-major row layout can't grow
    /// a middle column in place. Validates the column layout matches first.
    pub fn append_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut existing = TimeSeries::read_binary(path.as_ref())?;
        if existing.column_names != self.column_names {
            return Err(GridError::FileIncomplete(format!(
                "{}: column layout does not match series being appended",
                path.as_ref().display()
            )));
        }
        existing.time.extend_from_slice(&self.time);
        for (col, new_col) in existing.columns.iter_mut().zip(&self.columns) {
            col.extend_from_slice(new_col);
        }
        existing.write_binary(path.as_ref())
    }

    fn write_header(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(&ALIGN.to_le_bytes()).map_err(io_err)?;
        let desc = self.description.as_bytes();
        w.write_all(&(desc.len() as u32).to_le_bytes()).map_err(io_err)?;
        w.write_all(desc).map_err(io_err)?;
        w.write_all(&(self.row_count() as u32).to_le_bytes()).map_err(io_err)?;
        w.write_all(&(self.column_names.len() as u32).to_le_bytes())
            .map_err(io_err)?;
        for name in &self.column_names {
            let bytes = name.as_bytes();
            w.write_all(&[bytes.len() as u8]).map_err(io_err)?;
            w.write_all(bytes).map_err(io_err)?;
        }
        Ok(())
    }

    fn write_rows(&self, w: &mut impl Write) -> Result<()> {
        for &t in &self.time {
            w.write_all(&t.to_le_bytes()).map_err(io_err)?;
        }
        for col in &self.columns {
            for &v in col {
                w.write_all(&v.to_le_bytes()).map_err(io_err)?;
            }
        }
        Ok(())
    }

    /// Writes the same rows as a CSV with a header row `time,col1,col2,...`.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path.as_ref())
            .map_err(|e| GridError::FileLoadFailure(format!("{}: {e}", path.as_ref().display())))?;
        let mut header = vec!["time".to_string()];
        header.extend(self.column_names.iter().cloned());
        wtr.write_record(&header)
            .map_err(|e| GridError::FileIncomplete(e.to_string()))?;
        for (i, &t) in self.time.iter().enumerate() {
            let mut record = vec![t.to_string()];
            for col in &self.columns {
                record.push(col[i].to_string());
            }
            wtr.write_record(&record)
                .map_err(|e| GridError::FileIncomplete(e.to_string()))?;
        }
        wtr.flush().map_err(io_err)?;
        Ok(())
    }

    /// Reads a full binary file back into a series.
    pub fn read_binary(path: impl AsRef<Path>) -> Result<TimeSeries> {
        let mut file = File::open(path.as_ref())
            .map_err(|e| GridError::FileNotFound(format!("{}: {e}", path.as_ref().display())))?;
        let header = read_header(&mut file)?;
        let mut time = vec![0.0; header.row_count];
        read_f64_column(&mut file, &mut time)?;
        let mut columns = Vec::with_capacity(header.column_names.len());
        for _ in 0..header.column_names.len() {
            let mut col = vec![0.0; header.row_count];
            read_f64_column(&mut file, &mut col)?;
            columns.push(col);
        }
        Ok(TimeSeries {
            description: header.description,
            column_names: header.column_names,
            time,
            columns,
        })
    }
}

struct Header {
    description: String,
    column_names: Vec<String>,
    row_count: usize,
}

fn io_err(e: io::Error) -> GridError {
    GridError::FileIncomplete(e.to_string())
}

fn read_header(file: &mut File) -> Result<Header> {
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    let _align = read_u32(file)?;
    let desc_len = read_u32(file)? as usize;
    let mut desc_buf = vec![0u8; desc_len];
    file.read_exact(&mut desc_buf).map_err(io_err)?;
    let description = String::from_utf8_lossy(&desc_buf).into_owned();

    let row_count = read_u32(file)? as usize;
    let col_count = read_u32(file)? as usize;

    let mut column_names = Vec::with_capacity(col_count);
    for _ in 0..col_count {
        let mut len_buf = [0u8; 1];
        file.read_exact(&mut len_buf).map_err(io_err)?;
        let mut name_buf = vec![0u8; len_buf[0] as usize];
        file.read_exact(&mut name_buf).map_err(io_err)?;
        column_names.push(String::from_utf8_lossy(&name_buf).into_owned());
    }

    Ok(Header {
        description,
        column_names,
        row_count,
    })
}

fn read_u32(file: &mut File) -> Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64_column(file: &mut File, out: &mut [f64]) -> Result<()> {
    let mut buf = [0u8; 8];
    for v in out.iter_mut() {
        file.read_exact(&mut buf).map_err(io_err)?;
        *v = f64::from_le_bytes(buf);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_round_trips_description_columns_and_rows() {
        let dir = std::env::temp_dir().join(format!("griddyn-persist-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("series.bin");

        let mut series = TimeSeries::new("bus voltages", vec!["v1".to_string(), "v2".to_string()]);
        series.push_row(0.0, &[1.0, 0.98]).unwrap();
        series.push_row(0.1, &[1.01, 0.99]).unwrap();
        series.write_binary(&path).unwrap();

        let loaded = TimeSeries::read_binary(&path).unwrap();
        assert_eq!(loaded.description, "bus voltages");
        assert_eq!(loaded.column_names, vec!["v1", "v2"]);
        assert_eq!(loaded.time, vec![0.0, 0.1]);
        assert_eq!(loaded.columns[0], vec![1.0, 1.01]);
        assert_eq!(loaded.columns[1], vec![0.98, 0.99]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn append_binary_grows_row_count_in_place() {
        let dir = std::env::temp_dir().join(format!("griddyn-persist-append-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("series.bin");

        let mut first = TimeSeries::new("freq", vec!["f1".to_string()]);
        first.push_row(0.0, &[60.0]).unwrap();
        first.write_binary(&path).unwrap();

        let mut second = TimeSeries::new("freq", vec!["f1".to_string()]);
        second.push_row(0.1, &[60.01]).unwrap();
        second.append_binary(&path).unwrap();

        let loaded = TimeSeries::read_binary(&path).unwrap();
        assert_eq!(loaded.time, vec![0.0, 0.1]);
        assert_eq!(loaded.columns[0], vec![60.0, 60.01]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn push_row_rejects_mismatched_column_count() {
        let mut series = TimeSeries::new("x", vec!["a".to_string()]);
        assert!(series.push_row(0.0, &[1.0, 2.0]).is_err());
    }
}
