//! Flat variable-table container.
//!
//! The archive's binary products are ingested through a little-endian
//! variable-directory layout:
//!
//! ```text
//! magic "WPVT" | u32 var_count
//! per variable: u16 name_len | name (UTF-8) | u32 rows | u32 cols | rows*cols f64
//! ```
//!
//! Values are row-major f64. The writer exists for fixtures and dump tooling.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;

use crate::error::PipelineError;

const MAGIC: [u8; 4] = *b"WPVT";

/// One named array: `rows x cols`, row-major.
#[derive(Debug, Clone)]
pub struct Variable {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Variable {
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.cols, &self.data)
    }

    /// Flattened view, for 1-D variables stored as either a row or a column.
    pub fn as_series(&self) -> &[f64] {
        &self.data
    }

    pub fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }
}

/// A parsed variable-table file.
#[derive(Debug, Clone)]
pub struct VarFile {
    path: PathBuf,
    vars: BTreeMap<String, Variable>,
}

impl VarFile {
    pub fn open(path: &Path) -> Result<VarFile, PipelineError> {
        let bytes = fs::read(path)
            .map_err(|e| PipelineError::io(format!("Failed to read '{}'", path.display()), e))?;
        let mut cur = Cursor {
            path,
            bytes: &bytes,
            pos: 0,
        };

        if cur.take(4)? != MAGIC.as_slice() {
            return Err(cur.malformed("bad magic"));
        }
        let count = cur.read_u32()? as usize;

        let mut vars = BTreeMap::new();
        for _ in 0..count {
            let name_len = cur.read_u16()? as usize;
            let name = String::from_utf8(cur.take(name_len)?.to_vec())
                .map_err(|_| cur.malformed("variable name is not UTF-8"))?;
            let rows = cur.read_u32()? as usize;
            let cols = cur.read_u32()? as usize;
            let n = rows
                .checked_mul(cols)
                .ok_or_else(|| cur.malformed("variable shape overflows"))?;
            let mut data = Vec::with_capacity(n);
            for _ in 0..n {
                data.push(cur.read_f64()?);
            }
            vars.insert(name, Variable { rows, cols, data });
        }

        Ok(VarFile {
            path: path.to_path_buf(),
            vars,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Lookup that treats absence as a structural schema error.
    pub fn require(&self, name: &str) -> Result<&Variable, PipelineError> {
        self.vars.get(name).ok_or_else(|| PipelineError::SchemaMismatch {
            path: self.path.clone(),
            detail: format!("variable `{name}` not present"),
        })
    }

    /// Write a variable table; each entry is `(name, rows, cols, data)`.
    pub fn write(
        path: &Path,
        vars: &[(&str, usize, usize, &[f64])],
    ) -> Result<(), PipelineError> {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&(vars.len() as u32).to_le_bytes());
        for (name, rows, cols, data) in vars {
            if rows * cols != data.len() {
                return Err(PipelineError::Format {
                    path: path.to_path_buf(),
                    detail: format!("`{name}` shape {rows}x{cols} != {} values", data.len()),
                });
            }
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(&(*rows as u32).to_le_bytes());
            buf.extend_from_slice(&(*cols as u32).to_le_bytes());
            for v in *data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        let mut file = fs::File::create(path)
            .map_err(|e| PipelineError::io(format!("Failed to create '{}'", path.display()), e))?;
        file.write_all(&buf)
            .map_err(|e| PipelineError::io(format!("Failed to write '{}'", path.display()), e))?;
        Ok(())
    }
}

struct Cursor<'a> {
    path: &'a Path,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn malformed(&self, detail: &str) -> PipelineError {
        PipelineError::Format {
            path: self.path.to_path_buf(),
            detail: format!("{detail} (offset {})", self.pos),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PipelineError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.bytes.len())
            .ok_or_else(|| self.malformed("truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, PipelineError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32, PipelineError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64, PipelineError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}
