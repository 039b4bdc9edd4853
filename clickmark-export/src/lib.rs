//! Spreadsheet export of the study database
//!
//! Every non-internal table becomes one worksheet named after it: the first
//! row holds the column names, then one row per record. The database is only
//! ever opened read-only.

use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

/// Table metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
}

/// What was written for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSummary {
    pub name: String,
    pub rows: usize,
}

/// One spreadsheet cell, typed by the value's SQLite storage class
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    fn from_row(row: &SqliteRow, index: usize) -> Result<Self> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(CellValue::Empty);
        }

        let kind = raw.type_info().name().to_string();
        Ok(match kind.as_str() {
            "INTEGER" => CellValue::Integer(row.try_get(index)?),
            "REAL" => CellValue::Real(row.try_get(index)?),
            "BLOB" => {
                let bytes: Vec<u8> = row.try_get(index)?;
                CellValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => CellValue::Text(row.try_get(index)?),
        })
    }

    fn write(&self, sheet: &mut Worksheet, row: u32, col: u16) -> Result<()> {
        match self {
            CellValue::Empty => {}
            CellValue::Integer(v) => {
                sheet.write_number(row, col, *v as f64)?;
            }
            CellValue::Real(v) => {
                sheet.write_number(row, col, *v)?;
            }
            CellValue::Text(v) => {
                sheet.write_string(row, col, v)?;
            }
        }
        Ok(())
    }
}

/// Open the database without write access
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!("Database not found: {}", db_path.display());
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("Failed to open database read-only")
}

/// All tables with row counts, alphabetical, excluding SQLite internals
pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<TableInfo>> {
    let tables = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
          AND name NOT LIKE 'sqlite_%'
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut infos = Vec::new();
    for (name,) in tables {
        let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", name))
            .fetch_one(pool)
            .await?;
        infos.push(TableInfo { name, row_count });
    }

    Ok(infos)
}

/// Column names of `table` in declaration order
async fn column_names(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
}

/// Write every table to its own worksheet in `out_path`
pub async fn export_database(pool: &SqlitePool, out_path: &Path) -> Result<Vec<SheetSummary>> {
    let mut workbook = Workbook::new();
    let mut summaries = Vec::new();

    for table in list_tables(pool).await? {
        let columns = column_names(pool, &table.name).await?;
        let rows = sqlx::query(&format!("SELECT * FROM \"{}\"", table.name))
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to read table {}", table.name))?;

        let sheet = workbook.add_worksheet();
        sheet
            .set_name(&table.name)
            .with_context(|| format!("Invalid sheet name {}", table.name))?;

        for (col, name) in columns.iter().enumerate() {
            sheet.write_string(0, col as u16, name)?;
        }
        for (i, row) in rows.iter().enumerate() {
            for col in 0..row.len() {
                CellValue::from_row(row, col)?.write(sheet, i as u32 + 1, col as u16)?;
            }
        }

        debug!("Sheet {}: {} columns", table.name, columns.len());
        summaries.push(SheetSummary {
            name: table.name,
            rows: rows.len(),
        });
    }

    workbook
        .save(out_path)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;
    info!("Wrote {} sheet(s) to {}", summaries.len(), out_path.display());

    Ok(summaries)
}
