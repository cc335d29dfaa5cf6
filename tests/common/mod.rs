#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use relation_scout::SourceInput;
use rust_xlsxwriter::Workbook;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}

pub fn csv_source(name: &str, body: &str) -> SourceInput {
    SourceInput::from_bytes(name, body.as_bytes().to_vec())
}

/// Builds an in-memory workbook. Cells that parse as numbers are written as
/// numeric cells, everything else as text.
pub fn workbook_bytes(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("sheet name");
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                let (r, c) = (row_idx as u32, col_idx as u16);
                match cell.parse::<f64>() {
                    Ok(number) => sheet.write_number(r, c, number).expect("write number"),
                    Err(_) => sheet.write_string(r, c, *cell).expect("write string"),
                };
            }
        }
    }
    workbook.save_to_buffer().expect("serialize workbook")
}

/// Customers/Orders pair where every order references an existing customer.
pub fn customers_and_orders() -> Vec<SourceInput> {
    vec![
        csv_source("Customers.csv", "id,name\n1,Ada\n2,Bob\n3,Cy\n"),
        csv_source(
            "Orders.csv",
            "order_id,customer_id,placed_on\n10,1,2024-01-02\n11,1,2024-01-05\n12,2,2024-02-11\n",
        ),
    ]
}
