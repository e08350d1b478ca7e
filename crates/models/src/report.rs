//! CSV record trait implemented by every scenario's report rows.

use std::io::{self, Write};

/// A row of scenario output.
pub trait CsvRecord {
    /// Column names, comma separated, no trailing newline.
    fn header() -> &'static str;

    /// Write this row, including the trailing newline.
    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()>;

    /// The row as a string, without the newline.
    fn to_row(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write_row(&mut buf)?;
        let mut row =
            String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if row.ends_with('\n') {
            row.pop();
        }
        Ok(row)
    }
}
