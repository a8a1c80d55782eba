//! Text-grid display sinks.
//!
//! The product display is a 128x64 OLED driven with an 8x8 font, which is a
//! 16x8 character grid. These sinks render the same grid either to the
//! console or to a character device (a tty or an LCD exposed as a file).
use crate::error::{HwError, Result};
use crate::util::fit_to_grid;
use refill_traits::{Display, PeripheralError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub struct TextGridDisplay<W: Write> {
    out: W,
    cols: usize,
    rows: usize,
    ansi: bool,
}

impl TextGridDisplay<std::io::Stderr> {
    /// Bordered frames on stderr, leaving stdout for reports.
    pub fn console(cols: usize, rows: usize) -> Self {
        Self::new(std::io::stderr(), cols, rows, false)
    }
}

impl TextGridDisplay<std::fs::File> {
    /// Open a character device; every frame clears the screen first.
    pub fn open(path: &Path, cols: usize, rows: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(true)
            .open(path)
            .map_err(|e| HwError::DisplayUnavailable(format!("open {}: {e}", path.display())))?;
        Ok(Self::new(file, cols, rows, true))
    }
}

impl<W: Write> TextGridDisplay<W> {
    pub fn new(out: W, cols: usize, rows: usize, ansi: bool) -> Self {
        Self {
            out,
            cols: cols.max(1),
            rows: rows.max(1),
            ansi,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self, lines: &[String]) -> std::io::Result<()> {
        let grid = fit_to_grid(lines, self.cols, self.rows);
        if self.ansi {
            write!(self.out, "\x1b[2J\x1b[H")?;
            for line in &grid {
                writeln!(self.out, "{line}")?;
            }
        } else {
            let border = format!("+{}+", "-".repeat(self.cols));
            writeln!(self.out, "{border}")?;
            for line in &grid {
                writeln!(self.out, "|{line}|")?;
            }
            writeln!(self.out, "{border}")?;
        }
        self.out.flush()
    }
}

impl<W: Write> Display for TextGridDisplay<W> {
    fn show(&mut self, lines: &[String]) -> std::result::Result<(), PeripheralError> {
        self.write_frame(lines)
            .map_err(|e| -> PeripheralError { Box::new(HwError::Io(e)) })
    }
}
