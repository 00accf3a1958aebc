//! File geometry and run settings.

use crate::error::{CollisionError, Result};

/// Length of the header line, terminator excluded.
pub const HEADER_LEN: usize = 145;
/// Width of one record, terminator excluded.
pub const RECORD_LEN: usize = 61;
/// Width of the line terminator (CRLF).
pub const EOL_LEN: usize = 2;
/// Number of years covered by the month tally.
pub const TALLY_YEARS: usize = 14;
/// First year of the month tally.
pub const FIRST_YEAR: u16 = 1999;

/// Byte geometry of a collision file: a header line followed by fixed-width records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Header line length without its terminator
    pub header_len: usize,
    /// Record length without its terminator
    pub record_len: usize,
    /// Line terminator width
    pub eol_len: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            header_len: HEADER_LEN,
            record_len: RECORD_LEN,
            eol_len: EOL_LEN,
        }
    }
}

impl Layout {
    /// Offset of the first record.
    #[must_use]
    pub fn data_start(&self) -> u64 {
        (self.header_len + self.eol_len) as u64
    }

    /// Distance between the starts of two consecutive records.
    #[must_use]
    pub fn stride(&self) -> u64 {
        (self.record_len + self.eol_len) as u64
    }

    /// Number of whole records in a file of `total_len` bytes.
    #[must_use]
    pub fn record_count(&self, total_len: u64) -> u64 {
        total_len.saturating_sub(self.data_start()) / self.stride()
    }

    /// Records are decoded by column position, so only the schema's width is accepted.
    pub fn check_record_len(&self) -> Result<()> {
        if self.record_len != RECORD_LEN {
            return Err(CollisionError::invalid_parameter(
                "record_len",
                format!("must be {RECORD_LEN}, got {}", self.record_len),
            ));
        }
        Ok(())
    }

    /// Checks that a file of `total_len` bytes holds a header and only whole records.
    pub fn validate(&self, total_len: u64) -> Result<()> {
        self.check_record_len()?;
        if total_len < self.data_start() {
            return Err(CollisionError::Layout {
                total_len,
                reason: format!("shorter than the {}-byte header", self.data_start()),
            });
        }
        let trailing = (total_len - self.data_start()) % self.stride();
        if trailing != 0 {
            return Err(CollisionError::Layout {
                total_len,
                reason: format!("ends with a partial record of {trailing} bytes"),
            });
        }
        Ok(())
    }
}

/// Settings for one run of the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// File geometry
    pub layout: Layout,
    /// Number of persistent workers
    pub workers: usize,
    /// First year of the month tally grid
    pub first_year: u16,
}

impl Config {
    /// Creates a config with the default layout.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(CollisionError::invalid_parameter("workers", "must be > 0"));
        }
        Ok(Self {
            layout: Layout::default(),
            workers,
            first_year: FIRST_YEAR,
        })
    }

    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the first tally year; the last year of the grid must still fit in a `u16`.
    pub fn with_first_year(mut self, first_year: u16) -> Result<Self> {
        let last_offset = TALLY_YEARS as u16 - 1;
        if first_year.checked_add(last_offset).is_none() {
            return Err(CollisionError::invalid_parameter(
                "first_year",
                format!("must be at most {}", u16::MAX - last_offset),
            ));
        }
        self.first_year = first_year;
        Ok(self)
    }
}
