//! Shared plumbing for the two table extensions: the cell value type and
//! the memory-budgeted row window.

use std::io::{Read, Seek};
use std::sync::Mutex;

use crate::block::read_exact_at;
use crate::error::{Error, Result};

/// Upper bound on the row window, in bytes. Tables wider than the budget
/// still page one row at a time.
pub(crate) const MAX_BUFFER_BYTES: usize = 1 << 20;

/// A single decoded table cell.
///
/// Scalar columns produce the matching scalar variant; a repeat count above
/// one wraps the elements in `Array`, except character columns (`Text`) and
/// bit columns (`Bits`) which stay flat.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Logical(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bits(Vec<bool>),
    Complex(f64, f64),
    Array(Vec<Cell>),
}

impl Cell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(n) => Some(*n as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Sliding window over the fixed-width row region of a table.
///
/// Holds `rows_per_page` rows in memory; a request outside the window
/// refills it starting at the requested row. All row access for one table
/// goes through a `Mutex` around this state, so concurrent requests are
/// serialized.
#[derive(Debug)]
pub(crate) struct RowPager {
    data_start: u64,
    row_len: usize,
    num_rows: usize,
    rows_per_page: usize,
    first_row: usize,
    last_row: usize,
    buf: Vec<u8>,
    refills: usize,
}

impl RowPager {
    pub(crate) fn new(data_start: u64, row_len: usize, num_rows: usize) -> Self {
        Self::with_budget(data_start, row_len, num_rows, MAX_BUFFER_BYTES)
    }

    pub(crate) fn with_budget(
        data_start: u64,
        row_len: usize,
        num_rows: usize,
        budget: usize,
    ) -> Self {
        let rows_per_page = (budget / row_len.max(1)).max(1);
        RowPager {
            data_start,
            row_len,
            num_rows,
            rows_per_page,
            first_row: 0,
            last_row: 0,
            buf: Vec::new(),
            refills: 0,
        }
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub(crate) fn row_len(&self) -> usize {
        self.row_len
    }

    pub(crate) fn refill_count(&self) -> usize {
        self.refills
    }

    fn in_window(&self, row: usize) -> bool {
        row >= self.first_row && row < self.last_row
    }

    /// Raw bytes of one row, refilling the window on a miss.
    pub(crate) fn row<R: Read + Seek>(&mut self, src: &Mutex<R>, row: usize) -> Result<&[u8]> {
        if row >= self.num_rows {
            return Err(Error::Decode("row index out of range"));
        }
        if !self.in_window(row) {
            let count = self.rows_per_page.min(self.num_rows - row);
            self.buf.resize(count * self.row_len, 0);
            read_exact_at(
                src,
                self.data_start + (row * self.row_len) as u64,
                &mut self.buf,
            )?;
            self.first_row = row;
            self.last_row = row + count;
            self.refills += 1;
        }
        let start = (row - self.first_row) * self.row_len;
        Ok(&self.buf[start..start + self.row_len])
    }
}
