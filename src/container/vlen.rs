//! Variable-length row buffers with release accounting.
//!
//! Every row of a variable-length array is backed by its own buffer. The
//! writer allocates the buffers, hands them to the container together with
//! an explicit length per row, and releases each buffer exactly once after
//! the call returns. Read-back follows the same discipline.
//!
//! A [`ReleaseLedger`] counts allocations and releases across any number of
//! [`VlenBuffers`]. Dropping a `VlenBuffers` releases whatever rows are still
//! held, so an early return cannot leak.

use std::cell::Cell;
use std::rc::Rc;

use crate::util::{ContainerPod, Error, Result};

#[derive(Debug, Default)]
struct LedgerCounts {
    allocated: Cell<usize>,
    released: Cell<usize>,
}

/// Shared allocation/release counter.
#[derive(Clone, Debug, Default)]
pub struct ReleaseLedger {
    counts: Rc<LedgerCounts>,
}

impl ReleaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocated(&self) -> usize {
        self.counts.allocated.get()
    }

    pub fn released(&self) -> usize {
        self.counts.released.get()
    }

    /// Buffers allocated but not yet released.
    pub fn outstanding(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }

    /// Fail with [`Error::ResourceLeak`] unless every allocation was released.
    pub fn check_balanced(&self) -> Result<()> {
        if self.allocated() != self.released() {
            return Err(Error::ResourceLeak {
                allocated: self.allocated(),
                released: self.released(),
            });
        }
        Ok(())
    }

    fn record_alloc(&self, n: usize) {
        self.counts.allocated.set(self.counts.allocated.get() + n);
    }

    fn record_release(&self) {
        self.counts.released.set(self.counts.released.get() + 1);
    }
}

/// One buffer per row; a released row is `None`.
#[derive(Debug)]
pub struct VlenBuffers<T: ContainerPod> {
    rows: Vec<Option<Box<[T]>>>,
    ledger: ReleaseLedger,
}

impl<T: ContainerPod> VlenBuffers<T> {
    /// Allocate zeroed rows sized by `lengths`.
    pub fn allocate(ledger: &ReleaseLedger, lengths: &[usize]) -> Self {
        let rows = lengths
            .iter()
            .map(|&len| Some(vec![T::default(); len].into_boxed_slice()))
            .collect();
        ledger.record_alloc(lengths.len());
        Self { rows, ledger: ledger.clone() }
    }

    /// Take ownership of already-built rows.
    pub fn from_rows(ledger: &ReleaseLedger, rows: Vec<Vec<T>>) -> Self {
        ledger.record_alloc(rows.len());
        Self {
            rows: rows.into_iter().map(|r| Some(r.into_boxed_slice())).collect(),
            ledger: ledger.clone(),
        }
    }

    /// Number of rows (held or released).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row contents; `None` if out of range or already released.
    pub fn row(&self, index: usize) -> Option<&[T]> {
        self.rows.get(index).and_then(|r| r.as_deref())
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut [T]> {
        self.rows.get_mut(index).and_then(|r| r.as_deref_mut())
    }

    /// Lengths of all held rows; fails if any row was already released.
    pub fn lengths(&self) -> Result<Vec<usize>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                r.as_ref()
                    .map(|b| b.len())
                    .ok_or_else(|| Error::InvalidState(format!("row {i} already released")))
            })
            .collect()
    }

    /// Copy every row out (for callers that keep the values past release).
    pub fn to_vecs(&self) -> Result<Vec<Vec<T>>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                r.as_ref()
                    .map(|b| b.to_vec())
                    .ok_or_else(|| Error::InvalidState(format!("row {i} already released")))
            })
            .collect()
    }

    /// Release one row's buffer.
    pub fn release_row(&mut self, index: usize) -> Result<()> {
        let slot = self
            .rows
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("vlen row {index}")))?;
        if slot.take().is_none() {
            return Err(Error::DoubleRelease { row: index });
        }
        self.ledger.record_release();
        Ok(())
    }

    /// Release every row still held. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let mut count = 0;
        for slot in &mut self.rows {
            if slot.take().is_some() {
                self.ledger.record_release();
                count += 1;
            }
        }
        count
    }

    /// Rows not yet released.
    pub fn held(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }
}

impl<T: ContainerPod> Drop for VlenBuffers<T> {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            tracing::trace!(released, "vlen buffers released on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_once_per_row() {
        let ledger = ReleaseLedger::new();
        let mut bufs = VlenBuffers::<i32>::from_rows(&ledger, vec![vec![1, 2], vec![3], vec![]]);
        assert_eq!(ledger.outstanding(), 3);
        assert_eq!(bufs.lengths().unwrap(), vec![2, 1, 0]);

        bufs.release_row(1).unwrap();
        assert!(matches!(bufs.release_row(1), Err(Error::DoubleRelease { row: 1 })));
        assert_eq!(bufs.release_all(), 2);
        assert_eq!(ledger.released(), 3);
        ledger.check_balanced().unwrap();
    }

    #[test]
    fn test_drop_releases_on_early_exit() {
        let ledger = ReleaseLedger::new();
        let attempt = || -> Result<()> {
            let bufs = VlenBuffers::<f64>::allocate(&ledger, &[4, 5]);
            assert_eq!(bufs.row(1).map(|r| r.len()), Some(5));
            Err(Error::other("write failed"))
        };
        assert!(attempt().is_err());
        ledger.check_balanced().unwrap();
        assert_eq!(ledger.released(), 2);
    }

    #[test]
    fn test_leak_is_reported() {
        let ledger = ReleaseLedger::new();
        let bufs = VlenBuffers::<i64>::allocate(&ledger, &[1]);
        std::mem::forget(bufs);
        assert!(matches!(
            ledger.check_balanced(),
            Err(Error::ResourceLeak { allocated: 1, released: 0 })
        ));
    }
}
