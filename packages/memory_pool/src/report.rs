use std::fmt;

use tracing::warn;

use crate::SourceTag;

/// Which allocation path served an outstanding allocation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum AllocationSource {
    /// A slot in a size-class slab.
    Slab,

    /// An individual system allocation.
    Heap,
}

impl fmt::Display for AllocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slab => f.write_str("pool"),
            Self::Heap => f.write_str("heap"),
        }
    }
}

/// One outstanding allocation listed in a [`PoolReport`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LeakRecord {
    size: usize,
    source: AllocationSource,
    tag: SourceTag,
}

impl LeakRecord {
    pub(crate) fn new(size: usize, source: AllocationSource, tag: SourceTag) -> Self {
        Self { size, source, tag }
    }

    /// Usable size of the allocation: the size class for slab allocations, the requested
    /// size for heap allocations.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The path that served the allocation.
    #[must_use]
    pub fn source(&self) -> AllocationSource {
        self.source
    }

    /// Where the allocation was requested, or [`SourceTag::unknown()`] if the `tracking`
    /// feature is disabled.
    #[must_use]
    pub fn tag(&self) -> SourceTag {
        self.tag
    }
}

impl fmt::Display for LeakRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  {:04} byte {} chunk: {}",
            self.size, self.source, self.tag
        )
    }
}

/// Lists the outstanding allocations of a pool at the time the report was made.
///
/// Slab allocations come first, grouped by size class and ordered from the oldest slab to the
/// newest, followed by heap allocations from the newest to the oldest.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolReport {
    records: Vec<LeakRecord>,
}

impl PoolReport {
    pub(crate) fn new(records: Vec<LeakRecord>) -> Self {
        Self { records }
    }

    /// The number of outstanding allocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the pool had no outstanding allocations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The outstanding allocations, in report order.
    #[must_use]
    pub fn records(&self) -> &[LeakRecord] {
        &self.records
    }

    /// Logs every record as a warning.
    pub(crate) fn emit(&self, pool_id: u64) {
        for record in &self.records {
            warn!(
                pool_id,
                size = record.size,
                source = %record.source,
                file = record.tag.file(),
                line = record.tag.line(),
                "outstanding allocation"
            );
        }
    }
}

impl fmt::Display for PoolReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_format_pads_size() {
        let record = LeakRecord::new(48, AllocationSource::Slab, SourceTag::new("main.rs", 12));
        assert_eq!(record.to_string(), "  0048 byte pool chunk: main.rs(12)");

        let record = LeakRecord::new(12_345, AllocationSource::Heap, SourceTag::new("a.rs", 1));
        assert_eq!(record.to_string(), "  12345 byte heap chunk: a.rs(1)");
    }

    #[test]
    fn report_lists_one_line_per_record() {
        let report = PoolReport::new(vec![
            LeakRecord::new(8, AllocationSource::Slab, SourceTag::new("x.rs", 1)),
            LeakRecord::new(300, AllocationSource::Heap, SourceTag::new("y.rs", 2)),
        ]);

        assert_eq!(report.len(), 2);
        assert_eq!(
            report.to_string(),
            "  0008 byte pool chunk: x.rs(1)\n  0300 byte heap chunk: y.rs(2)\n"
        );
    }

    #[test]
    fn empty_report() {
        let report = PoolReport::default();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
    }
}
