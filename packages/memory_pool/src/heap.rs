use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;

use crate::{AllocHeader, EntryLayout, HEAP_INDEX, SourceTag, check_entry};

/// Where a heap allocation was placed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct HeapBlock {
    pub(crate) record: usize,
    pub(crate) ptr: NonNull<u8>,
}

/// One individually allocated block, linked into the heap list of its pool.
#[derive(Debug)]
struct HeapRecord {
    entry_layout: EntryLayout,
    block: NonNull<u8>,
    data: NonNull<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Drop for HeapRecord {
    fn drop(&mut self) {
        // SAFETY: The block was allocated in HeapAllocator::alloc() with this entry layout
        // and each record owns its block exclusively.
        unsafe {
            dealloc(self.block.as_ptr(), self.entry_layout.entry());
        }
    }
}

/// Serves allocations too large for any size class, one zeroed system allocation each.
///
/// Records live in an index arena and form a doubly-linked list, newest first, so any
/// record can be unlinked in constant time.
#[derive(Debug, Default)]
pub(crate) struct HeapAllocator {
    records: Vec<Option<HeapRecord>>,

    /// Arena positions that can be reused for new records.
    vacant: Vec<usize>,

    head: Option<usize>,
    count: usize,
}

impl HeapAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn alloc(&mut self, size: usize, tag: SourceTag) -> HeapBlock {
        let entry_layout = EntryLayout::for_data_size(size);

        // SAFETY: The entry layout is never zero-sized because it contains a header.
        let block = NonNull::new(unsafe { alloc_zeroed(entry_layout.entry()) })
            .unwrap_or_else(|| handle_alloc_error(entry_layout.entry()));

        let record = self.vacant.pop().unwrap_or(self.records.len());

        // SAFETY: The block was just allocated with the entry layout, so it is writable and
        // aligned for the whole entry.
        let data = unsafe {
            entry_layout.initialize(block, AllocHeader::new(HEAP_INDEX, record, tag))
        };

        let new_record = HeapRecord {
            entry_layout,
            block,
            data,
            prev: None,
            next: self.head,
        };

        if let Some(old_head) = self.head {
            self.record_mut(old_head).prev = Some(record);
        }
        self.head = Some(record);

        if let Some(slot) = self.records.get_mut(record) {
            *slot = Some(new_record);
        } else {
            self.records.push(Some(new_record));
        }

        // Cannot overflow because every record occupies memory.
        self.count = self.count.wrapping_add(1);

        HeapBlock { record, ptr: data }
    }

    /// # Panics
    ///
    /// Panics if the record does not exist, does not own `ptr` or has damaged sentinels.
    pub(crate) fn free(&mut self, record: usize, ptr: NonNull<u8>) {
        let target = self.record(record);
        assert!(
            target.data == ptr,
            "pointer {ptr:p} does not belong to heap record {record}"
        );

        // SAFETY: The record is live, so its block is allocated and was initialized.
        let header = unsafe { check_entry(ptr, target.entry_layout.data_size()) };
        assert!(
            header.index() == HEAP_INDEX && header.owner() == record,
            "allocation header does not match heap record {record}"
        );

        let (prev, next) = (target.prev, target.next);

        match prev {
            Some(prev) => self.record_mut(prev).next = next,
            None => self.head = next,
        }
        if let Some(next) = next {
            self.record_mut(next).prev = prev;
        }

        // Dropping the record releases its block.
        drop(
            self.records
                .get_mut(record)
                .and_then(Option::take)
                .expect("record was checked to exist above"),
        );
        self.vacant.push(record);

        // Cannot underflow because the record existed.
        self.count = self.count.wrapping_sub(1);
    }

    pub(crate) fn is_live(&self, record: usize, ptr: NonNull<u8>) -> bool {
        self.records
            .get(record)
            .and_then(Option::as_ref)
            .is_some_and(|existing| existing.data == ptr)
    }

    /// Releases every block, starting from the head of the list.
    pub(crate) fn free_all(&mut self) {
        while let Some(record) = self.head {
            let removed = self
                .records
                .get_mut(record)
                .and_then(Option::take)
                .expect("heap list links always point to live records");
            self.head = removed.next;
        }

        self.records.clear();
        self.vacant.clear();
        self.count = 0;
    }

    /// Visits the size and header of every live block, newest first.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(usize, AllocHeader)) {
        let mut cursor = self.head;

        while let Some(record) = cursor {
            let current = self.record(record);

            // SAFETY: The record is live, so its block is allocated and was initialized.
            let header = unsafe { check_entry(current.data, current.entry_layout.data_size()) };
            f(current.entry_layout.data_size(), header);

            cursor = current.next;
        }
    }

    fn record(&self, record: usize) -> &HeapRecord {
        self.records
            .get(record)
            .and_then(Option::as_ref)
            .expect("allocation refers to a heap record that does not exist in this pool")
    }

    fn record_mut(&mut self, record: usize) -> &mut HeapRecord {
        self.records
            .get_mut(record)
            .and_then(Option::as_mut)
            .expect("heap list links always point to live records")
    }
}

// SAFETY: The allocator owns every block exclusively. The raw pointers are only handed out as
// data pointers to the owning pool, and all access goes through &self/&mut self methods of
// that pool.
unsafe impl Send for HeapAllocator {}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_sizes(heap: &HeapAllocator) -> Vec<usize> {
        let mut sizes = Vec::new();
        heap.for_each_live(|size, _| sizes.push(size));
        sizes
    }

    #[test]
    fn blocks_are_listed_newest_first() {
        let mut heap = HeapAllocator::new();

        heap.alloc(300, SourceTag::unknown());
        heap.alloc(400, SourceTag::unknown());
        heap.alloc(500, SourceTag::unknown());

        assert_eq!(heap.len(), 3);
        assert_eq!(live_sizes(&heap), vec![500, 400, 300]);
    }

    #[test]
    fn free_unlinks_from_any_position() {
        let mut heap = HeapAllocator::new();

        let oldest = heap.alloc(300, SourceTag::unknown());
        let middle = heap.alloc(400, SourceTag::unknown());
        let newest = heap.alloc(500, SourceTag::unknown());

        heap.free(middle.record, middle.ptr);
        assert_eq!(live_sizes(&heap), vec![500, 300]);

        heap.free(newest.record, newest.ptr);
        assert_eq!(live_sizes(&heap), vec![300]);

        heap.free(oldest.record, oldest.ptr);
        assert!(live_sizes(&heap).is_empty());
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn record_positions_are_reused() {
        let mut heap = HeapAllocator::new();

        let first = heap.alloc(1000, SourceTag::unknown());
        heap.free(first.record, first.ptr);

        let second = heap.alloc(2000, SourceTag::unknown());
        assert_eq!(second.record, first.record);
        assert!(heap.is_live(second.record, second.ptr));
    }

    #[test]
    fn footer_sits_right_after_odd_sizes() {
        let mut heap = HeapAllocator::new();

        let block = heap.alloc(301, SourceTag::unknown());

        // SAFETY: The block has 301 usable bytes.
        unsafe { block.ptr.as_ptr().write_bytes(0xEE, 301) };

        heap.free(block.record, block.ptr);
    }

    #[test]
    #[should_panic(expected = "footer")]
    fn overrun_is_detected_on_free() {
        let mut heap = HeapAllocator::new();

        let block = heap.alloc(301, SourceTag::unknown());

        // SAFETY: Deliberately writes one byte past the usable region, into the footer.
        unsafe { block.ptr.as_ptr().add(301).write(0) };

        heap.free(block.record, block.ptr);
    }

    #[test]
    fn free_all_empties_the_list() {
        let mut heap = HeapAllocator::new();

        for size in [257, 1024, 4096] {
            heap.alloc(size, SourceTag::unknown());
        }

        heap.free_all();

        assert_eq!(heap.len(), 0);
        assert!(live_sizes(&heap).is_empty());
    }
}
