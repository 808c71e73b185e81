use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;

use crate::{AllocHeader, EntryLayout, SizeClass, SourceTag, check_entry};

/// Number of slots in every slab. Matches the width of the occupancy mask.
pub(crate) const SLOTS_PER_SLAB: usize = 32;

/// One contiguous block of [`SLOTS_PER_SLAB`] entries serving a single size class.
///
/// Every entry carries an [`AllocHeader`] in front of the data and a footer sentinel after
/// it. The memory is zeroed on creation and only released when the slab is dropped; freeing
/// a slot merely clears its occupancy bit.
#[derive(Debug)]
pub(crate) struct Slab {
    class: SizeClass,

    /// Position of this slab in its chain, recorded in the header of every entry.
    owner: usize,

    entry_layout: EntryLayout,
    block_layout: Layout,
    first_entry: NonNull<u8>,

    /// Bit `i` is set while slot `i` is handed out.
    occupied: u32,

    /// The next (older) slab of the same size class.
    next: Option<usize>,
}

impl Slab {
    /// Allocates a zeroed slab for the given size class.
    ///
    /// Allocation failure is not treated as recoverable and ends the process via
    /// [`handle_alloc_error`].
    pub(crate) fn new(class: SizeClass, owner: usize, next: Option<usize>) -> Self {
        let entry_layout = EntryLayout::for_data_size(class.size());

        let block_size = entry_layout
            .stride()
            .checked_mul(SLOTS_PER_SLAB)
            .expect("slab size cannot overflow for the fixed size classes");
        let block_layout = Layout::from_size_align(block_size, entry_layout.entry().align())
            .expect("slab layout is valid for the fixed size classes");

        // SAFETY: The block layout is non-zero-sized because every entry contains a header.
        let first_entry = NonNull::new(unsafe { alloc_zeroed(block_layout) })
            .unwrap_or_else(|| handle_alloc_error(block_layout));

        Self {
            class,
            owner,
            entry_layout,
            block_layout,
            first_entry,
            occupied: 0,
            next,
        }
    }

    pub(crate) fn next(&self) -> Option<usize> {
        self.next
    }

    pub(crate) fn is_full(&self) -> bool {
        self.occupied == u32::MAX
    }

    pub(crate) fn is_occupied(&self, index: usize) -> bool {
        index < SLOTS_PER_SLAB && self.occupied & (1 << index) != 0
    }

    pub(crate) fn occupied_count(&self) -> usize {
        self.occupied.count_ones() as usize
    }

    /// Claims the lowest free slot, stamping its header with the given tag.
    ///
    /// Returns the slot index and the data pointer, or `None` if the slab is full.
    pub(crate) fn claim(&mut self, tag: SourceTag) -> Option<(usize, NonNull<u8>)> {
        if self.is_full() {
            return None;
        }

        let index = (!self.occupied).trailing_zeros();
        let entry = self.entry_ptr(index as usize);

        // SAFETY: entry_ptr() returns a pointer to an entry within our block, which was
        // allocated with the alignment of the entry layout.
        let data = unsafe {
            self.entry_layout
                .initialize(entry, AllocHeader::new(index, self.owner, tag))
        };

        self.occupied |= 1 << index;

        Some((index as usize, data))
    }

    /// Releases a slot after checking the allocation metadata around `data`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not in use (double free), if `data` is not the data pointer of
    /// the slot or if the header or footer sentinels have been overwritten.
    pub(crate) fn release(&mut self, index: usize, data: NonNull<u8>) {
        assert!(
            self.is_occupied(index),
            "slot {index} of {} byte slab {} is not allocated (double free?)",
            self.class.size(),
            self.owner
        );
        assert!(
            self.data_ptr(index) == data,
            "pointer {data:p} does not belong to slot {index} of {} byte slab {}",
            self.class.size(),
            self.owner
        );

        // SAFETY: The slot is occupied, so its entry was initialized and the block is live.
        let header = unsafe { check_entry(data, self.entry_layout.data_size()) };
        assert!(
            header.index() as usize == index && header.owner() == self.owner,
            "allocation header does not match slot {index} of {} byte slab {}",
            self.class.size(),
            self.owner
        );

        self.occupied &= !(1 << index);
    }

    /// Reads the header of an occupied slot.
    pub(crate) fn header(&self, index: usize) -> AllocHeader {
        assert!(
            self.is_occupied(index),
            "header requested for vacant slot {index}"
        );

        // SAFETY: The slot is occupied, so its entry was initialized and the block is live.
        unsafe { check_entry(self.data_ptr(index), self.entry_layout.data_size()) }
    }

    pub(crate) fn data_ptr(&self, index: usize) -> NonNull<u8> {
        let entry = self.entry_ptr(index);

        // SAFETY: The data region lies within the entry, as computed by Layout::extend().
        unsafe { entry.add(self.entry_layout.data_offset()) }
    }

    fn entry_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(index < SLOTS_PER_SLAB, "slot index {index} out of bounds");

        // Cannot overflow because the whole block was successfully allocated.
        let offset = index.wrapping_mul(self.entry_layout.stride());

        // SAFETY: The offset lies within the block because index < SLOTS_PER_SLAB.
        unsafe { self.first_entry.add(offset) }
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: The block was allocated in new() with this exact layout and is only
        // deallocated here, once.
        unsafe {
            dealloc(self.first_entry.as_ptr(), self.block_layout);
        }
    }
}

// SAFETY: Slab owns its block exclusively. The raw pointer is never shared beyond the data
// pointers handed to the owning pool, and all access goes through &self/&mut self methods
// of that pool.
unsafe impl Send for Slab {}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    fn class(size: usize) -> SizeClass {
        SizeClass::for_size(size).unwrap()
    }

    #[test]
    fn claims_lowest_free_slot() {
        let mut slab = Slab::new(class(16), 0, None);

        let (first, _) = slab.claim(SourceTag::unknown()).unwrap();
        let (second, second_ptr) = slab.claim(SourceTag::unknown()).unwrap();
        let (third, _) = slab.claim(SourceTag::unknown()).unwrap();
        assert_eq!((first, second, third), (0, 1, 2));

        slab.release(second, second_ptr);

        let (reused, reused_ptr) = slab.claim(SourceTag::unknown()).unwrap();
        assert_eq!(reused, 1);
        assert_eq!(reused_ptr, second_ptr);
        assert_eq!(slab.occupied_count(), 3);
    }

    #[test]
    fn full_slab_refuses_claims() {
        let mut slab = Slab::new(class(8), 0, None);

        for expected in 0..SLOTS_PER_SLAB {
            let (index, _) = slab.claim(SourceTag::unknown()).unwrap();
            assert_eq!(index, expected);
        }

        assert!(slab.is_full());
        assert!(slab.claim(SourceTag::unknown()).is_none());
    }

    #[test]
    fn data_pointers_are_aligned_and_distinct() {
        let mut slab = Slab::new(class(48), 0, None);

        let mut pointers = Vec::new();
        while let Some((_, ptr)) = slab.claim(SourceTag::unknown()) {
            assert_eq!(ptr.as_ptr() as usize % crate::DATA_ALIGN, 0);
            pointers.push(ptr.as_ptr() as usize);
        }

        pointers.sort_unstable();
        for pair in pointers.windows(2) {
            assert!(pair[1] - pair[0] >= 48);
        }
    }

    #[test]
    fn header_records_slot_and_owner() {
        let mut slab = Slab::new(class(64), 4, None);
        let (index, _) = slab.claim(crate::source_tag!()).unwrap();

        let header = slab.header(index);
        assert_eq!(header.index() as usize, index);
        assert_eq!(header.owner(), 4);

        #[cfg(feature = "tracking")]
        assert!(header.tag().file().ends_with("slab.rs"));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_release_panics() {
        let mut slab = Slab::new(class(32), 0, None);
        let (index, ptr) = slab.claim(SourceTag::unknown()).unwrap();

        slab.release(index, ptr);
        slab.release(index, ptr);
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn release_with_foreign_pointer_panics() {
        let mut slab = Slab::new(class(32), 0, None);
        let (index, _) = slab.claim(SourceTag::unknown()).unwrap();
        let (_, other_ptr) = slab.claim(SourceTag::unknown()).unwrap();

        slab.release(index, other_ptr);
    }
}
