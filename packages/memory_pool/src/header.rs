use std::alloc::Layout;
use std::mem;
use std::ptr::NonNull;

use crate::SourceTag;

/// Sentinel written at the start of every allocation header.
pub(crate) const ALLOC_HEADER: u32 = 0x1f4b_0d2a;

/// Sentinel written immediately after the usable data of every allocation.
pub(crate) const ALLOC_FOOTER: u32 = 0x81fb_3a92;

/// Slot index recorded in the header of allocations served by the heap path.
pub(crate) const HEAP_INDEX: u32 = u32::MAX;

/// Alignment of the data region of every allocation handed out by a pool.
pub const DATA_ALIGN: usize = 8;

const FOOTER_SIZE: usize = mem::size_of::<u32>();

/// Metadata stored in memory immediately before the data of each allocation.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub(crate) struct AllocHeader {
    sentinel: u32,

    /// Slot index within the owning slab, or [`HEAP_INDEX`] for heap blocks.
    index: u32,

    /// Index of the owning slab within its chain, or of the heap record.
    owner: usize,

    #[cfg(feature = "tracking")]
    tag: SourceTag,
}

impl AllocHeader {
    #[cfg_attr(
        not(feature = "tracking"),
        expect(unused_variables, reason = "the tag is only stored when tracking is enabled")
    )]
    pub(crate) fn new(index: u32, owner: usize, tag: SourceTag) -> Self {
        Self {
            sentinel: ALLOC_HEADER,
            index,
            owner,
            #[cfg(feature = "tracking")]
            tag,
        }
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    pub(crate) fn tag(&self) -> SourceTag {
        #[cfg(feature = "tracking")]
        {
            self.tag
        }

        #[cfg(not(feature = "tracking"))]
        {
            SourceTag::unknown()
        }
    }
}

/// Where the header, data and footer of one allocation live relative to the entry start.
///
/// ```text
/// [ AllocHeader | data (data_size bytes, DATA_ALIGN) | footer u32 (unaligned) ]
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct EntryLayout {
    /// Layout of one whole entry, padded so entries can be placed back to back.
    entry: Layout,
    data_offset: usize,
    footer_offset: usize,
    data_size: usize,
}

impl EntryLayout {
    /// # Panics
    ///
    /// Panics if the entry would exceed the size of virtual memory.
    #[must_use]
    pub(crate) fn for_data_size(data_size: usize) -> Self {
        let header_layout = Layout::new::<AllocHeader>();
        let data_layout = Layout::from_size_align(data_size, DATA_ALIGN)
            .expect("allocation size exceeds the size of virtual memory");
        let footer_layout = Layout::new::<[u8; FOOTER_SIZE]>();

        let (with_data, data_offset) = header_layout
            .extend(data_layout)
            .expect("allocation size exceeds the size of virtual memory");
        let (entry, footer_offset) = with_data
            .extend(footer_layout)
            .expect("allocation size exceeds the size of virtual memory");

        // The header must end exactly where the data begins and the footer must start
        // exactly where the data ends, as both are located relative to the data pointer.
        debug_assert_eq!(data_offset, mem::size_of::<AllocHeader>());
        debug_assert_eq!(Some(footer_offset), data_offset.checked_add(data_size));

        Self {
            entry: entry.pad_to_align(),
            data_offset,
            footer_offset,
            data_size,
        }
    }

    pub(crate) fn entry(&self) -> Layout {
        self.entry
    }

    /// Distance in bytes between consecutive entries in a slab.
    pub(crate) fn stride(&self) -> usize {
        self.entry.size()
    }

    pub(crate) fn data_size(&self) -> usize {
        self.data_size
    }

    pub(crate) fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Writes the header and footer sentinels of an entry and returns its data pointer.
    ///
    /// # Safety
    ///
    /// `entry` must be valid for writes of `self.entry().size()` bytes and aligned to
    /// `self.entry().align()`.
    pub(crate) unsafe fn initialize(&self, entry: NonNull<u8>, header: AllocHeader) -> NonNull<u8> {
        #[expect(
            clippy::cast_ptr_alignment,
            reason = "the caller guarantees entry alignment, which covers the header"
        )]
        let header_ptr = entry.cast::<AllocHeader>();

        // SAFETY: The header is at offset zero of an entry the caller guarantees to be
        // writable and aligned.
        unsafe {
            header_ptr.write(header);
        }

        // SAFETY: The footer offset lies within the entry, as computed by Layout::extend().
        let footer_ptr = unsafe { entry.add(self.footer_offset) };

        // SAFETY: The footer has no alignment requirement, so an unaligned write is required
        // and sufficient. The four bytes lie within the entry.
        unsafe {
            footer_ptr.cast::<u32>().write_unaligned(ALLOC_FOOTER);
        }

        // SAFETY: The data offset lies within the entry, as computed by Layout::extend().
        unsafe { entry.add(self.data_offset) }
    }
}

/// Verifies both sentinels around the data of an allocation and returns its header.
///
/// # Panics
///
/// Panics if either sentinel has been overwritten.
///
/// # Safety
///
/// `data` must be the data pointer returned by [`EntryLayout::initialize()`] for an entry
/// that is still allocated, with `data_size` equal to that layout's data size.
pub(crate) unsafe fn check_entry(data: NonNull<u8>, data_size: usize) -> AllocHeader {
    #[expect(
        clippy::cast_ptr_alignment,
        reason = "data is aligned to DATA_ALIGN, which is a multiple of the header alignment"
    )]
    let data_as_header = data.cast::<AllocHeader>();

    // SAFETY: The header sits immediately before the data, within the same entry.
    let header_ptr = unsafe { data_as_header.sub(1) };

    // SAFETY: The header was written by EntryLayout::initialize(). We only read the plain
    // integer sentinel before trusting the rest of the header.
    let sentinel = unsafe { (&raw const (*header_ptr.as_ptr()).sentinel).read() };
    assert!(
        sentinel == ALLOC_HEADER,
        "allocation header before {data:p} is corrupted (found {sentinel:#010x})"
    );

    // SAFETY: The footer starts data_size bytes after the data, within the same entry,
    // and may be unaligned.
    let footer = unsafe { data.add(data_size).cast::<u32>().read_unaligned() };
    assert!(
        footer == ALLOC_FOOTER,
        "allocation footer after {data:p} is corrupted (found {footer:#010x})"
    );

    // SAFETY: The sentinel matched, so the header was written by us and is intact.
    unsafe { header_ptr.read() }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::alloc::{alloc_zeroed, dealloc};

    use super::*;

    fn with_entry(data_size: usize, f: impl FnOnce(&EntryLayout, NonNull<u8>)) {
        let layout = EntryLayout::for_data_size(data_size);
        let entry = NonNull::new(unsafe { alloc_zeroed(layout.entry()) }).unwrap();
        f(&layout, entry);
        unsafe { dealloc(entry.as_ptr(), layout.entry()) };
    }

    #[test]
    fn data_follows_header_and_footer_follows_data() {
        for data_size in [0, 1, 7, 8, 33, 256, 301] {
            let layout = EntryLayout::for_data_size(data_size);

            assert_eq!(layout.data_offset, mem::size_of::<AllocHeader>());
            assert_eq!(layout.footer_offset, layout.data_offset + data_size);
            assert_eq!(layout.data_offset % DATA_ALIGN, 0);
            assert_eq!(layout.stride() % layout.entry().align(), 0);
        }
    }

    #[test]
    fn initialized_entry_passes_check() {
        with_entry(48, |layout, entry| {
            let tag = SourceTag::new("header.rs", 7);
            let data = unsafe { layout.initialize(entry, AllocHeader::new(3, 5, tag)) };

            let header = unsafe { check_entry(data, layout.data_size()) };
            assert_eq!(header.index(), 3);
            assert_eq!(header.owner(), 5);

            #[cfg(feature = "tracking")]
            assert_eq!(header.tag(), tag);
        });
    }

    #[test]
    #[should_panic(expected = "footer")]
    fn overrun_into_footer_is_detected() {
        with_entry(16, |layout, entry| {
            let data =
                unsafe { layout.initialize(entry, AllocHeader::new(0, 0, SourceTag::unknown())) };

            // One byte past the usable region.
            unsafe { data.add(16).write(0xAA) };

            unsafe { check_entry(data, layout.data_size()) };
        });
    }

    #[test]
    #[should_panic(expected = "header")]
    fn underrun_into_header_is_detected() {
        with_entry(16, |layout, entry| {
            let data =
                unsafe { layout.initialize(entry, AllocHeader::new(0, 0, SourceTag::unknown())) };

            unsafe { entry.write(0xAA) };

            unsafe { check_entry(data, layout.data_size()) };
        });
    }
}
