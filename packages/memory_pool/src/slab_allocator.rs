use std::array;
use std::ptr::NonNull;

use tracing::debug;

use crate::{AllocHeader, SIZE_CLASS_COUNT, SizeClass, Slab, SourceTag};

/// Where a slab allocation was placed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SlabSlot {
    pub(crate) slab: usize,
    pub(crate) index: usize,
    pub(crate) ptr: NonNull<u8>,
}

/// The slabs of one size class.
///
/// Slabs are stored in creation order, so a slab's position never changes until the whole
/// chain is released. The chain itself is linked newest-first through [`Slab::next()`],
/// starting at `head`, which is the order in which slabs are searched for a free slot.
#[derive(Debug, Default)]
struct SlabChain {
    slabs: Vec<Slab>,
    head: Option<usize>,
}

/// Serves allocations of up to [`MAX_SLAB_SIZE`](crate::MAX_SLAB_SIZE) bytes from per-class
/// chains of slabs.
#[derive(Debug)]
pub(crate) struct SlabAllocator {
    chains: [SlabChain; SIZE_CLASS_COUNT],
}

impl SlabAllocator {
    pub(crate) fn new() -> Self {
        Self {
            chains: array::from_fn(|_| SlabChain::default()),
        }
    }

    /// Claims a slot in the given class, creating a new slab at the head of the chain if
    /// every existing slab is full.
    pub(crate) fn alloc(&mut self, class: SizeClass, tag: SourceTag) -> SlabSlot {
        let chain = self.chain_mut(class);

        let mut cursor = chain.head;
        while let Some(slab_index) = cursor {
            let slab = chain
                .slabs
                .get_mut(slab_index)
                .expect("slab chain links always point to existing slabs");

            if let Some((index, ptr)) = slab.claim(tag) {
                return SlabSlot {
                    slab: slab_index,
                    index,
                    ptr,
                };
            }

            cursor = slab.next();
        }

        let slab_index = chain.slabs.len();
        chain.slabs.push(Slab::new(class, slab_index, chain.head));
        chain.head = Some(slab_index);

        debug!(class = class.size(), slab = slab_index, "created slab");

        let (index, ptr) = chain
            .slabs
            .get_mut(slab_index)
            .expect("we just pushed this slab")
            .claim(tag)
            .expect("a new slab always has a free slot");

        SlabSlot {
            slab: slab_index,
            index,
            ptr,
        }
    }

    /// # Panics
    ///
    /// Panics if the slot is not currently allocated or its sentinels are damaged.
    pub(crate) fn free(&mut self, class: SizeClass, slab: usize, index: usize, ptr: NonNull<u8>) {
        self.chain_mut(class)
            .slabs
            .get_mut(slab)
            .expect("allocation refers to a slab that does not exist in this pool")
            .release(index, ptr);
    }

    /// Whether the slot is currently allocated and `ptr` is its data pointer.
    pub(crate) fn is_live(
        &self,
        class: SizeClass,
        slab: usize,
        index: usize,
        ptr: NonNull<u8>,
    ) -> bool {
        self.chain(class)
            .slabs
            .get(slab)
            .is_some_and(|slab| slab.is_occupied(index) && slab.data_ptr(index) == ptr)
    }

    /// Releases every slab of every class back to the system.
    pub(crate) fn free_all(&mut self) {
        for chain in &mut self.chains {
            chain.head = None;
            chain.slabs.clear();
        }
    }

    pub(crate) fn slab_count(&self) -> usize {
        self.chains.iter().map(|chain| chain.slabs.len()).sum()
    }

    /// Number of slots handed out across all slabs.
    pub(crate) fn occupied_count(&self) -> usize {
        self.chains
            .iter()
            .flat_map(|chain| chain.slabs.iter())
            .map(Slab::occupied_count)
            .sum()
    }

    /// Visits the header of every occupied slot, class by class, oldest slab first.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(SizeClass, AllocHeader)) {
        for class in SizeClass::all() {
            for slab in &self.chain(class).slabs {
                for index in (0..crate::SLOTS_PER_SLAB).filter(|&index| slab.is_occupied(index)) {
                    f(class, slab.header(index));
                }
            }
        }
    }

    fn chain(&self, class: SizeClass) -> &SlabChain {
        self.chains
            .get(class.index())
            .expect("every size class has a chain")
    }

    fn chain_mut(&mut self, class: SizeClass) -> &mut SlabChain {
        self.chains
            .get_mut(class.index())
            .expect("every size class has a chain")
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;
    use crate::SLOTS_PER_SLAB;

    fn class(size: usize) -> SizeClass {
        SizeClass::for_size(size).unwrap()
    }

    #[test]
    fn slabs_are_created_lazily_per_class() {
        let mut allocator = SlabAllocator::new();
        assert_eq!(allocator.slab_count(), 0);

        allocator.alloc(class(8), SourceTag::unknown());
        allocator.alloc(class(8), SourceTag::unknown());
        assert_eq!(allocator.slab_count(), 1);

        allocator.alloc(class(100), SourceTag::unknown());
        assert_eq!(allocator.slab_count(), 2);
    }

    #[test]
    fn new_slab_becomes_head_when_chain_is_full() {
        let mut allocator = SlabAllocator::new();

        for _ in 0..SLOTS_PER_SLAB {
            let slot = allocator.alloc(class(16), SourceTag::unknown());
            assert_eq!(slot.slab, 0);
        }

        let overflow = allocator.alloc(class(16), SourceTag::unknown());
        assert_eq!(overflow.slab, 1);
        assert_eq!(overflow.index, 0);
        assert_eq!(allocator.chain(class(16)).head, Some(1));
    }

    #[test]
    fn head_slab_is_searched_first() {
        let mut allocator = SlabAllocator::new();

        let first_slab: Vec<SlabSlot> = (0..SLOTS_PER_SLAB)
            .map(|_| allocator.alloc(class(32), SourceTag::unknown()))
            .collect();
        let _in_second_slab = allocator.alloc(class(32), SourceTag::unknown());

        // Make room in the older slab. The newer slab at the head still has room and wins.
        let freed = first_slab.first().unwrap();
        allocator.free(class(32), freed.slab, freed.index, freed.ptr);

        let next = allocator.alloc(class(32), SourceTag::unknown());
        assert_eq!(next.slab, 1);
        assert_eq!(next.index, 1);
    }

    #[test]
    fn free_all_releases_everything() {
        let mut allocator = SlabAllocator::new();

        for size in [8, 16, 32, 48, 64, 128, 256] {
            allocator.alloc(class(size), SourceTag::unknown());
        }
        assert_eq!(allocator.slab_count(), 7);
        assert_eq!(allocator.occupied_count(), 7);

        allocator.free_all();

        assert_eq!(allocator.slab_count(), 0);
        assert_eq!(allocator.occupied_count(), 0);
    }

    #[test]
    fn live_headers_are_visited_oldest_slab_first() {
        let mut allocator = SlabAllocator::new();

        for _ in 0..=SLOTS_PER_SLAB {
            allocator.alloc(class(64), SourceTag::unknown());
        }

        let mut owners = Vec::new();
        allocator.for_each_live(|visited_class, header| {
            assert_eq!(visited_class.size(), 64);
            owners.push(header.owner());
        });

        assert_eq!(owners.len(), SLOTS_PER_SLAB + 1);
        assert!(owners.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn is_live_tracks_slot_state() {
        let mut allocator = SlabAllocator::new();
        let slot = allocator.alloc(class(8), SourceTag::unknown());

        assert!(allocator.is_live(class(8), slot.slab, slot.index, slot.ptr));

        allocator.free(class(8), slot.slab, slot.index, slot.ptr);

        assert!(!allocator.is_live(class(8), slot.slab, slot.index, slot.ptr));
    }
}
