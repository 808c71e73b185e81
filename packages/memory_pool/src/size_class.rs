/// Data sizes served by slabs, in ascending order. Anything larger goes to the heap path.
pub const SIZE_CLASSES: [usize; 7] = [8, 16, 32, 48, 64, 128, 256];

/// The largest request that is still served from a slab.
pub const MAX_SLAB_SIZE: usize = 256;

/// Number of size classes, which is also the number of slab chains in a pool.
pub(crate) const SIZE_CLASS_COUNT: usize = SIZE_CLASSES.len();

/// One of the fixed [`SIZE_CLASSES`] that a slab serves.
///
/// # Examples
///
/// ```
/// use memory_pool::SizeClass;
///
/// assert_eq!(SizeClass::for_size(20).map(SizeClass::size), Some(32));
/// assert_eq!(SizeClass::for_size(0).map(SizeClass::size), Some(8));
/// assert!(SizeClass::for_size(257).is_none());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SizeClass {
    index: u8,
}

impl SizeClass {
    /// Returns the smallest size class that can hold `size` bytes, or `None` if the request
    /// is too large for any slab and must be served by the heap path.
    ///
    /// A request for zero bytes is served by the smallest class.
    #[must_use]
    pub fn for_size(size: usize) -> Option<Self> {
        SIZE_CLASSES
            .iter()
            .position(|&class_size| class_size >= size)
            .map(|index| Self {
                index: u8::try_from(index).expect("there are fewer than 256 size classes"),
            })
    }

    /// The number of usable data bytes in each slot of this class.
    #[must_use]
    pub fn size(self) -> usize {
        *SIZE_CLASSES
            .get(self.index())
            .expect("size class index is always constructed from a valid position")
    }

    /// The position of this class in [`SIZE_CLASSES`].
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.index)
    }

    /// Iterates over every size class, smallest first.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..SIZE_CLASS_COUNT).map(|index| Self {
            index: u8::try_from(index).expect("there are fewer than 256 size classes"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_smallest_fitting_class() {
        let expectations = [
            (0, 8),
            (1, 8),
            (8, 8),
            (9, 16),
            (17, 32),
            (33, 48),
            (49, 64),
            (65, 128),
            (129, 256),
            (256, 256),
        ];

        for (request, expected) in expectations {
            let class = SizeClass::for_size(request).unwrap();
            assert_eq!(class.size(), expected, "request of {request} bytes");
        }
    }

    #[test]
    fn oversized_requests_have_no_class() {
        assert!(SizeClass::for_size(MAX_SLAB_SIZE + 1).is_none());
        assert!(SizeClass::for_size(usize::MAX).is_none());
    }

    #[test]
    fn all_yields_classes_in_order() {
        let sizes: Vec<usize> = SizeClass::all().map(SizeClass::size).collect();
        assert_eq!(sizes, SIZE_CLASSES);

        for (position, class) in SizeClass::all().enumerate() {
            assert_eq!(class.index(), position);
        }
    }
}
