use std::iter;
use std::marker::PhantomData;

use bytemuck::Pod;
use memory_pool::{Allocation, MemoryPool, SourceTag};

use crate::element;

/// Identifies an item of a [`SortedList`].
///
/// An ID stays valid until its item is removed, after which it may be reused.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ItemId(usize);

#[derive(Debug)]
struct Item<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,

    /// Holds one `V`.
    value: Allocation,
}

/// A doubly-linked list kept in ascending key order, with values stored in pool memory.
///
/// Keys do not need to be unique. Items with equal keys stay in the order they were inserted.
/// Insertion is a linear scan from the head; removal of a known item takes constant time.
///
/// # Examples
///
/// ```
/// use memory_pool::{MemoryPool, source_tag};
/// use pool_collections::SortedList;
///
/// let mut pool = MemoryPool::new();
/// let mut list = SortedList::<u32, u8>::new();
///
/// list.insert(&mut pool, 2, b'b', source_tag!());
/// list.insert(&mut pool, 1, b'a', source_tag!());
/// list.insert(&mut pool, 2, b'c', source_tag!());
///
/// let values: Vec<u8> = list.iter().map(|item| *list.value(&pool, item)).collect();
/// assert_eq!(values, b"abc");
///
/// list.free(&mut pool);
/// pool.destroy().unwrap();
/// ```
#[derive(Debug)]
pub struct SortedList<K, V> {
    items: Vec<Option<Item<K>>>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,

    _value: PhantomData<V>,
}

impl<K: Ord + Copy, V: Pod> SortedList<K, V> {
    /// Creates an empty list.
    ///
    /// # Panics
    ///
    /// Panics if `V` needs an alignment above [`DATA_ALIGN`](memory_pool::DATA_ALIGN).
    #[must_use]
    pub fn new() -> Self {
        element::assert_storable::<V>();

        Self {
            items: Vec::new(),
            vacant: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            _value: PhantomData,
        }
    }

    /// The number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts an item after every item whose key is less than or equal to `key`.
    pub fn insert(&mut self, pool: &mut MemoryPool, key: K, value: V, tag: SourceTag) -> ItemId {
        // The new item goes in front of the first item with a greater key.
        let mut before = self.head;
        while let Some(id) = before {
            let item = self.item(id);
            if item.key > key {
                break;
            }
            before = item.next;
        }

        let prev = match before {
            Some(id) => self.item(id).prev,
            None => self.tail,
        };

        let allocation = pool.allocate(size_of::<V>(), tag);
        *element::value_mut(pool, &allocation) = value;

        let id = self.store(Item {
            key,
            prev,
            next: before,
            value: allocation,
        });

        match prev {
            Some(prev) => self.item_mut(prev).next = Some(id),
            None => self.head = Some(id),
        }

        match before {
            Some(next) => self.item_mut(next).prev = Some(id),
            None => self.tail = Some(id),
        }

        ItemId(id)
    }

    /// Unlinks an item and returns its value storage to the pool.
    pub fn remove(&mut self, pool: &mut MemoryPool, item: ItemId) {
        let removed = self
            .items
            .get_mut(item.0)
            .and_then(Option::take)
            .expect("item IDs always refer to live items");

        match removed.prev {
            Some(prev) => self.item_mut(prev).next = removed.next,
            None => self.head = removed.next,
        }

        match removed.next {
            Some(next) => self.item_mut(next).prev = removed.prev,
            None => self.tail = removed.prev,
        }

        self.vacant.push(item.0);

        // Cannot underflow because the item existed.
        self.len = self.len.wrapping_sub(1);

        pool.free(removed.value);
    }

    /// The first item holding `key`.
    ///
    /// The scan stops at the first item with a greater key.
    #[must_use]
    pub fn find_first(&self, key: &K) -> Option<ItemId> {
        let mut cursor = self.head;

        while let Some(id) = cursor {
            let item = self.item(id);

            if item.key == *key {
                return Some(ItemId(id));
            }
            if item.key > *key {
                return None;
            }

            cursor = item.next;
        }

        None
    }

    /// The item after `item`, if it holds the same key.
    #[must_use]
    pub fn find_next(&self, item: ItemId) -> Option<ItemId> {
        let key = self.item(item.0).key;

        self.next(item)
            .filter(|&next| self.item(next.0).key == key)
    }

    /// The item with the smallest key.
    #[must_use]
    pub fn first(&self) -> Option<ItemId> {
        self.head.map(ItemId)
    }

    /// The item with the largest key.
    #[must_use]
    pub fn last(&self) -> Option<ItemId> {
        self.tail.map(ItemId)
    }

    /// The following item.
    #[must_use]
    pub fn next(&self, item: ItemId) -> Option<ItemId> {
        self.item(item.0).next.map(ItemId)
    }

    /// The preceding item.
    #[must_use]
    pub fn prev(&self, item: ItemId) -> Option<ItemId> {
        self.item(item.0).prev.map(ItemId)
    }

    /// The key of an item.
    #[must_use]
    pub fn key(&self, item: ItemId) -> &K {
        &self.item(item.0).key
    }

    /// The value of an item.
    #[must_use]
    pub fn value<'p>(&self, pool: &'p MemoryPool, item: ItemId) -> &'p V {
        element::value(pool, &self.item(item.0).value)
    }

    /// The value of an item, for writing.
    #[must_use]
    pub fn value_mut<'p>(&mut self, pool: &'p mut MemoryPool, item: ItemId) -> &'p mut V {
        element::value_mut(pool, &self.item(item.0).value)
    }

    /// The items from first to last.
    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        iter::successors(self.first(), |&item| self.next(item))
    }

    /// Removes every item and returns all values to the pool. The list remains usable.
    pub fn clear(&mut self, pool: &mut MemoryPool) {
        while let Some(head) = self.head {
            self.remove(pool, ItemId(head));
        }

        self.items.clear();
        self.vacant.clear();
    }

    /// Removes every item and returns all values to the pool.
    pub fn free(mut self, pool: &mut MemoryPool) {
        self.clear(pool);
    }

    fn store(&mut self, item: Item<K>) -> usize {
        // Cannot overflow because every item occupies memory.
        self.len = self.len.wrapping_add(1);

        match self.vacant.pop() {
            Some(id) => {
                *self
                    .items
                    .get_mut(id)
                    .expect("vacant IDs always refer to arena slots") = Some(item);
                id
            }
            None => {
                self.items.push(Some(item));
                self.items.len().wrapping_sub(1)
            }
        }
    }

    fn item(&self, id: usize) -> &Item<K> {
        self.items
            .get(id)
            .and_then(Option::as_ref)
            .expect("item IDs always refer to live items")
    }

    fn item_mut(&mut self, id: usize) -> &mut Item<K> {
        self.items
            .get_mut(id)
            .and_then(Option::as_mut)
            .expect("item IDs always refer to live items")
    }
}

impl<K: Ord + Copy, V: Pod> Default for SortedList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use memory_pool::source_tag;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SortedList<i32, u64>: Send, std::fmt::Debug);
    assert_not_impl_any!(SortedList<i32, u64>: Sync, Clone);
    assert_impl_all!(ItemId: Send, Sync, Copy, Eq, std::hash::Hash);

    fn entries(list: &SortedList<i32, u32>, pool: &MemoryPool) -> Vec<(i32, u32)> {
        list.iter()
            .map(|item| (*list.key(item), *list.value(pool, item)))
            .collect()
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut pool = MemoryPool::new();
        let mut list = SortedList::new();

        for (order, key) in [3, 1, 2, 3, 5, 3, 4].into_iter().enumerate() {
            list.insert(&mut pool, key, u32::try_from(order).unwrap(), source_tag!());
        }

        assert_eq!(
            entries(&list, &pool),
            vec![(1, 1), (2, 2), (3, 0), (3, 3), (3, 5), (4, 6), (5, 4)]
        );
        assert_eq!(list.len(), 7);

        list.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn backward_links_mirror_forward_links() {
        let mut pool = MemoryPool::new();
        let mut list = SortedList::new();

        for key in [5, 1, 4, 2, 3] {
            list.insert(&mut pool, key, 0, source_tag!());
        }

        let mut backward = Vec::new();
        let mut cursor = list.last();
        while let Some(item) = cursor {
            backward.push(*list.key(item));
            cursor = list.prev(item);
        }
        assert_eq!(backward, vec![5, 4, 3, 2, 1]);

        list.free(&mut pool);
    }

    #[test]
    fn find_first_and_next_walk_equal_keys() {
        let mut pool = MemoryPool::new();
        let mut list = SortedList::new();

        list.insert(&mut pool, 1, 10, source_tag!());
        list.insert(&mut pool, 2, 20, source_tag!());
        list.insert(&mut pool, 2, 21, source_tag!());
        list.insert(&mut pool, 3, 30, source_tag!());

        let first = list.find_first(&2).unwrap();
        assert_eq!(*list.value(&pool, first), 20);

        let second = list.find_next(first).unwrap();
        assert_eq!(*list.value(&pool, second), 21);
        assert_eq!(list.find_next(second), None);

        assert_eq!(list.find_first(&0), None);
        assert_eq!(list.find_first(&4), None);

        list.free(&mut pool);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut pool = MemoryPool::new();
        let mut list = SortedList::new();

        let one = list.insert(&mut pool, 1, 1, source_tag!());
        let two = list.insert(&mut pool, 2, 2, source_tag!());
        let three = list.insert(&mut pool, 3, 3, source_tag!());

        list.remove(&mut pool, two);
        assert_eq!(list.next(one), Some(three));
        assert_eq!(list.prev(three), Some(one));

        list.remove(&mut pool, one);
        assert_eq!(list.first(), Some(three));

        list.remove(&mut pool, three);
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert!(pool.is_empty());

        list.free(&mut pool);
    }

    #[test]
    fn value_mut_writes_through() {
        let mut pool = MemoryPool::new();
        let mut list = SortedList::<i32, u32>::new();

        let item = list.insert(&mut pool, 7, 1, source_tag!());
        *list.value_mut(&mut pool, item) = 99;

        assert_eq!(entries(&list, &pool), vec![(7, 99)]);

        list.free(&mut pool);
    }
}
