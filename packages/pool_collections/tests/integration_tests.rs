//! Integration tests for the `pool_collections` package.
//!
//! These tests drive several collections against one shared pool and check that the pool sees
//! exactly the allocations the collections are expected to hold.

use std::ops::ControlFlow;

use bytemuck::{Pod, Zeroable};
use memory_pool::{AllocationSource, MemoryPool, global, source_tag};
use pool_collections::{PoolArray, PoolString, PoolTree, PoolVec, SortedList, string_hash};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Account {
    id: u32,
    balance: u32,
}

#[test]
fn collections_share_one_pool() {
    let mut pool = MemoryPool::new();

    let array = PoolArray::<u64>::new(&mut pool, 3, source_tag!());
    let vector = PoolVec::<u32>::new(&mut pool, source_tag!());
    let string = PoolString::new(&mut pool, "shared", source_tag!());

    let mut tree = PoolTree::<u32, Account>::new();
    tree.insert(&mut pool, 1, Account::default(), source_tag!());

    let mut list = SortedList::<u32, u16>::new();
    list.insert(&mut pool, 1, 0, source_tag!());

    assert_eq!(pool.live_allocations(), 5);

    array.free(&mut pool);
    vector.free(&mut pool);
    string.free(&mut pool);
    tree.free(&mut pool);
    list.free(&mut pool);

    pool.destroy().unwrap();
}

#[test]
fn forgotten_collection_shows_up_in_report() {
    let mut pool = MemoryPool::new();

    let kept = PoolString::new(&mut pool, "kept", source_tag!());
    let forgotten_line = line!() + 1;
    let forgotten = PoolVec::<u8>::new(&mut pool, source_tag!());
    kept.free(&mut pool);

    // Dropping a collection does not return its storage.
    drop(forgotten);

    let error = pool.destroy().unwrap_err();
    let records = error.report().records();
    assert_eq!(records.len(), 1);

    let record = records.first().unwrap();
    assert_eq!(record.source(), AllocationSource::Slab);
    assert_eq!(record.size(), 8);
    assert!(record.tag().file().ends_with("integration_tests.rs"));
    assert_eq!(record.tag().line(), forgotten_line);

    // Clean up the pool without the handle.
    let mut pool = error.into_pool();
    pool.truncate();
    pool.destroy().unwrap();
}

#[test]
fn vector_grows_from_slab_to_heap() {
    let mut pool = MemoryPool::new();

    let mut vector = PoolVec::<u64>::new(&mut pool, source_tag!());
    for round in 0..100_u64 {
        vector
            .append(&mut pool, 1, source_tag!())
            .copy_from_slice(&[round]);
    }

    assert_eq!(vector.len(), 100);
    assert_eq!(pool.heap_count(), 1);
    assert_eq!(pool.live_allocations(), 1);
    assert!(vector.as_slice(&pool).iter().copied().eq(0..100));

    vector.free(&mut pool);
    pool.destroy().unwrap();
}

#[test]
fn tree_of_accounts_updates_in_place() {
    let mut pool = MemoryPool::new();
    let mut tree = PoolTree::<u32, Account>::new();

    for id in [50, 20, 80, 10, 30] {
        tree.insert(&mut pool, id, Account { id, balance: 100 }, source_tag!());
    }

    let account = tree.find(&30).unwrap();
    tree.value_mut(&mut pool, account).balance += 25;

    let mut total = 0;
    let _ = tree.for_each(&pool, |_, id, account| {
        assert_eq!(*id, account.id);
        total += account.balance;
        ControlFlow::Continue(())
    });
    assert_eq!(total, 525);

    tree.find_remove(&mut pool, &20);
    assert!(tree.find(&20).is_none());
    assert_eq!(pool.live_allocations(), 4);

    tree.free(&mut pool);
    pool.destroy().unwrap();
}

#[test]
fn sorted_list_groups_duplicates() {
    let mut pool = MemoryPool::new();
    let mut list = SortedList::<u8, u32>::new();

    for (value, key) in [2_u8, 1, 2, 3, 2].into_iter().enumerate() {
        list.insert(&mut pool, key, u32::try_from(value).unwrap(), source_tag!());
    }

    let mut twos = Vec::new();
    let mut cursor = list.find_first(&2);
    while let Some(item) = cursor {
        twos.push(*list.value(&pool, item));
        cursor = list.find_next(item);
    }
    assert_eq!(twos, vec![0, 2, 4]);

    list.free(&mut pool);
    pool.destroy().unwrap();
}

#[test]
fn string_edits_and_hash() {
    let mut pool = MemoryPool::new();

    let mut text = PoolString::new(&mut pool, "Test", source_tag!());
    text.cat(&mut pool, " 100", source_tag!());
    assert_eq!(text.as_bytes(&pool), b"Test 100");
    assert_eq!(text.len(), 8);

    text.del(&mut pool, 1, 2);
    assert_eq!(text.as_c_str(&pool), c"Tt 100");

    // Hashing folds ASCII case.
    let upper = string_hash(b"TT 100");
    assert_eq!(text.hash(&pool), upper);

    text.free(&mut pool);
    pool.destroy().unwrap();
}

#[test]
fn collections_work_with_global_pool() {
    global::set_global(MemoryPool::new());

    global::with_global(|pool| {
        let mut names = PoolString::new(pool, "a", source_tag!());
        names.catf(pool, format_args!("{}", "bc"), source_tag!());
        assert_eq!(names.to_str(pool).unwrap(), "abc");
        names.free(pool);
    })
    .unwrap();

    global::destroy_global().unwrap();
    assert!(!global::has_global());
}
