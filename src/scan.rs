//! Lookups and ordered traversal (§4.6): `get` descends the tree tracking
//! the nearest key strictly greater than the search key, and `scan` walks
//! in order from a starting point using an explicit stack instead of
//! recursion, so traversal depth is bounded by tree height rather than
//! the call stack.

use crate::cache::PageCache;
use crate::entry::{cmp_keys, Key, Value};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::pager::Pager;
use crate::rbtree::{left_of, right_of};
use std::cmp::Ordering;

/// Result of descending the tree looking for `key`.
pub(crate) struct Lookup {
    /// The matched node if `found`, otherwise the nearest node whose key
    /// is strictly greater than the search key (or `null_ptr` if none).
    pub ptr: u32,
    pub found: bool,
}

/// Descends from the root comparing encoded key bytes at each step,
/// tracking the most recent "turned left" ancestor as the lower bound.
pub(crate) fn lower_bound<K: Key, V: Value, P: Pager>(
    metadata: &Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    key: &K,
) -> Lookup {
    let mut x = metadata.root_ptr;
    let mut last_greater = metadata.null_ptr;
    while x != metadata.null_ptr {
        let x_key = cache.fetch(pager, x).entry.key.clone();
        match cmp_keys(key, &x_key) {
            Ordering::Equal => return Lookup { ptr: x, found: true },
            Ordering::Less => {
                last_greater = x;
                x = left_of(cache, pager, x);
            }
            Ordering::Greater => {
                x = right_of(cache, pager, x);
            }
        }
    }
    Lookup {
        ptr: last_greater,
        found: false,
    }
}

pub(crate) fn get<K: Key, V: Value, P: Pager>(
    metadata: &Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    key: &K,
) -> Result<V> {
    let lookup = lower_bound(metadata, cache, pager, key);
    if lookup.found {
        Ok(cache.fetch(pager, lookup.ptr).entry.value.clone())
    } else {
        Err(Error::NotFound)
    }
}

/// Walks the tree in ascending key order, starting at the first key ≥
/// `key` (or from the minimum if `key` is `None`), invoking `f(key,
/// value)` at each node. `f` returns `Ok(true)` to stop early, `Ok(false)`
/// to continue, or `Err` to abort the scan and propagate the error.
///
/// Uses an explicit stack rather than recursion: its depth never exceeds
/// the tree's height, `2⌈log₂ count⌉ + 1` in the worst case for a
/// red-black tree.
pub(crate) fn scan<K: Key, V: Value, P: Pager, F>(
    metadata: &Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    key: Option<&K>,
    mut f: F,
) -> Result<()>
where
    F: FnMut(&K, &V) -> Result<bool>,
{
    let start = match key {
        Some(k) => lower_bound(metadata, cache, pager, k).ptr,
        None => metadata.root_ptr,
    };

    let mut stack: Vec<u32> = Vec::new();
    if start != metadata.null_ptr {
        let start_key = cache.fetch(pager, start).entry.key.clone();
        // Collect the ancestors of `start` that precede it in descent
        // order but follow it in key order — they're visited after
        // `start`'s own subtree is exhausted.
        let mut cur = metadata.root_ptr;
        while cur != start {
            let cur_key = cache.fetch(pager, cur).entry.key.clone();
            if cmp_keys(&cur_key, &start_key) == Ordering::Greater {
                stack.push(cur);
                cur = left_of(cache, pager, cur);
            } else {
                cur = right_of(cache, pager, cur);
            }
        }
        stack.push(start);
    }

    while let Some(node) = stack.pop() {
        let entry = cache.fetch(pager, node).entry.clone();
        if f(&entry.key, &entry.value)? {
            return Ok(());
        }
        let mut r = right_of(cache, pager, node);
        while r != metadata.null_ptr {
            stack.push(r);
            r = left_of(cache, pager, r);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Color;
    use crate::pager::{MemPager, Pager as _};
    use crate::rbtree;

    fn setup() -> (Metadata, PageCache<u32, u32>, MemPager) {
        let page_size = 4096u32;
        let node_size = crate::node::Node::<u32, u32>::node_size() as u32;
        let mut pager = MemPager::new(page_size);
        pager.alloc(1).unwrap();
        let mut cache = PageCache::<u32, u32>::new(page_size, node_size);
        let mut metadata = Metadata {
            page_size,
            node_key_size: 4,
            node_val_size: 4,
            root_ptr: 0,
            null_ptr: 0,
            top: page_size,
            count: 0,
            dirty: true,
        };
        let null_ptr = crate::alloc::alloc(&mut metadata, &cache, &mut pager).unwrap();
        cache.fetch_mut(&mut pager, null_ptr).color = Color::Black;
        metadata.null_ptr = null_ptr;
        metadata.root_ptr = null_ptr;
        (metadata, cache, pager)
    }

    #[test]
    fn get_finds_inserted_key_and_reports_missing() {
        let (mut metadata, mut cache, mut pager) = setup();
        for k in [5u32, 3, 8, 1, 4, 7, 9, 2, 6] {
            rbtree::insert(&mut metadata, &mut cache, &mut pager, k, k * 10).unwrap();
        }
        assert_eq!(get(&metadata, &mut cache, &mut pager, &4).unwrap(), 40);
        assert!(matches!(
            get(&metadata, &mut cache, &mut pager, &42),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn scan_from_nil_visits_everything_in_order() {
        let (mut metadata, mut cache, mut pager) = setup();
        for k in [5u32, 3, 8, 1, 4, 7, 9, 2, 6] {
            rbtree::insert(&mut metadata, &mut cache, &mut pager, k, k).unwrap();
        }
        let mut seen = Vec::new();
        scan(&metadata, &mut cache, &mut pager, None, |k, v| {
            seen.push((*k, *v));
            Ok(false)
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6), (7, 7), (8, 8), (9, 9)]
        );
    }

    #[test]
    fn scan_from_key_starts_at_lower_bound() {
        let (mut metadata, mut cache, mut pager) = setup();
        for k in [10u32, 20, 30, 40, 50] {
            rbtree::insert(&mut metadata, &mut cache, &mut pager, k, k).unwrap();
        }
        let mut seen = Vec::new();
        scan(&metadata, &mut cache, &mut pager, Some(&25), |k, v| {
            seen.push((*k, *v));
            Ok(false)
        })
        .unwrap();
        assert_eq!(seen, vec![(30, 30), (40, 40), (50, 50)]);
    }

    #[test]
    fn scan_stops_early_when_callback_returns_true() {
        let (mut metadata, mut cache, mut pager) = setup();
        for k in 0u32..20 {
            rbtree::insert(&mut metadata, &mut cache, &mut pager, k, k).unwrap();
        }
        let mut seen = Vec::new();
        scan(&metadata, &mut cache, &mut pager, None, |k, v| {
            seen.push((*k, *v));
            Ok(seen.len() == 5)
        })
        .unwrap();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn scan_propagates_callback_error() {
        let (mut metadata, mut cache, mut pager) = setup();
        for k in 0u32..5 {
            rbtree::insert(&mut metadata, &mut cache, &mut pager, k, k).unwrap();
        }
        let result = scan(&metadata, &mut cache, &mut pager, None, |_k, _v| {
            Err(Error::InvalidKeySize)
        });
        assert!(matches!(result, Err(Error::InvalidKeySize)));
    }
}
