//! The public `Tree` API (§6, §4.7, §4.8): open/init, the mutating and
//! read operations, and the persistence envelope, all behind a single
//! readers-writer lock per §5.

use crate::alloc;
use crate::cache::PageCache;
use crate::entry::{Key, Value};
use crate::error::{Error, Result};
use crate::metadata::{Metadata, METADATA_SIZE};
use crate::node::{Color, Node};
use crate::pager::{FilePager, Pager};
use crate::rbtree;
use crate::scan;
use log::{debug, info};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Creation-time knobs (§4.7). `page_size` is only consulted when creating
/// a new backing file; reopening an existing file always trusts the
/// persisted `page_size` in metadata instead.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub page_size: u32,
}

impl Default for Options {
    fn default() -> Self {
        // Comfortably holds dozens of node slots for u32/u64-keyed trees.
        Options { page_size: 4096 }
    }
}

struct Inner<K, V, P> {
    metadata: Metadata,
    cache: PageCache<K, V>,
    pager: P,
}

/// An ordered key/value index persisted to a single paged file.
pub struct Tree<K, V, P> {
    inner: RwLock<Inner<K, V, P>>,
}

fn path_for(stem: &Path) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(".idx");
    PathBuf::from(name)
}

fn read_persisted_metadata(path: &Path) -> Option<Metadata> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = [0u8; METADATA_SIZE];
    file.read_exact(&mut buf).ok()?;
    Some(Metadata::decode(&buf))
}

fn init_new<K: Key, V: Value, P: Pager>(
    pager: &mut P,
    page_size: u32,
) -> Result<(Metadata, PageCache<K, V>)> {
    pager.alloc(1)?;
    let node_size = Node::<K, V>::node_size() as u32;
    let mut cache = PageCache::new(page_size, node_size);
    let mut metadata = Metadata {
        page_size,
        node_key_size: K::size() as u16,
        node_val_size: V::size() as u16,
        root_ptr: 0,
        null_ptr: 0,
        top: page_size,
        count: 0,
        dirty: true,
    };
    let null_ptr = alloc::alloc(&mut metadata, &cache, pager)?;
    cache.fetch_mut(pager, null_ptr).color = Color::Black;
    metadata.null_ptr = null_ptr;
    metadata.root_ptr = null_ptr;
    info!("initialized new tree: page_size={}, null_ptr={}", page_size, null_ptr);
    Ok((metadata, cache))
}

fn flush_metadata<P: Pager>(metadata: &mut Metadata, pager: &mut P) -> Result<()> {
    let mut buf = vec![0u8; metadata.page_size as usize];
    metadata.encode(&mut buf[..METADATA_SIZE]);
    pager.marshal(0, &buf)?;
    metadata.dirty = false;
    Ok(())
}

fn write_all_locked<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
) -> Result<()> {
    if pager.read_only() {
        return Ok(());
    }
    cache.write_all(pager)?;
    if metadata.dirty {
        flush_metadata(metadata, pager)?;
    }
    Ok(())
}

impl<K: Key, V: Value, P: Pager> Tree<K, V, P> {
    /// Wraps an already-open pager, initializing a fresh tree if
    /// `persisted` is `None`, or adopting a previously persisted tree
    /// otherwise. Shared by `Tree::open` (file-backed) and tests that
    /// exercise the tree logic against an in-memory pager.
    pub(crate) fn from_pager(
        mut pager: P,
        options: Options,
        persisted: Option<Metadata>,
    ) -> Result<Self> {
        let (metadata, cache) = match persisted {
            Some(m) => {
                if m.node_key_size as usize != K::size() || m.node_val_size as usize != V::size()
                {
                    return Err(Error::InvalidKeySize);
                }
                let node_size = Node::<K, V>::node_size() as u32;
                let cache = PageCache::new(m.page_size, node_size);
                (m, cache)
            }
            None => {
                let (mut metadata, cache) = init_new::<K, V, P>(&mut pager, options.page_size)?;
                flush_metadata(&mut metadata, &mut pager)?;
                (metadata, cache)
            }
        };
        Ok(Tree {
            inner: RwLock::new(Inner {
                metadata,
                cache,
                pager,
            }),
        })
    }

    /// Inserts `key → value`, flushing dirty pages before returning.
    /// Fails with `KeyAlreadyExists` if `key` is already present.
    pub fn insert(&self, key: K, value: V) -> Result<()> {
        self.insert_impl(key, value, true)
    }

    /// Same as `insert`, but leaves the mutation unflushed in memory.
    pub fn insert_mem(&self, key: K, value: V) -> Result<()> {
        self.insert_impl(key, value, false)
    }

    fn insert_impl(&self, key: K, value: V, flush: bool) -> Result<()> {
        let mut inner = self.inner.write().expect("tree lock poisoned");
        let Inner {
            metadata,
            cache,
            pager,
        } = &mut *inner;
        if scan::lower_bound(metadata, cache, pager, &key).found {
            return Err(Error::KeyAlreadyExists);
        }
        rbtree::insert(metadata, cache, pager, key, value)?;
        debug!("inserted key, count now {}", metadata.count);
        if flush {
            write_all_locked(metadata, cache, pager)?;
        }
        Ok(())
    }

    /// Looks up `key`, returning `NotFound` if absent.
    pub fn get(&self, key: &K) -> Result<V> {
        // `PageCache::fetch` fills the cache on a miss, so even a pure
        // lookup needs mutable access; this tree takes the exclusive lock
        // for every operation (see DESIGN.md).
        let mut inner = self.inner.write().expect("tree lock poisoned");
        let Inner {
            metadata,
            cache,
            pager,
        } = &mut *inner;
        scan::get(metadata, cache, pager, key)
    }

    /// Deletes `key`, flushing dirty pages before returning. Fails with
    /// `NotFound` if `key` is absent.
    pub fn delete(&self, key: &K) -> Result<()> {
        self.delete_impl(key, true)
    }

    /// Same as `delete`, but leaves the mutation unflushed in memory.
    pub fn delete_mem(&self, key: &K) -> Result<()> {
        self.delete_impl(key, false)
    }

    fn delete_impl(&self, key: &K, flush: bool) -> Result<()> {
        let mut inner = self.inner.write().expect("tree lock poisoned");
        let Inner {
            metadata,
            cache,
            pager,
        } = &mut *inner;
        let lookup = scan::lower_bound(metadata, cache, pager, key);
        if !lookup.found {
            return Err(Error::NotFound);
        }
        rbtree::delete(metadata, cache, pager, lookup.ptr)?;
        debug!("deleted key, count now {}", metadata.count);
        if flush {
            write_all_locked(metadata, cache, pager)?;
        }
        Ok(())
    }

    /// Walks keys in ascending order starting at the first key ≥ `key`
    /// (or from the minimum if `key` is `None`), per `scan::scan`.
    pub fn scan<F>(&self, key: Option<&K>, f: F) -> Result<()>
    where
        F: FnMut(&K, &V) -> Result<bool>,
    {
        let mut inner = self.inner.write().expect("tree lock poisoned");
        let Inner {
            metadata,
            cache,
            pager,
        } = &mut *inner;
        scan::scan(metadata, cache, pager, key, f)
    }

    /// Number of live keys.
    pub fn count(&self) -> u32 {
        let inner = self.inner.read().expect("tree lock poisoned");
        inner.metadata.count
    }

    /// Flushes every dirty page and the metadata record. No-op on a
    /// read-only pager.
    pub fn write_all(&self) -> Result<()> {
        let mut inner = self.inner.write().expect("tree lock poisoned");
        let Inner {
            metadata,
            cache,
            pager,
        } = &mut *inner;
        write_all_locked(metadata, cache, pager)
    }

    /// Flushes then closes the underlying pager. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().expect("tree lock poisoned");
        let Inner {
            metadata,
            cache,
            pager,
        } = &mut *inner;
        write_all_locked(metadata, cache, pager)?;
        pager.close()?;
        Ok(())
    }

    /// Closes and deletes the backing store entirely.
    pub fn remove(self) -> Result<()> {
        let mut inner = self.inner.into_inner().expect("tree lock poisoned");
        inner.pager.close()?;
        inner.pager.remove()?;
        Ok(())
    }
}

impl<K: Key, V: Value> Tree<K, V, FilePager> {
    /// Opens (creating if missing) the index file `<stem>.idx`.
    pub fn open(stem: impl AsRef<Path>, options: Options) -> Result<Self> {
        let path = path_for(stem.as_ref());
        let persisted = read_persisted_metadata(&path);
        let page_size = persisted.as_ref().map_or(options.page_size, |m| m.page_size);
        let pager = FilePager::open(&path, page_size, false)?;
        Self::from_pager(pager, Options { page_size }, persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::MemPager;
    use std::collections::BTreeMap;

    fn open_mem(page_size: u32) -> Tree<u32, u32, MemPager> {
        let pager = MemPager::new(page_size);
        Tree::from_pager(pager, Options { page_size }, None).unwrap()
    }

    #[test]
    fn scenario_insert_nine_keys_scans_sorted() {
        let tree = open_mem(1024);
        for k in [5u32, 3, 8, 1, 4, 7, 9, 2, 6] {
            tree.insert(k, k).unwrap();
        }
        assert_eq!(tree.count(), 9);
        let mut seen = Vec::new();
        tree.scan(None, |k, v| {
            seen.push((*k, *v));
            Ok(false)
        })
        .unwrap();
        assert_eq!(
            seen,
            (1..=9).map(|k| (k, k)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn scenario_delete_root_after_initial_insertions() {
        let tree = open_mem(1024);
        for k in [5u32, 3, 8, 1, 4, 7, 9, 2, 6] {
            tree.insert(k, k).unwrap();
        }
        tree.delete(&5).unwrap();
        assert_eq!(tree.count(), 8);
        let mut seen = Vec::new();
        tree.scan(None, |k, _v| {
            seen.push(*k);
            Ok(false)
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn scenario_duplicate_insert_is_rejected() {
        let tree = open_mem(1024);
        for k in [5u32, 3, 8, 1, 4, 7, 9, 2, 6] {
            tree.insert(k, k).unwrap();
        }
        assert!(matches!(tree.insert(7, 70), Err(Error::KeyAlreadyExists)));
        assert_eq!(tree.count(), 9);
    }

    #[test]
    fn scenario_scan_from_key_seeks_lower_bound() {
        let tree = open_mem(1024);
        for k in [10u32, 20, 30, 40, 50] {
            tree.insert(k, k).unwrap();
        }
        let mut seen = Vec::new();
        tree.scan(Some(&25), |k, v| {
            seen.push((*k, *v));
            Ok(false)
        })
        .unwrap();
        assert_eq!(seen, vec![(30, 30), (40, 40), (50, 50)]);
    }

    #[test]
    fn get_and_delete_absent_key_reports_not_found() {
        let tree = open_mem(1024);
        tree.insert(1, 1).unwrap();
        assert!(matches!(tree.get(&2), Err(Error::NotFound)));
        assert!(matches!(tree.delete(&2), Err(Error::NotFound)));
    }

    #[test]
    fn scenario_delete_everything_truncates_pages_back_to_two() {
        let tree = open_mem(256);
        let keys: Vec<u32> = (0..100).collect();
        for &k in &keys {
            tree.insert_mem(k, k).unwrap();
        }
        for &k in keys.iter().rev() {
            tree.delete_mem(&k).unwrap();
        }
        assert_eq!(tree.count(), 0);
        let inner = tree.inner.read().unwrap();
        assert_eq!(inner.pager.count(), 2);
    }

    #[test]
    fn randomized_sequence_matches_btreemap_oracle() {
        let tree = open_mem(512);
        let mut oracle: BTreeMap<u32, u32> = BTreeMap::new();
        let mut seed = 987654321u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            (seed >> 33) as u32
        };

        for _ in 0..2000 {
            let key = next() % 300;
            if oracle.contains_key(&key) {
                oracle.remove(&key);
                tree.delete_mem(&key).unwrap();
            } else {
                oracle.insert(key, key * 2);
                tree.insert_mem(key, key * 2).unwrap();
            }
            assert_eq!(tree.count() as usize, oracle.len());
        }

        let mut seen = Vec::new();
        tree.scan(None, |k, v| {
            seen.push((*k, *v));
            Ok(false)
        })
        .unwrap();
        let expected: Vec<(u32, u32)> = oracle.into_iter().collect();
        assert_eq!(seen, expected);
    }
}
