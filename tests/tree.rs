//! Integration tests against the full `Tree` API over real temp files,
//! covering the concrete scenarios worked through by hand in the design
//! doc: ordered scan, root deletion, duplicate rejection, lower-bound
//! scan, and a close/reopen round-trip.

use rbindex::{Error, Options, Tree};
use tempfile::tempdir;

#[ctor::ctor]
fn init_logger() {
    let _ = env_logger::try_init();
}

fn stem(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn insert_nine_keys_then_scan_in_order() {
    let dir = tempdir().unwrap();
    let tree: Tree<u32, u32, rbindex::FilePager> =
        Tree::open(stem(&dir, "a"), Options::default()).unwrap();
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
    assert_eq!(seen, (1..=9).map(|k| (k, k)).collect::<Vec<_>>());
    tree.close().unwrap();
}

#[test]
fn delete_root_after_initial_insertions() {
    let dir = tempdir().unwrap();
    let tree: Tree<u32, u32, rbindex::FilePager> =
        Tree::open(stem(&dir, "b"), Options::default()).unwrap();
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
fn duplicate_insert_is_rejected_and_count_unchanged() {
    let dir = tempdir().unwrap();
    let tree: Tree<u32, u32, rbindex::FilePager> =
        Tree::open(stem(&dir, "c"), Options::default()).unwrap();
    for k in [5u32, 3, 8, 1, 4, 7, 9, 2, 6] {
        tree.insert(k, k).unwrap();
    }
    let err = tree.insert(7, 70).unwrap_err();
    assert!(matches!(err, Error::KeyAlreadyExists));
    assert_eq!(tree.count(), 9);
}

#[test]
fn scan_from_key_seeks_the_lower_bound() {
    let dir = tempdir().unwrap();
    let tree: Tree<u32, u32, rbindex::FilePager> =
        Tree::open(stem(&dir, "d"), Options::default()).unwrap();
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
fn thousand_random_keys_survive_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = stem(&dir, "e");

    let mut keys: Vec<u32> = (0..1000).collect();
    let mut seed = 42u64;
    for i in (1..keys.len()).rev() {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = (seed >> 33) as usize % (i + 1);
        keys.swap(i, j);
    }

    {
        let tree: Tree<u32, u32, rbindex::FilePager> =
            Tree::open(&path, Options::default()).unwrap();
        for &k in &keys {
            tree.insert_mem(k, k * 7).unwrap();
        }
        tree.close().unwrap();
    }

    let tree: Tree<u32, u32, rbindex::FilePager> =
        Tree::open(&path, Options::default()).unwrap();
    assert_eq!(tree.count(), 1000);
    let mut seen = Vec::new();
    tree.scan(None, |k, v| {
        seen.push((*k, *v));
        Ok(false)
    })
    .unwrap();
    let expected: Vec<(u32, u32)> = (0..1000).map(|k| (k, k * 7)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn deleting_everything_in_reverse_insertion_order_truncates_to_two_pages() {
    let dir = tempdir().unwrap();
    let tree: Tree<u32, u32, rbindex::FilePager> =
        Tree::open(stem(&dir, "f"), Options::default()).unwrap();
    let keys: Vec<u32> = (0..100).collect();
    for &k in &keys {
        tree.insert_mem(k, k).unwrap();
    }
    for &k in keys.iter().rev() {
        tree.delete_mem(&k).unwrap();
    }
    assert_eq!(tree.count(), 0);
    tree.write_all().unwrap();

    let path = stem(&dir, "f.idx");
    let metadata = std::fs::metadata(path).unwrap();
    let page_size = Options::default().page_size as u64;
    assert_eq!(metadata.len() / page_size, 2);
}
