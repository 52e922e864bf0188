//! The red-black engine (§4.5): BST insert plus CLRS-style fix-up on
//! insert and delete, rotations, transplant. Everything here operates on
//! raw pointers rather than references — the arena (page cache) owns
//! every node, so parent/child links never need to fight Rust's
//! ownership rules.

use crate::alloc;
use crate::cache::PageCache;
use crate::entry::{cmp_keys, Entry, Key, Value};
use crate::error::Result;
use crate::metadata::Metadata;
use crate::node::Color;
use crate::pager::Pager;
use std::cmp::Ordering;

pub(crate) fn color_of<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32) -> Color {
    c.fetch(p, x).color
}
fn set_color<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32, color: Color) {
    c.fetch_mut(p, x).color = color;
}
pub(crate) fn parent_of<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32) -> u32 {
    c.fetch(p, x).parent
}
pub(crate) fn left_of<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32) -> u32 {
    c.fetch(p, x).left
}
pub(crate) fn right_of<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32) -> u32 {
    c.fetch(p, x).right
}
fn set_parent<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32, v: u32) {
    c.fetch_mut(p, x).parent = v;
}
fn set_left<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32, v: u32) {
    c.fetch_mut(p, x).left = v;
}
fn set_right<K: Key, V: Value, P: Pager>(c: &mut PageCache<K, V>, p: &mut P, x: u32, v: u32) {
    c.fetch_mut(p, x).right = v;
}

/// Left-rotates around `x`. Touches `x`, its right child, the old parent,
/// and the rotated-in grandchild — all four are marked dirty by virtue of
/// going through `fetch_mut`.
fn left_rotate<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    x: u32,
) {
    let y = right_of(cache, pager, x);
    let y_left = left_of(cache, pager, y);

    set_right(cache, pager, x, y_left);
    if y_left != metadata.null_ptr {
        set_parent(cache, pager, y_left, x);
    }

    let x_parent = parent_of(cache, pager, x);
    set_parent(cache, pager, y, x_parent);

    if x_parent == metadata.null_ptr {
        metadata.root_ptr = y;
        metadata.dirty = true;
    } else if left_of(cache, pager, x_parent) == x {
        set_left(cache, pager, x_parent, y);
    } else {
        set_right(cache, pager, x_parent, y);
    }

    set_left(cache, pager, y, x);
    set_parent(cache, pager, x, y);
}

/// Mirror image of `left_rotate`.
fn right_rotate<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    x: u32,
) {
    let y = left_of(cache, pager, x);
    let y_right = right_of(cache, pager, y);

    set_left(cache, pager, x, y_right);
    if y_right != metadata.null_ptr {
        set_parent(cache, pager, y_right, x);
    }

    let x_parent = parent_of(cache, pager, x);
    set_parent(cache, pager, y, x_parent);

    if x_parent == metadata.null_ptr {
        metadata.root_ptr = y;
        metadata.dirty = true;
    } else if right_of(cache, pager, x_parent) == x {
        set_right(cache, pager, x_parent, y);
    } else {
        set_left(cache, pager, x_parent, y);
    }

    set_right(cache, pager, y, x);
    set_parent(cache, pager, x, y);
}

/// Replaces the subtree rooted at `u` with the subtree rooted at `v`,
/// rewiring `u`'s parent's child link (or `root_ptr`). Writes `v`'s
/// parent unconditionally, including through `null_ptr`'s slot when
/// `v == null_ptr` — the fix-up relies on that transient write (§4.5).
fn transplant<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    u: u32,
    v: u32,
) {
    let u_parent = parent_of(cache, pager, u);
    if u_parent == metadata.null_ptr {
        metadata.root_ptr = v;
        metadata.dirty = true;
    } else if left_of(cache, pager, u_parent) == u {
        set_left(cache, pager, u_parent, v);
    } else {
        set_right(cache, pager, u_parent, v);
    }
    set_parent(cache, pager, v, u_parent);
}

fn minimum<K: Key, V: Value, P: Pager>(
    metadata: &Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    mut x: u32,
) -> u32 {
    loop {
        let l = left_of(cache, pager, x);
        if l == metadata.null_ptr {
            return x;
        }
        x = l;
    }
}

/// Descends from `root_ptr`, linking a freshly allocated, already
/// zero-left/right, red slot `z` into place by BST order.
fn bst_insert<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    z: u32,
) {
    let z_key = cache.fetch(pager, z).entry.key.clone();
    let mut y = metadata.null_ptr;
    let mut x = metadata.root_ptr;
    while x != metadata.null_ptr {
        y = x;
        let x_key = cache.fetch(pager, x).entry.key.clone();
        x = if cmp_keys(&z_key, &x_key) == Ordering::Less {
            left_of(cache, pager, x)
        } else {
            right_of(cache, pager, x)
        };
    }

    set_parent(cache, pager, z, y);
    if y == metadata.null_ptr {
        metadata.root_ptr = z;
        metadata.dirty = true;
    } else {
        let y_key = cache.fetch(pager, y).entry.key.clone();
        if cmp_keys(&z_key, &y_key) == Ordering::Less {
            set_left(cache, pager, y, z);
        } else {
            set_right(cache, pager, y, z);
        }
    }
}

fn fix_insert<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    mut z: u32,
) {
    loop {
        let zp = parent_of(cache, pager, z);
        if color_of(cache, pager, zp) != Color::Red {
            break;
        }
        let zpp = parent_of(cache, pager, zp);
        if zp == left_of(cache, pager, zpp) {
            let uncle = right_of(cache, pager, zpp);
            if color_of(cache, pager, uncle) == Color::Red {
                set_color(cache, pager, zp, Color::Black);
                set_color(cache, pager, uncle, Color::Black);
                set_color(cache, pager, zpp, Color::Red);
                z = zpp;
            } else {
                if z == right_of(cache, pager, zp) {
                    z = zp;
                    left_rotate(metadata, cache, pager, z);
                }
                let zp = parent_of(cache, pager, z);
                let zpp = parent_of(cache, pager, zp);
                set_color(cache, pager, zp, Color::Black);
                set_color(cache, pager, zpp, Color::Red);
                right_rotate(metadata, cache, pager, zpp);
                break;
            }
        } else {
            let uncle = left_of(cache, pager, zpp);
            if color_of(cache, pager, uncle) == Color::Red {
                set_color(cache, pager, zp, Color::Black);
                set_color(cache, pager, uncle, Color::Black);
                set_color(cache, pager, zpp, Color::Red);
                z = zpp;
            } else {
                if z == left_of(cache, pager, zp) {
                    z = zp;
                    right_rotate(metadata, cache, pager, z);
                }
                let zp = parent_of(cache, pager, z);
                let zpp = parent_of(cache, pager, zp);
                set_color(cache, pager, zp, Color::Black);
                set_color(cache, pager, zpp, Color::Red);
                left_rotate(metadata, cache, pager, zpp);
                break;
            }
        }
    }
    set_color(cache, pager, metadata.root_ptr, Color::Black);
}

fn fix_delete<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    mut x: u32,
) {
    while x != metadata.root_ptr && color_of(cache, pager, x) == Color::Black {
        let xp = parent_of(cache, pager, x);
        if x == left_of(cache, pager, xp) {
            let mut w = right_of(cache, pager, xp);
            if color_of(cache, pager, w) == Color::Red {
                set_color(cache, pager, w, Color::Black);
                set_color(cache, pager, xp, Color::Red);
                left_rotate(metadata, cache, pager, xp);
                w = right_of(cache, pager, xp);
            }
            let wl = left_of(cache, pager, w);
            let wr = right_of(cache, pager, w);
            if color_of(cache, pager, wl) == Color::Black && color_of(cache, pager, wr) == Color::Black {
                set_color(cache, pager, w, Color::Red);
                x = xp;
            } else {
                if color_of(cache, pager, wr) == Color::Black {
                    set_color(cache, pager, wl, Color::Black);
                    set_color(cache, pager, w, Color::Red);
                    right_rotate(metadata, cache, pager, w);
                    w = right_of(cache, pager, xp);
                }
                let xp_color = color_of(cache, pager, xp);
                set_color(cache, pager, w, xp_color);
                set_color(cache, pager, xp, Color::Black);
                let wr = right_of(cache, pager, w);
                set_color(cache, pager, wr, Color::Black);
                left_rotate(metadata, cache, pager, xp);
                x = metadata.root_ptr;
            }
        } else {
            let mut w = left_of(cache, pager, xp);
            if color_of(cache, pager, w) == Color::Red {
                set_color(cache, pager, w, Color::Black);
                set_color(cache, pager, xp, Color::Red);
                right_rotate(metadata, cache, pager, xp);
                w = left_of(cache, pager, xp);
            }
            let wl = left_of(cache, pager, w);
            let wr = right_of(cache, pager, w);
            if color_of(cache, pager, wr) == Color::Black && color_of(cache, pager, wl) == Color::Black {
                set_color(cache, pager, w, Color::Red);
                x = xp;
            } else {
                if color_of(cache, pager, wl) == Color::Black {
                    set_color(cache, pager, wr, Color::Black);
                    set_color(cache, pager, w, Color::Red);
                    left_rotate(metadata, cache, pager, w);
                    w = left_of(cache, pager, xp);
                }
                let xp_color = color_of(cache, pager, xp);
                set_color(cache, pager, w, xp_color);
                set_color(cache, pager, xp, Color::Black);
                let wl = left_of(cache, pager, w);
                set_color(cache, pager, wl, Color::Black);
                right_rotate(metadata, cache, pager, xp);
                x = metadata.root_ptr;
            }
        }
    }
    set_color(cache, pager, x, Color::Black);
}

/// Allocates a node, links it in by key order, and restores the
/// red-black invariants. Assumes `key` is not already present — the
/// duplicate check happens one layer up, in the public `Tree::insert`
/// (§4.5: "Equal keys are rejected at the Insert layer before insert is
/// called").
pub(crate) fn insert<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    key: K,
    value: V,
) -> Result<()> {
    let z = alloc::alloc(metadata, cache, pager)?;
    {
        let node = cache.fetch_mut(pager, z);
        node.color = Color::Red;
        node.left = metadata.null_ptr;
        node.right = metadata.null_ptr;
        node.entry = Entry { key, value };
    }
    bst_insert(metadata, cache, pager, z);
    fix_insert(metadata, cache, pager, z);
    metadata.count += 1;
    metadata.dirty = true;
    Ok(())
}

/// Removes the node at raw pointer `z` (already located by the caller via
/// `scan::get`), restores the red-black invariants, and frees its slot.
pub(crate) fn delete<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    z: u32,
) -> Result<()> {
    let z_left = left_of(cache, pager, z);
    let z_right = right_of(cache, pager, z);

    let mut y = z;
    let mut y_orig_color = color_of(cache, pager, y);
    let x;

    if z_left == metadata.null_ptr {
        x = z_right;
        transplant(metadata, cache, pager, z, z_right);
    } else if z_right == metadata.null_ptr {
        x = z_left;
        transplant(metadata, cache, pager, z, z_left);
    } else {
        y = minimum(metadata, cache, pager, z_right);
        y_orig_color = color_of(cache, pager, y);
        x = right_of(cache, pager, y);

        if parent_of(cache, pager, y) == z {
            set_parent(cache, pager, x, y);
        } else {
            transplant(metadata, cache, pager, y, x);
            let zr = right_of(cache, pager, z);
            set_right(cache, pager, y, zr);
            set_parent(cache, pager, zr, y);
        }

        transplant(metadata, cache, pager, z, y);
        let zl = left_of(cache, pager, z);
        set_left(cache, pager, y, zl);
        set_parent(cache, pager, zl, y);
        let z_color = color_of(cache, pager, z);
        set_color(cache, pager, y, z_color);
    }

    if y_orig_color == Color::Black {
        fix_delete(metadata, cache, pager, x);
    }

    alloc::free(metadata, cache, pager, z)?;
    metadata.count -= 1;
    metadata.dirty = true;
    Ok(())
}
