//! The slab allocator (§4.4): bump allocation of fresh slots, and free by
//! swap-with-last plus pager truncation when a page empties.

use crate::cache::PageCache;
use crate::entry::{Key, Value};
use crate::metadata::Metadata;
use crate::pager::Pager;
use crate::pointer;
use log::trace;

/// Allocates a fresh slot, growing the pager by one page whenever `top`
/// is about to land on slot 0 of a page that doesn't exist yet.
pub(crate) fn alloc<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &PageCache<K, V>,
    pager: &mut P,
) -> std::io::Result<u32> {
    let node_size = crate::node::Node::<K, V>::node_size() as u32;
    let page_size = metadata.page_size;

    let (_, index) = pointer::decode(metadata.top, page_size, node_size);
    if index == 0 {
        pager.alloc(1)?;
    }

    let ret = metadata.top;

    let (page_id, index) = pointer::decode(metadata.top, page_size, node_size);
    let next_index = index + 1;
    let degree = cache.degree() as u16;
    metadata.top = if next_index == degree {
        pointer::encode(page_id + 1, 0, page_size, node_size)
    } else {
        pointer::encode(page_id, next_index, page_size, node_size)
    };
    metadata.dirty = true;

    trace!("alloc: returned slot {}, new top {}", ret, metadata.top);
    Ok(ret)
}

/// Frees the slot at `p` by relocating the slot at `top - 1` into it
/// (unless `p` already is that slot), then retreats `top` and truncates a
/// trailing empty page from the pager if one has accumulated.
pub(crate) fn free<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    p: u32,
) -> std::io::Result<()> {
    let node_size = crate::node::Node::<K, V>::node_size() as u32;
    let page_size = metadata.page_size;
    let degree = cache.degree() as u16;

    let (top_page, top_index) = pointer::decode(metadata.top, page_size, node_size);
    let last = if top_index == 0 {
        pointer::encode(top_page - 1, degree - 1, page_size, node_size)
    } else {
        pointer::encode(top_page, top_index - 1, page_size, node_size)
    };

    if p != last {
        relocate(metadata, cache, pager, p, last);
    }

    metadata.top = last;
    metadata.dirty = true;

    let (last_page, last_index) = pointer::decode(last, page_size, node_size);
    if last_index == 0 && pager.count() > last_page {
        trace!("free: truncating trailing empty page {}", pager.count() - 1);
        let evicted = pager.count() - 1;
        pager.free(1)?;
        cache.evict(evicted);
    }

    Ok(())
}

/// Moves the node at `last` into slot `p`, rewiring its parent's child
/// link, `root_ptr` if `last` was the root, and the parent pointers of
/// its children (§4.4 steps 1-3).
fn relocate<K: Key, V: Value, P: Pager>(
    metadata: &mut Metadata,
    cache: &mut PageCache<K, V>,
    pager: &mut P,
    p: u32,
    last: u32,
) {
    let moved = cache.fetch(pager, last).clone();

    if moved.parent != metadata.null_ptr {
        let parent = cache.fetch_mut(pager, moved.parent);
        if parent.left == last {
            parent.left = p;
        } else if parent.right == last {
            parent.right = p;
        }
    }

    if last == metadata.root_ptr {
        metadata.root_ptr = p;
        metadata.dirty = true;
    }

    {
        let slot = cache.fetch_mut(pager, p);
        slot.color = moved.color;
        slot.left = moved.left;
        slot.right = moved.right;
        slot.parent = moved.parent;
        slot.entry = moved.entry.clone();
    }

    if moved.left != metadata.null_ptr {
        cache.fetch_mut(pager, moved.left).parent = p;
    }
    if moved.right != metadata.null_ptr {
        cache.fetch_mut(pager, moved.right).parent = p;
    }

    #[cfg(debug_assertions)]
    poison(cache, pager, last);
}

/// Zeroes the vacated slot in debug builds so a stray read of a stale raw
/// pointer decodes as an obviously-invalid node instead of silently
/// returning the relocated node's old content (§9's residual-parent open
/// question).
#[cfg(debug_assertions)]
fn poison<K: Key, V: Value, P: Pager>(cache: &mut PageCache<K, V>, pager: &mut P, raw: u32) {
    use crate::node::Node;
    let slot = cache.fetch_mut(pager, raw);
    *slot = Node::nil();
    slot.dirty = true;
}
