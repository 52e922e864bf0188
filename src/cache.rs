use crate::entry::{Key, Value};
use crate::node::Node;
use crate::page::Page;
use crate::pager::Pager;
use crate::pointer;
use std::collections::HashMap;
use log::{debug, trace};

/// In-memory map from page-id to loaded node page (§4.3). Fetches through
/// the pager on miss; the cache is unbounded for the life of an open tree,
/// matching the teacher's own in-memory `PageFetcher`, just backed by a
/// real pager instead of a fixed in-process array.
pub(crate) struct PageCache<K, V> {
    page_size: u32,
    node_size: u32,
    degree: usize,
    pages: HashMap<u32, Page<K, V>>,
}

impl<K: Key, V: Value> PageCache<K, V> {
    pub fn new(page_size: u32, node_size: u32) -> Self {
        let degree = (page_size / node_size) as usize;
        PageCache {
            page_size,
            node_size,
            degree,
            pages: HashMap::new(),
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Returns the cached page, loading it from `pager` on miss.
    pub fn fetch_page<P: Pager>(&mut self, pager: &mut P, page_id: u32) -> &Page<K, V> {
        self.fetch_page_mut_inner(pager, page_id)
    }

    fn fetch_page_mut_inner<P: Pager>(&mut self, pager: &mut P, page_id: u32) -> &mut Page<K, V> {
        if !self.pages.contains_key(&page_id) {
            trace!("page cache miss for page {}, fetching through pager", page_id);
            let mut buf = vec![0u8; self.page_size as usize];
            pager
                .unmarshal(page_id, &mut buf)
                .expect("pager failed to materialize page");
            let page = Page::decode(page_id, &buf, self.node_size as usize, self.degree);
            self.pages.insert(page_id, page);
        }
        self.pages.get_mut(&page_id).unwrap()
    }

    /// Returns a read-only reference to the node at `raw`.
    pub fn fetch<P: Pager>(&mut self, pager: &mut P, raw: u32) -> &Node<K, V> {
        let (page_id, index) = pointer::decode(raw, self.page_size, self.node_size);
        let page = self.fetch_page_mut_inner(pager, page_id);
        &page.slots[index as usize]
    }

    /// Returns a mutable reference to the node at `raw`, eagerly marking
    /// both the node and its containing page dirty (§4.5: "every write
    /// goes through fetch and the returned slot must have its dirty flag
    /// set before returning").
    pub fn fetch_mut<P: Pager>(&mut self, pager: &mut P, raw: u32) -> &mut Node<K, V> {
        let (page_id, index) = pointer::decode(raw, self.page_size, self.node_size);
        let page = self.fetch_page_mut_inner(pager, page_id);
        page.dirty = true;
        let node = &mut page.slots[index as usize];
        node.dirty = true;
        node
    }

    /// Drops a page from the cache, used when the allocator truncates a
    /// trailing page from the pager.
    pub fn evict(&mut self, page_id: u32) {
        debug!("evicting page {} from cache", page_id);
        self.pages.remove(&page_id);
    }

    /// Walks the cache and marshals every page with at least one dirty
    /// node (§4.8), consolidating node-level dirty tracking to page-level
    /// on the way out.
    pub fn write_all<P: Pager>(&mut self, pager: &mut P) -> std::io::Result<()> {
        let mut ids: Vec<u32> = self.pages.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let page = self.pages.get_mut(&id).unwrap();
            if page.any_node_dirty() {
                page.dirty = true;
                page.clear_node_dirty();
            }
            if page.dirty {
                let mut buf = vec![0u8; self.page_size as usize];
                page.encode(&mut buf, self.node_size as usize);
                pager.marshal(id, &buf)?;
                page.dirty = false;
            }
        }
        Ok(())
    }
}
