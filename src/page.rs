use crate::entry::{Key, Value};
use crate::node::Node;

/// A page: `degree` fixed-size node slots plus an in-memory dirty flag and
/// id (§3). Unlike the teacher's item-pointer-table page, node pages here
/// hold a dense fixed-size array — there is no variable-length item
/// directory, because every slot is the same `Node<K, V>` size.
pub(crate) struct Page<K, V> {
    pub id: u32,
    pub slots: Vec<Node<K, V>>,
    pub dirty: bool,
}

impl<K: Key, V: Value> Page<K, V> {
    pub fn decode(id: u32, buf: &[u8], node_size: usize, degree: usize) -> Self {
        let slots = (0..degree)
            .map(|i| Node::decode(&buf[i * node_size..(i + 1) * node_size]))
            .collect();
        Page {
            id,
            slots,
            dirty: false,
        }
    }

    pub fn encode(&self, buf: &mut [u8], node_size: usize) {
        for (i, node) in self.slots.iter().enumerate() {
            node.encode(&mut buf[i * node_size..(i + 1) * node_size]);
        }
    }

    pub fn any_node_dirty(&self) -> bool {
        self.slots.iter().any(|n| n.dirty)
    }

    pub fn clear_node_dirty(&mut self) {
        for n in self.slots.iter_mut() {
            n.dirty = false;
        }
    }
}
