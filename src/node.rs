use crate::entry::{Entry, Key, Value};
use byteorder::{BigEndian, ByteOrder};

/// Fixed bytes ahead of the embedded entry: 1 (flags) + 4 (parent) + 4
/// (left) + 4 (right).
pub(crate) const NODE_FIXED_SIZE: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    Black = 0,
    Red = 1,
}

impl Color {
    fn from_flags(b: u8) -> Self {
        if b & 1 == 1 {
            Color::Red
        } else {
            Color::Black
        }
    }

    fn to_flags(self) -> u8 {
        self as u8
    }
}

/// A node record: color flag, parent/left/right raw pointers, and the
/// embedded key/value pair (§3). `dirty` is in-memory only and is never
/// encoded.
#[derive(Debug, Clone)]
pub(crate) struct Node<K, V> {
    pub color: Color,
    pub parent: u32,
    pub left: u32,
    pub right: u32,
    pub entry: Entry<K, V>,
    pub dirty: bool,
}

impl<K: Key, V: Value> Node<K, V> {
    /// On-disk size of a node record: `S_fixed + size(K) + size(V)`.
    pub fn node_size() -> usize {
        NODE_FIXED_SIZE + Entry::<K, V>::size()
    }

    /// A freshly zeroed node, as occupies an as-yet-unused slot.
    pub fn nil() -> Self {
        Node {
            color: Color::Black,
            parent: 0,
            left: 0,
            right: 0,
            entry: Entry::nil(),
            dirty: false,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.color.to_flags();
        BigEndian::write_u32(&mut buf[1..5], self.parent);
        BigEndian::write_u32(&mut buf[5..9], self.left);
        BigEndian::write_u32(&mut buf[9..13], self.right);
        self.entry.encode(&mut buf[NODE_FIXED_SIZE..]);
    }

    pub fn decode(buf: &[u8]) -> Self {
        let color = Color::from_flags(buf[0]);
        let parent = BigEndian::read_u32(&buf[1..5]);
        let left = BigEndian::read_u32(&buf[5..9]);
        let right = BigEndian::read_u32(&buf[9..13]);
        let entry = Entry::decode(&buf[NODE_FIXED_SIZE..]);
        Node {
            color,
            parent,
            left,
            right,
            entry,
            dirty: false,
        }
    }
}
