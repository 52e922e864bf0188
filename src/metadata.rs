use byteorder::{BigEndian, ByteOrder};

/// On-disk layout of page 0 (§6): `page_size u16, nodeKeySize u16,
/// nodeValSize u16, rootPtr u32, nullPtr u32, top u32, count u32`, all
/// big-endian.
pub(crate) const METADATA_SIZE: usize = 2 + 2 + 2 + 4 + 4 + 4 + 4;

/// Tree-wide state, the singleton record at page 0 (§3).
#[derive(Debug, Clone)]
pub(crate) struct Metadata {
    pub page_size: u32,
    pub node_key_size: u16,
    pub node_val_size: u16,
    pub root_ptr: u32,
    pub null_ptr: u32,
    pub top: u32,
    pub count: u32,
    pub dirty: bool,
}

impl Metadata {
    pub fn encode(&self, buf: &mut [u8]) {
        BigEndian::write_u16(&mut buf[0..2], self.page_size as u16);
        BigEndian::write_u16(&mut buf[2..4], self.node_key_size);
        BigEndian::write_u16(&mut buf[4..6], self.node_val_size);
        BigEndian::write_u32(&mut buf[6..10], self.root_ptr);
        BigEndian::write_u32(&mut buf[10..14], self.null_ptr);
        BigEndian::write_u32(&mut buf[14..18], self.top);
        BigEndian::write_u32(&mut buf[18..22], self.count);
    }

    pub fn decode(buf: &[u8]) -> Self {
        Metadata {
            page_size: BigEndian::read_u16(&buf[0..2]) as u32,
            node_key_size: BigEndian::read_u16(&buf[2..4]),
            node_val_size: BigEndian::read_u16(&buf[4..6]),
            root_ptr: BigEndian::read_u32(&buf[6..10]),
            null_ptr: BigEndian::read_u32(&buf[10..14]),
            top: BigEndian::read_u32(&buf[14..18]),
            count: BigEndian::read_u32(&buf[18..22]),
            dirty: false,
        }
    }
}
