//! The pager contract (§6): a page-addressed block store. The tree
//! treats this as an external collaborator — out of scope for the red-black
//! and allocator logic, but a usable crate needs at least one real
//! implementation behind the trait, so this module ships both a
//! file-backed `FilePager` and an in-memory `MemPager` used by tests.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A page-addressed block store. Pages are zero-based; page 0 belongs to
/// the tree for metadata.
pub trait Pager {
    /// Grows the store by `n` pages, returning the id of the first new page.
    fn alloc(&mut self, n: u32) -> io::Result<u32>;

    /// Truncates the last `n` pages from the store.
    fn free(&mut self, n: u32) -> io::Result<()>;

    /// Writes `buf` (exactly `page_size()` bytes) to `page_id`.
    fn marshal(&mut self, page_id: u32, buf: &[u8]) -> io::Result<()>;

    /// Reads `page_id` into `buf` (exactly `page_size()` bytes).
    fn unmarshal(&mut self, page_id: u32, buf: &mut [u8]) -> io::Result<()>;

    /// Total number of pages currently in the store.
    fn count(&self) -> u32;

    /// Whether the store was opened read-only.
    fn read_only(&self) -> bool;

    /// Size in bytes of a single page.
    fn page_size(&self) -> u32;

    /// Flushes and releases any underlying resources. Idempotent.
    fn close(&mut self) -> io::Result<()>;

    /// Deletes the backing store entirely.
    fn remove(&mut self) -> io::Result<()>;
}

/// A real file-backed pager. Pages are stored contiguously:
/// page `id` occupies byte range `[id * page_size, (id+1) * page_size)`.
#[derive(Debug)]
pub struct FilePager {
    file: Option<File>,
    path: PathBuf,
    page_size: u32,
    page_count: u32,
    read_only: bool,
}

impl FilePager {
    /// Opens (creating if missing) the file at `path` as a pager of
    /// `page_size`-byte pages.
    pub fn open(path: impl AsRef<Path>, page_size: u32, read_only: bool) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(&path)?;

        let len = file.metadata()?.len();
        let page_count = (len / page_size as u64) as u32;

        Ok(FilePager {
            file: Some(file),
            path,
            page_size,
            page_count,
            read_only,
        })
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "pager is closed"))
    }
}

impl Pager for FilePager {
    fn alloc(&mut self, n: u32) -> io::Result<u32> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot alloc on a read-only pager",
            ));
        }
        let first = self.page_count;
        let new_len = (self.page_count as u64 + n as u64) * self.page_size as u64;
        self.file_mut()?.set_len(new_len)?;
        self.page_count += n;
        Ok(first)
    }

    fn free(&mut self, n: u32) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot free on a read-only pager",
            ));
        }
        let n = n.min(self.page_count);
        self.page_count -= n;
        let new_len = self.page_count as u64 * self.page_size as u64;
        self.file_mut()?.set_len(new_len)
    }

    fn marshal(&mut self, page_id: u32, buf: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot marshal on a read-only pager",
            ));
        }
        debug_assert_eq!(buf.len(), self.page_size as usize);
        let offset = page_id as u64 * self.page_size as u64;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    fn unmarshal(&mut self, page_id: u32, buf: &mut [u8]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), self.page_size as usize);
        let offset = page_id as u64 * self.page_size as u64;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn count(&self) -> u32 {
        self.page_count
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.file {
            file.sync_all()?;
        }
        self.file = None;
        Ok(())
    }

    fn remove(&mut self) -> io::Result<()> {
        self.close()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// An in-memory pager, used by unit and property tests so the
/// allocator/red-black logic can be exercised without filesystem I/O.
#[derive(Debug, Default)]
pub struct MemPager {
    pages: Vec<Vec<u8>>,
    page_size: u32,
    read_only: bool,
}

impl MemPager {
    pub fn new(page_size: u32) -> Self {
        MemPager {
            pages: Vec::new(),
            page_size,
            read_only: false,
        }
    }
}

impl Pager for MemPager {
    fn alloc(&mut self, n: u32) -> io::Result<u32> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot alloc on a read-only pager",
            ));
        }
        let first = self.pages.len() as u32;
        for _ in 0..n {
            self.pages.push(vec![0u8; self.page_size as usize]);
        }
        Ok(first)
    }

    fn free(&mut self, n: u32) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot free on a read-only pager",
            ));
        }
        let n = (n as usize).min(self.pages.len());
        self.pages.truncate(self.pages.len() - n);
        Ok(())
    }

    fn marshal(&mut self, page_id: u32, buf: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot marshal on a read-only pager",
            ));
        }
        let page = self.pages.get_mut(page_id as usize).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "page_id out of range")
        })?;
        page.copy_from_slice(buf);
        Ok(())
    }

    fn unmarshal(&mut self, page_id: u32, buf: &mut [u8]) -> io::Result<()> {
        let page = self.pages.get(page_id as usize).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "page_id out of range")
        })?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn remove(&mut self) -> io::Result<()> {
        self.pages.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_pager_alloc_marshal_unmarshal_round_trip() {
        let mut pager = MemPager::new(16);
        let id = pager.alloc(1).unwrap();
        assert_eq!(id, 0);
        assert_eq!(pager.count(), 1);

        let buf = vec![7u8; 16];
        pager.marshal(0, &buf).unwrap();

        let mut out = vec![0u8; 16];
        pager.unmarshal(0, &mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn mem_pager_free_truncates() {
        let mut pager = MemPager::new(16);
        pager.alloc(3).unwrap();
        assert_eq!(pager.count(), 3);
        pager.free(1).unwrap();
        assert_eq!(pager.count(), 2);
    }

    #[test]
    fn file_pager_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let mut pager = FilePager::open(&path, 64, false).unwrap();
        assert_eq!(pager.count(), 0);

        let id = pager.alloc(2).unwrap();
        assert_eq!(id, 0);
        assert_eq!(pager.count(), 2);

        let buf = vec![9u8; 64];
        pager.marshal(1, &buf).unwrap();

        let mut out = vec![0u8; 64];
        pager.unmarshal(1, &mut out).unwrap();
        assert_eq!(out, buf);

        pager.free(1).unwrap();
        assert_eq!(pager.count(), 1);

        pager.close().unwrap();

        // Reopening should see the persisted page count.
        let pager2 = FilePager::open(&path, 64, false).unwrap();
        assert_eq!(pager2.count(), 1);
    }
}
