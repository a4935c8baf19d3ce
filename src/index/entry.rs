//! One discovered file and its equality oracle.

use std::fs::File;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::warn;
use sha2::{Digest, Sha512};

use crate::fsops;
use crate::io::{blocks_equal, outside_in, BufferPool, Lease};
use crate::utils::config::RAW_DIGEST_THRESHOLD;

/// Immutable descriptor of a seen file: path, size captured at discovery,
/// and a short digest computed at most once (first caller publishes it).
pub struct FileEntry {
    path: PathBuf,
    size: u64,
    digest: OnceLock<Option<Vec<u8>>>,
}

impl FileEntry {
    pub fn new(path: PathBuf, size: u64) -> Self {
        FileEntry {
            path,
            size,
            digest: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The short digest: raw content for tiny files, otherwise SHA-512 over
    /// the first and last block. `None` when the file could not be read;
    /// the failure sticks so the file is not re-read on every comparison.
    fn short_digest(&self) -> Option<&[u8]> {
        self.digest
            .get_or_init(|| match compute_short_digest(&self.path, self.size) {
                Ok(digest) => Some(digest),
                Err(e) => {
                    warn!("cannot digest {}: {e}", self.path.display());
                    None
                }
            })
            .as_deref()
    }

    /// Byte-exact equality with `other`. Sizes must already match (bucket
    /// residency guarantees it); a mismatch here is answered with `false`.
    /// Any I/O failure is conservatively "not equal".
    pub fn content_equals(&self, other: &FileEntry) -> bool {
        if self.size != other.size {
            return false;
        }
        if self.size == 0 {
            return true;
        }
        let (mine, theirs) = match (self.short_digest(), other.short_digest()) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        if !blocks_equal(mine, theirs) {
            return false;
        }
        if self.size < RAW_DIGEST_THRESHOLD {
            // The digest was the raw content; every byte is already verified.
            return true;
        }
        match self.bytewise_equals(other) {
            Ok(equal) => equal,
            Err(e) => {
                warn!(
                    "comparing {} with {}: {e}",
                    self.path.display(),
                    other.path.display()
                );
                false
            }
        }
    }

    /// Full bytewise pass in shuffled block order with two buffer pairs:
    /// the next pair is read before the current pair is compared, so a read
    /// is always in flight ahead of the comparison.
    fn bytewise_equals(&self, other: &FileEntry) -> io::Result<bool> {
        let mine = File::open(&self.path)?;
        let theirs = File::open(&other.path)?;

        let pool = BufferPool::global();
        let block = pool.block_size() as u64;
        let blocks = self.size.div_ceil(block);

        let mut order = outside_in(blocks);
        let Some(first) = order.next() else {
            return Ok(true);
        };

        let mut cur_a = pool.rent();
        let mut cur_b = pool.rent();
        let mut next_a = pool.rent();
        let mut next_b = pool.rent();

        let (mut len_a, mut len_b) =
            read_block_pair(&mine, &theirs, first, block, &mut cur_a, &mut cur_b)?;
        for index in order {
            let lens = read_block_pair(&mine, &theirs, index, block, &mut next_a, &mut next_b)?;
            if !blocks_equal(&cur_a[..len_a], &cur_b[..len_b]) {
                return Ok(false);
            }
            mem::swap(&mut cur_a, &mut next_a);
            mem::swap(&mut cur_b, &mut next_b);
            (len_a, len_b) = lens;
        }
        Ok(blocks_equal(&cur_a[..len_a], &cur_b[..len_b]))
    }
}

fn read_block_pair(
    a: &File,
    b: &File,
    index: u64,
    block: u64,
    buf_a: &mut Lease<'_>,
    buf_b: &mut Lease<'_>,
) -> io::Result<(usize, usize)> {
    let offset = index * block;
    let len_a = fsops::read_full_at(a, buf_a, offset)?;
    let len_b = fsops::read_full_at(b, buf_b, offset)?;
    Ok((len_a, len_b))
}

fn compute_short_digest(path: &Path, size: u64) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;

    if size < RAW_DIGEST_THRESHOLD {
        let mut content = vec![0u8; size as usize];
        let n = fsops::read_full_at(&file, &mut content, 0)?;
        content.truncate(n);
        return Ok(content);
    }

    let pool = BufferPool::global();
    let mut buf = pool.rent();
    let block = buf.len() as u64;

    let mut hasher = Sha512::new();
    let n = fsops::read_full_at(&file, &mut buf, 0)?;
    hasher.update(&buf[..n]);
    if size > block {
        // One block from the tail; overlaps the head read only when the
        // file is shorter than two blocks.
        let offset = block.max(size - block);
        let n = fsops::read_full_at(&file, &mut buf, offset)?;
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry_for(path: &Path) -> FileEntry {
        let size = fs::metadata(path).unwrap().len();
        FileEntry::new(path.to_path_buf(), size)
    }

    #[test]
    fn identical_files_compare_equal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let content: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        fs::write(&a, &content).unwrap();
        fs::write(&b, &content).unwrap();

        assert!(entry_for(&a).content_equals(&entry_for(&b)));
    }

    #[test]
    fn same_size_different_content_compares_unequal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let mut content = vec![0x55u8; 8192];
        fs::write(&a, &content).unwrap();
        content[4000] ^= 1;
        fs::write(&b, &content).unwrap();

        assert!(!entry_for(&a).content_equals(&entry_for(&b)));
    }

    #[test]
    fn tiny_files_use_raw_content_as_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("s1.txt");
        let b = dir.path().join("s2.txt");
        let c = dir.path().join("s3.txt");
        fs::write(&a, b"abc").unwrap();
        fs::write(&b, b"abc").unwrap();
        fs::write(&c, b"abd").unwrap();

        assert!(entry_for(&a).content_equals(&entry_for(&b)));
        assert!(!entry_for(&a).content_equals(&entry_for(&c)));
    }

    #[test]
    fn size_mismatch_is_unequal_without_io() {
        let a = FileEntry::new(PathBuf::from("/nonexistent/a"), 10);
        let b = FileEntry::new(PathBuf::from("/nonexistent/b"), 11);
        assert!(!a.content_equals(&b));
    }

    #[test]
    fn zero_size_is_equal_without_io() {
        let a = FileEntry::new(PathBuf::from("/nonexistent/a"), 0);
        let b = FileEntry::new(PathBuf::from("/nonexistent/b"), 0);
        assert!(a.content_equals(&b));
    }

    #[test]
    fn unreadable_file_is_never_equal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        fs::write(&a, vec![1u8; 128]).unwrap();
        let gone = FileEntry::new(dir.path().join("missing"), 128);
        assert!(!entry_for(&a).content_equals(&gone));
        assert!(!gone.content_equals(&entry_for(&a)));
    }

    #[test]
    fn digest_is_deterministic_across_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let content: Vec<u8> = (0..300u32).map(|i| (i * 7 % 256) as u8).collect();
        fs::write(&a, &content).unwrap();

        let first = entry_for(&a);
        let second = entry_for(&a);
        assert_eq!(first.short_digest(), second.short_digest());
        assert_eq!(first.short_digest().map(<[u8]>::len), Some(64));
    }
}
