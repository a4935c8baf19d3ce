//! Low-level filesystem primitives the engine builds on: link creation and
//! discovery, attribute bits, positioned reads, disk geometry and FD limits.
//!
//! Everything here is a thin, testable wrapper over the OS. Attribute
//! semantics follow the lowest common denominator: on Unix only READONLY is
//! real (the write permission bits); the remaining bits read as absent and
//! set as tolerated no-ops, except [`encrypt`] which reports `Unsupported`.

use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};

bitflags::bitflags! {
    /// Attribute bits the engine propagates and restores around link
    /// transactions. Modeled as a set so a subset can be carried across a
    /// replace without consulting the platform again.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct FileAttributes: u32 {
        const READONLY = 1 << 0;
        const HIDDEN = 1 << 1;
        const SYSTEM = 1 << 2;
        const ARCHIVE = 1 << 3;
        const SPARSE = 1 << 4;
        const COMPRESSED = 1 << 5;
        const ENCRYPTED = 1 << 6;
        const NOT_CONTENT_INDEXED = 1 << 7;
    }
}

impl FileAttributes {
    /// The subset restored onto a materialized file.
    pub fn restorable(self) -> FileAttributes {
        self & (FileAttributes::READONLY
            | FileAttributes::ARCHIVE
            | FileAttributes::SYSTEM
            | FileAttributes::HIDDEN
            | FileAttributes::NOT_CONTENT_INDEXED)
    }
}

/// Read the attribute set of an already-stat'ed file.
pub fn read_attributes(meta: &Metadata) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    if meta.permissions().readonly() {
        attrs |= FileAttributes::READONLY;
    }
    attrs
}

/// Set or clear the readonly attribute.
pub fn set_readonly(path: &Path, readonly: bool) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() == readonly {
        return Ok(());
    }
    perms.set_readonly(readonly);
    fs::set_permissions(path, perms)
}

/// Clear the attributes that protect a file from deletion
/// (readonly, and hidden/system where those exist).
pub fn clear_protection_attributes(path: &Path) -> io::Result<()> {
    set_readonly(path, false)
}

/// Restore an attribute subset captured before a transaction.
pub fn restore_attributes(path: &Path, attrs: FileAttributes) -> io::Result<()> {
    if attrs.restorable().contains(FileAttributes::READONLY) {
        set_readonly(path, true)?;
    }
    Ok(())
}

/// Create a hard link at `link` pointing to the inode of `original`.
pub fn create_hard_link(original: &Path, link: &Path) -> io::Result<()> {
    fs::hard_link(original, link)
}

/// Create a symbolic link at `link` whose target text is `original`.
#[cfg(unix)]
pub fn create_symbolic_link(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub fn create_symbolic_link(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Number of directory entries sharing the file's inode. 1 means unlinked.
#[cfg(unix)]
pub fn hard_link_count(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

#[cfg(not(unix))]
pub fn hard_link_count(_meta: &Metadata) -> u64 {
    1
}

/// Paths in the same directory that share `path`'s inode, excluding `path`
/// itself. Unix has no reverse inode lookup, so siblings elsewhere in the
/// tree are not listed; callers must treat [`hard_link_count`] as the
/// authoritative "is linked" predicate.
#[cfg(unix)]
pub fn read_hard_link_targets(path: &Path, meta: &Metadata) -> io::Result<Vec<PathBuf>> {
    use std::os::unix::fs::MetadataExt;
    if meta.nlink() < 2 {
        return Ok(Vec::new());
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut siblings = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let candidate = entry.path();
        if candidate == path {
            continue;
        }
        // DirEntry::metadata does not traverse symlinks.
        let candidate_meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if candidate_meta.ino() == meta.ino() && candidate_meta.dev() == meta.dev() {
            siblings.push(candidate);
        }
    }
    Ok(siblings)
}

#[cfg(not(unix))]
pub fn read_hard_link_targets(_path: &Path, _meta: &Metadata) -> io::Result<Vec<PathBuf>> {
    Ok(Vec::new())
}

/// The target text of a symlink, or `None` when `path` is not a symlink.
pub fn read_symbolic_link_target(path: &Path) -> io::Result<Option<PathBuf>> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.file_type().is_symlink() {
        return Ok(None);
    }
    fs::read_link(path).map(Some)
}

/// Mark a file as sparse. Unix files are sparse on demand; nothing to do.
pub fn enable_sparse(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Enable transparent compression. Not available on this platform.
pub fn enable_compression(path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("compression attribute unsupported for {}", path.display()),
    ))
}

/// Encrypt a file with filesystem-level encryption. Not available here.
pub fn encrypt(path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("encryption attribute unsupported for {}", path.display()),
    ))
}

/// Fundamental allocation unit of the filesystem holding `path`, in bytes.
#[cfg(unix)]
pub fn query_cluster_size(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let cpath = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut out = MaybeUninit::<libc::statvfs>::uninit();
    if unsafe { libc::statvfs(cpath.as_ptr(), out.as_mut_ptr()) } != 0 {
        return None;
    }
    let st = unsafe { out.assume_init() };
    let cluster = st.f_frsize as u64;
    if cluster == 0 { None } else { Some(cluster) }
}

#[cfg(not(unix))]
pub fn query_cluster_size(_path: &Path) -> Option<u64> {
    None
}

/// Positioned read that fills `buf` as far as the file allows.
/// Returns the number of bytes read (short only at end of file).
#[cfg(unix)]
pub fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(windows)]
pub fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    let mut filled = 0;
    while filled < buf.len() {
        match file.seek_read(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Crawler thread cap that keeps concurrently open files under ~80% of the
/// FD soft limit. `None` when the platform reports no usable limit.
#[cfg(unix)]
pub fn worker_cap_for_fd_limit() -> Option<usize> {
    use crate::utils::config::WorkerLimits;

    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) };
    if rc != 0 || rlim.rlim_cur == libc::RLIM_INFINITY || rlim.rlim_cur > i64::MAX as u64 {
        return None;
    }
    let usable = (rlim.rlim_cur as f64 * WorkerLimits::FD_LIMIT_FRACTION) as usize;
    Some((usable / WorkerLimits::FDS_PER_WORKER).max(1))
}

#[cfg(not(unix))]
pub fn worker_cap_for_fd_limit() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn readonly_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, b"x").unwrap();

        set_readonly(&path, true).unwrap();
        let meta = fs::metadata(&path).unwrap();
        assert!(read_attributes(&meta).contains(FileAttributes::READONLY));

        clear_protection_attributes(&path).unwrap();
        let meta = fs::metadata(&path).unwrap();
        assert!(!read_attributes(&meta).contains(FileAttributes::READONLY));
    }

    #[cfg(unix)]
    #[test]
    fn hard_link_siblings_found_in_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"content").unwrap();
        create_hard_link(&a, &b).unwrap();

        let meta = fs::metadata(&a).unwrap();
        assert_eq!(hard_link_count(&meta), 2);
        let targets = read_hard_link_targets(&a, &meta).unwrap();
        assert_eq!(targets, vec![b]);
    }

    #[cfg(unix)]
    #[test]
    fn unlinked_file_has_no_targets() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        fs::write(&a, b"content").unwrap();
        let meta = fs::metadata(&a).unwrap();
        assert_eq!(hard_link_count(&meta), 1);
        assert!(read_hard_link_targets(&a, &meta).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        fs::write(&target, b"t").unwrap();
        create_symbolic_link(&target, &link).unwrap();

        assert_eq!(read_symbolic_link_target(&link).unwrap(), Some(target.clone()));
        assert_eq!(read_symbolic_link_target(&target).unwrap(), None);
    }

    #[test]
    fn positioned_read_fills_and_shortens_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        let mut f = File::create(&path).unwrap();
        f.write_all(&[7u8; 100]).unwrap();
        drop(f);

        let f = File::open(&path).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(read_full_at(&f, &mut buf, 0).unwrap(), 64);
        assert_eq!(read_full_at(&f, &mut buf, 90).unwrap(), 10);
        assert_eq!(read_full_at(&f, &mut buf, 200).unwrap(), 0);
    }

    #[test]
    fn cluster_size_is_sane_when_reported() {
        if let Some(cluster) = query_cluster_size(Path::new(".")) {
            assert!(cluster >= 512);
            assert!(cluster.is_power_of_two());
        }
    }
}
