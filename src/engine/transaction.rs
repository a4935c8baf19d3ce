//! The two filesystem transactions: replacing a duplicate with a link, and
//! materializing a link back into an independent file.
//!
//! Both work through a temporary sibling (`name.$$$`) so the victim path is
//! never left missing or half-written: every failure point has a
//! compensation that restores the pre-transaction state, and no temporary
//! file survives any exit path.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

use crate::fsops;
use crate::types::{Configuration, LinkKind};
use crate::utils::config::TEMP_SUFFIX;

/// Reserve a collision-free temporary name next to `victim` by creating the
/// file. Appends further suffixes while the name is taken (including races).
fn reserve_temp_file(victim: &Path) -> io::Result<PathBuf> {
    let mut name = victim.as_os_str().to_os_string();
    loop {
        name.push(TEMP_SUFFIX);
        let candidate = PathBuf::from(&name);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Replace the previously-unlinked `victim` with a link to `twin`.
///
/// The link is first created under a temporary name, then swapped in:
/// clear readonly, delete the victim, rename the link into place. If the
/// swap fails after the victim is gone, the content is recovered by copying
/// from the temporary link; in every failure case the temporary is removed
/// before the error propagates.
pub fn replace_with_link(
    victim: &Path,
    twin: &Path,
    config: &Configuration,
) -> Result<LinkKind> {
    let temp = reserve_temp_file(victim)
        .with_context(|| format!("reserve temp name for {}", victim.display()))?;
    // Only the name was needed; the link is created fresh at it.
    fs::remove_file(&temp).with_context(|| format!("free reserved {}", temp.display()))?;

    let kind = match fsops::create_hard_link(twin, &temp) {
        Ok(()) => LinkKind::Hard,
        Err(hard_err) if config.also_try_symlink => {
            match fsops::create_symbolic_link(twin, &temp) {
                Ok(()) => LinkKind::Symbolic,
                Err(sym_err) => {
                    return Err(sym_err).with_context(|| {
                        format!(
                            "neither hard link ({hard_err}) nor symbolic link to {}",
                            twin.display()
                        )
                    });
                }
            }
        }
        Err(hard_err) => {
            return Err(hard_err)
                .with_context(|| format!("hard link to {}", twin.display()));
        }
    };

    if let Err(e) = fsops::set_readonly(victim, false) {
        let _ = fs::remove_file(&temp);
        return Err(e).with_context(|| format!("clear readonly on {}", victim.display()));
    }
    if let Err(e) = fs::remove_file(victim) {
        let _ = fs::remove_file(&temp);
        return Err(e).with_context(|| format!("delete {}", victim.display()));
    }
    if let Err(e) = fs::rename(&temp, victim) {
        // The victim is already gone; bring its content back from the link.
        let _ = fs::copy(&temp, victim);
        let _ = fs::remove_file(&temp);
        return Err(e).with_context(|| format!("rename link into {}", victim.display()));
    }

    let readonly = match kind {
        LinkKind::Hard => config.set_readonly_on_new_hardlinks,
        LinkKind::Symbolic => config.set_readonly_on_new_symlinks,
    };
    if readonly {
        if let Err(e) = fsops::set_readonly(victim, true) {
            warn!("cannot set readonly on new {kind} {}: {e}", victim.display());
        }
    }
    Ok(kind)
}

/// Progress marker for [`materialize_back`]; the drop compensation picks
/// its recovery from the step that was in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Copying,
    Deleting,
    Renaming,
    Attributing,
    Done,
}

struct Compensator<'a> {
    step: Step,
    temp: &'a Path,
    victim: &'a Path,
}

impl Drop for Compensator<'_> {
    fn drop(&mut self) {
        match self.step {
            Step::Copying | Step::Deleting => {
                // The victim is untouched; discard the half-built copy.
                let _ = fsops::clear_protection_attributes(self.temp);
                let _ = fs::remove_file(self.temp);
            }
            Step::Renaming => {
                // The victim is gone; the copy has its content. Move it back.
                let _ = fs::rename(self.temp, self.victim);
            }
            Step::Attributing => {
                // Content is safe; mis-set attributes are not worth failing over.
                warn!(
                    "attributes on {} may be partially restored",
                    self.victim.display()
                );
            }
            Step::Done => {}
        }
    }
}

/// Replace the link at `victim` with an independent copy of the content it
/// resolves to. Attribute propagation onto the copy is best effort, except
/// encryption, which must succeed when the original carries it.
pub fn materialize_back(victim: &Path) -> Result<()> {
    let original = fs::symlink_metadata(victim)
        .with_context(|| format!("stat {}", victim.display()))?;
    let attrs = fsops::read_attributes(&original);

    let temp = reserve_temp_file(victim)
        .with_context(|| format!("reserve temp name for {}", victim.display()))?;
    let mut guard = Compensator {
        step: Step::Copying,
        temp: &temp,
        victim,
    };

    if attrs.contains(fsops::FileAttributes::SPARSE) {
        if let Err(e) = fsops::enable_sparse(&temp) {
            warn!("cannot mark {} sparse: {e}", temp.display());
        }
    }
    if attrs.contains(fsops::FileAttributes::COMPRESSED) {
        if let Err(e) = fsops::enable_compression(&temp) {
            warn!("cannot mark {} compressed: {e}", temp.display());
        }
    }
    if attrs.contains(fsops::FileAttributes::ENCRYPTED) {
        fsops::encrypt(&temp).with_context(|| format!("encrypt {}", temp.display()))?;
    }

    fs::copy(victim, &temp)
        .with_context(|| format!("copy {} to {}", victim.display(), temp.display()))?;
    guard.step = Step::Deleting;

    fs::remove_file(victim).with_context(|| format!("delete {}", victim.display()))?;
    guard.step = Step::Renaming;

    fs::rename(&temp, victim)
        .with_context(|| format!("rename copy into {}", victim.display()))?;
    guard.step = Step::Attributing;

    if let Err(e) = fsops::restore_attributes(victim, attrs) {
        warn!("cannot restore attributes on {}: {e}", victim.display());
    }
    guard.step = Step::Done;
    Ok(())
}
