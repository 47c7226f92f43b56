//! Depth-bounded traversal of the debug filesystem tree.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::collector::traits::FileSystem;

/// Error listing a directory during a walk.
///
/// Aborts the walk: counters are only trustworthy as a complete pass, and
/// the next scheduled scrape retries anyway.
#[derive(Debug)]
pub struct WalkError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to list {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for WalkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Walks the tree below `root`, invoking `visit` for every regular file.
///
/// Directories more than `max_depth` levels below the root are pruned
/// before descent, so visited files always sit in a directory at depth
/// `max_depth` or less. Traversal order is unspecified; every file is
/// visited exactly once per walk.
pub fn walk<F, V>(fs: &F, root: &Path, max_depth: usize, visit: &mut V) -> Result<(), WalkError>
where
    F: FileSystem + ?Sized,
    V: FnMut(&Path),
{
    walk_dir(fs, root, 0, max_depth, visit)
}

fn walk_dir<F, V>(
    fs: &F,
    dir: &Path,
    depth: usize,
    max_depth: usize,
    visit: &mut V,
) -> Result<(), WalkError>
where
    F: FileSystem + ?Sized,
    V: FnMut(&Path),
{
    debug!("walking dir: {}", dir.display());

    let entries = fs.read_dir(dir).map_err(|source| WalkError {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        if fs.is_dir(&entry) {
            if depth + 1 > max_depth {
                debug!("pruning dir beyond depth bound: {}", entry.display());
                continue;
            }
            walk_dir(fs, &entry, depth + 1, max_depth, visit)?;
        } else {
            visit(&entry);
        }
    }

    Ok(())
}
