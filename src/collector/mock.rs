//! In-memory mock filesystem for testing collectors without a real debugfs.
//!
//! `MockFs` simulates a filesystem in memory, allowing tests to model
//! arbitrary KVM debug tree states without root privileges or Linux.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Stores files and directories in memory, allowing tests to simulate
/// various debug tree and mapping file states.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds a counter file below the debug root.
    ///
    /// `dirs` are the directory segments between the root and the file,
    /// e.g. `&["1234", "cpu0"]` for a per-vcpu counter.
    pub fn add_counter(
        &mut self,
        root: impl AsRef<Path>,
        dirs: &[&str],
        name: &str,
        content: impl Into<String>,
    ) {
        let mut path = root.as_ref().to_path_buf();
        for dir in dirs {
            path.push(dir);
        }
        self.add_file(path.join(name), content);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries: Vec<PathBuf> = self
            .files
            .keys()
            .chain(self.directories.iter())
            .filter(|candidate| candidate.parent().is_some_and(|parent| parent == path))
            .cloned()
            .collect();

        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/kernel/debug/kvm/exits", "42\n");

        assert!(fs.exists(Path::new("/sys/kernel/debug/kvm/exits")));
        assert!(fs.exists(Path::new("/sys/kernel/debug/kvm")));
        assert!(fs.is_dir(Path::new("/sys/kernel/debug/kvm")));
        assert!(!fs.is_dir(Path::new("/sys/kernel/debug/kvm/exits")));

        let content = fs
            .read_to_string(Path::new("/sys/kernel/debug/kvm/exits"))
            .unwrap();
        assert_eq!(content, "42\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/kvm/exits", "1");
        fs.add_file("/kvm/1234/exits", "2");
        fs.add_file("/kvm/5678/exits", "3");

        let entries = fs.read_dir(Path::new("/kvm")).unwrap();
        assert_eq!(entries.len(), 3); // exits + two vm dirs

        let vm_entries = fs.read_dir(Path::new("/kvm/1234")).unwrap();
        assert_eq!(vm_entries, vec![PathBuf::from("/kvm/1234/exits")]);
    }

    #[test]
    fn test_mock_fs_add_counter() {
        let mut fs = MockFs::new();
        fs.add_counter("/kvm", &["1234", "cpu0"], "halt-count", "7");

        assert!(fs.exists(Path::new("/kvm/1234/cpu0/halt-count")));
        assert!(fs.is_dir(Path::new("/kvm/1234/cpu0")));
        assert!(fs.is_dir(Path::new("/kvm/1234")));
    }

    #[test]
    fn test_mock_fs_not_found() {
        let fs = MockFs::new();
        let result = fs.read_to_string(Path::new("/nonexistent"));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);

        let result = fs.read_dir(Path::new("/nonexistent"));
        assert!(result.is_err());
    }
}
