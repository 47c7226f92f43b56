//! VM mapping file loading and the anchor lookup index.
//!
//! The mapping file associates logical VM names with the directory name
//! (typically the qemu process id) that anchors their counters below the
//! debug root:
//!
//! ```yaml
//! vm_infos:
//!   vm1:
//!     pid: "1234"
//!     kvm_debug_dir: "1234"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::collector::traits::FileSystem;

/// One configured virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VmInfo {
    /// Process id of the VM, as recorded by the provisioning layer.
    pub pid: String,
    /// Directory name anchoring this VM's counters below the debug root.
    pub kvm_debug_dir: String,
}

/// Parsed mapping file: VM name -> [`VmInfo`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmMap {
    #[serde(default)]
    pub vm_infos: HashMap<String, VmInfo>,
}

/// Error loading or indexing the VM mapping file.
#[derive(Debug)]
pub enum ConfigError {
    /// The mapping file could not be read.
    Read { path: PathBuf, source: io::Error },
    /// The mapping file is not valid YAML of the expected shape.
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    /// Two VM names claim the same anchor directory.
    DuplicateAnchor {
        anchor: String,
        first: String,
        second: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read vm map {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse vm map {}: {}", path.display(), source)
            }
            ConfigError::DuplicateAnchor {
                anchor,
                first,
                second,
            } => write!(
                f,
                "vm map anchor {:?} is claimed by both {:?} and {:?}",
                anchor, first, second
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::DuplicateAnchor { .. } => None,
        }
    }
}

/// Loads and parses the VM mapping file.
pub fn load_vm_map<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<VmMap, ConfigError> {
    let content = fs.read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Immutable inverted index: anchor directory name -> VM name.
///
/// Built fresh from a [`VmMap`] on every (re)load and published wholesale;
/// never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct DomainIndex {
    by_anchor: HashMap<String, String>,
}

impl DomainIndex {
    /// Builds the index by inverting the name -> anchor mapping.
    ///
    /// A duplicate anchor is rejected rather than silently overwritten;
    /// entries are processed in VM-name order so the reported pair is
    /// deterministic.
    pub fn from_vm_map(map: &VmMap) -> Result<Self, ConfigError> {
        let mut names: Vec<&String> = map.vm_infos.keys().collect();
        names.sort();

        let mut by_anchor = HashMap::with_capacity(names.len());
        for name in names {
            let anchor = &map.vm_infos[name].kvm_debug_dir;
            if let Some(first) = by_anchor.insert(anchor.clone(), name.clone()) {
                return Err(ConfigError::DuplicateAnchor {
                    anchor: anchor.clone(),
                    first,
                    second: name.clone(),
                });
            }
        }

        Ok(Self { by_anchor })
    }

    /// Resolves an anchor directory name to its VM name.
    pub fn lookup(&self, anchor: &str) -> Option<&str> {
        self.by_anchor.get(anchor).map(String::as_str)
    }

    /// Number of indexed VMs.
    pub fn len(&self) -> usize {
        self.by_anchor.len()
    }

    /// Returns `true` if no VMs are configured.
    pub fn is_empty(&self) -> bool {
        self.by_anchor.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const VALID_YAML: &str = "\
vm_infos:
  vm1:
    pid: \"1234\"
    kvm_debug_dir: \"1234\"
  vm2:
    pid: \"5678\"
    kvm_debug_dir: \"5678\"
";

    #[test]
    fn test_load_vm_map() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/vm.yaml", VALID_YAML);

        let map = load_vm_map(&fs, Path::new("/etc/vm.yaml")).unwrap();
        assert_eq!(map.vm_infos.len(), 2);
        assert_eq!(map.vm_infos["vm1"].pid, "1234");
        assert_eq!(map.vm_infos["vm1"].kvm_debug_dir, "1234");
        assert_eq!(map.vm_infos["vm2"].kvm_debug_dir, "5678");
    }

    #[test]
    fn test_load_vm_map_missing_file() {
        let fs = MockFs::new();
        let err = load_vm_map(&fs, Path::new("/etc/vm.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_vm_map_invalid_yaml() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/vm.yaml", "vm_infos: [not, a, mapping]");

        let err = load_vm_map(&fs, Path::new("/etc/vm.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_vm_map_empty_document() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/vm.yaml", "vm_infos: {}\n");

        let map = load_vm_map(&fs, Path::new("/etc/vm.yaml")).unwrap();
        assert!(map.vm_infos.is_empty());
    }

    #[test]
    fn test_domain_index_lookup() {
        let map: VmMap = serde_yaml::from_str(VALID_YAML).unwrap();
        let index = DomainIndex::from_vm_map(&map).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("1234"), Some("vm1"));
        assert_eq!(index.lookup("5678"), Some("vm2"));
        assert_eq!(index.lookup("9999"), None);
    }

    #[test]
    fn test_domain_index_rejects_duplicate_anchor() {
        let yaml = "\
vm_infos:
  vmb:
    pid: \"1234\"
    kvm_debug_dir: \"1234\"
  vma:
    pid: \"1234\"
    kvm_debug_dir: \"1234\"
";
        let map: VmMap = serde_yaml::from_str(yaml).unwrap();
        let err = DomainIndex::from_vm_map(&map).unwrap_err();

        match err {
            ConfigError::DuplicateAnchor {
                anchor,
                first,
                second,
            } => {
                assert_eq!(anchor, "1234");
                // Name-ordered insertion makes the report deterministic.
                assert_eq!(first, "vma");
                assert_eq!(second, "vmb");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
