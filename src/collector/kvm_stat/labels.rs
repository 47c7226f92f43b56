//! Resolution of a counter file's directory into domain/vcpu labels.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use super::vm_map::DomainIndex;

/// Domain label for counters sitting directly under the debug root.
pub const GLOBAL_DOMAIN: &str = "global";

/// Labels attached to one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    /// VM name, or `"global"` for top-level aggregate counters.
    pub domain: String,
    /// Vcpu directory name, present only for per-vcpu counters.
    pub vcpu: Option<String>,
}

/// Error resolving a directory path to labels.
#[derive(Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The directory is neither the debug root nor below it.
    OutsideRoot { dir: PathBuf },
    /// The directory sits deeper than two levels below the root.
    ///
    /// The walker prunes such subtrees, but resolution defends on its own.
    DepthExceeded { dir: PathBuf },
    /// The anchor directory is not in the configured mapping, e.g. a VM
    /// that is running but was never declared.
    UnknownAnchor { anchor: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::OutsideRoot { dir } => {
                write!(f, "dir {} is outside the debug root", dir.display())
            }
            ResolveError::DepthExceeded { dir } => {
                write!(f, "dir {} is beyond the depth bound", dir.display())
            }
            ResolveError::UnknownAnchor { anchor } => {
                write!(f, "anchor {:?} has no configured vm", anchor)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Computes the labels for a counter file whose parent directory is
/// `parent`, using one index snapshot.
///
/// Files directly under the root resolve to the `"global"` domain; one
/// level down the directory name is the anchor; two levels down the inner
/// directory names the vcpu and the outer one the anchor.
pub fn resolve(index: &DomainIndex, parent: &Path, root: &Path) -> Result<Labels, ResolveError> {
    let rel = parent
        .strip_prefix(root)
        .map_err(|_| ResolveError::OutsideRoot {
            dir: parent.to_path_buf(),
        })?;

    let segments: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let (anchor, vcpu) = match segments.as_slice() {
        [] => {
            return Ok(Labels {
                domain: GLOBAL_DOMAIN.to_string(),
                vcpu: None,
            });
        }
        [anchor] => (anchor, None),
        [anchor, vcpu] => (anchor, Some(vcpu.clone())),
        _ => {
            return Err(ResolveError::DepthExceeded {
                dir: parent.to_path_buf(),
            });
        }
    };

    let domain = index
        .lookup(anchor)
        .ok_or_else(|| ResolveError::UnknownAnchor {
            anchor: anchor.clone(),
        })?;

    Ok(Labels {
        domain: domain.to_string(),
        vcpu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::kvm_stat::vm_map::VmMap;

    const ROOT: &str = "/sys/kernel/debug/kvm";

    fn index() -> DomainIndex {
        let map: VmMap = serde_yaml::from_str(
            "vm_infos:\n  vm1:\n    pid: \"1234\"\n    kvm_debug_dir: \"1234\"\n",
        )
        .unwrap();
        DomainIndex::from_vm_map(&map).unwrap()
    }

    #[test]
    fn test_resolve_root_is_global() {
        let labels = resolve(&index(), Path::new(ROOT), Path::new(ROOT)).unwrap();
        assert_eq!(labels.domain, "global");
        assert_eq!(labels.vcpu, None);

        // Root resolution does not consult the index at all.
        let labels = resolve(&DomainIndex::default(), Path::new(ROOT), Path::new(ROOT)).unwrap();
        assert_eq!(labels.domain, "global");
    }

    #[test]
    fn test_resolve_vm_dir() {
        let parent = Path::new(ROOT).join("1234");
        let labels = resolve(&index(), &parent, Path::new(ROOT)).unwrap();
        assert_eq!(labels.domain, "vm1");
        assert_eq!(labels.vcpu, None);
    }

    #[test]
    fn test_resolve_vcpu_dir() {
        let parent = Path::new(ROOT).join("1234").join("cpu3");
        let labels = resolve(&index(), &parent, Path::new(ROOT)).unwrap();
        assert_eq!(labels.domain, "vm1");
        assert_eq!(labels.vcpu.as_deref(), Some("cpu3"));
    }

    #[test]
    fn test_resolve_unknown_anchor() {
        let parent = Path::new(ROOT).join("9999");
        let err = resolve(&index(), &parent, Path::new(ROOT)).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownAnchor {
                anchor: "9999".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_outside_root() {
        let err = resolve(&index(), Path::new("/sys/kernel/debug"), Path::new(ROOT)).unwrap_err();
        assert!(matches!(err, ResolveError::OutsideRoot { .. }));

        let err = resolve(&index(), Path::new("/var/log"), Path::new(ROOT)).unwrap_err();
        assert!(matches!(err, ResolveError::OutsideRoot { .. }));
    }

    #[test]
    fn test_resolve_depth_exceeded() {
        let parent = Path::new(ROOT).join("1234").join("cpu0").join("deep");
        let err = resolve(&index(), &parent, Path::new(ROOT)).unwrap_err();
        assert!(matches!(err, ResolveError::DepthExceeded { .. }));
    }
}
