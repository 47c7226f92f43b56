//! KVM debug statistics collection.
//!
//! Scrapes the kernel's KVM debug filesystem (counter files grouped by VM
//! process id and vcpu), resolves each file to domain/vcpu labels through a
//! hot-reloadable mapping, and emits gauge samples.

mod collector;
mod labels;
mod sample;
mod vm_map;
mod walker;

pub use collector::{InitError, KvmStatCollector, ScrapeSummary, WatchError};
pub use labels::{Labels, ResolveError};
pub use sample::{Sample, ValueError};
pub use vm_map::{ConfigError, DomainIndex, VmInfo, VmMap, load_vm_map};
pub use walker::WalkError;
