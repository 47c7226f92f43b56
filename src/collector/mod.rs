//! KVM debug statistics collector for Linux.
//!
//! This module provides infrastructure for scraping VM counters from the
//! kernel's KVM debug filesystem, with support for mocking for testing
//! off-Linux or in CI.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    KvmStatCollector                       │
//! │  ┌──────────────┐  ┌───────────────┐  ┌───────────────┐   │
//! │  │  TreeWalker  │  │ LabelResolver │  │ DomainIndex   │   │
//! │  │  (bounded    │→ │ (dir path →   │← │ (anchor→name, │   │
//! │  │   DFS)       │  │  domain/vcpu) │  │  hot-swapped) │   │
//! │  └──────┬───────┘  └───────────────┘  └───────▲───────┘   │
//! │         │                                     │ reload    │
//! │  ┌──────▼──────┐                              │           │
//! │  │  FileSystem │ (trait)              mapping file watch  │
//! │  └──────┬──────┘                                          │
//! └─────────┼─────────────────────────────────────────────────┘
//!           │
//!    ┌──────┴──────┐
//!    │             │
//! ┌──▼───────┐ ┌───▼──────┐
//! │  RealFs  │ │  MockFs  │
//! │ (Linux)  │ │ (tests)  │
//! └──────────┘ └──────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use kvmstat::collector::{KvmStatCollector, MockFs};
//!
//! let mut fs = MockFs::new();
//! fs.add_file("/etc/vm.yaml", "vm_infos:\n  vm1:\n    pid: \"1234\"\n    kvm_debug_dir: \"1234\"\n");
//! fs.add_counter("/sys/kernel/debug/kvm", &["1234"], "exits", "42\n");
//!
//! let collector =
//!     KvmStatCollector::new(fs, "/sys/kernel/debug/kvm", "/etc/vm.yaml", 2).unwrap();
//!
//! let mut samples = Vec::new();
//! collector.update(|s| samples.push(s)).unwrap();
//! assert_eq!(samples[0].name, "kvm_stat_exits_count");
//! ```

pub mod kvm_stat;
pub mod mock;
pub mod traits;

pub use kvm_stat::{KvmStatCollector, Labels, Sample, ScrapeSummary};
pub use mock::MockFs;
pub use traits::{FileSystem, RealFs};
