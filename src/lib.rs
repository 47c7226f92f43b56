//! kvmstat - KVM debug statistics collection library.
//!
//! This library provides the core functionality behind:
//! - `kvmstatd` - exporter daemon scraping `/sys/kernel/debug/kvm`

pub mod collector;
