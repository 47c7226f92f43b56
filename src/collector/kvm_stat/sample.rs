//! Conversion of counter file contents into named gauge samples.

use std::fmt;
use std::path::{Path, PathBuf};

use super::labels::Labels;

/// Namespace prefix for every emitted metric.
pub const NAMESPACE: &str = "kvm_stat";

/// One gauge sample produced from a counter file.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Full metric name, `kvm_stat_<metric>_count`.
    pub name: String,
    /// Help string referencing the scrape root.
    pub help: String,
    /// Counter value, emitted as a float gauge.
    pub value: f64,
    /// Domain and optional vcpu labels.
    pub labels: Labels,
}

/// Error parsing a counter file's content as an integer.
#[derive(Debug)]
pub struct ValueError {
    pub path: PathBuf,
    pub raw: String,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "counter {} holds non-numeric content {:?}",
            self.path.display(),
            self.raw
        )
    }
}

impl std::error::Error for ValueError {}

/// Builds a sample from a counter file's raw content.
///
/// Content that is empty after stripping a single trailing newline yields
/// `Ok(None)`: debug counters can be legitimately blank. Per-vcpu metrics
/// get a `vcpu_` name prefix with hyphens replaced by underscores, since
/// hyphens are invalid in metric names.
pub fn build_sample(
    path: &Path,
    raw: &str,
    labels: Labels,
    root: &Path,
) -> Result<Option<Sample>, ValueError> {
    let trimmed = raw.strip_suffix('\n').unwrap_or(raw);
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: i64 = trimmed.parse().map_err(|_| ValueError {
        path: path.to_path_buf(),
        raw: trimmed.to_string(),
    })?;

    let base = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metric = if labels.vcpu.is_some() {
        format!("vcpu_{}", base.replace('-', "_"))
    } else {
        base
    };

    Ok(Some(Sample {
        name: format!("{}_{}_count", NAMESPACE, metric),
        help: format!("{} count from {}", metric, root.display()),
        value: value as f64,
        labels,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/sys/kernel/debug/kvm";

    fn domain_labels(domain: &str) -> Labels {
        Labels {
            domain: domain.to_string(),
            vcpu: None,
        }
    }

    fn vcpu_labels(domain: &str, vcpu: &str) -> Labels {
        Labels {
            domain: domain.to_string(),
            vcpu: Some(vcpu.to_string()),
        }
    }

    #[test]
    fn test_build_sample_vm_counter() {
        let path = Path::new(ROOT).join("1234").join("exits");
        let sample = build_sample(&path, "42\n", domain_labels("vm1"), Path::new(ROOT))
            .unwrap()
            .unwrap();

        assert_eq!(sample.name, "kvm_stat_exits_count");
        assert_eq!(sample.help, format!("exits count from {}", ROOT));
        assert_eq!(sample.value, 42.0);
        assert_eq!(sample.labels.domain, "vm1");
        assert_eq!(sample.labels.vcpu, None);
    }

    #[test]
    fn test_build_sample_vcpu_counter_renames_hyphens() {
        let path = Path::new(ROOT).join("1234").join("cpu0").join("halt-count");
        let sample = build_sample(&path, "7", vcpu_labels("vm1", "cpu0"), Path::new(ROOT))
            .unwrap()
            .unwrap();

        assert_eq!(sample.name, "kvm_stat_vcpu_halt_count_count");
        assert_eq!(sample.help, format!("vcpu_halt_count count from {}", ROOT));
        assert_eq!(sample.value, 7.0);
        assert_eq!(sample.labels.vcpu.as_deref(), Some("cpu0"));
    }

    #[test]
    fn test_build_sample_empty_content_is_skipped() {
        let path = Path::new(ROOT).join("exits");

        let result = build_sample(&path, "", domain_labels("global"), Path::new(ROOT)).unwrap();
        assert!(result.is_none());

        let result = build_sample(&path, "\n", domain_labels("global"), Path::new(ROOT)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_build_sample_non_numeric_fails() {
        let path = Path::new(ROOT).join("exits");
        let err =
            build_sample(&path, "forty-two\n", domain_labels("global"), Path::new(ROOT))
                .unwrap_err();
        assert_eq!(err.raw, "forty-two");
        assert_eq!(err.path, path);
    }

    #[test]
    fn test_build_sample_negative_and_large_values() {
        let path = Path::new(ROOT).join("exits");

        let sample = build_sample(&path, "-3", domain_labels("global"), Path::new(ROOT))
            .unwrap()
            .unwrap();
        assert_eq!(sample.value, -3.0);

        let sample = build_sample(&path, "4294967296\n", domain_labels("global"), Path::new(ROOT))
            .unwrap()
            .unwrap();
        assert_eq!(sample.value, 4_294_967_296.0);
    }
}
