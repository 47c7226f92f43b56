//! kvmstatd - KVM debug statistics exporter daemon.
//!
//! Scrapes VM counters from the KVM debug filesystem on an interval and
//! renders them in Prometheus text exposition format, to stdout or to a
//! textfile. A background watcher hot-reloads the VM mapping file.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use kvmstat::collector::{KvmStatCollector, RealFs, Sample};

/// KVM debug statistics exporter daemon.
#[derive(Parser)]
#[command(name = "kvmstatd", about = "KVM debug statistics exporter daemon", version)]
struct Args {
    /// Scrape interval in seconds.
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// KVM debug statistics directory.
    #[arg(long, default_value = "/sys/kernel/debug/kvm")]
    kvm_debug_dir: PathBuf,

    /// Path to the VM mapping YAML file.
    #[arg(long, default_value = "/etc/vm.yaml")]
    vm_map: PathBuf,

    /// Maximum directory depth below the debug root.
    #[arg(long, default_value = "2")]
    depth: usize,

    /// Write metrics to this file (replaced atomically) instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("kvmstatd={}", level).parse().unwrap())
        .add_directive(format!("kvmstat={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Renders samples into Prometheus text exposition format.
///
/// Samples are grouped into one gauge family per metric name; per-vcpu
/// families carry the extra `vcpu` label.
fn render(samples: &[Sample]) -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    let mut families: HashMap<String, GaugeVec> = HashMap::new();

    for sample in samples {
        let gauge = match families.get(&sample.name) {
            Some(gauge) => gauge.clone(),
            None => {
                let label_names: &[&str] = if sample.labels.vcpu.is_some() {
                    &["domain", "vcpu"]
                } else {
                    &["domain"]
                };
                let gauge = GaugeVec::new(
                    Opts::new(sample.name.clone(), sample.help.clone()),
                    label_names,
                )?;
                registry.register(Box::new(gauge.clone()))?;
                families.insert(sample.name.clone(), gauge.clone());
                gauge
            }
        };

        let mut values = vec![sample.labels.domain.as_str()];
        if let Some(vcpu) = &sample.labels.vcpu {
            values.push(vcpu.as_str());
        }
        match gauge.get_metric_with_label_values(&values) {
            Ok(metric) => metric.set(sample.value),
            Err(e) => warn!("dropping sample {}: {}", sample.name, e),
        }
    }

    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    Ok(String::from_utf8(buf).unwrap_or_default())
}

/// Writes the rendered metrics next to `path`, then renames into place.
fn write_textfile(path: &Path, text: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)
}

/// Sleeps for the scrape interval in small steps so shutdown stays prompt.
fn sleep_interval(shutdown: &AtomicBool, interval: Duration) {
    let step = Duration::from_millis(250);
    let mut remaining = interval;
    while !shutdown.load(Ordering::SeqCst) && !remaining.is_zero() {
        let chunk = remaining.min(step);
        thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("kvmstatd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, kvm_debug_dir={}, vm_map={}, depth={}",
        args.interval,
        args.kvm_debug_dir.display(),
        args.vm_map.display(),
        args.depth
    );

    let collector = match KvmStatCollector::new(
        RealFs::new(),
        &args.kvm_debug_dir,
        &args.vm_map,
        args.depth,
    ) {
        Ok(collector) => Arc::new(collector),
        Err(e) => {
            error!("Failed to initialize collector: {}", e);
            std::process::exit(1);
        }
    };

    // Setup graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let s = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        s.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    // Hot-reload watcher for the VM mapping file
    let watcher = {
        let collector = Arc::clone(&collector);
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            if let Err(e) = collector.watch(&shutdown) {
                error!("VM map watcher stopped: {}", e);
            }
        })
    };

    info!("Starting scrape loop");

    let interval = Duration::from_secs(args.interval);
    let mut scrape_count: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        let mut samples = Vec::new();
        match collector.update(|sample| samples.push(sample)) {
            Ok(summary) => {
                scrape_count += 1;
                info!(
                    "Scrape #{}: {} samples, {} empty, {} skipped",
                    scrape_count, summary.samples, summary.empty, summary.skipped
                );

                match render(&samples) {
                    Ok(text) => match &args.output {
                        Some(path) => {
                            if let Err(e) = write_textfile(path, &text) {
                                error!("Failed to write {}: {}", path.display(), e);
                            }
                        }
                        None => print!("{}", text),
                    },
                    Err(e) => error!("Failed to encode metrics: {}", e),
                }
            }
            Err(e) => error!("Scrape failed: {}", e),
        }

        sleep_interval(&shutdown, interval);
    }

    shutdown.store(true, Ordering::SeqCst);
    if watcher.join().is_err() {
        warn!("VM map watcher panicked");
    }

    info!("kvmstatd stopped");
}
