//! The KVM debug-stat collector: scrape surface plus mapping hot-reload.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{EventKind, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use super::labels::{self, ResolveError};
use super::sample::{self, Sample, ValueError};
use super::vm_map::{self, ConfigError, DomainIndex};
use super::walker::{self, WalkError};
use crate::collector::traits::FileSystem;

/// How often the watch loop rechecks the shutdown flag while waiting for
/// filesystem events.
const WATCH_POLL: Duration = Duration::from_millis(200);

/// Error constructing a collector.
#[derive(Debug)]
pub enum InitError {
    /// The debug tree is not mounted, or the process lacks the privilege
    /// to list it.
    DebugDir { path: PathBuf, source: io::Error },
    /// The mapping file failed to load or index.
    Config(ConfigError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::DebugDir { path, source } => write!(
                f,
                "kvm debug dir {} not mounted or not readable: {}",
                path.display(),
                source
            ),
            InitError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::DebugDir { source, .. } => Some(source),
            InitError::Config(e) => Some(e),
        }
    }
}

impl From<ConfigError> for InitError {
    fn from(e: ConfigError) -> Self {
        InitError::Config(e)
    }
}

/// Error from the watch loop itself (reload failures are logged, not
/// returned: the previous index stays active).
#[derive(Debug)]
pub enum WatchError {
    Notify(notify::Error),
    /// The watcher backend dropped its event channel.
    ChannelClosed,
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Notify(e) => write!(f, "vm map watch failed: {}", e),
            WatchError::ChannelClosed => write!(f, "vm map watch channel closed"),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Notify(e) => Some(e),
            WatchError::ChannelClosed => None,
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::Notify(e)
    }
}

/// Why a single counter file produced no sample.
#[derive(Debug)]
enum FileError {
    Read(io::Error),
    Resolve(ResolveError),
    Value(ValueError),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::Read(e) => write!(f, "read failed: {}", e),
            FileError::Resolve(e) => write!(f, "{}", e),
            FileError::Value(e) => write!(f, "{}", e),
        }
    }
}

/// Counts from one scrape pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Samples emitted.
    pub samples: usize,
    /// Files with blank content, skipped silently.
    pub empty: usize,
    /// Files skipped because of a read, resolution or parse failure.
    pub skipped: usize,
}

/// Collector for KVM debug statistics.
///
/// One scrape (`update`) walks the debug tree and emits a gauge sample per
/// readable counter file, labeled through the currently published
/// [`DomainIndex`]. A background `watch` loop republishes the index when
/// the mapping file changes; scrapes and reloads never block each other.
pub struct KvmStatCollector<F: FileSystem> {
    fs: F,
    debug_dir: PathBuf,
    vm_map_path: PathBuf,
    max_depth: usize,
    index: ArcSwap<DomainIndex>,
}

impl<F: FileSystem> KvmStatCollector<F> {
    /// Creates a collector, verifying the debug tree is listable and the
    /// mapping file loads.
    pub fn new(
        fs: F,
        debug_dir: impl Into<PathBuf>,
        vm_map_path: impl Into<PathBuf>,
        max_depth: usize,
    ) -> Result<Self, InitError> {
        let debug_dir = debug_dir.into();
        let vm_map_path = vm_map_path.into();

        fs.read_dir(&debug_dir)
            .map_err(|source| InitError::DebugDir {
                path: debug_dir.clone(),
                source,
            })?;

        let map = vm_map::load_vm_map(&fs, &vm_map_path)?;
        let index = DomainIndex::from_vm_map(&map)?;
        debug!(
            "kvm debug path: {}, {} configured vms",
            debug_dir.display(),
            index.len()
        );

        Ok(Self {
            fs,
            debug_dir,
            vm_map_path,
            max_depth,
            index: ArcSwap::from_pointee(index),
        })
    }

    /// Runs one scrape, invoking `emit` for every sample.
    ///
    /// The index snapshot is taken once at the start, so a reload landing
    /// mid-scrape never mixes old and new labels within the pass. Files
    /// that cannot be read, resolved or parsed are skipped with a warning;
    /// a directory that cannot be listed aborts the scrape.
    pub fn update<E>(&self, mut emit: E) -> Result<ScrapeSummary, WalkError>
    where
        E: FnMut(Sample),
    {
        let index = self.index.load_full();
        let mut summary = ScrapeSummary::default();

        walker::walk(&self.fs, &self.debug_dir, self.max_depth, &mut |path| {
            match self.scrape_file(&index, path) {
                Ok(Some(s)) => {
                    summary.samples += 1;
                    emit(s);
                }
                Ok(None) => summary.empty += 1,
                Err(e) => {
                    summary.skipped += 1;
                    warn!("skipping {}: {}", path.display(), e);
                }
            }
        })?;

        Ok(summary)
    }

    fn scrape_file(&self, index: &DomainIndex, path: &Path) -> Result<Option<Sample>, FileError> {
        let raw = self.fs.read_to_string(path).map_err(FileError::Read)?;

        let parent = path.parent().ok_or_else(|| {
            FileError::Resolve(ResolveError::OutsideRoot {
                dir: path.to_path_buf(),
            })
        })?;
        let labels =
            labels::resolve(index, parent, &self.debug_dir).map_err(FileError::Resolve)?;

        sample::build_sample(path, &raw, labels, &self.debug_dir).map_err(FileError::Value)
    }

    /// Reloads the mapping file and atomically publishes the new index.
    ///
    /// On failure the previously published index remains active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let map = vm_map::load_vm_map(&self.fs, &self.vm_map_path)?;
        let index = DomainIndex::from_vm_map(&map)?;
        info!("vm map reloaded: {} configured vms", index.len());
        self.index.store(Arc::new(index));
        Ok(())
    }

    /// Watches the mapping file and reloads on modification, until the
    /// shutdown flag is set.
    ///
    /// The watch is registered on the mapping file's parent directory and
    /// events are filtered by file name, so editors that replace the file
    /// by rename still trigger a reload. The watch handle is released on
    /// every exit path.
    pub fn watch(&self, shutdown: &AtomicBool) -> Result<(), WatchError> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;

        let watch_dir = self
            .vm_map_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
        debug!("watching vm map: {}", self.vm_map_path.display());

        while !shutdown.load(Ordering::SeqCst) {
            let event = match rx.recv_timeout(WATCH_POLL) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    warn!("vm map watch error: {}", e);
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(WatchError::ChannelClosed),
            };

            if !self.is_map_event(&event) {
                continue;
            }

            info!("vm map modified, reloading");
            if let Err(e) = self.reload() {
                error!("vm map reload failed, keeping previous mapping: {}", e);
            }
        }

        Ok(())
    }

    fn is_map_event(&self, event: &notify::Event) -> bool {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return false;
        }
        let Some(map_name) = self.vm_map_path.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(map_name))
    }
}
