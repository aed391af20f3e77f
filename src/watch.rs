//! Long-running watch mode.
//!
//! A single worker owns the library. Filesystem events from the source tree,
//! the target tree and the config file's directory are funneled through one
//! channel, coalesced over `watch.batch_window_ms`, and turned into at most
//! one pass of each kind per batch:
//!
//! | Event                                   | Pass                         |
//! |-----------------------------------------|------------------------------|
//! | `.pdf` created or moved into source     | Source, once the size settles |
//! | anything removed under target           | Target                       |
//! | config file written                     | reload config, then Full     |
//!
//! A Full pass covers the other two, so a batch with a config change runs
//! only that.

use crate::config::{Config, load_config};
use crate::extract::NoteExtractor;
use crate::naming::is_source_document;
use crate::pass::{PassKind, run_pass};
use crate::repaginate::PdfBackend;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum StabilityError {
    #[error("{path} still changing after {timeout:?}")]
    NeverStabilized { path: PathBuf, timeout: Duration },
    #[error("cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("cannot install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Longest uninterrupted sleep while polling, so cancellation stays responsive.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Receive timeout while no batch is open.
const IDLE_TICK: Duration = Duration::from_millis(500);

/// Raise `cancel` on Ctrl-C.
pub fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<(), WatchError> {
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        cancel.store(true, Ordering::SeqCst);
    })?;
    Ok(())
}

fn file_size(path: &Path) -> std::io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Sleep for `duration`, waking early when `cancel` is raised.
fn sleep_unless_cancelled(duration: Duration, cancel: &AtomicBool) -> bool {
    let until = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let left = until.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(SLEEP_SLICE));
    }
}

/// How a watched file ended up once polling stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Same size on two consecutive polls.
    Stable(u64),
    /// Gone before it settled.
    Vanished,
}

/// Block until the size of `path` is the same on two consecutive polls.
pub fn wait_until_stable(
    path: &Path,
    interval: Duration,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<Settled, StabilityError> {
    let deadline = Instant::now() + timeout;
    let Some(mut last) = file_size(path)? else {
        return Ok(Settled::Vanished);
    };
    loop {
        if Instant::now() >= deadline {
            return Err(StabilityError::NeverStabilized {
                path: path.to_path_buf(),
                timeout,
            });
        }
        if !sleep_unless_cancelled(interval, cancel) {
            return Err(StabilityError::Cancelled);
        }
        let Some(current) = file_size(path)? else {
            return Ok(Settled::Vanished);
        };
        if current == last {
            debug!(path = %path.display(), size = current, "file is stable");
            return Ok(Settled::Stable(current));
        }
        last = current;
    }
}

// ============================================================================
// Event classification
// ============================================================================

/// The three locations events are matched against. Paths are canonical so
/// they compare equal to what the watcher reports.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchRoots {
    pub source: PathBuf,
    pub target: PathBuf,
    pub config_file: PathBuf,
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl WatchRoots {
    pub fn new(config_file: &Path, config: &Config) -> Self {
        Self {
            source: canonical(config.source_root()),
            target: canonical(config.target_root()),
            config_file: canonical(config_file),
        }
    }

    fn config_dir(&self) -> &Path {
        self.config_file.parent().unwrap_or(Path::new("."))
    }
}

/// Work accumulated over one batch window.
#[derive(Debug, Default, PartialEq)]
pub struct PendingWork {
    /// New source documents to wait on.
    pub sources: BTreeSet<PathBuf>,
    pub target_removed: bool,
    pub config_changed: bool,
}

impl PendingWork {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && !self.target_removed && !self.config_changed
    }
}

/// Paths an event brings into existence.
fn arrived_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) => event.paths.as_slice(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.as_slice(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1..).unwrap_or_default(),
        _ => Default::default(),
    }
}

/// Fold `event` into `work`. Returns whether it mattered.
pub fn classify(event: &Event, roots: &WatchRoots, work: &mut PendingWork) -> bool {
    let mut relevant = false;

    let touches_config = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == &roots.config_file);
    if touches_config {
        work.config_changed = true;
        relevant = true;
    }

    for path in arrived_paths(event) {
        let is_document = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_source_document);
        if is_document && path.starts_with(&roots.source) {
            work.sources.insert(path.clone());
            relevant = true;
        }
    }

    if matches!(event.kind, EventKind::Remove(_))
        && event.paths.iter().any(|p| p.starts_with(&roots.target))
    {
        work.target_removed = true;
        relevant = true;
    }

    relevant
}

// ============================================================================
// Worker
// ============================================================================

/// The watch worker: current config plus the collaborators passes need.
pub struct WatchSession<'a, B: PdfBackend, E: NoteExtractor> {
    pub config_path: PathBuf,
    pub config: Config,
    pub backend: &'a B,
    pub extractor: &'a E,
    pub cancel: Arc<AtomicBool>,
}

impl<B: PdfBackend, E: NoteExtractor> WatchSession<'_, B, E> {
    fn run(&self, kind: PassKind) {
        if let Err(e) = run_pass(&self.config, self.backend, self.extractor, kind) {
            error!(%kind, error = %e, "pass failed");
        }
    }

    /// Wait for every new document to settle. `false` when none did.
    fn settle_sources(&self, sources: &BTreeSet<PathBuf>) -> Result<bool, StabilityError> {
        let interval = Duration::from_millis(self.config.watch.poll_interval_ms);
        let timeout = Duration::from_secs(self.config.watch.stable_timeout_secs);
        let mut any_ready = false;
        for path in sources {
            match wait_until_stable(path, interval, timeout, &self.cancel) {
                Ok(Settled::Vanished) => {
                    debug!(path = %path.display(), "document vanished before processing")
                }
                Ok(Settled::Stable(_)) => any_ready = true,
                Err(StabilityError::Cancelled) => return Err(StabilityError::Cancelled),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unsettled document"),
            }
        }
        Ok(any_ready)
    }

    /// Run the passes a batch calls for. Returns the kinds that ran.
    pub fn handle_batch(&mut self, work: PendingWork) -> Vec<PassKind> {
        let mut ran = Vec::new();

        if work.config_changed {
            match load_config(&self.config_path) {
                Ok(config) => {
                    info!(config = %self.config_path.display(), "config reloaded");
                    self.config = config;
                }
                Err(e) => warn!(error = %e, "keeping previous config"),
            }
            self.run(PassKind::Full);
            ran.push(PassKind::Full);
            return ran;
        }

        if !work.sources.is_empty() {
            match self.settle_sources(&work.sources) {
                Ok(true) => {
                    self.run(PassKind::Source);
                    ran.push(PassKind::Source);
                }
                Ok(false) => {}
                Err(_) => return ran,
            }
        }

        if work.target_removed {
            self.run(PassKind::Target);
            ran.push(PassKind::Target);
        }
        ran
    }

    fn watch_roots(watcher: &mut RecommendedWatcher, roots: &WatchRoots) -> Result<(), WatchError> {
        watcher.watch(&roots.source, RecursiveMode::Recursive)?;
        watcher.watch(&roots.target, RecursiveMode::Recursive)?;
        watcher.watch(roots.config_dir(), RecursiveMode::NonRecursive)?;
        info!(
            source = %roots.source.display(),
            target = %roots.target.display(),
            "watching"
        );
        Ok(())
    }

    fn unwatch_roots(watcher: &mut RecommendedWatcher, roots: &WatchRoots) {
        for path in [roots.source.as_path(), roots.target.as_path(), roots.config_dir()] {
            if let Err(e) = watcher.unwatch(path) {
                debug!(path = %path.display(), error = %e, "unwatch failed");
            }
        }
    }

    /// Process events until `cancel` is raised or the watcher goes away.
    pub fn run_loop(&mut self) -> Result<(), WatchError> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })?;
        let mut roots = WatchRoots::new(&self.config_path, &self.config);
        Self::watch_roots(&mut watcher, &roots)?;

        let mut pending = PendingWork::default();
        let mut batch_started: Option<Instant> = None;

        while !self.cancel.load(Ordering::SeqCst) {
            let batch_window = Duration::from_millis(self.config.watch.batch_window_ms);
            let timeout = batch_started
                .map(|t| batch_window.saturating_sub(t.elapsed()))
                .unwrap_or(IDLE_TICK);

            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    if classify(&event, &roots, &mut pending) {
                        batch_started.get_or_insert_with(Instant::now);
                    }
                }
                Ok(Err(e)) => warn!("Watch error: {}", e),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break;
                }
            }

            if batch_started.is_some_and(|t| t.elapsed() >= batch_window) {
                batch_started = None;
                let work = std::mem::take(&mut pending);
                debug!(?work, "processing batch");
                self.handle_batch(work);

                let current = WatchRoots::new(&self.config_path, &self.config);
                if current != roots {
                    Self::unwatch_roots(&mut watcher, &roots);
                    Self::watch_roots(&mut watcher, &current)?;
                    roots = current;
                }
            }
        }

        info!("watch stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::NoExtractor;
    use crate::repaginate::backend::tests::MockBackend;
    use crate::test_helpers::{TestLibrary, math_layout, write_source};
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::io::Write;

    const FAST: Duration = Duration::from_millis(20);

    // =========================================================================
    // wait_until_stable
    // =========================================================================

    #[test]
    fn settled_file_returns_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.pdf");
        fs::write(&path, b"12345").unwrap();
        let cancel = AtomicBool::new(false);

        assert_eq!(
            wait_until_stable(&path, FAST, Duration::from_secs(5), &cancel).unwrap(),
            Settled::Stable(5)
        );
    }

    #[test]
    fn empty_file_is_stable_not_vanished() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.pdf");
        fs::write(&path, b"").unwrap();
        let cancel = AtomicBool::new(false);

        assert_eq!(
            wait_until_stable(&path, FAST, Duration::from_secs(5), &cancel).unwrap(),
            Settled::Stable(0)
        );
    }

    #[test]
    fn missing_file_counts_as_settled() {
        let cancel = AtomicBool::new(false);
        let settled = wait_until_stable(Path::new("/nonexistent/a.pdf"), FAST, FAST, &cancel);
        assert_eq!(settled.unwrap(), Settled::Vanished);
    }

    #[test]
    fn growing_file_times_out() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.pdf");
        fs::write(&path, b"x").unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let (path, stop) = (path.clone(), Arc::clone(&stop));
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
                    f.write_all(b"more").unwrap();
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let cancel = AtomicBool::new(false);
        let result = wait_until_stable(&path, Duration::from_millis(50), Duration::from_millis(300), &cancel);
        stop.store(true, Ordering::SeqCst);
        writer.join().unwrap();

        assert!(matches!(result, Err(StabilityError::NeverStabilized { .. })));
    }

    #[test]
    fn raised_cancel_flag_stops_waiting() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.pdf");
        fs::write(&path, b"x").unwrap();
        let cancel = AtomicBool::new(true);

        let result = wait_until_stable(&path, Duration::from_secs(10), Duration::from_secs(60), &cancel);
        assert!(matches!(result, Err(StabilityError::Cancelled)));
    }

    // =========================================================================
    // classify
    // =========================================================================

    fn roots() -> WatchRoots {
        WatchRoots {
            source: PathBuf::from("/lib/inbox"),
            target: PathBuf::from("/lib/library"),
            config_file: PathBuf::from("/lib/config.toml"),
        }
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn created_pdf_in_source_is_queued() {
        let mut work = PendingWork::default();
        let e = event(EventKind::Create(CreateKind::File), "/lib/inbox/math/Sets_240115_093000.PDF");

        assert!(classify(&e, &roots(), &mut work));
        assert_eq!(work.sources.len(), 1);
        assert!(!work.target_removed);
    }

    #[test]
    fn renamed_into_source_is_queued() {
        let mut work = PendingWork::default();
        let e = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/lib/inbox/math/.sync-tmp"))
            .add_path(PathBuf::from("/lib/inbox/math/sets.pdf"));

        assert!(classify(&e, &roots(), &mut work));
        assert!(work.sources.contains(Path::new("/lib/inbox/math/sets.pdf")));
    }

    #[test]
    fn non_documents_and_target_creations_are_ignored() {
        let mut work = PendingWork::default();
        let r = roots();
        assert!(!classify(&event(EventKind::Create(CreateKind::File), "/lib/inbox/math/a.txt"), &r, &mut work));
        assert!(!classify(&event(EventKind::Create(CreateKind::File), "/lib/library/math/a.pdf"), &r, &mut work));
        assert!(!classify(&event(EventKind::Remove(RemoveKind::File), "/lib/inbox/math/a.pdf"), &r, &mut work));
        assert!(work.is_empty());
    }

    #[test]
    fn removal_under_target_flags_reconcile() {
        let mut work = PendingWork::default();
        let e = event(EventKind::Remove(RemoveKind::File), "/lib/library/math/a.pdf");
        assert!(classify(&e, &roots(), &mut work));
        assert!(work.target_removed);
    }

    #[test]
    fn config_write_flags_reload() {
        let mut work = PendingWork::default();
        let e = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/lib/config.toml",
        );
        assert!(classify(&e, &roots(), &mut work));
        assert!(work.config_changed);

        let mut other = PendingWork::default();
        let e = event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "/lib/notes.toml");
        assert!(!classify(&e, &roots(), &mut other));
    }

    // =========================================================================
    // handle_batch
    // =========================================================================

    fn session<'a>(lib: &TestLibrary, backend: &'a MockBackend) -> WatchSession<'a, MockBackend, NoExtractor> {
        WatchSession {
            config_path: lib.tmp.path().join("config.toml"),
            config: lib.config.clone(),
            backend,
            extractor: &NoExtractor,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn fast_watch(lib: &mut TestLibrary) {
        lib.config.watch.poll_interval_ms = 10;
        lib.config.watch.stable_timeout_secs = 5;
    }

    #[test]
    fn source_and_removal_run_one_pass_each() {
        let mut lib = TestLibrary::new(math_layout());
        fast_watch(&mut lib);
        let backend = MockBackend::new();
        let mut session = session(&lib, &backend);
        let a = write_source(lib.source(), "math", "A_240115_093000.pdf");
        let b = write_source(lib.source(), "math", "B_240115_093000.pdf");

        let work = PendingWork {
            sources: [a.clone(), b.clone()].into_iter().collect(),
            target_removed: true,
            config_changed: false,
        };
        assert_eq!(session.handle_batch(work), vec![PassKind::Source, PassKind::Target]);
        assert!(!a.exists() && !b.exists());
        assert!(lib.target().join("math/a.pdf").exists());
    }

    #[test]
    fn vanished_sources_skip_the_pass() {
        let mut lib = TestLibrary::new(math_layout());
        fast_watch(&mut lib);
        let backend = MockBackend::new();
        let mut session = session(&lib, &backend);

        let work = PendingWork {
            sources: [lib.source().join("math/gone.pdf")].into_iter().collect(),
            ..PendingWork::default()
        };
        assert!(session.handle_batch(work).is_empty());
    }

    #[test]
    fn empty_source_still_runs_the_pass() {
        let mut lib = TestLibrary::new(math_layout());
        fast_watch(&mut lib);
        let backend = MockBackend::new();
        let mut session = session(&lib, &backend);
        let empty = lib.source().join("math/Empty_240115_093000.pdf");
        fs::create_dir_all(empty.parent().unwrap()).unwrap();
        fs::write(&empty, b"").unwrap();

        let work = PendingWork {
            sources: [empty].into_iter().collect(),
            ..PendingWork::default()
        };
        assert_eq!(session.handle_batch(work), vec![PassKind::Source]);
    }

    #[test]
    fn config_change_reloads_and_runs_full_pass_only() {
        let mut lib = TestLibrary::new(math_layout());
        fast_watch(&mut lib);
        let config_path = lib.tmp.path().join("config.toml");
        fs::write(
            &config_path,
            "[directories]\nsource = \"inbox\"\ntarget = \"library\"\n\n[site]\ntitle = \"Reloaded\"\n\n[[layouts]]\nname = \"History\"\n",
        )
        .unwrap();
        let backend = MockBackend::new();
        let mut session = session(&lib, &backend);

        let work = PendingWork {
            sources: [lib.source().join("math/x.pdf")].into_iter().collect(),
            target_removed: true,
            config_changed: true,
        };
        assert_eq!(session.handle_batch(work), vec![PassKind::Full]);
        assert_eq!(session.config.site.title, "Reloaded");
        assert!(lib.target().join("history").is_dir());
        let index = fs::read_to_string(lib.target().join("index.html")).unwrap();
        assert!(index.contains("Reloaded"));
    }

    #[test]
    fn broken_config_keeps_previous() {
        let mut lib = TestLibrary::new(math_layout());
        fast_watch(&mut lib);
        fs::write(lib.tmp.path().join("config.toml"), "[site]\nbogus = 1\n").unwrap();
        let backend = MockBackend::new();
        let mut session = session(&lib, &backend);

        let work = PendingWork {
            config_changed: true,
            ..PendingWork::default()
        };
        assert_eq!(session.handle_batch(work), vec![PassKind::Full]);
        assert_eq!(session.config.layouts, math_layout());
    }
}
