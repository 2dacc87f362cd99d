use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Retrieval workers used when neither the config nor the command line
/// says otherwise.
pub const DEFAULT_JOBS: usize = 4;

/// Exclusive lock on the artifact store, held for a whole install run.
///
/// The holder writes `pid <n>` into the lock file, so a run that has to wait
/// can say what it is waiting for.
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Take the lock, blocking while another run holds it.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        if let Some(lock) = Self::try_acquire(lock_path)? {
            return Ok(lock);
        }
        let holder = Self::holder(lock_path).unwrap_or_else(|| "another run".to_owned());
        info!("artifact store is in use by {holder}, waiting");
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()?;
        Self::claim(file)
    }

    /// `None` when another run holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Self::claim(file).map(Some),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The holder recorded in the lock file, if any run holds it.
    pub fn holder(lock_path: &Path) -> Option<String> {
        let content = std::fs::read_to_string(lock_path).ok()?;
        let holder = content.trim();
        (!holder.is_empty()).then(|| holder.to_owned())
    }

    fn claim(mut file: File) -> Result<Self, CoreError> {
        file.set_len(0)?;
        write!(file, "pid {}", std::process::id())?;
        file.sync_all()?;
        Ok(Self { file })
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

/// Shared cancellation flag for one run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this token until the guard is dropped. `run` names
    /// the work being cancelled in the message printed on interrupt.
    pub fn watch_interrupts(&self, run: impl Into<String>) -> InterruptGuard<'static> {
        INTERRUPTS.watch(self, run)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// The watched run was cancelled and is winding down.
    Cancelled,
    /// Nothing left to cancel gracefully; the process should exit.
    Exit,
}

struct Watched {
    id: u64,
    token: CancelToken,
    run: String,
}

/// Routes interrupts to whichever run is currently being watched.
pub struct Interrupts {
    current: Mutex<Option<Watched>>,
    next_id: AtomicU64,
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupts {
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn watch(&self, token: &CancelToken, run: impl Into<String>) -> InterruptGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut current) = self.current.lock() {
            *current = Some(Watched {
                id,
                token: token.clone(),
                run: run.into(),
            });
        }
        InterruptGuard { routes: self, id }
    }

    /// The first interrupt cancels the watched run. Another one while that
    /// run is still winding down, or one with nothing watched, means exit.
    pub fn interrupt(&self) -> InterruptAction {
        let Ok(current) = self.current.lock() else {
            return InterruptAction::Exit;
        };
        match current.as_ref() {
            Some(watched) if !watched.token.is_cancelled() => {
                watched.token.cancel();
                eprintln!(
                    "\ninterrupted: cancelling {}, waiting for in-flight downloads...",
                    watched.run
                );
                InterruptAction::Cancelled
            }
            _ => InterruptAction::Exit,
        }
    }
}

/// Stops routing interrupts to a token when dropped.
pub struct InterruptGuard<'a> {
    routes: &'a Interrupts,
    id: u64,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut current) = self.routes.current.lock() {
            if current.as_ref().is_some_and(|w| w.id == self.id) {
                *current = None;
            }
        }
    }
}

static INTERRUPTS: Interrupts = Interrupts::new();

/// Send Ctrl-C to the run registered with [`CancelToken::watch_interrupts`].
pub fn install_signal_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTS.interrupt() == InterruptAction::Exit {
            std::process::exit(1);
        }
    });
    if let Err(e) = result {
        warn!("interrupt handler not installed: {e}");
    }
}

/// Run `work` over `items` on at most `jobs` scoped threads.
///
/// The first failure cancels `cancel`; items not yet started are then
/// skipped. Results come back in input order. On failure the error of the
/// earliest failing item is returned, so the outcome does not depend on
/// thread scheduling. If the token was cancelled from outside and nothing
/// failed, the result is `Cancelled`.
pub fn run_bounded<T, R, F>(
    items: &[T],
    jobs: usize,
    cancel: &CancelToken,
    work: F,
) -> Result<Vec<R>, CoreError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R, CoreError> + Sync,
{
    let workers = jobs.max(1).min(items.len());
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Result<R, CoreError>>>> =
        Mutex::new((0..items.len()).map(|_| None).collect());
    debug!("running {} tasks on {workers} workers", items.len());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if cancel.is_cancelled() {
                    break;
                }
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(item) = items.get(idx) else {
                    break;
                };
                let result = work(item);
                if result.is_err() {
                    cancel.cancel();
                }
                if let Ok(mut slots) = slots.lock() {
                    slots[idx] = Some(result);
                }
            });
        }
    });

    let slots = slots.into_inner().map_err(|_| CoreError::Cancelled)?;
    let mut out = Vec::with_capacity(slots.len());
    let mut skipped = false;
    for slot in slots {
        match slot {
            Some(Ok(r)) => out.push(r),
            Some(Err(e)) => return Err(e),
            None => skipped = true,
        }
    }
    if skipped {
        return Err(CoreError::Cancelled);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_records_its_holder() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("store").join(".lock");

        let _lock = StoreLock::acquire(&lock_path).unwrap();
        assert_eq!(
            StoreLock::holder(&lock_path),
            Some(format!("pid {}", std::process::id()))
        );
    }

    #[test]
    fn contended_lock_is_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");

        let _lock = StoreLock::acquire(&lock_path).unwrap();
        assert!(StoreLock::try_acquire(&lock_path).unwrap().is_none());
    }

    #[test]
    fn releasing_clears_the_holder() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");

        drop(StoreLock::acquire(&lock_path).unwrap());
        assert_eq!(StoreLock::holder(&lock_path), None);
        assert!(StoreLock::try_acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn interrupt_cancels_the_watched_run_then_exits() {
        let routes = Interrupts::new();
        let token = CancelToken::new();
        let _guard = routes.watch(&token, "install of 3 packages for 'linux'");

        assert_eq!(routes.interrupt(), InterruptAction::Cancelled);
        assert!(token.is_cancelled());
        assert_eq!(routes.interrupt(), InterruptAction::Exit);
    }

    #[test]
    fn interrupt_with_nothing_watched_exits() {
        let routes = Interrupts::new();
        assert_eq!(routes.interrupt(), InterruptAction::Exit);

        let token = CancelToken::new();
        drop(routes.watch(&token, "install"));
        assert_eq!(routes.interrupt(), InterruptAction::Exit);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn stale_guard_does_not_unregister_a_newer_run() {
        let routes = Interrupts::new();
        let first = CancelToken::new();
        let second = CancelToken::new();
        let old = routes.watch(&first, "first install");
        let _new = routes.watch(&second, "second install");
        drop(old);

        assert_eq!(routes.interrupt(), InterruptAction::Cancelled);
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
    }

    #[test]
    fn results_keep_input_order() {
        let items: Vec<u32> = (0..50).collect();
        let out = run_bounded(&items, 4, &CancelToken::new(), |n| Ok(n * 2)).unwrap();
        assert_eq!(out, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn never_exceeds_job_limit() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..32).collect();
        run_bounded(&items, 3, &CancelToken::new(), |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn first_failure_cancels_remaining_work() {
        let started = AtomicUsize::new(0);
        let items: Vec<u32> = (0..100).collect();
        let token = CancelToken::new();
        let result = run_bounded(&items, 1, &token, |n| {
            started.fetch_add(1, Ordering::SeqCst);
            if *n == 3 {
                Err(CoreError::MissingSelection(format!("item {n}")))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(CoreError::MissingSelection(ref m)) if m == "item 3"));
        assert!(token.is_cancelled());
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn external_cancel_skips_everything() {
        let token = CancelToken::new();
        token.cancel();
        let items = [1, 2, 3];
        let result = run_bounded(&items, 2, &token, |_| Ok(()));
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }

    #[test]
    fn empty_input_is_ok() {
        let items: [u8; 0] = [];
        let out = run_bounded(&items, 4, &CancelToken::new(), |_| Ok(())).unwrap();
        assert!(out.is_empty());
    }
}
