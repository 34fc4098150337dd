//! Worker Sync Loop: one dedicated background thread that, once per tick,
//! re-resolves every tracked worker, captures its buffer, updates status and
//! notifies the UI, without ever holding the worker lock across a slow
//! accessibility call.
//!
//! Lock discipline: copy the worker list out, release, do the slow work on
//! the copies, then take the lock again only to commit results. Workers are
//! processed sequentially within a tick; the accessibility client is not
//! safely reentrant across threads, and a slow worker delaying its siblings
//! is the accepted cost.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::config::Settings;
use crate::desktop::{Desktop, ElementId, WindowHandle};
use crate::workers::capture::{CaptureEngine, CaptureRequest};
use crate::workers::injector::CommandInjector;
use crate::workers::registry::WindowRegistry;
use crate::workers::{resolver, Activity, Worker, WorkerStatus};

/// Observer callbacks injected at construction. `on_update` is batched: at
/// most one call per tick, regardless of how many workers changed.
/// `on_buffer` is incremental, fired per identity whose content changed.
pub struct SyncHooks {
    pub on_update: Box<dyn Fn() + Send + Sync>,
    pub on_buffer: Box<dyn Fn(WindowHandle, &ElementId, &str) + Send + Sync>,
}

impl SyncHooks {
    pub fn noop() -> Self {
        Self {
            on_update: Box::new(|| {}),
            on_buffer: Box::new(|_, _, _| {}),
        }
    }
}

/// Per-thread tick engine. Separate from the loop so tests drive ticks
/// directly against a fake desktop.
pub struct SyncEngine<D: Desktop> {
    desktop: Arc<D>,
    registry: WindowRegistry<D>,
    capture: CaptureEngine<D>,
}

impl<D: Desktop> SyncEngine<D> {
    pub fn new(desktop: Arc<D>, settings: &Settings) -> Self {
        let registry = WindowRegistry::new(Arc::clone(&desktop), settings.capture.clone());
        let injector = CommandInjector::new(
            Arc::clone(&desktop),
            Duration::from_millis(settings.sync.settle_ms),
        );
        let capture = CaptureEngine::new(
            Arc::clone(&desktop),
            settings.capture.clone(),
            Duration::from_secs(settings.sync.switch_cooldown_secs),
            injector,
        );
        Self {
            desktop,
            registry,
            capture,
        }
    }

    pub fn tick(&mut self, workers: &Mutex<Vec<Worker>>, hooks: &SyncHooks) {
        let mut current: Vec<Worker> = workers.lock().unwrap().clone();
        if current.is_empty() {
            return;
        }

        // One registry snapshot per tick, shared by every worker: discovery
        // is the most expensive call in the loop.
        let snapshot = match self.registry.list_windows() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!("window enumeration failed this tick: {err}");
                Vec::new()
            }
        };

        // Claims are scoped to this pass so identifiers freed by a stale
        // resolution can be reclaimed.
        let mut claimed = HashSet::new();
        let mut needs_refresh = false;
        let mut changed_buffers: Vec<(WindowHandle, ElementId, String)> = Vec::new();

        for worker in &mut current {
            worker.elapsed = Worker::format_elapsed(worker.start_time.elapsed());

            if resolver::resolve(&*self.desktop, worker, &snapshot, &mut claimed) {
                needs_refresh = true;
            }

            let status = match worker.identity() {
                Some((handle, element_id)) => {
                    let request = CaptureRequest {
                        handle,
                        title: &worker.display_title,
                        element_id: &element_id,
                        log_path: worker.log_path.as_deref(),
                        last_switch: worker.last_switch,
                    };
                    let outcome = self.capture.capture(&request);

                    if outcome.switched {
                        worker.last_switch = Some(Instant::now());
                    }
                    worker.cached = outcome.hit();
                    if outcome.hit() {
                        worker.hits += 1;
                    } else {
                        worker.walks += 1;
                    }
                    if let Some(log_path) = outcome.promoted {
                        worker.log_path = Some(log_path);
                    }

                    if let Some(text) = outcome.text {
                        if worker.last_buffer.as_deref() != Some(text.as_str()) {
                            worker.activity = Activity::infer(&text);
                            changed_buffers.push((handle, element_id.clone(), text.clone()));
                            worker.last_buffer = Some(text);
                            needs_refresh = true;
                        }
                    }
                    // An empty capture is routine for background tabs; only a
                    // dead window downgrades the worker.
                    if self.desktop.is_window(handle) {
                        WorkerStatus::Online
                    } else {
                        WorkerStatus::Offline
                    }
                }
                None => WorkerStatus::Offline,
            };

            if worker.status != status {
                worker.status = status;
                needs_refresh = true;
            }
        }

        // Commit: overwrite by identity, never by position. Workers removed
        // while we were off the lock stay removed; ones added mid-tick are
        // picked up next tick.
        {
            let mut live = workers.lock().unwrap();
            for processed in current {
                if let Some(slot) = live.iter_mut().find(|w| w.serial == processed.serial) {
                    *slot = processed;
                }
            }
        }

        for (handle, element_id, text) in &changed_buffers {
            (hooks.on_buffer)(*handle, element_id, text);
        }
        if needs_refresh {
            (hooks.on_update)();
        }
    }
}

/// Handle to the running loop. Owns the shared worker list; the UI mutates
/// the tracked set through this and only this.
pub struct SyncLoop {
    workers: Arc<Mutex<Vec<Worker>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyncLoop {
    /// Spawn the sync thread. The accessibility session is initialized once
    /// on that thread before the first tick; if that fails the loop does not
    /// start and the error is returned here, loudly, instead of being
    /// swallowed into the background.
    pub fn start<D: Desktop + 'static>(
        desktop: Arc<D>,
        settings: Settings,
        hooks: SyncHooks,
    ) -> Result<Self> {
        let workers = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (init_tx, init_rx) = mpsc::channel();

        let thread_workers = Arc::clone(&workers);
        let thread_running = Arc::clone(&running);
        let interval = Duration::from_millis(settings.sync.interval_ms);

        let thread = std::thread::Builder::new()
            .name("worker-sync".to_string())
            .spawn(move || {
                if let Err(err) = desktop.init_thread() {
                    let _ = init_tx.send(Err(err));
                    return;
                }
                let _ = init_tx.send(Ok(()));

                let mut engine = SyncEngine::new(desktop, &settings);
                while thread_running.load(Ordering::SeqCst) {
                    engine.tick(&thread_workers, &hooks);
                    std::thread::sleep(interval);
                }
                tracing::info!("worker sync loop stopped");
            })
            .context("failed to spawn worker sync thread")?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                running.store(false, Ordering::SeqCst);
                let _ = thread.join();
                bail!("accessibility init failed on the sync thread: {err}");
            }
            Err(_) => {
                bail!("worker sync thread died during startup");
            }
        }

        Ok(Self {
            workers,
            running,
            thread: Some(thread),
        })
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.workers.lock().unwrap().clone()
    }

    pub fn add_worker(&self, worker: Worker) {
        tracing::info!(title = %worker.display_title, role = %worker.role, "tracking worker");
        self.workers.lock().unwrap().push(worker);
    }

    pub fn remove_worker(&self, serial: u64) -> Option<Worker> {
        let mut workers = self.workers.lock().unwrap();
        let index = workers.iter().position(|w| w.serial == serial)?;
        let removed = workers.remove(index);
        tracing::info!(title = %removed.display_title, "worker removed");
        Some(removed)
    }

    /// Signal the loop to stop and wait for it. The in-flight tick always
    /// finishes first; there is no mid-tick preemption.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SyncLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
