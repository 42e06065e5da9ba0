// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::banfile::{read_ban_file, BanFileError};

/// Lifecycle of a [`BanRegistry`]. Transitions are monotonic:
/// Created -> Running -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Fallback reload period. Bounds the worst-case staleness of the ban
    /// list when filesystem change notifications are missed or unavailable.
    pub reload_interval: Duration,
    /// Window within which a burst of file-change events collapses into a
    /// single reload. The ban tooling may append the file in several writes.
    pub reload_debounce: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            reload_interval: Duration::from_secs(10),
            reload_debounce: Duration::from_millis(200),
        }
    }
}

struct Lifecycle {
    state: RegistryState,
    shutdown_tx: Option<watch::Sender<bool>>,
    watch_task: Option<JoinHandle<()>>,
}

/// State shared between the registry handle and its background watch loop.
struct Shared {
    ban_file: PathBuf,
    options: RegistryOptions,
    current: ArcSwap<HashSet<String>>,
}

/// Owns the live set of banned address literals and the background loop that
/// keeps it synchronized with the ban file.
///
/// The current set is an immutable snapshot behind an atomic pointer: the
/// watch loop builds each replacement set off to the side and publishes it
/// with a single swap, so [`BanRegistry::is_banned`] never blocks on a
/// reload in progress.
pub struct BanRegistry {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl BanRegistry {
    /// Pure construction, no I/O. The registry stays empty until
    /// [`BanRegistry::start`] performs the initial load.
    pub fn new(ban_file: impl Into<PathBuf>, options: RegistryOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                ban_file: ban_file.into(),
                options,
                current: ArcSwap::from_pointee(HashSet::new()),
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: RegistryState::Created,
                shutdown_tx: None,
                watch_task: None,
            }),
        }
    }

    pub fn ban_file(&self) -> &Path {
        &self.shared.ban_file
    }

    pub async fn state(&self) -> RegistryState {
        self.lifecycle.lock().await.state
    }

    /// Checks whether `address` (exact literal match) is in the current
    /// banned set. Lock-free snapshot read, safe to call from any number of
    /// request-handling tasks while a reload is in progress. After
    /// [`BanRegistry::stop`] this keeps serving the last-known set.
    pub fn is_banned(&self, address: &str) -> bool {
        self.shared.current.load().contains(address)
    }

    /// Current number of banned entries.
    pub fn len(&self) -> usize {
        self.shared.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.current.load().is_empty()
    }

    /// Performs the initial load and launches the background watch loop.
    ///
    /// The initial load is best-effort: a registry whose ban file cannot be
    /// read starts with an empty set (nothing banned) rather than failing
    /// provisioning. Calling start on an already-Running registry is a
    /// no-op; a Stopped registry cannot be restarted.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.state {
            RegistryState::Created => {}
            RegistryState::Running => {
                tracing::debug!("Ban registry already running, ignoring start: {}", self.ban_file().display());
                return;
            }
            RegistryState::Stopped => {
                tracing::warn!("Ban registry is stopped and cannot be restarted: {}", self.ban_file().display());
                return;
            }
        }

        match read_ban_file(&self.shared.ban_file) {
            Ok(entries) => {
                tracing::info!("Loaded {} banned addresses from {}", entries.len(), self.ban_file().display());
                self.shared.current.store(Arc::new(entries));
            }
            Err(BanFileError::NotFound { ref path }) => {
                tracing::info!("Ban file not present yet, starting with no banned addresses: {}", path.display());
            }
            Err(e) => {
                tracing::warn!("Initial ban list load failed, starting with no banned addresses: {}", e);
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let task = tokio::spawn(async move { shared.run_watch_loop(shutdown_rx).await });

        lifecycle.shutdown_tx = Some(shutdown_tx);
        lifecycle.watch_task = Some(task);
        lifecycle.state = RegistryState::Running;
    }

    /// Signals the watch loop to exit and waits for it to terminate,
    /// releasing the filesystem watch handle. Idempotent. In-flight and
    /// subsequent [`BanRegistry::is_banned`] calls keep answering from the
    /// last published snapshot.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == RegistryState::Stopped {
            return;
        }
        if let Some(shutdown_tx) = lifecycle.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(task) = lifecycle.watch_task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Ban registry watch task ended abnormally: {}", e);
            }
        }
        lifecycle.state = RegistryState::Stopped;
        tracing::info!("Ban registry stopped: {}", self.ban_file().display());
    }
}

impl Shared {
    /// Dedicated owner of the current set: waits for a file-change event, a
    /// fallback timer tick or the stop signal, and republishes the snapshot.
    async fn run_watch_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let (event_tx, mut event_rx) = mpsc::channel::<()>(8);

        // Keep the watcher alive for the lifetime of the loop; dropped on
        // exit, which releases the inotify/kqueue handle.
        let _watcher = match self.spawn_file_watcher(event_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(
                    "Failed to watch ban file {}, falling back to interval reloads only: {}",
                    self.ban_file.display(),
                    e
                );
                None
            }
        };

        let mut tick = time::interval_at(
            time::Instant::now() + self.options.reload_interval,
            self.options.reload_interval,
        );
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tick.tick() => self.reload(),
                Some(_) = event_rx.recv() => {
                    // Collapse bursts: the ban tooling may write the file in
                    // several small appends.
                    time::sleep(self.options.reload_debounce).await;
                    while event_rx.try_recv().is_ok() {}
                    self.reload();
                }
            }
        }
        tracing::debug!("Ban registry watch loop exited: {}", self.ban_file.display());
    }

    /// Registers a filesystem watcher for the ban file. The parent directory
    /// is watched because file-level watches miss create/rename of the file
    /// itself.
    fn spawn_file_watcher(&self, event_tx: mpsc::Sender<()>) -> notify::Result<RecommendedWatcher> {
        let ban_file = self.ban_file.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                if relevant && event.paths.iter().any(|p| p.file_name() == ban_file.file_name()) {
                    let _ = event_tx.try_send(());
                }
            }
            Err(e) => tracing::warn!("Ban file watch error: {}", e),
        })?;

        let watch_dir = self
            .ban_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    /// Re-reads the ban file and atomically swaps in the new set. A reload
    /// failure keeps the previous set: a transient read error must never
    /// blank out a previously-valid ban list.
    fn reload(&self) {
        match read_ban_file(&self.ban_file) {
            Ok(entries) => {
                tracing::debug!("Reloaded {} banned addresses from {}", entries.len(), self.ban_file.display());
                self.current.store(Arc::new(entries));
            }
            Err(e) => {
                tracing::warn!(
                    "Ban list reload failed, keeping {} previous entries: {}",
                    self.current.load().len(),
                    e
                );
            }
        }
    }
}
