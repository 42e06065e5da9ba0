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

use std::{path::PathBuf, sync::Arc, time::Duration};

use banguard_registry::{BanRegistry, RegistryOptions, RegistryState};
use tempfile::TempDir;

fn fast_options() -> RegistryOptions {
    RegistryOptions {
        reload_interval: Duration::from_millis(100),
        reload_debounce: Duration::from_millis(20),
    }
}

fn write_ban_file(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("banned-ips");
    std::fs::write(&path, content).unwrap();
    path
}

/// Polls until `predicate` holds or the deadline expires.
async fn wait_until(predicate: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    predicate()
}

#[tokio::test]
async fn test_start_loads_initial_set() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n#comment\n\n5.6.7.8");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    assert_eq!(registry.state().await, RegistryState::Created);
    assert!(!registry.is_banned("1.2.3.4"));

    registry.start().await;
    assert_eq!(registry.state().await, RegistryState::Running);
    assert_eq!(registry.len(), 2);
    assert!(registry.is_banned("1.2.3.4"));
    assert!(registry.is_banned("5.6.7.8"));
    assert!(!registry.is_banned("9.9.9.9"));

    registry.stop().await;
}

#[tokio::test]
async fn test_start_without_ban_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("banned-ips");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;

    assert_eq!(registry.state().await, RegistryState::Running);
    assert!(registry.is_empty());
    assert!(!registry.is_banned("1.2.3.4"));

    registry.stop().await;
}

#[tokio::test]
async fn test_reload_picks_up_rewritten_file() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;
    assert!(registry.is_banned("1.2.3.4"));

    std::fs::write(&path, "5.6.7.8\n").unwrap();

    let reg = registry.clone();
    assert!(wait_until(move || reg.is_banned("5.6.7.8") && !reg.is_banned("1.2.3.4")).await);

    registry.stop().await;
}

#[tokio::test]
async fn test_reload_picks_up_created_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("banned-ips");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;
    assert!(registry.is_empty());

    std::fs::write(&path, "10.0.0.1\n").unwrap();

    let reg = registry.clone();
    assert!(wait_until(move || reg.is_banned("10.0.0.1")).await);

    registry.stop().await;
}

#[tokio::test]
async fn test_deleted_file_keeps_previous_set() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;
    assert!(registry.is_banned("1.2.3.4"));

    std::fs::remove_file(&path).unwrap();
    // Let several reload attempts fail against the missing file.
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(registry.is_banned("1.2.3.4"));
    assert_eq!(registry.len(), 1);

    registry.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_noop() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;
    registry.start().await;
    assert_eq!(registry.state().await, RegistryState::Running);
    assert!(registry.is_banned("1.2.3.4"));

    // A single stop must terminate the single loop; a leaked second loop
    // would keep the join pending.
    tokio::time::timeout(Duration::from_secs(5), registry.stop())
        .await
        .expect("stop should terminate the watch loop promptly");
    assert_eq!(registry.state().await, RegistryState::Stopped);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_serves_last_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;
    registry.stop().await;
    registry.stop().await;

    assert_eq!(registry.state().await, RegistryState::Stopped);
    // Stale but safe: in-flight requests still get answers.
    assert!(registry.is_banned("1.2.3.4"));
    assert!(!registry.is_banned("9.9.9.9"));
}

#[tokio::test]
async fn test_stopped_registry_cannot_restart() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;
    registry.stop().await;

    registry.start().await;
    assert_eq!(registry.state().await, RegistryState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_during_reloads() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n5.6.7.8\n");

    let registry = Arc::new(BanRegistry::new(&path, fast_options()));
    registry.start().await;

    let mut readers = Vec::new();
    for _ in 0..8 {
        let reg = registry.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..2000 {
                // Must never observe a panic or a blocked read while the
                // writer swaps snapshots underneath.
                let _ = reg.is_banned("1.2.3.4");
                let _ = reg.is_banned("9.9.9.9");
                tokio::task::yield_now().await;
            }
        }));
    }

    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        for i in 0..50 {
            std::fs::write(&writer_path, format!("1.2.3.4\n5.6.7.8\n10.0.0.{}\n", i)).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    for reader in readers {
        reader.await.unwrap();
    }
    writer.await.unwrap();

    let reg = registry.clone();
    assert!(wait_until(move || reg.is_banned("10.0.0.49")).await);
    assert!(registry.is_banned("1.2.3.4"));

    registry.stop().await;
}

#[tokio::test]
async fn test_repeated_start_stop_cycles_do_not_leak() {
    let dir = TempDir::new().unwrap();
    let path = write_ban_file(&dir, "1.2.3.4\n");

    for _ in 0..5 {
        let registry = Arc::new(BanRegistry::new(&path, fast_options()));
        registry.start().await;
        assert!(registry.is_banned("1.2.3.4"));
        tokio::time::timeout(Duration::from_secs(5), registry.stop())
            .await
            .expect("stop should always terminate the watch loop");
    }
}
