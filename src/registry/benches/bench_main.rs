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

use std::fmt::Write as _;

use banguard_registry::{read_ban_file, BanRegistry, RegistryOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_is_banned(c: &mut Criterion) {
    let mut content = String::new();
    for i in 0..10_000u32 {
        writeln!(content, "10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff).unwrap();
    }
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &content).unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = std::sync::Arc::new(BanRegistry::new(file.path(), RegistryOptions::default()));
    rt.block_on(registry.start());

    c.bench_function("is_banned_hit", |b| {
        b.iter(|| black_box(registry.is_banned(black_box("10.0.0.1"))))
    });
    c.bench_function("is_banned_miss", |b| {
        b.iter(|| black_box(registry.is_banned(black_box("203.0.113.7"))))
    });

    rt.block_on(registry.stop());
}

fn bench_read_ban_file(c: &mut Criterion) {
    let mut content = String::new();
    for i in 0..10_000u32 {
        writeln!(content, "10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff).unwrap();
    }
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &content).unwrap();

    c.bench_function("read_ban_file_10k", |b| {
        b.iter(|| black_box(read_ban_file(file.path()).unwrap()))
    });
}

criterion_group!(benches, bench_is_banned, bench_read_ban_file);
criterion_main!(benches);
