// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Shared tracing initialization for binaries and test harnesses embedding the storage layer.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Installs a compact stderr subscriber, filtered by `RUST_LOG` when it is set.
///
/// Without `RUST_LOG`, the storage crates log at DEBUG when `debug_fallback` is set (INFO
/// otherwise) and everything else at WARN. Fails if a global subscriber is already installed.
pub fn init_tracing(debug_fallback: bool) -> Result<(), eyre::Report> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if debug_fallback { "debug" } else { "info" };
        EnvFilter::new(format!("warn,quire_db={level},quire_common={level}"))
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true),
        )
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("could not install tracing subscriber: {e}"))
}
