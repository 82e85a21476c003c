// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured logging bring-up (§4.12): `tracing-subscriber` with an
//! `EnvFilter`, plus `tracing-appender` non-blocking rotated file output for
//! long-running watch mode. Grounded on the teacher daemon's
//! `setup_logging` (`main.rs`), generalized from a fixed user-level log path
//! to one derived from the configured `state_dir`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global subscriber, logging to `state_dir/odsyncd.log`.
/// The returned guard must be held for the process lifetime — dropping it
/// early truncates buffered log lines.
pub fn init(state_dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(state_dir)?;
    let file_appender = tracing_appender::rolling::never(state_dir, "odsyncd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
