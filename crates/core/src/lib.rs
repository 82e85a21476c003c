// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! odsync-core: shared data model for the per-drive sync engine.
//!
//! Identifiers, the baseline entry, change events, planned actions, ledger
//! rows, conflicts, and the write-ahead-log event payload that ties them
//! together. No I/O lives here — see `odsync-storage`, `odsync-adapters`,
//! and `odsync-engine`.

pub mod action;
pub mod baseline;
pub mod baseline_event;
pub mod change_event;
pub mod clock;
pub mod conflict;
pub mod error;
pub mod id;
pub mod ids;
pub mod ledger;
pub mod path_util;
pub mod time_fmt;

pub use action::{Action, ActionType, ActionTypeKind, PathView};
pub use baseline::{BaselineEntry, ItemType};
pub use baseline_event::BaselineEvent;
pub use change_event::{ChangeEvent, ChangeKind, PathChanges, Source};
pub use clock::{Clock, FakeClock, SystemClock};
pub use conflict::{ConflictKind, ConflictRecord};
pub use error::{CoreError, ErrorKind};
pub use id::{IdGen, ShortId, SequentialIdGen, UuidIdGen};
pub use ids::{CanonicalDriveId, ConflictId, CycleId, DriveId, ItemId, LedgerId};
pub use ledger::{LedgerRow, LedgerStatus};
pub use time_fmt::{format_elapsed, format_elapsed_ms};
