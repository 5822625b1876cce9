//! # Operation Guard
//!
//! Per-kind exclusive execution with cross-kind admission rules.
//!
//! ## Admission Table
//!
//! ```text
//! requested │ blocked while in flight
//! ──────────┼────────────────────────
//! submit    │ submit, refresh
//! refresh   │ refresh
//! decrypt   │ decrypt, refresh
//! ```
//!
//! `submit` and `decrypt` do not block each other. A permit releases its
//! kind when dropped, so every exit path of an operation releases.
//! Every change of the in-flight set is published on a `watch` channel.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use super::errors::Rejection;

/// Unit of mutual exclusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    /// Encrypt and submit answers.
    Submit,
    /// Read result handles from the ledger.
    Refresh,
    /// Reveal result handles.
    Decrypt,
}

impl OperationKind {
    /// All kinds.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Submit,
        OperationKind::Refresh,
        OperationKind::Decrypt,
    ];

    /// Kinds whose presence in flight refuses admission of `self`.
    pub fn blocked_by(self) -> &'static [OperationKind] {
        match self {
            OperationKind::Submit => &[OperationKind::Submit, OperationKind::Refresh],
            OperationKind::Refresh => &[OperationKind::Refresh],
            OperationKind::Decrypt => &[OperationKind::Decrypt, OperationKind::Refresh],
        }
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Submit => "submit",
            OperationKind::Refresh => "refresh",
            OperationKind::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kinds are currently in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InFlight {
    /// Submit in flight
    pub submitting: bool,
    /// Refresh in flight
    pub refreshing: bool,
    /// Decrypt in flight
    pub decrypting: bool,
}

impl InFlight {
    /// Whether `kind` is in flight.
    pub fn contains(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Submit => self.submitting,
            OperationKind::Refresh => self.refreshing,
            OperationKind::Decrypt => self.decrypting,
        }
    }

    fn set(&mut self, kind: OperationKind, value: bool) {
        match kind {
            OperationKind::Submit => self.submitting = value,
            OperationKind::Refresh => self.refreshing = value,
            OperationKind::Decrypt => self.decrypting = value,
        }
    }

    /// True when nothing is in flight.
    pub fn is_idle(&self) -> bool {
        !(self.submitting || self.refreshing || self.decrypting)
    }

    /// First in-flight kind that blocks `kind`, if any.
    pub fn blocker_for(&self, kind: OperationKind) -> Option<OperationKind> {
        kind.blocked_by().iter().copied().find(|k| self.contains(*k))
    }
}

/// Guard over the in-flight set.
#[derive(Debug)]
pub struct OperationGuard {
    in_flight: Mutex<InFlight>,
    published: watch::Sender<InFlight>,
}

impl Default for OperationGuard {
    fn default() -> Self {
        let (published, _) = watch::channel(InFlight::default());
        Self {
            in_flight: Mutex::new(InFlight::default()),
            published,
        }
    }
}

impl OperationGuard {
    /// Create an idle guard.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Follow changes of the in-flight set.
    pub fn subscribe(&self) -> watch::Receiver<InFlight> {
        self.published.subscribe()
    }

    /// Try to admit `kind`.
    ///
    /// Refuses without side effects when a blocking kind is in flight.
    pub fn try_acquire(self: &Arc<Self>, kind: OperationKind) -> Result<GuardPermit, Rejection> {
        let mut in_flight = self.in_flight.lock();
        if let Some(blocking) = in_flight.blocker_for(kind) {
            return Err(Rejection::Busy {
                requested: kind,
                blocking,
            });
        }
        in_flight.set(kind, true);
        self.published.send_replace(*in_flight);
        Ok(GuardPermit {
            guard: Arc::clone(self),
            kind,
        })
    }

    /// Clear `kind`. Idempotent.
    pub fn release(&self, kind: OperationKind) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(kind) {
            in_flight.set(kind, false);
            self.published.send_replace(*in_flight);
        }
    }

    /// Whether `kind` would be admitted right now.
    pub fn would_admit(&self, kind: OperationKind) -> bool {
        self.in_flight.lock().blocker_for(kind).is_none()
    }

    /// Current in-flight set.
    pub fn snapshot(&self) -> InFlight {
        *self.in_flight.lock()
    }
}

/// Scoped admission of one operation kind.
#[derive(Debug)]
#[must_use = "dropping the permit releases the operation immediately"]
pub struct GuardPermit {
    guard: Arc<OperationGuard>,
    kind: OperationKind,
}

impl GuardPermit {
    /// Admitted kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.guard.release(self.kind);
    }
}
