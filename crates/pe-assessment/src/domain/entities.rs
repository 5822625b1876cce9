//! # Domain Entities
//!
//! Result handles as stored on the ledger and the mutable assessment state
//! built from them.

use std::collections::BTreeMap;

use serde::Serialize;

use super::value_objects::{ClearValue, Handle, ResultField};

/// The three result-field handles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssessmentHandles {
    /// Stress level handle (primary).
    pub stress: Handle,
    /// Extroversion score handle.
    pub extroversion: Handle,
    /// Intuition score handle.
    pub intuition: Handle,
}

impl AssessmentHandles {
    /// All three fields empty.
    pub const EMPTY: Self = Self {
        stress: Handle::EMPTY,
        extroversion: Handle::EMPTY,
        intuition: Handle::EMPTY,
    };

    /// Handle of one field.
    pub fn get(&self, field: ResultField) -> Handle {
        match field {
            ResultField::Stress => self.stress,
            ResultField::Extroversion => self.extroversion,
            ResultField::Intuition => self.intuition,
        }
    }

    /// The primary handle; decrypt is a no-op while it is empty.
    pub fn primary(&self) -> Handle {
        self.stress
    }

    /// True when every field is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        ResultField::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    /// Fields holding a ciphertext, in storage order.
    pub fn present(&self) -> Vec<(ResultField, Handle)> {
        ResultField::ALL
            .iter()
            .map(|f| (*f, self.get(*f)))
            .filter(|(_, h)| !h.is_empty())
            .collect()
    }
}

/// One ledger read of the caller's assessment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssessmentRecord {
    /// Result handles.
    pub handles: AssessmentHandles,
    /// Submission time in seconds (zero when nothing submitted).
    pub timestamp: u64,
}

/// Mutable record of handles and revealed values.
///
/// `handles` is `None` until a refresh has loaded them; `Some(EMPTY)` means
/// loaded but nothing submitted.
///
/// `generation` counts confirmed submissions. Ledger answers are tagged with
/// the generation they were requested under and only committed while it is
/// unchanged, so a read issued before a confirmation never lands after it.
#[derive(Clone, Debug, Default)]
pub struct AssessmentState {
    handles: Option<AssessmentHandles>,
    clear: BTreeMap<ResultField, ClearValue>,
    has_assessment: bool,
    generation: u64,
}

impl AssessmentState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded handles, if any.
    pub fn handles(&self) -> Option<AssessmentHandles> {
        self.handles
    }

    /// Whether an assessment is known to exist for the account.
    pub fn has_assessment(&self) -> bool {
        self.has_assessment
    }

    /// Set the assessment-exists flag.
    pub fn set_has_assessment(&mut self, value: bool) {
        self.has_assessment = value;
    }

    /// Overwrite all handles with a fresh ledger read.
    pub fn apply_handles(&mut self, handles: AssessmentHandles) {
        self.handles = Some(handles);
    }

    /// Confirmed submissions so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A submission confirmed: the assessment exists and every ledger answer
    /// requested before now is outdated.
    pub fn record_submission(&mut self) {
        self.has_assessment = true;
        self.generation += 1;
    }

    /// Apply handles read under `requested_at`. Returns false, leaving the
    /// state untouched, when a submission confirmed since.
    pub fn apply_handles_read_at(&mut self, requested_at: u64, handles: AssessmentHandles) -> bool {
        if requested_at != self.generation {
            return false;
        }
        self.handles = Some(handles);
        true
    }

    /// Set the existence flag from an answer requested under `requested_at`.
    /// Returns false, leaving the flag untouched, when a submission confirmed
    /// since.
    pub fn set_has_assessment_read_at(&mut self, requested_at: u64, value: bool) -> bool {
        if requested_at != self.generation {
            return false;
        }
        self.has_assessment = value;
        true
    }

    /// Forget loaded handles (binding lost).
    pub fn clear_handles(&mut self) {
        self.handles = None;
    }

    /// Drop handles and the existence flag. Revealed values stay but go
    /// stale because no handle matches them any more.
    pub fn invalidate(&mut self) {
        self.handles = None;
        self.has_assessment = false;
    }

    /// Record a revealed value for `field`.
    pub fn record_clear(&mut self, field: ResultField, value: ClearValue) {
        self.clear.insert(field, value);
    }

    /// Raw revealed entry, stale or not.
    pub fn clear_entry(&self, field: ResultField) -> Option<ClearValue> {
        self.clear.get(&field).copied()
    }

    /// Revealed value of `field`, only while it was decrypted from the
    /// field's current handle.
    pub fn clear_value(&self, field: ResultField) -> Option<u64> {
        let current = self.handles?.get(field);
        self.clear
            .get(&field)
            .filter(|cv| cv.handle == current && !current.is_empty())
            .map(|cv| cv.value)
    }

    /// Point-in-time copy for observers.
    pub fn snapshot(&self) -> AssessmentSnapshot {
        AssessmentSnapshot {
            handles: self.handles,
            clear_stress: self.clear_value(ResultField::Stress),
            clear_extroversion: self.clear_value(ResultField::Extroversion),
            clear_intuition: self.clear_value(ResultField::Intuition),
            has_assessment: self.has_assessment,
        }
    }
}

/// Read-only view of [`AssessmentState`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssessmentSnapshot {
    /// Loaded handles, if any.
    pub handles: Option<AssessmentHandles>,
    /// Revealed stress level.
    pub clear_stress: Option<u64>,
    /// Revealed extroversion score.
    pub clear_extroversion: Option<u64>,
    /// Revealed intuition score.
    pub clear_intuition: Option<u64>,
    /// Whether an assessment exists for the account.
    pub has_assessment: bool,
}

impl AssessmentSnapshot {
    /// Revealed value of one field.
    pub fn clear(&self, field: ResultField) -> Option<u64> {
        match field {
            ResultField::Stress => self.clear_stress,
            ResultField::Extroversion => self.clear_extroversion,
            ResultField::Intuition => self.clear_intuition,
        }
    }
}
