// crates/gate-acceptor-core/src/core/identifiers.rs
// ============================================================================
// Module: Gate Acceptor Identifiers
// Description: Run identifiers and derived unit identifiers.
// Purpose: Stamp each run and each executable unit with a unique key.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! A run ID is minted from the UTC wall clock when a scheduler invocation
//! starts and stamps every artifact of that run. Unit IDs are derived from
//! a validator's gate, suite, package, and function so they stay unique
//! within a run even when two gates reference the same test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

// ============================================================================
// SECTION: Run Identifier
// ============================================================================

/// Last timestamp base handed out in this process and its repeat count.
static LAST_RUN_ID: Mutex<(String, u32)> = Mutex::new((String::new(), 0));

/// Identifier for a single orchestrated run.
///
/// # Invariants
/// - Generated IDs are unique within the process and sort by start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wraps an existing run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a run ID from the current UTC wall clock.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_timestamp(OffsetDateTime::now_utc())
    }

    /// Mints a run ID from an explicit timestamp (`YYYYMMDD-HHMMSS-nnnnnnnnn`).
    ///
    /// A `-N` suffix is appended when the same instant was already issued.
    #[must_use]
    pub fn from_timestamp(at: OffsetDateTime) -> Self {
        let format = format_description!("[year][month][day]-[hour][minute][second]");
        let stamp = at.format(&format).unwrap_or_else(|_| at.unix_timestamp().to_string());
        let base = format!("{stamp}-{:09}", at.nanosecond());
        let mut last = LAST_RUN_ID.lock().unwrap_or_else(PoisonError::into_inner);
        let id = if last.0 == base {
            last.1 = last.1.saturating_add(1);
            format!("{base}-{}", last.1)
        } else {
            *last = (base.clone(), 0);
            base
        };
        drop(last);
        Self(id)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SECTION: Unit Identifier
// ============================================================================

/// Derives the identifier for an executable unit.
///
/// Format: `gate[/suite]::package[::func]`.
#[must_use]
pub fn unit_id(gate: &str, suite: Option<&str>, package: &str, func_name: Option<&str>) -> String {
    let mut id = String::from(gate);
    if let Some(suite) = suite {
        id.push('/');
        id.push_str(suite);
    }
    id.push_str("::");
    id.push_str(package);
    if let Some(func) = func_name {
        id.push_str("::");
        id.push_str(func);
    }
    id
}
