//! Merging of per-backend partial responses.
//!
//! # Responsibilities
//! - Fold N partial responses into one data map (later keys overwrite earlier ones)
//! - Reconcile completeness across all parts
//! - Reconcile failure status codes into a single code
//!
//! # Design Decisions
//! - Conflicting failure codes collapse to 500; codes above 500 are clamped to 500
//! - Missing parts never abort the merge
//! - The aggregate data map is never absent; empty means "no successful calls"

use serde_json::{Map, Value};

const INTERNAL_SERVER_ERROR: u16 = 500;

/// Result of calling exactly one backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialResponse {
    /// Decoded data. `None` when the call produced nothing usable.
    pub data: Option<Map<String, Value>>,
    pub is_complete: bool,
    /// Failure status, 0 when the call did not fail with a status.
    pub status: u16,
}

impl PartialResponse {
    /// A complete, successful part.
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            is_complete: true,
            status: 0,
        }
    }

    /// A part that failed with `status` and carries no data.
    pub fn failed(status: u16) -> Self {
        Self {
            data: None,
            is_complete: false,
            status,
        }
    }
}

/// Merged response for one endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResponse {
    pub data: Map<String, Value>,
    /// True only if every expected part arrived, carried data and was complete.
    pub is_complete: bool,
    /// Reconciled failure status, 0 when no part failed with a status.
    pub status: u16,
    /// Parts that never arrived.
    pub missing: usize,
    /// Parts that carried a failure status.
    pub failed: usize,
}

/// Merge `parts` for an endpoint expecting `expected` backends.
pub fn combine(expected: usize, parts: Vec<Option<PartialResponse>>) -> AggregateResponse {
    let mut is_complete = parts.len() == expected;
    let mut data: Option<Map<String, Value>> = None;
    let mut status = 0u16;
    let mut missing = 0;
    let mut failed = 0;

    for part in parts {
        let Some(part) = part else {
            is_complete = false;
            missing += 1;
            continue;
        };

        if part.status != 0 {
            failed += 1;
            if status == 0 {
                status = part.status;
            } else if status != part.status {
                status = INTERNAL_SERVER_ERROR;
            }
        }

        let Some(part_data) = part.data else {
            is_complete = false;
            continue;
        };
        is_complete = is_complete && part.is_complete;

        match data.as_mut() {
            None => data = Some(part_data),
            Some(merged) => merged.extend(part_data),
        }
    }

    AggregateResponse {
        data: data.unwrap_or_default(),
        is_complete,
        status: status.min(INTERNAL_SERVER_ERROR),
        missing,
        failed,
    }
}
