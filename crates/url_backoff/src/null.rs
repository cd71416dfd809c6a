// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::{Backoff, Destination, Outcome};

/// A backoff manager that never delays.
///
/// Used when backoff is disabled so that call sites keep a single code path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackoffManager;

impl NullBackoffManager {
    /// Creates a new null backoff manager.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Backoff for NullBackoffManager {
    fn calculate_backoff(&self, _destination: &Destination) -> Duration {
        Duration::ZERO
    }

    fn update_backoff(&self, _destination: &Destination, _outcome: Outcome) {}
}
