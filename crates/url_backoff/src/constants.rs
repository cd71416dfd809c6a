// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Environment variable holding the base backoff delay, in seconds.
pub const ENV_BACKOFF_BASE: &str = "CLIENT_BACKOFF_BASE";

/// Environment variable holding the maximum backoff delay, in seconds.
pub const ENV_BACKOFF_DURATION: &str = "CLIENT_BACKOFF_DURATION";

/// Number of tracked destinations at which inserting a new destination first prunes idle entries.
///
/// Destinations are usually long-lived and few, so the map rarely gets this large. The threshold
/// bounds memory for clients that talk to many short-lived hosts. After each scan, the next one
/// waits until the map holds twice the destinations that survived, and never fewer than this.
pub const PRUNE_THRESHOLD: usize = 256;

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock";
