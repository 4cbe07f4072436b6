//! Whole-snapshot reconciliation policy.
//!
//! The cloud wins at sign-in; during a session the user picks a side on a
//! manual sync. There is no per-record merge.

use crate::entity::{Snapshot, SnapshotSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// Overwrite every local collection with the remote snapshot.
    ReplaceLocal,
    /// Upload the local snapshot as the remote seed.
    PushLocal,
    /// Remote already has data; ask the user which side wins.
    ManualChoice { remote_summary: SnapshotSummary },
    /// Leave local data untouched.
    KeepLocal,
}

/// The user's answer to a `ManualChoice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    AcceptRemote,
    PushLocal,
}

/// Policy for the pull that follows sign-in. An empty cloud account never
/// wipes local data.
pub fn on_login(remote: &Snapshot) -> SyncDecision {
    if remote.roles.is_empty() && remote.scenarios.is_empty() {
        SyncDecision::KeepLocal
    } else {
        SyncDecision::ReplaceLocal
    }
}

/// Policy for an explicit "save & sync".
pub fn on_manual_sync(remote: &Snapshot) -> SyncDecision {
    if remote.is_empty() {
        SyncDecision::PushLocal
    } else {
        SyncDecision::ManualChoice {
            remote_summary: remote.summary(),
        }
    }
}
