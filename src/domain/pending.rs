use crate::domain::models::PendingAction;

/// Mutation requested against a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
    Delete,
}

/// What the store should do with the record after a requested mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Persist the record with this pending flag.
    Flag(PendingAction),
    /// Remove the row entirely; it never reached the remote.
    Purge,
    /// The mutation is not allowed in the current state.
    Reject,
}

/// Pure transition table for the per-record pending-action state machine.
///
/// - A create always marks the row `Create`.
/// - Updating an unsubmitted `Create` row keeps `Create` (the row just gets
///   newer content); updating a `Delete` row is rejected, an update cannot
///   resurrect a deletion; anything else becomes `Update`.
/// - Deleting an unsubmitted `Create` row purges it, no tombstone is needed;
///   any other delete becomes a soft-deleted `Delete` row.
pub fn transition(current: PendingAction, requested: Mutation) -> Transition {
    match requested {
        Mutation::Create => Transition::Flag(PendingAction::Create),
        Mutation::Update => match current {
            PendingAction::Create => Transition::Flag(PendingAction::Create),
            PendingAction::Delete => Transition::Reject,
            PendingAction::None | PendingAction::Update => Transition::Flag(PendingAction::Update),
        },
        Mutation::Delete => match current {
            PendingAction::Create => Transition::Purge,
            _ => Transition::Flag(PendingAction::Delete),
        },
    }
}
