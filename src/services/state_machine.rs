//! Media sharing protocol state machine
//!
//! ```text
//! sender:    (none) --create--> Created --share--> MediaShared
//! receiver:  (none) --receive-------------------> MediaShared
//! ```
//!
//! Transitions are pure: they say which state comes next and which side
//! effects must run, in order. The service executes them.

use crate::error::{MediaSharingError, Result};
use crate::models::MediaSharingState;

/// Lifecycle actions that drive the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolAction {
    Create,
    Share,
    Receive,
}

impl ProtocolAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolAction::Create => "create",
            ProtocolAction::Share => "share",
            ProtocolAction::Receive => "receive",
        }
    }
}

/// Side effects of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Hand the share message to the outbound transport
    SendMessage,
    /// Store a new record (emits `RecordAdded`)
    PersistNew,
    /// Overwrite the existing record (emits `RecordUpdated`)
    PersistUpdate,
    /// Emit `StateChanged`
    EmitStateChanged,
}

/// A legal transition and its ordered side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<MediaSharingState>,
    pub to: MediaSharingState,
    pub effects: &'static [Effect],
}

const CREATE_EFFECTS: &[Effect] = &[Effect::PersistNew, Effect::EmitStateChanged];
// The record is only persisted as shared once the message has left
const SHARE_EFFECTS: &[Effect] = &[
    Effect::SendMessage,
    Effect::PersistUpdate,
    Effect::EmitStateChanged,
];
const RECEIVE_EFFECTS: &[Effect] = &[Effect::PersistNew, Effect::EmitStateChanged];

/// Compute the transition for `action` on a record currently in `current`
/// (`None` when no record exists yet).
pub fn transition(
    record_id: &str,
    current: Option<MediaSharingState>,
    action: ProtocolAction,
) -> Result<Transition> {
    use crate::models::MediaSharingState::*;

    match (current, action) {
        (None, ProtocolAction::Create) => Ok(Transition {
            from: None,
            to: Created,
            effects: CREATE_EFFECTS,
        }),
        (Some(Created), ProtocolAction::Share) => Ok(Transition {
            from: Some(Created),
            to: MediaShared,
            effects: SHARE_EFFECTS,
        }),
        (None, ProtocolAction::Receive) => Ok(Transition {
            from: None,
            to: MediaShared,
            effects: RECEIVE_EFFECTS,
        }),
        (None, ProtocolAction::Share) => {
            Err(MediaSharingError::RecordNotFound(record_id.to_string()))
        }
        (Some(state), action) => Err(MediaSharingError::InvalidState {
            record_id: record_id.to_string(),
            state,
            action: action.as_str(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaSharingState::*;

    #[test]
    fn test_sender_path() {
        let created = transition("r", None, ProtocolAction::Create).unwrap();
        assert_eq!(created.to, Created);

        let shared = transition("r", Some(Created), ProtocolAction::Share).unwrap();
        assert_eq!(shared.from, Some(Created));
        assert_eq!(shared.to, MediaShared);
    }

    #[test]
    fn test_receiver_goes_straight_to_shared() {
        let received = transition("r", None, ProtocolAction::Receive).unwrap();
        assert_eq!(received.from, None);
        assert_eq!(received.to, MediaShared);
        assert_eq!(received.effects, RECEIVE_EFFECTS);
    }

    #[test]
    fn test_share_sends_before_persisting() {
        let shared = transition("r", Some(Created), ProtocolAction::Share).unwrap();
        let send = shared.effects.iter().position(|e| *e == Effect::SendMessage);
        let persist = shared.effects.iter().position(|e| *e == Effect::PersistUpdate);
        assert!(send.unwrap() < persist.unwrap());
    }

    #[test]
    fn test_no_transition_out_of_media_shared() {
        for action in [
            ProtocolAction::Create,
            ProtocolAction::Share,
            ProtocolAction::Receive,
        ] {
            let err = transition("r", Some(MediaShared), action).unwrap_err();
            assert!(matches!(
                err,
                MediaSharingError::InvalidState { state: MediaShared, .. }
            ));
        }
    }

    #[test]
    fn test_share_without_record() {
        assert!(matches!(
            transition("r", None, ProtocolAction::Share),
            Err(MediaSharingError::RecordNotFound(id)) if id == "r"
        ));
    }

    #[test]
    fn test_created_cannot_be_recreated_or_received() {
        assert!(transition("r", Some(Created), ProtocolAction::Create).is_err());
        assert!(transition("r", Some(Created), ProtocolAction::Receive).is_err());
    }
}
