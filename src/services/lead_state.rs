//! Lead state machine (spec §4.2). A closed set of states and events; each
//! `(state, event)` pair has at most one legal target. Pure module — no I/O.

use crate::models::lead::LeadStatus;

/// Events that can drive a lead transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadEvent {
    EmailSent,
    EmailDelivered,
    ReplyReceived,
    IntentInterested,
    IntentNotInterested,
    IntentMeetingBooked,
    HardBounce,
    SoftBounce,
    SpamComplaint,
    Unsubscribe,
    SequenceFinished,
}

/// Outcome of an attempted transition. The state machine never raises; a
/// rejected transition is reported so the caller can log it (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(LeadStatus),
    Blocked,
}

/// Statuses that block further sequence steps (spec §3, §4.2).
pub fn blocks_sequence(status: LeadStatus) -> bool {
    matches!(
        status,
        LeadStatus::Replied
            | LeadStatus::Interested
            | LeadStatus::NotInterested
            | LeadStatus::MeetingBooked
            | LeadStatus::Bounced
            | LeadStatus::Unsubscribed
            | LeadStatus::SpamReported
            | LeadStatus::SequenceComplete
    )
}

/// A status is terminal with respect to outbound sends once it reaches one
/// of these four (spec §4.2).
pub fn is_terminal(status: LeadStatus) -> bool {
    matches!(
        status,
        LeadStatus::Bounced | LeadStatus::Unsubscribed | LeadStatus::SpamReported | LeadStatus::MeetingBooked
    )
}

/// Maps a bounce classification to the event the processor should apply
/// (spec §4.2 `getEventFromBounceType`).
pub fn event_from_bounce_type(bounce_type: &str) -> Option<LeadEvent> {
    match bounce_type {
        "hard" => Some(LeadEvent::HardBounce),
        "soft" => Some(LeadEvent::SoftBounce),
        "complaint" => Some(LeadEvent::SpamComplaint),
        _ => None,
    }
}

/// Attempt `(status, event) -> status`. Terminal statuses reject every
/// event except an explicit administrative override, which this module
/// does not model (callers write the status directly for that case).
pub fn transition(status: LeadStatus, event: LeadEvent) -> TransitionOutcome {
    use LeadEvent::*;
    use LeadStatus::*;

    if is_terminal(status) {
        return TransitionOutcome::Blocked;
    }

    let next = match (status, event) {
        (Pending, EmailSent) => Some(InSequence),
        (InSequence, EmailSent) => Some(InSequence),
        (InSequence, EmailDelivered) => Some(Contacted),
        (Contacted, EmailSent) => Some(InSequence),
        (Contacted, EmailDelivered) => Some(Contacted),

        (InSequence, ReplyReceived) | (Contacted, ReplyReceived) => Some(Replied),
        (Replied, IntentInterested) => Some(Interested),
        (Replied, IntentNotInterested) => Some(NotInterested),
        (Replied, IntentMeetingBooked) => Some(MeetingBooked),

        (InSequence, HardBounce) | (Contacted, HardBounce) | (Pending, HardBounce) => Some(Bounced),
        (InSequence, SoftBounce) | (Contacted, SoftBounce) => Some(SoftBounced),
        (SoftBounced, EmailSent) => Some(InSequence),
        (SoftBounced, HardBounce) => Some(Bounced),

        (InSequence, SpamComplaint) | (Contacted, SpamComplaint) | (Pending, SpamComplaint) => Some(SpamReported),
        (InSequence, Unsubscribe) | (Contacted, Unsubscribe) | (Pending, Unsubscribe) | (SoftBounced, Unsubscribe) => {
            Some(Unsubscribed)
        }

        (InSequence, SequenceFinished) | (Contacted, SequenceFinished) => Some(SequenceComplete),

        _ => None,
    };

    match next {
        Some(s) => TransitionOutcome::Applied(s),
        None => TransitionOutcome::Blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LeadStatus::*;

    #[test]
    fn blocks_sequence_matches_spec_set() {
        for s in [Replied, Interested, NotInterested, MeetingBooked, Bounced, Unsubscribed, SpamReported, SequenceComplete] {
            assert!(blocks_sequence(s), "{:?} should block", s);
        }
        for s in [Pending, InSequence, Contacted, SoftBounced] {
            assert!(!blocks_sequence(s), "{:?} should not block", s);
        }
    }

    #[test]
    fn soft_bounce_does_not_block_and_can_recover() {
        assert!(!blocks_sequence(SoftBounced));
        assert_eq!(
            transition(SoftBounced, LeadEvent::EmailSent),
            TransitionOutcome::Applied(InSequence)
        );
    }

    #[test]
    fn terminal_statuses_reject_every_event() {
        for s in [Bounced, Unsubscribed, SpamReported, MeetingBooked] {
            assert_eq!(transition(s, LeadEvent::EmailSent), TransitionOutcome::Blocked);
            assert_eq!(transition(s, LeadEvent::ReplyReceived), TransitionOutcome::Blocked);
        }
    }

    #[test]
    fn bounce_type_maps_to_event() {
        assert_eq!(event_from_bounce_type("hard"), Some(LeadEvent::HardBounce));
        assert_eq!(event_from_bounce_type("soft"), Some(LeadEvent::SoftBounce));
        assert_eq!(event_from_bounce_type("complaint"), Some(LeadEvent::SpamComplaint));
        assert_eq!(event_from_bounce_type("bogus"), None);
    }

    #[test]
    fn reply_then_intent_chain() {
        let replied = transition(InSequence, LeadEvent::ReplyReceived);
        assert_eq!(replied, TransitionOutcome::Applied(Replied));
        assert_eq!(
            transition(Replied, LeadEvent::IntentMeetingBooked),
            TransitionOutcome::Applied(MeetingBooked)
        );
    }

    #[test]
    fn p6_blocking_status_has_no_onward_path() {
        // Once a lead reaches a blocking, terminal status, no event reopens it.
        for event in [
            LeadEvent::EmailSent,
            LeadEvent::EmailDelivered,
            LeadEvent::ReplyReceived,
            LeadEvent::HardBounce,
            LeadEvent::SoftBounce,
            LeadEvent::SpamComplaint,
            LeadEvent::Unsubscribe,
            LeadEvent::SequenceFinished,
        ] {
            assert_eq!(transition(Bounced, event), TransitionOutcome::Blocked);
        }
    }
}
