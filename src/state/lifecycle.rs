//! Match status transitions.

use thiserror::Error;

use crate::state::match_state::MatchStatus;

/// Events that move a match between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Admin starts the countdown.
    Start,
    /// Admin ends the match early.
    Stop,
    /// The countdown reached zero.
    TimeUp,
    /// Admin prepares a new round.
    Reset,
}

/// Error returned when an event cannot be applied in the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// `event` does not apply to `from`.
    #[error("invalid transition: {event:?} cannot be applied while {from}")]
    Invalid {
        /// Status the match was in.
        from: MatchStatus,
        /// Rejected event.
        event: MatchEvent,
    },
    /// Starting requires at least one registered player.
    #[error("cannot start a match without players")]
    NoPlayers,
}

/// Status reached by applying `event` while in `from`.
///
/// `total_players` only matters for [`MatchEvent::Start`].
pub fn next_status(
    from: MatchStatus,
    event: MatchEvent,
    total_players: usize,
) -> Result<MatchStatus, TransitionError> {
    let next = match (from, event) {
        (MatchStatus::Waiting, MatchEvent::Start) if total_players == 0 => {
            return Err(TransitionError::NoPlayers);
        }
        (MatchStatus::Waiting, MatchEvent::Start) => MatchStatus::Active,
        (MatchStatus::Active, MatchEvent::Stop | MatchEvent::TimeUp) => MatchStatus::Finished,
        (MatchStatus::Waiting | MatchStatus::Finished, MatchEvent::Reset) => MatchStatus::Waiting,
        (from, event) => return Err(TransitionError::Invalid { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_round_trip_through_a_match() {
        let active = next_status(MatchStatus::Waiting, MatchEvent::Start, 2).unwrap();
        assert_eq!(active, MatchStatus::Active);
        let finished = next_status(active, MatchEvent::TimeUp, 2).unwrap();
        assert_eq!(finished, MatchStatus::Finished);
        let waiting = next_status(finished, MatchEvent::Reset, 2).unwrap();
        assert_eq!(waiting, MatchStatus::Waiting);
    }

    #[test]
    fn empty_rosters_block_start() {
        assert_eq!(
            next_status(MatchStatus::Waiting, MatchEvent::Start, 0),
            Err(TransitionError::NoPlayers)
        );
    }

    #[test]
    fn reset_is_refused_while_running() {
        assert_eq!(
            next_status(MatchStatus::Active, MatchEvent::Reset, 4),
            Err(TransitionError::Invalid {
                from: MatchStatus::Active,
                event: MatchEvent::Reset,
            })
        );
    }

    #[test]
    fn finished_match_cannot_restart_directly() {
        assert!(next_status(MatchStatus::Finished, MatchEvent::Start, 4).is_err());
        assert!(next_status(MatchStatus::Waiting, MatchEvent::Stop, 4).is_err());
    }
}
