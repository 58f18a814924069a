//! Win/loss counters and win rate

use crate::types::Participant;
use crate::utils::win_rate;

/// How a single participant fared in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalResult {
    Won,
    Lost,
    Drew,
}

/// Count one finished match into `participant`'s statistics
pub fn record_result(participant: &mut Participant, result: PersonalResult) {
    match result {
        PersonalResult::Won => participant.wins += 1,
        PersonalResult::Lost => participant.losses += 1,
        PersonalResult::Drew => {}
    }
    participant.total_matches += 1;
    participant.win_rate = win_rate(participant.wins, participant.total_matches);
    participant.touch();
}
