use serenity::model::id::UserId;
use std::collections::HashSet;

use super::track::EntryId;

/// Votes needed to skip with `listeners` people (bots excluded) in the channel.
pub fn required_votes(listeners: usize) -> usize {
    listeners / 2 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Passed { votes: usize, required: usize },
    Pending { votes: usize, required: usize },
    AlreadyVoted,
}

/// Skip votes for the track that is currently playing.
///
/// Votes are tied to an [`EntryId`]; a vote for a different entry starts a
/// fresh tally, so stale votes never carry over to the next track.
#[derive(Debug, Default)]
pub struct SkipVotes {
    entry: Option<EntryId>,
    voters: HashSet<UserId>,
}

impl SkipVotes {
    /// The threshold is recomputed from `listeners` on every vote.
    pub fn cast(&mut self, entry: EntryId, voter: UserId, listeners: usize) -> VoteOutcome {
        if self.entry != Some(entry) {
            self.entry = Some(entry);
            self.voters.clear();
        }

        if !self.voters.insert(voter) {
            return VoteOutcome::AlreadyVoted;
        }

        let votes = self.voters.len();
        let required = required_votes(listeners);
        if votes >= required {
            self.reset();
            VoteOutcome::Passed { votes, required }
        } else {
            VoteOutcome::Pending { votes, required }
        }
    }

    pub fn reset(&mut self) {
        self.entry = None;
        self.voters.clear();
    }
}
