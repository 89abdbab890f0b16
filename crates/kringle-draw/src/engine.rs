//! Draw engine
//!
//! Builds a derangement of the roster by rejection sampling: each giver,
//! in roster order, picks uniformly among receivers that are still free
//! and are not the giver. A bad early pick can leave the last giver with
//! only themself; the partial mapping is then thrown away and the draw
//! starts over. The number of restarts is bounded.

use std::collections::HashSet;

use kringle_core::{
    Assignment, AssignmentMapping, GroupId, KringleError, KringleResult, PairId, ParticipantId,
    Timestamp,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, error, info};

/// Smallest roster a draw accepts. Not configurable downward.
pub const MIN_PARTICIPANTS: usize = 3;

/// Default bound on full restarts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 500;

/// Draw engine configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Minimum roster size; values below 3 are raised to 3
    pub min_participants: usize,
    /// Restarts before giving up with `AssignmentImpossible`; at least one
    /// attempt is always made
    pub max_attempts: u32,
}

impl Default for DrawConfig {
    fn default() -> Self {
        DrawConfig {
            min_participants: MIN_PARTICIPANTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl DrawConfig {
    pub fn with_min_participants(mut self, min: usize) -> Self {
        self.min_participants = min;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// The minimum actually enforced
    pub fn required_participants(&self) -> usize {
        self.min_participants.max(MIN_PARTICIPANTS)
    }

    /// The attempt bound actually used
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Produces assignment mappings. Holds no per-group state: committing a
/// mapping exactly once is the store's responsibility.
pub struct DrawEngine<R = StdRng> {
    config: DrawConfig,
    rng: R,
}

impl DrawEngine<StdRng> {
    pub fn new() -> Self {
        Self::with_config(DrawConfig::default())
    }

    pub fn with_config(config: DrawConfig) -> Self {
        DrawEngine {
            config,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for DrawEngine<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> DrawEngine<R> {
    pub fn with_rng(config: DrawConfig, rng: R) -> Self {
        DrawEngine { config, rng }
    }

    pub fn config(&self) -> &DrawConfig {
        &self.config
    }

    /// Draw a mapping for `roster`.
    ///
    /// Fails with `PreconditionFailed` below the minimum size and with
    /// `AssignmentImpossible` if every attempt strands a giver. A failure
    /// never yields a partial mapping.
    pub fn draw(&mut self, group_id: GroupId, roster: &[ParticipantId]) -> KringleResult<AssignmentMapping> {
        let required = self.config.required_participants();
        if roster.len() < required {
            return Err(KringleError::PreconditionFailed {
                required,
                actual: roster.len(),
            });
        }

        let mut seen = HashSet::with_capacity(roster.len());
        if let Some(dup) = roster.iter().find(|id| !seen.insert(**id)) {
            return Err(KringleError::InvalidInput(format!(
                "participant {dup} appears twice in the roster"
            )));
        }

        let limit = self.config.attempt_limit();
        for attempt in 1..=limit {
            let Some(receivers) = self.attempt(roster) else {
                debug!(group = %group_id, attempt, "draw attempt stranded a giver, restarting");
                continue;
            };

            let pairs = roster
                .iter()
                .zip(receivers)
                .map(|(giver, receiver)| Assignment::new(PairId::random(&mut self.rng), *giver, receiver))
                .collect();
            let mapping = AssignmentMapping::new(group_id, pairs, Timestamp::now());

            if let Err(violation) = mapping.check_derangement(roster) {
                error!(group = %group_id, %violation, "draw produced an invalid mapping");
                return Err(KringleError::AssignmentImpossible {
                    participants: roster.len(),
                    attempts: attempt,
                });
            }

            info!(group = %group_id, participants = roster.len(), attempts = attempt, "draw computed");
            return Ok(mapping);
        }

        error!(
            group = %group_id,
            participants = roster.len(),
            attempts = limit,
            "draw exhausted its attempts"
        );
        Err(KringleError::AssignmentImpossible {
            participants: roster.len(),
            attempts: limit,
        })
    }

    /// One pass over the givers. Returns receivers in giver order, or
    /// `None` if some giver had no candidate left.
    fn attempt(&mut self, roster: &[ParticipantId]) -> Option<Vec<ParticipantId>> {
        let mut taken = vec![false; roster.len()];
        let mut receivers = Vec::with_capacity(roster.len());
        let mut candidates = Vec::with_capacity(roster.len());

        for (giver_idx, _) in roster.iter().enumerate() {
            candidates.clear();
            candidates.extend((0..roster.len()).filter(|&i| i != giver_idx && !taken[i]));

            let &pick = candidates.choose(&mut self.rng)?;
            taken[pick] = true;
            receivers.push(roster[pick]);
        }

        Some(receivers)
    }
}
