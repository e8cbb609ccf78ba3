//! Step index, completed-step set and the forward/backward transition rules.
//!
//! The sequencer trusts its caller: `advance` only checks that the current step
//! was marked complete, it never runs validation itself.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::info;

use crate::wizard::flow::StepId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    #[error("Step `{0}` has not passed validation")]
    NotValidated(StepId),
    #[error("Step `{0}` is the last step")]
    AtLastStep(StepId),
    #[error("No confirmation is open")]
    NoGateOpen,
}

/// Outcome of a successful `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved(StepId),
    /// The current step is gated: the confirmation is now open and the step
    /// index did not change.
    AwaitingConfirmation(StepId),
}

#[derive(Debug, Clone)]
pub struct StepSequencer {
    steps: Vec<StepId>,
    gated: BTreeSet<StepId>,
    index: usize,
    completed: BTreeSet<StepId>,
    gate_open: bool,
}

impl StepSequencer {
    /// `steps` must not be empty.
    pub fn new(steps: Vec<StepId>, gated: impl IntoIterator<Item = StepId>) -> Self {
        Self {
            steps,
            gated: gated.into_iter().collect(),
            index: 0,
            completed: BTreeSet::new(),
            gate_open: false,
        }
    }

    pub fn current_step(&self) -> StepId {
        self.steps[self.index]
    }

    pub fn position(&self) -> (usize, usize) {
        (self.index + 1, self.steps.len())
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.steps.len()
    }

    pub fn mark_complete(&mut self, step: StepId) {
        self.completed.insert(step);
    }

    /// Drops a step's completed flag. Returns whether it was set.
    pub fn invalidate(&mut self, step: StepId) -> bool {
        self.completed.remove(&step)
    }

    pub fn is_complete(&self, step: StepId) -> bool {
        self.completed.contains(&step)
    }

    pub fn completed(&self) -> &BTreeSet<StepId> {
        &self.completed
    }

    pub fn gate_open(&self) -> bool {
        self.gate_open
    }

    pub fn advance(&mut self) -> Result<Advance, SequencerError> {
        let current = self.current_step();
        if !self.completed.contains(&current) {
            return Err(SequencerError::NotValidated(current));
        }
        if self.gated.contains(&current) && !self.gate_open {
            self.gate_open = true;
            info!(step = %current, "confirmation opened");
            return Ok(Advance::AwaitingConfirmation(current));
        }
        self.move_forward()
    }

    /// Accepts the open confirmation and moves past the gated step.
    pub fn confirm_gate(&mut self) -> Result<StepId, SequencerError> {
        if !self.gate_open {
            return Err(SequencerError::NoGateOpen);
        }
        let current = self.current_step();
        if !self.completed.contains(&current) {
            self.gate_open = false;
            return Err(SequencerError::NotValidated(current));
        }
        match self.move_forward()? {
            Advance::Moved(step) | Advance::AwaitingConfirmation(step) => Ok(step),
        }
    }

    pub fn dismiss_gate(&mut self) {
        self.gate_open = false;
    }

    /// Moves one step back, clamped at the first step. Never validates.
    pub fn retreat(&mut self) -> StepId {
        self.gate_open = false;
        if self.index > 0 {
            self.index -= 1;
            info!(step = %self.current_step(), "moved back");
        }
        self.current_step()
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.completed.clear();
        self.gate_open = false;
    }

    fn move_forward(&mut self) -> Result<Advance, SequencerError> {
        let current = self.current_step();
        if self.index + 1 >= self.steps.len() {
            return Err(SequencerError::AtLastStep(current));
        }
        self.gate_open = false;
        self.index += 1;
        let next = self.current_step();
        info!(from = %current, to = %next, "advanced");
        Ok(Advance::Moved(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILS: StepId = StepId("details");
    const REVIEW: StepId = StepId("review");
    const DOCS: StepId = StepId("documents");

    fn sequencer() -> StepSequencer {
        StepSequencer::new(vec![DETAILS, REVIEW, DOCS], [REVIEW])
    }

    #[test]
    fn advance_requires_completion() {
        let mut seq = sequencer();
        assert_eq!(seq.advance(), Err(SequencerError::NotValidated(DETAILS)));
        assert_eq!(seq.current_step(), DETAILS);

        seq.mark_complete(DETAILS);
        assert_eq!(seq.advance(), Ok(Advance::Moved(REVIEW)));
    }

    #[test]
    fn gated_step_opens_confirmation_without_moving() {
        let mut seq = sequencer();
        seq.mark_complete(DETAILS);
        seq.advance().unwrap();
        seq.mark_complete(REVIEW);

        assert_eq!(seq.advance(), Ok(Advance::AwaitingConfirmation(REVIEW)));
        assert_eq!(seq.current_step(), REVIEW);
        assert!(seq.gate_open());

        assert_eq!(seq.confirm_gate(), Ok(DOCS));
        assert!(!seq.gate_open());
    }

    #[test]
    fn dismissing_gate_keeps_step() {
        let mut seq = sequencer();
        seq.mark_complete(DETAILS);
        seq.advance().unwrap();
        seq.mark_complete(REVIEW);
        seq.advance().unwrap();
        seq.dismiss_gate();
        assert_eq!(seq.confirm_gate(), Err(SequencerError::NoGateOpen));
        assert_eq!(seq.current_step(), REVIEW);
    }

    #[test]
    fn retreat_is_clamped_and_closes_gate() {
        let mut seq = sequencer();
        assert_eq!(seq.retreat(), DETAILS);
        assert_eq!(seq.retreat(), DETAILS);

        seq.mark_complete(DETAILS);
        seq.advance().unwrap();
        seq.mark_complete(REVIEW);
        seq.advance().unwrap();
        assert_eq!(seq.retreat(), DETAILS);
        assert!(!seq.gate_open());
    }

    #[test]
    fn last_step_cannot_advance() {
        let mut seq = StepSequencer::new(vec![DETAILS], []);
        seq.mark_complete(DETAILS);
        assert_eq!(seq.advance(), Err(SequencerError::AtLastStep(DETAILS)));
        assert!(seq.is_last());
    }

    #[test]
    fn invalidate_and_reset() {
        let mut seq = sequencer();
        seq.mark_complete(DETAILS);
        seq.advance().unwrap();
        assert!(seq.invalidate(DETAILS));
        assert!(!seq.invalidate(DETAILS));
        seq.reset();
        assert_eq!(seq.current_step(), DETAILS);
        assert!(seq.completed().is_empty());
        assert_eq!(seq.position(), (1, 3));
    }
}
