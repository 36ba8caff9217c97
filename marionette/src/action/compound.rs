//! Container actions: compound composition (sequential / random-order /
//! random-index with inter-step pauses) and the loop wrapper.
//!
//! Containers are the sole retry boundary: a non-cancellation failure from a
//! child is routed to the provider's retry policy, and on "retry" the same
//! child is re-run from its start without advancing the iteration.

use std::fmt;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::Action;
use crate::errors::SimulatorError;
use crate::events::ProgressMessage;
use crate::provider::Interaction;

/// The order children of a [`CompoundAction`] run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOrdering {
    /// List order.
    Sequential,
    /// A fresh random permutation per round; every child runs exactly once
    /// per round.
    RandomOrder,
    /// A uniformly random child each step, independent of history. Only
    /// valid with looping, since no complete round exists to terminate on.
    RandomIndex,
}

/// Ordered list of children plus a composition policy and a random pause
/// drawn from `[pause_min, pause_max]` between steps.
#[derive(Debug, Clone)]
pub struct CompoundAction {
    children: Vec<Action>,
    ordering: CompoundOrdering,
    looped: bool,
    pause_min: Duration,
    pause_max: Duration,
}

impl CompoundAction {
    /// Validated in [`ActionNode::build`](crate::action::ActionNode::build);
    /// this constructor enforces the same contract for programmatic use.
    pub fn new(
        children: Vec<Action>,
        ordering: CompoundOrdering,
        looped: bool,
        pause_min: Duration,
        pause_max: Duration,
    ) -> Result<Self, SimulatorError> {
        if children.is_empty() {
            return Err(SimulatorError::InvalidArgument(
                "a compound action needs at least one child".into(),
            ));
        }
        if pause_min > pause_max {
            return Err(SimulatorError::InvalidArgument(format!(
                "pause range is inverted ({}ms > {}ms)",
                pause_min.as_millis(),
                pause_max.as_millis()
            )));
        }
        if ordering == CompoundOrdering::RandomIndex && !looped {
            return Err(SimulatorError::InvalidArgument(
                "random-index ordering cannot be non-looping".into(),
            ));
        }
        Ok(Self {
            children,
            ordering,
            looped,
            pause_min,
            pause_max,
        })
    }

    pub fn children(&self) -> &[Action] {
        &self.children
    }

    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        let mut rng = rand::thread_rng();
        loop {
            match self.ordering {
                CompoundOrdering::RandomIndex => loop {
                    itx.check_cancelled()?;
                    let index = rng.gen_range(0..self.children.len());
                    run_child(&self.children[index], index, itx)?;
                    self.pause_between(itx, &mut rng)?;
                },
                CompoundOrdering::Sequential | CompoundOrdering::RandomOrder => {
                    let mut round: Vec<usize> = (0..self.children.len()).collect();
                    if self.ordering == CompoundOrdering::RandomOrder {
                        round.shuffle(&mut rng);
                        debug!(?round, "new random round");
                    }
                    for (step, &index) in round.iter().enumerate() {
                        itx.check_cancelled()?;
                        run_child(&self.children[index], index, itx)?;
                        let last_step = step + 1 == round.len();
                        if !last_step || self.looped {
                            self.pause_between(itx, &mut rng)?;
                        }
                    }
                }
            }
            if !self.looped {
                return Ok(());
            }
        }
    }

    fn pause_between(
        &self,
        itx: &mut dyn Interaction,
        rng: &mut impl Rng,
    ) -> Result<(), SimulatorError> {
        let (min, max) = (self.pause_min.as_millis() as u64, self.pause_max.as_millis() as u64);
        let pause = if min == max {
            min
        } else {
            rng.gen_range(min..=max)
        };
        itx.wait(Duration::from_millis(pause))
    }
}

impl fmt::Display for CompoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Compound ({:?}, {} children{})",
            self.ordering,
            self.children.len(),
            if self.looped { ", looping" } else { "" }
        )
    }
}

/// Runs one wrapped action a fixed number of times, or indefinitely.
#[derive(Debug, Clone)]
pub struct LoopAction {
    child: Box<Action>,
    count: Option<u64>,
}

impl LoopAction {
    pub fn new(child: Action, count: Option<u64>) -> Result<Self, SimulatorError> {
        if count == Some(0) {
            return Err(SimulatorError::InvalidArgument(
                "a loop count of 0 would never run its action; use a count of \
                 at least 1, or none for an endless loop"
                    .into(),
            ));
        }
        Ok(Self {
            child: Box::new(child),
            count,
        })
    }

    pub fn child(&self) -> &Action {
        &self.child
    }

    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        let mut iteration = 0u64;
        loop {
            itx.check_cancelled()?;
            if let Some(count) = self.count {
                if iteration >= count {
                    return Ok(());
                }
                itx.emit(ProgressMessage::Info {
                    text: format!("iteration {}/{count}", iteration + 1),
                });
            } else {
                itx.emit(ProgressMessage::Info {
                    text: format!("iteration {}", iteration + 1),
                });
            }
            run_child(&self.child, 0, itx)?;
            iteration += 1;
        }
    }
}

impl fmt::Display for LoopAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            Some(count) => write!(f, "Loop x{count}"),
            None => write!(f, "Loop (endless)"),
        }
    }
}

/// The shared retry boundary: re-runs the same child from its start for as
/// long as the retry policy says retry; cancellation always wins.
fn run_child(
    child: &Action,
    index: usize,
    itx: &mut dyn Interaction,
) -> Result<(), SimulatorError> {
    loop {
        itx.check_cancelled()?;
        itx.emit(ProgressMessage::ChildStarted { index });
        let result = child.run(itx);
        itx.emit(ProgressMessage::ChildStopped);
        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => itx.retry_or_cancel(e)?,
        }
    }
}
