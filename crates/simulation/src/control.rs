//! Run-scoped control shared between the runner and generator actors.

use std::cell::Cell;
use std::rc::Rc;

/// Shared handle to the drain flag of one simulation run.
///
/// The runner flips it once when the drain horizon is crossed; generator
/// actors hold clones and check it before producing new arrivals. Each run
/// creates its own controller, so the flag lives exactly as long as the run.
#[derive(Clone, Debug, Default)]
pub struct RunController {
    draining: Rc<Cell<bool>>,
}

impl RunController {
    /// A controller in the generating (non-draining) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether generators should stop producing new work.
    pub fn is_draining(&self) -> bool {
        self.draining.get()
    }

    /// Enter drain mode. Returns `true` only on the first call.
    pub fn begin_drain(&self) -> bool {
        !self.draining.replace(true)
    }
}
