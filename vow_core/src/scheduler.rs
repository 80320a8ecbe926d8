//! Defer-to-later scheduling facility

use crate::error::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Scheduled = Box<dyn FnOnce() -> Result<()>>;

/// FIFO queue of callbacks to run after the current synchronous
/// execution completes.
///
/// Stands in for the host runtime's microtask facility. Callbacks run in
/// the order they were scheduled; a callback may schedule further
/// callbacks, which run in the same drain. Cloning yields another handle
/// to the same queue, so a scheduler can be threaded through constructors
/// while a test harness keeps a handle for draining.
#[derive(Clone)]
pub struct Scheduler {
    queue: Rc<RefCell<VecDeque<Scheduled>>>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Queue a callback to run on a later round
    pub fn schedule<F>(&self, callback: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.queue.borrow_mut().push_back(Box::new(callback));
    }

    /// Number of callbacks waiting to run
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether no callbacks are waiting
    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run the next callback, if any.
    ///
    /// Returns whether a callback ran. An error from the callback stops
    /// the run and leaves the rest of the queue in place.
    pub fn run_next(&self) -> Result<bool> {
        // The borrow must end before the callback runs: callbacks schedule.
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some(callback) => {
                callback()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drain the queue, including callbacks scheduled while draining.
    ///
    /// Returns how many callbacks ran.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut ran = 0;
        while self.run_next()? {
            ran += 1;
        }
        tracing::debug!("Scheduler drained after {} callbacks", ran);
        Ok(ran)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
