//! Combinators built entirely on the deferred public contract

use crate::deferred::{Deferred, DeferredState};
use crate::error::{Result, VowError};
use crate::scheduler::Scheduler;
use crate::types::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

impl Deferred {
    /// Create a deferred that fulfills with `value` on the next
    /// scheduler round.
    ///
    /// Settlement is never synchronous: an observer attached right after
    /// construction sees `Pending` and is notified once the scheduler
    /// drains. The value is opaque; nothing resembling a nested deferred
    /// is flattened.
    pub fn resolve(scheduler: &Scheduler, value: Value) -> Result<Deferred> {
        Deferred::new(|settle| {
            scheduler.schedule(move || settle.fulfill(value));
            Ok(())
        })
    }

    /// Create a deferred that rejects with `reason` on the next
    /// scheduler round.
    pub fn reject(scheduler: &Scheduler, reason: Option<Value>) -> Result<Deferred> {
        Deferred::new(|settle| {
            scheduler.schedule(move || settle.reject(reason));
            Ok(())
        })
    }

    /// Aggregate: fulfills with every input's value once all inputs
    /// fulfill.
    ///
    /// Results are collected in settlement order, not input order. The
    /// first rejection to arrive rejects the aggregate; rejections
    /// arriving after that are observed and dropped. Zero inputs yield a
    /// deferred that fulfills with an empty array on the next scheduler
    /// round.
    pub fn all(scheduler: &Scheduler, inputs: Vec<Deferred>) -> Result<Deferred> {
        if inputs.is_empty() {
            return Deferred::resolve(scheduler, Value::Array(Vec::new()));
        }

        let (aggregate, settle) = Deferred::pending();
        let total = inputs.len();
        let values = Rc::new(RefCell::new(Vec::with_capacity(total)));

        for input in &inputs {
            let values = Rc::clone(&values);
            let fulfill_settle = settle.clone();
            let reject_settle = settle.clone();
            let guard = aggregate.clone();

            input.then(
                Some(Box::new(move |value| {
                    let mut collected = values.borrow_mut();
                    collected.push(value);
                    if collected.len() < total {
                        return Ok(Value::Null);
                    }
                    let results = collected.clone();
                    drop(collected);
                    fulfill_settle.fulfill(Value::Array(results))?;
                    Ok(Value::Null)
                })),
                Some(Box::new(move |reason| {
                    if guard.state() == DeferredState::Pending {
                        reject_settle.reject(reason)?;
                    } else {
                        tracing::debug!("Dropping rejection, aggregate already settled");
                    }
                    Ok(Value::Null)
                })),
            )?;
        }

        Ok(aggregate)
    }

    /// Settle with the outcome of whichever input settles first.
    ///
    /// The winning settlement keeps its polarity: a first-arriving
    /// rejection rejects the result. Every later arrival is silently
    /// ignored. Zero inputs is a synchronous usage error, not a rejected
    /// deferred.
    pub fn race(inputs: Vec<Deferred>) -> Result<Deferred> {
        if inputs.is_empty() {
            return Err(VowError::InvalidArgument(
                "race requires at least one input".to_string(),
            ));
        }

        let (winner, settle) = Deferred::pending();
        let settled = Rc::new(Cell::new(false));

        for input in &inputs {
            let fulfill_flag = Rc::clone(&settled);
            let reject_flag = Rc::clone(&settled);
            let fulfill_settle = settle.clone();
            let reject_settle = settle.clone();

            input.then(
                Some(Box::new(move |value| {
                    if !fulfill_flag.get() {
                        fulfill_flag.set(true);
                        fulfill_settle.fulfill(value)?;
                    }
                    Ok(Value::Null)
                })),
                Some(Box::new(move |reason| {
                    if !reject_flag.get() {
                        reject_flag.set(true);
                        reject_settle.reject(reason)?;
                    }
                    Ok(Value::Null)
                })),
            )?;
        }

        Ok(winner)
    }
}
