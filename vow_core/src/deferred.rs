//! The deferred settlement state machine

use crate::error::{Result, VowError};
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Observer invoked with the fulfillment value.
///
/// Its return value becomes the fulfillment value of the downstream
/// deferred produced by [`Deferred::then`].
pub type FulfillHandler = Box<dyn FnOnce(Value) -> Result<Value>>;

/// Observer invoked with the rejection reason, if one was recorded.
///
/// Returning normally switches the chain back to the fulfilled path: the
/// returned value fulfills the downstream deferred.
pub type RejectHandler = Box<dyn FnOnce(Option<Value>) -> Result<Value>>;

/// Settlement state of a deferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
}

/// Observer callbacks plus the settle handle of the downstream deferred
/// produced by `then`
struct Continuation {
    on_fulfilled: Option<FulfillHandler>,
    on_rejected: Option<RejectHandler>,
    downstream: Settle,
}

struct Inner {
    state: DeferredState,
    fulfilled_value: Option<Value>,
    reject_reason: Option<Value>,
    continuation: Option<Continuation>,
}

/// Single-assignment container for an eventual value or failure reason.
///
/// A deferred starts `Pending` and settles exactly once through its
/// [`Settle`] handle. Cloning yields another handle to the same
/// instance; all handles observe the same state.
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<RefCell<Inner>>,
}

/// Settlement capability for one deferred.
///
/// Handed to executors by [`Deferred::new`] and held by continuations to
/// settle the downstream. The two channels are deliberately asymmetric:
/// fulfilling a settled instance silently poisons it to `Rejected`,
/// while rejecting one is a fatal usage error.
#[derive(Clone)]
pub struct Settle {
    inner: Rc<RefCell<Inner>>,
}

impl Deferred {
    /// Create an unsettled deferred together with its settle handle
    pub fn pending() -> (Deferred, Settle) {
        let inner = Rc::new(RefCell::new(Inner {
            state: DeferredState::Pending,
            fulfilled_value: None,
            reject_reason: None,
            continuation: None,
        }));
        let deferred = Deferred {
            inner: Rc::clone(&inner),
        };
        (deferred, Settle { inner })
    }

    /// Create a deferred and run `executor` synchronously with its settle
    /// handle.
    ///
    /// An executor failure is discarded and the deferred is rejected
    /// without a reason. An executor that settles first and then fails
    /// surfaces [`VowError::DoubleSettlement`] instead, since the
    /// fallback rejection finds the instance already settled.
    pub fn new<E>(executor: E) -> Result<Deferred>
    where
        E: FnOnce(Settle) -> Result<()>,
    {
        let (deferred, settle) = Deferred::pending();
        if let Err(failure) = executor(settle) {
            tracing::debug!("Executor failed, rejecting without reason: {}", failure);
            deferred.settle_handle().reject(None)?;
        }
        Ok(deferred)
    }

    /// Current settlement state
    pub fn state(&self) -> DeferredState {
        self.inner.borrow().state
    }

    /// Register observers for the eventual settlement.
    ///
    /// Returns a new deferred settled by whichever observer matches the
    /// outcome of the receiver. A missing handler passes the value or
    /// reason through to the downstream unchanged, so `then(None, None)`
    /// is a transparent link in a chain.
    ///
    /// At most one continuation is held per instance; calling `then`
    /// again replaces the previous registration and its downstream is
    /// abandoned. Consumers needing fan-out must chain through the
    /// returned deferred instead.
    ///
    /// If the receiver is already settled, delivery runs synchronously
    /// within this call; otherwise it runs inside the eventual settling
    /// call. An observer error propagates out of whichever call
    /// triggered delivery and leaves the downstream permanently pending.
    pub fn then(
        &self,
        on_fulfilled: Option<FulfillHandler>,
        on_rejected: Option<RejectHandler>,
    ) -> Result<Deferred> {
        let (downstream, downstream_settle) = Deferred::pending();
        self.inner.borrow_mut().continuation = Some(Continuation {
            on_fulfilled,
            on_rejected,
            downstream: downstream_settle,
        });

        match self.state() {
            DeferredState::Fulfilled => self.settle_handle().deliver_fulfillment()?,
            DeferredState::Rejected => self.settle_handle().deliver_rejection()?,
            DeferredState::Pending => {}
        }

        Ok(downstream)
    }

    fn settle_handle(&self) -> Settle {
        Settle {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .finish()
    }
}

impl Settle {
    /// Settle as fulfilled.
    ///
    /// Fulfilling an already-settled deferred does not fail loudly: the
    /// instance is poisoned to `Rejected` with no reason recorded and no
    /// observer is signaled.
    pub fn fulfill(&self, value: Value) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != DeferredState::Pending {
                tracing::warn!("Fulfilling a settled deferred, poisoning to rejected");
                inner.state = DeferredState::Rejected;
                return Ok(());
            }
            inner.state = DeferredState::Fulfilled;
            inner.fulfilled_value = Some(value);
        }
        tracing::debug!("Deferred fulfilled");
        self.deliver_fulfillment()
    }

    /// Settle as rejected, with or without a reason.
    ///
    /// Rejecting an already-settled deferred is a fatal usage error.
    pub fn reject(&self, reason: Option<Value>) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != DeferredState::Pending {
                return Err(VowError::DoubleSettlement);
            }
            inner.state = DeferredState::Rejected;
            inner.reject_reason = reason;
        }
        tracing::debug!("Deferred rejected");
        self.deliver_rejection()
    }

    // Delivery consumes the continuation. The borrow ends before any
    // observer runs: observers may re-enter `then` or settle the
    // downstream, which shares no borrow with the receiver.
    fn deliver_fulfillment(&self) -> Result<()> {
        let (continuation, value) = {
            let mut inner = self.inner.borrow_mut();
            match inner.continuation.take() {
                Some(continuation) => {
                    let value = inner.fulfilled_value.clone().unwrap_or(Value::Null);
                    (continuation, value)
                }
                None => return Ok(()),
            }
        };

        match continuation.on_fulfilled {
            Some(handler) => {
                let value = handler(value)?;
                continuation.downstream.fulfill(value)
            }
            None => continuation.downstream.fulfill(value),
        }
    }

    fn deliver_rejection(&self) -> Result<()> {
        let (continuation, reason) = {
            let mut inner = self.inner.borrow_mut();
            match inner.continuation.take() {
                Some(continuation) => (continuation, inner.reject_reason.clone()),
                None => return Ok(()),
            }
        };

        match continuation.on_rejected {
            Some(handler) => {
                let value = handler(reason)?;
                continuation.downstream.fulfill(value)
            }
            None => continuation.downstream.reject(reason),
        }
    }
}

impl fmt::Debug for Settle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("state", &self.inner.borrow().state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn record_value(deferred: &Deferred) -> Rc<RefCell<Option<Value>>> {
        let observed = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&observed);
        deferred
            .then(
                Some(Box::new(move |value| {
                    *slot.borrow_mut() = Some(value.clone());
                    Ok(value)
                })),
                None,
            )
            .unwrap();
        observed
    }

    fn record_reason(deferred: &Deferred) -> Rc<RefCell<Option<Option<Value>>>> {
        let observed = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&observed);
        deferred
            .then(
                None,
                Some(Box::new(move |reason| {
                    *slot.borrow_mut() = Some(reason);
                    Ok(Value::Null)
                })),
            )
            .unwrap();
        observed
    }

    #[test]
    fn test_runs_executor_once_when_constructed() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        Deferred::new(move |_settle| {
            counter.set(counter.get() + 1);
            Ok(())
        })
        .unwrap();

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_starts_in_pending_state() {
        let deferred = Deferred::new(|_settle| Ok(())).unwrap();
        assert_eq!(deferred.state(), DeferredState::Pending);
    }

    #[test]
    fn test_fulfilled_when_executor_settles() {
        let deferred = Deferred::new(|settle| settle.fulfill(Value::Int(5))).unwrap();
        assert_eq!(deferred.state(), DeferredState::Fulfilled);
    }

    #[test]
    fn test_rejected_when_executor_rejects() {
        let deferred = Deferred::new(|settle| settle.reject(Some(Value::from("nope")))).unwrap();
        assert_eq!(deferred.state(), DeferredState::Rejected);
    }

    #[test]
    fn test_rejected_without_reason_when_executor_fails() {
        let deferred =
            Deferred::new(|_settle| Err(VowError::ExecutorFailed("broken".to_string()))).unwrap();
        assert_eq!(deferred.state(), DeferredState::Rejected);

        let observed = record_reason(&deferred);
        assert_eq!(*observed.borrow(), Some(None));
    }

    #[test]
    fn test_double_fulfill_poisons_to_rejected() {
        let deferred = Deferred::new(|settle| {
            settle.fulfill(Value::Int(1))?;
            settle.fulfill(Value::Int(2))
        })
        .unwrap();

        assert_eq!(deferred.state(), DeferredState::Rejected);
    }

    #[test]
    fn test_double_reject_is_fatal() {
        let (_deferred, settle) = Deferred::pending();
        settle.reject(None).unwrap();

        assert!(matches!(
            settle.reject(None),
            Err(VowError::DoubleSettlement)
        ));
    }

    #[test]
    fn test_executor_failure_after_settlement_is_fatal() {
        let result = Deferred::new(|settle| {
            settle.fulfill(Value::Int(1))?;
            Err(VowError::ExecutorFailed("late failure".to_string()))
        });

        assert!(matches!(result, Err(VowError::DoubleSettlement)));
    }

    #[test]
    fn test_then_on_fulfilled_delivers_synchronously() {
        let deferred = Deferred::new(|settle| settle.fulfill(Value::Int(5))).unwrap();

        let observed = record_value(&deferred);
        assert_eq!(*observed.borrow(), Some(Value::Int(5)));
    }

    #[test]
    fn test_then_before_settlement_delivers_on_fulfill() {
        let (deferred, settle) = Deferred::pending();
        let observed = record_value(&deferred);
        assert!(observed.borrow().is_none());

        settle.fulfill(Value::Int(15)).unwrap();
        assert_eq!(*observed.borrow(), Some(Value::Int(15)));
    }

    #[test]
    fn test_then_on_rejected_delivers_synchronously() {
        let deferred = Deferred::new(|settle| settle.reject(Some(Value::from("message")))).unwrap();

        let observed = record_reason(&deferred);
        assert_eq!(*observed.borrow(), Some(Some(Value::from("message"))));
    }

    #[test]
    fn test_then_before_settlement_delivers_on_reject() {
        let (deferred, settle) = Deferred::pending();
        let observed = record_reason(&deferred);
        assert!(observed.borrow().is_none());

        settle.reject(Some(Value::from("async message"))).unwrap();
        assert_eq!(*observed.borrow(), Some(Some(Value::from("async message"))));
    }

    #[test]
    fn test_chains_fulfillment_handlers() {
        let deferred = Deferred::new(|settle| settle.fulfill(Value::Int(31))).unwrap();
        let chained = deferred
            .then(Some(Box::new(|_value| Ok(Value::from("message")))), None)
            .unwrap();

        let observed = record_value(&chained);
        assert_eq!(*observed.borrow(), Some(Value::from("message")));
    }

    #[test]
    fn test_passes_value_through_without_handler() {
        let deferred = Deferred::new(|settle| settle.fulfill(Value::Int(42))).unwrap();
        let passthrough = deferred.then(None, None).unwrap();

        let observed = record_value(&passthrough);
        assert_eq!(*observed.borrow(), Some(Value::Int(42)));
    }

    #[test]
    fn test_rejection_handler_switches_to_fulfilled_path() {
        let deferred = Deferred::new(|settle| settle.reject(Some(Value::from("reason 1")))).unwrap();
        let recovered = deferred
            .then(None, Some(Box::new(|_reason| Ok(Value::Int(62)))))
            .unwrap();

        assert_eq!(recovered.state(), DeferredState::Fulfilled);
        let observed = record_value(&recovered);
        assert_eq!(*observed.borrow(), Some(Value::Int(62)));
    }

    #[test]
    fn test_passes_reason_through_without_handler() {
        let deferred = Deferred::new(|settle| settle.reject(Some(Value::from("my reason")))).unwrap();
        let passthrough = deferred.then(None, None).unwrap();

        assert_eq!(passthrough.state(), DeferredState::Rejected);
        let observed = record_reason(&passthrough);
        assert_eq!(*observed.borrow(), Some(Some(Value::from("my reason"))));
    }

    #[test]
    fn test_second_then_replaces_continuation() {
        let (deferred, settle) = Deferred::pending();

        let abandoned = Rc::new(Cell::new(false));
        let flag = Rc::clone(&abandoned);
        deferred
            .then(
                Some(Box::new(move |value| {
                    flag.set(true);
                    Ok(value)
                })),
                None,
            )
            .unwrap();

        let observed = record_value(&deferred);
        settle.fulfill(Value::Int(7)).unwrap();

        assert!(!abandoned.get());
        assert_eq!(*observed.borrow(), Some(Value::Int(7)));
    }

    #[test]
    fn test_observer_error_propagates_from_settlement() {
        let (deferred, settle) = Deferred::pending();
        let downstream = deferred
            .then(
                Some(Box::new(|_value| {
                    Err(VowError::ObserverFailed("observer blew up".to_string()))
                })),
                None,
            )
            .unwrap();

        assert!(settle.fulfill(Value::Int(1)).is_err());
        assert_eq!(downstream.state(), DeferredState::Pending);
    }

    #[test]
    fn test_observer_error_propagates_from_then() {
        let deferred = Deferred::new(|settle| settle.fulfill(Value::Int(1))).unwrap();
        let result = deferred.then(
            Some(Box::new(|_value| {
                Err(VowError::ObserverFailed("observer blew up".to_string()))
            })),
            None,
        );

        assert!(result.is_err());
    }
}
