use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{CoreError, CoreResult};

/// Error returned when a wait is abandoned through a [`CancellationToken`].
///
/// Cancellable waits such as
/// [`TimerScheduler::wait_async`](crate::timer::TimerScheduler::wait_async)
/// resolve with this error when their token fires first. Callers can
/// propagate it with `?` to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("task cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Handle of an action registered on a [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(u64);

type Action = Box<dyn FnOnce()>;

struct TokenState {
    /// `None` once cancelled.
    actions: Option<Vec<(ActionId, Action)>>,
    next_id: u64,
}

/// Token that runs registered cleanup actions when cancelled.
///
/// Cloning a token creates another handle to the same state. Cancelling
/// runs every registered action synchronously, in registration order,
/// exactly once. A token cannot be reset; cancelling it again is an error.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use moye_core::compute::CancellationToken;
///
/// let token = CancellationToken::new();
/// let fired = Rc::new(Cell::new(false));
///
/// let flag = Rc::clone(&fired);
/// token.add(move || flag.set(true)).unwrap();
///
/// token.cancel().unwrap();
/// assert!(fired.get());
/// assert!(token.cancel().is_err());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Rc<RefCell<TokenState>>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TokenState {
                actions: Some(Vec::new()),
                next_id: 0,
            })),
        }
    }

    /// Registers an action to run on cancellation.
    ///
    /// Fails with [`CoreError::AlreadyCancelled`] if the token has fired.
    pub fn add(&self, action: impl FnOnce() + 'static) -> CoreResult<ActionId> {
        let mut state = self.inner.borrow_mut();
        let id = ActionId(state.next_id);
        let Some(actions) = state.actions.as_mut() else {
            return Err(CoreError::AlreadyCancelled);
        };
        actions.push((id, Box::new(action)));
        state.next_id += 1;
        Ok(id)
    }

    /// Unregisters an action. Unknown ids and cancelled tokens are ignored.
    pub fn remove(&self, id: ActionId) {
        if let Some(actions) = self.inner.borrow_mut().actions.as_mut() {
            actions.retain(|(action_id, _)| *action_id != id);
        }
    }

    /// Runs and clears every registered action.
    pub fn cancel(&self) -> CoreResult {
        let actions = self.inner.borrow_mut().actions.take();
        let Some(actions) = actions else {
            log::error!("cancellation token cancelled twice");
            return Err(CoreError::AlreadyCancelled);
        };
        // Actions run outside the borrow: they may touch the token again.
        for (_, action) in actions {
            action();
        }
        Ok(())
    }

    /// Returns whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().actions.is_none()
    }

    /// Number of actions waiting for cancellation.
    pub fn action_count(&self) -> usize {
        self.inner.borrow().actions.as_ref().map_or(0, Vec::len)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("actions", &self.action_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn actions_run_once_in_order() {
        let token = CancellationToken::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            token.add(move || log.borrow_mut().push(i)).unwrap();
        }

        token.cancel().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(token.is_cancelled());
        assert_eq!(token.action_count(), 0);
    }

    #[test]
    fn removed_action_does_not_run() {
        let token = CancellationToken::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let id = token.add(move || h.set(h.get() + 1)).unwrap();
        token.remove(id);

        token.cancel().unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn double_cancel_is_an_error() {
        let token = CancellationToken::new();
        token.cancel().unwrap();
        assert_eq!(token.cancel(), Err(CoreError::AlreadyCancelled));
    }

    #[test]
    fn add_after_cancel_is_rejected() {
        let token = CancellationToken::new();
        token.cancel().unwrap();
        assert_eq!(token.add(|| {}), Err(CoreError::AlreadyCancelled));
    }

    #[test]
    fn clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();
        assert!(!token1.is_cancelled());

        token2.cancel().unwrap();
        assert!(token1.is_cancelled());
    }

    #[test]
    fn action_may_inspect_its_token() {
        let token = CancellationToken::new();
        let seen = Rc::new(Cell::new(false));
        let (t, s) = (token.clone(), Rc::clone(&seen));
        token.add(move || s.set(t.is_cancelled())).unwrap();

        token.cancel().unwrap();
        assert!(seen.get());
    }
}
