//! Caller identity for cross-loader operations.
//!
//! Privileged operations such as merging loaders check who they run on
//! behalf of. The identity is passed explicitly or installed for the current
//! thread with [`CallerContext::enter`]; it is never inferred from the stack.

use std::cell::RefCell;

use crate::types::{CooperationKey, SecurityLevel};

/// Identity of the code requesting an operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallerContext {
    /// The launcher itself.
    #[default]
    System,
    /// Code running inside a launched application.
    Application {
        /// The application's cooperation key.
        key: CooperationKey,
        /// The application's effective level.
        level: SecurityLevel,
    },
}

thread_local! {
    static CURRENT: RefCell<Vec<CallerContext>> = const { RefCell::new(Vec::new()) };
}

impl CallerContext {
    /// Context for an application at `level`.
    #[must_use]
    pub fn application(key: CooperationKey, level: SecurityLevel) -> Self {
        Self::Application { key, level }
    }

    /// Whether this caller may perform cross-loader operations.
    #[must_use]
    pub fn is_fully_trusted(&self) -> bool {
        match self {
            Self::System => true,
            Self::Application { level, .. } => *level == SecurityLevel::Full,
        }
    }

    /// The context installed on this thread, or [`CallerContext::System`].
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Install this context for the current thread until the guard drops.
    #[must_use = "the context is removed when the guard is dropped"]
    pub fn enter(self) -> ContextGuard {
        CURRENT.with(|stack| stack.borrow_mut().push(self));
        ContextGuard { _private: () }
    }
}

/// Restores the previous thread context on drop.
#[derive(Debug)]
pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
