//! Navigations and their outcomes.

use crate::tree::EndpointId;

/// A navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// The instruction text the navigation was requested with.
    pub instruction: String,
    /// Monotonic navigation counter.
    pub timestamp: u64,
    /// Whether the navigation loads the endpoints' default components on
    /// startup.
    pub is_startup: bool,
}

impl Navigation {
    /// A navigation for `instruction`.
    pub fn new(instruction: impl Into<String>, timestamp: u64) -> Self {
        Self {
            instruction: instruction.into(),
            timestamp,
            is_startup: false,
        }
    }
}

/// How a navigation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Every transition ran.
    Completed,
    /// A hook or a component vetoed the navigation and it was rolled back.
    Cancelled,
}

/// The result of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResult {
    /// How the navigation ended.
    pub outcome: NavigationOutcome,
    /// Endpoints whose content changed, empty when cancelled.
    pub changed_endpoints: Vec<EndpointId>,
    /// The state instruction after the navigation.
    pub path: String,
}

impl NavigationResult {
    /// Whether the navigation completed.
    pub fn is_completed(&self) -> bool {
        self.outcome == NavigationOutcome::Completed
    }

    /// Whether the navigation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.outcome == NavigationOutcome::Cancelled
    }
}
