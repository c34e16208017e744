//! Error types for the routing engine.

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors that can occur while resolving or running a navigation.
///
/// Navigation cancellation is not an error: a vetoed navigation completes
/// with [`NavigationOutcome::Cancelled`](crate::NavigationOutcome::Cancelled).
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No configured route or component resolves an instruction.
    #[error("{message}")]
    UnknownRoute { route: String, message: String },

    /// The match loop gave up with instructions still unmatched.
    #[error("Unresolved instructions after {iterations} iterations: {remaining}")]
    UnresolvedInstructions { remaining: String, iterations: usize },

    /// Sibling instructions were requested with direct routing disabled.
    #[error("No way to process sibling viewport routes with direct routing disabled: {0}!")]
    SiblingRoutingConflict(String),

    /// A component name has no registered component type.
    #[error("Unknown component '{0}'")]
    UnknownComponent(String),

    /// A lazily resolved component failed to resolve.
    #[error("Failed to resolve component '{component}': {message}")]
    ComponentResolution { component: String, message: String },

    /// A before-navigation hook failed.
    #[error("Navigation hook failed: {0}")]
    Hook(String),

    /// A component lifecycle method failed.
    #[error("Lifecycle '{phase}' failed for endpoint '{endpoint}': {message}")]
    Lifecycle {
        endpoint: String,
        phase: String,
        message: String,
    },

    /// Redirects did not settle within the configured limit.
    #[error("Too many redirects resolving '{path}' (limit {limit})")]
    RedirectLoop { path: String, limit: usize },

    /// An instruction string could not be parsed.
    #[error("Invalid instruction '{instruction}': {message}")]
    InvalidInstruction { instruction: String, message: String },

    /// A scope id does not refer to a live routing scope.
    #[error("Invalid routing scope")]
    InvalidScope,

    /// An endpoint id does not refer to a live endpoint.
    #[error("Invalid endpoint")]
    InvalidEndpoint,

    /// Router or route configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RouterError {
    /// Create an unknown route error with its display message.
    pub fn unknown_route(route: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnknownRoute {
            route: route.into(),
            message: message.into(),
        }
    }

    /// Create an unresolved instructions error.
    pub fn unresolved(remaining: impl Into<String>, iterations: usize) -> Self {
        Self::UnresolvedInstructions {
            remaining: remaining.into(),
            iterations,
        }
    }

    /// Create a component resolution error.
    pub fn resolution(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComponentResolution {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a lifecycle error.
    pub fn lifecycle(
        endpoint: impl Into<String>,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Lifecycle {
            endpoint: endpoint.into(),
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Create an invalid instruction error.
    pub fn invalid_instruction(instruction: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInstruction {
            instruction: instruction.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<toml::de::Error> for RouterError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
