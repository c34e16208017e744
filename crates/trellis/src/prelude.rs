//! Prelude module for Trellis.
//!
//! ```ignore
//! use trellis::prelude::*;
//! ```
//!
//! This provides access to:
//! - The router and its options (`Router`, `RouterOptions`)
//! - Endpoint declarations (`EndpointOptions`, `EndpointDeclaration`)
//! - Components and their lifecycle (`ComponentType`, `RoutableComponent`)
//! - Configured routes (`RouteConfig`, `RouteTable`)
//! - Observable router state (`ObservableObject`, `PropertyBinding`)

// ============================================================================
// Router
// ============================================================================

pub use trellis_router::{NavigationOutcome, NavigationResult, Router, RouterError, RouterOptions};

// ============================================================================
// Endpoints and Scopes
// ============================================================================

pub use trellis_router::{EndpointDeclaration, EndpointId, EndpointKind, EndpointOptions, ScopeId};

// ============================================================================
// Components
// ============================================================================

pub use trellis_router::{ComponentType, LifecycleContext, ReentryBehavior, RoutableComponent};

// ============================================================================
// Instructions, Routes and Hooks
// ============================================================================

pub use trellis_router::{HookResult, RouteConfig, RouteTable, RoutingInstruction};

// ============================================================================
// Observation
// ============================================================================

pub use trellis_core::{batch, Connectable, LifecycleFlags, ObservableObject, PropertyBinding};
