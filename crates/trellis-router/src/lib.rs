//! Hierarchical router for Trellis.
//!
//! The router resolves navigation instructions against a tree of routing
//! scopes:
//!
//! - **Endpoints**: viewports that host components and viewport scopes that
//!   only open a named scope
//! - **Routing scopes**: one per loaded content, linked both structurally and
//!   by ownership, with pass-through scopes hoisting their children
//! - **Instructions**: `component(params)@viewport/child+sibling` text,
//!   parsed into [`RoutingInstruction`] trees
//! - **Configured routes**: path patterns with parameters, wildcards,
//!   redirects and child routes, recognized by [`RouteRecognizer`]
//! - **Coordinated transitions**: every endpoint of a navigation passes the
//!   `can_unload`, `can_load`, unload, load and activate phases together;
//!   a veto rolls the whole navigation back
//!
//! # Example
//!
//! ```
//! # fn block_on(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! # block_on(async {
//! use trellis_router::{ComponentType, EndpointOptions, RouteConfig, Router, RouterOptions};
//!
//! let router = Router::with_routes(
//!     RouterOptions::default(),
//!     vec![RouteConfig::new("users/:id", "user")],
//! )
//! .unwrap();
//! router.register_component(ComponentType::plain("user"));
//! router.add_viewport(router.root_scope(), "main", EndpointOptions::default()).unwrap();
//!
//! let result = router.load("users/42").await.unwrap();
//! assert!(result.is_completed());
//! assert_eq!(router.active_instruction(), "user(id=42)");
//! # });
//! ```

pub mod component;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod endpoint_matcher;
mod error;
pub mod hooks;
pub mod instruction;
pub mod logging;
pub mod navigation;
pub mod parameters;
mod processing;
pub mod recognizer;
pub mod route;
mod router;
pub mod routing_scope;
mod transition;
pub mod tree;

pub use component::{
    ComponentRef, ComponentRegistry, ComponentType, LifecycleContext, ReentryBehavior,
    RoutableComponent,
};
pub use config::{RouterOptions, Separators};
pub use coordinator::{NavigationCoordinator, SyncState, SyncWait};
pub use endpoint::{
    Endpoint, EndpointContent, EndpointDeclaration, EndpointKind, EndpointOptions,
    TransitionAction,
};
pub use endpoint_matcher::{EndpointMatcher, MatchEndpointsResult};
pub use error::{Result, RouterError};
pub use hooks::{BeforeNavigationHook, HookId, HookResult, RoutingHooks};
pub use instruction::{InstructionEndpoint, RoutingInstruction};
pub use logging::{PerfSpan, RoutingTreeDebug, TreeFormatOptions, TreeStyle, TreeView};
pub use navigation::{Navigation, NavigationOutcome, NavigationResult};
pub use parameters::{Parameter, Parameters};
pub use recognizer::{RecognizedRoute, RouteRecognizer};
pub use route::{FoundRoute, Route, RouteConfig, RoutePath, RouteTable};
pub use router::Router;
pub use routing_scope::{RoutingScope, ScopeOrigin};
pub use tree::{ContentId, EndpointId, RoutingTree, ScopeId, ROOT_SCOPE_NAME};

static_assertions::assert_impl_all!(Router: Send, Sync, Clone);
static_assertions::assert_impl_all!(NavigationCoordinator: Send, Sync);
static_assertions::assert_impl_all!(RoutingInstruction: Send, Sync);
