//! Trellis: hierarchical routing over observable state.
//!
//! This crate bundles the Trellis crates behind one dependency:
//!
//! - [`observation`]: observable objects and collections, subscriber records
//!   and connectable bindings (`trellis-core`)
//! - the router: routing scopes, endpoints, instructions, configured routes
//!   and coordinated transitions (`trellis-router`, re-exported at the root)
//!
//! Most applications only need the [`prelude`]:
//!
//! ```
//! use trellis::prelude::*;
//!
//! let router = Router::new(RouterOptions::default());
//! router.register_component(ComponentType::plain("home"));
//! router.add_viewport(router.root_scope(), "main", EndpointOptions::default()).unwrap();
//! assert_eq!(router.active_instruction(), "");
//! ```

pub use trellis_core as observation;
pub use trellis_router::*;

pub mod prelude;
