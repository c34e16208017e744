//! Navigation endpoints and their contents.
//!
//! An endpoint is a named place components are loaded into. A
//! [`Viewport`](EndpointKind::Viewport) hosts one component at a time, a
//! [`ViewportScope`](EndpointKind::ViewportScope) only opens a scope that
//! further endpoints live in.
//!
//! Every endpoint always has an active [`EndpointContent`], which is empty
//! until something is loaded. A navigation stages a next content and the
//! coordinator swaps it in, keeping the previous one until the navigation is
//! finalized so that a cancelled navigation can restore it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentType, RoutableComponent};
use crate::instruction::RoutingInstruction;
use crate::navigation::Navigation;
use crate::route::Route;
use crate::tree::{ContentId, EndpointId, ScopeId};

/// The kind of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    /// Hosts a component.
    Viewport,
    /// Opens a named scope without hosting a component.
    ViewportScope,
}

/// What a navigation does to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionAction {
    /// Nothing staged.
    #[default]
    None,
    /// The endpoint keeps its content.
    Skip,
    /// The content is loaded again, keeping its instance and scope.
    Reload,
    /// The content is replaced.
    Swap,
}

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOptions {
    /// Instruction text loaded when nothing else targets the endpoint.
    pub default: Option<String>,
    /// Components the endpoint accepts. Empty accepts all; `*` as well.
    pub used_by: Vec<String>,
    /// Component loaded when a name resolves to nothing.
    pub fallback: Option<String>,
    /// Whether loaded contents open their own scope.
    pub scope: bool,
    /// Always name the endpoint in state instructions.
    pub force_description: bool,
    /// Hoist the endpoint's children into the parent scope when matching.
    pub pass_through: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            default: None,
            used_by: Vec::new(),
            fallback: None,
            scope: true,
            force_description: false,
            pass_through: false,
        }
    }
}

impl EndpointOptions {
    /// Set the default instruction.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Restrict the accepted components.
    pub fn with_used_by<I, S>(mut self, used_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.used_by = used_by.into_iter().map(Into::into).collect();
        self
    }

    /// Set the fallback component.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Whether contents open their own scope.
    pub fn with_scope(mut self, scope: bool) -> Self {
        self.scope = scope;
        self
    }

    /// Always name the endpoint in state instructions.
    pub fn with_force_description(mut self, force: bool) -> Self {
        self.force_description = force;
        self
    }

    /// Make the endpoint transparent for matching.
    pub fn with_pass_through(mut self, pass_through: bool) -> Self {
        self.pass_through = pass_through;
        self
    }
}

/// An endpoint a component type hosts once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDeclaration {
    /// Endpoint kind.
    pub kind: EndpointKind,
    /// Endpoint name.
    pub name: String,
    /// Endpoint options.
    #[serde(default)]
    pub options: EndpointOptions,
}

impl EndpointDeclaration {
    /// Declare a viewport.
    pub fn viewport(name: impl Into<String>, options: EndpointOptions) -> Self {
        Self {
            kind: EndpointKind::Viewport,
            name: name.into(),
            options,
        }
    }

    /// Declare a viewport scope.
    pub fn viewport_scope(name: impl Into<String>, options: EndpointOptions) -> Self {
        Self {
            kind: EndpointKind::ViewportScope,
            name: name.into(),
            options,
        }
    }
}

/// A named navigation target.
#[derive(Debug)]
pub struct Endpoint {
    pub(crate) name: String,
    pub(crate) kind: EndpointKind,
    pub(crate) options: EndpointOptions,
    /// The scope the endpoint was added in.
    pub(crate) owning_scope: ScopeId,
    pub(crate) active: ContentId,
    pub(crate) next: Option<ContentId>,
    pub(crate) previous: Option<ContentId>,
    pub(crate) transition_action: TransitionAction,
    /// Configured routes matched in a viewport scope's own scope.
    pub(crate) routes: Vec<Arc<Route>>,
}

impl Endpoint {
    /// Endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint kind.
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Whether this is a viewport.
    pub fn is_viewport(&self) -> bool {
        self.kind == EndpointKind::Viewport
    }

    /// Whether this is a viewport scope.
    pub fn is_viewport_scope(&self) -> bool {
        self.kind == EndpointKind::ViewportScope
    }

    /// Endpoint options.
    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    /// The scope the endpoint was added in.
    pub fn owning_scope(&self) -> ScopeId {
        self.owning_scope
    }

    /// The active content.
    pub fn active_content(&self) -> ContentId {
        self.active
    }

    /// The staged content, if any.
    pub fn next_content(&self) -> Option<ContentId> {
        self.next
    }

    /// What the current navigation does to the endpoint.
    pub fn transition_action(&self) -> TransitionAction {
        self.transition_action
    }

    /// The staged content if there is one, otherwise the active one.
    pub fn current_content(&self) -> ContentId {
        self.next.unwrap_or(self.active)
    }

    /// Whether the viewport accepts `component`.
    pub fn accepts_component(&self, component: &str) -> bool {
        self.options.used_by.is_empty()
            || self
                .options
                .used_by
                .iter()
                .any(|used_by| used_by == component || used_by == "*")
    }
}

/// One content of an endpoint.
pub struct EndpointContent {
    pub(crate) endpoint: EndpointId,
    /// The scope opened by this content.
    pub(crate) scope: ScopeId,
    pub(crate) instruction: RoutingInstruction,
    pub(crate) component_type: Option<Arc<ComponentType>>,
    pub(crate) instance: Option<Arc<dyn RoutableComponent>>,
    /// Routes matched inside this content's scope.
    pub(crate) routes: Vec<Arc<Route>>,
    pub(crate) navigation: Option<Navigation>,
    pub(crate) is_active: bool,
    pub(crate) timestamp: u64,
}

impl EndpointContent {
    /// The endpoint owning the content.
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// The scope opened by this content.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The instruction that produced the content.
    pub fn instruction(&self) -> &RoutingInstruction {
        &self.instruction
    }

    /// The loaded component type.
    pub fn component_type(&self) -> Option<&Arc<ComponentType>> {
        self.component_type.as_ref()
    }

    /// The component instance.
    pub fn instance(&self) -> Option<&Arc<dyn RoutableComponent>> {
        self.instance.as_ref()
    }

    /// Component name, if the content is not empty.
    pub fn component_name(&self) -> Option<&str> {
        self.instruction.component.name()
    }

    /// Whether nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.instruction.component.is_none()
    }

    /// Whether the content is the endpoint's active one.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Navigation timestamp the content was created at.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl fmt::Debug for EndpointContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointContent")
            .field("scope", &self.scope)
            .field("component", &self.component_name())
            .field("parameters", &self.instruction.parameters)
            .field("has_instance", &self.instance.is_some())
            .field("routes", &self.routes.len())
            .field("is_active", &self.is_active)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
