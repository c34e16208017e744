//! Arena storage for scopes, endpoints and endpoint contents.
//!
//! The tree owns three slot maps and hands out stable ids. The root is a
//! viewport scope named `rootScope` whose content opens the root routing
//! scope, which owns itself. Scope sequence numbers come from a counter
//! owned by the tree.

use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::component::{ComponentType, ReentryBehavior, RoutableComponent};
use crate::config::Separators;
use crate::endpoint::{Endpoint, EndpointContent, EndpointKind, EndpointOptions, TransitionAction};
use crate::error::{Result, RouterError};
use crate::instruction::RoutingInstruction;
use crate::logging::targets;
use crate::navigation::Navigation;
use crate::parameters::Parameters;
use crate::route::Route;
use crate::routing_scope::RoutingScope;

new_key_type! {
    /// Identifies a routing scope.
    pub struct ScopeId;

    /// Identifies an endpoint.
    pub struct EndpointId;

    /// Identifies an endpoint content.
    pub struct ContentId;
}

/// Name of the root viewport scope.
pub const ROOT_SCOPE_NAME: &str = "rootScope";

/// Scopes, endpoints and contents of one router.
#[derive(Debug)]
pub struct RoutingTree {
    pub(crate) scopes: SlotMap<ScopeId, RoutingScope>,
    pub(crate) endpoints: SlotMap<EndpointId, Endpoint>,
    pub(crate) contents: SlotMap<ContentId, EndpointContent>,
    next_scope_number: u64,
    root: ScopeId,
    root_endpoint: EndpointId,
}

impl RoutingTree {
    /// A tree with only the root, matching `routes` at the top level.
    pub fn new(routes: Vec<Arc<Route>>) -> Self {
        let mut scopes: SlotMap<ScopeId, RoutingScope> = SlotMap::with_key();
        let mut endpoints: SlotMap<EndpointId, Endpoint> = SlotMap::with_key();
        let mut contents: SlotMap<ContentId, EndpointContent> = SlotMap::with_key();

        let root = scopes.insert_with_key(|key| RoutingScope {
            number: 0,
            has_scope: true,
            owning_scope: key,
            parent: None,
            children: Vec::new(),
            content: None,
        });
        let root_endpoint = endpoints.insert(Endpoint {
            name: ROOT_SCOPE_NAME.to_string(),
            kind: EndpointKind::ViewportScope,
            options: EndpointOptions::default(),
            owning_scope: root,
            active: ContentId::default(),
            next: None,
            previous: None,
            transition_action: TransitionAction::None,
            routes,
        });
        let content = contents.insert(EndpointContent {
            endpoint: root_endpoint,
            scope: root,
            instruction: RoutingInstruction::default(),
            component_type: None,
            instance: None,
            routes: Vec::new(),
            navigation: None,
            is_active: true,
            timestamp: 0,
        });
        if let Some(endpoint) = endpoints.get_mut(root_endpoint) {
            endpoint.active = content;
        }
        if let Some(scope) = scopes.get_mut(root) {
            scope.content = Some(content);
        }

        Self {
            scopes,
            endpoints,
            contents,
            next_scope_number: 1,
            root,
            root_endpoint,
        }
    }

    /// The root routing scope.
    pub fn root(&self) -> ScopeId {
        self.root
    }

    /// The root viewport scope.
    pub fn root_endpoint(&self) -> EndpointId {
        self.root_endpoint
    }

    /// Number of live scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Number of live endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Look up a scope.
    pub fn scope(&self, id: ScopeId) -> Result<&RoutingScope> {
        self.scopes.get(id).ok_or(RouterError::InvalidScope)
    }

    fn scope_mut(&mut self, id: ScopeId) -> Result<&mut RoutingScope> {
        self.scopes.get_mut(id).ok_or(RouterError::InvalidScope)
    }

    /// Look up an endpoint.
    pub fn endpoint(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints.get(id).ok_or(RouterError::InvalidEndpoint)
    }

    fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint> {
        self.endpoints.get_mut(id).ok_or(RouterError::InvalidEndpoint)
    }

    /// Look up an endpoint content.
    pub fn content(&self, id: ContentId) -> Result<&EndpointContent> {
        self.contents.get(id).ok_or(RouterError::InvalidEndpoint)
    }

    fn content_mut(&mut self, id: ContentId) -> Result<&mut EndpointContent> {
        self.contents.get_mut(id).ok_or(RouterError::InvalidEndpoint)
    }

    /// Find an endpoint by name among the endpoints owned by `scope`.
    pub fn find_endpoint(&self, scope: ScopeId, name: &str) -> Option<EndpointId> {
        self.owned_endpoints(scope)
            .into_iter()
            .find(|endpoint| self.endpoints.get(*endpoint).is_some_and(|e| e.name == name))
    }

    /// The scope nested instructions of `endpoint` resolve in.
    pub fn endpoint_scope(&self, endpoint: EndpointId) -> Result<ScopeId> {
        let endpoint = self.endpoint(endpoint)?;
        let content = self.content(endpoint.current_content())?;
        Ok(self.scope_of(content.scope))
    }

    /// Name of the component loaded in the endpoint's active content.
    pub fn active_component(&self, endpoint: EndpointId) -> Option<&str> {
        let endpoint = self.endpoints.get(endpoint)?;
        self.contents.get(endpoint.active)?.component_name()
    }

    fn new_scope(
        &mut self,
        has_scope: bool,
        owning_scope: ScopeId,
        parent: Option<ScopeId>,
    ) -> ScopeId {
        let number = self.next_scope_number;
        self.next_scope_number += 1;
        self.scopes.insert(RoutingScope {
            number,
            has_scope,
            owning_scope,
            parent,
            children: Vec::new(),
            content: None,
        })
    }

    /// Add an endpoint to `parent`. An endpoint of the same kind and name
    /// already there is returned instead.
    pub fn add_endpoint(
        &mut self,
        parent: ScopeId,
        kind: EndpointKind,
        name: &str,
        options: EndpointOptions,
        routes: Vec<Arc<Route>>,
    ) -> Result<EndpointId> {
        let existing = self.scope(parent)?.children.iter().find_map(|child| {
            self.scope_endpoint(*child).filter(|id| {
                self.endpoints
                    .get(*id)
                    .is_some_and(|e| e.kind == kind && e.name == name)
            })
        });
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let owning = self.scope_of(parent);
        let has_scope = options.scope;
        let endpoint = self.endpoints.insert(Endpoint {
            name: name.to_string(),
            kind,
            options,
            owning_scope: parent,
            active: ContentId::default(),
            next: None,
            previous: None,
            transition_action: TransitionAction::None,
            routes,
        });
        let scope = self.new_scope(has_scope, owning, Some(parent));
        let content = self.contents.insert(EndpointContent {
            endpoint,
            scope,
            instruction: RoutingInstruction::default(),
            component_type: None,
            instance: None,
            routes: Vec::new(),
            navigation: None,
            is_active: true,
            timestamp: 0,
        });
        self.endpoint_mut(endpoint)?.active = content;
        self.scope_mut(scope)?.content = Some(content);
        self.add_child(parent, scope, None)?;

        tracing::debug!(
            target: targets::SCOPE,
            endpoint = name,
            ?kind,
            parent = %self.scope_label(parent),
            "added endpoint"
        );
        Ok(endpoint)
    }

    /// Remove an endpoint with every scope below it.
    pub fn remove_endpoint(&mut self, endpoint: EndpointId) -> Result<()> {
        if endpoint == self.root_endpoint {
            return Err(RouterError::config("the root endpoint cannot be removed"));
        }
        let (name, contents) = {
            let e = self.endpoint(endpoint)?;
            let contents: Vec<ContentId> = [Some(e.active), e.next, e.previous]
                .into_iter()
                .flatten()
                .collect();
            (e.name.clone(), contents)
        };
        let mut scopes: Vec<ScopeId> = Vec::new();
        for content in &contents {
            if let Some(scope) = self.contents.get(*content).map(|c| c.scope)
                && !scopes.contains(&scope)
            {
                scopes.push(scope);
            }
        }
        for content in contents {
            self.contents.remove(content);
        }
        self.endpoints.remove(endpoint);
        for scope in scopes {
            self.remove_scope(scope);
        }
        tracing::debug!(target: targets::SCOPE, endpoint = %name, "removed endpoint");
        Ok(())
    }

    /// Remove a scope, the endpoints added in it and everything below them.
    pub(crate) fn remove_scope(&mut self, scope: ScopeId) {
        let Some(s) = self.scopes.get(scope) else {
            return;
        };
        let children = s.children.clone();
        let parent = s.parent;
        for child in children {
            if !self.scopes.contains_key(child) {
                continue;
            }
            match self.scope_endpoint(child) {
                Some(endpoint) => {
                    let _ = self.remove_endpoint(endpoint);
                }
                None => self.remove_scope(child),
            }
        }
        if let Some(parent) = parent {
            self.remove_child(parent, scope);
        }
        self.scopes.remove(scope);
    }

    /// Stage the content `instruction` asks for and decide the transition.
    ///
    /// `component_type` is the resolved type for viewports; viewport scopes
    /// take none.
    pub(crate) fn set_next_content(
        &mut self,
        endpoint: EndpointId,
        instruction: &RoutingInstruction,
        component_type: Option<Arc<ComponentType>>,
        navigation: &Navigation,
        separators: &Separators,
    ) -> Result<TransitionAction> {
        self.discard_next(endpoint)?;

        let (kind, active_id, has_scope, name) = {
            let e = self.endpoint(endpoint)?;
            (e.kind, e.active, e.options.scope, e.name.clone())
        };
        let clearing = instruction.component.is_none()
            || instruction.component.name() == Some(separators.clear.as_str());

        let action = {
            let active = self.content(active_id)?;
            match kind {
                EndpointKind::ViewportScope if clearing && active.is_empty() => {
                    TransitionAction::Skip
                }
                EndpointKind::ViewportScope => TransitionAction::Reload,
                EndpointKind::Viewport if clearing => {
                    if active.is_empty() {
                        TransitionAction::Skip
                    } else {
                        TransitionAction::Swap
                    }
                }
                EndpointKind::Viewport => {
                    let requested = component_type
                        .as_ref()
                        .ok_or_else(|| {
                            RouterError::UnknownComponent(
                                instruction.component.name().unwrap_or_default().to_string(),
                            )
                        })?;
                    match active.component_type() {
                        Some(current) if current.name() == requested.name() => {
                            if active.instruction.parameters.same_as(&instruction.parameters) {
                                TransitionAction::Skip
                            } else {
                                match requested.reentry() {
                                    ReentryBehavior::Default | ReentryBehavior::Reload => {
                                        TransitionAction::Reload
                                    }
                                    ReentryBehavior::Disallow => TransitionAction::Skip,
                                    ReentryBehavior::Refresh => TransitionAction::Swap,
                                }
                            }
                        }
                        _ => TransitionAction::Swap,
                    }
                }
            }
        };

        if action == TransitionAction::Skip {
            self.endpoint_mut(endpoint)?.transition_action = action;
            tracing::trace!(target: targets::SCOPE, endpoint = %name, "skip");
            return Ok(action);
        }

        let mut staged = if clearing {
            RoutingInstruction::default()
        } else {
            instruction.clone()
        };
        staged.next_scope_instructions.clear();
        staged.endpoint.set(name.as_str(), endpoint);

        let (scope, instance, staged_type, routes) = {
            let active = self.content(active_id)?;
            match (kind, action) {
                (EndpointKind::ViewportScope, _) => (active.scope, None, None, Vec::new()),
                (_, TransitionAction::Reload) => (
                    active.scope,
                    active.instance.clone(),
                    active.component_type.clone(),
                    self.content_routes(&staged, active.component_type.as_ref(), separators)?,
                ),
                _ => {
                    let component = if clearing { None } else { component_type };
                    let routes = self.content_routes(&staged, component.as_ref(), separators)?;
                    (active.scope, component.as_ref().map(|c| c.create()), component, routes)
                }
            }
        };

        let scope = if action == TransitionAction::Swap {
            let (owning, parent) = {
                let old = self.scope(scope)?;
                (old.owning_scope, old.parent)
            };
            let fresh = self.new_scope(has_scope, owning, parent);
            if let Some(parent) = parent {
                self.add_child(parent, fresh, Some(scope))?;
            }
            fresh
        } else {
            scope
        };

        let content = self.contents.insert(EndpointContent {
            endpoint,
            scope,
            instruction: staged,
            component_type: staged_type,
            instance,
            routes,
            navigation: Some(navigation.clone()),
            is_active: false,
            timestamp: navigation.timestamp,
        });
        if action == TransitionAction::Swap {
            self.scope_mut(scope)?.content = Some(content);
        }
        let e = self.endpoint_mut(endpoint)?;
        e.next = Some(content);
        e.transition_action = action;

        tracing::trace!(target: targets::SCOPE, endpoint = %name, ?action, "staged content");
        Ok(action)
    }

    fn content_routes(
        &self,
        instruction: &RoutingInstruction,
        component: Option<&Arc<ComponentType>>,
        separators: &Separators,
    ) -> Result<Vec<Arc<Route>>> {
        let mut routes = instruction.child_routes.clone();
        if let Some(component) = component {
            routes.extend(Route::compile_all(component.routes(), separators)?);
        }
        Ok(routes)
    }

    /// Drop a staged content that was never activated.
    fn discard_next(&mut self, endpoint: EndpointId) -> Result<()> {
        let (next, active) = {
            let e = self.endpoint_mut(endpoint)?;
            (e.next.take(), e.active)
        };
        let Some(next) = next else {
            return Ok(());
        };
        let active_scope = self.content(active)?.scope;
        if let Some(content) = self.contents.remove(next)
            && content.scope != active_scope
        {
            self.remove_scope(content.scope);
        }
        Ok(())
    }

    /// Make the staged content active. The replaced content is kept until
    /// [`finalize_endpoint`](Self::finalize_endpoint).
    pub(crate) fn activate_next(&mut self, endpoint: EndpointId) -> Result<()> {
        let (next, current, previous) = {
            let e = self.endpoint(endpoint)?;
            let Some(next) = e.next else {
                return Ok(());
            };
            (next, e.active, e.previous)
        };

        let next_scope = self.content(next)?.scope;
        let current_scope = self.content(current)?.scope;
        self.content_mut(current)?.is_active = false;
        self.content_mut(next)?.is_active = true;
        self.scope_mut(next_scope)?.content = Some(next);

        let e = self.endpoint_mut(endpoint)?;
        e.active = next;
        e.next = None;
        match previous {
            // Staged twice in one navigation: keep the original for rollback.
            Some(previous) => {
                let previous_scope = self.content(previous)?.scope;
                self.contents.remove(current);
                if current_scope != previous_scope && current_scope != next_scope {
                    self.remove_scope(current_scope);
                }
            }
            None => e.previous = Some(current),
        }
        Ok(())
    }

    /// Undo everything the current navigation did to the endpoint.
    pub(crate) fn rollback_endpoint(&mut self, endpoint: EndpointId) -> Result<()> {
        self.discard_next(endpoint)?;
        let (current, previous) = {
            let e = self.endpoint_mut(endpoint)?;
            e.transition_action = TransitionAction::None;
            (e.active, e.previous.take())
        };
        let Some(previous) = previous else {
            return Ok(());
        };

        let previous_scope = self.content(previous)?.scope;
        self.content_mut(previous)?.is_active = true;
        self.scope_mut(previous_scope)?.content = Some(previous);
        self.endpoint_mut(endpoint)?.active = previous;
        if let Some(content) = self.contents.remove(current)
            && content.scope != previous_scope
        {
            self.remove_scope(content.scope);
        }
        Ok(())
    }

    /// Drop the content the navigation replaced.
    pub(crate) fn finalize_endpoint(&mut self, endpoint: EndpointId) -> Result<()> {
        let (active, previous) = {
            let e = self.endpoint_mut(endpoint)?;
            e.transition_action = TransitionAction::None;
            (e.active, e.previous.take())
        };
        let Some(previous) = previous else {
            return Ok(());
        };
        let active_scope = self.content(active)?.scope;
        if let Some(content) = self.contents.remove(previous)
            && content.scope != active_scope
        {
            self.remove_scope(content.scope);
        }
        Ok(())
    }

    /// Loaded component instances below `scope`, with their endpoint names.
    pub(crate) fn descendant_components(
        &self,
        scope: ScopeId,
    ) -> Vec<(String, Arc<dyn RoutableComponent>, Parameters)> {
        self.all_scopes(scope, false)
            .into_iter()
            .filter_map(|s| {
                let content = self.scope_content(s)?;
                let instance = content.instance.clone()?;
                let name = self.endpoints.get(content.endpoint)?.name.clone();
                Some((name, instance, content.instruction.parameters.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigation() -> Navigation {
        Navigation::new("test", 1)
    }

    fn home() -> Arc<ComponentType> {
        Arc::new(ComponentType::plain("home"))
    }

    fn viewport(tree: &mut RoutingTree, parent: ScopeId, name: &str) -> EndpointId {
        let options = EndpointOptions::default();
        tree.add_endpoint(parent, EndpointKind::Viewport, name, options, Vec::new())
            .unwrap()
    }

    fn stage(
        tree: &mut RoutingTree,
        endpoint: EndpointId,
        component: Arc<ComponentType>,
    ) -> TransitionAction {
        tree.set_next_content(
            endpoint,
            &RoutingInstruction::new(component.name()),
            Some(component),
            &navigation(),
            &Separators::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_root_owns_itself() {
        let tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        assert_eq!(tree.scope(root).unwrap().owning_scope(), root);
        assert_eq!(tree.scope_of(root), root);
        assert!(tree.is_enabled(root));
        assert!(tree.is_viewport_scope(root));
    }

    #[test]
    fn test_add_endpoint_reuses_name() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let a = viewport(&mut tree, root, "main");
        let b = viewport(&mut tree, root, "main");
        assert_eq!(a, b);
        assert_eq!(tree.owned_endpoints(root), vec![a]);
    }

    #[test]
    fn test_scope_numbers_increase() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let a = viewport(&mut tree, root, "a");
        let b = viewport(&mut tree, root, "b");
        let number = |e| {
            let content = tree.endpoint(e).unwrap().active_content();
            let scope = tree.content(content).unwrap().scope();
            tree.scope(scope).unwrap().number()
        };
        assert!(number(a) < number(b));
    }

    #[test]
    fn test_swap_activate_and_finalize() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let main = viewport(&mut tree, root, "main");

        let action = stage(&mut tree, main, home());
        assert_eq!(action, TransitionAction::Swap);
        assert_eq!(tree.active_component(main), None);

        tree.activate_next(main).unwrap();
        assert_eq!(tree.active_component(main), Some("home"));
        tree.finalize_endpoint(main).unwrap();

        assert_eq!(tree.enabled_children(root).len(), 1);
        assert_eq!(tree.scope(root).unwrap().children().len(), 1);
    }

    #[test]
    fn test_rollback_restores_previous() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let main = viewport(&mut tree, root, "main");
        stage(&mut tree, main, home());
        tree.activate_next(main).unwrap();

        tree.rollback_endpoint(main).unwrap();

        assert_eq!(tree.active_component(main), None);
        assert_eq!(tree.scope(root).unwrap().children().len(), 1);
    }

    #[test]
    fn test_same_component_same_parameters_skips() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let main = viewport(&mut tree, root, "main");
        let component = home();
        stage(&mut tree, main, component.clone());
        tree.activate_next(main).unwrap();
        tree.finalize_endpoint(main).unwrap();

        let again = stage(&mut tree, main, component);
        assert_eq!(again, TransitionAction::Skip);
    }

    #[test]
    fn test_remove_endpoint_removes_subtree() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let outer = viewport(&mut tree, root, "outer");
        let inner_parent = tree.endpoint_scope(outer).unwrap();
        viewport(&mut tree, inner_parent, "inner");
        assert_eq!(tree.endpoint_count(), 3);

        tree.remove_endpoint(outer).unwrap();

        assert_eq!(tree.endpoint_count(), 1);
        assert_eq!(tree.scope_count(), 1);
        assert!(tree.remove_endpoint(tree.root_endpoint()).is_err());
    }
}
