//! Routing scopes and tree traversals.
//!
//! Every endpoint content opens a [`RoutingScope`]. Scopes form two trees at
//! once:
//!
//! - the **structural** tree (`parent` / `children`), following where
//!   endpoints were added, and
//! - the **ownership** tree (`owning_scope`), which decides where nested
//!   endpoints are looked up. A scope that does not open its own scope
//!   (`has_scope == false`) hands ownership of its endpoints to its owner.
//!
//! Traversals are methods on [`RoutingTree`] and always return fresh vectors.

use std::sync::Arc;

use crate::component::RoutableComponent;
use crate::endpoint::EndpointContent;
use crate::error::{Result, RouterError};
use crate::instruction::RoutingInstruction;
use crate::tree::{ContentId, EndpointId, RoutingTree, ScopeId};

/// A node of the routing scope tree.
#[derive(Debug, Clone)]
pub struct RoutingScope {
    pub(crate) number: u64,
    pub(crate) has_scope: bool,
    pub(crate) owning_scope: ScopeId,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: Vec<ScopeId>,
    pub(crate) content: Option<ContentId>,
}

impl RoutingScope {
    /// Sequence number, unique within the tree.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Whether the scope owns the endpoints added inside it.
    pub fn has_scope(&self) -> bool {
        self.has_scope
    }

    /// The owning scope. The root owns itself.
    pub fn owning_scope(&self) -> ScopeId {
        self.owning_scope
    }

    /// The structural parent.
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Structural children.
    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    /// The endpoint content the scope belongs to.
    pub fn content(&self) -> Option<ContentId> {
        self.content
    }
}

/// Something a routing scope can be looked up from.
#[derive(Clone)]
pub enum ScopeOrigin {
    /// A scope itself.
    Scope(ScopeId),
    /// The current content of an endpoint.
    Endpoint(EndpointId),
    /// An endpoint content.
    Content(ContentId),
    /// A loaded component instance.
    Component(Arc<dyn RoutableComponent>),
}

impl RoutingTree {
    /// The content a scope belongs to.
    pub fn scope_content(&self, scope: ScopeId) -> Option<&EndpointContent> {
        self.scopes
            .get(scope)
            .and_then(|s| s.content)
            .and_then(|content| self.contents.get(content))
    }

    /// The endpoint whose content opened `scope`.
    pub fn scope_endpoint(&self, scope: ScopeId) -> Option<EndpointId> {
        self.scope_content(scope).map(|content| content.endpoint)
    }

    /// The scope that owns endpoints added in `scope`.
    pub fn scope_of(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while let Some(s) = self.scopes.get(current) {
            if s.has_scope || s.owning_scope == current {
                return current;
            }
            current = s.owning_scope;
        }
        current
    }

    /// Link `child` under `parent`, right after `after` when it is a child
    /// already, otherwise last. A child is never listed twice.
    pub fn add_child(
        &mut self,
        parent: ScopeId,
        child: ScopeId,
        after: Option<ScopeId>,
    ) -> Result<()> {
        if !self.scopes.contains_key(parent) {
            return Err(RouterError::InvalidScope);
        }
        self.scopes
            .get_mut(child)
            .ok_or(RouterError::InvalidScope)?
            .parent = Some(parent);
        let children = &mut self
            .scopes
            .get_mut(parent)
            .ok_or(RouterError::InvalidScope)?
            .children;
        children.retain(|c| *c != child);
        match after.and_then(|after| children.iter().position(|c| *c == after)) {
            Some(index) => children.insert(index + 1, child),
            None => children.push(child),
        }
        Ok(())
    }

    /// Unlink `child` from `parent`. Returns whether it was linked.
    pub fn remove_child(&mut self, parent: ScopeId, child: ScopeId) -> bool {
        let Some(s) = self.scopes.get_mut(parent) else {
            return false;
        };
        let before = s.children.len();
        s.children.retain(|c| *c != child);
        s.children.len() != before
    }

    /// Whether the scope's content is active.
    pub fn is_enabled(&self, scope: ScopeId) -> bool {
        self.scope_content(scope)
            .is_some_and(|content| content.is_active)
    }

    /// Whether the scope belongs to a viewport scope.
    pub fn is_viewport_scope(&self, scope: ScopeId) -> bool {
        self.scope_endpoint(scope)
            .and_then(|endpoint| self.endpoints.get(endpoint))
            .is_some_and(|endpoint| endpoint.is_viewport_scope())
    }

    /// Whether the scope belongs to a viewport.
    pub fn is_viewport(&self, scope: ScopeId) -> bool {
        self.scope_endpoint(scope)
            .and_then(|endpoint| self.endpoints.get(endpoint))
            .is_some_and(|endpoint| endpoint.is_viewport())
    }

    /// Whether the scope is transparent when matching.
    pub fn is_pass_through(&self, scope: ScopeId) -> bool {
        self.scope_endpoint(scope)
            .and_then(|endpoint| self.endpoints.get(endpoint))
            .is_some_and(|endpoint| endpoint.is_viewport_scope() && endpoint.options.pass_through)
    }

    /// Children whose content is active.
    pub fn enabled_children(&self, scope: ScopeId) -> Vec<ScopeId> {
        self.scopes
            .get(scope)
            .map(|s| {
                s.children
                    .iter()
                    .copied()
                    .filter(|child| self.is_enabled(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Enabled children with pass-through scopes replaced by their own
    /// hoisted children.
    pub fn hoisted_children(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        for child in self.enabled_children(scope) {
            if self.is_pass_through(child) {
                out.extend(self.hoisted_children(child));
            } else {
                out.push(child);
            }
        }
        out
    }

    /// Every descendant scope, depth first.
    pub fn all_scopes(&self, scope: ScopeId, include_disabled: bool) -> Vec<ScopeId> {
        let children: Vec<ScopeId> = if include_disabled {
            self.scopes
                .get(scope)
                .map(|s| s.children.clone())
                .unwrap_or_default()
        } else {
            self.enabled_children(scope)
        };
        let mut out = Vec::new();
        for child in children {
            out.push(child);
            out.extend(self.all_scopes(child, include_disabled));
        }
        out
    }

    /// Descendant scopes owned by `scope`, pass-through scopes replaced by
    /// the scopes they own.
    pub fn owned_scopes(&self, scope: ScopeId, include_disabled: bool) -> Vec<ScopeId> {
        let mut out: Vec<ScopeId> = Vec::new();
        for owned in self
            .all_scopes(scope, include_disabled)
            .into_iter()
            .filter(|s| self.scopes.get(*s).is_some_and(|s| s.owning_scope == scope))
        {
            let hoisted = if self.is_pass_through(owned) {
                self.owned_scopes(owned, include_disabled)
            } else {
                vec![owned]
            };
            for s in hoisted {
                if !out.contains(&s) {
                    out.push(s);
                }
            }
        }
        out
    }

    /// Endpoints of the scopes owned by `scope`.
    pub fn owned_endpoints(&self, scope: ScopeId) -> Vec<EndpointId> {
        let mut out = Vec::new();
        for owned in self.owned_scopes(scope, false) {
            if let Some(endpoint) = self.scope_endpoint(owned)
                && !out.contains(&endpoint)
            {
                out.push(endpoint);
            }
        }
        out
    }

    /// Enabled children whose content existed at `timestamp`.
    pub fn children_at(&self, scope: ScopeId, timestamp: u64) -> Vec<ScopeId> {
        self.enabled_children(scope)
            .into_iter()
            .filter(|child| {
                self.scope_content(*child)
                    .is_some_and(|content| content.timestamp <= timestamp)
            })
            .collect()
    }

    /// Descendant scopes whose content existed at `timestamp`.
    pub fn all_scopes_at(&self, scope: ScopeId, timestamp: u64) -> Vec<ScopeId> {
        let mut out = Vec::new();
        for child in self.children_at(scope, timestamp) {
            out.push(child);
            out.extend(self.all_scopes_at(child, timestamp));
        }
        out
    }

    /// Owned scopes whose content existed at `timestamp`.
    pub fn owned_scopes_at(&self, scope: ScopeId, timestamp: u64) -> Vec<ScopeId> {
        self.owned_scopes(scope, false)
            .into_iter()
            .filter(|owned| {
                self.scope_content(*owned)
                    .is_some_and(|content| content.timestamp <= timestamp)
            })
            .collect()
    }

    /// The instructions that describe the loaded state below `scope` as of
    /// `timestamp`.
    ///
    /// An endpoint name is kept only when the endpoint forces it or shares
    /// its scope with other endpoints.
    pub fn routing_instructions(&self, scope: ScopeId, timestamp: u64) -> Vec<RoutingInstruction> {
        let children = self.hoisted_children(scope);
        let siblings = children.len();
        let mut out = Vec::new();
        for child in children {
            let Some(content) = self.scope_content(child) else {
                continue;
            };
            if content.timestamp > timestamp {
                continue;
            }
            let Some(endpoint) = self.endpoints.get(content.endpoint) else {
                continue;
            };
            let next = self.routing_instructions(child, timestamp);

            let mut instruction = if endpoint.is_viewport_scope() {
                if next.is_empty() {
                    continue;
                }
                RoutingInstruction::new(endpoint.name.as_str())
            } else {
                if content.is_empty() {
                    continue;
                }
                let mut instruction = content.instruction.clone();
                instruction.route = None;
                instruction.child_routes.clear();
                instruction.endpoint.set(endpoint.name.as_str(), content.endpoint);
                if siblings <= 1 && !endpoint.options.force_description {
                    instruction.endpoint.name = None;
                }
                instruction
            };
            instruction.scope = Some(scope);
            instruction.next_scope_instructions = next;
            out.push(instruction);
        }
        out
    }

    /// Component names of the enabled contents from the root down to
    /// `scope`, joined with `/`.
    pub fn pathname(&self, scope: ScopeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(name) = self.scope_content(id).and_then(|c| c.component_name()) {
                parts.push(name.to_string());
            }
            current = self.scopes.get(id).and_then(|s| s.parent);
        }
        parts.reverse();
        parts.join("/")
    }

    /// `endpoint:number` labels from the root down to `scope` along the
    /// structural tree.
    pub fn describe_scope(&self, scope: ScopeId) -> String {
        self.describe_chain(scope, |s| s.parent)
    }

    /// `endpoint:number` labels from the root down to `scope` along the
    /// ownership tree.
    pub fn describe_owning(&self, scope: ScopeId) -> String {
        self.describe_chain(scope, |s| Some(s.owning_scope))
    }

    fn describe_chain(
        &self,
        scope: ScopeId,
        step: impl Fn(&RoutingScope) -> Option<ScopeId>,
    ) -> String {
        let mut labels = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let Some(s) = self.scopes.get(id) else {
                break;
            };
            labels.push(self.scope_label(id));
            current = step(s).filter(|next| *next != id);
            if labels.len() > self.scopes.len() {
                break;
            }
        }
        labels.reverse();
        labels.join("/")
    }

    pub(crate) fn scope_label(&self, scope: ScopeId) -> String {
        let name = self
            .scope_endpoint(scope)
            .and_then(|endpoint| self.endpoints.get(endpoint))
            .map(|endpoint| endpoint.name.clone())
            .unwrap_or_default();
        let number = self.scopes.get(scope).map(|s| s.number).unwrap_or_default();
        format!("{name}:{number}")
    }

    /// Instructions (and, when `deep`, nested instructions) resolved in
    /// `scope`.
    pub fn match_scope(
        &self,
        scope: ScopeId,
        instructions: &[RoutingInstruction],
        deep: bool,
    ) -> Vec<RoutingInstruction> {
        let mut out = Vec::new();
        for instruction in instructions {
            if instruction.scope == Some(scope) {
                out.push(instruction.clone());
            } else if deep {
                out.extend(self.match_scope(scope, &instruction.next_scope_instructions, deep));
            }
        }
        out
    }

    /// Give instructions without a scope the scope that owns `scope`.
    pub fn reparent_routing_instructions(
        &self,
        scope: ScopeId,
        instructions: &mut [RoutingInstruction],
    ) {
        let owner = self.scope_of(scope);
        for instruction in instructions {
            if instruction.scope.is_none() {
                instruction.scope = Some(owner);
            }
        }
    }

    /// Resolve the routing scope of an origin.
    pub fn scope_for(&self, origin: &ScopeOrigin) -> Result<ScopeId> {
        match origin {
            ScopeOrigin::Scope(scope) => self
                .scopes
                .contains_key(*scope)
                .then_some(*scope)
                .ok_or(RouterError::InvalidScope),
            ScopeOrigin::Endpoint(endpoint) => {
                let endpoint = self.endpoint(*endpoint)?;
                Ok(self.content(endpoint.current_content())?.scope)
            }
            ScopeOrigin::Content(content) => Ok(self.content(*content)?.scope),
            ScopeOrigin::Component(component) => self
                .contents
                .values()
                .find(|content| {
                    content.is_active
                        && content.instance.as_ref().is_some_and(|instance| {
                            std::ptr::addr_eq(Arc::as_ptr(instance), Arc::as_ptr(component))
                        })
                })
                .map(|content| content.scope)
                .ok_or(RouterError::InvalidScope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;
    use crate::config::Separators;
    use crate::endpoint::{EndpointKind, EndpointOptions};
    use crate::instruction;
    use crate::navigation::Navigation;

    fn viewport(
        tree: &mut RoutingTree,
        parent: ScopeId,
        name: &str,
        options: EndpointOptions,
    ) -> EndpointId {
        tree.add_endpoint(parent, EndpointKind::Viewport, name, options, Vec::new())
            .unwrap()
    }

    fn active_scope(tree: &RoutingTree, endpoint: EndpointId) -> ScopeId {
        tree.content(tree.endpoint(endpoint).unwrap().active_content())
            .unwrap()
            .scope()
    }

    fn load(tree: &mut RoutingTree, endpoint: EndpointId, component: &str) {
        let separators = Separators::default();
        tree.set_next_content(
            endpoint,
            &RoutingInstruction::new(component),
            Some(Arc::new(ComponentType::plain(component))),
            &Navigation::new(component, 1),
            &separators,
        )
        .unwrap();
        tree.activate_next(endpoint).unwrap();
        tree.finalize_endpoint(endpoint).unwrap();
    }

    #[test]
    fn test_add_and_remove_child() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let a = viewport(&mut tree, root, "a", EndpointOptions::default());
        let b = viewport(&mut tree, root, "b", EndpointOptions::default());
        let (a_scope, b_scope) = (active_scope(&tree, a), active_scope(&tree, b));

        assert!(tree.remove_child(root, a_scope));
        assert!(!tree.remove_child(root, a_scope));
        assert_eq!(tree.scope(root).unwrap().children(), &[b_scope]);

        tree.add_child(root, a_scope, None).unwrap();
        tree.add_child(root, a_scope, Some(b_scope)).unwrap();
        assert_eq!(tree.scope(root).unwrap().children(), &[b_scope, a_scope]);
    }

    #[test]
    fn test_scopeless_endpoint_hands_ownership_up() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let scopeless = EndpointOptions::default().with_scope(false);
        let outer = viewport(&mut tree, root, "outer", scopeless);
        let outer_scope = active_scope(&tree, outer);
        let inner = viewport(&mut tree, outer_scope, "inner", EndpointOptions::default());

        assert_eq!(tree.scope_of(outer_scope), root);
        assert_eq!(tree.endpoint_scope(outer).unwrap(), root);
        assert_eq!(tree.find_endpoint(root, "inner"), Some(inner));
        assert_eq!(tree.describe_owning(active_scope(&tree, inner)), "rootScope:0/inner:2");
    }

    #[test]
    fn test_pass_through_scope_is_hoisted() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let frame = tree
            .add_endpoint(
                root,
                EndpointKind::ViewportScope,
                "frame",
                EndpointOptions::default().with_pass_through(true),
                Vec::new(),
            )
            .unwrap();
        let frame_scope = tree.endpoint_scope(frame).unwrap();
        let inner = viewport(&mut tree, frame_scope, "inner", EndpointOptions::default());
        let inner_scope = active_scope(&tree, inner);

        assert!(tree.is_pass_through(frame_scope));
        assert_eq!(tree.hoisted_children(root), vec![inner_scope]);
        assert_eq!(tree.owned_endpoints(root), vec![inner]);
        assert_eq!(tree.all_scopes(root, false), vec![frame_scope, inner_scope]);
    }

    #[test]
    fn test_state_instructions_and_pathname() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let described = EndpointOptions::default().with_force_description(true);
        let main = viewport(&mut tree, root, "main", described);
        load(&mut tree, main, "home");

        let separators = Separators::default();
        let state = tree.routing_instructions(root, u64::MAX);
        assert_eq!(instruction::stringify(&state, &separators), "home@main");
        assert!(tree.routing_instructions(root, 0).is_empty());

        let home_scope = active_scope(&tree, main);
        assert_eq!(tree.pathname(home_scope), "home");
        assert_eq!(tree.match_scope(root, &state, false).len(), 1);
    }

    #[test]
    fn test_scope_for_origins() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let main = viewport(&mut tree, root, "main", EndpointOptions::default());
        load(&mut tree, main, "home");
        let scope = active_scope(&tree, main);
        let content = tree.endpoint(main).unwrap().active_content();
        let instance = tree.content(content).unwrap().instance().cloned().unwrap();

        assert_eq!(tree.scope_for(&ScopeOrigin::Scope(root)).unwrap(), root);
        assert_eq!(tree.scope_for(&ScopeOrigin::Endpoint(main)).unwrap(), scope);
        assert_eq!(tree.scope_for(&ScopeOrigin::Content(content)).unwrap(), scope);
        assert_eq!(tree.scope_for(&ScopeOrigin::Component(instance)).unwrap(), scope);
        assert!(tree.scope_for(&ScopeOrigin::Scope(ScopeId::default())).is_err());
    }
}
