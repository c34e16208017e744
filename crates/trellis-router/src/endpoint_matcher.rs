//! Binding instructions to endpoints.
//!
//! Matching is stateless: it looks at the endpoints owned by a scope and the
//! instructions already matched in the navigation, and splits the given
//! instructions into those bound to an endpoint and those left for a later
//! pass. An endpoint is bound by at most one instruction per pass.

use crate::config::Separators;
use crate::instruction::RoutingInstruction;
use crate::logging::targets;
use crate::tree::{EndpointId, RoutingTree, ScopeId};

/// Instructions split by whether they found an endpoint.
#[derive(Debug, Default)]
pub struct MatchEndpointsResult {
    /// Instructions with a bound endpoint.
    pub matched: Vec<RoutingInstruction>,
    /// Instructions without one.
    pub remaining: Vec<RoutingInstruction>,
}

/// Matches instructions to the endpoints of a scope.
pub struct EndpointMatcher;

impl EndpointMatcher {
    /// Match `instructions` against the endpoints owned by `scope`.
    ///
    /// Endpoints bound by `already_matched` are not available. With
    /// `disregard_viewports` only viewport scopes are matched.
    pub fn match_endpoints(
        tree: &RoutingTree,
        scope: ScopeId,
        instructions: &[RoutingInstruction],
        already_matched: &[RoutingInstruction],
        disregard_viewports: bool,
        separators: &Separators,
    ) -> MatchEndpointsResult {
        let claimed: Vec<EndpointId> = already_matched
            .iter()
            .filter_map(|instruction| instruction.endpoint.instance)
            .collect();
        let available: Vec<EndpointId> = tree
            .owned_endpoints(scope)
            .into_iter()
            .filter(|endpoint| !claimed.contains(endpoint))
            .collect();
        let mut scopes: Vec<EndpointId> = available
            .iter()
            .copied()
            .filter(|e| tree.endpoint(*e).is_ok_and(|e| e.is_viewport_scope()))
            .collect();
        let mut viewports: Vec<EndpointId> = available
            .iter()
            .copied()
            .filter(|e| tree.endpoint(*e).is_ok_and(|e| e.is_viewport()))
            .collect();

        let mut result = MatchEndpointsResult::default();
        let mut pending: Vec<RoutingInstruction> = instructions.to_vec();
        for instruction in &mut pending {
            if instruction.scope.is_none() {
                instruction.scope = Some(scope);
            }
        }

        // Known endpoints, viewport scopes first.
        let mut unmatched = Vec::new();
        for instruction in pending.drain(..) {
            let known = instruction
                .endpoint
                .instance
                .and_then(|id| tree.endpoint(id).ok().map(|e| (id, e.is_viewport_scope())));
            match known {
                Some((id, true)) => {
                    scopes.retain(|e| *e != id);
                    result.matched.push(instruction);
                }
                Some((id, false)) if !disregard_viewports => {
                    viewports.retain(|e| *e != id);
                    result.matched.push(instruction);
                }
                _ => unmatched.push(instruction),
            }
        }
        pending = unmatched;

        // Viewport scopes named by the component.
        take_matches(&mut pending, &mut result.matched, |instruction| {
            if instruction.endpoint.instance.is_some() {
                return None;
            }
            let name = instruction.component.name()?;
            if instruction.endpoint.name.as_deref().is_some_and(|n| n != name) {
                return None;
            }
            let found = scopes
                .iter()
                .copied()
                .find(|e| tree.endpoint(*e).is_ok_and(|e| e.name == name))?;
            scopes.retain(|e| *e != found);
            Some((found, name.to_string()))
        });

        if disregard_viewports {
            result.remaining = pending;
            return result;
        }

        // Viewports that list the component in `used_by`.
        take_matches(&mut pending, &mut result.matched, |instruction| {
            if instruction.endpoint.name.is_some() || instruction.endpoint.instance.is_some() {
                return None;
            }
            let name = instruction.component.name()?;
            let found = viewports.iter().copied().find(|e| {
                tree.endpoint(*e)
                    .is_ok_and(|e| e.options.used_by.iter().any(|used_by| used_by == name))
            })?;
            viewports.retain(|e| *e != found);
            endpoint_name(tree, found).map(|n| (found, n))
        });

        // Endpoints named by the instruction.
        take_matches(&mut pending, &mut result.matched, |instruction| {
            if instruction.endpoint.instance.is_some() {
                return None;
            }
            let name = instruction.endpoint.name.as_deref()?;
            let found = scopes
                .iter()
                .chain(viewports.iter())
                .copied()
                .find(|e| tree.endpoint(*e).is_ok_and(|e| e.name == name))?;
            if !accepts(tree, found, instruction, separators) {
                return None;
            }
            scopes.retain(|e| *e != found);
            viewports.retain(|e| *e != found);
            Some((found, name.to_string()))
        });

        // The only viewport left that accepts the component.
        take_matches(&mut pending, &mut result.matched, |instruction| {
            if instruction.endpoint.name.is_some() || instruction.endpoint.instance.is_some() {
                return None;
            }
            let accepting: Vec<EndpointId> = viewports
                .iter()
                .copied()
                .filter(|e| accepts(tree, *e, instruction, separators))
                .collect();
            let [found] = accepting.as_slice() else {
                return None;
            };
            let found = *found;
            viewports.retain(|e| *e != found);
            endpoint_name(tree, found).map(|n| (found, n))
        });

        // The next free viewport, preferring one showing the same component.
        take_matches(&mut pending, &mut result.matched, |instruction| {
            if instruction.endpoint.name.is_some() || instruction.endpoint.instance.is_some() {
                return None;
            }
            let component = instruction.component.name();
            let candidates: Vec<EndpointId> = viewports
                .iter()
                .copied()
                .filter(|e| accepts(tree, *e, instruction, separators))
                .collect();
            let found = candidates
                .iter()
                .copied()
                .find(|e| component.is_some() && tree.active_component(*e) == component)
                .or_else(|| {
                    candidates
                        .iter()
                        .copied()
                        .find(|e| tree.active_component(*e).is_none())
                })?;
            viewports.retain(|e| *e != found);
            endpoint_name(tree, found).map(|n| (found, n))
        });

        tracing::trace!(
            target: targets::MATCHER,
            scope = %tree.scope_label(scope),
            matched = result.matched.len(),
            remaining = pending.len(),
            "matched endpoints"
        );
        result.remaining = pending;
        result
    }
}

fn endpoint_name(tree: &RoutingTree, endpoint: EndpointId) -> Option<String> {
    tree.endpoint(endpoint).ok().map(|e| e.name.clone())
}

fn accepts(
    tree: &RoutingTree,
    endpoint: EndpointId,
    instruction: &RoutingInstruction,
    separators: &Separators,
) -> bool {
    if instruction.is_marker(separators) {
        return true;
    }
    let Ok(endpoint) = tree.endpoint(endpoint) else {
        return false;
    };
    if endpoint.is_viewport_scope() {
        return true;
    }
    match instruction.component.name() {
        Some(name) => endpoint.accepts_component(name),
        None => true,
    }
}

/// Move every instruction `find` binds from `pending` to `matched`.
fn take_matches(
    pending: &mut Vec<RoutingInstruction>,
    matched: &mut Vec<RoutingInstruction>,
    mut find: impl FnMut(&RoutingInstruction) -> Option<(EndpointId, String)>,
) {
    let mut left = Vec::with_capacity(pending.len());
    for mut instruction in pending.drain(..) {
        match find(&instruction) {
            Some((endpoint, name)) => {
                instruction.endpoint.set(name, endpoint);
                matched.push(instruction);
            }
            None => left.push(instruction),
        }
    }
    *pending = left;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointKind, EndpointOptions};

    fn tree_with(viewports: &[(&str, EndpointOptions)]) -> (RoutingTree, Vec<EndpointId>) {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let ids = viewports
            .iter()
            .map(|(name, options)| {
                tree.add_endpoint(root, EndpointKind::Viewport, name, options.clone(), Vec::new())
                    .unwrap()
            })
            .collect();
        (tree, ids)
    }

    fn run(tree: &RoutingTree, instructions: &[RoutingInstruction]) -> MatchEndpointsResult {
        EndpointMatcher::match_endpoints(
            tree,
            tree.root(),
            instructions,
            &[],
            false,
            &Separators::default(),
        )
    }

    #[test]
    fn test_single_viewport_takes_unnamed() {
        let (tree, ids) = tree_with(&[("default", EndpointOptions::default())]);
        let result = run(&tree, &[RoutingInstruction::new("home")]);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].endpoint.instance, Some(ids[0]));
        assert_eq!(result.matched[0].scope, Some(tree.root()));
    }

    #[test]
    fn test_named_match_and_unknown_name_remains() {
        let (tree, ids) = tree_with(&[
            ("left", EndpointOptions::default()),
            ("right", EndpointOptions::default()),
        ]);
        let result = run(
            &tree,
            &[
                RoutingInstruction::new("a").with_endpoint("right"),
                RoutingInstruction::new("b").with_endpoint("nowhere"),
            ],
        );
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].endpoint.instance, Some(ids[1]));
        assert_eq!(result.remaining.len(), 1);
    }

    #[test]
    fn test_used_by_wins_over_order() {
        let (tree, ids) = tree_with(&[
            ("first", EndpointOptions::default()),
            ("second", EndpointOptions::default().with_used_by(["chart"])),
        ]);
        let result = run(&tree, &[RoutingInstruction::new("chart")]);
        assert_eq!(result.matched[0].endpoint.instance, Some(ids[1]));
    }

    #[test]
    fn test_named_viewport_rejects_component() {
        let (tree, _) = tree_with(&[("only", EndpointOptions::default().with_used_by(["x"]))]);
        let result = run(&tree, &[RoutingInstruction::new("y").with_endpoint("only")]);
        assert!(result.matched.is_empty());
        assert_eq!(result.remaining.len(), 1);
    }

    #[test]
    fn test_endpoint_bound_once_per_pass() {
        let (tree, _) = tree_with(&[
            ("a", EndpointOptions::default()),
            ("b", EndpointOptions::default()),
        ]);
        let result = run(
            &tree,
            &[
                RoutingInstruction::new("x").with_endpoint("a"),
                RoutingInstruction::new("y").with_endpoint("a"),
            ],
        );
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.remaining.len(), 1);
    }

    #[test]
    fn test_already_matched_endpoints_are_excluded() {
        let (tree, ids) = tree_with(&[("only", EndpointOptions::default())]);
        let mut earlier = RoutingInstruction::new("first");
        earlier.endpoint.set("only", ids[0]);

        let result = EndpointMatcher::match_endpoints(
            &tree,
            tree.root(),
            &[RoutingInstruction::new("second")],
            &[earlier],
            false,
            &Separators::default(),
        );

        assert!(result.matched.is_empty());
    }

    #[test]
    fn test_disregard_viewports() {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        for (kind, name) in [
            (EndpointKind::Viewport, "main"),
            (EndpointKind::ViewportScope, "sidebar"),
        ] {
            tree.add_endpoint(root, kind, name, EndpointOptions::default(), Vec::new())
                .unwrap();
        }

        let result = EndpointMatcher::match_endpoints(
            &tree,
            root,
            &[RoutingInstruction::new("sidebar"), RoutingInstruction::new("home")],
            &[],
            true,
            &Separators::default(),
        );

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].component.name(), Some("sidebar"));
        assert_eq!(result.remaining.len(), 1);
    }
}
