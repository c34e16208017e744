//! Resolving the instructions of one routing scope.
//!
//! [`RouterInner::process_instructions`] turns the instructions of a scope
//! into staged endpoint contents: it recognizes configured routes, matches
//! instructions to endpoints, stages contents, lets the coordinator run the
//! transitions and then descends into the scopes the loaded components open.
//! Nested scopes are processed concurrently, each holding a
//! [`Registration`] until its endpoints are registered.

use std::sync::Arc;

use futures_util::future::{try_join, try_join_all, BoxFuture};

use crate::component::{ComponentRef, ComponentType};
use crate::coordinator::{NavigationCoordinator, Registration, SyncState};
use crate::endpoint::TransitionAction;
use crate::endpoint_matcher::{EndpointMatcher, MatchEndpointsResult};
use crate::error::{Result, RouterError};
use crate::hooks::HookResult;
use crate::instruction::{self, RoutingInstruction};
use crate::logging::targets;
use crate::navigation::Navigation;
use crate::recognizer::RouteRecognizer;
use crate::route::{FoundRoute, Route};
use crate::router::RouterInner;
use crate::tree::{EndpointId, RoutingTree, ScopeId};

const REMAINING_PATH: &str = "remainingPath";

impl RouterInner {
    /// Process `instructions` in `scope` and every scope below it.
    ///
    /// Returns the endpoints whose content changed, or nothing when the
    /// navigation was cancelled.
    pub(crate) fn process_instructions<'a>(
        &'a self,
        scope: ScopeId,
        instructions: Vec<RoutingInstruction>,
        navigation: &'a Navigation,
        coordinator: &'a NavigationCoordinator,
        configured_route_path: Option<String>,
        registration: Option<Registration>,
    ) -> BoxFuture<'a, Result<Vec<EndpointId>>> {
        Box::pin(self.process_scope(
            scope,
            instructions,
            navigation,
            coordinator,
            configured_route_path.unwrap_or_default(),
            registration,
        ))
    }

    #[tracing::instrument(
        level = "debug",
        target = "trellis_router::navigation",
        skip_all,
        fields(scope = ?scope, count = instructions.len())
    )]
    async fn process_scope(
        &self,
        scope: ScopeId,
        instructions: Vec<RoutingInstruction>,
        navigation: &Navigation,
        coordinator: &NavigationCoordinator,
        mut configured_route_path: String,
        mut registration: Option<Registration>,
    ) -> Result<Vec<EndpointId>> {
        let separators = &self.options.separators;

        let (mut instructions, non_route): (Vec<_>, Vec<_>) =
            instructions.into_iter().partition(|i| i.route.is_some());
        if !non_route.is_empty() {
            let text = instruction::stringify(&non_route, separators);
            let has_components = non_route.iter().any(|i| !i.component.is_none());
            let (found, unknown) = {
                let tree = self.tree.lock();
                let found = self.find_instructions(&tree, scope, non_route)?;
                let unknown = found
                    .instructions
                    .iter()
                    .filter(|i| i.route.is_none())
                    .any(|i| !self.is_resolvable(&tree, scope, &i.component));
                (found, unknown)
            };
            if unknown
                || (has_components && !found.found_configuration() && !found.found_instructions())
            {
                return Err(self.unknown_route(text));
            }
            if found.found_configuration() {
                configured_route_path.push_str(&found.matching);
            }
            instructions.extend(found.instructions);
        }

        for instruction in &mut instructions {
            if instruction.component.is_deferred() {
                let name = instruction.component.name().unwrap_or_default().to_string();
                instruction.component.resolve().await.map_err(|err| match err {
                    err @ RouterError::ComponentResolution { .. } => err,
                    other => RouterError::resolution(name, other.to_string()),
                })?;
            }
        }

        let additive = self.options.additive_instruction_default
            || instructions
                .iter()
                .any(|i| i.is_add_all(separators) && i.scope.is_none_or(|s| s == scope));
        if !additive && !instructions.iter().any(|i| i.is_clear_all(separators)) {
            instructions.insert(0, RoutingInstruction::clear_all(separators).with_scope(scope));
        }

        let mut clear_endpoints: Vec<EndpointId> = Vec::new();
        {
            let tree = self.tree.lock();
            let in_scope = |i: &RoutingInstruction| i.scope.is_none_or(|s| s == scope);
            if instructions.iter().any(|i| in_scope(i) && i.is_clear_all(separators)) {
                clear_endpoints = tree
                    .owned_endpoints(scope)
                    .into_iter()
                    .filter(|e| {
                        tree.endpoint(*e)
                            .and_then(|e| tree.content(e.active_content()))
                            .is_ok_and(|content| !content.is_empty())
                    })
                    .collect();
                instructions.retain(|i| !(in_scope(i) && i.is_clear_all(separators)));
            }
            instructions.retain(|i| !(in_scope(i) && i.is_add_all(separators)));

            for add in instructions.iter_mut().filter(|i| i.is_add_all(separators)) {
                let Some(target) = add.scope else {
                    continue;
                };
                if let Some(name) = tree
                    .scope_endpoint(target)
                    .and_then(|e| tree.endpoint(e).ok())
                    .map(|e| e.name().to_string())
                {
                    add.endpoint.name = Some(name);
                }
                add.scope = tree.scope(target).ok().map(|s| s.owning_scope());
            }
        }

        tracing::debug!(
            target: targets::NAVIGATION,
            scope = %self.tree.lock().scope_label(scope),
            instructions = %instruction::stringify(&instructions, separators),
            route = %configured_route_path,
            clears = clear_endpoints.len(),
            "processing scope"
        );

        let mut changed: Vec<EndpointId> = Vec::new();
        let mut earlier: Vec<RoutingInstruction> = Vec::new();
        let mut with_children: Vec<RoutingInstruction> = Vec::new();
        let mut deferred_scopes: Vec<ScopeId> = Vec::new();
        let MatchEndpointsResult {
            mut matched,
            mut remaining,
        } = self.match_endpoints(scope, &instructions, &earlier);

        let max = self.options.max_match_iterations;
        let mut guard = max;
        loop {
            if guard == 0 {
                return Err(RouterError::unresolved(
                    instruction::stringify(&remaining, separators),
                    max,
                ));
            }
            guard -= 1;

            {
                let tree = self.tree.lock();
                for endpoint in &clear_endpoints {
                    if matched.iter().any(|i| i.endpoint.instance == Some(*endpoint)) {
                        continue;
                    }
                    if let Ok(e) = tree.endpoint(*endpoint) {
                        matched.push(
                            RoutingInstruction::create_clear(separators, e.name(), *endpoint)
                                .with_scope(scope),
                        );
                    }
                }
            }

            if !matched.is_empty() {
                match self.hooks.invoke(&matched, navigation).await? {
                    HookResult::Proceed => {}
                    HookResult::Cancel => {
                        coordinator.cancel_navigation();
                        return Ok(Vec::new());
                    }
                    HookResult::Replace(replacement) => {
                        let rematched = self.match_endpoints(scope, &replacement, &earlier);
                        matched = rematched.matched;
                        remaining.extend(rematched.remaining);
                    }
                }
            }

            let mut pass_changed: Vec<EndpointId> = Vec::new();
            let mut skipped_scopes: Vec<ScopeId> = Vec::new();
            let mut skipping_with_more = false;
            let mut i = 0;
            while i < matched.len() {
                let Some(endpoint) = matched[i].endpoint.instance else {
                    i += 1;
                    continue;
                };
                let mut tree = self.tree.lock();

                let keep = matched[i].component.name() == Some(separators.add.as_str());
                let action = if keep {
                    TransitionAction::Skip
                } else {
                    let component_type = self.component_for(&tree, endpoint, &matched[i]);
                    tree.set_next_content(
                        endpoint,
                        &matched[i],
                        component_type,
                        navigation,
                        separators,
                    )?
                };
                let is_viewport_scope = tree.endpoint(endpoint)?.is_viewport_scope();
                if action != TransitionAction::Skip {
                    pass_changed.push(endpoint);
                    coordinator.add_endpoint(endpoint, action);
                }

                let mut dont_clear = vec![endpoint];
                if action == TransitionAction::Swap {
                    let active_content = tree.endpoint(endpoint)?.active_content();
                    let active_scope = tree.content(active_content)?.scope();
                    dont_clear.extend(
                        tree.all_scopes(active_scope, true)
                            .into_iter()
                            .filter_map(|s| tree.scope_endpoint(s)),
                    );
                }
                if !matched[i].is_clear(separators)
                    && let Some(parent) = matched[i]
                        .scope
                        .and_then(|s| tree.scope(s).ok())
                        .and_then(|s| s.parent())
                    && tree.is_viewport_scope(parent)
                    && let Some(parent_endpoint) = tree.scope_endpoint(parent)
                {
                    dont_clear.push(parent_endpoint);
                }
                clear_endpoints.retain(|e| !dont_clear.contains(e));
                let mut j = 0;
                while j < matched.len() {
                    let redundant = j != i
                        && matched[j].is_clear(separators)
                        && matched[j]
                            .endpoint
                            .instance
                            .is_some_and(|e| dont_clear.contains(&e));
                    if redundant {
                        matched.remove(j);
                        if j < i {
                            i -= 1;
                        }
                    } else {
                        j += 1;
                    }
                }

                let has_next = matched[i].has_next_scope_instructions();
                if action != TransitionAction::Skip && has_next {
                    let next_scope = tree.endpoint_scope(endpoint)?;
                    for child in &mut matched[i].next_scope_instructions {
                        child.scope = Some(next_scope);
                        child.endpoint.instance = None;
                    }
                }
                let reloaded_scope = is_viewport_scope && action == TransitionAction::Reload;
                if !keep && (action == TransitionAction::Skip || reloaded_scope) && !has_next {
                    skipped_scopes.push(tree.endpoint_scope(endpoint)?);
                }
                if action == TransitionAction::Skip && has_next {
                    skipping_with_more = true;
                }
                i += 1;
            }

            if skipping_with_more {
                // Cleared along with the nested scopes, so this scope keeps
                // its registration until those are registered too.
                deferred_scopes.append(&mut skipped_scopes);
            } else {
                let jobs: Vec<(ScopeId, Registration)> = skipped_scopes
                    .into_iter()
                    .map(|skipped| (skipped, coordinator.registration()))
                    .collect();
                drop(registration.take());
                coordinator.final_endpoint();
                let below = try_join_all(jobs.into_iter().map(|(skipped, nested)| {
                    self.process_instructions(
                        skipped,
                        Vec::new(),
                        navigation,
                        coordinator,
                        Some(configured_route_path.clone()),
                        Some(nested),
                    )
                }));
                let transitions = async {
                    coordinator.run().await?;
                    if coordinator.has_all_endpoints() {
                        coordinator.wait_for_sync_state(SyncState::GuardedUnload).wait().await;
                    }
                    Ok::<(), RouterError>(())
                };
                let (below, ()) = try_join(below, transitions).await?;
                for endpoints in below {
                    merge(&mut changed, endpoints);
                }
            }

            if coordinator.cancelled() {
                return Ok(Vec::new());
            }

            merge(&mut changed, pass_changed);
            for instruction in matched.drain(..) {
                if instruction.has_next_scope_instructions() {
                    with_children.push(instruction.clone());
                }
                earlier.push(instruction);
            }

            if !remaining.is_empty() {
                let rematched = self.match_endpoints(scope, &remaining, &earlier);
                matched = rematched.matched;
                remaining = rematched.remaining;
                if matched.is_empty() && coordinator.connect_first_pending().await? {
                    let rematched = self.match_endpoints(scope, &remaining, &earlier);
                    matched = rematched.matched;
                    remaining = rematched.remaining;
                }
            }

            if matched.is_empty() && remaining.is_empty() {
                let jobs: Vec<(ScopeId, Vec<RoutingInstruction>, Registration)> = {
                    let tree = self.tree.lock();
                    with_children
                        .drain(..)
                        .filter_map(|parent| {
                            let endpoint = parent.endpoint.instance?;
                            let next_scope = tree.endpoint_scope(endpoint).ok()?;
                            Some((next_scope, parent.next_scope_instructions))
                        })
                        .chain(deferred_scopes.drain(..).map(|skipped| (skipped, Vec::new())))
                        .map(|(next_scope, next)| (next_scope, next, coordinator.registration()))
                        .collect()
                };
                if !jobs.is_empty() {
                    drop(registration.take());
                }
                let below = try_join_all(jobs.into_iter().map(|(next_scope, next, nested)| {
                    self.process_instructions(
                        next_scope,
                        next,
                        navigation,
                        coordinator,
                        Some(configured_route_path.clone()),
                        Some(nested),
                    )
                }))
                .await?;
                for endpoints in below {
                    merge(&mut changed, endpoints);
                }
                if coordinator.cancelled() {
                    return Ok(Vec::new());
                }

                if self.options.use_full_state_instruction {
                    coordinator.remove_appended_defaults();
                }
                coordinator.resolve_appended_instructions().await?;
                coordinator.dequeue_appended_instructions(&mut matched, &earlier, &mut remaining);

                if matched.is_empty() && remaining.is_empty() {
                    if coordinator.connect_first_pending().await? {
                        coordinator.dequeue_appended_instructions(
                            &mut matched,
                            &earlier,
                            &mut remaining,
                        );
                    } else {
                        let tree = self.tree.lock();
                        matched = clear_endpoints
                            .iter()
                            .filter_map(|e| {
                                let name = tree.endpoint(*e).ok()?.name().to_string();
                                let clear = RoutingInstruction::create_clear(separators, name, *e);
                                Some(clear.with_scope(scope))
                            })
                            .collect();
                    }
                }
            }

            if matched.is_empty()
                && remaining.is_empty()
                && !coordinator.has_pending_connections()
            {
                break;
            }
        }

        Ok(changed)
    }

    fn match_endpoints(
        &self,
        scope: ScopeId,
        instructions: &[RoutingInstruction],
        earlier: &[RoutingInstruction],
    ) -> MatchEndpointsResult {
        let tree = self.tree.lock();
        EndpointMatcher::match_endpoints(
            &tree,
            scope,
            instructions,
            earlier,
            false,
            &self.options.separators,
        )
    }

    /// The component type `instruction` loads into `endpoint`. Viewport
    /// scopes and markers load none.
    fn component_for(
        &self,
        tree: &RoutingTree,
        endpoint: EndpointId,
        instruction: &RoutingInstruction,
    ) -> Option<Arc<ComponentType>> {
        if instruction.is_marker(&self.options.separators) {
            return None;
        }
        let e = tree.endpoint(endpoint).ok()?;
        if e.is_viewport_scope() {
            return None;
        }
        match &instruction.component {
            ComponentRef::Type(component) => Some(component.clone()),
            ComponentRef::Name(name) | ComponentRef::Deferred { name, .. } => {
                self.components.get(name).or_else(|| {
                    let fallback = e.options().fallback.as_deref()?;
                    tracing::debug!(
                        target: targets::NAVIGATION,
                        component = %name,
                        fallback,
                        endpoint = e.name(),
                        "loading fallback"
                    );
                    self.components.get(fallback)
                })
            }
            ComponentRef::None => None,
        }
    }

    /// Whether a component reference can load something in `scope`.
    fn is_resolvable(&self, tree: &RoutingTree, scope: ScopeId, component: &ComponentRef) -> bool {
        let ComponentRef::Name(name) = component else {
            return true;
        };
        let separators = &self.options.separators;
        if *name == separators.clear || *name == separators.add || self.components.contains(name) {
            return true;
        }
        tree.owned_endpoints(scope).into_iter().any(|endpoint| {
            tree.endpoint(endpoint).is_ok_and(|e| {
                (e.is_viewport_scope() && e.name() == name.as_str())
                    || (e.is_viewport() && e.options().fallback.is_some())
            })
        })
    }

    fn unknown_route(&self, route: String) -> RouterError {
        let message = match (self.options.use_configured_routes, self.options.use_direct_routing) {
            (true, true) => {
                format!("No matching configured route or component found for '{route}'")
            }
            (true, false) => format!("No matching configured route found for '{route}'"),
            _ => format!("No matching route/component found for '{route}'"),
        };
        tracing::warn!(target: targets::NAVIGATION, %route, "unknown route");
        RouterError::unknown_route(route, message)
    }

    /// Resolve instructions that did not come from a configured route,
    /// either through the configured routes or as direct component routes.
    pub(crate) fn find_instructions(
        &self,
        tree: &RoutingTree,
        scope: ScopeId,
        instructions: Vec<RoutingInstruction>,
    ) -> Result<FoundRoute> {
        let separators = &self.options.separators;
        let mut found = FoundRoute::default();

        if self.options.use_configured_routes
            && !instruction::contains_siblings(&instructions, separators)
        {
            let (clears, non_clear): (Vec<_>, Vec<_>) = instructions
                .into_iter()
                .partition(|i| i.is_clear(separators) || i.is_clear_all(separators));
            if non_clear.is_empty() {
                found.instructions = clears;
            } else {
                let path = instruction::stringify(&non_clear, separators);
                match self.find_matching_route(tree, scope, &path, 0)? {
                    Some(route) => {
                        found = route;
                        let mut all = clears;
                        all.append(&mut found.instructions);
                        found.instructions = all;
                    }
                    None if self.options.use_direct_routing => {
                        found.instructions = clears;
                        found.instructions.extend(non_clear);
                    }
                    None => {}
                }
            }
        } else if self.options.use_direct_routing {
            found.instructions = instructions;
        } else {
            return Err(RouterError::SiblingRoutingConflict(instruction::stringify(
                &instructions,
                separators,
            )));
        }

        found.instructions.retain(|i| !i.component.is_none());
        for i in &mut found.instructions {
            if i.scope.is_none() {
                i.scope = Some(scope);
            }
        }
        Ok(found)
    }

    /// Match `path` against the routes available in `scope`.
    pub(crate) fn find_matching_route(
        &self,
        tree: &RoutingTree,
        scope: ScopeId,
        path: &str,
        redirects: usize,
    ) -> Result<Option<FoundRoute>> {
        let routes = route_source(tree, scope);
        if routes.is_empty() {
            return Ok(None);
        }

        let mut recognizer: RouteRecognizer<Arc<Route>> = RouteRecognizer::new();
        for route in &routes {
            for pattern in &route.paths {
                let pattern = pattern.trim_start_matches('/');
                recognizer.add(pattern, route.clone());
                if !pattern.is_empty() {
                    recognizer.add(&format!("{pattern}/*{REMAINING_PATH}"), route.clone());
                }
            }
        }

        let trimmed = path
            .strip_prefix('/')
            .or_else(|| path.strip_prefix(self.options.separators.sibling))
            .unwrap_or(path);
        let Some(mut recognized) = recognizer.recognize(trimmed) else {
            return Ok(None);
        };
        let route = recognized.handler;
        let remaining = recognized.params.remove(REMAINING_PATH).unwrap_or_default();
        tracing::trace!(
            target: targets::RECOGNIZER,
            path = trimmed,
            route = %route.path_list(),
            remaining = %remaining,
            "recognized route"
        );

        if let Some(redirect) = &route.redirect_to {
            if redirects >= self.options.max_redirects {
                return Err(RouterError::RedirectLoop {
                    path: path.to_string(),
                    limit: self.options.max_redirects,
                });
            }
            let target = if remaining.is_empty() {
                redirect.clone()
            } else {
                format!("{redirect}/{remaining}")
            };
            return self.find_matching_route(tree, scope, &target, redirects + 1);
        }

        let mut instructions = route.instructions.clone();
        stamp_route(&mut instructions, &route, &recognized.params);
        if let Some(first) = instructions.first_mut() {
            first.route_start = true;
            let mut leaf = first;
            while !leaf.next_scope_instructions.is_empty() {
                leaf = &mut leaf.next_scope_instructions[0];
            }
            if !remaining.is_empty() {
                leaf.next_scope_instructions
                    .extend(instruction::parse(&remaining, &self.options.separators)?);
            }
            leaf.child_routes = route.children.clone();
        }

        Ok(Some(FoundRoute {
            matching: recognized.matching,
            remaining,
            params: recognized.params,
            instructions,
            matched: Some(route),
        }))
    }
}

/// Routes configured for `scope`: those of a viewport scope's endpoint, of
/// a viewport's loaded content, or, for pass-through scopes, of the first
/// enabled child that has any.
fn route_source(tree: &RoutingTree, scope: ScopeId) -> Vec<Arc<Route>> {
    if tree.is_viewport_scope(scope) && !tree.is_pass_through(scope) {
        return tree
            .scope_endpoint(scope)
            .and_then(|e| tree.endpoint(e).ok())
            .map(|e| e.routes.clone())
            .unwrap_or_default();
    }
    if tree.is_viewport(scope) {
        return tree
            .scope_content(scope)
            .map(|content| content.routes.clone())
            .unwrap_or_default();
    }
    tree.enabled_children(scope)
        .into_iter()
        .map(|child| route_source(tree, child))
        .find(|routes| !routes.is_empty())
        .unwrap_or_default()
}

fn stamp_route(
    instructions: &mut [RoutingInstruction],
    route: &Arc<Route>,
    params: &std::collections::BTreeMap<String, String>,
) {
    for instruction in instructions {
        instruction.parameters.add_parameters(params);
        instruction.route = Some(route.clone());
        stamp_route(&mut instruction.next_scope_instructions, route, params);
    }
}

fn merge(into: &mut Vec<EndpointId>, from: Vec<EndpointId>) {
    for endpoint in from {
        if !into.contains(&endpoint) {
            into.push(endpoint);
        }
    }
}
