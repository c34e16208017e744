//! Running the staged transitions of a navigation.
//!
//! Every registered endpoint that has not run yet goes through the same
//! phases together: all `can_unload` checks, all `can_load` checks, all
//! unloads, all loads, then activation. A veto cancels the navigation, a
//! failing unload or load cancels it and reports the error.
//!
//! Scopes processed in parallel run their own batches. Each batch waits
//! after both guard phases until every registered endpoint of the
//! navigation has passed them, so nothing is unloaded or loaded while a
//! sibling can still veto.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{join_all, try_join_all};

use crate::component::{ComponentType, LifecycleContext, RoutableComponent};
use crate::coordinator::{NavigationCoordinator, PendingConnection, SyncState, SyncWait};
use crate::endpoint::TransitionAction;
use crate::error::{Result, RouterError};
use crate::instruction;
use crate::logging::targets;
use crate::tree::{EndpointId, RoutingTree, ScopeId};

type Participant = (LifecycleContext, Arc<dyn RoutableComponent>);

/// What one endpoint's transition touches.
struct TransitionPlan {
    endpoint: EndpointId,
    unloads: Vec<Participant>,
    load: Option<Participant>,
    connect: Option<(ScopeId, Arc<ComponentType>, Arc<dyn RoutableComponent>)>,
}

impl NavigationCoordinator {
    /// Run the transitions of every endpoint registered since the last run.
    pub async fn run(&self) -> Result<()> {
        let batch: Vec<EndpointId> = {
            let mut state = self.state.lock();
            if state.cancelled {
                return Ok(());
            }
            state.running += 1;
            state
                .entries
                .iter_mut()
                .filter(|entry| !entry.running)
                .map(|entry| {
                    entry.running = true;
                    entry.endpoint
                })
                .collect()
        };

        let result = if batch.is_empty() {
            Ok(())
        } else {
            self.run_batch(&batch).await
        };
        self.state.lock().running -= 1;
        result
    }

    async fn run_batch(&self, batch: &[EndpointId]) -> Result<()> {
        let plans: Vec<TransitionPlan> = {
            let tree = self.tree.lock();
            batch
                .iter()
                .filter_map(|endpoint| self.plan(&tree, *endpoint))
                .collect()
        };
        tracing::debug!(
            target: targets::COORDINATOR,
            endpoints = plans.len(),
            navigation = %self.navigation.instruction,
            "running transitions"
        );

        let unloads: Vec<&Participant> =
            plans.iter().flat_map(|plan| plan.unloads.iter()).collect();
        let loads: Vec<&Participant> = plans.iter().filter_map(|plan| plan.load.as_ref()).collect();

        let allowed = join_all(
            unloads
                .iter()
                .map(|(context, component)| component.can_unload(context)),
        )
        .await;
        if allowed.contains(&false) {
            tracing::debug!(target: targets::COORDINATOR, "unload vetoed");
            self.cancel_navigation();
            return Ok(());
        }
        self.mark_reached(batch, SyncState::GuardedUnload);
        if !self.pass_barrier(SyncState::GuardedUnload).await {
            return Ok(());
        }

        let allowed = join_all(
            loads
                .iter()
                .map(|(context, component)| component.can_load(context)),
        )
        .await;
        if allowed.contains(&false) {
            tracing::debug!(target: targets::COORDINATOR, "load vetoed");
            self.cancel_navigation();
            return Ok(());
        }
        self.mark_reached(batch, SyncState::GuardedLoad);
        if !self.pass_barrier(SyncState::GuardedLoad).await {
            return Ok(());
        }

        let unloaded = try_join_all(unloads.iter().map(|(context, component)| async move {
            component
                .unload(context)
                .await
                .map_err(|err| RouterError::lifecycle(&context.endpoint, "unload", err.to_string()))
        }))
        .await;
        if let Err(err) = unloaded {
            self.cancel_navigation();
            return Err(err);
        }
        self.mark_reached(batch, SyncState::Unloaded);

        let loaded = try_join_all(loads.iter().map(|(context, component)| async move {
            component
                .load(context)
                .await
                .map_err(|err| RouterError::lifecycle(&context.endpoint, "load", err.to_string()))
        }))
        .await;
        if let Err(err) = loaded {
            self.cancel_navigation();
            return Err(err);
        }
        self.mark_reached(batch, SyncState::Loaded);

        {
            let mut tree = self.tree.lock();
            for plan in &plans {
                tree.activate_next(plan.endpoint)?;
            }
        }

        for plan in plans {
            let Some((scope, component_type, instance)) = plan.connect else {
                continue;
            };
            match instance.attached() {
                None => self.connect_endpoints(scope, &component_type)?,
                Some(mut attached) => {
                    if (&mut attached).now_or_never().is_some() {
                        self.connect_endpoints(scope, &component_type)?;
                    } else {
                        tracing::trace!(
                            target: targets::COORDINATOR,
                            component = component_type.name(),
                            "waiting for attach"
                        );
                        self.add_pending_connection(PendingConnection {
                            scope,
                            component_type,
                            attached,
                        });
                    }
                }
            }
        }
        self.mark_reached(batch, SyncState::Swapped);
        Ok(())
    }

    /// Wait for the rest of the navigation to pass a guard phase. Returns
    /// false when it was cancelled meanwhile.
    async fn pass_barrier(&self, state: SyncState) -> bool {
        if let SyncWait::Pending(receiver) = self.wait_for_barrier(state) {
            tracing::trace!(target: targets::COORDINATOR, ?state, "waiting at barrier");
            let _ = receiver.await;
        }
        !self.cancelled()
    }

    fn plan(&self, tree: &RoutingTree, endpoint: EndpointId) -> Option<TransitionPlan> {
        let e = tree.endpoint(endpoint).ok()?;
        let action = e.transition_action();
        let next = tree.content(e.next_content()?).ok()?;
        let active = tree.content(e.active_content()).ok()?;
        let context = |name: &str, parameters| LifecycleContext {
            endpoint: name.to_string(),
            parameters,
            navigation: self.navigation.clone(),
        };

        let mut unloads = Vec::new();
        if let Some(instance) = active.instance() {
            unloads.push((
                context(e.name(), active.instruction().parameters.clone()),
                instance.clone(),
            ));
        }
        if action == TransitionAction::Swap {
            for (name, instance, parameters) in tree.descendant_components(active.scope()) {
                unloads.push((context(&name, parameters), instance));
            }
        }

        let load = next.instance().map(|instance| {
            (
                context(e.name(), next.instruction().parameters.clone()),
                instance.clone(),
            )
        });

        let connect = match (action, next.component_type(), next.instance()) {
            (TransitionAction::Swap, Some(component_type), Some(instance))
                if !component_type.endpoints().is_empty() =>
            {
                Some((next.scope(), component_type.clone(), instance.clone()))
            }
            _ => None,
        };

        Some(TransitionPlan {
            endpoint,
            unloads,
            load,
            connect,
        })
    }

    /// Add the endpoints a loaded component declares and queue their
    /// defaults.
    pub(crate) fn connect_endpoints(
        &self,
        scope: ScopeId,
        component_type: &ComponentType,
    ) -> Result<()> {
        let separators = &self.options.separators;
        let mut defaults = Vec::new();
        {
            let mut tree = self.tree.lock();
            // Rolled back before the component attached.
            if tree.scope(scope).is_err() {
                return Ok(());
            }
            let owning = tree.scope_of(scope);
            for declaration in component_type.endpoints() {
                let endpoint = tree.add_endpoint(
                    scope,
                    declaration.kind,
                    &declaration.name,
                    declaration.options.clone(),
                    Vec::new(),
                )?;
                let Some(default) = declaration
                    .options
                    .default
                    .as_deref()
                    .filter(|d| !d.is_empty())
                else {
                    continue;
                };
                for mut instruction in instruction::parse(default, separators)? {
                    instruction.endpoint.set(declaration.name.as_str(), endpoint);
                    instruction.scope = Some(owning);
                    instruction.default = true;
                    defaults.push(instruction);
                }
            }
        }
        tracing::debug!(
            target: targets::COORDINATOR,
            component = component_type.name(),
            defaults = defaults.len(),
            "connected endpoints"
        );
        self.append_instructions(defaults);
        Ok(())
    }
}
