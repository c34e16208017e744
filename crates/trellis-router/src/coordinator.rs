//! Cross-endpoint synchronization of one navigation.
//!
//! Every endpoint whose content changes is registered with the
//! [`NavigationCoordinator`], which runs the transitions of all registered
//! endpoints in lock-step phases (see [`SyncState`]), keeps instructions
//! appended while the navigation runs (endpoint defaults, mostly) and the
//! endpoints of loaded components that are not connected yet.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::component::ComponentType;
use crate::config::RouterOptions;
use crate::endpoint::TransitionAction;
use crate::error::Result;
use crate::instruction::RoutingInstruction;
use crate::logging::targets;
use crate::navigation::Navigation;
use crate::tree::{EndpointId, RoutingTree, ScopeId};

/// Phases every registered endpoint passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncState {
    /// Every `can_unload` has settled.
    GuardedUnload,
    /// Every `can_load` has settled.
    GuardedLoad,
    /// Old contents are unloaded.
    Unloaded,
    /// New contents are loaded.
    Loaded,
    /// New contents are active.
    Swapped,
    /// The transition is done.
    Completed,
}

/// The answer to [`NavigationCoordinator::wait_for_sync_state`].
#[derive(Debug)]
pub enum SyncWait {
    /// Every endpoint has reached the state.
    Reached,
    /// Resolves once they have.
    Pending(oneshot::Receiver<()>),
}

impl SyncWait {
    /// Wait until the state is reached.
    pub async fn wait(self) {
        if let Self::Pending(receiver) = self {
            let _ = receiver.await;
        }
    }
}

/// A loaded component whose endpoints connect once it is attached.
pub struct PendingConnection {
    /// The scope the component's endpoints are added to.
    pub scope: ScopeId,
    /// The loaded component type.
    pub component_type: Arc<ComponentType>,
    pub(crate) attached: BoxFuture<'static, ()>,
}

impl fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConnection")
            .field("scope", &self.scope)
            .field("component", &self.component_type.name())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct CoordinatorEntry {
    pub(crate) endpoint: EndpointId,
    pub(crate) action: TransitionAction,
    pub(crate) reached: BTreeSet<SyncState>,
    pub(crate) running: bool,
}

#[derive(Debug)]
struct Waiter {
    state: SyncState,
    barrier: bool,
    sender: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
pub(crate) struct CoordinatorState {
    pub(crate) entries: Vec<CoordinatorEntry>,
    waiters: Vec<Waiter>,
    has_all_endpoints: bool,
    /// Scopes that may still register endpoints for the current phase.
    registering: usize,
    pub(crate) running: usize,
    pub(crate) cancelled: bool,
    appended: Vec<RoutingInstruction>,
    pub(crate) pending: Vec<PendingConnection>,
}

impl CoordinatorState {
    fn reached(&self, state: SyncState) -> bool {
        self.entries.iter().all(|entry| entry.reached.contains(&state))
    }

    /// Every endpoint is being run and reached `state`, and no scope can
    /// still add one.
    fn settled(&self, state: SyncState) -> bool {
        self.registering == 0
            && self
                .entries
                .iter()
                .all(|entry| entry.running && entry.reached.contains(&state))
    }

    fn released(&self, waiter: &Waiter) -> bool {
        self.cancelled
            || if waiter.barrier {
                self.settled(waiter.state)
            } else {
                self.reached(waiter.state)
            }
    }
}

/// A scope that is still registering endpoints with a coordinator.
///
/// Transitions past a guard phase wait until every registration is
/// dropped, so a scope processed in parallel can still veto.
#[must_use]
pub(crate) struct Registration {
    state: Arc<Mutex<CoordinatorState>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut inner = self.state.lock();
        inner.registering = inner.registering.saturating_sub(1);
        NavigationCoordinator::release_waiters(&mut inner);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").finish_non_exhaustive()
    }
}

/// Coordinates the endpoint transitions of one navigation.
///
/// Cloning gives another handle to the same coordinator.
#[derive(Clone)]
pub struct NavigationCoordinator {
    pub(crate) navigation: Navigation,
    pub(crate) tree: Arc<Mutex<RoutingTree>>,
    pub(crate) options: Arc<RouterOptions>,
    pub(crate) state: Arc<Mutex<CoordinatorState>>,
}

impl NavigationCoordinator {
    /// A coordinator for `navigation` over `tree`.
    pub fn new(
        navigation: Navigation,
        tree: Arc<Mutex<RoutingTree>>,
        options: Arc<RouterOptions>,
    ) -> Self {
        Self {
            navigation,
            tree,
            options,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        }
    }

    /// The navigation being coordinated.
    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    /// Register an endpoint whose content changes.
    pub fn add_endpoint(&self, endpoint: EndpointId, action: TransitionAction) {
        let mut state = self.state.lock();
        match state.entries.iter_mut().find(|entry| entry.endpoint == endpoint) {
            Some(entry) => {
                entry.action = action;
                entry.reached.clear();
                entry.running = false;
            }
            None => state.entries.push(CoordinatorEntry {
                endpoint,
                action,
                reached: BTreeSet::new(),
                running: false,
            }),
        }
        tracing::trace!(target: targets::COORDINATOR, ?action, "endpoint registered");
    }

    /// Registered endpoints.
    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.state.lock().entries.iter().map(|entry| entry.endpoint).collect()
    }

    /// Declare that every endpoint of the current pass is registered.
    pub fn final_endpoint(&self) {
        self.state.lock().has_all_endpoints = true;
    }

    /// Whether [`final_endpoint`](Self::final_endpoint) was called and no
    /// nested scope is still registering endpoints.
    pub fn has_all_endpoints(&self) -> bool {
        let inner = self.state.lock();
        inner.has_all_endpoints && inner.registering == 0
    }

    /// Hold back the guard barrier until the returned registration is
    /// dropped.
    pub(crate) fn registration(&self) -> Registration {
        self.state.lock().registering += 1;
        Registration {
            state: self.state.clone(),
        }
    }

    /// Whether transitions are being run.
    pub fn running(&self) -> bool {
        self.state.lock().running > 0
    }

    /// Whether the navigation was cancelled.
    pub fn cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Resolve now if every registered endpoint reached `state`, otherwise
    /// hand out a receiver that resolves when they have.
    pub fn wait_for_sync_state(&self, state: SyncState) -> SyncWait {
        let mut inner = self.state.lock();
        if inner.cancelled || inner.reached(state) {
            return SyncWait::Reached;
        }
        let (sender, receiver) = oneshot::channel();
        inner.waiters.push(Waiter {
            state,
            barrier: false,
            sender,
        });
        SyncWait::Pending(receiver)
    }

    /// Like [`wait_for_sync_state`](Self::wait_for_sync_state), but also
    /// waits for endpoints registered and not yet run, and for scopes that
    /// are still registering.
    pub(crate) fn wait_for_barrier(&self, state: SyncState) -> SyncWait {
        let mut inner = self.state.lock();
        if inner.cancelled || inner.settled(state) {
            return SyncWait::Reached;
        }
        let (sender, receiver) = oneshot::channel();
        inner.waiters.push(Waiter {
            state,
            barrier: true,
            sender,
        });
        SyncWait::Pending(receiver)
    }

    /// Record that `endpoints` reached `state` and release waiters.
    pub(crate) fn mark_reached(&self, endpoints: &[EndpointId], state: SyncState) {
        let mut inner = self.state.lock();
        for entry in inner
            .entries
            .iter_mut()
            .filter(|entry| endpoints.contains(&entry.endpoint))
        {
            entry.reached.insert(state);
        }
        Self::release_waiters(&mut inner);
    }

    fn release_waiters(inner: &mut CoordinatorState) {
        let waiters = std::mem::take(&mut inner.waiters);
        for waiter in waiters {
            if inner.released(&waiter) {
                let _ = waiter.sender.send(());
            } else {
                inner.waiters.push(waiter);
            }
        }
    }

    /// Cancel the navigation and roll back every registered endpoint.
    pub fn cancel_navigation(&self) {
        let endpoints: Vec<EndpointId> = {
            let mut inner = self.state.lock();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            inner.appended.clear();
            inner.pending.clear();
            Self::release_waiters(&mut inner);
            inner.entries.iter().map(|entry| entry.endpoint).collect()
        };

        let mut tree = self.tree.lock();
        for endpoint in endpoints.into_iter().rev() {
            if let Err(err) = tree.rollback_endpoint(endpoint) {
                tracing::trace!(target: targets::COORDINATOR, %err, "rollback skipped");
            }
        }
        tracing::debug!(
            target: targets::COORDINATOR,
            navigation = %self.navigation.instruction,
            "navigation cancelled"
        );
    }

    /// Drop replaced contents of every registered endpoint.
    pub fn finalize(&self) {
        let endpoints = self.endpoints();
        let mut tree = self.tree.lock();
        for endpoint in endpoints {
            if tree.endpoint(endpoint).is_ok()
                && let Err(err) = tree.finalize_endpoint(endpoint)
            {
                tracing::trace!(target: targets::COORDINATOR, %err, "finalize skipped");
            }
        }
        drop(tree);
        let mut inner = self.state.lock();
        for entry in &mut inner.entries {
            entry.reached.insert(SyncState::Completed);
        }
        Self::release_waiters(&mut inner);
    }

    /// Queue instructions for the running navigation.
    pub fn append_instructions(&self, instructions: Vec<RoutingInstruction>) {
        if instructions.is_empty() {
            return;
        }
        tracing::trace!(
            target: targets::COORDINATOR,
            count = instructions.len(),
            "instructions appended"
        );
        self.state.lock().appended.extend(instructions);
    }

    /// Whether instructions are queued.
    pub fn has_appended_instructions(&self) -> bool {
        !self.state.lock().appended.is_empty()
    }

    /// Drop queued endpoint defaults.
    pub fn remove_appended_defaults(&self) {
        self.state.lock().appended.retain(|instruction| !instruction.default);
    }

    /// Resolve deferred components of queued instructions.
    pub async fn resolve_appended_instructions(&self) -> Result<()> {
        let mut taken = {
            let mut inner = self.state.lock();
            if !inner.appended.iter().any(|i| i.component.is_deferred()) {
                return Ok(());
            }
            std::mem::take(&mut inner.appended)
        };
        for instruction in &mut taken {
            instruction.component.resolve().await?;
        }
        let mut inner = self.state.lock();
        taken.append(&mut inner.appended);
        inner.appended = taken;
        Ok(())
    }

    /// Move queued instructions into `matched` (those with a known endpoint)
    /// or `remaining`.
    ///
    /// Non-defaults are dequeued before defaults. A default is dropped when
    /// its endpoint was already targeted earlier in the navigation or by a
    /// non-default in `matched` or `remaining`; otherwise it replaces what
    /// targeted the same endpoint.
    pub fn dequeue_appended_instructions(
        &self,
        matched: &mut Vec<RoutingInstruction>,
        earlier: &[RoutingInstruction],
        remaining: &mut Vec<RoutingInstruction>,
    ) {
        let batch = {
            let mut inner = self.state.lock();
            let take_defaults = inner.appended.iter().all(|i| i.default);
            let (batch, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.appended)
                .into_iter()
                .partition(|i| i.default == take_defaults);
            inner.appended = kept;
            batch
        };

        for instruction in batch {
            let earlier_existing = earlier.iter().any(|i| i.same_endpoint(&instruction, true));
            let matched_at = matched.iter().position(|i| i.same_endpoint(&instruction, true));
            let remaining_at = remaining.iter().position(|i| i.same_endpoint(&instruction, true));

            if instruction.default
                && (earlier_existing
                    || matched_at.is_some_and(|at| !matched[at].default)
                    || remaining_at.is_some_and(|at| !remaining[at].default))
            {
                continue;
            }
            if let Some(at) = matched_at {
                matched.remove(at);
            }
            if let Some(at) = remaining_at {
                remaining.remove(at);
            }
            if instruction.endpoint.instance.is_some() {
                matched.push(instruction);
            } else {
                remaining.push(instruction);
            }
        }
    }

    /// Whether loaded components still wait to be attached.
    pub fn has_pending_connections(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    pub(crate) fn add_pending_connection(&self, pending: PendingConnection) {
        self.state.lock().pending.push(pending);
    }

    /// Wait for the oldest pending component to attach and connect its
    /// endpoints. Returns whether there was one.
    pub async fn connect_first_pending(&self) -> Result<bool> {
        let pending = {
            let mut inner = self.state.lock();
            if inner.pending.is_empty() {
                return Ok(false);
            }
            inner.pending.remove(0)
        };
        pending.attached.await;
        if self.cancelled() {
            return Ok(true);
        }
        self.connect_endpoints(pending.scope, &pending.component_type)?;
        Ok(true)
    }
}

impl fmt::Debug for NavigationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NavigationCoordinator")
            .field("navigation", &self.navigation.instruction)
            .field("entries", &state.entries.len())
            .field("appended", &state.appended.len())
            .field("pending", &state.pending.len())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointKind, EndpointOptions};

    fn coordinator() -> (NavigationCoordinator, Vec<EndpointId>) {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        let ids = ["a", "b"]
            .iter()
            .map(|name| {
                let options = EndpointOptions::default();
                tree.add_endpoint(root, EndpointKind::Viewport, name, options, Vec::new())
                    .unwrap()
            })
            .collect();
        let coordinator = NavigationCoordinator::new(
            Navigation::new("test", 1),
            Arc::new(Mutex::new(tree)),
            Arc::new(RouterOptions::default()),
        );
        (coordinator, ids)
    }

    fn targeted(component: &str, endpoint: EndpointId, name: &str) -> RoutingInstruction {
        let mut instruction = RoutingInstruction::new(component);
        instruction.endpoint.set(name, endpoint);
        instruction
    }

    #[tokio::test]
    async fn test_sync_state_released_when_all_reach() {
        let (coordinator, ids) = coordinator();
        coordinator.add_endpoint(ids[0], TransitionAction::Swap);
        coordinator.add_endpoint(ids[1], TransitionAction::Swap);

        let wait = coordinator.wait_for_sync_state(SyncState::GuardedUnload);
        assert!(matches!(wait, SyncWait::Pending(_)));

        coordinator.mark_reached(&ids[..1], SyncState::GuardedUnload);
        assert!(matches!(
            coordinator.wait_for_sync_state(SyncState::GuardedUnload),
            SyncWait::Pending(_)
        ));
        coordinator.mark_reached(&ids[1..], SyncState::GuardedUnload);

        wait.wait().await;
        assert!(matches!(
            coordinator.wait_for_sync_state(SyncState::GuardedUnload),
            SyncWait::Reached
        ));
    }

    fn is_pending(coordinator: &NavigationCoordinator, state: SyncState) -> bool {
        matches!(coordinator.wait_for_barrier(state), SyncWait::Pending(_))
    }

    #[tokio::test]
    async fn test_barrier_waits_for_registrations_and_unrun_endpoints() {
        let (coordinator, ids) = coordinator();
        coordinator.add_endpoint(ids[0], TransitionAction::Swap);
        coordinator.state.lock().entries[0].running = true;
        coordinator.mark_reached(&ids[..1], SyncState::GuardedUnload);
        assert!(matches!(
            coordinator.wait_for_sync_state(SyncState::GuardedUnload),
            SyncWait::Reached
        ));

        coordinator.final_endpoint();
        let registration = coordinator.registration();
        assert!(!coordinator.has_all_endpoints());
        let wait = coordinator.wait_for_barrier(SyncState::GuardedUnload);
        assert!(matches!(wait, SyncWait::Pending(_)));

        coordinator.add_endpoint(ids[1], TransitionAction::Swap);
        drop(registration);
        assert!(is_pending(&coordinator, SyncState::GuardedUnload));

        coordinator.state.lock().entries[1].running = true;
        assert!(is_pending(&coordinator, SyncState::GuardedUnload));
        coordinator.mark_reached(&ids[1..], SyncState::GuardedUnload);

        wait.wait().await;
        assert!(!is_pending(&coordinator, SyncState::GuardedUnload));
        assert!(is_pending(&coordinator, SyncState::GuardedLoad));
    }

    #[tokio::test]
    async fn test_cancel_releases_barrier() {
        let (coordinator, ids) = coordinator();
        coordinator.add_endpoint(ids[0], TransitionAction::Swap);
        let _registration = coordinator.registration();
        let wait = coordinator.wait_for_barrier(SyncState::GuardedLoad);
        assert!(matches!(wait, SyncWait::Pending(_)));

        coordinator.cancel_navigation();

        wait.wait().await;
        assert!(!is_pending(&coordinator, SyncState::GuardedLoad));
    }

    #[test]
    fn test_finalize_skips_removed_endpoints() {
        let (coordinator, ids) = coordinator();
        {
            let mut tree = coordinator.tree.lock();
            for id in &ids {
                let action = tree
                    .set_next_content(
                        *id,
                        &RoutingInstruction::new("home"),
                        Some(Arc::new(ComponentType::plain("home"))),
                        &coordinator.navigation,
                        &crate::config::Separators::default(),
                    )
                    .unwrap();
                coordinator.add_endpoint(*id, action);
                tree.activate_next(*id).unwrap();
            }
            tree.remove_endpoint(ids[1]).unwrap();
        }

        coordinator.finalize();

        let tree = coordinator.tree.lock();
        let kept = tree.endpoint(ids[0]).unwrap();
        assert_eq!(kept.transition_action(), TransitionAction::None);
        assert!(kept.previous.is_none());
        assert!(tree.endpoint(ids[1]).is_err());
    }

    #[test]
    fn test_defaults_yield_to_non_defaults() {
        let (coordinator, ids) = coordinator();
        coordinator.append_instructions(vec![
            targeted("home", ids[0], "a").as_default(),
            targeted("profile", ids[0], "a"),
        ]);

        let mut matched = Vec::new();
        let mut remaining = Vec::new();
        coordinator.dequeue_appended_instructions(&mut matched, &[], &mut remaining);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].component.name(), Some("profile"));
        assert!(coordinator.has_appended_instructions());

        coordinator.dequeue_appended_instructions(&mut matched, &[], &mut remaining);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].component.name(), Some("profile"));
        assert!(!coordinator.has_appended_instructions());
    }

    #[test]
    fn test_default_skipped_when_matched_earlier() {
        let (coordinator, ids) = coordinator();
        coordinator.append_instructions(vec![targeted("home", ids[1], "b").as_default()]);

        let earlier = vec![targeted("other", ids[1], "b")];
        let mut matched = Vec::new();
        let mut remaining = Vec::new();
        coordinator.dequeue_appended_instructions(&mut matched, &earlier, &mut remaining);

        assert!(matched.is_empty());
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_unbound_instruction_goes_to_remaining() {
        let (coordinator, _) = coordinator();
        coordinator.append_instructions(vec![RoutingInstruction::new("late")]);
        let mut matched = Vec::new();
        let mut remaining = Vec::new();
        coordinator.dequeue_appended_instructions(&mut matched, &[], &mut remaining);
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn test_cancel_releases_and_clears() {
        let (coordinator, ids) = coordinator();
        coordinator.add_endpoint(ids[0], TransitionAction::Swap);
        coordinator.append_instructions(vec![RoutingInstruction::new("x")]);

        coordinator.cancel_navigation();

        assert!(coordinator.cancelled());
        assert!(!coordinator.has_appended_instructions());
        assert!(matches!(
            coordinator.wait_for_sync_state(SyncState::Completed),
            SyncWait::Reached
        ));
    }
}
