//! The router: endpoint registration and navigation entry points.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use trellis_core::{batch, ObservableObject, ObservationResult};

use crate::component::{ComponentRegistry, ComponentType};
use crate::config::RouterOptions;
use crate::coordinator::NavigationCoordinator;
use crate::endpoint::{EndpointDeclaration, EndpointKind, EndpointOptions};
use crate::error::Result;
use crate::hooks::{BeforeNavigationHook, HookId, RoutingHooks};
use crate::instruction::{self, RoutingInstruction};
use crate::logging::{targets, RoutingTreeDebug};
use crate::navigation::{Navigation, NavigationOutcome, NavigationResult};
use crate::route::{Route, RouteConfig};
use crate::tree::{EndpointId, RoutingTree, ScopeId};

/// Shared router state.
pub(crate) struct RouterInner {
    pub(crate) options: Arc<RouterOptions>,
    pub(crate) tree: Arc<Mutex<RoutingTree>>,
    pub(crate) components: ComponentRegistry,
    pub(crate) hooks: RoutingHooks,
    navigation_lock: tokio::sync::Mutex<()>,
    state: Arc<ObservableObject>,
    timestamp: AtomicU64,
    /// Defaults of endpoints added outside a navigation, loaded by the next
    /// one.
    startup: Mutex<Vec<RoutingInstruction>>,
}

impl RouterInner {
    fn publish_state(&self, path: Option<&str>, navigating: bool) {
        let published = batch(|| -> ObservationResult<()> {
            if let Some(path) = path {
                self.state.set("path", json!(path))?;
            }
            self.state.set("navigating", json!(navigating))
        });
        if let Err(err) = published {
            tracing::warn!(target: targets::ROUTER, %err, "failed to publish router state");
        }
    }

    fn active_instruction(&self) -> String {
        let tree = self.tree.lock();
        let instructions = tree.routing_instructions(tree.root(), u64::MAX);
        instruction::stringify(&instructions, &self.options.separators)
    }
}

/// A hierarchical router.
///
/// Cloning gives another handle to the same router. Navigations are
/// serialized: a navigation requested while another runs waits for it.
///
/// # Example
///
/// ```
/// # tokio_test_block(async {
/// use trellis_router::{ComponentType, EndpointOptions, Router, RouterOptions};
///
/// let router = Router::new(RouterOptions::default());
/// router.register_component(ComponentType::plain("home"));
/// router.add_viewport(router.root_scope(), "main", EndpointOptions::default()).unwrap();
///
/// let result = router.load("home").await.unwrap();
/// assert!(result.is_completed());
/// assert_eq!(router.active_instruction(), "home");
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// A router without configured routes.
    pub fn new(options: RouterOptions) -> Self {
        Self::from_parts(options, Vec::new())
    }

    /// A router matching `routes` at the top level.
    pub fn with_routes(options: RouterOptions, routes: Vec<RouteConfig>) -> Result<Self> {
        let compiled = Route::compile_all(&routes, &options.separators)?;
        Ok(Self::from_parts(options, compiled))
    }

    fn from_parts(options: RouterOptions, routes: Vec<Arc<Route>>) -> Self {
        tracing::debug!(
            target: targets::ROUTER,
            routes = routes.len(),
            direct = options.use_direct_routing,
            configured = options.use_configured_routes,
            "router created"
        );
        Self {
            inner: Arc::new(RouterInner {
                options: Arc::new(options),
                tree: Arc::new(Mutex::new(RoutingTree::new(routes))),
                components: ComponentRegistry::new(),
                hooks: RoutingHooks::new(),
                navigation_lock: tokio::sync::Mutex::new(()),
                state: Arc::new(ObservableObject::from_json(json!({
                    "path": "",
                    "navigating": false,
                }))),
                timestamp: AtomicU64::new(0),
                startup: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The router options.
    pub fn options(&self) -> &RouterOptions {
        &self.inner.options
    }

    /// Register a component type. Returns the type previously registered
    /// under the same name.
    pub fn register_component(&self, component: ComponentType) -> Option<Arc<ComponentType>> {
        self.inner.components.register(component)
    }

    /// The component registry.
    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.components
    }

    /// The root routing scope.
    pub fn root_scope(&self) -> ScopeId {
        self.inner.tree.lock().root()
    }

    /// Add a viewport to `parent`.
    pub fn add_viewport(
        &self,
        parent: ScopeId,
        name: &str,
        options: EndpointOptions,
    ) -> Result<EndpointId> {
        self.add_endpoint(parent, EndpointDeclaration::viewport(name, options))
    }

    /// Add a viewport scope to `parent`.
    pub fn add_viewport_scope(
        &self,
        parent: ScopeId,
        name: &str,
        options: EndpointOptions,
    ) -> Result<EndpointId> {
        self.add_endpoint(parent, EndpointDeclaration::viewport_scope(name, options))
    }

    /// Add an endpoint to `parent`. Its default, if any, is loaded by the
    /// next navigation.
    pub fn add_endpoint(
        &self,
        parent: ScopeId,
        declaration: EndpointDeclaration,
    ) -> Result<EndpointId> {
        let separators = &self.inner.options.separators;
        let (endpoint, owner) = {
            let mut tree = self.inner.tree.lock();
            let endpoint = tree.add_endpoint(
                parent,
                declaration.kind,
                &declaration.name,
                declaration.options.clone(),
                Vec::new(),
            )?;
            (endpoint, tree.scope_of(parent))
        };

        if let Some(default) = declaration.options.default.as_deref().filter(|d| !d.is_empty()) {
            let mut defaults = instruction::parse(default, separators)?;
            for instruction in &mut defaults {
                instruction.endpoint.set(declaration.name.as_str(), endpoint);
                instruction.scope = Some(owner);
                instruction.default = true;
            }
            self.inner.startup.lock().extend(defaults);
        }
        Ok(endpoint)
    }

    /// Remove an endpoint and everything below it.
    pub fn remove_endpoint(&self, endpoint: EndpointId) -> Result<()> {
        self.inner.tree.lock().remove_endpoint(endpoint)?;
        self.inner
            .startup
            .lock()
            .retain(|instruction| instruction.endpoint.instance != Some(endpoint));
        Ok(())
    }

    /// Append a before-navigation hook.
    pub fn add_hook(&self, hook: impl BeforeNavigationHook + 'static) -> HookId {
        self.inner.hooks.add(hook)
    }

    /// The hook chain.
    pub fn hooks(&self) -> &RoutingHooks {
        &self.inner.hooks
    }

    /// Observable router state with the keys `path` and `navigating`.
    pub fn state(&self) -> &Arc<ObservableObject> {
        &self.inner.state
    }

    /// Navigate to instruction text.
    pub async fn load(&self, instruction: &str) -> Result<NavigationResult> {
        let instructions = instruction::parse(instruction, &self.inner.options.separators)?;
        self.navigate(instruction.to_string(), instructions).await
    }

    /// Navigate with already built instructions.
    pub async fn load_instructions(
        &self,
        instructions: Vec<RoutingInstruction>,
    ) -> Result<NavigationResult> {
        let text = instruction::stringify(&instructions, &self.inner.options.separators);
        self.navigate(text, instructions).await
    }

    #[tracing::instrument(
        level = "debug",
        target = "trellis_router::navigation",
        skip(self, instructions),
        fields(timestamp = tracing::field::Empty)
    )]
    async fn navigate(
        &self,
        text: String,
        instructions: Vec<RoutingInstruction>,
    ) -> Result<NavigationResult> {
        let inner = &self.inner;
        let _serial = inner.navigation_lock.lock().await;

        let timestamp = inner.timestamp.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::Span::current().record("timestamp", timestamp);
        let startup = std::mem::take(&mut *inner.startup.lock());
        let mut navigation = Navigation::new(text, timestamp);
        navigation.is_startup = !startup.is_empty();

        let coordinator = NavigationCoordinator::new(
            navigation.clone(),
            inner.tree.clone(),
            inner.options.clone(),
        );
        coordinator.append_instructions(startup.clone());
        inner.publish_state(None, true);

        let root = inner.tree.lock().root();
        let processed = inner
            .process_instructions(root, instructions, &navigation, &coordinator, None, None)
            .await;

        match processed {
            Err(err) => {
                coordinator.cancel_navigation();
                inner.startup.lock().extend(startup);
                inner.publish_state(None, false);
                tracing::warn!(target: targets::NAVIGATION, %err, "navigation failed");
                Err(err)
            }
            Ok(_) if coordinator.cancelled() => {
                inner.startup.lock().extend(startup);
                inner.publish_state(None, false);
                tracing::debug!(target: targets::NAVIGATION, "navigation cancelled");
                Ok(NavigationResult {
                    outcome: NavigationOutcome::Cancelled,
                    changed_endpoints: Vec::new(),
                    path: inner.active_instruction(),
                })
            }
            Ok(changed_endpoints) => {
                coordinator.finalize();
                let path = inner.active_instruction();
                inner.publish_state(Some(&path), false);
                tracing::debug!(
                    target: targets::NAVIGATION,
                    %path,
                    changed = changed_endpoints.len(),
                    "navigation completed"
                );
                Ok(NavigationResult {
                    outcome: NavigationOutcome::Completed,
                    changed_endpoints,
                    path,
                })
            }
        }
    }

    /// The instruction text describing everything currently loaded.
    pub fn active_instruction(&self) -> String {
        self.inner.active_instruction()
    }

    /// The routing tree rendered for debugging.
    pub fn debug_tree(&self) -> String {
        RoutingTreeDebug::new().format(&self.inner.tree.lock())
    }

    /// Run `f` with the routing tree locked.
    pub fn with_tree<R>(&self, f: impl FnOnce(&RoutingTree) -> R) -> R {
        f(&self.inner.tree.lock())
    }

    /// Whether `endpoint` currently shows a component, and which.
    pub fn active_component(&self, endpoint: EndpointId) -> Option<String> {
        self.inner.tree.lock().active_component(endpoint).map(str::to_string)
    }

    /// Find an endpoint by name among those owned by `scope`.
    pub fn find_endpoint(&self, scope: ScopeId, name: &str) -> Option<EndpointId> {
        self.inner.tree.lock().find_endpoint(scope, name)
    }

    /// The scope nested endpoints of `endpoint` are added to.
    pub fn endpoint_scope(&self, endpoint: EndpointId) -> Result<ScopeId> {
        self.inner.tree.lock().endpoint_scope(endpoint)
    }

    /// Names and kinds of the endpoints owned by `scope`.
    pub fn endpoints(&self, scope: ScopeId) -> Vec<(String, EndpointKind)> {
        let tree = self.inner.tree.lock();
        tree.owned_endpoints(scope)
            .into_iter()
            .filter_map(|e| tree.endpoint(e).ok().map(|e| (e.name().to_string(), e.kind())))
            .collect()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.inner.options)
            .field("components", &self.inner.components.names())
            .field("hooks", &self.inner.hooks.len())
            .finish()
    }
}
