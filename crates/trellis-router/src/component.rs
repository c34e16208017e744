//! Routable components and how instructions refer to them.
//!
//! A [`ComponentType`] describes something that can be loaded into a
//! viewport: a factory for instances, the endpoints the component hosts once
//! loaded, its own child routes and how it reacts to being navigated to again.
//! Instances implement [`RoutableComponent`], whose lifecycle hooks all have
//! permissive defaults.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointDeclaration;
use crate::error::Result;
use crate::navigation::Navigation;
use crate::parameters::Parameters;
use crate::route::RouteConfig;

/// What a lifecycle hook is told about the transition it takes part in.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    /// Name of the endpoint the component is (or will be) loaded in.
    pub endpoint: String,
    /// Parameters of the instruction that loaded the component.
    pub parameters: Parameters,
    /// The navigation driving the transition.
    pub navigation: Navigation,
}

/// A component instance that can be routed to.
#[async_trait]
pub trait RoutableComponent: Send + Sync {
    /// Whether the component may be loaded.
    async fn can_load(&self, _context: &LifecycleContext) -> bool {
        true
    }

    /// Called when the component is loaded.
    async fn load(&self, _context: &LifecycleContext) -> Result<()> {
        Ok(())
    }

    /// Whether the component may be unloaded.
    async fn can_unload(&self, _context: &LifecycleContext) -> bool {
        true
    }

    /// Called when the component is unloaded.
    async fn unload(&self, _context: &LifecycleContext) -> Result<()> {
        Ok(())
    }

    /// A future that completes once the component's own endpoints may be
    /// connected. `None` means they can be connected right away.
    fn attached(&self) -> Option<BoxFuture<'static, ()>> {
        None
    }
}

/// What happens when a navigation targets the component already loaded in
/// an endpoint, with different parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReentryBehavior {
    /// Run the lifecycle hooks again on the same instance.
    #[default]
    Default,
    /// Keep the current instance and ignore the navigation.
    Disallow,
    /// Run the lifecycle hooks again on the same instance.
    Reload,
    /// Replace the instance with a fresh one.
    Refresh,
}

type Factory = dyn Fn() -> Arc<dyn RoutableComponent> + Send + Sync;

/// A loadable component description.
pub struct ComponentType {
    name: String,
    factory: Arc<Factory>,
    endpoints: Vec<EndpointDeclaration>,
    routes: Vec<RouteConfig>,
    reentry: ReentryBehavior,
}

impl ComponentType {
    /// Create a component type with a factory for its instances.
    pub fn new(
        name: impl Into<String>,
        factory: impl Fn() -> Arc<dyn RoutableComponent> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            endpoints: Vec::new(),
            routes: Vec::new(),
            reentry: ReentryBehavior::Default,
        }
    }

    /// A component without lifecycle behavior.
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, || Arc::new(PlainComponent) as Arc<dyn RoutableComponent>)
    }

    /// Declare an endpoint the component hosts once loaded.
    pub fn with_endpoint(mut self, declaration: EndpointDeclaration) -> Self {
        self.endpoints.push(declaration);
        self
    }

    /// Routes resolved inside the component's endpoints.
    pub fn with_routes(mut self, routes: Vec<RouteConfig>) -> Self {
        self.routes = routes;
        self
    }

    /// Set the reentry behavior.
    pub fn with_reentry(mut self, reentry: ReentryBehavior) -> Self {
        self.reentry = reentry;
        self
    }

    /// The component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoints the component hosts.
    pub fn endpoints(&self) -> &[EndpointDeclaration] {
        &self.endpoints
    }

    /// The component's child routes.
    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// The reentry behavior.
    pub fn reentry(&self) -> ReentryBehavior {
        self.reentry
    }

    /// Create an instance.
    pub fn create(&self) -> Arc<dyn RoutableComponent> {
        (self.factory)()
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints)
            .field("routes", &self.routes.len())
            .field("reentry", &self.reentry)
            .finish()
    }
}

struct PlainComponent;

impl RoutableComponent for PlainComponent {}

/// Resolves a component type asynchronously.
pub type ComponentResolver =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<ComponentType>>> + Send + Sync>;

/// How an instruction refers to its component.
#[derive(Clone, Default)]
pub enum ComponentRef {
    /// No component.
    #[default]
    None,
    /// A component (or viewport scope) name, resolved through the registry.
    Name(String),
    /// A resolved component type.
    Type(Arc<ComponentType>),
    /// A component type that still has to be resolved.
    Deferred {
        /// Name used until the type is known.
        name: String,
        /// Produces the type.
        resolver: ComponentResolver,
    },
}

impl ComponentRef {
    /// A deferred reference resolved by `resolver`.
    pub fn deferred(
        name: impl Into<String>,
        resolver: impl Fn() -> BoxFuture<'static, Result<Arc<ComponentType>>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::Deferred {
            name: name.into(),
            resolver: Arc::new(resolver),
        }
    }

    /// The component name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Name(name) => Some(name),
            Self::Type(component) => Some(component.name()),
            Self::Deferred { name, .. } => Some(name),
        }
    }

    /// Whether there is no component.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether the reference still needs [`resolve`](Self::resolve).
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    /// The resolved type, if known.
    pub fn component_type(&self) -> Option<&Arc<ComponentType>> {
        match self {
            Self::Type(component) => Some(component),
            _ => None,
        }
    }

    /// Resolve a deferred reference in place.
    pub async fn resolve(&mut self) -> Result<()> {
        if let Self::Deferred { resolver, .. } = self {
            let component = resolver().await?;
            *self = Self::Type(component);
        }
        Ok(())
    }

    /// Whether both refer to the same component name.
    pub fn same_component(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Type(a), Self::Type(b)) if Arc::ptr_eq(a, b) => true,
            _ => self.name().is_some() && self.name() == other.name(),
        }
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Name(name) => write!(f, "Name({name})"),
            Self::Type(component) => write!(f, "Type({})", component.name()),
            Self::Deferred { name, .. } => write!(f, "Deferred({name})"),
        }
    }
}

impl From<&str> for ComponentRef {
    fn from(name: &str) -> Self {
        if name.is_empty() {
            Self::None
        } else {
            Self::Name(name.to_string())
        }
    }
}

impl From<String> for ComponentRef {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<Arc<ComponentType>> for ComponentRef {
    fn from(component: Arc<ComponentType>) -> Self {
        Self::Type(component)
    }
}

/// Component types by name.
#[derive(Default)]
pub struct ComponentRegistry {
    types: RwLock<HashMap<String, Arc<ComponentType>>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, returning the one it replaced.
    pub fn register(&self, component: ComponentType) -> Option<Arc<ComponentType>> {
        let component = Arc::new(component);
        self.types
            .write()
            .insert(component.name().to_string(), component)
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<Arc<ComponentType>> {
        self.types.read().get(name).cloned()
    }

    /// Whether a type is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = ComponentRegistry::new();
        assert!(registry.register(ComponentType::plain("home")).is_none());
        assert!(registry.register(ComponentType::plain("home")).is_some());

        assert!(registry.contains("home"));
        assert_eq!(registry.get("home").map(|c| c.name().to_string()), Some("home".into()));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_component_ref_names() {
        assert!(ComponentRef::from("").is_none());
        let by_name = ComponentRef::from("users");
        let by_type = ComponentRef::from(Arc::new(ComponentType::plain("users")));
        assert!(by_name.same_component(&by_type));
        assert!(!ComponentRef::None.same_component(&ComponentRef::None));
    }

    #[tokio::test]
    async fn test_deferred_resolves_in_place() {
        let mut component = ComponentRef::deferred("lazy", || {
            Box::pin(async { Ok(Arc::new(ComponentType::plain("lazy"))) })
        });
        assert!(component.is_deferred());

        component.resolve().await.unwrap();

        assert!(component.component_type().is_some());
        assert_eq!(component.name(), Some("lazy"));
    }

    #[tokio::test]
    async fn test_default_lifecycle_allows_everything() {
        let component = ComponentType::plain("home").create();
        let context = LifecycleContext {
            endpoint: "default".into(),
            parameters: Parameters::new(),
            navigation: Navigation::new("home", 1),
        };
        assert!(component.can_load(&context).await);
        assert!(component.can_unload(&context).await);
        assert!(component.load(&context).await.is_ok());
        assert!(component.attached().is_none());
    }
}
