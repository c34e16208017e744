//! Integration tests driving navigations through the public router API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::json;
use trellis_router::{
    ComponentType, EndpointDeclaration, EndpointOptions, HookResult, LifecycleContext,
    RoutableComponent, RouteConfig, RouteTable, Router, RouterError, RouterOptions,
};

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn router_with(components: &[&str]) -> Router {
    let router = Router::new(RouterOptions::default());
    for name in components {
        router.register_component(ComponentType::plain(*name));
    }
    router
}

/// Refuses to be unloaded.
struct Sticky;

#[async_trait]
impl RoutableComponent for Sticky {
    async fn can_unload(&self, _context: &LifecycleContext) -> bool {
        false
    }
}

/// Counts loads and unloads.
struct Tracked {
    loads: Arc<AtomicUsize>,
    unloads: Arc<AtomicUsize>,
}

#[async_trait]
impl RoutableComponent for Tracked {
    async fn load(&self, _context: &LifecycleContext) -> trellis_router::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self, _context: &LifecycleContext) -> trellis_router::Result<()> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Attaches its endpoints some time after loading.
struct SlowShell;

impl RoutableComponent for SlowShell {
    fn attached(&self) -> Option<BoxFuture<'static, ()>> {
        Some(Box::pin(tokio::time::sleep(Duration::from_millis(10))))
    }
}

#[tokio::test]
async fn test_single_instruction_loads_into_only_viewport() {
    setup();
    let router = router_with(&["home"]);
    let main = router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    let result = router.load("home").await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.changed_endpoints, vec![main]);
    assert_eq!(result.path, "home");
    assert_eq!(router.active_component(main).as_deref(), Some("home"));
    assert_eq!(router.state().get("path"), json!("home"));
    assert_eq!(router.state().get("navigating"), json!(false));
}

#[tokio::test]
async fn test_siblings_and_clearing_unnamed_endpoints() {
    setup();
    let router = router_with(&["a", "b", "c"]);
    let root = router.root_scope();
    let left = router.add_viewport(root, "left", EndpointOptions::default()).unwrap();
    let right = router.add_viewport(root, "right", EndpointOptions::default()).unwrap();

    router.load("a@left+b@right").await.unwrap();
    assert_eq!(router.active_instruction(), "a@left+b@right");

    let result = router.load("c@left").await.unwrap();
    assert!(result.changed_endpoints.contains(&left));
    assert!(result.changed_endpoints.contains(&right));
    assert_eq!(router.active_component(left).as_deref(), Some("c"));
    assert_eq!(router.active_component(right), None);
    assert_eq!(router.active_instruction(), "c@left");
}

#[tokio::test]
async fn test_clear_all_clears_every_endpoint() {
    setup();
    let router = router_with(&["a", "b"]);
    let root = router.root_scope();
    let left = router.add_viewport(root, "left", EndpointOptions::default()).unwrap();
    let right = router.add_viewport(root, "right", EndpointOptions::default()).unwrap();
    router.load("a@left+b@right").await.unwrap();

    let result = router.load("-").await.unwrap();

    assert!(result.is_completed());
    assert!(result.changed_endpoints.contains(&left));
    assert!(result.changed_endpoints.contains(&right));
    assert_eq!(router.active_component(left), None);
    assert_eq!(router.active_component(right), None);
    assert_eq!(router.active_instruction(), "");
}

#[tokio::test]
async fn test_explicit_clear_of_one_endpoint() {
    setup();
    let router = router_with(&["a", "b"]);
    let root = router.root_scope();
    let left = router.add_viewport(root, "left", EndpointOptions::default()).unwrap();
    let right = router.add_viewport(root, "right", EndpointOptions::default()).unwrap();
    router.load("a@left+b@right").await.unwrap();

    router.load("-@right+a@left").await.unwrap();

    assert_eq!(router.active_component(left).as_deref(), Some("a"));
    assert_eq!(router.active_component(right), None);
}

#[tokio::test]
async fn test_nested_component_endpoints() {
    setup();
    let router = router_with(&["page"]);
    router.register_component(
        ComponentType::plain("shell")
            .with_endpoint(EndpointDeclaration::viewport("content", EndpointOptions::default())),
    );
    let main = router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    router.load("shell/page").await.unwrap();

    assert_eq!(router.active_instruction(), "shell/page");
    let inner = router.endpoint_scope(main).unwrap();
    let content = router.find_endpoint(inner, "content").unwrap();
    assert_eq!(router.active_component(content).as_deref(), Some("page"));
}

#[tokio::test]
async fn test_component_endpoint_default_is_loaded() {
    setup();
    let router = router_with(&["home"]);
    let options = EndpointOptions::default().with_default("home");
    router.register_component(
        ComponentType::plain("shell")
            .with_endpoint(EndpointDeclaration::viewport("content", options)),
    );
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    router.load("shell").await.unwrap();

    assert_eq!(router.active_instruction(), "shell/home");
}

#[tokio::test]
async fn test_explicit_child_beats_default() {
    setup();
    let router = router_with(&["home", "about"]);
    let options = EndpointOptions::default().with_default("home");
    router.register_component(
        ComponentType::plain("shell")
            .with_endpoint(EndpointDeclaration::viewport("content", options)),
    );
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    router.load("shell/about").await.unwrap();

    assert_eq!(router.active_instruction(), "shell/about");
}

#[tokio::test]
async fn test_pending_attach_connects_before_defaults() {
    setup();
    let router = router_with(&["home"]);
    let options = EndpointOptions::default().with_default("home");
    router.register_component(
        ComponentType::new("shell", || Arc::new(SlowShell) as Arc<dyn RoutableComponent>)
            .with_endpoint(EndpointDeclaration::viewport("content", options)),
    );
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    router.load("shell").await.unwrap();

    assert_eq!(router.active_instruction(), "shell/home");
}

#[tokio::test]
async fn test_startup_default_loads_with_first_navigation() {
    setup();
    let router = router_with(&["home", "other"]);
    let main = router
        .add_viewport(
            router.root_scope(),
            "main",
            EndpointOptions::default().with_default("home"),
        )
        .unwrap();

    router.load("").await.unwrap();
    assert_eq!(router.active_component(main).as_deref(), Some("home"));

    router.load("other").await.unwrap();
    assert_eq!(router.active_component(main).as_deref(), Some("other"));
}

#[tokio::test]
async fn test_pass_through_scope_exposes_inner_viewport() {
    setup();
    let router = router_with(&["page"]);
    let frame = router
        .add_viewport_scope(
            router.root_scope(),
            "frame",
            EndpointOptions::default().with_pass_through(true),
        )
        .unwrap();
    let frame_scope = router.endpoint_scope(frame).unwrap();
    let inner = router
        .add_viewport(frame_scope, "inner", EndpointOptions::default())
        .unwrap();

    assert_eq!(router.find_endpoint(router.root_scope(), "inner"), Some(inner));

    router.load("page").await.unwrap();

    assert_eq!(router.active_component(inner).as_deref(), Some("page"));
    assert_eq!(router.active_instruction(), "page");
}

#[tokio::test]
async fn test_unload_veto_cancels_navigation() {
    setup();
    let router = router_with(&["home"]);
    router.register_component(ComponentType::new("sticky", || {
        Arc::new(Sticky) as Arc<dyn RoutableComponent>
    }));
    let main = router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();
    router.load("sticky").await.unwrap();

    let result = router.load("home").await.unwrap();

    assert!(result.is_cancelled());
    assert!(result.changed_endpoints.is_empty());
    assert_eq!(router.active_component(main).as_deref(), Some("sticky"));
    assert_eq!(router.active_instruction(), "sticky");
    assert_eq!(router.state().get("navigating"), json!(false));
}

fn tracked(name: &str, loads: &Arc<AtomicUsize>, unloads: &Arc<AtomicUsize>) -> ComponentType {
    let (loads, unloads) = (loads.clone(), unloads.clone());
    ComponentType::new(name, move || {
        Arc::new(Tracked {
            loads: loads.clone(),
            unloads: unloads.clone(),
        }) as Arc<dyn RoutableComponent>
    })
}

#[tokio::test]
async fn test_veto_in_sibling_scope_stops_every_transition() {
    setup();
    let first = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let second = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let router = router_with(&["home"]);
    router.register_component(
        ComponentType::plain("shell")
            .with_endpoint(EndpointDeclaration::viewport("content", EndpointOptions::default())),
    );
    router.register_component(tracked("a1", &first.0, &first.1));
    router.register_component(tracked("a2", &second.0, &second.1));
    router.register_component(ComponentType::new("sticky", || {
        Arc::new(Sticky) as Arc<dyn RoutableComponent>
    }));
    let root = router.root_scope();
    let left = router.add_viewport(root, "left", EndpointOptions::default()).unwrap();
    let right = router.add_viewport(root, "right", EndpointOptions::default()).unwrap();

    router.load("shell@left/a1+shell@right/sticky").await.unwrap();
    assert_eq!(first.0.load(Ordering::SeqCst), 1);

    let result = router.load("shell@left/a2+shell@right/home").await.unwrap();

    assert!(result.is_cancelled());
    assert_eq!(first.1.load(Ordering::SeqCst), 0);
    assert_eq!(second.0.load(Ordering::SeqCst), 0);
    let left_content = router
        .find_endpoint(router.endpoint_scope(left).unwrap(), "content")
        .unwrap();
    let right_content = router
        .find_endpoint(router.endpoint_scope(right).unwrap(), "content")
        .unwrap();
    assert_eq!(router.active_component(left_content).as_deref(), Some("a1"));
    assert_eq!(router.active_component(right_content).as_deref(), Some("sticky"));
}

#[tokio::test]
async fn test_swap_runs_lifecycle_once_per_instance() {
    setup();
    let loads = Arc::new(AtomicUsize::new(0));
    let unloads = Arc::new(AtomicUsize::new(0));
    let (l, u) = (loads.clone(), unloads.clone());
    let router = router_with(&["other"]);
    router.register_component(ComponentType::new("tracked", move || {
        Arc::new(Tracked {
            loads: l.clone(),
            unloads: u.clone(),
        }) as Arc<dyn RoutableComponent>
    }));
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    router.load("tracked").await.unwrap();
    router.load("tracked").await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    router.load("other").await.unwrap();
    assert_eq!(unloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hook_cancel_and_replace() {
    setup();
    let router = router_with(&["home", "login"]);
    let main = router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    let cancel = router.hooks().add_fn(|_, _| HookResult::Cancel);
    let result = router.load("home").await.unwrap();
    assert!(result.is_cancelled());
    assert_eq!(router.active_component(main), None);
    assert!(router.hooks().remove(cancel));

    router.hooks().add_fn(|instructions, _| {
        if instructions.iter().any(|i| i.component.name() == Some("home")) {
            let login = trellis_router::RoutingInstruction::new("login");
            HookResult::Replace(vec![login])
        } else {
            HookResult::Proceed
        }
    });
    router.load("home").await.unwrap();
    assert_eq!(router.active_component(main).as_deref(), Some("login"));
}

#[tokio::test]
async fn test_configured_route_with_parameter() {
    setup();
    let router = Router::with_routes(
        RouterOptions::default(),
        vec![RouteConfig::new("users/:id", "user")],
    )
    .unwrap();
    router.register_component(ComponentType::plain("user"));
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    let result = router.load("users/42").await.unwrap();

    assert!(result.is_completed());
    assert_eq!(router.active_instruction(), "user(id=42)");
}

#[tokio::test]
async fn test_redirect_and_redirect_loop() {
    setup();
    let table = RouteTable::from_json_str(
        r#"[
            { "path": "users/:id", "component": "user" },
            { "path": "old", "redirectTo": "users/7" },
            { "path": "ping", "redirectTo": "pong" },
            { "path": "pong", "redirectTo": "ping" }
        ]"#,
    )
    .unwrap();
    let router = Router::with_routes(RouterOptions::default(), table.routes).unwrap();
    router.register_component(ComponentType::plain("user"));
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();

    router.load("old").await.unwrap();
    assert_eq!(router.active_instruction(), "user(id=7)");

    let err = router.load("ping").await.unwrap_err();
    assert!(matches!(err, RouterError::RedirectLoop { limit: 10, .. }));
    assert_eq!(router.active_instruction(), "user(id=7)");
}

#[tokio::test]
async fn test_unknown_route_messages() {
    setup();
    let router = router_with(&[]);
    router
        .add_viewport(router.root_scope(), "main", EndpointOptions::default())
        .unwrap();
    let err = router.load("missing").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No matching configured route or component found for 'missing'"
    );

    let configured_only = Router::new(RouterOptions::default().with_direct_routing(false));
    configured_only
        .add_viewport(configured_only.root_scope(), "main", EndpointOptions::default())
        .unwrap();
    let err = configured_only.load("missing").await.unwrap_err();
    assert_eq!(err.to_string(), "No matching configured route found for 'missing'");
}

#[tokio::test]
async fn test_fallback_component_for_unknown_name() {
    setup();
    let loads = Arc::new(AtomicUsize::new(0));
    let l = loads.clone();
    let router = router_with(&[]);
    router.register_component(ComponentType::new("not-found", move || {
        Arc::new(Tracked {
            loads: l.clone(),
            unloads: Arc::new(AtomicUsize::new(0)),
        }) as Arc<dyn RoutableComponent>
    }));
    let main = router
        .add_viewport(
            router.root_scope(),
            "main",
            EndpointOptions::default().with_fallback("not-found"),
        )
        .unwrap();

    router.load("nowhere").await.unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(router.active_component(main).as_deref(), Some("nowhere"));
}

#[tokio::test]
async fn test_failed_navigation_keeps_startup_defaults() {
    setup();
    let router = router_with(&["home"]);
    let main = router
        .add_viewport(
            router.root_scope(),
            "main",
            EndpointOptions::default().with_default("home"),
        )
        .unwrap();

    assert!(router.load("missing").await.is_err());
    assert_eq!(router.active_component(main), None);

    router.load("").await.unwrap();
    assert_eq!(router.active_component(main).as_deref(), Some("home"));
}
