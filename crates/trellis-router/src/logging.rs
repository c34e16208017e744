//! Logging facilities for the routing engine.
//!
//! The router logs through `tracing` and never installs a subscriber.
//! Filter by subsystem with the names in [`targets`]:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("trellis_router::navigation=debug,trellis_router::matcher=trace")
//!     .init();
//! ```
//!
//! [`RoutingTreeDebug`] renders the scope tree for inspection:
//!
//! ```ignore
//! let text = router.with_tree(|tree| RoutingTreeDebug::new().format(tree));
//! println!("{text}");
//! ```

use std::fmt::Write;

use crate::config::Separators;
use crate::tree::{RoutingTree, ScopeId};

/// Target names for log filtering.
pub mod targets {
    /// Router target.
    pub const ROUTER: &str = "trellis_router";
    /// Navigation processing.
    pub const NAVIGATION: &str = "trellis_router::navigation";
    /// Scope tree changes.
    pub const SCOPE: &str = "trellis_router::scope";
    /// Endpoint matching.
    pub const MATCHER: &str = "trellis_router::matcher";
    /// Transition coordination.
    pub const COORDINATOR: &str = "trellis_router::coordinator";
    /// Route recognition.
    pub const RECOGNIZER: &str = "trellis_router::recognizer";
    /// Before-navigation hooks.
    pub const HOOKS: &str = "trellis_router::hooks";
}

/// Branch characters used when rendering the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Dashes only.
    Compact,
}

/// Which parent relation the rendering follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeView {
    /// Structural parents, as contents were loaded.
    #[default]
    Structural,
    /// Owning scopes, as instructions are matched.
    Owning,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// Branch characters.
    pub style: TreeStyle,
    /// Parent relation to follow.
    pub view: TreeView,
    /// Show scope ids.
    pub show_ids: bool,
    /// Show scopes whose content is not active.
    pub show_inactive: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            view: TreeView::default(),
            show_ids: false,
            show_inactive: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Everything, including staged and replaced contents.
    pub fn detailed() -> Self {
        Self {
            show_ids: true,
            show_inactive: true,
            ..Default::default()
        }
    }

    /// Ownership view with ASCII branches.
    pub fn owning() -> Self {
        Self {
            style: TreeStyle::Ascii,
            view: TreeView::Owning,
            ..Default::default()
        }
    }
}

/// Renders a [`RoutingTree`] as indented text.
#[derive(Debug, Clone, Default)]
pub struct RoutingTreeDebug {
    options: TreeFormatOptions,
}

impl RoutingTreeDebug {
    /// A renderer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Render the whole tree.
    pub fn format(&self, tree: &RoutingTree) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "Routing Tree ({} scopes, {} endpoints):",
            tree.scope_count(),
            tree.endpoint_count()
        );
        self.format_into(tree, tree.root(), 0, true, &mut output);
        output
    }

    /// Render the tree below `scope`.
    pub fn format_subtree(&self, tree: &RoutingTree, scope: ScopeId) -> String {
        let mut output = String::new();
        self.format_into(tree, scope, 0, true, &mut output);
        output
    }

    fn format_into(
        &self,
        tree: &RoutingTree,
        scope: ScopeId,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(&tree.scope_label(scope));
        if let Some(content) = tree.scope_content(scope) {
            match content.component_name() {
                Some(component) => {
                    let _ = write!(output, " {component}");
                }
                None if tree.is_viewport(scope) => output.push_str(" (empty)"),
                None => {}
            }
            let parameters = &content.instruction().parameters;
            if !parameters.is_empty() {
                let _ = write!(output, "({})", parameters.stringify(&Separators::default()));
            }
            if !content.is_active() {
                output.push_str(" [inactive]");
            }
        }
        if self.options.show_ids {
            let _ = write!(output, " [{scope:?}]");
        }
        output.push('\n');

        let children = self.children(tree, scope);
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.format_into(tree, child, depth + 1, i + 1 == count, output);
        }
    }

    fn children(&self, tree: &RoutingTree, scope: ScopeId) -> Vec<ScopeId> {
        let children: Vec<ScopeId> = match self.options.view {
            TreeView::Structural => tree
                .scope(scope)
                .map(|s| s.children().to_vec())
                .unwrap_or_default(),
            TreeView::Owning => tree
                .all_scopes(scope, true)
                .into_iter()
                .filter(|s| tree.scope(*s).is_ok_and(|s| s.owning_scope() == scope))
                .collect(),
        };
        children
            .into_iter()
            .filter(|child| *child != scope)
            .filter(|child| self.options.show_inactive || tree.is_enabled(*child))
            .collect()
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => (
                "\u{2502}",
                "\u{251c}\u{2500}\u{2500}",
                "\u{2514}\u{2500}\u{2500}",
            ),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            for _ in 0..self.options.indent_size {
                prefix.push(' ');
            }
        }
        prefix.push_str(if is_last { last } else { corner });
        prefix.push(' ');
        prefix
    }
}

/// A guard that keeps a tracing span entered until dropped.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "trellis::perf", "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointKind, EndpointOptions};

    fn tree() -> RoutingTree {
        let mut tree = RoutingTree::new(Vec::new());
        let root = tree.root();
        for name in ["left", "right"] {
            tree.add_endpoint(
                root,
                EndpointKind::Viewport,
                name,
                EndpointOptions::default(),
                Vec::new(),
            )
            .unwrap();
        }
        tree
    }

    #[test]
    fn test_format_lists_endpoints() {
        let output = RoutingTreeDebug::new().format(&tree());
        assert!(output.starts_with("Routing Tree (3 scopes, 3 endpoints):"));
        assert!(output.contains("rootScope:0"));
        assert!(output.contains("\u{251c}\u{2500}\u{2500} left:1 (empty)"));
        assert!(output.contains("\u{2514}\u{2500}\u{2500} right:2 (empty)"));
    }

    #[test]
    fn test_max_depth_stops_at_root() {
        let options = TreeFormatOptions {
            max_depth: Some(0),
            ..TreeFormatOptions::default()
        };
        let output = RoutingTreeDebug::with_options(options).format(&tree());
        assert!(!output.contains("left"));
    }

    #[test]
    fn test_ascii_owning_view() {
        let output = RoutingTreeDebug::with_options(TreeFormatOptions::owning()).format(&tree());
        assert!(output.contains("+-- left:1"));
        assert!(output.contains("`-- right:2"));
    }

    #[test]
    fn test_perf_span_without_subscriber() {
        let _span = PerfSpan::new("noop");
        assert!(targets::MATCHER.starts_with(targets::ROUTER));
    }
}
