//! Configured routes.
//!
//! Route tables are plain data ([`RouteConfig`]) that can be written in code
//! or deserialized, and are compiled into [`Route`]s holding the routing
//! instructions they stand for.
//!
//! ```
//! use trellis_router::route::RouteTable;
//!
//! let table = RouteTable::from_toml_str(r#"
//!     [[routes]]
//!     path = ["", "home"]
//!     component = "home"
//!
//!     [[routes]]
//!     path = "users/:id"
//!     component = "user"
//!     viewport = "main"
//! "#).unwrap();
//! assert_eq!(table.routes.len(), 2);
//! assert_eq!(table.routes[0].path.paths(), ["", "home"]);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Separators;
use crate::error::{Result, RouterError};
use crate::instruction::{self, RoutingInstruction};
use crate::parameters::Parameters;

/// One path or several alternative paths of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutePath {
    /// A single path.
    Single(String),
    /// Alternative paths.
    Multiple(Vec<String>),
}

impl Default for RoutePath {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

impl RoutePath {
    /// All paths.
    pub fn paths(&self) -> Vec<String> {
        match self {
            Self::Single(path) => vec![path.clone()],
            Self::Multiple(paths) => paths.clone(),
        }
    }
}

impl From<&str> for RoutePath {
    fn from(path: &str) -> Self {
        Self::Single(path.to_string())
    }
}

/// A configured route as data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Identifier, defaults to the first path.
    pub id: Option<String>,
    /// The path pattern(s).
    pub path: RoutePath,
    /// Component loaded by the route.
    pub component: Option<String>,
    /// Endpoint the component is loaded into.
    pub viewport: Option<String>,
    /// Parameters added to the component's instruction.
    pub parameters: BTreeMap<String, String>,
    /// Routes available inside the loaded component.
    pub children: Vec<RouteConfig>,
    /// Path navigated to instead.
    #[serde(alias = "redirectTo")]
    pub redirect_to: Option<String>,
    /// Instruction text loaded instead of a single component.
    pub instructions: Option<String>,
    /// Display title.
    pub title: Option<String>,
}

impl RouteConfig {
    /// A route loading `component` at `path`.
    pub fn new(path: impl Into<RoutePath>, component: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            component: Some(component.into()),
            ..Self::default()
        }
    }

    /// A route redirecting `path` to `redirect_to`.
    pub fn redirect(path: impl Into<RoutePath>, redirect_to: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            redirect_to: Some(redirect_to.into()),
            ..Self::default()
        }
    }

    /// Load into a named viewport.
    pub fn with_viewport(mut self, viewport: impl Into<String>) -> Self {
        self.viewport = Some(viewport.into());
        self
    }

    /// Set the child routes.
    pub fn with_children(mut self, children: Vec<RouteConfig>) -> Self {
        self.children = children;
        self
    }

    /// Add a parameter to the component's instruction.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A deserializable table of routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    /// The routes.
    pub routes: Vec<RouteConfig>,
}

impl RouteTable {
    /// Load a table from TOML with a `[[routes]]` array.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load a table from JSON, either an object with `routes` or a bare array.
    pub fn from_json_str(source: &str) -> Result<Self> {
        match serde_json::from_str::<Self>(source) {
            Ok(table) => Ok(table),
            Err(_) => serde_json::from_str::<Vec<RouteConfig>>(source)
                .map(|routes| Self { routes })
                .map_err(|err| RouterError::config(err.to_string())),
        }
    }
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    /// Identifier.
    pub id: String,
    /// Path patterns.
    pub paths: Vec<String>,
    /// Path navigated to instead.
    pub redirect_to: Option<String>,
    /// Instructions the route stands for.
    pub instructions: Vec<RoutingInstruction>,
    /// Routes available inside the loaded component.
    pub children: Vec<Arc<Route>>,
    /// Display title.
    pub title: Option<String>,
}

impl Route {
    /// Compile a configured route and its children.
    pub fn from_config(config: &RouteConfig, separators: &Separators) -> Result<Arc<Self>> {
        let paths = config.path.paths();
        let instructions = if let Some(text) = &config.instructions {
            instruction::parse(text, separators)?
        } else if let Some(component) = &config.component {
            let mut instruction = RoutingInstruction::new(component.as_str())
                .with_parameters(Parameters::from_map(&config.parameters));
            instruction.endpoint.name = config.viewport.clone();
            vec![instruction]
        } else if config.redirect_to.is_some() {
            Vec::new()
        } else {
            return Err(RouterError::config(format!(
                "Route '{}' needs a component, instructions or a redirect",
                paths.join(",")
            )));
        };

        Ok(Arc::new(Self {
            id: config
                .id
                .clone()
                .or_else(|| paths.first().cloned())
                .unwrap_or_default(),
            redirect_to: config.redirect_to.clone(),
            children: Self::compile_all(&config.children, separators)?,
            title: config.title.clone(),
            paths,
            instructions,
        }))
    }

    /// Compile a list of configured routes.
    pub fn compile_all(configs: &[RouteConfig], separators: &Separators) -> Result<Vec<Arc<Self>>> {
        configs
            .iter()
            .map(|config| Self::from_config(config, separators))
            .collect()
    }

    /// The paths joined for display.
    pub fn path_list(&self) -> String {
        self.paths.join(",")
    }
}

/// The outcome of matching a path against configured routes.
#[derive(Debug, Clone, Default)]
pub struct FoundRoute {
    /// The part of the path the route matched.
    pub matching: String,
    /// The part of the path left for child scopes.
    pub remaining: String,
    /// Parameters extracted from the path.
    pub params: BTreeMap<String, String>,
    /// Instructions for the matched part.
    pub instructions: Vec<RoutingInstruction>,
    /// The matched route.
    pub matched: Option<Arc<Route>>,
}

impl FoundRoute {
    /// Whether a configured route matched.
    pub fn found_configuration(&self) -> bool {
        self.matched.is_some()
    }

    /// Whether the match produced instructions.
    pub fn found_instructions(&self) -> bool {
        !self.instructions.is_empty()
    }

    /// Whether part of the path is left.
    pub fn has_remaining(&self) -> bool {
        !self.remaining.is_empty()
    }
}
