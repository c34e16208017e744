//! Router configuration.
//!
//! [`RouterOptions`] can be built in code with the `with_*` methods or loaded
//! from TOML:
//!
//! ```
//! use trellis_router::RouterOptions;
//!
//! let options = RouterOptions::from_toml_str(r#"
//!     use_direct_routing = false
//!     max_match_iterations = 50
//! "#).unwrap();
//! assert!(!options.use_direct_routing);
//! assert!(options.use_configured_routes);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Characters of the instruction mini-language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Separators {
    /// Separates a parent instruction from its child instructions.
    pub scope: char,
    /// Separates sibling instructions.
    pub sibling: char,
    /// Introduces the endpoint name.
    pub endpoint: char,
    /// Opens a parameter list (and a group of siblings).
    pub parameters_start: char,
    /// Closes a parameter list (and a group of siblings).
    pub parameters_end: char,
    /// Separates parameters.
    pub parameter: char,
    /// Separates a parameter name from its value.
    pub parameter_key: char,
    /// Component name that clears an endpoint.
    pub clear: String,
    /// Component name that adds to all endpoints.
    pub add: String,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            scope: '/',
            sibling: '+',
            endpoint: '@',
            parameters_start: '(',
            parameters_end: ')',
            parameter: ',',
            parameter_key: '=',
            clear: "-".to_string(),
            add: "+".to_string(),
        }
    }
}

impl Separators {
    /// Whether `c` has a structural meaning in instruction strings.
    pub fn is_reserved(&self, c: char) -> bool {
        c == self.scope
            || c == self.sibling
            || c == self.endpoint
            || c == self.parameters_start
            || c == self.parameters_end
    }
}

/// Options controlling how navigations are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Resolve instructions naming components directly.
    pub use_direct_routing: bool,
    /// Resolve instructions through configured routes.
    pub use_configured_routes: bool,
    /// Keep endpoints not named by a navigation instead of clearing them.
    pub additive_instruction_default: bool,
    /// Navigations describe the complete state, so defaults are not added.
    pub use_full_state_instruction: bool,
    /// Upper bound of match passes per scope before giving up.
    pub max_match_iterations: usize,
    /// Upper bound of chained redirects.
    pub max_redirects: usize,
    /// Instruction mini-language characters.
    pub separators: Separators,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            use_direct_routing: true,
            use_configured_routes: true,
            additive_instruction_default: false,
            use_full_state_instruction: false,
            max_match_iterations: 100,
            max_redirects: 10,
            separators: Separators::default(),
        }
    }
}

impl RouterOptions {
    /// Load options from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Enable or disable direct routing.
    pub fn with_direct_routing(mut self, enabled: bool) -> Self {
        self.use_direct_routing = enabled;
        self
    }

    /// Enable or disable configured routes.
    pub fn with_configured_routes(mut self, enabled: bool) -> Self {
        self.use_configured_routes = enabled;
        self
    }

    /// Make navigations additive instead of full state.
    pub fn with_additive_instructions(mut self, additive: bool) -> Self {
        self.additive_instruction_default = additive;
        self
    }

    /// Treat navigations as full state instructions.
    pub fn with_full_state_instruction(mut self, full_state: bool) -> Self {
        self.use_full_state_instruction = full_state;
        self
    }

    /// Set the match loop bound.
    pub fn with_max_match_iterations(mut self, iterations: usize) -> Self {
        self.max_match_iterations = iterations;
        self
    }

    /// Set the redirect bound.
    pub fn with_max_redirects(mut self, redirects: usize) -> Self {
        self.max_redirects = redirects;
        self
    }

    /// Set the instruction separators.
    pub fn with_separators(mut self, separators: Separators) -> Self {
        self.separators = separators;
        self
    }
}
