//! Routing instructions and the instruction mini-language.
//!
//! An instruction names a component, optionally the endpoint it should be
//! loaded into, its parameters and the instructions for the scope the
//! component opens:
//!
//! ```text
//! users(id=42)@main/details+sidebar@aside
//! ```
//!
//! `/` descends into the component's scope, `+` separates siblings, `@`
//! names the endpoint and brackets hold parameters. A bracket that does not
//! follow a component name groups siblings so that a later sibling is not
//! taken as a child: `(a/b)+c`.
//!
//! The clear marker `-` unloads an endpoint (`-@main`), or every endpoint of
//! the scope when no endpoint is named.

use std::fmt;
use std::sync::Arc;

use crate::component::ComponentRef;
use crate::config::Separators;
use crate::error::{Result, RouterError};
use crate::parameters::Parameters;
use crate::route::Route;
use crate::tree::{EndpointId, ScopeId};

/// The endpoint an instruction targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionEndpoint {
    /// Endpoint name, as written or adopted from a match.
    pub name: Option<String>,
    /// The endpoint once matched.
    pub instance: Option<EndpointId>,
}

impl InstructionEndpoint {
    /// Whether neither a name nor an instance is set.
    pub fn is_none(&self) -> bool {
        self.name.is_none() && self.instance.is_none()
    }

    /// Bind to a concrete endpoint.
    pub fn set(&mut self, name: impl Into<String>, instance: EndpointId) {
        self.name = Some(name.into());
        self.instance = Some(instance);
    }
}

/// One step of a navigation.
#[derive(Clone, Default)]
pub struct RoutingInstruction {
    /// The component to load.
    pub component: ComponentRef,
    /// The endpoint to load it into.
    pub endpoint: InstructionEndpoint,
    /// Parameters handed to the component.
    pub parameters: Parameters,
    /// Instructions for the scope opened by the component.
    pub next_scope_instructions: Vec<RoutingInstruction>,
    /// The scope the instruction is resolved in.
    pub scope: Option<ScopeId>,
    /// The configured route that produced the instruction.
    pub route: Option<Arc<Route>>,
    /// Routes of the matched configured route, available below the leaf
    /// instruction it produced.
    pub child_routes: Vec<Arc<Route>>,
    /// Whether the instruction is the first one produced by its route.
    pub route_start: bool,
    /// Whether the instruction loads an endpoint's default component.
    pub default: bool,
}

impl RoutingInstruction {
    /// An instruction loading `component`.
    pub fn new(component: impl Into<ComponentRef>) -> Self {
        Self {
            component: component.into(),
            ..Self::default()
        }
    }

    /// Clear every endpoint of a scope.
    pub fn clear_all(separators: &Separators) -> Self {
        Self::new(separators.clear.as_str())
    }

    /// Add to every endpoint of a scope.
    pub fn add_all(separators: &Separators) -> Self {
        Self::new(separators.add.as_str())
    }

    /// Clear one endpoint.
    pub fn create_clear(
        separators: &Separators,
        name: impl Into<String>,
        endpoint: EndpointId,
    ) -> Self {
        let mut instruction = Self::clear_all(separators);
        instruction.endpoint.set(name, endpoint);
        instruction
    }

    /// Target a named endpoint.
    pub fn with_endpoint(mut self, name: impl Into<String>) -> Self {
        self.endpoint.name = Some(name.into());
        self
    }

    /// Set the parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the child scope instructions.
    pub fn with_next(mut self, next: Vec<RoutingInstruction>) -> Self {
        self.next_scope_instructions = next;
        self
    }

    /// Resolve in `scope`.
    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Mark as an endpoint default.
    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Whether there are child scope instructions.
    pub fn has_next_scope_instructions(&self) -> bool {
        !self.next_scope_instructions.is_empty()
    }

    fn component_is(&self, marker: &str) -> bool {
        self.component.name() == Some(marker)
    }

    /// Whether the instruction clears one named endpoint.
    pub fn is_clear(&self, separators: &Separators) -> bool {
        self.component_is(&separators.clear) && !self.endpoint.is_none()
    }

    /// Whether the instruction clears every endpoint of its scope.
    pub fn is_clear_all(&self, separators: &Separators) -> bool {
        self.component_is(&separators.clear) && self.endpoint.is_none()
    }

    /// Whether the instruction adds to every endpoint of its scope.
    pub fn is_add_all(&self, separators: &Separators) -> bool {
        self.component_is(&separators.add) && self.endpoint.is_none()
    }

    /// Whether the instruction is a clear or add marker.
    pub fn is_marker(&self, separators: &Separators) -> bool {
        self.component_is(&separators.clear) || self.component_is(&separators.add)
    }

    /// Whether both target the same endpoint. Without instances the names,
    /// and when `compare_scope` is set the scopes, have to agree.
    pub fn same_endpoint(&self, other: &Self, compare_scope: bool) -> bool {
        if let (Some(a), Some(b)) = (self.endpoint.instance, other.endpoint.instance) {
            return a == b;
        }
        self.endpoint.name.is_some()
            && self.endpoint.name == other.endpoint.name
            && (!compare_scope || self.scope == other.scope)
    }

    /// Whether both load the same component with the same parameters into
    /// the same endpoint, ignoring children.
    pub fn same_instruction(&self, other: &Self) -> bool {
        self.component.same_component(&other.component)
            && self.endpoint.name == other.endpoint.name
            && self.parameters.same_as(&other.parameters)
    }

    /// This instruction without its children, as instruction text.
    pub fn stringify_own(&self, separators: &Separators) -> String {
        let mut out = self.component.name().unwrap_or_default().to_string();
        if !self.parameters.is_empty() {
            out.push(separators.parameters_start);
            out.push_str(&self.parameters.stringify(separators));
            out.push(separators.parameters_end);
        }
        if let Some(name) = &self.endpoint.name {
            out.push(separators.endpoint);
            out.push_str(name);
        }
        out
    }
}

impl fmt::Debug for RoutingInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingInstruction")
            .field("component", &self.component)
            .field("endpoint", &self.endpoint)
            .field("parameters", &self.parameters)
            .field("next", &self.next_scope_instructions)
            .field("scope", &self.scope)
            .field("route", &self.route.as_ref().map(|route| route.path_list()))
            .field("route_start", &self.route_start)
            .field("default", &self.default)
            .finish()
    }
}

/// Parse instruction text.
pub fn parse(source: &str, separators: &Separators) -> Result<Vec<RoutingInstruction>> {
    let mut parser = Parser {
        source,
        chars: source.chars().collect(),
        pos: 0,
        separators,
    };
    let instructions = parser.parse_siblings(false)?;
    if parser.pos < parser.chars.len() {
        return Err(parser.error(format!(
            "unexpected '{}' at {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    Ok(instructions)
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    separators: &'a Separators,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> RouterError {
        RouterError::invalid_instruction(self.source, message)
    }

    fn parse_siblings(&mut self, in_group: bool) -> Result<Vec<RoutingInstruction>> {
        let mut siblings = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(c) if c == self.separators.parameters_end => {
                    if in_group {
                        break;
                    }
                    return Err(self.error(format!("unbalanced '{c}' at {}", self.pos)));
                }
                _ => {}
            }
            siblings.extend(self.parse_instruction_or_group(in_group)?);
            if !self.eat(self.separators.sibling) {
                break;
            }
        }
        Ok(siblings)
    }

    fn parse_instruction_or_group(&mut self, in_group: bool) -> Result<Vec<RoutingInstruction>> {
        if self.eat(self.separators.parameters_start) {
            let group = self.parse_siblings(true)?;
            if !self.eat(self.separators.parameters_end) {
                return Err(self.error(format!(
                    "missing '{}'",
                    self.separators.parameters_end
                )));
            }
            return Ok(group);
        }

        let name = self.take_name();
        let mut instruction = RoutingInstruction::new(name.as_str());

        if !name.is_empty() && self.eat(self.separators.parameters_start) {
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c == self.separators.parameters_end {
                    break;
                }
                self.pos += 1;
            }
            let inner: String = self.chars[start..self.pos].iter().collect();
            if !self.eat(self.separators.parameters_end) {
                return Err(self.error(format!(
                    "missing '{}'",
                    self.separators.parameters_end
                )));
            }
            instruction.parameters = Parameters::parse(&inner, self.separators);
        }

        if self.eat(self.separators.endpoint) {
            let endpoint = self.take_name();
            if endpoint.is_empty() {
                return Err(self.error(format!("empty endpoint name at {}", self.pos)));
            }
            instruction.endpoint.name = Some(endpoint);
        }

        if self.eat(self.separators.scope) {
            instruction.next_scope_instructions = self.parse_siblings(in_group)?;
        }

        if instruction.component.is_none()
            && instruction.endpoint.is_none()
            && !instruction.has_next_scope_instructions()
        {
            return Ok(Vec::new());
        }
        Ok(vec![instruction])
    }

    fn take_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if self.separators.is_reserved(c) {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect::<String>().trim().to_string()
    }
}

/// Instruction text for a list of sibling instructions.
///
/// A sibling that has children and is followed by further siblings is
/// wrapped in brackets so that the text parses back to the same tree.
pub fn stringify(instructions: &[RoutingInstruction], separators: &Separators) -> String {
    let last = instructions.len().saturating_sub(1);
    instructions
        .iter()
        .enumerate()
        .map(|(i, instruction)| {
            let mut part = instruction.stringify_own(separators);
            if instruction.has_next_scope_instructions() {
                part.push(separators.scope);
                part.push_str(&stringify(&instruction.next_scope_instructions, separators));
                if i < last {
                    part = format!(
                        "{}{part}{}",
                        separators.parameters_start, separators.parameters_end
                    );
                }
            }
            part
        })
        .collect::<Vec<_>>()
        .join(&separators.sibling.to_string())
}

/// Every instruction of the tree, parents before their children.
pub fn flat(instructions: &[RoutingInstruction]) -> Vec<RoutingInstruction> {
    let mut out = Vec::new();
    for instruction in instructions {
        out.push(instruction.clone());
        out.extend(flat(&instruction.next_scope_instructions));
    }
    out
}

/// Whether more than one instruction loads a component, ignoring clear and
/// add markers.
pub fn contains_siblings(instructions: &[RoutingInstruction], separators: &Separators) -> bool {
    instructions
        .iter()
        .filter(|instruction| !instruction.is_marker(separators))
        .count()
        > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(source: &str) -> Vec<RoutingInstruction> {
        parse(source, &Separators::default()).unwrap()
    }

    #[test]
    fn test_parse_single() {
        let instructions = parse_default("users(id=42)@main");
        assert_eq!(instructions.len(), 1);
        let users = &instructions[0];
        assert_eq!(users.component.name(), Some("users"));
        assert_eq!(users.endpoint.name.as_deref(), Some("main"));
        assert_eq!(users.parameters.get("id"), Some("42"));
    }

    #[test]
    fn test_parse_children_and_siblings() {
        let instructions = parse_default("a/b+c");
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].next_scope_instructions.len(), 2);

        let grouped = parse_default("(a/b)+c");
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].next_scope_instructions.len(), 1);
        assert_eq!(grouped[1].component.name(), Some("c"));
    }

    #[test]
    fn test_stringify_wraps_non_last_parents() {
        let separators = Separators::default();
        for source in ["(a/b)+c", "a/b+c", "x@left+y(1,2)@right/z", "-@main"] {
            let parsed = parse(source, &separators).unwrap();
            assert_eq!(stringify(&parsed, &separators), source);
        }
    }

    #[test]
    fn test_parse_errors() {
        let separators = Separators::default();
        assert!(matches!(
            parse("(a+b", &separators),
            Err(RouterError::InvalidInstruction { .. })
        ));
        assert!(parse("a)", &separators).is_err());
        assert!(parse("a(1", &separators).is_err());
        assert!(parse("a@", &separators).is_err());
    }

    #[test]
    fn test_empty_source() {
        assert!(parse_default("").is_empty());
        assert_eq!(parse_default("a+").len(), 1);
    }

    #[test]
    fn test_clear_markers() {
        let separators = Separators::default();
        let clear_all = &parse_default("-")[0];
        assert!(clear_all.is_clear_all(&separators));
        assert!(!clear_all.is_clear(&separators));

        let clear = &parse_default("-@main")[0];
        assert!(clear.is_clear(&separators));
        assert!(RoutingInstruction::add_all(&separators).is_add_all(&separators));
    }

    #[test]
    fn test_flat_and_siblings() {
        let separators = Separators::default();
        let instructions = parse_default("(a/b/c)+d");
        let names: Vec<_> = flat(&instructions)
            .iter()
            .map(|i| i.component.name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert!(contains_siblings(&instructions, &separators));
        assert!(!contains_siblings(&parse_default("-+a"), &separators));
    }

    #[test]
    fn test_same_endpoint() {
        let a = RoutingInstruction::new("a").with_endpoint("main");
        let b = RoutingInstruction::new("b").with_endpoint("main");
        let unnamed = RoutingInstruction::new("c");
        assert!(a.same_endpoint(&b, true));
        assert!(!a.same_endpoint(&unnamed, false));
    }
}
