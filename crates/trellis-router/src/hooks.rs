//! Before-navigation hooks.
//!
//! Hooks see the instructions matched in each pass of a navigation before
//! anything is staged. Each hook may let them through, cancel the navigation
//! or replace them; replacements are handed to the next hook in the chain.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::instruction::RoutingInstruction;
use crate::logging::targets;
use crate::navigation::Navigation;

/// What a hook decided.
#[derive(Debug, Clone)]
pub enum HookResult {
    /// Continue with the instructions as they are.
    Proceed,
    /// Cancel the navigation.
    Cancel,
    /// Continue with these instructions instead.
    Replace(Vec<RoutingInstruction>),
}

/// A hook run before matched instructions are staged.
#[async_trait]
pub trait BeforeNavigationHook: Send + Sync {
    /// Inspect the matched instructions.
    async fn before_navigation(
        &self,
        instructions: &[RoutingInstruction],
        navigation: &Navigation,
    ) -> Result<HookResult>;
}

type HookFn = dyn Fn(&[RoutingInstruction], &Navigation) -> HookResult + Send + Sync;

struct FnHook(Box<HookFn>);

#[async_trait]
impl BeforeNavigationHook for FnHook {
    async fn before_navigation(
        &self,
        instructions: &[RoutingInstruction],
        navigation: &Navigation,
    ) -> Result<HookResult> {
        Ok((self.0)(instructions, navigation))
    }
}

/// Identifies a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// The ordered chain of before-navigation hooks.
#[derive(Default)]
pub struct RoutingHooks {
    hooks: RwLock<Vec<(HookId, Arc<dyn BeforeNavigationHook>)>>,
    next_id: AtomicU64,
}

impl RoutingHooks {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook.
    pub fn add(&self, hook: impl BeforeNavigationHook + 'static) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, Arc::new(hook)));
        id
    }

    /// Append a synchronous hook.
    pub fn add_fn(
        &self,
        hook: impl Fn(&[RoutingInstruction], &Navigation) -> HookResult + Send + Sync + 'static,
    ) -> HookId {
        self.add(FnHook(Box::new(hook)))
    }

    /// Remove a hook. Returns whether it was registered.
    pub fn remove(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether there are no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Run the chain over `instructions`.
    pub async fn invoke(
        &self,
        instructions: &[RoutingInstruction],
        navigation: &Navigation,
    ) -> Result<HookResult> {
        let hooks: Vec<Arc<dyn BeforeNavigationHook>> =
            self.hooks.read().iter().map(|(_, hook)| hook.clone()).collect();
        if hooks.is_empty() {
            return Ok(HookResult::Proceed);
        }

        let mut replaced: Option<Vec<RoutingInstruction>> = None;
        for hook in hooks {
            let current = replaced.as_deref().unwrap_or(instructions);
            match hook.before_navigation(current, navigation).await? {
                HookResult::Proceed => {}
                HookResult::Cancel => {
                    tracing::debug!(
                        target: targets::HOOKS,
                        navigation = %navigation.instruction,
                        "hook cancelled navigation"
                    );
                    return Ok(HookResult::Cancel);
                }
                HookResult::Replace(next) => {
                    tracing::debug!(
                        target: targets::HOOKS,
                        count = next.len(),
                        "hook replaced instructions"
                    );
                    replaced = Some(next);
                }
            }
        }
        Ok(replaced.map_or(HookResult::Proceed, HookResult::Replace))
    }
}

impl fmt::Debug for RoutingHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingHooks").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;

    fn navigation() -> Navigation {
        Navigation::new("home", 1)
    }

    #[tokio::test]
    async fn test_empty_chain_proceeds() {
        let hooks = RoutingHooks::new();
        let result = hooks.invoke(&[], &navigation()).await.unwrap();
        assert!(matches!(result, HookResult::Proceed));
    }

    #[tokio::test]
    async fn test_replacement_feeds_next_hook() {
        let hooks = RoutingHooks::new();
        hooks.add_fn(|_, _| HookResult::Replace(vec![RoutingInstruction::new("login")]));
        hooks.add_fn(|instructions, _| {
            assert_eq!(instructions[0].component.name(), Some("login"));
            HookResult::Proceed
        });

        let result = hooks
            .invoke(&[RoutingInstruction::new("admin")], &navigation())
            .await
            .unwrap();

        match result {
            HookResult::Replace(instructions) => {
                assert_eq!(instructions[0].component.name(), Some("login"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_chain() {
        let hooks = RoutingHooks::new();
        hooks.add_fn(|_, _| HookResult::Cancel);
        hooks.add_fn(|_, _| panic!("not reached"));
        let result = hooks.invoke(&[], &navigation()).await.unwrap();
        assert!(matches!(result, HookResult::Cancel));
    }

    #[tokio::test]
    async fn test_failing_hook_propagates() {
        struct Failing;

        #[async_trait]
        impl BeforeNavigationHook for Failing {
            async fn before_navigation(
                &self,
                _instructions: &[RoutingInstruction],
                _navigation: &Navigation,
            ) -> Result<HookResult> {
                Err(RouterError::Hook("session expired".into()))
            }
        }

        let hooks = RoutingHooks::new();
        hooks.add(Failing);
        let err = hooks.invoke(&[], &navigation()).await.unwrap_err();
        assert!(matches!(err, RouterError::Hook(_)));
    }

    #[test]
    fn test_remove() {
        let hooks = RoutingHooks::new();
        let id = hooks.add_fn(|_, _| HookResult::Proceed);
        assert!(hooks.remove(id));
        assert!(!hooks.remove(id));
        assert!(hooks.is_empty());
    }
}
