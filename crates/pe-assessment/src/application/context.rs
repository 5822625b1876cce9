//! # Context Tracker
//!
//! Holds the live execution identity. Operations capture it once at
//! dispatch and poll [`ContextTracker::is_stale`] after every suspension
//! point; identity changes arrive from outside and are never pushed into
//! running operations.

use tokio::sync::watch;
use tracing::info;

use crate::config::DeploymentRegistry;
use crate::domain::{AccountAddress, ChainId, ContractAddress, ExecutionContext};

/// Live network / account / contract identity.
#[derive(Debug)]
pub struct ContextTracker {
    registry: DeploymentRegistry,
    current: watch::Sender<ExecutionContext>,
}

impl ContextTracker {
    /// Create a tracker with nothing connected.
    pub fn new(registry: DeploymentRegistry) -> Self {
        let (current, _) = watch::channel(ExecutionContext::default());
        Self { registry, current }
    }

    /// Identity at call time.
    pub fn capture(&self) -> ExecutionContext {
        *self.current.borrow()
    }

    /// True if any field of `captured` differs from the identity now.
    pub fn is_stale(&self, captured: &ExecutionContext) -> bool {
        *self.current.borrow() != *captured
    }

    /// Switch network and re-resolve the contract binding.
    ///
    /// Returns the new binding.
    pub fn set_network(&self, network: Option<ChainId>) -> Option<ContractAddress> {
        let contract = network.and_then(|chain| self.registry.resolve(chain));
        self.current.send_modify(|ctx| {
            ctx.network = network;
            ctx.contract = contract;
        });
        info!(
            network = ?network.map(|c| c.0),
            contract = ?contract.map(|c| c.to_string()),
            "Network context changed"
        );
        contract
    }

    /// Switch the active signer account.
    pub fn set_account(&self, account: Option<AccountAddress>) {
        self.current.send_modify(|ctx| ctx.account = account);
        info!(account = ?account.map(|a| a.to_string()), "Account context changed");
    }

    /// Follow identity changes.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionContext> {
        self.current.subscribe()
    }

    /// Contract bound right now.
    pub fn contract(&self) -> Option<ContractAddress> {
        self.current.borrow().contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ContextTracker {
        let registry = DeploymentRegistry::default()
            .with_deployment(ChainId(31337), ContractAddress([0xC0; 20]));
        ContextTracker::new(registry)
    }

    #[test]
    fn test_initially_unbound() {
        let t = tracker();
        assert_eq!(t.capture(), ExecutionContext::default());
        assert!(t.contract().is_none());
    }

    #[test]
    fn test_network_resolves_contract() {
        let t = tracker();
        assert_eq!(
            t.set_network(Some(ChainId(31337))),
            Some(ContractAddress([0xC0; 20]))
        );
        assert_eq!(t.set_network(Some(ChainId(1))), None);
        assert_eq!(t.capture().network, Some(ChainId(1)));
    }

    #[test]
    fn test_staleness_is_checked_against_now() {
        let t = tracker();
        t.set_network(Some(ChainId(31337)));
        t.set_account(Some(AccountAddress([1; 20])));
        let captured = t.capture();
        assert!(!t.is_stale(&captured));

        t.set_account(Some(AccountAddress([2; 20])));
        assert!(t.is_stale(&captured));

        // Switching back makes the captured identity current again.
        t.set_account(Some(AccountAddress([1; 20])));
        assert!(!t.is_stale(&captured));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let t = tracker();
        let mut rx = t.subscribe();
        t.set_network(Some(ChainId(31337)));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_bound());
    }
}
