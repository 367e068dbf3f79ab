//! Shared server state.

use std::sync::Arc;

use tracing::info;

use crate::{
    config::Limits,
    directory::GroupDirectory,
    registry::ConnectionRegistry,
    router::Router,
    store::{RecordStore, StoreError},
};

/// Everything sessions share: the registry, the group directory, the router
/// over both, and the record store.
///
/// Clone is cheap (Arc and store handles).
pub struct Hub<S: RecordStore> {
    /// Live sessions
    pub registry: Arc<ConnectionRegistry>,
    /// Groups and rosters
    pub directory: Arc<GroupDirectory<S>>,
    /// Message routing
    pub router: Router<S>,
    /// Durable records
    pub store: S,
    /// Capacity limits
    pub limits: Limits,
}

impl<S: RecordStore> Clone for Hub<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            directory: Arc::clone(&self.directory),
            router: self.router.clone(),
            store: self.store.clone(),
            limits: self.limits,
        }
    }
}

impl<S: RecordStore> Hub<S> {
    /// Build the shared state, restoring groups from `store`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the group table cannot be loaded.
    pub fn restore(store: S, limits: Limits) -> Result<Self, StoreError> {
        let registry = Arc::new(ConnectionRegistry::new(limits.max_sessions));
        let directory = Arc::new(GroupDirectory::restore(store.clone(), limits)?);
        let router = Router::new(Arc::clone(&registry), Arc::clone(&directory));

        info!(
            users = store.load_users()?.len(),
            groups = directory.len(),
            max_sessions = limits.max_sessions,
            "hub ready"
        );

        Ok(Self { registry, directory, router, store, limits })
    }
}
