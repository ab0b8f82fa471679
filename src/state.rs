use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::Display,
    sync::{Arc, RwLock},
};

use crate::common::NamespacedName;

#[derive(thiserror::Error, Debug, PartialEq, PartialOrd)]
pub enum StorageError {
    LockingError,
}
impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Identifies one route attached to one gateway.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RouteStatusKey {
    pub route_kind: String,
    pub route: NamespacedName,
    pub gateway: NamespacedName,
}

impl RouteStatusKey {
    pub fn new(route_kind: &str, route: NamespacedName, gateway: NamespacedName) -> Self {
        Self { route_kind: route_kind.to_owned(), route, gateway }
    }
}

impl Display for RouteStatusKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.route_kind, self.route, self.gateway)
    }
}

/// `programmed_backends` is 1 only while every object reporting on the service says it is programmed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProgrammedServices {
    pub initialized: bool,
    pub programmed_backends: u32,
    pub reporters: BTreeMap<String, bool>,
}

impl ProgrammedServices {
    fn recount(&mut self) {
        let programmed = !self.reporters.is_empty() && self.reporters.values().all(|programmed| *programmed);
        self.programmed_backends = u32::from(programmed);
    }
}

/// Correlates route/gateway pairs with the programmed state of every backend service they
/// reference. Backend controllers write into it, route status updaters read from it.
#[derive(Clone, Default)]
pub struct SharedRouteStatusMap {
    routes: Arc<RwLock<HashMap<RouteStatusKey, BTreeMap<NamespacedName, ProgrammedServices>>>>,
}

impl SharedRouteStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records what one backend object says about a service. Several objects may report on the
    /// same service; they are told apart by `reporter`.
    pub fn report_backend(&self, service: &NamespacedName, key: &RouteStatusKey, reporter: &str, programmed: bool) -> Result<(), StorageError> {
        let mut routes = self.routes.write().map_err(|_| StorageError::LockingError)?;
        let status = routes.entry(key.clone()).or_default().entry(service.clone()).or_default();
        status.initialized = true;
        status.reporters.insert(reporter.to_owned(), programmed);
        status.recount();
        Ok(())
    }

    /// Drops the report of a backend object that went away. The service stays initialized, so
    /// with no reporter left it reads as not programmed.
    pub fn withdraw_backend(&self, service: &NamespacedName, key: &RouteStatusKey, reporter: &str) -> Result<(), StorageError> {
        let mut routes = self.routes.write().map_err(|_| StorageError::LockingError)?;
        if let Some(status) = routes.get_mut(key).and_then(|services| services.get_mut(service)) {
            status.reporters.remove(reporter);
            status.recount();
        }
        Ok(())
    }

    /// Returns the programmed count and whether the service has been reported at least once.
    /// Unknown routes and services read as `(0, false)`.
    pub fn get_programmed_services(&self, key: &RouteStatusKey, service: &NamespacedName) -> Result<(u32, bool), StorageError> {
        let routes = self.routes.read().map_err(|_| StorageError::LockingError)?;
        let status = routes.get(key).and_then(|services| services.get(service)).cloned().unwrap_or_default();
        Ok((status.programmed_backends, status.initialized))
    }

    /// Registers the services a route references. Services already known keep their state,
    /// services no longer referenced are forgotten.
    pub fn init_route(&self, key: &RouteStatusKey, services: impl IntoIterator<Item = NamespacedName>) -> Result<(), StorageError> {
        let mut routes = self.routes.write().map_err(|_| StorageError::LockingError)?;
        let existing = routes.remove(key).unwrap_or_default();
        let services = services
            .into_iter()
            .map(|service| {
                let status = existing.get(&service).cloned().unwrap_or_default();
                (service, status)
            })
            .collect();
        routes.insert(key.clone(), services);
        Ok(())
    }

    /// Forgets every gateway of the route except the ones in `gateways`. Returns how many keys were dropped.
    pub fn retain_gateways(&self, route_kind: &str, route: &NamespacedName, gateways: &BTreeSet<NamespacedName>) -> Result<usize, StorageError> {
        let mut routes = self.routes.write().map_err(|_| StorageError::LockingError)?;
        let before = routes.len();
        routes.retain(|key, _| key.route_kind != route_kind || &key.route != route || gateways.contains(&key.gateway));
        Ok(before - routes.len())
    }

    pub fn remove_routes_for(&self, route_kind: &str, route: &NamespacedName) -> Result<usize, StorageError> {
        self.retain_gateways(route_kind, route, &BTreeSet::new())
    }

    pub fn get_route(&self, key: &RouteStatusKey) -> Result<Option<BTreeMap<NamespacedName, ProgrammedServices>>, StorageError> {
        let routes = self.routes.read().map_err(|_| StorageError::LockingError)?;
        Ok(routes.get(key).cloned())
    }
}
