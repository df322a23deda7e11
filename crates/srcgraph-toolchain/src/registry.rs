//! Plugin registries, one per toolchain capability
//!
//! A [`Registry`] is assembled once while wiring the process through
//! [`RegistryBuilder`], then frozen and shared behind an `Arc`. Mistakes
//! made while wiring (an empty key, a key registered twice, a plugin for a
//! variant nobody registered) panic right away rather than surfacing as
//! lookup failures during analysis.

use std::collections::HashMap;
use std::sync::Arc;

use srcgraph_core::{DependencyTarget, SourceUnit, UnitRegistry, UnitVariant};

use crate::dep::{Lister, Resolver};
use crate::error::{PluginKind, Result, ToolchainError};
use crate::grapher::Grapher;
use crate::scan::Scanner;

pub struct Registry {
    units: UnitRegistry,
    scanners: Vec<(String, Arc<dyn Scanner>)>,
    listers: HashMap<String, Arc<dyn Lister>>,
    resolvers: HashMap<String, Arc<dyn Resolver>>,
    graphers: HashMap<String, Arc<dyn Grapher>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Scanners in registration order.
    pub fn scanners(&self) -> impl Iterator<Item = (&str, &Arc<dyn Scanner>)> {
        self.scanners.iter().map(|(name, scanner)| (name.as_str(), scanner))
    }

    pub fn scanner(&self, name: &str) -> Result<Arc<dyn Scanner>> {
        self.scanners
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, scanner)| Arc::clone(scanner))
            .ok_or_else(|| not_registered(PluginKind::Scanner, name))
    }

    pub fn lister(&self, variant: &str) -> Result<Arc<dyn Lister>> {
        lookup(&self.listers, PluginKind::Lister, variant)
    }

    /// Lister registered for the unit's variant.
    pub fn lister_for(&self, unit: &dyn SourceUnit) -> Result<Arc<dyn Lister>> {
        self.lister(self.units.variant_of(unit)?)
    }

    pub fn resolver(&self, target_type: &str) -> Result<Arc<dyn Resolver>> {
        lookup(&self.resolvers, PluginKind::Resolver, target_type)
    }

    pub fn grapher(&self, variant: &str) -> Result<Arc<dyn Grapher>> {
        lookup(&self.graphers, PluginKind::Grapher, variant)
    }

    /// Grapher registered for the unit's variant.
    pub fn grapher_for(&self, unit: &dyn SourceUnit) -> Result<Arc<dyn Grapher>> {
        self.grapher(self.units.variant_of(unit)?)
    }

    pub fn has_lister(&self, variant: &str) -> bool {
        self.listers.contains_key(variant)
    }

    pub fn has_grapher(&self, variant: &str) -> bool {
        self.graphers.contains_key(variant)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut listers: Vec<_> = self.listers.keys().collect();
        listers.sort();
        let mut resolvers: Vec<_> = self.resolvers.keys().collect();
        resolvers.sort();
        let mut graphers: Vec<_> = self.graphers.keys().collect();
        graphers.sort();

        f.debug_struct("Registry")
            .field("units", &self.units)
            .field("scanners", &self.scanners.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("listers", &listers)
            .field("resolvers", &resolvers)
            .field("graphers", &graphers)
            .finish()
    }
}

fn not_registered(kind: PluginKind, key: &str) -> ToolchainError {
    tracing::debug!("No {} registered for {:?}", kind, key);
    ToolchainError::NotRegistered {
        kind,
        key: key.to_string(),
    }
}

fn lookup<P: ?Sized>(plugins: &HashMap<String, Arc<P>>, kind: PluginKind, key: &str) -> Result<Arc<P>> {
    plugins
        .get(key)
        .cloned()
        .ok_or_else(|| not_registered(kind, key))
}

/// Accumulates registrations; [`build`](Self::build) freezes them.
#[derive(Default)]
pub struct RegistryBuilder {
    units: UnitRegistry,
    scanners: Vec<(String, Arc<dyn Scanner>)>,
    listers: HashMap<String, Arc<dyn Lister>>,
    resolvers: HashMap<String, Arc<dyn Resolver>>,
    graphers: HashMap<String, Arc<dyn Grapher>>,
}

impl RegistryBuilder {
    pub fn variant<U: UnitVariant>(&mut self) -> &mut Self {
        self.units.register::<U>();
        self
    }

    pub fn variant_as<U: UnitVariant>(&mut self, name: &str) -> &mut Self {
        self.units.register_as::<U>(name);
        self
    }

    /// Register a scanner under a toolchain name. Scanners run in
    /// registration order.
    pub fn scanner(&mut self, name: &str, scanner: impl Scanner + 'static) -> &mut Self {
        check_key(PluginKind::Scanner, name);
        if self.scanners.iter().any(|(n, _)| n == name) {
            panic!("toolchain: {} registered twice for {name:?}", PluginKind::Scanner);
        }
        let scanner: Arc<dyn Scanner> = Arc::new(scanner);
        self.scanners.push((name.to_string(), scanner));
        self
    }

    /// Register the dependency lister for units of variant `U`.
    pub fn lister<U: UnitVariant>(&mut self, lister: impl Lister + 'static) -> &mut Self {
        let variant = self.registered_variant::<U>(PluginKind::Lister);
        let lister: Arc<dyn Lister> = Arc::new(lister);
        insert_unique(&mut self.listers, PluginKind::Lister, variant, lister);
        self
    }

    /// Register the resolver for dependencies carrying `T`'s target type.
    pub fn resolver<T: DependencyTarget>(&mut self, resolver: impl Resolver + 'static) -> &mut Self {
        self.resolver_as(T::TARGET_TYPE, resolver)
    }

    pub fn resolver_as(&mut self, target_type: &str, resolver: impl Resolver + 'static) -> &mut Self {
        check_key(PluginKind::Resolver, target_type);
        let resolver: Arc<dyn Resolver> = Arc::new(resolver);
        insert_unique(&mut self.resolvers, PluginKind::Resolver, target_type.to_string(), resolver);
        self
    }

    /// Register the grapher for units of variant `U`.
    pub fn grapher<U: UnitVariant>(&mut self, grapher: impl Grapher + 'static) -> &mut Self {
        let variant = self.registered_variant::<U>(PluginKind::Grapher);
        let grapher: Arc<dyn Grapher> = Arc::new(grapher);
        insert_unique(&mut self.graphers, PluginKind::Grapher, variant, grapher);
        self
    }

    pub fn build(&mut self) -> Registry {
        let builder = std::mem::take(self);
        let registry = Registry {
            units: builder.units,
            scanners: builder.scanners,
            listers: builder.listers,
            resolvers: builder.resolvers,
            graphers: builder.graphers,
        };
        tracing::debug!("Built {:?}", registry);
        registry
    }

    fn registered_variant<U: UnitVariant>(&self, kind: PluginKind) -> String {
        match self.units.name_of::<U>() {
            Some(name) => name.to_string(),
            None => panic!(
                "toolchain: {kind} registered for unregistered unit type {}",
                std::any::type_name::<U>()
            ),
        }
    }
}

fn check_key(kind: PluginKind, key: &str) {
    if key.is_empty() {
        panic!("toolchain: {kind} registered with an empty key");
    }
}

fn insert_unique<P: ?Sized>(
    plugins: &mut HashMap<String, Arc<P>>,
    kind: PluginKind,
    key: String,
    plugin: Arc<P>,
) {
    if plugins.contains_key(&key) {
        panic!("toolchain: {kind} registered twice for {key:?}");
    }
    plugins.insert(key, plugin);
}
