//! Everything the engine needs from the application embedding it.

use indexmap::IndexMap;
use psd_driver_core::{ConstraintHost, ConstraintTable, MeshTable, ShapeKeyHost};
use psd_weights_core::{Rig, SimpleRig};

use crate::result_store::{MemoryStore, PropertyStore};

/// Resolves owners (by current display name) to host objects.
pub trait Host {
    /// Base skeleton of an owner; `None` when the object is gone.
    fn rig(&self, owner: &str) -> Option<&dyn Rig>;

    /// Skeleton after the host's dependency evaluation, when it has one.
    fn evaluated_rig(&self, _owner: &str) -> Option<&dyn Rig> {
        None
    }

    /// Persisted property container: the proxy when it resolves, else the
    /// owner's own data block.
    fn property_store(&mut self, owner: &str, proxy: Option<&str>)
        -> Option<&mut dyn PropertyStore>;

    fn shape_keys(&mut self) -> &mut dyn ShapeKeyHost;

    /// Constraint surface of the owner's skeleton.
    fn constraints(&mut self, owner: &str) -> Option<&mut dyn ConstraintHost>;
}

/// In-memory host for tests, benches and headless tools.
#[derive(Debug, Clone, Default)]
pub struct SimpleHost {
    pub rigs: IndexMap<String, SimpleRig>,
    pub evaluated: IndexMap<String, SimpleRig>,
    pub stores: IndexMap<String, MemoryStore>,
    pub meshes: MeshTable,
    pub constraints: IndexMap<String, ConstraintTable>,
}

impl SimpleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a skeleton with its own property container.
    pub fn with_rig(mut self, rig: SimpleRig) -> Self {
        self.stores.entry(rig.name.clone()).or_default();
        self.rigs.insert(rig.name.clone(), rig);
        self
    }

    pub fn with_store(mut self, name: &str) -> Self {
        self.stores.entry(name.to_string()).or_default();
        self
    }

    pub fn with_meshes(mut self, meshes: MeshTable) -> Self {
        self.meshes = meshes;
        self
    }

    pub fn with_constraints(mut self, owner: &str, table: ConstraintTable) -> Self {
        self.constraints.insert(owner.to_string(), table);
        self
    }

    pub fn rig_mut(&mut self, owner: &str) -> Option<&mut SimpleRig> {
        self.rigs.get_mut(owner)
    }

    pub fn store(&self, name: &str) -> Option<&MemoryStore> {
        self.stores.get(name)
    }

    /// Rename a skeleton and its container together.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(mut rig) = self.rigs.shift_remove(from) {
            rig.name = to.to_string();
            self.rigs.insert(to.to_string(), rig);
        }
        if let Some(store) = self.stores.shift_remove(from) {
            self.stores.insert(to.to_string(), store);
        }
        if let Some(mut table) = self.constraints.shift_remove(from) {
            table.set_skeleton_name(to);
            self.constraints.insert(to.to_string(), table);
        }
    }
}

impl Host for SimpleHost {
    fn rig(&self, owner: &str) -> Option<&dyn Rig> {
        self.rigs.get(owner).map(|r| r as &dyn Rig)
    }

    fn evaluated_rig(&self, owner: &str) -> Option<&dyn Rig> {
        self.evaluated.get(owner).map(|r| r as &dyn Rig)
    }

    fn property_store(
        &mut self,
        owner: &str,
        proxy: Option<&str>,
    ) -> Option<&mut dyn PropertyStore> {
        let name = match proxy {
            Some(p) if self.stores.contains_key(p) => p,
            _ => owner,
        };
        self.stores
            .get_mut(name)
            .map(|s| s as &mut dyn PropertyStore)
    }

    fn shape_keys(&mut self) -> &mut dyn ShapeKeyHost {
        &mut self.meshes
    }

    fn constraints(&mut self, owner: &str) -> Option<&mut dyn ConstraintHost> {
        self.constraints
            .get_mut(owner)
            .map(|c| c as &mut dyn ConstraintHost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_falls_back_to_owner_container() {
        let mut host = SimpleHost::new()
            .with_rig(SimpleRig::new("Body"))
            .with_store("Proxy");
        assert!(host.property_store("Body", Some("Missing")).is_some());
        let store = host.property_store("Body", Some("Proxy")).unwrap();
        store.tag_update();
        assert_eq!(host.store("Proxy").unwrap().update_tags, 1);
        assert_eq!(host.store("Body").unwrap().update_tags, 0);
        assert!(host.property_store("Nobody", None).is_none());
    }

    #[test]
    fn rename_moves_rig_store_and_constraints() {
        let mut host = SimpleHost::new()
            .with_rig(SimpleRig::new("Body"))
            .with_constraints("Body", ConstraintTable::new("Body"));
        host.rename("Body", "Hero");
        assert!(host.rig("Body").is_none());
        assert!(host.rig("Hero").is_some());
        assert!(host.store("Hero").is_some());
        assert_eq!(host.constraints("Hero").unwrap().skeleton_name(), "Hero");
    }
}
