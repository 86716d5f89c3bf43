use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::classfile::ClassFile;

type Classes = RwLock<HashMap<String, Arc<ClassFile>>>;

/// Descriptors kept by an aggregating loader, keyed by dotted class name.
///
/// Each descriptor decoded into a registry holds a weak handle back to it,
/// which is how [`ClassFile::superclass`] and the member lookups walk the
/// hierarchy. Transient loaders have no registry and those lookups find
/// nothing.
#[derive(Clone, Default)]
pub struct ClassRegistry {
    classes: Arc<Classes>,
}

/// Weak back-reference from a descriptor to the registry that owns it.
#[derive(Clone, Default)]
pub struct RegistryHandle(Weak<Classes>);

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0.strong_count() > 0 {
            "RegistryHandle(live)"
        } else {
            "RegistryHandle(detached)"
        })
    }
}

impl RegistryHandle {
    pub fn lookup(&self, class_name: &str) -> Option<Arc<ClassFile>> {
        let classes = self.0.upgrade()?;
        let guard = read(&classes);
        guard.get(class_name).cloned()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle(Arc::downgrade(&self.classes))
    }

    pub fn get(&self, class_name: &str) -> Option<Arc<ClassFile>> {
        read(&self.classes).get(class_name).cloned()
    }

    /// Stores `classfile` under its name, returning the descriptor it
    /// replaced.
    pub fn insert(&self, classfile: Arc<ClassFile>) -> Option<Arc<ClassFile>> {
        let name = classfile.class_name().to_string();
        write(&self.classes).insert(name, classfile)
    }

    pub fn remove(&self, class_name: &str) -> Option<Arc<ClassFile>> {
        write(&self.classes).remove(class_name)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        read(&self.classes).contains_key(class_name)
    }

    pub fn len(&self) -> usize {
        read(&self.classes).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.classes).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn classfiles(&self) -> Vec<Arc<ClassFile>> {
        read(&self.classes).values().cloned().collect()
    }
}

// A panic while holding the lock leaves the map itself intact.
fn read(classes: &Classes) -> RwLockReadGuard<'_, HashMap<String, Arc<ClassFile>>> {
    classes.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(classes: &Classes) -> RwLockWriteGuard<'_, HashMap<String, Arc<ClassFile>>> {
    classes.write().unwrap_or_else(PoisonError::into_inner)
}
