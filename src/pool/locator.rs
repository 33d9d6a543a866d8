use crate::jvm::BinaryName;
use std::collections::HashMap;

/// Source of class file bytes
///
/// Rebasing and redefinition need the original class file of the type being
/// transformed, so builders in those modes query a locator up front. Locators
/// are fallible by design: a missing class file is an answer, not an error.
pub trait ClassFileLocator {
    /// Find the class file for a type, identified by its binary name
    fn locate(&self, name: &BinaryName) -> Option<Vec<u8>>;
}

/// Locator backed by an in-memory map of class files
pub struct MapLocator {
    class_files: HashMap<BinaryName, Vec<u8>>,
}

impl MapLocator {
    pub fn new() -> MapLocator {
        MapLocator {
            class_files: HashMap::new(),
        }
    }

    /// Register the class file for a type, replacing any previous entry
    pub fn insert(&mut self, name: BinaryName, class_file: Vec<u8>) {
        self.class_files.insert(name, class_file);
    }
}

impl Default for MapLocator {
    fn default() -> MapLocator {
        MapLocator::new()
    }
}

impl ClassFileLocator for MapLocator {
    fn locate(&self, name: &BinaryName) -> Option<Vec<u8>> {
        self.class_files.get(name).cloned()
    }
}

/// Locator that consults a sequence of other locators, first hit wins
pub struct CompoundLocator {
    locators: Vec<Box<dyn ClassFileLocator>>,
}

impl CompoundLocator {
    pub fn new(locators: Vec<Box<dyn ClassFileLocator>>) -> CompoundLocator {
        CompoundLocator { locators }
    }
}

impl ClassFileLocator for CompoundLocator {
    fn locate(&self, name: &BinaryName) -> Option<Vec<u8>> {
        self.locators.iter().find_map(|locator| locator.locate(name))
    }
}

/// Locator that never finds anything
pub struct NoOpLocator;

impl ClassFileLocator for NoOpLocator {
    fn locate(&self, _name: &BinaryName) -> Option<Vec<u8>> {
        None
    }
}
