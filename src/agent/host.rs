use super::transformer::ClassFileTransformer;
use crate::jvm::BinaryName;
use crate::util::RefId;
use std::fmt;
use std::sync::Arc;

/// Identity handle for a defining class loader
///
/// Loaders carry no natural key, so identity is the allocation behind the `Arc` itself.
/// The name is informational and shows up in logs only.
pub struct ClassLoaderHandle {
    pub name: String,
}

impl ClassLoaderHandle {
    pub fn named(name: impl Into<String>) -> Arc<ClassLoaderHandle> {
        Arc::new(ClassLoaderHandle { name: name.into() })
    }

    pub fn bootstrap() -> Arc<ClassLoaderHandle> {
        ClassLoaderHandle::named("bootstrap")
    }
}

impl fmt::Debug for ClassLoaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Whether two handles denote the same loader
pub fn same_loader(a: &Arc<ClassLoaderHandle>, b: &Arc<ClassLoaderHandle>) -> bool {
    RefId(&**a) == RefId(&**b)
}

/// One class as the host currently has it
#[derive(Clone, Debug)]
pub struct LoadedClass {
    pub name: BinaryName,
    pub loader: Arc<ClassLoaderHandle>,

    /// Class file bytes as last defined
    pub bytes: Vec<u8>,

    /// Whether the host permits redefining this class at all
    pub modifiable: bool,
}

/// One class file about to replace a loaded class
#[derive(Clone, Debug)]
pub struct ClassDefinition {
    pub name: BinaryName,
    pub loader: Arc<ClassLoaderHandle>,
    pub bytes: Vec<u8>,
}

/// Failure reported by the host for a redefinition call
#[derive(Debug)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instrumentation host error: {}", self.0)
    }
}

impl std::error::Error for HostError {}

/// Seam to the process's instrumentation machinery
///
/// A host hands loaded classes out, accepts hooks on future class loading, and applies
/// redefinitions. One `redefine` call is the unit of atomicity: either every definition in
/// the slice takes effect or none does.
pub trait InstrumentationHost: Send + Sync {
    /// Hook future class loading
    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>);

    /// Unhook a previously added transformer, reporting whether it was present
    fn remove_transformer(&self, transformer: &Arc<dyn ClassFileTransformer>) -> bool;

    /// Every class currently loaded
    fn loaded_classes(&self) -> Vec<LoadedClass>;

    /// One class, identified by name and defining loader
    fn loaded_class(
        &self,
        name: &BinaryName,
        loader: &Arc<ClassLoaderHandle>,
    ) -> Option<LoadedClass>;

    /// Whether the host permits redefining this class
    fn is_modifiable(&self, class: &LoadedClass) -> bool;

    /// Replace the class files of loaded classes, all or nothing
    fn redefine(&self, definitions: &[ClassDefinition]) -> Result<(), HostError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loader_identity_is_the_allocation() {
        let first = ClassLoaderHandle::named("app");
        let second = ClassLoaderHandle::named("app");

        assert!(same_loader(&first, &first.clone()));
        assert!(!same_loader(&first, &second));
    }
}
