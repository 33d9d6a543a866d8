//! Pool of type descriptions
//!
//! Instrumentation decisions are made against descriptions of classes, never against live
//! classes. The pool is one unified graph of every type a build refers to: the type being
//! instrumented, its supertypes, and the library types generated code leans on. Hierarchy
//! edges are resolved references into the same graph, so walking a superclass chain is
//! pointer chasing rather than repeated name lookup.

use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod locator;
mod lookup;

pub use locator::*;
pub use lookup::*;

/// Render the signature key of a method, its name followed by its rendered descriptor
///
/// Two methods with equal signature keys occupy the same slot in a class, and one overrides
/// the other when they sit on different levels of a hierarchy.
pub fn method_signature(name: &UnqualifiedName, descriptor: &MethodDescriptor<BinaryName>) -> String {
    let mut signature = String::from(name.as_str());
    descriptor.render_to(&mut signature);
    signature
}

pub struct PoolArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> PoolArenas<'g> {
    pub fn new() -> Self {
        PoolArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for PoolArenas<'g> {
    fn default() -> Self {
        PoolArenas::new()
    }
}

/// Graph of type descriptions, keyed by binary name
pub struct TypePool<'g> {
    arenas: &'g PoolArenas<'g>,
    classes: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,
}

impl<'g> TypePool<'g> {
    /// New empty pool
    pub fn new(arenas: &'g PoolArenas<'g>) -> Self {
        TypePool {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    /// Add a new class to the pool
    ///
    /// If a class of the same name is already present, that description is returned and the
    /// argument is discarded.
    pub fn add_class(&'g self, data: ClassData<'g>) -> &'g ClassData<'g> {
        if let Some(existing) = self.classes.get(&data.name) {
            return existing;
        }
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(&data.name, data);
        data
    }

    /// Add a method to the pool and to its class
    ///
    /// A method with the same name and descriptor already on the class shadows the argument.
    pub fn add_method(&self, method: MethodData<'g>) -> &'g MethodData<'g> {
        if let Some(m) = method
            .class
            .methods
            .iter()
            .find(|m| m.name == method.name && m.descriptor == method.descriptor)
        {
            m
        } else {
            let data = &*self.arenas.method_arena.alloc(method);
            data.class.methods.push(data);
            data
        }
    }

    /// Add a field to the pool and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> &'g FieldData<'g> {
        if let Some(f) = field.class.fields.iter().find(|f| f.name == field.name) {
            f
        } else {
            let data = &*self.arenas.field_arena.alloc(field);
            data.class.fields.push(data);
            data
        }
    }

    pub fn lookup_class(&'g self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        self.classes.get(name)
    }

    /// Describe a type by name
    ///
    /// Resolution failure is an answer here. It only turns into an error if the caller insists
    /// on a resolved description.
    pub fn describe(&'g self, name: &BinaryName) -> TypeResolution<'g> {
        match self.classes.get(name) {
            Some(data) => TypeResolution::Resolved(data),
            None => TypeResolution::Unresolved(name.clone()),
        }
    }

    /// Add the `java.*` types generated code depends on
    pub fn insert_java_base_types(&'g self) -> JavaBase<'g> {
        let object = self.add_class(ClassData::new(
            BinaryName::OBJECT,
            None,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        ));
        let object_init = self.add_method(MethodData {
            class: object,
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            access_flags: MethodAccessFlags::PUBLIC,
            exceptions: vec![],
        });
        let object_to_string = self.add_method(MethodData {
            class: object,
            name: UnqualifiedName::TOSTRING,
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
            access_flags: MethodAccessFlags::PUBLIC,
            exceptions: vec![],
        });
        let object_equals = self.add_method(MethodData {
            class: object,
            name: UnqualifiedName::EQUALS,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::object(BinaryName::OBJECT)],
                return_type: Some(FieldType::boolean()),
            },
            access_flags: MethodAccessFlags::PUBLIC,
            exceptions: vec![],
        });
        let object_hash_code = self.add_method(MethodData {
            class: object,
            name: UnqualifiedName::HASHCODE,
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            access_flags: MethodAccessFlags::PUBLIC,
            exceptions: vec![],
        });

        let string = self.add_class(ClassData::new(
            BinaryName::STRING,
            Some(object),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SUPER,
        ));
        let string_concat = self.add_method(MethodData {
            class: string,
            name: UnqualifiedName::CONCAT,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::object(BinaryName::STRING)],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
            access_flags: MethodAccessFlags::PUBLIC,
            exceptions: vec![],
        });

        JavaBase {
            object,
            object_init,
            object_to_string,
            object_equals,
            object_hash_code,
            string,
            string_concat,
        }
    }
}

/// Outcome of describing a type by name
pub enum TypeResolution<'g> {
    Resolved(&'g ClassData<'g>),
    Unresolved(BinaryName),
}

impl<'g> TypeResolution<'g> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, TypeResolution::Resolved(_))
    }

    /// Insist on a resolved description
    pub fn resolve(self) -> Result<&'g ClassData<'g>, UnresolvedTypeError> {
        match self {
            TypeResolution::Resolved(data) => Ok(data),
            TypeResolution::Unresolved(name) => Err(UnresolvedTypeError { name }),
        }
    }
}

#[derive(Debug)]
pub struct UnresolvedTypeError {
    pub name: BinaryName,
}

impl fmt::Display for UnresolvedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {} is not in the pool", self.name.as_str())
    }
}

impl std::error::Error for UnresolvedTypeError {}

/// Standard library types every pool starts from
pub struct JavaBase<'g> {
    pub object: &'g ClassData<'g>,
    pub object_init: &'g MethodData<'g>,
    pub object_to_string: &'g MethodData<'g>,
    pub object_equals: &'g MethodData<'g>,
    pub object_hash_code: &'g MethodData<'g>,
    pub string: &'g ClassData<'g>,
    pub string_concat: &'g MethodData<'g>,
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<&'g ClassData<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Class access flags
    pub access_flags: ClassAccessFlags,

    /// Methods
    pub methods: FrozenVec<&'g MethodData<'g>>,

    /// Fields
    pub fields: FrozenVec<&'g FieldData<'g>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: Option<&'g ClassData<'g>>,
        access_flags: ClassAccessFlags,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass,
            interfaces: FrozenVec::new(),
            access_flags,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::FINAL)
    }

    /// Method declared directly on this class, ignoring the hierarchy
    pub fn declared_method(
        &'g self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&'g MethodData<'g>> {
        self.methods
            .iter()
            .find(|m| &m.name == name && &m.descriptor == descriptor)
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

#[derive(PartialEq, Eq)]
pub struct MethodData<'g> {
    /// Class
    pub class: &'g ClassData<'g>,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Method access flags
    pub access_flags: MethodAccessFlags,

    /// Checked exceptions the method declares
    pub exceptions: Vec<BinaryName>,
}

impl<'g> MethodData<'g> {
    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    pub fn is_type_initializer(&self) -> bool {
        self.name == UnqualifiedName::CLINIT
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::FINAL)
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PRIVATE)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::NATIVE)
    }

    /// Does the method participate in virtual dispatch?
    pub fn is_virtual(&self) -> bool {
        !self.is_static()
            && !self.is_private()
            && !self.is_constructor()
            && !self.is_type_initializer()
    }

    /// Could a subtype override this method?
    pub fn is_overridable(&self) -> bool {
        self.is_virtual() && !self.is_final()
    }

    /// Signature key of the method, see [`method_signature`]
    pub fn signature(&self) -> String {
        method_signature(&self.name, &self.descriptor)
    }
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

#[derive(PartialEq, Eq)]
pub struct FieldData<'g> {
    /// Class
    ///
    /// Note: this is a pointer back to the class (so don't derive `Debug`)
    pub class: &'g ClassData<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<BinaryName>,

    /// Field access flags
    pub access_flags: FieldAccessFlags,
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classes_are_shared_by_name() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let duplicate = pool.add_class(ClassData::new(
            BinaryName::OBJECT,
            None,
            ClassAccessFlags::PUBLIC,
        ));
        assert!(std::ptr::eq(java.object, duplicate));
        assert_eq!(pool.lookup_class(&BinaryName::OBJECT), Some(java.object));
    }

    #[test]
    fn methods_are_shared_by_signature() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let duplicate = pool.add_method(MethodData {
            class: java.string,
            name: UnqualifiedName::CONCAT,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::object(BinaryName::STRING)],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
            access_flags: MethodAccessFlags::PUBLIC,
            exceptions: vec![],
        });
        assert!(std::ptr::eq(java.string_concat, duplicate));
        assert_eq!(java.string.methods.len(), 1);
    }

    #[test]
    fn describing_types() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let resolved = pool.describe(&BinaryName::STRING);
        assert!(resolved.is_resolved());
        assert_eq!(resolved.resolve().unwrap(), java.string);

        let missing_name = BinaryName::from_string(String::from("me/Missing")).unwrap();
        let missing = pool.describe(&missing_name);
        assert!(!missing.is_resolved());
        let err = missing.resolve().unwrap_err();
        assert_eq!(err.to_string(), "type me/Missing is not in the pool");
    }

    #[test]
    fn declared_method_ignores_hierarchy() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let to_string_descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::object(BinaryName::STRING)),
        };
        assert!(java
            .object
            .declared_method(&UnqualifiedName::TOSTRING, &to_string_descriptor)
            .is_some());
        assert!(java
            .string
            .declared_method(&UnqualifiedName::TOSTRING, &to_string_descriptor)
            .is_none());
    }

    #[test]
    fn signature_keys() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        assert_eq!(
            java.string_concat.signature(),
            "concat(Ljava/lang/String;)Ljava/lang/String;",
        );
        assert_eq!(java.object_init.signature(), "<init>()V");
    }
}
