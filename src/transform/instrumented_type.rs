use super::{BuildError, LoadedTypeInitializer, Step, TypeInitializer};
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, UnqualifiedName,
};
use crate::pool::{method_signature, ClassData, FieldData, MethodData};

/// Detached description of a field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldToken {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub access_flags: FieldAccessFlags,
}

impl FieldToken {
    pub fn new(
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
        access_flags: FieldAccessFlags,
    ) -> FieldToken {
        FieldToken {
            name,
            descriptor,
            access_flags,
        }
    }

    /// Detach a field description from the pool
    pub fn of(field: &FieldData) -> FieldToken {
        FieldToken {
            name: field.name.clone(),
            descriptor: field.descriptor.clone(),
            access_flags: field.access_flags,
        }
    }
}

/// Detached description of a method
///
/// Tokens carry no owner. The same token can describe a method on the type it was detached
/// from or the matching declaration on a type being generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodToken {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub access_flags: MethodAccessFlags,
    pub exceptions: Vec<BinaryName>,
}

impl MethodToken {
    pub fn new(
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        access_flags: MethodAccessFlags,
    ) -> MethodToken {
        MethodToken {
            name,
            descriptor,
            access_flags,
            exceptions: vec![],
        }
    }

    pub fn with_exceptions(mut self, exceptions: Vec<BinaryName>) -> MethodToken {
        self.exceptions = exceptions;
        self
    }

    /// Detach a method description from the pool
    pub fn of(method: &MethodData) -> MethodToken {
        MethodToken {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access_flags: method.access_flags,
            exceptions: method.exceptions.clone(),
        }
    }

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

    pub fn is_synthetic(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::SYNTHETIC)
    }

    pub fn is_bridge(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::BRIDGE)
    }

    pub fn is_virtual(&self) -> bool {
        !self.is_static()
            && !self.is_private()
            && !self.is_constructor()
            && !self.is_type_initializer()
    }

    pub fn is_overridable(&self) -> bool {
        self.is_virtual() && !self.is_final()
    }

    /// Signature key, see [`method_signature`](crate::pool::method_signature)
    pub fn signature(&self) -> String {
        method_signature(&self.name, &self.descriptor)
    }
}

/// Immutable model of the type under construction
///
/// Every mutator returns a fresh value and leaves the receiver untouched, so a failed or
/// abandoned refinement can never corrupt the model it started from. Member collisions are
/// rejected at the point of definition: fields collide on name, methods on signature.
#[derive(Clone, Debug)]
pub struct InstrumentedType<'g> {
    name: BinaryName,
    access_flags: ClassAccessFlags,
    super_class: Option<&'g ClassData<'g>>,
    interfaces: Vec<&'g ClassData<'g>>,
    declared_fields: Vec<FieldToken>,
    declared_methods: Vec<MethodToken>,
    type_initializer: TypeInitializer,
    loaded_initializer: LoadedTypeInitializer,
}

impl<'g> InstrumentedType<'g> {
    /// Model for a fresh subclass with no declared members yet
    pub fn subclass(
        name: BinaryName,
        access_flags: ClassAccessFlags,
        super_class: &'g ClassData<'g>,
    ) -> InstrumentedType<'g> {
        InstrumentedType {
            name,
            access_flags,
            super_class: Some(super_class),
            interfaces: vec![],
            declared_fields: vec![],
            declared_methods: vec![],
            type_initializer: TypeInitializer::none(),
            loaded_initializer: LoadedTypeInitializer::NoOp,
        }
    }

    /// Model mirroring an existing type, member for member
    pub fn of_existing(original: &'g ClassData<'g>) -> InstrumentedType<'g> {
        InstrumentedType {
            name: original.name.clone(),
            access_flags: original.access_flags,
            super_class: original.superclass,
            interfaces: original.interfaces.iter().collect(),
            declared_fields: original.fields.iter().map(FieldToken::of).collect(),
            declared_methods: original.methods.iter().map(MethodToken::of).collect(),
            type_initializer: TypeInitializer::none(),
            loaded_initializer: LoadedTypeInitializer::NoOp,
        }
    }

    pub fn name(&self) -> &BinaryName {
        &self.name
    }

    pub fn access_flags(&self) -> ClassAccessFlags {
        self.access_flags
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn super_class(&self) -> Option<&'g ClassData<'g>> {
        self.super_class
    }

    pub fn interfaces(&self) -> &[&'g ClassData<'g>] {
        &self.interfaces
    }

    pub fn declared_fields(&self) -> &[FieldToken] {
        &self.declared_fields
    }

    pub fn declared_methods(&self) -> &[MethodToken] {
        &self.declared_methods
    }

    pub fn type_initializer(&self) -> &TypeInitializer {
        &self.type_initializer
    }

    pub fn loaded_initializer(&self) -> &LoadedTypeInitializer {
        &self.loaded_initializer
    }

    pub fn with_name(&self, name: BinaryName) -> InstrumentedType<'g> {
        let mut next = self.clone();
        next.name = name;
        next
    }

    pub fn with_modifiers(&self, access_flags: ClassAccessFlags) -> InstrumentedType<'g> {
        let mut next = self.clone();
        next.access_flags = access_flags;
        next
    }

    /// Declare a field, rejecting a name collision
    pub fn with_field(&self, field: FieldToken) -> Result<InstrumentedType<'g>, BuildError> {
        if self.declared_fields.iter().any(|f| f.name == field.name) {
            return Err(BuildError::DuplicateMember {
                owner: String::from(self.name.as_str()),
                signature: String::from(field.name.as_str()),
            });
        }
        let mut next = self.clone();
        next.declared_fields.push(field);
        Ok(next)
    }

    /// Declare a method, rejecting a signature collision
    pub fn with_method(&self, method: MethodToken) -> Result<InstrumentedType<'g>, BuildError> {
        if self
            .declared_methods
            .iter()
            .any(|m| m.signature() == method.signature())
        {
            return Err(BuildError::DuplicateMember {
                owner: String::from(self.name.as_str()),
                signature: method.signature(),
            });
        }
        let mut next = self.clone();
        next.declared_methods.push(method);
        Ok(next)
    }

    /// Implement an interface, keeping the interface list duplicate free
    pub fn with_interface(&self, interface: &'g ClassData<'g>) -> InstrumentedType<'g> {
        if self.interfaces.iter().any(|i| i.name == interface.name) {
            return self.clone();
        }
        let mut next = self.clone();
        next.interfaces.push(interface);
        next
    }

    /// Append steps to the type initializer
    pub fn with_initializer(&self, steps: Vec<Step>) -> InstrumentedType<'g> {
        let mut next = self.clone();
        next.type_initializer = next.type_initializer.expand_with(steps);
        next
    }

    /// Compose another action into the loaded type initializer
    pub fn with_loaded_initializer(
        &self,
        initializer: LoadedTypeInitializer,
    ) -> InstrumentedType<'g> {
        let mut next = self.clone();
        next.loaded_initializer = next.loaded_initializer.expand_with(initializer);
        next
    }

    /// Strip the parts of the model that cannot travel with the class file
    pub fn detach(&self) -> InstrumentedType<'g> {
        let mut next = self.clone();
        next.loaded_initializer = LoadedTypeInitializer::NoOp;
        next
    }

    /// Re-check the model invariants as a whole
    ///
    /// Individual mutators already reject collisions, but a model assembled from an existing
    /// type or refined through several hands is re-validated once before any bytes are
    /// emitted.
    pub fn validated(self) -> Result<InstrumentedType<'g>, BuildError> {
        for (index, field) in self.declared_fields.iter().enumerate() {
            if self.declared_fields[..index]
                .iter()
                .any(|f| f.name == field.name)
            {
                return Err(BuildError::DuplicateMember {
                    owner: String::from(self.name.as_str()),
                    signature: String::from(field.name.as_str()),
                });
            }
        }
        for (index, method) in self.declared_methods.iter().enumerate() {
            if self.declared_methods[..index]
                .iter()
                .any(|m| m.signature() == method.signature())
            {
                return Err(BuildError::DuplicateMember {
                    owner: String::from(self.name.as_str()),
                    signature: method.signature(),
                });
            }
        }
        if !self.is_abstract() && !self.access_flags.contains(ClassAccessFlags::INTERFACE) {
            if let Some(abstract_method) =
                self.declared_methods.iter().find(|m| m.is_abstract())
            {
                return Err(BuildError::MissingImplementation {
                    method: abstract_method.signature(),
                });
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ConstantValue;
    use crate::pool::{PoolArenas, TypePool};

    fn unqualified(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(String::from(name)).unwrap()
    }

    fn binary(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    #[test]
    fn field_collisions_leave_the_model_usable() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let base = InstrumentedType::subclass(
            binary("me/Generated"),
            ClassAccessFlags::PUBLIC,
            java.object,
        );
        let counter = FieldToken::new(
            unqualified("counter"),
            FieldType::int(),
            FieldAccessFlags::PRIVATE,
        );
        let with_counter = base.with_field(counter.clone()).unwrap();

        // Same name, different descriptor: still a collision
        let clash = FieldToken::new(
            unqualified("counter"),
            FieldType::long(),
            FieldAccessFlags::PRIVATE,
        );
        let err = with_counter.with_field(clash).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMember { .. }));

        // The receiver of the failed refinement is intact and refinable
        assert_eq!(with_counter.declared_fields().len(), 1);
        let extended = with_counter
            .with_field(FieldToken::new(
                unqualified("label"),
                FieldType::object(BinaryName::STRING),
                FieldAccessFlags::PRIVATE,
            ))
            .unwrap();
        assert_eq!(extended.declared_fields().len(), 2);

        // And the value it was derived from never saw the field at all
        assert_eq!(base.declared_fields().len(), 0);
    }

    #[test]
    fn methods_collide_on_signature_not_name() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let base = InstrumentedType::subclass(
            binary("me/Generated"),
            ClassAccessFlags::PUBLIC,
            java.object,
        );
        let nullary = MethodToken::new(
            unqualified("value"),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            MethodAccessFlags::PUBLIC,
        );
        let unary = MethodToken::new(
            unqualified("value"),
            MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::int()),
            },
            MethodAccessFlags::PUBLIC,
        );

        let overloaded = base
            .with_method(nullary.clone())
            .unwrap()
            .with_method(unary)
            .unwrap();
        assert_eq!(overloaded.declared_methods().len(), 2);

        let err = overloaded.with_method(nullary).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMember { .. }));
    }

    #[test]
    fn validation_rejects_abstract_methods_on_concrete_types() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let draft = InstrumentedType::subclass(
            binary("me/Generated"),
            ClassAccessFlags::PUBLIC,
            java.object,
        )
        .with_method(MethodToken::new(
            unqualified("dangling"),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        ))
        .unwrap();

        let err = draft.clone().validated().unwrap_err();
        assert!(matches!(err, BuildError::MissingImplementation { .. }));

        let abstract_draft = draft.with_modifiers(
            ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
        );
        assert!(abstract_draft.validated().is_ok());
    }

    #[test]
    fn detaching_strips_the_loaded_initializer() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let draft = InstrumentedType::subclass(
            binary("me/Generated"),
            ClassAccessFlags::PUBLIC,
            java.object,
        )
        .with_loaded_initializer(LoadedTypeInitializer::SetStaticField {
            field: unqualified("SEED"),
            value: ConstantValue::Integer(42),
        });

        assert!(draft.loaded_initializer().is_alive());
        let detached = draft.detach();
        assert!(!detached.loaded_initializer().is_alive());

        // Detaching is not destructive to the original
        assert!(draft.loaded_initializer().is_alive());
    }

    #[test]
    fn mirroring_an_existing_type() {
        let arenas = PoolArenas::new();
        let pool = TypePool::new(&arenas);
        let java = pool.insert_java_base_types();

        let model = InstrumentedType::of_existing(java.string);
        assert_eq!(model.name(), &BinaryName::STRING);
        assert_eq!(model.super_class(), Some(java.object));
        assert_eq!(model.declared_methods().len(), 1);
        assert_eq!(
            model.declared_methods()[0].signature(),
            "concat(Ljava/lang/String;)Ljava/lang/String;",
        );
    }
}
