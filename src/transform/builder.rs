use super::{
    session_token, AttributeAppender, AuxiliaryRecord, BuildError, ClassWriter, DynamicType,
    FieldRecord, FieldToken, Implementation, ImplementationTarget, InliningFilter,
    InstrumentedType, LoadedTypeInitializer, MatchFn, MethodBody, MethodRebaseResolver,
    MethodRecord, MethodRegistry, MethodMatcher, MethodNameTransformer, MethodToken,
    RebaseResolution, Step, Suffixing, SyntheticMethods, WriteRequest,
};
use crate::jvm::{
    BinaryName, ClassAccessFlags, ConstantValue, FieldAccessFlags, MethodAccessFlags, Name,
    UnqualifiedName, Version,
};
use crate::pool::{
    declared_and_inherited_virtuals, inherited_virtual_methods, super_method_table,
    ClassData, ClassFileLocator, MethodData, TypePool,
};
use std::collections::{HashMap, HashSet};

/// How a generated subclass comes by its constructors
pub enum ConstructorStrategy {
    /// Declare no constructors at all
    ///
    /// The caller is expected to define them by hand. The JVM accepts a class without
    /// constructors, it just cannot be instantiated.
    NoConstructors,

    /// Declare one pass-through constructor per visible superclass constructor
    ImitateSuperClass,
}

/// Fate of one originally declared method under redefinition
pub enum RedefinitionResolution<'r> {
    /// The original body is kept as the class file has it
    Retained,

    /// An interception produces a fresh body and the original one is dropped
    Replaced {
        implementation: &'r dyn Implementation,
    },
}

/// Naming discipline for generated and auxiliary types
///
/// All names derived from one strategy share a session token, so everything emitted by one
/// builder is visibly related and cannot collide with the output of another builder.
pub struct NamingStrategy {
    token: String,
}

impl NamingStrategy {
    pub fn new() -> NamingStrategy {
        NamingStrategy {
            token: session_token(),
        }
    }

    /// Name for a generated subclass of `base`
    pub fn generated(&self, base: &BinaryName) -> BinaryName {
        base.with_suffix(&format!(
            "{}${}",
            UnqualifiedName::GENERATED.as_str(),
            self.token,
        ))
    }

    /// Name for an auxiliary type attached to `base`
    pub fn auxiliary(&self, base: &BinaryName) -> BinaryName {
        base.with_suffix(&format!(
            "{}${}",
            UnqualifiedName::AUXILIARY.as_str(),
            self.token,
        ))
    }
}

impl Default for NamingStrategy {
    fn default() -> NamingStrategy {
        NamingStrategy::new()
    }
}

enum BuildStrategy<'g> {
    Subclass {
        super_class: &'g ClassData<'g>,
        constructor_strategy: ConstructorStrategy,
    },
    Rebase {
        original: &'g ClassData<'g>,
        original_blob: Vec<u8>,
        transformer: Box<dyn MethodNameTransformer>,
    },
    Redefine {
        original: &'g ClassData<'g>,
        original_blob: Vec<u8>,
    },
    Decorate {
        original: &'g ClassData<'g>,
        original_blob: Vec<u8>,
    },
}

/// One configuration, one generated class
///
/// A builder is configured through consuming operations and spent by [`TypeBuilder::make`],
/// which hands an assembled request to a class writer. Builders for the inlining strategies
/// (rebase, redefine, decorate) start from a model that mirrors the original type; subclass
/// builders start from an empty model under a generated name.
pub struct TypeBuilder<'g> {
    strategy: BuildStrategy<'g>,
    instrumented: InstrumentedType<'g>,
    registry: MethodRegistry,
    ignored: Vec<Box<dyn MethodMatcher>>,
    naming: NamingStrategy,
    version: Version,
    attributes: Vec<AttributeAppender>,
    auxiliaries: Vec<AuxiliaryRecord>,
    field_constants: HashMap<String, ConstantValue>,
}

impl<'g> TypeBuilder<'g> {
    /// Build a fresh subclass of an existing type
    ///
    /// Subclassing an interface produces a direct subclass of `java/lang/Object` that
    /// implements the interface, so the pool must know `java/lang/Object`.
    pub fn subclass(
        pool: &'g TypePool<'g>,
        super_type: &'g ClassData<'g>,
        constructors: ConstructorStrategy,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        if super_type.is_final() {
            return Err(BuildError::UnsupportedTransformation(format!(
                "cannot subclass final type {}",
                super_type.name.as_str(),
            )));
        }
        let naming = NamingStrategy::new();
        let name = naming.generated(&super_type.name);
        let (super_class, implemented) = if super_type.is_interface() {
            let object = pool.describe(&BinaryName::OBJECT).resolve()?;
            (object, Some(super_type))
        } else {
            (super_type, None)
        };
        let mut instrumented = InstrumentedType::subclass(
            name,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            super_class,
        );
        if let Some(interface) = implemented {
            instrumented = instrumented.with_interface(interface);
        }
        Ok(TypeBuilder::with_strategy(
            BuildStrategy::Subclass {
                super_class,
                constructor_strategy: constructors,
            },
            instrumented,
            naming,
            Version::JAVA8,
        ))
    }

    /// Rebase an existing type: intercepted bodies are displaced, not lost
    pub fn rebase(
        original: &'g ClassData<'g>,
        locator: &dyn ClassFileLocator,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        TypeBuilder::rebase_with(original, locator, Box::new(Suffixing::with_random_token()))
    }

    /// Rebase with an explicit renaming discipline for displaced methods
    pub fn rebase_with(
        original: &'g ClassData<'g>,
        locator: &dyn ClassFileLocator,
        transformer: Box<dyn MethodNameTransformer>,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        let original_blob = locate_blob(original, locator)?;
        let version = blob_version(original, &original_blob)?;
        Ok(TypeBuilder::with_strategy(
            BuildStrategy::Rebase {
                original,
                original_blob,
                transformer,
            },
            InstrumentedType::of_existing(original),
            NamingStrategy::new(),
            version,
        ))
    }

    /// Redefine an existing type: intercepted bodies are simply dropped
    pub fn redefine(
        original: &'g ClassData<'g>,
        locator: &dyn ClassFileLocator,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        let original_blob = locate_blob(original, locator)?;
        let version = blob_version(original, &original_blob)?;
        Ok(TypeBuilder::with_strategy(
            BuildStrategy::Redefine {
                original,
                original_blob,
            },
            InstrumentedType::of_existing(original),
            NamingStrategy::new(),
            version,
        ))
    }

    /// Decorate an existing type without touching its member structure
    pub fn decorate(
        original: &'g ClassData<'g>,
        locator: &dyn ClassFileLocator,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        let original_blob = locate_blob(original, locator)?;
        let version = blob_version(original, &original_blob)?;
        Ok(TypeBuilder::with_strategy(
            BuildStrategy::Decorate {
                original,
                original_blob,
            },
            InstrumentedType::of_existing(original),
            NamingStrategy::new(),
            version,
        ))
    }

    fn with_strategy(
        strategy: BuildStrategy<'g>,
        instrumented: InstrumentedType<'g>,
        naming: NamingStrategy,
        version: Version,
    ) -> TypeBuilder<'g> {
        TypeBuilder {
            strategy,
            instrumented,
            registry: MethodRegistry::new(),
            ignored: vec![Box::new(SyntheticMethods)],
            naming,
            version,
            attributes: vec![],
            auxiliaries: vec![],
            field_constants: HashMap::new(),
        }
    }

    fn refuse_decoration(&self, operation: &str) -> Result<(), BuildError> {
        if matches!(self.strategy, BuildStrategy::Decorate { .. }) {
            return Err(BuildError::UnsupportedTransformation(format!(
                "{} during decoration",
                operation,
            )));
        }
        Ok(())
    }

    /// Override the generated type's name
    pub fn name(mut self, name: BinaryName) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("renaming")?;
        self.instrumented = self.instrumented.with_name(name);
        Ok(self)
    }

    /// Override the generated type's access flags
    pub fn modifiers(mut self, access_flags: ClassAccessFlags) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("changing modifiers")?;
        self.instrumented = self.instrumented.with_modifiers(access_flags);
        Ok(self)
    }

    /// Implement an additional interface
    pub fn implement(mut self, interface: &'g ClassData<'g>) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("implementing an interface")?;
        self.instrumented = self.instrumented.with_interface(interface);
        Ok(self)
    }

    /// Declare a new field
    pub fn define_field(mut self, field: FieldToken) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("defining a field")?;
        self.instrumented = self.instrumented.with_field(field)?;
        Ok(self)
    }

    /// Declare a new static field populated from a `ConstantValue` attribute
    pub fn define_constant_field(
        mut self,
        field: FieldToken,
        value: ConstantValue,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("defining a field")?;
        if !field.access_flags.contains(FieldAccessFlags::STATIC) {
            return Err(BuildError::UnsupportedTransformation(format!(
                "constant value on instance field {}",
                field.name.as_str(),
            )));
        }
        if !value.fits(&field.descriptor) {
            return Err(BuildError::IncompatibleConstant {
                member: String::from(field.name.as_str()),
            });
        }
        self.field_constants
            .insert(String::from(field.name.as_str()), value);
        self.instrumented = self.instrumented.with_field(field)?;
        Ok(self)
    }

    /// Declare a new method and bind its implementation in one stroke
    pub fn define_method(
        mut self,
        method: MethodToken,
        implementation: Box<dyn Implementation>,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("defining a method")?;
        let signature = method.signature();
        self.instrumented = self.instrumented.with_method(method)?;
        self.registry.append(
            Box::new(MatchFn(move |m: &MethodToken| m.signature() == signature)),
            implementation,
        );
        Ok(self)
    }

    /// Bind an implementation to every method a matcher claims
    ///
    /// Later registrations shadow earlier ones on the methods they share.
    pub fn intercept(
        mut self,
        matcher: Box<dyn MethodMatcher>,
        implementation: Box<dyn Implementation>,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("intercepting methods")?;
        self.registry.append(matcher, implementation);
        Ok(self)
    }

    /// Shield additional methods from interception
    pub fn ignore_also(mut self, matcher: Box<dyn MethodMatcher>) -> TypeBuilder<'g> {
        self.ignored.push(matcher);
        self
    }

    /// Append steps to the `<clinit>` of the generated type
    pub fn initializer(mut self, steps: Vec<Step>) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("adding a type initializer")?;
        self.instrumented = self.instrumented.with_initializer(steps);
        Ok(self)
    }

    /// Stage work to run against the loaded class
    pub fn loaded_initializer(
        mut self,
        initializer: LoadedTypeInitializer,
    ) -> Result<TypeBuilder<'g>, BuildError> {
        self.refuse_decoration("adding a loaded type initializer")?;
        self.instrumented = self.instrumented.with_loaded_initializer(initializer);
        Ok(self)
    }

    /// Append a raw attribute to the emitted class file
    pub fn with_attribute(mut self, attribute: AttributeAppender) -> TypeBuilder<'g> {
        self.attributes.push(attribute);
        self
    }

    /// Emit an additional auxiliary type alongside the primary one
    pub fn with_auxiliary(mut self, auxiliary: AuxiliaryRecord) -> TypeBuilder<'g> {
        self.auxiliaries.push(auxiliary);
        self
    }

    /// Emit the class file under a specific version
    pub fn class_file_version(mut self, version: Version) -> TypeBuilder<'g> {
        self.version = version;
        self
    }

    /// Assemble the type and hand it to a class writer
    pub fn make(self, writer: &dyn ClassWriter) -> Result<DynamicType, BuildError> {
        let TypeBuilder {
            strategy,
            instrumented,
            registry,
            ignored,
            naming,
            version,
            attributes,
            mut auxiliaries,
            field_constants,
        } = self;

        // Phase 1: give every implementation its chance to refine the model, then freeze it
        let instrumented = registry.prepare_instrumented(instrumented)?;
        let instrumented = instrumented.validated()?;
        let name = instrumented.name().clone();
        log::debug!("Assembling {:?}", name);

        // Phase 2: collect candidate methods
        let declared_tokens: Vec<MethodToken> = instrumented.declared_methods().to_vec();
        let declared_signatures: HashSet<String> =
            declared_tokens.iter().map(|token| token.signature()).collect();

        let mut seen = declared_signatures.clone();
        let mut inherited: Vec<&'g MethodData<'g>> = vec![];
        match &strategy {
            BuildStrategy::Subclass { super_class, .. } => {
                let virtuals = declared_and_inherited_virtuals(super_class, &seen);
                absorb(&mut inherited, &mut seen, virtuals);
            }
            BuildStrategy::Rebase { original, .. }
            | BuildStrategy::Redefine { original, .. }
            | BuildStrategy::Decorate { original, .. } => {
                let virtuals = inherited_virtual_methods(original, &seen);
                absorb(&mut inherited, &mut seen, virtuals);
            }
        }
        for interface in instrumented.interfaces() {
            let virtuals = declared_and_inherited_virtuals(interface, &seen);
            absorb(&mut inherited, &mut seen, virtuals);
        }

        // Phase 3: decide eligibility and pair eligible methods with their bindings
        let predefined: HashSet<String> = match &strategy {
            BuildStrategy::Subclass { .. } => HashSet::new(),
            BuildStrategy::Rebase { original, .. }
            | BuildStrategy::Redefine { original, .. }
            | BuildStrategy::Decorate { original, .. } => {
                original.methods.iter().map(|m| m.signature()).collect()
            }
        };
        let filter = match &strategy {
            BuildStrategy::Subclass { .. } => {
                InliningFilter::for_subclass(declared_signatures.clone())
            }
            _ => InliningFilter::new(predefined.clone(), declared_signatures.clone()),
        };
        let (declared_plans, override_plans) =
            plan_methods(&filter, &ignored, &registry, declared_tokens, &inherited);

        // Phase 4: assemble method records under the strategy's own resolution rules
        let (records, original_blob) = match strategy {
            BuildStrategy::Subclass {
                super_class,
                constructor_strategy,
            } => (
                assemble_subclass(
                    &name,
                    super_class,
                    &constructor_strategy,
                    &declared_signatures,
                    declared_plans,
                    override_plans,
                )?,
                None,
            ),
            BuildStrategy::Rebase {
                original,
                original_blob,
                transformer,
            } => (
                assemble_rebase(
                    &name,
                    original,
                    transformer.as_ref(),
                    naming.auxiliary(&name),
                    declared_plans,
                    override_plans,
                    &predefined,
                    &mut auxiliaries,
                )?,
                Some(original_blob),
            ),
            BuildStrategy::Redefine {
                original,
                original_blob,
            }
            | BuildStrategy::Decorate {
                original,
                original_blob,
            } => (
                assemble_redefine(&name, original, declared_plans, override_plans, &predefined)?,
                Some(original_blob),
            ),
        };

        // Phase 5: emit
        emit(
            &instrumented,
            version,
            records,
            &field_constants,
            auxiliaries,
            original_blob,
            attributes,
            writer,
        )
    }
}

fn locate_blob(original: &ClassData, locator: &dyn ClassFileLocator) -> Result<Vec<u8>, BuildError> {
    locator
        .locate(&original.name)
        .ok_or_else(|| BuildError::UnresolvedType(String::from(original.name.as_str())))
}

fn blob_version(original: &ClassData, blob: &[u8]) -> Result<Version, BuildError> {
    Version::of_class_file(blob).map_err(|err| {
        BuildError::InvalidClassFile(format!("{}: {}", original.name.as_str(), err))
    })
}

struct PlannedDeclared<'r> {
    token: MethodToken,
    implementation: Option<&'r dyn Implementation>,
}

struct PlannedOverride<'r> {
    token: MethodToken,
    implementation: &'r dyn Implementation,
}

fn absorb<'g>(
    into: &mut Vec<&'g MethodData<'g>>,
    seen: &mut HashSet<String>,
    methods: Vec<&'g MethodData<'g>>,
) {
    for method in methods {
        if seen.insert(method.signature()) {
            into.push(method);
        }
    }
}

/// Run the matching chain over every candidate
///
/// Declared methods always come back as plans, with or without a binding: they have to be
/// emitted either way. Inherited candidates only come back when they are eligible and some
/// binding claims them, because an untouched inherited method is simply not redeclared.
fn plan_methods<'r>(
    filter: &InliningFilter,
    ignored: &[Box<dyn MethodMatcher>],
    registry: &'r MethodRegistry,
    declared_tokens: Vec<MethodToken>,
    inherited: &[&MethodData],
) -> (Vec<PlannedDeclared<'r>>, Vec<PlannedOverride<'r>>) {
    let mut declared_plans = vec![];
    for token in declared_tokens {
        let implementation = if filter.requires_instrumentation(ignored, &token) {
            registry.binding_for(&token)
        } else {
            None
        };
        if implementation.is_some() {
            log::trace!("Intercepting declared method {}", token.signature());
        }
        declared_plans.push(PlannedDeclared {
            token,
            implementation,
        });
    }

    let mut override_plans = vec![];
    for method in inherited {
        let full = MethodToken::of(method);
        if !filter.requires_instrumentation(ignored, &full) {
            continue;
        }
        if let Some(implementation) = registry.binding_for(&full) {
            log::trace!("Intercepting inherited method {:?}", method);
            override_plans.push(PlannedOverride {
                token: override_token(method),
                implementation,
            });
        }
    }
    (declared_plans, override_plans)
}

/// Declaration under which an inherited method is overridden
///
/// Visibility carries over; everything else (abstractness, finality, native linkage) belongs
/// to the original declaration, not to the override.
fn override_token(method: &MethodData) -> MethodToken {
    let visibility =
        method.access_flags & (MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED);
    MethodToken::new(method.name.clone(), method.descriptor.clone(), visibility)
        .with_exceptions(method.exceptions.clone())
}

/// Declaration under which a body is attached to a formerly body-less method
fn concrete_token(token: MethodToken) -> MethodToken {
    let flags = token.access_flags & !(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE);
    MethodToken::new(token.name, token.descriptor, flags).with_exceptions(token.exceptions)
}

fn assemble_subclass<'g>(
    name: &BinaryName,
    super_class: &'g ClassData<'g>,
    constructor_strategy: &ConstructorStrategy,
    declared_signatures: &HashSet<String>,
    declared_plans: Vec<PlannedDeclared<'_>>,
    override_plans: Vec<PlannedOverride<'_>>,
) -> Result<Vec<MethodRecord>, BuildError> {
    let target = ImplementationTarget::Subclass {
        instrumented: name.clone(),
        super_class,
    };
    let mut records = vec![];

    if let ConstructorStrategy::ImitateSuperClass = constructor_strategy {
        for constructor in super_class.methods.iter() {
            if !constructor.is_constructor() || constructor.is_private() {
                continue;
            }
            if declared_signatures.contains(&constructor.signature()) {
                // A hand-defined constructor takes precedence over imitation
                continue;
            }
            let visibility = constructor.access_flags
                & (MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED);
            let token = MethodToken::new(
                UnqualifiedName::INIT,
                constructor.descriptor.clone(),
                visibility,
            )
            .with_exceptions(constructor.exceptions.clone());

            let mut steps = vec![Step::LoadThis];
            for index in 0..token.descriptor.parameters.len() {
                steps.push(Step::LoadArgument(index));
            }
            steps.push(target.invoke_original(&token).into_step()?);
            steps.push(Step::Return);
            records.push(MethodRecord::Implement {
                token,
                body: MethodBody::Steps(steps),
            });
        }
    }

    for plan in declared_plans {
        match plan.implementation {
            Some(implementation) => {
                let token = concrete_token(plan.token);
                let body = implementation.appender(&target, &token)?;
                records.push(MethodRecord::Implement { token, body });
            }
            None if plan.token.is_abstract() => {
                records.push(MethodRecord::Implement {
                    token: plan.token,
                    body: MethodBody::Abstract,
                });
            }
            None => {
                return Err(BuildError::MissingImplementation {
                    method: plan.token.signature(),
                })
            }
        }
    }

    for plan in override_plans {
        let body = plan.implementation.appender(&target, &plan.token)?;
        records.push(MethodRecord::Implement {
            token: plan.token,
            body,
        });
    }

    Ok(records)
}

fn assemble_rebase<'g>(
    name: &BinaryName,
    original: &'g ClassData<'g>,
    transformer: &dyn MethodNameTransformer,
    placeholder_name: BinaryName,
    declared_plans: Vec<PlannedDeclared<'_>>,
    override_plans: Vec<PlannedOverride<'_>>,
    predefined: &HashSet<String>,
    auxiliaries: &mut Vec<AuxiliaryRecord>,
) -> Result<Vec<MethodRecord>, BuildError> {
    // Only methods the original also declares can have their bodies displaced
    let rebaseables: HashSet<String> = declared_plans
        .iter()
        .filter(|plan| plan.implementation.is_some())
        .map(|plan| plan.token.signature())
        .filter(|signature| predefined.contains(signature))
        .collect();
    let resolver =
        MethodRebaseResolver::make(original, &rebaseables, transformer, placeholder_name);

    let mut records = vec![];
    for (signature, resolution) in resolver.rebased_methods() {
        let original_method = original
            .methods
            .iter()
            .find(|m| m.signature().as_str() == signature.as_str());
        let original_token = match original_method {
            Some(method) => MethodToken::of(method),
            None => continue,
        };
        match resolution {
            RebaseResolution::Method { rebased }
            | RebaseResolution::Constructor { rebased, .. } => {
                log::trace!("Displacing {} onto {}", signature, rebased.signature());
                records.push(MethodRecord::RebasedOriginal {
                    original: original_token,
                    rebased: rebased.clone(),
                });
            }
            RebaseResolution::Preserved => {}
        }
    }

    // The placeholder type is emitted at most once per build, and only when needed
    if let Some(placeholder) = resolver.placeholder() {
        log::debug!("Reserving constructor placeholder {:?}", placeholder);
        auxiliaries.push(AuxiliaryRecord {
            name: placeholder.clone(),
            access_flags: ClassAccessFlags::SYNTHETIC | ClassAccessFlags::SUPER,
            super_class: BinaryName::OBJECT,
        });
    }

    let target = ImplementationTarget::Rebase {
        instrumented: name.clone(),
        original,
        resolver,
    };

    for plan in declared_plans {
        let signature = plan.token.signature();
        match plan.implementation {
            Some(implementation) => {
                let token = concrete_token(plan.token);
                let body = implementation.appender(&target, &token)?;
                records.push(MethodRecord::Implement { token, body });
            }
            None if predefined.contains(&signature) => {
                records.push(MethodRecord::Preserve { token: plan.token });
            }
            None if plan.token.is_abstract() => {
                records.push(MethodRecord::Implement {
                    token: plan.token,
                    body: MethodBody::Abstract,
                });
            }
            None => return Err(BuildError::MissingImplementation { method: signature }),
        }
    }

    for plan in override_plans {
        let body = plan.implementation.appender(&target, &plan.token)?;
        records.push(MethodRecord::Implement {
            token: plan.token,
            body,
        });
    }

    Ok(records)
}

fn assemble_redefine<'g>(
    name: &BinaryName,
    original: &'g ClassData<'g>,
    declared_plans: Vec<PlannedDeclared<'_>>,
    override_plans: Vec<PlannedOverride<'_>>,
    predefined: &HashSet<String>,
) -> Result<Vec<MethodRecord>, BuildError> {
    let target = ImplementationTarget::Redefine {
        instrumented: name.clone(),
        super_class: original.superclass,
        super_table: super_method_table(original),
    };
    let mut records = vec![];

    for plan in declared_plans {
        let signature = plan.token.signature();
        let resolution = match plan.implementation {
            Some(implementation) => RedefinitionResolution::Replaced { implementation },
            None => RedefinitionResolution::Retained,
        };
        match resolution {
            RedefinitionResolution::Replaced { implementation } => {
                log::trace!("Replacing {}", signature);
                let token = concrete_token(plan.token);
                let body = implementation.appender(&target, &token)?;
                records.push(MethodRecord::Implement { token, body });
            }
            RedefinitionResolution::Retained => {
                if predefined.contains(&signature) {
                    records.push(MethodRecord::Preserve { token: plan.token });
                } else if plan.token.is_abstract() {
                    records.push(MethodRecord::Implement {
                        token: plan.token,
                        body: MethodBody::Abstract,
                    });
                } else {
                    return Err(BuildError::MissingImplementation { method: signature });
                }
            }
        }
    }

    for plan in override_plans {
        let body = plan.implementation.appender(&target, &plan.token)?;
        records.push(MethodRecord::Implement {
            token: plan.token,
            body,
        });
    }

    Ok(records)
}

#[allow(clippy::too_many_arguments)]
fn emit<'g>(
    instrumented: &InstrumentedType<'g>,
    version: Version,
    records: Vec<MethodRecord>,
    field_constants: &HashMap<String, ConstantValue>,
    auxiliaries: Vec<AuxiliaryRecord>,
    original_blob: Option<Vec<u8>>,
    attributes: Vec<AttributeAppender>,
    writer: &dyn ClassWriter,
) -> Result<DynamicType, BuildError> {
    let name = instrumented.name().clone();
    let fields = instrumented
        .declared_fields()
        .iter()
        .map(|token| FieldRecord {
            token: token.clone(),
            constant: field_constants.get(token.name.as_str()).cloned(),
        })
        .collect();

    let request = WriteRequest {
        name: name.clone(),
        version,
        access_flags: instrumented.access_flags(),
        super_class: instrumented.super_class().map(|c| c.name.clone()),
        interfaces: instrumented
            .interfaces()
            .iter()
            .map(|i| i.name.clone())
            .collect(),
        fields,
        methods: records,
        type_initializer: instrumented.type_initializer().clone().into_body(),
        auxiliaries,
        original_blob,
        attributes,
    };
    log::debug!(
        "Requesting write of {:?} with {} method records",
        name,
        request.methods.len(),
    );

    let mut outputs = writer.write(request)?;
    let bytes = outputs.remove(&name).ok_or_else(|| {
        BuildError::Writer(format!("no class file produced for {}", name.as_str()))
    })?;
    Ok(DynamicType {
        name,
        bytes,
        auxiliary: outputs,
        loaded_initializer: instrumented.loaded_initializer().clone(),
    })
}
