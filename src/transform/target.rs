use super::{BuildError, MethodRebaseResolver, MethodToken, RebaseResolution, Step};
use crate::jvm::{BinaryName, UnqualifiedName};
use crate::pool::{locate_super_method, ClassData, MethodData};
use std::collections::HashMap;

/// A non-virtual call to the original version of a method
///
/// Targets answer every "call the original" question with one of these. Illegality is an
/// answer too: it only turns into [`BuildError::IllegalOriginalCall`] if a body tries to
/// lower it into an actual call.
#[derive(Clone, Debug)]
pub enum SpecialMethodInvocation<'g> {
    /// Call a method that exists in the hierarchy exactly as declared
    Standard {
        method: &'g MethodData<'g>,
        on: BinaryName,
    },

    /// Call the displaced copy of a rebased method
    Rebased {
        owner: BinaryName,
        rebased: MethodToken,
        trailing_null: bool,
    },

    /// No original version is reachable
    Illegal { requested: String },
}

impl<'g> SpecialMethodInvocation<'g> {
    pub fn is_legal(&self) -> bool {
        !matches!(self, SpecialMethodInvocation::Illegal { .. })
    }

    /// Lower the invocation into a body step
    pub fn into_step(self) -> Result<Step, BuildError> {
        match self {
            SpecialMethodInvocation::Standard { method, on } => Ok(Step::CallOriginal {
                owner: on,
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                trailing_null: false,
            }),
            SpecialMethodInvocation::Rebased {
                owner,
                rebased,
                trailing_null,
            } => Ok(Step::CallOriginal {
                owner,
                name: rebased.name,
                descriptor: rebased.descriptor,
                trailing_null,
            }),
            SpecialMethodInvocation::Illegal { requested } => {
                Err(BuildError::IllegalOriginalCall(requested))
            }
        }
    }
}

/// What "the original version of a method" means under each strategy
///
/// This is a closed set on purpose. Each strategy owns one arm, the data that arm carries is
/// exactly what its resolution rule needs, and `invoke_original` is a total match over the
/// three rules rather than a virtual call into an open hierarchy.
pub enum ImplementationTarget<'g> {
    /// The original is whatever the new subclass inherits
    Subclass {
        instrumented: BinaryName,
        super_class: &'g ClassData<'g>,
    },

    /// The original had its body displaced onto a renamed private copy
    Rebase {
        instrumented: BinaryName,
        original: &'g ClassData<'g>,
        resolver: MethodRebaseResolver,
    },

    /// The original class is overwritten in place, so only super-type methods survive
    ///
    /// The table is computed when the target is built. Resolution never consults the
    /// redefined type's own declarations: those bodies are the ones being thrown away.
    Redefine {
        instrumented: BinaryName,
        super_class: Option<&'g ClassData<'g>>,
        super_table: HashMap<String, &'g MethodData<'g>>,
    },
}

impl<'g> ImplementationTarget<'g> {
    pub fn instrumented_name(&self) -> &BinaryName {
        match self {
            ImplementationTarget::Subclass { instrumented, .. } => instrumented,
            ImplementationTarget::Rebase { instrumented, .. } => instrumented,
            ImplementationTarget::Redefine { instrumented, .. } => instrumented,
        }
    }

    /// Resolve a non-virtual call to the original version of a method
    pub fn invoke_original(&self, method: &MethodToken) -> SpecialMethodInvocation<'g> {
        let requested = method.signature();
        match self {
            ImplementationTarget::Subclass { super_class, .. } => {
                let super_class: &'g ClassData<'g> = *super_class;
                if method.is_constructor() {
                    // Only the direct superclass constructor is callable from a subclass
                    return constructor_invocation(super_class, method, requested);
                }
                match locate_super_method(super_class, &method.name, &method.descriptor) {
                    Some(found) if !found.is_abstract() => SpecialMethodInvocation::Standard {
                        method: found,
                        on: super_class.name.clone(),
                    },
                    _ => SpecialMethodInvocation::Illegal { requested },
                }
            }

            ImplementationTarget::Rebase {
                original, resolver, ..
            } => {
                let original: &'g ClassData<'g> = *original;
                match resolver.resolve(&requested) {
                    RebaseResolution::Method { rebased } => SpecialMethodInvocation::Rebased {
                        owner: original.name.clone(),
                        rebased,
                        trailing_null: false,
                    },
                    RebaseResolution::Constructor { rebased, .. } => {
                        SpecialMethodInvocation::Rebased {
                            owner: original.name.clone(),
                            rebased,
                            trailing_null: true,
                        }
                    }
                    RebaseResolution::Preserved => {
                        if let Some(declared) =
                            original.declared_method(&method.name, &method.descriptor)
                        {
                            if declared.is_abstract() {
                                return SpecialMethodInvocation::Illegal { requested };
                            }
                            return SpecialMethodInvocation::Standard {
                                method: declared,
                                on: original.name.clone(),
                            };
                        }
                        let super_class = match original.superclass {
                            Some(super_class) => super_class,
                            None => return SpecialMethodInvocation::Illegal { requested },
                        };
                        if method.is_constructor() {
                            return constructor_invocation(super_class, method, requested);
                        }
                        match locate_super_method(super_class, &method.name, &method.descriptor)
                        {
                            Some(found) if !found.is_abstract() => {
                                SpecialMethodInvocation::Standard {
                                    method: found,
                                    on: super_class.name.clone(),
                                }
                            }
                            _ => SpecialMethodInvocation::Illegal { requested },
                        }
                    }
                }
            }

            ImplementationTarget::Redefine {
                super_class,
                super_table,
                ..
            } => {
                let super_class: Option<&'g ClassData<'g>> = *super_class;
                if method.is_constructor() {
                    return match super_class {
                        Some(super_class) => {
                            constructor_invocation(super_class, method, requested)
                        }
                        None => SpecialMethodInvocation::Illegal { requested },
                    };
                }
                match super_table.get(&requested) {
                    Some(&found) if !found.is_abstract() => SpecialMethodInvocation::Standard {
                        method: found,
                        on: match super_class {
                            Some(super_class) => super_class.name.clone(),
                            None => found.class.name.clone(),
                        },
                    },
                    _ => SpecialMethodInvocation::Illegal { requested },
                }
            }
        }
    }
}

/// Constructor resolution against one specific class
fn constructor_invocation<'g>(
    super_class: &'g ClassData<'g>,
    method: &MethodToken,
    requested: String,
) -> SpecialMethodInvocation<'g> {
    match super_class.declared_method(&UnqualifiedName::INIT, &method.descriptor) {
        Some(constructor) if !constructor.is_private() => SpecialMethodInvocation::Standard {
            method: constructor,
            on: super_class.name.clone(),
        },
        _ => SpecialMethodInvocation::Illegal { requested },
    }
}
