use super::{BuildError, MethodToken};
use crate::jvm::{BinaryName, FieldType, MethodAccessFlags, Name, UnqualifiedName};
use crate::pool::ClassData;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

/// Token distinguishing names generated by this process
///
/// Tokens only need to be unique within a process, so losing the entropy source is not fatal:
/// a process-wide counter keeps generated names from colliding with each other either way.
pub fn session_token() -> String {
    let mut bytes = [0u8; 4];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => format!("{:08x}", u32::from_be_bytes(bytes)),
        Err(_) => {
            static FALLBACK: AtomicU32 = AtomicU32::new(0);
            format!("{:08x}", FALLBACK.fetch_add(1, Ordering::Relaxed))
        }
    }
}

/// Renaming discipline for methods displaced by a rebasement
pub trait MethodNameTransformer {
    fn transform(&self, name: &UnqualifiedName) -> UnqualifiedName;
}

/// Appends a `$`-separated suffix segment to displaced names
pub struct Suffixing {
    suffix: String,
}

impl Suffixing {
    /// Suffix tagged with a fresh session token
    ///
    /// Rebasing the same class twice in one process must not produce colliding names, so the
    /// default suffix embeds a token drawn per resolver.
    pub fn with_random_token() -> Suffixing {
        Suffixing {
            suffix: format!("{}${}", UnqualifiedName::ORIGINAL.as_str(), session_token()),
        }
    }

    pub fn new(suffix: String) -> Result<Suffixing, BuildError> {
        UnqualifiedName::check_valid(&suffix).map_err(BuildError::MalformedName)?;
        Ok(Suffixing { suffix })
    }
}

impl MethodNameTransformer for Suffixing {
    fn transform(&self, name: &UnqualifiedName) -> UnqualifiedName {
        name.with_suffix(&self.suffix)
    }
}

/// Prepends a validated prefix to displaced names
pub struct Prefixing {
    prefix: UnqualifiedName,
}

impl Prefixing {
    pub fn new(prefix: String) -> Result<Prefixing, BuildError> {
        let prefix = UnqualifiedName::from_string(prefix).map_err(BuildError::MalformedName)?;
        Ok(Prefixing { prefix })
    }
}

impl MethodNameTransformer for Prefixing {
    fn transform(&self, name: &UnqualifiedName) -> UnqualifiedName {
        self.prefix.concat(name)
    }
}

/// How one original method fares under rebasement
#[derive(Clone, Debug, PartialEq)]
pub enum RebaseResolution {
    /// The method keeps its name and flags
    Preserved,

    /// The original body survives under a new private name
    Method { rebased: MethodToken },

    /// The original constructor body survives under its own name, disambiguated by an
    /// appended placeholder parameter that callers always pass as null
    Constructor {
        rebased: MethodToken,
        placeholder: BinaryName,
    },
}

impl RebaseResolution {
    pub fn is_rebased(&self) -> bool {
        !matches!(self, RebaseResolution::Preserved)
    }
}

/// Total map from a class's methods to their identities after rebasement
///
/// The map is computed once, up front, from the set of signatures the instrumentation
/// intercepts. Asking about any signature is always answered: methods outside the rebased
/// set, including every abstract method, resolve to [`RebaseResolution::Preserved`].
pub struct MethodRebaseResolver {
    resolutions: HashMap<String, RebaseResolution>,
    placeholder: Option<BinaryName>,
}

impl MethodRebaseResolver {
    /// Resolver that rebases nothing
    pub fn disabled() -> MethodRebaseResolver {
        MethodRebaseResolver {
            resolutions: HashMap::new(),
            placeholder: None,
        }
    }

    /// Plan the rebasement of every intercepted method of a class
    ///
    /// `placeholder_name` names the auxiliary type appended to rebased constructor
    /// descriptors. It is only reserved if some constructor actually gets rebased.
    pub fn make(
        original: &ClassData,
        rebaseables: &HashSet<String>,
        transformer: &dyn MethodNameTransformer,
        placeholder_name: BinaryName,
    ) -> MethodRebaseResolver {
        let mut resolutions = HashMap::new();
        let mut placeholder = None;

        for method in original.methods.iter() {
            let signature = method.signature();
            if !rebaseables.contains(&signature) {
                continue;
            }
            if method.is_abstract() {
                // There is no body to displace
                resolutions.insert(signature, RebaseResolution::Preserved);
                continue;
            }

            let resolution = if method.is_constructor() {
                placeholder = Some(placeholder_name.clone());
                let descriptor = method
                    .descriptor
                    .with_appended_parameter(FieldType::object(placeholder_name.clone()));
                let rebased =
                    MethodToken::new(UnqualifiedName::INIT, descriptor, rebased_flags(method.access_flags))
                        .with_exceptions(method.exceptions.clone());
                RebaseResolution::Constructor {
                    rebased,
                    placeholder: placeholder_name.clone(),
                }
            } else {
                let rebased = MethodToken::new(
                    transformer.transform(&method.name),
                    method.descriptor.clone(),
                    rebased_flags(method.access_flags),
                )
                .with_exceptions(method.exceptions.clone());
                RebaseResolution::Method { rebased }
            };
            resolutions.insert(signature, resolution);
        }

        MethodRebaseResolver {
            resolutions,
            placeholder,
        }
    }

    /// Resolve an original method by its signature key
    pub fn resolve(&self, signature: &str) -> RebaseResolution {
        self.resolutions
            .get(signature)
            .cloned()
            .unwrap_or(RebaseResolution::Preserved)
    }

    /// Placeholder type rebased constructors depend on, if any constructor was rebased
    pub fn placeholder(&self) -> Option<&BinaryName> {
        self.placeholder.as_ref()
    }

    /// All signatures that resolve to a rebased identity
    pub fn rebased_methods(&self) -> impl Iterator<Item = (&String, &RebaseResolution)> {
        self.resolutions
            .iter()
            .filter(|(_, resolution)| resolution.is_rebased())
    }
}

/// Flags of a displaced method
///
/// The displaced copy is an implementation detail of the generated class: private so nothing
/// new dispatches to it, synthetic so tooling knows it was machine made. Staticness is part
/// of the calling convention and must survive. A native body cannot be overridden into
/// oblivion, so it is pinned final.
fn rebased_flags(original: MethodAccessFlags) -> MethodAccessFlags {
    let mut flags = MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC;
    if original.contains(MethodAccessFlags::STATIC) {
        flags |= MethodAccessFlags::STATIC;
    }
    if original.contains(MethodAccessFlags::NATIVE) {
        flags |= MethodAccessFlags::NATIVE | MethodAccessFlags::FINAL;
    }
    flags
}
