use crate::pool::UnresolvedTypeError;
use std::fmt;

/// Errors produced while assembling a dynamic type
///
/// Everything that can go wrong between configuring a builder and emitting class file bytes
/// funnels into this one enum. Members carry rendered names and signatures rather than
/// references into the pool, so errors outlive the build that produced them.
#[derive(Debug)]
pub enum BuildError {
    /// A name failed JVM well-formedness validation
    MalformedName(String),

    /// Two members with the same key were defined on one type
    DuplicateMember { owner: String, signature: String },

    /// A declared method ended up with neither a body nor the `ABSTRACT` flag
    MissingImplementation { method: String },

    /// An implementation asked to call the original version of a method that has none
    IllegalOriginalCall(String),

    /// A constant's type does not fit the member it is meant to populate
    IncompatibleConstant { member: String },

    /// The requested operation is not available under the chosen strategy
    UnsupportedTransformation(String),

    /// A type name could not be resolved to a description or a class file
    UnresolvedType(String),

    /// A located class file does not start with a readable header
    InvalidClassFile(String),

    /// The class writer rejected the assembled type
    Writer(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MalformedName(message) => {
                write!(f, "malformed name: {}", message)
            }
            BuildError::DuplicateMember { owner, signature } => {
                write!(f, "duplicate member {} on {}", signature, owner)
            }
            BuildError::MissingImplementation { method } => {
                write!(f, "no implementation bound for {}", method)
            }
            BuildError::IllegalOriginalCall(requested) => {
                write!(f, "no original version of {} is reachable", requested)
            }
            BuildError::IncompatibleConstant { member } => {
                write!(f, "constant does not fit the type of {}", member)
            }
            BuildError::UnsupportedTransformation(message) => {
                write!(f, "unsupported transformation: {}", message)
            }
            BuildError::UnresolvedType(name) => {
                write!(f, "unresolved type {}", name)
            }
            BuildError::InvalidClassFile(message) => {
                write!(f, "invalid class file: {}", message)
            }
            BuildError::Writer(message) => {
                write!(f, "class writer error: {}", message)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl From<UnresolvedTypeError> for BuildError {
    fn from(err: UnresolvedTypeError) -> BuildError {
        use crate::jvm::Name;
        BuildError::UnresolvedType(String::from(err.name.as_str()))
    }
}
