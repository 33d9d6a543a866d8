use super::{BuildError, FieldToken, LoadedTypeInitializer, MethodBody, MethodToken};
use crate::jvm::{BinaryName, ClassAccessFlags, ConstantValue, Version};
use std::collections::HashMap;

/// One method of an assembled type
#[derive(Clone, Debug, PartialEq)]
pub enum MethodRecord {
    /// Keep the method exactly as the original class file has it
    Preserve { token: MethodToken },

    /// Emit a fresh body under this declaration
    Implement { token: MethodToken, body: MethodBody },

    /// Copy the original body of `original` under the displaced identity `rebased`
    RebasedOriginal {
        original: MethodToken,
        rebased: MethodToken,
    },
}

impl MethodRecord {
    /// The declaration this record emits, whichever way its body is sourced
    pub fn token(&self) -> &MethodToken {
        match self {
            MethodRecord::Preserve { token } => token,
            MethodRecord::Implement { token, .. } => token,
            MethodRecord::RebasedOriginal { rebased, .. } => rebased,
        }
    }
}

/// One field of an assembled type
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRecord {
    pub token: FieldToken,

    /// Value for a `ConstantValue` attribute
    pub constant: Option<ConstantValue>,
}

/// Auxiliary type emitted alongside the primary one
///
/// Auxiliaries carry no members: they exist so generated descriptors have something to name.
#[derive(Clone, Debug, PartialEq)]
pub struct AuxiliaryRecord {
    pub name: BinaryName,
    pub access_flags: ClassAccessFlags,
    pub super_class: BinaryName,
}

/// Raw attribute appended to the emitted class file
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeAppender {
    pub name: String,
    pub data: Vec<u8>,
}

/// Everything a class writer needs to emit one build
///
/// Requests own their data outright. A request can therefore outlive the pool, the builder,
/// and the borrowed graph they were assembled from, which is what lets writers run on other
/// threads or behind queues.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    pub name: BinaryName,
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub super_class: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    pub type_initializer: Option<MethodBody>,
    pub auxiliaries: Vec<AuxiliaryRecord>,

    /// Class file of the type being rebased or redefined, when one exists
    ///
    /// `Preserve` and `RebasedOriginal` records pull their bodies out of this blob.
    pub original_blob: Option<Vec<u8>>,

    pub attributes: Vec<AttributeAppender>,
}

/// Lowers assembled requests into class file bytes
///
/// The returned map holds every emitted class keyed by name: the primary type plus one entry
/// per auxiliary.
pub trait ClassWriter {
    fn write(&self, request: WriteRequest) -> Result<HashMap<BinaryName, Vec<u8>>, BuildError>;
}

/// Finished product of a build
pub struct DynamicType {
    pub name: BinaryName,
    pub bytes: Vec<u8>,
    pub auxiliary: HashMap<BinaryName, Vec<u8>>,

    /// Work the loader of this type still owes it
    pub loaded_initializer: LoadedTypeInitializer,
}
