//! Vocabulary of the JVM class file world
//!
//! Validated names, structured descriptors, access flag sets, class file versions, and loadable
//! constants. Everything downstream (the description pool, the transformation pipeline, the
//! instrumentation agent) speaks in these types; none of them knows how to encode a class file,
//! since that job belongs to the writer collaborator.

mod access_flags;
mod constants;
mod descriptors;
mod names;
mod version;

pub use access_flags::*;
pub use constants::*;
pub use descriptors::*;
pub use names::*;
pub use version::*;
