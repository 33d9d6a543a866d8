//! Generate and redefine JVM classes at runtime
//!
//! ### Building a type
//!
//! Types under construction live in a [`pool::TypePool`], a shared arena-backed graph of
//! everything known about classes, methods, and fields. A [`transform::TypeBuilder`] is
//! configured against that pool and spent on a class writer:
//!
//! ```
//! use classweave::jvm::*;
//! use classweave::pool::{PoolArenas, TypePool};
//! use classweave::transform::*;
//!
//! # fn generate_class() -> Result<(), Box<dyn std::error::Error>> {
//! // Set up the type pool, add in Java standard library types
//! let arenas = PoolArenas::new();
//! let pool = TypePool::new(&arenas);
//! let java = pool.insert_java_base_types();
//!
//! // Subclass `java/lang/Object`, adding one method that returns a fixed string
//! let greet = MethodToken::new(
//!     UnqualifiedName::from_string(String::from("greet"))?,
//!     MethodDescriptor {
//!         parameters: vec![],
//!         return_type: Some(FieldType::object(BinaryName::STRING)),
//!     },
//!     MethodAccessFlags::PUBLIC,
//! );
//! let builder = TypeBuilder::subclass(&pool, java.object, ConstructorStrategy::ImitateSuperClass)?
//!     .define_method(greet, Box::new(FixedValue(ConstantValue::string("hello"))))?;
//!
//! # use std::collections::HashMap;
//! # struct NullWriter;
//! # impl ClassWriter for NullWriter {
//! #     fn write(&self, request: WriteRequest) -> Result<HashMap<BinaryName, Vec<u8>>, BuildError> {
//! #         let mut outputs = HashMap::new();
//! #         outputs.insert(request.name.clone(), vec![]);
//! #         Ok(outputs)
//! #     }
//! # }
//! // `make` assembles the type and hands it to a class writer
//! let dynamic = builder.make(&NullWriter)?;
//! assert!(dynamic.name.as_str().starts_with("java/lang/Object$Generated$"));
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```
//!
//! ### Instrumenting live classes
//!
//! The [`agent`] module drives the same builders against classes a host process has
//! already loaded: an [`agent::Agent`] hooks class loading, retrofits matching loaded
//! classes in batches, retries failures, and can detach again, restoring the original
//! class files on the way out.

pub mod agent;
pub mod jvm;
pub mod pool;
pub mod transform;
pub mod util;
