//! Assembly of new and reworked class files
//!
//! The entry point is [`TypeBuilder`], which is configured with one of four strategies:
//!
//!   - subclassing generates a fresh type under a new name
//!   - rebasing reworks an existing type but keeps displaced method bodies callable
//!   - redefinition reworks an existing type and drops replaced bodies
//!   - decoration leaves the member structure alone and only touches the outer shell
//!
//! Method bodies are contributed by [`Implementation`] values, which the builder pairs with
//! methods through [`MethodMatcher`] chains. Calls back into an original method resolve
//! through an [`ImplementationTarget`], whose answer depends on the strategy in play. The
//! assembled output is handed to a [`ClassWriter`] as one [`WriteRequest`].

mod builder;
mod errors;
mod implementation;
mod initializer;
mod instrumented_type;
mod matcher;
mod rebase;
mod registry;
mod target;
mod writer;

pub use builder::{ConstructorStrategy, NamingStrategy, RedefinitionResolution, TypeBuilder};
pub use errors::BuildError;
pub use implementation::{
    FixedValue, Implementation, MethodBody, Step, StubMethod, SuperMethodCall,
};
pub use initializer::{LoadedTypeInitializer, TypeInitializer};
pub use instrumented_type::{FieldToken, InstrumentedType, MethodToken};
pub use matcher::{InliningFilter, MatchAny, MatchFn, MatchNone, MethodMatcher, Named, SyntheticMethods};
pub use rebase::{
    session_token, MethodNameTransformer, MethodRebaseResolver, Prefixing, RebaseResolution,
    Suffixing,
};
pub use registry::MethodRegistry;
pub use target::{ImplementationTarget, SpecialMethodInvocation};
pub use writer::{
    AttributeAppender, AuxiliaryRecord, ClassWriter, DynamicType, FieldRecord, MethodRecord,
    WriteRequest,
};
