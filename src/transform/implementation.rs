use super::{BuildError, ImplementationTarget, InstrumentedType, MethodToken};
use crate::jvm::{
    BaseType, BinaryName, ConstantValue, FieldType, MethodDescriptor, UnqualifiedName,
};

/// One operation in a generated method body
///
/// Bodies are sequences of operations over an operand stack. The vocabulary is deliberately
/// small: it covers delegation, constant returns, and the call shapes instrumentation needs,
/// and a class writer lowers each operation to bytecode.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Push the receiver
    LoadThis,

    /// Push a declared parameter, 0 being the first
    LoadArgument(usize),

    /// Push a loadable constant
    Push(ConstantValue),

    /// Push the null reference
    PushNull,

    /// Call the original version of a method, bypassing virtual dispatch
    ///
    /// `trailing_null` marks calls into a rebased constructor, which expects one extra
    /// placeholder argument that callers always pass as null.
    CallOriginal {
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        trailing_null: bool,
    },

    /// Call a method through ordinary dispatch
    Invoke {
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    },

    /// Return to the caller, carrying the top of the stack if the method returns a value
    Return,
}

/// Body of a generated method
#[derive(Clone, Debug, PartialEq)]
pub enum MethodBody {
    /// No body at all: the declaration must carry the `ABSTRACT` flag
    Abstract,

    /// A concrete body
    Steps(Vec<Step>),
}

/// Producer of method bodies
///
/// An implementation is bound to matched methods through the builder. It participates in two
/// phases: `prepare` may refine the model of the type under construction (for example by
/// declaring a helper field), and `appender` produces the body for one matched method once
/// the model is frozen. `prepare` runs exactly once per registration, in registration order,
/// before any appender runs.
pub trait Implementation {
    /// Refine the model of the type under construction
    fn prepare<'g>(
        &self,
        instrumented: InstrumentedType<'g>,
    ) -> Result<InstrumentedType<'g>, BuildError> {
        Ok(instrumented)
    }

    /// Produce the body of one matched method
    fn appender<'g>(
        &self,
        target: &ImplementationTarget<'g>,
        method: &MethodToken,
    ) -> Result<MethodBody, BuildError>;
}

/// Implement matched methods by returning one constant
pub struct FixedValue(pub ConstantValue);

impl Implementation for FixedValue {
    fn appender<'g>(
        &self,
        _target: &ImplementationTarget<'g>,
        method: &MethodToken,
    ) -> Result<MethodBody, BuildError> {
        let fits = match &method.descriptor.return_type {
            Some(return_type) => self.0.fits(return_type),
            None => false,
        };
        if !fits {
            return Err(BuildError::IncompatibleConstant {
                member: method.signature(),
            });
        }
        Ok(MethodBody::Steps(vec![
            Step::Push(self.0.clone()),
            Step::Return,
        ]))
    }
}

/// Implement matched methods with the default value of their return type
pub struct StubMethod;

impl Implementation for StubMethod {
    fn appender<'g>(
        &self,
        _target: &ImplementationTarget<'g>,
        method: &MethodToken,
    ) -> Result<MethodBody, BuildError> {
        let steps = match &method.descriptor.return_type {
            None => vec![Step::Return],
            Some(FieldType::Ref(_)) => vec![Step::PushNull, Step::Return],
            Some(FieldType::Base(base)) => {
                let zero = match base {
                    BaseType::Long => ConstantValue::Long(0),
                    BaseType::Float => ConstantValue::Float(0.0),
                    BaseType::Double => ConstantValue::Double(0.0),
                    _ => ConstantValue::Integer(0),
                };
                vec![Step::Push(zero), Step::Return]
            }
        };
        Ok(MethodBody::Steps(steps))
    }
}

/// Implement matched methods by calling through to their original version
///
/// What "original" means depends on the strategy behind the target: the inherited method for
/// a subclass, the rebased private copy for a rebasement, the super-type method for a
/// redefinition. Methods with no reachable original fail here, at body-production time.
pub struct SuperMethodCall;

impl Implementation for SuperMethodCall {
    fn appender<'g>(
        &self,
        target: &ImplementationTarget<'g>,
        method: &MethodToken,
    ) -> Result<MethodBody, BuildError> {
        let mut steps = vec![];
        if !method.is_static() {
            steps.push(Step::LoadThis);
        }
        for index in 0..method.descriptor.parameters.len() {
            steps.push(Step::LoadArgument(index));
        }
        steps.push(target.invoke_original(method).into_step()?);
        steps.push(Step::Return);
        Ok(MethodBody::Steps(steps))
    }
}
