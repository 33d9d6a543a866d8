use super::{BaseType, BinaryName, FieldType, RefType};
use std::borrow::Cow;
use std::fmt;
use std::fmt::Debug;

/// Loadable constant values
///
/// These show up as pushed operands in generated method bodies, as field constant defaults, and
/// as values assigned by load-time initializers.
#[derive(PartialEq, Clone)]
pub enum ConstantValue {
    String(Cow<'static, str>),
    Class(BinaryName),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Eq for ConstantValue {}

impl Debug for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::String(string) => string.fmt(f),
            ConstantValue::Class(class) => class.fmt(f),
            ConstantValue::Integer(integer) => integer.fmt(f),
            ConstantValue::Long(long) => long.fmt(f),
            ConstantValue::Float(float) => float.fmt(f),
            ConstantValue::Double(double) => double.fmt(f),
        }
    }
}

impl ConstantValue {
    pub fn string(value: impl Into<Cow<'static, str>>) -> ConstantValue {
        ConstantValue::String(value.into())
    }

    /// Can a slot of the given type hold this constant?
    ///
    /// `Integer` constants cover all of the int-like primitive slots, matching how the constant
    /// pool stores them.
    pub fn fits(&self, field_type: &FieldType<BinaryName>) -> bool {
        match (self, field_type) {
            (
                ConstantValue::Integer(_),
                FieldType::Base(
                    BaseType::Int
                    | BaseType::Short
                    | BaseType::Byte
                    | BaseType::Char
                    | BaseType::Boolean,
                ),
            ) => true,
            (ConstantValue::Long(_), FieldType::Base(BaseType::Long)) => true,
            (ConstantValue::Float(_), FieldType::Base(BaseType::Float)) => true,
            (ConstantValue::Double(_), FieldType::Base(BaseType::Double)) => true,
            (ConstantValue::String(_), FieldType::Ref(RefType::Object(name))) => {
                name == &BinaryName::STRING || name == &BinaryName::OBJECT
            }
            (ConstantValue::Class(_), FieldType::Ref(RefType::Object(name))) => {
                name == &BinaryName::CLASS || name == &BinaryName::OBJECT
            }
            _ => false,
        }
    }
}
