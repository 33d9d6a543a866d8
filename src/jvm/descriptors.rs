use super::{BinaryName, Name};
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string, requiring all input to be consumed
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let parsed = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(parsed),
            Some(c) => Err(malformed(format!("trailing input starting at '{}'", c))),
        }
    }

    /// Read the descriptor off the front of a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

fn malformed(message: String) -> Error {
    Error::new(ErrorKind::InvalidInput, message)
}

fn truncated(expected: &str) -> Error {
    Error::new(ErrorKind::UnexpectedEof, format!("ran out of input, expected {}", expected))
}

fn expect(source: &mut Peekable<Chars>, wanted: char, context: &str) -> Result<()> {
    match source.next() {
        Some(c) if c == wanted => Ok(()),
        Some(c) => Err(malformed(format!("expected '{}' {}, found '{}'", wanted, context, c))),
        None => Err(truncated(context)),
    }
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Single character the class file format uses for this type
    pub fn descriptor_char(&self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    pub fn of_descriptor_char(c: char) -> Option<BaseType> {
        let base = match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        };
        Some(base)
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(self.descriptor_char());
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.next() {
            Some(c) => BaseType::of_descriptor_char(c)
                .ok_or_else(|| malformed(format!("'{}' is not a primitive type", c))),
            None => Err(truncated("a primitive type")),
        }
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<C> {
    Object(C),
    ObjectArray(ArrayType<C>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Dimensions beyond the first (`A[]` has 0, `A[][][]` has 2)
    pub additional_dimensions: usize,

    /// Type of the innermost elements (`A` for `A[][]`)
    pub element_type: T,
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        expect(source, 'L', "to open an object type")?;
        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => {
                    return BinaryName::from_string(class_name).map_err(malformed);
                }
                Some(c) => class_name.push(c),
                None => {
                    return Err(truncated("';' closing an object type"));
                }
            }
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(write_to),
            RefType::ObjectArray(array) => array.render_to(write_to),
            RefType::PrimitiveArray(array) => array.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.peek().copied() != Some('[') {
            return Ok(RefType::Object(C::parse_from(source)?));
        }

        let mut additional_dimensions = 0;
        source.next();
        while source.peek().copied() == Some('[') {
            additional_dimensions += 1;
            source.next();
        }
        let array = if source.peek().copied() == Some('L') {
            RefType::ObjectArray(ArrayType {
                additional_dimensions,
                element_type: C::parse_from(source)?,
            })
        } else {
            RefType::PrimitiveArray(ArrayType {
                additional_dimensions,
                element_type: BaseType::parse_from(source)?,
            })
        };
        Ok(array)
    }
}

/// Type of a field, parameter, or return value
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<C> {
    Base(BaseType),
    Ref(RefType<C>),
}

impl<C> FieldType<C> {
    /// Array whose elements are of the given type
    pub fn array(element: FieldType<C>) -> FieldType<C> {
        let array = match element {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(mut array)) => {
                array.additional_dimensions += 1;
                RefType::PrimitiveArray(array)
            }
            FieldType::Ref(RefType::ObjectArray(mut array)) => {
                array.additional_dimensions += 1;
                RefType::ObjectArray(array)
            }
        };
        FieldType::Ref(array)
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn char() -> FieldType<C> {
        FieldType::Base(BaseType::Char)
    }

    pub const fn short() -> FieldType<C> {
        FieldType::Base(BaseType::Short)
    }

    pub const fn byte() -> FieldType<C> {
        FieldType::Base(BaseType::Byte)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base) => base.render_to(write_to),
            FieldType::Ref(reference) => reference.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L') | Some('[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) if BaseType::of_descriptor_char(c).is_some() => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some(c) => Err(malformed(format!("'{}' does not begin a field type", c))),
            None => Err(truncated("a field type")),
        }
    }
}

/// Signature of a method
///
/// A return type of `None` stands for `void`.
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<C> {
    pub parameters: Vec<FieldType<C>>,
    pub return_type: Option<FieldType<C>>,
}

impl<C: Clone> MethodDescriptor<C> {
    /// Copy of the descriptor with one extra parameter at the end
    ///
    /// Constructors cannot be renamed, so a rebased constructor is disambiguated by its shape
    /// instead: this is how the extra marker parameter gets onto its descriptor.
    pub fn with_appended_parameter(&self, parameter: FieldType<C>) -> MethodDescriptor<C> {
        let mut parameters = self.parameters.clone();
        parameters.push(parameter);
        MethodDescriptor {
            parameters,
            return_type: self.return_type.clone(),
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(return_type) => return_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        expect(source, '(', "to open a parameter list")?;
        let mut parameters = vec![];
        while source.peek().copied() != Some(')') {
            parameters.push(FieldType::<C>::parse_from(source)?);
        }
        expect(source, ')', "to close a parameter list")?;

        let return_type = if source.peek().copied() == Some('V') {
            source.next();
            None
        } else {
            Some(FieldType::<C>::parse_from(source)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}
