//! Field and method descriptors
//!
//! Descriptors use the class file grammar:
//!
//! ```text
//! FieldType   := B | C | D | F | I | J | S | Z | L<class-name>; | [FieldType
//! MethodDesc  := ( FieldType* ) ( FieldType | V )
//! ```
//!
//! `J` (long) and `D` (double) occupy two local variable slots; every other
//! type occupies one.

use crate::{VmError, VmResult};
use std::fmt;

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<name>;`
    Object(String),
    /// `[<element>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor
    ///
    /// # Errors
    ///
    /// Returns `VmError::InvalidDescriptor` if the input is malformed or has
    /// trailing characters.
    pub fn parse(descriptor: &str) -> VmResult<Self> {
        match parse_prefix(descriptor) {
            Some((ty, "")) => Ok(ty),
            _ => Err(VmError::InvalidDescriptor(descriptor.to_string())),
        }
    }

    /// Number of local variable slots a value of this type occupies
    #[inline]
    pub fn slot_size(&self) -> usize {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Check if this is a reference type (object or array)
    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Double => write!(f, "D"),
            FieldType::Float => write!(f, "F"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Short => write!(f, "S"),
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

/// Parse one field type off the front of `input`, returning the remainder
fn parse_prefix(input: &str) -> Option<(FieldType, &str)> {
    let first = *input.as_bytes().first()?;
    if !first.is_ascii() {
        return None;
    }
    let rest = &input[1..];
    let ty = match first {
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'D' => FieldType::Double,
        b'F' => FieldType::Float,
        b'I' => FieldType::Int,
        b'J' => FieldType::Long,
        b'S' => FieldType::Short,
        b'Z' => FieldType::Boolean,
        b'L' => {
            let end = rest.find(';')?;
            if end == 0 {
                return None;
            }
            return Some((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
        }
        b'[' => {
            let (elem, rest) = parse_prefix(rest)?;
            return Some((FieldType::Array(Box::new(elem)), rest));
        }
        _ => return None,
    };
    Some((ty, rest))
}

/// A parsed method descriptor
///
/// The default value is `()V`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDescriptor {
    params: Vec<FieldType>,
    /// `None` for `V`
    ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(Ljava/lang/Object;JII)Z`
    ///
    /// # Errors
    ///
    /// Returns `VmError::InvalidDescriptor` if the input is malformed.
    pub fn parse(descriptor: &str) -> VmResult<Self> {
        let invalid = || VmError::InvalidDescriptor(descriptor.to_string());

        let mut rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = parse_prefix(rest).ok_or_else(invalid)?;
            params.push(ty);
            rest = tail;
        }
        let rest = &rest[1..];

        let ret = if rest == "V" {
            None
        } else {
            match parse_prefix(rest) {
                Some((ty, "")) => Some(ty),
                _ => return Err(invalid()),
            }
        };

        Ok(Self { params, ret })
    }

    /// Parameter types in declaration order
    pub fn params(&self) -> &[FieldType] {
        &self.params
    }

    /// Return type (`None` for void)
    pub fn return_type(&self) -> Option<&FieldType> {
        self.ret.as_ref()
    }

    /// Number of local slots taken by the declared parameters
    ///
    /// Does not include the receiver of instance methods.
    pub fn param_slot_count(&self) -> usize {
        self.params.iter().map(FieldType::slot_size).sum()
    }
}
