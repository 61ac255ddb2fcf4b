//! Verification type system shared by the field descriptors, the verifier and
//! the runtime value model. See jvms 4.10.1.2 for a visualization of the
//! subtyping lattice reproduced by [`Type::is_assignable`].

use thiserror::Error;

/// Raised when a field or method descriptor cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParsingError(pub String);

/// A point of the verification type lattice.
///
/// `UninitializedOffset(None)` is the wildcard form: it compares equal to an
/// offset-bearing `UninitializedOffset` with any bci, which mirrors the
/// `uninitializedOffset(_)` notation from the specification. Equality is
/// therefore not transitive and the type deliberately only implements
/// `PartialEq`.
#[derive(Debug, Clone, Copy)]
pub enum Type {
    Top,
    OneWord,
    TwoWord,

    Int,
    Byte,
    Char,
    Short,
    Boolean,

    Float,
    Long,
    Double,

    Reference,
    Uninitialized,
    UninitializedThis,
    UninitializedOffset(Option<u32>),

    Class,
    Array,
    Null,

    /// Null object outside of the lattice, used to indicate an absent type.
    Void,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;

        match (self, other) {
            (UninitializedOffset(a), UninitializedOffset(b)) => match (a, b) {
                // Wildcard on either side matches any offset
                (None, _) | (_, None) => true,
                (Some(a), Some(b)) => a == b,
            },
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl Type {
    /// Subtyping relation on the verification types; mirrors `isAssignable`
    /// from the specification.
    pub fn is_assignable(from: Type, to: Type) -> bool {
        use Type::*;

        // Can assign to the same type
        if from == to {
            return true;
        }

        // Top can only be assigned to itself; everything assigns to Top
        if from == Top {
            return false;
        }
        if to == Top {
            return true;
        }

        // Recursion is not necessary here, but it keeps the lattice readable.
        match from {
            OneWord | TwoWord => to == Top,
            Int | Float | Reference => Type::is_assignable(OneWord, to),
            Long | Double => Type::is_assignable(TwoWord, to),
            Uninitialized => Type::is_assignable(Reference, to),
            UninitializedThis | UninitializedOffset(_) => Type::is_assignable(Uninitialized, to),
            Class | Array => Type::is_assignable(Reference, to),
            Byte | Char | Short | Boolean => Type::is_assignable(Int, to),
            Null => Type::is_assignable(Class, to) || Type::is_assignable(Array, to),
            Top | Void => false,
        }
    }

    /// Number of operand stack or local variable slots the type occupies.
    pub fn size_of(ty: Type) -> usize {
        if ty == Type::Top {
            1
        } else if Type::is_assignable(ty, Type::OneWord) {
            1
        } else if Type::is_assignable(ty, Type::TwoWord) {
            2
        } else {
            unreachable!("size_of is undefined for {:?}", ty)
        }
    }

    /// Minimal size of the type in bytes when stored in field storage.
    pub fn size_in_bytes(ty: Type) -> usize {
        match ty {
            Type::Byte | Type::Boolean => 1,
            Type::Short | Type::Char => 2,
            _ if Type::is_assignable(ty, Type::Reference) => 8,
            _ => Type::size_of(ty) * 4,
        }
    }

    /// Convert the type to its operand stack form, collapsing the small
    /// integer types into `Int`.
    pub fn to_stack_type(ty: Type) -> Type {
        debug_assert!(ty != Type::Void);

        match ty {
            Type::Byte | Type::Char | Type::Short | Type::Boolean => Type::Int,
            other => other,
        }
    }

    /// Parses a single field descriptor. Returns the pure non-verifier type
    /// (small integer types are kept as themselves) along with the number of
    /// characters consumed.
    pub fn parse_field_descriptor(desc: &str) -> Result<(Type, usize), ParsingError> {
        let first = desc
            .bytes()
            .next()
            .ok_or_else(|| ParsingError("Field descriptor is empty".into()))?;

        Ok(match first {
            b'B' => (Type::Byte, 1),
            b'C' => (Type::Char, 1),
            b'D' => (Type::Double, 1),
            b'F' => (Type::Float, 1),
            b'I' => (Type::Int, 1),
            b'J' => (Type::Long, 1),
            b'S' => (Type::Short, 1),
            b'Z' => (Type::Boolean, 1),
            b'L' => {
                let end = desc
                    .find(';')
                    .ok_or_else(|| ParsingError("Reference type in a wrong format".into()))?;
                (Type::Class, end + 1)
            }
            b'[' => {
                let (_, consumed) = Type::parse_field_descriptor(&desc[1..])
                    .map_err(|_| ParsingError("Array type in a wrong format".into()))?;
                (Type::Array, consumed + 1)
            }
            _ => return Err(ParsingError("Unrecognized field descriptor".into())),
        })
    }

    /// Parses a method descriptor into `(return type, argument types)`.
    /// The return type is [`Type::Void`] for `V`.
    pub fn parse_method_descriptor(desc: &str) -> Result<(Type, Vec<Type>), ParsingError> {
        if desc.is_empty() {
            return Err(ParsingError("Empty descriptor".into()));
        }
        if !desc.starts_with('(') {
            return Err(ParsingError("Expected to find l-brace".into()));
        }

        let rbrace = desc
            .find(')')
            .ok_or_else(|| ParsingError("Expected to find r-brace".into()))?;
        if rbrace == desc.len() - 1 {
            return Err(ParsingError("Expected to find return type descriptor".into()));
        }

        let args_desc = &desc[1..rbrace];
        let ret_desc = &desc[rbrace + 1..];

        let mut args = Vec::new();
        let mut pos = 0;
        while pos < args_desc.len() {
            let (ty, consumed) = Type::parse_field_descriptor(&args_desc[pos..])?;
            args.push(ty);
            pos += consumed;
        }

        let ret = if ret_desc == "V" {
            Type::Void
        } else {
            let (ty, consumed) = Type::parse_field_descriptor(ret_desc)?;
            if consumed != ret_desc.len() {
                return Err(ParsingError("Can't parse tail of the descriptor".into()));
            }
            ty
        };

        Ok((ret, args))
    }
}
