pub mod checker;
mod rules;

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Primitive {
    Int64,
    Int32,
    Int16,
    UInt64,
    UInt32,
    UInt16,
    /// signed 8 bit
    Char,
    /// unsigned 8 bit
    UChar,
    Bool,
    Void,
    /// Provisional type of an integer literal. It converts implicitly to any
    /// concrete primitive and is never the declared type of a variable.
    IntLiteral,
}

impl Primitive {
    pub fn size_of(self) -> usize {
        match self {
            Primitive::Int64 | Primitive::UInt64 | Primitive::IntLiteral => 8,
            Primitive::Int32 | Primitive::UInt32 => 4,
            Primitive::Int16 | Primitive::UInt16 => 2,
            Primitive::Char | Primitive::UChar | Primitive::Bool => 1,
            Primitive::Void => 0,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::Int64
                | Primitive::Int32
                | Primitive::Int16
                | Primitive::Char
                | Primitive::IntLiteral
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::Int64
                | Primitive::Int32
                | Primitive::Int16
                | Primitive::UInt64
                | Primitive::UInt32
                | Primitive::UInt16
                | Primitive::IntLiteral
        )
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Int64 => "int",
            Primitive::Int32 => "int32",
            Primitive::Int16 => "int16",
            Primitive::UInt64 => "uint",
            Primitive::UInt32 => "uint32",
            Primitive::UInt16 => "uint16",
            Primitive::Char => "char",
            Primitive::UChar => "uchar",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
            Primitive::IntLiteral => "intliteral",
        }
    }
}

/// Signature of a function or function pointer.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionType {
    pub return_type: Box<Type>,
    pub params: Vec<Type>,
    pub variadic: bool,
}

impl FunctionType {
    pub fn new(return_type: Type, params: Vec<Type>) -> Self {
        Self {
            return_type: Box::new(return_type),
            params,
            variadic: false,
        }
    }

    pub fn variadic(return_type: Type, params: Vec<Type>) -> Self {
        Self {
            return_type: Box::new(return_type),
            params,
            variadic: true,
        }
    }
}

// Variadic-ness is a property of the declaration, not of the signature.
impl PartialEq for FunctionType {
    fn eq(&self, other: &Self) -> bool {
        self.return_type == other.return_type && self.params == other.params
    }
}

impl Eq for FunctionType {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Type {
    Primitive(Primitive),
    Pointer(Box<Type>),
    Function(FunctionType),
    /// Fixed-length, stack-resident.
    Array { element: Box<Type>, length: usize },
}

impl Type {
    pub fn int() -> Self {
        Type::Primitive(Primitive::Int64)
    }

    pub fn char() -> Self {
        Type::Primitive(Primitive::Char)
    }

    pub fn bool() -> Self {
        Type::Primitive(Primitive::Bool)
    }

    pub fn void() -> Self {
        Type::Primitive(Primitive::Void)
    }

    pub fn int_literal() -> Self {
        Type::Primitive(Primitive::IntLiteral)
    }

    pub fn pointer_to(inner: Type) -> Self {
        Type::Pointer(Box::new(inner))
    }

    pub fn array_of(element: Type, length: usize) -> Self {
        Type::Array {
            element: Box::new(element),
            length,
        }
    }

    pub fn is_primitive(&self, kind: Primitive) -> bool {
        matches!(self, Type::Primitive(p) if *p == kind)
    }

    pub fn is_void_pointer(&self) -> bool {
        matches!(self, Type::Pointer(inner) if inner.is_primitive(Primitive::Void))
    }

    /// Primitives and pointers are the only types arithmetic, comparison
    /// and explicit casts operate on.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Primitive(_) | Type::Pointer(_))
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Type::Primitive(p) => p.is_signed(),
            _ => false,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Primitive(p) if p.is_integer())
    }

    /// In-memory size in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Type::Primitive(p) => p.size_of(),
            Type::Pointer(_) | Type::Function(_) => 8,
            Type::Array { element, length } => align8(element.size_of() * length),
        }
    }

    /// Size of the stack slot holding a value of this type. Always a
    /// multiple of 8; arrays pack their elements and pad only the end.
    pub fn local_size(&self) -> usize {
        match self {
            Type::Primitive(_) | Type::Pointer(_) | Type::Function(_) => 8,
            Type::Array { element, length } => align8(element.size_of() * length),
        }
    }

    /// Implicit conversion check. Asymmetric: `IntLiteral` converts to any
    /// primitive, pointers convert through `(* void)`, arrays decay to a
    /// pointer to their element, functions only to an identical signature.
    pub fn can_cast_to(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Primitive(Primitive::IntLiteral), Type::Primitive(_)) => true,
            (Type::Primitive(_), _) => false,
            (Type::Pointer(from), Type::Pointer(to)) => {
                self.is_void_pointer() || other.is_void_pointer() || from == to
            }
            (Type::Pointer(_), _) => false,
            (Type::Function(from), Type::Function(to)) => from == to,
            (Type::Function(_), _) => false,
            (
                Type::Array { element, length },
                Type::Array {
                    element: other_element,
                    length: other_length,
                },
            ) => element == other_element && length == other_length,
            (Type::Array { element, .. }, Type::Pointer(inner)) => element == inner,
            (Type::Array { .. }, _) => false,
        }
    }

    /// `self` is either `other` or converts to it implicitly.
    pub fn assignable_to(&self, other: &Type) -> bool {
        self == other || self.can_cast_to(other)
    }

    /// Explicit `cast` only works between primitives and pointers.
    pub fn can_cast_explicitly_to(&self, other: &Type) -> bool {
        self.is_scalar() && other.is_scalar()
    }
}

fn align8(size: usize) -> usize {
    (size + 7) & !7
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.keyword()),
            Type::Pointer(inner) => write!(f, "(* {})", inner),
            Type::Function(func) => {
                write!(f, "(func (")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if func.variadic {
                    if !func.params.is_empty() {
                        write!(f, " ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ") {})", func.return_type)
            }
            Type::Array { element, length } => write!(f, "(array {} {})", element, length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONCRETE: [Primitive; 10] = [
        Primitive::Int64,
        Primitive::Int32,
        Primitive::Int16,
        Primitive::UInt64,
        Primitive::UInt32,
        Primitive::UInt16,
        Primitive::Char,
        Primitive::UChar,
        Primitive::Bool,
        Primitive::Void,
    ];

    #[test]
    fn test_int_literal_casts_to_every_primitive() {
        for target in CONCRETE {
            assert!(Type::int_literal().can_cast_to(&Type::Primitive(target)));
        }
    }

    #[test]
    fn test_no_implicit_primitive_conversions() {
        for from in CONCRETE {
            for to in CONCRETE {
                if from != to {
                    assert!(
                        !Type::Primitive(from).can_cast_to(&Type::Primitive(to)),
                        "{:?} -> {:?}",
                        from,
                        to
                    );
                }
            }
        }
        assert!(!Type::int().can_cast_to(&Type::int_literal()));
    }

    #[test]
    fn test_pointer_casts_go_through_void() {
        let int_ptr = Type::pointer_to(Type::int());
        let char_ptr = Type::pointer_to(Type::char());
        let void_ptr = Type::pointer_to(Type::void());

        assert!(int_ptr.can_cast_to(&void_ptr));
        assert!(void_ptr.can_cast_to(&char_ptr));
        assert!(int_ptr.can_cast_to(&int_ptr.clone()));
        assert!(!int_ptr.can_cast_to(&char_ptr));
        assert!(!int_ptr.can_cast_to(&Type::int()));
    }

    #[test]
    fn test_array_decays_to_element_pointer() {
        let chars = Type::array_of(Type::char(), 5);
        assert!(chars.can_cast_to(&Type::pointer_to(Type::char())));
        assert!(!chars.can_cast_to(&Type::pointer_to(Type::int())));
        assert!(!Type::pointer_to(Type::char()).can_cast_to(&chars));
    }

    #[test]
    fn test_function_signatures_must_match() {
        let a = Type::Function(FunctionType::new(Type::int(), vec![Type::int()]));
        let b = Type::Function(FunctionType::new(Type::int(), vec![Type::int()]));
        let c = Type::Function(FunctionType::new(Type::int(), vec![Type::char()]));
        assert!(a.can_cast_to(&b));
        assert!(!a.can_cast_to(&c));
    }

    #[test]
    fn test_primitive_sizes() {
        let expected = [
            (Primitive::Int64, 8),
            (Primitive::UInt64, 8),
            (Primitive::IntLiteral, 8),
            (Primitive::Int32, 4),
            (Primitive::UInt32, 4),
            (Primitive::Int16, 2),
            (Primitive::UInt16, 2),
            (Primitive::Char, 1),
            (Primitive::UChar, 1),
            (Primitive::Bool, 1),
            (Primitive::Void, 0),
        ];
        for (kind, size) in expected {
            let ty = Type::Primitive(kind);
            assert_eq!(ty.size_of(), size, "{:?}", kind);
            assert_eq!(ty.local_size(), 8, "{:?}", kind);
        }
        assert_eq!(Type::pointer_to(Type::char()).local_size(), 8);
    }

    #[test]
    fn test_array_sizes_are_padded_once() {
        let chars = Type::array_of(Type::char(), 5);
        assert_eq!(chars.size_of(), 8);
        assert_eq!(chars.local_size(), 8);

        let ints = Type::array_of(Type::Primitive(Primitive::Int32), 3);
        assert_eq!(ints.size_of(), 16);
        assert_eq!(ints.local_size(), 16);

        let longs = Type::array_of(Type::int(), 4);
        assert_eq!(longs.local_size(), 32);
    }

    #[test]
    fn test_explicit_casts() {
        assert!(Type::int().can_cast_explicitly_to(&Type::char()));
        assert!(Type::int().can_cast_explicitly_to(&Type::pointer_to(Type::char())));
        assert!(!Type::array_of(Type::char(), 2).can_cast_explicitly_to(&Type::int()));
        let func = Type::Function(FunctionType::new(Type::int(), vec![]));
        assert!(!func.can_cast_explicitly_to(&Type::int()));
    }

    #[test]
    fn test_display_matches_source_syntax() {
        assert_eq!(
            Type::pointer_to(Type::pointer_to(Type::char())).to_string(),
            "(* (* char))"
        );
        let func = Type::Function(FunctionType::new(Type::int(), vec![Type::int(), Type::char()]));
        assert_eq!(func.to_string(), "(func (int char) int)");
        let printf = Type::Function(FunctionType::variadic(Type::int(), vec![]));
        assert_eq!(printf.to_string(), "(func (...) int)");
        let fprintf = Type::Function(FunctionType::variadic(
            Type::int(),
            vec![Type::pointer_to(Type::char())],
        ));
        assert_eq!(fprintf.to_string(), "(func ((* char) ...) int)");
    }
}
