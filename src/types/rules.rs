//! Typing rules that depend only on already-resolved operand types.

use super::{FunctionType, Primitive, Type};
use crate::{error::BadError, source_location::Position, Result};

pub fn arithmetic(left: &Type, right: &Type, position: Position) -> Result<Type> {
    require_scalars("Arithmetic", left, right, position)?;
    Ok(left.clone())
}

pub fn comparison(left: &Type, right: &Type, position: Position) -> Result<Type> {
    require_scalars("Comparison", left, right, position)?;
    Ok(Type::bool())
}

fn require_scalars(what: &str, left: &Type, right: &Type, position: Position) -> Result<()> {
    if left.is_scalar() && right.is_scalar() {
        Ok(())
    } else {
        Err(BadError::type_error(
            position,
            format!(
                "{} requires primitive or pointer operands, found {} and {}",
                what, left, right
            ),
        ))
    }
}

pub fn logical(left: &Type, right: &Type, position: Position) -> Result<Type> {
    if *left != Type::bool() || *right != Type::bool() {
        return Err(BadError::type_error(
            position,
            format!(
                "Logical operators require bool operands, found {} and {}",
                left, right
            ),
        ));
    }
    Ok(Type::bool())
}

pub fn not(operand: &Type, position: Position) -> Result<Type> {
    if *operand != Type::bool() {
        return Err(BadError::type_error(
            position,
            format!("Operand of ! must be bool, found {}", operand),
        ));
    }
    Ok(Type::bool())
}

pub fn condition(construct: &str, ty: &Type, position: Position) -> Result<()> {
    if *ty != Type::bool() {
        return Err(BadError::type_error(
            position,
            format!("Condition of {} must be bool, found {}", construct, ty),
        ));
    }
    Ok(())
}

pub fn dereference(pointer: &Type, position: Position) -> Result<Type> {
    match pointer {
        Type::Pointer(inner) => Ok((**inner).clone()),
        other => Err(BadError::type_error(
            position,
            format!("Cannot dereference non-pointer type {}", other),
        )),
    }
}

pub fn assign_through_pointer(pointer: &Type, value: &Type, position: Position) -> Result<Type> {
    let target = match pointer {
        Type::Pointer(inner) => inner,
        other => {
            return Err(BadError::type_error(
                position,
                format!("assignptr target must be a pointer, found {}", other),
            ))
        }
    };
    if **target != *value {
        return Err(BadError::type_error(
            position,
            format!("Cannot store {} through {}", value, pointer),
        ));
    }
    Ok(value.clone())
}

/// Checks a call against the callee's signature and yields its return type.
pub fn call(callee: &Type, args: &[Type], position: Position) -> Result<Type> {
    let signature = match callee {
        Type::Function(signature) => signature,
        other => {
            return Err(BadError::type_error(
                position,
                format!("Cannot call value of non-function type {}", other),
            ))
        }
    };

    let arity_ok = if signature.variadic {
        args.len() >= signature.params.len()
    } else {
        args.len() == signature.params.len()
    };
    if !arity_ok {
        return Err(BadError::type_error(
            position,
            format!(
                "Function expects {}{} arguments but got {}",
                if signature.variadic { "at least " } else { "" },
                signature.params.len(),
                args.len()
            ),
        ));
    }

    for (i, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
        if !arg.assignable_to(param) {
            return Err(BadError::type_error(
                position,
                format!(
                    "Argument {} has type {} but parameter expects {}",
                    i + 1,
                    arg,
                    param
                ),
            ));
        }
    }

    Ok((*signature.return_type).clone())
}

/// `(index a i)` yields the address of an element, typed as the pointer
/// it was computed from. Arrays decay to a pointer to their element.
pub fn index(array: &Type, index: &Type, position: Position) -> Result<Type> {
    let pointer = match array {
        Type::Pointer(_) => array.clone(),
        Type::Array { element, .. } => Type::Pointer(element.clone()),
        other => {
            return Err(BadError::type_error(
                position,
                format!("Cannot index into non-pointer type {}", other),
            ))
        }
    };

    let valid_index = matches!(
        index,
        Type::Primitive(
            Primitive::Int64
                | Primitive::Int32
                | Primitive::Int16
                | Primitive::UInt64
                | Primitive::UInt32
                | Primitive::UInt16
                | Primitive::IntLiteral
        )
    );
    if !valid_index {
        return Err(BadError::type_error(
            position,
            format!("Index must be an integer, found {}", index),
        ));
    }
    Ok(pointer)
}

pub fn array_literal(items: &[Type], position: Position) -> Result<Type> {
    let first = match items.first() {
        Some(first) => first,
        None => return Err(BadError::type_error(position, "Array literal cannot be empty")),
    };
    if let Some(odd) = items.iter().find(|ty| *ty != first) {
        return Err(BadError::type_error(
            position,
            format!(
                "Array literal items must share one type, found {} and {}",
                first, odd
            ),
        ));
    }
    Ok(Type::array_of(first.clone(), items.len()))
}

pub fn cast(from: &Type, to: &Type, position: Position) -> Result<Type> {
    if !from.can_cast_explicitly_to(to) {
        return Err(BadError::type_error(
            position,
            format!("Cannot cast {} to {}", from, to),
        ));
    }
    Ok(to.clone())
}

/// `() -> int` or `(int, (* (* char))) -> int`.
pub fn is_entry_signature(signature: &FunctionType) -> bool {
    if *signature.return_type != Type::int() {
        return false;
    }
    match signature.params.as_slice() {
        [] => true,
        [count, args] => {
            *count == Type::int() && *args == Type::pointer_to(Type::pointer_to(Type::char()))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::default()
    }

    #[test]
    fn test_arithmetic_takes_left_type() {
        let ptr = Type::pointer_to(Type::char());
        assert_eq!(arithmetic(&ptr, &Type::int(), pos()).unwrap(), ptr);
        assert_eq!(
            arithmetic(&Type::int_literal(), &Type::int(), pos()).unwrap(),
            Type::int_literal()
        );
        assert!(arithmetic(&Type::array_of(Type::int(), 2), &Type::int(), pos()).is_err());
    }

    #[test]
    fn test_variadic_call_accepts_extra_arguments() {
        let printf = Type::Function(FunctionType::variadic(
            Type::int(),
            vec![Type::pointer_to(Type::char())],
        ));
        let fmt = Type::pointer_to(Type::char());
        assert!(call(&printf, &[fmt.clone(), Type::int(), Type::bool()], pos()).is_ok());
        assert!(call(&printf, &[], pos()).is_err());
        assert!(call(&printf, &[Type::int()], pos()).is_err());
    }

    #[test]
    fn test_call_checks_arity_and_argument_types() {
        let f = Type::Function(FunctionType::new(Type::bool(), vec![Type::int()]));
        assert_eq!(call(&f, &[Type::int_literal()], pos()).unwrap(), Type::bool());
        assert!(call(&f, &[Type::char()], pos()).is_err());
        assert!(call(&f, &[Type::int(), Type::int()], pos()).is_err());
        assert!(call(&Type::int(), &[], pos()).is_err());
    }

    #[test]
    fn test_index_keeps_pointer_type() {
        let ptr = Type::pointer_to(Type::int());
        assert_eq!(index(&ptr, &Type::int_literal(), pos()).unwrap(), ptr);
        assert_eq!(
            index(&Type::array_of(Type::int(), 3), &Type::int(), pos()).unwrap(),
            ptr
        );
        assert!(index(&ptr, &Type::char(), pos()).is_err());
        assert!(index(&Type::int(), &Type::int(), pos()).is_err());
    }

    #[test]
    fn test_entry_signatures() {
        let argv = Type::pointer_to(Type::pointer_to(Type::char()));
        assert!(is_entry_signature(&FunctionType::new(Type::int(), vec![])));
        assert!(is_entry_signature(&FunctionType::new(
            Type::int(),
            vec![Type::int(), argv]
        )));
        assert!(!is_entry_signature(&FunctionType::new(
            Type::int(),
            vec![Type::int()]
        )));
        assert!(!is_entry_signature(&FunctionType::new(Type::void(), vec![])));
    }

    #[test]
    fn test_array_literal_requires_uniform_items() {
        assert_eq!(
            array_literal(&[Type::char(), Type::char()], pos()).unwrap(),
            Type::array_of(Type::char(), 2)
        );
        assert!(array_literal(&[Type::char(), Type::int()], pos()).is_err());
        assert!(array_literal(&[], pos()).is_err());
    }
}
