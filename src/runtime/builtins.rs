use crate::runtime::{
    error::{EvalError, EvalResult},
    method::{Method, MethodCall, MethodKind},
    signature::Signature,
    types::TypeId,
    value::Value,
};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    IntArithmetic(Arithmetic),
    FloatArithmetic(Arithmetic),
    IntCompare(Comparison),
    FloatCompare(Comparison),
    /// `==` and `!=` on booleans and strings.
    Equality(bool),
    Negate,
    ToFloat,
    ToInt,
    And,
    Or,
    Not,
    Concat,
    Length,
    ToString,
}

fn arithmetic(name: &str) -> Option<Arithmetic> {
    match name {
        "+" => Some(Arithmetic::Add),
        "-" => Some(Arithmetic::Subtract),
        "*" => Some(Arithmetic::Multiply),
        "/" => Some(Arithmetic::Divide),
        _ => None,
    }
}

fn comparison(name: &str) -> Option<Comparison> {
    match name {
        "==" => Some(Comparison::Equal),
        "!=" => Some(Comparison::NotEqual),
        "<" => Some(Comparison::Less),
        ">" => Some(Comparison::Greater),
        "<=" => Some(Comparison::LessOrEqual),
        ">=" => Some(Comparison::GreaterOrEqual),
        _ => None,
    }
}

fn builtin(intrinsic: Intrinsic, parameters: Vec<(&str, TypeId)>, ret: TypeId) -> Method {
    Method {
        kind: MethodKind::Default,
        signature: Signature::concrete(parameters, ret),
        call: MethodCall::Intrinsic(intrinsic),
    }
}

/// Builtin method of a primitive type. `arguments` picks between the unary
/// and binary `-` and between Int and Float arithmetic.
pub fn lookup(target: TypeId, name: &str, arguments: Option<&[TypeId]>) -> Option<Method> {
    let unary = matches!(arguments, Some([]));
    let float_argument = matches!(arguments, Some([TypeId::FLOAT]));

    if name == "toString" {
        return Some(builtin(Intrinsic::ToString, Vec::new(), TypeId::STRING));
    }

    match target {
        TypeId::INT => {
            if name == "-" && unary {
                return Some(builtin(Intrinsic::Negate, Vec::new(), TypeId::INT));
            }
            if let Some(op) = arithmetic(name) {
                return Some(if float_argument {
                    builtin(Intrinsic::FloatArithmetic(op), vec![("other", TypeId::FLOAT)], TypeId::FLOAT)
                } else {
                    builtin(Intrinsic::IntArithmetic(op), vec![("other", TypeId::INT)], TypeId::INT)
                });
            }
            if let Some(op) = comparison(name) {
                return Some(if float_argument {
                    builtin(Intrinsic::FloatCompare(op), vec![("other", TypeId::FLOAT)], TypeId::BOOL)
                } else {
                    builtin(Intrinsic::IntCompare(op), vec![("other", TypeId::INT)], TypeId::BOOL)
                });
            }
            match name {
                "toFloat" => Some(builtin(Intrinsic::ToFloat, Vec::new(), TypeId::FLOAT)),
                _ => None,
            }
        }
        TypeId::FLOAT => {
            if name == "-" && unary {
                return Some(builtin(Intrinsic::Negate, Vec::new(), TypeId::FLOAT));
            }
            if let Some(op) = arithmetic(name) {
                return Some(builtin(
                    Intrinsic::FloatArithmetic(op),
                    vec![("other", TypeId::FLOAT)],
                    TypeId::FLOAT,
                ));
            }
            if let Some(op) = comparison(name) {
                return Some(builtin(
                    Intrinsic::FloatCompare(op),
                    vec![("other", TypeId::FLOAT)],
                    TypeId::BOOL,
                ));
            }
            match name {
                "toInt" => Some(builtin(Intrinsic::ToInt, Vec::new(), TypeId::INT)),
                _ => None,
            }
        }
        TypeId::BOOL => match name {
            "and" => Some(builtin(Intrinsic::And, vec![("other", TypeId::BOOL)], TypeId::BOOL)),
            "or" => Some(builtin(Intrinsic::Or, vec![("other", TypeId::BOOL)], TypeId::BOOL)),
            "!" => Some(builtin(Intrinsic::Not, Vec::new(), TypeId::BOOL)),
            "==" | "!=" => Some(builtin(
                Intrinsic::Equality(name == "=="),
                vec![("other", TypeId::BOOL)],
                TypeId::BOOL,
            )),
            _ => None,
        },
        TypeId::STRING => match name {
            "+" => Some(builtin(Intrinsic::Concat, vec![("other", TypeId::STRING)], TypeId::STRING)),
            "length" => Some(builtin(Intrinsic::Length, Vec::new(), TypeId::INT)),
            "==" | "!=" => Some(builtin(
                Intrinsic::Equality(name == "=="),
                vec![("other", TypeId::STRING)],
                TypeId::BOOL,
            )),
            _ => None,
        },
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(value) => Some(*value as f64),
        Value::Float(value) => Some(*value),
        _ => None,
    }
}

fn argument(arguments: &[Value], intrinsic: Intrinsic) -> EvalResult<&Value> {
    arguments.first().ok_or_else(|| {
        EvalError::invalid(format!("{intrinsic:?} expects an argument"), None)
    })
}

fn mismatch(intrinsic: Intrinsic, target: &Value) -> EvalError {
    EvalError::invalid(
        format!("{intrinsic:?} cannot be applied to a {}", target.kind_name()),
        None,
    )
}

fn compare(op: Comparison, ordering: Option<Ordering>) -> bool {
    match (op, ordering) {
        (Comparison::Equal, ordering) => ordering == Some(Ordering::Equal),
        (Comparison::NotEqual, ordering) => ordering != Some(Ordering::Equal),
        (_, None) => false,
        (Comparison::Less, Some(ordering)) => ordering == Ordering::Less,
        (Comparison::Greater, Some(ordering)) => ordering == Ordering::Greater,
        (Comparison::LessOrEqual, Some(ordering)) => ordering != Ordering::Greater,
        (Comparison::GreaterOrEqual, Some(ordering)) => ordering != Ordering::Less,
    }
}

fn int_arithmetic(op: Arithmetic, left: i64, right: i64) -> EvalResult<i64> {
    let result = match op {
        Arithmetic::Add => left.checked_add(right),
        Arithmetic::Subtract => left.checked_sub(right),
        Arithmetic::Multiply => left.checked_mul(right),
        Arithmetic::Divide => {
            if right == 0 {
                return Err(EvalError::Arithmetic {
                    message: "Division by zero".into(),
                    location: None,
                });
            }
            left.checked_div(right)
        }
    };
    result.ok_or_else(|| EvalError::Arithmetic {
        message: format!("Integer overflow in {left} {} {right}", symbol(op)),
        location: None,
    })
}

fn symbol(op: Arithmetic) -> &'static str {
    match op {
        Arithmetic::Add => "+",
        Arithmetic::Subtract => "-",
        Arithmetic::Multiply => "*",
        Arithmetic::Divide => "/",
    }
}

pub fn apply(intrinsic: Intrinsic, target: &Value, arguments: &[Value]) -> EvalResult<Value> {
    match intrinsic {
        Intrinsic::IntArithmetic(op) => {
            let (Value::Int(left), Value::Int(right)) = (target, argument(arguments, intrinsic)?) else {
                return apply(Intrinsic::FloatArithmetic(op), target, arguments);
            };
            int_arithmetic(op, *left, *right).map(Value::Int)
        }
        Intrinsic::FloatArithmetic(op) => {
            let left = number(target).ok_or_else(|| mismatch(intrinsic, target))?;
            let right = number(argument(arguments, intrinsic)?).ok_or_else(|| mismatch(intrinsic, target))?;
            Ok(Value::Float(match op {
                Arithmetic::Add => left + right,
                Arithmetic::Subtract => left - right,
                Arithmetic::Multiply => left * right,
                Arithmetic::Divide => left / right,
            }))
        }
        Intrinsic::IntCompare(op) => match (target, argument(arguments, intrinsic)?) {
            (Value::Int(left), Value::Int(right)) => Ok(Value::Bool(compare(op, left.partial_cmp(right)))),
            _ => apply(Intrinsic::FloatCompare(op), target, arguments),
        },
        Intrinsic::FloatCompare(op) => {
            let left = number(target).ok_or_else(|| mismatch(intrinsic, target))?;
            let right = number(argument(arguments, intrinsic)?).ok_or_else(|| mismatch(intrinsic, target))?;
            Ok(Value::Bool(compare(op, left.partial_cmp(&right))))
        }
        Intrinsic::Equality(equal) => {
            let other = argument(arguments, intrinsic)?;
            Ok(Value::Bool((target == other) == equal))
        }
        Intrinsic::Negate => match target {
            Value::Int(value) => value.checked_neg().map(Value::Int).ok_or_else(|| EvalError::Arithmetic {
                message: format!("Integer overflow in -{value}"),
                location: None,
            }),
            Value::Float(value) => Ok(Value::Float(-value)),
            other => Err(mismatch(intrinsic, other)),
        },
        Intrinsic::ToFloat => number(target)
            .map(Value::Float)
            .ok_or_else(|| mismatch(intrinsic, target)),
        Intrinsic::ToInt => match target {
            Value::Float(value) if value.is_finite() => Ok(Value::Int(value.trunc() as i64)),
            Value::Int(value) => Ok(Value::Int(*value)),
            other => Err(EvalError::Arithmetic {
                message: format!("Cannot convert {other} to Int"),
                location: None,
            }),
        },
        Intrinsic::And | Intrinsic::Or => match (target, argument(arguments, intrinsic)?) {
            (Value::Bool(left), Value::Bool(right)) => Ok(Value::Bool(if intrinsic == Intrinsic::And {
                *left && *right
            } else {
                *left || *right
            })),
            _ => Err(mismatch(intrinsic, target)),
        },
        Intrinsic::Not => match target {
            Value::Bool(value) => Ok(Value::Bool(!value)),
            other => Err(mismatch(intrinsic, other)),
        },
        Intrinsic::Concat => match (target, argument(arguments, intrinsic)?) {
            (Value::String(left), Value::String(right)) => Ok(Value::string(format!("{left}{right}"))),
            _ => Err(mismatch(intrinsic, target)),
        },
        Intrinsic::Length => match target {
            Value::String(value) => Ok(Value::Int(value.chars().count() as i64)),
            other => Err(mismatch(intrinsic, other)),
        },
        Intrinsic::ToString => Ok(Value::string(target.to_string())),
    }
}
