use crate::language::span::Location;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Option<Location>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Call {
        target: Box<Expr>,
        name: String,
        arguments: Arguments,
        may_be_var_call: bool,
    },
    Block(Vec<Expr>),
    Function(FunctionExpr),
    NameReference(String),
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
        recursive: bool,
    },
    FunctionType {
        parameters: Vec<(String, Expr)>,
        return_type: Box<Expr>,
    },
    TypeAssert {
        value: Box<Expr>,
        expected: Box<Expr>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Expr>,
    pub named: Vec<(String, Expr)>,
}

impl Arguments {
    pub fn positional(positional: Vec<Expr>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionExpr {
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Box<Expr>>,
    pub body: Box<Expr>,
    pub compile_time: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub pattern: Option<Pattern>,
    pub location: Option<Location>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    SpecificValue(Expr),
    Binding {
        name: String,
        location: Option<Location>,
    },
    Call {
        target: Box<Expr>,
        name: String,
        arguments: Vec<Pattern>,
        may_be_var_call: bool,
        location: Option<Location>,
    },
    FunctionType {
        parameters: Vec<(String, Pattern)>,
        return_type: Box<Pattern>,
        location: Option<Location>,
    },
}

impl Pattern {
    pub fn has_bindings(&self) -> bool {
        match self {
            Pattern::SpecificValue(_) => false,
            Pattern::Binding { .. } => true,
            Pattern::Call { arguments, .. } => arguments.iter().any(Pattern::has_bindings),
            Pattern::FunctionType {
                parameters,
                return_type,
                ..
            } => {
                parameters.iter().any(|(_, pattern)| pattern.has_bindings())
                    || return_type.has_bindings()
            }
        }
    }

    /// Turns a binding-free pattern back into the expression it stands for.
    pub fn into_expr(self) -> Option<Expr> {
        match self {
            Pattern::SpecificValue(expr) => Some(expr),
            Pattern::Binding { .. } => None,
            Pattern::Call {
                target,
                name,
                arguments,
                may_be_var_call,
                location,
            } => {
                let arguments = arguments
                    .into_iter()
                    .map(Pattern::into_expr)
                    .collect::<Option<Vec<_>>>()?;
                Some(Expr::new(
                    ExprKind::Call {
                        target,
                        name,
                        arguments: Arguments::positional(arguments),
                        may_be_var_call,
                    },
                    location,
                ))
            }
            Pattern::FunctionType {
                parameters,
                return_type,
                location,
            } => {
                let parameters = parameters
                    .into_iter()
                    .map(|(name, pattern)| pattern.into_expr().map(|expr| (name, expr)))
                    .collect::<Option<Vec<_>>>()?;
                let return_type = return_type.into_expr()?;
                Some(Expr::new(
                    ExprKind::FunctionType {
                        parameters,
                        return_type: Box::new(return_type),
                    },
                    location,
                ))
            }
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, location: Option<Location>) -> Self {
        Self { kind, location }
    }

    pub fn name(name: impl Into<String>, location: Option<Location>) -> Self {
        Self::new(ExprKind::NameReference(name.into()), location)
    }

    pub fn string(value: impl Into<String>, location: Option<Location>) -> Self {
        Self::new(ExprKind::String(value.into()), location)
    }

    pub fn call(
        target: Expr,
        name: impl Into<String>,
        arguments: Vec<Expr>,
        location: Option<Location>,
    ) -> Self {
        Self::new(
            ExprKind::Call {
                target: Box::new(target),
                name: name.into(),
                arguments: Arguments::positional(arguments),
                may_be_var_call: false,
            },
            location,
        )
    }
}

/// S-expression rendering used by `photon parse` and the parser tests.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Bool(value) => write!(f, "{value}"),
            ExprKind::Int(value) => write!(f, "{value}"),
            ExprKind::Float(value) => write!(f, "{value:?}"),
            ExprKind::String(value) => write!(f, "{value:?}"),
            ExprKind::Call {
                target,
                name,
                arguments,
                ..
            } => {
                write!(f, "({name} {target}")?;
                for argument in &arguments.positional {
                    write!(f, " {argument}")?;
                }
                for (name, argument) in &arguments.named {
                    write!(f, " (param {name} {argument})")?;
                }
                write!(f, ")")
            }
            ExprKind::Block(expressions) => {
                write!(f, "{{")?;
                for (index, expression) in expressions.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{expression}")?;
                }
                write!(f, "}}")
            }
            ExprKind::Function(function) => {
                let head = if function.compile_time { "@lambda" } else { "lambda" };
                write!(f, "({head} [")?;
                for (index, parameter) in function.parameters.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    match &parameter.pattern {
                        Some(pattern) => write!(f, "(param {} {pattern})", parameter.name)?,
                        None => write!(f, "(param {})", parameter.name)?,
                    }
                }
                write!(f, "]")?;
                if let Some(return_type) = &function.return_type {
                    write!(f, " {return_type}")?;
                }
                write!(f, " {})", function.body)
            }
            ExprKind::NameReference(name) => write!(f, "{name}"),
            ExprKind::Let {
                name,
                value,
                body,
                recursive,
            } => {
                let head = if *recursive { "recursive-let" } else { "let" };
                write!(f, "({head} {name} {value} {body})")
            }
            ExprKind::FunctionType {
                parameters,
                return_type,
            } => {
                write!(f, "(function-type [")?;
                for (index, (name, ty)) in parameters.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "(param {name} {ty})")?;
                }
                write!(f, "] {return_type})")
            }
            ExprKind::TypeAssert { value, expected } => {
                write!(f, "(type-assert {value} {expected})")
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::SpecificValue(expr) => write!(f, "{expr}"),
            Pattern::Binding { name, .. } => write!(f, "(val {name})"),
            Pattern::Call {
                target,
                name,
                arguments,
                ..
            } => {
                write!(f, "<{name} {target}")?;
                for argument in arguments {
                    write!(f, " {argument}")?;
                }
                write!(f, ">")
            }
            Pattern::FunctionType {
                parameters,
                return_type,
                ..
            } => {
                write!(f, "(function-type [")?;
                for (index, (name, pattern)) in parameters.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "(param {name} {pattern})")?;
                }
                write!(f, "] {return_type})")
            }
        }
    }
}
