use crate::language::span::Location;
use crate::runtime::{
    function::{FunctionId, TemplateId},
    method::Method,
    scope::{FunctionLayout, Slot},
    signature::Conversion,
    types::TypeId,
    value::Value,
};
use std::fmt;
use std::rc::Rc;

/// Executable tree produced by lowering. Partial evaluation consumes a node
/// and returns its replacement with every static type filled in.
#[derive(Clone, Debug)]
pub enum Node {
    Literal {
        value: Value,
        ty: TypeId,
        location: Option<Location>,
    },
    Call(Box<CallNode>),
    Let {
        name: String,
        slot: Slot,
        value: Box<Node>,
        body: Box<Node>,
        ty: Option<TypeId>,
    },
    Reference {
        name: String,
        slot: Slot,
        ty: Option<TypeId>,
        location: Option<Location>,
    },
    Block {
        statements: Vec<Node>,
        ty: Option<TypeId>,
    },
    FunctionDefinition(Box<FunctionDefinition>),
    TemplateFunctionDefinition(Box<TemplateDefinition>),
    FunctionTypeDefinition {
        parameters: Vec<(String, Node)>,
        return_type: Box<Node>,
        location: Option<Location>,
    },
    TypeAssert {
        value: Box<Node>,
        expected: Box<Node>,
        location: Option<Location>,
    },
    Convert {
        value: Box<Node>,
        conversion: Conversion,
        ty: TypeId,
    },
}

#[derive(Clone, Debug)]
pub struct CallNode {
    pub target: Node,
    pub name: String,
    pub arguments: Vec<Node>,
    pub dispatch: Option<Dispatch>,
    pub ty: Option<TypeId>,
    pub location: Option<Location>,
}

/// How a call is carried out once its types are known.
#[derive(Clone, Debug)]
pub enum Dispatch {
    Static(Rc<Method>),
    /// The target is dynamic; the method is looked up on the run-time value.
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct FunctionDefinition {
    pub name: Option<String>,
    /// Taken when the function is registered with the module.
    pub parts: Option<FunctionParts>,
    pub layout: Rc<FunctionLayout>,
    pub compile_time: bool,
    pub function: Option<FunctionId>,
    pub ty: Option<TypeId>,
    pub location: Option<Location>,
}

#[derive(Clone, Debug)]
pub struct FunctionParts {
    pub parameters: Vec<(String, Node)>,
    pub return_type: Option<Node>,
    pub body: Node,
}

#[derive(Clone, Debug)]
pub struct TemplateDefinition {
    pub name: Option<String>,
    pub parts: Option<TemplateParts>,
    pub layout: Rc<FunctionLayout>,
    pub template: Option<TemplateId>,
    pub ty: Option<TypeId>,
    pub location: Option<Location>,
}

#[derive(Clone, Debug)]
pub struct TemplateParts {
    pub parameters: Vec<(String, PatternNode)>,
    pub return_type: Option<Node>,
    pub body: Node,
}

/// Parameter patterns of a template, matched against argument types.
#[derive(Clone, Debug)]
pub enum PatternNode {
    SpecificValue(Node),
    Binding {
        name: String,
        slot: Slot,
    },
    Call {
        target: Node,
        name: String,
        arguments: Vec<PatternNode>,
        location: Option<Location>,
    },
    FunctionType {
        parameters: Vec<(String, PatternNode)>,
        return_type: Box<PatternNode>,
        location: Option<Location>,
    },
}

impl Node {
    pub fn literal(value: Value, ty: TypeId, location: Option<Location>) -> Self {
        Node::Literal {
            value,
            ty,
            location,
        }
    }

    /// Static type of a partially evaluated node.
    pub fn ty(&self) -> TypeId {
        let ty = match self {
            Node::Literal { ty, .. } | Node::Convert { ty, .. } => Some(*ty),
            Node::Call(call) => call.ty,
            Node::Let { ty, .. } | Node::Reference { ty, .. } | Node::Block { ty, .. } => *ty,
            Node::FunctionDefinition(definition) => definition.ty,
            Node::TemplateFunctionDefinition(definition) => definition.ty,
            Node::FunctionTypeDefinition { .. } | Node::TypeAssert { .. } => None,
        };
        match ty {
            Some(ty) => ty,
            None => panic!("node has no static type before partial evaluation: {self}"),
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Node::Literal { location, .. }
            | Node::Reference { location, .. }
            | Node::FunctionTypeDefinition { location, .. }
            | Node::TypeAssert { location, .. } => location.as_ref(),
            Node::Call(call) => call.location.as_ref(),
            Node::FunctionDefinition(definition) => definition.location.as_ref(),
            Node::TemplateFunctionDefinition(definition) => definition.location.as_ref(),
            Node::Let { value, .. } => value.location(),
            Node::Block { statements, .. } => statements.first().and_then(Node::location),
            Node::Convert { value, .. } => value.location(),
        }
    }

    /// Constant value of a literal node.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Node::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal { value, .. } => write!(f, "{value}"),
            Node::Call(call) => {
                write!(f, "({} {}", call.name, call.target)?;
                for argument in &call.arguments {
                    write!(f, " {argument}")?;
                }
                write!(f, ")")
            }
            Node::Let {
                name, value, body, ..
            } => write!(f, "(let {name} {value} {body})"),
            Node::Reference { name, slot, .. } => write!(f, "{name}@{slot}"),
            Node::Block { statements, .. } => {
                write!(f, "{{")?;
                for (index, statement) in statements.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{statement}")?;
                }
                write!(f, "}}")
            }
            Node::FunctionDefinition(definition) => {
                let head = if definition.compile_time { "@lambda" } else { "lambda" };
                match definition.function {
                    Some(id) => write!(f, "({head} #{})", id.0),
                    None => write!(f, "({head} {})", definition.name.as_deref().unwrap_or("_")),
                }
            }
            Node::TemplateFunctionDefinition(definition) => match definition.template {
                Some(id) => write!(f, "(template #{})", id.0),
                None => write!(f, "(template {})", definition.name.as_deref().unwrap_or("_")),
            },
            Node::FunctionTypeDefinition {
                parameters,
                return_type,
                ..
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
            Node::TypeAssert {
                value, expected, ..
            } => write!(f, "(type-assert {value} {expected})"),
            Node::Convert {
                value, conversion, ..
            } => write!(f, "(convert {conversion:?} {value})"),
        }
    }
}
