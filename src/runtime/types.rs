use crate::runtime::{
    class::ClassId,
    function::{FunctionId, TemplateId},
    method::Method,
    value::Value,
};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Index into the type arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const ANY: TypeId = TypeId(0);
    pub const DYNAMIC: TypeId = TypeId(1);
    pub const NOTHING: TypeId = TypeId(2);
    pub const BOOL: TypeId = TypeId(3);
    pub const INT: TypeId = TypeId(4);
    pub const FLOAT: TypeId = TypeId(5);
    pub const STRING: TypeId = TypeId(6);
    pub const TYPE: TypeId = TypeId(7);
    pub const CLASS_BUILDER: TypeId = TypeId(8);
    pub const CLASS_FACTORY: TypeId = TypeId(9);
    pub const INTERFACE_FACTORY: TypeId = TypeId(10);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub enum TypeKind {
    Any,
    Dynamic,
    Nothing,
    Bool,
    Int,
    Float,
    String,
    Type,
    ClassBuilder,
    ClassFactory,
    InterfaceFactory,
    Function(FunctionId),
    CompileTimeFunction(FunctionId),
    Template(TemplateId),
    Class(ClassId),
    Interface(ClassId),
    /// Type of the type value of a class or interface.
    Static(ClassId),
    FunctionalInterface {
        parameters: Vec<(String, TypeId)>,
        ret: TypeId,
    },
    /// An interface together with the method table converting `from` into it.
    ConcreteInterface {
        interface: TypeId,
        from: TypeId,
        methods: HashMap<String, Rc<Method>>,
    },
    /// Opaque host type named by the host bridge. Calls go through the bridge.
    Host,
}

/// The folded compile-time call that produced a type. Call patterns match on it.
#[derive(Clone, Debug)]
pub struct TypeOrigin {
    pub target: Value,
    pub method: String,
    pub arguments: Vec<Value>,
}

#[derive(Clone, Debug)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub meta: Option<TypeId>,
    pub origin: Option<TypeOrigin>,
}

type FunctionalShape = (Vec<(String, TypeId)>, TypeId);

#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeDef>,
    functional: HashMap<FunctionalShape, TypeId>,
    conversions: HashMap<(TypeId, TypeId), TypeId>,
    hosts: HashMap<String, TypeId>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            functional: HashMap::new(),
            conversions: HashMap::new(),
            hosts: HashMap::new(),
        };
        let builtins = [
            ("Any", TypeKind::Any),
            ("Dynamic", TypeKind::Dynamic),
            ("Nothing", TypeKind::Nothing),
            ("Bool", TypeKind::Bool),
            ("Int", TypeKind::Int),
            ("Float", TypeKind::Float),
            ("String", TypeKind::String),
            ("Type", TypeKind::Type),
            ("ClassBuilder", TypeKind::ClassBuilder),
            ("Class", TypeKind::ClassFactory),
            ("Interface", TypeKind::InterfaceFactory),
        ];
        for (name, kind) in builtins {
            registry.add(name, kind);
        }
        registry
    }

    pub fn add(&mut self, name: impl Into<String>, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDef {
            name: name.into(),
            kind,
            meta: None,
            origin: None,
        });
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()].kind
    }

    pub fn set_meta(&mut self, id: TypeId, meta: TypeId) {
        self.types[id.index()].meta = Some(meta);
    }

    /// Type of the value `Value::Type(id)`.
    pub fn meta(&self, id: TypeId) -> TypeId {
        self.types[id.index()].meta.unwrap_or(TypeId::TYPE)
    }

    pub fn is_metatype(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Type | TypeKind::Static(_))
    }

    pub fn is_primitive(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Bool | TypeKind::Int | TypeKind::Float | TypeKind::String
        )
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Interface(_) | TypeKind::FunctionalInterface { .. }
        )
    }

    /// Types whose methods are only known at run time.
    pub fn is_dynamic(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Dynamic | TypeKind::Host)
    }

    /// Later origins replace earlier ones, so the outermost folded call wins.
    pub fn record_origin(&mut self, id: TypeId, origin: TypeOrigin) {
        self.types[id.index()].origin = Some(origin);
    }

    pub fn origin(&self, id: TypeId) -> Option<&TypeOrigin> {
        self.types[id.index()].origin.as_ref()
    }

    /// Functional interfaces are interned by their shape.
    pub fn functional_interface(&mut self, parameters: Vec<(String, TypeId)>, ret: TypeId) -> TypeId {
        let key = (parameters, ret);
        if let Some(id) = self.functional.get(&key) {
            return *id;
        }
        let name = FunctionalName {
            registry: self,
            parameters: &key.0,
            ret,
        }
        .to_string();
        let id = self.add(
            name,
            TypeKind::FunctionalInterface {
                parameters: key.0.clone(),
                ret,
            },
        );
        self.functional.insert(key, id);
        id
    }

    pub fn host_type(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.hosts.get(name) {
            return *id;
        }
        let id = self.add(name, TypeKind::Host);
        self.hosts.insert(name.to_string(), id);
        id
    }

    pub fn find_host(&self, name: &str) -> Option<TypeId> {
        self.hosts.get(name).copied()
    }

    pub fn cached_conversion(&self, interface: TypeId, from: TypeId) -> Option<TypeId> {
        self.conversions.get(&(interface, from)).copied()
    }

    pub fn add_concrete_interface(
        &mut self,
        interface: TypeId,
        from: TypeId,
        methods: HashMap<String, Rc<Method>>,
    ) -> TypeId {
        let name = format!("{} as {}", self.name(from), self.name(interface));
        let id = self.add(
            name,
            TypeKind::ConcreteInterface {
                interface,
                from,
                methods,
            },
        );
        self.conversions.insert((interface, from), id);
        id
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.index()].name
    }
}

struct FunctionalName<'a> {
    registry: &'a TypeRegistry,
    parameters: &'a [(String, TypeId)],
    ret: TypeId,
}

impl fmt::Display for FunctionalName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, (name, ty)) in self.parameters.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {}", self.registry.name(*ty))?;
        }
        write!(f, "): {}", self.registry.name(self.ret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_have_fixed_ids() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.name(TypeId::INT), "Int");
        assert_eq!(registry.name(TypeId::CLASS_BUILDER), "ClassBuilder");
        assert_eq!(registry.meta(TypeId::STRING), TypeId::TYPE);
    }

    #[test]
    fn functional_interfaces_are_interned() {
        let mut registry = TypeRegistry::new();
        let a = registry.functional_interface(vec![("x".into(), TypeId::INT)], TypeId::BOOL);
        let b = registry.functional_interface(vec![("x".into(), TypeId::INT)], TypeId::BOOL);
        let c = registry.functional_interface(Vec::new(), TypeId::BOOL);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.name(a), "(x: Int): Bool");
        assert!(registry.is_interface(a));
    }

    #[test]
    fn host_types_are_interned_by_name() {
        let mut registry = TypeRegistry::new();
        let greeter = registry.host_type("Greeter");

        assert_eq!(registry.host_type("Greeter"), greeter);
        assert_ne!(registry.host_type("Clock"), greeter);
        assert!(registry.is_dynamic(greeter));
        assert!(registry.is_dynamic(TypeId::DYNAMIC));
        assert!(!registry.is_dynamic(TypeId::INT));
    }
}
