use crate::language::{
    ast::*,
    errors::SyntaxError,
    parser::Parser,
    span::Location,
    token::{Token, TokenKind},
};
use std::collections::HashMap;

/// A keyword that rewrites the tokens following it into a plain expression.
pub trait MacroHandler {
    fn expand(
        &self,
        keyword: &Token,
        parser: &mut Parser<'_>,
        location: Option<Location>,
    ) -> Result<Option<Expr>, SyntaxError>;
}

#[derive(Default)]
pub struct MacroRegistry {
    macros: HashMap<String, Box<dyn MacroHandler>>,
}

impl MacroRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("class", DefinitionMacro::Class);
        registry.register("interface", DefinitionMacro::Interface);
        registry.register("object", ObjectMacro);
        registry.register("def", DefMacro);
        registry.register("static", StaticMacro);
        registry
    }

    pub fn register(&mut self, keyword: impl Into<String>, handler: impl MacroHandler + 'static) {
        self.macros.insert(keyword.into(), Box::new(handler));
    }

    pub fn get(&self, keyword: &str) -> Option<&dyn MacroHandler> {
        self.macros.get(keyword).map(|handler| handler.as_ref())
    }
}

#[derive(Clone, Copy)]
enum DefinitionMacro {
    Class,
    Interface,
}

impl DefinitionMacro {
    fn factory(self) -> &'static str {
        match self {
            DefinitionMacro::Class => "Class",
            DefinitionMacro::Interface => "Interface",
        }
    }
}

impl MacroHandler for DefinitionMacro {
    fn expand(
        &self,
        _keyword: &Token,
        parser: &mut Parser<'_>,
        location: Option<Location>,
    ) -> Result<Option<Expr>, SyntaxError> {
        let (name, name_location) = if matches!(parser.current().kind, TokenKind::Name(_)) {
            parser.expect_name("Expected a name")?
        } else {
            ("anonymous".to_string(), location.clone())
        };

        let (builder, builder_location) = parser.parse_function()?;
        let definition_location = parser.location_from(&location);
        let builder = builder_function(builder, builder_location);

        let value = Expr::call(
            Expr::name(self.factory(), location.clone()),
            "new",
            vec![Expr::string(name.clone(), name_location.clone()), builder],
            definition_location,
        );

        let body = match parser.parse_block_rest()? {
            Some(body) => body,
            None => Expr::name(name.clone(), name_location),
        };

        Ok(Some(Expr::new(
            ExprKind::Let {
                name,
                value: Box::new(value),
                body: Box::new(body),
                recursive: true,
            },
            parser.location_from(&location),
        )))
    }
}

struct ObjectMacro;

impl MacroHandler for ObjectMacro {
    fn expand(
        &self,
        _keyword: &Token,
        parser: &mut Parser<'_>,
        location: Option<Location>,
    ) -> Result<Option<Expr>, SyntaxError> {
        let (builder, builder_location) = parser.parse_function()?;
        let definition_location = parser.location_from(&location);

        let class = Expr::call(
            Expr::name("Class", location.clone()),
            "new",
            vec![
                Expr::string("object", location),
                builder_function(builder, builder_location),
            ],
            definition_location.clone(),
        );
        Ok(Some(Expr::call(class, "new", Vec::new(), definition_location)))
    }
}

struct DefMacro;

impl MacroHandler for DefMacro {
    fn expand(
        &self,
        _keyword: &Token,
        parser: &mut Parser<'_>,
        location: Option<Location>,
    ) -> Result<Option<Expr>, SyntaxError> {
        let (name, name_location) = parser.expect_name("Expected a name after `def`")?;

        let definition = if parser.check(&TokenKind::Colon) {
            // def nextAge: Int { age + 1 }
            // def nextAge: Int
            parser.advance();
            let return_type = parser.parse_next(true)?;
            if parser.check(&TokenKind::LBrace) {
                let (function, function_location) = parser.parse_function()?;
                method_function(function, Some(return_type), function_location)
            } else {
                return_type
            }
        } else {
            let value = parser.parse_next(false)?;
            match value.kind {
                ExprKind::Function(function) => method_function(function, None, value.location),
                _ => value,
            }
        };

        let definition_location = parser.location_from(&location);
        Ok(Some(Expr::call(
            Expr::name("self", location),
            "define",
            vec![Expr::string(name, name_location), definition],
            definition_location,
        )))
    }
}

struct StaticMacro;

impl MacroHandler for StaticMacro {
    fn expand(
        &self,
        _keyword: &Token,
        parser: &mut Parser<'_>,
        location: Option<Location>,
    ) -> Result<Option<Expr>, SyntaxError> {
        let (function, function_location) = parser.parse_function()?;
        let definition_location = parser.location_from(&location);
        Ok(Some(Expr::call(
            Expr::name("self", location),
            "static",
            vec![builder_function(function, function_location)],
            definition_location,
        )))
    }
}

/// Wraps a class body as `@(self: ClassBuilder) body`.
fn builder_function(function: FunctionExpr, location: Option<Location>) -> Expr {
    let mut parameters = vec![Parameter {
        name: "self".into(),
        pattern: Some(Pattern::SpecificValue(Expr::name(
            "ClassBuilder",
            location.clone(),
        ))),
        location: location.clone(),
    }];
    parameters.extend(function.parameters);

    let is_empty = matches!(&function.body.kind, ExprKind::Block(statements) if statements.is_empty());
    let body = if is_empty {
        Box::new(Expr::new(ExprKind::Int(0), function.body.location.clone()))
    } else {
        function.body
    };

    Expr::new(
        ExprKind::Function(FunctionExpr {
            parameters,
            return_type: function.return_type,
            body,
            compile_time: true,
        }),
        location,
    )
}

fn method_function(
    function: FunctionExpr,
    return_type: Option<Expr>,
    location: Option<Location>,
) -> Expr {
    let self_type = Expr::call(
        Expr::name("self", location.clone()),
        "selfType",
        Vec::new(),
        location.clone(),
    );
    let mut parameters = vec![Parameter {
        name: "self".into(),
        pattern: Some(Pattern::SpecificValue(self_type)),
        location: location.clone(),
    }];
    parameters.extend(function.parameters);

    Expr::new(
        ExprKind::Function(FunctionExpr {
            parameters,
            return_type: return_type.map(Box::new).or(function.return_type),
            body: function.body,
            compile_time: false,
        }),
        location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_source;

    fn expand(source: &str) -> String {
        parse_source("macros.ph", source, &MacroRegistry::with_defaults())
            .unwrap_or_else(|err| panic!("failed to parse {source:?}: {err}"))
            .to_string()
    }

    #[test]
    fn empty_class_body_gets_a_placeholder_statement() {
        assert_eq!(
            expand("class Empty {}"),
            "(recursive-let Empty (new Class \"Empty\" (@lambda [(param self ClassBuilder)] 0)) Empty)"
        );
    }

    #[test]
    fn def_with_return_type_and_body() {
        assert_eq!(
            expand("def nextAge: Int { age + 1 }"),
            "(define self \"nextAge\" (lambda [(param self (selfType self))] Int (+ age 1)))"
        );
    }

    #[test]
    fn static_block_is_a_compile_time_builder() {
        assert_eq!(
            expand("static { def create(): Int }"),
            "(static self (@lambda [(param self ClassBuilder)] (define self \"create\" (function-type [] Int))))"
        );
    }

    #[test]
    fn object_builds_and_instantiates_a_class() {
        assert_eq!(
            expand("object { def answer(): Int 42 }"),
            "(new (new Class \"object\" (@lambda [(param self ClassBuilder)] (define self \"answer\" (lambda [(param self (selfType self))] Int 42)))))"
        );
    }

    #[test]
    fn unregistered_keywords_are_plain_names() {
        let parsed = parse_source("macros.ph", "class", &MacroRegistry::empty())
            .expect("plain names parse");
        assert_eq!(parsed.to_string(), "class");
    }
}
