use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    macro_expander::MacroRegistry,
    span::{LineIndex, Location, Span},
    token::{Token, TokenKind},
};
use std::rc::Rc;

pub fn parse_source(
    file: &str,
    source: &str,
    macros: &MacroRegistry,
) -> Result<Expr, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(file, source, errs));
        }
    };

    Parser::new(file, source, tokens, macros)
        .parse_root()
        .map_err(|err| SyntaxErrors::new(file, source, vec![err]))
}

/// Either a plain expression or a parameter pattern containing `val` bindings.
#[derive(Debug)]
enum Parsed {
    Value(Expr),
    Pattern(Pattern),
}

impl Parsed {
    fn location(&self) -> Option<Location> {
        match self {
            Parsed::Value(expr) => expr.location.clone(),
            Parsed::Pattern(pattern) => pattern_location(pattern),
        }
    }
}

pub struct Parser<'a> {
    file: Rc<str>,
    lines: LineIndex,
    tokens: Vec<Token>,
    newlines: Vec<bool>,
    pos: usize,
    last_span: Span,
    macros: &'a MacroRegistry,
}

type Argument = (Option<String>, Parsed);

impl<'a> Parser<'a> {
    fn new(file: &str, source: &str, lexed: Vec<Token>, macros: &'a MacroRegistry) -> Self {
        let mut tokens = Vec::with_capacity(lexed.len());
        let mut newlines = Vec::with_capacity(lexed.len());
        let mut newline = false;
        for token in lexed {
            if token.kind == TokenKind::NewLine {
                newline = true;
                continue;
            }
            newlines.push(newline);
            newline = false;
            tokens.push(token);
        }

        Self {
            file: Rc::from(file),
            lines: LineIndex::new(source),
            tokens,
            newlines,
            pos: 0,
            last_span: Span::default(),
            macros,
        }
    }

    fn parse_root(mut self) -> Result<Expr, SyntaxError> {
        let start = self.current().span;
        let mut values = Vec::new();
        while !self.is_eof() {
            values.push(self.parse_statement()?);
        }

        if values.len() == 1 {
            Ok(values.remove(0))
        } else {
            let location = self.location(start.join(self.last_span));
            Ok(Expr::new(ExprKind::Block(values), location))
        }
    }

    fn parse_statement(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_value(0, false, false)?;
        if !self.is_eof() && !self.at_block_end() && !self.newline_before() {
            return Err(self.error_here("Expected newline or semicolon"));
        }
        Ok(expr)
    }

    /// Parses the statements up to the closing brace or paren of the
    /// enclosing block. Returns `None` when there are none.
    pub fn parse_block_rest(&mut self) -> Result<Option<Expr>, SyntaxError> {
        let start = self.current().span;
        let mut values = Vec::new();
        while !self.is_eof() && !self.at_block_end() {
            values.push(self.parse_statement()?);
        }

        Ok(match values.len() {
            0 => None,
            1 => values.pop(),
            _ => {
                let location = self.location(start.join(self.last_span));
                Some(Expr::new(ExprKind::Block(values), location))
            }
        })
    }

    /// Parses one complete expression as seen by a macro.
    pub fn parse_next(&mut self, require_call_parens: bool) -> Result<Expr, SyntaxError> {
        self.parse_value(0, require_call_parens, false)
    }

    pub fn parse_function(&mut self) -> Result<(FunctionExpr, Option<Location>), SyntaxError> {
        let start = self.current().span;
        let expr = self.parse_next(false)?;
        match expr.kind {
            ExprKind::Function(function) => Ok((function, expr.location)),
            _ => Err(SyntaxError::new("Expected a function body", start)),
        }
    }

    pub fn current(&self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    pub fn expect_name(&mut self, message: &str) -> Result<(String, Option<Location>), SyntaxError> {
        match &self.current().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Ok((name, self.location(span)))
            }
            _ => Err(self.error_here(message)),
        }
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("Expected `{kind}`")))
        }
    }

    pub fn location(&self, span: Span) -> Option<Location> {
        Some(Location::new(self.file.clone(), span, &self.lines))
    }

    /// Location running from `start` to the last consumed token.
    pub fn location_from(&self, start: &Option<Location>) -> Option<Location> {
        let start = start.as_ref().map(|location| location.span)?;
        self.location(start.join(self.last_span))
    }

    pub fn error_here(&self, message: &str) -> SyntaxError {
        let token = self.current();
        SyntaxError::new(
            format!("Unexpected {}. {message}", token.kind.describe()),
            token.span,
        )
    }

    fn parse_value(
        &mut self,
        min_precedence: u8,
        require_call_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Expr, SyntaxError> {
        let parsed = self.parse_expression(min_precedence, require_call_parens, lower_priority_target)?;
        assert_value(parsed)
    }

    fn parse_expression(
        &mut self,
        min_precedence: u8,
        require_call_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Parsed, SyntaxError> {
        let mut left = self.parse_primary(require_call_parens, lower_priority_target)?;

        loop {
            if self.newline_before() {
                return Ok(left);
            }
            let Some(precedence) = self.current_operator_precedence() else {
                return Ok(left);
            };
            if precedence < min_precedence {
                return Ok(left);
            }

            let operator = self.advance();
            let right =
                self.parse_expression(precedence + 1, require_call_parens, lower_priority_target)?;
            let location = join_locations(left.location(), right.location());

            left = match (operator.kind, right) {
                (TokenKind::Colon, right) => Parsed::Value(Expr::new(
                    ExprKind::TypeAssert {
                        value: Box::new(assert_value(left)?),
                        expected: Box::new(assert_value(right)?),
                    },
                    location,
                )),
                (TokenKind::BinaryOperator(name), Parsed::Pattern(pattern)) => {
                    Parsed::Pattern(Pattern::Call {
                        target: Box::new(assert_value(left)?),
                        name,
                        arguments: vec![pattern],
                        may_be_var_call: false,
                        location,
                    })
                }
                (TokenKind::BinaryOperator(name), Parsed::Value(right)) => {
                    Parsed::Value(Expr::new(
                        ExprKind::Call {
                            target: Box::new(assert_value(left)?),
                            name,
                            arguments: Arguments::positional(vec![right]),
                            may_be_var_call: false,
                        },
                        location,
                    ))
                }
                (other, _) => unreachable!("`{other}` is not an operator"),
            };
        }
    }

    fn parse_primary(
        &mut self,
        require_call_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Parsed, SyntaxError> {
        if self.check(&TokenKind::Val) {
            return self.parse_val(require_call_parens, lower_priority_target);
        }

        if self.check(&TokenKind::BinaryOperator("-".into())) {
            let start = self.advance().span;
            let expr = assert_value(self.parse_primary(require_call_parens, lower_priority_target)?)?;
            let location = self.location(start.join(self.last_span));
            return Ok(Parsed::Value(Expr::new(
                ExprKind::Call {
                    target: Box::new(expr),
                    name: "-".into(),
                    arguments: Arguments::default(),
                    may_be_var_call: false,
                },
                location,
            )));
        }

        let mut target = self.parse_call_target(require_call_parens, lower_priority_target)?;
        while let Some(call) = self.try_parse_call(&target, require_call_parens, lower_priority_target)? {
            target = call;
        }
        Ok(target)
    }

    fn parse_val(
        &mut self,
        require_call_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Parsed, SyntaxError> {
        let start = self.advance().span;
        let TokenKind::Name(name) = self.current().kind.clone() else {
            return Err(self.error_here("`val` needs to be followed by a name"));
        };
        let name_span = self.advance().span;

        if !self.check(&TokenKind::Colon) && !self.check(&TokenKind::Equals) {
            return Ok(Parsed::Pattern(Pattern::Binding {
                name,
                location: self.location(start.join(name_span)),
            }));
        }

        let expected = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_value(0, true, false)?)
        } else {
            None
        };

        if !self.check(&TokenKind::Equals) {
            return Err(self.error_here("`val` needs to have an `=`"));
        }
        self.advance();

        let value = self.parse_value(2, require_call_parens, lower_priority_target)?;
        let value = match expected {
            Some(expected) => {
                let location = join_locations(value.location.clone(), expected.location.clone());
                Expr::new(
                    ExprKind::TypeAssert {
                        value: Box::new(value),
                        expected: Box::new(expected),
                    },
                    location,
                )
            }
            None => value,
        };

        let body = match self.parse_block_rest()? {
            Some(body) => body,
            None => Expr::name(name.clone(), self.location(name_span)),
        };
        let location = self.location(start.join(self.last_span));

        Ok(Parsed::Value(Expr::new(
            ExprKind::Let {
                name,
                value: Box::new(value),
                body: Box::new(body),
                recursive: false,
            },
            location,
        )))
    }

    fn parse_call_target(
        &mut self,
        require_call_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Parsed, SyntaxError> {
        let token = self.current().clone();
        let location = self.location(token.span);

        match token.kind {
            TokenKind::Bool(value) => {
                self.advance();
                Ok(Parsed::Value(Expr::new(ExprKind::Bool(value), location)))
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Parsed::Value(Expr::new(ExprKind::Int(value), location)))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Parsed::Value(Expr::new(ExprKind::Float(value), location)))
            }
            TokenKind::String(ref value) => {
                let value = value.clone();
                self.advance();
                Ok(Parsed::Value(Expr::string(value, location)))
            }
            TokenKind::Name(ref name) => {
                let name = name.clone();
                self.advance();
                let macros = self.macros;
                if let Some(handler) = macros.get(&name) {
                    if let Some(expr) = handler.expand(&token, self, location.clone())? {
                        return Ok(Parsed::Value(expr));
                    }
                }
                Ok(Parsed::Value(Expr::name(name, location)))
            }
            TokenKind::LBrace => self.parse_lambda(lower_priority_target, false),
            TokenKind::UnaryOperator(name) => {
                self.advance();
                let target = assert_value(self.parse_primary(require_call_parens, lower_priority_target)?)?;
                let location = self.location(token.span.join(self.last_span));
                Ok(Parsed::Value(Expr::new(
                    ExprKind::Call {
                        target: Box::new(target),
                        name,
                        arguments: Arguments::default(),
                        may_be_var_call: false,
                    },
                    location,
                )))
            }
            TokenKind::At => {
                self.advance();
                if self.check(&TokenKind::LBrace) {
                    self.parse_lambda(lower_priority_target, true)
                } else {
                    self.parse_paren_expression(lower_priority_target, true)
                }
            }
            TokenKind::LParen => self.parse_paren_expression(lower_priority_target, false),
            _ => Err(self.error_here("Expected an expression")),
        }
    }

    fn parse_paren_expression(
        &mut self,
        lower_priority_target: bool,
        compile_time: bool,
    ) -> Result<Parsed, SyntaxError> {
        if self.is_open_paren_for_lambda() {
            return self.parse_lambda(lower_priority_target, compile_time);
        }

        let start = self.expect(TokenKind::LParen)?.span;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_expression(0, false, false)?);
            if self.check(&TokenKind::RParen) || !self.newline_before() {
                break;
            }
        }
        if !self.check(&TokenKind::RParen) {
            return Err(self.error_here("Unmatched parentheses or extra expressions. Expected `)`"));
        }
        let end = self.advance().span;

        if values.len() == 1 {
            return Ok(values.remove(0));
        }
        let values = values
            .into_iter()
            .map(assert_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Parsed::Value(Expr::new(
            ExprKind::Block(values),
            self.location(start.join(end)),
        )))
    }

    /// Looks past the matching `)` to decide whether a parenthesis opens a
    /// parameter list.
    fn is_open_paren_for_lambda(&self) -> bool {
        let mut index = self.pos + 1;
        let mut depth = 1;
        while depth > 0 {
            match self.tokens.get(index).map(|token| &token.kind) {
                None | Some(TokenKind::Eof) => return false,
                Some(TokenKind::LParen) => depth += 1,
                Some(TokenKind::RParen) => depth -= 1,
                Some(_) => {}
            }
            index += 1;
        }

        if self.newlines.get(index).copied().unwrap_or(true) {
            return false;
        }
        matches!(
            self.tokens.get(index).map(|token| &token.kind),
            Some(
                TokenKind::LBrace
                    | TokenKind::LBracket
                    | TokenKind::Colon
                    | TokenKind::Dollar
                    | TokenKind::Name(_)
                    | TokenKind::Int(_)
                    | TokenKind::Float(_)
                    | TokenKind::String(_)
                    | TokenKind::Bool(_)
                    | TokenKind::UnaryOperator(_)
            )
        )
    }

    fn try_parse_call(
        &mut self,
        target: &Parsed,
        require_call_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Option<Parsed>, SyntaxError> {
        // target.name args
        if self.check(&TokenKind::Dot) {
            if self.current().spaced && lower_priority_target {
                return Ok(None);
            }
            self.advance();

            let name = match &self.current().kind {
                TokenKind::Name(name)
                | TokenKind::BinaryOperator(name)
                | TokenKind::UnaryOperator(name) => name.clone(),
                _ => return Err(self.error_here("Expected method name")),
            };
            self.advance();

            let arguments = self.parse_arguments(require_call_parens, true)?;
            let target = clone_value(target)?;
            let location = self.location_from(&target.location);
            return build_call(target, name, arguments, false, location).map(Some);
        }

        // name a, b
        if let Parsed::Value(Expr {
            kind: ExprKind::NameReference(name),
            location,
        }) = target
        {
            let is_definitely_a_call = self.check(&TokenKind::LParen);
            if !self.current_expression_may_end() && (!require_call_parens || is_definitely_a_call) {
                let arguments = self.parse_arguments(require_call_parens, true)?;
                let receiver = Expr::name("self", location.clone());
                let call_location = self.location_from(location);
                return build_call(receiver, name.clone(), arguments, true, call_location).map(Some);
            }
        }

        // expression(args)
        if self.check(&TokenKind::LParen) && !self.current().spaced {
            let arguments = self.parse_arguments(require_call_parens, false)?;
            let target = clone_value(target)?;
            let location = self.location_from(&target.location);
            return build_call(target, "call".into(), arguments, false, location).map(Some);
        }

        Ok(None)
    }

    fn parse_arguments(
        &mut self,
        require_parens: bool,
        lower_priority_target: bool,
    ) -> Result<Vec<Argument>, SyntaxError> {
        let with_parens = self.check(&TokenKind::LParen) && !self.current().spaced;
        if with_parens {
            self.advance();
        } else if self.current_expression_may_end() || require_parens {
            return Ok(Vec::new());
        }

        if with_parens && self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(Vec::new());
        }

        let nested_lower_priority = lower_priority_target && !with_parens;
        let mut arguments = vec![self.parse_argument(nested_lower_priority)?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            arguments.push(self.parse_argument(nested_lower_priority)?);
        }

        if with_parens {
            if !self.check(&TokenKind::RParen) {
                return Err(self.error_here("Expected `)`"));
            }
            self.advance();
        } else if !self.current_expression_may_end() {
            return Err(self.error_here("Expected current expression to end (either new line or `)`)"));
        }

        Ok(arguments)
    }

    fn parse_argument(&mut self, lower_priority_target: bool) -> Result<Argument, SyntaxError> {
        let is_named = matches!(self.current().kind, TokenKind::Name(_))
            && matches!(
                self.tokens.get(self.pos + 1).map(|token| &token.kind),
                Some(TokenKind::Equals)
            );
        let name = if is_named {
            let (name, _) = self.expect_name("Expected argument name")?;
            self.advance();
            Some(name)
        } else {
            None
        };

        let value = self.parse_expression(0, false, lower_priority_target)?;
        Ok((name, value))
    }

    fn parse_lambda(
        &mut self,
        lower_priority_target: bool,
        compile_time: bool,
    ) -> Result<Parsed, SyntaxError> {
        // A brace-only lambda may start on its own line.
        if let Some(newline) = self.newlines.get_mut(self.pos) {
            *newline = false;
        }
        let start = self.current().span;

        let parameters = if self.check(&TokenKind::LParen) {
            self.parse_lambda_parameters()?
        } else {
            Vec::new()
        };

        let return_type = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_expression(0, true, false)?)
        } else {
            None
        };

        if self.current_expression_may_end() {
            let Some(return_type) = return_type else {
                return Err(self.error_here("Function types need to have an explicit return type"));
            };
            let location = self.location(start.join(self.last_span));
            return function_type(parameters, return_type, location);
        }

        let body = if self.check(&TokenKind::LBrace) {
            self.advance();
            let body = self.parse_block()?;
            self.expect(TokenKind::RBrace)?;
            body
        } else {
            self.parse_value(0, false, lower_priority_target)?
        };

        let return_type = match return_type {
            Some(return_type) => Some(Box::new(assert_value(return_type)?)),
            None => None,
        };

        Ok(Parsed::Value(Expr::new(
            ExprKind::Function(FunctionExpr {
                parameters,
                return_type,
                body: Box::new(body),
                compile_time,
            }),
            self.location(start.join(self.last_span)),
        )))
    }

    fn parse_lambda_parameters(&mut self) -> Result<Vec<Parameter>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut parameters = Vec::new();

        if !self.check(&TokenKind::RParen) {
            loop {
                let (name, location) = self.expect_name("Expected parameter name")?;
                let pattern = if self.check(&TokenKind::Colon) {
                    self.advance();
                    Some(coerce_to_pattern(self.parse_expression(0, true, false)?))
                } else {
                    None
                };

                parameters.push(Parameter {
                    name,
                    pattern,
                    location: self.location_from(&location),
                });

                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(parameters)
    }

    fn parse_block(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.current().span;
        let mut values = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.error_here("Expected `}`"));
            }
            values.push(self.parse_statement()?);
        }

        if values.len() == 1 {
            Ok(values.remove(0))
        } else {
            Ok(Expr::new(
                ExprKind::Block(values),
                self.location(start.join(self.last_span)),
            ))
        }
    }

    fn current_operator_precedence(&self) -> Option<u8> {
        match &self.current().kind {
            TokenKind::Colon => Some(7),
            TokenKind::BinaryOperator(op) => Some(match op.as_str() {
                "or" => 2,
                "and" => 3,
                "==" | "!=" | "<" | ">" | "<=" | ">=" => 4,
                "+" | "-" => 5,
                "*" | "/" => 6,
                _ => return None,
            }),
            _ => None,
        }
    }

    fn current_expression_may_end(&self) -> bool {
        self.newline_before()
            || matches!(
                self.current().kind,
                TokenKind::Eof
                    | TokenKind::BinaryOperator(_)
                    | TokenKind::Colon
                    | TokenKind::Comma
                    | TokenKind::RParen
                    | TokenKind::Dot
                    | TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::Equals
            )
    }

    fn at_block_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::RBrace | TokenKind::RParen)
    }

    fn newline_before(&self) -> bool {
        self.newlines.get(self.pos).copied().unwrap_or(false)
    }

    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        self.last_span = token.span;
        token
    }

    fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }
}

fn build_call(
    target: Expr,
    name: String,
    arguments: Vec<Argument>,
    may_be_var_call: bool,
    location: Option<Location>,
) -> Result<Parsed, SyntaxError> {
    if arguments.iter().any(|(_, value)| matches!(value, Parsed::Pattern(_))) {
        let arguments = arguments
            .into_iter()
            .map(|(name, value)| match name {
                None => Ok(coerce_to_pattern(value)),
                Some(_) => Err(SyntaxError::new(
                    "Patterns cannot use named arguments",
                    location.as_ref().map(|l| l.span).unwrap_or_default(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Parsed::Pattern(Pattern::Call {
            target: Box::new(target),
            name,
            arguments,
            may_be_var_call,
            location,
        }));
    }

    let mut positional = Vec::new();
    let mut named = Vec::new();
    for (name, value) in arguments {
        let value = assert_value(value)?;
        match name {
            Some(name) => named.push((name, value)),
            None => positional.push(value),
        }
    }

    Ok(Parsed::Value(Expr::new(
        ExprKind::Call {
            target: Box::new(target),
            name,
            arguments: Arguments { positional, named },
            may_be_var_call,
        },
        location,
    )))
}

fn function_type(
    parameters: Vec<Parameter>,
    return_type: Parsed,
    location: Option<Location>,
) -> Result<Parsed, SyntaxError> {
    let span = location.as_ref().map(|l| l.span).unwrap_or_default();
    let mut typed = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let Some(pattern) = parameter.pattern else {
            return Err(SyntaxError::new(
                format!("Function type needs a type for parameter `{}`", parameter.name),
                span,
            ));
        };
        typed.push((parameter.name, pattern));
    }

    let has_patterns = typed.iter().any(|(_, pattern)| pattern.has_bindings())
        || matches!(return_type, Parsed::Pattern(_));

    if has_patterns {
        return Ok(Parsed::Pattern(Pattern::FunctionType {
            parameters: typed,
            return_type: Box::new(coerce_to_pattern(return_type)),
            location,
        }));
    }

    let parameters = typed
        .into_iter()
        .map(|(name, pattern)| match pattern.into_expr() {
            Some(expr) => Ok((name, expr)),
            None => Err(SyntaxError::new(
                "Function type cannot use patterns in types of parameters",
                span,
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Parsed::Value(Expr::new(
        ExprKind::FunctionType {
            parameters,
            return_type: Box::new(assert_value(return_type)?),
        },
        location,
    )))
}

fn assert_value(parsed: Parsed) -> Result<Expr, SyntaxError> {
    match parsed {
        Parsed::Value(expr) => Ok(expr),
        Parsed::Pattern(pattern) => Err(SyntaxError::new(
            format!("Cannot use pattern {pattern} in this context"),
            pattern_location(&pattern)
                .map(|location| location.span)
                .unwrap_or_default(),
        )
        .with_help("`val` patterns are only allowed in parameter types")),
    }
}

fn clone_value(parsed: &Parsed) -> Result<Expr, SyntaxError> {
    match parsed {
        Parsed::Value(expr) => Ok(expr.clone()),
        Parsed::Pattern(pattern) => Err(SyntaxError::new(
            format!("Cannot call a method on pattern {pattern}"),
            pattern_location(pattern)
                .map(|location| location.span)
                .unwrap_or_default(),
        )),
    }
}

fn coerce_to_pattern(parsed: Parsed) -> Pattern {
    match parsed {
        Parsed::Value(expr) => Pattern::SpecificValue(expr),
        Parsed::Pattern(pattern) => pattern,
    }
}

fn pattern_location(pattern: &Pattern) -> Option<Location> {
    match pattern {
        Pattern::SpecificValue(expr) => expr.location.clone(),
        Pattern::Binding { location, .. }
        | Pattern::Call { location, .. }
        | Pattern::FunctionType { location, .. } => location.clone(),
    }
}

fn join_locations(left: Option<Location>, right: Option<Location>) -> Option<Location> {
    match (left, right) {
        (Some(left), Some(right)) => Some(left.extend_with(&right)),
        (left, right) => left.or(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> String {
        parse_source("test.ph", source, &MacroRegistry::empty())
            .unwrap_or_else(|err| panic!("failed to parse {source:?}: {err}"))
            .to_string()
    }

    fn parse_with_macros(source: &str) -> String {
        parse_source("test.ph", source, &MacroRegistry::with_defaults())
            .unwrap_or_else(|err| panic!("failed to parse {source:?}: {err}"))
            .to_string()
    }

    fn parse_error(source: &str) -> String {
        parse_source("test.ph", source, &MacroRegistry::empty())
            .expect_err("expected a syntax error")
            .errors[0]
            .message
            .clone()
    }

    #[test]
    fn literals_and_negation() {
        assert_eq!(parse("12345"), "12345");
        assert_eq!(parse("1234.5678"), "1234.5678");
        assert_eq!(parse("-1234"), "(- 1234)");
        assert_eq!(parse("-   (5 + 5)"), "(- (+ 5 5))");
        assert_eq!(parse("\"Hello world!\""), "\"Hello world!\"");
    }

    #[test]
    fn infix_operators_are_left_associative_with_precedence() {
        assert_eq!(parse("1 + 2 + 3 + 4"), "(+ (+ (+ 1 2) 3) 4)");
        assert_eq!(parse("1 or 2 and 3 or 4"), "(or (or 1 (and 2 3)) 4)");
        assert_eq!(parse("1 == 2 * 2 + 3"), "(== 1 (+ (* 2 2) 3))");
        assert_eq!(parse("1 - 2 / 3 * 4 + 5"), "(+ (- 1 (* (/ 2 3) 4)) 5)");
        assert_eq!(parse("(1 + 2) * 3"), "(* (+ 1 2) 3)");
        assert_eq!(parse("1 + 2 * !a"), "(+ 1 (* 2 (! a)))");
    }

    #[test]
    fn newlines_end_expressions() {
        assert_eq!(parse("val a =\n\n 5 * 5"), "(let a (* 5 5) a)");
        assert_eq!(parse("1 + 2 \n - 5"), "{(+ 1 2) (- 5)}");
        assert_eq!(parse("1 +\n\n 2 * \n\n 3"), "(+ 1 (* 2 3))");
    }

    #[test]
    fn method_calls() {
        assert_eq!(parse("method"), "method");
        assert_eq!(parse("method()"), "(method self)");
        assert_eq!(parse("target.method"), "(method target)");
        assert_eq!(parse("method a, b, c"), "(method self a b c)");
        assert_eq!(parse("method a, \n\n b,\n c"), "(method self a b c)");
        assert_eq!(parse("target.method(a, b, c)"), "(method target a b c)");
        assert_eq!(parse("1.+(42)"), "(+ 1 42)");
        assert_eq!(parse("true.!()"), "(! true)");
        assert_eq!(parse("a.b(1).c 2.d, d(3, 4)"), "(c (b a 1) (d 2) (d self 3 4))");
    }

    #[test]
    fn bare_arguments_associate_to_the_right() {
        assert_eq!(parse("one two a, b"), "(one self (two self a b))");
        assert_eq!(parse("one two(a), b"), "(one self (two self a) b)");
        assert_eq!(parse("method a, \n\n b,\n c\n d"), "{(method self a b c) d}");
        assert_eq!(parse("one a + b"), "(one self (+ a b))");
        assert_eq!(parse("one(a) + b"), "(+ (one self a) b)");
    }

    #[test]
    fn lambdas() {
        assert_eq!(parse("{ a\n b\n }"), "(lambda [] {a b})");
        assert_eq!(parse("(a, b) a + b"), "(lambda [(param a) (param b)] (+ a b))");
        assert_eq!(parse("{ a\n }(42)"), "(call (lambda [] a) 42)");
        assert_eq!(parse("(a){ a + 41 }(1)"), "(call (lambda [(param a)] (+ a 41)) 1)");
        assert_eq!(parse("((a){ a + 41 })(1)"), "(call (lambda [(param a)] (+ a 41)) 1)");
        assert_eq!(
            parse("(a) { (b) { a + b } }(1)(41)"),
            "(call (call (lambda [(param a)] (lambda [(param b)] (+ a b))) 1) 41)"
        );
        assert_eq!(
            parse("array.forEach (element) { element + 1 }"),
            "(forEach array (lambda [(param element)] (+ element 1)))"
        );
        assert_eq!(parse("val a = 42; { a }"), "(let a 42 (lambda [] a))");
        assert_eq!(parse("@(a: Int) a"), "(@lambda [(param a Int)] a)");
    }

    #[test]
    fn named_arguments() {
        assert_eq!(parse("fn(a = 1, b = 2)"), "(fn self (param a 1) (param b 2))");
        assert_eq!(parse("fn 42, a = 1"), "(fn self 42 (param a 1))");
    }

    #[test]
    fn type_annotations() {
        assert_eq!(parse("42: Int"), "(type-assert 42 Int)");
        assert_eq!(parse("val a: Int = 42; a"), "(let a (type-assert 42 Int) a)");
        assert_eq!(
            parse("(a: List(Int)) 42"),
            "(lambda [(param a (List self Int))] 42)"
        );
        assert_eq!(parse("(a: Int): Int a"), "(lambda [(param a Int)] Int a)");
        assert_eq!(parse("(a: Int): Int"), "(function-type [(param a Int)] Int)");
    }

    #[test]
    fn parameter_patterns() {
        assert_eq!(parse("(a: val T) a"), "(lambda [(param a (val T))] a)");
        assert_eq!(
            parse("(a: Optional(val T)) 42"),
            "(lambda [(param a <Optional self (val T)>)] 42)"
        );
        assert_eq!(
            parse("(a: Optional.match(1, val T)) 42"),
            "(lambda [(param a <match Optional 1 (val T)>)] 42)"
        );
        assert_eq!(
            parse("(f: (x: val T): Int) 42"),
            "(lambda [(param f (function-type [(param x (val T))] Int))] 42)"
        );
    }

    #[test]
    fn class_macro_expands_to_recursive_let() {
        assert_eq!(
            parse_with_macros("class Person { def age: Int }\nPerson"),
            "(recursive-let Person (new Class \"Person\" (@lambda [(param self ClassBuilder)] (define self \"age\" Int))) Person)"
        );
    }

    #[test]
    fn def_macro_adds_a_self_parameter() {
        assert_eq!(
            parse_with_macros("def plus(x: Int) age + x"),
            "(define self \"plus\" (lambda [(param self (selfType self)) (param x Int)] (+ age x)))"
        );
        assert_eq!(
            parse_with_macros("def ageOf(x: Int): Int"),
            "(define self \"ageOf\" (function-type [(param x Int)] Int))"
        );
    }

    #[test]
    fn reports_errors() {
        assert!(parse_error("(param1: fn arg1, b: Int) 42").contains("Expected"));
        assert!(parse_error("val = 1").contains("`val` needs to be followed by a name"));
        assert!(parse_error("{ a").contains("Expected `}`"));
        assert!(parse_error("val T").contains("Cannot use pattern"));
    }
}
