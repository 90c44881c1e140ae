use crate::{
    ast::{ArithOp, Ast, CompareOp, LogicalOp, NodeId, NodeKind, Param},
    error::BadError,
    lexer::Lexer,
    source_location::Position,
    token::{Token, TokenKind},
    types::{FunctionType, Type},
    Result,
};
use log::debug;

/// Parses a whole source text into an `Ast`.
pub fn parse(source: &str) -> Result<Ast> {
    Parser::new(source).parse_program()
}

/// Recursive-descent parser over the lexer's one-token lookahead.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    ast: Ast,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            ast: Ast::new(),
        }
    }

    /// Top-level forms are parsed as any node; rejecting the ones that are
    /// not declarations is left to the type checker.
    pub fn parse_program(mut self) -> Result<Ast> {
        while self.peek_kind()? != TokenKind::EOF {
            let item = if self.peek_kind()? == TokenKind::LeftParen {
                let open = self.advance()?;
                match self.peek_kind()? {
                    TokenKind::Func => {
                        self.advance()?;
                        self.parse_function(open.position)?
                    }
                    TokenKind::Extern => {
                        self.advance()?;
                        self.parse_extern(open.position)?
                    }
                    _ => self.parse_form(open.position)?,
                }
            } else {
                self.parse_node()?
            };
            self.ast.push_item(item);
        }
        debug!(
            "parsed {} top-level items ({} nodes)",
            self.ast.items().len(),
            self.ast.len()
        );
        Ok(self.ast)
    }

    fn peek_kind(&mut self) -> Result<TokenKind> {
        Ok(self.lexer.peek()?.kind.clone())
    }

    fn advance(&mut self) -> Result<Token> {
        let token = self.lexer.next_token()?;
        if token.kind == TokenKind::EOF {
            return Err(BadError::parser_error(
                token.position,
                "Unexpected end of file",
            ));
        }
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.lexer.next_token()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(unexpected(&token, &format!("'{}'", kind)))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        let token = self.lexer.next_token()?;
        match token.kind {
            TokenKind::Identifier(name) => Ok(name),
            _ => Err(unexpected(&token, "identifier")),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool> {
        if &self.lexer.peek()?.kind == kind {
            self.lexer.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_function(&mut self, position: Position) -> Result<NodeId> {
        let name = self.expect_identifier()?;

        self.expect(TokenKind::LeftParen)?;
        let mut params = Vec::new();
        while !self.eat(&TokenKind::RightParen)? {
            self.expect(TokenKind::LeftParen)?;
            let ty = self.parse_type()?;
            let param = self.expect_identifier()?;
            self.expect(TokenKind::RightParen)?;
            params.push(Param { name: param, ty });
        }

        let return_type = self.parse_type()?;
        let mut body = Vec::new();
        while !self.eat(&TokenKind::RightParen)? {
            body.push(self.parse_node()?);
        }

        Ok(self.ast.add(
            NodeKind::FunctionDecl {
                name,
                params,
                return_type,
                body,
            },
            position,
        ))
    }

    fn parse_extern(&mut self, position: Position) -> Result<NodeId> {
        let name = self.expect_identifier()?;

        self.expect(TokenKind::LeftParen)?;
        let mut params = Vec::new();
        let mut variadic = false;
        while !self.eat(&TokenKind::RightParen)? {
            if variadic {
                let token = self.advance()?;
                return Err(BadError::parser_error(
                    token.position,
                    "'...' must be the last parameter",
                ));
            }
            if self.eat(&TokenKind::Ellipsis)? {
                variadic = true;
            } else {
                params.push(self.parse_type()?);
            }
        }

        let return_type = self.parse_type()?;
        let token = self.advance()?;
        let library = match token.kind {
            TokenKind::Str(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => return Err(unexpected(&token, "library name string")),
        };
        self.expect(TokenKind::RightParen)?;

        Ok(self.ast.add(
            NodeKind::Extern {
                name,
                params,
                return_type,
                library,
                variadic,
            },
            position,
        ))
    }

    /// `T`, `(* T)`, `(func (T*) T)` or `(array T n)`.
    pub fn parse_type(&mut self) -> Result<Type> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Type(primitive) => Ok(Type::Primitive(primitive)),
            TokenKind::LeftParen => {
                let head = self.advance()?;
                let ty = match head.kind {
                    TokenKind::Star => Type::pointer_to(self.parse_type()?),
                    TokenKind::Func => {
                        self.expect(TokenKind::LeftParen)?;
                        let mut params = Vec::new();
                        while !self.eat(&TokenKind::RightParen)? {
                            params.push(self.parse_type()?);
                        }
                        let return_type = self.parse_type()?;
                        Type::Function(FunctionType::new(return_type, params))
                    }
                    TokenKind::Array => {
                        let element = self.parse_type()?;
                        let length = self.advance()?;
                        match length.kind {
                            TokenKind::Int(n) if n > 0 => Type::array_of(element, n as usize),
                            _ => return Err(unexpected(&length, "positive array length")),
                        }
                    }
                    _ => return Err(unexpected(&head, "type")),
                };
                self.expect(TokenKind::RightParen)?;
                Ok(ty)
            }
            _ => Err(unexpected(&token, "type")),
        }
    }

    /// Any statement or expression.
    pub fn parse_node(&mut self) -> Result<NodeId> {
        let token = self.advance()?;
        let position = token.position;
        let kind = match token.kind {
            TokenKind::Int(value) => NodeKind::IntLiteral(value),
            TokenKind::Char(c) => NodeKind::CharLiteral(c),
            TokenKind::Str(bytes) => NodeKind::StringLiteral(bytes),
            TokenKind::Bool(value) => NodeKind::BoolLiteral(value),
            TokenKind::Null => NodeKind::NullLiteral,
            TokenKind::Identifier(name) => NodeKind::Identifier(name),
            TokenKind::LeftParen => return self.parse_form(position),
            _ => return Err(unexpected(&token, "expression")),
        };
        Ok(self.ast.add(kind, position))
    }

    fn parse_form(&mut self, position: Position) -> Result<NodeId> {
        let head = self.advance()?;

        if let Some(op) = ArithOp::from_token(&head.kind) {
            let (left, right) = self.parse_pair()?;
            return self.finish(NodeKind::Arithmetic { op, left, right }, position);
        }
        if let Some(op) = CompareOp::from_token(&head.kind) {
            let (left, right) = self.parse_pair()?;
            return self.finish(NodeKind::Comparison { op, left, right }, position);
        }
        if let Some(op) = LogicalOp::from_token(&head.kind) {
            let (left, right) = self.parse_pair()?;
            return self.finish(NodeKind::Logical { op, left, right }, position);
        }

        let kind = match head.kind {
            TokenKind::VarDec => {
                let ty = self.parse_type()?;
                let name = self.expect_identifier()?;
                NodeKind::VarDecl { name, ty }
            }
            TokenKind::Assign => {
                let name = self.expect_identifier()?;
                let value = self.parse_node()?;
                NodeKind::Assign { name, value }
            }
            TokenKind::AssignPtr => {
                let (pointer, value) = self.parse_pair()?;
                NodeKind::AssignThroughPointer { pointer, value }
            }
            TokenKind::While => {
                let (condition, body) = self.parse_pair()?;
                NodeKind::While { condition, body }
            }
            TokenKind::If => {
                let (condition, then_branch) = self.parse_pair()?;
                let else_branch = if self.peek_kind()? == TokenKind::RightParen {
                    None
                } else {
                    Some(self.parse_node()?)
                };
                NodeKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            TokenKind::Return => {
                if self.peek_kind()? == TokenKind::RightParen {
                    NodeKind::Return(None)
                } else {
                    NodeKind::Return(Some(self.parse_node()?))
                }
            }
            TokenKind::Block => {
                let body = self.parse_until_close()?;
                return Ok(self.ast.add(NodeKind::Block(body), position));
            }
            TokenKind::Call => {
                let callee = self.parse_node()?;
                let args = self.parse_until_close()?;
                return Ok(self.ast.add(NodeKind::FunctionCall { callee, args }, position));
            }
            TokenKind::Bang => NodeKind::Not(self.parse_node()?),
            TokenKind::Ampersand => NodeKind::AddressOf(self.expect_identifier()?),
            TokenKind::At => NodeKind::Dereference(self.parse_node()?),
            TokenKind::Index => {
                let (array, index) = self.parse_pair()?;
                NodeKind::Index { array, index }
            }
            TokenKind::SizeOf => NodeKind::SizeOf(self.parse_type()?),
            TokenKind::Array => {
                let items = self.parse_until_close()?;
                if items.is_empty() {
                    return Err(BadError::parser_error(position, "Empty array literal"));
                }
                return Ok(self.ast.add(NodeKind::ArrayLiteral(items), position));
            }
            TokenKind::Cast => {
                let ty = self.parse_type()?;
                let value = self.parse_node()?;
                NodeKind::Cast { ty, value }
            }
            TokenKind::Func | TokenKind::Extern => {
                return Err(BadError::parser_error(
                    head.position,
                    format!("'{}' is only allowed at top level", head.kind),
                ))
            }
            _ => return Err(unexpected(&head, "form keyword or operator")),
        };

        self.finish(kind, position)
    }

    fn parse_pair(&mut self) -> Result<(NodeId, NodeId)> {
        let first = self.parse_node()?;
        let second = self.parse_node()?;
        Ok((first, second))
    }

    /// Nodes up to and including the closing paren.
    fn parse_until_close(&mut self) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::new();
        while !self.eat(&TokenKind::RightParen)? {
            if self.peek_kind()? == TokenKind::EOF {
                let token = self.lexer.next_token()?;
                return Err(unexpected(&token, "')'"));
            }
            nodes.push(self.parse_node()?);
        }
        Ok(nodes)
    }

    fn finish(&mut self, kind: NodeKind, position: Position) -> Result<NodeId> {
        self.expect(TokenKind::RightParen)?;
        Ok(self.ast.add(kind, position))
    }
}

fn unexpected(token: &Token, expected: &str) -> BadError {
    BadError::parser_error(
        token.position,
        format!("Expected {}, found {}", expected, token.kind),
    )
}
