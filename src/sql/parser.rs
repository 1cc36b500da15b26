//! # SQL Parser
//!
//! Recursive descent over the token stream with exactly one token of
//! lookahead, implemented as a buffered push-back slot (`scan`/`unscan`)
//! rather than input rewinding. Each statement clause is parsed by a
//! dedicated function that consumes what it recognizes and unscans the
//! first token it does not.
//!
//! Expressions use precedence climbing driven by the token precedence
//! table. `BETWEEN a AND b` desugars into `>= a AND <= b`; `NOT` is only
//! accepted infix as the head of `NOT IN`; `IS NOT` is folded into one
//! operator while parsing.
//!
//! Every error is a [`ParseError`] carrying the offending token's text,
//! the strings that would have been accepted, and the token position.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Keyword, Pos, Token};
use crate::config::MAX_EXPR_DEPTH;
use crate::error::{Error, ParseError, Result};
use crate::types::{DataType, Value};

pub struct Parser {
    lexer: Lexer,
    buffered: Option<(Token, Pos)>,
    depth: usize,
    positional: usize,
}

/// Parses exactly one statement, optionally `;`-terminated; trailing
/// input is an error.
pub fn parse(input: &str) -> Result<Statement> {
    let mut parser = Parser::new(input);
    let Some(stmt) = parser.parse_statement()? else {
        let (tok, pos) = parser.scan();
        return Err(parser.expected(&tok, pos, &["statement"]));
    };
    let (tok, pos) = parser.scan();
    if tok != Token::Eof {
        return Err(parser.expected(&tok, pos, &["EOF"]));
    }
    Ok(stmt)
}

/// Parses a `;`-separated script into its statements, in order.
pub fn parse_all(input: &str) -> Result<Vec<Statement>> {
    let mut parser = Parser::new(input);
    let mut statements = Vec::new();
    while let Some(stmt) = parser.parse_statement()? {
        statements.push(stmt);
    }
    Ok(statements)
}

impl Parser {
    pub fn new(input: &str) -> Parser {
        Parser { lexer: Lexer::new(input), buffered: None, depth: 0, positional: 0 }
    }

    fn scan(&mut self) -> (Token, Pos) {
        self.buffered
            .take()
            .unwrap_or_else(|| self.lexer.next_token())
    }

    fn unscan(&mut self, tok: Token, pos: Pos) {
        debug_assert!(self.buffered.is_none(), "push-back slot already occupied");
        self.buffered = Some((tok, pos));
    }

    fn expected(&self, found: &Token, pos: Pos, expected: &[&str]) -> Error {
        Error::Parse(ParseError {
            found: found.to_string(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            pos,
        })
    }

    fn expect(&mut self, want: Token, show: &str) -> Result<()> {
        let (tok, pos) = self.scan();
        if tok == want {
            Ok(())
        } else {
            Err(self.expected(&tok, pos, &[show]))
        }
    }

    fn expect_keyword(&mut self, want: Keyword) -> Result<()> {
        self.expect(Token::Keyword(want), &want.to_string())
    }

    /// Consumes the token if it matches, reporting whether it did.
    fn consume(&mut self, want: &Token) -> bool {
        let (tok, pos) = self.scan();
        if tok == *want {
            true
        } else {
            self.unscan(tok, pos);
            false
        }
    }

    fn consume_keyword(&mut self, want: Keyword) -> bool {
        self.consume(&Token::Keyword(want))
    }

    fn parse_ident(&mut self) -> Result<String> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Ident(name) => Ok(name),
            other => Err(self.expected(&other, pos, &["identifier"])),
        }
    }

    /// Parses the next statement of a script, `None` at end of input.
    pub fn parse_statement(&mut self) -> Result<Option<Statement>> {
        loop {
            let (tok, pos) = self.scan();
            let stmt = match tok {
                Token::Eof => return Ok(None),
                Token::Semicolon => continue,
                Token::Keyword(Keyword::Begin) => self.parse_begin()?,
                Token::Keyword(Keyword::Commit) => Statement::Commit,
                Token::Keyword(Keyword::Rollback) => Statement::Rollback,
                Token::Keyword(Keyword::Create) => self.parse_create()?,
                Token::Keyword(Keyword::Drop) => self.parse_drop()?,
                Token::Keyword(Keyword::Reindex) => self.parse_reindex()?,
                Token::Keyword(Keyword::Insert) => Statement::Insert(self.parse_insert()?),
                Token::Keyword(Keyword::Select) => Statement::Select(self.parse_select()?),
                Token::Keyword(Keyword::Update) => Statement::Update(self.parse_update()?),
                Token::Keyword(Keyword::Delete) => Statement::Delete(self.parse_delete()?),
                other => {
                    return Err(self.expected(
                        &other,
                        pos,
                        &[
                            "BEGIN", "COMMIT", "ROLLBACK", "CREATE", "DROP", "REINDEX", "INSERT",
                            "SELECT", "UPDATE", "DELETE",
                        ],
                    ))
                }
            };
            // one optional terminator after the statement
            if !self.consume(&Token::Semicolon) {
                let (tok, pos) = self.scan();
                if tok != Token::Eof {
                    return Err(self.expected(&tok, pos, &[";", "EOF"]));
                }
                self.unscan(tok, pos);
            }
            return Ok(Some(stmt));
        }
    }

    fn parse_begin(&mut self) -> Result<Statement> {
        if self.consume_keyword(Keyword::Read) {
            self.expect_keyword(Keyword::Only)?;
            return Ok(Statement::Begin { read_only: true });
        }
        let _ = self.consume_keyword(Keyword::Write);
        Ok(Statement::Begin { read_only: false })
    }

    fn parse_create(&mut self) -> Result<Statement> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Keyword(Keyword::Table) => self.parse_create_table(),
            Token::Keyword(Keyword::Unique) => {
                self.expect_keyword(Keyword::Index)?;
                self.parse_create_index(true)
            }
            Token::Keyword(Keyword::Index) => self.parse_create_index(false),
            other => Err(self.expected(&other, pos, &["TABLE", "INDEX", "UNIQUE"])),
        }
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if !self.consume_keyword(Keyword::If) {
            return Ok(false);
        }
        self.expect_keyword(Keyword::Not)?;
        self.expect_keyword(Keyword::Exists)?;
        Ok(true)
    }

    fn parse_if_exists(&mut self) -> Result<bool> {
        if !self.consume_keyword(Keyword::If) {
            return Ok(false);
        }
        self.expect_keyword(Keyword::Exists)?;
        Ok(true)
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_ident()?;
        let columns = self.parse_column_defs()?;
        Ok(Statement::CreateTable(CreateTableStmt { name, if_not_exists, columns }))
    }

    /// Parses `(col type [PRIMARY KEY], ...)` when present.
    fn parse_column_defs(&mut self) -> Result<Option<Vec<ColumnDef>>> {
        if !self.consume(&Token::Lparen) {
            return Ok(None);
        }
        let mut columns = Vec::new();
        loop {
            let name = self.parse_ident()?;
            let ty = self.parse_type()?;
            let mut primary_key = false;
            if self.consume_keyword(Keyword::Primary) {
                self.expect_keyword(Keyword::Key)?;
                primary_key = true;
            }
            if primary_key && columns.iter().any(|c: &ColumnDef| c.primary_key) {
                let (tok, pos) = self.scan();
                return Err(self.expected(&tok, pos, &["at most one PRIMARY KEY"]));
            }
            columns.push(ColumnDef { name, ty, primary_key });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::Rparen, ")")?;
        Ok(Some(columns))
    }

    fn parse_type(&mut self) -> Result<DataType> {
        let (tok, pos) = self.scan();
        let ty = match tok {
            Token::Keyword(Keyword::TypeBool) => DataType::Bool,
            Token::Keyword(Keyword::TypeTinyint) => DataType::Int8,
            Token::Keyword(Keyword::TypeSmallint) | Token::Keyword(Keyword::TypeInt2) => {
                DataType::Int16
            }
            Token::Keyword(Keyword::TypeMediumint) => DataType::Int32,
            Token::Keyword(Keyword::TypeInt)
            | Token::Keyword(Keyword::TypeInteger)
            | Token::Keyword(Keyword::TypeBigint)
            | Token::Keyword(Keyword::TypeInt8) => DataType::Int64,
            Token::Keyword(Keyword::TypeReal) => DataType::Float64,
            Token::Keyword(Keyword::TypeDouble) => {
                let _ = self.consume_keyword(Keyword::Precision);
                DataType::Float64
            }
            Token::Keyword(Keyword::TypeText)
            | Token::Keyword(Keyword::TypeVarchar)
            | Token::Keyword(Keyword::TypeCharacter) => DataType::Text,
            Token::Keyword(Keyword::TypeBlob) | Token::Keyword(Keyword::TypeBytes) => {
                DataType::Blob
            }
            Token::Keyword(Keyword::TypeArray) => DataType::Array,
            Token::Keyword(Keyword::TypeDocument) => DataType::Document,
            other => return Err(self.expected(&other, pos, &["type name"])),
        };
        Ok(ty)
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<Statement> {
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_ident()?;
        self.expect_keyword(Keyword::On)?;
        let table = self.parse_ident()?;

        let (tok, pos) = self.scan();
        if tok != Token::Lparen {
            return Err(self.expected(&tok, pos, &["("]));
        }
        let fields = self.parse_ident_list()?;
        self.expect(Token::Rparen, ")")?;

        if fields.len() != 1 {
            return Err(Error::Parse(ParseError {
                found: format!("{} fields", fields.len()),
                expected: vec!["exactly one indexed field".to_string()],
                pos,
            }));
        }

        Ok(Statement::CreateIndex(CreateIndexStmt {
            name,
            table,
            field: fields.into_iter().next().expect("length checked"),
            unique,
            if_not_exists,
        }))
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Keyword(Keyword::Table) => {
                let if_exists = self.parse_if_exists()?;
                Ok(Statement::DropTable { name: self.parse_ident()?, if_exists })
            }
            Token::Keyword(Keyword::Index) => {
                let if_exists = self.parse_if_exists()?;
                Ok(Statement::DropIndex { name: self.parse_ident()?, if_exists })
            }
            other => Err(self.expected(&other, pos, &["TABLE", "INDEX"])),
        }
    }

    fn parse_reindex(&mut self) -> Result<Statement> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Ident(name) => Ok(Statement::Reindex { table: Some(name) }),
            other => {
                self.unscan(other, pos);
                Ok(Statement::Reindex { table: None })
            }
        }
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>> {
        let mut idents = vec![self.parse_ident()?];
        while self.consume(&Token::Comma) {
            idents.push(self.parse_ident()?);
        }
        Ok(idents)
    }

    fn parse_insert(&mut self) -> Result<InsertStmt> {
        self.expect_keyword(Keyword::Into)?;
        let table = self.parse_ident()?;

        let field_names = if self.consume(&Token::Lparen) {
            let names = self.parse_ident_list()?;
            self.expect(Token::Rparen, ")")?;
            Some(names)
        } else {
            None
        };

        let (tok, pos) = self.scan();
        let source = match tok {
            Token::Keyword(Keyword::Values) => {
                let mut rows = vec![self.parse_expr_list()?];
                while self.consume(&Token::Comma) {
                    rows.push(self.parse_expr_list()?);
                }
                InsertSource::Values(rows)
            }
            Token::Keyword(Keyword::Records) => {
                let mut records = vec![self.parse_record()?];
                while self.consume(&Token::Comma) {
                    records.push(self.parse_record()?);
                }
                InsertSource::Records(records)
            }
            other => return Err(self.expected(&other, pos, &["VALUES", "RECORDS"])),
        };

        Ok(InsertStmt { table, field_names, source })
    }

    /// Parses `(e, e, ...)`.
    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::Lparen, "(")?;
        let mut exprs = vec![self.parse_expr()?];
        while self.consume(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        self.expect(Token::Rparen, ")")?;
        Ok(exprs)
    }

    /// One `RECORDS` element: a parameter, `(k: e, ...)`, or `{k: e, ...}`.
    fn parse_record(&mut self) -> Result<RecordExpr> {
        let (tok, pos) = self.scan();
        match tok {
            Token::NamedParam(name) => Ok(RecordExpr::Param(ParamRef::Named(name))),
            Token::PositionalParam => {
                let index = self.positional;
                self.positional += 1;
                Ok(RecordExpr::Param(ParamRef::Positional(index)))
            }
            Token::Lparen => {
                let pairs = self.parse_kv_pairs(Token::Rparen, ")")?;
                Ok(RecordExpr::Pairs(pairs))
            }
            Token::Lbrace => {
                let pairs = self.parse_kv_pairs(Token::Rbrace, "}")?;
                Ok(RecordExpr::Pairs(pairs))
            }
            other => Err(self.expected(&other, pos, &["record", "parameter"])),
        }
    }

    /// Parses `k: e, ...` up to and including the closing token.
    fn parse_kv_pairs(&mut self, close: Token, show: &str) -> Result<Vec<(String, Expr)>> {
        let mut pairs = Vec::new();
        if self.consume(&close) {
            return Ok(pairs);
        }
        loop {
            let key = self.parse_kv_key()?;
            self.expect(Token::Colon, ":")?;
            pairs.push((key, self.parse_expr()?));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(close, show)?;
        Ok(pairs)
    }

    fn parse_kv_key(&mut self) -> Result<String> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Ident(name) => Ok(name),
            Token::Str(name) => Ok(name),
            other => Err(self.expected(&other, pos, &["identifier", "string"])),
        }
    }

    fn parse_select(&mut self) -> Result<SelectStmt> {
        let distinct = self.consume_keyword(Keyword::Distinct);

        let mut selectors = vec![self.parse_selector()?];
        while self.consume(&Token::Comma) {
            selectors.push(self.parse_selector()?);
        }

        self.expect_keyword(Keyword::From)?;
        let table = self.parse_ident()?;

        let where_expr = self.parse_where()?;

        let group_by = if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            let expr = self.parse_expr()?;
            let desc = if self.consume_keyword(Keyword::Desc) {
                true
            } else {
                let _ = self.consume_keyword(Keyword::Asc);
                false
            };
            Some(OrderBy { expr, desc })
        } else {
            None
        };

        let limit = if self.consume_keyword(Keyword::Limit) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let offset = if self.consume_keyword(Keyword::Offset) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(SelectStmt { selectors, distinct, table, where_expr, group_by, order_by, limit, offset })
    }

    fn parse_selector(&mut self) -> Result<Selector> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Mul => Ok(Selector::Wildcard),
            Token::Ident(name) => Ok(Selector::Field(name)),
            other => Err(self.expected(&other, pos, &["*", "field"])),
        }
    }

    fn parse_where(&mut self) -> Result<Option<Expr>> {
        if self.consume_keyword(Keyword::Where) {
            Ok(Some(self.parse_expr()?))
        } else {
            Ok(None)
        }
    }

    fn parse_update(&mut self) -> Result<UpdateStmt> {
        let table = self.parse_ident()?;
        self.expect_keyword(Keyword::Set)?;

        let mut assignments = Vec::new();
        loop {
            let field = self.parse_ident()?;
            self.expect(Token::Eq, "=")?;
            assignments.push((field, self.parse_expr()?));
            if !self.consume(&Token::Comma) {
                break;
            }
        }

        Ok(UpdateStmt { table, assignments, where_expr: self.parse_where()? })
    }

    fn parse_delete(&mut self) -> Result<DeleteStmt> {
        self.expect_keyword(Keyword::From)?;
        let table = self.parse_ident()?;
        Ok(DeleteStmt { table, where_expr: self.parse_where()? })
    }

    /// Parses one expression with precedence climbing.
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            self.depth -= 1;
            let (tok, pos) = self.scan();
            return Err(self.expected(&tok, pos, &["expression within the nesting limit"]));
        }
        let result = self.parse_binary_inner(min_prec);
        self.depth -= 1;
        result
    }

    fn parse_binary_inner(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;

        loop {
            let (tok, pos) = self.scan();
            let prec = tok.precedence();
            if prec == 0 || prec < min_prec {
                self.unscan(tok, pos);
                return Ok(lhs);
            }

            lhs = match tok {
                Token::Keyword(Keyword::Not) => {
                    // NOT is only valid infix as NOT IN
                    let (tok2, pos2) = self.scan();
                    if tok2 != Token::In {
                        return Err(self.expected(&tok2, pos2, &["IN"]));
                    }
                    let list = self.parse_expr_list()?;
                    Expr::Binary {
                        op: BinaryOp::NotIn,
                        left: Box::new(lhs),
                        right: Box::new(Expr::List(list)),
                    }
                }
                Token::In => {
                    let list = self.parse_expr_list()?;
                    Expr::Binary {
                        op: BinaryOp::In,
                        left: Box::new(lhs),
                        right: Box::new(Expr::List(list)),
                    }
                }
                Token::Is => {
                    let op = if self.consume_keyword(Keyword::Not) {
                        BinaryOp::IsNot
                    } else {
                        BinaryOp::Is
                    };
                    let rhs = self.parse_binary(prec + 1)?;
                    Expr::Binary { op, left: Box::new(lhs), right: Box::new(rhs) }
                }
                Token::Between => {
                    let low = self.parse_binary(prec + 1)?;
                    self.expect(Token::And, "AND")?;
                    let high = self.parse_binary(prec + 1)?;
                    // expr BETWEEN a AND b == expr >= a AND expr <= b
                    Expr::Binary {
                        op: BinaryOp::And,
                        left: Box::new(Expr::Binary {
                            op: BinaryOp::Gte,
                            left: Box::new(lhs.clone()),
                            right: Box::new(low),
                        }),
                        right: Box::new(Expr::Binary {
                            op: BinaryOp::Lte,
                            left: Box::new(lhs),
                            right: Box::new(high),
                        }),
                    }
                }
                Token::Like | Token::RegexEq | Token::RegexNeq => {
                    let pattern = self.parse_pattern(&tok)?;
                    let op = match tok {
                        Token::Like => BinaryOp::Like,
                        Token::RegexEq => BinaryOp::RegexEq,
                        _ => BinaryOp::RegexNeq,
                    };
                    Expr::Binary {
                        op,
                        left: Box::new(lhs),
                        right: Box::new(Expr::Pattern(pattern)),
                    }
                }
                operator => {
                    let op = match operator {
                        Token::Or => BinaryOp::Or,
                        Token::And => BinaryOp::And,
                        Token::Eq => BinaryOp::Eq,
                        Token::Neq => BinaryOp::Neq,
                        Token::Lt => BinaryOp::Lt,
                        Token::Lte => BinaryOp::Lte,
                        Token::Gt => BinaryOp::Gt,
                        Token::Gte => BinaryOp::Gte,
                        Token::BitOr => BinaryOp::BitOr,
                        Token::BitXor => BinaryOp::BitXor,
                        Token::BitAnd => BinaryOp::BitAnd,
                        Token::Add => BinaryOp::Add,
                        Token::Sub => BinaryOp::Sub,
                        Token::Mul => BinaryOp::Mul,
                        Token::Div => BinaryOp::Div,
                        Token::Mod => BinaryOp::Mod,
                        Token::Concat => BinaryOp::Concat,
                        other => return Err(self.expected(&other, pos, &["operator"])),
                    };
                    let rhs = self.parse_binary(prec + 1)?;
                    Expr::Binary { op, left: Box::new(lhs), right: Box::new(rhs) }
                }
            };
        }
    }

    fn parse_pattern(&mut self, operator: &Token) -> Result<CompiledPattern> {
        let (tok, pos) = self.scan();
        let Token::Str(pattern) = tok else {
            return Err(self.expected(&tok, pos, &["string literal pattern"]));
        };
        let compiled = if *operator == Token::Like {
            CompiledPattern::like(&pattern)
        } else {
            CompiledPattern::regex(&pattern)
        };
        compiled.map_err(|_| {
            Error::Parse(ParseError {
                found: format!("{:?}", pattern),
                expected: vec!["valid pattern".to_string()],
                pos,
            })
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Sub => match self.scan() {
                (Token::Integer(i), _) => Ok(Expr::Literal(Value::Int64(-i))),
                (Token::Number(f), _) => Ok(Expr::Literal(Value::Float64(-f))),
                (tok2, pos2) => {
                    self.unscan(tok2, pos2);
                    Ok(Expr::Neg(Box::new(self.parse_unary()?)))
                }
            },
            Token::Add => self.parse_unary(),
            other => {
                self.unscan(other, pos);
                self.parse_primary()
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let (tok, pos) = self.scan();
        match tok {
            Token::Integer(i) => Ok(Expr::Literal(Value::Int64(i))),
            Token::Number(f) => Ok(Expr::Literal(Value::Float64(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Field(name)),
            Token::NamedParam(name) => Ok(Expr::NamedParam(name)),
            Token::PositionalParam => {
                let index = self.positional;
                self.positional += 1;
                Ok(Expr::PositionalParam(index))
            }
            Token::Lparen => {
                let expr = self.parse_expr()?;
                self.expect(Token::Rparen, ")")?;
                Ok(expr)
            }
            Token::Lbrace => {
                let pairs = self.parse_kv_pairs(Token::Rbrace, "}")?;
                Ok(Expr::DocumentLiteral(pairs))
            }
            Token::Lbracket => {
                let mut items = Vec::new();
                if !self.consume(&Token::Rbracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.consume(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::Rbracket, "]")?;
                }
                Ok(Expr::ArrayLiteral(items))
            }
            Token::Keyword(Keyword::Cast) => {
                self.expect(Token::Lparen, "(")?;
                let expr = self.parse_expr()?;
                self.expect_keyword(Keyword::As)?;
                let target = self.parse_type()?;
                self.expect(Token::Rparen, ")")?;
                Ok(Expr::Cast { expr: Box::new(expr), target })
            }
            Token::BadString => Err(self.expected(&Token::BadString, pos, &["string literal"])),
            Token::BadEscape => {
                Err(self.expected(&Token::BadEscape, pos, &["valid escape sequence"]))
            }
            other => Err(self.expected(&other, pos, &["expression"])),
        }
    }
}
