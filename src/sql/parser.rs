//! # SQL Parser
//!
//! Recursive-descent parser producing [`Statement`] values. Expression
//! parsing is layered by precedence, loosest first:
//!
//! ```text
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := not_expr (AND not_expr)*
//! not_expr   := NOT not_expr | comparison
//! comparison := primary (( = | != | <> | < | > | <= | >= ) primary)?
//! primary    := literal | aggregate | ident (. ident)? | ( or_expr )
//! ```
//!
//! Errors name the offending token and its line/column.

use crate::sql::ast::{
    AggregateFunc, BinaryOp, ColumnDef, Expr, Join, OrderBy, SelectItem, SelectStatement,
    Statement,
};
use crate::sql::lexer::{Keyword, Lexer, SpannedToken, Token};
use crate::types::{DataType, Value};
use eyre::{bail, ensure, Result};

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        Ok(Self {
            tokens: Lexer::new(input).tokenize()?,
            pos: 0,
        })
    }

    /// Parses one statement, tolerating a trailing semicolon.
    pub fn parse(mut self) -> Result<Statement> {
        let statement = self.parse_statement()?;
        if self.peek() == &Token::Semicolon {
            self.advance();
        }
        ensure!(
            self.peek() == &Token::Eof,
            "unexpected {} after statement at line {}, column {}",
            self.peek(),
            self.current().line,
            self.current().column
        );
        Ok(statement)
    }

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek() == &Token::Keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        let current = self.current();
        ensure!(
            current.token == Token::Keyword(keyword),
            "expected {:?}, found {} at line {}, column {}",
            keyword,
            current.token,
            current.line,
            current.column
        );
        self.advance();
        Ok(())
    }

    fn expect_token(&mut self, expected: Token) -> Result<()> {
        let current = self.current();
        ensure!(
            current.token == expected,
            "expected {}, found {} at line {}, column {}",
            expected,
            current.token,
            current.line,
            current.column
        );
        self.advance();
        Ok(())
    }

    fn expect_ident(&mut self) -> Result<String> {
        let current = self.current();
        match &current.token {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => bail!(
                "expected identifier, found {} at line {}, column {}",
                other,
                current.line,
                current.column
            ),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let current = self.current();
        match &current.token {
            Token::Keyword(Keyword::Select) => self.parse_select().map(Statement::Select),
            Token::Keyword(Keyword::Insert) => self.parse_insert(),
            Token::Keyword(Keyword::Update) => self.parse_update(),
            Token::Keyword(Keyword::Delete) => self.parse_delete(),
            Token::Keyword(Keyword::Create) => self.parse_create_table(),
            Token::Keyword(Keyword::Drop) => self.parse_drop_table(),
            Token::Keyword(Keyword::Explain) => {
                self.advance();
                let inner = self.parse_statement()?;
                Ok(Statement::Explain(Box::new(inner)))
            }
            Token::Keyword(Keyword::Begin) => {
                self.advance();
                Ok(Statement::Begin)
            }
            Token::Keyword(Keyword::Commit) => {
                self.advance();
                Ok(Statement::Commit)
            }
            Token::Keyword(Keyword::Rollback) => {
                self.advance();
                Ok(Statement::Rollback)
            }
            other => bail!(
                "expected a statement, found {} at line {}, column {}",
                other,
                current.line,
                current.column
            ),
        }
    }

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect_keyword(Keyword::Select)?;

        let mut columns = Vec::new();
        loop {
            if self.peek() == &Token::Star {
                self.advance();
                columns.push(SelectItem::Wildcard);
            } else {
                columns.push(SelectItem::Expr(self.parse_expr()?));
            }
            if self.peek() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        self.expect_keyword(Keyword::From)?;
        let from = self.expect_ident()?;

        let join = if self.eat_keyword(Keyword::Join) {
            let table = self.expect_ident()?;
            self.expect_keyword(Keyword::On)?;
            let on = self.parse_expr()?;
            Some(Join { table, on })
        } else {
            None
        };

        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            loop {
                group_by.push(self.expect_ident()?);
                if self.peek() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            loop {
                let column = self.expect_ident()?;
                let ascending = if self.eat_keyword(Keyword::Desc) {
                    false
                } else {
                    self.eat_keyword(Keyword::Asc);
                    true
                };
                order_by.push(OrderBy { column, ascending });
                if self.peek() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let limit = if self.eat_keyword(Keyword::Limit) {
            Some(self.expect_unsigned()?)
        } else {
            None
        };
        let offset = if self.eat_keyword(Keyword::Offset) {
            Some(self.expect_unsigned()?)
        } else {
            None
        };

        Ok(SelectStatement {
            columns,
            from,
            join,
            where_clause,
            group_by,
            order_by,
            limit,
            offset,
        })
    }

    fn expect_unsigned(&mut self) -> Result<u64> {
        let current = self.current();
        match current.token {
            Token::Integer(value) if value >= 0 => {
                self.advance();
                Ok(value as u64)
            }
            ref other => bail!(
                "expected a non-negative integer, found {} at line {}, column {}",
                other,
                current.line,
                current.column
            ),
        }
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.expect_ident()?;

        let mut columns = Vec::new();
        if self.peek() == &Token::LParen {
            self.advance();
            loop {
                columns.push(self.expect_ident()?);
                if self.peek() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect_token(Token::RParen)?;
        }

        self.expect_keyword(Keyword::Values)?;
        self.expect_token(Token::LParen)?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_expr()?);
            if self.peek() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_token(Token::RParen)?;

        Ok(Statement::Insert {
            table,
            columns,
            values,
        })
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Update)?;
        let table = self.expect_ident()?;
        self.expect_keyword(Keyword::Set)?;

        let mut sets = Vec::new();
        loop {
            let column = self.expect_ident()?;
            self.expect_token(Token::Eq)?;
            let value = self.parse_expr()?;
            sets.push((column, value));
            if self.peek() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Statement::Update {
            table,
            sets,
            where_clause,
        })
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;
        let table = self.expect_ident()?;
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete {
            table,
            where_clause,
        })
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Create)?;
        self.expect_keyword(Keyword::Table)?;
        let name = self.expect_ident()?;
        self.expect_token(Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);
            if self.peek() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_token(Token::RParen)?;

        ensure!(
            columns.iter().filter(|c| c.primary_key).count() <= 1,
            "table '{}' declares more than one PRIMARY KEY column",
            name
        );

        Ok(Statement::CreateTable { name, columns })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_ident()?;

        let type_token = self.current().clone();
        let type_name = match &type_token.token {
            Token::Ident(word) => word.clone(),
            other => bail!(
                "expected a column type, found {} at line {}, column {}",
                other,
                type_token.line,
                type_token.column
            ),
        };
        self.advance();

        let data_type = DataType::from_sql_name(&type_name).ok_or_else(|| {
            eyre::eyre!(
                "unknown column type '{}' at line {}, column {}",
                type_name,
                type_token.line,
                type_token.column
            )
        })?;

        // VARCHAR(n) carries a size hint.
        let mut size_hint = 0u16;
        if self.peek() == &Token::LParen {
            self.advance();
            let size = self.expect_unsigned()?;
            ensure!(
                size <= u16::MAX as u64,
                "size hint {} too large for column '{}'",
                size,
                name
            );
            size_hint = size as u16;
            self.expect_token(Token::RParen)?;
        }

        let mut primary_key = false;
        let mut nullable = true;
        loop {
            if self.eat_keyword(Keyword::Primary) {
                self.expect_keyword(Keyword::Key)?;
                primary_key = true;
                nullable = false;
            } else if self.eat_keyword(Keyword::Not) {
                self.expect_keyword(Keyword::Null)?;
                nullable = false;
            } else if self.eat_keyword(Keyword::Null) {
                nullable = true;
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            data_type,
            size_hint,
            primary_key,
            nullable,
        })
    }

    fn parse_drop_table(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Drop)?;
        self.expect_keyword(Keyword::Table)?;
        let name = self.expect_ident()?;
        Ok(Statement::DropTable { name })
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword(Keyword::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Neq => BinaryOp::Neq,
            Token::Lt => BinaryOp::Lt,
            Token::Gt => BinaryOp::Gt,
            Token::Le => BinaryOp::Le,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::binary(left, op, right))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let current = self.current().clone();
        match &current.token {
            Token::Integer(value) => {
                self.advance();
                Ok(Expr::literal(Value::Int64(*value)))
            }
            Token::Float(value) => {
                self.advance();
                Ok(Expr::literal(Value::Float64(*value)))
            }
            Token::Str(text) => {
                self.advance();
                Ok(Expr::literal(Value::Text(text.clone())))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::literal(Value::Bool(true)))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::literal(Value::Bool(false)))
            }
            Token::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::literal(Value::Null))
            }
            Token::Keyword(kw) => {
                let func = match kw {
                    Keyword::Count => AggregateFunc::Count,
                    Keyword::Sum => AggregateFunc::Sum,
                    Keyword::Avg => AggregateFunc::Avg,
                    Keyword::Max => AggregateFunc::Max,
                    Keyword::Min => AggregateFunc::Min,
                    other => bail!(
                        "unexpected {:?} in expression at line {}, column {}",
                        other,
                        current.line,
                        current.column
                    ),
                };
                self.advance();
                self.expect_token(Token::LParen)?;
                let column = if self.peek() == &Token::Star {
                    self.advance();
                    None
                } else {
                    Some(self.expect_ident()?)
                };
                self.expect_token(Token::RParen)?;
                Ok(Expr::Aggregate { func, column })
            }
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                if self.peek() == &Token::Dot {
                    self.advance();
                    let column = self.expect_ident()?;
                    Ok(Expr::Column {
                        table: Some(name),
                        name: column,
                    })
                } else {
                    Ok(Expr::Column { table: None, name })
                }
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                Ok(inner)
            }
            other => bail!(
                "unexpected {} in expression at line {}, column {}",
                other,
                current.line,
                current.column
            ),
        }
    }
}
