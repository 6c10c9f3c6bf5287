//! Formula parser
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Uses recursive descent parsing with operator precedence:
//!
//! ```text
//! comparison  =  <> < > <= >=
//! concat      &
//! term        + -
//! factor      * /
//! power       ^            (right-associative)
//! unary       -            (binds tighter than ^, so -2^2 = 4)
//! postfix     %
//! ```

use super::tokenizer::Token;
use crate::core::addressing::{CellRange, CellRef};

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Single cell reference (A1, $B$2)
    Cell(CellRef),
    /// Rectangular range (A1:B10)
    Range(CellRange),
    /// Identifier that is neither a cell nor a boolean; evaluates to #NAME?
    Name(String),
    /// Function call: NAME(arg1, arg2, ...)
    FunctionCall { name: String, args: Vec<Expr> },
    /// Binary operation: left op right
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation: `-expr` or `expr%`
    UnaryOp { op: String, operand: Box<Expr> },
}

/// A cell or range an expression reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precedent {
    Cell(CellRef),
    Range(CellRange),
}

impl Expr {
    /// Every cell and range the expression reads, in source order
    pub fn precedents(&self) -> Vec<Precedent> {
        let mut out = Vec::new();
        self.collect_precedents(&mut out);
        out
    }

    fn collect_precedents(&self, out: &mut Vec<Precedent>) {
        match self {
            Expr::Cell(cell) => out.push(Precedent::Cell(*cell)),
            Expr::Range(range) => out.push(Precedent::Range(*range)),
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_precedents(out);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.collect_precedents(out);
                right.collect_precedents(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_precedents(out),
            Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Name(_) => {}
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Deepest nesting of parentheses, function calls and prefix/power operators
pub const MAX_NESTING_DEPTH: usize = 64;

/// Deepest expression tree, counting each link of a left-associative chain
pub const MAX_EXPRESSION_DEPTH: usize = 1024;

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    nesting: usize,
    tree_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            nesting: 0,
            tree_depth: 0,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.tokens.get(self.position - 1)
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, op: &str) -> bool {
        if let Some(Token::Operator(s)) = self.peek() {
            if s == op {
                self.advance();
                return true;
            }
        }
        false
    }

    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    /// Run one recursive production one level deeper, failing past the limits
    fn nested(
        &mut self,
        production: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                format!("Formula nests deeper than {} levels", MAX_NESTING_DEPTH),
                self.position,
            ));
        }
        self.deepen()?;
        self.nesting += 1;
        let result = production(self);
        self.nesting -= 1;
        self.tree_depth -= 1;
        result
    }

    fn deepen(&mut self) -> Result<(), ParseError> {
        if self.tree_depth >= MAX_EXPRESSION_DEPTH {
            return Err(ParseError::new(
                format!("Formula is deeper than {} operations", MAX_EXPRESSION_DEPTH),
                self.position,
            ));
        }
        self.tree_depth += 1;
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::comparison)
    }

    fn binary_left_assoc(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        let mut links = 0;

        while let Some(op) = self.match_any_operator(ops) {
            self.deepen()?;
            links += 1;
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.tree_depth -= links;
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_left_assoc(&["=", "<>", "<", ">", "<=", ">="], Self::concat)
    }

    fn concat(&mut self) -> Result<Expr, ParseError> {
        self.binary_left_assoc(&["&"], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_left_assoc(&["+", "-"], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_left_assoc(&["*", "/"], Self::power)
    }

    /// Power: unary ( "^" power )?   (right-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let left = self.unary()?;

        if self.match_operator("^") {
            let right = self.nested(Self::power)?;
            Ok(Expr::BinaryOp {
                op: "^".to_string(),
                left: Box::new(left),
                right: Box::new(right),
            })
        } else {
            Ok(left)
        }
    }

    /// Unary: ( "-" | "+" ) unary | postfix
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_operator("-") {
            let operand = self.nested(Self::unary)?;
            Ok(Expr::UnaryOp {
                op: "-".to_string(),
                operand: Box::new(operand),
            })
        } else if self.match_operator("+") {
            self.nested(Self::unary)
        } else {
            self.postfix()
        }
    }

    /// Postfix: primary "%"*
    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        while self.match_token(&Token::Percent) {
            expr = Expr::UnaryOp {
                op: "%".to_string(),
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    /// Arguments: ( expr ( "," expr )* )?
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.expression()?);

        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }

        Ok(args)
    }

    /// Primary: NUMBER | STRING | IDENTIFIER [ "(" args ")" | ":" IDENTIFIER ] | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Text(s)) => {
                self.advance();
                Ok(Expr::Text(s))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                if self.match_token(&Token::OpenParen) {
                    let args = self.arguments()?;
                    if !self.match_token(&Token::CloseParen) {
                        return Err(ParseError::new(
                            "Expected ')' after function arguments",
                            self.position,
                        ));
                    }
                    return Ok(Expr::FunctionCall {
                        name: name.to_uppercase(),
                        args,
                    });
                }
                if self.match_token(&Token::Colon) {
                    return self.range(&name);
                }
                Ok(self.parse_identifier(name))
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }

    /// Second half of `START:END`; both ends must be cell references
    fn range(&mut self, start_name: &str) -> Result<Expr, ParseError> {
        let start = CellRef::parse(start_name).ok_or_else(|| {
            ParseError::new(
                format!("Invalid range start: {}", start_name),
                self.position,
            )
        })?;

        match self.advance().cloned() {
            Some(Token::Identifier(end_name)) => {
                let end = CellRef::parse(&end_name).ok_or_else(|| {
                    ParseError::new(format!("Invalid range end: {}", end_name), self.position)
                })?;
                Ok(Expr::Range(CellRange::new(start, end)))
            }
            _ => Err(ParseError::new("Expected cell reference after ':'", self.position)),
        }
    }

    /// Identifier: boolean literal, cell reference, or an unknown name
    fn parse_identifier(&self, name: String) -> Expr {
        match name.to_uppercase().as_str() {
            "TRUE" => return Expr::Boolean(true),
            "FALSE" => return Expr::Boolean(false),
            _ => {}
        }
        match CellRef::parse(&name) {
            Some(cell) => Expr::Cell(cell),
            None => Expr::Name(name),
        }
    }
}

/// Convenience function to parse tokens into an AST
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
