//! Recursive-descent parser: `not` binds tighter than `and`, which binds
//! tighter than `or`. Adjacent operands are joined with an implicit `and`.

use super::lexer::Token;
use super::{FilterError, FilterNode, Term, TextField};

/// Deepest run of nested parentheses and `not`s accepted
const MAX_DEPTH: usize = 256;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse the whole token stream into one tree
    pub(crate) fn parse(mut self) -> Result<FilterNode, FilterError> {
        if self.tokens.is_empty() {
            return Err(FilterError::Empty);
        }

        let node = self.or_expr()?;
        match self.peek() {
            None => Ok(node),
            Some(Token::RParen) => Err(FilterError::UnbalancedParen),
            Some(token) => Err(FilterError::UnexpectedToken(format!("{:?}", token))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), FilterError> {
        if self.depth >= MAX_DEPTH {
            return Err(FilterError::TooDeep);
        }
        self.depth += 1;
        Ok(())
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Not
                    | Token::LParen
                    | Token::Word(_)
                    | Token::Quoted(_)
                    | Token::Field(..)
                    | Token::Compare(..)
            )
        )
    }

    fn or_expr(&mut self) -> Result<FilterNode, FilterError> {
        let mut nodes = vec![self.and_expr()?];
        while self.eat(&Token::Or) {
            nodes.push(self.and_expr()?);
        }
        Ok(collapse(nodes, FilterNode::Or))
    }

    fn and_expr(&mut self) -> Result<FilterNode, FilterError> {
        let mut nodes = vec![self.unary()?];
        loop {
            if self.eat(&Token::And) || self.starts_operand() {
                nodes.push(self.unary()?);
            } else {
                break;
            }
        }
        Ok(collapse(nodes, FilterNode::And))
    }

    fn unary(&mut self) -> Result<FilterNode, FilterError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let node = self.unary()?;
            self.depth -= 1;
            return Ok(FilterNode::Not(Box::new(node)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<FilterNode, FilterError> {
        match self.next() {
            Some(Token::LParen) => {
                self.descend()?;
                let node = self.or_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(FilterError::UnbalancedParen);
                }
                self.depth -= 1;
                Ok(node)
            }
            Some(Token::Word(value)) | Some(Token::Quoted(value)) => {
                Ok(FilterNode::Term(Term::Text {
                    field: TextField::Any,
                    value,
                }))
            }
            Some(Token::Field(field, value)) => Ok(FilterNode::Term(Term::Text { field, value })),
            Some(Token::Compare(op, operand)) => {
                Ok(FilterNode::Term(Term::comparison(op, &operand)?))
            }
            Some(Token::RParen) => Err(FilterError::UnbalancedParen),
            Some(token) => Err(FilterError::UnexpectedToken(format!("{:?}", token))),
            None => Err(FilterError::UnexpectedEnd),
        }
    }
}

fn collapse(mut nodes: Vec<FilterNode>, combine: fn(Vec<FilterNode>) -> FilterNode) -> FilterNode {
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        combine(nodes)
    }
}
