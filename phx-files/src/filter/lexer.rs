//! Filter expression tokenizer

use super::{Comparison, FilterError, TextField};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    /// Bare word, lower-cased
    Word(String),
    /// Quoted literal, lower-cased, never a keyword
    Quoted(String),
    /// `name:` / `category:` restricted word
    Field(TextField, String),
    /// Comparison operator with its raw operand
    Compare(Comparison, String),
}

const UNITS: [&str; 4] = ["b", "kb", "mb", "gb"];

fn is_break(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Read up to the next whitespace or parenthesis
    fn word(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest.find(is_break).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    /// Next word without consuming it
    fn peek_word(&self) -> &'a str {
        let rest = self.rest().trim_start();
        let end = rest.find(is_break).unwrap_or(rest.len());
        &rest[..end]
    }

    fn quoted(&mut self, quote: char) -> Result<String, FilterError> {
        self.bump();
        let rest = self.rest();
        let end = rest.find(quote).ok_or(FilterError::UnterminatedQuote)?;
        self.pos += end + quote.len_utf8();
        Ok(rest[..end].to_lowercase())
    }

    fn operator(&mut self) -> Result<Comparison, FilterError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .unwrap_or(rest.len());
        self.pos += end;
        let op = &rest[..end];
        Comparison::from_symbol(op).ok_or_else(|| FilterError::InvalidComparison(op.to_string()))
    }

    /// Comparison operand, joining `10 mb` and `2024-01-02 03:04` style
    /// operands written with a space
    fn operand(&mut self) -> Result<String, FilterError> {
        self.skip_whitespace();
        let mut value = self.word().to_string();
        if value.is_empty() {
            return Err(FilterError::UnexpectedEnd);
        }

        let next = self.peek_word();
        let joins_unit = value.chars().all(|c| c.is_ascii_digit())
            && UNITS.contains(&next.to_ascii_lowercase().as_str());
        let joins_time = value.matches('-').count() == 2
            && next.starts_with(|c: char| c.is_ascii_digit())
            && next.chars().all(|c| c.is_ascii_digit() || c == ':');

        if joins_unit || joins_time {
            self.skip_whitespace();
            let sep = if joins_time { " " } else { "" };
            value = format!("{}{}{}", value, sep, self.word());
        }

        Ok(value.to_lowercase())
    }

    fn next_token(&mut self) -> Result<Option<Token>, FilterError> {
        self.skip_whitespace();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '(' => {
                self.bump();
                Token::LParen
            }
            ')' => {
                self.bump();
                Token::RParen
            }
            '"' | '\'' => Token::Quoted(self.quoted(c)?),
            '<' | '>' | '=' => {
                let op = self.operator()?;
                Token::Compare(op, self.operand()?)
            }
            _ => self.word_token()?,
        };

        Ok(Some(token))
    }

    fn word_token(&mut self) -> Result<Token, FilterError> {
        for (prefix, field) in [("name:", TextField::Name), ("category:", TextField::Category)] {
            let head = self.rest().get(..prefix.len());
            if head.is_some_and(|h| h.eq_ignore_ascii_case(prefix)) {
                self.pos += prefix.len();
                let value = match self.peek() {
                    Some(q @ ('"' | '\'')) => self.quoted(q)?,
                    _ => self.word().to_lowercase(),
                };
                if value.is_empty() {
                    return Err(FilterError::UnexpectedEnd);
                }
                return Ok(Token::Field(field, value));
            }
        }

        let lower = self.word().to_lowercase();
        Ok(match lower.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Word(lower),
        })
    }
}

/// Split an expression into tokens
pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, FilterError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn test_keywords_and_words() {
        let tokens = tokenize("Foo AND bar or NOT baz").unwrap();
        assert_eq!(
            tokens,
            vec![word("foo"), Token::And, word("bar"), Token::Or, Token::Not, word("baz")]
        );
    }

    #[test]
    fn test_attached_parens() {
        let tokens = tokenize("(foo or bar)").unwrap();
        assert_eq!(
            tokens,
            vec![Token::LParen, word("foo"), Token::Or, word("bar"), Token::RParen]
        );
    }

    #[test]
    fn test_quoted_keyword_is_literal() {
        let tokens = tokenize("\"And\" 'packet capture'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Quoted("and".to_string()),
                Token::Quoted("packet capture".to_string())
            ]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(tokenize("\"oops"), Err(FilterError::UnterminatedQuote));
    }

    #[test]
    fn test_comparisons() {
        let tokens = tokenize(">10mb <= 5 KB >=2024-01-02 03:04 =2024-01").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Compare(Comparison::Gt, "10mb".to_string()),
                Token::Compare(Comparison::Le, "5kb".to_string()),
                Token::Compare(Comparison::Ge, "2024-01-02 03:04".to_string()),
                Token::Compare(Comparison::Eq, "2024-01".to_string()),
            ]
        );
    }

    #[test]
    fn test_hour_only_time_joins_date() {
        let tokens = tokenize("=2024-01-02 03 foo").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Compare(Comparison::Eq, "2024-01-02 03".to_string()),
                word("foo"),
            ]
        );
    }

    #[test]
    fn test_bad_operator() {
        assert!(matches!(tokenize("=<5"), Err(FilterError::InvalidComparison(_))));
        assert_eq!(tokenize(">"), Err(FilterError::UnexpectedEnd));
    }

    #[test]
    fn test_field_qualifiers() {
        let tokens = tokenize("name:Foo category:\"VM Disk\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field(TextField::Name, "foo".to_string()),
                Token::Field(TextField::Category, "vm disk".to_string()),
            ]
        );
    }
}
