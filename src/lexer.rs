use crate::{
    error::BadError,
    source_location::{LineIndex, Position},
    token::{Token, TokenKind},
    Result,
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric0, char, digit1, multispace1, not_line_ending},
    combinator::{opt, recognize, value},
    sequence::pair,
    IResult,
};

/// Token stream over one source text with a single token of lookahead.
pub struct Lexer<'a> {
    input: &'a str,
    offset: usize,
    lines: LineIndex,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            input: source,
            offset: 0,
            lines: LineIndex::new(source),
            peeked: None,
        }
    }

    pub fn peek(&mut self) -> Result<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.scan()?,
        };
        Ok(self.peeked.insert(token))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.scan(),
        }
    }

    /// Drains the whole input. The last token is always `EOF`.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::EOF;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn position(&self) -> Position {
        self.lines.position(self.offset)
    }

    fn scan(&mut self) -> Result<Token> {
        self.skip_trivia();
        let position = self.position();

        if self.input.is_empty() {
            return Ok(Token::new(TokenKind::EOF, position));
        }

        // "-" directly followed by a digit is a negative literal, not minus
        if let Ok((remaining, text)) = number(self.input) {
            let parsed = text.parse::<i64>().map_err(|_| {
                BadError::lexer_error(
                    position,
                    format!("Integer literal {} does not fit in 64 bits", text),
                )
            })?;
            self.advance(remaining);
            return Ok(Token::new(TokenKind::Int(parsed), position));
        }

        if let Ok((remaining, text)) = word(self.input) {
            self.advance(remaining);
            return Ok(Token::new(TokenKind::from_word(text), position));
        }

        if self.input.starts_with('\'') {
            return self.char_literal(position);
        }

        if self.input.starts_with('"') {
            return self.string_literal(position);
        }

        if let Ok((remaining, kind)) = operator(self.input) {
            self.advance(remaining);
            return Ok(Token::new(kind, position));
        }

        match self.input.chars().next() {
            Some(ch) => Err(BadError::lexer_error(
                position,
                format!("Unexpected character: {}", ch),
            )),
            None => Ok(Token::new(TokenKind::EOF, position)),
        }
    }

    fn char_literal(&mut self, position: Position) -> Result<Token> {
        let input: &'a str = self.input;
        let body = &input[1..];
        if body.starts_with('\'') {
            return Err(BadError::lexer_error(position, "Empty character literal"));
        }

        let (ch, rest) = match literal_char(body, position)? {
            Some(found) => found,
            None => {
                return Err(BadError::lexer_error(
                    position,
                    "Unterminated character literal",
                ))
            }
        };
        if !ch.is_ascii() {
            return Err(BadError::lexer_error(
                position,
                format!("Character literal '{}' is not a single byte", ch),
            ));
        }
        if !rest.starts_with('\'') {
            return Err(BadError::lexer_error(position, "Expected closing quote"));
        }

        self.advance(&rest[1..]);
        Ok(Token::new(TokenKind::Char(ch as u8), position))
    }

    fn string_literal(&mut self, position: Position) -> Result<Token> {
        let input: &'a str = self.input;
        let mut rest = &input[1..];
        let mut bytes = Vec::new();
        let mut buf = [0u8; 4];

        loop {
            if rest.starts_with('"') {
                break;
            }
            match literal_char(rest, position)? {
                Some((ch, remaining)) => {
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    rest = remaining;
                }
                None => {
                    return Err(BadError::lexer_error(
                        position,
                        "Unterminated string literal",
                    ))
                }
            }
        }

        self.advance(&rest[1..]);
        Ok(Token::new(TokenKind::Str(bytes), position))
    }

    fn skip_trivia(&mut self) {
        while let Ok((remaining, _)) = trivia(self.input) {
            self.advance(remaining);
        }
    }

    fn advance(&mut self, remaining: &'a str) {
        let consumed = self.input.len() - remaining.len();
        self.offset += consumed;
        self.input = remaining;
    }
}

/// One character of a char or string literal body with escapes resolved.
/// `None` means the input ended first.
fn literal_char(input: &str, position: Position) -> Result<Option<(char, &str)>> {
    let mut chars = input.chars();
    match chars.next() {
        None => Ok(None),
        Some('\\') => {
            let escaped = match chars.next() {
                Some(c) => c,
                None => return Ok(None),
            };
            let resolved = match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\'' => '\'',
                '"' => '"',
                '\\' => '\\',
                other => {
                    return Err(BadError::lexer_error(
                        position,
                        format!("Invalid escape sequence: \\{}", other),
                    ))
                }
            };
            Ok(Some((resolved, chars.as_str())))
        }
        Some(c) => Ok(Some((c, chars.as_str()))),
    }
}

fn trivia(input: &str) -> IResult<&str, &str> {
    alt((multispace1, recognize(pair(tag("//"), not_line_ending))))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1))(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(alpha1, alphanumeric0))(input)
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Ellipsis, tag("...")),
        value(TokenKind::LessEqual, tag("<=")),
        value(TokenKind::GreaterEqual, tag(">=")),
        value(TokenKind::EqualEqual, tag("==")),
        value(TokenKind::BangEqual, tag("!=")),
        value(TokenKind::AndAnd, tag("&&")),
        value(TokenKind::OrOr, tag("||")),
        value(TokenKind::LeftParen, tag("(")),
        value(TokenKind::RightParen, tag(")")),
        value(TokenKind::Plus, tag("+")),
        value(TokenKind::Minus, tag("-")),
        value(TokenKind::Star, tag("*")),
        value(TokenKind::Slash, tag("/")),
        value(TokenKind::Less, tag("<")),
        value(TokenKind::Greater, tag(">")),
        value(TokenKind::Bang, tag("!")),
        value(TokenKind::Ampersand, tag("&")),
        value(TokenKind::At, tag("@")),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Primitive;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_function_header() {
        assert_eq!(
            kinds("(func main () int (return 0))"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Func,
                TokenKind::Identifier("main".to_string()),
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::Type(Primitive::Int64),
                TokenKind::LeftParen,
                TokenKind::Return,
                TokenKind::Int(0),
                TokenKind::RightParen,
                TokenKind::RightParen,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_negative_literal_versus_minus() {
        assert_eq!(
            kinds("(- -5 x)"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Minus,
                TokenKind::Int(-5),
                TokenKind::Identifier("x".to_string()),
                TokenKind::RightParen,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_multi_char_operators() {
        assert_eq!(
            kinds("<= >= == != && || ... < !"),
            vec![
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Ellipsis,
                TokenKind::Less,
                TokenKind::Bang,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_literals_and_escapes() {
        assert_eq!(
            kinds(r#"'a' '\n' "hi\t\"x\"" true null"#),
            vec![
                TokenKind::Char(b'a'),
                TokenKind::Char(b'\n'),
                TokenKind::Str(b"hi\t\"x\"".to_vec()),
                TokenKind::Bool(true),
                TokenKind::Null,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// header\n(block) // trailing"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Block,
                TokenKind::RightParen,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("x y");
        assert_eq!(
            lexer.peek().unwrap().kind,
            TokenKind::Identifier("x".to_string())
        );
        assert_eq!(
            lexer.next_token().unwrap().kind,
            TokenKind::Identifier("x".to_string())
        );
        assert_eq!(
            lexer.next_token().unwrap().kind,
            TokenKind::Identifier("y".to_string())
        );
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::EOF);
    }

    #[test]
    fn test_token_positions() {
        let tokens = Lexer::new("(block\n  x)").tokenize().unwrap();
        assert_eq!(tokens[0].position, Position::new(1, 1));
        assert_eq!(tokens[1].position, Position::new(1, 2));
        assert_eq!(tokens[2].position, Position::new(2, 3));
    }

    #[test]
    fn test_lexical_errors() {
        for source in [r"'\q'", "\"open", "'ab'", "#", "99999999999999999999", "''"] {
            let err = Lexer::new(source).tokenize().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::LexerError, "{}", source);
        }
    }
}
