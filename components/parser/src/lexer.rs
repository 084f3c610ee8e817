//! Mudscript lexer - tokenizes source code into tokens.

use core_types::CompileError;

/// Mudscript keyword types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// var keyword
    Var,
    /// let keyword
    Let,
    /// const keyword
    Const,
    /// function keyword
    Function,
    /// class keyword
    Class,
    /// extends keyword
    Extends,
    /// super keyword
    Super,
    /// new keyword
    New,
    /// this keyword
    This,
    /// if keyword
    If,
    /// else keyword
    Else,
    /// while keyword
    While,
    /// do keyword
    Do,
    /// for keyword
    For,
    /// in keyword
    In,
    /// of keyword
    Of,
    /// break keyword
    Break,
    /// continue keyword
    Continue,
    /// return keyword
    Return,
    /// switch keyword
    Switch,
    /// case keyword
    Case,
    /// default keyword
    Default,
    /// try keyword
    Try,
    /// catch keyword
    Catch,
    /// finally keyword
    Finally,
    /// throw keyword
    Throw,
    /// typeof keyword
    Typeof,
    /// instanceof keyword
    Instanceof,
    /// delete keyword
    Delete,
    /// true literal
    True,
    /// false literal
    False,
    /// null literal
    Null,
    /// undefined literal
    Undefined,
    /// yield keyword
    Yield,
}

fn keyword_for(text: &str) -> Option<Keyword> {
    let kw = match text {
        "var" => Keyword::Var,
        "let" => Keyword::Let,
        "const" => Keyword::Const,
        "function" => Keyword::Function,
        "class" => Keyword::Class,
        "extends" => Keyword::Extends,
        "super" => Keyword::Super,
        "new" => Keyword::New,
        "this" => Keyword::This,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "do" => Keyword::Do,
        "for" => Keyword::For,
        "in" => Keyword::In,
        "of" => Keyword::Of,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "return" => Keyword::Return,
        "switch" => Keyword::Switch,
        "case" => Keyword::Case,
        "default" => Keyword::Default,
        "try" => Keyword::Try,
        "catch" => Keyword::Catch,
        "finally" => Keyword::Finally,
        "throw" => Keyword::Throw,
        "typeof" => Keyword::Typeof,
        "instanceof" => Keyword::Instanceof,
        "delete" => Keyword::Delete,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "null" => Keyword::Null,
        "undefined" => Keyword::Undefined,
        "yield" => Keyword::Yield,
        _ => return None,
    };
    Some(kw)
}

/// Operators and delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuator {
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// .
    Dot,
    /// :
    Colon,
    /// ?
    Question,
    /// =
    Assign,
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// **
    StarStar,
    /// ==
    EqEq,
    /// ===
    EqEqEq,
    /// !=
    NotEq,
    /// !==
    NotEqEq,
    /// <
    Lt,
    /// <=
    LtEq,
    /// >
    Gt,
    /// >=
    GtEq,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// ??
    NullishCoalesce,
    /// !
    Not,
    /// &
    And,
    /// |
    Or,
    /// ^
    Xor,
    /// ~
    Tilde,
    /// <<
    LtLt,
    /// >>
    GtGt,
    /// >>>
    GtGtGt,
    /// +=
    PlusEq,
    /// -=
    MinusEq,
    /// *=
    StarEq,
    /// /=
    SlashEq,
    /// %=
    PercentEq,
    /// **=
    StarStarEq,
    /// &=
    AndEq,
    /// |=
    OrEq,
    /// ^=
    XorEq,
    /// <<=
    LtLtEq,
    /// >>=
    GtGtEq,
    /// >>>=
    GtGtGtEq,
    /// &&=
    AndAndEq,
    /// ||=
    OrOrEq,
    /// ??=
    NullishEq,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,
}

/// One piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text between interpolations
    Text(String),
    /// The raw source of a `${...}` interpolation, parsed separately
    Expr(String),
}

/// Token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier (variable name, member name, ...)
    Identifier(String),
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Double(f64),
    /// String literal with escapes resolved
    String(String),
    /// Backtick template literal
    Template(Vec<TemplatePart>),
    /// Regex literal: pattern and flags
    Regex {
        /// The pattern between the slashes
        pattern: String,
        /// The trailing flags
        flags: String,
    },
    /// Keyword
    Keyword(Keyword),
    /// Operator or delimiter
    Punctuator(Punctuator),
    /// End of input
    Eof,
}

/// A token together with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    /// The token
    pub token: Token,
    /// 1-based line of the token's first character
    pub line: u32,
    /// 1-based column of the token's first character
    pub column: u32,
}

/// Lexer for Mudscript source code
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
    lookahead: Option<SpannedToken>,
    /// The previously produced token, used to decide whether a `/` starts
    /// a regex literal or a division operator
    previous: Option<Token>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            lookahead: None,
            previous: None,
        }
    }

    /// Get the next token from the source
    pub fn next_token(&mut self) -> Result<SpannedToken, CompileError> {
        let spanned = match self.lookahead.take() {
            Some(t) => t,
            None => self.scan_token()?,
        };
        self.previous = Some(spanned.token.clone());
        Ok(spanned)
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> Result<&SpannedToken, CompileError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.scan_token()?);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(self.line, self.column, message)
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_char_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.position + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.position).copied()?;
        self.position += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek_char() {
                            Some('*') if self.peek_char_at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                            None => return Err(self.error("unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// True when a `/` in this position begins a regex literal rather
    /// than a division operator: at the start of input, or after any
    /// token that cannot end an operand.
    fn regex_allowed(&self) -> bool {
        match &self.previous {
            None => true,
            Some(Token::Identifier(_))
            | Some(Token::Integer(_))
            | Some(Token::Double(_))
            | Some(Token::String(_))
            | Some(Token::Template(_))
            | Some(Token::Regex { .. }) => false,
            Some(Token::Keyword(k)) => !matches!(
                k,
                Keyword::This
                    | Keyword::True
                    | Keyword::False
                    | Keyword::Null
                    | Keyword::Undefined
                    | Keyword::Super
            ),
            Some(Token::Punctuator(p)) => !matches!(
                p,
                Punctuator::RParen
                    | Punctuator::RBracket
                    | Punctuator::RBrace
                    | Punctuator::PlusPlus
                    | Punctuator::MinusMinus
            ),
            Some(Token::Eof) => true,
        }
    }

    fn scan_token(&mut self) -> Result<SpannedToken, CompileError> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let column = self.column;
        let token = match self.peek_char() {
            None => Token::Eof,
            Some(c) if c.is_ascii_digit() => self.scan_number()?,
            Some(c) if is_identifier_start(c) => self.scan_identifier(),
            Some('"') | Some('\'') => self.scan_string()?,
            Some('`') => self.scan_template()?,
            Some('/') if self.regex_allowed() => self.scan_regex()?,
            Some(_) => self.scan_punctuator()?,
        };
        Ok(SpannedToken {
            token,
            line,
            column,
        })
    }

    fn scan_identifier(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if is_identifier_part(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match keyword_for(&text) {
            Some(kw) => Token::Keyword(kw),
            None => Token::Identifier(text),
        }
    }

    fn scan_number(&mut self) -> Result<Token, CompileError> {
        if self.peek_char() == Some('0') {
            match self.peek_char_at(1) {
                Some('x') | Some('X') => return self.scan_radix_number(16),
                Some('b') | Some('B') => return self.scan_radix_number(2),
                Some('o') | Some('O') => return self.scan_radix_number(8),
                _ => {}
            }
        }

        let mut text = String::new();
        let mut is_double = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.')
            && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit())
        {
            is_double = true;
            text.push('.');
            self.advance();
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            is_double = true;
            text.push('e');
            self.advance();
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                text.push(self.advance().unwrap());
            }
            if !self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                return Err(self.error("missing exponent digits"));
            }
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if is_double {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("bad number literal '{}'", text)))?;
            Ok(Token::Double(value))
        } else {
            // Decimal integers too large for i64 fall back to double
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                Err(_) => {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| self.error(format!("bad number literal '{}'", text)))?;
                    Ok(Token::Double(value))
                }
            }
        }
    }

    fn scan_radix_number(&mut self, radix: u32) -> Result<Token, CompileError> {
        self.advance(); // 0
        self.advance(); // x / b / o
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_digit(radix) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if text.is_empty() {
            return Err(self.error("missing digits in number literal"));
        }
        let value = i64::from_str_radix(&text, radix)
            .map_err(|_| self.error(format!("number literal '{}' out of range", text)))?;
        Ok(Token::Integer(value))
    }

    fn scan_escape(&mut self) -> Result<char, CompileError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('`') => Ok('`'),
            Some('$') => Ok('$'),
            Some('u') => {
                if !self.matches('{') {
                    return Err(self.error("expected '{' in unicode escape"));
                }
                let mut hex = String::new();
                while let Some(c) = self.peek_char() {
                    if c == '}' {
                        break;
                    }
                    hex.push(c);
                    self.advance();
                }
                if !self.matches('}') {
                    return Err(self.error("unterminated unicode escape"));
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| self.error("bad unicode escape"))?;
                char::from_u32(code).ok_or_else(|| self.error("bad unicode code point"))
            }
            Some(other) => Ok(other),
            None => Err(self.error("unterminated escape sequence")),
        }
    }

    fn scan_string(&mut self) -> Result<Token, CompileError> {
        let quote = self.advance().unwrap();
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated string literal")),
                Some('\n') => return Err(self.error("newline in string literal")),
                Some('\\') => text.push(self.scan_escape()?),
                Some(c) if c == quote => break,
                Some(c) => text.push(c),
            }
        }
        Ok(Token::String(text))
    }

    fn scan_template(&mut self) -> Result<Token, CompileError> {
        self.advance(); // `
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated template literal")),
                Some('`') => break,
                Some('\\') => text.push(self.scan_escape()?),
                Some('$') if self.peek_char() == Some('{') => {
                    self.advance(); // {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let mut depth = 1;
                    let mut expr = String::new();
                    loop {
                        match self.advance() {
                            None => return Err(self.error("unterminated template interpolation")),
                            Some('{') => {
                                depth += 1;
                                expr.push('{');
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                expr.push('}');
                            }
                            Some(c) => expr.push(c),
                        }
                    }
                    parts.push(TemplatePart::Expr(expr));
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(Token::Template(parts))
    }

    fn scan_regex(&mut self) -> Result<Token, CompileError> {
        self.advance(); // /
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated regex literal")),
                Some('\n') => return Err(self.error("newline in regex literal")),
                Some('\\') => {
                    pattern.push('\\');
                    match self.advance() {
                        Some(c) => pattern.push(c),
                        None => return Err(self.error("unterminated regex literal")),
                    }
                }
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('/') if !in_class => break,
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphabetic() {
                flags.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Ok(Token::Regex { pattern, flags })
    }

    fn scan_punctuator(&mut self) -> Result<Token, CompileError> {
        use Punctuator::*;
        let c = self.advance().unwrap();
        let p = match c {
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ';' => Semicolon,
            ',' => Comma,
            '.' => Dot,
            ':' => Colon,
            '~' => Tilde,
            '?' => {
                if self.matches('?') {
                    if self.matches('=') {
                        NullishEq
                    } else {
                        NullishCoalesce
                    }
                } else {
                    Question
                }
            }
            '=' => {
                if self.matches('=') {
                    if self.matches('=') {
                        EqEqEq
                    } else {
                        EqEq
                    }
                } else {
                    Assign
                }
            }
            '!' => {
                if self.matches('=') {
                    if self.matches('=') {
                        NotEqEq
                    } else {
                        NotEq
                    }
                } else {
                    Not
                }
            }
            '+' => {
                if self.matches('+') {
                    PlusPlus
                } else if self.matches('=') {
                    PlusEq
                } else {
                    Plus
                }
            }
            '-' => {
                if self.matches('-') {
                    MinusMinus
                } else if self.matches('=') {
                    MinusEq
                } else {
                    Minus
                }
            }
            '*' => {
                if self.matches('*') {
                    if self.matches('=') {
                        StarStarEq
                    } else {
                        StarStar
                    }
                } else if self.matches('=') {
                    StarEq
                } else {
                    Star
                }
            }
            '/' => {
                if self.matches('=') {
                    SlashEq
                } else {
                    Slash
                }
            }
            '%' => {
                if self.matches('=') {
                    PercentEq
                } else {
                    Percent
                }
            }
            '<' => {
                if self.matches('<') {
                    if self.matches('=') {
                        LtLtEq
                    } else {
                        LtLt
                    }
                } else if self.matches('=') {
                    LtEq
                } else {
                    Lt
                }
            }
            '>' => {
                if self.matches('>') {
                    if self.matches('>') {
                        if self.matches('=') {
                            GtGtGtEq
                        } else {
                            GtGtGt
                        }
                    } else if self.matches('=') {
                        GtGtEq
                    } else {
                        GtGt
                    }
                } else if self.matches('=') {
                    GtEq
                } else {
                    Gt
                }
            }
            '&' => {
                if self.matches('&') {
                    if self.matches('=') {
                        AndAndEq
                    } else {
                        AndAnd
                    }
                } else if self.matches('=') {
                    AndEq
                } else {
                    And
                }
            }
            '|' => {
                if self.matches('|') {
                    if self.matches('=') {
                        OrOrEq
                    } else {
                        OrOr
                    }
                } else if self.matches('=') {
                    OrEq
                } else {
                    Or
                }
            }
            '^' => {
                if self.matches('=') {
                    XorEq
                } else {
                    Xor
                }
            }
            other => {
                return Err(self.error(format!("unexpected character '{}'", other)));
            }
        };
        Ok(Token::Punctuator(p))
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let t = lexer.next_token().unwrap().token;
            if t == Token::Eof {
                break;
            }
            tokens.push(t);
        }
        tokens
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = all_tokens("let x = undefined;");
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Let),
                Token::Identifier("x".to_string()),
                Token::Punctuator(Punctuator::Assign),
                Token::Keyword(Keyword::Undefined),
                Token::Punctuator(Punctuator::Semicolon),
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(all_tokens("42"), vec![Token::Integer(42)]);
        assert_eq!(all_tokens("3.25"), vec![Token::Double(3.25)]);
        assert_eq!(all_tokens("1e3"), vec![Token::Double(1000.0)]);
        assert_eq!(all_tokens("0xff"), vec![Token::Integer(255)]);
        assert_eq!(all_tokens("0b101"), vec![Token::Integer(5)]);
        assert_eq!(all_tokens("0o17"), vec![Token::Integer(15)]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            all_tokens(r#""a\nb\u{41}""#),
            vec![Token::String("a\nbA".to_string())]
        );
        assert_eq!(all_tokens("'it\\'s'"), vec![Token::String("it's".to_string())]);
    }

    #[test]
    fn test_template_literal_parts() {
        let tokens = all_tokens("`a${x + 1}b`");
        assert_eq!(
            tokens,
            vec![Token::Template(vec![
                TemplatePart::Text("a".to_string()),
                TemplatePart::Expr("x + 1".to_string()),
                TemplatePart::Text("b".to_string()),
            ])]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = all_tokens("a / b");
        assert_eq!(tokens[1], Token::Punctuator(Punctuator::Slash));

        let tokens = all_tokens("x = /ab+c/gi;");
        assert_eq!(
            tokens[2],
            Token::Regex {
                pattern: "ab+c".to_string(),
                flags: "gi".to_string(),
            }
        );
    }

    #[test]
    fn test_regex_with_class_and_escape() {
        let tokens = all_tokens(r"= /[a/]\/x/");
        assert_eq!(
            tokens[1],
            Token::Regex {
                pattern: r"[a/]\/x".to_string(),
                flags: String::new(),
            }
        );
    }

    #[test]
    fn test_multichar_operators() {
        let tokens = all_tokens(">>>= **= ??= ===");
        assert_eq!(
            tokens,
            vec![
                Token::Punctuator(Punctuator::GtGtGtEq),
                Token::Punctuator(Punctuator::StarStarEq),
                Token::Punctuator(Punctuator::NullishEq),
                Token::Punctuator(Punctuator::EqEqEq),
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = all_tokens("1 // line\n/* block\n*/ 2");
        assert_eq!(tokens, vec![Token::Integer(1), Token::Integer(2)]);
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("a\n  bb");
        let a = lexer.next_token().unwrap();
        assert_eq!((a.line, a.column), (1, 1));
        let b = lexer.next_token().unwrap();
        assert_eq!((b.line, b.column), (2, 3));
    }

    #[test]
    fn test_unterminated_string_errors() {
        let mut lexer = Lexer::new("\"abc");
        assert!(lexer.next_token().is_err());
    }
}
