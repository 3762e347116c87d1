//! Tokenizer for placeholder expressions.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Bare identifier: function name, keyword literal or plain context key.
    Ident(String),
    /// `$`-prefixed root selector such as `$vars`.
    Var(String),
    /// Path segment following a `.`; may contain `-` and leading digits.
    Segment(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    And,
    Or,
    Bang,
}

impl Token {
    /// Tokens after which a `.` starts a path segment rather than a number.
    fn ends_path(&self) -> bool {
        matches!(
            self,
            Token::Ident(_) | Token::Var(_) | Token::Segment(_) | Token::RParen | Token::RBracket
        )
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '.' && tokens.last().is_some_and(Token::ends_path) {
            tokens.push(Token::Dot);
            i += 1;
            let start = i;
            while i < chars.len() && is_segment_char(&chars, i) {
                i += 1;
            }
            if start == i {
                return Err(format!("expected path segment after '.' at {}", start));
            }
            tokens.push(Token::Segment(chars[start..i].iter().collect()));
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            let mut seen_dot = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || (chars[i] == '.' && !seen_dot)) {
                if chars[i] == '.' {
                    // `1.foo` is not a number followed by a member access
                    if !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
                        break;
                    }
                    seen_dot = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let token = if seen_dot {
                Token::Float(text.parse().map_err(|_| format!("bad number '{}'", text))?)
            } else {
                match text.parse::<i64>() {
                    Ok(n) => Token::Int(n),
                    Err(_) => Token::Float(text.parse().map_err(|_| format!("bad number '{}'", text))?),
                }
            };
            tokens.push(token);
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }

        if c == '$' || c.is_alphabetic() || c == '_' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if c == '$' {
                if text.len() == 1 {
                    return Err(format!("dangling '$' at {}", start));
                }
                tokens.push(Token::Var(text));
            } else {
                tokens.push(Token::Ident(text));
            }
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', _) => (Token::Assign, 1),
            ('!', _) => (Token::Bang, 1),
            ('>', _) => (Token::Gt, 1),
            ('<', _) => (Token::Lt, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            _ => return Err(format!("unexpected character '{}' at {}", c, i)),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// `-` only joins a segment when another word character follows it.
fn is_segment_char(chars: &[char], i: usize) -> bool {
    let c = chars[i];
    if c.is_alphanumeric() || c == '_' {
        return true;
    }
    c == '-' && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric() || *n == '_')
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(format!("unterminated string starting at {}", start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_allow_hyphens_and_digits() {
        let tokens = tokenize("$nodes.node-1.items.0").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Var("$nodes".into()),
                Token::Dot,
                Token::Segment("node-1".into()),
                Token::Dot,
                Token::Segment("items".into()),
                Token::Dot,
                Token::Segment("0".into()),
            ]
        );
    }

    #[test]
    fn spaced_minus_is_an_operator() {
        let tokens = tokenize("$vars.a - 1").unwrap();
        assert_eq!(tokens[3], Token::Minus);
        assert_eq!(tokens[4], Token::Int(1));
    }

    #[test]
    fn trailing_hyphen_is_not_part_of_segment() {
        let tokens = tokenize("$prev.x-$prev.y").unwrap();
        assert_eq!(tokens[2], Token::Segment("x".into()));
        assert_eq!(tokens[3], Token::Minus);
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(
            tokenize("3.5 'it\\'s' \"a\"").unwrap(),
            vec![Token::Float(3.5), Token::Str("it's".into()), Token::Str("a".into())]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            tokenize("a >= 1 && b != 2 || !c").unwrap(),
            vec![
                Token::Ident("a".into()),
                Token::GtEq,
                Token::Int(1),
                Token::And,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Int(2),
                Token::Or,
                Token::Bang,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("'abc").is_err());
    }
}
