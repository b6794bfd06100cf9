#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Names, possibly prefixed (`ex:Assets`, `fn:count`). Keywords such as
    /// `and`, `div` and `if` are names too; the parser tells them apart.
    Name(String),
    /// `$name` or `$prefix:name`, without the dollar sign.
    Var(String),
    /// String literal with doubled quotes resolved
    Str(String),
    Int(i64),
    /// Decimal literal kept as text for exact conversion
    Decimal(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    /// Character offset of the token's first character.
    pub offset: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Read an NCName, optionally followed by `:NCName`.
fn read_qname(chars: &[char], mut pos: usize) -> (String, usize) {
    let start = pos;
    while pos < chars.len() && is_name_char(chars[pos]) {
        pos += 1;
    }
    if pos + 1 < chars.len() && chars[pos] == ':' && is_name_start(chars[pos + 1]) {
        pos += 1;
        while pos < chars.len() && is_name_char(chars[pos]) {
            pos += 1;
        }
    }
    (chars[start..pos].iter().collect(), pos)
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];

        // XPath comment: (: ... :)
        if c == '(' && pos + 1 < chars.len() && chars[pos + 1] == ':' {
            pos += 2;
            loop {
                if pos + 1 >= chars.len() {
                    return Err("unterminated comment".to_string());
                }
                if chars[pos] == ':' && chars[pos + 1] == ')' {
                    pos += 2;
                    break;
                }
                pos += 1;
            }
            continue;
        }

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let offset = pos;

        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(format!("unterminated string literal at offset {}", offset));
                }
                if chars[pos] == quote {
                    // A doubled quote is an escaped quote.
                    if pos + 1 < chars.len() && chars[pos + 1] == quote {
                        s.push(quote);
                        pos += 2;
                        continue;
                    }
                    pos += 1;
                    break;
                }
                s.push(chars[pos]);
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                offset,
            });
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || (c == '.' && pos + 1 < chars.len() && chars[pos + 1].is_ascii_digit());
        if starts_number {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            let mut is_decimal = false;
            if pos < chars.len() && chars[pos] == '.' {
                is_decimal = true;
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if pos < chars.len() && is_name_start(chars[pos]) {
                return Err(format!("malformed number at offset {}", start));
            }
            let text: String = chars[start..pos].iter().collect();
            let token = if is_decimal {
                Token::Decimal(text)
            } else {
                match text.parse::<i64>() {
                    Ok(n) => Token::Int(n),
                    Err(_) => Token::Decimal(text),
                }
            };
            tokens.push(Spanned { token, offset });
            continue;
        }

        if c == '$' {
            pos += 1;
            if pos >= chars.len() || !is_name_start(chars[pos]) {
                return Err(format!("expected variable name after '$' at offset {}", offset));
            }
            let (name, next) = read_qname(&chars, pos);
            pos = next;
            tokens.push(Spanned {
                token: Token::Var(name),
                offset,
            });
            continue;
        }

        if is_name_start(c) {
            let (name, next) = read_qname(&chars, pos);
            pos = next;
            tokens.push(Spanned {
                token: Token::Name(name),
                offset,
            });
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (token, width) = match (c, next) {
            ('!', Some('=')) => (Token::Neq, 2),
            ('<', Some('=')) => (Token::Lte, 2),
            ('>', Some('=')) => (Token::Gte, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('=', _) => (Token::Eq, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            _ => return Err(format!("unexpected character '{}' at offset {}", c, offset)),
        };
        pos += width;
        tokens.push(Spanned { token, offset });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: chars.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_variables_and_comparisons() {
        assert_eq!(
            kinds("$x >= 10.5"),
            vec![
                Token::Var("x".into()),
                Token::Gte,
                Token::Decimal("10.5".into()),
                Token::Eof
            ]
        );
        assert_eq!(
            kinds("$ca:strict"),
            vec![Token::Var("ca:strict".into()), Token::Eof]
        );
    }

    #[test]
    fn names_keep_hyphens_and_prefixes() {
        assert_eq!(
            kinds("fn:string-length('a''b')"),
            vec![
                Token::Name("fn:string-length".into()),
                Token::LParen,
                Token::Str("a'b".into()),
                Token::RParen,
                Token::Eof
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(kinds("(: note :) 1"), vec![Token::Int(1), Token::Eof]);
    }

    #[test]
    fn reports_unterminated_strings() {
        assert!(lex("'abc").is_err());
        assert!(lex("1 # 2").is_err());
    }
}
