/// A compiled KEYS pattern.
///
/// Supports `*` (any run), `?` (any single byte), `[abc]`, `[^abc]`, `[a-z]`
/// and `\` escapes. A `[` without a closing `]` matches itself literally.
#[derive(Debug, Clone)]
pub struct Pattern {
    tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Any,
    AnyByte,
    Byte(u8),
    Class { negate: bool, ranges: Vec<(u8, u8)> },
}

impl Token {
    fn accepts(&self, b: u8) -> bool {
        match self {
            Token::Any | Token::AnyByte => true,
            Token::Byte(c) => *c == b,
            Token::Class { negate, ranges } => {
                ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&b)) != *negate
            }
        }
    }
}

impl Pattern {
    pub fn compile(pattern: &[u8]) -> Self {
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < pattern.len() {
            match pattern[i] {
                b'*' => {
                    if tokens.last() != Some(&Token::Any) {
                        tokens.push(Token::Any);
                    }
                    i += 1;
                }
                b'?' => {
                    tokens.push(Token::AnyByte);
                    i += 1;
                }
                b'\\' if i + 1 < pattern.len() => {
                    tokens.push(Token::Byte(pattern[i + 1]));
                    i += 2;
                }
                b'[' => match compile_class(&pattern[i..]) {
                    Some((token, used)) => {
                        tokens.push(token);
                        i += used;
                    }
                    None => {
                        tokens.push(Token::Byte(b'['));
                        i += 1;
                    }
                },
                c => {
                    tokens.push(Token::Byte(c));
                    i += 1;
                }
            }
        }
        Pattern { tokens }
    }

    pub fn matches(&self, input: &[u8]) -> bool {
        let (mut ti, mut si) = (0, 0);
        // Position of the last `*` and the input index it was tried at.
        let mut backtrack: Option<(usize, usize)> = None;

        while si < input.len() {
            match self.tokens.get(ti) {
                Some(Token::Any) => {
                    backtrack = Some((ti, si));
                    ti += 1;
                    continue;
                }
                Some(token) if token.accepts(input[si]) => {
                    ti += 1;
                    si += 1;
                    continue;
                }
                _ => {}
            }
            match backtrack {
                Some((star, from)) => {
                    ti = star + 1;
                    si = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            }
        }

        self.tokens[ti..].iter().all(|t| *t == Token::Any)
    }
}

fn compile_class(pattern: &[u8]) -> Option<(Token, usize)> {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut ranges = Vec::new();
    while i < pattern.len() && pattern[i] != b']' {
        let mut lo = pattern[i];
        if lo == b'\\' && i + 1 < pattern.len() {
            i += 1;
            lo = pattern[i];
        }
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let hi = pattern[i + 2];
            ranges.push((lo.min(hi), lo.max(hi)));
            i += 3;
        } else {
            ranges.push((lo, lo));
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    Some((Token::Class { negate, ranges }, i + 1))
}
