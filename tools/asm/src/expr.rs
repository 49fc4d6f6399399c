use crate::{error::SymbolKind, AsmError, Labels, Pos, WORD_MASK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

// two-char operators first so `<<` never lexes as `<`
const BINOPS: &[(&str, BinOp)] = &[
    ("<<", BinOp::Shl),
    (">>", BinOp::Shr),
    ("==", BinOp::Eq),
    ("!=", BinOp::Ne),
    ("<=", BinOp::Le),
    (">=", BinOp::Ge),
    ("+", BinOp::Add),
    ("-", BinOp::Sub),
    ("*", BinOp::Mul),
    ("/", BinOp::Div),
    ("%", BinOp::Rem),
    ("&", BinOp::And),
    ("|", BinOp::Or),
    ("^", BinOp::Xor),
    ("<", BinOp::Lt),
    (">", BinOp::Gt),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'s> {
    Prim(&'s str),
    BinOp(BinOp),
    Open,
    Close,
    Colon,
    End,
}

fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn truth(b: bool) -> u32 {
    if b {
        1
    } else {
        0
    }
}

/// Recursive-descent evaluator over one expression string.
///
/// Tokens are lexed on demand from `cursor`; `tok` is always the next unread
/// token.
struct Evaluator<'e> {
    labels: &'e Labels,
    pos: &'e Pos,
    text: &'e str,
    cursor: usize,
    tok: Tok<'e>,
}

impl<'e> Evaluator<'e> {
    fn fail(&self) -> AsmError {
        AsmError::Syntax {
            pos: self.pos.clone(),
            msg: format!(
                "cannot parse expression {:?}: unparsed remainder is {:?}",
                self.text,
                &self.text[self.cursor..]
            ),
        }
    }

    fn next(&mut self) -> Result<(), AsmError> {
        let text = self.text;
        let bytes = text.as_bytes();
        while self.cursor < bytes.len() && bytes[self.cursor].is_ascii_whitespace() {
            self.cursor += 1;
        }
        let start = self.cursor;
        let Some(&c) = bytes.get(start) else {
            self.tok = Tok::End;
            return Ok(());
        };
        self.tok = match c {
            b'(' => Tok::Open,
            b')' => Tok::Close,
            b':' => Tok::Colon,
            b'\'' => {
                let quoted = text[start + 1..].chars().next();
                let close = quoted.map(|q| start + 1 + q.len_utf8());
                match close {
                    Some(close) if bytes.get(close) == Some(&b'\'') => {
                        self.cursor = close + 1;
                        self.tok = Tok::Prim(&text[start..self.cursor]);
                        return Ok(());
                    }
                    _ => return Err(self.fail()),
                }
            }
            c if c == b'$' || is_word(c) => {
                let mut end = start + 1;
                while end < bytes.len() && is_word(bytes[end]) {
                    end += 1;
                }
                if c == b'$' && end == start + 1 {
                    return Err(self.fail());
                }
                self.cursor = end;
                self.tok = Tok::Prim(&text[start..end]);
                return Ok(());
            }
            _ => {
                let rest = &text[start..];
                let Some((s, op)) = BINOPS.iter().find(|(s, _)| rest.starts_with(s)) else {
                    return Err(self.fail());
                };
                self.cursor += s.len();
                self.tok = Tok::BinOp(*op);
                return Ok(());
            }
        };
        self.cursor += 1;
        Ok(())
    }

    fn number(&self, digits: &str, radix: u32, base: &str) -> Result<u32, AsmError> {
        u64::from_str_radix(digits, radix)
            .map(|value| (value & (WORD_MASK as u64)) as u32)
            .map_err(|e| AsmError::Syntax {
                pos: self.pos.clone(),
                msg: format!("cannot parse {digits:?} as {base} int: {e}"),
            })
    }

    fn call(&mut self, name: &str) -> Result<u32, AsmError> {
        // skip the `(`
        self.next()?;
        let mut args = vec![self.expr()?];
        while self.tok == Tok::Colon {
            self.next()?;
            args.push(self.expr()?);
        }
        if self.tok != Tok::Close {
            return Err(self.fail());
        }
        self.next()?;

        let arity = |expected: usize| {
            if args.len() != expected {
                return Err(AsmError::Arity {
                    pos: self.pos.clone(),
                    name: format!("{name}()"),
                    expected,
                    got: args.len(),
                });
            }
            Ok(())
        };
        let value = match name.to_ascii_lowercase().as_str() {
            "b" => {
                arity(1)?;
                0xFF & (args[0] >> 16)
            }
            "h" => {
                arity(1)?;
                0xFF & (args[0] >> 8)
            }
            "l" => {
                arity(1)?;
                0xFF & args[0]
            }
            "hl" => {
                arity(1)?;
                0xFFFF & args[0]
            }
            "w" => {
                arity(3)?;
                ((0xFF & args[0]) << 16) | ((0xFF & args[1]) << 8) | (0xFF & args[2])
            }
            _ => {
                return Err(AsmError::UnknownSymbol {
                    pos: self.pos.clone(),
                    kind: SymbolKind::Function,
                    name: name.to_string(),
                })
            }
        };
        Ok(value)
    }

    fn prim(&mut self, s: &'e str) -> Result<u32, AsmError> {
        self.next()?;
        let value = if let Some(digits) = s.strip_prefix('$') {
            self.number(digits, 16, "hex")?
        } else if let Some(digits) = s.strip_prefix("0x") {
            self.number(digits, 16, "hex")?
        } else if let Some(digits) = s.strip_prefix("0o") {
            self.number(digits, 8, "octal")?
        } else if let Some(digits) = s.strip_prefix("0b") {
            self.number(digits, 2, "binary")?
        } else if s.starts_with('0') {
            self.number(s, 8, "octal")?
        } else if s.as_bytes()[0].is_ascii_digit() {
            self.number(s, 10, "decimal")?
        } else if s.starts_with('\'') {
            // first byte only, even for a multi-byte char
            s.as_bytes()[1] as u32
        } else if self.tok == Tok::Open {
            self.call(s)?
        } else {
            match self.labels.get(s) {
                Some(label) => label.addr.ok_or_else(|| AsmError::Unresolved {
                    pos: self.pos.clone(),
                    name: s.to_string(),
                })?,
                None => {
                    return Err(AsmError::UnknownSymbol {
                        pos: self.pos.clone(),
                        kind: SymbolKind::Label,
                        name: s.to_string(),
                    })
                }
            }
        };
        Ok(value & WORD_MASK)
    }

    fn group(&mut self) -> Result<u32, AsmError> {
        self.next()?;
        let value = self.expr()?;
        if self.tok != Tok::Close {
            return Err(self.fail());
        }
        self.next()?;
        Ok(value)
    }

    fn operand(&mut self) -> Result<u32, AsmError> {
        match self.tok {
            Tok::Open => self.group(),
            Tok::Prim(s) => self.prim(s),
            _ => Err(self.fail()),
        }
    }

    fn apply(&self, op: BinOp, x: u32, y: u32) -> Result<u32, AsmError> {
        let value = match op {
            BinOp::Add => x.wrapping_add(y),
            BinOp::Sub => x.wrapping_sub(y),
            BinOp::Mul => x.wrapping_mul(y),
            BinOp::Div | BinOp::Rem if y == 0 => {
                return Err(AsmError::Arithmetic {
                    pos: self.pos.clone(),
                    msg: "division by zero",
                })
            }
            BinOp::Div => x / y,
            BinOp::Rem => x % y,
            BinOp::And => x & y,
            BinOp::Or => x | y,
            BinOp::Xor => x ^ y,
            BinOp::Shl => x.checked_shl(y).unwrap_or(0),
            BinOp::Shr => x.checked_shr(y).unwrap_or(0),
            BinOp::Eq => truth(x == y),
            BinOp::Ne => truth(x != y),
            BinOp::Le => truth(x <= y),
            BinOp::Ge => truth(x >= y),
            BinOp::Lt => truth(x < y),
            BinOp::Gt => truth(x > y),
        };
        Ok(value & WORD_MASK)
    }

    /// A primary, optionally followed by one operator and one more primary.
    fn expr(&mut self) -> Result<u32, AsmError> {
        let mut x = self.operand()?;
        if let Tok::BinOp(op) = self.tok {
            self.next()?;
            let y = self.operand()?;
            x = self.apply(op, x, y)?;
        }
        Ok(x & WORD_MASK)
    }
}

/// Evaluate `text` against the finalized labels. The whole string must be
/// consumed.
pub fn evaluate(labels: &Labels, pos: &Pos, text: &str) -> Result<u32, AsmError> {
    let mut ev = Evaluator {
        labels,
        pos,
        text,
        cursor: 0,
        tok: Tok::End,
    };
    ev.next()?;
    let value = ev.expr()?;
    if ev.tok != Tok::End {
        return Err(ev.fail());
    }
    Ok(value)
}
