use std::sync::Arc;

use crate::{isa::Instr, AsmError, Pos};

/// One source line after parsing, plus the state the passes attach to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub label: String,
    pub opcode: String,
    pub args: Vec<String>,
    pub comment: String,
    pub pos: Pos,

    pub instr: Option<Instr>,
    pub length: u32,
    pub addr: u32,
    pub is_final: bool,
}

impl Row {
    pub fn new(pos: Pos) -> Self {
        Self {
            label: String::new(),
            opcode: String::new(),
            args: Vec::new(),
            comment: String::new(),
            pos,
            instr: None,
            length: 0,
            addr: 0,
            is_final: false,
        }
    }

    /// A comment-only row, used for listing placeholders.
    pub fn note(pos: Pos, comment: String) -> Self {
        Self {
            comment,
            ..Self::new(pos)
        }
    }

    /// Wholly blank: no label, no opcode, no comment.
    pub fn is_blank(&self) -> bool {
        self.label.is_empty() && self.opcode.is_empty() && self.comment.is_empty()
    }

    pub fn joined_args(&self) -> String {
        self.args.join(", ")
    }
}

fn is_label_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'@'
}

fn is_opcode_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Position just past a `'x'` character literal starting at `i`, if there is one.
fn char_literal_end(bytes: &[u8], i: usize) -> Option<usize> {
    if bytes.get(i) != Some(&b'\'') {
        return None;
    }
    // the quoted char may be multi-byte utf-8
    let rest = std::str::from_utf8(&bytes[i + 1..]).ok()?;
    let c = rest.chars().next()?;
    let close = i + 1 + c.len_utf8();
    (bytes.get(close) == Some(&b'\'')).then_some(close + 1)
}

/// Split the argument text on commas that are not inside a character literal.
fn split_args(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let bytes = text.as_bytes();
    let mut args = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = char_literal_end(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] == b',' {
            args.push(text[start..i].trim().to_string());
            start = i + 1;
        }
        i += 1;
    }
    args.push(text[start..].trim().to_string());
    args
}

/// Split one line into label, opcode, arguments and comment.
///
/// The label must start in the first column and may be followed by `:`. The
/// opcode is the next identifier and is folded to lower case. Arguments run up
/// to the first `;` outside a character literal; the comment keeps its `;`.
pub fn parse_line(text: &str, pos: Pos) -> Result<Row, AsmError> {
    let text = text.trim_end_matches(['\r', '\n']);
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() && is_label_char(bytes[i]) {
        i += 1;
    }
    let label = &text[..i];
    if bytes.get(i) == Some(&b':') {
        i += 1;
    }
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
        i += 1;
    }

    let opcode_start = i;
    while i < bytes.len() && is_opcode_char(bytes[i]) {
        i += 1;
    }
    let opcode = &text[opcode_start..i];
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
        i += 1;
    }

    let args_start = i;
    while i < bytes.len() && bytes[i] != b';' {
        if let Some(end) = char_literal_end(bytes, i) {
            i = end;
        } else {
            i += 1;
        }
    }
    let args = &text[args_start..i];
    let comment = &text[i..];

    if opcode.is_empty() && !args.trim().is_empty() {
        return Err(AsmError::Syntax {
            pos,
            msg: format!("cannot parse line {text:?}: expected opcode"),
        });
    }

    Ok(Row {
        label: label.to_string(),
        opcode: opcode.to_ascii_lowercase(),
        args: split_args(args),
        comment: comment.to_string(),
        ..Row::new(pos)
    })
}

/// Parse a whole source file. Lines are numbered from 1.
pub fn parse_lines(file: &str, source: &str) -> Result<Vec<Row>, AsmError> {
    let file: Arc<str> = file.into();
    source
        .lines()
        .enumerate()
        .map(|(i, text)| parse_line(text, Pos::new(file.clone(), (i + 1) as u32)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Row {
        parse_line(text, Pos::new("test.owl", 1)).unwrap()
    }

    #[test]
    fn label_only() {
        let row = parse("abhc");
        assert_eq!(row.label, "abhc");
        assert_eq!(row.opcode, "");
        assert!(row.args.is_empty());
        assert_eq!(row.comment, "");
    }

    #[test]
    fn label_with_colon_and_comment() {
        let row = parse("abhc: ; foo the bar");
        assert_eq!(row.label, "abhc");
        assert_eq!(row.opcode, "");
        assert_eq!(row.comment, "; foo the bar");
    }

    #[test]
    fn opcode_is_lowered_and_args_trimmed() {
        let row = parse("abhc LDA 90, y ; remark");
        assert_eq!(row.label, "abhc");
        assert_eq!(row.opcode, "lda");
        assert_eq!(row.args, vec!["90", "y"]);
        assert_eq!(row.comment, "; remark");
    }

    #[test]
    fn comment_keeps_commas() {
        let row = parse("abhc: bcd one,two,three;eight,nine,ten");
        assert_eq!(row.opcode, "bcd");
        assert_eq!(row.args, vec!["one", "two", "three"]);
        assert_eq!(row.comment, ";eight,nine,ten");
    }

    #[test]
    fn indented_line_has_no_label() {
        let row = parse("\tseta 1");
        assert_eq!(row.label, "");
        assert_eq!(row.opcode, "seta");
        assert_eq!(row.args, vec!["1"]);
    }

    #[test]
    fn blank_lines() {
        assert!(parse("").is_blank());
        assert!(parse("   \t \r").is_blank());
        assert!(!parse("  ; only a comment").is_blank());
    }

    #[test]
    fn char_literals_hide_separators() {
        let row = parse(" fcb ';' ; semi");
        assert_eq!(row.args, vec!["';'"]);
        assert_eq!(row.comment, "; semi");

        let row = parse(" fcb ','");
        assert_eq!(row.args, vec!["','"]);
    }

    #[test]
    fn macro_labels_may_carry_at() {
        let row = parse("@loop: deca");
        assert_eq!(row.label, "@loop");
        assert_eq!(row.opcode, "deca");
    }

    #[test]
    fn args_without_opcode_fail() {
        let err = parse_line("foo -bar", Pos::new("test.owl", 7)).unwrap_err();
        assert!(matches!(err, AsmError::Syntax { .. }));
        assert_eq!(err.pos().line, 7);
    }

    #[test]
    fn lines_are_numbered_from_one() {
        let rows = parse_lines("a.owl", "start: seta 1\n\n bnz\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].pos.to_string(), "a.owl:1");
        assert_eq!(rows[2].pos.line, 3);
        assert!(rows[1].is_blank());
    }
}
