use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::Pos;

/// What kind of name failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Opcode,
    Register,
    Label,
    Function,
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Opcode => write!(f, "opcode"),
            SymbolKind::Register => write!(f, "register"),
            SymbolKind::Label => write!(f, "label"),
            SymbolKind::Function => write!(f, "function"),
        }
    }
}

/// Every way a compilation can fail. None of these are recovered from; the
/// first one aborts the build.
#[derive(Error, Debug)]
pub enum AsmError {
    #[error("{pos}: {msg}")]
    Syntax { pos: Pos, msg: String },

    #[error("{pos}: unknown {kind} `{name}`")]
    UnknownSymbol {
        pos: Pos,
        kind: SymbolKind,
        name: String,
    },

    #[error("{pos}: label `{name}` is used before its address is known")]
    Unresolved { pos: Pos, name: String },

    #[error("{pos}: symbol `{name}` already defined at {first}")]
    Redefined { pos: Pos, name: String, first: Pos },

    #[error("{pos}: `{name}` expects {expected} argument(s), got {got}")]
    Arity {
        pos: Pos,
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{pos}: infinite recursion: macro `{name}` is already active")]
    Recursion { pos: Pos, name: String },

    #[error("{pos}: assertion failed: {expr}")]
    Assertion { pos: Pos, expr: String },

    #[error("{pos}: {msg}")]
    Arithmetic { pos: Pos, msg: &'static str },

    #[error("{pos}: internal resolver error: {msg}")]
    Resolver { pos: Pos, msg: String },
}

impl AsmError {
    pub fn pos(&self) -> &Pos {
        match self {
            AsmError::Syntax { pos, .. }
            | AsmError::UnknownSymbol { pos, .. }
            | AsmError::Unresolved { pos, .. }
            | AsmError::Redefined { pos, .. }
            | AsmError::Arity { pos, .. }
            | AsmError::Recursion { pos, .. }
            | AsmError::Assertion { pos, .. }
            | AsmError::Arithmetic { pos, .. }
            | AsmError::Resolver { pos, .. } => pos,
        }
    }
}
