use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use indexmap::IndexMap;

mod config;
mod error;
pub mod expr;
pub mod ipl;
pub mod isa;
pub mod line;
pub mod macros;
mod module;
pub mod port;
pub mod vm;

pub use config::*;
pub use error::*;
pub use line::Row;
pub use module::*;
pub use vm::{Port, Vm, VmError};

/// Addresses and expression values are 24 bits wide.
pub const WORD_MASK: u32 = 0xFF_FFFF;

/// Where a row came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pos {
    pub file: Arc<str>,
    pub line: u32,
}

impl Pos {
    pub fn new<S: Into<Arc<str>>>(file: S, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A symbol table entry. `addr` stays `None` until pass two reaches the
/// defining row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub addr: Option<u32>,
    pub pos: Pos,
}

/// Labels in definition order.
pub type Labels = IndexMap<String, Label>;

/// Run the whole pipeline over `sources`, given as `(file name, text)` pairs
/// and concatenated in order.
pub fn assemble<S: AsRef<str>>(sources: &[(S, S)]) -> Result<Module, AsmError> {
    let mut rows = Vec::new();
    for (file, text) in sources {
        rows.extend(line::parse_lines(file.as_ref(), text.as_ref())?);
    }
    let mut module = Module::new(rows);

    tracing::trace!("defining macros");
    module.define_macros()?;
    tracing::trace!("expanding macros");
    module.expand_macros()?;
    tracing::trace!("starting pass 1");
    module.pass_one()?;
    tracing::trace!("starting pass 2");
    module.pass_two()?;
    tracing::trace!("starting pass 3");
    module.pass_three()?;

    tracing::debug!(
        "assembled {} rows, {} labels, {} bytes",
        module.rows.len(),
        module.labels.len(),
        module.generated.len()
    );
    Ok(module)
}
