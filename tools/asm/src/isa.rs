use std::fmt::{self, Display, Formatter};

use crate::{error::SymbolKind, expr, AsmError, Labels, Row};

/// Register codes as they appear in `mv` and in the low bits of other opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    A = 0,
    B = 1,
    H = 2,
    L = 3,
    M = 4,
    E = 5,
    F = 6,
    G = 7,
}

impl Reg {
    pub const ALL: [Reg; 8] = [
        Reg::A,
        Reg::B,
        Reg::H,
        Reg::L,
        Reg::M,
        Reg::E,
        Reg::F,
        Reg::G,
    ];

    /// Only the low 3 bits are used.
    pub fn from_code(code: u8) -> Self {
        Self::ALL[(code & 7) as usize]
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|reg| reg.to_string().eq_ignore_ascii_case(name))
            .copied()
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg::A => "A",
            Reg::B => "B",
            Reg::H => "H",
            Reg::L => "L",
            Reg::M => "M",
            Reg::E => "E",
            Reg::F => "F",
            Reg::G => "G",
        };
        write!(f, "{name}")
    }
}

// opcode bytes, shared by the encoder, the boot image and the decoder
pub const SET: u8 = 0x04;
pub const INCA: u8 = 0x08;
pub const DECA: u8 = 0x09;
pub const INCW: u8 = 0x0A;
pub const DECW: u8 = 0x0B;
pub const BNZ: u8 = 0x0C;
pub const MV: u8 = 0x40;
pub const LD: u8 = 0x80;
pub const ST: u8 = 0xC0;

pub fn set(reg: Reg) -> u8 {
    SET | (reg.code() & 3)
}

pub fn mv(from: Reg, to: Reg) -> u8 {
    MV | (from.code() << 3) | to.code()
}

pub fn ld(reg: Reg, addr: u32) -> u8 {
    LD | ((reg.code() & 3) << 4) | (addr & 0xF) as u8
}

pub fn st(reg: Reg, addr: u32) -> u8 {
    ST | ((reg.code() & 3) << 4) | (addr & 0xF) as u8
}

/// Every mnemonic the assembler knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Mv,
    Ld(Reg),
    St(Reg),
    Set(Reg),
    IncA,
    DecA,
    IncW,
    DecW,
    Bnz,
    Fcb,
    Fcw,
    Org,
    Equ,
    Rmb,
    Assert,
}

const INSTRUCTIONS: &[(&str, Instr)] = &[
    ("mv", Instr::Mv),
    ("lda", Instr::Ld(Reg::A)),
    ("ldb", Instr::Ld(Reg::B)),
    ("ldh", Instr::Ld(Reg::H)),
    ("ldl", Instr::Ld(Reg::L)),
    ("sta", Instr::St(Reg::A)),
    ("stb", Instr::St(Reg::B)),
    ("sth", Instr::St(Reg::H)),
    ("stl", Instr::St(Reg::L)),
    ("seta", Instr::Set(Reg::A)),
    ("setb", Instr::Set(Reg::B)),
    ("seth", Instr::Set(Reg::H)),
    ("setl", Instr::Set(Reg::L)),
    ("inca", Instr::IncA),
    ("deca", Instr::DecA),
    ("incw", Instr::IncW),
    ("decw", Instr::DecW),
    ("bnz", Instr::Bnz),
    ("fcb", Instr::Fcb),
    ("fcw", Instr::Fcw),
    ("org", Instr::Org),
    ("equ", Instr::Equ),
    ("rmb", Instr::Rmb),
    ("assert", Instr::Assert),
];

impl Instr {
    /// `mnemonic` is expected to be lower case already.
    pub fn lookup(mnemonic: &str) -> Option<Self> {
        INSTRUCTIONS
            .iter()
            .find_map(|(name, instr)| (*name == mnemonic).then_some(*instr))
    }

    pub fn mnemonic(self) -> &'static str {
        INSTRUCTIONS
            .iter()
            .find_map(|(name, instr)| (*instr == self).then_some(*name))
            .unwrap_or("?")
    }

    /// Fixed length in bytes. Zero for the pseudo-ops.
    pub fn length(self) -> u32 {
        match self {
            Instr::Set(_) | Instr::Fcw => 2,
            Instr::Org | Instr::Equ | Instr::Rmb | Instr::Assert => 0,
            _ => 1,
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Instr::Mv => 2,
            Instr::IncA | Instr::DecA | Instr::IncW | Instr::DecW | Instr::Bnz => 0,
            _ => 1,
        }
    }

    /// Produce the bytes for `row`. All labels must already be final.
    pub fn generate(self, labels: &Labels, row: &Row) -> Result<Vec<u8>, AsmError> {
        if row.args.len() != self.arity() {
            return Err(AsmError::Arity {
                pos: row.pos.clone(),
                name: row.opcode.clone(),
                expected: self.arity(),
                got: row.args.len(),
            });
        }
        let value = |i: usize| expr::evaluate(labels, &row.pos, &row.args[i]);
        let bytes = match self {
            Instr::Mv => vec![mv(reg_arg(row, 0)?, reg_arg(row, 1)?)],
            Instr::Ld(reg) => vec![ld(reg, value(0)?)],
            Instr::St(reg) => vec![st(reg, value(0)?)],
            Instr::Set(reg) => vec![set(reg), value(0)? as u8],
            Instr::IncA => vec![INCA],
            Instr::DecA => vec![DECA],
            Instr::IncW => vec![INCW],
            Instr::DecW => vec![DECW],
            Instr::Bnz => vec![BNZ],
            Instr::Fcb => vec![value(0)? as u8],
            Instr::Fcw => {
                let word = value(0)?;
                vec![(word >> 8) as u8, word as u8]
            }
            Instr::Assert => {
                if value(0)? == 0 {
                    return Err(AsmError::Assertion {
                        pos: row.pos.clone(),
                        expr: row.args[0].clone(),
                    });
                }
                Vec::new()
            }
            Instr::Org | Instr::Equ | Instr::Rmb => Vec::new(),
        };
        Ok(bytes)
    }
}

fn reg_arg(row: &Row, i: usize) -> Result<Reg, AsmError> {
    let name = row.args[i].trim();
    if name.is_empty() {
        return Err(AsmError::Syntax {
            pos: row.pos.clone(),
            msg: format!("`{}` is missing a register", row.opcode),
        });
    }
    Reg::from_name(name).ok_or_else(|| AsmError::UnknownSymbol {
        pos: row.pos.clone(),
        kind: SymbolKind::Register,
        name: name.to_string(),
    })
}
