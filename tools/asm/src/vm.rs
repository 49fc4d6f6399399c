use std::io;

use thiserror::Error;

use crate::{
    isa::{self, Reg},
    WORD_MASK,
};

/// The whole 24-bit address space.
pub const MEMORY_SIZE: usize = 1 << 24;

/// A device on one of the E/F/G port registers.
pub trait Port {
    /// Next byte from the device, 0 once it has nothing left.
    fn read(&mut self) -> Result<u8, VmError>;

    fn write(&mut self, value: u8) -> Result<(), VmError>;
}

#[derive(Error, Debug)]
pub enum VmError {
    #[error("bad boot image: {0}")]
    Configuration(String),

    #[error("no device attached to port {0}")]
    MissingPort(Reg),

    #[error("program exited with status {0}")]
    Exit(u8),

    #[error("port i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// The machine. Registers are public so hosts and tests can inspect them.
pub struct Vm {
    pub a: u8,
    pub b: u8,
    pub h: u8,
    pub l: u8,
    /// Byte at W, latched at the start of every step.
    pub m: u8,
    /// Current opcode.
    pub t: u8,
    pub pc: u32,

    pub e: Option<Box<dyn Port>>,
    pub f: Option<Box<dyn Port>>,
    pub g: Option<Box<dyn Port>>,

    memory: Vec<u8>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            a: 0,
            b: 0,
            h: 0,
            l: 0,
            m: 0,
            t: 0,
            pc: 0,
            e: None,
            f: None,
            g: None,
            memory: vec![0; MEMORY_SIZE],
        }
    }

    /// (B,H,L) as one address.
    #[inline]
    pub fn w(&self) -> u32 {
        ((self.b as u32) << 16) | ((self.h as u32) << 8) | self.l as u32
    }

    #[inline]
    pub fn set_w(&mut self, w: u32) {
        self.b = (w >> 16) as u8;
        self.h = (w >> 8) as u8;
        self.l = w as u8;
    }

    #[inline]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.memory[(addr & WORD_MASK) as usize]
    }

    #[inline]
    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.memory[(addr & WORD_MASK) as usize] = value;
    }

    fn port(&mut self, reg: Reg) -> Result<&mut Box<dyn Port>, VmError> {
        let port = match reg {
            Reg::E => &mut self.e,
            Reg::F => &mut self.f,
            _ => &mut self.g,
        };
        port.as_mut().ok_or(VmError::MissingPort(reg))
    }

    /// Reading M gives the latched byte, which during IPL is the fed operand
    /// rather than memory at W.
    pub fn get_reg(&mut self, reg: Reg) -> Result<u8, VmError> {
        Ok(match reg {
            Reg::A => self.a,
            Reg::B => self.b,
            Reg::H => self.h,
            Reg::L => self.l,
            Reg::M => self.m,
            Reg::E | Reg::F | Reg::G => self.port(reg)?.read()?,
        })
    }

    pub fn put_reg(&mut self, reg: Reg, value: u8) -> Result<(), VmError> {
        match reg {
            Reg::A => self.a = value,
            Reg::B => self.b = value,
            Reg::H => self.h = value,
            Reg::L => self.l = value,
            Reg::M => self.write_byte(self.w(), value),
            Reg::E | Reg::F | Reg::G => self.port(reg)?.write(value)?,
        }
        Ok(())
    }

    /// Run the opcode in `t`. `imm` is the set-immediate operand. Returns
    /// `false` for an undefined opcode.
    fn execute(&mut self, imm: u8) -> Result<bool, VmError> {
        let t = self.t;
        match t >> 6 {
            0b00 => match t & 0x3C {
                isa::SET => {
                    let reg = Reg::from_code(t & 3);
                    tracing::trace!("    SET{reg} ${imm:02x}");
                    self.put_reg(reg, imm)?;
                    self.pc = (self.pc + 1) & WORD_MASK;
                }
                isa::INCA => match t {
                    isa::INCA => self.a = self.a.wrapping_add(1),
                    isa::DECA => self.a = self.a.wrapping_sub(1),
                    isa::INCW => self.set_w(self.w().wrapping_add(1) & WORD_MASK),
                    _ => self.set_w(self.w().wrapping_sub(1) & WORD_MASK),
                },
                isa::BNZ if t == isa::BNZ => {
                    if self.a != 0 {
                        tracing::trace!("    BNZ taken to ${:06x}", self.w());
                        self.pc = self.w();
                    }
                }
                _ => return Ok(false),
            },
            0b01 => {
                let (from, to) = (Reg::from_code(t >> 3), Reg::from_code(t));
                let value = self.get_reg(from)?;
                tracing::trace!("    MV ${value:02x} from {from} to {to}");
                self.put_reg(to, value)?;
            }
            0b10 => {
                let (to, addr) = (Reg::from_code((t >> 4) & 3), (t & 0xF) as u32);
                let value = self.read_byte(addr);
                self.put_reg(to, value)?;
            }
            _ => {
                let (from, addr) = (Reg::from_code((t >> 4) & 3), (t & 0xF) as u32);
                let value = self.get_reg(from)?;
                self.write_byte(addr, value);
            }
        }
        Ok(true)
    }

    /// Execute up to `n` instructions from memory. `Ok(false)` means an
    /// undefined opcode stopped the machine early.
    pub fn steps(&mut self, n: u64) -> Result<bool, VmError> {
        for i in 0..n {
            self.t = self.read_byte(self.pc);
            self.m = self.read_byte(self.w());
            self.pc = (self.pc + 1) & WORD_MASK;
            let imm = self.read_byte(self.pc);
            tracing::trace!("step {i:x}: pc=${:06x} t=${:02x}", self.pc, self.t);
            let ok = self.execute(imm)?;
            tracing::trace!("    a=${:02x} w=${:06x}", self.a, self.w());
            if !ok {
                tracing::debug!("halted after {i} steps at pc=${:06x}", self.pc);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Initial program load. Each pair of `image` is executed as (opcode,
    /// operand) without touching the fetch stage.
    pub fn ipl(&mut self, image: &[u8]) -> Result<(), VmError> {
        if image.len() % 2 != 0 {
            return Err(VmError::Configuration(format!(
                "image length {} is odd",
                image.len()
            )));
        }
        for (i, pair) in image.chunks_exact(2).enumerate() {
            self.t = pair[0];
            self.m = pair[1];
            tracing::trace!("ipl {:x}: t=${:02x} m=${:02x}", i * 2, self.t, self.m);
            if !self.execute(pair[1])? {
                return Err(VmError::Configuration(format!(
                    "opcode ${:02x} at offset {} halted the load",
                    pair[0],
                    i * 2
                )));
            }
        }
        tracing::debug!(
            "loaded {} bytes, pc=${:06x} a=${:02x}",
            image.len(),
            self.pc,
            self.a
        );
        Ok(())
    }
}
