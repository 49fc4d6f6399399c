use std::{
    io::{self, Write},
    mem,
};

use crate::{
    error::SymbolKind,
    expr,
    ipl,
    isa::Instr,
    macros::{self, Macros},
    AsmError, Label, Labels, Row, WORD_MASK,
};

/// One generated byte and the row that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gen {
    pub addr: u32,
    pub data: u8,
    pub row: usize,
}

/// A compilation unit. Every pass takes it by `&mut` and leaves its results
/// here for the next one.
#[derive(Debug, Default)]
pub struct Module {
    pub rows: Vec<Row>,
    pub labels: Labels,
    pub macros: Macros,
    pub generated: Vec<Gen>,
}

fn pseudo_arg(labels: &Labels, row: &Row) -> Result<u32, AsmError> {
    if row.args.len() != 1 {
        return Err(AsmError::Arity {
            pos: row.pos.clone(),
            name: row.opcode.clone(),
            expected: 1,
            got: row.args.len(),
        });
    }
    expr::evaluate(labels, &row.pos, &row.args[0])
}

impl Module {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn define_macros(&mut self) -> Result<(), AsmError> {
        let (rows, macros) = macros::define(mem::take(&mut self.rows))?;
        self.rows = rows;
        self.macros = macros;
        Ok(())
    }

    pub fn expand_macros(&mut self) -> Result<(), AsmError> {
        self.rows = macros::expand(&self.macros, mem::take(&mut self.rows))?;
        Ok(())
    }

    /// Seed the symbol table and attach an instruction to every row.
    pub fn pass_one(&mut self) -> Result<(), AsmError> {
        for row in self.rows.iter_mut() {
            if !row.label.is_empty() {
                if let Some(label) = self.labels.get(&row.label) {
                    return Err(AsmError::Redefined {
                        pos: row.pos.clone(),
                        name: row.label.clone(),
                        first: label.pos.clone(),
                    });
                }
                self.labels.insert(
                    row.label.clone(),
                    Label {
                        addr: None,
                        pos: row.pos.clone(),
                    },
                );
            }
            if row.opcode.is_empty() {
                continue;
            }
            let instr = Instr::lookup(&row.opcode).ok_or_else(|| AsmError::UnknownSymbol {
                pos: row.pos.clone(),
                kind: SymbolKind::Opcode,
                name: row.opcode.clone(),
            })?;
            row.instr = Some(instr);
            row.length = instr.length();
        }
        Ok(())
    }

    /// Assign every row its final address, in order, binding labels as they
    /// are reached.
    pub fn pass_two(&mut self) -> Result<(), AsmError> {
        let mut addr = 0u32;
        for row in self.rows.iter_mut() {
            match row.instr {
                Some(instr) if row.length == 0 => match instr {
                    Instr::Org => {
                        addr = pseudo_arg(&self.labels, row)?;
                        row.addr = addr;
                    }
                    Instr::Rmb => {
                        row.length = pseudo_arg(&self.labels, row)?;
                        row.addr = addr;
                        addr = addr.wrapping_add(row.length) & WORD_MASK;
                    }
                    Instr::Equ => {
                        row.addr = pseudo_arg(&self.labels, row)?;
                    }
                    Instr::Assert => {
                        // checked for real in pass three
                        if row.args.len() != 1 {
                            return Err(AsmError::Arity {
                                pos: row.pos.clone(),
                                name: row.opcode.clone(),
                                expected: 1,
                                got: row.args.len(),
                            });
                        }
                        row.addr = addr;
                    }
                    _ => {
                        return Err(AsmError::Resolver {
                            pos: row.pos.clone(),
                            msg: format!("`{}` has no length", instr.mnemonic()),
                        })
                    }
                },
                _ => {
                    row.addr = addr;
                    addr = addr.wrapping_add(row.length) & WORD_MASK;
                }
            }
            row.is_final = true;
            if !row.label.is_empty() {
                if let Some(label) = self.labels.get_mut(&row.label) {
                    label.addr = Some(row.addr);
                }
            }
        }
        Ok(())
    }

    /// Generate code into the log.
    pub fn pass_three(&mut self) -> Result<(), AsmError> {
        for (index, row) in self.rows.iter().enumerate() {
            if !row.is_final {
                return Err(AsmError::Resolver {
                    pos: row.pos.clone(),
                    msg: "row reached code generation without a final address".to_string(),
                });
            }
            let Some(instr) = row.instr else {
                continue;
            };
            for (i, data) in instr.generate(&self.labels, row)?.into_iter().enumerate() {
                self.generated.push(Gen {
                    addr: (row.addr + i as u32) & WORD_MASK,
                    data,
                    row: index,
                });
            }
        }
        Ok(())
    }

    /// Address of `start`, or 0 when there is none.
    pub fn start(&self) -> u32 {
        self.labels
            .get("start")
            .and_then(|label| label.addr)
            .unwrap_or(0)
    }

    pub fn boot_image(&self) -> Vec<u8> {
        ipl::build(&self.generated, self.start())
    }

    /// Human-readable listing: every row, with the bytes it generated.
    pub fn write_listing<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut gens = self.generated.iter().peekable();
        for (index, row) in self.rows.iter().enumerate() {
            if row.opcode.is_empty() {
                if row.label.is_empty() {
                    writeln!(out, "{:6}   {:2}   {:12} {}", "", "", "", row.comment)?;
                } else {
                    writeln!(
                        out,
                        "{:6x}   {:2}   {:>12} {}",
                        row.addr, "", row.label, row.comment
                    )?;
                }
                continue;
            }
            let mut first = true;
            while let Some(gen) = gens.next_if(|gen| gen.row == index) {
                if first {
                    writeln!(
                        out,
                        "{:6x} : {:02x} : {:>12} {:>12}  {:<24} {}",
                        gen.addr,
                        gen.data,
                        row.label,
                        row.opcode,
                        row.joined_args(),
                        row.comment
                    )?;
                    first = false;
                } else {
                    writeln!(out, "{:6x} : {:02x}", gen.addr, gen.data)?;
                }
            }
            if first {
                writeln!(
                    out,
                    "{:6x} : {:2} : {:>12} {:>12}  {:<24} {}",
                    row.addr,
                    "",
                    row.label,
                    row.opcode,
                    row.joined_args(),
                    row.comment
                )?;
            }
        }
        Ok(())
    }

    /// One `BBHHLL name` line per label, in definition order.
    pub fn write_symbols<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (name, label) in &self.labels {
            if let Some(addr) = label.addr {
                writeln!(out, "{addr:06X} {name}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble;

    fn build(source: &str) -> Result<Module, AsmError> {
        assemble(&[("test.owl", source)])
    }

    fn bytes(module: &Module) -> Vec<(u32, u8)> {
        module.generated.iter().map(|gen| (gen.addr, gen.data)).collect()
    }

    #[test]
    fn org_moves_the_cursor() {
        let module = build(" org $200\nhere: fcb 1\n").unwrap();
        assert_eq!(module.labels["here"].addr, Some(0x200));
        assert_eq!(bytes(&module), vec![(0x200, 1)]);
    }

    #[test]
    fn addresses_advance_by_length() {
        let module = build("a: seta 1\nb: inca\nc: fcw $1234\nd:\n").unwrap();
        assert_eq!(module.labels["a"].addr, Some(0));
        assert_eq!(module.labels["b"].addr, Some(2));
        assert_eq!(module.labels["c"].addr, Some(3));
        assert_eq!(module.labels["d"].addr, Some(5));
        assert_eq!(
            bytes(&module),
            vec![(0, 0x04), (1, 0x01), (2, 0x08), (3, 0x12), (4, 0x34)]
        );
    }

    #[test]
    fn rmb_reserves_without_emitting() {
        let module = build("buf: rmb 4\nend: fcb buf\n").unwrap();
        assert_eq!(module.labels["buf"].addr, Some(0));
        assert_eq!(module.labels["end"].addr, Some(4));
        assert_eq!(bytes(&module), vec![(4, 0)]);
    }

    #[test]
    fn equ_defines_constants() {
        let module = build("size equ 3\n fcb size\nnext: inca\n").unwrap();
        assert_eq!(module.labels["size"].addr, Some(3));
        assert_eq!(module.labels["next"].addr, Some(1));
    }

    #[test]
    fn backward_references_resolve() {
        let module = build("top: inca\n seth h(top)\n setl l(top)\n").unwrap();
        assert_eq!(bytes(&module)[1..], [(1, 0x06), (2, 0x00), (3, 0x07), (4, 0x00)]);
    }

    #[test]
    fn invocation_label_names_first_expanded_byte() {
        let src = "two macro\n inca\n deca\n endmacro\n inca\nlbl: two\n fcb lbl\n";
        let module = build(src).unwrap();
        assert_eq!(module.labels["lbl"].addr, Some(1));
        assert_eq!(bytes(&module), vec![(0, 0x08), (1, 0x08), (2, 0x09), (3, 1)]);
    }

    #[test]
    fn forward_reference_in_org_is_unresolved() {
        assert!(matches!(
            build(" org later\nlater: inca\n"),
            Err(AsmError::Unresolved { ref name, .. }) if name == "later"
        ));
    }

    #[test]
    fn code_may_name_later_labels() {
        let module = build(" setl done\ndone: inca\n").unwrap();
        assert_eq!(bytes(&module), vec![(0, 0x07), (1, 0x02), (2, 0x08)]);
    }

    #[test]
    fn asserts_check_at_generation() {
        assert!(build("a: inca\n assert a == 0\n").is_ok());
        let err = build("a: inca\n assert a == 1\n").unwrap_err();
        assert!(matches!(err, AsmError::Assertion { .. }));
        assert_eq!(err.pos().line, 2);
    }

    #[test]
    fn unknown_opcode() {
        assert!(matches!(
            build(" frob 1\n"),
            Err(AsmError::UnknownSymbol {
                kind: SymbolKind::Opcode,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_labels() {
        assert!(matches!(
            build("x: inca\nx: deca\n"),
            Err(AsmError::Redefined { .. })
        ));
    }

    #[test]
    fn pseudo_op_arity() {
        assert!(matches!(build(" org 1, 2\n"), Err(AsmError::Arity { .. })));
        assert!(matches!(build(" equ\n"), Err(AsmError::Arity { .. })));
    }

    #[test]
    fn pass_three_requires_final_rows() {
        let mut module = Module::new(
            crate::line::parse_lines("test.owl", " inca\n").unwrap(),
        );
        module.pass_one().unwrap();
        assert!(matches!(
            module.pass_three(),
            Err(AsmError::Resolver { .. })
        ));
    }

    #[test]
    fn start_defaults_to_zero() {
        assert_eq!(build(" inca\n").unwrap().start(), 0);
        assert_eq!(build(" org 9\nstart: inca\n").unwrap().start(), 9);
    }

    #[test]
    fn listing_and_symbols() {
        let module = build("; hello\nstart: seta 1\n").unwrap();
        let mut listing = Vec::new();
        module.write_listing(&mut listing).unwrap();
        let listing = String::from_utf8(listing).unwrap();
        assert!(listing.contains("; hello"));
        assert!(listing.contains("     0 : 04 :        start         seta"));
        assert!(listing.contains("     1 : 01"));

        let mut symbols = Vec::new();
        module.write_symbols(&mut symbols).unwrap();
        assert_eq!(String::from_utf8(symbols).unwrap(), "000000 start\n");
    }
}
