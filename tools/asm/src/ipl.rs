//! Boot images: a stream of `(opcode, operand)` pairs that, fed to a fresh
//! machine, writes the program into memory and jumps to it.

use crate::{
    isa::{self, Reg},
    Gen,
};

fn push_addr(image: &mut Vec<u8>, addr: u32) {
    image.extend_from_slice(&[
        isa::set(Reg::B),
        (addr >> 16) as u8,
        isa::set(Reg::H),
        (addr >> 8) as u8,
        isa::set(Reg::L),
        addr as u8,
    ]);
}

/// Build the boot image for `generated`, ending with a jump to `start`.
pub fn build(generated: &[Gen], start: u32) -> Vec<u8> {
    let mut image = Vec::with_capacity(generated.len() * 4 + 16);
    let mut next = None;

    for gen in generated {
        if next == Some(gen.addr) {
            image.extend_from_slice(&[isa::INCW, 0]);
        } else {
            push_addr(&mut image, gen.addr);
        }
        image.extend_from_slice(&[isa::set(Reg::A), gen.data, isa::mv(Reg::A, Reg::M), 0]);
        next = Some((gen.addr + 1) & crate::WORD_MASK);
    }

    // nonzero A lets the branch go
    image.extend_from_slice(&[isa::set(Reg::A), 1]);
    push_addr(&mut image, start);
    for _ in 0..4 {
        image.extend_from_slice(&[isa::BNZ, 0]);
    }

    tracing::debug!(
        "boot image: {} bytes for {} generated, start ${start:06x}",
        image.len(),
        generated.len()
    );
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen(addr: u32, data: u8) -> Gen {
        Gen { addr, data, row: 0 }
    }

    const TAIL: [u8; 16] = [
        0x04, 0x01, 0x05, 0x00, 0x06, 0x00, 0x07, 0x00, 0x0C, 0x00, 0x0C, 0x00, 0x0C, 0x00, 0x0C,
        0x00,
    ];

    #[test]
    fn empty_program_just_jumps() {
        assert_eq!(build(&[], 0), TAIL.to_vec());
    }

    #[test]
    fn runs_use_increment() {
        let image = build(&[gen(0, 0xAA), gen(1, 0xBB)], 0);
        assert_eq!(
            image[..14],
            [
                0x05, 0x00, 0x06, 0x00, 0x07, 0x00, 0x04, 0xAA, 0x44, 0x00, // first byte
                0x0A, 0x00, 0x04, 0xBB,
            ]
        );
        assert_eq!(image[14..16], [0x44, 0x00]);
        assert_eq!(image[16..], TAIL);
    }

    #[test]
    fn gaps_use_absolute_addresses() {
        let image = build(&[gen(0x10, 1), gen(0x123456, 2)], 0x123456);
        assert_eq!(image[10..16], [0x05, 0x12, 0x06, 0x34, 0x07, 0x56]);
        let tail = &image[image.len() - 16..];
        assert_eq!(tail[2..8], [0x05, 0x12, 0x06, 0x34, 0x07, 0x56]);
    }
}
