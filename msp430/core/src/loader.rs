//! Elf32 program loader.
//!
//! Accepts the little-endian Elf32 subset emitted for the MSP430: the header
//! is validated for `e_machine` and `e_phentsize` only, PT_LOAD segments are
//! copied to their physical addresses and everything else is left zeroed.

use crate::machine::Machine;
use crate::memory::RAM_SIZE;
use crate::{CoreError, Result};
use std::fs;
use std::path::Path;

pub const EM_MSP430: u16 = 105;

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const PT_LOAD: u32 = 1;

fn read_u16(image: &[u8], offset: usize) -> Result<u16> {
    let bytes = image
        .get(offset..offset + 2)
        .ok_or(CoreError::UnexpectedEof)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32> {
    let bytes = image
        .get(offset..offset + 4)
        .ok_or(CoreError::UnexpectedEof)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl Machine {
    /// Load an ELF image from disk and reset the machine to its entry point.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = fs::read(path)?;
        self.load_image(&image)
    }

    /// Populate RAM from an in-memory ELF image. On success all registers
    /// are cleared and PC holds the entry point; on failure the machine may
    /// hold a partially copied image.
    pub fn load_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() < EHDR_SIZE {
            return Err(CoreError::UnexpectedEof);
        }

        let machine_id = read_u16(image, 18)?;
        if machine_id != EM_MSP430 {
            return Err(CoreError::BadMachine(machine_id));
        }

        let phentsize = read_u16(image, 42)?;
        if phentsize as usize != PHDR_SIZE {
            return Err(CoreError::BadPhentsize(phentsize));
        }

        let entry = read_u32(image, 24)?;
        let phoff = read_u32(image, 28)? as usize;
        let phnum = read_u16(image, 44)? as usize;

        self.ram.zero();

        for i in 0..phnum {
            let base = phoff + i * PHDR_SIZE;
            let p_type = read_u32(image, base)?;
            let p_offset = read_u32(image, base + 4)?;
            let p_paddr = read_u32(image, base + 12)?;
            let p_filesz = read_u32(image, base + 16)?;

            if p_type != PT_LOAD {
                continue;
            }
            if u64::from(p_paddr) + u64::from(p_filesz) > RAM_SIZE as u64 {
                return Err(CoreError::SegmentTooLarge);
            }

            let start = p_offset as usize;
            let bytes = image
                .get(start..start + p_filesz as usize)
                .ok_or(CoreError::UnexpectedEof)?;
            self.ram.copy_from(p_paddr as usize, bytes);
        }

        self.regs.clear();
        self.regs.set_pc(entry as u16);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Width;
    use crate::state::SP;

    struct Segment {
        p_type: u32,
        paddr: u32,
        filesz: u32,
        data: Vec<u8>,
    }

    fn build_image(entry: u32, segments: &[Segment]) -> Vec<u8> {
        let mut image = vec![0u8; EHDR_SIZE];
        image[0..4].copy_from_slice(b"\x7fELF");
        image[18..20].copy_from_slice(&EM_MSP430.to_le_bytes());
        image[24..28].copy_from_slice(&entry.to_le_bytes());
        image[28..32].copy_from_slice(&(EHDR_SIZE as u32).to_le_bytes());
        image[42..44].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        image[44..46].copy_from_slice(&(segments.len() as u16).to_le_bytes());

        let data_base = EHDR_SIZE + segments.len() * PHDR_SIZE;
        let mut data_offset = data_base;
        for segment in segments {
            let mut phdr = vec![0u8; PHDR_SIZE];
            phdr[0..4].copy_from_slice(&segment.p_type.to_le_bytes());
            phdr[4..8].copy_from_slice(&(data_offset as u32).to_le_bytes());
            phdr[12..16].copy_from_slice(&segment.paddr.to_le_bytes());
            phdr[16..20].copy_from_slice(&segment.filesz.to_le_bytes());
            image.extend_from_slice(&phdr);
            data_offset += segment.data.len();
        }
        for segment in segments {
            image.extend_from_slice(&segment.data);
        }
        image
    }

    #[test]
    fn loads_pt_load_segments_and_entry_point() {
        let image = build_image(
            0x4400,
            &[
                Segment {
                    p_type: PT_LOAD,
                    paddr: 0x4400,
                    filesz: 4,
                    data: vec![0x04, 0x55, 0x84, 0x10],
                },
                Segment {
                    p_type: 6, // PT_PHDR, ignored
                    paddr: 0,
                    filesz: 2,
                    data: vec![0xAA, 0xBB],
                },
            ],
        );

        let mut machine = Machine::default();
        machine.regs.set(SP, 0x1234);
        machine.load_image(&image).unwrap();

        assert_eq!(machine.read(Width::Word, 0x4400).unwrap(), 0x5504);
        assert_eq!(machine.read(Width::Word, 0x4402).unwrap(), 0x1084);
        assert_eq!(machine.regs.pc(), 0x4400);
        assert_eq!(machine.regs.get(SP), 0);
        // The ignored segment's bytes never land in RAM.
        assert_eq!(machine.read(Width::Word, 0).unwrap(), 0);
    }

    #[test]
    fn load_zeroes_previous_contents() {
        let mut machine = Machine::default();
        machine.write(Width::Word, 0x0100, 0xDEAD).unwrap();
        let image = build_image(0, &[]);
        machine.load_image(&image).unwrap();
        assert_eq!(machine.read(Width::Word, 0x0100).unwrap(), 0);
    }

    #[test]
    fn rejects_wrong_machine() {
        let mut image = build_image(0, &[]);
        image[18..20].copy_from_slice(&40u16.to_le_bytes());
        let mut machine = Machine::default();
        assert!(matches!(
            machine.load_image(&image),
            Err(CoreError::BadMachine(40))
        ));
    }

    #[test]
    fn rejects_wrong_phentsize() {
        let mut image = build_image(0, &[]);
        image[42..44].copy_from_slice(&56u16.to_le_bytes());
        let mut machine = Machine::default();
        assert!(matches!(
            machine.load_image(&image),
            Err(CoreError::BadPhentsize(56))
        ));
    }

    #[test]
    fn rejects_segment_past_end_of_ram() {
        let image = build_image(
            0,
            &[Segment {
                p_type: PT_LOAD,
                paddr: 0xFFFE,
                filesz: 4,
                data: vec![0; 4],
            }],
        );
        let mut machine = Machine::default();
        assert!(matches!(
            machine.load_image(&image),
            Err(CoreError::SegmentTooLarge)
        ));
    }

    #[test]
    fn rejects_truncated_image() {
        let image = build_image(
            0,
            &[Segment {
                p_type: PT_LOAD,
                paddr: 0,
                filesz: 16,
                data: vec![0; 4], // file ends before filesz bytes exist
            }],
        );
        let mut machine = Machine::default();
        assert!(matches!(
            machine.load_image(&image),
            Err(CoreError::UnexpectedEof)
        ));

        let mut machine = Machine::default();
        assert!(matches!(
            machine.load_image(&[0u8; 20]),
            Err(CoreError::UnexpectedEof)
        ));
    }
}
