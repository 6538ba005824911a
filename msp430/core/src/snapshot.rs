//! Zip-packaged machine snapshots: metadata JSON, the register file and the
//! full RAM image. UART hooks are not captured; hosts reattach their own.

use crate::machine::Machine;
use crate::memory::RAM_SIZE;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::read::ZipArchive;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const SNAPSHOT_MAGIC: &str = "msp430.snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

const REGISTER_COUNT: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub magic: String,
    pub version: u32,
    pub backend: String,
    pub instruction_count: u64,
    pub pc: u16,
}

impl SnapshotMetadata {
    pub fn new(backend: &str, instruction_count: u64, pc: u16) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC.to_string(),
            version: SNAPSHOT_VERSION,
            backend: backend.to_string(),
            instruction_count,
            pc,
        }
    }
}

pub fn pack_registers(regs: &[u16; REGISTER_COUNT]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REGISTER_COUNT * 2);
    for value in regs {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

pub fn unpack_registers(payload: &[u8]) -> Result<[u16; REGISTER_COUNT]> {
    if payload.len() != REGISTER_COUNT * 2 {
        return Err(CoreError::InvalidSnapshot(format!(
            "registers.bin length mismatch (expected {}, got {})",
            REGISTER_COUNT * 2,
            payload.len()
        )));
    }
    let mut regs = [0u16; REGISTER_COUNT];
    for (index, chunk) in payload.chunks_exact(2).enumerate() {
        regs[index] = u16::from_le_bytes([chunk[0], chunk[1]]);
    }
    Ok(regs)
}

pub fn save_snapshot(path: &Path, metadata: &SnapshotMetadata, machine: &Machine) -> Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("snapshot.json", options)?;
    zip.write_all(&serde_json::to_vec_pretty(metadata)?)?;

    zip.start_file("registers.bin", options)?;
    zip.write_all(&pack_registers(&machine.regs.snapshot()))?;

    zip.start_file("ram.bin", options)?;
    zip.write_all(machine.ram_slice())?;

    zip.finish()?;
    Ok(())
}

pub fn load_snapshot(path: &Path, machine: &mut Machine) -> Result<SnapshotMetadata> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let metadata: SnapshotMetadata = {
        let mut buf = Vec::new();
        let mut entry = archive
            .by_name("snapshot.json")
            .map_err(|e| CoreError::InvalidSnapshot(format!("snapshot.json missing: {e}")))?;
        entry.read_to_end(&mut buf)?;
        serde_json::from_slice(&buf)?
    };
    if metadata.magic != SNAPSHOT_MAGIC || metadata.version != SNAPSHOT_VERSION {
        return Err(CoreError::InvalidSnapshot(
            "snapshot magic/version mismatch".to_string(),
        ));
    }

    let regs = {
        let mut buf = Vec::new();
        let mut entry = archive
            .by_name("registers.bin")
            .map_err(|e| CoreError::InvalidSnapshot(format!("registers.bin missing: {e}")))?;
        entry.read_to_end(&mut buf)?;
        unpack_registers(&buf)?
    };

    let ram = {
        let mut buf = Vec::new();
        let mut entry = archive
            .by_name("ram.bin")
            .map_err(|e| CoreError::InvalidSnapshot(format!("ram.bin missing: {e}")))?;
        entry.read_to_end(&mut buf)?;
        if buf.len() != RAM_SIZE {
            return Err(CoreError::InvalidSnapshot(format!(
                "ram.bin length mismatch (expected {RAM_SIZE}, got {})",
                buf.len()
            )));
        }
        buf
    };

    machine.regs.restore(regs);
    machine.ram.copy_from(0, &ram);
    Ok(metadata)
}
