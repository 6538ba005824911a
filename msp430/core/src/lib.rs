//! Instruction-set emulator core for the TI MSP430.
//!
//! A [`Machine`] executes an Elf32 MSP430 image in a flat 64 KiB address
//! space, one instruction per [`step`] call. Character I/O and program
//! termination go through a small memory-mapped window at the top of the
//! address space; the host supplies the serial hooks via the [`Uart`] trait.

pub mod decode;
pub mod exec;
pub mod loader;
pub mod machine;
pub mod memory;
pub mod snapshot;
pub mod state;

use thiserror::Error;

pub use exec::step;
pub use loader::EM_MSP430;
pub use machine::{Machine, NullUart, Uart};
pub use memory::{Width, MMIO_BASE, MMIO_EXIT, MMIO_UART, RAM_SIZE};
pub use snapshot::{
    load_snapshot, save_snapshot, SnapshotMetadata, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
pub use state::{Registers, DUMP_LEN};

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of image")]
    UnexpectedEof,
    #[error("bad e_machine value {0}")]
    BadMachine(u16),
    #[error("bad e_phentsize value {0}")]
    BadPhentsize(u16),
    #[error("LOAD segment does not fit in memory")]
    SegmentTooLarge,
    #[error("illegal instruction {0:#06x}")]
    IllegalInstruction(u16),
    #[error("misaligned word access at {0:#06x}")]
    Unaligned(u16),
    #[error("unsupported @pc addressing mode")]
    UnsupportedAddressing,
    #[error("mmio accessed in byte mode at {0:#06x}")]
    MmioByteAccess(u16),
    #[error("unknown mmio device at {0:#06x}")]
    MmioUnknown(u16),
    #[error("mmio exit triggered")]
    Halt,
    #[error("dadd instruction not implemented")]
    DaddUnimplemented,
    #[error("snapshot error: {0}")]
    InvalidSnapshot(String),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
}
