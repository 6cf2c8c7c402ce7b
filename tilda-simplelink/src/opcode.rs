//! Command opcodes and status codes

/// Acknowledge sequence, sent by both sides
pub const ACK: [u8; 2] = [0x00, 0xCC];

/// Bootloader command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Status of the last command
    GetStatus = 0x23,
    /// Bitmap of available storages
    GetStorageList = 0x27,
    /// Write raw bytes into a storage
    RawStorageWrite = 0x2D,
    /// Bootloader, NWP, MAC, PHY and chip versions
    GetVersionInfo = 0x2F,
    /// Erase whole blocks of a storage
    RawStorageErase = 0x30,
    /// Block size and block count of a storage
    GetStorageInfo = 0x31,
    /// Restart into the bootloader image loaded in SRAM
    ExecFromRam = 0x32,
    /// Change the UART speed after a delay
    SwitchUart = 0x33,
    /// Program a chunk of a filesystem image
    FsProgram = 0x34,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x23 => Some(Opcode::GetStatus),
            0x27 => Some(Opcode::GetStorageList),
            0x2D => Some(Opcode::RawStorageWrite),
            0x2F => Some(Opcode::GetVersionInfo),
            0x30 => Some(Opcode::RawStorageErase),
            0x31 => Some(Opcode::GetStorageInfo),
            0x32 => Some(Opcode::ExecFromRam),
            0x33 => Some(Opcode::SwitchUart),
            0x34 => Some(Opcode::FsProgram),
            _ => None,
        }
    }
}

/// Status byte reported by GetStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Ready for the next command
    Success,
    UnknownCommand,
    InvalidCommand,
    InvalidAddress,
    FlashFail,
    Unknown(u8),
}

impl Status {
    pub const SUCCESS: u8 = 0x40;

    pub fn from_u8(value: u8) -> Self {
        match value {
            0x40 => Status::Success,
            0x41 => Status::UnknownCommand,
            0x42 => Status::InvalidCommand,
            0x43 => Status::InvalidAddress,
            0x44 => Status::FlashFail,
            other => Status::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Status::Success => 0x40,
            Status::UnknownCommand => 0x41,
            Status::InvalidCommand => 0x42,
            Status::InvalidAddress => 0x43,
            Status::FlashFail => 0x44,
            Status::Unknown(other) => other,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}
