//! Bootloader session errors

use crate::opcode::Status;
use crate::packet::FrameError;

/// Errors from one bootloader exchange
///
/// `E` is the UART driver's error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootloaderError<E> {
    /// The serial link failed or timed out
    Uart(E),
    /// Two bytes arrived where an ack was expected
    BadAck([u8; 2]),
    /// GetStatus reported something other than success
    BadStatus(Status),
    /// FSProgram reported a negative status
    ProgramFailed(i32),
    /// Command payload does not fit a packet
    PayloadTooLarge,
    /// Argument outside what the command accepts
    InvalidArgument,
    /// A previous exchange failed and the framer was not reset
    Faulted,
    /// Cancelled before the next command
    Cancelled,
}

impl<E> From<FrameError> for BootloaderError<E> {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::PayloadTooLarge | FrameError::BufferTooSmall => {
                BootloaderError::PayloadTooLarge
            }
            FrameError::InvalidFrame | FrameError::InvalidChecksum => {
                BootloaderError::InvalidArgument
            }
        }
    }
}

impl<E> BootloaderError<E> {
    /// True for errors raised by the target rather than the link
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            BootloaderError::BadAck(_)
                | BootloaderError::BadStatus(_)
                | BootloaderError::ProgramFailed(_)
        )
    }
}
