//! UART serial communication abstractions
//!
//! Provides blocking traits for the serial link to the radio
//! co-processor. Reads block until the buffer is full or the
//! driver's own timeout fires.

/// UART transmitter
pub trait UartTx {
    /// Error type for transmit operations
    type Error;

    /// Write data to the UART
    ///
    /// Blocks until all data has been written or an error occurs.
    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// UART receiver
pub trait UartRx {
    /// Error type for receive operations
    type Error;

    /// Read data from the UART
    ///
    /// Blocks until the buffer is filled or an error occurs.
    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Read a single byte from the UART
    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.read_blocking(&mut buf)?;
        Ok(buf[0])
    }
}

/// Line break control
///
/// Holding the TX line in break while the target leaves reset selects
/// its serial bootloader.
pub trait UartBreak {
    /// Assert (`true`) or release (`false`) a break condition on TX
    fn set_break(&mut self, asserted: bool);
}

/// Combined UART interface
///
/// For UARTs that provide both TX and RX on a single peripheral and
/// report the same error type for both directions.
pub trait Uart: UartTx + UartRx<Error = <Self as UartTx>::Error> + UartBreak {}

// Blanket implementation
impl<T: UartTx + UartRx<Error = <T as UartTx>::Error> + UartBreak> Uart for T {}

/// UART configuration
#[derive(Debug, Clone, Copy)]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl UartConfig {
    /// Baud rate used by the SimpleLink serial bootloader
    pub const BOOTLOADER_BAUDRATE: u32 = 921_600;

    /// Configuration for the co-processor bootloader link
    pub const fn bootloader() -> Self {
        Self {
            baudrate: Self::BOOTLOADER_BAUDRATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
    Nine,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}
