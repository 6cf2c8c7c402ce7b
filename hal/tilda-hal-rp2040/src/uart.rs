//! Serial link to the radio co-processor
//!
//! Wraps a blocking embassy-rp UART. Break is held through the line
//! control register so it can stay asserted across the target's reset,
//! and reads give up once the line has been idle for the configured
//! timeout instead of blocking forever.

use embassy_rp::pac;
use embassy_rp::uart::{self, Blocking, Instance, RxPin, TxPin, Uart};
use embassy_rp::Peri;
use embassy_time::{Duration, Instant};

use tilda_hal::uart::{DataBits, Parity, StopBits};
use tilda_hal::{UartBreak, UartConfig, UartRx, UartTx};

/// Idle time after which a read is abandoned
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// UART peripheral identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartId {
    Uart0,
    Uart1,
}

impl UartId {
    fn regs(self) -> pac::uart::Uart {
        match self {
            UartId::Uart0 => pac::UART0,
            UartId::Uart1 => pac::UART1,
        }
    }
}

/// Determine which UART can use a given GPIO pin
pub fn gpio_to_uart(gpio: u8) -> Option<UartId> {
    // UART0: GPIO 0/1, 12/13, 16/17, 28/29
    // UART1: GPIO 4/5, 8/9, 20/21, 24/25
    match gpio {
        0 | 1 | 12 | 13 | 16 | 17 | 28 | 29 => Some(UartId::Uart0),
        4 | 5 | 8 | 9 | 20 | 21 | 24 | 25 => Some(UartId::Uart1),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartError {
    /// Line idle for longer than the read timeout
    Timeout,
    /// Framing, parity, break or overrun reported by the peripheral
    Uart(uart::Error),
}

impl From<uart::Error> for UartError {
    fn from(e: uart::Error) -> Self {
        UartError::Uart(e)
    }
}

fn to_embassy(config: &UartConfig) -> uart::Config {
    let mut out = uart::Config::default();
    out.baudrate = config.baudrate;
    out.data_bits = match config.data_bits {
        DataBits::Seven => uart::DataBits::DataBits7,
        // RP2040 has no 9-bit mode
        DataBits::Eight | DataBits::Nine => uart::DataBits::DataBits8,
    };
    out.parity = match config.parity {
        Parity::None => uart::Parity::ParityNone,
        Parity::Even => uart::Parity::ParityEven,
        Parity::Odd => uart::Parity::ParityOdd,
    };
    out.stop_bits = match config.stop_bits {
        StopBits::One => uart::StopBits::STOP1,
        StopBits::Two => uart::StopBits::STOP2,
    };
    out
}

/// Blocking UART with break control and idle timeout
pub struct BootloaderUart<'d> {
    uart: Uart<'d, Blocking>,
    regs: pac::uart::Uart,
    timeout: Duration,
}

impl<'d> BootloaderUart<'d> {
    /// `id` must name the same peripheral as `uart`
    pub fn new<T: Instance>(
        uart: Peri<'d, T>,
        id: UartId,
        tx: Peri<'d, impl TxPin<T>>,
        rx: Peri<'d, impl RxPin<T>>,
        config: &UartConfig,
    ) -> Self {
        Self {
            uart: Uart::new_blocking(uart, tx, rx, to_embassy(config)),
            regs: id.regs(),
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn rx_empty(&self) -> bool {
        self.regs.uartfr().read().rxfe()
    }
}

impl<'d> UartTx for BootloaderUart<'d> {
    type Error = UartError;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.uart.blocking_write(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.uart.blocking_flush()?;
        Ok(())
    }
}

impl<'d> UartRx for BootloaderUart<'d> {
    type Error = UartError;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut deadline = Instant::now() + self.timeout;
        let mut filled = 0;

        while filled < buf.len() {
            if self.rx_empty() {
                if Instant::now() >= deadline {
                    return Err(UartError::Timeout);
                }
                continue;
            }
            // FIFO holds at least one byte, so this returns immediately
            self.uart.blocking_read(&mut buf[filled..filled + 1])?;
            filled += 1;
            deadline = Instant::now() + self.timeout;
        }

        Ok(filled)
    }
}

impl<'d> UartBreak for BootloaderUart<'d> {
    fn set_break(&mut self, asserted: bool) {
        if asserted {
            // Let pending bytes leave before the line is forced low
            let _ = self.uart.blocking_flush();
        }
        self.regs.uartlcr_h().modify(|w| w.set_brk(asserted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpio_to_uart() {
        assert_eq!(gpio_to_uart(4), Some(UartId::Uart1));
        assert_eq!(gpio_to_uart(5), Some(UartId::Uart1));
        assert_eq!(gpio_to_uart(0), Some(UartId::Uart0));
        assert_eq!(gpio_to_uart(2), None);
    }
}
