//! GPIO pin abstractions
//!
//! Provides the output pin trait used for the co-processor reset line
//! and the storage activity LED.

/// Digital output pin
///
/// Implementations should handle the actual hardware register manipulation
/// for the specific chip.
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Set the pin to a specific state
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Check if the pin is currently set high
    fn is_set_high(&self) -> bool;

    /// Check if the pin is currently set low
    fn is_set_low(&self) -> bool {
        !self.is_set_high()
    }
}

/// Output that is never connected
///
/// For boards without a storage activity LED.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPin {
    state: bool,
}

impl OutputPin for NoPin {
    fn set_high(&mut self) {
        self.state = true;
    }

    fn set_low(&mut self) {
        self.state = false;
    }

    fn is_set_high(&self) -> bool {
        self.state
    }
}
