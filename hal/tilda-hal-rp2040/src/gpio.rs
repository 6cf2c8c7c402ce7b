//! GPIO outputs

use embassy_rp::gpio::Output;
use tilda_hal::OutputPin;

/// embassy-rp output as a Tilda `OutputPin`
pub struct Rp2040Output<'d>(Output<'d>);

impl<'d> Rp2040Output<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self(pin)
    }
}

impl<'d> OutputPin for Rp2040Output<'d> {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.0.is_set_high()
    }
}
