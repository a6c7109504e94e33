// StrikeTrigger - Bit-Banged Two-Wire Master (ESP32-C3)
//
// Drives SDA/SCL as open-drain GPIOs and reports each phase with the same
// status codes a hardware TWI block would. Clock stretching is honoured up to
// TWI_CLOCK_STRETCH_POLLS; past that the phase never completes and the
// transport's bounded wait turns it into a timeout.

use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use esp_idf_sys::EspError;

use crate::config::*;
use crate::drivers::twi::{status, HardwareBus};

pub struct BitBangBus<'d> {
    sda: PinDriver<'d, AnyIOPin, InputOutput>,
    scl: PinDriver<'d, AnyIOPin, InputOutput>,
    half_period_us: u32,
    status: u8,
    data: u8,
    complete: bool,
    in_transaction: bool,
    expect_address: bool,
}

impl<'d> BitBangBus<'d> {
    pub fn new(sda: AnyIOPin, scl: AnyIOPin) -> Result<Self, EspError> {
        let mut sda = PinDriver::input_output_od(sda)?;
        let mut scl = PinDriver::input_output_od(scl)?;
        sda.set_pull(Pull::Up)?;
        scl.set_pull(Pull::Up)?;
        sda.set_high()?;
        scl.set_high()?;

        Ok(Self {
            sda,
            scl,
            half_period_us: TWI_HALF_PERIOD_US,
            status: status::MASK,
            data: 0,
            complete: true,
            in_transaction: false,
            expect_address: false,
        })
    }

    fn delay(&self) {
        Ets::delay_us(self.half_period_us);
    }

    fn set_sda(&mut self, high: bool) {
        let _ = if high { self.sda.set_high() } else { self.sda.set_low() };
    }

    /// Release SCL and wait for any clock stretching to end.
    fn release_scl(&mut self) -> bool {
        let _ = self.scl.set_high();
        for _ in 0..TWI_CLOCK_STRETCH_POLLS {
            if self.scl.is_high() {
                return true;
            }
            Ets::delay_us(1);
        }
        false
    }

    fn clock_out(&mut self, bit: bool) -> bool {
        self.set_sda(bit);
        self.delay();
        if !self.release_scl() {
            return false;
        }
        self.delay();
        let _ = self.scl.set_low();
        true
    }

    fn clock_in(&mut self) -> Option<bool> {
        self.set_sda(true);
        self.delay();
        if !self.release_scl() {
            return None;
        }
        let bit = self.sda.is_high();
        self.delay();
        let _ = self.scl.set_low();
        Some(bit)
    }

    fn finish(&mut self, code: u8) {
        self.status = code;
        self.complete = true;
    }
}

impl HardwareBus for BitBangBus<'_> {
    fn start(&mut self) {
        self.complete = false;
        let repeated = self.in_transaction;
        if repeated {
            self.set_sda(true);
            self.delay();
            if !self.release_scl() {
                return;
            }
            self.delay();
        }
        self.set_sda(false);
        self.delay();
        let _ = self.scl.set_low();

        self.in_transaction = true;
        self.expect_address = true;
        self.finish(if repeated { status::REPEATED_START } else { status::START });
    }

    fn transmit(&mut self, byte: u8) {
        self.complete = false;
        for i in (0..8).rev() {
            if !self.clock_out((byte >> i) & 1 == 1) {
                return;
            }
        }
        let Some(nack) = self.clock_in() else {
            return;
        };

        let code = if self.expect_address {
            self.expect_address = false;
            match (byte & 1 == 1, nack) {
                (false, false) => status::ADDR_W_ACK,
                (false, true) => status::ADDR_W_NACK,
                (true, false) => status::ADDR_R_ACK,
                (true, true) => status::ADDR_R_NACK,
            }
        } else if nack {
            status::DATA_TX_NACK
        } else {
            status::DATA_TX_ACK
        };
        self.finish(code);
    }

    fn receive(&mut self, ack: bool) {
        self.complete = false;
        let mut byte = 0u8;
        for _ in 0..8 {
            let Some(bit) = self.clock_in() else {
                return;
            };
            byte = (byte << 1) | bit as u8;
        }
        // ACK pulls SDA low for the ninth clock.
        if !self.clock_out(!ack) {
            return;
        }
        self.set_sda(true);

        self.data = byte;
        self.finish(if ack { status::DATA_RX_ACK } else { status::DATA_RX_NACK });
    }

    fn stop(&mut self) {
        self.set_sda(false);
        self.delay();
        let _ = self.release_scl();
        self.delay();
        self.set_sda(true);
        self.delay();

        self.in_transaction = false;
        self.expect_address = false;
        self.complete = true;
    }

    fn is_phase_complete(&mut self) -> bool {
        self.complete
    }

    fn status(&self) -> u8 {
        self.status
    }

    fn data(&self) -> u8 {
        self.data
    }
}
