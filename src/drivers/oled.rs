// StrikeTrigger - SSD1306 OLED Driver
//
// 128x64 monochrome panel on the two-wire bus. Drawing goes to a local frame
// buffer; `flush` only sends the 8-row pages that changed, which keeps a
// status refresh short on the bit-banged bus.

use std::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;

use crate::config::*;
use crate::drivers::display::Flush;
use crate::drivers::twi::{BusAddress, BusError, HardwareBus, Twi};

/// Control byte announcing a command stream.
const CONTROL_COMMAND: u8 = 0x00;
/// Control byte announcing display RAM data.
const CONTROL_DATA: u8 = 0x40;

const PAGES: usize = (SCREEN_HEIGHT / 8) as usize;
const WIDTH: usize = SCREEN_WIDTH as usize;

/// Power-on sequence for a 128x64 module with the internal charge pump.
pub const INIT_SEQUENCE: [u8; 24] = [
    0xAE, // display off
    0xD5, 0x80, // clock divide
    0xA8, 0x3F, // multiplex 64
    0xD3, 0x00, // no display offset
    0x40, // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x02, // page addressing mode
    0xA1, // segment remap
    0xC8, // COM scan descending
    0xDA, 0x12, // COM pins
    0x81, 0xCF, // contrast
    0xD9, 0xF1, // pre-charge
    0xDB, 0x40, // VCOMH deselect
    0xA4, // follow RAM
    0xAF, // display on
];

pub struct Ssd1306<B> {
    twi: Twi<B>,
    addr: BusAddress,
    buffer: [u8; DISPLAY_BUFFER_SIZE],
    dirty: u8,
}

impl<B: HardwareBus> Ssd1306<B> {
    pub fn new(twi: Twi<B>, addr: BusAddress) -> Self {
        Self {
            twi,
            addr,
            buffer: [0; DISPLAY_BUFFER_SIZE],
            dirty: 0,
        }
    }

    /// Send the power-on sequence and blank the panel.
    pub fn init(&mut self) -> Result<(), BusError> {
        for cmd in INIT_SEQUENCE {
            self.command(cmd)?;
        }
        self.buffer.fill(0);
        self.dirty = u8::MAX;
        self.flush_pages()?;
        log::info!("OLED initialised at {}", self.addr);
        Ok(())
    }

    /// Pages waiting to be sent, one bit per page.
    pub fn dirty_pages(&self) -> u8 {
        self.dirty
    }

    pub fn twi(&self) -> &Twi<B> {
        &self.twi
    }

    fn command(&mut self, cmd: u8) -> Result<(), BusError> {
        self.twi.write_register(self.addr, CONTROL_COMMAND, cmd)
    }

    fn flush_pages(&mut self) -> Result<(), BusError> {
        for page in 0..PAGES {
            if self.dirty & (1 << page) == 0 {
                continue;
            }
            self.command(0xB0 | page as u8)?;
            self.command(0x00)?; // column low nibble
            self.command(0x10)?; // column high nibble
            let row = &self.buffer[page * WIDTH..(page + 1) * WIDTH];
            self.twi.write_block(self.addr, CONTROL_DATA, row)?;
            self.dirty &= !(1 << page);
        }
        Ok(())
    }
}

impl<B: HardwareBus> Flush for Ssd1306<B> {
    type Error = BusError;

    fn flush(&mut self) -> Result<(), BusError> {
        self.flush_pages()
    }
}

impl<B> OriginDimensions for Ssd1306<B> {
    fn size(&self) -> Size {
        Size::new(SCREEN_WIDTH, SCREEN_HEIGHT)
    }
}

impl<B> DrawTarget for Ssd1306<B> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (usize::try_from(point.x), usize::try_from(point.y)) else {
                continue;
            };
            if x >= WIDTH || y >= PAGES * 8 {
                continue;
            }
            let page = y / 8;
            let idx = page * WIDTH + x;
            let bit = 1u8 << (y % 8);
            let old = self.buffer[idx];
            let new = if color.is_on() { old | bit } else { old & !bit };
            if new != old {
                self.buffer[idx] = new;
                self.dirty |= 1 << page;
            }
        }
        Ok(())
    }
}
