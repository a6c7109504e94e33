// StrikeTrigger - Status Display
//
// The pipeline reports (label, text) pairs after every state change; how they
// are shown is up to the implementation.

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

pub type StatusField = (&'static str, String);

pub trait StatusDisplay {
    fn report(&mut self, fields: &[StatusField]) -> anyhow::Result<()>;
}

/// Draw targets that buffer locally and need an explicit push to the glass.
pub trait Flush {
    type Error: core::fmt::Debug;

    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Writes each report as one log line.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn report(&mut self, fields: &[StatusField]) -> anyhow::Result<()> {
        let line: Vec<String> = fields
            .iter()
            .map(|(label, value)| format!("{label}={value}"))
            .collect();
        log::info!("[status] {}", line.join(" "));
        Ok(())
    }
}

const LINE_HEIGHT: i32 = 12;

/// One `LABEL: value` line per field on a monochrome panel.
pub struct StatusPanel<D> {
    target: D,
}

impl<D> StatusPanel<D>
where
    D: DrawTarget<Color = BinaryColor>,
{
    pub fn new(target: D) -> Self {
        Self { target }
    }

    pub fn draw(&mut self, fields: &[StatusField]) -> Result<(), D::Error> {
        self.target.clear(BinaryColor::Off)?;
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        for (row, (label, value)) in fields.iter().enumerate() {
            let line = format!("{label}: {value}");
            Text::with_baseline(&line, Point::new(0, row as i32 * LINE_HEIGHT), style, Baseline::Top)
                .draw(&mut self.target)?;
        }
        Ok(())
    }

    pub fn release(self) -> D {
        self.target
    }
}

impl<D> StatusDisplay for StatusPanel<D>
where
    D: DrawTarget<Color = BinaryColor> + Flush,
    <D as DrawTarget>::Error: core::fmt::Debug,
{
    fn report(&mut self, fields: &[StatusField]) -> anyhow::Result<()> {
        self.draw(fields)
            .map_err(|e| anyhow::anyhow!("panel draw failed: {:?}", e))?;
        self.target
            .flush()
            .map_err(|e| anyhow::anyhow!("panel flush failed: {:?}", e))
    }
}
