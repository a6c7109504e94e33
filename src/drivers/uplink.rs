// StrikeTrigger - Strike Uplink
//
// One marker byte per strike to the drum-kit receiver. Fire-and-forget: the
// receiver never answers.

pub trait StrikeSink {
    fn notify(&mut self, marker: u8) -> anyhow::Result<()>;
}

/// Host stand-in for the serial link.
#[derive(Debug, Default)]
pub struct LogUplink;

impl StrikeSink for LogUplink {
    fn notify(&mut self, marker: u8) -> anyhow::Result<()> {
        log::info!("uplink <- '{}'", marker as char);
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub use self::uart::UartUplink;

#[cfg(target_os = "espidf")]
mod uart {
    use esp_idf_hal::uart::UartDriver;

    use super::StrikeSink;

    pub struct UartUplink<'d> {
        uart: UartDriver<'d>,
    }

    impl<'d> UartUplink<'d> {
        pub fn new(uart: UartDriver<'d>) -> Self {
            Self { uart }
        }
    }

    impl StrikeSink for UartUplink<'_> {
        fn notify(&mut self, marker: u8) -> anyhow::Result<()> {
            self.uart.write(&[marker])?;
            Ok(())
        }
    }
}
