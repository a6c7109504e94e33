// StrikeTrigger - Firmware Entry Point
//
// Boot sequence (ESP32-C3):
//   1. Initialise logging and take the peripherals.
//   2. Bring up the bit-banged bus (IMU + OLED), the UART uplink and the LED.
//   3. Identify and configure the IMU. On failure, log once and halt.
//   4. Bring up the OLED status panel; without one, status goes to the log.
//   5. Run the trigger loop forever.
//
// On a host build the same pipeline runs against the simulated bus, which
// plays back a train of drum hits.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    device::main()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    host::main()
}

#[cfg(target_os = "espidf")]
mod device {
    use std::thread;
    use std::time::Duration;

    use esp_idf_hal::gpio::{AnyIOPin, IOPin, OutputPin, PinDriver};
    use esp_idf_hal::prelude::*;
    use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};

    use striketrigger::config::*;
    use striketrigger::drivers::display::{LogDisplay, StatusDisplay, StatusPanel};
    use striketrigger::drivers::gpio_twi::BitBangBus;
    use striketrigger::drivers::imu::Lsm6;
    use striketrigger::drivers::indicator::LedIndicator;
    use striketrigger::drivers::oled::Ssd1306;
    use striketrigger::drivers::twi::{BusAddress, SharedBus, Twi};
    use striketrigger::drivers::uplink::UartUplink;
    use striketrigger::tasks::trigger::TriggerPipeline;

    pub fn main() -> anyhow::Result<()> {
        // Link esp-idf-sys runtime patches and initialise logging.
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        // The pad is chosen when the firmware is built, one image per trigger.
        let config = match option_env!("STRIKETRIGGER_PAD") {
            Some(pad) => pad.parse::<TriggerConfig>()?,
            None => TriggerConfig::default(),
        };
        log::info!("StrikeTrigger firmware starting ({})", config.pad.display_name());

        // ---- Peripherals --------------------------------------------------
        let peripherals = Peripherals::take()?;

        // IMU and OLED share one bus; each transaction completes before the
        // next driver gets it.
        let bus = SharedBus::new(BitBangBus::new(
            peripherals.pins.gpio6.downgrade(), // SDA
            peripherals.pins.gpio7.downgrade(), // SCL
        )?);
        let imu = Lsm6::new(Twi::new(bus.clone()));

        let uart = UartDriver::new(
            peripherals.uart1,
            peripherals.pins.gpio21, // TX
            peripherals.pins.gpio20, // RX
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &UartConfig::new().baudrate(UPLINK_BAUD.Hz()),
        )?;
        let led = PinDriver::output(peripherals.pins.gpio10.downgrade_output())?;

        // ---- Sensor bring-up ----------------------------------------------
        let mut pipeline = match TriggerPipeline::start(imu, config) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("IMU initialisation failed: {:#}", e);
                halt();
            }
        };
        let mut oled = Ssd1306::new(Twi::new(bus), BusAddress::new(I2C_ADDR_OLED)?);
        let display: Box<dyn StatusDisplay> = match oled.init() {
            Ok(()) => Box::new(StatusPanel::new(oled)),
            Err(e) => {
                log::warn!("OLED not available ({}), status goes to the log", e);
                Box::new(LogDisplay)
            }
        };
        pipeline = pipeline
            .with_sink(Box::new(UartUplink::new(uart)))
            .with_indicator(Box::new(LedIndicator::new(led)))
            .with_display(display);

        pipeline.run()
    }

    /// Park forever after a fatal bring-up error. The error has already been
    /// reported once.
    fn halt() -> ! {
        loop {
            thread::sleep(Duration::from_millis(HALT_RETRY_MS));
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::env;

    use striketrigger::config::*;
    use striketrigger::drivers::display::LogDisplay;
    use striketrigger::drivers::imu::Lsm6;
    use striketrigger::drivers::sim::{drum_hits, SimulatedBus};
    use striketrigger::drivers::twi::Twi;
    use striketrigger::drivers::uplink::LogUplink;
    use striketrigger::tasks::trigger::TriggerPipeline;

    /// `striketrigger [pad] [polls]`, with the pad also read from
    /// `STRIKETRIGGER_PAD`.
    pub fn main() -> anyhow::Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

        let SimOptions { config, polls } =
            SimOptions::from_args(env::args().skip(1), env::var("STRIKETRIGGER_PAD").ok())?;

        let bus = SimulatedBus::new(config.address).with_waveform(drum_hits(SIM_HIT_PERIOD));
        let mut pipeline = TriggerPipeline::start(Lsm6::new(Twi::new(bus)), config)?
            .with_sink(Box::new(LogUplink))
            .with_display(Box::new(LogDisplay));

        pipeline.run_for(polls);

        let stats = pipeline.stats();
        log::info!(
            "{} polls, {} skipped, {} strikes, average {:.2} g",
            stats.polls,
            stats.skipped,
            stats.strikes,
            pipeline.metrics().current_average()
        );
        Ok(())
    }
}
