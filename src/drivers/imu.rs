// StrikeTrigger - LSM6 IMU Driver
//
// Register-level accelerometer driver over the two-wire transport. The gyro is
// left powered down; only the accelerometer output block is read.

use std::thread;
use std::time::Duration;

use crate::config::*;
use crate::drivers::twi::{BusAddress, BusError, HardwareBus, Twi};
use crate::events::{Acceleration, AxisSample};

// LSM6 register addresses
pub const REG_WHO_AM_I: u8 = 0x0F;
pub const REG_CTRL1_XL: u8 = 0x10;
pub const REG_CTRL3_C: u8 = 0x12;
pub const REG_CTRL9_XL: u8 = 0x18;
pub const REG_STATUS: u8 = 0x1E;
pub const REG_OUTX_L_A: u8 = 0x28; // Start of 6-byte accelerometer burst
pub const WHO_AM_I_EXPECTED: u8 = 0x6C;
pub const STATUS_XLDA: u8 = 0x01;

/// Initialisation writes, in the order the device needs them: BDU and address
/// auto-increment first, then 104 Hz / ±8 g, then the CTRL9 axis settings.
pub const SENSOR_CONFIG: [(u8, u8); 3] = [
    (REG_CTRL3_C, 0x44),
    (REG_CTRL1_XL, 0x4C),
    (REG_CTRL9_XL, 0x38),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("WHO_AM_I read failed: {0}")]
    IdentificationFailed(#[source] BusError),
    #[error("unexpected device id 0x{found:02X} (expected 0x{expected:02X})")]
    UnexpectedDeviceId { found: u8, expected: u8 },
    #[error("config write to register 0x{register:02X} failed: {source}")]
    ConfigWriteFailed { register: u8, source: BusError },
    #[error("sample read failed: {0}")]
    ReadFailed(#[source] BusError),
    #[error("sensor not initialised")]
    NotInitialized,
}

pub struct Lsm6<B> {
    twi: Twi<B>,
    address: Option<BusAddress>,
    last_requested: Option<BusAddress>,
    power_up: Duration,
    settle: Duration,
}

impl<B: HardwareBus> Lsm6<B> {
    pub fn new(twi: Twi<B>) -> Self {
        Self {
            twi,
            address: None,
            last_requested: None,
            power_up: Duration::from_millis(IMU_POWER_UP_MS),
            settle: Duration::from_millis(IMU_SETTLE_MS),
        }
    }

    /// Override the power-up and settle waits around initialisation.
    pub fn with_delays(mut self, power_up: Duration, settle: Duration) -> Self {
        self.power_up = power_up;
        self.settle = settle;
        self
    }

    /// Address of the configured device, `None` until `initialize` succeeds.
    pub fn address(&self) -> Option<BusAddress> {
        self.address
    }

    pub fn twi(&self) -> &Twi<B> {
        &self.twi
    }

    pub fn twi_mut(&mut self) -> &mut Twi<B> {
        &mut self.twi
    }

    /// Identify the device at `addr`, then apply [`SENSOR_CONFIG`].
    ///
    /// Nothing is written unless WHO_AM_I matches. On any failure the driver
    /// is left uninitialised.
    pub fn initialize(&mut self, addr: BusAddress) -> Result<(), DriverError> {
        self.address = None;
        self.last_requested = Some(addr);
        thread::sleep(self.power_up);

        let found = self
            .twi
            .read_register(addr, REG_WHO_AM_I)
            .map_err(DriverError::IdentificationFailed)?;
        if found != WHO_AM_I_EXPECTED {
            return Err(DriverError::UnexpectedDeviceId {
                found,
                expected: WHO_AM_I_EXPECTED,
            });
        }

        for (register, value) in SENSOR_CONFIG {
            self.twi
                .write_register(addr, register, value)
                .map_err(|source| DriverError::ConfigWriteFailed { register, source })?;
        }

        thread::sleep(self.settle);
        self.address = Some(addr);
        log::info!("LSM6 initialised at {} (104 Hz, ±8g)", addr);
        Ok(())
    }

    /// Run [`initialize`](Self::initialize) again for the last requested address.
    pub fn reinitialize(&mut self) -> Result<(), DriverError> {
        let addr = self.last_requested.ok_or(DriverError::NotInitialized)?;
        self.initialize(addr)
    }

    /// XLDA flag. A failed status read counts as "nothing new".
    pub fn has_new_sample(&mut self) -> bool {
        let Some(addr) = self.address else {
            return false;
        };
        match self.twi.read_register(addr, REG_STATUS) {
            Ok(st) => st & STATUS_XLDA != 0,
            Err(e) => {
                log::debug!("status read failed: {}", e);
                false
            }
        }
    }

    pub fn fetch_raw_bytes(&mut self) -> Result<[u8; 6], DriverError> {
        let addr = self.address.ok_or(DriverError::NotInitialized)?;
        self.twi
            .read_array::<6>(addr, REG_OUTX_L_A)
            .map_err(DriverError::ReadFailed)
    }

    pub fn fetch_raw_sample(&mut self) -> Result<AxisSample, DriverError> {
        let raw = self.fetch_raw_bytes()?;
        Ok(AxisSample::from_le_bytes(&raw))
    }

    /// Burst-read all 3 axes and convert to g.
    pub fn fetch_sample_in_physical_units(&mut self) -> Result<Acceleration, DriverError> {
        Ok(self.fetch_raw_sample()?.to_g())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{Fault, SimulatedBus};

    fn addr() -> BusAddress {
        BusAddress::new(I2C_ADDR_LSM6).unwrap()
    }

    fn imu(bus: SimulatedBus) -> Lsm6<SimulatedBus> {
        Lsm6::new(Twi::new(bus)).with_delays(Duration::ZERO, Duration::ZERO)
    }

    fn ready_imu() -> Lsm6<SimulatedBus> {
        let mut imu = imu(SimulatedBus::new(I2C_ADDR_LSM6));
        imu.initialize(addr()).unwrap();
        imu
    }

    #[test]
    fn initialize_writes_config_in_order() {
        let imu = ready_imu();

        assert_eq!(imu.address(), Some(addr()));
        assert_eq!(imu.twi().bus().writes(), &SENSOR_CONFIG);
    }

    #[test]
    fn unexpected_id_skips_configuration() {
        let mut bus = SimulatedBus::new(I2C_ADDR_LSM6);
        bus.set_register(REG_WHO_AM_I, 0x6A);
        let mut imu = imu(bus);

        assert_eq!(
            imu.initialize(addr()),
            Err(DriverError::UnexpectedDeviceId {
                found: 0x6A,
                expected: WHO_AM_I_EXPECTED
            })
        );
        assert!(imu.twi().bus().writes().is_empty());
        assert_eq!(imu.address(), None);
        assert_eq!(imu.fetch_raw_sample(), Err(DriverError::NotInitialized));
    }

    #[test]
    fn absent_device_fails_identification() {
        let mut imu = imu(SimulatedBus::new(0x6A));

        let err = imu.initialize(addr()).unwrap_err();
        assert!(matches!(
            err,
            DriverError::IdentificationFailed(BusError::AddressNotAcknowledged { .. })
        ));
    }

    #[test]
    fn config_write_failure_leaves_driver_unset() {
        let mut bus = SimulatedBus::new(I2C_ADDR_LSM6);
        bus.set_fault(Some(Fault::DataNack));
        let mut imu = imu(bus);

        let err = imu.initialize(addr()).unwrap_err();
        assert!(matches!(
            err,
            DriverError::ConfigWriteFailed { register: REG_CTRL3_C, .. }
        ));
        assert_eq!(imu.address(), None);
        assert!(!imu.has_new_sample());
    }

    #[test]
    fn reinitialize_reapplies_config() {
        let mut imu = imu(SimulatedBus::new(I2C_ADDR_LSM6));
        assert_eq!(imu.reinitialize(), Err(DriverError::NotInitialized));

        imu.initialize(addr()).unwrap();
        imu.reinitialize().unwrap();
        assert_eq!(imu.twi().bus().writes().len(), 2 * SENSOR_CONFIG.len());
    }

    #[test]
    fn data_ready_follows_status_flag() {
        let mut imu = ready_imu();
        assert!(!imu.has_new_sample());

        imu.twi_mut()
            .bus_mut()
            .queue_samples([AxisSample { x: 0, y: 0, z: 4096 }]);
        assert!(imu.has_new_sample());
    }

    #[test]
    fn status_read_failure_means_no_data() {
        let mut imu = ready_imu();
        imu.twi_mut()
            .bus_mut()
            .queue_samples([AxisSample::default()]);
        imu.twi_mut().bus_mut().set_fault(Some(Fault::AddressNack));

        assert!(!imu.has_new_sample());
    }

    #[test]
    fn fetch_converts_to_g() {
        let mut imu = ready_imu();
        imu.twi_mut()
            .bus_mut()
            .queue_samples([AxisSample { x: 4096, y: -8192, z: 2048 }]);

        let accel = imu.fetch_sample_in_physical_units().unwrap();
        assert_eq!(accel.as_tuple(), (1.0, -2.0, 0.5));
    }

    #[test]
    fn fetch_surfaces_bus_errors() {
        let mut imu = ready_imu();
        imu.twi_mut().bus_mut().set_fault(Some(Fault::ReadAddressNack));

        assert!(matches!(
            imu.fetch_raw_bytes(),
            Err(DriverError::ReadFailed(BusError::ReadAddressNotAcknowledged { .. }))
        ));
    }
}
