// StrikeTrigger - Two-Wire Bus Transport
//
// Register transactions (write, read, burst read) on top of a phase-level
// `HardwareBus`. Every phase is acknowledged by a TWI-style status code that is
// checked before the next phase starts. A failing phase aborts the whole
// transaction; the bus is always released with exactly one STOP.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::{ConfigError, TWI_MAX_WAIT_POLLS};

/// Phase status codes (upper five bits of the status register).
pub mod status {
    pub const MASK: u8 = 0xF8;
    pub const START: u8 = 0x08;
    pub const REPEATED_START: u8 = 0x10;
    pub const ADDR_W_ACK: u8 = 0x18;
    pub const ADDR_W_NACK: u8 = 0x20;
    pub const DATA_TX_ACK: u8 = 0x28;
    pub const DATA_TX_NACK: u8 = 0x30;
    pub const ADDR_R_ACK: u8 = 0x40;
    pub const ADDR_R_NACK: u8 = 0x48;
    pub const DATA_RX_ACK: u8 = 0x50;
    pub const DATA_RX_NACK: u8 = 0x58;
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// 7-bit device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAddress(u8);

impl BusAddress {
    pub fn new(addr: u8) -> Result<Self, ConfigError> {
        if addr > 0x7F {
            Err(ConfigError::AddressOutOfRange(addr))
        } else {
            Ok(Self(addr))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    fn write_byte(self) -> u8 {
        self.0 << 1
    }

    fn read_byte(self) -> u8 {
        (self.0 << 1) | 1
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = ConfigError;

    fn try_from(addr: u8) -> Result<Self, Self::Error> {
        Self::new(addr)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Physical layer
// ---------------------------------------------------------------------------

/// Phase-level access to a two-wire master.
///
/// Each command starts one phase; the transport then polls
/// [`is_phase_complete`](Self::is_phase_complete) until the hardware is ready
/// and reads [`status`](Self::status) to see how the phase ended.
pub trait HardwareBus {
    /// START, or a repeated START while a transaction is open.
    fn start(&mut self);
    /// Shift out one byte (address or data) and sample the acknowledge bit.
    fn transmit(&mut self, byte: u8);
    /// Shift in one byte, answering with ACK (`true`) or NACK (`false`).
    fn receive(&mut self, ack: bool);
    /// STOP condition. Completes without a phase wait.
    fn stop(&mut self);
    fn is_phase_complete(&mut self) -> bool;
    fn status(&self) -> u8;
    /// Last byte shifted in by [`receive`](Self::receive).
    fn data(&self) -> u8;
}

/// One physical layer handed to several drivers on the same thread.
///
/// Transactions run from START to STOP inside a single transport call, so
/// two drivers can never interleave their phases.
pub struct SharedBus<B>(Rc<RefCell<B>>);

impl<B> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self(Rc::new(RefCell::new(bus)))
    }

    /// Run `f` with the underlying bus borrowed.
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<B: HardwareBus> HardwareBus for SharedBus<B> {
    fn start(&mut self) {
        self.0.borrow_mut().start();
    }

    fn transmit(&mut self, byte: u8) {
        self.0.borrow_mut().transmit(byte);
    }

    fn receive(&mut self, ack: bool) {
        self.0.borrow_mut().receive(ack);
    }

    fn stop(&mut self) {
        self.0.borrow_mut().stop();
    }

    fn is_phase_complete(&mut self) -> bool {
        self.0.borrow_mut().is_phase_complete()
    }

    fn status(&self) -> u8 {
        self.0.borrow().status()
    }

    fn data(&self) -> u8 {
        self.0.borrow().data()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Address,
    Register,
    Data,
    RepeatedStart,
    ReadAddress,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("device {addr} did not acknowledge write address (status 0x{status:02X})")]
    AddressNotAcknowledged { addr: BusAddress, status: u8 },
    #[error("register 0x{reg:02X} not acknowledged (status 0x{status:02X})")]
    RegisterNotAcknowledged { reg: u8, status: u8 },
    #[error("data byte not acknowledged (status 0x{status:02X})")]
    DataNotAcknowledged { status: u8 },
    #[error("device {addr} did not acknowledge read address (status 0x{status:02X})")]
    ReadAddressNotAcknowledged { addr: BusAddress, status: u8 },
    #[error("bus phase {phase:?} did not complete")]
    Timeout { phase: Phase },
    #[error("zero-length read requested")]
    EmptyRead,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwiConfig {
    max_wait_polls: u32,
}

impl TwiConfig {
    /// `max_wait_polls` busy-polls are allowed per phase before giving up
    /// with [`BusError::Timeout`]. Zero would fail every phase.
    pub fn new(max_wait_polls: u32) -> Result<Self, ConfigError> {
        if max_wait_polls == 0 {
            return Err(ConfigError::ZeroWaitBudget);
        }
        Ok(Self { max_wait_polls })
    }

    pub fn max_wait_polls(&self) -> u32 {
        self.max_wait_polls
    }
}

impl Default for TwiConfig {
    fn default() -> Self {
        Self {
            max_wait_polls: TWI_MAX_WAIT_POLLS,
        }
    }
}

pub struct Twi<B> {
    bus: B,
    config: TwiConfig,
}

impl<B: HardwareBus> Twi<B> {
    pub fn new(bus: B) -> Self {
        Self::with_config(bus, TwiConfig::default())
    }

    pub fn with_config(bus: B, config: TwiConfig) -> Self {
        Self { bus, config }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Returns the physical layer, consuming the transport.
    pub fn release(self) -> B {
        self.bus
    }

    pub fn write_register(&mut self, addr: BusAddress, reg: u8, value: u8) -> Result<(), BusError> {
        let result = self
            .select_register(addr, reg)
            .and_then(|()| self.send_data(value));
        self.bus.stop();
        result
    }

    /// Register select followed by `data`, one byte per phase (the device
    /// auto-increments or streams, e.g. display RAM).
    pub fn write_block(&mut self, addr: BusAddress, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let result = self
            .select_register(addr, reg)
            .and_then(|()| data.iter().try_for_each(|&b| self.send_data(b)));
        self.bus.stop();
        result
    }

    pub fn read_register(&mut self, addr: BusAddress, reg: u8) -> Result<u8, BusError> {
        let [value] = self.read_array::<1>(addr, reg)?;
        Ok(value)
    }

    /// Burst read into a fixed-size array (device auto-increments `reg`).
    pub fn read_array<const N: usize>(&mut self, addr: BusAddress, reg: u8) -> Result<[u8; N], BusError> {
        let mut buf = [0u8; N];
        self.read_burst(addr, reg, &mut buf)?;
        Ok(buf)
    }

    /// Burst read of `buf.len()` bytes starting at `reg`.
    ///
    /// The read succeeds or fails as a whole: on error `buf` is zeroed, never
    /// left half filled.
    pub fn read_burst(&mut self, addr: BusAddress, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if buf.is_empty() {
            return Err(BusError::EmptyRead);
        }
        let result = self
            .select_register(addr, reg)
            .and_then(|()| self.address_for_read(addr))
            .and_then(|()| self.receive_into(buf));
        self.bus.stop();
        if result.is_err() {
            buf.fill(0);
        }
        result
    }

    /// START, SLA+W, register index.
    fn select_register(&mut self, addr: BusAddress, reg: u8) -> Result<(), BusError> {
        self.bus.start();
        self.wait(Phase::Start)?;

        self.bus.transmit(addr.write_byte());
        self.wait(Phase::Address)?;
        let st = self.status();
        if st != status::ADDR_W_ACK {
            return Err(BusError::AddressNotAcknowledged { addr, status: st });
        }

        self.bus.transmit(reg);
        self.wait(Phase::Register)?;
        let st = self.status();
        if st != status::DATA_TX_ACK {
            return Err(BusError::RegisterNotAcknowledged { reg, status: st });
        }
        Ok(())
    }

    fn send_data(&mut self, value: u8) -> Result<(), BusError> {
        self.bus.transmit(value);
        self.wait(Phase::Data)?;
        let st = self.status();
        if st != status::DATA_TX_ACK {
            return Err(BusError::DataNotAcknowledged { status: st });
        }
        Ok(())
    }

    /// Repeated START, SLA+R.
    fn address_for_read(&mut self, addr: BusAddress) -> Result<(), BusError> {
        self.bus.start();
        self.wait(Phase::RepeatedStart)?;

        self.bus.transmit(addr.read_byte());
        self.wait(Phase::ReadAddress)?;
        let st = self.status();
        if st != status::ADDR_R_ACK {
            return Err(BusError::ReadAddressNotAcknowledged { addr, status: st });
        }
        Ok(())
    }

    /// ACK every byte but the last, which is NACKed to end the burst.
    fn receive_into(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let last = buf.len() - 1;
        for (i, slot) in buf.iter_mut().enumerate() {
            self.bus.receive(i < last);
            self.wait(Phase::Receive)?;
            *slot = self.bus.data();
        }
        Ok(())
    }

    fn status(&self) -> u8 {
        self.bus.status() & status::MASK
    }

    fn wait(&mut self, phase: Phase) -> Result<(), BusError> {
        for _ in 0..self.config.max_wait_polls {
            if self.bus.is_phase_complete() {
                return Ok(());
            }
        }
        Err(BusError::Timeout { phase })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{BusOp, Fault, SimulatedBus};

    const ADDR: u8 = 0x6B;

    fn addr() -> BusAddress {
        BusAddress::new(ADDR).unwrap()
    }

    fn twi() -> Twi<SimulatedBus> {
        Twi::new(SimulatedBus::new(ADDR))
    }

    #[test]
    fn address_must_fit_in_seven_bits() {
        assert!(BusAddress::new(0x7F).is_ok());
        assert_eq!(BusAddress::try_from(0x80), Err(ConfigError::AddressOutOfRange(0x80)));
    }

    #[test]
    fn write_register_runs_all_phases() {
        let mut twi = twi();
        twi.write_register(addr(), 0x10, 0x4C).unwrap();

        assert_eq!(
            twi.bus().ops(),
            &[
                BusOp::Start,
                BusOp::Transmit(ADDR << 1),
                BusOp::Transmit(0x10),
                BusOp::Transmit(0x4C),
                BusOp::Stop,
            ]
        );
        assert_eq!(twi.bus().register(0x10), 0x4C);
    }

    #[test]
    fn single_read_nacks_its_only_byte() {
        let mut twi = twi();
        twi.bus_mut().set_register(0x0F, 0x6C);

        assert_eq!(twi.read_register(addr(), 0x0F), Ok(0x6C));
        assert_eq!(
            twi.bus().ops(),
            &[
                BusOp::Start,
                BusOp::Transmit(ADDR << 1),
                BusOp::Transmit(0x0F),
                BusOp::Start,
                BusOp::Transmit((ADDR << 1) | 1),
                BusOp::Receive { ack: false },
                BusOp::Stop,
            ]
        );
    }

    #[test]
    fn burst_read_acks_all_but_last() {
        let mut twi = twi();
        for (i, reg) in (0x28..0x2E).enumerate() {
            twi.bus_mut().set_register(reg, i as u8 + 1);
        }

        let bytes = twi.read_array::<6>(addr(), 0x28).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 5, 6]);

        let acks: Vec<bool> = twi
            .bus()
            .ops()
            .iter()
            .filter_map(|op| match op {
                BusOp::Receive { ack } => Some(*ack),
                _ => None,
            })
            .collect();
        assert_eq!(acks, [true, true, true, true, true, false]);
    }

    #[test]
    fn missing_device_fails_at_address_phase() {
        let mut twi = Twi::new(SimulatedBus::new(0x6A));

        let err = twi.write_register(addr(), 0x10, 0x4C).unwrap_err();
        assert_eq!(
            err,
            BusError::AddressNotAcknowledged {
                addr: addr(),
                status: status::ADDR_W_NACK
            }
        );
        assert_eq!(twi.bus().stop_count(), 1);
    }

    #[test]
    fn register_nack_aborts_write() {
        let mut twi = twi();
        twi.bus_mut().set_fault(Some(Fault::RegisterNack));

        let err = twi.write_register(addr(), 0x10, 0x4C).unwrap_err();
        assert!(matches!(err, BusError::RegisterNotAcknowledged { reg: 0x10, .. }));
        assert_eq!(twi.bus().register(0x10), 0);
        assert!(!twi.bus().ops().contains(&BusOp::Transmit(0x4C)));
        assert_eq!(twi.bus().stop_count(), 1);
    }

    #[test]
    fn data_nack_aborts_write() {
        let mut twi = twi();
        twi.bus_mut().set_fault(Some(Fault::DataNack));

        let err = twi.write_register(addr(), 0x12, 0x44).unwrap_err();
        assert_eq!(err, BusError::DataNotAcknowledged { status: status::DATA_TX_NACK });
        assert_eq!(twi.bus().stop_count(), 1);
    }

    #[test]
    fn read_address_nack_stops_exactly_once() {
        let mut twi = twi();
        twi.bus_mut().set_fault(Some(Fault::ReadAddressNack));

        let err = twi.read_register(addr(), 0x0F).unwrap_err();
        assert_eq!(
            err,
            BusError::ReadAddressNotAcknowledged {
                addr: addr(),
                status: status::ADDR_R_NACK
            }
        );
        assert_eq!(twi.bus().stop_count(), 1);
        assert_eq!(twi.bus().ops().last(), Some(&BusOp::Stop));
        assert!(!twi
            .bus()
            .ops()
            .iter()
            .any(|op| matches!(op, BusOp::Receive { .. })));
    }

    #[test]
    fn hung_phase_times_out_and_releases_bus() {
        let mut twi = Twi::with_config(SimulatedBus::new(ADDR), TwiConfig::new(16).unwrap());
        twi.bus_mut().set_fault(Some(Fault::Hang));

        let err = twi.read_register(addr(), 0x0F).unwrap_err();
        assert_eq!(err, BusError::Timeout { phase: Phase::Start });
        assert_eq!(twi.bus().stop_count(), 1);
    }

    #[test]
    fn zero_wait_budget_is_rejected() {
        assert_eq!(TwiConfig::new(0), Err(ConfigError::ZeroWaitBudget));
        assert_eq!(TwiConfig::new(1).map(|c| c.max_wait_polls()), Ok(1));
        assert_eq!(TwiConfig::default().max_wait_polls(), TWI_MAX_WAIT_POLLS);
    }

    #[test]
    fn write_address_nack_on_read_stops_exactly_once() {
        let mut twi = twi();
        twi.bus_mut().set_fault(Some(Fault::AddressNack));

        let err = twi.read_register(addr(), 0x0F).unwrap_err();
        assert_eq!(
            err,
            BusError::AddressNotAcknowledged {
                addr: addr(),
                status: status::ADDR_W_NACK
            }
        );
        assert_eq!(
            twi.bus().ops(),
            &[BusOp::Start, BusOp::Transmit(ADDR << 1), BusOp::Stop]
        );
    }

    #[test]
    fn failed_burst_leaves_buffer_zeroed() {
        let mut twi = twi();
        twi.bus_mut().set_fault(Some(Fault::ReadAddressNack));
        let mut buf = [0xAA; 6];

        assert!(twi.read_burst(addr(), 0x28, &mut buf).is_err());
        assert_eq!(buf, [0; 6]);
    }

    #[test]
    fn stalled_receive_discards_partial_burst() {
        let mut twi = Twi::with_config(SimulatedBus::new(ADDR), TwiConfig::new(16).unwrap());
        for reg in 0x28..0x2E {
            twi.bus_mut().set_register(reg, 0x55);
        }
        twi.bus_mut().set_fault(Some(Fault::HangAfterReceive(2)));
        let mut buf = [0xAA; 6];

        let err = twi.read_burst(addr(), 0x28, &mut buf).unwrap_err();
        assert_eq!(err, BusError::Timeout { phase: Phase::Receive });
        assert_eq!(buf, [0; 6]);
        assert_eq!(twi.bus().stop_count(), 1);
    }

    #[test]
    fn block_write_streams_every_byte() {
        let mut twi = twi();
        twi.write_block(addr(), 0x40, &[0x01, 0x02, 0x03]).unwrap();

        assert_eq!(twi.bus().writes(), &[(0x40, 0x01), (0x41, 0x02), (0x42, 0x03)]);
        assert_eq!(twi.bus().stop_count(), 1);
    }

    #[test]
    fn shared_bus_serves_two_transports() {
        let shared = SharedBus::new(SimulatedBus::new(ADDR));
        let mut first = Twi::new(shared.clone());
        let mut second = Twi::new(shared.clone());

        first.write_register(addr(), 0x10, 0x4C).unwrap();
        assert_eq!(second.read_register(addr(), 0x10), Ok(0x4C));
        assert_eq!(shared.with(|bus| bus.stop_count()), 2);
    }

    #[test]
    fn slow_phases_complete_within_budget() {
        let mut twi = twi();
        twi.bus_mut().set_phase_latency(5);
        twi.bus_mut().set_register(0x0F, 0x6C);

        assert_eq!(twi.read_register(addr(), 0x0F), Ok(0x6C));
    }

    #[test]
    fn empty_burst_never_touches_the_bus() {
        let mut twi = twi();
        let mut buf = [0u8; 0];

        assert_eq!(twi.read_burst(addr(), 0x28, &mut buf), Err(BusError::EmptyRead));
        assert!(twi.bus().ops().is_empty());
    }
}
