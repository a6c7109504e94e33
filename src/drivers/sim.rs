// StrikeTrigger - Simulated Two-Wire Bus
//
// A `HardwareBus` with one LSM6-style register device attached. Used by the
// unit tests (every phase is recorded) and by the host build, where it stands
// in for the real sensor.

use std::collections::VecDeque;

use crate::config::ACCEL_SCALE_8G;
use crate::drivers::imu::{REG_OUTX_L_A, REG_STATUS, REG_WHO_AM_I, STATUS_XLDA, WHO_AM_I_EXPECTED};
use crate::drivers::twi::{status, HardwareBus};
use crate::events::AxisSample;

/// One physical-layer command, as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Start,
    Transmit(u8),
    Receive { ack: bool },
    Stop,
}

/// Injected failure, active until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The device ignores its write address.
    AddressNack,
    RegisterNack,
    DataNack,
    /// The device ignores its read address.
    ReadAddressNack,
    /// Read address ignored only when the output block is selected; STATUS
    /// and the other registers still read fine.
    OutputReadNack,
    /// No phase ever completes (SCL held low, missing pull-ups, ...).
    Hang,
    /// The given number of receive phases complete, then the bus stalls until
    /// the next STOP.
    HangAfterReceive(u32),
}

/// Entries kept in the op and write logs. Older entries are dropped so a long
/// host run stays bounded.
pub const LOG_CAPACITY: usize = 4096;

fn push_bounded<T>(log: &mut Vec<T>, entry: T) {
    if log.len() >= LOG_CAPACITY {
        log.drain(..LOG_CAPACITY / 2);
    }
    log.push(entry);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Idle,
    Address,
    Register,
    WriteData,
    ReadData,
    Ignored,
}

/// One stick hit: a spike above the hysteresis threshold, a rebound below
/// recovery, then a single sharp dip for the peak detectors.
const HIT_SHAPE_G: [f32; 8] = [0.0, 0.6, 2.4, 1.2, -0.8, -2.6, -3.1, -1.4];

/// Waveform for [`SimulatedBus::with_waveform`]: one hit every `period`
/// samples on Y and Z, flat in between.
pub fn drum_hits(period: u64) -> impl FnMut(u64) -> AxisSample + Send + 'static {
    move |index| {
        let phase = (index % period.max(1)) as usize;
        let g = HIT_SHAPE_G.get(phase).copied().unwrap_or(0.0);
        let raw = (g * ACCEL_SCALE_8G) as i16;
        AxisSample { x: 0, y: raw, z: raw }
    }
}

type Waveform = Box<dyn FnMut(u64) -> AxisSample + Send>;

pub struct SimulatedBus {
    device_addr: u8,
    registers: [u8; 128],
    pointer: u8,
    expect: Expect,
    in_transaction: bool,
    status: u8,
    data: u8,
    fault: Option<Fault>,
    receives: u32,
    stalled: bool,
    phase_latency: u32,
    polls_left: u32,
    ops: Vec<BusOp>,
    writes: Vec<(u8, u8)>,
    queued: VecDeque<AxisSample>,
    waveform: Option<Waveform>,
    samples_latched: u64,
}

impl SimulatedBus {
    /// A bus with a healthy sensor answering at `device_addr`.
    pub fn new(device_addr: u8) -> Self {
        let mut registers = [0u8; 128];
        registers[REG_WHO_AM_I as usize] = WHO_AM_I_EXPECTED;
        Self {
            device_addr,
            registers,
            pointer: 0,
            expect: Expect::Idle,
            in_transaction: false,
            status: 0xF8,
            data: 0,
            fault: None,
            receives: 0,
            stalled: false,
            phase_latency: 0,
            polls_left: 0,
            ops: Vec::new(),
            writes: Vec::new(),
            queued: VecDeque::new(),
            waveform: None,
            samples_latched: 0,
        }
    }

    /// Generate a fresh sample for every output read; `f` receives the sample
    /// index.
    pub fn with_waveform(mut self, f: impl FnMut(u64) -> AxisSample + Send + 'static) -> Self {
        self.waveform = Some(Box::new(f));
        self
    }

    pub fn set_fault(&mut self, fault: Option<Fault>) {
        self.fault = fault;
        self.receives = 0;
        self.stalled = false;
    }

    /// Number of busy-polls before each phase reports completion.
    pub fn set_phase_latency(&mut self, polls: u32) {
        self.phase_latency = polls;
    }

    pub fn set_register(&mut self, reg: u8, value: u8) {
        self.registers[(reg & 0x7F) as usize] = value;
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.registers[(reg & 0x7F) as usize]
    }

    /// Queue samples to be latched into the output registers, one per burst
    /// read of the output block. The data-ready flag follows the queue.
    pub fn queue_samples(&mut self, samples: impl IntoIterator<Item = AxisSample>) {
        self.queued.extend(samples);
    }

    /// Most recent physical-layer commands, at most [`LOG_CAPACITY`].
    pub fn ops(&self) -> &[BusOp] {
        &self.ops
    }

    /// Completed register writes, in order (bounded like [`ops`](Self::ops)).
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn stop_count(&self) -> usize {
        self.ops.iter().filter(|op| **op == BusOp::Stop).count()
    }

    fn data_ready(&self) -> bool {
        !self.queued.is_empty() || self.waveform.is_some()
    }

    fn latch_sample(&mut self) {
        let sample = match self.queued.pop_front() {
            Some(sample) => sample,
            None => match self.waveform.as_mut() {
                Some(f) => f(self.samples_latched),
                None => return,
            },
        };
        self.samples_latched += 1;
        let base = REG_OUTX_L_A as usize;
        self.registers[base..base + 6].copy_from_slice(&sample.to_le_bytes());
    }

    fn begin_phase(&mut self, status: u8) {
        self.status = status;
        self.polls_left = self.phase_latency;
    }

    fn read_pointer(&mut self) -> u8 {
        if self.pointer == REG_STATUS {
            let flag = if self.data_ready() { STATUS_XLDA } else { 0 };
            self.registers[REG_STATUS as usize] = flag;
        }
        let value = self.registers[(self.pointer & 0x7F) as usize];
        self.pointer = self.pointer.wrapping_add(1);
        value
    }
}

impl HardwareBus for SimulatedBus {
    fn start(&mut self) {
        push_bounded(&mut self.ops, BusOp::Start);
        let code = if self.in_transaction {
            status::REPEATED_START
        } else {
            status::START
        };
        self.in_transaction = true;
        self.expect = Expect::Address;
        self.begin_phase(code);
    }

    fn transmit(&mut self, byte: u8) {
        push_bounded(&mut self.ops, BusOp::Transmit(byte));
        let code = match self.expect {
            Expect::Address => {
                let read = byte & 1 == 1;
                let ours = byte >> 1 == self.device_addr;
                let refused = match self.fault {
                    Some(Fault::AddressNack) => !read,
                    Some(Fault::ReadAddressNack) => read,
                    Some(Fault::OutputReadNack) => read && self.pointer == REG_OUTX_L_A,
                    _ => false,
                };
                match (ours && !refused, read) {
                    (true, false) => {
                        self.expect = Expect::Register;
                        status::ADDR_W_ACK
                    }
                    (true, true) => {
                        self.expect = Expect::ReadData;
                        if self.pointer == REG_OUTX_L_A {
                            self.latch_sample();
                        }
                        status::ADDR_R_ACK
                    }
                    (false, false) => {
                        self.expect = Expect::Ignored;
                        status::ADDR_W_NACK
                    }
                    (false, true) => {
                        self.expect = Expect::Ignored;
                        status::ADDR_R_NACK
                    }
                }
            }
            Expect::Register if self.fault == Some(Fault::RegisterNack) => {
                self.expect = Expect::Ignored;
                status::DATA_TX_NACK
            }
            Expect::Register => {
                self.pointer = byte;
                self.expect = Expect::WriteData;
                status::DATA_TX_ACK
            }
            Expect::WriteData if self.fault == Some(Fault::DataNack) => {
                self.expect = Expect::Ignored;
                status::DATA_TX_NACK
            }
            Expect::WriteData => {
                let reg = self.pointer;
                self.registers[(reg & 0x7F) as usize] = byte;
                push_bounded(&mut self.writes, (reg, byte));
                self.pointer = reg.wrapping_add(1);
                status::DATA_TX_ACK
            }
            Expect::Idle | Expect::ReadData | Expect::Ignored => status::DATA_TX_NACK,
        };
        self.begin_phase(code);
    }

    fn receive(&mut self, ack: bool) {
        push_bounded(&mut self.ops, BusOp::Receive { ack });
        if let Some(Fault::HangAfterReceive(n)) = self.fault {
            self.stalled = self.receives >= n;
            self.receives += 1;
        }
        self.data = if self.expect == Expect::ReadData {
            self.read_pointer()
        } else {
            0xFF // released bus reads high
        };
        let code = if ack { status::DATA_RX_ACK } else { status::DATA_RX_NACK };
        self.begin_phase(code);
    }

    fn stop(&mut self) {
        push_bounded(&mut self.ops, BusOp::Stop);
        self.stalled = false;
        self.in_transaction = false;
        self.expect = Expect::Idle;
        self.status = 0xF8;
    }

    fn is_phase_complete(&mut self) -> bool {
        if self.fault == Some(Fault::Hang) || self.stalled {
            return false;
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return false;
        }
        true
    }

    fn status(&self) -> u8 {
        self.status
    }

    fn data(&self) -> u8 {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_stay_bounded_on_long_runs() {
        let mut bus = SimulatedBus::new(0x6B);
        for i in 0..LOG_CAPACITY as u32 {
            bus.start();
            bus.transmit(0x6B << 1);
            bus.transmit(0x10);
            bus.transmit(i as u8);
            bus.stop();
        }

        assert!(bus.ops().len() <= LOG_CAPACITY);
        assert!(bus.writes().len() <= LOG_CAPACITY);
        assert_eq!(bus.ops().last(), Some(&BusOp::Stop));
        assert_eq!(bus.writes().last(), Some(&(0x10, (LOG_CAPACITY as u32 - 1) as u8)));
    }

    #[test]
    fn output_fault_spares_status_reads() {
        let mut bus = SimulatedBus::new(0x6B);
        bus.set_fault(Some(Fault::OutputReadNack));

        for (reg, expected) in [(REG_STATUS, status::ADDR_R_ACK), (REG_OUTX_L_A, status::ADDR_R_NACK)] {
            bus.start();
            bus.transmit(0x6B << 1);
            bus.transmit(reg);
            bus.start();
            bus.transmit((0x6B << 1) | 1);
            assert_eq!(bus.status(), expected);
            bus.stop();
        }
    }
}
