// StrikeTrigger - wearable drum trigger firmware
//
// Board-independent core: bus transport, sensor driver, strike detection and
// the poll-loop task. `main.rs` wires it to the ESP32-C3 peripherals, or to
// the simulated bus on a host build.

pub mod config;
pub mod drivers;
pub mod events;
pub mod tasks;
pub mod trigger;
