pub mod display;
#[cfg(target_os = "espidf")]
pub mod gpio_twi;
pub mod imu;
pub mod indicator;
pub mod oled;
pub mod sim;
pub mod twi;
pub mod uplink;
