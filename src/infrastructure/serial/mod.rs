// Serial module - serial port transport
pub mod handler;

pub use handler::{list_serial_ports, SerialHandler, SerialPortInfo};
