use crate::domain::config::{FlowControlConfig, ParityConfig, SerialConfig};
use crate::domain::error::TransportError;
use crate::infrastructure::transport::{ReadSink, Transport, Utf8Carry, READ_BUFFER_SIZE};
use async_trait::async_trait;
use serde::Serialize;
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A serial port visible to the operating system
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Enumerate serial ports. Independent of any open connection.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| {
        error!("Failed to list serial ports: {}", e);
        TransportError::OpenFailed(format!("failed to enumerate serial ports: {}", e))
    })?;

    let ports: Vec<SerialPortInfo> = ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => SerialPortInfo {
                port_name: port.port_name,
                port_type: format!("USB VID:{:04X} PID:{:04X}", usb.vid, usb.pid),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            other => SerialPortInfo {
                port_name: port.port_name,
                port_type: match other {
                    SerialPortType::BluetoothPort => "Bluetooth",
                    SerialPortType::PciPort => "PCI",
                    _ => "Unknown",
                }
                .to_string(),
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect();

    debug!("Found {} serial ports", ports.len());
    Ok(ports)
}

/// Serial port transport. Reads run on a blocking thread against a cloned
/// handle of the port.
pub struct SerialHandler {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
    stop: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

fn builder(config: &SerialConfig) -> Result<serialport::SerialPortBuilder, TransportError> {
    let data_bits = match config.data_bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        other => {
            return Err(TransportError::OpenFailed(format!(
                "invalid data bits: {}",
                other
            )))
        }
    };
    let stop_bits = match config.stop_bits {
        1 => serialport::StopBits::One,
        2 => serialport::StopBits::Two,
        other => {
            return Err(TransportError::OpenFailed(format!(
                "invalid stop bits: {}",
                other
            )))
        }
    };

    Ok(serialport::new(config.port.as_str(), config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        })
        .flow_control(match config.flow_control {
            FlowControlConfig::None => serialport::FlowControl::None,
            FlowControlConfig::Software => serialport::FlowControl::Software,
            FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
        })
        .timeout(config.read_timeout()))
}

fn map_open_error(port: &str, err: serialport::Error) -> TransportError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound(port.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            TransportError::PortNotFound(port.to_string())
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(port.to_string())
        }
        _ => TransportError::OpenFailed(format!("{}: {}", port, err)),
    }
}

#[async_trait]
impl Transport for SerialHandler {
    type Config = SerialConfig;

    async fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = builder(config)?.open().map_err(|e| {
            warn!("Failed to open serial port {}: {}", config.port, e);
            map_open_error(&config.port, e)
        })?;

        info!("Serial port {} opened at {} baud", config.port, config.baud_rate);

        Ok(Self {
            port_name: config.port.clone(),
            port: Some(port),
            stop: Arc::new(AtomicBool::new(false)),
            reader_task: None,
        })
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::WriteFailed("port is closed".to_string()))?;

        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!("Sent {} bytes over serial", data.len());
        Ok(())
    }

    fn spawn_reader(&mut self, sink: ReadSink) -> Result<(), TransportError> {
        if self.reader_task.is_some() {
            return Err(TransportError::ReadFailed("reader already started".to_string()));
        }
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| TransportError::ReadFailed("port is closed".to_string()))?;
        let reader = port
            .try_clone()
            .map_err(|e| TransportError::ReadFailed(format!("failed to clone port: {}", e)))?;

        let stop = Arc::clone(&self.stop);
        self.reader_task = Some(tokio::task::spawn_blocking(move || {
            read_loop(reader, sink, stop)
        }));
        Ok(())
    }

    async fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        // The loop notices the flag within one read timeout
        if let Some(task) = self.reader_task.take() {
            if let Err(e) = task.await {
                warn!("Serial read task ended abnormally: {}", e);
            }
        }
        if self.port.take().is_some() {
            info!("Serial port {} closed", self.port_name);
        }
    }

    fn endpoint(&self) -> String {
        self.port_name.clone()
    }
}

impl Drop for SerialHandler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn read_loop(mut port: Box<dyn SerialPort>, sink: ReadSink, stop: Arc<AtomicBool>) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut carry = Utf8Carry::default();

    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut buffer) {
            Ok(0) => continue,
            Ok(n) => {
                debug!("Received {} bytes over serial", n);
                if let Some(bytes) = carry.push(&buffer[..n]) {
                    if !sink.blocking_data(bytes) {
                        break;
                    }
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if let Some(bytes) = carry.flush() {
                    if !sink.blocking_data(bytes) {
                        break;
                    }
                }
            }
            Err(e) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                error!("Failed to read from serial port: {}", e);
                if let Some(bytes) = carry.flush() {
                    sink.blocking_data(bytes);
                }
                sink.blocking_closed(TransportError::ReadFailed(e.to_string()));
                break;
            }
        }
    }
    debug!("Serial read loop stopped");
}
