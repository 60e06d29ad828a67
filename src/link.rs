use anyhow::{Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::config::DeviceConfig;

/// Read slice while polling for the handshake; the discovery deadline is
/// enforced separately with an `Instant`.
const READ_SLICE_MS: u64 = 50;

/// Access to serial ports, behind a trait so discovery can be driven by
/// in-memory fakes in tests.
pub trait PortProvider {
    type Port: Read + Write;

    fn list(&self) -> Result<Vec<String>>;
    fn open(&self, name: &str) -> Result<Self::Port>;
}

/// The real thing.
pub struct SystemPorts {
    baud_rate: u32,
}

impl SystemPorts {
    pub fn new(baud_rate: u32) -> Self {
        SystemPorts { baud_rate }
    }
}

impl PortProvider for SystemPorts {
    type Port = Box<dyn SerialPort>;

    fn list(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, name: &str) -> Result<Self::Port> {
        let mut port = serialport::new(name, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(READ_SLICE_MS))
            .open()
            .context(format!("failed to open serial port {}", name))?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            eprintln!("Warning: failed to set DTR on {}: {}", name, e);
        }

        // Most controllers reset when the port opens; let the firmware boot.
        thread::sleep(Duration::from_millis(100));

        Ok(port)
    }
}

/// The (possibly absent) serial connection to the LED controller.
///
/// Writes against an unconnected link are silently discarded; a write error
/// on a live link drops the port and degrades back to unconnected. Neither
/// is ever fatal.
pub struct SerialLink<P: Write> {
    port: Option<P>,
    name: Option<String>,
}

impl<P: Write> SerialLink<P> {
    pub fn unconnected() -> Self {
        SerialLink {
            port: None,
            name: None,
        }
    }

    pub fn connected(name: String, port: P) -> Self {
        SerialLink {
            port: Some(port),
            name: Some(name),
        }
    }

    #[allow(dead_code)]
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Write one complete frame. Returns whether the frame went out.
    pub fn write_frame(&mut self, frame: &[u8]) -> bool {
        let Some(port) = self.port.as_mut() else {
            return false;
        };

        let result = port.write_all(frame).and_then(|()| port.flush());
        if let Err(e) = result {
            let name = self.name.as_deref().unwrap_or("serial port");
            eprintln!("✗ Serial error on {}: {}", name, e);
            eprintln!("✗ Link lost, continuing without a device");
            self.port = None;
        }

        self.port.is_some()
    }

    #[allow(dead_code)]
    pub fn into_inner(self) -> Option<P> {
        self.port
    }
}

/// Find the LED controller among the available serial ports.
///
/// Each port is opened (open failures skip to the next) and polled for the
/// handshake string `<magic_word>\n` until the timeout. The first port that
/// acknowledges becomes the link. If none acknowledges and exactly one port
/// was available, that port is used without a handshake for older firmware
/// lacking the acknowledgment. Otherwise the result is an unconnected link.
pub fn discover<V: PortProvider>(
    provider: &V,
    config: &DeviceConfig,
    ddebug: bool,
) -> SerialLink<V::Port> {
    let names = match provider.list() {
        Ok(names) => names,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            return SerialLink::unconnected();
        }
    };

    if names.is_empty() {
        eprintln!("✗ No serial ports found; running without a device");
        return SerialLink::unconnected();
    }

    let token = format!("{}\n", config.magic_word);
    let timeout = Duration::from_millis(config.handshake_timeout_ms);

    for name in &names {
        if ddebug {
            eprintln!("[DEBUG {}] Probing for handshake...", name);
        }

        let mut port = match provider.open(name) {
            Ok(port) => port,
            Err(e) => {
                if ddebug {
                    eprintln!("[DEBUG {}] {:#}", name, e);
                }
                continue;
            }
        };

        if wait_for_handshake(&mut port, &token, timeout) {
            println!("✓ LED controller acknowledged on {}", name);
            return SerialLink::connected(name.clone(), port);
        }

        if ddebug {
            eprintln!("[DEBUG {}] No handshake within {:?}", name, timeout);
        }
        // Dropping the port closes it before the next candidate opens.
    }

    if names.len() == 1 {
        match provider.open(&names[0]) {
            Ok(port) => {
                println!(
                    "✓ Using lone port {} without handshake (compatibility mode)",
                    names[0]
                );
                return SerialLink::connected(names[0].clone(), port);
            }
            Err(e) => {
                if ddebug {
                    eprintln!("[DEBUG {}] {:#}", names[0], e);
                }
            }
        }
    }

    eprintln!("✗ No LED controller found; running without a device");
    SerialLink::unconnected()
}

/// Poll the incoming byte stream until the token appears or the deadline
/// passes. Reads block for at most the port's own read timeout, so the loop
/// waits on I/O rather than spinning.
fn wait_for_handshake<P: Read>(port: &mut P, token: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut received = String::new();
    let mut buf = [0u8; 64];

    loop {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
                if received.contains(token) {
                    return true;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(_) => return false,
        }

        if Instant::now() >= deadline {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Scripted serial port: yields its bytes in small chunks, then times
    /// out like a real port with a read timeout.
    struct FakePort {
        data: Vec<u8>,
        pos: usize,
    }

    impl FakePort {
        fn speaking(data: &[u8]) -> Self {
            FakePort {
                data: data.to_vec(),
                pos: 0,
            }
        }

        fn silent() -> Self {
            FakePort {
                data: Vec::new(),
                pos: 0,
            }
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Err(io::Error::new(ErrorKind::TimedOut, "read timed out"));
            }
            // Feed at most 4 bytes per read to exercise accumulation across
            // chunk boundaries.
            let n = buf.len().min(4).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        OpenFails,
        Silent,
        Acks,
        Chatter,
    }

    struct FakeProvider {
        ports: Vec<(String, Behavior)>,
    }

    impl FakeProvider {
        fn new(ports: &[(&str, Behavior)]) -> Self {
            FakeProvider {
                ports: ports
                    .iter()
                    .map(|(name, behavior)| (name.to_string(), *behavior))
                    .collect(),
            }
        }
    }

    impl PortProvider for FakeProvider {
        type Port = FakePort;

        fn list(&self) -> Result<Vec<String>> {
            Ok(self.ports.iter().map(|(name, _)| name.clone()).collect())
        }

        fn open(&self, name: &str) -> Result<FakePort> {
            let (_, behavior) = self
                .ports
                .iter()
                .find(|(n, _)| n == name)
                .context("unknown port")?;

            match behavior {
                Behavior::OpenFails => anyhow::bail!("device busy"),
                Behavior::Silent => Ok(FakePort::silent()),
                Behavior::Acks => Ok(FakePort::speaking(b"Ada\n")),
                Behavior::Chatter => Ok(FakePort::speaking(b"boot v1.2\nAda\nAda\n")),
            }
        }
    }

    fn test_config() -> DeviceConfig {
        DeviceConfig {
            handshake_timeout_ms: 20,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_acknowledging_port_selected_among_many() {
        let provider = FakeProvider::new(&[
            ("/dev/ttyUSB0", Behavior::Silent),
            ("/dev/ttyUSB1", Behavior::Acks),
            ("/dev/ttyUSB2", Behavior::Silent),
        ]);

        let link = discover(&provider, &test_config(), false);
        assert!(link.is_connected());
        assert_eq!(link.port_name(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_handshake_found_amid_other_output() {
        let provider = FakeProvider::new(&[("/dev/ttyACM0", Behavior::Chatter)]);
        let link = discover(&provider, &test_config(), false);
        assert!(link.is_connected());
    }

    #[test]
    fn test_lone_silent_port_used_as_fallback() {
        let provider = FakeProvider::new(&[("/dev/ttyUSB0", Behavior::Silent)]);
        let link = discover(&provider, &test_config(), false);
        assert!(link.is_connected());
        assert_eq!(link.port_name(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_multiple_silent_ports_yield_no_link() {
        let provider = FakeProvider::new(&[
            ("/dev/ttyUSB0", Behavior::Silent),
            ("/dev/ttyUSB1", Behavior::Silent),
        ]);

        let link = discover(&provider, &test_config(), false);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_open_failures_skipped() {
        let provider = FakeProvider::new(&[
            ("/dev/ttyUSB0", Behavior::OpenFails),
            ("/dev/ttyUSB1", Behavior::Acks),
        ]);

        let link = discover(&provider, &test_config(), false);
        assert_eq!(link.port_name(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_lone_unopenable_port_yields_no_link() {
        let provider = FakeProvider::new(&[("/dev/ttyUSB0", Behavior::OpenFails)]);
        let link = discover(&provider, &test_config(), false);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_no_ports_yield_no_link() {
        let provider = FakeProvider::new(&[]);
        let link = discover(&provider, &test_config(), false);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_wrong_magic_word_not_accepted() {
        let provider = FakeProvider::new(&[
            ("/dev/ttyUSB0", Behavior::Acks),
            ("/dev/ttyUSB1", Behavior::Silent),
        ]);

        let config = DeviceConfig {
            magic_word: "Awa".to_string(),
            ..test_config()
        };

        let link = discover(&provider, &config, false);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_unconnected_write_is_noop() {
        let mut link: SerialLink<FakePort> = SerialLink::unconnected();
        assert!(!link.write_frame(&[1, 2, 3]));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_connected_write_goes_through() {
        let mut link = SerialLink::connected("fake".to_string(), FakePort::silent());
        assert!(link.write_frame(&[1, 2, 3]));
        assert!(link.is_connected());
    }
}
