use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::consts::DEFAULT_SERIAL_BAUD_RATE;

use crate::prelude::*;

/// MAVLink transport descriptor.
///
/// Parsed from strings of the form `<proto>:<rest>`:
///
/// * `serial:<path>[:<baud>]` opens a serial port (baud rate defaults to 57600, a numeric
///   suffix after the last `:` is always taken as the baud rate);
/// * `udp:<host>:<port>` binds a UDP socket and replies to the last peer it heard from;
/// * `tcp:<host>:<port>` connects to a TCP server.
///
/// Network addresses are resolved when the link is established, so hostnames are allowed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransportDescriptor {
    /// Serial port.
    Serial {
        /// Port path.
        path: String,
        /// Baud rate.
        baud_rate: u32,
    },
    /// UDP socket bound to a local address.
    Udp {
        /// Bind address.
        bind_addr: String,
    },
    /// TCP client.
    Tcp {
        /// Server address.
        remote_addr: String,
    },
}

impl TransportDescriptor {
    /// Parses a descriptor string.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let invalid = |reason: &'static str| Error::Descriptor {
            descriptor: descriptor.to_string(),
            reason,
        };

        let (proto, rest) = descriptor
            .split_once(':')
            .ok_or_else(|| invalid("expected `<proto>:<address>`"))?;

        match proto.trim().to_ascii_lowercase().as_str() {
            "serial" => {
                // Port paths may contain `:`, only a numeric tail is a baud rate.
                let (path, baud_rate) = match rest
                    .rsplit_once(':')
                    .and_then(|(path, baud)| Some((path, baud.parse::<u32>().ok()?)))
                {
                    Some((_, 0)) => return Err(invalid("invalid baud rate")),
                    Some((path, baud_rate)) => (path, baud_rate),
                    None => (rest, DEFAULT_SERIAL_BAUD_RATE),
                };
                if path.is_empty() {
                    return Err(invalid("empty serial port path"));
                }
                Ok(TransportDescriptor::Serial {
                    path: path.to_string(),
                    baud_rate,
                })
            }
            "udp" => Ok(TransportDescriptor::Udp {
                bind_addr: parse_host_port(rest).map_err(invalid)?,
            }),
            "tcp" => Ok(TransportDescriptor::Tcp {
                remote_addr: parse_host_port(rest).map_err(invalid)?,
            }),
            _ => Err(invalid("unknown protocol, expected `serial`, `udp`, or `tcp`")),
        }
    }

    /// Returns `true` for descriptors which accept connections instead of establishing them.
    pub fn is_listener(&self) -> bool {
        matches!(self, TransportDescriptor::Udp { .. })
    }
}

impl FromStr for TransportDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for TransportDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportDescriptor::Serial { path, baud_rate } => {
                write!(f, "serial:{path}:{baud_rate}")
            }
            TransportDescriptor::Udp { bind_addr } => write!(f, "udp:{bind_addr}"),
            TransportDescriptor::Tcp { remote_addr } => write!(f, "tcp:{remote_addr}"),
        }
    }
}

fn parse_host_port(addr: &str) -> core::result::Result<String, &'static str> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or("expected `<host>:<port>`")?;

    if host.is_empty() {
        return Err("empty host");
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err("invalid port"),
        Ok(_) => Ok(addr.to_string()),
    }
}

#[cfg(test)]
mod descriptor_tests {
    use super::*;

    #[test]
    fn parse_serial() {
        assert_eq!(
            TransportDescriptor::parse("serial:/dev/ttyUSB0:115200").unwrap(),
            TransportDescriptor::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
            }
        );
        assert_eq!(
            TransportDescriptor::parse("serial:/dev/ttyACM0").unwrap(),
            TransportDescriptor::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud_rate: DEFAULT_SERIAL_BAUD_RATE,
            }
        );
    }

    #[test]
    fn parse_serial_path_with_colons() {
        let path = "/dev/serial/by-path/pci-0000:00:14.0-usb-0:1:1.0-port0";
        assert_eq!(
            TransportDescriptor::parse(&format!("serial:{path}:115200")).unwrap(),
            TransportDescriptor::Serial {
                path: path.to_string(),
                baud_rate: 115200,
            }
        );
        assert_eq!(
            TransportDescriptor::parse(&format!("serial:{path}")).unwrap(),
            TransportDescriptor::Serial {
                path: path.to_string(),
                baud_rate: DEFAULT_SERIAL_BAUD_RATE,
            }
        );
        assert_eq!(
            TransportDescriptor::parse("serial:COM3:fast").unwrap(),
            TransportDescriptor::Serial {
                path: "COM3:fast".to_string(),
                baud_rate: DEFAULT_SERIAL_BAUD_RATE,
            }
        );
    }

    #[test]
    fn parse_network() {
        assert_eq!(
            "udp:0.0.0.0:14550".parse::<TransportDescriptor>().unwrap(),
            TransportDescriptor::Udp {
                bind_addr: "0.0.0.0:14550".to_string()
            }
        );
        assert_eq!(
            "tcp:sitl.local:5760".parse::<TransportDescriptor>().unwrap(),
            TransportDescriptor::Tcp {
                remote_addr: "sitl.local:5760".to_string()
            }
        );
    }

    #[test]
    fn display_is_parseable() {
        for descriptor in ["serial:/dev/ttyS1:9600", "udp:127.0.0.1:14550", "tcp:10.0.0.2:5760"] {
            let parsed = TransportDescriptor::parse(descriptor).unwrap();
            assert_eq!(parsed.to_string(), descriptor);
        }
    }

    #[test]
    fn reject_malformed() {
        for descriptor in [
            "",
            "udp",
            "ftp:127.0.0.1:21",
            "udp:127.0.0.1",
            "udp::14550",
            "tcp:127.0.0.1:0",
            "tcp:127.0.0.1:99999",
            "serial:",
            "serial::115200",
            "serial:/dev/ttyUSB0:0",
        ] {
            assert!(
                matches!(
                    TransportDescriptor::parse(descriptor),
                    Err(Error::Descriptor { .. })
                ),
                "`{descriptor}` should be rejected"
            );
        }
    }
}
