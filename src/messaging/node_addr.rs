use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use bytes::{Buf, BufMut};

/// The network identity of a consensus participant.
///
/// A participant that restarts on the same socket address is a different incarnation, and traffic
///  addressed to the old incarnation must not be delivered to the new one. The `unique` part
///  disambiguates incarnations; it is initialized from the seconds since epoch.
///
/// NB: `unique` is *not* a security feature, it only has to differ between incarnations on the
///       same address.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeAddr {
    pub unique: u32,
    pub socket_addr: SocketAddr,
}
impl Hash for NodeAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique.hash(state);
        match self.socket_addr {
            SocketAddr::V4(s) => s.ip().to_bits().hash(state),
            SocketAddr::V6(s) => s.ip().to_bits().hash(state),
        };
        self.socket_addr.port().hash(state);
    }
}

impl Debug for NodeAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}@{}]", self.socket_addr, self.unique)
    }
}

const DISCRIMINATOR_V4: u8 = 4;
const DISCRIMINATOR_V6: u8 = 6;

impl NodeAddr {
    #[cfg(test)]
    pub fn localhost(unique: u32) -> NodeAddr {
        let addr: SocketAddr = std::str::FromStr::from_str("127.0.0.1:16385").unwrap();

        NodeAddr {
            unique,
            socket_addr: addr,
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.unique);
        match &self.socket_addr {
            SocketAddr::V4(data) => {
                buf.put_u8(DISCRIMINATOR_V4);
                buf.put_u32(data.ip().to_bits());
                buf.put_u16(data.port());
            }
            SocketAddr::V6(data) => {
                buf.put_u8(DISCRIMINATOR_V6);
                buf.put_u128(data.ip().to_bits());
                buf.put_u16(data.port());
            }
        }
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<NodeAddr> {
        let unique = buf.try_get_u32()?;

        let addr = match buf.try_get_u8()? {
            DISCRIMINATOR_V4 => {
                let ip = buf.try_get_u32()?;
                let port = buf.try_get_u16()?;
                SocketAddr::V4(SocketAddrV4::new(ip.into(), port))
            }
            DISCRIMINATOR_V6 => {
                let ip = buf.try_get_u128()?;
                let port = buf.try_get_u16()?;
                SocketAddr::V6(SocketAddrV6::new(ip.into(), port, 0, 0))
            }
            n => {
                return Err(anyhow!("invalid socket address discriminator: {}", n));
            }
        };
        Ok(NodeAddr {
            unique,
            socket_addr: addr,
        })
    }
}

impl From<SocketAddr> for NodeAddr {
    fn from(addr: SocketAddr) -> Self {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        NodeAddr {
            unique,
            socket_addr: addr,
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::v4(5, "1.2.3.4:5678", b"\0\0\0\x05\x04\x01\x02\x03\x04\x16\x2e")]
    #[case::v6(7, "[::1]:1", b"\0\0\0\x07\x06\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\0\x01")]
    fn test_ser(#[case] unique: u32, #[case] addr: &str, #[case] expected: &[u8]) {
        let addr = NodeAddr { unique, socket_addr: SocketAddr::from_str(addr).unwrap() };

        let mut buf = BytesMut::new();
        addr.ser(&mut buf);
        assert_eq!(&buf, expected);

        let mut b: &[u8] = &buf;
        assert_eq!(NodeAddr::try_deser(&mut b).unwrap(), addr);
        assert!(b.is_empty());
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::bad_discriminator(b"\0\0\0\x01\x05\x01\x02\x03\x04\x16\x2e")]
    #[case::truncated_ip(b"\0\0\0\x01\x04\x01\x02")]
    #[case::missing_port(b"\0\0\0\x01\x04\x01\x02\x03\x04")]
    fn test_try_deser_invalid(#[case] mut buf: &[u8]) {
        assert!(NodeAddr::try_deser(&mut buf).is_err());
    }

    #[test]
    fn test_from_socket_addr_sets_generation() {
        let addr = NodeAddr::from(SocketAddr::from_str("127.0.0.1:9999").unwrap());
        assert!(addr.unique > 0);
        assert_eq!(addr.socket_addr.port(), 9999);
    }

    #[test]
    fn test_debug() {
        assert_eq!(format!("{:?}", NodeAddr::localhost(3)), "[127.0.0.1:16385@3]");
    }
}
