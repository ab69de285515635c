use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;

use bytes::{Buf, BufMut, BytesMut};
use crc::Crc;

use crate::messaging::message_module::MessageModuleId;
use crate::messaging::node_addr::NodeAddr;

/// CRC-64 over the cluster's shared secret, both generations, the protocol id and the payload.
///
/// A frame corrupted in transit, or sent by a node configured with a different secret, fails the
///  comparison on the receiving side. Anybody knowing the secret can produce a valid checksum, so
///  this is no sender authentication.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Checksum(pub u64);
impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x?}", self.0)
    }
}
impl Checksum {
    pub fn new(shared_secret: &[u8], from: NodeAddr, to: NodeAddr, message_module_id: MessageModuleId, msg: &[u8]) -> Checksum {
        let hasher = Crc::<u64>::new(&crc::CRC_64_REDIS);
        let mut digest = hasher.digest();

        digest.update(shared_secret);
        digest.update(&from.unique.to_le_bytes());
        digest.update(&to.unique.to_le_bytes());
        digest.update(&message_module_id.0.to_le_bytes());
        digest.update(msg);

        Checksum(
            digest.finalize()
        )
    }
}


/// Frame header preceding every payload on the wire:
///
/// ```text
/// sender NodeAddr | recipient generation (u32) | checksum (u64) | protocol id (u64) | payload
/// ```
///
/// The recipient's socket address is not transmitted: the receiver knows where it is listening.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Envelope {
    pub from: NodeAddr,
    pub to: NodeAddr,
    pub checksum: Checksum,
    pub message_module_id: MessageModuleId,
}
impl Envelope {
    /// Consumes the header and leaves `buf` positioned at the payload. `local_socket_addr` completes
    ///  the recipient address.
    pub fn try_read(buf: &mut impl Buf, local_socket_addr: SocketAddr) -> anyhow::Result<Envelope> {
        let from = NodeAddr::try_deser(buf)?;
        let to = Self::try_read_recipient(buf, local_socket_addr)?;
        let checksum = Checksum(buf.try_get_u64()?);

        let message_module_id = buf.try_get_u64()?;

        Ok(Envelope {
            from,
            to,
            checksum,
            message_module_id: MessageModuleId(message_module_id),
        })
    }

    fn try_read_recipient(buf: &mut impl Buf, socket_addr: SocketAddr) -> anyhow::Result<NodeAddr> {
        let unique = buf.try_get_u32()?;
        Ok(NodeAddr {
            unique,
            socket_addr,
        })
    }

    /// Appends the header only. The caller appends the payload the checksum was computed over.
    pub fn write(from: NodeAddr, to: NodeAddr, checksum: Checksum, message_module_id: MessageModuleId, buf: &mut BytesMut) {
        from.ser(buf);
        buf.put_u32(to.unique);
        buf.put_u64(checksum.0);
        buf.put_u64(message_module_id.0);
    }

    /// whether the header's checksum was computed over `payload` with the same shared secret
    pub fn matches_payload(&self, shared_secret: &[u8], payload: &[u8]) -> bool {
        self.checksum == Checksum::new(shared_secret, self.from, self.to, self.message_module_id, payload)
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::str::FromStr;

    use bytes::BytesMut;
    use rstest::rstest;

    use crate::messaging::message_module::MessageModuleId;
    use crate::messaging::node_addr::NodeAddr;

    use super::*;

    #[rstest]
    #[case::just_envelope(b"\0\0\0\x31\x04\x01\x02\x03\x04\x16\x2e\0\0\0\x34\0\0\0\0\0\0\0\x01abcdefgh", b"", "9.8.7.6:1234", Some(Envelope {
        from: NodeAddr { unique: 0x31, socket_addr: SocketAddr::from_str("1.2.3.4:5678").unwrap() },
        to:   NodeAddr { unique: 0x34, socket_addr: SocketAddr::from_str("9.8.7.6:1234").unwrap() },
        checksum: Checksum(1),
        message_module_id: MessageModuleId::new(b"abcdefgh")
    }))]
    #[case::remainder(b"\0\0\0\x32\x04\x04\x03\x02\x01\x16\x2e\0\0\0\x33\0\0\0\0\0\0\0\x0212345678abc", b"abc", "1.2.3.4:1234", Some(Envelope {
        from: NodeAddr { unique: 0x32, socket_addr: SocketAddr::from_str("4.3.2.1:5678").unwrap() },
        to:   NodeAddr { unique: 0x33, socket_addr: SocketAddr::from_str("1.2.3.4:1234").unwrap() },
        checksum: Checksum(2),
        message_module_id: MessageModuleId::new(b"12345678")
    }))]
    #[case::too_short(b"\0\0\0\x31\x04\x01\x02\x03\x04\x16\x2e\0\0\0\x34\0\0\0\0", b"", "9.8.7.6:1234", None)]
    fn test_envelope_try_read(#[case] mut buf: &[u8], #[case] buf_after: &[u8], #[case] to: &str, #[case] expected: Option<Envelope>) {
        let to = SocketAddr::from_str(to).unwrap();
        match Envelope::try_read(&mut buf, to) {
            Ok(actual) => {
                assert_eq!(actual, expected.unwrap());
                assert_eq!(buf, buf_after);
            }
            Err(e) => {
                println!("{}", e);
                assert!(expected.is_none());
            }
        }
    }

    #[rstest]
    #[case::complete(b"\0\0\0\0", b"", "127.0.0.1:8888", 0)]
    #[case::remainder(b"\0\0\0\x04\x01", b"\x01", "127.0.2.3:8765", 4)]
    fn test_envelope_read_recipient(#[case] mut buf: &[u8], #[case] buf_after: &[u8], #[case] addr: &str, #[case] unique: u32) {
        let socket_addr = SocketAddr::from_str(addr).unwrap();
        let actual = Envelope::try_read_recipient(&mut buf, socket_addr).unwrap();
        assert_eq!(actual, NodeAddr { unique, socket_addr, });
        assert_eq!(buf, buf_after);
    }

    #[rstest]
    #[case(1, 2, b"abc\0\0\0\0\0", b"\0\0\0\x01\x04\x7f\0\0\x01\x40\x01\0\0\0\x02\x12\x34\x56\x78\x90\x98\x76\x54abc\0\0\0\0\0")]
    fn test_envelope_write(#[case] from: u32, #[case] to: u32, #[case] module_id: &[u8;8], #[case] expected: &[u8]) {
        let mut buf = BytesMut::new();
        Envelope::write(NodeAddr::localhost(from), NodeAddr::localhost(to), Checksum(0x1234567890987654), MessageModuleId::new(module_id), &mut buf);
        assert_eq!(&buf, expected);
    }

    #[test]
    fn test_checksum_depends_on_secret_and_payload() {
        let from = NodeAddr::localhost(1);
        let to = NodeAddr::localhost(2);
        let id = MessageModuleId::new(b"hotstuff");

        let base = Checksum::new(b"secret", from, to, id, b"payload");
        assert_eq!(base, Checksum::new(b"secret", from, to, id, b"payload"));
        assert_ne!(base, Checksum::new(b"other", from, to, id, b"payload"));
        assert_ne!(base, Checksum::new(b"secret", from, to, id, b"payloae"));
        assert_ne!(base, Checksum::new(b"secret", to, from, id, b"payload"));
    }

    #[test]
    fn test_written_frame_matches_payload_after_read() {
        let from = NodeAddr::localhost(7);
        let to = NodeAddr::localhost(9);
        let id = MessageModuleId::new(b"hotstuff");
        let payload = b"some payload";

        let mut buf = BytesMut::new();
        Envelope::write(from, to, Checksum::new(b"secret", from, to, id, payload), id, &mut buf);
        buf.extend_from_slice(payload);

        let mut frame: &[u8] = &buf;
        let envelope = Envelope::try_read(&mut frame, to.socket_addr).unwrap();
        assert_eq!(envelope.to, to);
        assert_eq!(frame, payload);

        assert!(envelope.matches_payload(b"secret", frame));
        assert!(!envelope.matches_payload(b"other secret", frame));
        assert!(!envelope.matches_payload(b"secret", b"some paylaod"));
    }
}
