use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use sha2::{Digest, Sha256};

use crate::consensus::peer_directory::PeerId;

pub type ValueHash = [u8; 32];

pub fn hash_value(value: &[u8]) -> ValueHash {
    Sha256::digest(value).into()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MsgType {
    Prepare = 1,
    PreCommit = 2,
    Commit = 3,
    Decide = 4,
    NewView = 5,
}

/// A quorum certificate: the aggregated votes of a quorum for a value in a given view and phase.
///  This layer carries it without verifying it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QuorumCert {
    pub msg_type: MsgType,
    pub view: u64,
    pub value_hash: ValueHash,
    pub signatures: Vec<Bytes>,
}

/// A HotStuff consensus message as the consensus engine sees it. [HotStuffMsg::ser] produces the
///  wire representation, and [HotStuffMsg::deser] is its exact inverse.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HotStuffMsg {
    pub msg_type: MsgType,
    pub sender: PeerId,
    pub view: u64,
    pub value: Bytes,
    pub value_hash: ValueHash,
    pub signature: Bytes,
    pub justify: Option<QuorumCert>,
}

const NO_JUSTIFY: u8 = 0;
const WITH_JUSTIFY: u8 = 1;

impl HotStuffMsg {
    pub fn ser(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(self.msg_type.into());
        buf.put_u32(self.sender.0);
        buf.put_u64(self.view);
        put_bytes(&self.value, &mut buf);
        buf.put_slice(&self.value_hash);
        put_bytes(&self.signature, &mut buf);

        match &self.justify {
            None => buf.put_u8(NO_JUSTIFY),
            Some(qc) => {
                buf.put_u8(WITH_JUSTIFY);
                qc.ser(&mut buf);
            }
        }
        buf.freeze()
    }

    pub fn deser(mut buf: &[u8]) -> anyhow::Result<HotStuffMsg> {
        let msg_type = try_get_msg_type(&mut buf)?;

        let sender = PeerId(buf.try_get_u32()?);
        if sender.0 == 0 {
            bail!("invalid sender id 0");
        }

        let view = buf.try_get_u64()?;
        let value = try_get_bytes(&mut buf)?;
        let value_hash = try_get_hash(&mut buf)?;
        let signature = try_get_bytes(&mut buf)?;

        let justify = match buf.try_get_u8()? {
            NO_JUSTIFY => None,
            WITH_JUSTIFY => Some(QuorumCert::deser(&mut buf)?),
            n => bail!("invalid justify discriminator {}", n),
        };

        if buf.has_remaining() {
            bail!("{} unexpected trailing bytes after message", buf.remaining());
        }

        Ok(HotStuffMsg {
            msg_type,
            sender,
            view,
            value,
            value_hash,
            signature,
            justify,
        })
    }
}

impl QuorumCert {
    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type.into());
        buf.put_u64(self.view);
        buf.put_slice(&self.value_hash);
        buf.put_u32(self.signatures.len() as u32);
        for signature in &self.signatures {
            put_bytes(signature, buf);
        }
    }

    fn deser(buf: &mut &[u8]) -> anyhow::Result<QuorumCert> {
        let msg_type = try_get_msg_type(buf)?;
        let view = buf.try_get_u64()?;
        let value_hash = try_get_hash(buf)?;

        let num_signatures = buf.try_get_u32()? as usize;
        // every signature has at least its length prefix
        if num_signatures > buf.remaining() / size_of::<u32>() {
            bail!("quorum certificate claims {} signatures, but only {} bytes remain", num_signatures, buf.remaining());
        }
        let signatures = (0..num_signatures)
            .map(|_| try_get_bytes(buf))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(QuorumCert {
            msg_type,
            view,
            value_hash,
            signatures,
        })
    }
}

fn put_bytes(data: &[u8], buf: &mut impl BufMut) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn try_get_bytes(buf: &mut &[u8]) -> anyhow::Result<Bytes> {
    let len = buf.try_get_u32()? as usize;
    if buf.remaining() < len {
        bail!("length prefix {} exceeds remaining {} bytes", len, buf.remaining());
    }
    let result = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(result)
}

fn try_get_hash(buf: &mut &[u8]) -> anyhow::Result<ValueHash> {
    let mut hash = ValueHash::default();
    if buf.remaining() < hash.len() {
        bail!("truncated value hash");
    }
    buf.copy_to_slice(&mut hash);
    Ok(hash)
}

fn try_get_msg_type(buf: &mut &[u8]) -> anyhow::Result<MsgType> {
    let raw = buf.try_get_u8()?;
    MsgType::try_from(raw)
        .map_err(|_| anyhow!("invalid message type discriminator {}", raw))
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::test_util::message::{test_msg, test_qc};

    use super::*;

    #[rstest]
    #[case::prepare(MsgType::Prepare, 1)]
    #[case::pre_commit(MsgType::PreCommit, 2)]
    #[case::commit(MsgType::Commit, 3)]
    #[case::decide(MsgType::Decide, 4)]
    #[case::new_view(MsgType::NewView, 5)]
    fn test_msg_type_discriminator(#[case] msg_type: MsgType, #[case] expected: u8) {
        let raw: u8 = msg_type.into();
        assert_eq!(raw, expected);
        assert_eq!(MsgType::try_from(expected).unwrap(), msg_type);
    }

    #[rstest]
    #[case::without_justify(test_msg(MsgType::Prepare, 1, 7))]
    #[case::with_justify(HotStuffMsg { justify: Some(test_qc(MsgType::Prepare, 6, 3)), ..test_msg(MsgType::PreCommit, 2, 7) })]
    #[case::empty_qc(HotStuffMsg { justify: Some(test_qc(MsgType::Commit, 0, 0)), ..test_msg(MsgType::NewView, 4, 1) })]
    #[case::empty_fields(HotStuffMsg { value: Bytes::new(), signature: Bytes::new(), ..test_msg(MsgType::Decide, 3, u64::MAX) })]
    fn test_ser_deser(#[case] msg: HotStuffMsg) {
        let buf = msg.ser();
        let deser_msg = HotStuffMsg::deser(&buf).unwrap();
        assert_eq!(msg, deser_msg);
    }

    #[test]
    fn test_ser_layout() {
        let msg = HotStuffMsg {
            msg_type: MsgType::Commit,
            sender: PeerId(2),
            view: 9,
            value: Bytes::from_static(b"v"),
            value_hash: [7; 32],
            signature: Bytes::from_static(b"sig"),
            justify: None,
        };

        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x03\0\0\0\x02\0\0\0\0\0\0\0\x09\0\0\0\x01v");
        expected.extend_from_slice(&[7; 32]);
        expected.extend_from_slice(b"\0\0\0\x03sig\0");

        assert_eq!(msg.ser().as_ref(), expected.as_slice());
    }

    #[rstest]
    #[case::empty(b"".to_vec())]
    #[case::invalid_type(vec![9, 0, 0, 0, 1])]
    #[case::sender_zero({ let mut b = test_msg(MsgType::Prepare, 1, 1).ser().to_vec(); b[1..5].copy_from_slice(&[0, 0, 0, 0]); b })]
    #[case::truncated({ let b = test_msg(MsgType::Prepare, 1, 1).ser(); b[..b.len() - 1].to_vec() })]
    #[case::trailing({ let mut b = test_msg(MsgType::Prepare, 1, 1).ser().to_vec(); b.push(0); b })]
    #[case::invalid_justify({ let mut b = test_msg(MsgType::Prepare, 1, 1).ser().to_vec(); *b.last_mut().unwrap() = 2; b })]
    #[case::huge_value_length({ let mut b = test_msg(MsgType::Prepare, 1, 1).ser().to_vec(); b[13..17].copy_from_slice(&[0xff, 0xff, 0xff, 0xff]); b })]
    fn test_deser_invalid(#[case] buf: Vec<u8>) {
        assert!(HotStuffMsg::deser(&buf).is_err());
    }

    #[test]
    fn test_deser_rejects_inflated_signature_count() {
        let msg = HotStuffMsg { justify: Some(test_qc(MsgType::Prepare, 1, 0)), ..test_msg(MsgType::PreCommit, 1, 2) };
        let mut buf = msg.ser().to_vec();
        let len = buf.len();
        buf[len - 4..].copy_from_slice(&[0, 0, 0x10, 0]);
        assert!(HotStuffMsg::deser(&buf).is_err());
    }

    #[test]
    fn test_hash_value() {
        assert_eq!(
            hash_value(b""),
            [0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
             0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55]
        );
    }
}
