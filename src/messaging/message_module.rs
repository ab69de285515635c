use std::fmt::{Debug, Formatter};

use tokio_util::sync::CancellationToken;

use crate::messaging::envelope::Envelope;


/// A [MessageModuleId] is sent as part of a message's envelope to identify the protocol a message
///  belongs to, for dispatch on the receiving side.
///
/// An id is technically a u64, but it is intended to be used as a sequence of up to eight ASCII
///  characters to give it a human-readable name, both for uniqueness and for debugging at the
///  wire level.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MessageModuleId(pub u64);

impl MessageModuleId {
    pub const fn new(value: &[u8; 8]) -> MessageModuleId {
        Self(u64::from_be_bytes(*value))
    }
}

impl Debug for MessageModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_be_bytes();
        let used = bytes.iter()
            .position(|&b| b == 0)
            .map(|len| &bytes[..len])
            .unwrap_or(&bytes);

        let string_repr = std::str::from_utf8(used).unwrap_or("???");

        write!(f, "0x{:016X}({:?})", self.0, string_repr)
    }
}


/// Protocols plug into the network host as [MessageModule]s. The host dispatches every received
///  frame to the module registered for the frame's [MessageModuleId].
///
/// All protocols handled here are fire-and-forget: there is no response payload, and no stream
///  continuation.
#[async_trait::async_trait]
pub trait MessageModule: 'static + Sync + Send {
    fn id(&self) -> MessageModuleId;

    /// called to handle a message that was received for this message module. `buf` contains the
    ///  module specific payload, i.e. starting immediately *after* the envelope.
    ///
    /// This is a blocking call, holding up the central receive loop. A module may apply
    ///  back-pressure this way, but it must give up when `cancel` fires.
    async fn on_message(&self, envelope: &Envelope, buf: &[u8], cancel: &CancellationToken) -> anyhow::Result<()>;
}
