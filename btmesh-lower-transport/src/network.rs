use btmesh_pdu::network::NetworkPdu;

/// Identifies one PDU handed to [`NetworkLayer::send`]. The host echoes it
/// back through [`crate::dispatcher::LowerTransport::network_pdu_sent`] so a
/// completion can be matched to the send that produced it: Segment
/// Acknowledgments are dispatched fire-and-forget from the reassembly engine
/// and can interleave with an in-flight segmented TX to the same or another
/// peer, so their `SENT` completion must not be mistaken for the active
/// outgoing message's segment and advance its cursor out of turn.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendToken(pub(crate) u32);

/// The Network layer's send-side interface: encryption, NID lookup and wire
/// I/O are all its concern. This layer only hands over a fully-formed
/// cleartext network PDU plus the token identifying it, and waits for the
/// matching completion callback
/// ([`crate::dispatcher::LowerTransport::network_pdu_sent`]) before sending
/// the next segment of an in-flight message.
pub trait NetworkLayer {
    fn send(&mut self, pdu: NetworkPdu, token: SendToken);
}
