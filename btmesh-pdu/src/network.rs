use crate::System;
use btmesh_common::address::Address;
use btmesh_common::address::UnicastAddress;
use btmesh_common::{Ctl, InsufficientBuffer, Ivi, Nid, ParseError, Seq, Ttl};
use heapless::Vec;

/// A cleartext network PDU as handed down from the Network layer: the
/// 9-byte header already parsed into typed fields, with the lower-transport
/// body still opaque to this layer's callers until [`crate::lower::LowerPdu::parse`]
/// classifies it.
///
/// Encryption, NID-keyed decryption and replay protection all live in the
/// Network layer; this type is the boundary the two layers share.
#[derive(Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkPdu<S: System = ()> {
    netkey_index: u16,
    ivi: Ivi,
    nid: Nid,
    ctl: Ctl,
    ttl: Ttl,
    seq: Seq,
    src: UnicastAddress,
    dst: Address,
    transport_pdu: Vec<u8, 16>,
    meta: S::NetworkMetadata,
}

impl<S: System> NetworkPdu<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        netkey_index: u16,
        ivi: Ivi,
        nid: Nid,
        ctl: Ctl,
        ttl: Ttl,
        seq: Seq,
        src: UnicastAddress,
        dst: Address,
        transport_pdu: &[u8],
        meta: S::NetworkMetadata,
    ) -> Result<Self, InsufficientBuffer> {
        Ok(Self {
            netkey_index,
            ivi,
            nid,
            ctl,
            ttl,
            seq,
            src,
            dst,
            transport_pdu: Vec::from_slice(transport_pdu)?,
            meta,
        })
    }

    /// Parses the 9-byte header plus trailing lower-transport body, as
    /// handed to the Network layer's higher-layer callback. `netkey_index`
    /// is out-of-band (the Network layer already resolved it to decrypt).
    pub fn parse(netkey_index: u16, header: &[u8; 9], body: &[u8]) -> Result<Self, ParseError> {
        use crate::header;
        Ok(Self {
            netkey_index,
            ivi: Ivi::parse(header::ivi(header))?,
            nid: Nid::parse(header::nid(header))?,
            ctl: Ctl::parse(header::ctl(header) as u8)?,
            ttl: Ttl::parse(header::ttl(header))?,
            seq: Seq::parse(&[header[2], header[3], header[4]]),
            src: UnicastAddress::parse([header[5], header[6]])
                .map_err(|_| ParseError::InvalidValue)?,
            dst: Address::parse([header[7], header[8]]),
            transport_pdu: Vec::from_slice(body).map_err(|_| ParseError::InsufficientBuffer)?,
            meta: Default::default(),
        })
    }

    pub fn netkey_index(&self) -> u16 {
        self.netkey_index
    }

    pub fn ivi(&self) -> Ivi {
        self.ivi
    }

    pub fn nid(&self) -> Nid {
        self.nid
    }

    pub fn ctl(&self) -> Ctl {
        self.ctl
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn src(&self) -> UnicastAddress {
        self.src
    }

    pub fn dst(&self) -> Address {
        self.dst
    }

    pub fn meta(&self) -> &S::NetworkMetadata {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut S::NetworkMetadata {
        &mut self.meta
    }

    pub fn transport_pdu(&self) -> &[u8] {
        &self.transport_pdu
    }
}
