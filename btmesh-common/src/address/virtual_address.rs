use crate::address::{Address, InvalidAddress};

/// A virtual address representing possibly several unique label UUIDs.
///
/// Deriving a virtual address from (or resolving it back to) its label UUID
/// is an access-layer concern; this layer only needs the 16-bit address for
/// header parsing and destination bookkeeping.
#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualAddress(u16);

impl VirtualAddress {
    pub fn new(addr: u16) -> Result<Self, InvalidAddress> {
        if Self::is_virtual_address(&addr.to_be_bytes()) {
            Ok(Self(addr))
        } else {
            Err(InvalidAddress)
        }
    }

    /// Create a virtual address.
    ///
    /// # Safety
    /// The bit-pattern is not verified to be a valid virtual-address.
    pub unsafe fn new_unchecked(addr: u16) -> Self {
        Self(addr)
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub fn is_virtual_address(data: &[u8; 2]) -> bool {
        data[0] & 0b11000000 == 0b10000000
    }

    pub fn parse(data: [u8; 2]) -> Result<Self, InvalidAddress> {
        if Self::is_virtual_address(&data) {
            Ok(VirtualAddress(u16::from_be_bytes(data)))
        } else {
            Err(InvalidAddress)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for VirtualAddress {
    fn format(&self, fmt: defmt::Formatter) {
        let bytes = self.as_bytes();
        defmt::write!(fmt, "{:x}{:x}", bytes[0], bytes[1])
    }
}

impl From<VirtualAddress> for Address {
    fn from(addr: VirtualAddress) -> Self {
        Self::Virtual(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::VirtualAddress;

    #[test]
    fn parse_rejects_non_virtual() {
        assert!(VirtualAddress::parse([0x00, 0x0A]).is_err());
        assert!(VirtualAddress::parse([0xFF, 0xFF]).is_err());
    }

    #[test]
    fn parse_accepts_virtual_range() {
        assert_eq!(
            VirtualAddress::parse([0x80, 0x0A]).unwrap().as_bytes(),
            [0x80, 0x0A]
        );
    }
}
