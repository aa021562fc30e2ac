use std::num::ParseIntError;

bitflags::bitflags! {
    /// Options of an iterate request, sent by the client as a decimal bitmask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flags: u64 {
        /// Include every sub-hierarchy below the path. Keys are flat, so this is only logged.
        const RECURSE = 0x01;
        const SORT_BY_KEY = 0x02;
        const SORT_BY_VALUE = 0x04;
        /// Return keys only.
        const NO_VALUE = 0x08;
        /// Match the path exactly instead of as a prefix.
        const EXACT_KEY = 0x10;
        const ASYNC = 0x20;
    }
}

impl Flags {
    /// Parses the decimal mask. Bits without a name are kept as sent.
    pub fn parse(value: &str) -> Result<Flags, ParseIntError> {
        Ok(Flags::from_bits_retain(value.parse::<u64>()?))
    }
}
