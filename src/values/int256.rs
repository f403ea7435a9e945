/// Big-endian 256-bit signed integer, stored as raw bytes.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Debug, Default)]
#[allow(non_camel_case_types)]
pub struct i256(pub [u8; 32]);

/// Big-endian 256-bit unsigned integer, stored as raw bytes.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Debug, Default)]
#[allow(non_camel_case_types)]
pub struct u256(pub [u8; 32]);

impl From<i256> for u256 {
    fn from(x: i256) -> Self {
        u256(x.0)
    }
}

impl From<u256> for i256 {
    fn from(x: u256) -> Self {
        i256(x.0)
    }
}

impl From<(u128, u128)> for i256 {
    fn from(other: (u128, u128)) -> Self {
        let mut buf = [0u8; 32];
        buf[..16].copy_from_slice(&other.0.to_be_bytes()[..]);
        buf[16..].copy_from_slice(&other.1.to_be_bytes()[..]);
        i256(buf)
    }
}

impl From<i256> for (u128, u128) {
    fn from(x: i256) -> Self {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&x.0[..16]);
        let high = u128::from_be_bytes(buf);
        buf.copy_from_slice(&x.0[16..]);
        let low = u128::from_be_bytes(buf);
        (high, low)
    }
}

impl From<(u128, u128)> for u256 {
    fn from(other: (u128, u128)) -> Self {
        let mut buf = [0u8; 32];
        buf[..16].copy_from_slice(&other.0.to_be_bytes()[..]);
        buf[16..].copy_from_slice(&other.1.to_be_bytes()[..]);
        u256(buf)
    }
}

impl From<u256> for (u128, u128) {
    fn from(x: u256) -> Self {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&x.0[..16]);
        let high = u128::from_be_bytes(buf);
        buf.copy_from_slice(&x.0[16..]);
        let low = u128::from_be_bytes(buf);
        (high, low)
    }
}
