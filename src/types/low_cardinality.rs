pub const NEED_GLOBAL_DICTIONARY_BIT: u64 = 1u64 << 8;
pub const HAS_ADDITIONAL_KEYS_BIT: u64 = 1u64 << 9;
pub const NEED_UPDATE_DICTIONARY_BIT: u64 = 1u64 << 10;

pub const TUINT8: u64 = 0;
pub const TUINT16: u64 = 1;
pub const TUINT32: u64 = 2;
pub const TUINT64: u64 = 3;

pub const LOW_CARDINALITY_VERSION: u64 = 1;

/// The minimum index width tier for a dictionary of `len` keys: the largest
/// index written is `len - 1`.
pub fn index_tier(len: usize) -> u64 {
    if len > u32::MAX as usize + 1 {
        TUINT64
    } else if len > u16::MAX as usize + 1 {
        TUINT32
    } else if len > u8::MAX as usize + 1 {
        TUINT16
    } else {
        TUINT8
    }
}

pub fn tier_width(tier: u64) -> usize {
    match tier {
        TUINT8 => 1,
        TUINT16 => 2,
        TUINT32 => 4,
        _ => 8,
    }
}
