//! MessagePack framing codes.

pub const POS_FIXINT_MAX: u8 = 0x7f;
pub const NEG_FIXINT_MIN: u8 = 0xe0;

pub const FIXMAP: u8 = 0x80;
pub const FIXMAP_MAX: u8 = 0x8f;
pub const FIXARRAY: u8 = 0x90;
pub const FIXARRAY_MAX: u8 = 0x9f;
pub const FIXSTR: u8 = 0xa0;
pub const FIXSTR_MAX: u8 = 0xbf;

pub const FIXMAP_MASK: u8 = 0x0f;
pub const FIXARRAY_MASK: u8 = 0x0f;
pub const FIXSTR_MASK: u8 = 0x1f;

pub const NIL: u8 = 0xc0;
/// Never used by the format.
pub const UNUSED: u8 = 0xc1;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;

pub const BIN8: u8 = 0xc4;
pub const BIN16: u8 = 0xc5;
pub const BIN32: u8 = 0xc6;

pub const EXT8: u8 = 0xc7;
pub const EXT16: u8 = 0xc8;
pub const EXT32: u8 = 0xc9;

pub const FLOAT: u8 = 0xca;
pub const DOUBLE: u8 = 0xcb;

pub const UINT8: u8 = 0xcc;
pub const UINT16: u8 = 0xcd;
pub const UINT32: u8 = 0xce;
pub const UINT64: u8 = 0xcf;

pub const INT8: u8 = 0xd0;
pub const INT16: u8 = 0xd1;
pub const INT32: u8 = 0xd2;
pub const INT64: u8 = 0xd3;

pub const FIXEXT1: u8 = 0xd4;
pub const FIXEXT2: u8 = 0xd5;
pub const FIXEXT4: u8 = 0xd6;
pub const FIXEXT8: u8 = 0xd7;
pub const FIXEXT16: u8 = 0xd8;

pub const STR8: u8 = 0xd9;
pub const STR16: u8 = 0xda;
pub const STR32: u8 = 0xdb;

pub const ARRAY16: u8 = 0xdc;
pub const ARRAY32: u8 = 0xdd;
pub const MAP16: u8 = 0xde;
pub const MAP32: u8 = 0xdf;

/// Payload width of the fixed-size integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }
}

/// Broad value family selected by a framing byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Nil,
    Bool,
    /// Positive fixint or one of the `Int<w>` codes.
    Int,
    Uint,
    Float,
    Str,
    Bin,
    Array,
    Map,
    Ext,
    Unknown,
}

impl Family {
    pub fn of(code: u8) -> Family {
        match code {
            0x00..=POS_FIXINT_MAX | NEG_FIXINT_MIN..=0xff => Family::Int,
            FIXMAP..=FIXMAP_MAX => Family::Map,
            FIXARRAY..=FIXARRAY_MAX => Family::Array,
            FIXSTR..=FIXSTR_MAX => Family::Str,
            NIL => Family::Nil,
            FALSE | TRUE => Family::Bool,
            BIN8 | BIN16 | BIN32 => Family::Bin,
            EXT8 | EXT16 | EXT32 => Family::Ext,
            FLOAT | DOUBLE => Family::Float,
            UINT8..=UINT64 => Family::Uint,
            INT8..=INT64 => Family::Int,
            FIXEXT1..=FIXEXT16 => Family::Ext,
            STR8 | STR16 | STR32 => Family::Str,
            ARRAY16 | ARRAY32 => Family::Array,
            MAP16 | MAP32 => Family::Map,
            UNUSED => Family::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Family::Nil => "nil",
            Family::Bool => "bool",
            Family::Int => "int",
            Family::Uint => "uint",
            Family::Float => "float",
            Family::Str => "str",
            Family::Bin => "bin",
            Family::Array => "array",
            Family::Map => "map",
            Family::Ext => "ext",
            Family::Unknown => "unknown",
        }
    }
}

#[inline]
pub fn is_fixed_num(code: u8) -> bool {
    code <= POS_FIXINT_MAX || code >= NEG_FIXINT_MIN
}

#[inline]
pub fn is_string(code: u8) -> bool {
    Family::of(code) == Family::Str
}

#[inline]
pub fn is_bin(code: u8) -> bool {
    Family::of(code) == Family::Bin
}

#[inline]
pub fn is_ext(code: u8) -> bool {
    Family::of(code) == Family::Ext
}

#[inline]
pub fn is_array(code: u8) -> bool {
    Family::of(code) == Family::Array
}

#[inline]
pub fn is_map(code: u8) -> bool {
    Family::of(code) == Family::Map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_cover_every_code() {
        let mut unknown = Vec::new();
        for code in 0..=255u8 {
            if Family::of(code) == Family::Unknown {
                unknown.push(code);
            }
        }
        assert_eq!(unknown, vec![UNUSED]);
    }

    #[test]
    fn fix_prefixes() {
        assert_eq!(Family::of(0x00), Family::Int);
        assert_eq!(Family::of(0xff), Family::Int);
        assert_eq!(Family::of(0x85), Family::Map);
        assert_eq!(Family::of(0x9a), Family::Array);
        assert_eq!(Family::of(0xbf), Family::Str);
        assert!(is_fixed_num(0xe0));
        assert!(!is_fixed_num(0xd0));
    }

    #[test]
    fn ext_codes() {
        for code in [FIXEXT1, FIXEXT2, FIXEXT4, FIXEXT8, FIXEXT16, EXT8, EXT16, EXT32] {
            assert!(is_ext(code));
        }
        assert!(!is_ext(BIN8));
    }
}
