use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use packstream::{
    from_slice, from_slice_with, to_vec, to_vec_with, AnyDecode, Decode, Decoder,
    DecoderOptions, Encode, Encoder, EncoderOptions, Error, ExtRegistry, RawMessage, Result,
    Value, Width,
};

#[derive(Debug, PartialEq)]
struct SimpleStruct {
    bytes: Vec<u8>,
}

impl Encode for SimpleStruct {
    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        enc.encode_registered(self)
    }
}

impl Decode for SimpleStruct {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.decode_registered()
    }
}

fn simple_registry() -> Arc<ExtRegistry> {
    let registry = Arc::new(ExtRegistry::new());
    registry
        .register::<SimpleStruct, _, _>(
            7,
            |s| Ok(s.bytes.clone()),
            |b| Ok(SimpleStruct { bytes: b.to_vec() }),
        )
        .unwrap();
    registry
}

#[test]
fn string_map_seed() {
    let mut map = HashMap::new();
    map.insert("hello".to_string(), "world".to_string());
    assert_eq!(to_vec(&map).unwrap(), b"\x81\xa5hello\xa5world");
}

#[test]
fn ext_seeds() {
    let opts = EncoderOptions::default().registry(simple_registry());
    let five = SimpleStruct {
        bytes: vec![1, 2, 4, 8, 16],
    };
    assert_eq!(
        to_vec_with(&five, opts.clone()).unwrap(),
        [0xc7, 0x05, 0x07, 0x01, 0x02, 0x04, 0x08, 0x10]
    );
    let four = SimpleStruct {
        bytes: vec![1, 4, 16, 64],
    };
    let bytes = to_vec_with(&four, opts).unwrap();
    assert_eq!(bytes, [0xd6, 0x07, 0x01, 0x04, 0x10, 0x40]);

    let dec_opts = DecoderOptions::default().registry(simple_registry());
    let back: SimpleStruct = from_slice_with(&bytes, dec_opts).unwrap();
    assert_eq!(back, four);
}

#[test]
fn registered_type_needs_a_registry() {
    let value = SimpleStruct { bytes: vec![1] };
    assert!(matches!(to_vec(&value), Err(Error::UnregisteredType(_))));
}

#[test]
fn ext_id_mismatch() {
    let dec_opts = DecoderOptions::default().registry(simple_registry());
    assert!(matches!(
        from_slice_with::<SimpleStruct>(&[0xd4, 0x08, 0x00], dec_opts),
        Err(Error::ExtIdMismatch { expected: 7, found: 8 })
    ));
}

#[test]
fn registered_ext_in_dynamic_value() {
    let registry = simple_registry();
    let dec_opts = DecoderOptions::default().registry(registry);
    let value: Value = from_slice_with(&[0xd5, 0x07, 0xaa, 0xbb], dec_opts).unwrap();
    let ext = match value {
        Value::Extension(ext) => ext,
        other => panic!("expected an extension, got {other:?}"),
    };
    assert_eq!(ext.id, 7);
    assert_eq!(
        ext.decoded::<SimpleStruct>(),
        Some(&SimpleStruct {
            bytes: vec![0xaa, 0xbb]
        })
    );
}

#[test]
fn dynamic_map_with_map_key_is_rejected() {
    assert!(matches!(
        from_slice::<Value>(&[0x81, 0x81, 0xa1, 0x78, 0xc3, 0xc3]),
        Err(Error::UnsupportedMapKey(_))
    ));
}

#[test]
fn narrowest_integer_widths() {
    let cases: &[(i64, usize)] = &[
        (0, 1),
        (1, 1),
        (127, 1),
        (128, 2),
        (255, 2),
        (256, 3),
        (32768, 3),
        (65535, 3),
        (65536, 5),
        (1 << 31, 5),
        (1 << 32, 9),
        (-1, 1),
        (-32, 1),
        (-33, 2),
        (-128, 2),
        (-129, 3),
        (-32768, 3),
        (-32769, 5),
        (i64::from(i32::MIN), 5),
        (i64::from(i32::MIN) - 1, 9),
    ];
    for &(value, len) in cases {
        assert_eq!(to_vec(&value).unwrap().len(), len, "value {value}");
        assert_eq!(from_slice::<i64>(&to_vec(&value).unwrap()).unwrap(), value);
    }
    assert_eq!(to_vec(&128i64).unwrap(), [0xcc, 0x80]);
    assert_eq!(to_vec(&-33i64).unwrap(), [0xd0, 0xdf]);
    assert_eq!(to_vec(&(1u64 << 31)).unwrap(), [0xce, 0x80, 0, 0, 0]);
}

#[test]
fn fixed_width_decoding() {
    let mut dec = Decoder::from_slice(&[0x05, 0xd2, 0, 0, 0x01, 0x00, 0xcd, 0xff, 0xff]);
    assert_eq!(dec.decode_int_width(Width::W16).unwrap(), 5);
    assert_eq!(dec.decode_int_width(Width::W16).unwrap(), 256);
    assert!(matches!(
        dec.decode_int_width(Width::W16),
        Err(Error::Overflow("i16"))
    ));
}

#[test]
fn ext_framing_lengths() {
    let cases: &[(usize, &[u8])] = &[
        (1, &[0xd4, 0x05]),
        (2, &[0xd5, 0x05]),
        (4, &[0xd6, 0x05]),
        (8, &[0xd7, 0x05]),
        (16, &[0xd8, 0x05]),
        (17, &[0xc7, 17, 0x05]),
        (255, &[0xc7, 0xff, 0x05]),
        (256, &[0xc8, 0x01, 0x00, 0x05]),
        (65535, &[0xc8, 0xff, 0xff, 0x05]),
        (65536, &[0xc9, 0x00, 0x01, 0x00, 0x00, 0x05]),
    ];
    for &(len, header) in cases {
        let payload = vec![0x11; len];
        let mut enc = Encoder::buffered();
        enc.encode_ext(5, &payload).unwrap();
        let bytes = enc.into_bytes();
        assert_eq!(&bytes[..header.len()], header, "payload length {len}");
        assert_eq!(bytes.len(), header.len() + len);

        let mut dec = Decoder::from_slice(&bytes);
        assert_eq!(dec.decode_ext().unwrap(), (5, payload));
    }
}

#[test]
fn interned_strings_example() {
    let words = vec!["hello".to_string(); 3];
    let opts = EncoderOptions::default().use_interned_strings(true);
    let bytes = to_vec_with(&words, opts).unwrap();
    assert_eq!(
        bytes,
        [
            0x93, 0xa5, b'h', b'e', b'l', b'l', b'o', 0xd4, 0x80, 0x00, 0xd4, 0x80, 0x00
        ]
    );
    let dec_opts = DecoderOptions::default().use_interned_strings(true);
    let back: Vec<String> = from_slice_with(&bytes, dec_opts).unwrap();
    assert_eq!(back, words);
}

#[test]
fn dictionary_carries_across_reset() {
    let opts = EncoderOptions::default().use_interned_strings(true);
    let mut enc = Encoder::buffered_with(opts);
    enc.encode_string("shared").unwrap();
    let seed = enc.dictionary().to_vec();
    enc.take_bytes();

    enc.reset(Vec::new());
    enc.reset_dictionary(seed.clone());
    enc.encode_string("shared").unwrap();
    enc.flush().unwrap();

    let mut dec = Decoder::from_slice(&[0xd4, 0x80, 0x00]);
    dec.reset_dictionary(seed);
    assert_eq!(dec.decode_string().unwrap(), "shared");
}

#[test]
fn repeated_seed_entries_keep_positions() {
    let seed = ["aaa", "aaa", "bbb"];
    let mut enc = Encoder::buffered_with(EncoderOptions::default().use_interned_strings(true));
    enc.reset_dictionary(seed);
    enc.encode_string("bbb").unwrap();
    enc.encode_string("aaa").unwrap();
    enc.encode_string("ccc").unwrap();
    enc.encode_string("ccc").unwrap();
    let bytes = enc.take_bytes();
    assert_eq!(
        bytes,
        [0xd4, 0x80, 0x02, 0xd4, 0x80, 0x00, 0xa3, b'c', b'c', b'c', 0xd4, 0x80, 0x03]
    );
    assert_eq!(enc.dictionary(), ["aaa", "aaa", "bbb", "ccc"]);

    let mut dec =
        Decoder::from_slice_with(&bytes, DecoderOptions::default().use_interned_strings(true));
    dec.reset_dictionary(seed);
    for want in ["bbb", "aaa", "ccc", "ccc"] {
        assert_eq!(dec.decode_string().unwrap(), want);
    }
}

#[test]
fn floats() {
    assert_eq!(to_vec(&1.5f32).unwrap(), [0xca, 0x3f, 0xc0, 0x00, 0x00]);
    assert_eq!(
        to_vec(&1.5f64).unwrap(),
        [0xcb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
    );
    assert_eq!(from_slice::<f64>(&[0xca, 0x3f, 0xc0, 0x00, 0x00]).unwrap(), 1.5);
    assert!(matches!(
        from_slice::<u32>(&[0xcb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]),
        Err(Error::InvalidCode { code: 0xcb, .. })
    ));
}

#[test]
fn string_and_bytes_accept_both_framings() {
    let s: String = from_slice(&[0xc4, 0x02, b'o', b'k']).unwrap();
    assert_eq!(s, "ok");
    let b: Vec<u8> = from_slice(&[0xa2, b'o', b'k']).unwrap();
    assert_eq!(b, b"ok");
    assert_eq!(to_vec(&"ok").unwrap(), [0xa2, b'o', b'k']);
    assert_eq!(to_vec(&b"ok".to_vec()).unwrap(), [0xc4, 0x02, b'o', b'k']);
}

#[test]
fn collection_headers() {
    let arr: Vec<u8> = Vec::new();
    assert_eq!(to_vec(&arr).unwrap(), [0xc4, 0x00]);
    let arr: Vec<u16> = (0..16).collect();
    assert_eq!(&to_vec(&arr).unwrap()[..3], &[0xdc, 0x00, 0x10]);
    let map: BTreeMap<u16, bool> = (0..16).map(|i| (i, true)).collect();
    assert_eq!(&to_vec(&map).unwrap()[..3], &[0xde, 0x00, 0x10]);
    let arr: Vec<bool> = vec![true; 15];
    assert_eq!(to_vec(&arr).unwrap()[0], 0x9f);
}

#[test]
fn nil_decodes_to_zero_values() {
    assert_eq!(from_slice::<u32>(&[0xc0]).unwrap(), 0);
    assert_eq!(from_slice::<String>(&[0xc0]).unwrap(), "");
    assert_eq!(from_slice::<Vec<u8>>(&[0xc0]).unwrap(), Vec::<u8>::new());
    assert_eq!(from_slice::<Option<String>>(&[0xc0]).unwrap(), None);
    assert!(!from_slice::<bool>(&[0xc0]).unwrap());
}

#[test]
fn multi_value_operations() {
    let mut enc = Encoder::buffered();
    let word = "two".to_string();
    enc.encode_many(&[&1u8, &word, &true]).unwrap();
    let bytes = enc.into_bytes();
    assert_eq!(bytes, [0x01, 0xa3, b't', b'w', b'o', 0xc3]);

    let (mut a, mut b, mut c) = (0u8, String::new(), false);
    let mut dec = Decoder::from_slice(&bytes);
    dec.decode_many(&mut [&mut a, &mut b, &mut c]).unwrap();
    assert_eq!((a, b.as_str(), c), (1, "two", true));
}

#[test]
fn multi_decode_stops_at_first_failure() {
    let (mut a, mut b, mut c) = (0u8, String::new(), 0u8);
    let mut dec = Decoder::from_slice(&[0x07, 0xc3, 0x09]);
    let targets: &mut [&mut dyn AnyDecode] = &mut [&mut a, &mut b, &mut c];
    assert!(matches!(
        dec.decode_many(targets),
        Err(Error::InvalidCode { code: 0xc3, .. })
    ));
    assert_eq!(a, 7);
    assert_eq!(c, 0);
}

#[test]
fn peek_does_not_consume() {
    let mut dec = Decoder::from_slice(&[0x92, 0x01, 0x02]);
    assert_eq!(dec.peek_code().unwrap(), 0x92);
    assert_eq!(dec.position(), 0);
    assert_eq!(dec.decode_array_len().unwrap(), Some(2));
}

#[test]
fn raw_message_pass_through() {
    let bytes = to_vec(&vec![Value::from("x"), Value::Map(vec![])]).unwrap();
    let raw: RawMessage = from_slice(&bytes).unwrap();
    assert_eq!(raw.as_bytes(), &bytes[..]);
    assert_eq!(to_vec(&raw).unwrap(), bytes);
}

#[test]
fn encoder_streams_into_sink() {
    let mut out = Vec::new();
    {
        let mut enc = Encoder::new(&mut out);
        enc.encode_value(&"abc").unwrap();
        enc.encode_value(&vec![1u32; 3000]).unwrap();
        enc.flush().unwrap();
    }
    assert_eq!(&out[..4], b"\xa3abc");
    assert_eq!(out.len(), 4 + 3 + 3000);

    let mut dec = Decoder::new(out.as_slice());
    assert_eq!(dec.decode_value::<String>().unwrap(), "abc");
    assert_eq!(dec.decode_value::<Vec<u32>>().unwrap().len(), 3000);
}
