use bytes::BytesMut;
use cbf_encoder::varint::{read_vint, read_vsint, write_vint, write_vsint};
use cbf_encoder::EncoderError;

fn vint_bytes(v: u64) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_vint(&mut buf, v);
    buf.to_vec()
}

fn vsint_bytes(v: i64) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_vsint(&mut buf, v);
    buf.to_vec()
}

fn vint_roundtrip(v: u64) -> u64 {
    let mut reader = BytesMut::from(&vint_bytes(v)[..]).freeze();
    read_vint(&mut reader).unwrap()
}

fn vsint_roundtrip(v: i64) -> i64 {
    let mut reader = BytesMut::from(&vsint_bytes(v)[..]).freeze();
    read_vsint(&mut reader).unwrap()
}

#[test]
fn test_vint_roundtrip_boundaries() {
    let samples = [
        0u64,
        1,
        127,
        128,
        (1 << 14) - 1,
        1 << 14,
        (1 << 21) - 1,
        1 << 28,
        (1 << 56) - 1,
        1 << 56,
        u64::MAX,
    ];
    for v in samples {
        assert_eq!(vint_roundtrip(v), v, "vint roundtrip failed for {}", v);
    }
}

#[test]
fn test_vint_exact_bytes() {
    assert_eq!(vint_bytes(0), vec![0x00]);
    assert_eq!(vint_bytes(1), vec![0x01]);
    assert_eq!(vint_bytes(127), vec![0x7F]);
    assert_eq!(vint_bytes(128), vec![0x80, 0x01]);
    // The ninth byte is a raw escape with a full eight bits of payload.
    assert_eq!(vint_bytes(1 << 56), vec![0x80; 8].into_iter().chain([0x01]).collect::<Vec<_>>());
    assert_eq!(vint_bytes(u64::MAX), vec![0xFF; 9]);
}

#[test]
fn test_vsint_roundtrip_boundaries() {
    let samples = [
        0i64,
        1,
        -1,
        63,
        64,
        -64,
        -65,
        127,
        -128,
        (1 << 13) - 1,
        -(1 << 13),
        (1 << 55) - 1,
        1 << 55,
        -(1 << 55),
        -(1 << 55) - 1,
        i64::MAX,
        i64::MIN,
    ];
    for v in samples {
        assert_eq!(vsint_roundtrip(v), v, "vsint roundtrip failed for {}", v);
    }
}

#[test]
fn test_vsint_exact_bytes() {
    assert_eq!(vsint_bytes(0), vec![0x00]);
    assert_eq!(vsint_bytes(-1), vec![0x7F]);
    // 63 still fits in one group; 64 collides with the sign bit of the
    // group, forcing a continuation.
    assert_eq!(vsint_bytes(63), vec![0x3F]);
    assert_eq!(vsint_bytes(64), vec![0xC0, 0x00]);
    assert_eq!(vsint_bytes(-64), vec![0x40]);
    assert_eq!(vsint_bytes(-65), vec![0xBF, 0x7F]);
    assert_eq!(vsint_bytes(i64::MIN), vec![0x80; 9]);
}

#[test]
fn test_vint_length_bounds() {
    // Each extra 7 bits of payload costs one byte, capped at nine.
    assert_eq!(vint_bytes((1 << 14) - 1).len(), 2);
    assert_eq!(vint_bytes(1 << 14).len(), 3);
    assert_eq!(vint_bytes((1 << 56) - 1).len(), 8);
    assert_eq!(vint_bytes(1 << 56).len(), 9);
    for v in [0u64, 1, u64::MAX] {
        assert!(vint_bytes(v).len() <= 9);
    }
    for v in [i64::MIN, -1, 0, 1, i64::MAX] {
        assert!(vsint_bytes(v).len() <= 9);
    }
}

#[test]
fn test_vint_truncated_input() {
    // A continuation flag with nothing after it is a truncation error.
    let mut reader = BytesMut::from(&[0x80u8][..]).freeze();
    assert!(matches!(
        read_vint(&mut reader),
        Err(EncoderError::TruncatedInput)
    ));
    let mut reader = BytesMut::from(&[0xFFu8, 0xFF][..]).freeze();
    assert!(matches!(
        read_vsint(&mut reader),
        Err(EncoderError::TruncatedInput)
    ));
}
