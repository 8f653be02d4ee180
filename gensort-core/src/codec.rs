//! The 4-bit genome codec.
//!
//! On disk an op sequence is packed two ops per byte, high nibble first,
//! in 4-byte groups of eight ops. Nibble 0 is tail padding inside the
//! final group and never emits an op; nibbles 1..=9 map to the op set in
//! declaration order. An unknown nibble or op byte is a bug in whoever
//! produced the data and aborts the process.

use gensort_machine::op;

const GROUP_OPS: usize = 8;
const GROUP_BYTES: usize = 4;

fn op_to_nibble(byte: u8) -> u8 {
    match byte {
        op::POINTER_LEFT => 1,
        op::POINTER_RIGHT => 2,
        op::INC => 3,
        op::DEC => 4,
        op::WHILE => 5,
        op::WHILE_END => 6,
        op::JUMP => 7,
        op::BOOKMARK => 8,
        op::NO_OP => 9,
        unknown => panic!("unknown op byte [{unknown:#04x}] in codec"),
    }
}

fn nibble_to_op(nibble: u8) -> Option<u8> {
    match nibble {
        0 => None,
        1 => Some(op::POINTER_LEFT),
        2 => Some(op::POINTER_RIGHT),
        3 => Some(op::INC),
        4 => Some(op::DEC),
        5 => Some(op::WHILE),
        6 => Some(op::WHILE_END),
        7 => Some(op::JUMP),
        8 => Some(op::BOOKMARK),
        9 => Some(op::NO_OP),
        unknown => panic!("unknown nibble value [{unknown}] in codec"),
    }
}

/// Pack raw ops into the nibble form. Output length is always a multiple
/// of four bytes; the final group is zero-padded.
pub fn pack(raw: &[u8]) -> Vec<u8> {
    let groups = raw.len().div_ceil(GROUP_OPS);
    let mut packed = Vec::with_capacity(groups * GROUP_BYTES);
    for group in raw.chunks(GROUP_OPS) {
        let mut word = [0u8; GROUP_BYTES];
        for (i, &byte) in group.iter().enumerate() {
            let nibble = op_to_nibble(byte);
            if i % 2 == 0 {
                word[i / 2] |= nibble << 4;
            } else {
                word[i / 2] |= nibble;
            }
        }
        packed.extend_from_slice(&word);
    }
    packed
}

/// Expand the nibble form back into raw ops, dropping padding nibbles.
pub fn unpack(packed: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(packed.len() * 2);
    for &byte in packed {
        if let Some(op) = nibble_to_op(byte >> 4) {
            raw.push(op);
        }
        if let Some(op) = nibble_to_op(byte & 0x0f) {
            raw.push(op);
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_prefab() {
        for prefab in op::PREFAB_OPSETS {
            let packed = pack(prefab.as_bytes());
            assert_eq!(packed.len() % 4, 0);
            assert_eq!(unpack(&packed), prefab.as_bytes());
        }
    }

    #[test]
    fn round_trips_aligned_sequences() {
        let raw = b"<<>>++--";
        assert_eq!(unpack(&pack(raw)), raw);
        assert_eq!(pack(raw).len(), 4);
    }

    #[test]
    fn empty_sequence_packs_to_nothing() {
        assert_eq!(pack(&[]), Vec::<u8>::new());
        assert_eq!(unpack(&[]), Vec::<u8>::new());
    }

    #[test]
    fn padding_nibbles_never_emit_ops() {
        // One op: high nibble of byte 0, seven padding nibbles after.
        let packed = pack(b"+");
        assert_eq!(packed, vec![0x30, 0, 0, 0]);
        assert_eq!(unpack(&packed), b"+");
    }

    #[test]
    fn move_to_zero_left_round_trips() {
        let raw = op::MOVE_TO_ZERO_LEFT.as_bytes();
        let packed = pack(raw);
        assert_eq!(unpack(&packed), raw);
    }

    #[test]
    #[should_panic(expected = "unknown op byte")]
    fn stray_byte_is_a_codec_bug() {
        pack(b"+?");
    }
}
