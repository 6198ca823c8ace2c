//! Frame encoding and stream-splitting helpers.

use bytes::BytesMut;
use streamwire::{HeaderLayout, Reassembler};

/// Encode `payloads` back to back using `layout`.
///
/// # Panics
///
/// Panics if a payload is too long for the layout's length field.
#[must_use]
pub fn encode_frames<P: AsRef<[u8]>>(layout: HeaderLayout, payloads: &[P]) -> Vec<u8> {
    let mut wire = BytesMut::new();
    for payload in payloads {
        layout
            .encode_frame(payload.as_ref(), &mut wire)
            .expect("payload fits the length field");
    }
    wire.to_vec()
}

/// Split `bytes` at the given offsets. Offsets beyond the end are ignored.
#[must_use]
pub fn split_at_cuts(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .copied()
        .filter(|&c| c > 0 && c < bytes.len())
        .collect();
    points.sort_unstable();
    points.dedup();
    let mut chunks = Vec::with_capacity(points.len() + 1);
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

/// Split `bytes` into chunks of at most `size` bytes.
///
/// # Panics
///
/// Panics if `size` is zero.
#[must_use]
pub fn chunked(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(size).map(<[u8]>::to_vec).collect()
}

/// Decode every complete frame in `wire`, returning the payloads.
///
/// # Panics
///
/// Panics if `layout` is malformed, or if `wire` contains a framing
/// violation or ends mid-frame.
#[must_use]
pub fn decode_payloads(layout: HeaderLayout, wire: &[u8]) -> Vec<Vec<u8>> {
    let mut engine = Reassembler::new(layout, usize::MAX).expect("valid layout");
    let payloads = engine
        .frames(wire)
        .map(|frame| frame.expect("well-formed frame").payload().to_vec())
        .collect();
    assert!(engine.is_idle(), "wire ended mid-frame");
    payloads
}
