//! Unit tests for the reassembly engine.

use bytes::BytesMut;
use rstest::{fixture, rstest};

use super::{Message, MessageHandler, Reassembler, handler_fn};
use crate::{
    error::{ConfigError, FramingError, HandlerError, LayoutError, ReassemblyError},
    frame::{Endianness, HeaderLayout, LengthFormat},
};

#[derive(Default)]
struct Recorder {
    payloads: Vec<Vec<u8>>,
}

impl MessageHandler for Recorder {
    fn on_message(&mut self, message: Message<'_>) -> Result<(), HandlerError> {
        self.payloads.push(message.payload().to_vec());
        Ok(())
    }
}

#[fixture]
fn engine() -> Reassembler {
    Reassembler::new(HeaderLayout::u16_be(), 1024).expect("valid layout")
}

/// `[len=4]AB[len=5]CDE` with a 2-byte total-length header.
fn ab_cde() -> Vec<u8> { vec![0, 4, b'A', b'B', 0, 5, b'C', b'D', b'E'] }

#[rstest]
fn single_chunk_yields_both_messages(mut engine: Reassembler) {
    let mut recorder = Recorder::default();
    let delivered = engine.feed(&ab_cde(), &mut recorder).expect("feed");
    assert_eq!(delivered, 2);
    assert_eq!(recorder.payloads, vec![b"AB".to_vec(), b"CDE".to_vec()]);
    assert!(engine.is_idle());
}

#[rstest]
fn split_chunks_yield_identical_messages(mut engine: Reassembler) {
    let bytes = ab_cde();
    let mut recorder = Recorder::default();

    assert_eq!(engine.feed(&bytes[..3], &mut recorder).expect("first"), 0);
    assert_eq!(engine.carry_over_len(), 3);
    assert_eq!(engine.feed(&bytes[3..7], &mut recorder).expect("second"), 1);
    assert_eq!(engine.carry_over_len(), 3);
    assert_eq!(engine.feed(&bytes[7..], &mut recorder).expect("third"), 1);

    assert_eq!(recorder.payloads, vec![b"AB".to_vec(), b"CDE".to_vec()]);
    assert!(engine.is_idle());
}

#[rstest]
fn split_inside_header_waits_for_rest(mut engine: Reassembler) {
    let mut recorder = Recorder::default();
    engine.feed(&[0], &mut recorder).expect("half header");
    assert_eq!(engine.carry_over_len(), 1);
    engine.feed(&[3, b'Z'], &mut recorder).expect("rest");
    assert_eq!(recorder.payloads, vec![b"Z".to_vec()]);
}

#[rstest]
fn header_only_frame_has_empty_payload(mut engine: Reassembler) {
    let frames: Vec<_> = engine
        .frames(&[0, 2, 0, 2])
        .collect::<Result<_, _>>()
        .expect("frames");
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.payload().is_empty() && f.len() == 2));
}

#[rstest]
#[case(vec![0, 0], FramingError::EmptyFrame)]
#[case(vec![0, 1], FramingError::Undersized { declared: 1, header_len: 2 })]
#[case(vec![0x04, 0x01], FramingError::OversizedFrame { size: 1025, max: 1024 })]
fn invalid_lengths_are_rejected(
    mut engine: Reassembler,
    #[case] header: Vec<u8>,
    #[case] expected: FramingError,
) {
    let mut calls = 0usize;
    let mut handler = handler_fn(|_message: Message<'_>| {
        calls += 1;
        Ok(())
    });
    let err = engine
        .feed(&header, &mut handler)
        .expect_err("length must be rejected");
    assert!(matches!(err, ReassemblyError::Framing(ref e) if *e == expected));
    drop(handler);
    assert_eq!(calls, 0);
    assert!(engine.is_idle(), "buffered bytes are discarded after a framing error");
}

#[rstest]
fn oversize_is_reported_before_payload_arrives(mut engine: Reassembler) {
    let err = engine
        .frames(&[0xFF, 0xFF])
        .next()
        .expect("one item")
        .expect_err("oversized");
    assert_eq!(err, FramingError::OversizedFrame { size: 0xFFFF, max: 1024 });
}

#[rstest]
fn frames_before_a_bad_header_are_still_delivered(mut engine: Reassembler) {
    let mut recorder = Recorder::default();
    let err = engine
        .feed(&[0, 3, b'x', 0, 0], &mut recorder)
        .expect_err("second header is empty");
    assert!(matches!(err, ReassemblyError::Framing(FramingError::EmptyFrame)));
    assert_eq!(recorder.payloads, vec![b"x".to_vec()]);
}

#[rstest]
fn frames_iterator_stops_after_error(mut engine: Reassembler) {
    let mut frames = engine.frames(&[0, 0, 0, 3, b'x']);
    assert!(matches!(frames.next(), Some(Err(FramingError::EmptyFrame))));
    assert!(frames.next().is_none());
    assert!(frames.next().is_none());
}

#[rstest]
fn handler_error_stops_delivery(mut engine: Reassembler) {
    let mut seen = 0usize;
    let mut handler = handler_fn(|message: Message<'_>| {
        seen += 1;
        if message.payload() == b"AB" {
            return Err("refused".into());
        }
        Ok(())
    });
    let err = engine.feed(&ab_cde(), &mut handler).expect_err("handler refuses");
    assert!(matches!(err, ReassemblyError::Handler(_)));
    drop(handler);
    assert_eq!(seen, 1);
}

#[test]
fn offset_length_field_is_honoured() {
    let layout = HeaderLayout::openflow();
    let mut engine = Reassembler::new(layout, 64).expect("valid layout");
    let mut wire = BytesMut::new();
    layout.encode_frame(b"hello", &mut wire).expect("encode");
    layout.encode_frame(b"", &mut wire).expect("encode");

    let frames: Vec<_> = engine
        .frames(&wire)
        .collect::<Result<_, _>>()
        .expect("frames");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload(), b"hello");
    assert_eq!(frames[0].header().len(), 8);
    assert_eq!(frames[1].len(), 8);
}

#[test]
fn carry_over_never_exceeds_one_frame() {
    let layout = HeaderLayout::u16_be();
    let mut engine = Reassembler::new(layout, 16).expect("valid layout");
    let mut wire = BytesMut::new();
    for payload in [&b"abc"[..], &b"defghij"[..], &b"k"[..]] {
        layout.encode_frame(payload, &mut wire).expect("encode");
    }
    let mut recorder = Recorder::default();
    for byte in &wire {
        engine
            .feed(std::slice::from_ref(byte), &mut recorder)
            .expect("feed");
        assert!(engine.carry_over_len() < 16);
    }
    assert_eq!(recorder.payloads.len(), 3);
}

#[rstest]
fn reset_discards_partial_frame(mut engine: Reassembler) {
    engine.extend(&[0, 9, 1, 2]);
    assert!(!engine.is_idle());
    engine.reset();
    assert!(engine.is_idle());
    assert!(engine.frames(&[0, 3, b'q']).next().is_some());
}

/// Layout assembled field by field, bypassing the checked constructors.
fn raw_layout(header_len: usize, length_offset: usize, width: usize) -> HeaderLayout {
    HeaderLayout {
        header_len,
        length_offset,
        length: LengthFormat {
            bytes: width,
            endianness: Endianness::Big,
        },
    }
}

#[rstest]
#[case(raw_layout(12, 0, 9), 64, ConfigError::Layout(LayoutError::UnsupportedWidth(9)))]
#[case(
    raw_layout(2, 1, 2),
    64,
    ConfigError::Layout(LayoutError::FieldOutOfBounds { offset: 1, width: 2, header_len: 2 })
)]
#[case(HeaderLayout::openflow(), 4, ConfigError::FrameCapBelowHeader { max: 4, header_len: 8 })]
fn malformed_layouts_are_refused(
    #[case] layout: HeaderLayout,
    #[case] max_frame_len: usize,
    #[case] expected: ConfigError,
) {
    let err = Reassembler::new(layout, max_frame_len).expect_err("layout must be refused");
    assert_eq!(err, expected);
}

#[test]
fn cap_beyond_field_range_is_bounded_by_the_field() {
    let mut engine = Reassembler::new(HeaderLayout::u16_be(), usize::MAX).expect("valid layout");
    let frames: Vec<_> = engine
        .frames(&[0, 3, b'z', 0xFF, 0xFF])
        .collect::<Result<_, _>>()
        .expect("frames");
    assert_eq!(frames.len(), 1);
    assert_eq!(engine.carry_over_len(), 2);
}
