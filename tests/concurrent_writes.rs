#![cfg(not(loom))]
//! Concurrent producers sharing one session.
//!
//! Every producer's frames must arrive whole, never interleaved with another
//! frame's bytes, and in the order that producer sent them.

use std::{collections::HashMap, thread};

use rstest::rstest;
use streamwire::{HeaderLayout, Message, SessionConfig, handler_fn, session::Session};
use streamwire_testing::{AfterScript, ScriptedTransport, WritePolicy, decode_payloads};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

const PRODUCERS: u16 = 8;
const FRAMES_PER_PRODUCER: u16 = 200;

fn payload(producer: u16, seq: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + usize::from(seq % 13));
    payload.extend_from_slice(&producer.to_be_bytes());
    payload.extend_from_slice(&seq.to_be_bytes());
    payload.resize(4 + usize::from(seq % 13), u8::try_from(producer).unwrap_or(u8::MAX));
    payload
}

/// Group payloads by producer and check each producer's sequence.
fn assert_per_producer_fifo(payloads: &[Vec<u8>]) {
    let mut next: HashMap<u16, u16> = HashMap::new();
    for frame in payloads {
        let producer = u16::from_be_bytes([frame[0], frame[1]]);
        let seq = u16::from_be_bytes([frame[2], frame[3]]);
        let expected = next.entry(producer).or_insert(0);
        assert_eq!(seq, *expected, "producer {producer} reordered");
        assert_eq!(frame, &payload(producer, seq), "frame bytes corrupted");
        *expected += 1;
    }
    assert_eq!(next.len(), usize::from(PRODUCERS));
    assert!(next.values().all(|&n| n == FRAMES_PER_PRODUCER));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn threads_and_tasks_share_one_writer() {
    let transport = ScriptedTransport::new([])
        .then(AfterScript::Hang)
        .with_writes(WritePolicy {
            max_chunk: Some(5),
            yield_between_writes: true,
            ..WritePolicy::default()
        });
    let wire = transport.wire();
    let config = SessionConfig::builder()
        .layout(HeaderLayout::u16_be())
        .max_frame_len(256)
        .build()
        .expect("valid configuration");
    let session = Session::new(transport, config);
    let handle = session.handle();
    let run = tokio::spawn(session.run(handler_fn(|_: Message<'_>| Ok(()))));

    // Half the producers are OS threads, half are runtime tasks.
    let threads: Vec<_> = (0..PRODUCERS / 2)
        .map(|producer| {
            let handle = handle.clone();
            thread::spawn(move || {
                for seq in 0..FRAMES_PER_PRODUCER {
                    handle
                        .send_frame(&payload(producer, seq))
                        .expect("session open");
                }
            })
        })
        .collect();
    let tasks: Vec<_> = (PRODUCERS / 2..PRODUCERS)
        .map(|producer| {
            let handle = handle.clone();
            tokio::spawn(async move {
                for seq in 0..FRAMES_PER_PRODUCER {
                    handle
                        .send_frame(&payload(producer, seq))
                        .expect("session open");
                    if seq % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("producer task");
    }
    for thread in threads {
        thread.join().expect("producer thread");
    }

    handle.shutdown();
    let stats = run.await.expect("join").expect("clean close");

    let total = u64::from(PRODUCERS) * u64::from(FRAMES_PER_PRODUCER);
    assert_eq!(stats.buffers_out, total);
    let payloads = decode_payloads(HeaderLayout::u16_be(), &wire.written());
    assert_eq!(payloads.len() as u64, total);
    assert_per_producer_fifo(&payloads);
    assert_eq!(handle.pool_stats().outstanding(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_echo_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener.local_addr");
    let layout = HeaderLayout::u32_be();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let session = Session::new(stream, SessionConfig::default());
        let handle = session.handle();
        session
            .run(handler_fn(move |msg: Message<'_>| {
                handle.send_frame(msg.payload())?;
                Ok(())
            }))
            .await
    });

    let payloads: Vec<Vec<u8>> = (0u8..32).map(|i| vec![i; usize::from(i) * 31]).collect();
    let wire = streamwire_testing::encode_frames(layout, &payloads);
    let mut client = TcpStream::connect(addr).await.expect("connect");
    for piece in wire.chunks(37) {
        client.write_all(piece).await.expect("client write");
    }
    client.shutdown().await.expect("client shutdown");

    let mut echoed = Vec::new();
    client.read_to_end(&mut echoed).await.expect("client read");
    let stats = server.await.expect("join").expect("clean close");

    assert_eq!(decode_payloads(layout, &echoed), payloads);
    assert_eq!(stats.messages_in, 32);
    assert_eq!(stats.buffers_out, 32);
}
