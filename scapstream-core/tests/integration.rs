//! Integration tests: full receive loops over real loopback sockets, fed by
//! the crate's own senders or by hand-built wire bytes.

use std::sync::Arc;
use std::time::Duration;

use scapstream_core::wire::encode_chunk;
use scapstream_core::{
    DatagramFrameSender, DatagramMetadata, Frame, FrameStats, Receiver, ReceiverEvent, ScapError,
    SlotReader, StreamFrameSender, StreamMetadata, TransportConfig, TransportKind,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;

// ── Helpers ──────────────────────────────────────────────────────

fn ephemeral(transport: TransportKind) -> TransportConfig {
    TransportConfig {
        port: 0,
        ..TransportConfig::for_transport(transport)
    }
}

/// Wait until the slot holds a frame with at least `sequence`.
async fn wait_for_sequence(frames: &mut SlotReader, sequence: u64) -> Arc<Frame> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = frames.take_latest() {
                if frame.sequence >= sequence {
                    return frame;
                }
            }
            frames.changed().await.expect("slot closed");
        }
    })
    .await
    .expect("timeout waiting for frame")
}

/// Skip events until the loop reports it stopped.
async fn wait_for_stopped(events: &mut mpsc::Receiver<ReceiverEvent>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(ReceiverEvent::Stopped { error }) => return error,
                Some(_) => continue,
                None => panic!("event channel closed before Stopped"),
            }
        }
    })
    .await
    .expect("timeout waiting for Stopped")
}

fn stream_frame(total_size: u32, chunks: &[&[u8]]) -> Vec<u8> {
    let mut out = StreamMetadata {
        total_size,
        chunk_count: chunks.len() as u32,
    }
    .encode()
    .to_vec();
    for chunk in chunks {
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

// ── Stream transport ─────────────────────────────────────────────

#[tokio::test]
async fn stream_twelve_byte_frame() {
    let mut receiver = Receiver::start(ephemeral(TransportKind::Stream))
        .await
        .unwrap();
    let mut events = receiver.take_events().unwrap();
    let mut frames = receiver.frames();

    let conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let mut sender = StreamFrameSender::new(conn).with_chunk_size(4);
    let pixels: Vec<u8> = (1..=12).collect();
    sender.send_frame(&pixels).await.unwrap();

    let frame = wait_for_sequence(&mut frames, 0).await;
    assert_eq!(&frame.pixels[..], &pixels[..]);
    assert!(Arc::ptr_eq(&frame, &receiver.latest_frame().unwrap()));

    assert!(matches!(
        events.recv().await,
        Some(ReceiverEvent::Connected { .. })
    ));
    assert!(matches!(
        events.recv().await,
        Some(ReceiverEvent::FrameArrived {
            sequence: 0,
            bytes: 12,
            ..
        })
    ));
    assert!(receiver.phase().is_receiving());

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn stream_latest_frame_overwrites() {
    let receiver = Receiver::start(TransportConfig {
        frame_width: 1,
        frame_height: 1,
        ..ephemeral(TransportKind::Stream)
    })
    .await
    .unwrap();
    let mut frames = receiver.frames();

    let conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let mut sender = StreamFrameSender::new(conn);
    sender.send_frame(&[1, 1, 1, 1]).await.unwrap();
    sender.send_frame(&[2, 2, 2, 2]).await.unwrap();

    let frame = wait_for_sequence(&mut frames, 1).await;
    assert_eq!(&frame.pixels[..], &[2, 2, 2, 2]);
    assert_eq!((frame.width, frame.height), (1, 1));
    assert_eq!(receiver.latest_frame().unwrap().sequence, 1);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn stream_eof_mid_frame_is_fatal() {
    let mut receiver = Receiver::start(ephemeral(TransportKind::Stream))
        .await
        .unwrap();
    let mut events = receiver.take_events().unwrap();

    let mut conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let wire = stream_frame(12, &[&[1, 2, 3, 4], &[5, 6, 7, 8], &[9, 10, 11, 12]]);
    conn.write_all(&wire[..16]).await.unwrap();
    conn.shutdown().await.unwrap();
    drop(conn);

    let error = wait_for_stopped(&mut events).await;
    assert!(error.unwrap().contains("connection lost"));
    assert!(receiver.phase().is_stopped());
    assert!(receiver.latest_frame().is_none());

    assert!(matches!(
        receiver.stop().await,
        Err(ScapError::ConnectionLost { .. })
    ));
}

#[tokio::test]
async fn stream_close_between_frames_is_fatal() {
    let mut receiver = Receiver::start(ephemeral(TransportKind::Stream))
        .await
        .unwrap();
    let mut events = receiver.take_events().unwrap();
    let mut frames = receiver.frames();

    let conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let mut sender = StreamFrameSender::new(conn);
    sender.send_frame(&[7; 8]).await.unwrap();
    drop(sender);

    assert_eq!(wait_for_sequence(&mut frames, 0).await.sequence, 0);
    assert!(wait_for_stopped(&mut events).await.is_some());
    // The last good frame stays readable after the loop ends.
    assert_eq!(receiver.latest_frame().unwrap().sequence, 0);
    assert!(matches!(
        receiver.stop().await,
        Err(ScapError::ConnectionLost { received: 0, .. })
    ));
}

#[tokio::test]
async fn stream_size_mismatch_is_fatal() {
    let mut receiver = Receiver::start(ephemeral(TransportKind::Stream))
        .await
        .unwrap();
    let mut events = receiver.take_events().unwrap();

    let mut conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    conn.write_all(&stream_frame(12, &[&[1, 2, 3, 4], &[5, 6, 7, 8]]))
        .await
        .unwrap();

    let error = wait_for_stopped(&mut events).await;
    assert!(error.unwrap().contains("incomplete frame"));
    assert!(receiver.latest_frame().is_none());
    assert!(matches!(
        receiver.stop().await,
        Err(ScapError::IncompleteFrame {
            expected: 12,
            actual: 8
        })
    ));
    drop(conn);
}

#[tokio::test]
async fn stream_frame_disagreeing_with_dimensions_is_fatal() {
    let mut receiver = Receiver::start(TransportConfig {
        frame_width: 1920,
        frame_height: 1080,
        ..ephemeral(TransportKind::Stream)
    })
    .await
    .unwrap();
    let mut events = receiver.take_events().unwrap();

    let mut conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    conn.write_all(&stream_frame(12, &[&[1, 2, 3, 4], &[5, 6, 7, 8], &[9, 10, 11, 12]]))
        .await
        .unwrap();

    assert!(wait_for_stopped(&mut events).await.is_some());
    assert!(receiver.latest_frame().is_none());
    assert!(matches!(
        receiver.stop().await,
        Err(ScapError::MalformedMetadata {
            total_size: 12,
            chunk_count: 3
        })
    ));
    drop(conn);
}

#[tokio::test]
async fn stop_drops_in_flight_frame() {
    let receiver = Receiver::start(ephemeral(TransportKind::Stream))
        .await
        .unwrap();

    let mut conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let meta = StreamMetadata {
        total_size: 8,
        chunk_count: 2,
    };
    conn.write_all(&meta.encode()).await.unwrap();

    // Let the receiver get stuck inside the frame.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(receiver.latest_frame().is_none());

    tokio::time::timeout(Duration::from_secs(5), receiver.stop())
        .await
        .expect("stop hung")
        .unwrap();
}

#[tokio::test]
async fn stop_while_listening() {
    let receiver = Receiver::start(ephemeral(TransportKind::Stream))
        .await
        .unwrap();
    let addr = receiver.local_addr();

    tokio::time::timeout(Duration::from_secs(5), receiver.stop())
        .await
        .expect("stop hung")
        .unwrap();

    // The listener is closed once stop returns.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn stats_callback_fires_per_window() {
    let (stats_tx, mut stats_rx) = mpsc::unbounded_channel::<FrameStats>();
    let receiver = Receiver::builder(TransportConfig {
        stats_window: 3,
        ..ephemeral(TransportKind::Stream)
    })
    .on_stats(move |stats| {
        let _ = stats_tx.send(stats.clone());
    })
    .start()
    .await
    .unwrap();
    let mut stats_watch = receiver.stats();

    let conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
    let mut sender = StreamFrameSender::new(conn);
    for i in 0..3u8 {
        sender.send_frame(&[i; 16]).await.unwrap();
    }

    let stats = tokio::time::timeout(Duration::from_secs(5), stats_rx.recv())
        .await
        .expect("timeout")
        .expect("callback dropped");
    assert_eq!(stats.frames_total, 3);
    assert_eq!(stats.frames_abandoned, 0);
    assert!(stats.avg_latency_ms >= 0.0);

    stats_watch.changed().await.unwrap();
    assert_eq!(*stats_watch.borrow(), stats);

    receiver.stop().await.unwrap();
}

// ── Datagram transport ───────────────────────────────────────────

#[tokio::test]
async fn datagram_reverse_order_frame() {
    let receiver = Receiver::start(TransportConfig {
        chunk_payload_size: 4,
        ..ephemeral(TransportKind::Datagram)
    })
    .await
    .unwrap();
    let mut frames = receiver.frames();
    let target = receiver.local_addr();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let meta = DatagramMetadata {
        width: 1,
        height: 2,
        total_size: 8,
        chunk_count: 2,
    };
    socket.send_to(&meta.encode(), target).await.unwrap();
    for (index, payload) in [(1u32, [5u8, 6, 7, 8]), (0, [1, 2, 3, 4])] {
        let mut dgram = Vec::new();
        encode_chunk(index, &payload, &mut dgram);
        socket.send_to(&dgram, target).await.unwrap();
    }

    let frame = wait_for_sequence(&mut frames, 0).await;
    assert_eq!(&frame.pixels[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!((frame.width, frame.height), (1, 2));

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn datagram_lost_chunk_then_next_frame() {
    let mut receiver = Receiver::start(TransportConfig {
        chunk_payload_size: 4,
        frame_timeout_ms: 100,
        ..ephemeral(TransportKind::Datagram)
    })
    .await
    .unwrap();
    let mut events = receiver.take_events().unwrap();
    let mut frames = receiver.frames();
    let target = receiver.local_addr();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let meta = DatagramMetadata {
        width: 0,
        height: 0,
        total_size: 8,
        chunk_count: 2,
    };
    raw.send_to(&meta.encode(), target).await.unwrap();
    let mut dgram = Vec::new();
    encode_chunk(0, &[1, 2, 3, 4], &mut dgram);
    raw.send_to(&dgram, target).await.unwrap();

    // Chunk 1 never arrives; let the frame deadline pass.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(receiver.latest_frame().is_none());

    let mut sender = DatagramFrameSender::new(raw, target)
        .with_chunk_payload(4)
        .unwrap();
    sender
        .send_frame(1, 2, &[9, 8, 7, 6, 5, 4, 3, 2])
        .await
        .unwrap();

    let frame = wait_for_sequence(&mut frames, 0).await;
    assert_eq!(&frame.pixels[..], &[9, 8, 7, 6, 5, 4, 3, 2]);
    assert_eq!(frame.sequence, 0);
    assert!(matches!(
        events.recv().await,
        Some(ReceiverEvent::FrameArrived { sequence: 0, .. })
    ));

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn datagram_sender_default_payload_round_trip() {
    let receiver = Receiver::start(ephemeral(TransportKind::Datagram))
        .await
        .unwrap();
    let mut frames = receiver.frames();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut sender = DatagramFrameSender::new(socket, receiver.local_addr());
    let (width, height) = (160u32, 120u32);
    let pixels: Vec<u8> = (0..width * height * 4).map(|i| (i % 251) as u8).collect();
    sender.send_frame(width, height, &pixels).await.unwrap();

    let frame = wait_for_sequence(&mut frames, 0).await;
    assert_eq!(frame.len(), pixels.len());
    assert_eq!(&frame.pixels[..], &pixels[..]);
    assert_eq!((frame.width, frame.height), (width, height));

    receiver.stop().await.unwrap();
}
