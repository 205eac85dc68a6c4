//! A resource stream's full lifecycle: bytes fed into a [`StreamReceiver`]
//! land in the pool's backing buffer, and a [`StreamSender`] attached to the
//! same buffer can drain them back out as wire packets, even started before
//! the receiver has finished (`spec.md` §4.3/§4.4).

use bytes::Bytes;
use zway_net::{parts_for_size, ReceiverProgress, StreamPool, StreamReceiver, StreamSender};
use zway_proto::{logging, StreamId};

const CHUNK: usize = 65536;

#[tokio::test]
async fn sender_drains_buffer_as_receiver_fills_it() {
    let pool = StreamPool::new("/tmp/zway-test-resource-roundtrip", &logging::discard());
    let stream_id = StreamId(42);
    let buffer = pool.create_file(stream_id).await.unwrap();

    let total = CHUNK + 10;
    let parts = parts_for_size(total as u64);
    assert_eq!(parts, 2);

    let mut receiver = StreamReceiver::for_resource(stream_id, parts, buffer.clone());
    let mut sender = StreamSender::for_resource(stream_id, buffer.clone(), parts);

    let first_chunk = vec![1u8; CHUNK];
    let progress = receiver.accept_part(0, Bytes::from(first_chunk.clone())).await.unwrap();
    assert!(matches!(progress, ReceiverProgress::Pending));

    let first_out = sender.next_packet(1).await.unwrap().unwrap();
    assert_eq!(first_out.body.as_ref(), first_chunk.as_slice());
    assert!(!sender.is_done());

    // Second part not written yet: the sender must stall rather than error.
    assert!(sender.next_packet(2).await.unwrap().is_none());

    let second_chunk = vec![2u8; 10];
    let progress = receiver.accept_part(1, Bytes::from(second_chunk.clone())).await.unwrap();
    assert!(matches!(progress, ReceiverProgress::Completed(None)));

    let second_out = sender.next_packet(2).await.unwrap().unwrap();
    assert_eq!(second_out.body.as_ref(), second_chunk.as_slice());
    assert!(sender.is_done());

    assert_eq!(buffer.bytes_written(), total as u64);
    assert_eq!(buffer.total_size(), Some(total as u64));

    pool.remove(stream_id);
    assert!(pool.get(stream_id).await.is_none());
}

#[tokio::test]
async fn request_stream_reassembles_in_memory_without_touching_the_pool() {
    let mut receiver = StreamReceiver::for_request(StreamId(7), 3);
    let mut sender = StreamSender::for_request(StreamId(7), Bytes::from_static(b"abcdef"), 1);

    for (part, chunk) in [b"ab".as_slice(), b"cd".as_slice(), b"ef".as_slice()].into_iter().enumerate() {
        let progress = receiver.accept_part(part as u32, Bytes::copy_from_slice(chunk)).await.unwrap();
        if part == 2 {
            match progress {
                ReceiverProgress::Completed(Some(body)) => assert_eq!(body, b"abcdef"),
                _ => panic!("expected completion on last part"),
            }
        } else {
            assert!(matches!(progress, ReceiverProgress::Pending));
        }
    }

    let packet = sender.next_packet(1).await.unwrap().unwrap();
    assert_eq!(packet.body.as_ref(), b"abcdef");
    assert!(sender.is_done());
}
