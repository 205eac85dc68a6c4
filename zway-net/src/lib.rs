//! Wire transport: the packet codec, stream buffer pool, and stream
//! receiver/sender pair (`spec.md` §4.1/§4.3/§4.4, components C1/C3/C4).

pub mod packet;
pub mod stream_io;
pub mod stream_pool;

pub use packet::{read_packet, write_packet, Packet, PacketHead, PacketKind, StreamType, HEAD_SIZE, MAX_PACKET_BODY};
pub use stream_io::{ReceiverProgress, ReceiverSink, StreamReceiver, StreamSender};
pub use stream_pool::{parts_for_size, StreamBuffer, StreamPool};
