use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::noc::types::{Cycle, PortId};

pub type MsgId = u64;

static NEXT_MSG_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id shared by messages and flits.
pub fn next_msg_id() -> MsgId {
    NEXT_MSG_ID.fetch_add(1, Ordering::Relaxed)
}

/// Header fields common to everything that travels over a port.  `src`/`dst` are the
/// hop-level ports for flits and the device ports for messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgMeta {
    pub id: MsgId,
    pub src: PortId,
    pub dst: PortId,
    pub send_time: Cycle,
    pub recv_time: Cycle,
    pub traffic_bytes: u32,
}

impl MsgMeta {
    pub fn new(src: PortId, dst: PortId, traffic_bytes: u32) -> Self {
        Self {
            id: next_msg_id(),
            src,
            dst,
            send_time: 0,
            recv_time: 0,
            traffic_bytes,
        }
    }
}

/// Opaque application message.  The fabric only looks at its size and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub meta: MsgMeta,
    /// Set on responses; the id of the request being answered.
    pub rsp_to: Option<MsgId>,
}

impl Message {
    pub fn new(src: PortId, dst: PortId, bytes: u32) -> Self {
        Self {
            meta: MsgMeta::new(src, dst, bytes),
            rsp_to: None,
        }
    }

    pub fn response_to(request: &Message, bytes: u32) -> Self {
        Self {
            meta: MsgMeta::new(request.meta.dst, request.meta.src, bytes),
            rsp_to: Some(request.meta.id),
        }
    }

    pub fn id(&self) -> MsgId {
        self.meta.id
    }

    pub fn bytes(&self) -> u32 {
        self.meta.traffic_bytes
    }
}

/// Fragment of a message.  `output_buf` is the index of the switch port complex chosen by the
/// route stage of the switch the flit is currently in.
#[derive(Debug, Clone)]
pub struct Flit {
    pub meta: MsgMeta,
    pub seq_id: u32,
    pub num_flits_in_msg: u32,
    pub msg: Arc<Message>,
    pub output_buf: Option<usize>,
}

impl Flit {
    /// Split `msg` into flits addressed to the first hop `src -> dst`.
    pub fn fragment(
        msg: Message,
        src: PortId,
        dst: PortId,
        flit_byte_size: u32,
        encoding_overhead: f64,
    ) -> Vec<Flit> {
        let count = num_flits(msg.bytes(), flit_byte_size, encoding_overhead);
        let msg = Arc::new(msg);
        (0..count)
            .map(|seq_id| Flit {
                meta: MsgMeta::new(src, dst, flit_byte_size),
                seq_id,
                num_flits_in_msg: count,
                msg: Arc::clone(&msg),
                output_buf: None,
            })
            .collect()
    }

    /// Final destination used for routing.
    pub fn msg_dst(&self) -> PortId {
        self.msg.meta.dst
    }
}

/// Everything a port can carry.
#[derive(Debug, Clone)]
pub enum Msg {
    App(Message),
    Flit(Flit),
}

impl Msg {
    pub fn meta(&self) -> &MsgMeta {
        match self {
            Msg::App(msg) => &msg.meta,
            Msg::Flit(flit) => &flit.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut MsgMeta {
        match self {
            Msg::App(msg) => &mut msg.meta,
            Msg::Flit(flit) => &mut flit.meta,
        }
    }

    pub fn as_flit(&self) -> Option<&Flit> {
        match self {
            Msg::Flit(flit) => Some(flit),
            Msg::App(_) => None,
        }
    }

    pub fn into_app(self) -> Option<Message> {
        match self {
            Msg::App(msg) => Some(msg),
            Msg::Flit(_) => None,
        }
    }
}

impl From<Message> for Msg {
    fn from(msg: Message) -> Self {
        Msg::App(msg)
    }
}

impl From<Flit> for Msg {
    fn from(flit: Flit) -> Self {
        Msg::Flit(flit)
    }
}

/// Number of flits needed to carry `bytes` after adding the encoding overhead.  Zero-byte
/// (control) messages still take one flit.
pub fn num_flits(bytes: u32, flit_byte_size: u32, encoding_overhead: f64) -> u32 {
    assert!(flit_byte_size > 0, "flit byte size must be > 0");
    if bytes == 0 {
        return 1;
    }
    let overhead = (bytes as f64 * encoding_overhead).ceil().max(0.0) as u64;
    let total = bytes as u64 + overhead;
    total.div_ceil(flit_byte_size as u64).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flit_count_rounds_up() {
        assert_eq!(1, num_flits(0, 64, 0.0));
        assert_eq!(1, num_flits(1, 64, 0.0));
        assert_eq!(1, num_flits(64, 64, 0.0));
        assert_eq!(2, num_flits(65, 64, 0.0));
        assert_eq!(4, num_flits(256, 64, 0.0));
    }

    #[test]
    fn encoding_overhead_adds_flits() {
        // 64 bytes + 25% = 80 bytes -> 2 flits of 64
        assert_eq!(2, num_flits(64, 64, 0.25));
        // 96 bytes + 50% = 144 bytes -> 3 flits
        assert_eq!(3, num_flits(96, 64, 0.5));
        // 128 bytes + 50% = exactly 3 flits
        assert_eq!(3, num_flits(128, 64, 0.5));
    }

    #[test]
    fn fragment_stamps_sequence_and_count() {
        let msg = Message::new(PortId(0), PortId(1), 130);
        let id = msg.id();
        let flits = Flit::fragment(msg, PortId(2), PortId(3), 64, 0.0);
        assert_eq!(3, flits.len());
        for (i, flit) in flits.iter().enumerate() {
            assert_eq!(i as u32, flit.seq_id);
            assert_eq!(3, flit.num_flits_in_msg);
            assert_eq!(id, flit.msg.id());
            assert_eq!(PortId(2), flit.meta.src);
            assert_eq!(PortId(3), flit.meta.dst);
            assert_eq!(PortId(1), flit.msg_dst());
            assert!(flit.output_buf.is_none());
        }
        assert_ne!(flits[0].meta.id, flits[1].meta.id);
    }

    #[test]
    fn response_swaps_ports() {
        let req = Message::new(PortId(4), PortId(5), 8);
        let rsp = Message::response_to(&req, 64);
        assert_eq!(PortId(5), rsp.meta.src);
        assert_eq!(PortId(4), rsp.meta.dst);
        assert_eq!(Some(req.id()), rsp.rsp_to);
    }
}
