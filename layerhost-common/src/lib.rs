//! IPC protocol between the rendering client and the layerhost helper.
//!
//! Every message on the control socket is a fixed 12-byte header followed by
//! a variable payload. Header fields are native-endian u32s: a magic
//! constant, a type tag, and the payload length in bytes. Pixels never
//! travel on the socket; they go through the shared frame file.
//!
//! The protocol is point-to-point over a Unix stream socket and is not
//! meant to cross machine boundaries, so all fields use host byte order.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Header magic, "VIRD" in ASCII.
pub const MAGIC: u32 = 0x5649_5244;

/// Header size on the wire.
pub const HEADER_LEN: usize = 12;

// ── Message type tags ────────────────────────────────────────────────────────

pub mod tag {
    /// Client → helper: create the layer surface. [`super::SurfaceConfig`] payload.
    pub const CONFIGURE: u32 = 0x01;
    /// Helper → client: configure finished; final width and height.
    pub const CFG_ACK: u32 = 0x02;
    /// Client → helper: a frame has been written to the shared file.
    pub const FRAME_READY: u32 = 0x03;
    /// Helper → client: the compositor consumed the frame; rendering may resume.
    pub const FRAME_DONE: u32 = 0x04;
    /// Helper → client: pointer input, see [`super::PointerEvent`].
    pub const PTR_EVENT: u32 = 0x05;
    /// Helper → client: keyboard input, see [`super::KeyEvent`].
    pub const KEY_EVENT: u32 = 0x06;
    /// Helper → client: the surface changed size; reallocate the shared file.
    pub const RESIZE: u32 = 0x07;
    /// Client → helper: tear down and exit.
    pub const SHUTDOWN: u32 = 0x08;
    /// Helper → client: fatal failure, numeric code plus message.
    pub const ERROR: u32 = 0x09;
}

// ── Pointer event subtypes ───────────────────────────────────────────────────

pub mod ptr {
    pub const ENTER: u32 = 0;
    pub const LEAVE: u32 = 1;
    pub const MOTION: u32 = 2;
    pub const BUTTON: u32 = 3;
    /// Reserved. Axis events are not currently forwarded.
    pub const AXIS: u32 = 4;
}

// ── Key press states ─────────────────────────────────────────────────────────

pub mod key_state {
    pub const RELEASED: u32 = 0;
    pub const PRESSED: u32 = 1;
    /// Reserved for client-side repeat synthesis; the helper never emits it.
    pub const REPEAT: u32 = 2;
}

// ── Modifier bitmask (KEY_EVENT) ─────────────────────────────────────────────

pub mod mods {
    pub const SHIFT: u32 = 1 << 0;
    pub const CTRL: u32 = 1 << 1;
    pub const ALT: u32 = 1 << 2;
    pub const LOGO: u32 = 1 << 3;
}

// ── ERROR codes ──────────────────────────────────────────────────────────────

pub mod code {
    pub const SHM_OPEN: i32 = 1;
    pub const SURFACE_CREATE: i32 = 2;
    pub const LAYER_SURFACE_CREATE: i32 = 3;
    pub const NO_CONFIGURE: i32 = 4;
    pub const SHM_BUFFERS: i32 = 5;
    pub const WAYLAND_CONNECT: i32 = 10;
    pub const NO_COMPOSITOR: i32 = 11;
    pub const NO_SHM: i32 = 12;
    pub const NO_LAYER_SHELL: i32 = 13;
}

// ── Message bodies ───────────────────────────────────────────────────────────

/// CONFIGURE payload: fixed record, then namespace, then shared-file path.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    pub layer: i32,
    pub anchor: i32,
    pub exclusive_zone: i32,
    pub keyboard_interactivity: i32,
    pub width: i32,
    pub height: i32,
    pub margin_top: i32,
    pub margin_right: i32,
    pub margin_bottom: i32,
    pub margin_left: i32,
    pub namespace: String,
    pub shm_path: String,
}

/// PTR_EVENT payload. ENTER/LEAVE/MOTION are 16 bytes on the wire
/// (subtype, x, y, zero padding); BUTTON is 20 (subtype, x, y, button,
/// state). LEAVE deliberately carries zeros rather than the last known
/// position; clients depend on that bit pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Enter { x: f32, y: f32 },
    Leave,
    Motion { x: f32, y: f32 },
    Button { x: f32, y: f32, button: u32, state: u32 },
}

/// KEY_EVENT payload: four 32-bit fields.
///
/// `code` is the raw evdev keycode for clients that prefer hardware-layer
/// identification; `keysym` is the layout-resolved xkb keysym for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u32,
    pub state: u32,
    pub modifiers: u32,
    pub keysym: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Configure(SurfaceConfig),
    CfgAck { width: i32, height: i32 },
    FrameReady { seq: i64 },
    FrameDone { seq: i64 },
    Pointer(PointerEvent),
    Key(KeyEvent),
    Resize { width: i32, height: i32 },
    Shutdown,
    Error { code: i32, message: String },
}

/// Result of reading one frame off the socket. Unknown tags are skipped by
/// the receiver after logging, so they surface as data instead of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Message(Message),
    Unknown { tag: u32, len: u32 },
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad magic 0x{0:08x} on control socket")]
    BadMagic(u32),
    #[error("malformed payload for message tag 0x{tag:02x}")]
    Malformed { tag: u32 },
    #[error("control socket i/o: {0}")]
    Io(#[from] io::Error),
}

// ── Codec ────────────────────────────────────────────────────────────────────

impl Message {
    pub fn tag(&self) -> u32 {
        match self {
            Message::Configure(_) => tag::CONFIGURE,
            Message::CfgAck { .. } => tag::CFG_ACK,
            Message::FrameReady { .. } => tag::FRAME_READY,
            Message::FrameDone { .. } => tag::FRAME_DONE,
            Message::Pointer(_) => tag::PTR_EVENT,
            Message::Key(_) => tag::KEY_EVENT,
            Message::Resize { .. } => tag::RESIZE,
            Message::Shutdown => tag::SHUTDOWN,
            Message::Error { .. } => tag::ERROR,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        match self {
            Message::Configure(cfg) => {
                for field in [
                    cfg.layer,
                    cfg.anchor,
                    cfg.exclusive_zone,
                    cfg.keyboard_interactivity,
                    cfg.width,
                    cfg.height,
                    cfg.margin_top,
                    cfg.margin_right,
                    cfg.margin_bottom,
                    cfg.margin_left,
                ] {
                    put_i32(out, field);
                }
                put_str(out, &cfg.namespace);
                put_str(out, &cfg.shm_path);
            }
            Message::CfgAck { width, height } | Message::Resize { width, height } => {
                put_i32(out, *width);
                put_i32(out, *height);
            }
            Message::FrameReady { seq } | Message::FrameDone { seq } => {
                out.extend_from_slice(&seq.to_ne_bytes());
            }
            Message::Pointer(ev) => match *ev {
                PointerEvent::Enter { x, y } => put_ptr_fixed(out, ptr::ENTER, x, y),
                PointerEvent::Leave => put_ptr_fixed(out, ptr::LEAVE, 0.0, 0.0),
                PointerEvent::Motion { x, y } => put_ptr_fixed(out, ptr::MOTION, x, y),
                PointerEvent::Button { x, y, button, state } => {
                    put_u32(out, ptr::BUTTON);
                    put_f32(out, x);
                    put_f32(out, y);
                    put_u32(out, button);
                    put_u32(out, state);
                }
            },
            Message::Key(ev) => {
                put_u32(out, ev.code);
                put_u32(out, ev.state);
                put_u32(out, ev.modifiers);
                put_u32(out, ev.keysym);
            }
            Message::Shutdown => {}
            Message::Error { code, message } => {
                put_i32(out, *code);
                put_str(out, message);
            }
        }
    }

    fn decode_payload(tag: u32, payload: &[u8]) -> Result<Option<Message>, ProtocolError> {
        let mut r = Reader::new(tag, payload);
        let msg = match tag {
            tag::CONFIGURE => {
                let cfg = SurfaceConfig {
                    layer: r.i32()?,
                    anchor: r.i32()?,
                    exclusive_zone: r.i32()?,
                    keyboard_interactivity: r.i32()?,
                    width: r.i32()?,
                    height: r.i32()?,
                    margin_top: r.i32()?,
                    margin_right: r.i32()?,
                    margin_bottom: r.i32()?,
                    margin_left: r.i32()?,
                    namespace: r.string()?,
                    shm_path: r.string()?,
                };
                Message::Configure(cfg)
            }
            tag::CFG_ACK => Message::CfgAck { width: r.i32()?, height: r.i32()? },
            tag::FRAME_READY => Message::FrameReady { seq: r.i64()? },
            tag::FRAME_DONE => Message::FrameDone { seq: r.i64()? },
            tag::PTR_EVENT => {
                let subtype = r.u32()?;
                let x = r.f32()?;
                let y = r.f32()?;
                match subtype {
                    ptr::ENTER => Message::Pointer(PointerEvent::Enter { x, y }),
                    ptr::LEAVE => Message::Pointer(PointerEvent::Leave),
                    ptr::MOTION => Message::Pointer(PointerEvent::Motion { x, y }),
                    ptr::BUTTON => Message::Pointer(PointerEvent::Button {
                        x,
                        y,
                        button: r.u32()?,
                        state: r.u32()?,
                    }),
                    _ => return Err(ProtocolError::Malformed { tag }),
                }
            }
            tag::KEY_EVENT => Message::Key(KeyEvent {
                code: r.u32()?,
                state: r.u32()?,
                modifiers: r.u32()?,
                keysym: r.u32()?,
            }),
            tag::RESIZE => Message::Resize { width: r.i32()?, height: r.i32()? },
            tag::SHUTDOWN => Message::Shutdown,
            tag::ERROR => Message::Error { code: r.i32()?, message: r.string()? },
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

/// Serialise a message into a single header + payload frame.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut payload = Vec::new();
    msg.encode_payload(&mut payload);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC.to_ne_bytes());
    frame.extend_from_slice(&msg.tag().to_ne_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Send one message. All-or-nothing: `write_all` keeps writing through
/// partial writes, and any error means the session is gone.
pub fn send(w: &mut impl Write, msg: &Message) -> Result<(), ProtocolError> {
    w.write_all(&encode(msg))?;
    Ok(())
}

/// Receive one frame. Blocks until a full header and payload have arrived.
/// A header whose magic is wrong poisons the stream and is fatal.
pub fn recv(r: &mut impl Read) -> Result<Incoming, ProtocolError> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header)?;

    let magic = u32::from_ne_bytes(header[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    let tag = u32::from_ne_bytes(header[4..8].try_into().unwrap());
    let len = u32::from_ne_bytes(header[8..12].try_into().unwrap());

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;

    match Message::decode_payload(tag, &payload)? {
        Some(msg) => Ok(Incoming::Message(msg)),
        None => Ok(Incoming::Unknown { tag, len }),
    }
}

// ── Field encoding helpers ───────────────────────────────────────────────────

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn put_ptr_fixed(out: &mut Vec<u8>, subtype: u32, x: f32, y: f32) {
    put_u32(out, subtype);
    put_f32(out, x);
    put_f32(out, y);
    put_u32(out, 0);
}

struct Reader<'a> {
    tag: u32,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(tag: u32, buf: &'a [u8]) -> Self {
        Reader { tag, buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ProtocolError::Malformed { tag: self.tag })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProtocolError::Malformed { tag: self.tag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(msg: Message) -> Message {
        let bytes = encode(&msg);
        match recv(&mut Cursor::new(bytes)).unwrap() {
            Incoming::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    fn sample_config() -> SurfaceConfig {
        SurfaceConfig {
            layer: 2,
            anchor: 0x0f,
            exclusive_zone: -1,
            keyboard_interactivity: 0,
            width: 800,
            height: 600,
            margin_top: 4,
            margin_right: 0,
            margin_bottom: 4,
            margin_left: 0,
            namespace: "panel".into(),
            shm_path: "/tmp/pix".into(),
        }
    }

    #[test]
    fn roundtrip_all_message_types() {
        let messages = vec![
            Message::Configure(sample_config()),
            Message::CfgAck { width: 800, height: 600 },
            Message::FrameReady { seq: 41 },
            Message::FrameDone { seq: 41 },
            Message::Pointer(PointerEvent::Enter { x: 1.5, y: 2.25 }),
            Message::Pointer(PointerEvent::Leave),
            Message::Pointer(PointerEvent::Motion { x: 100.0, y: 50.5 }),
            Message::Pointer(PointerEvent::Button {
                x: 10.0,
                y: 20.0,
                button: 272,
                state: key_state::PRESSED,
            }),
            Message::Key(KeyEvent { code: 30, state: 1, modifiers: mods::SHIFT, keysym: 0x41 }),
            Message::Resize { width: 1024, height: 600 },
            Message::Shutdown,
            Message::Error { code: code::SHM_OPEN, message: "cannot open shared pixel file".into() },
        ];
        for msg in messages {
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    #[test]
    fn header_layout() {
        let frame = encode(&Message::FrameDone { seq: 7 });
        assert_eq!(frame.len(), HEADER_LEN + 8);
        assert_eq!(u32::from_ne_bytes(frame[0..4].try_into().unwrap()), MAGIC);
        assert_eq!(u32::from_ne_bytes(frame[4..8].try_into().unwrap()), tag::FRAME_DONE);
        assert_eq!(u32::from_ne_bytes(frame[8..12].try_into().unwrap()), 8);
        assert_eq!(i64::from_ne_bytes(frame[12..20].try_into().unwrap()), 7);
    }

    #[test]
    fn pointer_payload_sizes() {
        // ENTER/LEAVE/MOTION are 16 bytes, BUTTON is 20.
        for (msg, expected) in [
            (Message::Pointer(PointerEvent::Enter { x: 0.0, y: 0.0 }), 16),
            (Message::Pointer(PointerEvent::Leave), 16),
            (Message::Pointer(PointerEvent::Motion { x: 0.0, y: 0.0 }), 16),
            (
                Message::Pointer(PointerEvent::Button { x: 0.0, y: 0.0, button: 272, state: 0 }),
                20,
            ),
        ] {
            assert_eq!(encode(&msg).len() - HEADER_LEN, expected);
        }
    }

    #[test]
    fn leave_is_zeroed_on_the_wire() {
        let frame = encode(&Message::Pointer(PointerEvent::Leave));
        assert!(frame[HEADER_LEN + 4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut frame = encode(&Message::Shutdown);
        frame[0..4].copy_from_slice(&0xDEADBEEFu32.to_ne_bytes());
        match recv(&mut Cursor::new(frame)) {
            Err(ProtocolError::BadMagic(m)) => assert_eq!(m, 0xDEADBEEF),
            other => panic!("expected BadMagic, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_skippable() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&MAGIC.to_ne_bytes());
        frame.extend_from_slice(&0x7fu32.to_ne_bytes());
        frame.extend_from_slice(&4u32.to_ne_bytes());
        frame.extend_from_slice(&[1, 2, 3, 4]);
        match recv(&mut Cursor::new(frame)).unwrap() {
            Incoming::Unknown { tag, len } => {
                assert_eq!(tag, 0x7f);
                assert_eq!(len, 4);
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn truncated_configure_is_malformed() {
        let full = encode(&Message::Configure(sample_config()));
        // Keep the header but declare and deliver a short payload.
        let short_len = 16u32;
        let mut frame = full[..HEADER_LEN + short_len as usize].to_vec();
        frame[8..12].copy_from_slice(&short_len.to_ne_bytes());
        match recv(&mut Cursor::new(frame)) {
            Err(ProtocolError::Malformed { tag }) => assert_eq!(tag, tag::CONFIGURE),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn short_header_is_io_error() {
        let result = recv(&mut Cursor::new(vec![0u8; 5]));
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }

    #[test]
    fn string_length_overflow_is_malformed() {
        // Namespace length field claims more bytes than the payload holds.
        let mut frame = encode(&Message::Configure(sample_config()));
        let ns_len_at = HEADER_LEN + 40;
        frame[ns_len_at..ns_len_at + 4].copy_from_slice(&u32::MAX.to_ne_bytes());
        assert!(matches!(
            recv(&mut Cursor::new(frame)),
            Err(ProtocolError::Malformed { tag: tag::CONFIGURE })
        ));
    }
}
