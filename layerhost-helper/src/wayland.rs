//! The surface session: Wayland globals, the layer surface lifecycle
//! (configure / ack / resize / close), frame submission with vsync pacing,
//! and the translation of seat input into IPC events.
//!
//! All Wayland handles, the frame buffer binding and the input state are
//! owned by a single [`Session`] passed by reference through the event
//! loop. Listener callbacks must never re-enter surface creation or
//! teardown: a mid-dispatch resize is stashed in `pending_resize` and
//! applied at the top of the next loop turn.

use std::collections::VecDeque;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use tracing::{debug, error, info, trace, warn};
use wayland_client::globals::{GlobalList, GlobalListContents};
use wayland_client::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_callback::{self, WlCallback},
    wl_compositor::WlCompositor,
    wl_keyboard::{self, WlKeyboard},
    wl_output::WlOutput,
    wl_pointer::{self, WlPointer},
    wl_registry,
    wl_seat::{self, WlSeat},
    wl_shm::WlShm,
    wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{
    delegate_noop, Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum,
};
use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::{Layer, ZwlrLayerShellV1},
    zwlr_layer_surface_v1::{self, Anchor, KeyboardInteractivity, ZwlrLayerSurfaceV1},
};

use layerhost_common as proto;
use layerhost_common::{Incoming, KeyEvent, Message, PointerEvent, SurfaceConfig};

use crate::buffer::{open_pixel_file, FrameBuffer, PixelMapping};
use crate::error::HelperError;
use crate::input::KeyboardState;

// ── Globals ──────────────────────────────────────────────────────────────────

pub struct BoundGlobals {
    pub compositor: WlCompositor,
    pub shm: WlShm,
    pub layer_shell: ZwlrLayerShellV1,
    pub output: Option<WlOutput>,
    pub seat: Option<WlSeat>,
}

/// Bind everything the session needs. Compositor, shm and layer-shell are
/// required; the first advertised output and the seat are best-effort.
pub fn bind_globals(
    globals: &GlobalList,
    qh: &QueueHandle<Session>,
) -> Result<BoundGlobals, HelperError> {
    let compositor = globals
        .bind::<WlCompositor, _, _>(qh, 1..=4, ())
        .map_err(|_| HelperError::MissingCompositor)?;
    let shm = globals
        .bind::<WlShm, _, _>(qh, 1..=1, ())
        .map_err(|_| HelperError::MissingShm)?;
    let layer_shell = globals
        .bind::<ZwlrLayerShellV1, _, _>(qh, 1..=4, ())
        .map_err(|_| HelperError::MissingLayerShell)?;
    let seat = globals.bind::<WlSeat, _, _>(qh, 1..=5, ()).ok();
    let output = globals
        .contents()
        .clone_list()
        .into_iter()
        .find(|global| global.interface == "wl_output")
        .map(|global| globals.registry().bind::<WlOutput, _, _>(global.name, 1, qh, ()));

    if seat.is_none() {
        warn!("no wl_seat advertised; input events will not be forwarded");
    }
    if output.is_none() {
        debug!("no wl_output advertised; the compositor will pick one");
    }
    Ok(BoundGlobals { compositor, shm, layer_shell, output, seat })
}

// ── Frame pacing ─────────────────────────────────────────────────────────────

/// Vsync pacing state: at most one compositor frame callback in flight, one
/// FRAME_DONE per FRAME_READY, and FRAME_DONE released only when a callback
/// fires, never synchronously from FRAME_READY.
#[derive(Debug)]
struct FramePacing {
    callback_pending: bool,
    last_seq: i64,
    last_done: i64,
    unacked: VecDeque<i64>,
}

impl FramePacing {
    fn new() -> Self {
        FramePacing {
            callback_pending: false,
            last_seq: 0,
            last_done: -1,
            unacked: VecDeque::new(),
        }
    }

    /// Record a client frame. Returns true when the caller must register a
    /// new callback together with the commit.
    fn on_frame_ready(&mut self, seq: i64) -> bool {
        self.last_seq = seq;
        self.unacked.push_back(seq);
        self.arm()
    }

    /// Claim the single callback slot; false when one is already in flight.
    fn arm(&mut self) -> bool {
        if self.callback_pending {
            false
        } else {
            self.callback_pending = true;
            true
        }
    }

    /// The callback fired. Every unacknowledged sequence is released in
    /// order; with nothing queued the current sequence is released exactly
    /// once, which is what produces the initial FRAME_DONE(0) after
    /// configure without ever duplicating an acknowledgement.
    fn on_callback_done(&mut self) -> Vec<i64> {
        self.callback_pending = false;
        if self.unacked.is_empty() {
            if self.last_seq > self.last_done {
                self.last_done = self.last_seq;
                return vec![self.last_seq];
            }
            return Vec::new();
        }
        let acks: Vec<i64> = self.unacked.drain(..).collect();
        if let Some(&last) = acks.last() {
            self.last_done = last;
        }
        acks
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PendingResize {
    serial: u32,
    width: i32,
    height: i32,
}

/// The one surface this helper owns, plus everything hanging off it.
pub struct Session {
    sock: UnixStream,
    qh: QueueHandle<Session>,

    compositor: WlCompositor,
    shm: WlShm,
    layer_shell: ZwlrLayerShellV1,
    output: Option<WlOutput>,
    seat: Option<WlSeat>,
    pointer: Option<WlPointer>,
    keyboard: Option<WlKeyboard>,

    surface: Option<WlSurface>,
    layer_surface: Option<ZwlrLayerSurfaceV1>,
    frame: Option<FrameBuffer>,

    width: i32,
    height: i32,
    configured: bool,
    configure_serial: u32,
    pending_resize: Option<PendingResize>,

    pacing: FramePacing,
    pointer_pos: (f32, f32),
    kb: KeyboardState,

    running: bool,
}

impl Session {
    pub fn new(sock: UnixStream, globals: BoundGlobals, qh: QueueHandle<Session>) -> Self {
        Session {
            sock,
            qh,
            compositor: globals.compositor,
            shm: globals.shm,
            layer_shell: globals.layer_shell,
            output: globals.output,
            seat: globals.seat,
            pointer: None,
            keyboard: None,
            surface: None,
            layer_surface: None,
            frame: None,
            width: 0,
            height: 0,
            configured: false,
            configure_serial: 0,
            pending_resize: None,
            pacing: FramePacing::new(),
            pointer_pos: (0.0, 0.0),
            kb: KeyboardState::new(),
            running: true,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn socket_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    /// Log a fatal error and, for the kinds that carry a wire code, make a
    /// best-effort attempt to tell the client before tearing down.
    pub fn report_fatal(&mut self, err: &HelperError) {
        error!("fatal: {err}");
        if let Some(code) = err.wire_code() {
            let _ = proto::send(
                &mut self.sock,
                &Message::Error { code, message: err.to_string() },
            );
        }
        self.running = false;
    }

    fn send(&mut self, msg: &Message) {
        if let Err(e) = proto::send(&mut self.sock, msg) {
            error!("failed to send message to client: {e}");
            self.running = false;
        }
    }

    // ── Client messages ──────────────────────────────────────────────────────

    /// Read and dispatch exactly one message from the control socket.
    pub fn dispatch_client_message(
        &mut self,
        queue: &mut EventQueue<Session>,
    ) -> Result<(), HelperError> {
        match proto::recv(&mut self.sock)? {
            Incoming::Unknown { tag, len } => {
                warn!("unknown client message type 0x{tag:02x} ({len} bytes); skipping");
                Ok(())
            }
            Incoming::Message(Message::Configure(cfg)) => self.handle_configure(queue, cfg),
            Incoming::Message(Message::FrameReady { seq }) => {
                self.handle_frame_ready(queue, seq);
                Ok(())
            }
            Incoming::Message(Message::Shutdown) => {
                info!("SHUTDOWN received");
                self.running = false;
                Ok(())
            }
            Incoming::Message(other) => {
                warn!("unexpected message 0x{:02x} from client; skipping", other.tag());
                Ok(())
            }
        }
    }

    fn handle_configure(
        &mut self,
        queue: &mut EventQueue<Session>,
        cfg: SurfaceConfig,
    ) -> Result<(), HelperError> {
        if self.surface.is_some() {
            warn!("ignoring repeated CONFIGURE; this helper owns a single surface");
            return Ok(());
        }
        info!(
            "CONFIGURE layer={} anchor=0x{:x} zone={} kb={} size={}x{} ns={:?} shm={:?}",
            cfg.layer,
            cfg.anchor,
            cfg.exclusive_zone,
            cfg.keyboard_interactivity,
            cfg.width,
            cfg.height,
            cfg.namespace,
            cfg.shm_path,
        );

        // Open the shared pixel file before touching the compositor, so a
        // bad path fails without leaving a half-built surface behind.
        let file = open_pixel_file(&cfg.shm_path)?;

        let surface = self.compositor.create_surface(&self.qh, ());
        if !surface.is_alive() {
            return Err(HelperError::SurfaceCreate);
        }

        let anchor = Anchor::from_bits_truncate(cfg.anchor as u32);
        let layer_surface = self.layer_shell.get_layer_surface(
            &surface,
            self.output.as_ref(),
            layer_from(cfg.layer),
            cfg.namespace.clone(),
            &self.qh,
            (),
        );
        if !layer_surface.is_alive() {
            return Err(HelperError::LayerSurfaceCreate);
        }

        layer_surface.set_anchor(anchor);
        layer_surface.set_exclusive_zone(cfg.exclusive_zone);
        layer_surface.set_keyboard_interactivity(interactivity_from(cfg.keyboard_interactivity));
        layer_surface.set_margin(
            cfg.margin_top,
            cfg.margin_right,
            cfg.margin_bottom,
            cfg.margin_left,
        );
        let (req_w, req_h) = requested_size(anchor, cfg.width, cfg.height);
        layer_surface.set_size(req_w, req_h);

        self.width = cfg.width;
        self.height = cfg.height;
        self.surface = Some(surface.clone());
        self.layer_surface = Some(layer_surface.clone());

        // The first (empty) commit asks the compositor for a configure.
        surface.commit();
        queue.roundtrip(self)?;

        if !self.configured {
            return Err(HelperError::NoConfigure);
        }
        layer_surface.ack_configure(self.configure_serial);

        let mapping = PixelMapping::from_file(file, self.width, self.height)?;
        let mut frame =
            FrameBuffer::create(&self.shm, &self.qh, mapping, self.width, self.height);
        frame.clear();

        surface.attach(Some(frame.wl_buffer()), 0, 0);
        surface.damage_buffer(0, 0, self.width, self.height);
        if self.pacing.arm() {
            surface.frame(&self.qh, ());
        }
        surface.commit();
        self.frame = Some(frame);

        if let Err(e) = queue.flush() {
            self.report_fatal(&HelperError::from(e));
            return Ok(());
        }

        info!("configured at {}x{}", self.width, self.height);
        self.send(&Message::CfgAck { width: self.width, height: self.height });
        Ok(())
    }

    /// The client finished writing a frame into the shared mapping. The
    /// single buffer is re-attached every time; the pixels are already in
    /// place. FRAME_DONE is *not* sent here: the compositor's frame
    /// callback is the only thing allowed to release the client.
    fn handle_frame_ready(&mut self, queue: &mut EventQueue<Session>, seq: i64) {
        let (Some(surface), Some(buffer)) = (
            self.surface.clone(),
            self.frame.as_ref().map(|f| f.wl_buffer().clone()),
        ) else {
            warn!("FRAME_READY {seq} before the surface is configured; ignoring");
            return;
        };

        trace!("[FRAME] ready seq={seq}");
        surface.attach(Some(&buffer), 0, 0);
        surface.damage_buffer(0, 0, self.width, self.height);
        if self.pacing.on_frame_ready(seq) {
            surface.frame(&self.qh, ());
        }
        surface.commit();

        if let Err(e) = queue.flush() {
            self.report_fatal(&HelperError::from(e));
        }
    }

    // ── Resize ───────────────────────────────────────────────────────────────

    /// Apply a configure that arrived mid-dispatch. Runs at the top of the
    /// loop, outside any Wayland callback, because rebuilding the buffer
    /// binding destroys and recreates protocol objects.
    pub fn apply_pending_resize(
        &mut self,
        queue: &mut EventQueue<Session>,
    ) -> Result<(), HelperError> {
        let Some(resize) = self.pending_resize.take() else {
            return Ok(());
        };
        let (Some(surface), Some(layer_surface)) =
            (self.surface.clone(), self.layer_surface.clone())
        else {
            return Ok(());
        };

        info!(
            "applying resize to {}x{} (serial {})",
            resize.width, resize.height, resize.serial
        );
        layer_surface.ack_configure(resize.serial);
        self.width = resize.width;
        self.height = resize.height;

        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        let mut frame = frame.resize(&self.shm, &self.qh, self.width, self.height)?;
        frame.clear();

        surface.attach(Some(frame.wl_buffer()), 0, 0);
        surface.damage_buffer(0, 0, self.width, self.height);
        if self.pacing.arm() {
            surface.frame(&self.qh, ());
        }
        surface.commit();
        self.frame = Some(frame);

        if let Err(e) = queue.flush() {
            self.report_fatal(&HelperError::from(e));
            return Ok(());
        }

        // The client must learn the new geometry before the next
        // FRAME_DONE lets it render again.
        self.send(&Message::Resize { width: self.width, height: self.height });
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Reverse construction order.
        if let Some(frame) = self.frame.take() {
            frame.destroy();
        }
        if let Some(layer_surface) = self.layer_surface.take() {
            layer_surface.destroy();
        }
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
        if let Some(pointer) = self.pointer.take() {
            if pointer.version() >= 3 {
                pointer.release();
            }
        }
        if let Some(keyboard) = self.keyboard.take() {
            if keyboard.version() >= 3 {
                keyboard.release();
            }
        }
        if let Some(seat) = self.seat.take() {
            if seat.version() >= 5 {
                seat.release();
            }
        }
        if self.layer_shell.version() >= 3 {
            self.layer_shell.destroy();
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Anchoring to two opposite edges stretches that axis, and the protocol
/// wants it requested as 0; any other axis carries the client's dimension.
pub fn requested_size(anchor: Anchor, width: i32, height: i32) -> (u32, u32) {
    let w = if anchor.contains(Anchor::Left | Anchor::Right) { 0 } else { width as u32 };
    let h = if anchor.contains(Anchor::Top | Anchor::Bottom) { 0 } else { height as u32 };
    (w, h)
}

/// A zero axis in a compositor configure means "keep the current size".
fn effective_dims(current: (i32, i32), proposed: (u32, u32)) -> (i32, i32) {
    let w = if proposed.0 > 0 { proposed.0 as i32 } else { current.0 };
    let h = if proposed.1 > 0 { proposed.1 as i32 } else { current.1 };
    (w, h)
}

fn layer_from(value: i32) -> Layer {
    match value {
        0 => Layer::Background,
        1 => Layer::Bottom,
        2 => Layer::Top,
        3 => Layer::Overlay,
        other => {
            warn!("unknown layer {other}; defaulting to top");
            Layer::Top
        }
    }
}

fn interactivity_from(value: i32) -> KeyboardInteractivity {
    match value {
        0 => KeyboardInteractivity::None,
        1 => KeyboardInteractivity::Exclusive,
        2 => KeyboardInteractivity::OnDemand,
        other => {
            warn!("unknown keyboard interactivity {other}; defaulting to none");
            KeyboardInteractivity::None
        }
    }
}

fn button_state_raw(state: WEnum<wl_pointer::ButtonState>) -> u32 {
    match state {
        WEnum::Value(v) => v as u32,
        WEnum::Unknown(raw) => raw,
    }
}

fn key_state_raw(state: WEnum<wl_keyboard::KeyState>) -> u32 {
    match state {
        WEnum::Value(v) => v as u32,
        WEnum::Unknown(raw) => raw,
    }
}

// ── Wayland dispatch ─────────────────────────────────────────────────────────

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for Session {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // Globals are bound once at startup; late arrivals are not used.
    }
}

impl Dispatch<ZwlrLayerSurfaceV1, ()> for Session {
    fn event(
        state: &mut Self,
        proxy: &ZwlrLayerSurfaceV1,
        event: zwlr_layer_surface_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_layer_surface_v1::Event::Configure { serial, width, height } => {
                let (w, h) = effective_dims((state.width, state.height), (width, height));
                if !state.configured {
                    state.configure_serial = serial;
                    state.width = w;
                    state.height = h;
                    state.configured = true;
                    info!("initial configure: serial={serial} size={w}x{h}");
                } else if (w, h) != (state.width, state.height) {
                    // Must not rebuild buffers mid-dispatch; the loop picks
                    // this up on its next turn.
                    debug!("configure: stashing resize to {w}x{h} (serial {serial})");
                    state.pending_resize = Some(PendingResize { serial, width: w, height: h });
                } else {
                    // Same dimensions: nothing to rebuild, ack right away.
                    proxy.ack_configure(serial);
                    if let Some(surface) = state.surface.as_ref() {
                        surface.commit();
                    }
                }
            }
            zwlr_layer_surface_v1::Event::Closed => {
                info!("layer surface closed by compositor");
                state.running = false;
            }
            _ => {}
        }
    }
}

impl Dispatch<WlCallback, ()> for Session {
    fn event(
        state: &mut Self,
        _proxy: &WlCallback,
        event: wl_callback::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            for seq in state.pacing.on_callback_done() {
                trace!("[FRAME] done seq={seq}");
                state.send(&Message::FrameDone { seq });
            }
        }
    }
}

impl Dispatch<WlBuffer, ()> for Session {
    fn event(
        _state: &mut Self,
        _proxy: &WlBuffer,
        event: wl_buffer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            // Pacing runs off the frame callback; the release only matters
            // for diagnostics.
            trace!("buffer released by compositor");
        }
    }
}

impl Dispatch<WlSeat, ()> for Session {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities { capabilities: WEnum::Value(caps) } = event else {
            return;
        };

        if caps.contains(wl_seat::Capability::Pointer) && state.pointer.is_none() {
            debug!("pointer capability acquired");
            state.pointer = Some(seat.get_pointer(qh, ()));
        } else if !caps.contains(wl_seat::Capability::Pointer) {
            if let Some(pointer) = state.pointer.take() {
                if pointer.version() >= 3 {
                    pointer.release();
                }
            }
        }

        if caps.contains(wl_seat::Capability::Keyboard) && state.keyboard.is_none() {
            debug!("keyboard capability acquired");
            state.keyboard = Some(seat.get_keyboard(qh, ()));
        } else if !caps.contains(wl_seat::Capability::Keyboard) {
            if let Some(keyboard) = state.keyboard.take() {
                if keyboard.version() >= 3 {
                    keyboard.release();
                }
            }
        }
    }
}

impl Dispatch<WlPointer, ()> for Session {
    fn event(
        state: &mut Self,
        _proxy: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter { surface_x, surface_y, .. } => {
                let (x, y) = (surface_x as f32, surface_y as f32);
                state.send(&Message::Pointer(PointerEvent::Enter { x, y }));
            }
            wl_pointer::Event::Leave { .. } => {
                state.send(&Message::Pointer(PointerEvent::Leave));
            }
            wl_pointer::Event::Motion { surface_x, surface_y, .. } => {
                let (x, y) = (surface_x as f32, surface_y as f32);
                state.pointer_pos = (x, y);
                state.send(&Message::Pointer(PointerEvent::Motion { x, y }));
            }
            wl_pointer::Event::Button { button, state: btn_state, .. } => {
                // Button events carry no coordinates; only motion updates
                // the cache, so this is the last motion position (or zeros
                // when no motion has arrived yet).
                let (x, y) = state.pointer_pos;
                state.send(&Message::Pointer(PointerEvent::Button {
                    x,
                    y,
                    button,
                    state: button_state_raw(btn_state),
                }));
            }
            // The axis family (axis, frame, axis_source, axis_stop,
            // axis_discrete) is deliberately not forwarded.
            _ => {}
        }
    }
}

impl Dispatch<WlKeyboard, ()> for Session {
    fn event(
        state: &mut Self,
        _proxy: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => match format {
                WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) => {
                    state.kb.load_keymap(fd, size);
                }
                other => {
                    debug!("discarding keymap in unsupported format {other:?}");
                }
            },
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                state.kb.update_modifiers(mods_depressed, mods_latched, mods_locked, group);
            }
            wl_keyboard::Event::Key { key, state: key_state, .. } => {
                let (keysym, modifiers) = state.kb.resolve(key);
                state.send(&Message::Key(KeyEvent {
                    code: key,
                    state: key_state_raw(key_state),
                    modifiers,
                    keysym,
                }));
            }
            _ => {}
        }
    }
}

delegate_noop!(Session: ignore WlCompositor);
delegate_noop!(Session: ignore WlShm);
delegate_noop!(Session: ignore WlShmPool);
delegate_noop!(Session: ignore WlSurface);
delegate_noop!(Session: ignore WlOutput);
delegate_noop!(Session: ignore ZwlrLayerShellV1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_release_emits_done_zero_once() {
        let mut pacing = FramePacing::new();
        assert!(pacing.arm());
        assert_eq!(pacing.on_callback_done(), vec![0]);
        // A later callback with nothing new to release stays silent.
        assert!(pacing.arm());
        assert_eq!(pacing.on_callback_done(), Vec::<i64>::new());
    }

    #[test]
    fn each_ready_gets_exactly_one_done_in_order() {
        let mut pacing = FramePacing::new();
        assert!(pacing.on_frame_ready(1));
        assert_eq!(pacing.on_callback_done(), vec![1]);
        assert!(pacing.on_frame_ready(2));
        assert_eq!(pacing.on_callback_done(), vec![2]);
    }

    #[test]
    fn run_ahead_client_is_acknowledged_in_order() {
        let mut pacing = FramePacing::new();
        assert!(pacing.on_frame_ready(1));
        // Second READY while the callback is still outstanding: no second
        // callback, both sequences released together when it fires.
        assert!(!pacing.on_frame_ready(2));
        assert_eq!(pacing.on_callback_done(), vec![1, 2]);
        assert!(pacing.on_frame_ready(3));
        assert_eq!(pacing.on_callback_done(), vec![3]);
    }

    #[test]
    fn at_most_one_callback_outstanding() {
        let mut pacing = FramePacing::new();
        assert!(pacing.arm());
        assert!(!pacing.arm());
        assert!(!pacing.on_frame_ready(1));
        pacing.on_callback_done();
        assert!(pacing.arm());
    }

    #[test]
    fn resize_callback_does_not_duplicate_acknowledgements() {
        let mut pacing = FramePacing::new();
        assert!(pacing.on_frame_ready(1));
        assert_eq!(pacing.on_callback_done(), vec![1]);
        // The resize path re-arms a callback with no new client frame;
        // its firing must not replay sequence 1.
        assert!(pacing.arm());
        assert_eq!(pacing.on_callback_done(), Vec::<i64>::new());
    }

    #[test]
    fn opposite_edge_anchors_request_zero() {
        let anchor = Anchor::Left | Anchor::Right | Anchor::Top;
        assert_eq!(requested_size(anchor, 50, 30), (0, 30));

        let all = Anchor::Left | Anchor::Right | Anchor::Top | Anchor::Bottom;
        assert_eq!(requested_size(all, 800, 600), (0, 0));

        assert_eq!(requested_size(Anchor::Top, 800, 40), (800, 40));
    }

    #[test]
    fn zero_configure_axis_keeps_current_size() {
        assert_eq!(effective_dims((800, 600), (0, 0)), (800, 600));
        assert_eq!(effective_dims((800, 600), (1024, 0)), (1024, 600));
        assert_eq!(effective_dims((800, 600), (0, 768)), (800, 768));
        assert_eq!(effective_dims((800, 600), (1024, 768)), (1024, 768));
    }
}
