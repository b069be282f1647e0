use std::io;

use layerhost_common as proto;
use thiserror::Error;

/// Everything that can take the session down, plus the startup failures.
///
/// The numeric codes carried by the ERROR message are part of the wire
/// protocol and must stay stable; see [`HelperError::wire_code`].
#[derive(Debug, Error)]
pub enum HelperError {
    #[error("cannot connect to wayland display: {0}")]
    WaylandConnect(#[from] wayland_client::ConnectError),

    #[error("wl_compositor not available")]
    MissingCompositor,

    #[error("wl_shm not available")]
    MissingShm,

    #[error("zwlr_layer_shell_v1 not available; compositor may not support layer surfaces")]
    MissingLayerShell,

    #[error("cannot open shared pixel file {path}: {source}")]
    ShmOpen { path: String, source: io::Error },

    #[error("wl_surface creation failed")]
    SurfaceCreate,

    #[error("layer surface creation failed")]
    LayerSurfaceCreate,

    #[error("compositor did not send an initial configure")]
    NoConfigure,

    #[error("failed to set up shared memory buffers: {0}")]
    ShmBuffers(io::Error),

    #[error("control socket: {0}")]
    Ipc(#[from] proto::ProtocolError),

    #[error("wayland session: {0}")]
    Wayland(#[from] wayland_client::DispatchError),
}

impl From<wayland_client::backend::WaylandError> for HelperError {
    fn from(err: wayland_client::backend::WaylandError) -> Self {
        HelperError::Wayland(wayland_client::DispatchError::Backend(err))
    }
}

impl HelperError {
    /// Numeric code for the ERROR message, for the kinds that carry one.
    /// Socket-level failures return `None`: the stream those codes would
    /// travel on is the thing that broke.
    pub fn wire_code(&self) -> Option<i32> {
        match self {
            HelperError::ShmOpen { .. } => Some(proto::code::SHM_OPEN),
            HelperError::SurfaceCreate => Some(proto::code::SURFACE_CREATE),
            HelperError::LayerSurfaceCreate => Some(proto::code::LAYER_SURFACE_CREATE),
            HelperError::NoConfigure => Some(proto::code::NO_CONFIGURE),
            HelperError::ShmBuffers(_) => Some(proto::code::SHM_BUFFERS),
            HelperError::WaylandConnect(_) => Some(proto::code::WAYLAND_CONNECT),
            HelperError::MissingCompositor => Some(proto::code::NO_COMPOSITOR),
            HelperError::MissingShm => Some(proto::code::NO_SHM),
            HelperError::MissingLayerShell => Some(proto::code::NO_LAYER_SHELL),
            HelperError::Ipc(_) | HelperError::Wayland(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        let open_err = HelperError::ShmOpen {
            path: "/tmp/pix".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(open_err.wire_code(), Some(1));
        assert_eq!(HelperError::SurfaceCreate.wire_code(), Some(2));
        assert_eq!(HelperError::LayerSurfaceCreate.wire_code(), Some(3));
        assert_eq!(HelperError::NoConfigure.wire_code(), Some(4));
        assert_eq!(
            HelperError::ShmBuffers(io::Error::from(io::ErrorKind::OutOfMemory)).wire_code(),
            Some(5)
        );
        assert_eq!(HelperError::MissingCompositor.wire_code(), Some(11));
        assert_eq!(HelperError::MissingShm.wire_code(), Some(12));
        assert_eq!(HelperError::MissingLayerShell.wire_code(), Some(13));
    }

    #[test]
    fn socket_failures_carry_no_code() {
        let err = HelperError::Ipc(proto::ProtocolError::BadMagic(0xDEADBEEF));
        assert_eq!(err.wire_code(), None);
    }

    #[test]
    fn wayland_session_failures_carry_no_code() {
        let err = HelperError::from(wayland_client::backend::WaylandError::Io(
            io::Error::from(io::ErrorKind::BrokenPipe),
        ));
        assert_eq!(err.wire_code(), None);
    }
}
