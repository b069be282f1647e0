//! layerhost-helper: owns a Wayland connection, publishes a client-rendered
//! shared pixel buffer as a wlr-layer-shell surface, and forwards input and
//! lifecycle events back to the client over a Unix-socket IPC protocol.
//!
//! The client side listens on the control socket and allocates the shared
//! pixel file; this process is the connecting side and exits when the
//! client says SHUTDOWN, the compositor closes the surface, or the session
//! hits a fatal error.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{prelude::*, EnvFilter};
use wayland_client::backend::WaylandError;
use wayland_client::globals::registry_queue_init;
use wayland_client::{Connection, EventQueue};

use layerhost_common as proto;

mod buffer;
mod error;
mod input;
mod wayland;

use error::HelperError;
use wayland::Session;

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY: Duration = Duration::from_millis(100);
/// Liveness heartbeat; a poll timeout is not an error.
const POLL_TIMEOUT_MS: i32 = 5000;

#[derive(Parser, Debug)]
#[command(version, about = "Publish a client-rendered shared buffer as a wlr-layer-shell surface", long_about = None)]
struct Args {
    /// Unix socket the rendering client is listening on.
    #[arg(long)]
    socket: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let sock = connect_with_retry(&args.socket)
        .with_context(|| format!("cannot connect to client socket {}", args.socket.display()))?;
    info!("connected to client socket {}", args.socket.display());

    run(sock)
}

fn init_logging() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// The client may still be setting up its listener when we launch.
fn connect_with_retry(path: &Path) -> io::Result<UnixStream> {
    let mut attempts = 0;
    loop {
        match UnixStream::connect(path) {
            Ok(sock) => return Ok(sock),
            Err(e) => {
                attempts += 1;
                if attempts > CONNECT_ATTEMPTS {
                    return Err(e);
                }
                debug!("client socket not ready ({e}); retrying");
                thread::sleep(CONNECT_RETRY);
            }
        }
    }
}

fn run(mut sock: UnixStream) -> anyhow::Result<()> {
    let conn = match Connection::connect_to_env() {
        Ok(conn) => conn,
        Err(e) => {
            let err = HelperError::WaylandConnect(e);
            report_startup_failure(&mut sock, &err);
            return Err(err.into());
        }
    };

    let (globals, mut queue) = registry_queue_init::<Session>(&conn).context("wayland registry init")?;
    let qh = queue.handle();

    let bound = match wayland::bind_globals(&globals, &qh) {
        Ok(bound) => bound,
        Err(err) => {
            report_startup_failure(&mut sock, &err);
            return Err(err.into());
        }
    };

    let mut session = Session::new(sock, bound, qh);
    // Let the seat advertise its capabilities before the first client command.
    queue.roundtrip(&mut session).context("initial wayland roundtrip")?;
    info!("wayland globals bound; waiting for CONFIGURE");

    run_loop(&mut queue, &mut session);

    info!("shutting down");
    drop(session);
    let _ = queue.flush();
    Ok(())
}

fn report_startup_failure(sock: &mut UnixStream, err: &HelperError) {
    error!("{err}");
    if let Some(code) = err.wire_code() {
        let _ = proto::send(sock, &proto::Message::Error { code, message: err.to_string() });
    }
}

/// One cooperative thread multiplexing the Wayland display fd and the
/// control socket. The prepare-read / read-events / dispatch-pending
/// protocol keeps listener callbacks from racing queue mutation: every
/// path that does not consume the read guard must drop it, or the queue
/// stays locked and the session deadlocks.
fn run_loop(queue: &mut EventQueue<Session>, session: &mut Session) {
    while session.running() {
        // Deferred resizes first: the configure handler must not rebuild
        // protocol objects while the queue is mid-dispatch.
        if let Err(err) = session.apply_pending_resize(queue) {
            session.report_fatal(&err);
            break;
        }
        if !session.running() {
            break;
        }

        // prepare_read refuses while undispatched events sit in the queue;
        // drain and retry until the handoff into the read lock is atomic.
        let guard = loop {
            match queue.prepare_read() {
                Some(guard) => break guard,
                None => {
                    if let Err(e) = queue.dispatch_pending(session) {
                        session.report_fatal(&HelperError::from(e));
                        return;
                    }
                }
            }
        };

        if let Err(e) = queue.flush() {
            session.report_fatal(&HelperError::from(e));
            return;
        }

        let mut fds = [
            libc::pollfd {
                fd: guard.connection_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: session.socket_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, POLL_TIMEOUT_MS) };
        if ready < 0 {
            let e = io::Error::last_os_error();
            drop(guard);
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            session.report_fatal(&HelperError::from(WaylandError::Io(e)));
            return;
        }
        if ready == 0 {
            // Heartbeat timeout. Cancel the read and go around.
            drop(guard);
            continue;
        }

        if fds[0].revents & libc::POLLIN != 0 {
            match guard.read() {
                Ok(_) => {
                    if let Err(e) = queue.dispatch_pending(session) {
                        session.report_fatal(&HelperError::from(e));
                        return;
                    }
                }
                Err(WaylandError::Io(e)) if would_retry(&e) => {}
                Err(e) => {
                    session.report_fatal(&HelperError::from(e));
                    return;
                }
            }
        } else {
            drop(guard);
        }

        if fds[1].revents & (libc::POLLIN | libc::POLLHUP) != 0 {
            if let Err(err) = session.dispatch_client_message(queue) {
                session.report_fatal(&err);
                break;
            }
        }
    }
}

fn would_retry(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}
