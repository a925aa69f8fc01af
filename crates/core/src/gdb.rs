//! Remote debug stub (GDB Remote Serial Protocol framing).
//!
//! The wire protocol proper lives in the debugger; this stub only provides
//! the start/stop hook the harness owes it. It binds the well-known port,
//! accepts one client at a time, and maps the session-control packets onto
//! the shared run-state cell: `c`/`vCont;c` resume the core, `0x03`
//! (interrupt) stops it, detach resumes and drops the connection. It never
//! touches the core itself: the execution loop observes the same cell and
//! parks while the state is `Stopped`.
//!
//! Packet format: `$<data>#<checksum>`, acknowledged with `+`.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::{RunState, RunStateCell};

/// The fixed well-known debug port.
pub const GDB_PORT: u16 = 1234;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Handle to the background debug endpoint.
pub struct DebugStub {
    port: u16,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DebugStub {
    /// Bind the well-known port and start accepting in the background.
    pub fn start(state: Arc<RunStateCell>) -> io::Result<Self> {
        Self::start_on(state, GDB_PORT)
    }

    /// Bind a specific port (0 picks an ephemeral one).
    pub fn start_on(state: Arc<RunStateCell>, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        let port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;
        log::info!("debug endpoint listening on 127.0.0.1:{}", port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let thread = thread::spawn(move || {
            while !thread_shutdown.load(Ordering::Acquire) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        log::info!("debugger connected from {}", addr);
                        if let Err(e) = serve(stream, &state, &thread_shutdown) {
                            log::warn!("debug session ended: {}", e);
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        log::warn!("debug endpoint accept failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(DebugStub { port, shutdown, thread: Some(thread) })
    }

    /// Port the stub is actually bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting and wait for the endpoint thread to exit.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DebugStub {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

/// Serve one debugger connection until it detaches or the stub shuts down.
fn serve(
    mut stream: TcpStream,
    state: &RunStateCell,
    shutdown: &AtomicBool,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut buf = Vec::with_capacity(256);

    while !shutdown.load(Ordering::Acquire) {
        let packet = match read_packet(&mut stream, &mut buf) {
            Ok(Some(p)) => p,
            Ok(None) => continue, // timeout tick; re-check shutdown
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        match packet.first() {
            // Interrupt (0x03): hold the core stopped
            Some(0x03) => {
                state.store(RunState::Stopped);
                send_packet(&mut stream, b"S05")?;
            }
            // Halt reason
            Some(b'?') => send_packet(&mut stream, b"S05")?,
            // Continue: release the core; the reply comes on the next stop
            Some(b'c') => state.store(RunState::Running),
            Some(b'v') if packet.starts_with(b"vCont;c") => {
                state.store(RunState::Running);
            }
            Some(b'v') if packet == b"vCont?" => {
                send_packet(&mut stream, b"vCont;c")?;
            }
            // Detach: resume and drop the connection
            Some(b'D') => {
                send_packet(&mut stream, b"OK")?;
                state.store(RunState::Running);
                return Ok(());
            }
            Some(b'k') => return Ok(()),
            Some(b'q') => {
                if packet.starts_with(b"qSupported") {
                    send_packet(&mut stream, b"PacketSize=4000")?;
                } else if packet == b"qAttached" {
                    send_packet(&mut stream, b"1")?;
                } else {
                    send_packet(&mut stream, b"")?;
                }
            }
            // Register/memory access is the debugger's business with a
            // richer stub; this one only does session control.
            _ => send_packet(&mut stream, b"")?,
        }
    }
    Ok(())
}

/// Read one packet (`$...#cs`) or a bare interrupt byte. `Ok(None)` on a
/// read timeout so the caller can poll its shutdown flag.
fn read_packet(stream: &mut TcpStream, buf: &mut Vec<u8>) -> io::Result<Option<Vec<u8>>> {
    let mut byte = [0u8; 1];

    // Skip to '$', reporting interrupts immediately
    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof)),
            Ok(_) => {}
            Err(e) if timed_out(&e) => return Ok(None),
            Err(e) => return Err(e),
        }
        match byte[0] {
            0x03 => return Ok(Some(vec![0x03])),
            b'$' => break,
            _ => {} // stray ACKs and noise
        }
    }

    buf.clear();
    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof)),
            Ok(_) => {}
            Err(e) if timed_out(&e) => continue, // mid-packet: keep reading
            Err(e) => return Err(e),
        }
        if byte[0] == b'#' {
            break;
        }
        buf.push(byte[0]);
    }

    // Two checksum characters we don't validate, then ACK
    let mut cksum = [0u8; 2];
    stream.read_exact(&mut cksum)?;
    stream.write_all(b"+")?;
    stream.flush()?;

    Ok(Some(buf.clone()))
}

fn send_packet(stream: &mut TcpStream, data: &[u8]) -> io::Result<()> {
    let checksum: u8 = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    let mut pkt = Vec::with_capacity(data.len() + 4);
    pkt.push(b'$');
    pkt.extend_from_slice(data);
    pkt.push(b'#');
    pkt.push(HEX_CHARS[(checksum >> 4) as usize]);
    pkt.push(HEX_CHARS[(checksum & 0xF) as usize]);
    stream.write_all(&pkt)?;
    stream.flush()
}

fn timed_out(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
