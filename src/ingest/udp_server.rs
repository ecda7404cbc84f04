use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::{sink_error, sink_info};

const RECV_BUFFER_SIZE: usize = 2048;
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(100);

type OnPacket = Box<dyn Fn(&[u8]) + Send>;

/// Receive thread around a bound UDP socket; datagrams are handed to the
/// packet callback on the receive thread.
pub struct UdpServer {
    local_port: u16,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UdpServer {
    pub fn start(
        local_ip: &str,
        port: u16,
        logger: Arc<dyn LogSink>,
        on_packet: OnPacket,
    ) -> io::Result<Self> {
        let bind_ip = if local_ip.is_empty() { "0.0.0.0" } else { local_ip };
        let socket = UdpSocket::bind((bind_ip, port))?;
        socket.set_read_timeout(Some(RECV_POLL_TIMEOUT))?;
        let local_port = socket.local_addr()?.port();

        let running = Arc::new(AtomicBool::new(true));
        let running_worker = Arc::clone(&running);
        let worker_logger = Arc::clone(&logger);

        sink_info!(logger, "[UdpServer] listening on {bind_ip}:{local_port}");
        let thread = thread::Builder::new()
            .name("rtp-udp-recv".into())
            .spawn(move || {
                let mut buf = [0u8; RECV_BUFFER_SIZE];
                while running_worker.load(Ordering::Relaxed) {
                    match socket.recv_from(&mut buf) {
                        Ok((n, _peer)) => {
                            if n > 0 {
                                on_packet(&buf[..n]);
                            }
                        }
                        Err(e)
                            if e.kind() == io::ErrorKind::WouldBlock
                                || e.kind() == io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            sink_error!(worker_logger, "[UdpServer] recv failed: {e}");
                            break;
                        }
                    }
                }
            })
            .map_err(io::Error::other)?;

        Ok(Self {
            local_port,
            running,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for UdpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use std::sync::mpsc;

    #[test]
    fn delivers_datagrams_to_the_callback() {
        let (tx, rx) = mpsc::channel();
        let mut server = UdpServer::start(
            "127.0.0.1",
            0,
            Arc::new(NoopLogSink),
            Box::new(move |pkt| {
                let _ = tx.send(pkt.to_vec());
            }),
        )
        .expect("bind");

        let sender = UdpSocket::bind("127.0.0.1:0").expect("sender");
        sender
            .send_to(b"hello", ("127.0.0.1", server.local_port()))
            .expect("send");

        let got = rx.recv_timeout(Duration::from_secs(2)).expect("packet");
        assert_eq!(got, b"hello");
        server.stop();
    }
}
