use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::{sink_debug, sink_error};

const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 4096;

/// Callbacks invoked from the client's read thread.
pub trait TcpClientObserver: Send + Sync {
    fn on_read(&self, data: &[u8]);
    fn on_close(&self);
}

/// Blocking TCP client with a background read thread.
pub struct TcpClient {
    stream: Mutex<Option<TcpStream>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    logger: Arc<dyn LogSink>,
}

impl TcpClient {
    /// Connect with a bounded timeout; no read thread yet.
    pub fn connect(ip: &str, port: u16, logger: Arc<dyn LogSink>) -> io::Result<Self> {
        let addr = format!("{ip}:{port}")
            .parse::<std::net::SocketAddr>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(Some(stream)),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            logger,
        })
    }

    /// Spawn the read thread delivering data and close events to `observer`.
    pub fn start(&mut self, observer: Arc<dyn TcpClientObserver>) -> io::Result<()> {
        let stream = {
            let guard = self
                .stream
                .lock()
                .map_err(|_| io::Error::other("stream poisoned"))?;
            match guard.as_ref() {
                Some(stream) => stream.try_clone()?,
                None => return Err(io::Error::new(io::ErrorKind::NotConnected, "no stream")),
            }
        };
        stream.set_read_timeout(Some(READ_POLL_TIMEOUT))?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let logger = Arc::clone(&self.logger);

        let thread = thread::Builder::new()
            .name("rtsp-tcp-read".into())
            .spawn(move || {
                let mut stream = stream;
                let mut buf = [0u8; READ_BUFFER_SIZE];
                while running.load(Ordering::Acquire) {
                    match stream.read(&mut buf) {
                        Ok(0) => {
                            sink_debug!(logger, "[TcpClient] peer closed");
                            observer.on_close();
                            break;
                        }
                        Ok(n) => observer.on_read(&buf[..n]),
                        Err(e)
                            if e.kind() == io::ErrorKind::WouldBlock
                                || e.kind() == io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            if running.load(Ordering::Acquire) {
                                sink_error!(logger, "[TcpClient] read failed: {e}");
                                observer.on_close();
                            }
                            break;
                        }
                    }
                }
            })?;

        self.thread = Some(thread);
        Ok(())
    }

    /// Write the whole buffer; false on any error.
    pub fn send(&self, data: &[u8]) -> bool {
        let Ok(mut guard) = self.stream.lock() else {
            return false;
        };
        let Some(stream) = guard.as_mut() else {
            return false;
        };
        match stream.write_all(data) {
            Ok(()) => stream.flush().is_ok(),
            Err(e) => {
                sink_error!(self.logger, "[TcpClient] send failed: {e}");
                false
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Ok(mut guard) = self.stream.lock() {
            if let Some(stream) = guard.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
