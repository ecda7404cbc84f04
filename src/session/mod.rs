pub mod tcp_client;
pub mod timeout_timer;
pub mod wfd_session;

pub use tcp_client::{TcpClient, TcpClientObserver};
pub use timeout_timer::TimeoutTimer;
pub use wfd_session::{WfdSessionConfig, WfdSinkSession};
