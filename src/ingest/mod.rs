pub mod depacketizer;
pub mod udp_server;

pub use depacketizer::RtpTsDepacketizer;
pub use udp_server::UdpServer;
