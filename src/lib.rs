//! castsink is a Wi-Fi Display (Miracast) sink for local network mirroring.
//!
//! It negotiates a streaming session with a Miracast source over RTSP/WFD,
//! ingests the MPEG-TS-over-RTP stream, demultiplexes and decodes the embedded
//! H.264 video and audio, and hands decoded samples to local render endpoints
//! with audio-anchored A/V synchronisation.
//!
//! The crate is structured into several modules, each responsible for a
//! specific layer of the sink pipeline.

/// Media channel gluing the RTP consumer to the playback controller.
pub mod channel;
/// Decoder contracts, backends and per-codec runners.
pub mod codec;
/// Handles configuration loading and management.
pub mod config;
/// Dispatcher buffering frames between the consumer and the players.
pub mod dispatch;
/// Event surface shared between session, channel and service layer.
pub mod event;
/// RTP ingest: UDP receive, TS depacketising, frame emission.
pub mod ingest;
/// Logging utilities for the sink.
pub mod log;
/// Frame and track primitives shared across the pipeline.
pub mod media;
/// MPEG-2 transport stream demuxer.
pub mod mpegts;
/// H.264 Annex-B NAL unit splitting and classification.
pub mod nal;
/// Playback: audio sink, players, A/V sync, media controller.
pub mod playback;
/// RTCP (RTP Control Protocol) packet parsing and building.
pub mod rtcp;
/// RTP (Real-time Transport Protocol) packet parsing and building.
pub mod rtp;
/// RTSP message codec with the WFD parameter grammar.
pub mod rtsp;
/// WFD sink session state machine over a TCP client.
pub mod session;
