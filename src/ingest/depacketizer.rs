//! RTP → MPEG-TS depacketiser.
//!
//! RTP payloads (payload type 33) are queued on the receive thread; a decode
//! thread presents the queue to the transport-stream demuxer through a pull
//! callback and emits one [`Frame`] per H.264 NAL unit (access-unit
//! delimiters dropped) or per audio access unit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::media::{CodecId, Frame, TrackKind};
use crate::mpegts::TsDemuxer;
use crate::nal;
use crate::rtp::{RtpPacket, RTP_PT_MP2T};
use crate::{sink_debug, sink_info, sink_warn};

/// Sleep slice of the demuxer's pull callback while the queue is empty.
const READ_IDLE_SLEEP: Duration = Duration::from_micros(200);

pub type OnFrame = Box<dyn Fn(u32, Frame) + Send + Sync>;

struct Inner {
    queue: Mutex<VecDeque<Bytes>>,
    exit: AtomicBool,
    ssrc: AtomicU32,
    on_frame: Mutex<Option<OnFrame>>,
}

/// Owns the packet queue and the TS decode thread.
pub struct RtpTsDepacketizer {
    inner: Arc<Inner>,
    logger: Arc<dyn LogSink>,
    decode_thread: Option<JoinHandle<()>>,
}

impl RtpTsDepacketizer {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                exit: AtomicBool::new(false),
                ssrc: AtomicU32::new(0),
                on_frame: Mutex::new(None),
            }),
            logger,
            decode_thread: None,
        }
    }

    pub fn set_on_frame(&self, cb: OnFrame) {
        if let Ok(mut slot) = self.inner.on_frame.lock() {
            *slot = Some(cb);
        }
    }

    /// Parse one RTP datagram and queue its TS payload. The decode thread is
    /// spawned lazily on the first packet.
    pub fn input_rtp(&mut self, datagram: &[u8]) {
        if self.inner.exit.load(Ordering::Acquire) {
            return;
        }

        let packet = match RtpPacket::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                sink_warn!(self.logger, "[RtpTsDepacketizer] bad rtp packet: {e}");
                return;
            }
        };
        if packet.payload_type() != RTP_PT_MP2T {
            sink_debug!(
                self.logger,
                "[RtpTsDepacketizer] ignoring payload type {}",
                packet.payload_type()
            );
            return;
        }
        if packet.payload.is_empty() {
            return;
        }

        self.inner.ssrc.store(packet.ssrc(), Ordering::Relaxed);
        if self.decode_thread.is_none() {
            self.spawn_decode_thread();
        }
        if let Ok(mut queue) = self.inner.queue.lock() {
            queue.push_back(packet.payload);
        }
    }

    /// Stop the decode thread and drop the frame callback.
    pub fn release(&mut self) {
        if let Ok(mut slot) = self.inner.on_frame.lock() {
            *slot = None;
        }
        self.inner.exit.store(true, Ordering::Release);
        if let Some(thread) = self.decode_thread.take() {
            let _ = thread.join();
        }
        if let Ok(mut queue) = self.inner.queue.lock() {
            queue.clear();
        }
    }

    fn spawn_decode_thread(&mut self) {
        let inner = Arc::clone(&self.inner);
        let logger = Arc::clone(&self.logger);

        let thread = thread::Builder::new().name("ts-demux".into()).spawn(move || {
            let reader_inner = Arc::clone(&inner);
            let mut pending: Option<Bytes> = None;
            let mut demuxer = TsDemuxer::new(move |buf: &mut [u8]| loop {
                if let Some(chunk) = pending.take() {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        pending = Some(chunk.slice(n..));
                    }
                    return n;
                }
                let popped = reader_inner
                    .queue
                    .lock()
                    .ok()
                    .and_then(|mut queue| queue.pop_front());
                match popped {
                    Some(chunk) => pending = Some(chunk),
                    None => {
                        if reader_inner.exit.load(Ordering::Acquire) {
                            return 0;
                        }
                        thread::sleep(READ_IDLE_SLEEP);
                    }
                }
            });

            loop {
                match demuxer.next_packet() {
                    Ok(Some(es)) => emit_frames(&inner, es),
                    Ok(None) => break,
                    Err(e) => {
                        sink_warn!(logger, "[RtpTsDepacketizer] demux: {e}");
                    }
                }
            }
            sink_info!(logger, "[RtpTsDepacketizer] ts decode thread exit");
        });

        match thread {
            Ok(handle) => self.decode_thread = Some(handle),
            Err(e) => sink_warn!(self.logger, "[RtpTsDepacketizer] spawn failed: {e}"),
        }
    }
}

fn emit_frames(inner: &Arc<Inner>, es: crate::mpegts::EsPacket) {
    let ssrc = inner.ssrc.load(Ordering::Relaxed);
    let Ok(cb_slot) = inner.on_frame.lock() else {
        return;
    };
    let Some(cb) = cb_slot.as_ref() else {
        return;
    };

    match es.track {
        TrackKind::Video => {
            let data = Bytes::from(es.data);
            nal::split_annex_b(&data, |range| {
                // A bare start code with no header byte carries nothing.
                let Some(&nal_byte) = data.get(range.offset + range.prefix) else {
                    return;
                };
                if nal::h264_type(nal_byte) == nal::NAL_AUD {
                    return;
                }
                let mut frame = Frame::video(
                    data.slice(range.offset..range.offset + range.len),
                    range.prefix,
                    es.dts,
                    es.pts,
                );
                frame.ssrc = Some(ssrc);
                cb(ssrc, frame);
            });
        }
        TrackKind::Audio => {
            let codec = if es.codec == CodecId::None {
                CodecId::Aac
            } else {
                es.codec
            };
            let mut frame = Frame::audio(codec, Bytes::from(es.data), es.dts, es.pts);
            frame.ssrc = Some(ssrc);
            cb(ssrc, frame);
        }
    }
}

impl Drop for RtpTsDepacketizer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use crate::media::TrackKind;
    use crate::mpegts::pes::write_header;
    use crate::mpegts::{STREAM_TYPE_AAC_ADTS, STREAM_TYPE_H264, TS_PACKET_SIZE, TS_SYNC_BYTE};
    use std::sync::mpsc;

    const PMT_PID: u16 = 0x1000;
    const VIDEO_PID: u16 = 0x1011;
    const AUDIO_PID: u16 = 0x1100;

    fn ts_packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let mut pkt = Vec::with_capacity(TS_PACKET_SIZE);
        pkt.push(TS_SYNC_BYTE);
        pkt.push(((pusi as u8) << 6) | ((pid >> 8) as u8 & 0x1F));
        pkt.push(pid as u8);
        let stuffing = TS_PACKET_SIZE - 4 - payload.len();
        if stuffing == 0 {
            pkt.push(0x10 | (cc & 0x0F));
        } else {
            pkt.push(0x30 | (cc & 0x0F));
            pkt.push((stuffing - 1) as u8);
            if stuffing > 1 {
                pkt.push(0x00);
                pkt.extend(std::iter::repeat(0xFF).take(stuffing - 2));
            }
        }
        pkt.extend_from_slice(payload);
        pkt
    }

    fn pat() -> Vec<u8> {
        let mut sec = vec![0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00];
        sec.extend_from_slice(&1u16.to_be_bytes());
        sec.extend_from_slice(&(0xE000 | PMT_PID).to_be_bytes());
        sec.extend_from_slice(&[0, 0, 0, 0]);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&sec);
        payload
    }

    fn pmt() -> Vec<u8> {
        let streams = [(STREAM_TYPE_H264, VIDEO_PID), (STREAM_TYPE_AAC_ADTS, AUDIO_PID)];
        let mut body = Vec::new();
        for (stream_type, pid) in streams {
            body.push(stream_type);
            body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
            body.extend_from_slice(&0xF000u16.to_be_bytes());
        }
        let section_length = 9 + body.len() + 4;
        let mut sec = vec![0x02, 0xB0, section_length as u8];
        sec.extend_from_slice(&1u16.to_be_bytes());
        sec.extend_from_slice(&[0xC1, 0x00, 0x00]);
        sec.extend_from_slice(&(0xE000u16 | 0x100).to_be_bytes());
        sec.extend_from_slice(&0xF000u16.to_be_bytes());
        sec.extend_from_slice(&body);
        sec.extend_from_slice(&[0, 0, 0, 0]);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&sec);
        payload
    }

    fn rtp_wrap(seq: u16, ts_packets: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = Vec::new();
        for pkt in ts_packets {
            payload.extend_from_slice(pkt);
        }
        RtpPacket::simple(RTP_PT_MP2T, false, seq, 0, 0xCAFE, Bytes::from(payload)).encode()
    }

    #[test]
    fn rtp_stream_becomes_nal_frames() {
        let mut depacketizer = RtpTsDepacketizer::new(Arc::new(NoopLogSink));
        let (tx, rx) = mpsc::channel();
        depacketizer.set_on_frame(Box::new(move |ssrc, frame| {
            let _ = tx.send((ssrc, frame));
        }));

        // SPS + AUD + IDR in one PES; the AUD must be discarded.
        let mut es = Vec::new();
        es.extend_from_slice(&[0, 0, 0, 1, 0x09, 0xF0]); // AUD
        es.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x64, 0x00]); // SPS
        es.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84]); // IDR
        let mut video_pes = Vec::new();
        write_header(&mut video_pes, 0xE0, 0, 90_000, None);
        video_pes.extend_from_slice(&es);

        // Audio PES packets are bounded: 3 flag bytes + 5 timestamp bytes + payload.
        let adts = [0xFF, 0xF1, 0x50, 0x80, 0x02, 0x1F, 0xFC];
        let mut audio_pes = Vec::new();
        write_header(&mut audio_pes, 0xC0, 8 + adts.len(), 45_000, None);
        audio_pes.extend_from_slice(&adts);

        // Terminate the video PES with a fresh video packet start.
        let mut tail_pes = Vec::new();
        write_header(&mut tail_pes, 0xE0, 0, 93_600, None);
        tail_pes.extend_from_slice(&[0, 0, 0, 1, 0x41, 0x9A]);

        depacketizer.input_rtp(&rtp_wrap(
            1,
            &[ts_packet(0, true, 0, &pat()), ts_packet(PMT_PID, true, 0, &pmt())],
        ));
        depacketizer.input_rtp(&rtp_wrap(
            2,
            &[
                ts_packet(VIDEO_PID, true, 0, &video_pes),
                ts_packet(AUDIO_PID, true, 0, &audio_pes),
                ts_packet(VIDEO_PID, true, 1, &tail_pes),
            ],
        ));

        // The bounded audio PES completes first, then the video AU is closed
        // by the next video packet start. The AUD never surfaces.
        let (ssrc, audio) = rx.recv_timeout(Duration::from_secs(2)).expect("audio");
        assert_eq!(ssrc, 0xCAFE);
        assert_eq!(audio.track, TrackKind::Audio);
        assert_eq!(audio.codec_id, CodecId::Aac);
        assert_eq!(audio.pts, 45_000);
        assert_eq!(&audio.payload[..], &adts);

        let (_, sps) = rx.recv_timeout(Duration::from_secs(2)).expect("sps");
        assert_eq!(sps.nal_type(), Some(nal::NAL_SPS));
        assert_eq!(sps.pts, 90_000);
        assert!(!sps.key_frame);

        let (_, idr) = rx.recv_timeout(Duration::from_secs(2)).expect("idr");
        assert_eq!(idr.nal_type(), Some(nal::NAL_IDR));
        assert!(idr.key_frame);

        depacketizer.release();
    }

    #[test]
    fn release_terminates_decode_thread_quickly() {
        let mut depacketizer = RtpTsDepacketizer::new(Arc::new(NoopLogSink));
        depacketizer.set_on_frame(Box::new(|_, _| {}));
        depacketizer.input_rtp(&rtp_wrap(1, &[ts_packet(0, true, 0, &pat())]));

        let started = std::time::Instant::now();
        depacketizer.release();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn non_ts_payload_types_are_ignored() {
        let mut depacketizer = RtpTsDepacketizer::new(Arc::new(NoopLogSink));
        let (tx, rx) = mpsc::channel();
        depacketizer.set_on_frame(Box::new(move |_, frame| {
            let _ = tx.send(frame);
        }));

        let opus = RtpPacket::simple(111, false, 1, 0, 1, Bytes::from_static(&[1, 2, 3])).encode();
        depacketizer.input_rtp(&opus);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
