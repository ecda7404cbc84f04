//! Pull-mode MPEG-2 transport stream demuxer.
//!
//! The demuxer owns a `read(buf) -> n` callback and pulls transport packets
//! from it on demand; `n == 0` means the upstream queue is closed and ends
//! demuxing. PAT/PMT of the single WFD program select one video and one audio
//! elementary stream; PES packets are reassembled per PID and surfaced as
//! access units with their 90 kHz timestamps.

use std::collections::{HashMap, VecDeque};

use crate::media::{CodecId, TrackKind};

use super::pes::PesHeader;
use super::psi::{parse_pat, parse_pmt, PmtStream};
use super::ts_error::TsError;
use super::{
    STREAM_TYPE_AAC_ADTS, STREAM_TYPE_AAC_LATM, STREAM_TYPE_H264, STREAM_TYPE_LPCM,
    TS_PACKET_SIZE, TS_SYNC_BYTE,
};

/// One demuxed elementary-stream access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsPacket {
    pub track: TrackKind,
    pub codec: CodecId,
    /// Presentation timestamp in 90 kHz ticks.
    pub pts: u64,
    /// Decode timestamp in 90 kHz ticks (same as pts when absent).
    pub dts: u64,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct PesAssembly {
    data: Vec<u8>,
}

/// `R` is the pull callback feeding raw TS bytes (any chunking).
pub struct TsDemuxer<R: FnMut(&mut [u8]) -> usize> {
    reader: R,
    stash: Vec<u8>,
    pmt_pid: Option<u16>,
    video: Option<PmtStream>,
    audio: Option<PmtStream>,
    assembly: HashMap<u16, PesAssembly>,
    ready: VecDeque<EsPacket>,
    eof: bool,
}

impl<R: FnMut(&mut [u8]) -> usize> TsDemuxer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            stash: Vec::new(),
            pmt_pid: None,
            video: None,
            audio: None,
            assembly: HashMap::new(),
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /// Elementary stream indexes discovered on the first PAT/PMT.
    #[must_use]
    pub fn video_stream(&self) -> Option<PmtStream> {
        self.video
    }

    #[must_use]
    pub fn audio_stream(&self) -> Option<PmtStream> {
        self.audio
    }

    /// Pull the next access unit; `Ok(None)` once the reader reports end of
    /// input and every pending assembly has been flushed.
    pub fn next_packet(&mut self) -> Result<Option<EsPacket>, TsError> {
        loop {
            if let Some(pkt) = self.ready.pop_front() {
                return Ok(Some(pkt));
            }
            if self.eof {
                return Ok(None);
            }
            if !self.pull_transport_packet()? {
                self.eof = true;
                self.flush_pending();
            }
        }
    }

    /// Read one 188-byte packet from the stash/reader. False on end of input.
    fn pull_transport_packet(&mut self) -> Result<bool, TsError> {
        let mut chunk = [0u8; 1500];
        while self.stash.len() < TS_PACKET_SIZE {
            let n = (self.reader)(&mut chunk);
            if n == 0 {
                return Ok(false);
            }
            self.stash.extend_from_slice(&chunk[..n]);
        }

        // Resynchronise if the stream drifted off a packet boundary.
        if self.stash[0] != TS_SYNC_BYTE {
            let lost = self.stash[0];
            match self.stash.iter().position(|&b| b == TS_SYNC_BYTE) {
                Some(pos) => {
                    self.stash.drain(..pos);
                    return Err(TsError::LostSync(lost));
                }
                None => {
                    self.stash.clear();
                    return Err(TsError::LostSync(lost));
                }
            }
        }

        let packet: Vec<u8> = self.stash.drain(..TS_PACKET_SIZE).collect();
        self.process_packet(&packet);
        Ok(true)
    }

    fn process_packet(&mut self, pkt: &[u8]) {
        let transport_error = pkt[1] & 0x80 != 0;
        if transport_error {
            return;
        }
        let pusi = pkt[1] & 0x40 != 0;
        let pid = (u16::from(pkt[1] & 0x1F) << 8) | u16::from(pkt[2]);
        let afc = (pkt[3] >> 4) & 0x03;

        let mut offset = 4usize;
        if afc & 0x02 != 0 {
            let af_len = pkt.get(4).copied().unwrap_or(0) as usize;
            offset = 5 + af_len;
        }
        if afc & 0x01 == 0 || offset >= pkt.len() {
            return;
        }
        let payload = &pkt[offset..];

        if pid == 0 {
            if self.pmt_pid.is_none() {
                self.pmt_pid = parse_pat(payload);
            }
            return;
        }

        if Some(pid) == self.pmt_pid {
            if self.video.is_none() && self.audio.is_none() {
                for stream in parse_pmt(payload) {
                    match stream.stream_type {
                        STREAM_TYPE_H264 if self.video.is_none() => self.video = Some(stream),
                        STREAM_TYPE_AAC_ADTS | STREAM_TYPE_AAC_LATM | STREAM_TYPE_LPCM
                            if self.audio.is_none() =>
                        {
                            self.audio = Some(stream)
                        }
                        _ => {}
                    }
                }
            }
            return;
        }

        let is_video = self.video.is_some_and(|s| s.pid == pid);
        let is_audio = self.audio.is_some_and(|s| s.pid == pid);
        if !is_video && !is_audio {
            return;
        }

        if pusi {
            if let Some(pending) = self.assembly.remove(&pid) {
                self.complete_pes(pid, pending);
            }
            self.assembly
                .entry(pid)
                .or_default()
                .data
                .extend_from_slice(payload);
        } else if let Some(pending) = self.assembly.get_mut(&pid) {
            pending.data.extend_from_slice(payload);
        }
        self.try_complete_bounded(pid);
    }

    /// Complete a PES whose declared packet length has been satisfied
    /// (audio PES packets are bounded; video uses length 0).
    fn try_complete_bounded(&mut self, pid: u16) {
        let done = self.assembly.get(&pid).is_some_and(|pending| {
            if pending.data.len() < 6 {
                return false;
            }
            let declared = u16::from_be_bytes([pending.data[4], pending.data[5]]) as usize;
            declared != 0 && pending.data.len() >= 6 + declared
        });
        if done {
            if let Some(mut pending) = self.assembly.remove(&pid) {
                let declared = u16::from_be_bytes([pending.data[4], pending.data[5]]) as usize;
                pending.data.truncate(6 + declared);
                self.complete_pes(pid, pending);
            }
        }
    }

    fn complete_pes(&mut self, pid: u16, pending: PesAssembly) {
        let Ok(hdr) = PesHeader::parse(&pending.data) else {
            return;
        };
        let data = pending.data[hdr.payload_offset..].to_vec();
        if data.is_empty() {
            return;
        }

        let pts = hdr.pts.unwrap_or(0);
        let dts = hdr.dts.unwrap_or(pts);
        let (track, codec) = if self.video.is_some_and(|s| s.pid == pid) {
            (TrackKind::Video, CodecId::H264)
        } else {
            let stream_type = self.audio.map(|s| s.stream_type).unwrap_or_default();
            (TrackKind::Audio, audio_codec(stream_type))
        };

        self.ready.push_back(EsPacket {
            track,
            codec,
            pts,
            dts,
            data,
        });
    }

    fn flush_pending(&mut self) {
        let mut pids: Vec<u16> = self.assembly.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            if let Some(pending) = self.assembly.remove(&pid) {
                self.complete_pes(pid, pending);
            }
        }
    }
}

fn audio_codec(stream_type: u8) -> CodecId {
    match stream_type {
        STREAM_TYPE_AAC_ADTS | STREAM_TYPE_AAC_LATM => CodecId::Aac,
        STREAM_TYPE_LPCM => CodecId::PcmS16be,
        _ => CodecId::None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::mpegts::pes::write_header;
    use crate::mpegts::psi::fixtures::{build_pat, build_pmt};

    const PMT_PID: u16 = 0x1000;
    const VIDEO_PID: u16 = 0x1011;
    const AUDIO_PID: u16 = 0x1100;

    /// Build one 188-byte packet, stuffing via the adaptation field.
    fn ts_packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() <= TS_PACKET_SIZE - 4);
        let mut pkt = Vec::with_capacity(TS_PACKET_SIZE);
        pkt.push(TS_SYNC_BYTE);
        pkt.push(((pusi as u8) << 6) | ((pid >> 8) as u8 & 0x1F));
        pkt.push(pid as u8);

        let stuffing = TS_PACKET_SIZE - 4 - payload.len();
        if stuffing == 0 {
            pkt.push(0x10 | (cc & 0x0F)); // payload only
        } else {
            pkt.push(0x30 | (cc & 0x0F)); // adaptation + payload
            pkt.push((stuffing - 1) as u8);
            if stuffing > 1 {
                pkt.push(0x00); // adaptation flags
                pkt.extend(std::iter::repeat(0xFF).take(stuffing - 2));
            }
        }
        pkt.extend_from_slice(payload);
        assert_eq!(pkt.len(), TS_PACKET_SIZE);
        pkt
    }

    fn pes_payload(stream_id: u8, pts: u64, dts: Option<u64>, body: &[u8]) -> Vec<u8> {
        let mut pes = Vec::new();
        write_header(&mut pes, stream_id, 0, pts, dts);
        pes.extend_from_slice(body);
        pes
    }

    fn demux_all(stream: Vec<u8>) -> (Vec<EsPacket>, Option<PmtStream>, Option<PmtStream>) {
        let mut cursor = 0usize;
        let mut demuxer = TsDemuxer::new(move |buf: &mut [u8]| {
            let n = (stream.len() - cursor).min(buf.len()).min(376);
            buf[..n].copy_from_slice(&stream[cursor..cursor + n]);
            cursor += n;
            n
        });

        let mut out = Vec::new();
        loop {
            match demuxer.next_packet() {
                Ok(Some(pkt)) => out.push(pkt),
                Ok(None) => break,
                Err(e) => panic!("demux error: {e}"),
            }
        }
        (out, demuxer.video_stream(), demuxer.audio_stream())
    }

    #[test]
    fn demuxes_video_and_audio_access_units() {
        let mut stream = Vec::new();
        stream.extend(ts_packet(0, true, 0, &build_pat(PMT_PID)));
        stream.extend(ts_packet(
            PMT_PID,
            true,
            0,
            &build_pmt(&[(STREAM_TYPE_H264, VIDEO_PID), (STREAM_TYPE_AAC_ADTS, AUDIO_PID)]),
        ));

        // A video AU split across two transport packets.
        let idr = {
            let mut es = vec![0, 0, 0, 1, 0x65];
            es.extend(std::iter::repeat(0x11).take(200));
            es
        };
        let video_pes = pes_payload(0xE0, 90_000, Some(87_000), &idr);
        stream.extend(ts_packet(VIDEO_PID, true, 0, &video_pes[..180]));
        stream.extend(ts_packet(VIDEO_PID, false, 1, &video_pes[180..]));

        // One audio AU, then a second video start to flush the first.
        let adts = [0xFF, 0xF1, 0x50, 0x80, 0x02, 0x1F, 0xFC, 0xAA, 0xBB];
        stream.extend(ts_packet(
            AUDIO_PID,
            true,
            0,
            &pes_payload(0xC0, 45_000, None, &adts),
        ));
        stream.extend(ts_packet(
            VIDEO_PID,
            true,
            2,
            &pes_payload(0xE0, 93_600, None, &[0, 0, 0, 1, 0x41, 0x9A]),
        ));

        let (packets, video, audio) = demux_all(stream);

        assert_eq!(video.unwrap().pid, VIDEO_PID);
        assert_eq!(audio.unwrap().stream_type, STREAM_TYPE_AAC_ADTS);

        assert_eq!(packets.len(), 3);
        let v0 = &packets[0];
        assert_eq!(v0.track, TrackKind::Video);
        assert_eq!(v0.codec, CodecId::H264);
        assert_eq!(v0.pts, 90_000);
        assert_eq!(v0.dts, 87_000);
        assert_eq!(v0.data, idr);

        // Remaining assemblies are flushed at end of input in pid order:
        // the second video AU first, then the audio AU.
        assert_eq!(packets[1].track, TrackKind::Video);
        assert_eq!(packets[1].pts, 93_600);

        let a0 = &packets[2];
        assert_eq!(a0.track, TrackKind::Audio);
        assert_eq!(a0.codec, CodecId::Aac);
        assert_eq!(a0.pts, 45_000);
        assert_eq!(a0.dts, 45_000);
        assert_eq!(a0.data, adts);
    }

    #[test]
    fn unknown_pids_are_ignored() {
        let mut stream = Vec::new();
        stream.extend(ts_packet(0, true, 0, &build_pat(PMT_PID)));
        stream.extend(ts_packet(PMT_PID, true, 0, &build_pmt(&[(STREAM_TYPE_H264, VIDEO_PID)])));
        stream.extend(ts_packet(0x1234, true, 0, &pes_payload(0xE0, 1, None, &[9, 9])));

        let (packets, video, audio) = demux_all(stream);
        assert!(packets.is_empty());
        assert!(video.is_some());
        assert!(audio.is_none());
    }

    #[test]
    fn reader_end_terminates_demuxing() {
        let mut calls = 0;
        let mut demuxer = TsDemuxer::new(move |_buf: &mut [u8]| {
            calls += 1;
            0
        });
        assert_eq!(demuxer.next_packet().expect("eof"), None);
        // Subsequent pulls stay finished.
        assert_eq!(demuxer.next_packet().expect("eof"), None);
    }
}
