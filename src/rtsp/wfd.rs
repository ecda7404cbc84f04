//! WFD parameter grammar over the RTSP codec: the M1..M8 handshake messages,
//! the M3 capability answer and the M4 track negotiation.

use crate::media::{AudioTrack, CodecId, VideoTrack};

use super::message::{split_parameters, RtspRequest, RtspResponse};
use super::{
    RTSP_METHOD_GET_PARAMETER, RTSP_METHOD_OPTIONS, RTSP_METHOD_PLAY, RTSP_METHOD_SETUP,
    RTSP_METHOD_SET_PARAMETER, RTSP_METHOD_TEARDOWN, RTSP_METHOD_WFD,
};

pub const WFD_PARAM_VIDEO_FORMATS: &str = "wfd_video_formats";
pub const WFD_PARAM_AUDIO_CODECS: &str = "wfd_audio_codecs";
pub const WFD_PARAM_VIDEO_FORMATS_2: &str = "wfd_video_formats_2";
pub const WFD_PARAM_AUDIO_CODECS_2: &str = "wfd_audio_codecs_2";
pub const WFD_PARAM_RTP_PORTS: &str = "wfd_client_rtp_ports";
pub const WFD_PARAM_CONTENT_PROTECTION: &str = "wfd_content_protection";
pub const WFD_PARAM_COUPLED_SINK: &str = "wfd_coupled_sink";
pub const WFD_PARAM_UIBC_CAPABILITY: &str = "wfd_uibc_capability";
pub const WFD_PARAM_STANDBY_RESUME: &str = "wfd_standby_resume_capability";
pub const WFD_PARAM_CONNECTOR_TYPE: &str = "wfd_connector_type";
pub const WFD_PARAM_DISPLAY_EDID: &str = "wfd_display_edid";
pub const WFD_PARAM_RTCP_CAPABILITY: &str = "microsoft_rtcp_capability";
pub const WFD_PARAM_IDR_REQUEST_CAPABILITY: &str = "wfd_idr_request_capability";
pub const WFD_PARAM_PRESENTATION_URL: &str = "wfd_presentation_URL";
pub const WFD_PARAM_TRIGGER: &str = "wfd_trigger_method";
pub const WFD_PARAM_IDR_REQUEST: &str = "wfd_idr_request";
/// Vendor extension prefix answered verbatim from the parameter table.
pub const WFD_PARAM_HWE_PREFIX: &str = "hwe_";

/// The `Server:` marker of a Windows source.
pub const WFD_PC_SOURCE_SERVER: &str = "MSMiracastSource";

/// Advertised sink capabilities; populated from config and the platform.
#[derive(Debug, Clone)]
pub struct WfdParamsInfo {
    pub video_formats: String,
    pub audio_codecs: String,
    pub video_formats_2: String,
    pub audio_codecs_2: String,
    pub content_protection: String,
    pub coupled_sink: String,
    pub uibc_capability: String,
    pub standby_resume: String,
    pub connector_type: String,
    pub display_edid: String,
    pub microsoft_rtcp_capability: String,
    pub idr_request_capability: String,
    /// `hwe_*` vendor parameters answered as-is.
    pub vendor_params: Vec<(String, String)>,
}

impl Default for WfdParamsInfo {
    fn default() -> Self {
        Self {
            video_formats: "40 00 03 10 0001ffff 1fffffff 00001fff 00 0000 0000 00 none none"
                .to_string(),
            audio_codecs: "LPCM 00000003 00, AAC 00000001 00".to_string(),
            video_formats_2: "none".to_string(),
            audio_codecs_2: "none".to_string(),
            content_protection: "none".to_string(),
            coupled_sink: "none".to_string(),
            uibc_capability: "none".to_string(),
            standby_resume: "none".to_string(),
            connector_type: "05".to_string(),
            display_edid: "none".to_string(),
            microsoft_rtcp_capability: "none".to_string(),
            idr_request_capability: "1".to_string(),
            vendor_params: Vec::new(),
        }
    }
}

/// M1 answer: advertise the method set every WFD sink must support.
#[must_use]
pub fn m1_response(cseq: u32) -> RtspResponse {
    let mut response = RtspResponse::new(cseq, super::RTSP_STATUS_OK);
    response.add_header(
        "Public",
        &format!(
            "{RTSP_METHOD_WFD}, {RTSP_METHOD_SET_PARAMETER}, {RTSP_METHOD_GET_PARAMETER}, \
             {RTSP_METHOD_SETUP}, {RTSP_METHOD_PLAY}, {RTSP_METHOD_TEARDOWN}"
        ),
    );
    response
}

/// M2: our own OPTIONS probe towards the source.
#[must_use]
pub fn m2_request(cseq: u32) -> RtspRequest {
    let mut request = RtspRequest::new(RTSP_METHOD_OPTIONS, "*", cseq);
    request.add_header("Require", RTSP_METHOD_WFD);
    request
}

/// M3 answer: exactly one line per requested parameter, nothing more.
#[must_use]
pub fn m3_response(
    cseq: u32,
    requested: &[String],
    params: &WfdParamsInfo,
    local_rtp_port: u16,
) -> RtspResponse {
    let mut response = RtspResponse::new(cseq, super::RTSP_STATUS_OK);
    for name in requested {
        let name = name.trim().trim_end_matches(':');
        let value = match name {
            WFD_PARAM_VIDEO_FORMATS => Some(params.video_formats.clone()),
            WFD_PARAM_AUDIO_CODECS => Some(params.audio_codecs.clone()),
            WFD_PARAM_VIDEO_FORMATS_2 => Some(params.video_formats_2.clone()),
            WFD_PARAM_AUDIO_CODECS_2 => Some(params.audio_codecs_2.clone()),
            WFD_PARAM_RTP_PORTS => Some(format!(
                "RTP/AVP/UDP;unicast {local_rtp_port} 0 mode=play"
            )),
            WFD_PARAM_CONTENT_PROTECTION => Some(params.content_protection.clone()),
            WFD_PARAM_COUPLED_SINK => Some(params.coupled_sink.clone()),
            WFD_PARAM_UIBC_CAPABILITY => Some(params.uibc_capability.clone()),
            WFD_PARAM_STANDBY_RESUME => Some(params.standby_resume.clone()),
            WFD_PARAM_CONNECTOR_TYPE => Some(params.connector_type.clone()),
            WFD_PARAM_DISPLAY_EDID => Some(params.display_edid.clone()),
            WFD_PARAM_RTCP_CAPABILITY => Some(params.microsoft_rtcp_capability.clone()),
            WFD_PARAM_IDR_REQUEST_CAPABILITY => Some(params.idr_request_capability.clone()),
            other if other.starts_with(WFD_PARAM_HWE_PREFIX) => Some(
                params
                    .vendor_params
                    .iter()
                    .find(|(key, _)| key == other)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_else(|| "none".to_string()),
            ),
            _ => None,
        };
        if let Some(value) = value {
            response.add_body_line(&format!("{name}: {value}"));
        }
    }
    response
}

/// Everything M4 negotiates that the rest of the sink needs.
#[derive(Debug, Clone, Default)]
pub struct M4Info {
    pub presentation_url: String,
    pub audio_track: AudioTrack,
    pub video_track: VideoTrack,
}

/// Parse the M4 SET_PARAMETER body into url and track descriptors.
#[must_use]
pub fn parse_m4(request: &RtspRequest) -> M4Info {
    let mut info = M4Info::default();
    for (name, value) in split_parameters(&request.body) {
        match name.as_str() {
            WFD_PARAM_PRESENTATION_URL => {
                // "rtsp://.../streamid=0 none": only the first url matters.
                info.presentation_url = value
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
            }
            WFD_PARAM_VIDEO_FORMATS => info.video_track = parse_video_formats(&value),
            WFD_PARAM_AUDIO_CODECS => info.audio_track = parse_audio_codecs(&value),
            _ => {}
        }
    }
    info
}

/// CEA resolution table entries this sink recognises (bit -> mode).
const CEA_MODES: &[(u32, u32, u32, u32)] = &[
    (0, 640, 480, 60),
    (1, 720, 480, 60),
    (2, 720, 480, 60),
    (3, 720, 576, 50),
    (4, 720, 576, 50),
    (5, 1280, 720, 30),
    (6, 1280, 720, 60),
    (7, 1920, 1080, 30),
    (8, 1920, 1080, 60),
    (16, 1920, 1080, 24),
];

/// `wfd_video_formats: native profile level CEA VESA HH ...` - pick the
/// highest CEA mode the source selected.
fn parse_video_formats(value: &str) -> VideoTrack {
    let mut track = VideoTrack {
        codec_id: CodecId::H264,
        width: 1920,
        height: 1080,
        frame_rate: 30,
    };
    let fields: Vec<&str> = value.split_whitespace().collect();
    // native(1) preferred(1) profile(1) level(1) cea(4) ...
    if let Some(cea) = fields.get(4).and_then(|v| u32::from_str_radix(v, 16).ok()) {
        for (bit, width, height, frame_rate) in CEA_MODES.iter().rev() {
            if cea & (1 << bit) != 0 {
                track.width = *width;
                track.height = *height;
                track.frame_rate = *frame_rate;
                break;
            }
        }
    }
    track
}

/// `wfd_audio_codecs: LPCM 00000002 00` (first entry is the selection).
fn parse_audio_codecs(value: &str) -> AudioTrack {
    let selected = value.split(',').next().unwrap_or_default();
    let mut fields = selected.split_whitespace();
    let codec_name = fields.next().unwrap_or_default();
    let modes = fields
        .next()
        .and_then(|v| u32::from_str_radix(v, 16).ok())
        .unwrap_or(0);

    match codec_name {
        "LPCM" => AudioTrack {
            codec_id: CodecId::PcmS16be,
            // mode bit 0: 44.1 kHz, bit 1: 48 kHz; both 16-bit stereo.
            sample_rate: if modes & 0x1 != 0 { 44_100 } else { 48_000 },
            channels: 2,
            sample_bit: 16,
        },
        "AAC" => AudioTrack {
            codec_id: CodecId::Aac,
            sample_rate: 48_000,
            channels: if modes & 0x4 != 0 { 6 } else { 2 },
            sample_bit: 16,
        },
        _ => AudioTrack::default(),
    }
}

/// M6: SETUP with our RTP port in the transport line.
#[must_use]
pub fn m6_request(cseq: u32, url: &str, local_rtp_port: u16) -> RtspRequest {
    let mut request = RtspRequest::new(RTSP_METHOD_SETUP, url, cseq);
    request.add_header(
        "Transport",
        &format!("RTP/AVP/UDP;unicast;client_port={local_rtp_port}"),
    );
    request
}

/// M7: PLAY.
#[must_use]
pub fn m7_request(cseq: u32, url: &str, session: &str) -> RtspRequest {
    let mut request = RtspRequest::new(RTSP_METHOD_PLAY, url, cseq);
    if !session.is_empty() {
        request.add_header("Session", session);
    }
    request
}

/// M8: TEARDOWN.
#[must_use]
pub fn m8_request(cseq: u32, url: &str, session: &str) -> RtspRequest {
    let mut request = RtspRequest::new(RTSP_METHOD_TEARDOWN, url, cseq);
    if !session.is_empty() {
        request.add_header("Session", session);
    }
    request
}

/// IDR refresh request carried over SET_PARAMETER.
#[must_use]
pub fn idr_request(cseq: u32, url: &str, session: &str) -> RtspRequest {
    let mut request = RtspRequest::new(RTSP_METHOD_SET_PARAMETER, url, cseq);
    if !session.is_empty() {
        request.add_header("Session", session);
    }
    request.add_body_line(&format!("{WFD_PARAM_IDR_REQUEST}: "));
    request
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn m3_answers_only_requested_parameters() {
        let requested = vec![
            WFD_PARAM_VIDEO_FORMATS.to_string(),
            WFD_PARAM_AUDIO_CODECS.to_string(),
            WFD_PARAM_RTP_PORTS.to_string(),
        ];
        let response = m3_response(2, &requested, &WfdParamsInfo::default(), 9988);

        assert_eq!(response.body.len(), 3);
        assert!(response.body[0].starts_with("wfd_video_formats: "));
        assert!(response.body[1].starts_with("wfd_audio_codecs: "));
        assert_eq!(
            response.body[2],
            "wfd_client_rtp_ports: RTP/AVP/UDP;unicast 9988 0 mode=play"
        );
        // Parameters absent from the request must not appear.
        assert!(!response
            .body
            .iter()
            .any(|line| line.starts_with(WFD_PARAM_CONTENT_PROTECTION)));
    }

    #[test]
    fn m3_answers_vendor_parameters_from_the_table() {
        let mut params = WfdParamsInfo::default();
        params
            .vendor_params
            .push(("hwe_vtp".to_string(), "1".to_string()));
        let requested = vec!["hwe_vtp".to_string(), "hwe_unknown".to_string()];
        let response = m3_response(2, &requested, &params, 0);
        assert_eq!(response.body, vec!["hwe_vtp: 1", "hwe_unknown: none"]);
    }

    #[test]
    fn m4_yields_url_and_tracks() {
        let mut request = RtspRequest::new(RTSP_METHOD_SET_PARAMETER, "rtsp://x", 4);
        request.add_body_line(
            "wfd_presentation_URL: rtsp://192.0.2.1/wfd1.0/streamid=0 none",
        );
        request.add_body_line(
            "wfd_video_formats: 00 00 02 04 00000100 00000000 00000000 00 0000 0000 11 none none",
        );
        request.add_body_line("wfd_audio_codecs: LPCM 00000002 00");

        let info = parse_m4(&request);
        assert_eq!(info.presentation_url, "rtsp://192.0.2.1/wfd1.0/streamid=0");
        assert_eq!(info.video_track.codec_id, CodecId::H264);
        assert_eq!(
            (info.video_track.width, info.video_track.height, info.video_track.frame_rate),
            (1920, 1080, 60)
        );
        assert_eq!(info.audio_track.codec_id, CodecId::PcmS16be);
        assert_eq!(info.audio_track.sample_rate, 48_000);
    }

    #[test]
    fn aac_selection_parses_channel_count() {
        let track = parse_audio_codecs("AAC 00000004 00");
        assert_eq!(track.codec_id, CodecId::Aac);
        assert_eq!(track.channels, 6);
    }

    #[test]
    fn idr_request_body_is_the_bare_parameter() {
        let request = idr_request(9, "rtsp://x/wfd1.0/streamid=0", "sess");
        assert_eq!(request.body, vec!["wfd_idr_request: "]);
        assert!(request.stringify().contains("wfd_idr_request: \r\n"));
    }

    #[test]
    fn m1_response_lists_the_mandatory_methods() {
        let response = m1_response(0);
        let methods = response.public_methods().expect("public");
        for method in [
            RTSP_METHOD_WFD,
            RTSP_METHOD_SET_PARAMETER,
            RTSP_METHOD_GET_PARAMETER,
            RTSP_METHOD_SETUP,
            RTSP_METHOD_PLAY,
            RTSP_METHOD_TEARDOWN,
        ] {
            assert!(methods.contains(method), "missing {method}");
        }
    }
}
