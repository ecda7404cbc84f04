//! WFD sink session: the client-side RTSP dialect driving the M1..M8
//! handshake, the keep-alive loop and the IDR/teardown paths over one TCP
//! connection, with retry and timeout discipline.
//!
//! All socket and timer callbacks funnel into `SessionCore`; pending
//! responses are boxed continuations keyed by CSeq, consumed exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::event::{
    self, AgentEvent, AgentEventKind, ConsumerInit, ErrorCode, EventMsg, ModuleTag, ProsumerKind,
};
use crate::log::log_sink::LogSink;
use crate::media::{AudioTrack, VideoTrack};
use crate::rtsp::wfd::{self, WfdParamsInfo, WFD_PARAM_TRIGGER};
use crate::rtsp::{
    message::split_parameters, RtspParseError, RtspRequest, RtspResponse,
    RTSP_METHOD_GET_PARAMETER, RTSP_METHOD_OPTIONS, RTSP_METHOD_PLAY, RTSP_METHOD_SETUP,
    RTSP_METHOD_SET_PARAMETER, RTSP_METHOD_TEARDOWN, RTSP_METHOD_WFD, RTSP_STATUS_OK,
    RTSP_VERSION,
};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

use super::tcp_client::{TcpClient, TcpClientObserver};
use super::timeout_timer::TimeoutTimer;

pub const DEFAULT_WFD_CTRL_PORT: u16 = 7236;

const WFD_TIMEOUT_5_SECOND: Duration = Duration::from_secs(5);
const WFD_TIMEOUT_6_SECOND: Duration = Duration::from_secs(6);
const WFD_KEEP_ALIVE_TIMEOUT_MIN: u32 = 10;
const WFD_KEEP_ALIVE_TIMEOUT_DEFAULT: u32 = 60;
const CONNECT_RETRY_COUNT: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Session parameters handed in by the service layer after P2P discovery.
#[derive(Debug, Clone, Default)]
pub struct WfdSessionConfig {
    pub remote_mac: String,
    pub remote_ip: String,
    /// 0 means the WFD default control port.
    pub remote_port: u16,
    pub local_ip: String,
    pub local_rtp_port: u16,
    pub wfd_params: WfdParamsInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WfdSessionState {
    Init,
    Ready,
    Playing,
    Stopping,
}

type ResponseHandler = Box<dyn FnOnce(&SessionCore, &RtspResponse) + Send>;

struct Inner {
    wfd_state: WfdSessionState,
    cseq: u32,
    rtsp_url: String,
    rtsp_session: String,
    keep_alive_timeout: u32,
    last_message: String,
    is_first_cast: bool,
    is_first_create_prosumer: bool,
    is_pc_source: bool,
    audio_track: AudioTrack,
    video_track: VideoTrack,
    response_handlers: HashMap<u32, ResponseHandler>,
}

pub(crate) struct SessionCore {
    id: u32,
    /// Non-owning handle to ourselves for timer callbacks.
    weak_self: Weak<SessionCore>,
    logger: Arc<dyn LogSink>,
    agent_tx: Sender<AgentEvent>,
    config: WfdSessionConfig,
    client: Mutex<Option<TcpClient>>,
    inner: Mutex<Inner>,
    connected: AtomicBool,
    interrupting: AtomicBool,
    interrupt_notified: AtomicBool,
    timeout_timer: TimeoutTimer,
    keep_alive_timer: Mutex<Option<TimeoutTimer>>,
}

impl SessionCore {
    fn emit(&self, error_code: ErrorCode, kind: AgentEventKind) {
        let msg = EventMsg::new(self.id, ModuleTag::Agent, ModuleTag::Context)
            .with_error(error_code);
        let _ = self.agent_tx.send(AgentEvent::new(msg, kind));
    }

    /// Interrupt semantics override error reporting.
    fn notify_service_error(&self, error_code: ErrorCode) {
        if self.interrupting.load(Ordering::Acquire) {
            self.notify_interrupted();
            return;
        }
        self.emit(error_code, AgentEventKind::SessionError);
    }

    /// Fires `SessionInterrupted` exactly once.
    fn notify_interrupted(&self) {
        if !self.interrupt_notified.swap(true, Ordering::AcqRel) {
            sink_error!(self.logger, "[WfdSinkSession] session {} interrupted", self.id);
            self.emit(ErrorCode::Ok, AgentEventKind::SessionInterrupted);
        }
    }

    fn send_raw(&self, data: &str) -> bool {
        let Ok(client) = self.client.lock() else {
            return false;
        };
        match client.as_ref() {
            Some(client) => client.send(data.as_bytes()),
            None => false,
        }
    }

    fn send_common_response(&self, cseq: u32) -> bool {
        let response = RtspResponse::new(cseq, RTSP_STATUS_OK);
        sink_info!(
            self.logger,
            "[WfdSinkSession] session {} send common response, cseq: {cseq}",
            self.id
        );
        let ok = self.send_raw(&response.stringify());
        if !ok {
            sink_error!(self.logger, "[WfdSinkSession] failed to send common response");
        }
        ok
    }

    /// Allocate a CSeq, register the continuation, arm the timer and send.
    fn send_request(
        &self,
        build: impl FnOnce(u32) -> RtspRequest,
        handler: ResponseHandler,
        timer: Option<(Duration, &str)>,
    ) -> bool {
        let cseq = {
            let Ok(mut inner) = self.inner.lock() else {
                return false;
            };
            inner.cseq += 1;
            let cseq = inner.cseq;
            inner.response_handlers.insert(cseq, handler);
            cseq
        };

        if let Some((timeout, info)) = timer {
            self.timeout_timer.start_timer(timeout, info);
        }

        let request = build(cseq);
        sink_info!(
            self.logger,
            "[WfdSinkSession] session {} send {} request, cseq: {cseq}",
            self.id,
            request.method
        );
        if !self.send_raw(&request.stringify()) {
            sink_error!(
                self.logger,
                "[WfdSinkSession] failed to send {} request, cseq: {cseq}",
                request.method
            );
            if let Ok(mut inner) = self.inner.lock() {
                inner.response_handlers.remove(&cseq);
            }
            self.timeout_timer.stop_timer();
            self.notify_service_error(ErrorCode::InteractionFailure);
            return false;
        }
        true
    }

    // ---- incoming framing --------------------------------------------------

    fn process_incoming(&self, chunk: &str) {
        let mut text = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            let mut text = std::mem::take(&mut inner.last_message);
            text.push_str(chunk);
            text
        };

        while !text.is_empty() {
            if text.starts_with(RTSP_VERSION) {
                match RtspResponse::parse(&text) {
                    Ok((response, consumed)) => {
                        self.dispatch_response(&response);
                        text.drain(..consumed);
                    }
                    Err(RtspParseError::Incomplete) => {
                        if let Ok(mut inner) = self.inner.lock() {
                            inner.last_message = text;
                        }
                        return;
                    }
                    Err(RtspParseError::Invalid(why)) => {
                        sink_warn!(self.logger, "[WfdSinkSession] invalid response: {why}");
                        return;
                    }
                }
            } else {
                match RtspRequest::parse(&text) {
                    Ok((request, consumed)) => {
                        self.handle_request(&request);
                        text.drain(..consumed);
                    }
                    Err(RtspParseError::Incomplete) => {
                        if let Ok(mut inner) = self.inner.lock() {
                            inner.last_message = text;
                        }
                        return;
                    }
                    Err(RtspParseError::Invalid(why)) => {
                        sink_warn!(self.logger, "[WfdSinkSession] invalid message: {why}");
                        return;
                    }
                }
            }
        }
    }

    fn dispatch_response(&self, response: &RtspResponse) {
        let cseq = response.cseq();
        let handler = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            inner.response_handlers.remove(&cseq)
        };
        match handler {
            Some(handler) => handler(self, response),
            None => {
                sink_error!(
                    self.logger,
                    "[WfdSinkSession] no response handler for cseq {cseq}"
                );
            }
        }
    }

    // ---- request handling --------------------------------------------------

    fn handle_request(&self, request: &RtspRequest) {
        let cseq = request.cseq();
        match request.method.as_str() {
            RTSP_METHOD_OPTIONS => self.handle_m1(cseq),
            RTSP_METHOD_GET_PARAMETER => {
                if request.body.is_empty() {
                    self.handle_keep_alive(cseq);
                } else {
                    self.handle_m3(cseq, &request.body);
                }
            }
            RTSP_METHOD_SET_PARAMETER => self.handle_set_parameter(request),
            method => {
                sink_error!(
                    self.logger,
                    "[WfdSinkSession] unexpected request method {method}"
                );
            }
        }
    }

    fn handle_m1(&self, cseq: u32) {
        sink_debug!(self.logger, "[WfdSinkSession] handle M1 request");
        self.timeout_timer.stop_timer();
        if let Ok(mut inner) = self.inner.lock() {
            inner.is_first_cast = true;
            inner.is_first_create_prosumer = true;
            inner.cseq = cseq;
        }

        let response = wfd::m1_response(cseq);
        if !self.send_raw(&response.stringify()) {
            sink_error!(self.logger, "[WfdSinkSession] failed to send M1 response");
            return;
        }
        self.send_m2();
    }

    fn send_m2(&self) {
        self.send_request(
            wfd::m2_request,
            Box::new(|core, response| core.handle_m2_response(response)),
            Some((WFD_TIMEOUT_5_SECOND, "Waiting for M2/OPTIONS response")),
        );
    }

    fn handle_m3(&self, cseq: u32, requested: &[String]) {
        sink_debug!(self.logger, "[WfdSinkSession] handle M3 request");
        self.timeout_timer.stop_timer();
        let response = wfd::m3_response(
            cseq,
            requested,
            &self.config.wfd_params,
            self.config.local_rtp_port,
        );
        if !self.send_raw(&response.stringify()) {
            sink_error!(self.logger, "[WfdSinkSession] failed to send M3 response");
            self.notify_service_error(ErrorCode::InteractionFailure);
            return;
        }
        self.timeout_timer
            .start_timer(WFD_TIMEOUT_6_SECOND, "Waiting for M4/SET_PARAMETER request");
    }

    fn handle_keep_alive(&self, cseq: u32) {
        sink_debug!(self.logger, "[WfdSinkSession] handle M16/keep-alive request");
        let timeout = {
            let Ok(timer) = self.keep_alive_timer.lock() else {
                return;
            };
            if timer.is_none() {
                return;
            }
            if let Some(timer) = timer.as_ref() {
                timer.stop_timer();
            }
            self.inner
                .lock()
                .map(|inner| inner.keep_alive_timeout)
                .unwrap_or(WFD_KEEP_ALIVE_TIMEOUT_DEFAULT)
        };

        self.send_common_response(cseq);

        if let Ok(timer) = self.keep_alive_timer.lock() {
            if let Some(timer) = timer.as_ref() {
                timer.start_timer(
                    Duration::from_secs(u64::from(timeout)),
                    "Waiting for WFD source M16/GET_PARAMETER KeepAlive request",
                );
            }
        }
    }

    fn handle_set_parameter(&self, request: &RtspRequest) {
        let cseq = request.cseq();
        let params = split_parameters(&request.body);
        if params.is_empty() {
            sink_error!(
                self.logger,
                "[WfdSinkSession] SET_PARAMETER request without body"
            );
            return;
        }

        if let Some((_, method)) = params.iter().find(|(name, _)| name == WFD_PARAM_TRIGGER) {
            self.handle_trigger_method(cseq, method);
            return;
        }
        self.handle_m4(request);
    }

    fn handle_trigger_method(&self, cseq: u32, method: &str) {
        match method {
            RTSP_METHOD_SETUP => {
                // M5 request.
                self.timeout_timer.stop_timer();
                if !self.send_common_response(cseq) {
                    self.notify_service_error(ErrorCode::InteractionFailure);
                    return;
                }
                self.send_m6();
            }
            RTSP_METHOD_TEARDOWN => {
                sink_warn!(self.logger, "[WfdSinkSession] source triggered teardown");
                if !self.send_common_response(cseq) {
                    self.notify_service_error(ErrorCode::InteractionFailure);
                    return;
                }
                self.send_m8();
            }
            other => {
                sink_error!(
                    self.logger,
                    "[WfdSinkSession] ignore unsupported triggered method '{other}'"
                );
            }
        }
    }

    fn handle_m4(&self, request: &RtspRequest) {
        sink_debug!(self.logger, "[WfdSinkSession] handle M4 request");
        self.timeout_timer.stop_timer();

        let info = wfd::parse_m4(request);
        let (was_first_cast, notify_create) = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if !info.presentation_url.is_empty() {
                inner.rtsp_url = info.presentation_url.clone();
            }
            if info.audio_track.codec_id != crate::media::CodecId::None {
                inner.audio_track = info.audio_track;
            }
            if info.video_track.codec_id != crate::media::CodecId::None {
                inner.video_track = info.video_track;
            }
            let was_first_cast = inner.is_first_cast;
            let notify_create = inner.is_first_create_prosumer;
            inner.is_first_cast = false;
            inner.is_first_create_prosumer = false;
            (was_first_cast, notify_create)
        };

        if was_first_cast {
            self.timeout_timer.start_timer(
                WFD_TIMEOUT_6_SECOND,
                "Waiting for M5/SET_PARAMETER Trigger request",
            );
        }
        if !self.send_common_response(request.cseq()) {
            self.timeout_timer.stop_timer();
            self.notify_service_error(ErrorCode::InteractionFailure);
            return;
        }
        if notify_create {
            self.emit(
                ErrorCode::Ok,
                AgentEventKind::CreateConsumer {
                    kind: ProsumerKind::WfdRtpConsumer,
                },
            );
        }
    }

    // ---- response handling -------------------------------------------------

    fn handle_m2_response(&self, response: &RtspResponse) {
        self.timeout_timer.stop_timer();
        self.timeout_timer
            .start_timer(WFD_TIMEOUT_6_SECOND, "Waiting for M3/GET_PARAMETER request");

        if response.status != RTSP_STATUS_OK {
            sink_error!(
                self.logger,
                "[WfdSinkSession] source failed the OPTIONS method"
            );
            self.notify_service_error(ErrorCode::InteractionFailure);
            return;
        }

        let publics = response.public_methods().unwrap_or("");
        let all_supported = [
            RTSP_METHOD_WFD,
            RTSP_METHOD_SET_PARAMETER,
            RTSP_METHOD_GET_PARAMETER,
            RTSP_METHOD_SETUP,
            RTSP_METHOD_PLAY,
            RTSP_METHOD_TEARDOWN,
        ]
        .iter()
        .all(|method| publics.contains(method));
        if !all_supported {
            sink_error!(
                self.logger,
                "[WfdSinkSession] source does not support all methods"
            );
            self.notify_service_error(ErrorCode::InteractionFailure);
        }

        if response
            .server()
            .is_some_and(|server| server.contains(wfd::WFD_PC_SOURCE_SERVER))
        {
            sink_info!(self.logger, "[WfdSinkSession] source is a PC");
            if let Ok(mut inner) = self.inner.lock() {
                inner.is_pc_source = true;
            }
            self.emit(ErrorCode::Ok, AgentEventKind::NotifyIsPcSource);
        }
    }

    fn send_m6(&self) {
        let url = self
            .inner
            .lock()
            .map(|inner| inner.rtsp_url.clone())
            .unwrap_or_default();
        let port = self.config.local_rtp_port;
        let sent = self.send_request(
            move |cseq| wfd::m6_request(cseq, &url, port),
            Box::new(|core, response| core.handle_m6_response(response)),
            Some((WFD_TIMEOUT_5_SECOND, "Waiting for M6/SETUP response")),
        );
        if sent {
            if let Ok(mut inner) = self.inner.lock() {
                inner.wfd_state = WfdSessionState::Ready;
            }
        }
    }

    fn handle_m6_response(&self, response: &RtspResponse) {
        self.timeout_timer.stop_timer();
        if response.status != RTSP_STATUS_OK {
            sink_error!(self.logger, "[WfdSinkSession] source failed the SETUP method");
            self.notify_service_error(ErrorCode::InteractionFailure);
            return;
        }

        if let Some((session_id, timeout)) = response.session() {
            if let Ok(mut inner) = self.inner.lock() {
                inner.rtsp_session = session_id;
                let timeout = timeout.unwrap_or(0);
                inner.keep_alive_timeout = if timeout < WFD_KEEP_ALIVE_TIMEOUT_MIN {
                    WFD_KEEP_ALIVE_TIMEOUT_DEFAULT
                } else {
                    timeout
                };
            }
        }
        self.send_m7();
    }

    fn send_m7(&self) {
        let (url, session) = {
            let Ok(inner) = self.inner.lock() else { return };
            (inner.rtsp_url.clone(), inner.rtsp_session.clone())
        };
        self.send_request(
            move |cseq| wfd::m7_request(cseq, &url, &session),
            Box::new(|core, response| core.handle_m7_response(response)),
            Some((WFD_TIMEOUT_5_SECOND, "Waiting for M7/PLAY response")),
        );
    }

    fn handle_m7_response(&self, response: &RtspResponse) {
        self.timeout_timer.stop_timer();
        if response.status != RTSP_STATUS_OK {
            sink_error!(self.logger, "[WfdSinkSession] source failed the PLAY method");
            self.notify_service_error(ErrorCode::InteractionFailure);
            return;
        }

        self.emit(ErrorCode::Ok, AgentEventKind::RtspPlayed);
        let keep_alive_timeout = {
            let Ok(mut inner) = self.inner.lock() else { return };
            inner.wfd_state = WfdSessionState::Playing;
            inner.keep_alive_timeout
        };
        sink_info!(
            self.logger,
            "[WfdSinkSession] RTSP PLAY ok, start receiving the stream"
        );

        // The handshake is complete; later expiries mean the link died.
        let weak = self.weak_self.clone();
        self.timeout_timer.set_timeout_callback(Box::new(move || {
            if let Some(core) = weak.upgrade() {
                core.notify_service_error(ErrorCode::NetworkError);
            }
        }));

        let keep_alive = TimeoutTimer::new(Arc::clone(&self.logger));
        let weak = self.weak_self.clone();
        let logger = Arc::clone(&self.logger);
        keep_alive.set_timeout_callback(Box::new(move || {
            sink_error!(logger, "[WfdSinkSession] RTSP keep-alive timeout");
            if let Some(core) = weak.upgrade() {
                core.notify_service_error(ErrorCode::NetworkError);
            }
        }));
        keep_alive.start_timer(
            Duration::from_secs(u64::from(keep_alive_timeout)),
            "Waiting for WFD source M16/GET_PARAMETER KeepAlive request",
        );
        if let Ok(mut slot) = self.keep_alive_timer.lock() {
            *slot = Some(keep_alive);
        }
    }

    fn send_m8(&self) -> bool {
        {
            let Ok(mut inner) = self.inner.lock() else {
                return false;
            };
            if inner.wfd_state == WfdSessionState::Stopping {
                sink_info!(self.logger, "[WfdSinkSession] M8 already sent");
                return true;
            }
            inner.wfd_state = WfdSessionState::Stopping;
        }
        if !self.connected.load(Ordering::Acquire) {
            sink_warn!(self.logger, "[WfdSinkSession] client gone, skip M8");
            return false;
        }

        let (url, session) = {
            let Ok(inner) = self.inner.lock() else {
                return false;
            };
            (inner.rtsp_url.clone(), inner.rtsp_session.clone())
        };
        self.send_request(
            move |cseq| wfd::m8_request(cseq, &url, &session),
            Box::new(|core, response| core.handle_m8_response(response)),
            None,
        )
    }

    fn handle_m8_response(&self, response: &RtspResponse) {
        if response.status != RTSP_STATUS_OK {
            sink_error!(
                self.logger,
                "[WfdSinkSession] source failed the TEARDOWN method"
            );
            self.notify_service_error(ErrorCode::InteractionFailure);
            return;
        }
        sink_info!(
            self.logger,
            "[WfdSinkSession] RTSP TEARDOWN ok, stop receiving"
        );
        self.emit(ErrorCode::Ok, AgentEventKind::RtspTeardown);
    }

    fn send_idr_request(&self) -> bool {
        {
            let Ok(inner) = self.inner.lock() else {
                return false;
            };
            if inner.wfd_state != WfdSessionState::Playing {
                return false;
            }
        }
        let (url, session) = {
            let Ok(inner) = self.inner.lock() else {
                return false;
            };
            (inner.rtsp_url.clone(), inner.rtsp_session.clone())
        };
        self.send_request(
            move |cseq| wfd::idr_request(cseq, &url, &session),
            Box::new(|core, response| {
                core.timeout_timer.stop_timer();
                // A failing IDR answer is logged only; no retry.
                if response.status != RTSP_STATUS_OK {
                    sink_error!(
                        core.logger,
                        "[WfdSinkSession] idr request answered {}",
                        response.status
                    );
                }
            }),
            Some((
                WFD_TIMEOUT_6_SECOND,
                "Waiting for WFD SET_PARAMETER/wfd_idr_request response",
            )),
        )
    }

    fn notify_consumer_init(&self) {
        let (audio_track, video_track, is_pc_source) = {
            let Ok(inner) = self.inner.lock() else { return };
            (inner.audio_track, inner.video_track, inner.is_pc_source)
        };
        let init = ConsumerInit {
            local_ip: self.config.local_ip.clone(),
            local_rtp_port: self.config.local_rtp_port,
            audio_track,
            video_track,
            is_pc_source,
        };
        let msg = EventMsg::new(self.id, ModuleTag::Agent, ModuleTag::MediaChannel);
        let _ = self
            .agent_tx
            .send(AgentEvent::new(msg, AgentEventKind::ConsumerInitInfo(init)));
    }
}

/// Socket callbacks hold the core through a non-owning handle; a session
/// torn down mid-read simply sees the upgrade fail.
struct ClientObserver {
    core: Weak<SessionCore>,
}

impl TcpClientObserver for ClientObserver {
    fn on_read(&self, data: &[u8]) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if core.interrupting.load(Ordering::Acquire) {
            core.notify_interrupted();
            return;
        }
        let text = String::from_utf8_lossy(data).into_owned();
        sink_debug!(core.logger, "[WfdSinkSession] recv:\n{text}");
        core.process_incoming(&text);
    }

    fn on_close(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        sink_debug!(core.logger, "[WfdSinkSession] RTSP TCP client closed");
        if core.interrupting.load(Ordering::Acquire) {
            core.notify_interrupted();
            return;
        }
        let state = core
            .inner
            .lock()
            .map(|inner| inner.wfd_state)
            .unwrap_or(WfdSessionState::Stopping);
        if state < WfdSessionState::Stopping {
            core.notify_service_error(ErrorCode::NetworkError);
        }
    }
}

/// Public facade owning the session core.
pub struct WfdSinkSession {
    core: Arc<SessionCore>,
}

impl WfdSinkSession {
    pub fn new(
        config: WfdSessionConfig,
        logger: Arc<dyn LogSink>,
        agent_tx: Sender<AgentEvent>,
    ) -> Self {
        let id = event::next_id();
        sink_info!(logger, "[WfdSinkSession] sessionId: {id}");
        let core = Arc::new_cyclic(|weak_self| SessionCore {
            id,
            weak_self: weak_self.clone(),
            logger: Arc::clone(&logger),
            agent_tx,
            config,
            client: Mutex::new(None),
            inner: Mutex::new(Inner {
                wfd_state: WfdSessionState::Init,
                cseq: 0,
                rtsp_url: String::new(),
                rtsp_session: String::new(),
                keep_alive_timeout: 0,
                last_message: String::new(),
                is_first_cast: true,
                is_first_create_prosumer: true,
                is_pc_source: false,
                audio_track: AudioTrack::default(),
                video_track: VideoTrack::default(),
                response_handlers: HashMap::new(),
            }),
            connected: AtomicBool::new(false),
            interrupting: AtomicBool::new(false),
            interrupt_notified: AtomicBool::new(false),
            timeout_timer: TimeoutTimer::new(logger),
            keep_alive_timer: Mutex::new(None),
        });
        Self { core }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.core.id
    }

    #[must_use]
    pub fn state(&self) -> WfdSessionState {
        self.core
            .inner
            .lock()
            .map(|inner| inner.wfd_state)
            .unwrap_or(WfdSessionState::Init)
    }

    #[must_use]
    pub fn is_pc_source(&self) -> bool {
        self.core
            .inner
            .lock()
            .map(|inner| inner.is_pc_source)
            .unwrap_or(false)
    }

    /// Connect to the source's RTSP server and start the handshake clock.
    /// Retries the TCP connect before giving up; a session interrupt during
    /// the retry loop wins over the connection error.
    pub fn start(&self) -> bool {
        let core = &self.core;
        let port = if core.config.remote_port == 0 {
            DEFAULT_WFD_CTRL_PORT
        } else {
            core.config.remote_port
        };

        let mut client = None;
        for attempt in 0..=CONNECT_RETRY_COUNT {
            if core.interrupting.load(Ordering::Acquire) {
                core.notify_interrupted();
                return false;
            }
            if attempt > 0 {
                thread::sleep(CONNECT_RETRY_DELAY);
            }
            match TcpClient::connect(&core.config.remote_ip, port, Arc::clone(&core.logger)) {
                Ok(connected) => {
                    if attempt > 0 {
                        sink_warn!(
                            core.logger,
                            "[WfdSinkSession] reconnected after {attempt} retries"
                        );
                    }
                    client = Some(connected);
                    break;
                }
                Err(e) => {
                    sink_error!(
                        core.logger,
                        "[WfdSinkSession] failed to connect rtsp server {}:{port}: {e}",
                        core.config.remote_ip
                    );
                }
            }
        }

        let Some(mut client) = client else {
            core.notify_service_error(ErrorCode::ConnectionFailure);
            return false;
        };

        let observer: Arc<dyn TcpClientObserver> = Arc::new(ClientObserver {
            core: Arc::downgrade(core),
        });
        if client.start(observer).is_err() {
            core.notify_service_error(ErrorCode::ConnectionFailure);
            return false;
        }
        if let Ok(mut slot) = core.client.lock() {
            *slot = Some(client);
        }
        core.connected.store(true, Ordering::Release);

        let weak = Arc::downgrade(core);
        core.timeout_timer.set_timeout_callback(Box::new(move || {
            if let Some(core) = weak.upgrade() {
                core.notify_service_error(ErrorCode::ProtocolInteractionTimeout);
            }
        }));
        core.timeout_timer.start_timer(
            WFD_TIMEOUT_6_SECOND,
            "Waiting for WFD source M1/OPTIONS request",
        );
        true
    }

    /// User-initiated teardown: send M8 and mark the session stopping.
    pub fn teardown(&self) {
        self.core.send_m8();
        self.core.connected.store(false, Ordering::Release);
    }

    /// Preempts retries and pending waits; the first check notifies once.
    pub fn interrupt(&self) {
        self.core.interrupting.store(true, Ordering::Release);
    }

    pub fn request_idr(&self) {
        self.core.send_idr_request();
    }

    /// React to media-side agent events routed back by the service layer.
    pub fn on_media_event(&self, event: &AgentEvent) {
        let core = &self.core;
        if core.interrupting.load(Ordering::Acquire) {
            core.notify_interrupted();
            return;
        }
        match &event.kind {
            AgentEventKind::ProsumerCreated { .. } => {
                if event.msg.error_code.is_ok() {
                    core.notify_consumer_init();
                } else {
                    core.notify_service_error(ErrorCode::ProsumerCreate);
                }
            }
            AgentEventKind::ProsumerInit { .. } => {
                if event.msg.error_code.is_ok() {
                    core.emit(ErrorCode::Ok, AgentEventKind::SessionStarted);
                } else {
                    core.notify_service_error(ErrorCode::SessionStart);
                }
            }
            AgentEventKind::ProsumerResumed { .. }
            | AgentEventKind::KeymodeStop
            | AgentEventKind::RequestIdr => {
                core.send_idr_request();
            }
            AgentEventKind::WriteWarning => {
                core.notify_service_error(ErrorCode::IntakeTimeout);
            }
            _ => {}
        }
    }

    /// Disconnect and drop the timers.
    pub fn shutdown(&self) {
        self.core.connected.store(false, Ordering::Release);
        // Take the client out first: joining its read thread while holding
        // the slot would deadlock against a send in flight.
        let client = self
            .core
            .client
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(mut client) = client {
            client.disconnect();
        }
        if let Ok(mut slot) = self.core.keep_alive_timer.lock() {
            *slot = None;
        }
    }
}

impl Drop for WfdSinkSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
