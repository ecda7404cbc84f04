//! End-to-end session scenarios against a scripted source over localhost TCP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use castsink::event::{AgentEvent, AgentEventKind, ErrorCode};
use castsink::log::NoopLogSink;
use castsink::rtsp::{RtspParseError, RtspRequest, RtspResponse, RTSP_STATUS_OK, RTSP_VERSION};
use castsink::session::wfd_session::WfdSessionState;
use castsink::session::{WfdSessionConfig, WfdSinkSession};

const RECV_DEADLINE: Duration = Duration::from_secs(5);

enum Incoming {
    Request(RtspRequest),
    Response(RtspResponse),
}

/// Scripted WFD source half of the connection.
struct FakeSource {
    stream: TcpStream,
    stash: String,
}

impl FakeSource {
    fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().expect("source accept");
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("read timeout");
        Self {
            stream,
            stash: String::new(),
        }
    }

    fn send_raw(&mut self, data: &str) {
        self.stream.write_all(data.as_bytes()).expect("source send");
    }

    fn send_request(&mut self, request: &RtspRequest) {
        self.send_raw(&request.stringify());
    }

    fn send_response(&mut self, response: &RtspResponse) {
        self.send_raw(&response.stringify());
    }

    /// Read one complete RTSP message, tolerating fragments and splices.
    fn recv(&mut self) -> Incoming {
        let deadline = std::time::Instant::now() + RECV_DEADLINE;
        loop {
            if !self.stash.is_empty() {
                if self.stash.starts_with(RTSP_VERSION) {
                    match RtspResponse::parse(&self.stash) {
                        Ok((response, consumed)) => {
                            self.stash.drain(..consumed);
                            return Incoming::Response(response);
                        }
                        Err(RtspParseError::Incomplete) => {}
                        Err(e) => panic!("source got invalid response: {e}"),
                    }
                } else {
                    match RtspRequest::parse(&self.stash) {
                        Ok((request, consumed)) => {
                            self.stash.drain(..consumed);
                            return Incoming::Request(request);
                        }
                        Err(RtspParseError::Incomplete) => {}
                        Err(e) => panic!("source got invalid request: {e}"),
                    }
                }
            }

            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for a message; stash: {:?}",
                self.stash
            );
            let mut buf = [0u8; 2048];
            match self.stream.read(&mut buf) {
                Ok(0) => panic!("sink closed the connection"),
                Ok(n) => self.stash.push_str(&String::from_utf8_lossy(&buf[..n])),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => panic!("source read failed: {e}"),
            }
        }
    }

    fn recv_request(&mut self) -> RtspRequest {
        match self.recv() {
            Incoming::Request(request) => request,
            Incoming::Response(response) => panic!("expected request, got {response:?}"),
        }
    }

    fn recv_response(&mut self) -> RtspResponse {
        match self.recv() {
            Incoming::Response(response) => response,
            Incoming::Request(request) => panic!("expected response, got {request:?}"),
        }
    }
}

fn session_pair() -> (WfdSinkSession, Receiver<AgentEvent>, TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (tx, rx): (Sender<AgentEvent>, Receiver<AgentEvent>) = mpsc::channel();

    let config = WfdSessionConfig {
        remote_mac: "00:11:22:33:44:55".into(),
        remote_ip: "127.0.0.1".into(),
        remote_port: port,
        local_ip: "127.0.0.1".into(),
        local_rtp_port: 15550,
        wfd_params: Default::default(),
    };
    let session = WfdSinkSession::new(config, Arc::new(NoopLogSink), tx);
    (session, rx, listener, port)
}

fn expect_event(rx: &Receiver<AgentEvent>, want: fn(&AgentEventKind) -> bool) -> AgentEvent {
    let deadline = std::time::Instant::now() + RECV_DEADLINE;
    loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .unwrap_or_default();
        let event = rx.recv_timeout(remaining).expect("agent event");
        if want(&event.kind) {
            return event;
        }
    }
}

fn m2_ok(cseq: u32) -> RtspResponse {
    let mut response = RtspResponse::new(cseq, RTSP_STATUS_OK);
    response.add_header(
        "Public",
        "org.wfa.wfd1.0, SET_PARAMETER, GET_PARAMETER, SETUP, PLAY, TEARDOWN",
    );
    response
}

/// Drive the handshake up to PLAYING; returns the source and used CSeqs.
fn run_happy_handshake(source: &mut FakeSource, rx: &Receiver<AgentEvent>) -> Vec<u32> {
    let mut outbound_cseqs = Vec::new();

    // M1: the source probes our methods.
    source.send_request(&RtspRequest::new("OPTIONS", "*", 0));
    let m1_response = source.recv_response();
    assert_eq!(m1_response.status, RTSP_STATUS_OK);
    assert_eq!(m1_response.cseq(), 0);
    let public = m1_response.public_methods().expect("public header");
    assert!(public.contains("org.wfa.wfd1.0"));
    assert!(public.contains("SET_PARAMETER"));

    // M2: the sink probes back.
    let m2 = source.recv_request();
    assert_eq!(m2.method, "OPTIONS");
    outbound_cseqs.push(m2.cseq());
    source.send_response(&m2_ok(m2.cseq()));

    // M3: capability query.
    let mut m3 = RtspRequest::new("GET_PARAMETER", "rtsp://localhost/wfd1.0", 2);
    m3.add_body_line("wfd_video_formats");
    m3.add_body_line("wfd_audio_codecs");
    m3.add_body_line("wfd_client_rtp_ports");
    source.send_request(&m3);
    let m3_response = source.recv_response();
    assert_eq!(m3_response.status, RTSP_STATUS_OK);
    assert_eq!(m3_response.cseq(), 2);
    assert_eq!(m3_response.body.len(), 3);
    assert!(m3_response.body[2].contains("15550"));

    // M4: configuration.
    let mut m4 = RtspRequest::new("SET_PARAMETER", "rtsp://localhost/wfd1.0", 3);
    m4.add_body_line("wfd_presentation_URL: rtsp://192.0.2.1/wfd1.0/streamid=0 none");
    m4.add_body_line(
        "wfd_video_formats: 00 00 02 04 00000100 00000000 00000000 00 0000 0000 11 none none",
    );
    m4.add_body_line("wfd_audio_codecs: LPCM 00000002 00");
    source.send_request(&m4);
    assert_eq!(source.recv_response().cseq(), 3);
    expect_event(rx, |kind| matches!(kind, AgentEventKind::CreateConsumer { .. }));

    // M5: trigger SETUP.
    let mut m5 = RtspRequest::new("SET_PARAMETER", "rtsp://localhost/wfd1.0", 4);
    m5.add_body_line("wfd_trigger_method: SETUP");
    source.send_request(&m5);
    assert_eq!(source.recv_response().cseq(), 4);

    // M6: SETUP from the sink.
    let m6 = source.recv_request();
    assert_eq!(m6.method, "SETUP");
    assert_eq!(m6.url, "rtsp://192.0.2.1/wfd1.0/streamid=0");
    assert!(m6.header("Transport").expect("transport").contains("client_port=15550"));
    outbound_cseqs.push(m6.cseq());
    let mut setup_ok = RtspResponse::new(m6.cseq(), RTSP_STATUS_OK);
    setup_ok.add_header("Session", "12345678;timeout=60");
    source.send_response(&setup_ok);

    // M7: PLAY from the sink.
    let m7 = source.recv_request();
    assert_eq!(m7.method, "PLAY");
    assert_eq!(m7.session(), Some("12345678"));
    outbound_cseqs.push(m7.cseq());
    source.send_response(&RtspResponse::new(m7.cseq(), RTSP_STATUS_OK));

    expect_event(rx, |kind| matches!(kind, AgentEventKind::RtspPlayed));
    outbound_cseqs
}

#[test]
fn happy_path_handshake_reaches_playing() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);

    let cseqs = run_happy_handshake(&mut source, &rx);
    assert_eq!(session.state(), WfdSessionState::Playing);

    // Outbound CSeq is strictly monotonic.
    for pair in cseqs.windows(2) {
        assert!(pair[1] > pair[0], "cseqs not monotonic: {cseqs:?}");
    }

    session.shutdown();
}

#[test]
fn keep_alive_is_answered_and_timer_restarts() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);
    run_happy_handshake(&mut source, &rx);

    // M16 keep-alive: empty-body GET_PARAMETER answered with plain 200.
    source.send_request(&RtspRequest::new("GET_PARAMETER", "rtsp://localhost/wfd1.0", 9));
    let response = source.recv_response();
    assert_eq!(response.status, RTSP_STATUS_OK);
    assert_eq!(response.cseq(), 9);

    session.shutdown();
}

#[test]
fn idr_request_emits_one_set_parameter() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);
    run_happy_handshake(&mut source, &rx);

    session.request_idr();
    let request = source.recv_request();
    assert_eq!(request.method, "SET_PARAMETER");
    assert_eq!(request.body, vec!["wfd_idr_request: "]);
    source.send_response(&RtspResponse::new(request.cseq(), RTSP_STATUS_OK));

    // A 200 OK surfaces nothing.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    session.shutdown();
}

#[test]
fn teardown_sends_m8_and_reports_rtsp_teardown() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);
    run_happy_handshake(&mut source, &rx);

    session.teardown();
    let m8 = source.recv_request();
    assert_eq!(m8.method, "TEARDOWN");
    assert_eq!(m8.session(), Some("12345678"));
    source.send_response(&RtspResponse::new(m8.cseq(), RTSP_STATUS_OK));

    expect_event(&rx, |kind| matches!(kind, AgentEventKind::RtspTeardown));
    assert_eq!(session.state(), WfdSessionState::Stopping);

    // Repeated teardown does not emit a second M8.
    session.teardown();
    assert!(matches!(
        source.stream.read(&mut [0u8; 64]),
        Err(_) | Ok(0)
    ));
    session.shutdown();
}

#[test]
fn source_triggered_teardown_is_acknowledged_then_m8() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);
    run_happy_handshake(&mut source, &rx);

    let mut trigger = RtspRequest::new("SET_PARAMETER", "rtsp://localhost/wfd1.0", 11);
    trigger.add_body_line("wfd_trigger_method: TEARDOWN");
    source.send_request(&trigger);

    let ack = source.recv_response();
    assert_eq!(ack.cseq(), 11);
    let m8 = source.recv_request();
    assert_eq!(m8.method, "TEARDOWN");
    source.send_response(&RtspResponse::new(m8.cseq(), RTSP_STATUS_OK));
    expect_event(&rx, |kind| matches!(kind, AgentEventKind::RtspTeardown));

    session.shutdown();
}

#[test]
fn fragmented_m3_request_is_reassembled() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);

    source.send_request(&RtspRequest::new("OPTIONS", "*", 0));
    source.recv_response();
    let m2 = source.recv_request();
    source.send_response(&m2_ok(m2.cseq()));

    // Deliver M3 in two TCP segments, split inside a header line.
    let mut m3 = RtspRequest::new("GET_PARAMETER", "rtsp://localhost/wfd1.0", 2);
    m3.add_body_line("wfd_video_formats");
    let wire = m3.stringify();
    let (first, second) = wire.split_at(30);
    source.send_raw(first);
    thread::sleep(Duration::from_millis(100));
    source.send_raw(second);

    let response = source.recv_response();
    assert_eq!(response.cseq(), 2);
    assert_eq!(response.body.len(), 1);
    assert!(response.body[0].starts_with("wfd_video_formats: "));

    drop(rx);
    session.shutdown();
}

#[test]
fn pc_source_marker_is_detected_and_propagated() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);

    source.send_request(&RtspRequest::new("OPTIONS", "*", 0));
    source.recv_response();
    let m2 = source.recv_request();
    let mut response = m2_ok(m2.cseq());
    response.add_header("Server", "MSMiracastSource/1.0");
    source.send_response(&response);

    expect_event(&rx, |kind| matches!(kind, AgentEventKind::NotifyIsPcSource));
    assert!(session.is_pc_source());
    session.shutdown();
}

#[test]
fn interrupt_during_connect_retries_notifies_exactly_once() {
    // A port with nothing listening: connect fails immediately.
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let (tx, rx) = mpsc::channel();
    let config = WfdSessionConfig {
        remote_ip: "127.0.0.1".into(),
        remote_port: dead_port,
        local_ip: "127.0.0.1".into(),
        local_rtp_port: 15550,
        ..Default::default()
    };
    let session = Arc::new(WfdSinkSession::new(config, Arc::new(NoopLogSink), tx));

    let runner = Arc::clone(&session);
    let join = thread::spawn(move || runner.start());
    thread::sleep(Duration::from_millis(300));
    session.interrupt();

    assert!(!join.join().expect("join"));
    let event = rx.recv_timeout(RECV_DEADLINE).expect("interrupt event");
    assert!(matches!(event.kind, AgentEventKind::SessionInterrupted));
    // Exactly once, and no connection-failure error afterwards.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn connect_failure_surfaces_after_retries() {
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let (tx, rx) = mpsc::channel();
    let config = WfdSessionConfig {
        remote_ip: "127.0.0.1".into(),
        remote_port: dead_port,
        local_ip: "127.0.0.1".into(),
        local_rtp_port: 15550,
        ..Default::default()
    };
    let session = WfdSinkSession::new(config, Arc::new(NoopLogSink), tx);

    assert!(!session.start());
    let event = rx.recv_timeout(RECV_DEADLINE).expect("error event");
    assert!(matches!(event.kind, AgentEventKind::SessionError));
    assert_eq!(event.msg.error_code, ErrorCode::ConnectionFailure);
}

#[test]
fn withheld_keep_alive_raises_network_error() {
    let (session, rx, listener, _port) = session_pair();
    assert!(session.start());
    let mut source = FakeSource::accept(&listener);

    // Same handshake, but negotiate the minimum keep-alive interval.
    source.send_request(&RtspRequest::new("OPTIONS", "*", 0));
    source.recv_response();
    let m2 = source.recv_request();
    source.send_response(&m2_ok(m2.cseq()));

    let mut m3 = RtspRequest::new("GET_PARAMETER", "rtsp://localhost/wfd1.0", 2);
    m3.add_body_line("wfd_client_rtp_ports");
    source.send_request(&m3);
    source.recv_response();

    let mut m4 = RtspRequest::new("SET_PARAMETER", "rtsp://localhost/wfd1.0", 3);
    m4.add_body_line("wfd_presentation_URL: rtsp://192.0.2.1/wfd1.0/streamid=0 none");
    source.send_request(&m4);
    source.recv_response();
    expect_event(&rx, |kind| matches!(kind, AgentEventKind::CreateConsumer { .. }));

    let mut m5 = RtspRequest::new("SET_PARAMETER", "rtsp://localhost/wfd1.0", 4);
    m5.add_body_line("wfd_trigger_method: SETUP");
    source.send_request(&m5);
    source.recv_response();

    let m6 = source.recv_request();
    let mut setup_ok = RtspResponse::new(m6.cseq(), RTSP_STATUS_OK);
    setup_ok.add_header("Session", "12345678;timeout=10");
    source.send_response(&setup_ok);

    let m7 = source.recv_request();
    source.send_response(&RtspResponse::new(m7.cseq(), RTSP_STATUS_OK));
    expect_event(&rx, |kind| matches!(kind, AgentEventKind::RtspPlayed));

    // Withhold every M16: the negotiated 10 s keep-alive must expire.
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    let event = loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .unwrap_or_default();
        let event = rx.recv_timeout(remaining).expect("keep-alive expiry");
        if matches!(event.kind, AgentEventKind::SessionError) {
            break event;
        }
    };
    assert_eq!(event.msg.error_code, ErrorCode::NetworkError);
    session.shutdown();
}
