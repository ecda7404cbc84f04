//! Glue between the frame producer side (the RTP consumer), the dispatcher
//! and the playback controller. Serialises lifecycle through typed channel
//! events and translates prosumer outcomes into outward agent events.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::dispatch::{
    BufferDispatcher, DEFAULT_CAPACITY_INCREMENT, DEFAULT_MAX_CAPACITY, DEFAULT_WRITE_TIMEOUT,
};
use crate::event::{
    self, AgentEvent, AgentEventKind, ErrorCode, EventMsg, ModuleTag, ProsumerKind, INVALID_ID,
};
use crate::log::log_sink::LogSink;
use crate::playback::media_controller::ControllerNotify;
use crate::playback::MediaController;
use crate::{sink_error, sink_info, sink_warn};

use super::event::{ChannelEvent, ChannelEventKind};
use super::rtp_producer::RtpProducer;
use super::wfd_rtp_consumer::WfdRtpConsumer;

pub struct MediaChannel {
    id: u32,
    logger: Arc<dyn LogSink>,
    dispatcher: Arc<BufferDispatcher>,
    controller: Arc<MediaController>,
    consumer: Mutex<Option<Arc<WfdRtpConsumer>>>,
    producers: Mutex<HashMap<u32, Arc<RtpProducer>>>,
    agent_tx: Sender<AgentEvent>,
}

impl MediaChannel {
    pub fn new(config: &Config, logger: Arc<dyn LogSink>, agent_tx: Sender<AgentEvent>) -> Self {
        let id = event::next_id();
        let capacity = config.get_usize("dispatcher", "max_capacity", DEFAULT_MAX_CAPACITY);
        let increment = config.get_usize(
            "dispatcher",
            "capacity_increment",
            DEFAULT_CAPACITY_INCREMENT,
        );
        let write_timeout = config
            .get("dispatcher", "write_timeout_ms")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_WRITE_TIMEOUT);

        let dispatcher = Arc::new(BufferDispatcher::with_write_timeout(
            capacity,
            increment,
            write_timeout,
        ));
        let controller = Arc::new(MediaController::new(id, Arc::clone(&logger)));

        let channel = Self {
            id,
            logger,
            dispatcher,
            controller,
            consumer: Mutex::new(None),
            producers: Mutex::new(HashMap::new()),
            agent_tx,
        };
        channel.install_handlers();
        channel
    }

    fn install_handlers(&self) {
        let agent_tx = self.agent_tx.clone();
        let channel_id = self.id;
        self.dispatcher.set_write_timeout_handler(Box::new(move || {
            let msg = EventMsg::new(channel_id, ModuleTag::MediaChannel, ModuleTag::Agent)
                .with_error(ErrorCode::IntakeTimeout);
            let _ = agent_tx.send(AgentEvent::new(msg, AgentEventKind::WriteWarning));
        }));

        let agent_tx = self.agent_tx.clone();
        let channel_id = self.id;
        self.controller.set_notify_handler(Box::new(move |notify| {
            let msg = EventMsg::new(channel_id, ModuleTag::MediaChannel, ModuleTag::Agent);
            let kind = match notify {
                ControllerNotify::AccelerationDone => AgentEventKind::AccelerationDone,
                ControllerNotify::DecoderDied { surface_id } => {
                    AgentEventKind::DecoderDied { surface_id }
                }
                ControllerNotify::KeymodeStart { .. } => AgentEventKind::KeymodeStart,
                ControllerNotify::KeymodeStop { .. } => AgentEventKind::KeymodeStop,
            };
            let _ = agent_tx.send(AgentEvent::new(msg, kind));
        }));
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<BufferDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn controller(&self) -> &Arc<MediaController> {
        &self.controller
    }

    #[must_use]
    pub fn consumer_id(&self) -> u32 {
        self.consumer
            .lock()
            .ok()
            .and_then(|c| c.as_ref().map(|c| c.id()))
            .unwrap_or(INVALID_ID)
    }

    fn send_agent_event(&self, request_id: u32, error_code: ErrorCode, kind: AgentEventKind) {
        let mut msg = EventMsg::new(self.id, ModuleTag::MediaChannel, ModuleTag::Agent)
            .with_error(error_code);
        msg.request_id = request_id;
        let _ = self.agent_tx.send(AgentEvent::new(msg, kind));
    }

    /// Route one typed channel event to the owned consumer, a producer, the
    /// controller or the channel itself.
    pub fn handle_event(&self, event: ChannelEvent) {
        let request_id = event.msg.request_id;
        match event.kind {
            ChannelEventKind::ConsumerCreate { kind } => self.handle_consumer_create(request_id, kind),
            ChannelEventKind::ConsumerInitInfo(init) => {
                let consumer = self.consumer.lock().ok().and_then(|c| c.clone());
                match consumer {
                    Some(consumer) => {
                        consumer.apply_init_info(init);
                        // Private event: forwarded without translation.
                        self.send_agent_event(
                            request_id,
                            ErrorCode::Ok,
                            AgentEventKind::ProsumerInit {
                                prosumer_id: consumer.id(),
                            },
                        );
                    }
                    None => {
                        sink_error!(self.logger, "[MediaChannel] init info without consumer");
                        self.send_agent_event(
                            request_id,
                            ErrorCode::ProsumerCreate,
                            AgentEventKind::ProsumerError {
                                prosumer_id: INVALID_ID,
                            },
                        );
                    }
                }
            }
            ChannelEventKind::ConsumerStart => self.handle_consumer_start(request_id),
            ChannelEventKind::ConsumerStop => self.handle_consumer_stop(request_id),
            ChannelEventKind::ConsumerPause { media_type } => {
                let consumer = self.consumer.lock().ok().and_then(|c| c.clone());
                if let Some(consumer) = consumer {
                    consumer.pause(media_type);
                    self.send_agent_event(
                        request_id,
                        ErrorCode::Ok,
                        AgentEventKind::ProsumerPaused {
                            prosumer_id: consumer.id(),
                        },
                    );
                }
            }
            ChannelEventKind::ConsumerResume { .. } => {
                let consumer = self.consumer.lock().ok().and_then(|c| c.clone());
                if let Some(consumer) = consumer {
                    consumer.resume();
                    self.send_agent_event(
                        request_id,
                        ErrorCode::Ok,
                        AgentEventKind::ProsumerResumed {
                            prosumer_id: consumer.id(),
                        },
                    );
                }
            }
            ChannelEventKind::ConsumerDestroy => self.handle_consumer_destroy(request_id),
            ChannelEventKind::ProducerCreate { kind } => self.handle_producer_create(request_id, kind),
            ChannelEventKind::ProducerStart => self.handle_producer_start(request_id, event.prosumer_id),
            ChannelEventKind::ProducerStop => self.handle_producer_stop(request_id, event.prosumer_id),
            ChannelEventKind::ProducerPause { media_type } => {
                if let Some(producer) = self.producer(event.prosumer_id) {
                    producer.pause(media_type);
                    self.send_agent_event(
                        request_id,
                        ErrorCode::Ok,
                        AgentEventKind::ProsumerPaused {
                            prosumer_id: producer.id(),
                        },
                    );
                }
            }
            ChannelEventKind::ProducerResume { .. } => {
                if let Some(producer) = self.producer(event.prosumer_id) {
                    producer.resume();
                    self.send_agent_event(
                        request_id,
                        ErrorCode::Ok,
                        AgentEventKind::ProsumerResumed {
                            prosumer_id: producer.id(),
                        },
                    );
                }
            }
            ChannelEventKind::ProducerDestroy => {
                self.handle_producer_destroy(request_id, event.prosumer_id)
            }
            ChannelEventKind::AppendSurface { surface, scene_type } => {
                let surface_id = surface.unique_id();
                let ok = self
                    .controller
                    .append_surface(surface, scene_type, &self.dispatcher);
                let error_code = if ok { ErrorCode::Ok } else { ErrorCode::InvalidSurfaceId };
                self.send_agent_event(
                    request_id,
                    error_code,
                    AgentEventKind::AppendSurfaceDone { surface_id },
                );
            }
            ChannelEventKind::RemoveSurface { surface_id } => {
                self.controller.remove_surface(surface_id, &self.dispatcher);
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::RemoveSurfaceDone { surface_id },
                );
            }
            ChannelEventKind::SetSceneType { surface_id, scene_type } => {
                self.controller.set_key_mode(
                    surface_id,
                    scene_type == crate::playback::SceneType::Background,
                );
            }
            ChannelEventKind::SetVolume { volume } => self.controller.set_volume(volume),
            ChannelEventKind::KeyRedirect { surface_id, key_redirect } => {
                self.controller.set_key_redirect(surface_id, key_redirect);
            }
            ChannelEventKind::PlayStart => {
                self.controller.start(&self.dispatcher);
                self.send_agent_event(request_id, ErrorCode::Ok, AgentEventKind::PlayStartDone);
            }
            ChannelEventKind::PlayStop => {
                self.controller.stop(&self.dispatcher);
                self.send_agent_event(request_id, ErrorCode::Ok, AgentEventKind::PlayStopDone);
            }
        }
    }

    fn handle_consumer_create(&self, request_id: u32, kind: ProsumerKind) {
        if kind != ProsumerKind::WfdRtpConsumer {
            self.send_agent_event(
                request_id,
                ErrorCode::ProsumerCreate,
                AgentEventKind::ProsumerError {
                    prosumer_id: INVALID_ID,
                },
            );
            return;
        }

        let consumer = Arc::new(WfdRtpConsumer::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.logger),
        ));
        let ok = consumer.init();
        let prosumer_id = consumer.id();
        if ok {
            if let Ok(mut slot) = self.consumer.lock() {
                if slot.is_some() {
                    sink_warn!(self.logger, "[MediaChannel] consumer replaced");
                }
                *slot = Some(consumer);
            }
            sink_info!(
                self.logger,
                "[MediaChannel] consumer created, channelId: {}",
                self.id
            );
        }
        // Init reports the init-notify status either way; failure rides the
        // error code and must not be followed by a start.
        let error_code = if ok { ErrorCode::Ok } else { ErrorCode::ProsumerCreate };
        self.send_agent_event(
            request_id,
            error_code,
            AgentEventKind::ProsumerCreated { prosumer_id },
        );
    }

    fn handle_consumer_start(&self, request_id: u32) {
        let consumer = self.consumer.lock().ok().and_then(|c| c.clone());
        let Some(consumer) = consumer else {
            self.send_agent_event(
                request_id,
                ErrorCode::ProsumerStart,
                AgentEventKind::ProsumerError {
                    prosumer_id: INVALID_ID,
                },
            );
            return;
        };

        if !consumer.start() {
            self.send_agent_event(
                request_id,
                ErrorCode::ProsumerStart,
                AgentEventKind::ProsumerError {
                    prosumer_id: consumer.id(),
                },
            );
            return;
        }

        // The play controller is built once the stream is known to flow.
        let error_code = if self.controller.init(
            consumer.audio_track(),
            consumer.video_track(),
            consumer.is_pc_source(),
        ) {
            ErrorCode::Ok
        } else {
            ErrorCode::DecodeFormat
        };
        self.send_agent_event(
            request_id,
            error_code,
            AgentEventKind::ProsumerStarted {
                prosumer_id: consumer.id(),
            },
        );
    }

    fn handle_consumer_stop(&self, request_id: u32) {
        self.controller.stop(&self.dispatcher);
        let consumer = self.consumer.lock().ok().and_then(|c| c.clone());
        match consumer {
            Some(consumer) => {
                consumer.stop();
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::ProsumerStopped {
                        prosumer_id: consumer.id(),
                    },
                );
            }
            None => {
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::ProsumerStopped {
                        prosumer_id: INVALID_ID,
                    },
                );
            }
        }
    }

    fn handle_consumer_destroy(&self, request_id: u32) {
        let consumer = self.consumer.lock().ok().and_then(|c| c.clone());
        let Some(consumer) = consumer else {
            self.send_agent_event(
                request_id,
                ErrorCode::Ok,
                AgentEventKind::ProsumerDestroyed {
                    prosumer_id: INVALID_ID,
                },
            );
            return;
        };

        if consumer.is_running() {
            sink_warn!(self.logger, "[MediaChannel] destroy while running");
            self.send_agent_event(
                request_id,
                ErrorCode::ProsumerDestroy,
                AgentEventKind::ProsumerError {
                    prosumer_id: consumer.id(),
                },
            );
            return;
        }

        let prosumer_id = consumer.id();
        drop(consumer);
        if let Ok(mut slot) = self.consumer.lock() {
            *slot = None;
        }
        self.send_agent_event(
            request_id,
            ErrorCode::Ok,
            AgentEventKind::ProsumerDestroyed { prosumer_id },
        );
    }

    fn producer(&self, prosumer_id: u32) -> Option<Arc<RtpProducer>> {
        self.producers
            .lock()
            .ok()
            .and_then(|p| p.get(&prosumer_id).cloned())
    }

    fn handle_producer_create(&self, request_id: u32, kind: ProsumerKind) {
        if kind != ProsumerKind::RtpProducer {
            self.send_agent_event(
                request_id,
                ErrorCode::ProsumerCreate,
                AgentEventKind::ProsumerError {
                    prosumer_id: INVALID_ID,
                },
            );
            return;
        }
        let producer = Arc::new(RtpProducer::new(Arc::clone(&self.logger)));
        let prosumer_id = producer.id();
        if let Ok(mut producers) = self.producers.lock() {
            producers.insert(prosumer_id, producer);
        }
        self.send_agent_event(
            request_id,
            ErrorCode::Ok,
            AgentEventKind::ProsumerCreated { prosumer_id },
        );
    }

    fn handle_producer_start(&self, request_id: u32, prosumer_id: u32) {
        match self.producer(prosumer_id) {
            Some(producer) => {
                producer.attach_and_start(&self.dispatcher);
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::ProsumerStarted { prosumer_id },
                );
            }
            None => {
                sink_warn!(
                    self.logger,
                    "[MediaChannel] unknown producerId: {prosumer_id}"
                );
                self.send_agent_event(
                    request_id,
                    ErrorCode::ProsumerStart,
                    AgentEventKind::ProsumerError { prosumer_id },
                );
            }
        }
    }

    fn handle_producer_stop(&self, request_id: u32, prosumer_id: u32) {
        match self.producer(prosumer_id) {
            Some(producer) => {
                producer.stop();
                producer.detach(&self.dispatcher);
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::ProsumerStopped { prosumer_id },
                );
            }
            None => {
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::ProsumerStopped { prosumer_id },
                );
            }
        }
    }

    fn handle_producer_destroy(&self, request_id: u32, prosumer_id: u32) {
        let producer = self
            .producers
            .lock()
            .ok()
            .and_then(|mut p| p.remove(&prosumer_id));
        match producer {
            Some(producer) if producer.is_running() => {
                // Put it back; running producers must be stopped first.
                if let Ok(mut producers) = self.producers.lock() {
                    producers.insert(prosumer_id, producer);
                }
                self.send_agent_event(
                    request_id,
                    ErrorCode::ProsumerDestroy,
                    AgentEventKind::ProsumerError { prosumer_id },
                );
            }
            _ => {
                self.send_agent_event(
                    request_id,
                    ErrorCode::Ok,
                    AgentEventKind::ProsumerDestroyed { prosumer_id },
                );
            }
        }
    }

    pub fn release(&self) {
        self.controller.stop(&self.dispatcher);
        self.controller.release();
        if let Ok(mut slot) = self.consumer.lock() {
            if let Some(consumer) = slot.take() {
                consumer.stop();
            }
        }
        if let Ok(mut producers) = self.producers.lock() {
            for producer in producers.values() {
                producer.stop();
            }
            producers.clear();
        }
        self.dispatcher.stop_dispatch();
        self.dispatcher.flush_buffer();
        self.dispatcher.release_all_receivers();
    }
}

impl Drop for MediaChannel {
    fn drop(&mut self) {
        self.release();
    }
}
