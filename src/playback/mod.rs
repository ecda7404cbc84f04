pub mod audio_play_controller;
pub mod audio_player;
pub mod audio_render;
pub mod audio_sink;
pub mod av_sync;
pub mod cpal_render;
pub mod media_controller;
pub mod surface;
pub mod video_play_controller;

pub use av_sync::{AudioClock, SyncAction, VideoAudioSync};
pub use media_controller::{MediaController, SceneType};
pub use surface::{Surface, VideoFrame};
