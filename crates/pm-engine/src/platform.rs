//! Platform hooks
//!
//! The engine asks the platform two questions it cannot answer itself:
//! whether the OS interrupted audio (phone call, alarm) and whether "music
//! is playing" from the host application's point of view. Desktop builds
//! use the defaults; mobile shells supply their own implementation.

pub trait PlatformHooks: Send + Sync {
    /// Did the OS take the audio session away?
    fn is_audio_interrupted(&self) -> bool {
        false
    }

    /// Is this application audibly playing music? The default considers the
    /// device running and the window focused.
    fn is_music_playing(&self, device_started: bool, window_focused: bool) -> bool {
        device_started && window_focused
    }
}

/// Desktop defaults: never interrupted.
pub struct DefaultPlatformHooks;

impl PlatformHooks for DefaultPlatformHooks {}
