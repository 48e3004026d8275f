pub mod admin_controller;
pub mod health_controller;
pub mod playback_controller;
pub mod stream_controller;
