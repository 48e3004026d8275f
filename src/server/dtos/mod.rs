pub mod folder_dto;
pub mod health_dto;
pub mod playback_dto;
pub mod settings_dto;
