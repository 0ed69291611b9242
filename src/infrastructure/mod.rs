// Infrastructure layer - External dependencies and adapters
pub mod channel_sink;
pub mod config;
pub mod csv_export;
pub mod settings_file;
pub mod websocket_transport;
pub mod wire;
