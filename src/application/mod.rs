// Application layer - Use cases and the ports they depend on
pub mod connection_manager;
pub mod dashboard_service;
pub mod presentation_sink;
pub mod settings_repository;
pub mod transport;

#[cfg(test)]
pub mod test_support;
