// Application state for HTTP handlers
use crate::application::dashboard_service::DashboardHandle;
use crate::infrastructure::channel_sink::ChannelSink;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardHandle,
    pub sink: Arc<ChannelSink>,
}
