use crate::config::settings::AppConfig;
use crate::modules::transcoding::service::TranscodingService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub transcoding: TranscodingService,
}

impl AppState {
    pub fn new(config: AppConfig, transcoding: TranscodingService) -> Self {
        Self {
            config,
            transcoding,
        }
    }
}
