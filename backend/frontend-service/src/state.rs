use crate::health::HealthChecker;
use crate::service::MessageService;
use crate::web::templates::Pages;

/// Shared by every worker through `web::Data`
pub struct AppState {
    pub messages: MessageService,
    pub health: HealthChecker,
    pub pages: Pages,
    /// Turnstile widget key for the home page form
    pub site_key: Option<String>,
    pub default_max_view_count: i32,
}
