use std::sync::Arc;

use courier_gateway::dispatcher::Dispatcher;
use courier_messaging::MessagingService;

pub use courier_types::auth::{create_token, verify_token};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: MessagingService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}
