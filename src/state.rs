use crate::{
    auth::{
        google::{GoogleOAuth, OAuthStateStore},
        AuthService,
    },
    db::Database,
    realtime::Realtime,
    services::Services,
    utils::{ApiResult, Config},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth_service: Arc<AuthService>,
    pub config: Arc<Config>,
    pub realtime: Arc<Realtime>,
    pub services: Arc<Services>,
    pub google: Option<Arc<GoogleOAuth>>,
    pub oauth_states: Arc<OAuthStateStore>,
}

impl AppState {
    /// Wire every shared component from configuration
    pub fn new(config: Config) -> ApiResult<Self> {
        let config = Arc::new(config);
        let db = Database::new(&config.database);
        let auth_service = Arc::new(AuthService::new(db.clone(), config.clone()));
        let google = GoogleOAuth::from_config(&config.oauth)?.map(Arc::new);
        let services = Arc::new(Services::new(&config)?);

        Ok(Self {
            db,
            auth_service,
            config,
            realtime: Arc::new(Realtime::default()),
            services,
            google,
            oauth_states: Arc::new(OAuthStateStore::default()),
        })
    }
}
