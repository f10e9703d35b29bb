use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::repository::{AccountRepository, SqliteAccountRepository};
use crate::auth::tokens::TokenService;
use crate::blog::repository::{BlogRepository, SqliteBlogRepository};
use crate::config::Config;
use crate::mail::Mailer;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub accounts: Arc<dyn AccountRepository>,
    pub blog: Arc<dyn BlogRepository>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wire the SQLite repositories over `db`.
    pub fn new(db: DbPool, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            accounts: Arc::new(SqliteAccountRepository::new(db.clone())),
            blog: Arc::new(SqliteBlogRepository::new(db.clone())),
            db,
            config,
            mailer,
        }
    }

    pub fn tokens(&self) -> TokenService {
        TokenService::new(self.accounts.clone(), self.config.auth.activation_ttl())
    }
}
