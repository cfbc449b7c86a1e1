//! Provisions storage: connects to the configured backend, creates the schema and
//! makes sure the administrator account exists.

use log::{error, info, warn};
use tasklist::auth::{AuthService, RevokedTokens, TokenIssuer};
use tasklist::config::Config;
use tasklist::{db, AppError};
use tokio::runtime::Handle;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let storage = db::connect(&config).await?;

    let revoked = RevokedTokens::start(Handle::current());
    let auth = AuthService::new(
        &storage,
        TokenIssuer::from_config(&config),
        revoked.clone(),
        config.bcrypt_cost,
    );

    match &config.admin {
        Some(admin) => {
            let user = auth.ensure_admin(admin).await?;
            info!("Administrator account: {} (access {})", user.username, user.access);
        }
        None => warn!("API_ADMIN_USER is not set, no administrator account ensured"),
    }

    revoked.stop();
    info!("Storage ready ({} mode)", config.store_mode);
    Ok(())
}
