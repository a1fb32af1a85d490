use std::sync::Arc;

use conductor::{logging, signing_key, Config, PermissionPolicy, SqliteStore, UserStore, USERS_DB};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    logging::init(&config.logging.level);

    tracing::info!("Starting Conductor");

    // Open the document store
    let users = UserStore::new(Arc::new(SqliteStore::open(&config.database.path, USERS_DB)?));

    // No tokens without a valid key
    let key = signing_key(&config.signing).await?;

    let policy = PermissionPolicy::new(config.roles.cluster_admin_role.clone());
    users
        .ensure_admin(&config.admin.username, config.admin.password.as_deref(), &policy)
        .await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {}
        [command, user_id] if command == "token" => {
            let token = users.token_for(user_id, &key).await?;
            println!("{}", token);
        }
        _ => return Err("usage: conductor [token <user-id>]".into()),
    }

    tracing::info!(
        instance = %key.instance_name(),
        kid = %key.key_id(),
        "Conductor ready"
    );
    Ok(())
}
