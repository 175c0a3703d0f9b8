use {
    anyhow::{Context, Result},
    clap::Subcommand,
    wagate_config::WagateConfig,
    wagate_tenants::{SqliteTenantStore, StoreError, TenantStore},
};

#[derive(Subcommand)]
pub enum TenantAction {
    /// List every tenant.
    List,
    /// Create a tenant.
    Create {
        /// Display name.
        name: String,
        /// Token the tenant authenticates with. Must be unique.
        token: String,
    },
    /// Delete a tenant by token.
    ///
    /// This edits the database directly. Use `DELETE /admin/users/{token}`
    /// on a running gateway so the live session is torn down first.
    Delete { token: String },
}

pub async fn handle_tenants(action: TenantAction, config: &WagateConfig) -> Result<()> {
    let path = config.storage.database_path();
    let store = SqliteTenantStore::open(&path)
        .await
        .with_context(|| format!("failed to open tenant database {}", path.display()))?;
    match action {
        TenantAction::List => list(&store).await,
        TenantAction::Create { name, token } => create(&store, &name, &token).await,
        TenantAction::Delete { token } => delete(&store, &token).await,
    }
}

async fn list(store: &dyn TenantStore) -> Result<()> {
    let tenants = store.list().await?;
    if tenants.is_empty() {
        println!("No tenants.");
        return Ok(());
    }
    println!(
        "{:<6} {:<20} {:<10} {:<28} WEBHOOK",
        "ID", "NAME", "CONNECTED", "JID"
    );
    for t in tenants {
        let jid = if t.jid.is_empty() { "-" } else { t.jid.as_str() };
        let webhook = if t.webhook.is_empty() {
            "-"
        } else {
            t.webhook.as_str()
        };
        println!(
            "{:<6} {:<20} {:<10} {:<28} {}",
            t.id, t.name, t.connected, jid, webhook
        );
    }
    Ok(())
}

async fn create(store: &dyn TenantStore, name: &str, token: &str) -> Result<()> {
    match store.create(name, token).await {
        Ok(record) => {
            println!("Created tenant {} ({})", record.id, record.name);
            Ok(())
        },
        Err(StoreError::DuplicateToken) => {
            anyhow::bail!("a tenant with token {token:?} already exists")
        },
        Err(e) => Err(e.into()),
    }
}

async fn delete(store: &dyn TenantStore, token: &str) -> Result<()> {
    store
        .delete_by_token(token)
        .await
        .with_context(|| format!("failed to delete tenant with token {token:?}"))?;
    println!("Deleted tenant with token {token:?}");
    Ok(())
}
