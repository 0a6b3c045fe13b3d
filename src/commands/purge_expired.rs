use tracing::info;

use crate::controllers::paste;
use crate::App;

pub async fn run(app: App) -> anyhow::Result<()> {
    let count = paste::purge_expired(&app.database)
        .await
        .map_err(|e| anyhow::anyhow!("purge failed: {}", e.detail()))?;

    if count == 0 {
        info!("no expired pastes");
    }

    app.database.close().await;
    Ok(())
}
