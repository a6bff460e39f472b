use std::path::PathBuf;
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::{info, warn};

use mentor_bot::dispatcher::Bot;
use mentor_bot::telegram::TelegramGateway;
use mentor_sched::AppContext;
use mentor_sheets::google::GoogleSheetsImporter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mentor=debug".into()),
        )
        .init();

    // Config
    let token = std::env::var("MENTOR_BOT_TOKEN")
        .map_err(|_| anyhow::anyhow!("MENTOR_BOT_TOKEN is not set"))?;
    let api_key = std::env::var("MENTOR_SHEETS_API_KEY").unwrap_or_default();
    let db_path = std::env::var("MENTOR_DB_PATH").unwrap_or_else(|_| "mentor.db".into());
    let tick_secs: u64 = std::env::var("MENTOR_TICK_SECS")
        .unwrap_or_else(|_| "6".into())
        .parse()?;
    let tz: FixedOffset = std::env::var("MENTOR_UTC_OFFSET")
        .unwrap_or_else(|_| "+03:00".into())
        .parse()?;

    // Init database
    let db = Arc::new(mentor_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let gateway = Arc::new(TelegramGateway::new(&token));
    let importer = Arc::new(GoogleSheetsImporter::new(api_key));
    let bot = Arc::new(Bot::new(db.clone(), gateway.clone(), importer, tz));

    let ctx = Arc::new(AppContext {
        db,
        gateway: gateway.clone(),
        tz,
    });

    tokio::spawn(mentor_sched::tick::run_scheduler_loop(ctx, tick_secs));

    info!("mentor bot polling for updates");
    let mut offset = 0i64;
    loop {
        let updates = match gateway.poll_updates(offset).await {
            Ok((next_offset, updates)) => {
                offset = next_offset;
                updates
            }
            Err(e) => {
                warn!("poll failed: {:#}", e);
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                continue;
            }
        };

        for update in updates {
            let user_id = update.user_id;
            if let Err(e) = bot.handle_update(update).await {
                warn!("update from user {} failed: {:#}", user_id, e);
            }
        }
    }
}
