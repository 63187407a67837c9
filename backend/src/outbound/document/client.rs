//! MongoDB client establishment with bounded retry.
//!
//! Connection establishment retries a fixed number of times with a fixed
//! delay, then fails hard. Individual operations never retry; they surface
//! connection failures to the caller.

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::{Client, Database};
use tracing::{error, info};

use crate::domain::ports::StoreError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connect to the given URI and select a database, verifying the server
/// responds to `ping` before returning.
pub(crate) async fn connect(uri: &str, db_name: &str) -> Result<Database, StoreError> {
    let mut last_error = String::new();
    for attempt in 1..=MAX_ATTEMPTS {
        info!(attempt, max = MAX_ATTEMPTS, "connecting to MongoDB");
        match try_connect(uri, db_name).await {
            Ok(db) => {
                info!("connected to MongoDB");
                return Ok(db);
            }
            Err(err) => {
                error!(attempt, max = MAX_ATTEMPTS, error = %err, "MongoDB connection failed");
                last_error = err.to_string();
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(StoreError::connection(format!(
        "giving up after {MAX_ATTEMPTS} attempts: {last_error}"
    )))
}

async fn try_connect(uri: &str, db_name: &str) -> Result<Database, mongodb::error::Error> {
    let client = Client::with_uri_str(uri).await?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await?;
    Ok(client.database(db_name))
}
