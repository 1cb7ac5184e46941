use anyhow::Result;
use serde_json::json;

use crate::cli::output::{format_vector, output_json, print_kv, print_success, OutputMode};
use crate::init::AppContext;
use crate::models::EventType;

pub async fn handle_update_consumer(
    ctx: &AppContext,
    consumer: &str,
    item: &str,
    event: &str,
    mode: OutputMode,
) -> Result<()> {
    let event: EventType = event.parse()?;
    let updated = ctx
        .consumer_updater()
        .update_consumer_embedding(consumer, item, &event)
        .await?;

    if mode == OutputMode::Json {
        output_json(&json!({
            "consumer": updated.id,
            "event": event.to_string(),
            "weight": event.weight(),
            "embedding": updated.vector,
        }));
    } else {
        print_success(&format!("Updated consumer '{}' with '{}' ({})", consumer, item, event));
        print_kv("embedding", &format_vector(&updated.vector, 6));
    }
    Ok(())
}
