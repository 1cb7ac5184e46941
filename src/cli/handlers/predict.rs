//! Predict handler: embed the prediction data and sync the vector store.

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{output_json, print_success, OutputMode};
use crate::init::AppContext;

pub async fn handle_predict(
    ctx: &AppContext,
    model_version: Option<&str>,
    mode: OutputMode,
) -> Result<()> {
    let (usecase, command) = ctx.predict(model_version);
    let outcome = usecase.execute(&command).await?;

    if mode == OutputMode::Json {
        output_json(&json!({
            "model_id": outcome.model_id,
            "embedded": outcome.embedded,
            "collection": ctx.config.vector_store.vector_collection_name,
        }));
    } else {
        print_success(&format!(
            "Stored {} embeddings from model '{}' in '{}'",
            outcome.embedded, outcome.model_id, ctx.config.vector_store.vector_collection_name
        ));
    }
    Ok(())
}
