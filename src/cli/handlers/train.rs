//! Train handler: fit and register a model for the project.

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{output_json, print_kv, print_success, print_table, OutputMode};
use crate::init::AppContext;

pub async fn handle_train(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    let (usecase, command) = ctx.train();
    let outcome = usecase.execute(&command).await?;

    if mode == OutputMode::Json {
        output_json(&json!({
            "model_id": outcome.model_id,
            "rows": outcome.rows,
            "history": outcome.history,
        }));
        return Ok(());
    }

    let rows = outcome
        .history
        .epochs
        .iter()
        .map(|e| {
            vec![
                e.epoch.to_string(),
                format!("{:.5}", e.loss),
                e.val_loss.map(|v| format!("{v:.5}")).unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["Epoch", "Loss", "Val loss"], rows);
    print_kv("rows", &outcome.rows.to_string());
    print_success(&format!(
        "Registered model '{}' under '{}'",
        outcome.model_id, command.project_name
    ));
    Ok(())
}
