//! Sample handler: random stored embeddings with their display columns.

use anyhow::Result;

use crate::cli::output::{format_vector, output_json, print_table, print_warning, OutputMode};
use crate::init::AppContext;

pub async fn handle_sample(
    ctx: &AppContext,
    n: Option<usize>,
    seed: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let visualisation = &ctx.config.visualisation;
    let n = n.unwrap_or(visualisation.n_samples);
    let seed = seed.unwrap_or(ctx.config.seed);
    let sample = ctx
        .sampler()
        .execute(n, seed, &visualisation.visualisation_columns)
        .await?;

    if !sample.report.is_complete() {
        print_warning(&format!(
            "{} page(s) could not be read; the sample covers part of the collection",
            sample.report.skipped.len()
        ));
    }

    if mode == OutputMode::Json {
        output_json(&sample.points);
        return Ok(());
    }

    let rows = sample
        .points
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.label.as_ref().map(|l| l.to_string()).unwrap_or_default(),
                serde_json::Value::Object(p.hover.clone()).to_string(),
                format_vector(&p.vector, 4),
            ]
        })
        .collect();
    print_table(&["Id", "Label", "Hover", "Vector"], rows);
    Ok(())
}
