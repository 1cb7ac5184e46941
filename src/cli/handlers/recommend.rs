use anyhow::Result;

use crate::cli::output::{output_json, print_table, OutputMode};
use crate::init::AppContext;

pub async fn handle_recommend(ctx: &AppContext, id: &str, n: usize, mode: OutputMode) -> Result<()> {
    let ids = ctx.recommendations().ask(id, n).await?;

    if mode == OutputMode::Json {
        output_json(&ids);
        return Ok(());
    }

    let rows = ids
        .into_iter()
        .enumerate()
        .map(|(rank, id)| vec![(rank + 1).to_string(), id])
        .collect();
    print_table(&["#", "Id"], rows);
    Ok(())
}
