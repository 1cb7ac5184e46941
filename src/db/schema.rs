use crate::db::connection::AutoembedDb;
use crate::utils::sanitize::validate_collection_name;
use crate::AutoembedError;

/// Escaped SurrealQL identifier for a validated collection name.
pub fn table_ident(collection: &str) -> Result<String, AutoembedError> {
    Ok(format!("`{}`", validate_collection_name(collection)?))
}

/// Define the table backing a vector collection.
///
/// Records are keyed by embedding id; `metadata_json` holds the metadata map
/// serialized as a JSON string. Safe to call repeatedly.
pub async fn ensure_collection(db: &AutoembedDb, collection: &str) -> Result<(), AutoembedError> {
    let table = table_ident(collection)?;
    let ddl = format!(
        "DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;\n\
         DEFINE FIELD IF NOT EXISTS embedding_id ON {table} TYPE string;\n\
         DEFINE FIELD IF NOT EXISTS embedding ON {table} TYPE array<float>;\n\
         DEFINE FIELD IF NOT EXISTS metadata_json ON {table} TYPE string;",
        table = table
    );
    db.query(ddl).await?.check()?;
    tracing::debug!("Ensured vector collection {}", collection);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ident_escapes_hyphens() {
        assert_eq!(table_ident("car-listings").unwrap(), "`car-listings`");
        assert!(table_ident("x` ; REMOVE TABLE y").is_err());
    }
}
