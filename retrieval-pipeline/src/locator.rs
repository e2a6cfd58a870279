use tracing::{debug, instrument};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::catalog_record::CatalogRecord},
};

const TARGET_DOC_TYPE: &str = "offering-circular";
const EXPANDED_MARKER: &str = "expanded";
const PRELIMINARY_MARKER: &str = "preliminary";

/// Resolves an entity code to the catalog record the lookup should read
/// from.
///
/// Only fully indexed offering circulars are eligible. The expanded
/// edition carries the expanded marker in its title; the initial
/// edition is whatever carries neither the expanded nor the preliminary
/// marker, preliminary alerts being separate filings that share the
/// entity. When several editions qualify the earliest publication wins,
/// since later re-filings duplicate the text.
#[instrument(skip(db))]
pub async fn resolve(
    db: &SurrealDbClient,
    entity_code: &str,
    expanded: bool,
) -> Result<CatalogRecord, AppError> {
    let mut response = db
        .query(
            "SELECT * FROM catalog_record \
             WHERE entity_code = $entity_code \
               AND fully_indexed = true \
               AND doc_type = $doc_type",
        )
        .bind(("entity_code", entity_code.to_owned()))
        .bind(("doc_type", TARGET_DOC_TYPE.to_owned()))
        .await?;
    let records: Vec<CatalogRecord> = response.take(0)?;

    let chosen = records
        .into_iter()
        .filter(|record| edition_matches(&record.title, expanded))
        .min_by_key(|record| record.published_at);

    match chosen {
        Some(record) => {
            debug!(document_id = %record.document_id, "resolved catalog record");
            Ok(record)
        }
        None => Err(AppError::NotFound(format!(
            "no indexed document found for entity '{entity_code}'"
        ))),
    }
}

fn edition_matches(title: &str, expanded: bool) -> bool {
    let lowered = title.to_lowercase();
    if expanded {
        lowered.contains(EXPANDED_MARKER)
    } else {
        !lowered.contains(EXPANDED_MARKER) && !lowered.contains(PRELIMINARY_MARKER)
    }
}
