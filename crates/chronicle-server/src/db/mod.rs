// db/mod.rs
// Unified database layer with rusqlite + sqlite-vec

mod facts;
mod items;
mod links;
mod metrics;
mod migration_helpers;
pub mod pool;
mod schema;
#[cfg(test)]
pub(crate) mod test_support;
mod types;
mod vector;

pub use facts::{load_fact_history_sync, load_facts_sync, save_facts_sync};
pub use items::{
    boost_salience_sync,
    delete_item_sync,
    get_item_sync,
    keyword_search_sync,
    list_recent_sync,
    list_tags_sync,
    load_items_sync,
    record_access_sync,
    track_view_sync,
    update_memory_type_sync,
    // Bulk import/update path
    upsert_items_sync,
};
pub use links::{add_link_sync, load_links_sync, remove_link_sync};
pub use metrics::{
    METRIC_RETENTION_MS, insert_decay_metric_sync, prune_metrics_sync, recent_runs_sync,
};
pub use pool::DatabasePool;
pub use types::SearchFilters;
pub use vector::{
    bytes_to_embedding, distance_to_score, embedding_to_bytes, get_item_embedding_sync,
    upsert_embedding_mirror_sync, vector_knn_sync,
};
