use chrono::Utc;
use uuid::Uuid;

/// Mint a group identifier: `{prefix}-{UTC timestamp}-{8 random hex chars}`.
///
/// The timestamp keeps ids traceable to their creation time; the random part
/// keeps ids minted within the same second apart. Uniqueness is not checked
/// against the store.
pub fn generate_group_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().format("%Y%m%d%H%M%S"),
        &random[..8]
    )
}
