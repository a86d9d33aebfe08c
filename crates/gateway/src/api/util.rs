/// Derives the process-wide `character_mapping_key` (§6.3) from a
/// character's display name. Stable across sessions so the same character
/// always resolves to the same registered session id via
/// `StorageManager::register_character`.
pub fn character_mapping_key(character_name: &str) -> String {
    format!("tavern::{}", character_name.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(character_mapping_key("  Seraphina  "), "tavern::seraphina");
    }

    #[test]
    fn distinct_names_map_to_distinct_keys() {
        assert_ne!(character_mapping_key("Garrick"), character_mapping_key("Seraphina"));
    }
}
