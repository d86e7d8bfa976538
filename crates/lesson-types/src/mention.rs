//! Preloaded user id → display name table

use std::collections::HashMap;

/// Display names keyed by Discord user id.
///
/// Loaded once per run from the mention sheet and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionMap {
    names: HashMap<u64, String>,
}

impl MentionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from two parallel sheet columns.
    ///
    /// Rows whose id does not parse (headers, blanks) or whose name is blank
    /// are skipped. Ids may be written as raw numbers or as `<@id>` / `<@!id>`
    /// mentions. When an id repeats, the first row wins.
    pub fn from_columns(ids: &[String], names: &[String]) -> Self {
        let mut map = HashMap::new();
        for (raw_id, name) in ids.iter().zip(names) {
            let Some(id) = parse_user_id(raw_id) else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            map.entry(id).or_insert_with(|| name.to_string());
        }
        Self { names: map }
    }

    pub fn get(&self, user_id: u64) -> Option<&str> {
        self.names.get(&user_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(u64, String)> for MentionMap {
    fn from_iter<T: IntoIterator<Item = (u64, String)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

fn parse_user_id(raw: &str) -> Option<u64> {
    raw.trim()
        .trim_start_matches("<@")
        .trim_start_matches('!')
        .trim_end_matches('>')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_columns_skips_header_and_blanks() {
        let ids = col(&["Discord ID", "111", "", "222", "333"]);
        let names = col(&["名前", "山田", "誰か", "  ", "佐藤"]);
        let map = MentionMap::from_columns(&ids, &names);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(111), Some("山田"));
        assert_eq!(map.get(222), None);
        assert_eq!(map.get(333), Some("佐藤"));
    }

    #[test]
    fn test_from_columns_accepts_mention_syntax() {
        let map = MentionMap::from_columns(&col(&["<@111>", "<@!222>"]), &col(&["a", "b"]));
        assert_eq!(map.get(111), Some("a"));
        assert_eq!(map.get(222), Some("b"));
    }

    #[test]
    fn test_first_row_wins() {
        let map = MentionMap::from_columns(&col(&["1", "1"]), &col(&["first", "second"]));
        assert_eq!(map.get(1), Some("first"));
    }

    #[test]
    fn test_uneven_columns_stop_at_shorter() {
        let map = MentionMap::from_columns(&col(&["1", "2", "3"]), &col(&["a"]));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_from_iter() {
        let map: MentionMap = [(9, "nine".to_string())].into_iter().collect();
        assert_eq!(map.get(9), Some("nine"));
        assert!(!map.is_empty());
        assert!(MentionMap::new().is_empty());
    }
}
