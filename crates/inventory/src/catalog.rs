//! Item listing helpers: free-text search and alphabetical ordering.

use crate::item::Item;

/// Case-insensitive substring match against name or category.
///
/// A blank term matches every item.
pub fn matches(item: &Item, term: &str) -> bool {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    item.name().to_lowercase().contains(&needle) || item.category().to_lowercase().contains(&needle)
}

/// Sort alphabetically by name, ignoring case.
pub fn sort_by_name(items: &mut [Item]) {
    items.sort_by_cached_key(|item| item.name().to_lowercase());
}

/// Items matching `term`, sorted alphabetically by name.
pub fn search(items: impl IntoIterator<Item = Item>, term: &str) -> Vec<Item> {
    let mut found: Vec<Item> = items.into_iter().filter(|item| matches(item, term)).collect();
    sort_by_name(&mut found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewItem;
    use chrono::Utc;

    fn item(name: &str, category: &str) -> Item {
        Item::create(NewItem::new(name, category, None).unwrap(), Utc::now())
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name()).collect()
    }

    fn sample() -> Vec<Item> {
        vec![
            item("Premium Bolt XL", "Fasteners"),
            item("caramel", "Hardware"),
            item("Electronic Component Z", "Electronics"),
            item("Blueberry", "Hardware"),
        ]
    }

    #[test]
    fn matches_name_or_category_case_insensitively() {
        let found = search(sample(), "HARD");
        assert_eq!(names(&found), vec!["Blueberry", "caramel"]);

        let found = search(sample(), "bolt");
        assert_eq!(names(&found), vec!["Premium Bolt XL"]);
    }

    #[test]
    fn blank_term_returns_everything_sorted() {
        let found = search(sample(), "   ");
        assert_eq!(
            names(&found),
            vec!["Blueberry", "caramel", "Electronic Component Z", "Premium Bolt XL"]
        );
    }

    #[test]
    fn no_match_is_empty() {
        assert!(search(sample(), "widget").is_empty());
    }
}
