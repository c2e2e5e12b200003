use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BookmarkError, ValidationError};
use crate::reader::PageNumber;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub page: PageNumber,
    pub name: String,
    /// Set once the remote store has accepted the bookmark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(page: PageNumber, name: impl Into<String>) -> Self {
        Self {
            page,
            name: name.into(),
            remote_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.remote_id.is_some()
    }
}

/// Trimmed, non-empty bookmark name
pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyBookmarkName)
    } else {
        Ok(trimmed.to_string())
    }
}

/// At most one bookmark per page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Bookmark>", into = "Vec<Bookmark>")]
pub struct Bookmarks {
    by_page: BTreeMap<PageNumber, Bookmark>,
}

impl From<Vec<Bookmark>> for Bookmarks {
    fn from(list: Vec<Bookmark>) -> Self {
        let mut bookmarks = Self::default();
        for bookmark in list {
            bookmarks.by_page.entry(bookmark.page).or_insert(bookmark);
        }
        bookmarks
    }
}

impl From<Bookmarks> for Vec<Bookmark> {
    fn from(bookmarks: Bookmarks) -> Self {
        bookmarks.by_page.into_values().collect()
    }
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new bookmark, refusing exact duplicates and occupied pages
    pub fn add(&mut self, page: PageNumber, name: &str) -> Result<&Bookmark, BookmarkError> {
        let name = normalize_name(name)?;

        if let Some(existing) = self.by_page.get(&page) {
            return Err(if existing.name == name {
                BookmarkError::Duplicate { page, name }
            } else {
                BookmarkError::PageTaken {
                    page,
                    existing: existing.name.clone(),
                }
            });
        }

        Ok(self
            .by_page
            .entry(page)
            .or_insert_with(|| Bookmark::new(page, name)))
    }

    /// Put a bookmark back, as after a failed remote delete
    pub fn restore(&mut self, bookmark: Bookmark) {
        self.by_page.insert(bookmark.page, bookmark);
    }

    /// Rename in place; returns the previous bookmark
    pub fn rename(&mut self, page: PageNumber, name: &str) -> Result<Bookmark, BookmarkError> {
        let name = normalize_name(name)?;
        let bookmark = self
            .by_page
            .get_mut(&page)
            .ok_or(BookmarkError::NotFound(page))?;

        if bookmark.name == name {
            return Err(BookmarkError::Duplicate { page, name });
        }

        let previous = bookmark.clone();
        bookmark.name = name;
        bookmark.remote_id = None;
        Ok(previous)
    }

    pub fn remove(&mut self, page: PageNumber) -> Option<Bookmark> {
        self.by_page.remove(&page)
    }

    /// Record the remote id for the bookmark on `page`, if it still has
    /// the name that was sent
    pub fn assign_remote_id(&mut self, page: PageNumber, name: &str, remote_id: String) -> bool {
        match self.by_page.get_mut(&page) {
            Some(bookmark) if bookmark.name == name => {
                bookmark.remote_id = Some(remote_id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, page: PageNumber) -> Option<&Bookmark> {
        self.by_page.get(&page)
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        self.by_page.contains_key(&page)
    }

    /// Bookmarks in page order
    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.by_page.values()
    }

    pub fn to_vec(&self) -> Vec<Bookmark> {
        self.by_page.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_page.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_page.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_page.clear();
    }

    /// Bookmarks the remote store has never acknowledged
    pub fn unsynced(&self) -> impl Iterator<Item = &Bookmark> {
        self.by_page.values().filter(|b| !b.is_synced())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    #[test]
    fn one_bookmark_per_page() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.add(page(10), "  X ").unwrap();

        assert_eq!(
            bookmarks.add(page(10), "X"),
            Err(BookmarkError::Duplicate {
                page: page(10),
                name: "X".into()
            })
        );
        assert_eq!(
            bookmarks.add(page(10), "Y"),
            Err(BookmarkError::PageTaken {
                page: page(10),
                existing: "X".into()
            })
        );
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks.get(page(10)).unwrap().name, "X");
    }

    #[test]
    fn same_name_on_other_page_is_allowed() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.add(page(1), "Chapter").unwrap();
        bookmarks.add(page(2), "Chapter").unwrap();
        assert_eq!(bookmarks.len(), 2);
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut bookmarks = Bookmarks::new();
        assert_eq!(
            bookmarks.add(page(1), "   "),
            Err(BookmarkError::Invalid(ValidationError::EmptyBookmarkName))
        );
        assert!(bookmarks.is_empty());
    }

    #[test]
    fn rename_clears_remote_id() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.add(page(3), "old").unwrap();
        assert!(bookmarks.assign_remote_id(page(3), "old", "r1".into()));

        let previous = bookmarks.rename(page(3), "new").unwrap();
        assert_eq!(previous.remote_id.as_deref(), Some("r1"));

        let current = bookmarks.get(page(3)).unwrap();
        assert_eq!(current.name, "new");
        assert!(!current.is_synced());
        assert!(!bookmarks.assign_remote_id(page(3), "old", "r2".into()));
        assert_eq!(bookmarks.rename(page(4), "x"), Err(BookmarkError::NotFound(page(4))));
    }

    #[test]
    fn serializes_as_page_ordered_list() {
        let mut bookmarks = Bookmarks::new();
        bookmarks.add(page(9), "b").unwrap();
        bookmarks.add(page(2), "a").unwrap();

        let json = serde_json::to_string(&bookmarks).unwrap();
        let restored: Bookmarks = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, bookmarks);
        assert_eq!(
            restored.iter().map(|b| b.page).collect::<Vec<_>>(),
            vec![page(2), page(9)]
        );
    }
}
