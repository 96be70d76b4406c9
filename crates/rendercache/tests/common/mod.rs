//! Shared fixtures for rendercache integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use rendercache::{MemoryPreloader, Record, Relation, SharedPreloader};

/// An in-memory blog: authors, posts, comments, plus books for the singular cases.
///
/// ```text
/// authors: 1 David, 2 Mary
/// posts:   1 (author 1), 2 (author 1), 3 (author 2), 4 (author 2)
/// comments on posts 1, 1, 2, 3
/// books:   1, 2, 3 (author 1), 4 (author 2)
/// ```
pub struct Blog {
    pub db: Rc<RefCell<MemoryPreloader>>,
}

#[allow(dead_code)]
impl Blog {
    pub fn new() -> Self {
        let mut db = MemoryPreloader::new();
        db.insert(Record::new("authors", 1).with_attribute("name", "David"));
        db.insert(Record::new("authors", 2).with_attribute("name", "Mary"));

        for (id, author, title) in [
            (1, 1, "Welcome to the weblog"),
            (2, 1, "So I was thinking"),
            (3, 2, "I don't have any comments"),
            (4, 2, "sti comments"),
        ] {
            db.insert(
                Record::new("posts", id)
                    .with_attribute("author_id", author)
                    .with_attribute("title", title)
                    .with_attribute("updated_at", format!("2024010{id}")),
            );
        }

        for (id, post, body) in [
            (1, 1, "Thank you for the welcome"),
            (2, 1, "Thank you again for the welcome"),
            (3, 2, "Don't think too hard"),
            (4, 3, "Normal type"),
        ] {
            db.insert(
                Record::new("comments", id)
                    .with_attribute("post_id", post)
                    .with_attribute("body", body),
            );
        }

        for (id, author) in [(1, 1), (2, 1), (3, 1), (4, 2)] {
            db.insert(Record::new("books", id).with_attribute("author_id", author));
        }

        db.has_many("authors", "posts", "posts", "author_id")
            .has_many("authors", "books", "books", "author_id")
            .belongs_to("posts", "author", "authors", "author_id")
            .has_many("posts", "comments", "comments", "post_id")
            .belongs_to("comments", "post", "posts", "post_id")
            .belongs_to("books", "author", "authors", "author_id");

        Self {
            db: Rc::new(RefCell::new(db)),
        }
    }

    pub fn preloader(&self) -> SharedPreloader<Record> {
        self.db.clone()
    }

    pub fn all(&self, table: &str) -> Vec<Rc<Record>> {
        self.db.borrow().all(table)
    }

    pub fn relation(&self, table: &str) -> Relation<Record> {
        Relation::new(self.all(table), self.preloader())
    }

    /// Batch fetches issued so far.
    pub fn loads(&self) -> usize {
        self.db.borrow().call_count()
    }

    /// Owner ids of the `n`th batch fetch.
    pub fn load_ids(&self, n: usize) -> Vec<i64> {
        self.db.borrow().calls()[n].ids.clone()
    }

    /// Run `f` and assert it issued exactly `expected` batch fetches.
    #[track_caller]
    pub fn assert_loads<T>(&self, expected: usize, f: impl FnOnce() -> T) -> T {
        let before = self.loads();
        let out = f();
        let issued = self.loads() - before;
        assert_eq!(
            issued, expected,
            "expected {expected} batch load(s), got {issued}: {:?}",
            &self.db.borrow().calls()[before..]
        );
        out
    }
}
