mod common;

use std::rc::Rc;

use common::Blog;
use rendercache::prelude::*;
use rendercache::{PreloadMode, render_relation};

#[test]
fn deferred_preloading() {
    let blog = Blog::new();
    let mut books = blog.relation("books").preload("author");
    assert!(books.defer_preloading());
    books.load().unwrap();

    books.records()[0].exclude_from_preloading();

    let reader = AssociationReader::new(blog.preloader());
    reader.read(&books.records()[1], "author").unwrap();

    assert!(!books.records()[0].is_association_loaded("author"));
    assert!(books.records()[1].is_association_loaded("author"));
    assert_eq!(blog.load_ids(0), vec![2, 3, 4]);
}

#[test]
fn exclusion_is_idempotent() {
    let blog = Blog::new();
    let mut books = blog.relation("books").bulk_load("author");
    books.load().unwrap();

    let first = &books.records()[0];
    first.mark_as_cache_hit();
    first.mark_as_cache_hit();
    first.exclude_from_preloading();

    let root = books.root_loader().unwrap();
    assert_eq!(root.excluded_count(), 1);
    assert_eq!(root.batch().len(), 3);
}

fn post_html(reader: &AssociationReader<Record>, posts: &[Rc<Record>]) -> Result<Vec<String>> {
    posts
        .iter()
        .map(|post| {
            let author = reader.read_one(post, "author")?;
            let comments = reader.read(post, "comments")?;
            Ok(format!(
                "<li>post {} by {} ({} comments)</li>",
                post.id(),
                author.map_or(0, |a| a.id()),
                comments.len()
            ))
        })
        .collect()
}

#[test]
fn cached_render_loads_associations_for_misses_only() {
    let blog = Blog::new();
    let store = MemoryStore::<String>::new(64);
    let cache = CollectionRenderCache::new(&store, FragmentKey::new("posts/_post"));
    let seed = |id: i64| cache.fragment().expand_seed(&*blog.db.borrow().find("posts", id).unwrap());
    store.write(&seed(2), &"<li>cached 2</li>".to_string()).unwrap();
    store.write(&seed(3), &"<li>cached 3</li>".to_string()).unwrap();

    let spec = AssociationSpec::names(["author", "comments"]);
    let mut posts = blog.relation("posts").preload(spec);
    let reader = AssociationReader::new(blog.preloader());
    let mut payload = RenderPayload::default();

    let html = render_relation(&cache, &mut posts, &Cached::Default, &mut payload, |misses| {
        post_html(&reader, misses)
    })
    .unwrap();

    assert_eq!(
        html,
        vec![
            "<li>post 1 by 1 (2 comments)</li>",
            "<li>cached 2</li>",
            "<li>cached 3</li>",
            "<li>post 4 by 2 (0 comments)</li>",
        ]
    );
    assert_eq!(posts.mode(), PreloadMode::Deferred);
    // One batch per association, each over the two misses.
    assert_eq!(blog.loads(), 2);
    assert_eq!(blog.load_ids(0), vec![1, 4]);
    assert_eq!(blog.load_ids(1), vec![1, 4]);
    assert_eq!(reader.n1_stats().total_loads, 0);
    assert!(!posts.records()[1].is_association_loaded("author"));
    assert_eq!(payload.cache_hits, 2);
    assert_eq!(payload.written, 2);
}

#[test]
fn second_render_hits_everything_and_loads_nothing() {
    let blog = Blog::new();
    let store = MemoryStore::<String>::new(64);
    let cache = CollectionRenderCache::new(&store, FragmentKey::new("posts/_post"));
    let reader = AssociationReader::new(blog.preloader());

    let render = |payload: &mut RenderPayload| {
        let mut posts = blog.relation("posts").preload("author");
        render_relation(&cache, &mut posts, &Cached::Default, payload, |misses| {
            post_html(&reader, misses)
        })
        .unwrap()
    };

    let mut first = RenderPayload::default();
    let cold = render(&mut first);
    let loads_after_first = blog.loads();

    let mut second = RenderPayload::default();
    let warm = blog.assert_loads(0, || render(&mut second));

    assert_eq!(cold, warm);
    assert_eq!(second.cache_hits, 4);
    assert_eq!(second.rendered, 0);
    assert_eq!(blog.loads(), loads_after_first);
}

#[test]
fn nested_spec_on_misses_loads_each_path_once() {
    let blog = Blog::new();
    let store = MemoryStore::<String>::new(64);
    let cache = CollectionRenderCache::new(&store, FragmentKey::new("authors/_author"));
    let mary = blog.db.borrow().find("authors", 2).unwrap();
    store
        .write(&cache.fragment().expand_seed(&*mary), &"cached mary".to_string())
        .unwrap();

    let spec = AssociationSpec::from_paths(["posts.comments"]).unwrap();
    let mut authors = blog.relation("authors").preload(spec);
    let reader = AssociationReader::new(blog.preloader());
    let mut payload = RenderPayload::default();

    let html = render_relation(&cache, &mut authors, &Cached::Default, &mut payload, |misses| {
        misses
            .iter()
            .map(|author| -> Result<String> {
                let posts = reader.read(author, "posts")?;
                let comments: usize = posts
                    .iter()
                    .map(|p| reader.read(p, "comments").map(|c| c.len()))
                    .sum::<Result<usize>>()?;
                Ok(format!("author {}: {} posts, {} comments", author.id(), posts.len(), comments))
            })
            .collect()
    })
    .unwrap();

    assert_eq!(html, vec!["author 1: 2 posts, 3 comments", "cached mary"]);
    assert_eq!(blog.loads(), 2);
    assert_eq!(blog.load_ids(0), vec![1]);
    assert_eq!(blog.load_ids(1), vec![1, 2]);
    assert_eq!(reader.n1_stats().total_loads, 0);
}

#[test]
fn already_loaded_relation_is_not_deferred() {
    let blog = Blog::new();
    let store = MemoryStore::<String>::new(64);
    let cache = CollectionRenderCache::new(&store, FragmentKey::new("books/_book"));

    let mut books = blog.relation("books").preload("author");
    blog.assert_loads(1, || books.load().map(|_| ()).unwrap());

    let mut payload = RenderPayload::default();
    blog.assert_loads(0, || {
        render_relation(&cache, &mut books, &Cached::Default, &mut payload, |misses| {
            Ok(misses.iter().map(|b| format!("book {}", b.id())).collect::<Vec<String>>())
        })
        .unwrap()
    });
    assert_eq!(books.mode(), PreloadMode::Eager);
    assert_eq!(payload.written, 4);
}

#[test]
fn collapsed_keys_preload_only_the_surviving_misses() {
    let blog = Blog::new();
    let store = MemoryStore::<String>::new(64);
    let cache = CollectionRenderCache::new(&store, FragmentKey::new("books/_book"));
    store
        .write(&cache.fragment().expand("k4"), &"cached 4".to_string())
        .unwrap();
    let cached = Cached::seed(|book: &Rc<Record>| match book.id() {
        1 | 3 => "k1".to_string(),
        id => format!("k{id}"),
    });

    let mut books = blog.relation("books").preload("author");
    let reader = AssociationReader::new(blog.preloader());
    let mut payload = RenderPayload::default();

    let html = render_relation(&cache, &mut books, &cached, &mut payload, |misses| {
        misses
            .iter()
            .map(|book| -> Result<String> {
                let author = reader.read_one(book, "author")?;
                Ok(format!("book {} by {}", book.id(), author.map_or(0, |a| a.id())))
            })
            .collect()
    })
    .unwrap();

    assert_eq!(html, vec!["book 3 by 1", "book 2 by 1", "cached 4"]);
    assert_eq!(blog.loads(), 1);
    assert_eq!(blog.load_ids(0), vec![2, 3]);
    assert_eq!(reader.n1_stats().total_loads, 0);
    assert!(!books.records()[0].is_association_loaded("author"));
    assert_eq!(payload.cache_hits, 1);
    assert_eq!(payload.rendered, 2);
}
