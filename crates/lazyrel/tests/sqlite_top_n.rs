//! Batched top-N statements executed by an in-memory SQLite database.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::sqlite::SqliteMemory;
use common::{Comment, ids, post, unwrap_outcome};
use lazyrel::prelude::*;

/// Post 1 approved by age: 4, 2, 1 (3 is newer than 2 but unapproved).
/// Post 2 approved by age: 8, 7, 5 (6 is the newest but unapproved).
/// Post 3 has no comments.
const FIXTURE: &str = "
    CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
    CREATE TABLE comments (
        id INTEGER PRIMARY KEY,
        post_id INTEGER NOT NULL REFERENCES posts (id),
        author_id INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        approved INTEGER NOT NULL
    );
    INSERT INTO posts (id, title) VALUES (1, 'post 1'), (2, 'post 2'), (3, 'post 3');
    INSERT INTO comments (id, post_id, author_id, created_at, approved) VALUES
        (1, 1, 1, 1, 1),
        (2, 1, 2, 2, 1),
        (3, 1, 1, 3, 0),
        (4, 1, 2, 4, 1),
        (5, 2, 1, 1, 1),
        (6, 2, 2, 5, 0),
        (7, 2, 1, 2, 1),
        (8, 2, 2, 3, 1);
";

fn database() -> SqliteMemory {
    let db = SqliteMemory::open();
    db.execute_batch(FIXTURE);
    db
}

fn approved_newest_first() -> Select<Comment> {
    Select::new()
        .filter(Expr::col("approved").eq(true))
        .order_by(Expr::col("created_at").desc())
}

#[test]
fn window_function_respects_filter_and_limit() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let scope = BatchScope::new(database());

    let views: Vec<_> = (1..=3)
        .map(|id| {
            scope
                .view_for("comments", approved_newest_first().limit(2), post(id))
                .unwrap()
        })
        .collect();

    rt.block_on(async {
        let second = unwrap_outcome(views[1].to_list(&cx, scope.connection()).await);
        let first = unwrap_outcome(views[0].to_list(&cx, scope.connection()).await);
        let third = unwrap_outcome(views[2].to_list(&cx, scope.connection()).await);
        assert_eq!(ids(&first), vec![4, 2]);
        assert_eq!(ids(&second), vec![8, 7]);
        assert!(third.is_empty());
        assert_eq!(first[0].created_at, 4);
    });

    let statements = scope.connection().statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("ROW_NUMBER() OVER (PARTITION BY \"comments\".\"post_id\""));
}

#[test]
fn window_function_applies_offset_per_parent() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let scope = BatchScope::new(database());
    let query = approved_newest_first().offset(1).limit(2);

    let v1 = scope.view_for("comments", query.clone(), post(1)).unwrap();
    let v2 = scope.view_for("comments", query, post(2)).unwrap();

    rt.block_on(async {
        assert_eq!(
            ids(&unwrap_outcome(v1.to_list(&cx, scope.connection()).await)),
            vec![2, 1]
        );
        assert_eq!(
            ids(&unwrap_outcome(v2.to_list(&cx, scope.connection()).await)),
            vec![7, 5]
        );
    });
    assert_eq!(scope.connection().statements().len(), 1);
}

#[test]
fn last_returns_oldest_matching_child() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let scope = BatchScope::new(database());

    let v1 = scope
        .view_for("comments", approved_newest_first(), post(1))
        .unwrap();
    let v2 = scope
        .view_for("comments", approved_newest_first(), post(2))
        .unwrap();

    rt.block_on(async {
        let Last::One(Some(oldest)) = unwrap_outcome(v1.last(&cx, scope.connection(), 1).await)
        else {
            panic!("expected a single comment");
        };
        assert_eq!(oldest.id, 1);

        let children = unwrap_outcome(v2.to_list(&cx, scope.connection()).await);
        assert_eq!(ids(&children), vec![5]);
    });
    assert_eq!(scope.connection().statements().len(), 1);
}
