//! Shared fixtures for the batched-loading tests.
//!
//! `MockConnection` records every statement and answers top-N statements from
//! an in-memory comment table. It reads the per-parent limit and the
//! `created_at` direction back out of the rendered SQL, so the rows it returns
//! follow what the statement actually asked for.

#![allow(dead_code)]

pub mod sqlite;

use lazyrel::prelude::*;
use lazyrel::{LinkTableInfo, PARENT_PK_COLUMN, QueryError, QueryErrorKind};
use std::future::Future;
use std::sync::{Arc, Mutex};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

// ==================== Models ====================

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl Model for User {
    const TABLE_NAME: &'static str = "users";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id").primary_key(true),
            FieldInfo::new("name"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("name", Value::Text(self.name.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
}

impl Model for Post {
    const TABLE_NAME: &'static str = "posts";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[
        RelationshipInfo::to_model::<Comment>("comments", RelationshipKind::OneToMany)
            .remote_key("post_id"),
        RelationshipInfo::to_model::<Comment>("tags", RelationshipKind::ManyToMany)
            .link_table(LinkTableInfo::new("post_tags", "post_id", "tag_id")),
    ];

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id").primary_key(true).nullable(true),
            FieldInfo::new("title"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("title", Value::Text(self.title.clone())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub created_at: i64,
    pub author: Related<User>,
}

impl Model for Comment {
    const TABLE_NAME: &'static str = "comments";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] =
        &[
            RelationshipInfo::to_model::<User>("author", RelationshipKind::ManyToOne)
                .local_key("author_id"),
        ];

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id").primary_key(true),
            FieldInfo::new("post_id"),
            FieldInfo::new("author_id"),
            FieldInfo::new("created_at"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::BigInt(self.id)),
            ("post_id", Value::BigInt(self.post_id)),
            ("author_id", Value::BigInt(self.author_id)),
            ("created_at", Value::Timestamp(self.created_at)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let author = match row.subset_by_prefix(User::TABLE_NAME) {
            Some(sub) => Related::loaded(Some(User::from_row(&sub)?)),
            None => Related::empty(),
        };
        Ok(Self {
            id: row.get_named("id")?,
            post_id: row.get_named("post_id")?,
            author_id: row.get_named("author_id")?,
            created_at: row.get_named("created_at")?,
            author,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }
}

pub fn post(id: i64) -> Post {
    Post {
        id: Some(id),
        title: format!("post {id}"),
    }
}

pub fn comment(id: i64, post_id: i64, author_id: i64, created_at: i64) -> Comment {
    Comment {
        id,
        post_id,
        author_id,
        created_at,
        author: Related::empty(),
    }
}

/// P1: c1@t1, c2@t2, c3@t3; P2: c4@t1, c5@t4.
pub fn two_posts_five_comments() -> Vec<Comment> {
    vec![
        comment(1, 1, 1, 1),
        comment(2, 1, 2, 2),
        comment(3, 1, 1, 3),
        comment(4, 2, 2, 1),
        comment(5, 2, 1, 4),
    ]
}

pub fn users() -> Vec<User> {
    vec![
        User {
            id: 1,
            name: "ana".to_string(),
        },
        User {
            id: 2,
            name: "bo".to_string(),
        },
    ]
}

pub fn ids(comments: &[Comment]) -> Vec<i64> {
    comments.iter().map(|c| c.id).collect()
}

// ==================== Mock connection ====================

#[derive(Debug, Default)]
pub struct MockState {
    pub comments: Vec<Comment>,
    pub users: Vec<User>,
    pub calls: usize,
    pub statements: Vec<(String, Vec<Value>)>,
    pub failures_remaining: usize,
}

#[derive(Debug, Clone)]
pub struct MockConnection {
    dialect: Dialect,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new(dialect: Dialect, comments: Vec<Comment>) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(MockState {
                comments,
                ..MockState::default()
            })),
        }
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        self.state.lock().unwrap().users = users;
        self
    }

    /// Fail the next `n` statements with a timeout.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().failures_remaining = n;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn last_sql(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .statements
            .last()
            .map(|(sql, _)| sql.clone())
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.statements.push((sql.to_string(), params.to_vec()));

        let outcome = if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            Outcome::Err(Error::Query(QueryError {
                kind: QueryErrorKind::Timeout,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message: "statement timed out".to_string(),
                source: None,
            }))
        } else {
            Outcome::Ok(evaluate_top_n(&state, sql, params))
        };
        async move { outcome }
    }
}

/// Answer a top-N statement from the fixture table.
///
/// Leading integer parameters are the parent keys.
fn evaluate_top_n(state: &MockState, sql: &str, params: &[Value]) -> Vec<Row> {
    if sql.contains("WHERE 1 = 0") {
        return Vec::new();
    }

    let keys: Vec<i64> = params
        .iter()
        .map_while(|v| match v {
            Value::BigInt(n) => Some(*n),
            Value::Int(n) => Some(i64::from(*n)),
            _ => None,
        })
        .collect();
    let limit = number_after(sql, " LIMIT ")
        .or_else(|| number_after(sql, "\"__row_number\" <= "))
        .unwrap_or(usize::MAX);
    let descending = sql.contains("\"created_at\" DESC");
    let with_authors = sql.contains("LEFT JOIN users");

    let mut rows = Vec::new();
    for key in keys {
        let mut children: Vec<&Comment> =
            state.comments.iter().filter(|c| c.post_id == key).collect();
        children.sort_by_key(|c| c.created_at);
        if descending {
            children.reverse();
        }
        for child in children.into_iter().take(limit) {
            let mut names = vec![
                "id".to_string(),
                "post_id".to_string(),
                "author_id".to_string(),
                "created_at".to_string(),
            ];
            let mut values = vec![
                Value::BigInt(child.id),
                Value::BigInt(child.post_id),
                Value::BigInt(child.author_id),
                Value::BigInt(child.created_at),
            ];
            if with_authors {
                let author = state.users.iter().find(|u| u.id == child.author_id);
                names.push("users__id".to_string());
                names.push("users__name".to_string());
                values.push(author.map_or(Value::Null, |u| Value::BigInt(u.id)));
                values.push(author.map_or(Value::Null, |u| Value::Text(u.name.clone())));
            }
            names.push(PARENT_PK_COLUMN.to_string());
            values.push(Value::BigInt(key));
            rows.push(Row::new(names, values));
        }
    }
    rows
}

fn number_after(sql: &str, marker: &str) -> Option<usize> {
    let start = sql.find(marker)? + marker.len();
    let digits: String = sql[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
