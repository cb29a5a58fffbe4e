//! Shared fixtures: a small blog schema with users, posts, a view and a join.
//!
//! Each integration test binary uses a different subset of these; items only
//! one binary touches carry `#[allow(dead_code)]`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rowbind_core::{
    AdapterShape, ColumnDef, ContainerAdapter, ContainerColumn, ConversionError, DataMap,
    DatabaseDeclaration, DatabaseListener, Error, Migration, MigrationError, Model, ModelAdapter,
    ResolvedColumns, Row, ScalarKind, StorageEngine, TypeConverter, Value,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub active: bool,
}
impl Model for User {}

pub struct UserAdapter {
    columns: Vec<ColumnDef>,
}

impl Default for UserAdapter {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("id", ScalarKind::Int64).with_auto_increment(),
                ColumnDef::new("name", ScalarKind::String).with_not_null(),
                ColumnDef::new("active", ScalarKind::Bool),
            ],
        }
    }
}

impl ModelAdapter for UserAdapter {
    type Record = User;

    fn table_name(&self) -> &str {
        "users"
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn load(&self, mut row: Row) -> Result<User, Error> {
        Ok(User {
            id: row.take("id").as_i64().unwrap_or_default(),
            name: row.take("name").as_str().unwrap_or_default().to_string(),
            active: row.take("active").as_bool().unwrap_or_default(),
        })
    }

    fn store(&self, record: &User) -> Row {
        Row::new()
            .with("id", record.id)
            .with("name", record.name.as_str())
            .with("active", record.active)
    }
}

pub struct UserContainer {
    columns: Vec<ContainerColumn>,
}

impl Default for UserContainer {
    fn default() -> Self {
        Self {
            columns: vec![
                ContainerColumn::direct("id"),
                ContainerColumn::direct("name"),
                ContainerColumn::direct("active"),
            ],
        }
    }
}

impl ContainerAdapter for UserContainer {
    type Record = User;

    fn columns(&self) -> &[ContainerColumn] {
        &self.columns
    }

    fn assemble(&self, columns: &mut ResolvedColumns) -> Result<User, Error> {
        Ok(User {
            id: columns.take_value("id").as_i64().unwrap_or_default(),
            name: columns
                .take_value("name")
                .as_str()
                .unwrap_or_default()
                .to_string(),
            active: columns.take_value("active").as_bool().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub author: Option<User>,
}
impl Model for Post {}

pub struct PostAdapter {
    columns: Vec<ColumnDef>,
}

impl Default for PostAdapter {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("id", ScalarKind::Int64).with_auto_increment(),
                ColumnDef::new("title", ScalarKind::String),
                ColumnDef::new("author_id", ScalarKind::Int64),
            ],
        }
    }
}

impl ModelAdapter for PostAdapter {
    type Record = Post;

    fn table_name(&self) -> &str {
        "posts"
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn load(&self, mut row: Row) -> Result<Post, Error> {
        Ok(Post {
            id: row.take("id").as_i64().unwrap_or_default(),
            title: row.take("title").as_str().unwrap_or_default().to_string(),
            author: row.take("author_id").as_i64().map(|id| User {
                id,
                ..Default::default()
            }),
        })
    }

    fn store(&self, record: &Post) -> Row {
        Row::new()
            .with("id", record.id)
            .with("title", record.title.as_str())
            .with("author_id", record.author.as_ref().map(|a| a.id))
    }
}

pub struct PostContainer {
    columns: Vec<ContainerColumn>,
}

impl Default for PostContainer {
    fn default() -> Self {
        Self {
            columns: vec![
                ContainerColumn::direct("id"),
                ContainerColumn::direct("title"),
                ContainerColumn::record::<User>("author"),
            ],
        }
    }
}

impl ContainerAdapter for PostContainer {
    type Record = Post;

    fn columns(&self) -> &[ContainerColumn] {
        &self.columns
    }

    fn assemble(&self, columns: &mut ResolvedColumns) -> Result<Post, Error> {
        Ok(Post {
            id: columns.take_value("id").as_i64().unwrap_or_default(),
            title: columns
                .take_value("title")
                .as_str()
                .unwrap_or_default()
                .to_string(),
            author: columns.record::<User>("author")?,
        })
    }

    fn disassemble(&self, record: &Post) -> Option<DataMap> {
        let author = record.author.as_ref().map(|a| {
            Value::from(
                DataMap::new()
                    .with("id", a.id)
                    .with("name", a.name.as_str())
                    .with("active", a.active),
            )
        });
        Some(
            DataMap::new()
                .with("id", record.id)
                .with("title", record.title.as_str())
                .with("author", author.unwrap_or(Value::Null)),
        )
    }
}

/// Read-only projection of active users.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActiveUser {
    pub id: i64,
    pub name: String,
}
impl Model for ActiveUser {}

pub struct ActiveUserView {
    columns: Vec<ColumnDef>,
}

impl Default for ActiveUserView {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("id", ScalarKind::Int64).with_primary_key(),
                ColumnDef::new("name", ScalarKind::String),
            ],
        }
    }
}

impl ModelAdapter for ActiveUserView {
    type Record = ActiveUser;

    fn table_name(&self) -> &str {
        "active_users"
    }

    fn shape(&self) -> AdapterShape {
        AdapterShape::View {
            query: "SELECT id, name FROM users WHERE active = 1".to_string(),
        }
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn load(&self, mut row: Row) -> Result<ActiveUser, Error> {
        Ok(ActiveUser {
            id: row.take("id").as_i64().unwrap_or_default(),
            name: row.take("name").as_str().unwrap_or_default().to_string(),
        })
    }

    fn store(&self, record: &ActiveUser) -> Row {
        Row::new()
            .with("id", record.id)
            .with("name", record.name.as_str())
    }
}

/// A post joined with its author's name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PostWithAuthor {
    pub post_id: i64,
    pub title: String,
    pub author_name: Option<String>,
}
impl Model for PostWithAuthor {}

pub struct PostWithAuthorJoin {
    columns: Vec<ColumnDef>,
}

impl Default for PostWithAuthorJoin {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("post_id", ScalarKind::Int64),
                ColumnDef::new("title", ScalarKind::String),
                ColumnDef::new("author_name", ScalarKind::String),
            ],
        }
    }
}

impl ModelAdapter for PostWithAuthorJoin {
    type Record = PostWithAuthor;

    fn table_name(&self) -> &str {
        "post_authors"
    }

    fn shape(&self) -> AdapterShape {
        AdapterShape::Join {
            query: "SELECT p.id AS post_id, p.title AS title, u.name AS author_name \
                    FROM posts p LEFT JOIN users u ON u.id = p.author_id"
                .to_string(),
        }
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn load(&self, mut row: Row) -> Result<PostWithAuthor, Error> {
        Ok(PostWithAuthor {
            post_id: row.take("post_id").as_i64().unwrap_or_default(),
            title: row.take("title").as_str().unwrap_or_default().to_string(),
            author_name: row.take("author_name").as_str().map(str::to_string),
        })
    }

    fn store(&self, record: &PostWithAuthor) -> Row {
        Row::new()
            .with("post_id", record.post_id)
            .with("title", record.title.as_str())
            .with("author_name", record.author_name.clone())
    }
}

/// A record type registered with a table only, never opted into containers.
#[allow(dead_code)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}
impl Model for Tag {}

#[allow(dead_code)]
pub struct TagAdapter {
    columns: Vec<ColumnDef>,
}

impl Default for TagAdapter {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("id", ScalarKind::Int64).with_auto_increment(),
                ColumnDef::new("label", ScalarKind::String),
            ],
        }
    }
}

impl ModelAdapter for TagAdapter {
    type Record = Tag;

    fn table_name(&self) -> &str {
        "tags"
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn load(&self, mut row: Row) -> Result<Tag, Error> {
        Ok(Tag {
            id: row.take("id").as_i64().unwrap_or_default(),
            label: row.take("label").as_str().unwrap_or_default().to_string(),
        })
    }

    fn store(&self, record: &Tag) -> Row {
        Row::new()
            .with("id", record.id)
            .with("label", record.label.as_str())
    }
}

/// An invoice whose amount is stored through the `cents` converter.
#[allow(dead_code)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub amount: f64,
}
impl Model for Invoice {}

#[allow(dead_code)]
pub struct InvoiceAdapter {
    columns: Vec<ColumnDef>,
}

impl Default for InvoiceAdapter {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDef::new("id", ScalarKind::Int64).with_auto_increment(),
                ColumnDef::custom("amount", "cents"),
            ],
        }
    }
}

impl ModelAdapter for InvoiceAdapter {
    type Record = Invoice;

    fn table_name(&self) -> &str {
        "invoices"
    }

    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn load(&self, mut row: Row) -> Result<Invoice, Error> {
        Ok(Invoice {
            id: row.take("id").as_i64().unwrap_or_default(),
            amount: row.take("amount").as_f64().unwrap_or_default(),
        })
    }

    fn store(&self, record: &Invoice) -> Row {
        Row::new()
            .with("id", record.id)
            .with("amount", record.amount)
    }
}

#[allow(dead_code)]
pub struct InvoiceContainer {
    columns: Vec<ContainerColumn>,
}

impl Default for InvoiceContainer {
    fn default() -> Self {
        Self {
            columns: vec![ContainerColumn::direct("id"), ContainerColumn::direct("amount")],
        }
    }
}

impl ContainerAdapter for InvoiceContainer {
    type Record = Invoice;

    fn columns(&self) -> &[ContainerColumn] {
        &self.columns
    }

    fn assemble(&self, columns: &mut ResolvedColumns) -> Result<Invoice, Error> {
        Ok(Invoice {
            id: columns.take_value("id").as_i64().unwrap_or_default(),
            amount: columns.take_value("amount").as_f64().unwrap_or_default(),
        })
    }
}

/// Stores decimal amounts as integer cents.
#[allow(dead_code)]
pub struct CentsConverter;

impl TypeConverter for CentsConverter {
    fn storage_kind(&self) -> ScalarKind {
        ScalarKind::Int64
    }

    fn to_storage(&self, value: Value) -> Result<Value, ConversionError> {
        value
            .as_f64()
            .map(|f| Value::Int64((f * 100.0).round() as i64))
            .ok_or_else(|| ConversionError::new("cents", "expected a number"))
    }

    fn from_storage(&self, value: Value) -> Result<Value, ConversionError> {
        value
            .as_i64()
            .map(|c| Value::Float64(c as f64 / 100.0))
            .ok_or_else(|| ConversionError::new("cents", "expected an integer"))
    }
}

/// Ordered log of lifecycle events shared between migrations and listeners.
#[allow(dead_code)]
pub type EventLog = Arc<Mutex<Vec<String>>>;

#[allow(dead_code)]
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Migration recording each phase into an event log.
#[allow(dead_code)]
pub struct RecordingMigration {
    pub name: &'static str,
    pub log: EventLog,
    pub sql: Option<&'static str>,
}

#[allow(dead_code)]
impl RecordingMigration {
    pub fn new(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            sql: None,
        }
    }

    pub fn with_sql(mut self, sql: &'static str) -> Self {
        self.sql = Some(sql);
        self
    }
}

impl Migration for RecordingMigration {
    fn name(&self) -> &str {
        self.name
    }

    fn on_pre_migrate(&self) {
        self.log.lock().push(format!("pre:{}", self.name));
    }

    fn migrate(&self, storage: &dyn StorageEngine) -> Result<(), MigrationError> {
        self.log.lock().push(format!("migrate:{}", self.name));
        if let Some(sql) = self.sql {
            storage.execute_raw(sql)?;
        }
        Ok(())
    }

    fn on_post_migrate(&self) {
        self.log.lock().push(format!("post:{}", self.name));
    }
}

/// Listener counting each hook. Clones share their counters.
#[derive(Clone, Default)]
pub struct CountingListener {
    counts: Arc<HookCounts>,
}

#[derive(Default)]
struct HookCounts {
    created: AtomicUsize,
    upgraded: AtomicUsize,
    opened: AtomicUsize,
}

impl CountingListener {
    pub fn created(&self) -> usize {
        self.counts.created.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn upgraded(&self) -> usize {
        self.counts.upgraded.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counts.opened.load(Ordering::SeqCst)
    }
}

impl DatabaseListener for CountingListener {
    fn on_create(&self, _storage: &dyn StorageEngine) -> Result<(), Error> {
        self.counts.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_upgrade(&self, _storage: &dyn StorageEngine, _old: u32, _new: u32) -> Result<(), Error> {
        self.counts.upgraded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_open(&self, _storage: &dyn StorageEngine) -> Result<(), Error> {
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The blog database: users and posts with containers, a view and a join.
pub fn blog_database(storage: Arc<dyn StorageEngine>) -> DatabaseDeclaration {
    DatabaseDeclaration::new("blog", 1, storage)
        .with_model(UserAdapter::default())
        .with_model(PostAdapter::default())
        .with_model(ActiveUserView::default())
        .with_model(PostWithAuthorJoin::default())
        .with_container(UserContainer::default())
        .with_container(PostContainer::default())
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
