//! In-memory SQL backend.
//!
//! `connect_database` opens a seeded in-memory database; `execute_query`
//! understands `SELECT <literal> [AS name], ...` and `SELECT * FROM <table>`.
//! Resources report "No database connection" until a connection exists.

use crate::dispatcher::Dispatcher;
use crate::resources::ResourceReader;
use crate::tools::Tool;
use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tether_core::{
    FieldType, InputSchema, PeerInfo, PropertySchema, ResourceDescriptor, ToolDescriptor,
};

#[derive(Debug, Clone)]
struct Table {
    schema: &'static str,
    name: &'static str,
    columns: Vec<&'static str>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
struct Database {
    server: String,
    name: String,
    tables: Vec<Table>,
}

impl Database {
    fn seeded(server: String, name: String) -> Self {
        let tables = vec![
            Table {
                schema: "dbo",
                name: "users",
                columns: vec!["id", "name", "email"],
                rows: vec![
                    vec![json!(1), json!("Ada"), json!("ada@example.com")],
                    vec![json!(2), json!("Grace"), json!("grace@example.com")],
                ],
            },
            Table {
                schema: "dbo",
                name: "orders",
                columns: vec!["id", "user_id", "total"],
                rows: vec![vec![json!(10), json!(1), json!(42.5)]],
            },
            Table {
                schema: "sales",
                name: "regions",
                columns: vec!["code", "label"],
                rows: vec![vec![json!("EU"), json!("Europe")]],
            },
        ];
        Self {
            server,
            name,
            tables,
        }
    }

    fn table(&self, reference: &str) -> Option<&Table> {
        let reference = reference.trim_matches(|c| c == '[' || c == ']');
        let (schema, name) = match reference.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, reference),
        };
        self.tables.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name)
                && schema.map_or(true, |s| t.schema.eq_ignore_ascii_case(s))
        })
    }
}

/// Connection state shared by the backend's tools and resources.
#[derive(Debug, Default)]
pub struct SqlState {
    connection: RwLock<Option<Database>>,
}

impl SqlState {
    fn with_db<T>(&self, f: impl FnOnce(Option<&Database>) -> T) -> Result<T> {
        let guard = self
            .connection
            .read()
            .map_err(|_| anyhow!("connection state poisoned"))?;
        Ok(f(guard.as_ref()))
    }

    fn connect(&self, database: Database) -> Result<()> {
        let mut guard = self
            .connection
            .write()
            .map_err(|_| anyhow!("connection state poisoned"))?;
        *guard = Some(database);
        Ok(())
    }
}

pub fn dispatcher() -> Dispatcher {
    let state = Arc::new(SqlState::default());
    Dispatcher::new(PeerInfo::new("sql-server-mcp", env!("CARGO_PKG_VERSION")))
        .with_tool(Arc::new(ExecuteQueryTool::new(state.clone())))
        .with_tool(Arc::new(ConnectDatabaseTool::new(state.clone())))
        .with_resource(Arc::new(TablesResource::new(state.clone())))
        .with_resource(Arc::new(SchemasResource::new(state)))
}

pub struct ConnectDatabaseTool {
    state: Arc<SqlState>,
}

impl ConnectDatabaseTool {
    pub fn new(state: Arc<SqlState>) -> Self {
        Self { state }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectDatabaseArgs {
    server: String,
    database: String,
    #[serde(default)]
    username: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ConnectDatabaseTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "connect_database",
            "Connect to SQL Server database",
            InputSchema::object()
                .string("server", "SQL Server instance")
                .string("database", "Database name")
                .string("username", "Username")
                .string("password", "Password")
                .required("server")
                .required("database"),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let args: ConnectDatabaseArgs = serde_json::from_value(arguments)?;
        if args.server.trim().is_empty() || args.database.trim().is_empty() {
            bail!("Connection failed: server and database must not be empty");
        }

        let auth = if args.username.is_some() {
            "sql login"
        } else {
            "trusted connection"
        };
        tracing::info!(server = %args.server, database = %args.database, auth, "database connected");

        let message = format!("Successfully connected to {}/{}", args.server, args.database);
        self.state
            .connect(Database::seeded(args.server, args.database))?;
        Ok(Value::String(message))
    }
}

pub struct ExecuteQueryTool {
    state: Arc<SqlState>,
}

impl ExecuteQueryTool {
    pub fn new(state: Arc<SqlState>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl Tool for ExecuteQueryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "execute_query",
            "Execute a SQL query on the connected database",
            InputSchema::object()
                .string("query", "SQL query to execute")
                .property(
                    "parameters",
                    PropertySchema::new(FieldType::Array, "Query parameters")
                        .with_items(PropertySchema::new(FieldType::String, "Parameter")),
                )
                .required("query"),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let query = arguments["query"].as_str().unwrap_or_default();
        self.state.with_db(|db| match db {
            Some(db) => execute(db, query),
            None => Err(anyhow!("No database connection. Please connect first.")),
        })?
    }
}

fn execute(db: &Database, query: &str) -> Result<Value> {
    let query = query.trim().trim_end_matches(';').trim();
    let Some(rest) = strip_keyword(query, "SELECT") else {
        bail!("Unsupported query: only SELECT statements are supported");
    };

    if let Some(table_ref) = strip_keyword(rest, "*").and_then(|r| strip_keyword(r, "FROM")) {
        let table = db
            .table(table_ref.trim())
            .ok_or_else(|| anyhow!("Invalid object name '{}'", table_ref.trim()))?;
        return Ok(json!({
            "columns": table.columns,
            "rows": table.rows,
            "row_count": table.rows.len(),
        }));
    }

    let mut columns = Vec::new();
    let mut row = Vec::new();
    for item in rest.split(',') {
        let (literal, alias) = split_alias(item.trim());
        columns.push(alias.unwrap_or(literal).to_string());
        row.push(parse_literal(literal)?);
    }

    Ok(json!({
        "columns": columns,
        "rows": [row],
        "row_count": 1,
    }))
}

/// Strip a leading case-insensitive keyword followed by whitespace (or end).
fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let head = input.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &input[keyword.len()..];
    if keyword == "*" || rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn split_alias(item: &str) -> (&str, Option<&str>) {
    let lower = item.to_ascii_lowercase();
    match lower.rfind(" as ") {
        Some(pos) => (item[..pos].trim(), Some(item[pos + 4..].trim())),
        None => (item, None),
    }
}

fn parse_literal(literal: &str) -> Result<Value> {
    if literal.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if let Some(text) = literal
        .strip_prefix('\'')
        .and_then(|l| l.strip_suffix('\''))
    {
        return Ok(Value::String(text.replace("''", "'")));
    }
    if let Ok(int) = literal.parse::<i64>() {
        return Ok(json!(int));
    }
    if let Ok(float) = literal.parse::<f64>() {
        return Ok(json!(float));
    }
    bail!("Unsupported select expression: {}", literal)
}

pub struct TablesResource {
    state: Arc<SqlState>,
}

impl TablesResource {
    pub fn new(state: Arc<SqlState>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl ResourceReader for TablesResource {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new("sql://tables", "Database Tables", "List all tables in the database")
    }

    async fn read(&self) -> Result<Value> {
        self.state.with_db(|db| {
            let db = db.ok_or_else(|| anyhow!("No database connection"))?;
            let mut tables: Vec<_> = db
                .tables
                .iter()
                .map(|t| json!({"schema": t.schema, "name": t.name, "type": "BASE TABLE"}))
                .collect();
            tables.sort_by_key(|t| (t["schema"].to_string(), t["name"].to_string()));
            Ok(json!({"database": db.name, "server": db.server, "tables": tables}))
        })?
    }
}

pub struct SchemasResource {
    state: Arc<SqlState>,
}

impl SchemasResource {
    pub fn new(state: Arc<SqlState>) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl ResourceReader for SchemasResource {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new("sql://schemas", "Database Schemas", "List all schemas in the database")
    }

    async fn read(&self) -> Result<Value> {
        self.state.with_db(|db| {
            let db = db.ok_or_else(|| anyhow!("No database connection"))?;
            let schemas: BTreeSet<_> = db.tables.iter().map(|t| t.schema).collect();
            Ok(json!({"schemas": schemas}))
        })?
    }
}
