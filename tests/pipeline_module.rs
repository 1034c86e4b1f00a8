use serde_json::{json, Map, Value};
use skaigate::config::PipelineConfig;
use skaigate::parser::completion::{CompletionClient, CompletionError};
use skaigate::pipeline::{CommandPipeline, CommandRequest};
use skaigate::scope::{Identity, IdentityProvider};
use skaigate::shared::errors::PipelineError;
use skaigate::shared::ids::{TableName, UserId};
use skaigate::store::{Datastore, Filter, QueryOutcome, SqliteStore, StoreError};
use std::cell::RefCell;

struct FixedIdentity {
    user: &'static str,
}

impl IdentityProvider for FixedIdentity {
    fn resolve(&self, bearer_token: &str) -> Result<Identity, PipelineError> {
        if bearer_token == "valid-token" {
            Ok(Identity {
                id: UserId::parse(self.user).expect("user id"),
                email: format!("{}@example.com", self.user),
            })
        } else {
            Err(PipelineError::Authentication(
                "unknown bearer token".to_string(),
            ))
        }
    }
}

struct ScriptedClient {
    reply: Result<String, fn() -> CompletionError>,
}

impl ScriptedClient {
    fn text(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
        }
    }

    fn unavailable() -> Self {
        Self {
            reply: Err(|| CompletionError::NotConfigured("no api key".to_string())),
        }
    }

    fn timeout() -> Self {
        Self {
            reply: Err(|| CompletionError::Timeout { timeout_ms: 30_000 }),
        }
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, _system: &str, _user: &str) -> Result<String, CompletionError> {
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(make) => Err(make()),
        }
    }
}

struct CountingStore<'a> {
    inner: &'a SqliteStore,
    mutated_tables: RefCell<Vec<String>>,
}

impl<'a> CountingStore<'a> {
    fn new(inner: &'a SqliteStore) -> Self {
        Self {
            inner,
            mutated_tables: RefCell::new(Vec::new()),
        }
    }

    fn mutated_tables(&self) -> Vec<String> {
        self.mutated_tables.borrow().clone()
    }
}

impl Datastore for CountingStore<'_> {
    fn select(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError> {
        self.inner.select(table, filters)
    }

    fn insert(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
    ) -> Result<QueryOutcome, StoreError> {
        self.mutated_tables.borrow_mut().push(table.to_string());
        self.inner.insert(table, data)
    }

    fn update(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
        filters: &[Filter],
    ) -> Result<QueryOutcome, StoreError> {
        self.mutated_tables.borrow_mut().push(table.to_string());
        self.inner.update(table, data, filters)
    }

    fn delete(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError> {
        self.mutated_tables.borrow_mut().push(table.to_string());
        self.inner.delete(table, filters)
    }
}

struct FailingAuditStore<'a> {
    inner: &'a SqliteStore,
    audit_table: TableName,
}

impl Datastore for FailingAuditStore<'_> {
    fn select(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError> {
        self.inner.select(table, filters)
    }

    fn insert(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
    ) -> Result<QueryOutcome, StoreError> {
        if table == &self.audit_table {
            return Err(StoreError::InvalidRow("audit table unavailable".to_string()));
        }
        self.inner.insert(table, data)
    }

    fn update(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
        filters: &[Filter],
    ) -> Result<QueryOutcome, StoreError> {
        self.inner.update(table, data, filters)
    }

    fn delete(&self, table: &TableName, filters: &[Filter]) -> Result<QueryOutcome, StoreError> {
        self.inner.delete(table, filters)
    }
}

fn seeded_store(dir: &std::path::Path) -> SqliteStore {
    let store = SqliteStore::open(&dir.join("pipeline.db")).expect("open store");
    store.ensure_schema().expect("schema");
    let members = TableName::parse("company_members").expect("table");
    let mut row = Map::new();
    row.insert("user_id".to_string(), json!("user-1"));
    row.insert("company_id".to_string(), json!("co-1"));
    row.insert("status".to_string(), json!("active"));
    store.insert(&members, &row).expect("seed membership");
    store
}

fn request(prompt: &str) -> CommandRequest {
    serde_json::from_value(json!({
        "prompt": prompt,
        "projectId": "proj-1",
    }))
    .expect("request")
}

#[test]
fn pipeline_module_executes_a_model_derived_insert_plan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };
    let client = ScriptedClient::text(
        r#"{"operation":"INSERT","table":"activities","data":{"name":"Site Prep","duration":"3 days","cost_est":500},"explanation":"create the activity"}"#,
    );

    let pipeline = CommandPipeline {
        config: &config,
        store: &store,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("Add Site Prep, 3 days, $500"));

    assert_eq!(response.status, 200);
    assert_eq!(response.body["success"], json!(true));
    assert_eq!(response.body["operation"], json!("INSERT"));
    assert_eq!(response.body["table"], json!("activities"));
    assert_eq!(response.body["recordsAffected"], json!(1));
    assert_eq!(response.body["data"][0]["company_id"], json!("co-1"));
    assert_eq!(response.body["data"][0]["duration"], json!("3 days"));

    let audit = store
        .select(&config.audit_table, &[])
        .expect("audit select");
    assert_eq!(audit.records_affected, 1);
    assert_eq!(audit.rows[0]["success"], json!(true));
    assert_eq!(audit.rows[0]["command_text"], json!("Add Site Prep, 3 days, $500"));
    assert_eq!(audit.rows[0]["context_data"]["plan"]["operation"], json!("INSERT"));
}

#[test]
fn pipeline_module_zero_tenant_caller_never_reaches_the_executor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let counting = CountingStore::new(&store);
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-9" };
    let client = ScriptedClient::text(
        r#"{"operation":"DELETE","table":"activities","filters":{"name":"x"}}"#,
    );

    let pipeline = CommandPipeline {
        config: &config,
        store: &counting,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("delete everything"));

    assert_eq!(response.status, 403);
    assert_eq!(response.body["success"], json!(false));
    assert_eq!(
        counting.mutated_tables(),
        vec![config.audit_table.to_string()]
    );
}

#[test]
fn pipeline_module_invalid_token_is_a_401() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };

    let pipeline = CommandPipeline {
        config: &config,
        store: &store,
        identity: &identity,
        completion: None,
        state_root: None,
    };
    let response = pipeline.handle("wrong-token", &request("list activities"));
    assert_eq!(response.status, 401);
    assert_eq!(response.body["success"], json!(false));
}

#[test]
fn pipeline_module_parse_failure_surfaces_the_raw_model_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };
    let client = ScriptedClient::text("I cannot help with that request.");

    let pipeline = CommandPipeline {
        config: &config,
        store: &store,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("do something odd"));

    assert_eq!(response.status, 422);
    assert_eq!(
        response.body["details"]["raw_output"],
        json!("I cannot help with that request.")
    );

    let audit = store.select(&config.audit_table, &[]).expect("audit");
    assert_eq!(audit.records_affected, 1);
    assert_eq!(audit.rows[0]["success"], json!(false));
}

#[test]
fn pipeline_module_timeout_fails_the_request_without_a_guessed_plan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let counting = CountingStore::new(&store);
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };
    let client = ScriptedClient::timeout();

    let pipeline = CommandPipeline {
        config: &config,
        store: &counting,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("Create activity Prep: 2 days"));

    assert_eq!(response.status, 422);
    assert_eq!(
        counting.mutated_tables(),
        vec![config.audit_table.to_string()]
    );
}

#[test]
fn pipeline_module_disallowed_table_is_rejected_before_execution() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let counting = CountingStore::new(&store);
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };
    let client = ScriptedClient::text(
        r#"{"operation":"INSERT","table":"auth_users","data":{"email":"x@example.com"}}"#,
    );

    let pipeline = CommandPipeline {
        config: &config,
        store: &counting,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("add a user"));

    assert_eq!(response.status, 400);
    assert_eq!(
        counting.mutated_tables(),
        vec![config.audit_table.to_string()]
    );
}

#[test]
fn pipeline_module_falls_back_to_the_heuristic_parser_when_model_is_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };

    let pipeline = CommandPipeline {
        config: &config,
        store: &store,
        identity: &identity,
        completion: None,
        state_root: None,
    };
    let response = pipeline.handle(
        "valid-token",
        &request("Create activity Foundation Pour: 2 days, $1200"),
    );

    assert_eq!(response.status, 200);
    assert_eq!(response.body["operation"], json!("INSERT"));
    let row = &response.body["data"][0];
    assert_eq!(row["name"], json!("Foundation Pour"));
    assert_eq!(row["duration"], json!("2 days"));
    assert_eq!(row["cost_est"], json!(1200.0));
    assert_eq!(row["company_id"], json!("co-1"));
    assert_eq!(row["project_id"], json!("proj-1"));

    let client = ScriptedClient::unavailable();
    let pipeline = CommandPipeline {
        config: &config,
        store: &store,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("Please reorganize everything"));
    assert_eq!(response.status, 422);
    assert!(response.body["error"]
        .as_str()
        .expect("error message")
        .contains("rephrase"));
}

#[test]
fn pipeline_module_audit_failure_does_not_change_the_response() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let config = PipelineConfig::default_deployment();
    let failing = FailingAuditStore {
        inner: &store,
        audit_table: config.audit_table.clone(),
    };
    let identity = FixedIdentity { user: "user-1" };
    let client = ScriptedClient::text(
        r#"{"operation":"SELECT","table":"activities","filters":{},"explanation":"list"}"#,
    );

    let state_root = dir.path().join("state");
    let pipeline = CommandPipeline {
        config: &config,
        store: &failing,
        identity: &identity,
        completion: Some(&client),
        state_root: Some(state_root.as_path()),
    };
    let response = pipeline.handle("valid-token", &request("list activities"));

    assert_eq!(response.status, 200);
    assert_eq!(response.body["success"], json!(true));
    assert_eq!(response.body["operation"], json!("SELECT"));

    let log = std::fs::read_to_string(state_root.join("logs/pipeline.log")).expect("operator log");
    assert!(log.contains("audit insert failed"));
}

#[test]
fn pipeline_module_audit_attributes_the_tenant_the_plan_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(dir.path());
    let members = TableName::parse("company_members").expect("table");
    let mut row = Map::new();
    row.insert("user_id".to_string(), json!("user-1"));
    row.insert("company_id".to_string(), json!("co-2"));
    row.insert("status".to_string(), json!("active"));
    store.insert(&members, &row).expect("seed second membership");

    let config = PipelineConfig::default_deployment();
    let identity = FixedIdentity { user: "user-1" };
    let client = ScriptedClient::text(
        r#"{"operation":"INSERT","table":"activities","data":{"name":"Site Prep","company_id":"co-2"},"explanation":"create the activity"}"#,
    );

    let pipeline = CommandPipeline {
        config: &config,
        store: &store,
        identity: &identity,
        completion: Some(&client),
        state_root: None,
    };
    let response = pipeline.handle("valid-token", &request("Add Site Prep for co-2"));
    assert_eq!(response.status, 200);

    let audit = store
        .select(&config.audit_table, &[])
        .expect("audit select");
    assert_eq!(audit.records_affected, 1);
    assert_eq!(audit.rows[0]["company_id"], json!("co-2"));
}
