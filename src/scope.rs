use crate::shared::errors::PipelineError;
use crate::shared::ids::{TableName, TenantId, UserId};
use crate::store::{Datastore, Filter, TENANT_COLUMN};
use serde_json::Value;

pub const MEMBERSHIP_TABLE: &str = "company_members";
pub const TOKEN_TABLE: &str = "api_tokens";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

pub trait IdentityProvider {
    fn resolve(&self, bearer_token: &str) -> Result<Identity, PipelineError>;
}

pub struct StoreIdentityProvider<'a> {
    store: &'a dyn Datastore,
}

impl<'a> StoreIdentityProvider<'a> {
    pub fn new(store: &'a dyn Datastore) -> Self {
        Self { store }
    }
}

impl IdentityProvider for StoreIdentityProvider<'_> {
    fn resolve(&self, bearer_token: &str) -> Result<Identity, PipelineError> {
        if bearer_token.trim().is_empty() {
            return Err(PipelineError::Authentication(
                "missing bearer token".to_string(),
            ));
        }
        let table = table_name(TOKEN_TABLE)?;
        let outcome = self
            .store
            .select(
                &table,
                &[Filter::eq("token", Value::String(bearer_token.to_string()))],
            )
            .map_err(|err| PipelineError::Execution(err.to_string()))?;
        let row = outcome
            .rows
            .first()
            .ok_or_else(|| PipelineError::Authentication("unknown bearer token".to_string()))?;
        let user_id = row
            .get("user_id")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::Authentication("token row has no user id".to_string()))?;
        let email = row
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let id = UserId::parse(user_id).map_err(PipelineError::Authentication)?;
        Ok(Identity { id, email })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenants: Vec<TenantId>,
}

impl TenantScope {
    pub fn new(mut memberships: Vec<TenantId>) -> Result<Self, PipelineError> {
        memberships.sort();
        memberships.dedup();
        if memberships.is_empty() {
            return Err(PipelineError::Authorization(
                "caller has no active company membership".to_string(),
            ));
        }
        Ok(Self {
            tenants: memberships,
        })
    }

    pub fn single(tenant: TenantId) -> Self {
        Self {
            tenants: vec![tenant],
        }
    }

    pub fn tenants(&self) -> &[TenantId] {
        &self.tenants
    }

    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.tenants.contains(tenant)
    }

    pub fn sole_tenant(&self) -> Option<&TenantId> {
        match self.tenants.as_slice() {
            [tenant] => Some(tenant),
            _ => None,
        }
    }

    pub fn tenant_filter(&self) -> Filter {
        match self.tenants.as_slice() {
            [tenant] => Filter::eq(TENANT_COLUMN, Value::String(tenant.to_string())),
            many => Filter::within(
                TENANT_COLUMN,
                many.iter()
                    .map(|tenant| Value::String(tenant.to_string()))
                    .collect(),
            ),
        }
    }
}

pub fn resolve_scope(store: &dyn Datastore, user: &UserId) -> Result<TenantScope, PipelineError> {
    let table = table_name(MEMBERSHIP_TABLE)?;
    let outcome = store
        .select(
            &table,
            &[
                Filter::eq("user_id", Value::String(user.to_string())),
                Filter::eq("status", Value::String("active".to_string())),
            ],
        )
        .map_err(|err| PipelineError::Execution(err.to_string()))?;

    let mut memberships = Vec::new();
    for row in &outcome.rows {
        let tenant = row
            .get(TENANT_COLUMN)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::Execution("membership row has no company id".to_string())
            })?;
        memberships.push(TenantId::parse(tenant).map_err(PipelineError::Execution)?);
    }
    TenantScope::new(memberships)
}

pub fn verify_membership(
    store: &dyn Datastore,
    user: &UserId,
    tenant: &TenantId,
) -> Result<TenantScope, PipelineError> {
    let scope = resolve_scope(store, user)?;
    if !scope.contains(tenant) {
        return Err(PipelineError::Authorization(format!(
            "caller is not a member of company `{tenant}`"
        )));
    }
    Ok(TenantScope::single(tenant.clone()))
}

fn table_name(name: &str) -> Result<TableName, PipelineError> {
    TableName::parse(name).map_err(PipelineError::Execution)
}
