use crate::config::PipelineConfig;
use crate::scope::TenantScope;
use crate::shared::errors::PipelineError;
use crate::shared::ids::{TableName, TenantId};
use crate::store::filter::{from_plan_filters, Filter};
use crate::store::{Datastore, QueryOutcome, TENANT_COLUMN};
use serde_json::{Map, Value};

pub struct ScopedStore<'a> {
    store: &'a dyn Datastore,
    scope: &'a TenantScope,
    config: &'a PipelineConfig,
}

impl<'a> ScopedStore<'a> {
    pub fn new(store: &'a dyn Datastore, scope: &'a TenantScope, config: &'a PipelineConfig) -> Self {
        Self {
            store,
            scope,
            config,
        }
    }

    pub fn select(
        &self,
        table: &TableName,
        plan_filters: &Map<String, Value>,
    ) -> Result<QueryOutcome, PipelineError> {
        let mut filters = from_plan_filters(plan_filters);
        if self.config.is_tenant_scoped(table) {
            filters.push(self.scope.tenant_filter());
        }
        self.store
            .select(table, &filters)
            .map_err(|err| PipelineError::Execution(err.to_string()))
    }

    pub fn insert(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
    ) -> Result<QueryOutcome, PipelineError> {
        let mut payload = data.clone();
        if self.config.is_tenant_scoped(table) {
            match payload.get(TENANT_COLUMN) {
                Some(Value::String(claimed)) => {
                    let tenant =
                        TenantId::parse(claimed).map_err(PipelineError::Validation)?;
                    if !self.scope.contains(&tenant) {
                        return Err(PipelineError::Authorization(format!(
                            "company `{tenant}` is outside the caller's scope"
                        )));
                    }
                }
                Some(_) => {
                    return Err(PipelineError::Validation(format!(
                        "`{TENANT_COLUMN}` must be a string"
                    )))
                }
                None => match self.scope.sole_tenant() {
                    Some(tenant) => {
                        payload.insert(
                            TENANT_COLUMN.to_string(),
                            Value::String(tenant.to_string()),
                        );
                    }
                    None => {
                        return Err(PipelineError::Authorization(format!(
                            "caller belongs to several companies; the payload must name `{TENANT_COLUMN}`"
                        )))
                    }
                },
            }
        }
        self.store
            .insert(table, &payload)
            .map_err(|err| PipelineError::Execution(err.to_string()))
    }

    pub fn update(
        &self,
        table: &TableName,
        data: &Map<String, Value>,
        plan_filters: &Map<String, Value>,
    ) -> Result<QueryOutcome, PipelineError> {
        if let Some(value) = data.get(TENANT_COLUMN) {
            let claimed = value.as_str().ok_or_else(|| {
                PipelineError::Validation(format!("`{TENANT_COLUMN}` must be a string"))
            })?;
            let tenant = TenantId::parse(claimed).map_err(PipelineError::Validation)?;
            if !self.scope.contains(&tenant) {
                return Err(PipelineError::Authorization(format!(
                    "update may not move rows to company `{tenant}`"
                )));
            }
        }
        let filters = self.mutation_filters(plan_filters);
        self.store
            .update(table, data, &filters)
            .map_err(|err| PipelineError::Execution(err.to_string()))
    }

    pub fn delete(
        &self,
        table: &TableName,
        plan_filters: &Map<String, Value>,
    ) -> Result<QueryOutcome, PipelineError> {
        let filters = self.mutation_filters(plan_filters);
        self.store
            .delete(table, &filters)
            .map_err(|err| PipelineError::Execution(err.to_string()))
    }

    fn mutation_filters(&self, plan_filters: &Map<String, Value>) -> Vec<Filter> {
        let mut filters = from_plan_filters(plan_filters);
        filters.push(self.scope.tenant_filter());
        filters
    }
}
