//! CrudRouterBuilder: table + session source + settings → registered routes.

use crate::config::{CrudRouterConfig, TableConfig, TableDescriptor};
use crate::error::SchemaError;
use crate::model::synthesize;
use crate::routes::dispatch::{bind, Components, RouteGuard};
use crate::routes::RouteTable;
use crate::service::SessionSource;
use crate::sql::PlanOptions;
use std::collections::HashSet;
use std::sync::Arc;

pub struct CrudRouterBuilder {
    table: Arc<TableDescriptor>,
    sessions: Arc<dyn SessionSource>,
    config: CrudRouterConfig,
    guards: Vec<Arc<dyn RouteGuard>>,
}

impl CrudRouterBuilder {
    pub fn new(table: Arc<TableDescriptor>, sessions: Arc<dyn SessionSource>) -> Self {
        CrudRouterBuilder {
            table,
            sessions,
            config: CrudRouterConfig::default(),
            guards: Vec::new(),
        }
    }

    /// Describe the table from raw config, then start a builder for it.
    pub fn from_config(table: &TableConfig, sessions: Arc<dyn SessionSource>) -> Result<Self, SchemaError> {
        Ok(Self::new(Arc::new(TableDescriptor::from_config(table)?), sessions))
    }

    pub fn config(mut self, config: CrudRouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn guard(mut self, guard: impl RouteGuard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    pub fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Synthesize shapes, bind every configured kind and register it. Any
    /// schema problem aborts the whole router.
    pub fn build(self) -> Result<RouteTable, SchemaError> {
        let config = self.config;
        let exclude: HashSet<String> = config.exclude.iter().cloned().collect();
        let shapes = synthesize(&self.table.columns, &config.operations, &exclude)?;
        let options = PlanOptions::new(&self.table, config.conflict_target.as_deref(), config.resolve_conflicts)?;
        let components = Components {
            table: self.table.clone(),
            shapes: Arc::new(shapes),
            options,
            sessions: self.sessions,
            autocommit: config.autocommit,
            guards: self.guards,
            prefix: config.prefix.clone(),
            body_limit: config.body_limit,
        };
        let tags = if config.tags.is_empty() {
            vec![self.table.table_name.clone()]
        } else {
            config.tags.clone()
        };

        let mut routes = RouteTable::new().with_tags(tags);
        let mut bound = HashSet::new();
        for &kind in &config.operations {
            if !bound.insert(kind) {
                continue;
            }
            routes.register(bind(kind, config.mode, &components)?)?;
        }
        Ok(routes)
    }
}
