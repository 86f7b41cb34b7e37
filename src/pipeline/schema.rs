//! Schema reset: drop and recreate every relation

use crate::statement::{Dialect, Relation, Statement, StatementKind};
use crate::warehouse::schema::{SONGPLAY_ID_SEQUENCE, WarehouseSchema};

/// Owns the DDL of the staging and warehouse relations
///
/// Each relation is dropped or created by its own statement(s), so a failed
/// reset leaves the relations before the failure in place and the rest absent.
#[derive(Debug, Clone, Copy)]
pub struct SchemaManager {
    dialect: Dialect,
}

impl SchemaManager {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Drop statements, in [`Relation::ALL`] order
    pub fn drop_statements(&self) -> Vec<Statement> {
        Relation::ALL
            .iter()
            .flat_map(|&relation| self.drop_relation(relation))
            .collect()
    }

    /// Create statements, in [`Relation::ALL`] order (staging first)
    pub fn create_statements(&self) -> Vec<Statement> {
        Relation::ALL
            .iter()
            .flat_map(|&relation| self.create_relation(relation))
            .collect()
    }

    /// Everything `reset_schema` runs: all drops, then all creates
    pub fn reset_statements(&self) -> Vec<Statement> {
        let mut statements = self.drop_statements();
        statements.extend(self.create_statements());
        statements
    }

    fn drop_relation(&self, relation: Relation) -> Vec<Statement> {
        let mut statements = vec![Statement::new(
            StatementKind::Drop,
            relation,
            self.dialect,
            WarehouseSchema::drop_table_sql(relation, self.dialect),
        )];
        // The sequence can only go once no table default refers to it
        if WarehouseSchema::needs_sequence(relation, self.dialect) {
            statements.push(Statement::new(
                StatementKind::Drop,
                relation,
                self.dialect,
                format!("DROP SEQUENCE IF EXISTS {}", SONGPLAY_ID_SEQUENCE),
            ));
        }
        statements
    }

    fn create_relation(&self, relation: Relation) -> Vec<Statement> {
        let mut statements = Vec::new();
        if WarehouseSchema::needs_sequence(relation, self.dialect) {
            statements.push(Statement::new(
                StatementKind::Create,
                relation,
                self.dialect,
                format!("CREATE SEQUENCE {} START 1", SONGPLAY_ID_SEQUENCE),
            ));
        }
        statements.push(Statement::new(
            StatementKind::Create,
            relation,
            self.dialect,
            WarehouseSchema::create_table_sql(relation, self.dialect),
        ));
        statements
    }
}
