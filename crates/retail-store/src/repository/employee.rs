//! # Employee Repository
//!
//! Employee rows, including the invitation columns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use retail_core::ids::IdScheme;
use retail_core::types::{Employee, EmployeeStatus, NewEmployee, Role};

use crate::client::{first, from_rows, to_row, TableClient};
use crate::error::{StoreError, StoreResult};
use crate::query::{escape_like, contains_pattern, Filter, Row, Select, Table};
use crate::sequence::insert_with_sequential_id;

/// Editable profile fields. `None` clears the column, except for `phone`
/// and `position`: there the outer `None` leaves the column untouched and
/// `Some(None)` clears it.
#[derive(Debug, Clone, Serialize)]
pub struct EmployeeChanges {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Option<String>>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmployeeRepository {
    client: Arc<dyn TableClient>,
}

impl EmployeeRepository {
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        EmployeeRepository { client }
    }

    /// Employees ordered by business ID, optionally narrowed by role and a
    /// case-insensitive search over name, email and employee ID.
    pub async fn list(&self, role: Option<Role>, search: Option<&str>) -> StoreResult<Vec<Employee>> {
        let mut query = Select::from(Table::Employees).order_by("employee_id", false);
        if let Some(role) = role {
            query = query.eq("role", role.as_str());
        }
        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(term);
            query = query.or(vec![
                Filter::ilike("name", pattern.clone()),
                Filter::ilike("email", pattern.clone()),
                Filter::ilike("employee_id", pattern),
            ]);
        }

        let employees: Vec<Employee> = from_rows(self.client.select(&query).await?)?;
        debug!(count = employees.len(), "Listed employees");
        Ok(employees)
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<Employee>> {
        let query = Select::from(Table::Employees).eq("id", id).limit(1);
        first(self.client.select(&query).await?)
    }

    /// Case-insensitive email lookup.
    pub async fn get_by_email(&self, email: &str) -> StoreResult<Option<Employee>> {
        let query = Select::from(Table::Employees)
            .filter(Filter::ilike("email", escape_like(email.trim())))
            .limit(1);
        first(self.client.select(&query).await?)
    }

    pub async fn get_by_token(&self, token: &str) -> StoreResult<Option<Employee>> {
        if token.is_empty() {
            return Ok(None);
        }
        let query = Select::from(Table::Employees)
            .eq("invitation_token", token)
            .limit(1);
        first(self.client.select(&query).await?)
    }

    /// True when another employee already uses `email`.
    pub async fn email_taken(&self, email: &str, excluding: Option<i64>) -> StoreResult<bool> {
        Ok(match self.get_by_email(email).await? {
            Some(existing) => Some(existing.id) != excluding,
            None => false,
        })
    }

    /// Role of the employee with this email, if any.
    pub async fn role_for_email(&self, email: &str) -> StoreResult<Option<Role>> {
        Ok(self.get_by_email(email).await?.map(|e| e.role))
    }

    /// Inserts with the next free role-prefixed ID.
    pub async fn create(&self, new: &NewEmployee) -> StoreResult<Employee> {
        let scheme = IdScheme::employee(new.role);
        let row = insert_with_sequential_id(
            self.client.as_ref(),
            Table::Employees,
            "employee_id",
            &scheme,
            to_row(new)?,
        )
        .await?;

        let employee: Employee = crate::client::from_row(row)?;
        info!(employee_id = %employee.employee_id, role = %employee.role, "Employee created");
        Ok(employee)
    }

    pub async fn update(&self, id: i64, changes: &EmployeeChanges) -> StoreResult<Employee> {
        self.update_row(id, to_row(changes)?).await
    }

    /// Stores a fresh invitation token and send time.
    pub async fn set_invitation(
        &self,
        id: i64,
        token: &str,
        sent_at: DateTime<Utc>,
    ) -> StoreResult<Employee> {
        let mut row = Row::new();
        row.insert("invitation_token".into(), Value::String(token.to_string()));
        row.insert("invitation_sent_at".into(), Value::String(sent_at.to_rfc3339()));
        self.update_row(id, row).await
    }

    /// Activates the employee and clears the token, but only while the row
    /// still holds `token`. Returns `None` when another request got there
    /// first.
    pub async fn mark_accepted(
        &self,
        id: i64,
        token: &str,
        accepted_at: DateTime<Utc>,
    ) -> StoreResult<Option<Employee>> {
        let mut row = Row::new();
        row.insert(
            "status".into(),
            serde_json::to_value(EmployeeStatus::Active)?,
        );
        row.insert(
            "invitation_accepted_at".into(),
            Value::String(accepted_at.to_rfc3339()),
        );
        row.insert("invitation_token".into(), Value::Null);

        let filters = [Filter::eq("id", id), Filter::eq("invitation_token", token)];
        let rows = self.client.update(Table::Employees, &filters, row).await?;
        first(rows)
    }

    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let deleted = self
            .client
            .delete(Table::Employees, &[Filter::eq("id", id)])
            .await?;
        if deleted == 0 {
            return Err(StoreError::not_found("Employee", id));
        }
        info!(id, "Employee deleted");
        Ok(())
    }

    async fn update_row(&self, id: i64, row: Row) -> StoreResult<Employee> {
        let rows = self
            .client
            .update(Table::Employees, &[Filter::eq("id", id)], row)
            .await?;
        first(rows)?.ok_or_else(|| StoreError::not_found("Employee", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTableClient;

    fn repo() -> EmployeeRepository {
        EmployeeRepository::new(Arc::new(MemoryTableClient::new()))
    }

    fn new_employee(name: &str, email: &str, role: Role) -> NewEmployee {
        NewEmployee {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            position: None,
            address: None,
            profile_picture: None,
            role,
            status: EmployeeStatus::Pending,
            invitation_token: Some(format!("tok-{}", name)),
            invitation_sent_at: Some(Utc::now()),
            hire_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_allocates_per_role() {
        let repo = repo();
        let a = repo.create(&new_employee("Aina", "aina@shop.my", Role::Sales)).await.unwrap();
        let b = repo.create(&new_employee("Badrul", "b@shop.my", Role::Supplier)).await.unwrap();
        let c = repo.create(&new_employee("Chong", "c@shop.my", Role::Sales)).await.unwrap();

        assert_eq!(a.employee_id, "S0001");
        assert_eq!(b.employee_id, "SP0001");
        assert_eq!(c.employee_id, "S0002");
        assert_eq!(a.status, EmployeeStatus::Pending);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let repo = repo();
        let a = repo.create(&new_employee("Aina", "Aina@Shop.my", Role::Manager)).await.unwrap();

        assert!(repo.email_taken("aina@shop.my", None).await.unwrap());
        assert!(!repo.email_taken("aina@shop.my", Some(a.id)).await.unwrap());
        assert_eq!(
            repo.role_for_email("AINA@shop.my").await.unwrap(),
            Some(Role::Manager)
        );
    }

    #[tokio::test]
    async fn test_list_filters_by_role_and_search() {
        let repo = repo();
        repo.create(&new_employee("Aina", "aina@shop.my", Role::Sales)).await.unwrap();
        repo.create(&new_employee("Badrul", "badrul@shop.my", Role::Manager)).await.unwrap();

        assert_eq!(repo.list(Some(Role::Sales), None).await.unwrap().len(), 1);
        let found = repo.list(None, Some("BADR")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].employee_id, "M0001");
        assert_eq!(repo.list(None, Some("m0001")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_accepted_is_single_use() {
        let repo = repo();
        let e = repo.create(&new_employee("Aina", "aina@shop.my", Role::Sales)).await.unwrap();
        let token = e.invitation_token.clone().unwrap();

        let accepted = repo.mark_accepted(e.id, &token, Utc::now()).await.unwrap().unwrap();
        assert_eq!(accepted.status, EmployeeStatus::Active);
        assert!(accepted.invitation_token.is_none());
        assert!(accepted.invitation_accepted_at.is_some());

        assert!(repo.mark_accepted(e.id, &token, Utc::now()).await.unwrap().is_none());
        assert!(repo.get_by_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let repo = repo();
        assert!(matches!(
            repo.delete(42).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
