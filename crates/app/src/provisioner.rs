use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use bookrack_core::provisioning::{default_list_templates, ListTemplate};
use bookrack_core::types::{ReadingList, ValidationError};
use bookrack_storage::{Database, NewReadingList, ReadingListError, UserError};

/// Executes the default reading-list provisioning saga for a freshly
/// registered user.
///
/// Not idempotent by construction: every run creates lists under fresh
/// identifiers, so redelivering the same registration to the saga duplicates
/// the defaults. Transport-level duplicates are filtered earlier, at the
/// ingest boundary.
#[derive(Clone)]
pub struct ListProvisioner {
    database: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl ListProvisioner {
    pub fn new(database: Database, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        Self { database, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Creates the two default lists for the user.
    pub async fn provision_defaults(&self, user_id: Uuid) -> Result<ProvisionReport, ProvisionError> {
        self.provision(user_id, default_list_templates()).await
    }

    /// Creates one list per template. The user must resolve first; a missing
    /// user aborts with no partial creation. Each template is then attempted
    /// independently: one failure is reported but never suppresses the rest.
    pub async fn provision(
        &self,
        user_id: Uuid,
        templates: &[ListTemplate],
    ) -> Result<ProvisionReport, ProvisionError> {
        match self.database.users().find_by_id(user_id).await {
            Ok(_) => {}
            Err(UserError::NotFound) => return Err(ProvisionError::DependencyNotFound),
            Err(err) => return Err(ProvisionError::Storage(err)),
        }

        let mut report = ProvisionReport::default();
        for template in templates {
            match self.create_list(user_id, template).await {
                Ok(list_id) => {
                    info!(
                        stage = "provisioning",
                        %user_id,
                        list = template.name,
                        %list_id,
                        "created default reading list"
                    );
                    counter!("provisioned_lists_total", "list" => template.name).increment(1);
                    report.created.push(list_id);
                }
                Err(err) => {
                    error!(
                        stage = "provisioning",
                        %user_id,
                        list = template.name,
                        error = %err,
                        "failed to create default reading list"
                    );
                    counter!("provisioning_failures_total", "list" => template.name).increment(1);
                    report.failures.push(ProvisionFailure {
                        name: template.name,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn create_list(
        &self,
        user_id: Uuid,
        template: &ListTemplate,
    ) -> Result<Uuid, ListCreateError> {
        // Validation runs before any persistence attempt; the timestamp is
        // taken at execution time, not at event emission.
        let list = ReadingList::new(
            Uuid::new_v4(),
            user_id,
            template.name.to_string(),
            Some(template.description.to_string()),
            self.now(),
        )?;

        let record = NewReadingList {
            id: list.id,
            user_id,
            name: &list.name,
            description: list.description.as_deref(),
            created_at: list.created_at,
        };
        self.database.reading_lists().create(&record).await?;

        Ok(list.id)
    }
}

/// Per-template outcome of one provisioning run.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub created: Vec<Uuid>,
    pub failures: Vec<ProvisionFailure>,
}

/// A single list creation that failed; the remaining templates were still
/// attempted.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub name: &'static str,
    pub error: String,
}

/// Errors that abort a provisioning run before any list is created.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("user to provision was not found")]
    DependencyNotFound,
    #[error("failed to resolve user: {0}")]
    Storage(UserError),
}

#[derive(Debug, Error)]
enum ListCreateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] ReadingListError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookrack_core::types::ThemePreference;
    use bookrack_storage::NewUser;

    const FIXED_NOW: &str = "2024-05-01T12:00:00Z";

    async fn setup() -> (Database, ListProvisioner, DateTime<Utc>) {
        let database = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");

        let now = DateTime::parse_from_rfc3339(FIXED_NOW)
            .expect("fixed time")
            .with_timezone(&Utc);
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(move || now);
        let provisioner = ListProvisioner::new(database.clone(), clock);
        (database, provisioner, now)
    }

    async fn insert_user(database: &Database) -> Uuid {
        let id = Uuid::new_v4();
        database
            .users()
            .create(&NewUser {
                id,
                username: Some("drossi"),
                email: None,
                first_name: None,
                last_name: None,
                theme: ThemePreference::Light,
                created_at: Utc::now(),
            })
            .await
            .expect("user");
        id
    }

    #[tokio::test]
    async fn provisions_both_default_lists() {
        let (database, provisioner, now) = setup().await;
        let user_id = insert_user(&database).await;

        let report = provisioner
            .provision_defaults(user_id)
            .await
            .expect("provision");
        assert_eq!(report.created.len(), 2);
        assert!(report.failures.is_empty());

        let mut lists = database
            .reading_lists()
            .find_by_user(user_id)
            .await
            .expect("lists");
        lists.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(lists.len(), 2);

        assert_eq!(lists[0].name, "Read");
        assert_eq!(
            lists[0].description.as_deref(),
            Some("Books I have already completed.")
        );
        assert_eq!(lists[1].name, "To Read");
        assert_eq!(lists[1].description.as_deref(), Some("Books I plan to read."));

        for list in &lists {
            assert_eq!(list.user.id(), user_id);
            assert_eq!(list.created_at, now);
        }
    }

    #[tokio::test]
    async fn redelivery_duplicates_the_defaults() {
        // Pins the source-faithful non-idempotent behaviour: the saga keys
        // creation on fresh identifiers, not on (user, list name).
        let (database, provisioner, _) = setup().await;
        let user_id = insert_user(&database).await;

        provisioner
            .provision_defaults(user_id)
            .await
            .expect("first run");
        provisioner
            .provision_defaults(user_id)
            .await
            .expect("second run");

        let lists = database
            .reading_lists()
            .find_by_user(user_id)
            .await
            .expect("lists");
        assert_eq!(lists.len(), 4);
        assert_eq!(
            lists.iter().filter(|list| list.name == "To Read").count(),
            2
        );
        assert_eq!(lists.iter().filter(|list| list.name == "Read").count(), 2);
    }

    #[tokio::test]
    async fn missing_user_aborts_with_no_partial_creation() {
        let (database, provisioner, _) = setup().await;
        let ghost = Uuid::new_v4();

        let err = provisioner.provision_defaults(ghost).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DependencyNotFound));

        let lists = database
            .reading_lists()
            .find_by_user(ghost)
            .await
            .expect("lists");
        assert!(lists.is_empty());
    }

    #[tokio::test]
    async fn one_failing_creation_does_not_suppress_the_other() {
        let (database, provisioner, _) = setup().await;
        let user_id = insert_user(&database).await;

        let templates = [
            ListTemplate {
                name: "this name is well beyond the thirty character limit",
                description: "invalid by construction",
            },
            ListTemplate {
                name: "Survivor",
                description: "still gets created",
            },
        ];

        let report = provisioner
            .provision(user_id, &templates)
            .await
            .expect("run completes");
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].name,
            "this name is well beyond the thirty character limit"
        );

        let lists = database
            .reading_lists()
            .find_by_user(user_id)
            .await
            .expect("lists");
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Survivor");
    }
}
