use courier_types::models::Role;
use tracing::debug;
use uuid::Uuid;

use crate::directory::{Directory, DirectoryUser, UserScan};

/// Largest contact list a caller may request; also the default.
pub const CONTACT_LIMIT_MAX: u32 = 200;

#[derive(Debug, Clone, Default)]
pub struct ContactOptions {
    pub limit: Option<u32>,
    pub query: Option<String>,
}

impl ContactOptions {
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(CONTACT_LIMIT_MAX).clamp(1, CONTACT_LIMIT_MAX)
    }

    /// Trimmed search text, or `None` when blank.
    pub fn search(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }
}

/// Accounts `caller_id` may message, ordered by name.
///
/// The primary scan returns active accounts of the caller's counterpart role.
/// When that is empty and no search text was given, every other active account
/// is returned instead, so legacy data with a missing role never yields an
/// empty directory. A search that matches nothing stays empty.
pub async fn resolve(
    directory: &dyn Directory,
    caller_id: Uuid,
    caller_role: Role,
    options: &ContactOptions,
) -> anyhow::Result<Vec<DirectoryUser>> {
    let limit = options.clamped_limit();
    let query = options.search();

    let primary = directory
        .find_active_users(UserScan {
            role: Some(caller_role.counterpart()),
            exclude: caller_id,
            query: query.clone(),
            limit,
        })
        .await?;

    if !primary.is_empty() || query.is_some() {
        return Ok(primary);
    }

    debug!(
        caller = %caller_id,
        role = caller_role.as_str(),
        "no counterpart accounts, falling back to all active accounts"
    );
    directory
        .find_active_users(UserScan {
            role: None,
            exclude: caller_id,
            query: None,
            limit,
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_db::Database;
    use courier_db::models::UserRow;

    use super::*;
    use crate::sqlite::SqliteDirectory;

    fn seed(db: &Database, id: Uuid, name: &str, account_type: &str, banned: bool) {
        db.upsert_user(&UserRow {
            id: id.to_string(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: "555-0100".into(),
            account_type: account_type.into(),
            is_banned: banned,
            avatar_ref: None,
        })
        .unwrap();
    }

    fn names(users: &[DirectoryUser]) -> Vec<&str> {
        users.iter().map(|u| u.display_name.as_str()).collect()
    }

    #[tokio::test]
    async fn residents_see_active_operators_by_name() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let me = Uuid::new_v4();
        seed(&db, me, "Rita", "resident", false);
        seed(&db, Uuid::new_v4(), "Zed", "admin_driver", false);
        seed(&db, Uuid::new_v4(), "Abe", "admin", false);
        seed(&db, Uuid::new_v4(), "Banned Bo", "operator", true);
        seed(&db, Uuid::new_v4(), "Other Resident", "resident", false);
        let directory = SqliteDirectory::new(db);

        let users = resolve(&directory, me, Role::Resident, &ContactOptions::default())
            .await
            .unwrap();
        assert_eq!(names(&users), ["Abe", "Zed"]);
    }

    #[tokio::test]
    async fn empty_counterpart_falls_back_to_everyone_active() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let me = Uuid::new_v4();
        seed(&db, me, "Rita", "resident", false);
        seed(&db, Uuid::new_v4(), "Sam", "resident", false);
        seed(&db, Uuid::new_v4(), "Nope", "resident", true);
        let directory = SqliteDirectory::new(db);

        let users = resolve(&directory, me, Role::Resident, &ContactOptions::default())
            .await
            .unwrap();
        assert_eq!(names(&users), ["Sam"]);

        // An explicit limit still gets the fallback.
        let options = ContactOptions {
            limit: Some(5),
            query: None,
        };
        assert_eq!(resolve(&directory, me, Role::Resident, &options).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_is_literal_and_skips_fallback() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let me = Uuid::new_v4();
        seed(&db, me, "Olga", "operator", false);
        seed(&db, Uuid::new_v4(), "Ann (3B)", "resident", false);
        seed(&db, Uuid::new_v4(), "Ben", "resident", false);
        let directory = SqliteDirectory::new(db);

        let search = |q: &str| ContactOptions {
            limit: None,
            query: Some(q.into()),
        };

        let users = resolve(&directory, me, Role::Operator, &search("  ann (3")).await.unwrap();
        assert_eq!(names(&users), ["Ann (3B)"]);

        let users = resolve(&directory, me, Role::Operator, &search("%")).await.unwrap();
        assert!(users.is_empty());

        let users = resolve(&directory, me, Role::Operator, &search("BEN@EXAMPLE")).await.unwrap();
        assert_eq!(names(&users), ["Ben"]);
    }

    #[test]
    fn limit_clamps_and_blank_query_is_ignored() {
        let options = ContactOptions {
            limit: Some(0),
            query: Some("   ".into()),
        };
        assert_eq!(options.clamped_limit(), 1);
        assert!(options.search().is_none());
        assert_eq!(ContactOptions::default().clamped_limit(), 200);
        let big = ContactOptions {
            limit: Some(999),
            query: None,
        };
        assert_eq!(big.clamped_limit(), 200);
    }
}
