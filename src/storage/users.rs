use super::schema::Database;
use super::types::{now_micros, DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Names are unique; a duplicate name is a
    /// `DatabaseError::Query` for which `is_unique_violation()` holds.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = now_micros();
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_user())
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    pub async fn get_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them via
    /// `ON DELETE CASCADE`. Returns the number of users removed.
    pub async fn reset(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let db = test_db().await;

        let user = db.create_user("kahya").await.unwrap();
        assert!(user.id > 0);
        assert_eq!(user.name, "kahya");
        assert_eq!(user.created_at, user.updated_at);

        let found = db.get_user_by_name("kahya").await.unwrap();
        assert_eq!(found, Some(user));
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let db = test_db().await;
        assert!(db.get_user_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let db = test_db().await;
        db.create_user("kahya").await.unwrap();

        let err = db.create_user("kahya").await.unwrap_err();
        assert!(err.is_unique_violation(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_get_users_sorted_by_name() {
        let db = test_db().await;
        db.create_user("holgith").await.unwrap();
        db.create_user("kahya").await.unwrap();
        db.create_user("ansel").await.unwrap();

        let names: Vec<String> = db
            .get_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["ansel", "holgith", "kahya"]);
    }

    #[tokio::test]
    async fn test_reset_removes_everything() {
        let db = test_db().await;
        db.create_user("a").await.unwrap();
        db.create_user("b").await.unwrap();

        assert_eq!(db.reset().await.unwrap(), 2);
        assert!(db.get_users().await.unwrap().is_empty());
    }
}
