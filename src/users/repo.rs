use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, Role, User, UserCounts, UserFilter, UserWithApprover};

const USER_COLUMNS: &str = "id, name, email, phone, password_hash, role, is_approved, \
     approved_date, approved_by, qr_code, qr_code_data, event_id, created_at, updated_at";

const JOINED_COLUMNS: &str = "u.id, u.name, u.email, u.phone, u.password_hash, u.role, \
     u.is_approved, u.approved_date, u.approved_by, u.qr_code, u.qr_code_data, u.event_id, \
     u.created_at, u.updated_at, a.name AS approver_name, a.email AS approver_email";

const LIST_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR u.name ILIKE $1 OR u.email ILIKE $1 OR u.phone ILIKE $1)
      AND ($2::boolean IS NULL OR u.is_approved = $2)
"#;

/// Escapes LIKE wildcards and wraps the term for a substring match.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// True when `err` came from a UNIQUE constraint, e.g. a racing insert of the same email.
pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map_or(false, |e| e.is_unique_violation())
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    /// Find a user by (already normalised) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    /// Insert a user. Approved users are stamped with the current time.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, phone, password_hash, role, is_approved, approved_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $7 THEN now() ELSE NULL END)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.name)
            .bind(new.email)
            .bind(new.phone)
            .bind(new.password_hash)
            .bind(new.role)
            .bind(new.is_approved)
            .fetch_one(db)
            .await
            .context("insert user")?;
        Ok(user)
    }

    pub async fn find_with_approver(
        db: &PgPool,
        id: Uuid,
    ) -> anyhow::Result<Option<UserWithApprover>> {
        let sql = format!(
            "SELECT {JOINED_COLUMNS} FROM users u LEFT JOIN users a ON a.id = u.approved_by \
             WHERE u.id = $1"
        );
        let row = sqlx::query_as::<_, UserWithApprover>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user with approver")?;
        Ok(row)
    }

    /// Newest first.
    pub async fn list(
        db: &PgPool,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<UserWithApprover>> {
        let sql = format!(
            "SELECT {JOINED_COLUMNS} FROM users u LEFT JOIN users a ON a.id = u.approved_by \
             {LIST_FILTER} ORDER BY u.created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, UserWithApprover>(&sql)
            .bind(filter.search.as_deref().map(contains_pattern))
            .bind(filter.approved)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
            .context("list users")?;
        Ok(rows)
    }

    pub async fn count(db: &PgPool, filter: &UserFilter) -> anyhow::Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM users u {LIST_FILTER}");
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(filter.search.as_deref().map(contains_pattern))
            .bind(filter.approved)
            .fetch_one(db)
            .await
            .context("count users")?;
        Ok(total)
    }

    /// Applies the given profile fields; `None` keeps the stored value.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   phone = COALESCE($3, phone),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(name)
            .bind(phone)
            .fetch_optional(db)
            .await
            .context("update user profile")?;
        Ok(user)
    }

    /// Deletes the user and the scans recorded against them.
    /// Returns false when no such user exists.
    pub async fn delete_with_scans(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let mut tx = db.begin().await.context("begin tx")?;

        sqlx::query("DELETE FROM qr_scans WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete user scans")?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete user")?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await.context("rollback tx")?;
            return Ok(false);
        }
        tx.commit().await.context("commit tx")?;
        Ok(true)
    }

    /// Replaces the stored QR image and payload.
    pub async fn set_qr(
        db: &PgPool,
        id: Uuid,
        qr_code: &str,
        qr_code_data: &str,
        event_id: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET qr_code = $2, qr_code_data = $3, event_id = $4, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(qr_code)
            .bind(qr_code_data)
            .bind(event_id)
            .fetch_optional(db)
            .await
            .context("store user qr code")?;
        Ok(user)
    }

    /// Approves the user if still pending. `None` means someone approved
    /// them first (or the user is gone).
    pub async fn approve(db: &PgPool, id: Uuid, approver: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET is_approved = TRUE, approved_date = now(), approved_by = $2, updated_at = now()
             WHERE id = $1 AND is_approved = FALSE
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(approver)
            .fetch_optional(db)
            .await
            .context("approve user")?;
        Ok(user)
    }

    pub async fn promote_to_admin(db: &PgPool, id: Uuid) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET role = $2, is_approved = TRUE, approved_date = now(), updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(Role::Admin)
            .fetch_one(db)
            .await
            .context("promote user to admin")?;
        Ok(user)
    }

    pub async fn count_all(db: &PgPool) -> anyhow::Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await
            .context("count all users")?;
        Ok(total)
    }

    pub async fn count_by_role(db: &PgPool, role: Role) -> anyhow::Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(db)
            .await
            .context("count users by role")?;
        Ok(total)
    }

    /// Oldest admin account, if any.
    pub async fn first_admin(db: &PgPool) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY created_at ASC LIMIT 1"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Role::Admin)
            .fetch_optional(db)
            .await
            .context("find first admin")?;
        Ok(user)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(db)
            .await
            .context("list all users")?;
        Ok(users)
    }

    pub async fn counts(db: &PgPool) -> anyhow::Result<UserCounts> {
        let counts = sqlx::query_as::<_, UserCounts>(
            r#"
            SELECT COUNT(*) AS total_users,
                   COUNT(*) FILTER (WHERE is_approved) AS approved_users,
                   COUNT(*) FILTER (WHERE NOT is_approved) AS pending_users,
                   COUNT(*) FILTER (WHERE created_at >= now() - INTERVAL '7 days')
                       AS recent_registrations,
                   (SELECT COUNT(*) FROM qr_scans) AS total_scans
              FROM users
            "#,
        )
        .fetch_one(db)
        .await
        .context("user overview counts")?;
        Ok(counts)
    }
}
