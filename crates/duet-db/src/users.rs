use duet_types::models::{self, User, UserStatus};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::error::unique_violation;
use crate::models::{USER_COLUMNS, UserRecord, user_from_row, user_record_from_row};
use crate::{Database, DbError, Result};

impl Database {
    /// Insert a new user. A taken email is `Conflict`.
    pub fn create_user(&self, full_name: &str, email: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::now_v7(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            bio: String::new(),
            profile_pic: String::new(),
            status: UserStatus::Offline,
            created_at: models::now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, full_name, email, password, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    user.full_name,
                    user.email,
                    password_hash,
                    user.status.as_str(),
                    user.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| unique_violation(e, "email"))?;
            Ok(())
        })?;

        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], user_record_from_row).optional()?)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, [id.to_string()], user_from_row).optional()?)
        })
    }

    /// Batch-fetch users. Result order is unspecified; missing ids are skipped.
    pub fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(id_strings.iter()), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Partial profile update. Fields left as `None` are untouched.
    pub fn update_profile(
        &self,
        id: Uuid,
        full_name: Option<&str>,
        bio: Option<&str>,
        status: Option<UserStatus>,
    ) -> Result<User> {
        self.with_tx(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    full_name = COALESCE(?2, full_name),
                    bio       = COALESCE(?3, bio),
                    status    = COALESCE(?4, status)
                 WHERE id = ?1",
                params![id.to_string(), full_name, bio, status.map(|s| s.as_str())],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound("user"));
            }
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, [id.to_string()], user_from_row)?)
        })
    }

    /// Store a new avatar url and return the one it replaced.
    pub fn set_profile_pic(&self, id: Uuid, url: &str) -> Result<String> {
        self.with_tx(|conn| {
            let previous: String = conn
                .query_row(
                    "SELECT profile_pic FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(DbError::NotFound("user"))?;
            conn.execute(
                "UPDATE users SET profile_pic = ?2 WHERE id = ?1",
                params![id.to_string(), url],
            )?;
            Ok(previous)
        })
    }
}
