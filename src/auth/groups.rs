//! Group administration and bans.
//!
//! Groups are both role and lifecycle state: the pending-activation group,
//! the normal user group, and the banned group are ordinary rows whose ids
//! the configuration points at. Permissions are per-group boolean columns;
//! the labels table maps column names to display titles for the admin panel.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::{info, Instrument};

use super::storage::query_span;
use super::validate;
use crate::error::AuthError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupPermissions {
    pub login: bool,
    pub change_account: bool,
    pub media_create: bool,
    pub media_edit: bool,
    pub media_delete: bool,
    pub media_publish: bool,
    pub admin: bool,
}

#[derive(Clone, Debug)]
pub struct UserGroup {
    pub group_id: i64,
    pub title: String,
    pub permissions: GroupPermissions,
}

/// Display title for a permission column, admin-panel use.
#[derive(Clone, Debug)]
pub struct PermissionLabel {
    pub column: String,
    pub title: String,
}

#[derive(Clone, Debug)]
pub struct Ban {
    pub ban_id: i64,
    pub user_id: i64,
    pub reason: String,
    /// `None` is a permanent ban.
    pub unban_date: Option<String>,
    pub issued_at: String,
    pub issued_by: i64,
}

fn group_from_row(row: &sqlx::postgres::PgRow) -> UserGroup {
    UserGroup {
        group_id: row.get("groupid"),
        title: row.get("title"),
        permissions: GroupPermissions {
            login: row.get("access_login"),
            change_account: row.get("access_changeaccount"),
            media_create: row.get("access_media_create"),
            media_edit: row.get("access_media_edit"),
            media_delete: row.get("access_media_delete"),
            media_publish: row.get("access_media_publish"),
            admin: row.get("access_admin"),
        },
    }
}

const GROUP_COLUMNS: &str = r"groupid, title, access_login, access_changeaccount,
       access_media_create, access_media_edit, access_media_delete,
       access_media_publish, access_admin";

pub async fn list_groups(pool: &PgPool) -> Result<Vec<UserGroup>, AuthError> {
    let query = format!("SELECT {GROUP_COLUMNS} FROM user_groups ORDER BY groupid ASC");
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", &query))
        .await
        .context("failed to list groups")
        .map_err(AuthError::Persistence)?;
    Ok(rows.iter().map(group_from_row).collect())
}

pub async fn find_group(pool: &PgPool, group_id: i64) -> Result<Option<UserGroup>, AuthError> {
    let query = format!("SELECT {GROUP_COLUMNS} FROM user_groups WHERE groupid = $1");
    let row = sqlx::query(&query)
        .bind(group_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", &query))
        .await
        .context("failed to lookup group")
        .map_err(AuthError::Persistence)?;
    Ok(row.as_ref().map(group_from_row))
}

/// Create a group with all permissions off.
///
/// # Errors
/// `Validation` when the title is out of bounds.
pub async fn create_group(pool: &PgPool, title: &str) -> Result<UserGroup, AuthError> {
    validate::group_title_length(title)?;
    let query = format!(
        "INSERT INTO user_groups (title) VALUES ($1) RETURNING {GROUP_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(title)
        .fetch_one(pool)
        .instrument(query_span("INSERT", &query))
        .await
        .context("failed to create group")
        .map_err(AuthError::Persistence)?;
    let group = group_from_row(&row);
    info!(group_id = group.group_id, title, "group created");
    Ok(group)
}

pub async fn rename_group(pool: &PgPool, group_id: i64, title: &str) -> Result<(), AuthError> {
    validate::group_title_length(title)?;
    let query = "UPDATE user_groups SET title = $2 WHERE groupid = $1";
    let result = sqlx::query(query)
        .bind(group_id)
        .bind(title)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to rename group")
        .map_err(AuthError::Persistence)?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound);
    }
    Ok(())
}

pub async fn set_permissions(
    pool: &PgPool,
    group_id: i64,
    permissions: GroupPermissions,
) -> Result<(), AuthError> {
    let query = r"
        UPDATE user_groups
        SET access_login = $2,
            access_changeaccount = $3,
            access_media_create = $4,
            access_media_edit = $5,
            access_media_delete = $6,
            access_media_publish = $7,
            access_admin = $8
        WHERE groupid = $1
    ";
    let result = sqlx::query(query)
        .bind(group_id)
        .bind(permissions.login)
        .bind(permissions.change_account)
        .bind(permissions.media_create)
        .bind(permissions.media_edit)
        .bind(permissions.media_delete)
        .bind(permissions.media_publish)
        .bind(permissions.admin)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to set group permissions")
        .map_err(AuthError::Persistence)?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound);
    }
    Ok(())
}

/// Delete an empty group.
///
/// # Errors
/// `Validation` while the group still has members; transfer them first.
pub async fn delete_group(pool: &PgPool, group_id: i64) -> Result<(), AuthError> {
    let query = "SELECT COUNT(*) AS members FROM users WHERE groupid = $1";
    let row = sqlx::query(query)
        .bind(group_id)
        .fetch_one(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to count group members")
        .map_err(AuthError::Persistence)?;
    let members: i64 = row.get("members");
    if members > 0 {
        return Err(AuthError::validation(
            "Cannot delete group - the group contains users, transfer them to another group first!",
        ));
    }

    let query = "DELETE FROM user_groups WHERE groupid = $1";
    let result = sqlx::query(query)
        .bind(group_id)
        .execute(pool)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to delete group")
        .map_err(AuthError::Persistence)?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound);
    }
    info!(group_id, "group deleted");
    Ok(())
}

/// Move every member of `from` into `to`.
///
/// # Errors
/// `Validation` when the destination group does not exist.
pub async fn transfer_members(pool: &PgPool, from: i64, to: i64) -> Result<u64, AuthError> {
    if find_group(pool, to).await?.is_none() {
        return Err(AuthError::validation("Destination group does not exist!"));
    }
    let query = "UPDATE users SET groupid = $2 WHERE groupid = $1";
    let result = sqlx::query(query)
        .bind(from)
        .bind(to)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to transfer group members")
        .map_err(AuthError::Persistence)?;
    let moved = result.rows_affected();
    info!(from, to, moved, "group members transferred");
    Ok(moved)
}

pub async fn permission_labels(pool: &PgPool) -> Result<Vec<PermissionLabel>, AuthError> {
    let query = "SELECT column_title, title FROM user_groups_labels ORDER BY column_title ASC";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to list permission labels")
        .map_err(AuthError::Persistence)?;
    Ok(rows
        .into_iter()
        .map(|row| PermissionLabel {
            column: row.get("column_title"),
            title: row.get("title"),
        })
        .collect())
}

/// Ban a user. `duration_secs` of `None` is permanent; otherwise the ban
/// lifts once the stored unban date passes, no sweeper required.
pub async fn issue_ban(
    pool: &PgPool,
    user_id: i64,
    reason: &str,
    duration_secs: Option<i64>,
    issued_by: i64,
) -> Result<i64, AuthError> {
    let query = r"
        INSERT INTO user_bans (userid, reason, unban_date, issued_at, banner_userid)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'), NOW(), $4)
        RETURNING banid
    ";
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(reason)
        .bind(duration_secs)
        .bind(issued_by)
        .fetch_one(pool)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to issue ban")
        .map_err(AuthError::Persistence)?;
    let ban_id: i64 = row.get("banid");
    info!(ban_id, user_id, issued_by, permanent = duration_secs.is_none(), "ban issued");
    Ok(ban_id)
}

pub async fn lift_ban(pool: &PgPool, ban_id: i64) -> Result<(), AuthError> {
    let query = "DELETE FROM user_bans WHERE banid = $1";
    let result = sqlx::query(query)
        .bind(ban_id)
        .execute(pool)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to lift ban")
        .map_err(AuthError::Persistence)?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound);
    }
    info!(ban_id, "ban lifted");
    Ok(())
}

pub async fn bans_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Ban>, AuthError> {
    let query = r"
        SELECT banid, userid, reason, unban_date::text AS unban_date,
               issued_at::text AS issued_at, banner_userid
        FROM user_bans
        WHERE userid = $1
        ORDER BY issued_at DESC
    ";
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to list bans")
        .map_err(AuthError::Persistence)?;
    Ok(rows
        .into_iter()
        .map(|row| Ban {
            ban_id: row.get("banid"),
            user_id: row.get("userid"),
            reason: row.get("reason"),
            unban_date: row.get("unban_date"),
            issued_at: row.get("issued_at"),
            issued_by: row.get("banner_userid"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::GroupPermissions;

    #[test]
    fn default_permissions_deny_everything() {
        let perms = GroupPermissions::default();
        assert!(!perms.login);
        assert!(!perms.change_account);
        assert!(!perms.admin);
    }
}
