//! Member lookup on the `members` table.

use futures::future::BoxFuture;
use ordersystem_core::{MemberError, MemberId, MemberIdentity, MemberResolver, Principal};
use sqlx::postgres::PgPool;
use uuid::Uuid;

/// Resolves principals (login emails) to members.
#[derive(Clone)]
pub struct PostgresMemberDirectory {
    pool: PgPool,
}

impl PostgresMemberDirectory {
    /// Create a directory over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a member, or return the existing one with this email.
    ///
    /// # Errors
    ///
    /// Returns [`MemberError::Unavailable`] if the write fails.
    pub async fn register(&self, email: &str) -> Result<MemberIdentity, MemberError> {
        let (id, email): (Uuid, String) = sqlx::query_as(
            r"
            INSERT INTO members (id, email)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email
            ",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemberError::Unavailable(e.to_string()))?;

        Ok(MemberIdentity {
            id: MemberId::from_uuid(id),
            email,
        })
    }
}

impl MemberResolver for PostgresMemberDirectory {
    fn resolve_current_member<'a>(
        &'a self,
        principal: &'a Principal,
    ) -> BoxFuture<'a, Result<MemberIdentity, MemberError>> {
        Box::pin(async move {
            if principal.is_blank() {
                return Err(MemberError::Unauthenticated);
            }
            let row: Option<(Uuid, String)> =
                sqlx::query_as("SELECT id, email FROM members WHERE email = $1")
                    .bind(principal.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| MemberError::Unavailable(e.to_string()))?;

            row.map(|(id, email)| MemberIdentity {
                id: MemberId::from_uuid(id),
                email,
            })
            .ok_or_else(|| MemberError::NotFound(principal.as_str().to_string()))
        })
    }
}
