use procura_core::{DirectoryEntry, InMemoryApproverDirectory, Role, UserId};

use crate::connection::DbPool;
use crate::repositories::{DirectoryRepository, RepositoryError, SqlDirectoryRepository};

/// (user id, name, role, department, manager)
const DEMO_MEMBERS: &[(&str, &str, &str, &str, Option<&str>)] = &[
    ("u-amara", "Amara Osei", "staff", "operations", Some("u-kofi")),
    ("u-kofi", "Kofi Mensah", "supervisor", "operations", Some("u-nadia")),
    ("u-nadia", "Nadia Haddad", "executive", "executive_office", None),
    ("u-grace", "Grace Wanjiru", "finance", "finance", Some("u-nadia")),
    ("u-lena", "Lena Fischer", "legal", "legal", Some("u-nadia")),
    ("u-tomas", "Tomas Silva", "supply_chain", "procurement", Some("u-kofi")),
    ("u-priya", "Priya Raman", "staff", "procurement", Some("u-kofi")),
];

/// Small organisation used by `procura seed` and by tests: every configured default chain
/// resolves for the two staff members.
pub struct DemoDirectory;

impl DemoDirectory {
    pub fn entries() -> Vec<DirectoryEntry> {
        DEMO_MEMBERS
            .iter()
            .map(|(user_id, name, role, department, manager)| DirectoryEntry {
                user_id: UserId::new(*user_id),
                name: (*name).to_owned(),
                role: Role::new(role),
                department: (*department).to_owned(),
                manager_id: manager.map(UserId::new),
            })
            .collect()
    }

    pub fn directory() -> InMemoryApproverDirectory {
        InMemoryApproverDirectory::new(Self::entries())
    }

    /// Upserts the demo members; safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let repo = SqlDirectoryRepository::new(pool.clone());
        let entries = Self::entries();
        for entry in &entries {
            repo.upsert(entry).await?;
        }

        Ok(SeedResult { members_seeded: entries.into_iter().map(|entry| entry.user_id).collect() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(DEMO_MEMBERS.len());
        for (user_id, _, role, _, manager) in DEMO_MEMBERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM directory_user
                               WHERE user_id = ?1 AND role = ?2 AND manager_id IS ?3)",
            )
            .bind(*user_id)
            .bind(*role)
            .bind(*manager)
            .fetch_one(pool)
            .await?;
            checks.push((*user_id, present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for (user_id, ..) in DEMO_MEMBERS {
            sqlx::query("DELETE FROM directory_user WHERE user_id = ?")
                .bind(*user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub members_seeded: Vec<UserId>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
