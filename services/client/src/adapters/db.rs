//! services/client/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ProfileStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;
use vaccimap_core::domain::{Coordinates, HomeLocationPatch, NewProfile, PhoneNumber, Profile, SubjectId};
use vaccimap_core::ports::{PortError, PortResult, ProfileStore};

/// Postgres SQLSTATE for a unique or primary-key violation.
const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ProfileStore` port.
///
/// Every row is keyed by `(app_instance_id, subject_id)` so that two
/// application instances sharing a database never see each other's profiles.
#[derive(Clone)]
pub struct PgProfileAdapter {
    pool: PgPool,
    app_instance_id: String,
}

impl PgProfileAdapter {
    /// Creates a new `PgProfileAdapter`.
    pub fn new(pool: PgPool, app_instance_id: impl Into<String>) -> Self {
        Self {
            pool,
            app_instance_id: app_instance_id.into(),
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    subject_id: Uuid,
    phone_number: String,
    parent_name: String,
    child_name: String,
    child_dob: NaiveDate,
    home_latitude: f64,
    home_longitude: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    fn to_domain(self) -> PortResult<Profile> {
        let phone_number = PhoneNumber::parse(&self.phone_number).map_err(|e| {
            PortError::Unexpected(format!("Stored phone number for {} is invalid: {}", self.subject_id, e))
        })?;
        Ok(Profile {
            subject_id: SubjectId(self.subject_id),
            phone_number,
            parent_name: self.parent_name,
            child_name: self.child_name,
            child_dob: self.child_dob,
            home_location: Coordinates::new(self.home_latitude, self.home_longitude),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn map_write_error(e: sqlx::Error, subject: SubjectId) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            PortError::Conflict(format!("A profile already exists for {}", subject))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PortError::Unavailable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// `ProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProfileStore for PgProfileAdapter {
    async fn get(&self, subject: SubjectId) -> PortResult<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT subject_id, phone_number, parent_name, child_name, child_dob, \
                    home_latitude, home_longitude, created_at, updated_at \
             FROM profiles WHERE app_instance_id = $1 AND subject_id = $2",
        )
        .bind(&self.app_instance_id)
        .bind(subject.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PortError::Unavailable(e.to_string()),
            _ => PortError::Unexpected(e.to_string()),
        })?;

        debug!("Profile lookup for {}: found={}", subject, record.is_some());
        record.map(ProfileRecord::to_domain).transpose()
    }

    async fn create(&self, subject: SubjectId, profile: &NewProfile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO profiles (app_instance_id, subject_id, phone_number, parent_name, child_name, \
                                   child_dob, home_latitude, home_longitude, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
        )
        .bind(&self.app_instance_id)
        .bind(subject.0)
        .bind(profile.phone_number.as_str())
        .bind(&profile.parent_name)
        .bind(&profile.child_name)
        .bind(profile.child_dob)
        .bind(profile.home_location.latitude)
        .bind(profile.home_location.longitude)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, subject))?;
        Ok(())
    }

    async fn update_partial(&self, subject: SubjectId, patch: &HomeLocationPatch) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE profiles SET home_latitude = $1, home_longitude = $2, updated_at = $3 \
             WHERE app_instance_id = $4 AND subject_id = $5",
        )
        .bind(patch.home_location.latitude)
        .bind(patch.home_location.longitude)
        .bind(patch.updated_at)
        .bind(&self.app_instance_id)
        .bind(subject.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, subject))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("No profile found for {}", subject)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, hour, 0, 0).unwrap()
    }

    fn new_profile(parent_name: &str) -> NewProfile {
        NewProfile {
            phone_number: PhoneNumber::parse("+919876543210").unwrap(),
            parent_name: parent_name.to_string(),
            child_name: "Kavin".to_string(),
            child_dob: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            home_location: Coordinates::new(12.9, 80.1),
            created_at: at(9),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn profiles_are_namespaced_by_app_instance(pool: PgPool) {
        let first = PgProfileAdapter::new(pool.clone(), "vaccimap-a");
        let second = PgProfileAdapter::new(pool, "vaccimap-b");
        let subject = SubjectId::new();

        first.create(subject, &new_profile("Meena")).await.unwrap();
        assert_eq!(second.get(subject).await.unwrap(), None);

        second.create(subject, &new_profile("Asha")).await.unwrap();
        assert_eq!(first.get(subject).await.unwrap().unwrap().parent_name, "Meena");
        assert_eq!(second.get(subject).await.unwrap().unwrap().parent_name, "Asha");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn second_create_conflicts_without_overwriting(pool: PgPool) {
        let store = PgProfileAdapter::new(pool, "vaccimap-local");
        let subject = SubjectId::new();
        store.create(subject, &new_profile("Meena")).await.unwrap();

        let err = store.create(subject, &new_profile("Someone Else")).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        let stored = store.get(subject).await.unwrap().unwrap();
        assert_eq!(stored, new_profile("Meena").into_profile(subject));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn partial_update_touches_only_location_and_timestamp(pool: PgPool) {
        let store = PgProfileAdapter::new(pool, "vaccimap-local");
        let subject = SubjectId::new();
        let patch = HomeLocationPatch {
            home_location: Coordinates::new(13.05, 80.25),
            updated_at: at(11),
        };

        let missing = store.update_partial(subject, &patch).await.unwrap_err();
        assert!(matches!(missing, PortError::NotFound(_)));

        store.create(subject, &new_profile("Meena")).await.unwrap();
        store.update_partial(subject, &patch).await.unwrap();

        let mut expected = new_profile("Meena").into_profile(subject);
        patch.apply_to(&mut expected);
        let stored = store.get(subject).await.unwrap().unwrap();
        assert_eq!(stored, expected);
        assert_eq!(stored.created_at, at(9));
    }
}
