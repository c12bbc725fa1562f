use std::{collections::HashMap, str::FromStr, time::Duration};

use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous},
    Row, SqliteConnection, SqlitePool,
};
use thiserror::Error;

use docreviews_core::{
    Doctor, DoctorSummary, DoctorUpdate, NewDoctor, NewReview, Review, ReviewSummary,
    ReviewUpdate, ValidationError,
};

pub use sqlx::Error as SqlxError;

const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Foreign keys and the busy timeout are configured per connection so every
    /// pooled connection enforces the review → doctor reference.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if is_in_memory(database_url) {
            // An in-memory database is dropped with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for reading and mutating doctors.
    pub fn doctors(&self) -> DoctorRepository {
        DoctorRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for reading and mutating reviews.
    pub fn reviews(&self) -> ReviewRepository {
        ReviewRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for checked-out connections to return and closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures of entity store operations.
///
/// Every variant except [`StoreError::Database`] is caused by the request and
/// carries a message suitable for API clients.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Doctor does not exist with id: {0}")]
    UnknownDoctor(i64),
    #[error("Doctor and Review mismatch")]
    Mismatch { doctor_id: i64, review_id: i64 },
    #[error("No doctor found with id: {0}")]
    DoctorNotFound(i64),
    #[error("No review found with id: {0}")]
    ReviewNotFound(i64),
    #[error("Doctor already exists with id: {0}")]
    DuplicateDoctor(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of deleting a doctor together with its reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoctorDeletion {
    pub deleted: bool,
    pub reviews_deleted: u64,
}

/// Repository for the `doctors` table.
#[derive(Clone)]
pub struct DoctorRepository {
    pool: SqlitePool,
}

impl DoctorRepository {
    /// Inserts a doctor, letting SQLite assign the id unless one was requested.
    pub async fn create(&self, doctor: &NewDoctor) -> Result<Doctor, StoreError> {
        let row = sqlx::query("INSERT INTO doctors (id, name) VALUES (?, ?) RETURNING id")
            .bind(doctor.id())
            .bind(doctor.name())
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db_err)
                    if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_PRIMARYKEY) =>
                {
                    StoreError::DuplicateDoctor(doctor.id().unwrap_or_default())
                }
                other => StoreError::Database(other),
            })?;

        Ok(Doctor {
            name: doctor.name().to_string(),
            id: row.get("id"),
            reviews: Vec::new(),
        })
    }

    /// Loads a doctor and the summaries of its reviews.
    pub async fn fetch(&self, id: i64) -> Result<Option<Doctor>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_doctor(&mut conn, id).await?)
    }

    /// Lists every doctor ordered by id, each with its review summaries.
    pub async fn list(&self) -> Result<Vec<Doctor>, StoreError> {
        let doctors = sqlx::query_as::<_, DoctorRow>("SELECT id, name FROM doctors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let reviews = sqlx::query_as::<_, ReviewSummaryRow>(
            "SELECT id, description, doctor_id FROM reviews ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_doctor: HashMap<i64, Vec<ReviewSummary>> = HashMap::new();
        for review in reviews {
            by_doctor
                .entry(review.doctor_id)
                .or_default()
                .push(review.into_domain());
        }

        Ok(doctors
            .into_iter()
            .map(|row| {
                let reviews = by_doctor.remove(&row.id).unwrap_or_default();
                row.into_domain(reviews)
            })
            .collect())
    }

    /// Applies the permitted field changes and returns the stored doctor.
    pub async fn update(&self, id: i64, update: DoctorUpdate) -> Result<Doctor, StoreError> {
        let update = update.validate()?;
        let mut tx = self.pool.begin().await?;

        if let Some(name) = update.name.as_deref() {
            let result = sqlx::query("UPDATE doctors SET name = ? WHERE id = ?")
                .bind(name)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::DoctorNotFound(id));
            }
        }

        let doctor = load_doctor(&mut tx, id)
            .await?
            .ok_or(StoreError::DoctorNotFound(id))?;
        tx.commit().await?;
        Ok(doctor)
    }

    /// Deletes a doctor and every review that references it.
    pub async fn delete(&self, id: i64) -> Result<DoctorDeletion, StoreError> {
        let mut tx = self.pool.begin().await?;

        let reviews = sqlx::query("DELETE FROM reviews WHERE doctor_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let doctors = sqlx::query("DELETE FROM doctors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DoctorDeletion {
            deleted: doctors.rows_affected() > 0,
            reviews_deleted: reviews.rows_affected(),
        })
    }
}

/// Repository for the `reviews` table.
#[derive(Clone)]
pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    /// Inserts a review after confirming the referenced doctor exists.
    pub async fn create(&self, review: &NewReview) -> Result<Review, StoreError> {
        let mut tx = self.pool.begin().await?;

        let doctor = sqlx::query_as::<_, DoctorRow>("SELECT id, name FROM doctors WHERE id = ?")
            .bind(review.doctor_id())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::UnknownDoctor(review.doctor_id()))?;

        let row = sqlx::query(
            "INSERT INTO reviews (description, doctor_id) VALUES (?, ?) RETURNING id",
        )
        .bind(review.description())
        .bind(review.doctor_id())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_FOREIGNKEY) =>
            {
                StoreError::UnknownDoctor(review.doctor_id())
            }
            other => StoreError::Database(other),
        })?;

        tx.commit().await?;
        Ok(Review {
            description: review.description().to_string(),
            id: row.get("id"),
            doctor: DoctorSummary {
                id: doctor.id,
                name: doctor.name,
            },
        })
    }

    /// Loads a review together with its parent doctor.
    pub async fn fetch(&self, id: i64) -> Result<Option<Review>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_review(&mut conn, id).await?)
    }

    /// Loads a review only if it belongs to the given doctor.
    ///
    /// A missing review is `Ok(None)`; a review owned by another doctor is
    /// [`StoreError::Mismatch`].
    pub async fn fetch_for_doctor(
        &self,
        doctor_id: i64,
        review_id: i64,
    ) -> Result<Option<Review>, StoreError> {
        let Some(review) = self.fetch(review_id).await? else {
            return Ok(None);
        };
        if review.doctor_id() != doctor_id {
            return Err(StoreError::Mismatch {
                doctor_id,
                review_id,
            });
        }
        Ok(Some(review))
    }

    /// Lists every review ordered by id.
    pub async fn list(&self) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r#"
SELECT r.id,
       r.description,
       r.doctor_id,
       d.name AS doctor_name
  FROM reviews AS r
  JOIN doctors AS d
    ON d.id = r.doctor_id
 ORDER BY r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReviewRow::into_domain).collect())
    }

    /// Applies the permitted field changes and returns the stored review.
    pub async fn update(&self, id: i64, update: ReviewUpdate) -> Result<Review, StoreError> {
        let update = update.validate()?;
        let mut tx = self.pool.begin().await?;

        if let Some(description) = update.description.as_deref() {
            let result = sqlx::query("UPDATE reviews SET description = ? WHERE id = ?")
                .bind(description)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::ReviewNotFound(id));
            }
        }

        let review = load_review(&mut tx, id)
            .await?
            .ok_or(StoreError::ReviewNotFound(id))?;
        tx.commit().await?;
        Ok(review)
    }

    /// Deletes a review, returning whether a row was removed.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn load_doctor(conn: &mut SqliteConnection, id: i64) -> Result<Option<Doctor>, sqlx::Error> {
    let Some(row) = sqlx::query_as::<_, DoctorRow>("SELECT id, name FROM doctors WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let reviews = sqlx::query_as::<_, ReviewSummaryRow>(
        "SELECT id, description, doctor_id FROM reviews WHERE doctor_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(row.into_domain(
        reviews.into_iter().map(ReviewSummaryRow::into_domain).collect(),
    )))
}

async fn load_review(conn: &mut SqliteConnection, id: i64) -> Result<Option<Review>, sqlx::Error> {
    let row = sqlx::query_as::<_, ReviewRow>(
        r#"
SELECT r.id,
       r.description,
       r.doctor_id,
       d.name AS doctor_name
  FROM reviews AS r
  JOIN doctors AS d
    ON d.id = r.doctor_id
 WHERE r.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(ReviewRow::into_domain))
}

#[derive(Debug, sqlx::FromRow)]
struct DoctorRow {
    id: i64,
    name: String,
}

impl DoctorRow {
    fn into_domain(self, reviews: Vec<ReviewSummary>) -> Doctor {
        Doctor {
            name: self.name,
            id: self.id,
            reviews,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewSummaryRow {
    id: i64,
    description: String,
    doctor_id: i64,
}

impl ReviewSummaryRow {
    fn into_domain(self) -> ReviewSummary {
        ReviewSummary {
            id: self.id,
            description: self.description,
        }
    }
}

/// Review joined with its doctor's name.
#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    description: String,
    doctor_id: i64,
    doctor_name: String,
}

impl ReviewRow {
    fn into_domain(self) -> Review {
        Review {
            description: self.description,
            id: self.id,
            doctor: DoctorSummary {
                id: self.doctor_id,
                name: self.doctor_name,
            },
        }
    }
}
