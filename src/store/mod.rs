/*!
Database interaction module.

The Postgres database to which this connects holds the single table of
student records.

```sql
CREATE TABLE students (
    id              BIGSERIAL PRIMARY KEY,
    student_number  TEXT UNIQUE NOT NULL,
    full_name       TEXT NOT NULL,
    email           TEXT UNIQUE NOT NULL,
    program         TEXT NOT NULL,
    year_level      TEXT NOT NULL,
    institution     TEXT,       /* NULL or one of the campus names */
    campus_site     TEXT,
    college         TEXT NOT NULL,
    organization    TEXT,
    status          TEXT,       /* NULL, 'Enrolled', or 'Employed' */
    id_image        TEXT,       /* media reference; NULL means no photo */
    user_id         BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);
```

The UNIQUE constraints on `student_number` and `email` are the system's
only concurrency guard; a race between two creates is settled by the
database rejecting the second one.
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls, error::SqlState};

use crate::student::FieldError;

pub mod students;

pub use students::ImageChange;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            id              BIGSERIAL PRIMARY KEY,
            student_number  TEXT UNIQUE NOT NULL,
            full_name       TEXT NOT NULL,
            email           TEXT UNIQUE NOT NULL,
            program         TEXT NOT NULL,
            year_level      TEXT NOT NULL,
            institution     TEXT,
            campus_site     TEXT,
            college         TEXT NOT NULL,
            organization    TEXT,
            status          TEXT,
            id_image        TEXT,
            user_id         BIGINT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE students",
    ),
];

/**
Failure modes of `Store` operations.

`Invalid` and `Duplicate` are user-correctable; `Forbidden` means the
caller tried to touch somebody else's record; `NotFound` a stale or bogus
id; `Db` everything the application can't do anything about.
*/
#[derive(Debug, PartialEq)]
pub enum StoreError {
    Invalid(Vec<FieldError>),
    Duplicate { field: &'static str },
    Forbidden,
    NotFound,
    Db(String),
}

impl StoreError {
    /// Prepend some contextual `annotation` to a `Db` error.
    pub fn annotate(self, annotation: &str) -> Self {
        match self {
            StoreError::Db(s) => StoreError::Db(format!("{}: {}", annotation, &s)),
            x => x,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StoreError::Invalid(errs) => {
                write!(f, "validation failed")?;
                for e in errs.iter() {
                    write!(f, "; {}", e)?;
                }
                Ok(())
            },
            StoreError::Duplicate { field } => {
                write!(f, "a student with that {} already exists", field)
            },
            StoreError::Forbidden => write!(f, "record belongs to another user"),
            StoreError::NotFound => write!(f, "no such student record"),
            StoreError::Db(s) => write!(f, "{}", s),
        }
    }
}

impl From<tokio_postgres::error::Error> for StoreError {
    fn from(e: tokio_postgres::error::Error) -> StoreError {
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            // The default constraint names are `students_<column>_key`.
            let field = match e.as_db_error().and_then(|dbe| dbe.constraint()) {
                Some(c) if c.contains("email") => "email",
                _ => "student_number",
            };
            return StoreError::Duplicate { field };
        }

        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        StoreError::Db(s)
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> StoreError { StoreError::Db(s) }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, StoreError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let err = StoreError::from(e);
                log::trace!("    ...connection failed: {:?}", &err);
                Err(err.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), StoreError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| StoreError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| StoreError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), StoreError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = StoreError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err);
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: lanyard_test
    password: lanyard_test

    with write access to:

    database: lanyard_store_test
    ```

    They are all `#[ignore]`d so that `cargo test` stays green on machines
    without that database; run them with

    ```bash
    cargo test -- --ignored
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=lanyard_test password='lanyard_test' dbname=lanyard_store_test";

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }

    #[test]
    fn unique_violation_maps_to_duplicate() {
        // Synthesized the long way around: confirm the Display texts the
        // importer surfaces to users name the colliding field.
        let e = StoreError::Duplicate { field: "email" };
        assert_eq!(e.to_string(), "a student with that email already exists");
        let e = StoreError::Duplicate { field: "student_number" };
        assert!(e.to_string().contains("student_number"));
    }
}
