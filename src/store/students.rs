/*!
`Store` methods for the student records themselves.

Every mutating method here follows the same shape: connect, open a
transaction, fetch-and-authorize where a record id is involved, make the
row change, commit. File-storage consequences (releasing a replaced or
orphaned photo) are the caller's job, which is why the update and delete
methods hand back the superseded media reference.
*/
use tokio_postgres::Row;

use super::{Store, StoreError};
use crate::student::{Student, StudentForm};

/**
What an update wants done with the record's photo.

An explicit tagged value, so "leave it alone", "swap it for this new
file", and "take it off entirely" can never be confused for one another.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum ImageChange {
    Keep,
    Replace(String),
    Remove,
}

/// The single ownership check every record-addressed operation goes through.
fn authorize(actor: i64, owner: i64) -> Result<(), StoreError> {
    if actor == owner {
        Ok(())
    } else {
        Err(StoreError::Forbidden)
    }
}

fn student_from_row(row: &Row) -> Result<Student, StoreError> {
    let institution = match row.try_get::<_, Option<String>>("institution")? {
        None => None,
        Some(s) => Some(s.parse().map_err(|e: String|
            StoreError::Db(e).annotate("Bad institution value in students table")
        )?),
    };
    let status = match row.try_get::<_, Option<String>>("status")? {
        None => None,
        Some(s) => Some(s.parse().map_err(|e: String|
            StoreError::Db(e).annotate("Bad status value in students table")
        )?),
    };

    Ok(Student {
        id: row.try_get("id")?,
        student_number: row.try_get("student_number")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        program: row.try_get("program")?,
        year_level: row.try_get("year_level")?,
        institution,
        campus_site: row.try_get("campus_site")?,
        college: row.try_get("college")?,
        organization: row.try_get("organization")?,
        status,
        id_image: row.try_get("id_image")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Store {
    /**
    Insert a new record owned by `owner`, with `image_ref` already persisted
    by the caller (persist-file-then-commit-record; an `Err` here obliges
    the caller to remove the file again).

    Uniqueness of `student_number` and `email` is left to the table's
    constraints, which surface as `StoreError::Duplicate`.
    */
    pub async fn insert_student(
        &self,
        form: &StudentForm,
        owner: i64,
        image_ref: Option<&str>,
    ) -> Result<i64, StoreError> {
        log::trace!(
            "Store::insert_student( {:?}, {}, {:?} ) called.",
            &form.student_number, owner, &image_ref
        );

        let client = self.connect().await?;

        let institution = form.institution.map(|i| i.as_str());
        let status = form.status.map(|s| s.as_str());

        let row = client.query_one(
            "INSERT INTO students
                (student_number, full_name, email, program, year_level,
                 institution, campus_site, college, organization, status,
                 id_image, user_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING id",
            &[
                &form.student_number,
                &form.full_name,
                &form.email,
                &form.program,
                &form.year_level,
                &institution,
                &form.campus_site,
                &form.college,
                &form.organization,
                &status,
                &image_ref,
                &owner,
            ],
        ).await?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Inserted student {:?} as record {}.", &form.student_number, id);
        Ok(id)
    }

    /// All records owned by `owner`. No ordering promised; compose with
    /// `student::order_by_recency` for display listings.
    pub async fn get_students(&self, owner: i64) -> Result<Vec<Student>, StoreError> {
        log::trace!("Store::get_students( {} ) called.", owner);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM students WHERE user_id = $1",
            &[&owner],
        ).await?;

        let mut students: Vec<Student> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            students.push(student_from_row(row)?);
        }
        Ok(students)
    }

    /// Fetch one record by id, enforcing ownership. A foreign record reads
    /// as `NotFound`, not `Forbidden`; reads don't leak existence.
    pub async fn get_student(&self, id: i64, owner: i64) -> Result<Student, StoreError> {
        log::trace!("Store::get_student( {}, {} ) called.", id, owner);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT * FROM students WHERE id = $1 AND user_id = $2",
            &[&id, &owner],
        ).await?;

        match row {
            Some(row) => student_from_row(&row),
            None => Err(StoreError::NotFound),
        }
    }

    /**
    Full-field replace of record `id`, as `actor`.

    `image` is the tri-state photo instruction. On success the return value
    is the media reference this update superseded (the old photo under
    `Replace` or `Remove`), which the caller must release now that no row
    refers to it. Under `Keep` the reference is untouched and `None` comes
    back.
    */
    pub async fn update_student(
        &self,
        id: i64,
        form: &StudentForm,
        actor: i64,
        image: ImageChange,
    ) -> Result<Option<String>, StoreError> {
        log::trace!(
            "Store::update_student( {}, {:?}, {}, {:?} ) called.",
            id, &form.student_number, actor, &image
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_opt(
            "SELECT user_id, id_image FROM students WHERE id = $1",
            &[&id],
        ).await?;
        let row = match row {
            Some(row) => row,
            None => { return Err(StoreError::NotFound); },
        };
        authorize(actor, row.try_get("user_id")?)?;
        let old_image: Option<String> = row.try_get("id_image")?;

        let institution = form.institution.map(|i| i.as_str());
        let status = form.status.map(|s| s.as_str());

        let keep_image = matches!(&image, ImageChange::Keep);
        let (superseded, new_image) = match image {
            ImageChange::Keep => (None, None),
            ImageChange::Replace(r) => (old_image, Some(r)),
            ImageChange::Remove => (old_image, None),
        };

        if keep_image {
            t.execute(
                "UPDATE students SET
                    student_number = $1, full_name = $2, email = $3,
                    program = $4, year_level = $5, institution = $6,
                    campus_site = $7, college = $8, organization = $9,
                    status = $10, updated_at = now()
                    WHERE id = $11",
                &[
                    &form.student_number, &form.full_name, &form.email,
                    &form.program, &form.year_level, &institution,
                    &form.campus_site, &form.college, &form.organization,
                    &status, &id,
                ],
            ).await?;
        } else {
            t.execute(
                "UPDATE students SET
                    student_number = $1, full_name = $2, email = $3,
                    program = $4, year_level = $5, institution = $6,
                    campus_site = $7, college = $8, organization = $9,
                    status = $10, id_image = $11, updated_at = now()
                    WHERE id = $12",
                &[
                    &form.student_number, &form.full_name, &form.email,
                    &form.program, &form.year_level, &institution,
                    &form.campus_site, &form.college, &form.organization,
                    &status, &new_image, &id,
                ],
            ).await?;
        }

        t.commit().await?;
        Ok(superseded)
    }

    /**
    Delete record `id`, as `actor`. Terminal; there is no recovery.

    Returns the record's media reference, if it had one, for the caller to
    release. The row is gone before the file is touched, so no visible
    record can ever point at a missing file; a failed file removal
    afterward is a leak the caller logs and shrugs at.
    */
    pub async fn delete_student(
        &self,
        id: i64,
        actor: i64,
    ) -> Result<Option<String>, StoreError> {
        log::trace!("Store::delete_student( {}, {} ) called.", id, actor);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_opt(
            "SELECT user_id, id_image FROM students WHERE id = $1",
            &[&id],
        ).await?;
        let row = match row {
            Some(row) => row,
            None => { return Err(StoreError::NotFound); },
        };
        authorize(actor, row.try_get("user_id")?)?;
        let old_image: Option<String> = row.try_get("id_image")?;

        let n = t.execute("DELETE FROM students WHERE id = $1", &[&id]).await?;
        if n != 1 {
            log::warn!("Deleting student record {} affected {} rows.", id, &n);
        }

        t.commit().await?;
        log::trace!("Deleted student record {}.", id);
        Ok(old_image)
    }
}
