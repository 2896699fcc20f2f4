/*!
Handlers for the student-record routes.

The multipart shape these read is the one the registration form posts:
the ten named text fields of `RawStudent`, plus an optional `id_image`
part that is either an attached file (a new photo), the bare text
`REMOVE` (take the photo off), or absent (leave it alone).
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    http::header::{self, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::config::Glob;
use crate::import::{self, SAMPLE_CSV};
use crate::media::{extension_of, MediaStore, IMAGE_EXTENSIONS, MAX_UPLOAD_BYTES};
use crate::store::{ImageChange, StoreError};
use crate::student::{order_by_recency, FieldError, RawStudent, Student, StudentForm};
use super::*;

/// A new photo, as pulled off the wire.
struct PhotoUpload {
    ext: String,
    bytes: Vec<u8>,
}

/// What the request wants done with the record's photo. The explicit
/// three-way split keeps "field absent" from meaning anything by accident.
enum ImageIntent {
    Keep,
    Replace(PhotoUpload),
    Remove,
}

/// The sentinel the front end sends in the `id_image` field to mean
/// "take the photo off" (as opposed to omitting the field: "no change").
static REMOVE_SENTINEL: &str = "REMOVE";

struct Submission {
    raw: RawStudent,
    intent: ImageIntent,
    // Problems with the photo part; merged into the validation verdict.
    photo_errors: Vec<FieldError>,
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission, Response> {
    let mut sub = Submission {
        raw: RawStudent::default(),
        intent: ImageIntent::Keep,
        photo_errors: Vec::new(),
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => { break; },
            Err(e) => {
                log::error!("Error reading multipart request body: {}", &e);
                return Err(respond_bad_request(
                    "Unreadable multipart request body.".to_owned()
                ));
            },
        };

        let name = match field.name() {
            Some(name) => name.to_owned(),
            None => { continue; },
        };

        if name == "id_image" {
            let filename = field.file_name().map(str::to_owned);
            match filename {
                Some(filename) if !filename.is_empty() => {
                    let bytes = match field.bytes().await {
                        Ok(b) => b,
                        Err(e) => {
                            log::error!("Error reading id_image upload: {}", &e);
                            return Err(respond_bad_request(
                                "Unreadable id_image upload.".to_owned()
                            ));
                        },
                    };

                    let ext = match extension_of(&filename) {
                        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => ext,
                        _ => {
                            sub.photo_errors.push(FieldError {
                                field: "id_image",
                                message: format!(
                                    "must be one of: {}", IMAGE_EXTENSIONS.join(", ")
                                ),
                            });
                            continue;
                        },
                    };
                    if bytes.len() > MAX_UPLOAD_BYTES {
                        sub.photo_errors.push(FieldError {
                            field: "id_image",
                            message: format!(
                                "must not exceed {} bytes", MAX_UPLOAD_BYTES
                            ),
                        });
                        continue;
                    }

                    sub.intent = ImageIntent::Replace(PhotoUpload {
                        ext,
                        bytes: bytes.to_vec(),
                    });
                },
                _ => {
                    // No attached file; the field's text may be the
                    // remove sentinel.
                    if let Ok(text) = field.text().await {
                        if text == REMOVE_SENTINEL {
                            sub.intent = ImageIntent::Remove;
                        }
                    }
                },
            }
            continue;
        }

        let text = match field.text().await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Error reading multipart field {:?}: {}", &name, &e);
                return Err(respond_bad_request(
                    format!("Unreadable value for field {:?}.", &name)
                ));
            },
        };
        if !sub.raw.set_field(&name, text) {
            log::debug!("Ignoring unrecognized form field {:?}.", &name);
        }
    }

    Ok(sub)
}

fn validate_submission(sub: Submission) -> Result<(StudentForm, ImageIntent), Response> {
    let Submission { raw, intent, mut photo_errors } = sub;
    match raw.validate() {
        Ok(form) if photo_errors.is_empty() => Ok((form, intent)),
        Ok(_) => Err(respond_store_error(StoreError::Invalid(photo_errors))),
        Err(mut errs) => {
            errs.append(&mut photo_errors);
            Err(respond_store_error(StoreError::Invalid(errs)))
        },
    }
}

pub async fn create(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    multipart: Multipart,
) -> Response {
    log::trace!("students::create() called.");

    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };

    let sub = match read_submission(multipart).await {
        Ok(sub) => sub,
        Err(resp) => { return resp; },
    };
    let (form, intent) = match validate_submission(sub) {
        Ok(x) => x,
        Err(resp) => { return resp; },
    };

    // The photo goes to stable storage first; the record only ever points
    // at a file that exists.
    let image_ref = match intent {
        ImageIntent::Replace(upload) => {
            match glob.media.store(&upload.ext, &upload.bytes) {
                Ok(reference) => Some(reference),
                Err(e) => {
                    log::error!("Error storing uploaded photo: {}", &e);
                    return text_500(None);
                },
            }
        },
        _ => None,
    };

    match glob.store.insert_student(&form, uid, image_ref.as_deref()).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({
                "id": id,
                "id_image": image_ref,
                "id_image_url": image_ref.as_deref().map(MediaStore::url),
                "message": "Student information saved successfully.",
            })),
        ).into_response(),
        Err(e) => {
            // The record didn't happen, so the file shouldn't either.
            if let Some(reference) = &image_ref {
                if let Err(ioe) = glob.media.delete(reference) {
                    log::warn!(
                        "Leaked stored file {:?} after failed insert: {}",
                        reference, &ioe
                    );
                }
            }
            respond_store_error(e)
        },
    }
}

pub async fn index(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("students::index() called.");

    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };

    match glob.store.get_students(uid).await {
        Ok(students) => Json(students).into_response(),
        Err(e) => respond_store_error(e),
    }
}

/// A record as shown on the "information" view: the usual projection
/// plus its timestamps.
#[derive(Serialize)]
struct StudentInfo<'a> {
    #[serde(flatten)]
    student: &'a Student,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

pub async fn information(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("students::information() called.");

    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };

    let mut students = match glob.store.get_students(uid).await {
        Ok(students) => students,
        Err(e) => { return respond_store_error(e); },
    };
    order_by_recency(&mut students);

    let infos: Vec<StudentInfo> = students.iter()
        .map(|s| StudentInfo {
            student: s,
            created_at: s.created_at,
            updated_at: s.updated_at,
        })
        .collect();

    Json(infos).into_response()
}

pub async fn update(
    Path(id): Path<i64>,
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    multipart: Multipart,
) -> Response {
    log::trace!("students::update( {} ) called.", id);

    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };

    let sub = match read_submission(multipart).await {
        Ok(sub) => sub,
        Err(resp) => { return resp; },
    };
    let (form, intent) = match validate_submission(sub) {
        Ok(x) => x,
        Err(resp) => { return resp; },
    };

    // New photo first, row change second, old photo released last; at no
    // point does the row reference a file that isn't there.
    let (change, new_ref) = match intent {
        ImageIntent::Keep => (ImageChange::Keep, None),
        ImageIntent::Remove => (ImageChange::Remove, None),
        ImageIntent::Replace(upload) => {
            match glob.media.store(&upload.ext, &upload.bytes) {
                Ok(reference) => (ImageChange::Replace(reference.clone()), Some(reference)),
                Err(e) => {
                    log::error!("Error storing uploaded photo: {}", &e);
                    return text_500(None);
                },
            }
        },
    };

    match glob.store.update_student(id, &form, uid, change).await {
        Ok(superseded) => {
            if let Some(old) = superseded {
                if let Err(e) = glob.media.delete(&old) {
                    log::warn!("Leaked superseded stored file {:?}: {}", &old, &e);
                }
            }
            (
                StatusCode::OK,
                Json(json!({
                    "id": id,
                    "message": "Student information updated successfully.",
                })),
            ).into_response()
        },
        Err(e) => {
            if let Some(reference) = &new_ref {
                if let Err(ioe) = glob.media.delete(reference) {
                    log::warn!(
                        "Leaked stored file {:?} after failed update: {}",
                        reference, &ioe
                    );
                }
            }
            respond_store_error(e)
        },
    }
}

pub async fn destroy(
    Path(id): Path<i64>,
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("students::destroy( {} ) called.", id);

    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };

    match glob.store.delete_student(id, uid).await {
        Ok(old_image) => {
            if let Some(reference) = old_image {
                if let Err(e) = glob.media.delete(&reference) {
                    // Benign leak; the record is already gone.
                    log::warn!(
                        "Leaked stored file {:?} after record delete: {}",
                        &reference, &e
                    );
                }
            }
            (
                StatusCode::OK,
                Json(json!({
                    "id": id,
                    "message": "Student deleted successfully.",
                })),
            ).into_response()
        },
        Err(e) => respond_store_error(e),
    }
}

pub async fn batch_upload(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    mut multipart: Multipart,
) -> Response {
    log::trace!("students::batch_upload() called.");

    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };

    let mut roster: Option<Vec<u8>> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => { break; },
            Err(e) => {
                log::error!("Error reading multipart request body: {}", &e);
                return respond_bad_request(
                    "Unreadable multipart request body.".to_owned()
                );
            },
        };

        if field.name() != Some("csv_file") {
            continue;
        }

        match field.file_name().and_then(|f| extension_of(f)) {
            Some(ext) if ext == "csv" || ext == "txt" => {},
            _ => {
                return respond_store_error(StoreError::Invalid(vec![FieldError {
                    field: "csv_file",
                    message: "must be a .csv or .txt file".to_owned(),
                }]));
            },
        }

        match field.bytes().await {
            Ok(bytes) => { roster = Some(bytes.to_vec()); },
            Err(e) => {
                log::error!("Error reading csv_file upload: {}", &e);
                return respond_bad_request(
                    "Unreadable csv_file upload.".to_owned()
                );
            },
        }
    }

    let roster = match roster {
        Some(roster) => roster,
        None => {
            return respond_bad_request(
                "Request must include a csv_file upload.".to_owned()
            );
        },
    };
    if roster.len() > MAX_UPLOAD_BYTES {
        return respond_store_error(StoreError::Invalid(vec![FieldError {
            field: "csv_file",
            message: format!("must not exceed {} bytes", MAX_UPLOAD_BYTES),
        }]));
    }

    let text = String::from_utf8_lossy(&roster);
    let report = import::import_students(&text, uid, &glob.store).await;

    (
        StatusCode::OK,
        Json(json!({
            "message": report.summary(),
            "created": report.created,
            "failed": report.failed,
            "errors": report.errors,
        })),
    ).into_response()
}

pub async fn sample_csv() -> Response {
    log::trace!("students::sample_csv() called.");

    (StatusCode::OK, SAMPLE_CSV).add_headers(vec![
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/csv"),
        ),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"sample_students.csv\""),
        ),
    ])
}
