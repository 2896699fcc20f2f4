/*!
The ID-card template endpoints.

There is no card-rendering pipeline behind these; the front end draws the
card previews itself, and download/print answer with the record and the
chosen template so a future generator has everything it needs. They are
deliberately descriptive stubs.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    http::header::HeaderMap,
    response::{IntoResponse, Response},
    Form,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::config::Glob;
use super::*;

/// The card layouts the front end knows how to draw.
pub static TEMPLATES: &[&str] = &["horizontal", "vertical", "compact"];

static DEFAULT_TEMPLATE: &str = "horizontal";

#[derive(Debug, Deserialize)]
pub struct TemplateChoice {
    template: Option<String>,
}

fn chosen_template(form: Option<Form<TemplateChoice>>) -> Result<String, Response> {
    let name = match form {
        Some(Form(choice)) => match choice.template {
            Some(name) => name,
            None => DEFAULT_TEMPLATE.to_owned(),
        },
        None => DEFAULT_TEMPLATE.to_owned(),
    };

    if TEMPLATES.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(respond_bad_request(
            format!("{:?} is not a recognized card template.", &name)
        ))
    }
}

async fn card_stub(
    id: i64,
    headers: HeaderMap,
    glob: Arc<Glob>,
    form: Option<Form<TemplateChoice>>,
    message: &str,
) -> Response {
    let uid = match request_uid(&headers) {
        Ok(uid) => uid,
        Err(resp) => { return resp; },
    };
    let template = match chosen_template(form) {
        Ok(t) => t,
        Err(resp) => { return resp; },
    };

    match glob.store.get_student(id, uid).await {
        Ok(student) => (
            StatusCode::OK,
            Json(json!({
                "message": message,
                "student": student,
                "template": template,
            })),
        ).into_response(),
        Err(e) => respond_store_error(e),
    }
}

pub async fn download(
    Path(id): Path<i64>,
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    form: Option<Form<TemplateChoice>>,
) -> Response {
    log::trace!("cards::download( {} ) called.", id);

    card_stub(
        id, headers, glob, form,
        "Download functionality would generate and download the ID card.",
    ).await
}

pub async fn print(
    Path(id): Path<i64>,
    headers: HeaderMap,
    Extension(glob): Extension<Arc<Glob>>,
    form: Option<Form<TemplateChoice>>,
) -> Response {
    log::trace!("cards::print( {} ) called.", id);

    card_stub(
        id, headers, glob, form,
        "Print functionality would generate a print-ready ID card.",
    ).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_choices() {
        assert_eq!(chosen_template(None).unwrap(), "horizontal");

        let form = Form(TemplateChoice { template: Some("vertical".to_owned()) });
        assert_eq!(chosen_template(Some(form)).unwrap(), "vertical");

        let form = Form(TemplateChoice { template: None });
        assert_eq!(chosen_template(Some(form)).unwrap(), "horizontal");

        let form = Form(TemplateChoice { template: Some("diagonal".to_owned()) });
        assert!(chosen_template(Some(form)).is_err());
    }
}
