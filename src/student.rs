/*!
The `Student` record and the validation path that produces one.

Everything that can be checked without touching the database lives here:
the two closed enumerations (`Institution`, `Status`), field length and
format rules, and the conversion of loosely-typed input (an HTML form or a
.csv row) into a `StudentForm` that is valid by construction.
*/
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use time::OffsetDateTime;

pub const MAX_STUDENT_NUMBER: usize = 20;
pub const MAX_NAME: usize = 255;
pub const MAX_EMAIL: usize = 255;
pub const MAX_PROGRAM: usize = 255;
pub const MAX_YEAR_LEVEL: usize = 10;
pub const MAX_CAMPUS_SITE: usize = 255;
pub const MAX_COLLEGE: usize = 255;
pub const MAX_ORGANIZATION: usize = 255;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Deliberately loose; the mail system is the real authority.
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap()
});

/// The eleven campuses a student record may name as its institution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Institution {
    Diliman,
    Manila,
    LosBanos,
    Visayas,
    Baguio,
    Cebu,
    Mindanao,
    OpenUniversity,
    GeneralHospital,
    System,
    Tacloban,
}

impl Institution {
    pub const ALL: [Institution; 11] = [
        Institution::Diliman,
        Institution::Manila,
        Institution::LosBanos,
        Institution::Visayas,
        Institution::Baguio,
        Institution::Cebu,
        Institution::Mindanao,
        Institution::OpenUniversity,
        Institution::GeneralHospital,
        Institution::System,
        Institution::Tacloban,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Institution::Diliman => "University of the Philippines Diliman",
            Institution::Manila => "University of the Philippines Manila",
            Institution::LosBanos => "University of the Philippines Los Banos",
            Institution::Visayas => "University of the Philippines Visayas",
            Institution::Baguio => "University of the Philippines Baguio",
            Institution::Cebu => "University of the Philippines Cebu",
            Institution::Mindanao => "University of the Philippines Mindanao",
            Institution::OpenUniversity => "University of the Philippines Open University",
            Institution::GeneralHospital => "University of the Philippines General Hospital",
            Institution::System => "University of the Philippines System",
            Institution::Tacloban => "University of the Philippines Tacloban",
        }
    }
}

impl std::fmt::Display for Institution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Institution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for inst in Institution::ALL.iter() {
            if s == inst.as_str() {
                return Ok(*inst);
            }
        }
        Err(format!("{:?} is not a recognized institution.", s))
    }
}

impl Serialize for Institution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Enrolled,
    Employed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Enrolled => "Enrolled",
            Status::Employed => "Employed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enrolled" => Ok(Status::Enrolled),
            "Employed" => Ok(Status::Employed),
            _ => Err(format!("{:?} is not a valid status.", s)),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/**
A stored student record.

Serialization covers exactly the fields the card-rendering front end is
shown; `user_id` and the timestamps stay server-side (the "information"
view adds the timestamps back explicitly).
*/
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub student_number: String,
    pub full_name: String,
    pub email: String,
    pub program: String,
    pub year_level: String,
    pub institution: Option<Institution>,
    pub campus_site: Option<String>,
    pub college: String,
    pub organization: Option<String>,
    pub status: Option<Status>,
    pub id_image: Option<String>,
    #[serde(skip_serializing)]
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing)]
    pub updated_at: OffsetDateTime,
}

/// Re-sort a listing most-recently-touched first; creation time breaks ties.
pub fn order_by_recency(students: &mut [Student]) {
    students.sort_by(|a, b| {
        b.updated_at.cmp(&a.updated_at)
            .then(b.created_at.cmp(&a.created_at))
    });
}

/// One field's validation failure.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, &self.message)
    }
}

fn field_error(field: &'static str, message: &str) -> FieldError {
    FieldError { field, message: message.to_owned() }
}

/// A validated submission, obtainable only through `RawStudent::validate()`.
#[derive(Clone, Debug, PartialEq)]
pub struct StudentForm {
    pub student_number: String,
    pub full_name: String,
    pub email: String,
    pub program: String,
    pub year_level: String,
    pub institution: Option<Institution>,
    pub campus_site: Option<String>,
    pub college: String,
    pub organization: Option<String>,
    pub status: Option<Status>,
}

pub fn blank_means_none(s: Option<&str>) -> Option<&str> {
    match s {
        Some(s) => match s.trim() {
            "" => None,
            x => Some(x),
        },
        None => None,
    }
}

/**
A student submission as it arrives: every field optional, nothing trusted.

Both input routes end up here. The single-record form handler fills fields
by name with `set_field()`; the batch importer fills them positionally with
`from_csv_record()`. `validate()` is the only way forward.
*/
#[derive(Debug, Default)]
pub struct RawStudent {
    pub student_number: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub program: Option<String>,
    pub year_level: Option<String>,
    pub institution: Option<String>,
    pub campus_site: Option<String>,
    pub college: Option<String>,
    pub organization: Option<String>,
    pub status: Option<String>,
}

impl RawStudent {
    /**
    Fill from one .csv record in the fixed roster column order:

    ```csv
    student_number,full_name,email,program,year_level,institution,campus_site,college,organization,status
    ```

    Fields are trimmed; a blank field is treated as absent.
    */
    pub fn from_csv_record(rec: &csv::StringRecord) -> RawStudent {
        log::trace!("RawStudent::from_csv_record( {:?} ) called.", rec);

        let grab = |n: usize| blank_means_none(rec.get(n)).map(str::to_owned);

        RawStudent {
            student_number: grab(0),
            full_name: grab(1),
            email: grab(2),
            program: grab(3),
            year_level: grab(4),
            institution: grab(5),
            campus_site: grab(6),
            college: grab(7),
            organization: grab(8),
            status: grab(9),
        }
    }

    /// Set a field by its form name. Returns `false` for unrecognized names
    /// so the caller can decide whether to complain.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let value = match blank_means_none(Some(&value)) {
            Some(v) => Some(v.to_owned()),
            None => None,
        };

        match name {
            "student_number" => { self.student_number = value; },
            "full_name" => { self.full_name = value; },
            "email" => { self.email = value; },
            "program" => { self.program = value; },
            "year_level" => { self.year_level = value; },
            "institution" => { self.institution = value; },
            "campus_site" => { self.campus_site = value; },
            "college" => { self.college = value; },
            "organization" => { self.organization = value; },
            "status" => { self.status = value; },
            _ => { return false; },
        }
        true
    }

    pub fn validate(self) -> Result<StudentForm, Vec<FieldError>> {
        log::trace!("RawStudent::validate( {:?} ) called.", &self);

        let mut errors: Vec<FieldError> = Vec::new();

        let mut required = |field: &'static str, value: Option<String>, max: usize| {
            match value {
                None => {
                    errors.push(field_error(field, "is required"));
                    String::new()
                },
                Some(v) => {
                    if v.chars().count() > max {
                        errors.push(FieldError {
                            field,
                            message: format!("must not exceed {} characters", max),
                        });
                    }
                    v
                },
            }
        };

        let student_number = required("student_number", self.student_number, MAX_STUDENT_NUMBER);
        let full_name = required("full_name", self.full_name, MAX_NAME);
        let email = required("email", self.email, MAX_EMAIL);
        let program = required("program", self.program, MAX_PROGRAM);
        let year_level = required("year_level", self.year_level, MAX_YEAR_LEVEL);
        let college = required("college", self.college, MAX_COLLEGE);

        if !email.is_empty() && !EMAIL_PATTERN.is_match(&email) {
            errors.push(field_error("email", "must be a valid email address"));
        }

        let mut bounded = |field: &'static str, value: Option<String>, max: usize| {
            if let Some(v) = &value {
                if v.chars().count() > max {
                    errors.push(FieldError {
                        field,
                        message: format!("must not exceed {} characters", max),
                    });
                }
            }
            value
        };

        let campus_site = bounded("campus_site", self.campus_site, MAX_CAMPUS_SITE);
        let organization = bounded("organization", self.organization, MAX_ORGANIZATION);

        let institution: Option<Institution> = match self.institution {
            None => None,
            Some(s) => match s.parse() {
                Ok(inst) => Some(inst),
                Err(e) => {
                    errors.push(FieldError { field: "institution", message: e });
                    None
                },
            },
        };

        let status: Option<Status> = match self.status {
            None => None,
            Some(s) => match s.parse() {
                Ok(st) => Some(st),
                Err(e) => {
                    errors.push(FieldError { field: "status", message: e });
                    None
                },
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(StudentForm {
            student_number,
            full_name,
            email,
            program,
            year_level,
            institution,
            campus_site,
            college,
            organization,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    fn full_raw() -> RawStudent {
        RawStudent {
            student_number: Some("2021-123456".to_owned()),
            full_name: Some("John Doe".to_owned()),
            email: Some("john.doe@example.com".to_owned()),
            program: Some("Computer Science".to_owned()),
            year_level: Some("4th Year".to_owned()),
            institution: Some("University of the Philippines Diliman".to_owned()),
            campus_site: Some("Main Campus".to_owned()),
            college: Some("College of Engineering".to_owned()),
            organization: Some("Computer Society".to_owned()),
            status: Some("Enrolled".to_owned()),
        }
    }

    #[test]
    fn institution_round_trip() {
        for inst in Institution::ALL.iter() {
            let parsed: Institution = inst.as_str().parse().unwrap();
            assert_eq!(*inst, parsed);
        }
        assert!("University of Somewhere Else".parse::<Institution>().is_err());
        assert!("".parse::<Institution>().is_err());
    }

    #[test]
    fn status_round_trip() {
        assert_eq!("Enrolled".parse::<Status>().unwrap(), Status::Enrolled);
        assert_eq!("Employed".parse::<Status>().unwrap(), Status::Employed);
        assert!("enrolled".parse::<Status>().is_err());
        assert!("Expelled".parse::<Status>().is_err());
    }

    #[test]
    fn validate_full_form() {
        ensure_logging();
        let form = full_raw().validate().unwrap();
        assert_eq!(form.student_number, "2021-123456");
        assert_eq!(form.institution, Some(Institution::Diliman));
        assert_eq!(form.status, Some(Status::Enrolled));
    }

    #[test]
    fn validate_optionals_absent() {
        let mut raw = full_raw();
        raw.institution = None;
        raw.campus_site = None;
        raw.organization = None;
        raw.status = None;
        let form = raw.validate().unwrap();
        assert_eq!(form.institution, None);
        assert_eq!(form.campus_site, None);
        assert_eq!(form.organization, None);
        assert_eq!(form.status, None);
    }

    #[test]
    fn validate_missing_required() {
        let mut raw = full_raw();
        raw.student_number = None;
        raw.college = None;
        let errs = raw.validate().unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["student_number", "college"]);
    }

    #[test]
    fn validate_bad_email() {
        let mut raw = full_raw();
        raw.email = Some("bad-email".to_owned());
        let errs = raw.validate().unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "email");
        assert!(errs[0].message.contains("valid email"));
    }

    #[test]
    fn validate_length_bounds() {
        let mut raw = full_raw();
        raw.student_number = Some("x".repeat(MAX_STUDENT_NUMBER + 1));
        raw.year_level = Some("y".repeat(MAX_YEAR_LEVEL + 1));
        let errs = raw.validate().unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["student_number", "year_level"]);
    }

    #[test]
    fn validate_out_of_enum() {
        let mut raw = full_raw();
        raw.institution = Some("Hogwarts".to_owned());
        raw.status = Some("Graduated".to_owned());
        let errs = raw.validate().unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["institution", "status"]);
    }

    #[test]
    fn csv_record_blanks_are_absent() {
        let rec = csv::StringRecord::from(vec![
            "2021-1", "Alice", "a@x.com", "CS", "1", "", "  ", "COE", "", "Enrolled",
        ]);
        let raw = RawStudent::from_csv_record(&rec);
        assert_eq!(raw.student_number.as_deref(), Some("2021-1"));
        assert_eq!(raw.institution, None);
        assert_eq!(raw.campus_site, None);
        assert_eq!(raw.organization, None);
        assert_eq!(raw.status.as_deref(), Some("Enrolled"));
    }

    #[test]
    fn set_field_trims_and_rejects_unknown() {
        let mut raw = RawStudent::default();
        assert!(raw.set_field("full_name", "  Jane Roe  ".to_owned()));
        assert!(raw.set_field("campus_site", "   ".to_owned()));
        assert!(!raw.set_field("favorite_color", "mauve".to_owned()));
        assert_eq!(raw.full_name.as_deref(), Some("Jane Roe"));
        assert_eq!(raw.campus_site, None);
    }

    fn student_touched_at(id: i64, created: i64, updated: i64) -> Student {
        Student {
            id,
            student_number: format!("2021-{}", id),
            full_name: "Test".to_owned(),
            email: format!("t{}@x.com", id),
            program: "CS".to_owned(),
            year_level: "1".to_owned(),
            institution: None,
            campus_site: None,
            college: "COE".to_owned(),
            organization: None,
            status: None,
            id_image: None,
            user_id: 1,
            created_at: OffsetDateTime::from_unix_timestamp(created).unwrap(),
            updated_at: OffsetDateTime::from_unix_timestamp(updated).unwrap(),
        }
    }

    #[test]
    fn recency_ordering() {
        let mut v = vec![
            student_touched_at(1, 100, 100),
            student_touched_at(2, 50, 300),
            student_touched_at(3, 200, 200),
        ];
        order_by_recency(&mut v);
        let ids: Vec<i64> = v.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn recency_tie_broken_by_creation() {
        let mut v = vec![
            student_touched_at(1, 100, 500),
            student_touched_at(2, 300, 500),
        ];
        order_by_recency(&mut v);
        let ids: Vec<i64> = v.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn serialization_hides_owner_and_timestamps() {
        let s = student_touched_at(7, 100, 100);
        let v = serde_json::to_value(&s).unwrap();
        let obj = v.as_object().unwrap();
        assert!(obj.contains_key("student_number"));
        assert!(obj.contains_key("id_image"));
        assert!(!obj.contains_key("user_id"));
        assert!(!obj.contains_key("created_at"));
        assert!(!obj.contains_key("updated_at"));
    }
}
