/*!
Batch roster import: one uploaded .csv file in, one record per good row,
one report out.

The point of this module is that a single bad row costs exactly one row.
Rows are independent, processed strictly in file order, and every failure
is recorded against its 1-based line number in the uploaded file (the
header is line 1) so an administrator can fix the three bad lines of a
400-student roster instead of guessing.
*/
use crate::store::{Store, StoreError};
use crate::student::{RawStudent, StudentForm};

/// Columns a roster row must supply, in this fixed order:
/// student_number, full_name, email, program, year_level, institution,
/// campus_site, college, organization, status.
pub const REQUIRED_COLUMNS: usize = 10;

/// The example file served for download next to the upload form.
pub static SAMPLE_CSV: &str = "\
student_number,full_name,email,program,year_level,institution,campus_site,college,organization,status
2021-123456,John Doe,john.doe@example.com,Computer Science,4th Year,University of the Philippines Diliman,Main Campus,College of Engineering,Computer Society,Enrolled
2021-123457,Jane Smith,jane.smith@example.com,Information Technology,3rd Year,University of the Philippines Manila,Ermita Campus,College of Engineering,IT Guild,Enrolled
2021-123458,Mike Johnson,mike.johnson@example.com,Business Administration,2nd Year,University of the Philippines Diliman,Main Campus,College of Business,Business Club,Enrolled
2021-123459,Sarah Wilson,sarah.wilson@example.com,Psychology,1st Year,University of the Philippines Baguio,Main Campus,College of Liberal Arts,Psychology Society,Enrolled
";

/// The one thing the importer needs its record store to do.
///
/// `Store` implements it; tests substitute an in-memory double.
#[allow(async_fn_in_trait)]
pub trait CreateStudent {
    async fn create_student(
        &self,
        form: &StudentForm,
        owner: i64,
    ) -> Result<i64, StoreError>;
}

impl CreateStudent for Store {
    async fn create_student(
        &self,
        form: &StudentForm,
        owner: i64,
    ) -> Result<i64, StoreError> {
        // Roster rows never carry a photo.
        self.insert_student(form, owner, None).await
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportReport {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn fail(&mut self, line_no: usize, message: &str) {
        self.failed += 1;
        self.errors.push(format!("Line {}: {}", line_no, message));
    }

    /// The one-line summary shown to the uploading user.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Batch upload completed: {} students added successfully",
            self.created
        );
        if self.failed > 0 {
            s.push_str(&format!(", {} errors occurred", self.failed));
        }
        s
    }
}

// A roster line is parsed on its own so that quoting errors, like every
// other per-row problem, stay confined to that row.
fn parse_row(line: &str) -> Result<csv::StringRecord, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match rdr.records().next() {
        Some(res) => res,
        None => Ok(csv::StringRecord::new()),
    }
}

/**
Run the whole uploaded file against the store, as `owner`.

The first line is assumed to be the column header and discarded. Blank
lines are skipped silently. Nothing a single row does can abort the
batch; creation failures (validation, duplicates) and format problems
alike are collected into the report and the loop moves on.
*/
pub async fn import_students<S: CreateStudent>(
    text: &str,
    owner: i64,
    sink: &S,
) -> ImportReport {
    log::trace!(
        "import_students( [ {} bytes of text ], {}, ... ) called.",
        text.len(), owner
    );

    let mut report = ImportReport::default();

    for (n, line) in text.split('\n').enumerate() {
        if n == 0 {
            // Header.
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = n + 1;

        let rec = match parse_row(line) {
            Ok(rec) => rec,
            Err(e) => {
                report.fail(line_no, &format!("unparseable row: {}", &e));
                continue;
            },
        };

        if rec.len() < REQUIRED_COLUMNS {
            report.fail(
                line_no,
                &format!("invalid format - expected {} columns", REQUIRED_COLUMNS),
            );
            continue;
        }

        let form = match RawStudent::from_csv_record(&rec).validate() {
            Ok(form) => form,
            Err(errs) => {
                let joined: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
                report.fail(line_no, &joined.join("; "));
                continue;
            },
        };

        match sink.create_student(&form, owner).await {
            Ok(id) => {
                log::trace!("Line {} created record {}.", line_no, id);
                report.created += 1;
            },
            Err(e) => {
                report.fail(line_no, &e.to_string());
            },
        }
    }

    log::info!(
        "Roster import for user {}: {} created, {} failed.",
        owner, report.created, report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use crate::tests::ensure_logging;

    /// Store double that enforces the same uniqueness the real table does.
    #[derive(Default)]
    struct MemSink {
        created: Mutex<Vec<StudentForm>>,
        numbers: Mutex<HashSet<String>>,
        emails: Mutex<HashSet<String>>,
    }

    impl CreateStudent for MemSink {
        async fn create_student(
            &self,
            form: &StudentForm,
            _owner: i64,
        ) -> Result<i64, StoreError> {
            if !self.numbers.lock().unwrap().insert(form.student_number.clone()) {
                return Err(StoreError::Duplicate { field: "student_number" });
            }
            if !self.emails.lock().unwrap().insert(form.email.clone()) {
                self.numbers.lock().unwrap().remove(&form.student_number);
                return Err(StoreError::Duplicate { field: "email" });
            }
            let mut created = self.created.lock().unwrap();
            created.push(form.clone());
            Ok(created.len() as i64)
        }
    }

    static HEADER: &str = "student_number,full_name,email,program,year_level,institution,campus_site,college,organization,status";

    fn roster(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for row in rows.iter() {
            s.push('\n');
            s.push_str(row);
        }
        s.push('\n');
        s
    }

    #[tokio::test]
    async fn clean_import() {
        ensure_logging();

        let sink = MemSink::default();
        let text = roster(&[
            "2021-1,Alice,a@x.com,CS,1,,,COE,,Enrolled",
            "2021-2,Bob,b@x.com,IT,2,,,COE,,Enrolled",
        ]);
        let report = import_students(&text, 1, &sink).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 0);
        assert!(report.errors.is_empty());

        let created = sink.created.lock().unwrap();
        assert_eq!(created[0].full_name, "Alice");
        assert_eq!(created[1].status.unwrap().as_str(), "Enrolled");
        assert_eq!(created[1].institution, None);
    }

    #[tokio::test]
    async fn one_bad_row_costs_one_row() {
        let sink = MemSink::default();
        let text = roster(&[
            "2021-1,Alice,a@x.com,CS,1,,,COE,,Enrolled",
            "2021-2,Bob,bad-email,IT,2,,,COE,,Enrolled",
        ]);
        let report = import_students(&text, 1, &sink).await;

        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Line 3:"));
        assert!(report.errors[0].contains("email"));
        assert!(report.errors[0].contains("valid email"));
    }

    #[tokio::test]
    async fn short_row_is_a_format_error() {
        let sink = MemSink::default();
        let text = roster(&[
            "2021-1,Alice,a@x.com,CS,1,,,COE,,Enrolled",
            "2021-2,Bob,b@x.com,IT",
            "2021-3,Cid,c@x.com,CS,1,,,COE,,Enrolled",
        ]);
        let report = import_students(&text, 1, &sink).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.errors,
            vec!["Line 3: invalid format - expected 10 columns".to_owned()]
        );
    }

    #[tokio::test]
    async fn blank_lines_skipped_silently() {
        let sink = MemSink::default();
        let text = format!(
            "{}\n\n2021-1,Alice,a@x.com,CS,1,,,COE,,Enrolled\n   \n\n2021-2,Bob,b@x.com,IT,2,,,COE,,Enrolled\n",
            HEADER
        );
        let report = import_students(&text, 1, &sink).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 0);
        // Blank lines still count toward file line numbers for later rows.
        assert_eq!(sink.created.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn quoted_fields_survive() {
        let sink = MemSink::default();
        let text = roster(&[
            r#"2021-1,"Doe, John",a@x.com,"BS ""Computer"" Science",1,,,COE,,Enrolled"#,
        ]);
        let report = import_students(&text, 1, &sink).await;

        assert_eq!(report.created, 1);
        let created = sink.created.lock().unwrap();
        assert_eq!(created[0].full_name, "Doe, John");
        assert_eq!(created[0].program, r#"BS "Computer" Science"#);
    }

    #[tokio::test]
    async fn reimport_duplicates_everything() {
        let sink = MemSink::default();
        let text = roster(&[
            "2021-1,Alice,a@x.com,CS,1,,,COE,,Enrolled",
            "2021-2,Bob,b@x.com,IT,2,,,COE,,Enrolled",
        ]);

        let first = import_students(&text, 1, &sink).await;
        assert_eq!((first.created, first.failed), (2, 0));

        let second = import_students(&text, 1, &sink).await;
        assert_eq!((second.created, second.failed), (0, 2));
        assert_eq!(sink.created.lock().unwrap().len(), 2);
        for err in second.errors.iter() {
            assert!(err.contains("already exists"));
        }
    }

    #[tokio::test]
    async fn error_order_follows_file_order() {
        let sink = MemSink::default();
        let text = roster(&[
            "2021-1,Alice,bad,CS,1,,,COE,,Enrolled",
            "2021-2,Bob,b@x.com,IT,2,,,COE,,Enrolled",
            "short,row",
            "2021-4,Dee,d@x.com,CS,1,,,COE,,Wrong",
        ]);
        let report = import_students(&text, 1, &sink).await;

        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 3);
        assert!(report.errors[0].starts_with("Line 2:"));
        assert!(report.errors[1].starts_with("Line 4:"));
        assert!(report.errors[2].starts_with("Line 5:"));
        assert!(report.errors[2].contains("status"));
    }

    #[tokio::test]
    async fn summary_line() {
        let sink = MemSink::default();
        let text = roster(&["2021-1,Alice,a@x.com,CS,1,,,COE,,Enrolled"]);
        let report = import_students(&text, 1, &sink).await;
        assert_eq!(
            report.summary(),
            "Batch upload completed: 1 students added successfully"
        );

        let again = import_students(&text, 1, &sink).await;
        assert_eq!(
            again.summary(),
            "Batch upload completed: 0 students added successfully, 1 errors occurred"
        );
    }

    #[test]
    fn sample_csv_matches_roster_shape() {
        let mut lines = SAMPLE_CSV.lines();
        assert_eq!(lines.next().unwrap(), HEADER);
        let mut n = 0;
        for line in lines {
            let rec = parse_row(line).unwrap();
            assert_eq!(rec.len(), REQUIRED_COLUMNS);
            assert!(RawStudent::from_csv_record(&rec).validate().is_ok());
            n += 1;
        }
        assert_eq!(n, 4);
    }
}
