//! Repository layer — entity-scoped database operations.
//!
//! Functions take a `&Connection` so they run equally against a bare
//! connection or inside a `with_immediate_transaction` closure.
//! All public functions are re-exported here.

mod metadata;
mod parameter;
mod parameter_set;
mod report;
mod sample;
mod sample_type;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::DatabaseError;

pub use metadata::*;
pub use parameter::*;
pub use parameter_set::*;
pub use report::*;
pub use sample::*;
pub use sample_type::*;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Corrupt(format!("id '{s}': {e}")))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Corrupt(format!("date '{s}': {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| DatabaseError::Corrupt(format!("timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::*;
    use rusqlite::Connection;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn ts() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-03-01 09:30:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn make_type(conn: &Connection, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        insert_sample_type(conn, &SampleType { id, name: name.into(), current_sequence: 0 }).unwrap();
        id
    }

    fn make_parameter(conn: &Connection, type_id: Uuid, name: &str, formula: Option<(&str, &[&str])>) -> Uuid {
        let id = Uuid::new_v4();
        insert_parameter(conn, &Parameter {
            id,
            name: name.into(),
            sample_type_id: type_id,
            unit: "mg/kg".into(),
            test_method: "IS 14767".into(),
            variables: formula.map(|(_, v)| v.iter().map(|s| s.to_string()).collect()).unwrap_or_default(),
            formula: formula.map(|(f, _)| f.to_string()),
        }).unwrap();
        id
    }

    fn make_set(conn: &Connection, type_id: Uuid, name: &str, members: Vec<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        insert_parameter_set(conn, &ParameterSet {
            id,
            name: name.into(),
            sample_type_id: type_id,
            parameters: members,
            is_partial: false,
        }).unwrap();
        id
    }

    fn make_sample(conn: &Connection, type_id: Uuid, code: &str, sets: &[Uuid]) -> Sample {
        let sample = Sample {
            id: Uuid::new_v4(),
            sequence_number: 1,
            code: code.into(),
            sample_type_id: type_id,
            received_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            attachments: sets
                .iter()
                .map(|s| Attachment { id: Uuid::new_v4(), parameter_set_id: *s, is_reported: false })
                .collect(),
            metadata: SampleMetadata {
                customer_name: Some("Green Acres".into()),
                ..Default::default()
            },
            is_completed: false,
            created_at: ts(),
        };
        insert_sample(conn, &sample).unwrap();
        sample
    }

    #[test]
    fn sample_type_sequence_increments_and_resets() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        assert_eq!(next_sample_sequence(&conn, &soil).unwrap(), 1);
        assert_eq!(next_sample_sequence(&conn, &soil).unwrap(), 2);
        assert_eq!(get_sample_type(&conn, &soil).unwrap().unwrap().current_sequence, 2);

        assert_eq!(reset_all_sequences(&conn).unwrap(), 1);
        assert_eq!(next_sample_sequence(&conn, &soil).unwrap(), 1);
    }

    #[test]
    fn sequence_of_missing_type_is_not_found() {
        let conn = test_db();
        let err = next_sample_sequence(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn duplicate_type_name_is_constraint_violation() {
        let conn = test_db();
        make_type(&conn, "Soil");
        let err = insert_sample_type(&conn, &SampleType {
            id: Uuid::new_v4(),
            name: "Soil".into(),
            current_sequence: 0,
        })
        .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn parameter_variables_round_trip() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let oc = make_parameter(&conn, soil, "Organic carbon", Some(("b - t", &["b", "t"])));
        let p = get_parameter(&conn, &oc).unwrap().unwrap();
        assert_eq!(p.variables, vec!["b".to_string(), "t".to_string()]);
        assert_eq!(p.formula.as_deref(), Some("b - t"));
        assert_eq!(list_parameters_of_type(&conn, &soil).unwrap().len(), 1);
    }

    #[test]
    fn parameter_without_variables_cannot_have_formula() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let err = insert_parameter(&conn, &Parameter {
            id: Uuid::new_v4(),
            name: "pH".into(),
            sample_type_id: soil,
            unit: "-".into(),
            test_method: "IS 2720".into(),
            variables: vec![],
            formula: Some("1 + 1".into()),
        })
        .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn parameter_set_members_keep_order() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let a = make_parameter(&conn, soil, "pH", None);
        let b = make_parameter(&conn, soil, "EC", None);
        let set = make_set(&conn, soil, "Basic", vec![b, a]);

        let loaded = get_parameter_set(&conn, &set).unwrap().unwrap();
        assert_eq!(loaded.parameters, vec![b, a]);
        let members: Vec<Uuid> = get_parameters_of_set(&conn, &set).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(members, vec![b, a]);
        assert_eq!(list_parameter_sets(&conn).unwrap().len(), 1);
    }

    #[test]
    fn sample_insert_and_retrieve_with_attachments() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let p = make_parameter(&conn, soil, "pH", None);
        let s1 = make_set(&conn, soil, "Basic", vec![p]);
        let s2 = make_set(&conn, soil, "Extended", vec![p]);
        let sample = make_sample(&conn, soil, "25S000001", &[s1, s2]);

        let loaded = get_sample(&conn, &sample.id).unwrap().unwrap();
        assert_eq!(loaded, sample);
        assert_eq!(list_samples_by_type(&conn, &soil).unwrap().len(), 1);
        assert_eq!(list_samples_by_parameter_set(&conn, &s2).unwrap().len(), 1);
        assert!(get_sample(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn duplicate_code_within_type_is_rejected() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let p = make_parameter(&conn, soil, "pH", None);
        let set = make_set(&conn, soil, "Basic", vec![p]);
        make_sample(&conn, soil, "25S000001", &[set]);

        let mut dup = make_sample(&conn, soil, "25S000002", &[set]);
        dup.id = Uuid::new_v4();
        dup.code = "25S000001".into();
        dup.attachments.clear();
        assert!(matches!(insert_sample(&conn, &dup), Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn attachment_flip_is_conditional() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let p = make_parameter(&conn, soil, "pH", None);
        let set = make_set(&conn, soil, "Basic", vec![p]);
        let sample = make_sample(&conn, soil, "25S000001", &[set]);
        let attachment = sample.attachments[0].id;

        assert_eq!(count_unreported_attachments(&conn, &sample.id).unwrap(), 1);
        assert!(mark_attachment_reported(&conn, &sample.id, &attachment).unwrap());
        assert!(!mark_attachment_reported(&conn, &sample.id, &attachment).unwrap());
        assert_eq!(count_unreported_attachments(&conn, &sample.id).unwrap(), 0);
    }

    #[test]
    fn report_results_round_trip_and_replace() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let ph = make_parameter(&conn, soil, "pH", None);
        let ec = make_parameter(&conn, soil, "EC", None);
        let set = make_set(&conn, soil, "Basic", vec![ph, ec]);
        let sample = make_sample(&conn, soil, "25S000001", &[set]);

        let report = Report {
            id: Uuid::new_v4(),
            sample_id: sample.id,
            attachment_id: sample.attachments[0].id,
            ulr: "TC727525000000001F".into(),
            parameter_set_id: set,
            test_results: vec![
                TestResult { parameter_id: ec, value: "0.4".into() },
                TestResult { parameter_id: ph, value: "7.1".into() },
            ],
            is_authorised: false,
            analysis_started_on: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            analysis_ended_on: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            created_at: ts(),
        };
        insert_report(&conn, &report).unwrap();
        assert_eq!(get_report(&conn, &report.id).unwrap().unwrap(), report);

        replace_results(&conn, &report.id, &[TestResult { parameter_id: ph, value: "6.9".into() }]).unwrap();
        let loaded = get_report(&conn, &report.id).unwrap().unwrap();
        assert_eq!(loaded.test_results.len(), 1);
        assert_eq!(loaded.test_results[0].value, "6.9");

        assert_eq!(list_reports_by_sample(&conn, &sample.id).unwrap().len(), 1);
        assert_eq!(list_reports_by_sample_type(&conn, &soil).unwrap().len(), 1);
        assert_eq!(list_reports(&conn).unwrap().len(), 1);
    }

    #[test]
    fn authorisation_flip_is_conditional() {
        let conn = test_db();
        let soil = make_type(&conn, "Soil");
        let ph = make_parameter(&conn, soil, "pH", None);
        let set = make_set(&conn, soil, "Basic", vec![ph]);
        let sample = make_sample(&conn, soil, "25S000001", &[set]);
        let report = Report {
            id: Uuid::new_v4(),
            sample_id: sample.id,
            attachment_id: sample.attachments[0].id,
            ulr: "TC727525000000001F".into(),
            parameter_set_id: set,
            test_results: vec![TestResult { parameter_id: ph, value: "7".into() }],
            is_authorised: false,
            analysis_started_on: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            analysis_ended_on: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            created_at: ts(),
        };
        insert_report(&conn, &report).unwrap();

        assert_eq!(is_report_authorised(&conn, &report.id).unwrap(), Some(false));
        assert!(mark_report_authorised(&conn, &report.id).unwrap());
        assert!(!mark_report_authorised(&conn, &report.id).unwrap());
        assert_eq!(is_report_authorised(&conn, &report.id).unwrap(), Some(true));
        assert_eq!(is_report_authorised(&conn, &Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn metadata_is_seeded_once() {
        let conn = test_db();
        assert!(get_metadata(&conn).unwrap().is_none());
        assert!(insert_metadata_if_absent(&conn, &LabMetadata::default()).unwrap());

        let other = LabMetadata { current_certification_number: 1, ..Default::default() };
        assert!(!insert_metadata_if_absent(&conn, &other).unwrap());
        assert_eq!(get_metadata(&conn).unwrap().unwrap().current_certification_number, 7275);
    }

    #[test]
    fn datetime_parsing_accepts_fractional_seconds() {
        assert!(parse_datetime("2025-03-01 09:30:00.123456").is_ok());
        assert!(parse_datetime("2025-03-01T09:30:00").is_ok());
        assert!(matches!(parse_datetime("yesterday"), Err(DatabaseError::Corrupt(_))));
    }
}
