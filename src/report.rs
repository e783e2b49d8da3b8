//! Report lifecycle: creation from a sample attachment, result merges and
//! authorisation.
//!
//! Per attachment the states only move forward:
//! unreported → reported (unauthorised) → reported (authorised).
//!
//! Submitted data is validated, compiled and evaluated before any write
//! transaction opens. The transaction then re-checks the state it depends on
//! with conditional updates, so a racing writer turns into a conflict rather
//! than a double report.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::authorization::{self, Actor};
use crate::codes::{generate_ulr, YearSource};
use crate::compiler::{compile_test_data, evaluate_entries};
use crate::db::{self, repository};
use crate::error::LabError;
use crate::formula::{ArithmeticEvaluator, FormulaEvaluator};
use crate::metadata;
use crate::models::{AnalysisWindow, Report, TestResult};
use crate::test_data::validate_test_data;

impl AnalysisWindow {
    /// Analysis started and ended today.
    pub fn today() -> Self {
        let today = Local::now().date_naive();
        Self { started_on: today, ended_on: today }
    }

    pub fn new(started_on: NaiveDate, ended_on: NaiveDate) -> Result<Self, LabError> {
        if started_on > ended_on {
            return Err(LabError::Validation(format!(
                "Analysis cannot end ({ended_on}) before it starts ({started_on})"
            )));
        }
        Ok(Self { started_on, ended_on })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub sample_id: Uuid,
    pub attachment_id: Uuid,
    pub test_data: Vec<Value>,
    #[serde(default = "AnalysisWindow::today")]
    pub analysis: AnalysisWindow,
}

/// One result joined with its catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDetail {
    pub parameter_id: Uuid,
    pub parameter_name: String,
    pub unit: String,
    pub test_method: String,
    pub value: String,
}

/// A report with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub sample_code: String,
    pub parameter_set_name: String,
    pub is_partial: bool,
    pub results: Vec<ResultDetail>,
}

/// Merge `incoming` into `existing` by parameter id. Existing entries keep
/// their position and take the new value; unseen ids are appended in
/// submission order.
pub fn merge_results(existing: &[TestResult], incoming: &[TestResult]) -> Vec<TestResult> {
    let mut merged = existing.to_vec();
    let mut index: HashMap<Uuid, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.parameter_id, i))
        .collect();

    for result in incoming {
        match index.get(&result.parameter_id) {
            Some(&i) => merged[i].value = result.value.clone(),
            None => {
                index.insert(result.parameter_id, merged.len());
                merged.push(result.clone());
            }
        }
    }
    merged
}

/// Creates and updates reports with a pluggable formula evaluator.
#[derive(Debug, Clone, Default)]
pub struct ReportLifecycle<E = ArithmeticEvaluator> {
    evaluator: E,
    year: YearSource,
}

impl ReportLifecycle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: FormulaEvaluator> ReportLifecycle<E> {
    pub fn with_evaluator(evaluator: E) -> Self {
        Self {
            evaluator,
            year: YearSource::default(),
        }
    }

    pub fn with_year(mut self, year: YearSource) -> Self {
        self.year = year;
        self
    }

    /// Validate, compile and evaluate a submission against a parameter set.
    fn compute_results(
        &self,
        conn: &Connection,
        parameter_set_id: &Uuid,
        test_data: &[Value],
    ) -> Result<Vec<TestResult>, LabError> {
        let entries = validate_test_data(test_data)?;
        let catalogue = repository::get_parameters_of_set(conn, parameter_set_id)?;
        let compiled = compile_test_data(&entries, &catalogue)?;
        Ok(evaluate_entries(&compiled, &self.evaluator)?)
    }

    pub fn create_report(&self, conn: &Connection, new: &NewReport) -> Result<Report, LabError> {
        let window = AnalysisWindow::new(new.analysis.started_on, new.analysis.ended_on)?;

        let sample = repository::get_sample(conn, &new.sample_id)?
            .ok_or_else(|| LabError::not_found("Sample", new.sample_id))?;
        let attachment = sample
            .attachment(&new.attachment_id)
            .ok_or_else(|| LabError::not_found("Attachment", new.attachment_id))?;
        if attachment.is_reported {
            return Err(LabError::AttachmentAlreadyReported { attachment_id: attachment.id });
        }

        let test_results = self.compute_results(conn, &attachment.parameter_set_id, &new.test_data)?;

        let set = repository::get_parameter_set(conn, &attachment.parameter_set_id)?
            .ok_or_else(|| LabError::not_found("ParameterSet", attachment.parameter_set_id))?;
        let lab = metadata::require_metadata(conn)?;
        let ulr = generate_ulr(
            lab.current_certification_number,
            sample.sequence_number,
            set.is_partial,
            self.year.current(),
        );

        let report = Report {
            id: Uuid::new_v4(),
            sample_id: sample.id,
            attachment_id: attachment.id,
            ulr,
            parameter_set_id: set.id,
            test_results,
            is_authorised: false,
            analysis_started_on: window.started_on,
            analysis_ended_on: window.ended_on,
            created_at: Local::now().naive_local(),
        };

        let completed = db::with_immediate_transaction(conn, |tx| -> Result<bool, LabError> {
            if !repository::mark_attachment_reported(tx, &sample.id, &attachment.id)? {
                return Err(LabError::AttachmentAlreadyReported { attachment_id: attachment.id });
            }
            repository::insert_report(tx, &report)?;
            let completed = repository::count_unreported_attachments(tx, &sample.id)? == 0;
            if completed {
                repository::set_sample_completed(tx, &sample.id, true)?;
            }
            Ok(completed)
        })?;

        tracing::info!(
            id = %report.id,
            ulr = %report.ulr,
            sample = %sample.code,
            results = report.test_results.len(),
            sample_completed = completed,
            "Report created"
        );
        Ok(report)
    }

    /// Merge new results into an unauthorised report. Submitting the same
    /// data twice leaves the report unchanged.
    pub fn update_report_data(
        &self,
        conn: &Connection,
        report_id: &Uuid,
        test_data: &[Value],
    ) -> Result<Report, LabError> {
        let before = get_report(conn, report_id)?;
        if before.is_authorised {
            return Err(LabError::ReportAlreadyAuthorised { report_id: before.id });
        }

        // The parameter set never changes, so results can be computed outside the lock.
        let incoming = self.compute_results(conn, &before.parameter_set_id, test_data)?;

        // Merge against the list as it stands under the lock; a concurrent
        // update may have committed since `before` was read.
        let report = db::with_immediate_transaction(conn, |tx| -> Result<Report, LabError> {
            let mut current = repository::get_report(tx, report_id)?
                .ok_or_else(|| LabError::not_found("Report", *report_id))?;
            if current.is_authorised {
                return Err(LabError::ReportAlreadyAuthorised { report_id: *report_id });
            }
            current.test_results = merge_results(&current.test_results, &incoming);
            repository::replace_results(tx, report_id, &current.test_results)?;
            Ok(current)
        })?;

        tracing::info!(id = %report.id, results = report.test_results.len(), "Report data updated");
        Ok(report)
    }
}

/// Sign off a report. Role is checked before anything is read.
pub fn authorise_report(conn: &Connection, report_id: &Uuid, actor: &Actor) -> Result<Report, LabError> {
    if !authorization::can_authorise_reports(actor).allowed {
        return Err(LabError::Unauthorised { role: actor.role });
    }

    db::with_immediate_transaction(conn, |tx| -> Result<(), LabError> {
        match repository::is_report_authorised(tx, report_id)? {
            None => return Err(LabError::not_found("Report", *report_id)),
            Some(true) => return Err(LabError::AlreadyAuthorised { report_id: *report_id }),
            Some(false) => {}
        }
        if !repository::mark_report_authorised(tx, report_id)? {
            return Err(LabError::AlreadyAuthorised { report_id: *report_id });
        }
        Ok(())
    })?;

    tracing::info!(id = %report_id, actor = %actor.id, role = %actor.role, "Report authorised");
    get_report(conn, report_id)
}

pub fn get_report(conn: &Connection, id: &Uuid) -> Result<Report, LabError> {
    repository::get_report(conn, id)?.ok_or_else(|| LabError::not_found("Report", *id))
}

pub fn list_reports(conn: &Connection) -> Result<Vec<Report>, LabError> {
    Ok(repository::list_reports(conn)?)
}

pub fn list_reports_of_sample(conn: &Connection, sample_id: &Uuid) -> Result<Vec<Report>, LabError> {
    if repository::get_sample(conn, sample_id)?.is_none() {
        return Err(LabError::not_found("Sample", *sample_id));
    }
    Ok(repository::list_reports_by_sample(conn, sample_id)?)
}

pub fn list_reports_of_type(conn: &Connection, sample_type_id: &Uuid) -> Result<Vec<Report>, LabError> {
    if repository::get_sample_type(conn, sample_type_id)?.is_none() {
        return Err(LabError::not_found("SampleType", *sample_type_id));
    }
    Ok(repository::list_reports_by_sample_type(conn, sample_type_id)?)
}

pub fn get_report_detail(conn: &Connection, id: &Uuid) -> Result<ReportDetail, LabError> {
    let report = get_report(conn, id)?;
    let sample = repository::get_sample(conn, &report.sample_id)?
        .ok_or_else(|| LabError::not_found("Sample", report.sample_id))?;
    let set = repository::get_parameter_set(conn, &report.parameter_set_id)?
        .ok_or_else(|| LabError::not_found("ParameterSet", report.parameter_set_id))?;

    let results = report
        .test_results
        .iter()
        .map(|r| {
            let p = repository::get_parameter(conn, &r.parameter_id)?
                .ok_or_else(|| LabError::not_found("Parameter", r.parameter_id))?;
            Ok(ResultDetail {
                parameter_id: p.id,
                parameter_name: p.name,
                unit: p.unit,
                test_method: p.test_method,
                value: r.value.clone(),
            })
        })
        .collect::<Result<Vec<_>, LabError>>()?;

    Ok(ReportDetail {
        report,
        sample_code: sample.code,
        parameter_set_name: set.name,
        is_partial: set.is_partial,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::thread;

    use serde_json::json;

    use crate::catalogue::{create_parameter, create_parameter_set, create_sample_type, NewParameter, NewParameterSet};
    use crate::db::sqlite::{open_database, open_memory_database};
    use crate::error::ErrorKind;
    use crate::formula::FormulaError;
    use crate::models::enums::Role;
    use crate::models::{Sample, SampleMetadata};
    use crate::sample::{get_sample, NewSample, SampleLifecycle};

    struct Fixture {
        soil: Uuid,
        ph: Uuid,
        sum: Uuid,
        ratio: Uuid,
        full_set: Uuid,
        partial_set: Uuid,
    }

    fn catalogue(conn: &Connection) -> Fixture {
        metadata::seed_metadata(conn).unwrap();
        let soil = create_sample_type(conn, "Soil").unwrap().id;
        let param = |name: &str, vars: &[&str], formula: Option<&str>| {
            create_parameter(conn, &NewParameter {
                name: name.into(),
                sample_type_id: soil,
                unit: "mg/kg".into(),
                test_method: "IS 14767".into(),
                variables: vars.iter().map(|v| v.to_string()).collect(),
                formula: formula.map(String::from),
            })
            .unwrap()
            .id
        };
        let ph = param("pH", &[], None);
        let sum = param("Total", &["a", "b"], Some("a+b"));
        let ratio = param("Ratio", &["x", "y"], Some("x / y"));
        let set = |name: &str, members: Vec<Uuid>, is_partial: bool| {
            create_parameter_set(conn, &NewParameterSet {
                name: name.into(),
                sample_type_id: soil,
                parameters: members,
                is_partial,
            })
            .unwrap()
            .id
        };
        Fixture {
            soil,
            ph,
            sum,
            ratio,
            full_set: set("Full", vec![ph, sum, ratio], false),
            partial_set: set("Partial", vec![ph], true),
        }
    }

    fn register(conn: &Connection, fx: &Fixture, sets: Vec<Uuid>) -> Sample {
        SampleLifecycle::with_year(YearSource::Fixed(2025))
            .create_sample(conn, &NewSample {
                sample_type_id: fx.soil,
                parameter_set_ids: sets,
                received_on: None,
                metadata: SampleMetadata::default(),
            })
            .unwrap()
    }

    fn lifecycle() -> ReportLifecycle {
        ReportLifecycle::new().with_year(YearSource::Fixed(2025))
    }

    fn new_report(sample: &Sample, index: usize, test_data: Vec<Value>) -> NewReport {
        NewReport {
            sample_id: sample.id,
            attachment_id: sample.attachments[index].id,
            test_data,
            analysis: AnalysisWindow::today(),
        }
    }

    fn full_data(fx: &Fixture) -> Vec<Value> {
        vec![
            json!({ "parameter": fx.ph.to_string(), "value": "7.2" }),
            json!({ "parameter": fx.sum.to_string(), "data": { "a": "2", "b": "3" } }),
            json!({ "parameter": fx.ratio.to_string(), "data": { "x": "5", "y": "2" } }),
        ]
    }

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    fn report_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn creates_report_with_evaluated_results() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);

        let report = lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();

        assert_eq!(report.ulr, "TC727525000000001F");
        assert_eq!(
            report.test_results,
            vec![
                TestResult { parameter_id: fx.ph, value: "7.2".into() },
                TestResult { parameter_id: fx.sum, value: "5".into() },
                TestResult { parameter_id: fx.ratio, value: "2.5".into() },
            ]
        );
        assert!(!report.is_authorised);
        assert_eq!(get_report(&conn, &report.id).unwrap(), report);

        let sample = get_sample(&conn, &sample.id).unwrap();
        assert!(sample.attachments[0].is_reported);
        assert!(sample.is_completed);
    }

    #[test]
    fn partial_set_ulr_ends_with_p() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.partial_set]);
        let data = vec![json!({ "parameter": fx.ph.to_string(), "value": "6.8" })];
        let report = lifecycle().create_report(&conn, &new_report(&sample, 0, data)).unwrap();
        assert!(report.ulr.ends_with('P'));
    }

    #[test]
    fn sample_completes_only_after_every_attachment() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.partial_set, fx.full_set]);
        let lc = lifecycle();

        let ph_only = vec![json!({ "parameter": fx.ph.to_string(), "value": "6.8" })];
        lc.create_report(&conn, &new_report(&sample, 0, ph_only)).unwrap();
        assert!(!get_sample(&conn, &sample.id).unwrap().is_completed);

        lc.create_report(&conn, &new_report(&sample, 1, full_data(&fx))).unwrap();
        assert!(get_sample(&conn, &sample.id).unwrap().is_completed);
        assert_eq!(list_reports_of_sample(&conn, &sample.id).unwrap().len(), 2);
    }

    #[test]
    fn second_report_for_attachment_is_conflict() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let lc = lifecycle();

        lc.create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();
        let err = lc.create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap_err();
        assert!(matches!(err, LabError::AttachmentAlreadyReported { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(report_count(&conn), 1);
    }

    #[test]
    fn racing_creators_produce_one_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.db");
        let (sample_id, attachment_id, data) = {
            let conn = open_database(&path).unwrap();
            let fx = catalogue(&conn);
            let sample = register(&conn, &fx, vec![fx.full_set]);
            (sample.id, sample.attachments[0].id, full_data(&fx))
        };

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                let data = data.clone();
                thread::spawn(move || {
                    let conn = open_database(&path).unwrap();
                    lifecycle().create_report(&conn, &NewReport {
                        sample_id,
                        attachment_id,
                        test_data: data,
                        analysis: AnalysisWindow::today(),
                    })
                })
            })
            .collect();

        let outcomes: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            assert!(matches!(err, LabError::AttachmentAlreadyReported { .. }));
        }
        let conn = open_database(&path).unwrap();
        assert_eq!(report_count(&conn), 1);
    }

    #[test]
    fn failed_report_insert_leaves_attachment_unreported() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        conn.execute_batch(
            "CREATE TRIGGER fail_results BEFORE INSERT ON report_results
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

        let result = lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx)));
        assert!(result.is_err());
        assert_eq!(report_count(&conn), 0);
        let sample = get_sample(&conn, &sample.id).unwrap();
        assert!(!sample.attachments[0].is_reported);
        assert!(!sample.is_completed);
    }

    #[test]
    fn unseeded_metadata_blocks_report_creation() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        conn.execute("DELETE FROM lab_metadata", []).unwrap();

        let err = lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap_err();
        assert!(matches!(err, LabError::MetadataNotSeeded));
        assert_eq!(report_count(&conn), 0);
        assert!(!get_sample(&conn, &sample.id).unwrap().attachments[0].is_reported);
    }

    #[test]
    fn non_numeric_variable_changes_nothing() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let mut data = full_data(&fx);
        data[1] = json!({ "parameter": fx.sum.to_string(), "data": { "a": "abc", "b": "3" } });

        let err = lifecycle().create_report(&conn, &new_report(&sample, 0, data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(report_count(&conn), 0);
        assert!(!get_sample(&conn, &sample.id).unwrap().attachments[0].is_reported);
    }

    #[test]
    fn evaluation_failures_are_collected() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let mut data = full_data(&fx);
        data[2] = json!({ "parameter": fx.ratio.to_string(), "data": { "x": "5", "y": "0" } });

        let err = lifecycle().create_report(&conn, &new_report(&sample, 0, data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert_eq!(err.offending_ids(), vec![fx.ratio]);
        match err {
            LabError::Computation(c) => assert_eq!(c.failures[0].error, FormulaError::DivisionByZero),
            other => panic!("expected computation error, got {other:?}"),
        }
        assert_eq!(report_count(&conn), 0);
    }

    #[test]
    fn unknown_attachment_and_bad_window_are_rejected() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let lc = lifecycle();

        let mut input = new_report(&sample, 0, full_data(&fx));
        input.attachment_id = Uuid::new_v4();
        assert_eq!(lc.create_report(&conn, &input).unwrap_err().kind(), ErrorKind::NotFound);

        let mut input = new_report(&sample, 0, full_data(&fx));
        input.analysis = AnalysisWindow {
            started_on: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            ended_on: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        };
        assert_eq!(lc.create_report(&conn, &input).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn merge_overwrites_in_place_and_appends_new() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let existing = vec![
            TestResult { parameter_id: a, value: "1".into() },
            TestResult { parameter_id: b, value: "2".into() },
        ];
        let incoming = vec![
            TestResult { parameter_id: c, value: "3".into() },
            TestResult { parameter_id: a, value: "10".into() },
        ];
        let merged = merge_results(&existing, &incoming);
        assert_eq!(
            merged,
            vec![
                TestResult { parameter_id: a, value: "10".into() },
                TestResult { parameter_id: b, value: "2".into() },
                TestResult { parameter_id: c, value: "3".into() },
            ]
        );
        assert_eq!(merge_results(&merged, &incoming), merged);
    }

    #[test]
    fn update_merges_and_is_idempotent() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let lc = lifecycle();
        let first = vec![json!({ "parameter": fx.ph.to_string(), "value": "7.2" })];
        let report = lc.create_report(&conn, &new_report(&sample, 0, first)).unwrap();

        let update = vec![
            json!({ "parameter": fx.sum.to_string(), "data": { "a": "1", "b": "1" } }),
            json!({ "parameter": fx.ph.to_string(), "value": "7.4" }),
        ];
        let once = lc.update_report_data(&conn, &report.id, &update).unwrap();
        let twice = lc.update_report_data(&conn, &report.id, &update).unwrap();

        assert_eq!(
            once.test_results,
            vec![
                TestResult { parameter_id: fx.ph, value: "7.4".into() },
                TestResult { parameter_id: fx.sum, value: "2".into() },
            ]
        );
        assert_eq!(once, twice);
        assert_eq!(get_report(&conn, &report.id).unwrap(), twice);
    }

    #[test]
    fn concurrent_updates_keep_each_others_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.db");
        let (report_id, sum, ratio) = {
            let conn = open_database(&path).unwrap();
            let fx = catalogue(&conn);
            let sample = register(&conn, &fx, vec![fx.full_set]);
            let first = vec![json!({ "parameter": fx.ph.to_string(), "value": "7.2" })];
            let report = lifecycle().create_report(&conn, &new_report(&sample, 0, first)).unwrap();
            (report.id, fx.sum, fx.ratio)
        };

        let updates = vec![
            vec![json!({ "parameter": sum.to_string(), "data": { "a": "2", "b": "3" } })],
            vec![json!({ "parameter": ratio.to_string(), "data": { "x": "5", "y": "2" } })],
        ];
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(updates.len()));
        let workers: Vec<_> = updates
            .into_iter()
            .map(|data| {
                let path = path.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let conn = open_database(&path).unwrap();
                    barrier.wait();
                    lifecycle().update_report_data(&conn, &report_id, &data)
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap().unwrap();
        }

        let conn = open_database(&path).unwrap();
        let stored = get_report(&conn, &report_id).unwrap();
        assert_eq!(stored.test_results.len(), 3);
        let ids: Vec<Uuid> = stored.test_results.iter().map(|r| r.parameter_id).collect();
        assert!(ids.contains(&sum) && ids.contains(&ratio));
    }

    #[test]
    fn authorised_report_is_frozen() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let lc = lifecycle();
        let report = lc.create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();

        let authorised = authorise_report(&conn, &report.id, &admin()).unwrap();
        assert!(authorised.is_authorised);

        let update = vec![json!({ "parameter": fx.ph.to_string(), "value": "9" })];
        let err = lc.update_report_data(&conn, &report.id, &update).unwrap_err();
        assert!(matches!(err, LabError::ReportAlreadyAuthorised { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(get_report(&conn, &report.id).unwrap().test_results, report.test_results);
    }

    #[test]
    fn authorising_twice_is_conflict() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let report = lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();

        authorise_report(&conn, &report.id, &Actor::new(Uuid::new_v4(), Role::SuperAdmin)).unwrap();
        let err = authorise_report(&conn, &report.id, &admin()).unwrap_err();
        assert!(matches!(err, LabError::AlreadyAuthorised { .. }));
    }

    #[test]
    fn role_is_checked_before_existence() {
        let conn = open_memory_database().unwrap();
        let user = Actor::new(Uuid::new_v4(), Role::User);
        let err = authorise_report(&conn, &Uuid::new_v4(), &user).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorised);

        let err = authorise_report(&conn, &Uuid::new_v4(), &admin()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn user_cannot_authorise_existing_report() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let report = lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();

        let user = Actor::new(Uuid::new_v4(), Role::User);
        assert!(authorise_report(&conn, &report.id, &user).is_err());
        assert!(!get_report(&conn, &report.id).unwrap().is_authorised);
    }

    #[test]
    fn detail_joins_catalogue_and_sample() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        let report = lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();

        let detail = get_report_detail(&conn, &report.id).unwrap();
        assert_eq!(detail.sample_code, "25S000001");
        assert_eq!(detail.parameter_set_name, "Full");
        assert!(!detail.is_partial);
        assert_eq!(detail.results[1].parameter_name, "Total");
        assert_eq!(detail.results[1].value, "5");
        assert_eq!(detail.results[0].unit, "mg/kg");

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["ulr"], "TC727525000000001F");
        assert_eq!(json["sampleCode"], "25S000001");
    }

    #[test]
    fn listing_reports_by_type() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);
        lifecycle().create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();

        assert_eq!(list_reports(&conn).unwrap().len(), 1);
        assert_eq!(list_reports_of_type(&conn, &fx.soil).unwrap().len(), 1);
        assert_eq!(list_reports_of_type(&conn, &Uuid::new_v4()).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(list_reports_of_sample(&conn, &Uuid::new_v4()).unwrap_err().kind(), ErrorKind::NotFound);
    }

    struct Constant(f64);

    impl FormulaEvaluator for Constant {
        fn evaluate(&self, _expr: &str, _vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
            Ok(self.0)
        }
    }

    #[test]
    fn evaluator_is_pluggable() {
        let conn = open_memory_database().unwrap();
        let fx = catalogue(&conn);
        let sample = register(&conn, &fx, vec![fx.full_set]);

        let lc = ReportLifecycle::with_evaluator(Constant(42.0)).with_year(YearSource::Fixed(2025));
        let report = lc.create_report(&conn, &new_report(&sample, 0, full_data(&fx))).unwrap();
        assert_eq!(report.test_results[1].value, "42");
        assert_eq!(report.test_results[0].value, "7.2");
    }
}
