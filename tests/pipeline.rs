mod common;

use csv_ingest::{
    aggregate::Question,
    cli::Backend,
    destination::{Destination, memory::MemoryDestination, sqlite::SqliteDestination},
    error::PipelineError,
    matcher::FieldMatch,
    pipeline::{PipelineOptions, run_pipeline},
};

use common::{TestWorkspace, people_csv};

fn sqlite_in(workspace: &TestWorkspace) -> SqliteDestination {
    SqliteDestination::open(&workspace.path().join("utenti.db")).expect("open sqlite")
}

#[test]
fn every_row_reaches_sqlite_across_partial_batches() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("people.csv", &people_csv(25));
    let mut dest = sqlite_in(&workspace);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Sqlite))
        .with_batch_size(7);

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.rows_loaded(), 25);
    assert_eq!(dest.row_count("utenti").unwrap(), 25);
    assert_eq!(report.field, FieldMatch::Found("website".into()));
    assert_eq!(report.count(), 13);
}

#[test]
fn rerun_replaces_previous_load() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("people.csv", &people_csv(10));
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Postgres));

    let first = run_pipeline(&mut sqlite_in(&workspace), &options).expect("first run");
    let mut dest = sqlite_in(&workspace);
    let second = run_pipeline(&mut dest, &options).expect("second run");

    assert_eq!(first.rows_loaded(), second.rows_loaded());
    assert_eq!(first.count(), second.count());
    assert_eq!(dest.row_count("utenti").unwrap(), 10);
}

#[test]
fn com_suffix_is_counted_on_sanitized_email_column() {
    let workspace = TestWorkspace::new();
    let source = workspace.write(
        "emails.csv",
        "Name,Email Address,Sign-up Date\nA,a@x.com,2020-01-01\nB,b@y.org,2020-02-02\nC,c@z.com,2020-03-03\n",
    );
    let mut dest = sqlite_in(&workspace);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Postgres));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.field, FieldMatch::Found("email_address".into()));
    assert_eq!(report.rows_loaded(), 3);
    assert_eq!(report.count(), 2);
}

#[test]
fn header_only_source_loads_nothing() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("empty.csv", "Name,Website\n");
    let mut dest = sqlite_in(&workspace);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Sqlite));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.rows_loaded(), 0);
    assert_eq!(report.count(), 0);
    assert_eq!(dest.list_fields("utenti").unwrap(), vec!["id", "name", "website"]);
}

#[test]
fn header_only_source_in_document_store_finds_no_field() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("empty.csv", "Name,Subscription Date\n");
    let mut dest = MemoryDestination::new();
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Mongodb));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.rows_loaded(), 0);
    assert_eq!(report.field, FieldMatch::NotFound);
    assert_eq!(report.count(), 0);
}

#[test]
fn subscriptions_are_counted_by_calendar_year() {
    let workspace = TestWorkspace::new();
    let source = workspace.write(
        "subs.csv",
        "Name,Subscription Date\nA,2020-06-15\nB,2019-12-31\nC,2021-01-01\n",
    );
    let mut dest = MemoryDestination::new();
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Mongodb));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.field, FieldMatch::Found("subscription_date".into()));
    assert_eq!(report.rows_loaded(), 3);
    assert_eq!(report.count(), 1);
}

#[test]
fn reserved_keyword_column_is_suffixed_and_created() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("reserved.csv", "Select,Website\nx,https://a.it\n");
    let mut dest = sqlite_in(&workspace);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Sqlite));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.columns[0].storage_name, "select_col");
    assert!(report.columns[0].is_reserved_collision);
    assert_eq!(report.count(), 1);
}

#[test]
fn missing_column_reports_not_found_and_zero() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("names.csv", "Name,Phone\nA,123\n");
    let mut dest = sqlite_in(&workspace);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Sqlite));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.field, FieldMatch::NotFound);
    assert_eq!(report.rows_loaded(), 1);
    assert_eq!(report.count(), 0);
}

#[test]
fn failed_batch_keeps_earlier_batches() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("people.csv", &people_csv(5));
    let mut dest = MemoryDestination::new().fail_on_batch(2);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Mongodb))
        .with_batch_size(2);

    let err = run_pipeline(&mut dest, &options).expect_err("second batch fails");

    assert!(matches!(err, PipelineError::LoadFailed { rows_loaded_so_far: 2, .. }));
    assert_eq!(dest.row_count("utenti").unwrap(), 2);
}

#[test]
fn row_longer_than_header_aborts_load() {
    let workspace = TestWorkspace::new();
    let source = workspace.write("long.csv", "Name,Website\nA,https://a.it,extra\n");
    let mut dest = sqlite_in(&workspace);
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Sqlite));

    let err = run_pipeline(&mut dest, &options).expect_err("long row");

    assert_eq!(err.rows_loaded_so_far(), Some(0));
}

#[test]
fn document_store_drops_extra_trailing_values() {
    let workspace = TestWorkspace::new();
    let source = workspace.write(
        "long.csv",
        "Name,Subscription Date\nA,2020-06-15,extra\nB,2019-01-01\n",
    );
    let mut dest = MemoryDestination::new();
    let options = PipelineOptions::new(&source, "utenti", Question::for_backend(Backend::Mongodb));

    let report = run_pipeline(&mut dest, &options).expect("pipeline");

    assert_eq!(report.rows_loaded(), 2);
    assert_eq!(report.count(), 1);
    assert_eq!(dest.documents("utenti")[0].len(), 2);
}

#[test]
fn unreadable_and_empty_sources_fail_before_schema() {
    let workspace = TestWorkspace::new();
    let mut dest = MemoryDestination::new();
    let question = Question::for_backend(Backend::Mongodb);

    let missing = PipelineOptions::new(workspace.path().join("absent.csv"), "utenti", question.clone());
    assert!(matches!(
        run_pipeline(&mut dest, &missing),
        Err(PipelineError::SourceUnreadable { .. })
    ));

    let empty = workspace.write("empty.csv", "");
    let options = PipelineOptions::new(&empty, "utenti", question);
    assert!(matches!(
        run_pipeline(&mut dest, &options),
        Err(PipelineError::EmptySource { .. })
    ));
}
