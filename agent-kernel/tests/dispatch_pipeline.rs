use std::sync::{Arc, Mutex};

use agent_adapters::traits::{FunctionCall, ModelResponse};
use agent_kernel::{
    CallOutcome, CallParser, CallRecord, CallState, Dispatcher, ResolveError, parse_text,
};
use agent_tools::arguments::{Arguments, ArgumentsExt};
use agent_tools::capability;
use agent_tools::registry::{ArgumentAliases, CapabilityRegistry, ToolError};
use serde_json::{Value, json};

/// Returns the directory the user wants to work in.
#[capability(provides_context = "path")]
fn get_directory_name() -> String {
    "/home/me/Downloads".to_owned()
}

/// Lists the files of a directory.
///
/// :param path: Directory to scan
#[capability(contextual(path))]
fn scan_directory(path: String) -> Vec<String> {
    vec![format!("{path}/a.pdf"), format!("{path}/b.png")]
}

/// Sends an email.
///
/// :param recipient: Address of the recipient
/// :param subject: Subject line
/// :param attendees: Extra people in copy
#[capability]
fn send_email(recipient: String, subject: String, attendees: Option<Vec<String>>) -> bool {
    let _ = (recipient, subject, attendees);
    true
}

/// Reads the todo list and returns the tasks it contains.
#[capability(yields_tasks)]
fn read_todo_tasks() -> Value {
    json!([
        { "name": "scan_directory", "args": {} },
        { "name": "send_email", "args": { "email_address": "me@example.com", "email_subject": "done" } }
    ])
}

/// Reads a todo list whose first task points at a call that never ran.
#[capability(yields_tasks)]
fn read_stale_todo_tasks() -> Value {
    json!([
        { "name": "scan_directory", "args": { "path": "<result_from_9>" } },
        { "name": "get_directory_name" }
    ])
}

type Log = Arc<Mutex<Vec<(String, Arguments)>>>;

fn registry(log: &Log) -> Arc<CapabilityRegistry> {
    let mut builder = CapabilityRegistry::builder().with_aliases(ArgumentAliases::builtin());

    let calls = Arc::clone(log);
    builder
        .register(get_directory_name_capability().unwrap(), move |args: Arguments| {
            calls.lock().unwrap().push(("get_directory_name".into(), args));
            async { Ok::<_, ToolError>(json!(get_directory_name())) }
        })
        .unwrap();

    let calls = Arc::clone(log);
    builder
        .register(scan_directory_capability().unwrap(), move |args: Arguments| {
            calls.lock().unwrap().push(("scan_directory".into(), args.clone()));
            async move {
                let path = args.required_str("path")?.to_owned();
                Ok::<_, ToolError>(json!(scan_directory(path)))
            }
        })
        .unwrap();

    let calls = Arc::clone(log);
    builder
        .register(send_email_capability().unwrap(), move |args: Arguments| {
            calls.lock().unwrap().push(("send_email".into(), args.clone()));
            async move {
                let recipient = args.required_str("recipient")?.to_owned();
                if !recipient.contains('@') {
                    return Err(ToolError::execution(format!("invalid recipient `{recipient}`")));
                }
                let subject = args.optional_str("subject")?.unwrap_or_default().to_owned();
                let attendees = args.string_list("attendees").ok();
                Ok(json!(send_email(recipient, subject, attendees)))
            }
        })
        .unwrap();

    let calls = Arc::clone(log);
    builder
        .register(read_todo_tasks_capability().unwrap(), move |args: Arguments| {
            calls.lock().unwrap().push(("read_todo_tasks".into(), args));
            async { Ok::<_, ToolError>(read_todo_tasks()) }
        })
        .unwrap();

    let calls = Arc::clone(log);
    builder
        .register(read_stale_todo_tasks_capability().unwrap(), move |args: Arguments| {
            calls.lock().unwrap().push(("read_stale_todo_tasks".into(), args));
            async { Ok::<_, ToolError>(read_stale_todo_tasks()) }
        })
        .unwrap();

    Arc::new(builder.build())
}

fn record(call_id: usize, name: &str, args: Value) -> CallRecord {
    let Value::Object(args) = args else {
        panic!("args must be an object");
    };
    CallRecord::new(call_id, name, args)
}

fn invoked(log: &Log) -> Vec<String> {
    log.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
}

#[tokio::test]
async fn back_reference_feeds_later_call() {
    let log = Log::default();
    let report = Dispatcher::new(registry(&log))
        .dispatch(vec![
            record(0, "get_directory_name", json!({})),
            record(1, "scan_directory", json!({ "path": "<result_from_0>" })),
        ])
        .await
        .unwrap();

    let (_, args) = log.lock().unwrap()[1].clone();
    assert_eq!(args["path"], "/home/me/Downloads");
    assert_eq!(
        report.results().get("1"),
        Some(&json!(["/home/me/Downloads/a.pdf", "/home/me/Downloads/b.png"]))
    );
}

#[tokio::test]
async fn missing_dependency_aborts_pass() {
    let log = Log::default();
    let err = Dispatcher::new(registry(&log))
        .dispatch(vec![
            record(0, "get_directory_name", json!({})),
            record(1, "scan_directory", json!({ "path": "<result_from_5>" })),
            record(2, "send_email", json!({ "recipient": "a@b.c" })),
        ])
        .await
        .expect_err("reference to call 5 must abort");

    assert!(matches!(
        &err.source,
        ResolveError::MissingDependency { reference, .. } if reference == "5"
    ));
    let report = err.into_report();
    assert_eq!(report.entry("0").unwrap().state(), CallState::Executed);
    assert_eq!(report.entry("1").unwrap().state(), CallState::Pending);
    assert_eq!(report.entry("2").unwrap().state(), CallState::Pending);
    assert_eq!(invoked(&log), ["get_directory_name"]);
}

#[tokio::test]
async fn failing_capability_does_not_stop_the_pass() {
    let log = Log::default();
    let report = Dispatcher::new(registry(&log))
        .dispatch(vec![
            record(0, "send_email", json!({ "email_address": "not-an-address" })),
            record(1, "get_directory_name", json!({})),
        ])
        .await
        .unwrap();

    assert!(matches!(
        report.entry("0").unwrap().outcome(),
        Some(CallOutcome::Failed(_))
    ));
    assert_eq!(report.entry("1").unwrap().state(), CallState::Executed);
    assert_eq!(invoked(&log), ["send_email", "get_directory_name"]);
}

#[tokio::test]
async fn ambient_path_fills_contextual_parameter() {
    let log = Log::default();
    let report = Dispatcher::new(registry(&log))
        .dispatch(vec![
            record(0, "get_directory_name", json!({})),
            record(1, "scan_directory", json!({})),
        ])
        .await
        .unwrap();

    assert_eq!(report.context().get("path"), Some(&json!("/home/me/Downloads")));
    let (_, args) = log.lock().unwrap()[1].clone();
    assert_eq!(args["path"], "/home/me/Downloads");
}

#[tokio::test]
async fn aliases_and_list_wrapping_apply_before_invocation() {
    let log = Log::default();
    Dispatcher::new(registry(&log))
        .dispatch(vec![record(
            0,
            "send_email",
            json!({ "email_address": "a@b.c", "email_subject": "hi", "shared_with": "c@d.e" }),
        )])
        .await
        .unwrap();

    let (_, args) = log.lock().unwrap()[0].clone();
    assert_eq!(args["recipient"], "a@b.c");
    assert_eq!(args["subject"], "hi");
    assert_eq!(args["attendees"], json!(["c@d.e"]));
}

#[tokio::test]
async fn task_list_is_dispatched_and_duplicates_fold() {
    let log = Log::default();
    let report = Dispatcher::new(registry(&log))
        .dispatch(vec![
            record(0, "get_directory_name", json!({})),
            record(1, "read_todo_tasks", json!({})),
            record(2, "scan_directory", json!({})),
            record(
                3,
                "send_email",
                json!({ "recipient": "me@example.com", "subject": "done" }),
            ),
        ])
        .await
        .unwrap();

    let ids: Vec<_> = report
        .entries()
        .iter()
        .map(|entry| (entry.call_id().as_str(), entry.state()))
        .collect();
    assert_eq!(
        ids,
        [
            ("0", CallState::Executed),
            ("1", CallState::Executed),
            ("1.0", CallState::Executed),
            ("1.1", CallState::Executed),
            ("2", CallState::Skipped),
            ("3", CallState::Skipped),
        ]
    );
    assert_eq!(report.entry("3").unwrap().outcome(), Some(&CallOutcome::Folded));
    assert_eq!(
        invoked(&log),
        ["get_directory_name", "read_todo_tasks", "scan_directory", "send_email"]
    );
}

#[tokio::test]
async fn missing_dependency_in_task_list_aborts_whole_pass() {
    let log = Log::default();
    let err = Dispatcher::new(registry(&log))
        .dispatch(vec![
            record(0, "read_stale_todo_tasks", json!({})),
            record(1, "get_directory_name", json!({})),
        ])
        .await
        .expect_err("sub-task reference to call 9 must abort");

    assert!(matches!(
        &err.source,
        ResolveError::MissingDependency { reference, .. } if reference == "9"
    ));
    let report = err.into_report();
    let ids: Vec<_> = report
        .entries()
        .iter()
        .map(|entry| (entry.call_id().as_str(), entry.state()))
        .collect();
    assert_eq!(
        ids,
        [
            ("0", CallState::Executed),
            ("0.0", CallState::Pending),
            ("0.1", CallState::Pending),
            ("1", CallState::Pending),
        ]
    );
    assert_eq!(invoked(&log), ["read_stale_todo_tasks"]);
}

#[tokio::test]
async fn task_depth_limit_stops_expansion() {
    let log = Log::default();
    let report = Dispatcher::new(registry(&log))
        .with_max_task_depth(0)
        .dispatch(vec![record(0, "read_todo_tasks", json!({}))])
        .await
        .unwrap();

    assert_eq!(report.entries().len(), 1);
    assert_eq!(invoked(&log), ["read_todo_tasks"]);
}

#[tokio::test]
async fn free_text_reply_runs_end_to_end() {
    let log = Log::default();
    let registry = registry(&log);
    let text = "get_directory_name()\n\
                default_api.scan_directory(path=\"<result_from_0>\")\n\
                compress_pdf(path=\"x\")";

    let parsed = parse_text(text, &registry.names());
    assert_eq!(parsed.sequence.len(), 2);
    assert_eq!(parsed.warnings.len(), 1);

    let report = Dispatcher::new(registry)
        .dispatch(parsed.sequence)
        .await
        .unwrap();
    assert_eq!(report.count(CallState::Executed), 2);
}

#[tokio::test]
async fn structured_reply_with_unknown_tool() {
    let log = Log::default();
    let registry = registry(&log);
    let response = ModelResponse::from_calls(vec![
        FunctionCall::new("compress_image", Arguments::new()),
        FunctionCall::new("get_directory_name", Arguments::new()),
    ]);

    let parsed = CallParser::default().parse(&response, &registry.names());
    let report = Dispatcher::new(registry)
        .dispatch(parsed.sequence)
        .await
        .unwrap();

    let unknown = report.entry("0").unwrap();
    assert_eq!(unknown.state(), CallState::Skipped);
    assert_eq!(unknown.outcome(), Some(&CallOutcome::UnknownTool));
    assert_eq!(report.entry("1").unwrap().state(), CallState::Executed);
}
