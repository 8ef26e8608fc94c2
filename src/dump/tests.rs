//! Tests for engine resolution, credential layering, argument building,
//! and the real process runner.

use std::ffi::OsString;
use std::fs;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use rstest::rstest;

use crate::control::InstanceEndpoint;

use super::*;

fn endpoint() -> InstanceEndpoint {
    InstanceEndpoint {
        address: "db.example.net".to_owned(),
        port: 5432,
    }
}

fn rules_with_override(database: &str, user: Option<&str>, password: Option<&str>) -> CredentialRules {
    let mut overrides = HashMap::new();
    overrides.insert(
        database.to_owned(),
        DatabaseCredentials {
            user: user.map(str::to_owned),
            password: password.map(str::to_owned),
        },
    );
    CredentialRules {
        default_user: Some("default-user".to_owned()),
        default_password: Some("default-pass".to_owned()),
        overrides,
    }
}

/// Runner double that records invocations and returns a scripted status.
#[derive(Clone, Default)]
struct RecordingRunner {
    invocations: Arc<Mutex<Vec<DumpInvocation>>>,
    exit_code: Option<i32>,
}

impl RecordingRunner {
    fn succeeding() -> Self {
        Self {
            invocations: Arc::default(),
            exit_code: Some(0),
        }
    }

    fn recorded(&self) -> Vec<DumpInvocation> {
        self.invocations.lock().expect("runner lock poisoned").clone()
    }
}

impl DumpRunner for RecordingRunner {
    fn run(&self, invocation: &DumpInvocation) -> Result<ProcessStatus, DumpError> {
        self.invocations
            .lock()
            .expect("runner lock poisoned")
            .push(invocation.clone());
        Ok(ProcessStatus {
            code: self.exit_code,
            stderr: String::new(),
        })
    }
}

#[rstest]
#[case("postgres", Ok(Engine::Postgres))]
#[case("mysql", Ok(Engine::Mysql))]
#[case("oracle", Err("oracle"))]
#[case("aurora-postgresql", Err("aurora-postgresql"))]
fn engine_resolution_is_closed(#[case] name: &str, #[case] expected: Result<Engine, &str>) {
    let resolved = Engine::resolve(name);
    match expected {
        Ok(engine) => assert_eq!(resolved, Ok(engine)),
        Err(reported) => {
            let err = resolved.expect_err("engine should be unsupported");
            assert_eq!(err.engine, reported);
        }
    }
}

#[test]
fn per_database_override_beats_default_and_master() {
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        rules_with_override("app", Some("override-user"), Some("override-pass")),
        RecordingRunner::succeeding(),
    );
    let target = dumper
        .target_for("app", Some("master"))
        .expect("user resolves");
    assert_eq!(target.user, "override-user");
    assert_eq!(target.password.as_deref(), Some("override-pass"));
}

#[test]
fn default_credentials_apply_to_databases_without_override() {
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        rules_with_override("other", Some("ignored"), None),
        RecordingRunner::succeeding(),
    );
    let target = dumper
        .target_for("app", Some("master"))
        .expect("user resolves");
    assert_eq!(target.user, "default-user");
    assert_eq!(target.password.as_deref(), Some("default-pass"));
}

#[test]
fn master_username_is_the_final_fallback() {
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        CredentialRules::default(),
        RecordingRunner::succeeding(),
    );
    let target = dumper
        .target_for("app", Some("master"))
        .expect("user resolves");
    assert_eq!(target.user, "master");
    assert_eq!(target.password, None);
}

#[test]
fn missing_username_at_every_layer_is_an_error() {
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        CredentialRules::default(),
        RecordingRunner::succeeding(),
    );
    let err = dumper.target_for("app", None).expect_err("no user anywhere");
    assert!(matches!(err, DumpError::MissingUser { database } if database == "app"));
}

#[test]
fn postgres_invocation_keeps_the_password_out_of_the_arguments() {
    let runner = RecordingRunner::succeeding();
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        CredentialRules::default(),
        runner.clone(),
    );
    let target = DumpTarget {
        database: "appdb".to_owned(),
        user: "admin".to_owned(),
        password: Some("s3cret".to_owned()),
    };

    let path = dumper
        .dump(Engine::Postgres, &endpoint(), &target, "prod-1-2024-01-01")
        .expect("scripted success");
    assert_eq!(path, Utf8PathBuf::from("/out/appdb-prod-1-2024-01-01.dump"));

    let invocations = runner.recorded();
    assert_eq!(invocations.len(), 1);
    let invocation = invocations.first().expect("one invocation");
    assert_eq!(invocation.program, "pg_dump");
    assert_eq!(
        invocation.args,
        vec![
            OsString::from("-w"),
            OsString::from("-Fc"),
            OsString::from("-U"),
            OsString::from("admin"),
            OsString::from("-h"),
            OsString::from("db.example.net"),
            OsString::from("-p"),
            OsString::from("5432"),
            OsString::from("appdb"),
        ]
    );
    assert_eq!(invocation.env, vec![("PGPASSWORD", "s3cret".to_owned())]);
}

#[test]
fn mysql_invocation_passes_the_password_inline_and_no_env() {
    let runner = RecordingRunner::succeeding();
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        CredentialRules::default(),
        runner.clone(),
    );
    let target = DumpTarget {
        database: "appdb".to_owned(),
        user: "admin".to_owned(),
        password: Some("s3cret".to_owned()),
    };

    let path = dumper
        .dump(Engine::Mysql, &endpoint(), &target, "snap")
        .expect("scripted success");
    assert_eq!(path, Utf8PathBuf::from("/out/appdb-snap.sql"));

    let invocations = runner.recorded();
    let invocation = invocations.first().expect("one invocation");
    assert_eq!(invocation.program, "mysqldump");
    assert!(invocation.args.contains(&OsString::from("-ps3cret")));
    assert!(invocation.env.is_empty());
}

#[test]
fn mysql_invocation_omits_the_password_flag_when_none_resolves() {
    let runner = RecordingRunner::succeeding();
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        CredentialRules::default(),
        runner.clone(),
    );
    let target = DumpTarget {
        database: "appdb".to_owned(),
        user: "admin".to_owned(),
        password: None,
    };

    dumper
        .dump(Engine::Mysql, &endpoint(), &target, "snap")
        .expect("scripted success");

    let invocations = runner.recorded();
    let invocation = invocations.first().expect("one invocation");
    // `-P` is the port flag; only a lowercase `-p` would carry a password.
    assert!(
        !invocation
            .args
            .iter()
            .any(|arg| arg.to_string_lossy().starts_with("-p"))
    );
}

#[test]
fn nonzero_exit_surfaces_as_a_transient_process_failure() {
    let runner = RecordingRunner {
        invocations: Arc::default(),
        exit_code: Some(2),
    };
    let dumper = Dumper::new(
        Utf8PathBuf::from("/out"),
        CredentialRules::default(),
        runner,
    );
    let target = DumpTarget {
        database: "appdb".to_owned(),
        user: "admin".to_owned(),
        password: None,
    };

    let err = dumper
        .dump(Engine::Postgres, &endpoint(), &target, "snap")
        .expect_err("scripted failure");
    assert!(err.is_transient());
    assert!(matches!(
        err,
        DumpError::ProcessFailed { status: Some(2), .. }
    ));
}

#[test]
fn spawn_and_output_errors_are_not_transient() {
    let spawn = DumpError::Spawn {
        program: "pg_dump".to_owned(),
        message: "not found".to_owned(),
    };
    let output = DumpError::OutputFile {
        path: Utf8PathBuf::from("/out/x.dump"),
        message: "read-only".to_owned(),
    };
    assert!(!spawn.is_transient());
    assert!(!output.is_transient());
}

#[test]
fn process_runner_streams_stdout_to_the_output_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let output_file = Utf8PathBuf::from_path_buf(dir.path().join("out.txt"))
        .expect("tempdir path is utf-8");
    let invocation = DumpInvocation {
        program: "sh".to_owned(),
        args: vec![OsString::from("-c"), OsString::from("printf dump-bytes")],
        env: Vec::new(),
        output_file: output_file.clone(),
    };

    let status = ProcessDumpRunner.run(&invocation).expect("sh runs");
    assert!(status.is_success());
    let written = fs::read_to_string(output_file.as_std_path()).expect("output file exists");
    assert_eq!(written, "dump-bytes");
}

#[test]
fn process_runner_applies_the_environment_overlay_per_invocation() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let output_file = Utf8PathBuf::from_path_buf(dir.path().join("env.txt"))
        .expect("tempdir path is utf-8");
    let invocation = DumpInvocation {
        program: "sh".to_owned(),
        args: vec![OsString::from("-c"), OsString::from("printf \"$PGPASSWORD\"")],
        env: vec![("PGPASSWORD", "overlay-only".to_owned())],
        output_file: output_file.clone(),
    };

    ProcessDumpRunner.run(&invocation).expect("sh runs");
    let written = fs::read_to_string(output_file.as_std_path()).expect("output file exists");
    assert_eq!(written, "overlay-only");
    // The overlay is scoped to the child; the parent environment is
    // untouched.
    assert!(std::env::var("PGPASSWORD").is_err());
}

#[test]
fn process_runner_captures_stderr_and_nonzero_exit() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let output_file = Utf8PathBuf::from_path_buf(dir.path().join("fail.txt"))
        .expect("tempdir path is utf-8");
    let invocation = DumpInvocation {
        program: "sh".to_owned(),
        args: vec![
            OsString::from("-c"),
            OsString::from("echo boom >&2; exit 3"),
        ],
        env: Vec::new(),
        output_file,
    };

    let status = ProcessDumpRunner.run(&invocation).expect("sh runs");
    assert_eq!(status.code, Some(3));
    assert!(status.stderr.contains("boom"));
}

#[test]
fn output_files_are_truncated_so_repeats_overwrite() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let output_file = Utf8PathBuf::from_path_buf(dir.path().join("repeat.txt"))
        .expect("tempdir path is utf-8");

    for payload in ["first-longer-payload", "second"] {
        let invocation = DumpInvocation {
            program: "sh".to_owned(),
            args: vec![
                OsString::from("-c"),
                OsString::from(format!("printf {payload}")),
            ],
            env: Vec::new(),
            output_file: output_file.clone(),
        };
        ProcessDumpRunner.run(&invocation).expect("sh runs");
    }

    let written = fs::read_to_string(output_file.as_std_path()).expect("output file exists");
    assert_eq!(written, "second");
}
