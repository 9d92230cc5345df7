#![cfg(unix)]

use anyhow::Result;
use fpbench_engine::{Engine, EngineConfig, EngineError, ErrorQuery, Request, SessionState};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// A scripted stand-in engine. Every input line is appended to the log file
/// given as its first argument; responses are canned per command.
const FAKE_ENGINE: &str = r##"
log="$1"
echo "platform $3" >> "$log"
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$log"
  case "$line" in
    "(exit)") exit 0 ;;
    "(cost "*) echo "12.5" ;;
    "(compile "*) printf '%s\n' 'double foo(double x0) {\n  return x0;\n}' ;;
    "(desugar "*fail*) echo "#f" ;;
    "(desugar "*) echo '(FPCore (x) :name "d" x)' ;;
    "(error "*) echo "1.5 2.25" ;;
    "(pareto "*) echo "1.0 2.0|3.0 0.5" ;;
    "(sample "*) echo "1.0,2.0|+inf.0,+nan.0|-1.5,0.25" ;;
    "(read "*)
      echo '(FPCore (x) :name "a" x)'
      echo '(FPCore (x y) :name "b" (+ x y))' ;;
    "(improve "*)
      echo '(FPCore (x) :name "a" x)'
      echo '3'
      echo '0.5' ;;
    *) echo "?" ;;
  esac
done
"##;

fn fake_engine(log: &Path) -> Engine {
    let config = EngineConfig::new(
        "sh",
        vec![
            "-c".to_string(),
            FAKE_ENGINE.to_string(),
            "fake-engine".to_string(),
            log.display().to_string(),
        ],
    );
    Engine::new(config, "c")
}

fn logged(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn exit_count(lines: &[String]) -> usize {
    lines.iter().filter(|line| line.as_str() == "(exit)").count()
}

#[test]
fn cost_session_ends_with_single_exit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    let costs = engine.cost(&["(FPCore (x) x)", "(FPCore (y) y)"])?;
    assert_eq!(costs, vec![12.5, 12.5]);

    let lines = logged(&log);
    assert_eq!(lines[0], "platform c");
    assert_eq!(lines[1], "(cost (FPCore (x) x))");
    assert_eq!(lines.last().map(String::as_str), Some("(exit)"));
    assert_eq!(exit_count(&lines), 1);
    Ok(())
}

#[test]
fn compile_unescapes_newlines() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(&dir.path().join("engine.log"));
    let compiled = engine.compile("c", &["(FPCore (x0) x0)"])?;
    assert_eq!(compiled, vec!["double foo(double x0) {\n  return x0;\n}".to_string()]);
    Ok(())
}

#[test]
fn desugar_reports_sentinel_as_none() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(&dir.path().join("engine.log"));
    let out = engine.desugar(&["(FPCore (x) :name \"ok\" x)", "(FPCore (x) :name \"fail\" x)"])?;
    assert_eq!(out[0].as_deref(), Some("(FPCore (x) :name \"d\" x)"));
    assert_eq!(out[1], None);
    Ok(())
}

#[test]
fn malformed_error_response_still_sends_exit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    // The fake engine always answers with two errors; three variants must fail.
    let query = ErrorQuery {
        input: "(FPCore (x) x)",
        variants: vec!["(FPCore (x) a)", "(FPCore (x) b)", "(FPCore (x) c)"],
    };
    let err = engine.error(&[query]).unwrap_err();
    assert!(err.is_protocol_violation(), "unexpected error: {err}");

    let lines = logged(&log);
    assert_eq!(lines.last().map(String::as_str), Some("(exit)"));
    assert_eq!(exit_count(&lines), 1);
    Ok(())
}

#[test]
fn error_with_matching_group_size() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(&dir.path().join("engine.log"));
    let query = ErrorQuery {
        input: "(FPCore (x) x)",
        variants: vec!["(FPCore (x) a)", "(FPCore (x) b)"],
    };
    assert_eq!(engine.error(&[query])?, vec![vec![1.5, 2.25]]);
    Ok(())
}

#[test]
fn sample_count_mismatch_is_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    let sample = engine.sample("(FPCore (x0) x0)", 1, 3)?;
    assert_eq!(sample.len(), 3);
    assert_eq!(sample.points[0][1], f64::INFINITY);
    assert!(sample.ground_truth[1].is_nan());

    let err = engine.sample("(FPCore (x0) x0)", 1, 4).unwrap_err();
    assert!(matches!(err, EngineError::ProtocolViolation { command: "sample", .. }));
    assert_eq!(exit_count(&logged(&log)), 2);
    Ok(())
}

#[test]
fn read_and_improve_drain_until_exit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    let cores = engine.read(Path::new("bench/hamming.fpcore"))?;
    assert_eq!(cores.len(), 2);
    assert!(cores[1].contains(":name \"b\""));

    let improved = engine.improve(&["(FPCore (x) :name \"a\" x)"], 2, Some("python"))?;
    assert_eq!(improved.len(), 1);
    assert_eq!(improved[0].cost, 3.0);
    assert_eq!(improved[0].err, 0.5);

    let lines = logged(&log);
    assert!(lines.contains(&"(read \"bench/hamming.fpcore\")".to_string()));
    assert!(lines.contains(&"platform python".to_string()));
    assert!(lines.contains(&"(improve ((FPCore (x) :name \"a\" x)) 2)".to_string()));
    assert_eq!(exit_count(&lines), 2);
    Ok(())
}

#[test]
fn pareto_parses_frontier() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = fake_engine(&dir.path().join("engine.log"));
    let frontier = engine.pareto(&[vec![(1.0, 2.0)], vec![(3.0, 0.5), (4.0, 0.1)]])?;
    assert_eq!(frontier, vec![(1.0, 2.0), (3.0, 0.5)]);
    Ok(())
}

#[test]
fn dropped_session_sends_exit_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    {
        let mut session = engine.open_session()?;
        session.send(&Request::Cost {
            expr: "(FPCore (x) x)",
        })?;
        assert_eq!(session.state(), SessionState::AwaitingResponse("cost"));
        assert_eq!(session.read_line()?, "12.5");
        assert_eq!(session.state(), SessionState::Running);
    }

    let lines = logged(&log);
    assert_eq!(lines.last().map(String::as_str), Some("(exit)"));
    assert_eq!(exit_count(&lines), 1);
    Ok(())
}

#[test]
fn session_dropped_while_panicking_sends_exit_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut session = engine.open_session().unwrap();
        session
            .send(&Request::Cost {
                expr: "(FPCore (x) x)",
            })
            .unwrap();
        assert_eq!(session.read_line().unwrap(), "12.5");
        panic!("caller failed mid-session");
    }));
    assert!(outcome.is_err());

    let lines = logged(&log);
    assert_eq!(lines.last().map(String::as_str), Some("(exit)"));
    assert_eq!(exit_count(&lines), 1);
    Ok(())
}

#[test]
fn panic_inside_with_session_still_sends_exit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        engine.with_session("c", |session| -> fpbench_engine::EngineResult<()> {
            session.send(&Request::Cost {
                expr: "(FPCore (x) x)",
            })?;
            panic!("caller failed before reading");
        })
    }));
    assert!(outcome.is_err());

    let lines = logged(&log);
    assert_eq!(exit_count(&lines), 1);
    assert_eq!(lines.last().map(String::as_str), Some("(exit)"));
    Ok(())
}

#[test]
fn commands_after_exit_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("engine.log");
    let engine = fake_engine(&log);

    let mut session = engine.open_session()?;
    session.send_exit()?;
    assert_eq!(session.state(), SessionState::Terminating);
    let err = session
        .send(&Request::Cost {
            expr: "(FPCore (x) x)",
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionClosed("cost")));
    session.send_exit()?;
    session.close()?;

    assert_eq!(exit_count(&logged(&log)), 1);
    Ok(())
}

#[test]
fn missing_program_fails_to_spawn() {
    let engine = Engine::new(
        EngineConfig::new("/nonexistent/engine-binary", Vec::new()),
        "c",
    );
    let err = engine.cost(&["(FPCore (x) x)"]).unwrap_err();
    assert!(matches!(err, EngineError::Spawn { .. }));
}
