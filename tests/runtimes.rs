//! End-to-end scenarios against real language runtimes. Each test skips
//! with a message when the runtime binary is absent from the host.

use runlet::config::types::RunletConfig;
use runlet::engine::{Engine, ExecutionRequest, TerminationReason};
use runlet::Language;

fn engine() -> Engine {
    Engine::new(RunletConfig::default())
}

/// True when the language has no resolvable runtime on this host.
fn missing(engine: &Engine, language: Language) -> bool {
    if engine.supported_languages().contains(&language) {
        false
    } else {
        eprintln!("skipping: no runtime for {}", language);
        true
    }
}

// ============================================================================
// JavaScript
// ============================================================================

#[tokio::test]
async fn js_final_expression_value_is_returned() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(Language::JavaScript, "return 2 + 2;"))
        .await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert!(result.succeeded);
    assert_eq!(result.return_value.as_deref(), Some("4"));
}

#[tokio::test]
async fn js_busy_loop_times_out_near_the_deadline() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(
            ExecutionRequest::new(Language::JavaScript, "while (true) {}").with_timeout_ms(500),
        )
        .await;

    assert_eq!(result.termination_reason, TerminationReason::Timeout);
    assert!(
        (400..2_500).contains(&result.duration_ms),
        "duration {} ms out of expected band",
        result.duration_ms
    );
}

#[tokio::test]
async fn js_throw_keeps_prior_output_and_strips_host_frames() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(
            Language::JavaScript,
            "console.log('hi'); throw new Error('boom');",
        ))
        .await;

    assert_eq!(result.termination_reason, TerminationReason::RuntimeError);
    assert_eq!(result.stdout, "hi\n");
    assert!(result.stderr.contains("boom"));
    // Message only: no stack frames, no host paths
    assert!(!result.stderr.contains(" at "));
    assert!(!result.stderr.contains("harness"));
}

#[tokio::test]
async fn js_syntax_error_is_a_runtime_error() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(Language::JavaScript, "return ((;"))
        .await;

    assert_eq!(result.termination_reason, TerminationReason::RuntimeError);
    assert!(result.stderr.contains("SyntaxError"));
    assert!(!result.stderr.contains(" at "));
}

#[tokio::test]
async fn js_runs_share_no_state() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let first = engine
        .submit(ExecutionRequest::new(
            Language::JavaScript,
            "var leak = 41; return leak;",
        ))
        .await;
    assert_eq!(first.return_value.as_deref(), Some("41"));

    let second = engine
        .submit(ExecutionRequest::new(
            Language::JavaScript,
            "return typeof leak;",
        ))
        .await;
    assert_eq!(second.termination_reason, TerminationReason::Completed);
    assert_eq!(second.return_value.as_deref(), Some("undefined"));
}

#[tokio::test]
async fn js_require_is_a_capability_violation() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(
            Language::JavaScript,
            "return require('fs');",
        ))
        .await;

    assert_eq!(
        result.termination_reason,
        TerminationReason::CapabilityViolation
    );
    assert!(!result.succeeded);
    assert!(result.stderr.contains("require"));
}

#[tokio::test]
async fn js_process_is_a_capability_violation() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(
            Language::JavaScript,
            "return process.env.HOME;",
        ))
        .await;

    assert_eq!(
        result.termination_reason,
        TerminationReason::CapabilityViolation
    );
}

#[tokio::test]
async fn js_stdin_value_is_injected() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(
            ExecutionRequest::new(Language::JavaScript, "return stdin.trim().toUpperCase();")
                .with_stdin("hey\n"),
        )
        .await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert_eq!(result.return_value.as_deref(), Some("HEY"));
}

#[tokio::test]
#[ignore = "memory pressure; run explicitly with -- --ignored"]
async fn js_allocation_storm_is_classified_as_memory_exceeded() {
    let engine = engine();
    if missing(&engine, Language::JavaScript) {
        return;
    }

    let result = engine
        .submit(
            ExecutionRequest::new(
                Language::JavaScript,
                "const hog = []; while (true) { hog.push(new Array(1000000).fill(1)); }",
            )
            .with_timeout_ms(10_000)
            .with_memory_limit_bytes(32 * 1024 * 1024),
        )
        .await;

    assert_eq!(
        result.termination_reason,
        TerminationReason::MemoryExceeded
    );
}

// ============================================================================
// Python
// ============================================================================

#[tokio::test]
async fn python_final_expression_value_is_returned() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(Language::Python, "2 + 2"))
        .await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert_eq!(result.return_value.as_deref(), Some("4"));
}

#[tokio::test]
async fn python_print_goes_to_captured_stdout() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let result = engine
        .submit(
            ExecutionRequest::new(Language::Python, "print(stdin.upper())").with_stdin("hey"),
        )
        .await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert_eq!(result.stdout, "HEY\n");
}

#[tokio::test]
async fn python_input_reads_injected_lines() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let result = engine
        .submit(
            ExecutionRequest::new(Language::Python, "print(input())\nprint(input())")
                .with_stdin("one\ntwo\n"),
        )
        .await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert_eq!(result.stdout, "one\ntwo\n");
}

#[tokio::test]
async fn python_open_is_a_capability_violation() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(
            Language::Python,
            "open('/etc/passwd')",
        ))
        .await;

    assert_eq!(
        result.termination_reason,
        TerminationReason::CapabilityViolation
    );
    assert!(result.stderr.contains("open"));
}

#[tokio::test]
async fn python_import_is_a_capability_violation() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(Language::Python, "import os"))
        .await;

    assert_eq!(
        result.termination_reason,
        TerminationReason::CapabilityViolation
    );
}

#[tokio::test]
async fn python_broad_except_cannot_swallow_a_violation() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let source = "try:\n    open('x')\nexcept Exception:\n    print('caught')\n";
    let result = engine
        .submit(ExecutionRequest::new(Language::Python, source))
        .await;

    assert_eq!(
        result.termination_reason,
        TerminationReason::CapabilityViolation
    );
    assert!(!result.stdout.contains("caught"));
}

#[tokio::test]
async fn python_division_by_zero_is_a_runtime_error() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let result = engine
        .submit(ExecutionRequest::new(Language::Python, "1 / 0"))
        .await;

    assert_eq!(result.termination_reason, TerminationReason::RuntimeError);
    assert!(result.stderr.contains("ZeroDivisionError"));
}

#[tokio::test]
async fn python_runs_share_no_state() {
    let engine = engine();
    if missing(&engine, Language::Python) {
        return;
    }

    let first = engine
        .submit(ExecutionRequest::new(Language::Python, "leak = 41\nprint(leak)"))
        .await;
    assert_eq!(first.stdout, "41\n");

    let second = engine
        .submit(ExecutionRequest::new(Language::Python, "print(leak)"))
        .await;
    assert_eq!(second.termination_reason, TerminationReason::RuntimeError);
    assert!(second.stderr.contains("NameError"));
}
