#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use support::contract_harness::{assert_response_document, error_type, CpiScenarioHarness};

#[test]
fn given_malformed_stdin_when_run_then_single_cpi_error_line_is_written() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;
    let config = harness.write_config()?;

    let result = harness.run("{not json", Some(&config))?;

    assert_eq!(result.stdout_lines, 1);
    assert_response_document(&result.output)?;
    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::CpiError"));
    assert_eq!(result.output["error"]["ok_to_retry"], false);
    assert!(result.output["result"].is_null());
    Ok(())
}

#[test]
fn given_missing_config_flag_when_run_then_cpi_error_is_returned() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;

    let result = harness.run(r#"{"method": "has_vm", "arguments": ["vm-1"]}"#, None)?;

    assert_response_document(&result.output)?;
    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::CpiError"));
    Ok(())
}

#[test]
fn given_unreadable_config_when_run_then_message_names_the_path() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;
    let missing = std::env::temp_dir().join("photon-cpi-no-such-config.json");

    let result = harness.run(r#"{"method": "has_vm", "arguments": ["vm-1"]}"#, Some(&missing))?;

    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::CpiError"));
    let message = result.output["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("Unable to load photon config from path"), "{message}");
    Ok(())
}

#[test]
fn given_invalid_config_when_run_then_cpi_error_is_returned() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;
    let config = harness.write_config_content(r#"{"photon": {"target": ""}}"#)?;

    let result = harness.run(r#"{"method": "has_vm", "arguments": ["vm-1"]}"#, Some(&config))?;

    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::CpiError"));
    assert_eq!(result.output["log"], "");
    Ok(())
}

#[test]
fn given_unknown_method_when_run_then_not_supported_with_suggestion() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;
    let config = harness.write_config()?;

    let result = harness.run(r#"{"method": "has_vmm", "arguments": []}"#, Some(&config))?;

    assert_response_document(&result.output)?;
    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::NotSupported"));
    let message = result.output["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("Did you mean 'has_vm'?"), "{message}");
    Ok(())
}

#[test]
fn given_empty_arguments_when_run_then_cpi_error_is_returned() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;
    let config = harness.write_config()?;

    let result = harness.run(r#"{"method": "delete_disk", "arguments": []}"#, Some(&config))?;

    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::CpiError"));
    assert_eq!(result.output["error"]["ok_to_retry"], false);
    let log = result.output["log"].as_str().unwrap_or_default();
    assert!(log.contains("Begin action delete_disk"), "{log}");
    Ok(())
}

#[test]
fn given_unreachable_endpoint_when_has_vm_runs_then_cloud_error_is_retryable() -> Result<(), String> {
    let harness = CpiScenarioHarness::new()?;
    let config = harness.write_config()?;

    let result = harness.run(r#"{"method": "has_vm", "arguments": ["vm-1"]}"#, Some(&config))?;

    assert_eq!(result.stdout_lines, 1);
    assert_eq!(error_type(&result.output), Some("Bosh::Clouds::CloudError"));
    assert_eq!(result.output["error"]["ok_to_retry"], true);
    Ok(())
}

#[test]
fn given_any_request_when_run_then_stdout_carries_exactly_the_envelope_keys() {
    let harness = CpiScenarioHarness::new().expect("harness");
    let config = harness.write_config().expect("config");

    Command::new(env!("CARGO_BIN_EXE_cpi"))
        .arg("-configPath")
        .arg(&config)
        .write_stdin(r#"{"method": "reboot", "arguments": []}"#)
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""result":null"#)
                .and(predicate::str::contains(r#""error":{"#))
                .and(predicate::str::contains(r#""log":"#)),
        );
}
