#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Output;

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn needful(dir: &Path, user: &str) -> Command {
    let mut cmd = Command::cargo_bin("needful").expect("needful binary");
    cmd.env("NEEDFUL_LOG", "off")
        .env_remove("NEEDFUL_DB")
        .env_remove("NEEDFUL_DATA_DIR")
        .env_remove("NEEDFUL_USER")
        .arg("--data-dir")
        .arg(dir)
        .arg("--user")
        .arg(user);
    cmd
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

fn stderr_error(output: &Output) -> (i32, String) {
    let err: Value = serde_json::from_slice(&output.stderr).expect("stderr is json");
    let code = err["code"].as_str().unwrap_or_default().to_string();
    (output.status.code().unwrap_or(-1), code)
}

#[test]
fn shared_item_flows_into_dashboard() -> Result<()> {
    let dir = tempdir()?;

    let hh = stdout_json(&needful(dir.path(), "alice").args(["household", "create", "Flat"]).output()?);
    let hh_id = hh["id"].as_i64().expect("household id");

    let item = stdout_json(
        &needful(dir.path(), "alice")
            .args(["item", "add", "Milk", "--shared", "--urgent", "true", "--price", "2.50"])
            .output()?,
    );
    assert_eq!(item["household_id"].as_i64(), Some(hh_id));
    assert_eq!(item["household_name"], "Flat");
    assert_eq!(item["estimated_price"], "2.5");
    assert_eq!(item["is_urgent"], true);

    let listed = stdout_json(
        &needful(dir.path(), "alice")
            .args(["item", "list", "--scope", "household"])
            .output()?,
    );
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let board = stdout_json(&needful(dir.path(), "alice").arg("dashboard").output()?);
    assert_eq!(board["has_active_household"], true);
    assert_eq!(board["active_household_name"], "Flat");
    assert_eq!(board["household"]["current_week"]["total_items"], 1);
    assert_eq!(board["personal"]["current_week"]["total_items"], 0);
    assert_eq!(board["personal"]["history"].as_array().map(Vec::len), Some(4));

    stdout_json(&needful(dir.path(), "alice").args(["session", "end"]).output()?);
    let board = stdout_json(&needful(dir.path(), "alice").arg("dashboard").output()?);
    assert_eq!(board["has_active_household"], false);
    assert!(board.get("household").is_none());
    Ok(())
}

#[test]
fn error_kinds_map_to_exit_codes() -> Result<()> {
    let dir = tempdir()?;

    let out = needful(dir.path(), "alice").args(["item", "show", "999"]).output()?;
    assert_eq!(stderr_error(&out), (3, "ITEM/NOT_FOUND".to_string()));

    let item = stdout_json(&needful(dir.path(), "alice").args(["item", "add", "Razor"]).output()?);
    let id = item["id"].as_i64().expect("item id").to_string();

    let out = needful(dir.path(), "bob").args(["item", "show", &id]).output()?;
    assert_eq!(stderr_error(&out), (4, "ACCESS/FORBIDDEN".to_string()));

    let out = needful(dir.path(), "alice").args(["item", "add", " "]).output()?;
    assert_eq!(stderr_error(&out), (5, "VALIDATION/FAILED".to_string()));

    stdout_json(
        &needful(dir.path(), "alice")
            .args(["item", "edit", &id, "--version", "1", "--quantity", "4"])
            .output()?,
    );
    let out = needful(dir.path(), "alice")
        .args(["item", "edit", &id, "--version", "1", "--quantity", "5"])
        .output()?;
    assert_eq!(
        stderr_error(&out),
        (6, "CONFLICT/CONCURRENT_MODIFICATION".to_string())
    );

    let hh = stdout_json(&needful(dir.path(), "alice").args(["household", "create", "Flat"]).output()?);
    let hh_id = hh["id"].as_i64().expect("household id").to_string();
    let out = needful(dir.path(), "alice")
        .args(["household", "leave", &hh_id])
        .output()?;
    assert_eq!(
        stderr_error(&out),
        (7, "INTEGRITY/OWNER_CANNOT_LEAVE".to_string())
    );
    Ok(())
}

#[test]
fn user_is_required_except_for_migrate() -> Result<()> {
    let dir = tempdir()?;
    let migrate = || -> Result<Value> {
        let out = Command::cargo_bin("needful")?
            .env("NEEDFUL_LOG", "off")
            .env_remove("NEEDFUL_USER")
            .env("NEEDFUL_DATA_DIR", dir.path())
            .args(["db", "migrate"])
            .output()?;
        Ok(serde_json::from_slice(&out.stdout)?)
    };

    let first = migrate()?;
    assert_eq!(first["applied"][0], "0001_initial.sql");
    assert_eq!(first["applied"], first["known"]);
    assert!(dir.path().join("needful.sqlite3").exists());

    let again = migrate()?;
    assert_eq!(again["applied"].as_array().map(Vec::len), Some(0));
    assert_eq!(again["known"], first["known"]);

    let out = Command::cargo_bin("needful")?
        .env("NEEDFUL_LOG", "off")
        .env_remove("NEEDFUL_USER")
        .env("NEEDFUL_DATA_DIR", dir.path())
        .args(["item", "list"])
        .output()?;
    assert_eq!(out.status.code(), Some(5));
    Ok(())
}

#[test]
fn sessions_are_per_user() -> Result<()> {
    let dir = tempdir()?;
    let hh = stdout_json(&needful(dir.path(), "alice").args(["household", "create", "Flat"]).output()?);
    let hh_id = hh["id"].as_i64().expect("household id").to_string();

    let listed = stdout_json(&needful(dir.path(), "bob").args(["household", "list"]).output()?);
    assert!(listed["active_household_id"].is_null());

    stdout_json(&needful(dir.path(), "bob").args(["household", "join", &hh_id]).output()?);
    let listed = stdout_json(&needful(dir.path(), "bob").args(["household", "list"]).output()?);
    assert_eq!(listed["active_household_id"].to_string(), hh_id);
    assert_eq!(listed["households"][0]["member_count"], 2);
    assert_eq!(listed["households"][0]["role"], "member");
    Ok(())
}
