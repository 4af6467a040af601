#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn replays_against_the_same_db_accumulate() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");

    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "op, reference, customer, amount, currency, target").unwrap();
    writeln!(csv1, "topup, t-1, alice, 100, USD,").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("ledgercore"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);
    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    assert!(String::from_utf8_lossy(&output1.stdout).contains("alice,USD,100,active"));

    // second run recovers the persisted wallet and adds to it
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "op, reference, customer, amount, currency, target").unwrap();
    writeln!(csv2, "topup, t-2, alice, 50, USD,").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("ledgercore"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);
    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    assert!(String::from_utf8_lossy(&output2.stdout).contains("alice,USD,150,active"));
}

#[test]
fn replayed_reference_is_ignored_across_runs() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");

    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "op, reference, customer, amount, currency, target").unwrap();
    writeln!(csv, "pay, p-1, alice, 500, USD,").unwrap();

    for _ in 0..2 {
        let mut cmd = Command::new(cargo_bin!("ledgercore"));
        cmd.arg(csv.path()).arg("--db-path").arg(&db_path);
        let output = cmd.output().expect("Failed to execute command");
        assert!(output.status.success());
        // the retry replays the admitted payment instead of double crediting
        assert!(String::from_utf8_lossy(&output.stdout).contains("alice,USD,500,active"));
    }
}
