use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use serde_json::{Value, json};

fn transmem_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_transmem") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("transmem");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}

fn transmem(
    data_dir: &Path,
    args: &[&str],
) -> Result<Output, Box<dyn std::error::Error>> {
    let output = Command::new(transmem_bin()?)
        .arg("--data-dir")
        .arg(data_dir)
        .arg("-q")
        .args(args)
        .env_remove("TRANSMEM_LOG")
        .output()?;
    assert!(
        output.status.success(),
        "transmem {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(output)
}

fn stdout_json(output: &Output) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn apply_search_and_inspect() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let data_dir = tmp.path().join("data");

    let batch = json!({
        "units": [
            {
                "channel": 1,
                "channel_position": 1,
                "memory": 10,
                "direction": "en:it",
                "source": "The cat sat on the mat.",
                "target": "Il gatto sedeva sul tappeto."
            },
            {
                "channel": 1,
                "channel_position": 2,
                "memory": 10,
                "direction": "en:it",
                "source": "The dog barked.",
                "target": "Il cane abbaiava."
            }
        ],
        "channel_positions": {"1": 2}
    });
    let batch_path = tmp.path().join("batch.json");
    std::fs::write(&batch_path, serde_json::to_vec(&batch)?)?;
    let batch_arg = batch_path.to_str().ok_or("non-utf8 temp path")?;

    let report =
        stdout_json(&transmem(&data_dir, &["apply", batch_arg, "--json"])?)?;
    assert_eq!(report["added"], 2);

    let replay =
        stdout_json(&transmem(&data_dir, &["apply", batch_arg, "--json"])?)?;
    assert_eq!(replay["added"], 0);
    assert_eq!(replay["replayed"], 2);

    let results = stdout_json(&transmem(
        &data_dir,
        &[
            "search",
            "the cat sat on the mat",
            "--direction",
            "en:it",
            "-n",
            "1",
            "--json",
        ],
    )?)?;
    let results = results.as_array().ok_or("expected an array")?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["target"], "Il gatto sedeva sul tappeto.");
    assert_eq!(results[0]["direction"], "en__it");

    let positions =
        stdout_json(&transmem(&data_dir, &["positions", "--json"])?)?;
    assert_eq!(positions, json!({"1": 2}));

    let dump = transmem(&data_dir, &["dump", "--json"])?;
    let lines = String::from_utf8(dump.stdout)?;
    assert_eq!(lines.lines().count(), 2);

    let status = stdout_json(&transmem(&data_dir, &["status", "--json"])?)?;
    assert_eq!(status["units"], 2);
    assert_eq!(status["channels"], 1);

    Ok(())
}
