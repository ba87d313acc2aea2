use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pcscspy_core::{TraceOptions, decode_trace_file};

fn main() -> ExitCode {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<(), String> {
    let root = PathBuf::from("tests").join("golden");
    let entries =
        fs::read_dir(&root).map_err(|err| format!("failed to read {}: {}", root.display(), err))?;

    for entry in entries {
        let entry = entry.map_err(|err| format!("failed to read entry: {}", err))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let input = path.join("input.trace");
        if !input.exists() {
            continue;
        }
        let output = path.join("expected.txt");
        regenerate_one(&input, &output)?;
    }

    Ok(())
}

fn regenerate_one(input: &Path, output: &Path) -> Result<(), String> {
    let file = File::create(output)
        .map_err(|err| format!("failed to create {}: {}", output.display(), err))?;
    decode_trace_file(input, BufWriter::new(file), &TraceOptions::default())
        .map_err(|err| format!("decoding failed for {}: {}", input.display(), err))?;
    Ok(())
}
