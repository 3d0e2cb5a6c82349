//! The real [`CommandRunner`] implementation: shells out to `spindump`,
//! `tailspin`, and `log show`. Invoked from inside `spawn_blocking` — see
//! `daemon.rs` — since these are genuinely blocking subprocess calls.

use std::process::Command;

use roguehunter_core::forensics::CommandRunner;

pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn run_tailspin(&mut self, pid: u32) -> Result<String, String> {
        let dump_path = std::env::temp_dir().join(format!("roguehunter-{pid}.spindump"));

        let dump = Command::new("sudo")
            .args(["spindump", &pid.to_string(), "-o"])
            .arg(&dump_path)
            .output()
            .map_err(|e| format!("failed to spawn spindump: {e}"))?;
        if !dump.status.success() {
            return Err(format!(
                "spindump exited with {}: {}",
                dump.status,
                String::from_utf8_lossy(&dump.stderr)
            ));
        }

        let decode = Command::new("tailspin")
            .arg(&dump_path)
            .output()
            .map_err(|e| format!("failed to spawn tailspin: {e}"));
        let _ = std::fs::remove_file(&dump_path);

        let decode = decode?;
        if !decode.status.success() {
            return Err(format!(
                "tailspin exited with {}: {}",
                decode.status,
                String::from_utf8_lossy(&decode.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&decode.stdout).into_owned())
    }

    fn run_log_show(&mut self, window_secs: f64) -> Result<String, String> {
        let window = format!("{}s", window_secs.ceil().max(1.0) as u64);
        let output = Command::new("log")
            .args(["show", "--style", "ndjson", "--last", &window])
            .output()
            .map_err(|e| format!("failed to spawn log show: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "log show exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
