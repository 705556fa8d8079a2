//! Helpers for spawning the external media tools (ffmpeg, ffprobe).

use std::ffi::OsStr;
use std::process::Stdio;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `tokio::process::Command` for a media tool.
///
/// The child gets no console window, a closed stdin, piped stdout/stderr and
/// the `C` locale so numeric output parses the same on every host. The child
/// is killed if the returned command's future is dropped.
pub fn tool_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window()
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Render a command line for log output.
pub fn display_command(program: impl AsRef<OsStr>, args: &[String]) -> String {
    let mut line = program.as_ref().to_string_lossy().into_owned();
    for arg in args {
        line.push(' ');
        if arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command_quotes_whitespace() {
        let args = vec!["-i".to_string(), "my clip.mp4".to_string()];
        assert_eq!(
            display_command("ffmpeg", &args),
            "ffmpeg -i \"my clip.mp4\""
        );
    }

    #[test]
    fn test_display_command_no_args() {
        assert_eq!(display_command("ffprobe", &[]), "ffprobe");
    }
}
