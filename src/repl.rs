//! 交互模式

use std::io::Write;

use anyhow::Context;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use tracing::{info, warn};

use crate::const_values::DevmemConfig;
use crate::session::{Outcome, Session};

/// 处理一行输入，返回是否继续
///
/// 命令出错只打印，不结束会话。
pub fn handle_line(session: &mut Session, line: &str, out: &mut dyn Write) -> std::io::Result<bool> {
    match session.execute_line(line) {
        Ok(Outcome::Quit) => return Ok(false),
        Ok(Outcome::Nothing) => {}
        Ok(Outcome::Selected(summary)) => writeln!(out, "{}", summary)?,
        Ok(Outcome::Read(report)) => writeln!(out, "{}", report)?,
        Ok(Outcome::Write(report)) => {
            writeln!(out, "{}", report)?;
            if report.mismatch() {
                writeln!(out, "{}", "read back differs from written value".yellow())?;
            }
        }
        Ok(Outcome::Help(msg)) => write!(out, "{}", msg)?,
        Err(e) => writeln!(out, "{}", e.to_string().red())?,
    }
    Ok(true)
}

pub fn run_interactive(config: &DevmemConfig) -> anyhow::Result<()> {
    let mut session = Session::new(config)?;
    let editor_config = Config::builder()
        .auto_add_history(true)
        .history_ignore_space(true)
        .max_history_size(config.repl.history_size)?
        .build();
    let mut editor = DefaultEditor::with_config(editor_config).context("cannot start line editor")?;
    let mut stdout = std::io::stdout();

    info!("进入交互模式");
    loop {
        match editor.readline(&config.repl.prompt) {
            Ok(line) => {
                if !handle_line(&mut session, &line, &mut stdout)? {
                    break;
                }
                stdout.flush()?;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "读取输入失败");
                break;
            }
        }
    }

    session.close_all();
    info!("退出交互模式");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandDefaults;
    use crate::session::SessionState;
    use crate::testing::{fake_mem_device, FakeSysfs};

    fn feed(session: &mut Session, lines: &[&str]) -> (String, bool) {
        let mut out = Vec::new();
        let mut running = true;
        for line in lines {
            running = handle_line(session, line, &mut out).unwrap();
            if !running {
                break;
            }
        }
        (String::from_utf8(out).unwrap(), running)
    }

    #[test]
    fn test_errors_do_not_end_session() {
        let mem = fake_mem_device(0x1000);
        let sysfs = FakeSysfs::new();
        let mut session = Session::with_paths(mem.path(), sysfs.root(), CommandDefaults::default());

        let (output, running) = feed(&mut session, &["x 0x0", "bogus", "x/24 0", "use mem", "w/8 0x3 0x7f"]);
        assert!(running);
        assert!(output.contains("no backend selected"));
        assert!(output.contains("no matching command 'bogus'"));
        assert!(output.ends_with("0x3: 0x7f, (0x7f)\n"));
        assert_eq!(session.state(), SessionState::LocalActive);
    }

    #[test]
    fn test_help_and_quit() {
        let mem = fake_mem_device(0x1000);
        let sysfs = FakeSysfs::new();
        let mut session = Session::with_paths(mem.path(), sysfs.root(), CommandDefaults::default());

        let (output, running) = feed(&mut session, &["help", "", "quit", "x 0"]);
        assert!(!running);
        assert!(output.starts_with("Commands:\n"));
        assert_eq!(session.state(), SessionState::Terminated);
    }
}
