// Interactive command loop
// Accepts: format <n>, write <file> <n>, ls <path> <n>, install <n>, disks, quit

use crate::Session;
use mfsutil_core::{FileFlags, FormatOptions};
use mfsutil_filesystems::Bootloader;
use std::io::{self, BufRead, Write};
use std::path::Path;

const INSTALL_ROOT: &str = "deploy/hdd";

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Format(usize),
    Write(String, usize),
    List(String, usize),
    Install(usize),
    Disks,
    Help,
    Quit,
}

fn parse_index(token: Option<&str>) -> Result<usize, String> {
    let token = token.ok_or_else(|| "missing disk index".to_string())?;
    token
        .parse()
        .map_err(|_| format!("'{}' is not a disk index", token))
}

fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let mut tokens = line.split_whitespace();
    let Some(command) = tokens.next() else {
        return Ok(None);
    };

    let parsed = match command.to_ascii_lowercase().as_str() {
        "format" => ShellCommand::Format(parse_index(tokens.next())?),
        "write" => {
            let file = tokens.next().ok_or("usage: write <file> <n>")?;
            ShellCommand::Write(file.to_string(), parse_index(tokens.next())?)
        }
        "ls" => {
            let path = tokens.next().ok_or("usage: ls <path> <n>")?;
            ShellCommand::List(path.to_string(), parse_index(tokens.next())?)
        }
        "install" => ShellCommand::Install(parse_index(tokens.next())?),
        "disks" | "list" => ShellCommand::Disks,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };

    if tokens.next().is_some() {
        return Err("too many arguments".to_string());
    }
    Ok(Some(parsed))
}

/// Default format options; bootable when both stage files are present
fn shell_format_options() -> FormatOptions {
    let mut options = FormatOptions::default();
    options.bootable = options.stage1_path.is_file() && options.stage2_path.is_file();
    options
}

fn execute(session: &Session, command: ShellCommand) -> anyhow::Result<bool> {
    match command {
        ShellCommand::Format(index) => session.format(index, shell_format_options(), false)?,
        ShellCommand::Write(file, index) => {
            session.write(Path::new(&file), index, None, FileFlags(FileFlags::SYSTEM))?
        }
        ShellCommand::List(path, index) => session.list(&path, index)?,
        ShellCommand::Install(index) => {
            let options = FormatOptions::default();
            let bootloader = if options.stage1_path.is_file() && options.stage2_path.is_file() {
                Some(Bootloader::load(&options.stage1_path, &options.stage2_path)?)
            } else {
                None
            };
            session.install(index, Path::new(INSTALL_ROOT), bootloader)?
        }
        ShellCommand::Disks => session.list_disks(false)?,
        ShellCommand::Help => {
            println!("Commands:");
            println!("  format <n>         format disk n");
            println!("  write <file> <n>   copy a host file to the root of disk n");
            println!("  ls <path> <n>      list a directory on disk n");
            println!("  install <n>        install {} (and the bootloader) onto disk n", INSTALL_ROOT);
            println!("  disks              list candidate disks");
            println!("  quit               leave the shell");
        }
        ShellCommand::Quit => return Ok(false),
    }
    Ok(true)
}

pub(crate) fn run(session: &Session) -> anyhow::Result<()> {
    session.list_disks(false)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("mfs> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line?;

        match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(command)) => match execute(session, command) {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(e) => eprintln!("Error: {:#}", e),
            },
            Err(message) => eprintln!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("format 0"), Ok(Some(ShellCommand::Format(0))));
        assert_eq!(
            parse_line("write kernel.mos 1"),
            Ok(Some(ShellCommand::Write("kernel.mos".to_string(), 1)))
        );
        assert_eq!(
            parse_line("LS /system 0"),
            Ok(Some(ShellCommand::List("/system".to_string(), 0)))
        );
        assert_eq!(parse_line("quit"), Ok(Some(ShellCommand::Quit)));
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("format").is_err());
        assert!(parse_line("format x").is_err());
        assert!(parse_line("ls /").is_err());
        assert!(parse_line("install 0 1").is_err());
        assert!(parse_line("mount 0").is_err());
    }
}
