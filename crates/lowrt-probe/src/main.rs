use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lowrt::os::env;
use lowrt::process::Launcher;
use lowrt::{Command, ExitStatus, Fs, Layout};
use lowrt_targets::{TargetId, WordWidth};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "LOWRT_LOG";

#[derive(Parser)]
#[command(name = "lowrt-probe")]
#[command(about = "Exercise the runtime core against the real kernel.", long_about = None)]
struct Cli {
    /// Log filter (tracing `EnvFilter` syntax); overrides LOWRT_LOG.
    #[arg(long, value_name = "FILTER", global = true)]
    log: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Describe the target this build runs on.
    Target,
    /// Print container layouts for a target as JSON.
    Layout {
        #[arg(long, value_name = "ID")]
        target: Option<TargetId>,
    },
    /// List a directory.
    Ls {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Copy a file to standard output.
    Cat { path: PathBuf },
    /// Write TEXT to a file, replacing it unless --append is given.
    Write {
        path: PathBuf,
        text: String,
        #[arg(long)]
        append: bool,
    },
    /// Create a directory and any missing parents.
    Mkdirs { path: PathBuf },
    /// Remove a file or a whole tree.
    Rm { path: PathBuf },
    /// Print file metadata as JSON.
    Stat { path: PathBuf },
    /// Print one variable, or the whole environment.
    Env { key: Option<String> },
    /// Run a program and exit with its status.
    Run {
        /// Capture the child's standard output and replay it.
        #[arg(long)]
        capture: bool,
        program: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Print the words separated by spaces.
    Echo { words: Vec<String> },
    /// Exit with CODE.
    Exit { code: u8 },
    #[command(hide = true)]
    Trap,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());
    match try_main(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("lowrt-probe: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(flag: Option<&str>) {
    let directive = flag
        .map(str::to_owned)
        .or_else(|| std::env::var(LOG_ENV).ok())
        .unwrap_or_else(|| "warn".to_owned());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn bytes(p: &Path) -> &[u8] {
    p.as_os_str().as_encoded_bytes()
}

/// Raw write to standard output through the runtime's own handle.
fn emit(fs: &Fs, data: &[u8]) -> Result<()> {
    fs.wrap(fs.stdio(1))
        .write_all(data)
        .context("write standard output")
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    let fs = Fs::native();
    match cli.cmd {
        Cmd::Target => cmd_target(),
        Cmd::Layout { target } => cmd_layout(target),
        Cmd::Ls { path, json } => cmd_ls(&fs, &path, json),
        Cmd::Cat { path } => {
            let data = fs
                .read_file(bytes(&path))
                .with_context(|| format!("read {}", path.display()))?;
            emit(&fs, &data)?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Write { path, text, append } => {
            let res = if append {
                fs.append_file(bytes(&path), text.as_bytes())
            } else {
                fs.write_file(bytes(&path), text.as_bytes())
            };
            res.with_context(|| format!("write {}", path.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Mkdirs { path } => {
            fs.mkdir_all(bytes(&path))
                .with_context(|| format!("mkdirs {}", path.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Rm { path } => {
            fs.remove_all(bytes(&path))
                .with_context(|| format!("rm {}", path.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Stat { path } => cmd_stat(&fs, &path),
        Cmd::Env { key } => cmd_env(&fs, key.as_deref()),
        Cmd::Run {
            capture,
            program,
            args,
        } => cmd_run(&fs, &program, &args, capture),
        Cmd::Echo { words } => {
            let mut line = words.join(" ").into_bytes();
            line.push(b'\n');
            emit(&fs, &line)?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Exit { code } => Ok(ExitCode::from(code)),
        Cmd::Trap => {
            // Null copy with a nonzero length: the runtime ends the process.
            unsafe { lowrt::abi::lowrt_mem_copy(std::ptr::null_mut(), std::ptr::null(), 1) };
            anyhow::bail!("null copy returned")
        }
    }
}

#[derive(Debug, Serialize)]
struct TargetReport {
    target: Option<&'static str>,
    word_bytes: u64,
    family: Option<&'static str>,
    dirent_format: Option<String>,
    env_format: Option<String>,
}

fn cmd_target() -> Result<ExitCode> {
    let host = TargetId::host();
    let report = TargetReport {
        target: host.map(TargetId::as_str),
        word_bytes: WordWidth::host().bytes(),
        family: host.map(|t| t.family().as_str()),
        dirent_format: host.map(|t| format!("{:?}", t.dirent_format())),
        env_format: host.map(|t| format!("{:?}", t.env_format())),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Serialize)]
struct ArrayLayout {
    header_size: u64,
    data: u64,
    len: u64,
    cap: u64,
    elem_size: u64,
}

#[derive(Debug, Serialize)]
struct TextLayout {
    size: u64,
    data: u64,
    len: u64,
}

#[derive(Debug, Serialize)]
struct TableLayout {
    header_size: u64,
    data: u64,
    len: u64,
    key_kind: u64,
    cap: u64,
    entry_size: u64,
    entry_key: u64,
    entry_value: u64,
}

#[derive(Debug, Serialize)]
struct LayoutReport {
    target: &'static str,
    word_bytes: u64,
    array: ArrayLayout,
    text: TextLayout,
    table: TableLayout,
    dir_entry_size: u64,
}

fn cmd_layout(target: Option<TargetId>) -> Result<ExitCode> {
    let target = match target {
        Some(t) => t,
        None => TargetId::host().context("unknown host target; pass --target")?,
    };
    let l = Layout::new(target.word_width());
    let report = LayoutReport {
        target: target.as_str(),
        word_bytes: l.word(),
        array: ArrayLayout {
            header_size: l.array_header_size(),
            data: l.array_data(),
            len: l.array_len(),
            cap: l.array_cap(),
            elem_size: l.array_elem_size(),
        },
        text: TextLayout {
            size: l.text_size(),
            data: l.text_data(),
            len: l.text_len(),
        },
        table: TableLayout {
            header_size: l.table_header_size(),
            data: l.table_data(),
            len: l.table_len(),
            key_kind: l.table_key_kind(),
            cap: l.table_cap(),
            entry_size: l.entry_size(),
            entry_key: l.entry_key(),
            entry_value: l.entry_value(),
        },
        dir_entry_size: l.dir_entry_size(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Serialize)]
struct EntryReport {
    name: String,
    is_dir: bool,
}

fn cmd_ls(fs: &Fs, path: &Path, json: bool) -> Result<ExitCode> {
    let mut entries = fs
        .list_dir(bytes(path))
        .with_context(|| format!("list {}", path.display()))?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    if json {
        let report: Vec<EntryReport> = entries
            .iter()
            .map(|e| EntryReport {
                name: String::from_utf8_lossy(&e.name).into_owned(),
                is_dir: e.is_dir,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ExitCode::SUCCESS);
    }
    let mut out = Vec::new();
    for e in &entries {
        out.extend_from_slice(&e.name);
        if e.is_dir {
            out.push(b'/');
        }
        out.push(b'\n');
    }
    emit(fs, &out)?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Serialize)]
struct StatReport {
    size: u64,
    mode: u32,
    is_dir: bool,
    mtime: i64,
}

fn cmd_stat(fs: &Fs, path: &Path) -> Result<ExitCode> {
    let st = fs
        .stat(bytes(path))
        .with_context(|| format!("stat {}", path.display()))?;
    let report = StatReport {
        size: st.size,
        mode: st.mode,
        is_dir: st.is_dir,
        mtime: st.mtime,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_env(fs: &Fs, key: Option<&str>) -> Result<ExitCode> {
    if let Some(key) = key {
        let Some(value) = env::var(key.as_bytes()) else {
            return Ok(ExitCode::from(1));
        };
        let mut line = value.to_vec();
        line.push(b'\n');
        emit(fs, &line)?;
        return Ok(ExitCode::SUCCESS);
    }
    let mut out = Vec::new();
    for (k, v) in env::vars() {
        out.extend_from_slice(k);
        out.push(b'=');
        out.extend_from_slice(v);
        out.push(b'\n');
    }
    emit(fs, &out)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(fs: &Fs, program: &Path, args: &[OsString], capture: bool) -> Result<ExitCode> {
    let mut cmd = Command::new(bytes(program));
    cmd.args(args.iter().map(|a| a.as_encoded_bytes()));
    let out = if capture {
        cmd.output()
    } else {
        lowrt::process::native_launcher().launch(&cmd, false)
    }
    .with_context(|| format!("launch {}", program.display()))?;
    if capture {
        emit(fs, &out.stdout)?;
    }
    tracing::info!(status = ?out.status, "child finished");
    Ok(match out.status {
        ExitStatus::Code(code) => ExitCode::from(code as u8),
        ExitStatus::Signal(signal) => ExitCode::from(128u8.wrapping_add(signal as u8)),
    })
}
