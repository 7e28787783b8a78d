pub mod codec;
pub mod config;
pub mod debug;
pub mod errors;
pub mod logging;
pub mod memory;
pub mod replay;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod target;
pub mod types;

pub use codec::{Codec, CodecKind, GzipJsonCodec, JsonCodec};
pub use errors::{AutomockError, CallError};
pub use memory::{Memory, SharedMemory};
pub use replay::call::Call;
pub use replay::proxy::{
    automock, automock_async_fn, automock_fn, Automock, AutomockOptions, Proxy,
};
pub use replay::reply::{CallResult, Reply};
pub use session::MockSession;
pub use storage::FixtureStore;
pub use target::{Factory, FunctionTarget, MethodKind, MethodTable, SyncOutcome, Target};
pub use types::{CallArgs, CallKey, CallType, CounterScope, TargetError};

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use config::{load_config, CliOverrides, EnvMap};
use runtime::ProductionRuntime;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "automock")]
#[command(about = "Inspect and verify recorded automock fixtures")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print one line per record of a fixture.
    List { fixture: PathBuf },
    /// Decode every record and report unresolved or unreadable ones.
    Check { fixture: PathBuf },
}

pub fn run() -> Result<i32, AutomockError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| AutomockError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, AutomockError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(AutomockError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.as_ref().map(|path| cwd.join(path)),
    };
    let cfg = load_config(&overrides, &env_to_map(env), runtime.file_system.as_ref())?;
    let codec = cfg.codec.kind.build();

    match cli.command {
        Command::List { fixture } => {
            let memory = read_fixture(runtime, &cwd.join(fixture))?;
            for call in memory.iter() {
                runtime.terminal.write_line(&list_line(call))?;
            }
            runtime
                .terminal
                .write_line(&format!("{} records", memory.len()))?;
            Ok(0)
        }
        Command::Check { fixture } => {
            let memory = read_fixture(runtime, &cwd.join(fixture))?;
            let problems = check_memory(&memory, codec.as_ref());
            for problem in &problems {
                runtime.terminal.write_line(problem)?;
            }
            if problems.is_empty() {
                runtime
                    .terminal
                    .write_line(&format!("ok: {} records", memory.len()))?;
                Ok(0)
            } else {
                runtime
                    .terminal
                    .write_line(&format!("{} problems", problems.len()))?;
                Ok(1)
            }
        }
    }
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}

fn read_fixture(runtime: &ProductionRuntime, path: &Path) -> Result<Memory, AutomockError> {
    let text = runtime.file_system.read_to_string(path)?;
    Memory::from_bytes(text.as_bytes())
}

fn list_line(call: &Call) -> String {
    let call_type = call
        .call_type
        .as_ref()
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| "unresolved".to_string());
    let outcome = if call.is_exception { "raised" } else { "returned" };
    format!(
        "{}\t{}\t{call_type}\t{outcome}\t{}",
        call.key(),
        call.method,
        call.request_digest()
    )
}

/// Everything in `memory` a replay would trip over.
pub fn check_memory(memory: &Memory, codec: &dyn Codec) -> Vec<String> {
    let mut problems = Vec::new();
    for call in memory.iter() {
        let key = call.key();
        if let Err(error) = call.request_args(codec) {
            problems.push(format!("{key} {}: bad request: {error}", call.method));
        }
        match &call.call_type {
            None => problems.push(format!("{key} {}: unresolved", call.method)),
            Some(CallType::Unknown(tag)) => {
                problems.push(format!("{key} {}: unknown call type {tag:?}", call.method))
            }
            Some(_) => {
                if let Err(error) = call.outcome(codec) {
                    problems.push(format!("{key} {}: bad response: {error}", call.method));
                }
            }
        }
    }
    problems
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::{check_memory, list_line, render_help, run_with_runtime};
    use crate::codec::JsonCodec;
    use crate::errors::AutomockError;
    use crate::memory::Memory;
    use crate::replay::call::Call;
    use crate::runtime::{FakeFileSystem, FakeTerminal, ProductionRuntime};
    use crate::types::{CallArgs, CallType};
    use crate::Codec;
    use serde_json::json;
    use std::ffi::OsString;
    use std::path::Path;
    use std::sync::Arc;

    fn resolved(index: u64, value: serde_json::Value) -> Call {
        let codec = JsonCodec;
        let request = codec
            .encode(&CallArgs::new().to_request_value())
            .expect("encode");
        let mut call = Call::new(0, Some(index), "get", request);
        call.resolve(CallType::Sync, &Ok(value), &codec).expect("resolve");
        call
    }

    #[test]
    fn check_flags_unresolved_and_unknown_records() {
        let mut memory = Memory::new();
        memory.insert(resolved(0, json!(1)));
        let mut unknown = resolved(1, json!(2));
        unknown.call_type = Some(CallType::Unknown("threaded".to_string()));
        memory.insert(unknown);
        memory.insert(Call::new(0, Some(2), "get", b"[[],{}]".to_vec()));

        let problems = check_memory(&memory, &JsonCodec);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("unknown call type"));
        assert!(problems[1].ends_with("unresolved"));
    }

    #[test]
    fn list_line_shows_key_type_and_outcome() {
        let line = list_line(&resolved(3, json!("x")));
        assert!(line.starts_with("(0, 3)\tget\tsync\treturned\t"));
    }

    #[test]
    fn list_writes_through_the_runtime_terminal() {
        let mut memory = Memory::new();
        memory.insert(resolved(0, json!(1)));
        let text = String::from_utf8(memory.to_bytes().expect("bytes")).expect("utf8");
        let terminal = FakeTerminal::default();
        let runtime = ProductionRuntime {
            file_system: Arc::new(FakeFileSystem::with_file("/work/fixture", text)),
            terminal: Arc::new(terminal.clone()),
        };
        let env = vec![(OsString::from("AUTOMOCK_STORAGE"), OsString::from("mocks"))];
        let args = ["automock", "list", "fixture"].map(OsString::from);
        let code = run_with_runtime(&args, &env, Path::new("/work"), &runtime).expect("run");
        assert_eq!(code, 0);
        let lines = terminal.written_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1 records");
    }

    #[test]
    fn check_exit_code_reflects_problems() {
        let mut memory = Memory::new();
        memory.insert(Call::new(0, Some(0), "get", b"[[],{}]".to_vec()));
        let text = String::from_utf8(memory.to_bytes().expect("bytes")).expect("utf8");
        let terminal = FakeTerminal::default();
        let runtime = ProductionRuntime {
            file_system: Arc::new(FakeFileSystem::with_file("/work/fixture", text)),
            terminal: Arc::new(terminal.clone()),
        };
        let args = ["automock", "check", "fixture"].map(OsString::from);
        let code = run_with_runtime(&args, &[], Path::new("/work"), &runtime).expect("run");
        assert_eq!(code, 1);
        assert!(terminal.written_lines().iter().any(|line| line == "2 problems"));
    }

    #[test]
    fn unknown_subcommand_is_a_cli_error() {
        let runtime = ProductionRuntime::new();
        let args = ["automock", "prune"].map(OsString::from);
        let err = run_with_runtime(&args, &[], Path::new("/"), &runtime).expect_err("cli");
        assert!(matches!(err, AutomockError::Cli(_)));
    }

    #[test]
    fn help_mentions_subcommands() {
        let help = render_help();
        assert!(help.contains("list"));
        assert!(help.contains("check"));
    }
}
