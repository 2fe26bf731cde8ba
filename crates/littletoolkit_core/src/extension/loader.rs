//! Starlark execution loader.
//!
//! # Responsibility
//! - Evaluate an extension code body in a fresh, isolated module.
//! - Locate the `main` entry point and keep its frozen module alive.
//! - Call the entry point on demand with no arguments.
//!
//! # Invariants
//! - Globals contain the Starlark standard library, `print`, `json` and only
//!   the host builtins unlocked by the effective capability set.
//! - `load()` statements are rejected at parse time.
//! - A successfully loaded [`EntryPoint`] exclusively owns its module.

use crate::extension::capability::{CapabilitySet, RuntimeCapability};
use log::{debug, info};
use starlark::environment::{FrozenModule, Globals, GlobalsBuilder, LibraryExtension, Module};
use starlark::eval::Evaluator;
use starlark::starlark_module;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::OwnedFrozenValue;
use starlark::PrintHandler;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Mutex;

/// Binding name the loader resolves as entry point.
pub const ENTRY_POINT_NAME: &str = "main";

/// Starlark type names accepted as invocable entry points.
const CALLABLE_TYPES: &[&str] = &["function", "builtin_function", "partial"];

/// Extension source dialect: functions and top-level statements, no `load()`.
fn extension_dialect() -> Dialect {
    Dialect {
        enable_def: true,
        enable_lambda: true,
        enable_load: false,
        enable_top_level_stmt: true,
        ..Dialect::Standard
    }
}

#[starlark_module]
fn file_builtins(builder: &mut GlobalsBuilder) {
    /// Reads a UTF-8 text file and returns its content.
    fn read_text(path: &str) -> anyhow::Result<String> {
        std::fs::read_to_string(path).map_err(|err| anyhow::anyhow!("read_text({path}): {err}"))
    }

    /// Returns whether a file or directory exists at `path`.
    fn path_exists(path: &str) -> anyhow::Result<bool> {
        Ok(std::path::Path::new(path).exists())
    }
}

#[starlark_module]
fn env_builtins(builder: &mut GlobalsBuilder) {
    /// Returns an environment variable, or `default` when it is unset.
    fn env_var(name: &str, #[starlark(default = "")] default: &str) -> anyhow::Result<String> {
        Ok(std::env::var(name).unwrap_or_else(|_| default.to_string()))
    }
}

/// Builds the global environment for one capability set.
pub fn extension_globals(capabilities: &CapabilitySet) -> Globals {
    let mut builder =
        GlobalsBuilder::extended_by(&[LibraryExtension::Print, LibraryExtension::Json]);
    if capabilities.contains(&RuntimeCapability::File) {
        builder = builder.with(file_builtins);
    }
    if capabilities.contains(&RuntimeCapability::Env) {
        builder = builder.with(env_builtins);
    }
    builder.build()
}

/// Collects `print()` output of one evaluation.
struct CapturedOutput<'a> {
    source_name: &'a str,
    lines: Mutex<Vec<String>>,
}

impl<'a> CapturedOutput<'a> {
    fn new(source_name: &'a str) -> Self {
        Self {
            source_name,
            lines: Mutex::new(Vec::new()),
        }
    }

    fn into_lines(self) -> Vec<String> {
        self.lines
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PrintHandler for CapturedOutput<'_> {
    fn println(&self, text: &str) -> anyhow::Result<()> {
        info!(
            "event=extension_print module=extension source={} text={}",
            self.source_name, text
        );
        self.lines
            .lock()
            .map_err(|_| anyhow::anyhow!("print buffer poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}

/// Evaluates extension sources into entry points.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionLoader;

impl ExecutionLoader {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates `code` and resolves its `main` binding.
    ///
    /// `source_name` only labels diagnostics and Starlark error locations.
    ///
    /// # Errors
    /// - [`LoadError::Syntax`] when the body does not parse.
    /// - [`LoadError::Evaluation`] when top-level code raises.
    /// - [`LoadError::EntryPointMissing`] when no `main` binding exists.
    /// - [`LoadError::EntryPointNotCallable`] when `main` is not a function.
    pub fn load(
        &self,
        source_name: &str,
        code: &str,
        capabilities: &CapabilitySet,
    ) -> Result<EntryPoint, LoadError> {
        let ast = AstModule::parse(source_name, code.to_string(), &extension_dialect()).map_err(
            |err| LoadError::Syntax {
                message: err.to_string(),
            },
        )?;

        let globals = extension_globals(capabilities);
        let module = Module::new();
        let printed = CapturedOutput::new(source_name);
        {
            let mut eval = Evaluator::new(&module);
            eval.set_print_handler(&printed);
            eval.eval_module(ast, &globals)
                .map_err(|err| LoadError::Evaluation {
                    message: err.to_string(),
                })?;
        }

        match module.get(ENTRY_POINT_NAME) {
            None => return Err(LoadError::EntryPointMissing),
            Some(value) => {
                let type_name = value.get_type();
                if !CALLABLE_TYPES.contains(&type_name) {
                    return Err(LoadError::EntryPointNotCallable {
                        type_name: type_name.to_string(),
                    });
                }
            }
        }

        let namespace = module.freeze().map_err(|err| LoadError::Evaluation {
            message: format!("failed to freeze extension module: {err}"),
        })?;
        let main = namespace
            .get(ENTRY_POINT_NAME)
            .map_err(|err| LoadError::Evaluation {
                message: format!("failed to resolve frozen entry point: {err}"),
            })?;

        let load_output = printed.into_lines();
        debug!(
            "event=extension_eval module=extension status=ok source={} printed_lines={}",
            source_name,
            load_output.len()
        );

        Ok(EntryPoint {
            source_name: source_name.to_string(),
            capabilities: capabilities.clone(),
            load_output,
            main,
            namespace,
        })
    }
}

/// Resolved `main` of one evaluated extension.
///
/// Holds the frozen module so closures and state captured during the
/// initial evaluation stay valid for as long as the entry point lives.
pub struct EntryPoint {
    source_name: String,
    capabilities: CapabilitySet,
    load_output: Vec<String>,
    main: OwnedFrozenValue,
    namespace: FrozenModule,
}

impl Debug for EntryPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoint")
            .field("source_name", &self.source_name)
            .field("capabilities", &self.capabilities)
            .field("load_output", &self.load_output)
            .finish_non_exhaustive()
    }
}

impl EntryPoint {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Lines printed by top-level code during load.
    pub fn load_output(&self) -> &[String] {
        &self.load_output
    }

    /// The frozen module `main` was defined in.
    pub fn namespace(&self) -> &FrozenModule {
        &self.namespace
    }

    /// Calls `main()` with no arguments in a fresh evaluator.
    pub fn call(&self) -> Result<InvocationOutput, InvocationError> {
        let module = Module::new();
        let printed = CapturedOutput::new(&self.source_name);
        let value = {
            let mut eval = Evaluator::new(&module);
            eval.set_print_handler(&printed);
            let main = self.main.owned_value(module.frozen_heap());
            eval.eval_function(main, &[], &[])
                .map_err(|err| InvocationError::Failed {
                    message: err.to_string(),
                })?
                .to_repr()
        };

        Ok(InvocationOutput {
            value,
            printed: printed.into_lines(),
        })
    }
}

/// Result of one successful entry-point call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    /// `repr()` of the returned value (`None` for no return).
    pub value: String,
    /// Lines passed to `print()` during the call.
    pub printed: Vec<String>,
}

/// Entry-point evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Syntax { message: String },
    Evaluation { message: String },
    EntryPointMissing,
    EntryPointNotCallable { type_name: String },
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { message } => write!(f, "extension code does not parse: {message}"),
            Self::Evaluation { message } => write!(f, "extension code failed: {message}"),
            Self::EntryPointMissing => {
                write!(f, "extension code defines no `{ENTRY_POINT_NAME}` entry point")
            }
            Self::EntryPointNotCallable { type_name } => write!(
                f,
                "extension `{ENTRY_POINT_NAME}` is not callable (found {type_name})"
            ),
        }
    }
}

impl Error for LoadError {}

/// Entry-point invocation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// `main()` raised a Starlark error.
    Failed { message: String },
    /// No result within the configured dispatch timeout.
    TimedOut { millis: u64 },
    /// The worker running the call panicked.
    Panicked { message: String },
    /// The dispatcher is shut down or the lane is gone.
    Unavailable,
}

impl Display for InvocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { message } => write!(f, "extension action failed: {message}"),
            Self::TimedOut { millis } => {
                write!(f, "extension action timed out after {millis}ms")
            }
            Self::Panicked { message } => write!(f, "extension action panicked: {message}"),
            Self::Unavailable => write!(f, "extension dispatcher is unavailable"),
        }
    }
}

impl Error for InvocationError {}

#[cfg(test)]
mod tests {
    use super::{ExecutionLoader, InvocationError, LoadError};
    use crate::extension::capability::{CapabilitySet, RuntimeCapability};

    fn load(code: &str) -> Result<super::EntryPoint, LoadError> {
        ExecutionLoader::new().load("test.ltc", code, &CapabilitySet::new())
    }

    #[test]
    fn loads_and_calls_main() {
        let entry = load("def main():\n    return 42\n").expect("entry point");
        let output = entry.call().expect("call succeeds");
        assert_eq!(output.value, "42");
        assert!(output.printed.is_empty());
    }

    #[test]
    fn main_sees_state_captured_at_load_time() {
        let code = "GREETING = \"hi \" + \"there\"\ndef helper():\n    return GREETING.upper()\ndef main():\n    print(helper())\n";
        let entry = load(code).expect("entry point");
        let output = entry.call().expect("call succeeds");
        assert_eq!(output.value, "None");
        assert_eq!(output.printed, vec!["HI THERE".to_string()]);

        let again = entry.call().expect("second call succeeds");
        assert_eq!(again, output);
    }

    #[test]
    fn lambda_is_accepted_as_entry_point() {
        let entry = load("main = lambda: \"x\"\n").expect("lambda entry point");
        assert_eq!(entry.call().expect("call").value, "\"x\"");
    }

    #[test]
    fn captures_top_level_print_as_load_output() {
        let entry = load("print(\"loading\")\ndef main():\n    pass\n").expect("entry point");
        assert_eq!(entry.load_output(), &["loading".to_string()]);
    }

    #[test]
    fn rejects_missing_entry_point() {
        let err = load("def helper():\n    return 1\n").expect_err("no main");
        assert_eq!(err, LoadError::EntryPointMissing);
    }

    #[test]
    fn rejects_non_callable_entry_point() {
        let err = load("main = 3\n").expect_err("main is an int");
        assert!(matches!(err, LoadError::EntryPointNotCallable { .. }));
    }

    #[test]
    fn reports_syntax_errors() {
        let err = load("def main(:\n").expect_err("bad syntax");
        assert!(matches!(err, LoadError::Syntax { .. }));
    }

    #[test]
    fn rejects_load_statements() {
        let err = load("load(\"other.star\", \"x\")\ndef main():\n    pass\n")
            .expect_err("load() is disabled");
        assert!(matches!(err, LoadError::Syntax { .. }));
    }

    #[test]
    fn reports_top_level_runtime_errors() {
        let err = load("x = 1 // 0\ndef main():\n    pass\n").expect_err("division by zero");
        assert!(matches!(err, LoadError::Evaluation { .. }));
    }

    #[test]
    fn invocation_errors_are_returned_not_raised() {
        let entry = load("def main():\n    fail(\"boom\")\n").expect("entry point");
        let err = entry.call().expect_err("main fails");
        match err {
            InvocationError::Failed { message } => assert!(message.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn host_builtins_require_capabilities() {
        let code = "def main():\n    return env_var(\"LITTLETOOLKIT_UNSET_VAR\", \"fallback\")\n";
        let err = load(code).expect_err("env_var is not bound without capability");
        assert!(matches!(err, LoadError::Syntax { .. } | LoadError::Evaluation { .. }));

        let capabilities: CapabilitySet = [RuntimeCapability::Env].into_iter().collect();
        let entry = ExecutionLoader::new()
            .load("env.ltc", code, &capabilities)
            .expect("env capability binds env_var");
        assert_eq!(entry.call().expect("call").value, "\"fallback\"");
    }
}
