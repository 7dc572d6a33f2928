//! Process-wide debug level and the text emitters gated on it.
//!
//! The level is resolved once from `global.verbose` and cached. Scoped
//! overrides live on a per-thread stack, so an override made by one worker
//! is never observed by another.

use crate::config::get_config;
use crate::errors::StbtError;
use crate::logging::log_event;
use crate::runtime::{ErrorStream, ProductionErrorStream};
use serde_json::json;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

const FALLBACK_PROGRAM_NAME: &str = "stbt-logging";

static GLOBAL_LEVEL: Mutex<Option<u32>> = Mutex::new(None);

thread_local! {
    static SCOPED_LEVELS: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

fn scoped_top() -> Option<u32> {
    SCOPED_LEVELS.with(|stack| stack.borrow().last().copied())
}

/// Current debug level: the innermost scoped override on this thread, else the
/// process-wide level, resolving it from configuration on first use.
pub fn debug_level() -> Result<u32, StbtError> {
    if let Some(level) = scoped_top() {
        return Ok(level);
    }
    let mut global = GLOBAL_LEVEL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(level) = *global {
        return Ok(level);
    }
    let level = get_config::<u32>("global", "verbose")?;
    *global = Some(level);
    Ok(level)
}

/// Replaces the current level. Inside a scoped override only the override is
/// replaced, and it is discarded with the scope.
pub fn set_debug_level(level: u32) {
    let replaced_scope = SCOPED_LEVELS.with(|stack| match stack.borrow_mut().last_mut() {
        Some(top) => {
            *top = level;
            true
        }
        None => false,
    });
    if !replaced_scope {
        *GLOBAL_LEVEL
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(level);
    }
}

/// Restores the previous level when dropped, including during unwinding.
/// Bound to the thread that created it.
#[must_use = "the override ends as soon as the guard is dropped"]
pub struct ScopedDebugLevel {
    depth: usize,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for ScopedDebugLevel {
    fn drop(&mut self) {
        SCOPED_LEVELS.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

pub fn scoped_debug_level(level: u32) -> ScopedDebugLevel {
    let depth = SCOPED_LEVELS.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(level);
        depth
    });
    ScopedDebugLevel {
        depth,
        _thread_bound: PhantomData,
    }
}

/// Runs `body` with the level set to `level`, restoring the old level however
/// `body` exits.
pub fn with_debug_level<T>(level: u32, body: impl FnOnce() -> T) -> T {
    let _guard = scoped_debug_level(level);
    body()
}

/// Backs a repeatable `-v` flag: each call raises the level by one.
#[derive(Debug, Default)]
pub struct VerboseCounter {
    num_calls: u32,
}

impl VerboseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self) -> u32 {
        self.num_calls += 1;
        set_debug_level(self.num_calls);
        self.num_calls
    }

    pub fn count(&self) -> u32 {
        self.num_calls
    }
}

pub fn program_name() -> &'static str {
    static NAME: OnceLock<String> = OnceLock::new();
    NAME.get_or_init(|| {
        std::env::args_os()
            .next()
            .and_then(|arg0| {
                Path::new(&arg0)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_PROGRAM_NAME.to_string())
    })
}

pub fn format_debug_line(program: &str, message: &str) -> String {
    format!("{program}: {message}")
}

pub fn format_warning_line(program: &str, message: &str) -> String {
    format!("{program}: warning: {message}")
}

pub fn warn_to(stream: &dyn ErrorStream, message: &str) {
    stream.write_line(&format_warning_line(program_name(), message));
    log_event("warning", "text", json!({ "message": message }));
}

pub fn debug_to(stream: &dyn ErrorStream, message: &str) -> Result<(), StbtError> {
    if debug_level()? > 0 {
        stream.write_line(&format_debug_line(program_name(), message));
        log_event("debug", "text", json!({ "message": message }));
    }
    Ok(())
}

/// Extra verbose output for people working on the pipeline itself.
pub fn ddebug_to(stream: &dyn ErrorStream, message: &str) -> Result<(), StbtError> {
    if debug_level()? > 1 {
        stream.write_line(&format_debug_line(program_name(), message));
        log_event("ddebug", "text", json!({ "message": message }));
    }
    Ok(())
}

pub fn warn(message: &str) {
    warn_to(&ProductionErrorStream, message);
}

pub fn debug(message: &str) -> Result<(), StbtError> {
    debug_to(&ProductionErrorStream, message)
}

pub fn ddebug(message: &str) -> Result<(), StbtError> {
    ddebug_to(&ProductionErrorStream, message)
}
