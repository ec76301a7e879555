//! The table of module, function and attribute names the analyzer rejects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

const DEFAULT_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "socket",
    "ctypes",
    "cffi",
    "importlib",
    "multiprocessing",
    "signal",
    "pty",
    "fcntl",
    "resource",
    "posix",
    "nt",
    "_posixsubprocess",
    "_winapi",
    "builtins",
    "pickle",
    "marshal",
    "shelve",
    "code",
    "codeop",
    "inspect",
    "gc",
    "webbrowser",
];

const DEFAULT_FUNCTIONS: &[&str] = &[
    "exec",
    "eval",
    "__import__",
    "breakpoint",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "exit",
    "quit",
    "input",
    "help",
    "system",
    "popen",
    "spawn",
    "posix_spawn",
    "posix_spawnp",
    "create_subprocess_exec",
    "create_subprocess_shell",
    "fork",
    "forkpty",
    "execv",
    "execve",
    "execvp",
    "execvpe",
    "execl",
    "execle",
    "execlp",
    "kill",
    "killpg",
    "rmtree",
];

const DEFAULT_ATTRIBUTES: &[&str] = &[
    "__builtins__",
    "__globals__",
    "__subclasses__",
    "__bases__",
    "__base__",
    "__mro__",
    "__class__",
    "__code__",
    "__closure__",
    "__dict__",
    "__getattribute__",
    "__loader__",
    "__spec__",
    "__import__",
    "f_globals",
    "f_locals",
    "f_builtins",
    "f_back",
    "gi_frame",
    "cr_frame",
    "tb_frame",
];

/// Names the safety analyzer refuses to see in generated code.
///
/// Module names are compared against the root of a dotted import path only,
/// so `os` also covers `os.path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyList {
    /// Root module names that must not be imported.
    #[serde(default = "default_modules")]
    pub modules: BTreeSet<String>,

    /// Builtin or function names that must not be called or rebound.
    #[serde(default = "default_functions")]
    pub functions: BTreeSet<String>,

    /// Introspection attributes that must not be accessed.
    #[serde(default = "default_attributes")]
    pub attributes: BTreeSet<String>,
}

fn to_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_modules() -> BTreeSet<String> {
    to_set(DEFAULT_MODULES)
}

fn default_functions() -> BTreeSet<String> {
    to_set(DEFAULT_FUNCTIONS)
}

fn default_attributes() -> BTreeSet<String> {
    to_set(DEFAULT_ATTRIBUTES)
}

impl Default for DenyList {
    fn default() -> Self {
        Self {
            modules: default_modules(),
            functions: default_functions(),
            attributes: default_attributes(),
        }
    }
}

impl DenyList {
    /// Creates an empty deny list that accepts everything that parses.
    pub fn empty() -> Self {
        Self {
            modules: BTreeSet::new(),
            functions: BTreeSet::new(),
            attributes: BTreeSet::new(),
        }
    }

    /// Adds a module name.
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.modules.insert(name.into());
        self
    }

    /// Adds a function name.
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.functions.insert(name.into());
        self
    }

    /// Adds an attribute name.
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into());
        self
    }

    /// Returns the denied root module for a dotted import path, if any.
    pub fn denied_module<'a>(&self, path: &'a str) -> Option<&'a str> {
        let root = path.split('.').next().unwrap_or(path);
        self.modules.contains(root).then_some(root)
    }

    /// Returns true if `name` is a denied function.
    pub fn is_denied_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    /// Returns true if `name` is a denied attribute.
    pub fn is_denied_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Returns true if no names are denied at all.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.functions.is_empty() && self.attributes.is_empty()
    }
}
