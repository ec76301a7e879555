//! Syntax-tree walk that applies a [`DenyList`] to a Python fragment.

use rustpython_ast::{self as ast, Visitor};
use rustpython_parser::Parse;
use serde::{Deserialize, Serialize};

use super::DenyList;

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Whether the fragment may be executed.
    pub accepted: bool,
    /// Human-readable reason; names the offending token on rejection.
    pub reason: String,
}

impl SafetyVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: "Code passed static analysis.".to_string(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
        }
    }
}

/// Parses code and rejects it when it references denied names.
#[derive(Debug, Clone, Default)]
pub struct SafetyAnalyzer {
    deny: DenyList,
}

impl SafetyAnalyzer {
    /// Creates an analyzer over the given deny list.
    pub fn new(deny: DenyList) -> Self {
        Self { deny }
    }

    /// Returns the deny list in use.
    pub fn deny_list(&self) -> &DenyList {
        &self.deny
    }

    /// Checks a code fragment. Pure: no IO, no caching.
    pub fn check(&self, code: &str) -> SafetyVerdict {
        let suite = match ast::Suite::parse(code, "<agent_script>") {
            Ok(suite) => suite,
            Err(e) => return SafetyVerdict::reject(format!("Code has syntax errors: {}", e)),
        };

        let mut walker = DenyListWalker {
            deny: &self.deny,
            violation: None,
        };
        for stmt in suite {
            walker.visit_stmt(stmt);
            if walker.violation.is_some() {
                break;
            }
        }

        match walker.violation {
            Some(reason) => SafetyVerdict::reject(reason),
            None => SafetyVerdict::accept(),
        }
    }
}

/// Pre-order walker that stops recording after the first violation.
struct DenyListWalker<'a> {
    deny: &'a DenyList,
    violation: Option<String>,
}

impl DenyListWalker<'_> {
    fn flag(&mut self, reason: String) {
        if self.violation.is_none() {
            self.violation = Some(reason);
        }
    }

    fn check_alias_rebinding(&mut self, names: &[ast::Alias]) {
        for alias in names {
            if let Some(asname) = &alias.asname {
                if self.deny.is_denied_function(asname.as_str()) {
                    self.flag(format!(
                        "Rebinding of restricted builtin detected: '{}'",
                        asname.as_str()
                    ));
                    return;
                }
            }
        }
    }

    fn inspect_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Import(import) => {
                for alias in &import.names {
                    if let Some(root) = self.deny.denied_module(alias.name.as_str()) {
                        self.flag(format!("Unsafe import detected: '{}'", root));
                        return;
                    }
                }
                self.check_alias_rebinding(&import.names);
            }
            ast::Stmt::ImportFrom(import) => {
                if let Some(module) = &import.module {
                    if let Some(root) = self.deny.denied_module(module.as_str()) {
                        self.flag(format!("Unsafe import detected: '{}'", root));
                        return;
                    }
                }
                self.check_alias_rebinding(&import.names);
            }
            ast::Stmt::FunctionDef(def) => {
                self.check_definition(def.name.as_str());
                self.check_arguments(&def.args);
            }
            ast::Stmt::AsyncFunctionDef(def) => {
                self.check_definition(def.name.as_str());
                self.check_arguments(&def.args);
            }
            ast::Stmt::ClassDef(def) => self.check_definition(def.name.as_str()),
            ast::Stmt::Try(block) => self.check_handlers(&block.handlers),
            ast::Stmt::TryStar(block) => self.check_handlers(&block.handlers),
            ast::Stmt::Match(block) => {
                for case in &block.cases {
                    self.check_pattern(&case.pattern);
                }
            }
            _ => {}
        }
    }

    fn check_handlers(&mut self, handlers: &[ast::ExceptHandler]) {
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            if let Some(name) = &handler.name {
                self.check_definition(name.as_str());
            }
        }
    }

    fn check_arguments(&mut self, args: &ast::Arguments) {
        let with_defaults = args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
            .map(|a| &a.def);
        let variadic = args.vararg.iter().chain(&args.kwarg).map(|a| a.as_ref());

        for arg in with_defaults.chain(variadic) {
            self.check_definition(arg.arg.as_str());
        }
    }

    fn check_pattern(&mut self, pattern: &ast::Pattern) {
        match pattern {
            ast::Pattern::MatchAs(p) => {
                if let Some(name) = &p.name {
                    self.check_definition(name.as_str());
                }
                if let Some(inner) = &p.pattern {
                    self.check_pattern(inner);
                }
            }
            ast::Pattern::MatchStar(p) => {
                if let Some(name) = &p.name {
                    self.check_definition(name.as_str());
                }
            }
            ast::Pattern::MatchMapping(p) => {
                if let Some(rest) = &p.rest {
                    self.check_definition(rest.as_str());
                }
                p.patterns.iter().for_each(|inner| self.check_pattern(inner));
            }
            ast::Pattern::MatchSequence(p) => {
                p.patterns.iter().for_each(|inner| self.check_pattern(inner));
            }
            ast::Pattern::MatchOr(p) => {
                p.patterns.iter().for_each(|inner| self.check_pattern(inner));
            }
            ast::Pattern::MatchClass(p) => {
                p.patterns
                    .iter()
                    .chain(&p.kwd_patterns)
                    .for_each(|inner| self.check_pattern(inner));
            }
            ast::Pattern::MatchValue(_) | ast::Pattern::MatchSingleton(_) => {}
        }
    }

    fn check_definition(&mut self, name: &str) {
        if self.deny.is_denied_function(name) {
            self.flag(format!(
                "Rebinding of restricted builtin detected: '{}'",
                name
            ));
        }
    }

    fn inspect_expr(&mut self, expr: &ast::Expr) {
        match expr {
            ast::Expr::Call(call) => match call.func.as_ref() {
                ast::Expr::Name(name) if self.deny.is_denied_function(name.id.as_str()) => {
                    self.flag(format!(
                        "Unsafe function call detected: '{}()'",
                        name.id.as_str()
                    ));
                }
                ast::Expr::Attribute(attr) if self.deny.is_denied_function(attr.attr.as_str()) => {
                    self.flag(format!(
                        "Unsafe method call detected: '.{}()'",
                        attr.attr.as_str()
                    ));
                }
                _ => {}
            },
            ast::Expr::Attribute(attr) if self.deny.is_denied_attribute(attr.attr.as_str()) => {
                self.flag(format!(
                    "Access to restricted attribute detected: '{}'",
                    attr.attr.as_str()
                ));
            }
            ast::Expr::Lambda(lambda) => self.check_arguments(&lambda.args),
            ast::Expr::Name(name) => {
                let id = name.id.as_str();
                if self.deny.is_denied_attribute(id) {
                    self.flag(format!("Access to restricted attribute detected: '{}'", id));
                } else if matches!(name.ctx, ast::ExprContext::Store)
                    && self.deny.is_denied_function(id)
                {
                    self.flag(format!("Rebinding of restricted builtin detected: '{}'", id));
                }
            }
            _ => {}
        }
    }
}

impl Visitor for DenyListWalker<'_> {
    fn visit_stmt(&mut self, node: ast::Stmt) {
        if self.violation.is_some() {
            return;
        }
        self.inspect_stmt(&node);
        if self.violation.is_none() {
            self.generic_visit_stmt(node);
        }
    }

    fn visit_expr(&mut self, node: ast::Expr) {
        if self.violation.is_some() {
            return;
        }
        self.inspect_expr(&node);
        if self.violation.is_none() {
            self.generic_visit_expr(node);
        }
    }
}
